use glam::{Mat4, Vec3};

use crate::color::{linear_from_srgb, LinearRgba};
use crate::config::SphereDetail;
use crate::error::MarkerError;
use crate::messages::{Marker, MarkerType};
use crate::renderer::{BufferView, DrawItem, Topology};
use crate::resources::{GeometryBuffer, Material, MeshHandle, MeshKey, SceneResources};

const WHITE: LinearRgba = [1.0; 4];

/// Geometry specialization of a marker.
#[derive(Debug)]
pub enum MarkerShape {
    /// One shared unit mesh scaled by the marker.
    Mesh {
        key: MeshKey,
        mesh: MeshHandle,
        scale: Vec3,
    },
    /// Per-marker vertex data in the marker frame.
    Vertices {
        topology: Topology,
        positions: GeometryBuffer<[f32; 3]>,
        colors: GeometryBuffer<LinearRgba>,
        indices: Option<GeometryBuffer<u32>>,
    },
    /// A shared unit mesh drawn once per point.
    Instanced {
        key: MeshKey,
        mesh: MeshHandle,
        scale: Vec3,
        instances: Vec<(Vec3, LinearRgba)>,
    },
}

fn mesh_key(marker_type: MarkerType, detail: SphereDetail) -> Option<MeshKey> {
    match marker_type {
        MarkerType::Arrow => Some(MeshKey::Arrow),
        MarkerType::Cube | MarkerType::CubeList => Some(MeshKey::Cube),
        MarkerType::Sphere | MarkerType::SphereList => Some(MeshKey::Sphere(detail)),
        MarkerType::Cylinder => Some(MeshKey::Cylinder),
        _ => None,
    }
}

fn scale_of(marker: &Marker) -> Vec3 {
    let s = marker.scale;
    match marker.marker_type {
        // length along x, head diameter from z
        MarkerType::Arrow => Vec3::new(s.x as f32, s.z as f32, s.z as f32),
        _ => Vec3::new(s.x as f32, s.y as f32, s.z as f32),
    }
}

fn point_colors(marker: &Marker) -> Vec<LinearRgba> {
    if marker.colors.is_empty() {
        vec![WHITE; marker.points.len()]
    } else {
        marker.colors.iter().map(|c| linear_from_srgb(*c)).collect()
    }
}

fn vertex_positions(marker: &Marker) -> Vec<[f32; 3]> {
    marker
        .points
        .iter()
        .map(|p| [p.x as f32, p.y as f32, p.z as f32])
        .collect()
}

fn line_strip_indices(count: usize) -> Vec<u32> {
    (1..count as u32).flat_map(|i| [i - 1, i]).collect()
}

pub fn validate(marker: &Marker) -> Result<(), MarkerError> {
    if matches!(marker.marker_type, MarkerType::TextViewFacing | MarkerType::MeshResource) {
        return Err(MarkerError::Unsupported(marker.marker_type));
    }
    let finite = std::iter::once(&marker.scale)
        .chain(&marker.points)
        .all(|v| v.to_array().iter().all(|c| c.is_finite()));
    if !finite {
        return Err(MarkerError::NonFinitePose);
    }
    if !marker.colors.is_empty() && marker.colors.len() != marker.points.len() {
        return Err(MarkerError::ColorCountMismatch {
            colors: marker.colors.len(),
            points: marker.points.len(),
        });
    }
    let count = marker.points.len();
    let bad_count = match marker.marker_type {
        MarkerType::LineList => count % 2 != 0,
        MarkerType::TriangleList => count % 3 != 0,
        _ => false,
    };
    if bad_count {
        return Err(MarkerError::InvalidPointCount {
            marker_type: marker.marker_type,
            count,
        });
    }
    Ok(())
}

impl MarkerShape {
    /// True if `update` can reuse this shape for a marker of `marker_type`.
    pub fn accepts(&self, marker_type: MarkerType, detail: SphereDetail) -> bool {
        match self {
            MarkerShape::Mesh { key, .. } => {
                !matches!(marker_type, MarkerType::CubeList | MarkerType::SphereList)
                    && mesh_key(marker_type, detail) == Some(*key)
            }
            MarkerShape::Instanced { key, .. } => {
                matches!(marker_type, MarkerType::CubeList | MarkerType::SphereList)
                    && mesh_key(marker_type, detail) == Some(*key)
            }
            MarkerShape::Vertices {
                topology, indices, ..
            } => {
                vertex_topology(marker_type) == Some(*topology)
                    && indices.is_some() == (marker_type == MarkerType::LineStrip)
            }
        }
    }

    /// Builds the shape for a validated marker.
    pub fn new(marker: &Marker, detail: SphereDetail, resources: &mut SceneResources) -> Self {
        match (vertex_topology(marker.marker_type), mesh_key(marker.marker_type, detail)) {
            (Some(topology), _) => {
                let points = vertex_positions(marker);
                let registry = &mut resources.buffers;
                let indices = (marker.marker_type == MarkerType::LineStrip)
                    .then(|| GeometryBuffer::new(registry, line_strip_indices(points.len())));
                MarkerShape::Vertices {
                    topology,
                    colors: GeometryBuffer::new(registry, point_colors(marker)),
                    positions: GeometryBuffer::new(registry, points),
                    indices,
                }
            }
            (None, Some(key)) => {
                let mesh = resources.acquire_mesh(key);
                let instanced =
                    matches!(marker.marker_type, MarkerType::CubeList | MarkerType::SphereList);
                let mut shape = if instanced {
                    MarkerShape::Instanced {
                        key,
                        mesh,
                        scale: Vec3::ONE,
                        instances: Vec::new(),
                    }
                } else {
                    MarkerShape::Mesh {
                        key,
                        mesh,
                        scale: Vec3::ONE,
                    }
                };
                shape.update(marker, resources);
                shape
            }
            // validate rejects the remaining types, fall back to an empty point set
            (None, None) => MarkerShape::Vertices {
                topology: Topology::Points,
                positions: GeometryBuffer::new(&mut resources.buffers, Vec::new()),
                colors: GeometryBuffer::new(&mut resources.buffers, Vec::new()),
                indices: None,
            },
        }
    }

    /// Updates in place. Vertex buffers are reallocated only when the point count changes.
    pub fn update(&mut self, marker: &Marker, resources: &mut SceneResources) {
        match self {
            MarkerShape::Mesh { scale, .. } => {
                *scale = scale_of(marker);
            }
            MarkerShape::Instanced {
                scale, instances, ..
            } => {
                *scale = scale_of(marker);
                instances.clear();
                let colors = point_colors(marker);
                instances.extend(
                    marker
                        .points
                        .iter()
                        .zip(colors)
                        .map(|(p, c)| (Vec3::new(p.x as f32, p.y as f32, p.z as f32), c)),
                );
            }
            MarkerShape::Vertices {
                positions,
                colors,
                indices,
                ..
            } => {
                let points = vertex_positions(marker);
                positions.replace(&mut resources.buffers, &points);
                colors.replace(&mut resources.buffers, &point_colors(marker));
                if let Some(indices) = indices {
                    indices.replace(&mut resources.buffers, &line_strip_indices(points.len()));
                }
            }
        }
    }

    pub fn collect_draws<'a>(
        &'a self,
        topic: &'a str,
        model: Mat4,
        tint: LinearRgba,
        material: Material,
        resources: &'a SceneResources,
        out: &mut Vec<DrawItem<'a>>,
    ) {
        match self {
            MarkerShape::Mesh { mesh, scale, .. } => {
                let Some(mesh) = resources.meshes.get(mesh) else {
                    return;
                };
                out.push(DrawItem {
                    topic,
                    topology: Topology::Triangles,
                    positions: BufferView::of(&mesh.positions),
                    colors: BufferView::of(&mesh.colors),
                    indices: Some(BufferView::of(&mesh.indices)),
                    model: model * Mat4::from_scale(*scale),
                    tint,
                    material,
                });
            }
            MarkerShape::Instanced {
                mesh,
                scale,
                instances,
                ..
            } => {
                let Some(mesh) = resources.meshes.get(mesh) else {
                    return;
                };
                for (offset, color) in instances {
                    out.push(DrawItem {
                        topic,
                        topology: Topology::Triangles,
                        positions: BufferView::of(&mesh.positions),
                        colors: BufferView::of(&mesh.colors),
                        indices: Some(BufferView::of(&mesh.indices)),
                        model: model
                            * Mat4::from_scale_rotation_translation(
                                *scale,
                                glam::Quat::IDENTITY,
                                *offset,
                            ),
                        tint: [
                            tint[0] * color[0],
                            tint[1] * color[1],
                            tint[2] * color[2],
                            tint[3] * color[3],
                        ],
                        material,
                    });
                }
            }
            MarkerShape::Vertices {
                topology,
                positions,
                colors,
                indices,
            } => {
                if positions.is_empty() {
                    return;
                }
                out.push(DrawItem {
                    topic,
                    topology: *topology,
                    positions: BufferView::of(positions),
                    colors: BufferView::of(colors),
                    indices: indices.as_ref().map(BufferView::of),
                    model,
                    tint,
                    material,
                });
            }
        }
    }

    pub fn dispose(self, resources: &mut SceneResources) {
        match self {
            MarkerShape::Mesh { mesh, .. } | MarkerShape::Instanced { mesh, .. } => {
                resources.release_mesh(mesh);
            }
            MarkerShape::Vertices {
                positions,
                colors,
                indices,
                ..
            } => {
                positions.release(&mut resources.buffers);
                colors.release(&mut resources.buffers);
                if let Some(indices) = indices {
                    indices.release(&mut resources.buffers);
                }
            }
        }
    }
}

fn vertex_topology(marker_type: MarkerType) -> Option<Topology> {
    match marker_type {
        MarkerType::LineStrip | MarkerType::LineList => Some(Topology::Lines),
        MarkerType::Points => Some(Topology::Points),
        MarkerType::TriangleList => Some(Topology::Triangles),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ColorRgba, Header, Vector3};

    fn marker(marker_type: MarkerType, points: usize) -> Marker {
        let mut marker = Marker::new(Header::default(), "ns", 0, marker_type);
        marker.points = (0..points)
            .map(|i| Vector3 {
                x: i as f64,
                y: 0.0,
                z: 0.0,
            })
            .collect();
        marker
    }

    #[test]
    fn test_line_strip_becomes_line_list() {
        assert_eq!(line_strip_indices(4), vec![0, 1, 1, 2, 2, 3]);
        assert!(line_strip_indices(1).is_empty());
    }

    #[test]
    fn test_validation() {
        assert_eq!(
            validate(&marker(MarkerType::MeshResource, 0)),
            Err(MarkerError::Unsupported(MarkerType::MeshResource))
        );
        assert!(matches!(
            validate(&marker(MarkerType::LineList, 3)),
            Err(MarkerError::InvalidPointCount { count: 3, .. })
        ));
        let mut colored = marker(MarkerType::Points, 2);
        colored.colors = vec![ColorRgba::WHITE];
        assert!(matches!(validate(&colored), Err(MarkerError::ColorCountMismatch { .. })));
        let mut nan = marker(MarkerType::Points, 1);
        nan.points[0].y = f64::NAN;
        assert_eq!(validate(&nan), Err(MarkerError::NonFinitePose));
        assert!(validate(&marker(MarkerType::TriangleList, 6)).is_ok());
    }

    #[test]
    fn test_vertex_update_reuses_buffers_on_equal_count() {
        let mut resources = SceneResources::new();
        let strip = marker(MarkerType::LineStrip, 3);
        let mut shape = MarkerShape::new(&strip, SphereDetail::Low, &mut resources);
        let MarkerShape::Vertices { positions, indices, .. } = &shape else {
            panic!("line strip should be a vertex shape");
        };
        let id = positions.id();
        assert_eq!(indices.as_ref().map(|i| i.len()), Some(4));

        shape.update(&marker(MarkerType::LineStrip, 3), &mut resources);
        let MarkerShape::Vertices { positions, .. } = &shape else {
            unreachable!()
        };
        assert_eq!(positions.id(), id);

        shape.update(&marker(MarkerType::LineStrip, 5), &mut resources);
        let MarkerShape::Vertices { positions, .. } = &shape else {
            unreachable!()
        };
        assert_ne!(positions.id(), id);

        shape.dispose(&mut resources);
        assert!(resources.is_drained());
    }

    #[test]
    fn test_sphere_list_draws_one_item_per_point() {
        let mut resources = SceneResources::new();
        let mut list = marker(MarkerType::SphereList, 3);
        list.scale = Vector3 { x: 0.2, y: 0.2, z: 0.2 };
        let shape = MarkerShape::new(&list, SphereDetail::Low, &mut resources);
        assert!(shape.accepts(MarkerType::SphereList, SphereDetail::Low));
        assert!(!shape.accepts(MarkerType::Sphere, SphereDetail::Low));

        let mut draws = Vec::new();
        shape.collect_draws(
            "/markers",
            Mat4::IDENTITY,
            WHITE,
            Material::default(),
            &resources,
            &mut draws,
        );
        assert_eq!(draws.len(), 3);
        let origin = draws[2].model.transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 1e-6));
        // every instance shares the cached mesh buffers
        assert_eq!(draws[0].positions.id, draws[2].positions.id);

        shape.dispose(&mut resources);
        assert!(resources.is_drained());
    }
}
