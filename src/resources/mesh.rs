use std::collections::hash_map::DefaultHasher;
use std::f32::consts::{PI, TAU};
use std::hash::{Hash, Hasher};

use super::buffers::{BufferRegistry, GeometryBuffer};
use super::registry::{MeshHandle, ResourceCache, _Mesh};
use crate::config::SphereDetail;

const ROUND_SECTORS: u32 = 16;

/// Unit shapes shared by every marker that draws them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MeshKey {
    /// Diameter 1.
    Sphere(SphereDetail),
    /// Edge length 1.
    Cube,
    /// Diameter 1 and height 1 along z.
    Cylinder,
    /// Length 1 along x, head diameter 1, shaft diameter 0.5.
    Arrow,
}

impl MeshKey {
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    pub fn build(self) -> MeshData {
        match self {
            MeshKey::Sphere(detail) => {
                let (sectors, stacks) = detail.segments();
                let profile: Vec<(f32, f32)> = (0..=stacks)
                    .map(|i| {
                        let phi = PI * i as f32 / stacks as f32;
                        (-0.5 * phi.cos(), 0.5 * phi.sin())
                    })
                    .collect();
                lathe(&profile, sectors)
            }
            MeshKey::Cube => cube(),
            MeshKey::Cylinder => lathe(
                &[(-0.5, 0.0), (-0.5, 0.5), (0.5, 0.5), (0.5, 0.0)],
                ROUND_SECTORS,
            ),
            MeshKey::Arrow => {
                let mut mesh = lathe(
                    &[(0.0, 0.0), (0.0, 0.25), (0.77, 0.25), (0.77, 0.5), (1.0, 0.0)],
                    ROUND_SECTORS,
                );
                // built around z, the arrow points along x
                for p in &mut mesh.positions {
                    *p = [p[2], p[0], p[1]];
                }
                mesh
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

/// Revolves `(z, radius)` profile points around the z axis.
fn lathe(profile: &[(f32, f32)], sectors: u32) -> MeshData {
    let ring = sectors + 1;
    let mut positions = Vec::with_capacity(profile.len() * ring as usize);
    for &(z, r) in profile {
        for j in 0..ring {
            let theta = TAU * j as f32 / sectors as f32;
            positions.push([r * theta.cos(), r * theta.sin(), z]);
        }
    }

    let mut indices = Vec::with_capacity(profile.len().saturating_sub(1) * sectors as usize * 6);
    for i in 0..profile.len().saturating_sub(1) as u32 {
        for j in 0..sectors {
            let a = i * ring + j;
            let b = a + ring;
            indices.extend_from_slice(&[a, a + 1, b, b, a + 1, b + 1]);
        }
    }
    MeshData { positions, indices }
}

fn cube() -> MeshData {
    let positions = (0..8)
        .map(|i| {
            let sign = |bit: u32| if i & bit == 0 { -0.5 } else { 0.5 };
            [sign(1), sign(2), sign(4)]
        })
        .collect();
    #[rustfmt::skip]
    let indices = vec![
        0, 2, 1, 1, 2, 3, // -z
        4, 5, 6, 5, 7, 6, // +z
        0, 1, 4, 1, 5, 4, // -y
        2, 6, 3, 3, 6, 7, // +y
        0, 4, 2, 2, 4, 6, // -x
        1, 3, 5, 3, 7, 5, // +x
    ];
    MeshData { positions, indices }
}

/// Backend-visible buffers of a shared mesh. Vertex colors are white, marker color is
/// applied as a tint.
#[derive(Debug)]
pub struct GpuMesh {
    pub positions: GeometryBuffer<[f32; 3]>,
    pub colors: GeometryBuffer<[f32; 4]>,
    pub indices: GeometryBuffer<u32>,
}

impl GpuMesh {
    fn new(data: MeshData, registry: &mut BufferRegistry) -> Self {
        let colors = vec![[1.0; 4]; data.positions.len()];
        Self {
            positions: GeometryBuffer::new(registry, data.positions),
            colors: GeometryBuffer::new(registry, colors),
            indices: GeometryBuffer::new(registry, data.indices),
        }
    }

    fn release(self, registry: &mut BufferRegistry) {
        self.positions.release(registry);
        self.colors.release(registry);
        self.indices.release(registry);
    }
}

pub type MeshCache = ResourceCache<_Mesh, GpuMesh>;

impl MeshCache {
    pub fn acquire_mesh(&mut self, key: MeshKey, registry: &mut BufferRegistry) -> MeshHandle {
        self.acquire(key.fingerprint(), || GpuMesh::new(key.build(), registry))
    }

    pub fn release_mesh(&mut self, handle: MeshHandle, registry: &mut BufferRegistry) {
        if let Some(mesh) = self.release(handle) {
            mesh.release(registry);
        }
    }
}
