mod shape;

use std::collections::{BTreeMap, BTreeSet};

pub use shape::{validate, MarkerShape};

use crate::color::{linear_from_srgb, LinearRgba};
use crate::config::SphereDetail;
use crate::diagnostics::{ErrorKind, TopicErrors};
use crate::error::MarkerError;
use crate::messages::{Marker, MarkerAction, MarkerArray, MarkerType};
use crate::renderable::{PoseReport, Renderable, RenderableBase};
use crate::renderer::DrawItem;
use crate::resources::{Material, MaterialHandle, SceneResources};
use crate::time::Time;
use crate::transforms::{Pose, PoseUpdate, ResolveContext, TransformTree};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerKey {
    pub topic: String,
    pub ns: String,
    pub id: i32,
}

impl MarkerKey {
    pub fn new(topic: &str, marker: &Marker) -> Self {
        Self {
            topic: topic.to_string(),
            ns: marker.ns.clone(),
            id: marker.id,
        }
    }
}

#[derive(Debug)]
pub struct MarkerRenderable {
    pub base: RenderableBase,
    marker_type: MarkerType,
    shape: MarkerShape,
    color: LinearRgba,
    material: Material,
    material_handle: MaterialHandle,
    /// `None` lives until replaced or deleted.
    expires_at: Option<Time>,
}

fn material_for(marker: &Marker) -> Material {
    let translucent = marker.color.a < 1.0 || marker.colors.iter().any(|c| c.a < 1.0);
    Material {
        transparent: translucent,
        ..Material::default()
    }
}

fn expiry(marker: &Marker, receive_time: Time) -> Option<Time> {
    (marker.lifetime > 0).then(|| receive_time.saturating_add(marker.lifetime))
}

fn local_pose(marker: &Marker) -> Result<Pose, MarkerError> {
    Pose::from_message(marker.pose.position.to_array(), marker.pose.orientation.to_array())
        .ok_or(MarkerError::NonFinitePose)
}

impl MarkerRenderable {
    fn new(
        topic: &str,
        marker: &Marker,
        receive_time: Time,
        detail: SphereDetail,
        resources: &mut SceneResources,
    ) -> Result<Self, MarkerError> {
        validate(marker)?;
        let local = local_pose(marker)?;
        let mut base = RenderableBase::new(topic, &marker.header, receive_time);
        base.local = local;
        base.frame_locked = marker.frame_locked;
        let material = material_for(marker);
        Ok(Self {
            base,
            marker_type: marker.marker_type,
            shape: MarkerShape::new(marker, detail, resources),
            color: linear_from_srgb(marker.color),
            material,
            material_handle: resources.materials.acquire_material(material),
            expires_at: expiry(marker, receive_time),
        })
    }

    pub fn marker_type(&self) -> MarkerType {
        self.marker_type
    }

    pub fn shape(&self) -> &MarkerShape {
        &self.shape
    }

    pub fn expires_at(&self) -> Option<Time> {
        self.expires_at
    }

    pub fn is_expired(&self, now: Time) -> bool {
        self.expires_at.is_some_and(|t| now >= t)
    }

    /// Applies a modification. A rejected marker leaves the current state untouched.
    fn update(
        &mut self,
        marker: &Marker,
        receive_time: Time,
        detail: SphereDetail,
        resources: &mut SceneResources,
    ) -> Result<(), MarkerError> {
        validate(marker)?;
        let local = local_pose(marker)?;

        if self.shape.accepts(marker.marker_type, detail) {
            self.shape.update(marker, resources);
        } else {
            log::debug!(
                "{}: marker {}/{} changed type {:?} -> {:?}",
                self.base.topic,
                marker.ns,
                marker.id,
                self.marker_type,
                marker.marker_type
            );
            let shape = MarkerShape::new(marker, detail, resources);
            std::mem::replace(&mut self.shape, shape).dispose(resources);
        }

        let material = material_for(marker);
        if material != self.material {
            let handle = resources.materials.acquire_material(material);
            resources
                .materials
                .release(std::mem::replace(&mut self.material_handle, handle));
            self.material = material;
        }

        self.marker_type = marker.marker_type;
        self.color = linear_from_srgb(marker.color);
        self.expires_at = expiry(marker, receive_time);
        self.base.set_source(&marker.header, receive_time);
        self.base.local = local;
        self.base.frame_locked = marker.frame_locked;
        Ok(())
    }
}

impl Renderable for MarkerRenderable {
    fn topic(&self) -> &str {
        &self.base.topic
    }

    fn update_pose(
        &mut self,
        tree: &TransformTree,
        ctx: Option<&ResolveContext<'_>>,
    ) -> PoseUpdate {
        self.base.update_pose(tree, ctx)
    }

    fn collect_draws<'a>(&'a self, resources: &'a SceneResources, out: &mut Vec<DrawItem<'a>>) {
        if !self.base.is_placed() {
            return;
        }
        self.shape.collect_draws(
            &self.base.topic,
            self.base.model_matrix(),
            self.color,
            self.material,
            resources,
            out,
        );
    }

    fn dispose(self, resources: &mut SceneResources) {
        self.shape.dispose(resources);
        resources.materials.release(self.material_handle);
    }
}

/// Marker renderables keyed by topic, namespace and id.
#[derive(Debug, Default)]
pub struct Markers {
    markers: BTreeMap<MarkerKey, MarkerRenderable>,
    /// Last rejection per marker, surfaced as one diagnostic per topic.
    invalid: BTreeMap<MarkerKey, String>,
    /// Topics that lost markers since the last frame.
    emptied: BTreeSet<String>,
    detail: SphereDetail,
}

impl Markers {
    pub fn new(detail: SphereDetail) -> Self {
        Self {
            detail,
            ..Self::default()
        }
    }

    pub fn add_array(
        &mut self,
        topic: &str,
        array: &MarkerArray,
        receive_time: Time,
        resources: &mut SceneResources,
        errors: &mut TopicErrors,
    ) {
        for marker in &array.markers {
            self.add_message(topic, marker, receive_time, resources, errors);
        }
    }

    pub fn add_message(
        &mut self,
        topic: &str,
        marker: &Marker,
        receive_time: Time,
        resources: &mut SceneResources,
        errors: &mut TopicErrors,
    ) {
        let key = MarkerKey::new(topic, marker);
        match marker.action {
            MarkerAction::Add => {
                let result = match self.markers.get_mut(&key) {
                    Some(existing) => {
                        existing.update(marker, receive_time, self.detail, resources)
                    }
                    None => {
                        MarkerRenderable::new(topic, marker, receive_time, self.detail, resources)
                            .map(|renderable| {
                                self.markers.insert(key.clone(), renderable);
                            })
                    }
                };
                match result {
                    Ok(()) => {
                        self.invalid.remove(&key);
                    }
                    Err(err) => {
                        self.invalid
                            .insert(key, format!("marker {}/{}: {}", marker.ns, marker.id, err));
                    }
                }
            }
            MarkerAction::Delete => {
                self.invalid.remove(&key);
                if let Some(existing) = self.markers.remove(&key) {
                    existing.dispose(resources);
                    self.emptied.insert(key.topic);
                }
            }
            MarkerAction::DeleteAll => {
                self.remove_topic(topic, resources);
            }
        }
        self.sync_diagnostics(topic, errors);
    }

    fn sync_diagnostics(&self, topic: &str, errors: &mut TopicErrors) {
        match self.invalid.iter().find(|(key, _)| key.topic == topic) {
            Some((_, message)) => {
                errors.add_to_topic(topic, ErrorKind::InvalidMarker, message.clone())
            }
            None => {
                errors.remove_from_topic(topic, ErrorKind::InvalidMarker);
            }
        }
    }

    /// Expires markers past their lifetime, then resolves the rest.
    pub fn start_frame(
        &mut self,
        tree: &TransformTree,
        ctx: Option<&ResolveContext<'_>>,
        now: Time,
        resources: &mut SceneResources,
        report: &mut PoseReport,
    ) {
        let expired: Vec<MarkerKey> = self
            .markers
            .iter()
            .filter(|(_, m)| m.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            if let Some(marker) = self.markers.remove(&key) {
                log::debug!("{}: marker {}/{} expired", key.topic, key.ns, key.id);
                marker.dispose(resources);
                self.emptied.insert(key.topic);
            }
        }
        for topic in std::mem::take(&mut self.emptied) {
            report.mark_resolved(&topic);
        }

        for marker in self.markers.values_mut() {
            let update = marker.update_pose(tree, ctx);
            report.record(&marker.base.topic, &marker.base.frame_id, &update);
        }
    }

    pub fn collect_draws<'a>(&'a self, resources: &'a SceneResources, out: &mut Vec<DrawItem<'a>>) {
        for marker in self.markers.values() {
            marker.collect_draws(resources, out);
        }
    }

    pub fn get(&self, key: &MarkerKey) -> Option<&MarkerRenderable> {
        self.markers.get(key)
    }

    pub fn topic_len(&self, topic: &str) -> usize {
        self.markers.keys().filter(|key| key.topic == topic).count()
    }

    /// Removes every marker on `topic`. Returns how many were removed.
    pub fn remove_topic(&mut self, topic: &str, resources: &mut SceneResources) -> usize {
        let keys: Vec<MarkerKey> = self
            .markers
            .keys()
            .filter(|key| key.topic == topic)
            .cloned()
            .collect();
        for key in &keys {
            if let Some(marker) = self.markers.remove(key) {
                marker.dispose(resources);
            }
        }
        self.invalid.retain(|key, _| key.topic != topic);
        if !keys.is_empty() {
            self.emptied.insert(topic.to_string());
        }
        keys.len()
    }

    pub fn dispose(&mut self, resources: &mut SceneResources) {
        for (_, marker) in std::mem::take(&mut self.markers) {
            marker.dispose(resources);
        }
        self.invalid.clear();
        self.emptied.clear();
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ColorRgba, Header, Vector3};
    use crate::time::NANOS_PER_SEC;
    use glam::{DVec3, Vec3};

    fn marker(id: i32, marker_type: MarkerType) -> Marker {
        Marker::new(
            Header {
                stamp: 0,
                frame_id: "base_link".to_string(),
            },
            "test",
            id,
            marker_type,
        )
    }

    struct Fixture {
        markers: Markers,
        resources: SceneResources,
        errors: TopicErrors,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                markers: Markers::new(SphereDetail::Low),
                resources: SceneResources::new(),
                errors: TopicErrors::new(),
            }
        }

        fn add(&mut self, marker: &Marker, receive_time: Time) {
            self.markers.add_message(
                "/markers",
                marker,
                receive_time,
                &mut self.resources,
                &mut self.errors,
            );
        }
    }

    fn key(id: i32) -> MarkerKey {
        MarkerKey {
            topic: "/markers".to_string(),
            ns: "test".to_string(),
            id,
        }
    }

    #[test]
    fn test_add_modify_delete() {
        let mut f = Fixture::new();
        f.add(&marker(1, MarkerType::Cube), 0);
        f.add(&marker(2, MarkerType::Cube), 0);
        assert_eq!(f.markers.len(), 2);
        // both cubes share one mesh
        assert_eq!(f.resources.meshes.len(), 1);

        let mut moved = marker(1, MarkerType::Cube);
        moved.pose.position.x = 3.0;
        f.add(&moved, 1);
        assert_eq!(f.markers.len(), 2);
        let local = f.markers.get(&key(1)).unwrap().base.local;
        assert_eq!(local.translation, DVec3::new(3.0, 0.0, 0.0));

        let mut delete = marker(1, MarkerType::Cube);
        delete.action = MarkerAction::Delete;
        f.add(&delete, 2);
        assert!(f.markers.get(&key(1)).is_none());

        let mut delete_all = marker(0, MarkerType::Cube);
        delete_all.action = MarkerAction::DeleteAll;
        f.add(&delete_all, 3);
        assert!(f.markers.is_empty());
        assert!(f.resources.is_drained());
    }

    #[test]
    fn test_type_change_rebuilds_shape() {
        let mut f = Fixture::new();
        f.add(&marker(1, MarkerType::Sphere), 0);
        let mut strip = marker(1, MarkerType::LineStrip);
        strip.points = vec![Vector3::default(); 3];
        f.add(&strip, 1);

        let renderable = f.markers.get(&key(1)).unwrap();
        assert_eq!(renderable.marker_type(), MarkerType::LineStrip);
        assert!(matches!(renderable.shape(), MarkerShape::Vertices { .. }));
        assert!(f.resources.meshes.is_empty());
    }

    #[test]
    fn test_invalid_marker_reported_and_kept() {
        let mut f = Fixture::new();
        f.add(&marker(1, MarkerType::Cube), 0);

        let mut bad = marker(1, MarkerType::Cube);
        bad.pose.orientation.w = f64::NAN;
        f.add(&bad, 1);
        assert!(f.errors.has("/markers", ErrorKind::InvalidMarker));
        assert_eq!(f.markers.get(&key(1)).unwrap().base.receive_time, 0);

        f.add(&marker(2, MarkerType::TextViewFacing), 1);
        assert!(f.markers.get(&key(2)).is_none());

        // fixing one marker keeps the topic in error while the other is still invalid
        f.add(&marker(1, MarkerType::Cube), 2);
        assert!(f.errors.has("/markers", ErrorKind::InvalidMarker));

        let mut delete = marker(2, MarkerType::Cube);
        delete.action = MarkerAction::Delete;
        f.add(&delete, 3);
        assert!(!f.errors.has("/markers", ErrorKind::InvalidMarker));
    }

    #[test]
    fn test_lifetime_expires_from_receive_time() {
        let mut f = Fixture::new();
        let mut timed = marker(1, MarkerType::Sphere);
        timed.lifetime = NANOS_PER_SEC;
        f.add(&timed, 10 * NANOS_PER_SEC);
        f.add(&marker(2, MarkerType::Sphere), 10 * NANOS_PER_SEC);

        let tree = TransformTree::new();
        let mut report = PoseReport::new();
        f.markers
            .start_frame(&tree, None, 10 * NANOS_PER_SEC + 1, &mut f.resources, &mut report);
        assert_eq!(f.markers.len(), 2);
        f.markers
            .start_frame(&tree, None, 11 * NANOS_PER_SEC, &mut f.resources, &mut report);
        assert_eq!(f.markers.len(), 1);
        assert!(f.markers.get(&key(2)).is_some());
    }

    #[test]
    fn test_expired_marker_clears_transform_diagnostics() {
        let mut f = Fixture::new();
        let mut timed = marker(1, MarkerType::Cube);
        timed.lifetime = NANOS_PER_SEC;
        f.add(&timed, 0);

        let tree = TransformTree::new();
        let mut report = PoseReport::new();
        f.markers.start_frame(&tree, None, 1, &mut f.resources, &mut report);
        report.apply(&mut f.errors);
        assert!(f.errors.has("/markers", ErrorKind::MissingTransform));

        let mut report = PoseReport::new();
        f.markers
            .start_frame(&tree, None, NANOS_PER_SEC, &mut f.resources, &mut report);
        report.apply(&mut f.errors);
        assert!(f.markers.is_empty());
        assert!(!f.errors.has("/markers", ErrorKind::MissingTransform));
    }

    #[test]
    fn test_frame_locked_follows_current_time() {
        let mut f = Fixture::new();
        let mut tree = TransformTree::new();
        tree.add_transform("base_link", "map", 0, Pose::from_translation(DVec3::ZERO)).unwrap();
        let ahead = Pose::from_translation(DVec3::new(10.0, 0.0, 0.0));
        tree.add_transform("base_link", "map", 10, ahead).unwrap();

        let mut locked = marker(1, MarkerType::Cube);
        locked.frame_locked = true;
        f.add(&locked, 0);
        f.add(&marker(2, MarkerType::Cube), 0);

        let ctx = ResolveContext {
            fixed_frame: "map",
            render_frame: "map",
            current_time: 10,
        };
        let mut report = PoseReport::new();
        f.markers.start_frame(&tree, Some(&ctx), 10, &mut f.resources, &mut report);
        assert_eq!(f.markers.get(&key(1)).unwrap().base.world.translation.x, 10.0);
        assert_eq!(f.markers.get(&key(2)).unwrap().base.world.translation.x, 0.0);

        let mut draws = Vec::new();
        f.markers.collect_draws(&f.resources, &mut draws);
        assert_eq!(draws.len(), 2);
        let origin = draws[0].model.transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(10.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn test_translucent_color_switches_material() {
        let mut f = Fixture::new();
        f.add(&marker(1, MarkerType::Cube), 0);
        assert!(!f.markers.get(&key(1)).unwrap().material.transparent);

        let mut faded = marker(1, MarkerType::Cube);
        faded.color = ColorRgba::new(1.0, 0.0, 0.0, 0.5);
        f.add(&faded, 1);
        assert!(f.markers.get(&key(1)).unwrap().material.transparent);
        assert_eq!(f.resources.materials.len(), 1);

        f.markers.dispose(&mut f.resources);
        assert!(f.resources.is_drained());
    }
}
