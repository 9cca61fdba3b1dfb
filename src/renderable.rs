use std::collections::BTreeMap;

use glam::Mat4;

use crate::diagnostics::{ErrorKind, TopicErrors};
use crate::error::TransformError;
use crate::messages::Header;
use crate::renderer::DrawItem;
use crate::resources::SceneResources;
use crate::time::Time;
use crate::transforms::{self, Pose, PoseUpdate, ResolveContext, TransformTree};

/// Pose and source state common to every renderable.
#[derive(Clone, Debug)]
pub struct RenderableBase {
    pub topic: String,
    pub frame_id: String,
    /// Source timestamp of the current geometry.
    pub stamp: Time,
    pub receive_time: Time,
    /// Pose within `frame_id`.
    pub local: Pose,
    /// Last pose resolved in the render frame.
    pub world: Pose,
    /// Resolves at display time instead of `stamp`.
    pub frame_locked: bool,
    placed: bool,
}

impl RenderableBase {
    pub fn new(topic: &str, header: &Header, receive_time: Time) -> Self {
        Self {
            topic: topic.to_string(),
            frame_id: header.frame_id.clone(),
            stamp: header.stamp,
            receive_time,
            local: Pose::IDENTITY,
            world: Pose::IDENTITY,
            frame_locked: false,
            placed: false,
        }
    }

    pub fn set_source(&mut self, header: &Header, receive_time: Time) {
        self.frame_id.clone_from(&header.frame_id);
        self.stamp = header.stamp;
        self.receive_time = receive_time;
    }

    /// Whether the renderable has ever been placed. Unplaced renderables are not drawn.
    pub fn is_placed(&self) -> bool {
        self.placed
    }

    /// Resolves `world` for this tick. A failed lookup keeps the last known pose.
    pub fn update_pose(
        &mut self,
        tree: &TransformTree,
        ctx: Option<&ResolveContext<'_>>,
    ) -> PoseUpdate {
        let Some(ctx) = ctx else {
            return PoseUpdate::Missing(TransformError::NoFixedFrame);
        };
        let src_time = if self.frame_locked {
            ctx.current_time
        } else {
            self.stamp
        };
        let update = transforms::update_pose(
            tree,
            ctx,
            &self.frame_id,
            src_time,
            &self.local,
            &mut self.world,
        );
        if update.is_placed() {
            self.placed = true;
        }
        update
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.world.to_mat4()
    }
}

/// One update/draw/dispose surface shared by point clouds and marker shapes.
pub trait Renderable {
    fn topic(&self) -> &str;

    fn update_pose(&mut self, tree: &TransformTree, ctx: Option<&ResolveContext<'_>>) -> PoseUpdate;

    fn collect_draws<'a>(&'a self, resources: &'a SceneResources, out: &mut Vec<DrawItem<'a>>);

    /// Returns every buffer, material and mesh to `resources`.
    fn dispose(self, resources: &mut SceneResources)
    where
        Self: Sized;
}

/// Ranks outcomes so a topic reports its worst renderable.
fn severity(update: &PoseUpdate) -> u8 {
    match update {
        PoseUpdate::Resolved => 0,
        PoseUpdate::Stale => 1,
        PoseUpdate::Missing(_) => 2,
    }
}

pub fn worst(a: PoseUpdate, b: PoseUpdate) -> PoseUpdate {
    if severity(&b) > severity(&a) {
        b
    } else {
        a
    }
}

/// Collects one tick of pose outcomes and turns them into per-topic diagnostics.
#[derive(Debug, Default)]
pub struct PoseReport {
    topics: BTreeMap<String, (Option<String>, Option<String>)>,
}

impl PoseReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, topic: &str, frame_id: &str, update: &PoseUpdate) {
        let (missing, stale) = self.topics.entry(topic.to_string()).or_default();
        match update {
            PoseUpdate::Resolved => {}
            PoseUpdate::Stale => {
                stale.get_or_insert_with(|| {
                    format!("transform for frame '{}' is outside the known time range", frame_id)
                });
            }
            PoseUpdate::Missing(err) => {
                missing.get_or_insert_with(|| format!("frame '{}': {}", frame_id, err));
            }
        }
    }

    /// Reports `topic` with no failures, so its stale diagnostics are cleared.
    pub fn mark_resolved(&mut self, topic: &str) {
        self.topics.entry(topic.to_string()).or_default();
    }

    /// Replaces the transform diagnostics of every recorded topic.
    pub fn apply(self, errors: &mut TopicErrors) {
        for (topic, (missing, stale)) in self.topics {
            match missing {
                Some(message) => errors.add_to_topic(&topic, ErrorKind::MissingTransform, message),
                None => {
                    errors.remove_from_topic(&topic, ErrorKind::MissingTransform);
                }
            }
            match stale {
                Some(message) => errors.add_to_topic(&topic, ErrorKind::StaleTransform, message),
                None => {
                    errors.remove_from_topic(&topic, ErrorKind::StaleTransform);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    fn header(frame_id: &str, stamp: Time) -> Header {
        Header {
            stamp,
            frame_id: frame_id.to_string(),
        }
    }

    #[test]
    fn test_unplaced_until_first_resolve() {
        let mut tree = TransformTree::new();
        let ctx = ResolveContext {
            fixed_frame: "map",
            render_frame: "map",
            current_time: 0,
        };
        let mut base = RenderableBase::new("/cloud", &header("lidar", 0), 0);

        assert!(matches!(base.update_pose(&tree, Some(&ctx)), PoseUpdate::Missing(_)));
        assert!(!base.is_placed());

        tree.add_transform("lidar", "map", 0, Pose::from_translation(DVec3::X)).unwrap();
        assert_eq!(base.update_pose(&tree, Some(&ctx)), PoseUpdate::Resolved);
        assert!(base.is_placed());

        // losing the fixed frame keeps the last pose
        assert!(matches!(
            base.update_pose(&tree, None),
            PoseUpdate::Missing(TransformError::NoFixedFrame)
        ));
        assert!(base.is_placed());
        assert_eq!(base.world.translation, DVec3::X);
    }

    #[test]
    fn test_report_sets_and_clears_per_topic() {
        let mut errors = TopicErrors::new();

        let mut report = PoseReport::new();
        let missing = PoseUpdate::Missing(TransformError::FrameNotFound("lidar".into()));
        report.record("/a", "lidar", &missing);
        report.record("/a", "lidar", &PoseUpdate::Resolved);
        report.record("/b", "base_link", &PoseUpdate::Stale);
        report.apply(&mut errors);
        assert!(errors.has("/a", ErrorKind::MissingTransform));
        assert!(errors.has("/b", ErrorKind::StaleTransform));

        let mut report = PoseReport::new();
        report.record("/a", "lidar", &PoseUpdate::Resolved);
        report.record("/b", "base_link", &PoseUpdate::Resolved);
        report.apply(&mut errors);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_worst_outcome_wins() {
        let missing = PoseUpdate::Missing(TransformError::NoFixedFrame);
        assert_eq!(worst(PoseUpdate::Resolved, PoseUpdate::Stale), PoseUpdate::Stale);
        assert_eq!(worst(missing.clone(), PoseUpdate::Stale), missing);
    }
}
