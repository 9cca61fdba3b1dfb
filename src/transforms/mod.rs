mod history;
mod pose;
mod resolver;
mod tree;

pub use history::{HistoryLimits, LookupQuality, Sampled, StampedPose, TransformHistory};
pub use pose::Pose;
pub use resolver::{update_pose, PoseUpdate, ResolveContext};
pub use tree::{ParentPolicy, Resolved, TransformTree};
