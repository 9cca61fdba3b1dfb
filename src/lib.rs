pub mod app;
pub mod camera;
pub mod color;
pub mod config;
pub mod demo;
pub mod diagnostics;
pub mod error;
pub mod markers;
pub mod messages;
pub mod point_cloud;
pub mod renderable;
pub mod renderer;
pub mod resources;
pub mod scheduler;
pub mod time;
pub mod transforms;

pub use config::RendererConfig;
pub use diagnostics::{ErrorKind, TopicErrors};
pub use error::{ConfigError, MarkerError, PointCloudError, RendererError, TransformError};
pub use renderer::{HeadlessBackend, MessageSender, RenderBackend, Renderer};
pub use scheduler::{FrameInfo, FrameObserver, TickOutcome};
pub use transforms::{LookupQuality, Pose, PoseUpdate, TransformTree};
