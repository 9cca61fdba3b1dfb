mod backend;
mod headless;
pub mod utils;
mod wgpu_backend;
mod wgpu_context;

pub use backend::{BufferView, DrawItem, FrameDraw, RenderBackend, Topology};
pub use headless::{HeadlessBackend, RecordedFrame, RecordedItem};
pub use wgpu_backend::WgpuBackend;
pub use wgpu_context::WgpuContext;

use crossbeam::channel::{self, Receiver, Sender};
use glam::Mat4;

use crate::color::linear_from_srgb;
use crate::config::RendererConfig;
use crate::diagnostics::{ErrorKind, TopicErrors};
use crate::error::{RendererError, TransformError};
use crate::markers::Markers;
use crate::messages::{Message, TfMessage, TopicMessage};
use crate::point_cloud::PointClouds;
use crate::renderable::PoseReport;
use crate::resources::SceneResources;
use crate::scheduler::{FrameObserver, FrameScheduler, TickOutcome};
use crate::time::Time;
use crate::transforms::{Pose, ResolveContext, TransformTree};

/// Root names preferred as the fixed frame, in order.
const PREFERRED_FIXED_FRAMES: [&str; 3] = ["map", "odom", "world"];

/// Thread-safe handle for feeding messages into a renderer.
#[derive(Clone, Debug)]
pub struct MessageSender {
    tx: Sender<TopicMessage>,
}

impl MessageSender {
    /// Returns false once the renderer is gone.
    pub fn send(&self, message: TopicMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Owns the scene state and drives ticks through a backend.
pub struct Renderer<B: RenderBackend> {
    config: RendererConfig,
    tree: TransformTree,
    errors: TopicErrors,
    resources: SceneResources,
    point_clouds: PointClouds,
    markers: Markers,
    scheduler: FrameScheduler,
    backend: B,
    inbox_tx: Sender<TopicMessage>,
    inbox: Receiver<TopicMessage>,
    fixed_frame: Option<String>,
    view_proj: Mat4,
    disposed: bool,
}

impl<B: RenderBackend> Renderer<B> {
    pub fn new(config: RendererConfig, backend: B) -> Self {
        let (inbox_tx, inbox) = channel::unbounded();
        Self {
            tree: TransformTree::with_settings(config.parent_policy, config.history),
            markers: Markers::new(config.sphere_detail),
            config,
            errors: TopicErrors::new(),
            resources: SceneResources::new(),
            point_clouds: PointClouds::new(),
            scheduler: FrameScheduler::new(),
            backend,
            inbox_tx,
            inbox,
            fixed_frame: None,
            view_proj: Mat4::IDENTITY,
            disposed: false,
        }
    }

    pub fn sender(&self) -> MessageSender {
        MessageSender {
            tx: self.inbox_tx.clone(),
        }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn tree(&self) -> &TransformTree {
        &self.tree
    }

    pub fn errors(&self) -> &TopicErrors {
        &self.errors
    }

    pub fn resources(&self) -> &SceneResources {
        &self.resources
    }

    pub fn point_clouds(&self) -> &PointClouds {
        &self.point_clouds
    }

    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn fixed_frame(&self) -> Option<&str> {
        self.fixed_frame.as_deref()
    }

    pub fn render_frame(&self) -> Option<&str> {
        self.config.render_frame.as_deref().or(self.fixed_frame())
    }

    pub fn set_view_projection(&mut self, view_proj: Mat4) {
        self.view_proj = view_proj;
    }

    pub fn add_observer(&mut self, observer: Box<dyn FrameObserver>) {
        self.scheduler.add_observer(observer);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.backend.resize(width, height);
    }

    /// Routes one message to the collection for its type.
    pub fn add_message(&mut self, message: TopicMessage) {
        if self.disposed {
            return;
        }
        let TopicMessage {
            topic,
            receive_time,
            message,
        } = message;
        match message {
            Message::Tf(tf) => self.add_transforms(&topic, &tf),
            Message::Marker(marker) => {
                self.markers.add_message(
                    &topic,
                    &marker,
                    receive_time,
                    &mut self.resources,
                    &mut self.errors,
                );
            }
            Message::MarkerArray(array) => {
                self.markers
                    .add_array(&topic, &array, receive_time, &mut self.resources, &mut self.errors);
            }
            Message::PointCloud(cloud) => {
                self.point_clouds.add_message(
                    &topic,
                    &cloud,
                    receive_time,
                    self.config.point_cloud_settings(&topic),
                    &mut self.resources,
                    &mut self.errors,
                );
            }
        }
    }

    fn add_transforms(&mut self, topic: &str, tf: &TfMessage) {
        let mut rejected = None;
        for transform in &tf.transforms {
            let data = &transform.transform;
            let result = Pose::from_message(data.translation.to_array(), data.rotation.to_array())
                .ok_or_else(|| TransformError::NonFinite {
                    child: transform.child_frame_id.clone(),
                    stamp: transform.header.stamp,
                })
                .and_then(|pose| {
                    self.tree.add_transform(
                        &transform.child_frame_id,
                        &transform.header.frame_id,
                        transform.header.stamp,
                        pose,
                    )
                });
            if let Err(err) = result {
                rejected = Some(err);
            }
        }
        match rejected {
            Some(err) => {
                self.errors
                    .add_to_topic(topic, ErrorKind::InvalidTransform, err.to_string())
            }
            None => {
                self.errors.remove_from_topic(topic, ErrorKind::InvalidTransform);
            }
        }
    }

    /// Drops every renderable and diagnostic of `topic`.
    pub fn remove_topic(&mut self, topic: &str) {
        self.point_clouds.remove_topic(topic, &mut self.resources);
        self.markers.remove_topic(topic, &mut self.resources);
        self.errors.clear_topic(topic);
    }

    fn drain_inbox(&mut self) {
        while let Ok(message) = self.inbox.try_recv() {
            self.add_message(message);
        }
    }

    fn select_fixed_frame(&mut self) {
        let selected = match &self.config.fixed_frame {
            Some(frame) => Some(frame.clone()),
            None => {
                let roots = self.tree.root_frames();
                PREFERRED_FIXED_FRAMES
                    .iter()
                    .find(|name| roots.contains(name))
                    .copied()
                    .or_else(|| roots.first().copied())
                    .map(str::to_string)
            }
        };
        if selected != self.fixed_frame {
            match &selected {
                Some(frame) => log::info!("fixed frame is now '{}'", frame),
                None => log::info!("fixed frame cleared"),
            }
            self.fixed_frame = selected;
        }
    }

    /// Runs one frame at playback time `time`.
    pub fn tick(&mut self, time: Time) -> Result<TickOutcome, RendererError> {
        if self.disposed {
            return Ok(TickOutcome::Stopped);
        }
        self.drain_inbox();
        self.select_fixed_frame();

        let fixed = self.fixed_frame.clone();
        let render = self.config.render_frame.clone().or_else(|| fixed.clone());
        let mut frame = self.scheduler.begin(time, fixed.as_deref(), render.as_deref());

        let ctx = match (&fixed, &render) {
            (Some(fixed), Some(render)) => Some(ResolveContext {
                fixed_frame: fixed,
                render_frame: render,
                current_time: time,
            }),
            _ => None,
        };
        let mut report = PoseReport::new();
        self.point_clouds
            .start_frame(&self.tree, ctx.as_ref(), time, &mut report);
        self.markers
            .start_frame(&self.tree, ctx.as_ref(), time, &mut self.resources, &mut report);
        report.apply(&mut self.errors);

        let retired = self.resources.buffers.take_retired();
        if !retired.is_empty() {
            self.backend.release_buffers(&retired);
        }

        let mut items = Vec::new();
        self.point_clouds.collect_draws(&self.resources, &mut items);
        self.markers.collect_draws(&self.resources, &mut items);
        // blended items draw after opaque ones
        items.sort_by_key(|item| item.material.transparent);
        frame.draw_count = items.len();

        let draw = FrameDraw {
            index: frame.index,
            time,
            view_proj: self.view_proj,
            background: linear_from_srgb(self.config.background),
            items,
        };
        let result = self.backend.render(&draw);
        if let Err(err) = &result {
            log::error!("frame {} failed: {}", frame.index, err);
        }

        self.scheduler.end(&frame);
        result.map(|()| TickOutcome::Continue)
    }

    /// Releases every resource. Later ticks return `Stopped`.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.point_clouds.dispose(&mut self.resources);
        self.markers.dispose(&mut self.resources);
        let retired = self.resources.buffers.take_retired();
        self.backend.release_buffers(&retired);
        self.scheduler.clear();
        self.errors.clear();
        self.tree.clear();
        self.disposed = true;
        log::debug!("renderer disposed");
    }
}
