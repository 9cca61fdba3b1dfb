mod decoder;

use std::collections::{HashMap, VecDeque};

pub use decoder::{validate, BoundCloud, ColorSelection, FieldReader};

use crate::color::{linear_from_srgb, ColorMapper, ColorMode, LinearRgba};
use crate::config::PointCloudSettings;
use crate::diagnostics::{ErrorKind, TopicErrors};
use crate::error::{PointCloudError, PointCloudResult};
use crate::messages::PointCloud2;
use crate::renderable::{worst, PoseReport, Renderable, RenderableBase};
use crate::renderer::{BufferView, DrawItem, Topology};
use crate::resources::{BufferRegistry, GeometryBuffer, Material, MaterialHandle, SceneResources};
use crate::time::Time;
use crate::transforms::{PoseUpdate, ResolveContext, TransformTree};

/// Geometry of one received cloud, placed by its own header.
#[derive(Debug)]
pub struct CloudSnapshot {
    pub base: RenderableBase,
    positions: GeometryBuffer<[f32; 3]>,
    colors: GeometryBuffer<LinearRgba>,
    opacity: f32,
}

impl CloudSnapshot {
    pub fn positions(&self) -> &GeometryBuffer<[f32; 3]> {
        &self.positions
    }

    pub fn colors(&self) -> &GeometryBuffer<LinearRgba> {
        &self.colors
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }
}

type SpareBuffers = (GeometryBuffer<[f32; 3]>, GeometryBuffer<LinearRgba>);

/// All geometry for one point cloud topic.
#[derive(Debug)]
pub struct PointCloudRenderable {
    topic: String,
    settings: PointCloudSettings,
    /// Auto-selected color field, kept until the field disappears.
    selection: Option<ColorSelection>,
    material: Material,
    material_handle: Option<MaterialHandle>,
    /// Oldest first.
    snapshots: VecDeque<CloudSnapshot>,
    spare: Vec<SpareBuffers>,
}

impl PointCloudRenderable {
    fn new(topic: &str, settings: &PointCloudSettings) -> Self {
        Self {
            topic: topic.to_string(),
            settings: settings.clone(),
            selection: None,
            material: Material::default(),
            material_handle: None,
            snapshots: VecDeque::new(),
            spare: Vec::new(),
        }
    }

    pub fn selection(&self) -> Option<&ColorSelection> {
        self.selection.as_ref()
    }

    pub fn settings(&self) -> &PointCloudSettings {
        &self.settings
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &CloudSnapshot> {
        self.snapshots.iter()
    }

    pub fn latest(&self) -> Option<&CloudSnapshot> {
        self.snapshots.back()
    }

    pub fn material(&self) -> Material {
        self.material
    }

    /// Returns the selection to decode with and, when auto-selected, the one to keep.
    fn resolve_selection(
        &self,
        msg: &PointCloud2,
        settings: &PointCloudSettings,
    ) -> PointCloudResult<(ColorSelection, Option<ColorSelection>)> {
        if settings.color_mode == Some(ColorMode::Flat) {
            return Ok((ColorSelection::flat(), None));
        }
        let has_field = |name: &str| msg.fields.iter().any(|f| f.name == name);

        let (mut selection, sticky) = match &settings.color_field {
            Some(name) if !has_field(name) => {
                return Err(PointCloudError::ColorFieldNotFound(name.clone()));
            }
            Some(name) => (ColorSelection::for_field(name), None),
            None => {
                let selection = match &self.selection {
                    Some(sticky) if sticky.field.as_deref().is_some_and(has_field) => {
                        sticky.clone()
                    }
                    _ => {
                        let selection = ColorSelection::auto_select(&msg.fields)
                            .ok_or(PointCloudError::NoFields)?;
                        log::debug!("{}: coloring by field {:?}", self.topic, selection.field);
                        selection
                    }
                };
                (selection.clone(), Some(selection))
            }
        };
        if let Some(mode) = settings.color_mode {
            selection.mode = mode;
        }
        Ok((selection, sticky))
    }

    fn mapper(
        settings: &PointCloudSettings,
        selection: &ColorSelection,
        bound: &BoundCloud<'_>,
    ) -> ColorMapper {
        match selection.mode {
            ColorMode::Flat => ColorMapper::Flat(linear_from_srgb(settings.flat_color)),
            ColorMode::Rgb | ColorMode::Rgba => ColorMapper::Packed {
                order: selection.order,
                use_alpha: selection.mode == ColorMode::Rgba,
            },
            mode => {
                let scanned = match (settings.min_value, settings.max_value) {
                    (Some(_), Some(_)) => None,
                    _ => bound.color_range(),
                };
                let min = settings.min_value.or(scanned.map(|r| r.0)).unwrap_or(0.0);
                let max = settings.max_value.or(scanned.map(|r| r.1)).unwrap_or(0.0);
                match mode {
                    ColorMode::Gradient => ColorMapper::Gradient {
                        min_color: linear_from_srgb(settings.gradient[0]),
                        max_color: linear_from_srgb(settings.gradient[1]),
                        min,
                        max,
                    },
                    ColorMode::Rainbow => ColorMapper::Rainbow { min, max },
                    _ => ColorMapper::Turbo { min, max },
                }
            }
        }
    }

    fn take_buffers(&mut self, registry: &mut BufferRegistry, len: usize) -> SpareBuffers {
        self.spare.pop().unwrap_or_else(|| {
            (
                GeometryBuffer::with_len(registry, len),
                GeometryBuffer::with_len(registry, len),
            )
        })
    }

    fn recycle_front(&mut self) {
        if let Some(snapshot) = self.snapshots.pop_front() {
            self.spare.push((snapshot.positions, snapshot.colors));
        }
    }

    fn sync_material(&mut self, selection: &ColorSelection, resources: &mut SceneResources) {
        let material = Material {
            transparent: self.settings.decay() > 0
                || selection.mode == ColorMode::Rgba
                || (selection.mode == ColorMode::Flat && self.settings.flat_color.a < 1.0),
            point_size: self.settings.point_size,
            depth_test: true,
        };
        if self.material_handle.is_some() && material == self.material {
            return;
        }
        if let Some(old) = self.material_handle.take() {
            resources.materials.release(old);
        }
        self.material_handle = Some(resources.materials.acquire_material(material));
        self.material = material;
    }

    /// Decodes `msg` into a snapshot. Nothing changes if the message is rejected.
    pub fn update(
        &mut self,
        msg: &PointCloud2,
        receive_time: Time,
        settings: &PointCloudSettings,
        resources: &mut SceneResources,
    ) -> PointCloudResult<()> {
        let (selection, sticky) = self.resolve_selection(msg, settings)?;
        let bound = BoundCloud::bind(msg, &selection)?;
        let mapper = Self::mapper(settings, &selection, &bound);
        if *settings != self.settings {
            self.settings = settings.clone();
        }
        let count = bound.point_count();

        let decay = self.settings.decay() > 0;
        let mut snapshot = match self.snapshots.pop_back() {
            Some(current) if !decay => current,
            current => {
                if let Some(current) = current {
                    self.snapshots.push_back(current);
                }
                let (positions, colors) = self.take_buffers(&mut resources.buffers, count);
                CloudSnapshot {
                    base: RenderableBase::new(&self.topic, &msg.header, receive_time),
                    positions,
                    colors,
                    opacity: 1.0,
                }
            }
        };

        let (_, positions) = snapshot.positions.write(&mut resources.buffers, count);
        let (_, colors) = snapshot.colors.write(&mut resources.buffers, count);
        bound.populate(&mapper, positions, colors);
        snapshot.base.set_source(&msg.header, receive_time);
        self.snapshots.push_back(snapshot);

        let cap = self.settings.max_snapshots.max(1);
        while self.snapshots.len() > cap {
            self.recycle_front();
        }

        if sticky.is_some() {
            self.selection = sticky;
        }
        self.sync_material(&selection, resources);
        Ok(())
    }

    /// Drops snapshots older than the decay time and refreshes their opacity.
    fn decay(&mut self, now: Time) {
        let decay = self.settings.decay();
        if decay == 0 {
            return;
        }
        while let Some(oldest) = self.snapshots.front() {
            if now.saturating_sub(oldest.base.stamp) > decay {
                self.recycle_front();
            } else {
                break;
            }
        }
        for snapshot in &mut self.snapshots {
            let age = now.saturating_sub(snapshot.base.stamp);
            snapshot.opacity = (1.0 - age as f64 / decay as f64).clamp(0.0, 1.0) as f32;
        }
    }
}

impl Renderable for PointCloudRenderable {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn update_pose(
        &mut self,
        tree: &TransformTree,
        ctx: Option<&ResolveContext<'_>>,
    ) -> PoseUpdate {
        self.snapshots
            .iter_mut()
            .map(|s| s.base.update_pose(tree, ctx))
            .fold(PoseUpdate::Resolved, worst)
    }

    fn collect_draws<'a>(&'a self, _resources: &'a SceneResources, out: &mut Vec<DrawItem<'a>>) {
        for snapshot in &self.snapshots {
            if !snapshot.base.is_placed() || snapshot.positions.is_empty() {
                continue;
            }
            out.push(DrawItem {
                topic: &self.topic,
                topology: Topology::Points,
                positions: BufferView::of(&snapshot.positions),
                colors: BufferView::of(&snapshot.colors),
                indices: None,
                model: snapshot.base.model_matrix(),
                tint: [1.0, 1.0, 1.0, snapshot.opacity],
                material: self.material,
            });
        }
    }

    fn dispose(mut self, resources: &mut SceneResources) {
        while !self.snapshots.is_empty() {
            self.recycle_front();
        }
        for (positions, colors) in self.spare {
            positions.release(&mut resources.buffers);
            colors.release(&mut resources.buffers);
        }
        if let Some(handle) = self.material_handle {
            resources.materials.release(handle);
        }
    }
}

/// Point cloud renderables keyed by topic.
#[derive(Debug, Default)]
pub struct PointClouds {
    clouds: HashMap<String, PointCloudRenderable>,
}

impl PointClouds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(
        &mut self,
        topic: &str,
        msg: &PointCloud2,
        receive_time: Time,
        settings: &PointCloudSettings,
        resources: &mut SceneResources,
        errors: &mut TopicErrors,
    ) {
        let created = !self.clouds.contains_key(topic);
        let cloud = self
            .clouds
            .entry(topic.to_string())
            .or_insert_with(|| PointCloudRenderable::new(topic, settings));

        match cloud.update(msg, receive_time, settings, resources) {
            Ok(()) => {
                if created {
                    log::debug!("{}: new point cloud with {} points", topic, msg.point_count());
                }
                errors.remove_from_topic(topic, ErrorKind::InvalidPointCloud);
                errors.remove_from_topic(topic, ErrorKind::UnsupportedPointCloud);
            }
            Err(err) => {
                let kind = match err {
                    PointCloudError::BigEndian => ErrorKind::UnsupportedPointCloud,
                    _ => ErrorKind::InvalidPointCloud,
                };
                errors.add_to_topic(topic, kind, err.to_string());
                if created {
                    if let Some(cloud) = self.clouds.remove(topic) {
                        cloud.dispose(resources);
                    }
                }
            }
        }
    }

    pub fn start_frame(
        &mut self,
        tree: &TransformTree,
        ctx: Option<&ResolveContext<'_>>,
        now: Time,
        report: &mut PoseReport,
    ) {
        for cloud in self.clouds.values_mut() {
            cloud.decay(now);
            let update = cloud.update_pose(tree, ctx);
            let frame_id = cloud
                .latest()
                .map(|s| s.base.frame_id.as_str())
                .unwrap_or_default();
            report.record(&cloud.topic, frame_id, &update);
        }
    }

    pub fn collect_draws<'a>(&'a self, resources: &'a SceneResources, out: &mut Vec<DrawItem<'a>>) {
        for cloud in self.clouds.values() {
            cloud.collect_draws(resources, out);
        }
    }

    pub fn get(&self, topic: &str) -> Option<&PointCloudRenderable> {
        self.clouds.get(topic)
    }

    pub fn remove_topic(&mut self, topic: &str, resources: &mut SceneResources) -> bool {
        match self.clouds.remove(topic) {
            Some(cloud) => {
                log::debug!("{}: point cloud removed", topic);
                cloud.dispose(resources);
                true
            }
            None => false,
        }
    }

    pub fn dispose(&mut self, resources: &mut SceneResources) {
        for (_, cloud) in self.clouds.drain() {
            cloud.dispose(resources);
        }
    }

    pub fn len(&self) -> usize {
        self.clouds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clouds.is_empty()
    }
}
