use std::{collections::HashMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::color::ColorMode;
use crate::error::ConfigError;
use crate::messages::ColorRgba;
use crate::time::{self, Time};
use crate::transforms::{HistoryLimits, ParentPolicy};

const DEFAULT_MAX_SNAPSHOTS: usize = 64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SphereDetail {
    Low,
    #[default]
    Medium,
    High,
}

impl SphereDetail {
    /// (sectors, stacks) of the generated UV sphere.
    pub fn segments(self) -> (u32, u32) {
        match self {
            SphereDetail::Low => (8, 6),
            SphereDetail::Medium => (16, 12),
            SphereDetail::High => (32, 24),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointCloudSettings {
    /// `None` picks a mode from the cloud's fields on first sight of the topic.
    pub color_mode: Option<ColorMode>,
    pub color_field: Option<String>,
    pub flat_color: ColorRgba,
    pub gradient: [ColorRgba; 2],
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub point_size: f32,
    /// Seconds a snapshot stays visible, zero disables decay.
    pub decay_time: f64,
    pub max_snapshots: usize,
}

impl Default for PointCloudSettings {
    fn default() -> Self {
        Self {
            color_mode: None,
            color_field: None,
            flat_color: ColorRgba::WHITE,
            gradient: [
                ColorRgba::new(0.0, 0.0, 1.0, 1.0),
                ColorRgba::new(1.0, 0.0, 0.0, 1.0),
            ],
            min_value: None,
            max_value: None,
            point_size: 2.0,
            decay_time: 0.0,
            max_snapshots: DEFAULT_MAX_SNAPSHOTS,
        }
    }
}

impl PointCloudSettings {
    pub fn decay(&self) -> Time {
        time::from_secs_f64(self.decay_time)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Chosen from the tree's roots when unset.
    pub fixed_frame: Option<String>,
    /// Follows the fixed frame when unset.
    pub render_frame: Option<String>,
    pub parent_policy: ParentPolicy,
    pub history: HistoryLimits,
    pub sphere_detail: SphereDetail,
    pub point_clouds: PointCloudSettings,
    /// Per-topic replacements for `point_clouds`.
    pub topics: HashMap<String, PointCloudSettings>,
    pub background: ColorRgba,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            fixed_frame: None,
            render_frame: None,
            parent_policy: ParentPolicy::default(),
            history: HistoryLimits::default(),
            sphere_detail: SphereDetail::default(),
            point_clouds: PointCloudSettings::default(),
            topics: HashMap::new(),
            background: ColorRgba::new(0.1, 0.1, 0.12, 1.0),
        }
    }
}

impl RendererConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("loaded config {}", path.display());
        Ok(config)
    }

    pub fn point_cloud_settings(&self, topic: &str) -> &PointCloudSettings {
        self.topics.get(topic).unwrap_or(&self.point_clouds)
    }
}
