use std::path::PathBuf;

use thiserror::Error;

use crate::messages::MarkerType;
use crate::time::Time;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("frame '{0}' does not exist")]
    FrameNotFound(String),

    #[error("frames '{from}' and '{to}' do not share a common ancestor")]
    NoCommonAncestor { from: String, to: String },

    #[error("no transform samples for edge '{parent}' -> '{child}'")]
    EmptyHistory { parent: String, child: String },

    #[error("adding '{parent}' as parent of '{child}' would create a cycle")]
    CyclicTransformTree { parent: String, child: String },

    #[error("frame '{0}' cannot be its own parent")]
    SelfParent(String),

    #[error("frame '{child}' already has parent '{existing}', rejected new parent '{requested}'")]
    ParentConflict {
        child: String,
        existing: String,
        requested: String,
    },

    #[error("transform for '{child}' at {stamp} is not finite")]
    NonFinite { child: String, stamp: Time },

    #[error("no fixed frame available")]
    NoFixedFrame,
}

pub type TransformResult<T> = Result<T, TransformError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PointCloudError {
    #[error("big-endian point clouds are not supported")]
    BigEndian,

    #[error("data length {len} is not a multiple of point_step {point_step}")]
    InvalidPointStep { len: usize, point_step: u32 },

    #[error("point cloud has no fields")]
    NoFields,

    #[error("data length {len} is smaller than height * row_step = {required}")]
    DataTooShort { len: usize, required: usize },

    #[error("width * point_step = {required} exceeds row_step {row_step}")]
    RowTooShort { required: usize, row_step: u32 },

    #[error("point cloud needs at least two of the x, y, z fields")]
    MissingAxes,

    #[error("field '{name}' at offset {offset} does not fit in point_step {point_step}")]
    FieldOutOfBounds {
        name: String,
        offset: u32,
        point_step: u32,
    },

    #[error("color field '{0}' not found")]
    ColorFieldNotFound(String),

    #[error("packed color field '{0}' must be a 4 byte type")]
    InvalidPackedColor(String),
}

pub type PointCloudResult<T> = Result<T, PointCloudError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarkerError {
    #[error("marker type {0:?} is not supported")]
    Unsupported(MarkerType),

    #[error("marker pose is not finite")]
    NonFinitePose,

    #[error("marker has {colors} colors for {points} points")]
    ColorCountMismatch { colors: usize, points: usize },

    #[error("{marker_type:?} marker cannot use {count} points")]
    InvalidPointCount { marker_type: MarkerType, count: usize },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum RendererError {
    #[error("no compatible graphics adapter found")]
    NoAdapter,

    #[error("failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    #[error("failed to request device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),

    #[error("shader '{label}' failed to compile: {message}")]
    Shader { label: String, message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
