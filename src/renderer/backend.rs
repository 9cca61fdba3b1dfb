use bytemuck::Pod;
use glam::Mat4;

use crate::color::LinearRgba;
use crate::error::RendererError;
use crate::resources::{BufferId, GeometryBuffer, Material};
use crate::time::Time;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topology {
    Points,
    Lines,
    Triangles,
}

/// Borrowed view of a geometry buffer for one frame.
#[derive(Clone, Copy, Debug)]
pub struct BufferView<'a> {
    pub id: BufferId,
    pub version: u64,
    pub len: u32,
    pub bytes: &'a [u8],
}

impl<'a> BufferView<'a> {
    pub fn of<T: Pod>(buffer: &'a GeometryBuffer<T>) -> Self {
        Self {
            id: buffer.id(),
            version: buffer.version(),
            len: buffer.len() as u32,
            bytes: buffer.bytes(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DrawItem<'a> {
    pub topic: &'a str,
    pub topology: Topology,
    /// `[f32; 3]` per vertex.
    pub positions: BufferView<'a>,
    /// Linear `[f32; 4]` per vertex.
    pub colors: BufferView<'a>,
    pub indices: Option<BufferView<'a>>,
    pub model: Mat4,
    /// Multiplied with the vertex color.
    pub tint: LinearRgba,
    pub material: Material,
}

impl DrawItem<'_> {
    pub fn element_count(&self) -> u32 {
        match &self.indices {
            Some(indices) => indices.len,
            None => self.positions.len,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FrameDraw<'a> {
    pub index: u64,
    pub time: Time,
    pub view_proj: Mat4,
    pub background: LinearRgba,
    pub items: Vec<DrawItem<'a>>,
}

pub trait RenderBackend {
    fn render(&mut self, frame: &FrameDraw<'_>) -> Result<(), RendererError>;

    /// Frees allocations whose ids will never be drawn again.
    fn release_buffers(&mut self, ids: &[BufferId]);

    fn resize(&mut self, _width: u32, _height: u32) {}
}
