use std::collections::HashMap;

use glam::Mat4;

use super::backend::{BufferView, FrameDraw, RenderBackend, Topology};
use crate::error::RendererError;
use crate::resources::{BufferId, Material};
use crate::time::Time;

/// Copy of one draw item, kept after the frame's borrows end.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedItem {
    pub topic: String,
    pub topology: Topology,
    pub element_count: u32,
    pub model: Mat4,
    pub tint: [f32; 4],
    pub material: Material,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedFrame {
    pub index: u64,
    pub time: Time,
    pub items: Vec<RecordedItem>,
}

impl RecordedFrame {
    pub fn items_for<'a>(&'a self, topic: &'a str) -> impl Iterator<Item = &'a RecordedItem> + 'a {
        self.items.iter().filter(move |item| item.topic == topic)
    }
}

/// Backend that mirrors buffer bookkeeping without a GPU.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    frames: Vec<RecordedFrame>,
    /// Version and byte length last uploaded per buffer.
    live: HashMap<BufferId, (u64, usize)>,
    uploads: usize,
    released: Vec<BufferId>,
    size: (u32, u32),
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[RecordedFrame] {
        &self.frames
    }

    pub fn last_frame(&self) -> Option<&RecordedFrame> {
        self.frames.last()
    }

    pub fn live_buffers(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, id: BufferId) -> bool {
        self.live.contains_key(&id)
    }

    /// Buffer writes performed so far. Unchanged versions are not re-uploaded.
    pub fn uploads(&self) -> usize {
        self.uploads
    }

    pub fn released(&self) -> &[BufferId] {
        &self.released
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    fn upload(&mut self, view: &BufferView<'_>) {
        let current = (view.version, view.bytes.len());
        if self.live.get(&view.id) != Some(&current) {
            self.live.insert(view.id, current);
            self.uploads += 1;
        }
    }
}

impl RenderBackend for HeadlessBackend {
    fn render(&mut self, frame: &FrameDraw<'_>) -> Result<(), RendererError> {
        let mut items = Vec::with_capacity(frame.items.len());
        for item in &frame.items {
            self.upload(&item.positions);
            self.upload(&item.colors);
            if let Some(indices) = &item.indices {
                self.upload(indices);
            }
            items.push(RecordedItem {
                topic: item.topic.to_string(),
                topology: item.topology,
                element_count: item.element_count(),
                model: item.model,
                tint: item.tint,
                material: item.material,
            });
        }
        self.frames.push(RecordedFrame {
            index: frame.index,
            time: frame.time,
            items,
        });
        Ok(())
    }

    fn release_buffers(&mut self, ids: &[BufferId]) {
        for id in ids {
            self.live.remove(id);
        }
        self.released.extend_from_slice(ids);
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }
}
