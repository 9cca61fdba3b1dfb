use bytemuck::Pod;

/// Identity of one backend buffer allocation. A new id means the backend must allocate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(u64);

/// Hands out buffer ids and collects the ones whose allocations can be freed.
#[derive(Debug, Default)]
pub struct BufferRegistry {
    next_id: u64,
    live: usize,
    retired: Vec<BufferId>,
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> BufferId {
        self.next_id += 1;
        self.live += 1;
        BufferId(self.next_id)
    }

    fn retire(&mut self, id: BufferId) {
        self.live = self.live.saturating_sub(1);
        self.retired.push(id);
    }

    pub fn live(&self) -> usize {
        self.live
    }

    /// Ids retired since the last call.
    pub fn take_retired(&mut self) -> Vec<BufferId> {
        std::mem::take(&mut self.retired)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUpdate {
    Written,
    Reallocated,
}

/// CPU-side vertex or index data mirrored by one backend buffer.
///
/// Writing the same element count keeps the id and bumps the version; a different
/// count retires the old id and allocates a new one.
#[derive(Debug)]
pub struct GeometryBuffer<T: Pod> {
    id: BufferId,
    version: u64,
    data: Vec<T>,
}

impl<T: Pod> GeometryBuffer<T> {
    pub fn new(registry: &mut BufferRegistry, data: Vec<T>) -> Self {
        Self {
            id: registry.allocate(),
            version: 0,
            data,
        }
    }

    pub fn with_len(registry: &mut BufferRegistry, len: usize) -> Self {
        Self::new(registry, vec![T::zeroed(); len])
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    /// Sizes the buffer to exactly `len` elements and returns it for writing.
    pub fn write(&mut self, registry: &mut BufferRegistry, len: usize) -> (BufferUpdate, &mut [T]) {
        let update = if len == self.data.len() {
            self.version += 1;
            BufferUpdate::Written
        } else {
            registry.retire(self.id);
            self.id = registry.allocate();
            self.version = 0;
            self.data.resize(len, T::zeroed());
            BufferUpdate::Reallocated
        };
        (update, &mut self.data)
    }

    pub fn replace(&mut self, registry: &mut BufferRegistry, data: &[T]) -> BufferUpdate {
        let (update, slot) = self.write(registry, data.len());
        slot.copy_from_slice(data);
        update
    }

    pub fn release(self, registry: &mut BufferRegistry) {
        registry.retire(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_count_keeps_id() {
        let mut registry = BufferRegistry::new();
        let mut buffer = GeometryBuffer::new(&mut registry, vec![[0.0f32; 3]; 4]);
        let id = buffer.id();

        let update = buffer.replace(&mut registry, &[[1.0; 3]; 4]);
        assert_eq!(update, BufferUpdate::Written);
        assert_eq!(buffer.id(), id);
        assert_eq!(buffer.version(), 1);
        assert!(registry.take_retired().is_empty());
    }

    #[test]
    fn test_count_change_reallocates() {
        let mut registry = BufferRegistry::new();
        let mut buffer = GeometryBuffer::<u32>::with_len(&mut registry, 3);
        let old = buffer.id();

        let (update, slot) = buffer.write(&mut registry, 5);
        assert_eq!(update, BufferUpdate::Reallocated);
        assert_eq!(slot.len(), 5);
        assert_ne!(buffer.id(), old);
        assert_eq!(registry.take_retired(), vec![old]);
        assert_eq!(registry.live(), 1);

        buffer.release(&mut registry);
        assert_eq!(registry.live(), 0);
    }
}
