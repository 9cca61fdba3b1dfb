use std::{collections::HashMap, fmt, marker::PhantomData};

use generational_arena::{Arena, Index};

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum ResourceKind {
    Material,
    Mesh,
}

pub trait ResourceTag {
    const KIND: ResourceKind;
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct _Material;
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct _Mesh;

impl ResourceTag for _Material {
    const KIND: ResourceKind = ResourceKind::Material;
}
impl ResourceTag for _Mesh {
    const KIND: ResourceKind = ResourceKind::Mesh;
}

/// Non-owning reference to a cache entry, the entry is not guaranteed to be present
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct HandleId<T: ResourceTag> {
    idx: Index,
    _marker: PhantomData<T>,
}

impl<T: ResourceTag> fmt::Debug for HandleId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{:?}", T::KIND, self.idx.into_raw_parts())
    }
}

/// Counted reference to a cache entry. Not `Clone`: every handle comes from one
/// `acquire` and goes back through one `release`.
#[derive(Debug, PartialEq, Eq)]
pub struct Handle<T: ResourceTag> {
    idx: Index,
    _marker: PhantomData<T>,
}

impl<T: ResourceTag> Handle<T> {
    pub fn id(&self) -> HandleId<T> {
        HandleId {
            idx: self.idx,
            _marker: PhantomData,
        }
    }
}

pub type MaterialHandle = Handle<_Material>;
pub type MeshHandle = Handle<_Mesh>;
pub type MaterialId = HandleId<_Material>;
pub type MeshId = HandleId<_Mesh>;

struct Entry<V> {
    ref_count: u32,
    fingerprint: u64,
    value: V,
}

/// Reference-counted values shared by configuration identity.
pub struct ResourceCache<T: ResourceTag, V> {
    entries: Arena<Entry<V>>,
    by_fingerprint: HashMap<u64, Index>,
    _marker: PhantomData<T>,
}

impl<T: ResourceTag, V> Default for ResourceCache<T, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ResourceTag, V> ResourceCache<T, V> {
    pub fn new() -> Self {
        Self {
            entries: Arena::new(),
            by_fingerprint: HashMap::new(),
            _marker: PhantomData,
        }
    }

    /// Returns a handle to the entry for `fingerprint`, creating it with `create` if absent.
    pub fn acquire(&mut self, fingerprint: u64, create: impl FnOnce() -> V) -> Handle<T> {
        let idx = match self.by_fingerprint.get(&fingerprint) {
            Some(&idx) => idx,
            None => {
                let idx = self.entries.insert(Entry {
                    ref_count: 0,
                    fingerprint,
                    value: create(),
                });
                self.by_fingerprint.insert(fingerprint, idx);
                log::debug!("{:?} {:016x} created", T::KIND, fingerprint);
                idx
            }
        };
        if let Some(entry) = self.entries.get_mut(idx) {
            entry.ref_count += 1;
        }
        Handle {
            idx,
            _marker: PhantomData,
        }
    }

    /// Drops one reference. The value is removed and returned when the last one goes.
    pub fn release(&mut self, handle: Handle<T>) -> Option<V> {
        let entry = self.entries.get_mut(handle.idx)?;
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count > 0 {
            return None;
        }
        let entry = self.entries.remove(handle.idx)?;
        self.by_fingerprint.remove(&entry.fingerprint);
        log::debug!("{:?} {:016x} released", T::KIND, entry.fingerprint);
        Some(entry.value)
    }

    pub fn get(&self, handle: &Handle<T>) -> Option<&V> {
        self.entries.get(handle.idx).map(|e| &e.value)
    }

    pub fn get_id(&self, id: HandleId<T>) -> Option<&V> {
        self.entries.get(id.idx).map(|e| &e.value)
    }

    pub fn ref_count(&self, fingerprint: u64) -> u32 {
        self.by_fingerprint
            .get(&fingerprint)
            .and_then(|idx| self.entries.get(*idx))
            .map(|e| e.ref_count)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_by_fingerprint() {
        let mut cache: ResourceCache<_Material, &str> = ResourceCache::new();
        let a = cache.acquire(7, || "red");
        let b = cache.acquire(7, || panic!("entry should be reused"));
        assert_eq!(a.id(), b.id());
        assert_eq!(cache.ref_count(7), 2);
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.release(a), None);
        assert_eq!(cache.ref_count(7), 1);
        assert_eq!(cache.release(b), Some("red"));
        assert!(cache.is_empty());
        assert_eq!(cache.ref_count(7), 0);
    }

    #[test]
    fn test_released_id_is_not_reused() {
        let mut cache: ResourceCache<_Mesh, u32> = ResourceCache::new();
        let first = cache.acquire(1, || 10);
        let stale = first.id();
        cache.release(first);

        let second = cache.acquire(1, || 20);
        assert_ne!(stale, second.id());
        assert_eq!(cache.get_id(stale), None);
        assert_eq!(cache.get(&second), Some(&20));
    }
}
