use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::registry::{MaterialHandle, ResourceCache, _Material};

/// Pipeline-facing state shared by every renderable drawn the same way.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    pub transparent: bool,
    /// Pixels, only meaningful for point topology.
    pub point_size: f32,
    /// Depth testing is skipped for overlays.
    pub depth_test: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            transparent: false,
            point_size: 1.0,
            depth_test: true,
        }
    }
}

impl Material {
    /// Stable hash of the material parameters, used as the cache key.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.transparent.hash(&mut hasher);
        self.point_size.to_bits().hash(&mut hasher);
        self.depth_test.hash(&mut hasher);
        hasher.finish()
    }
}

pub type MaterialCache = ResourceCache<_Material, Material>;

impl MaterialCache {
    pub fn acquire_material(&mut self, material: Material) -> MaterialHandle {
        self.acquire(material.fingerprint(), || material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_materials_share_entry() {
        let mut cache = MaterialCache::new();
        let opaque = Material::default();
        let faded = Material {
            transparent: true,
            ..Material::default()
        };

        let a = cache.acquire_material(opaque);
        let b = cache.acquire_material(Material::default());
        let c = cache.acquire_material(faded);
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!(cache.len(), 2);

        for handle in [a, b, c] {
            cache.release(handle);
        }
        assert!(cache.is_empty());
    }
}
