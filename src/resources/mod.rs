mod buffers;
mod material;
mod mesh;
mod registry;

pub use buffers::{BufferId, BufferRegistry, BufferUpdate, GeometryBuffer};
pub use material::{Material, MaterialCache};
pub use mesh::{GpuMesh, MeshCache, MeshData, MeshKey};
pub use registry::{
    Handle, HandleId, MaterialHandle, MaterialId, MeshHandle, MeshId, ResourceCache,
    ResourceKind, ResourceTag,
};

/// Shared caches handed to every renderable collection.
#[derive(Default)]
pub struct SceneResources {
    pub buffers: BufferRegistry,
    pub materials: MaterialCache,
    pub meshes: MeshCache,
}

impl SceneResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire_mesh(&mut self, key: MeshKey) -> MeshHandle {
        self.meshes.acquire_mesh(key, &mut self.buffers)
    }

    pub fn release_mesh(&mut self, handle: MeshHandle) {
        self.meshes.release_mesh(handle, &mut self.buffers);
    }

    /// True once every cached resource and buffer has been released.
    pub fn is_drained(&self) -> bool {
        self.materials.is_empty() && self.meshes.is_empty() && self.buffers.live() == 0
    }
}
