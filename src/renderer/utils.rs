use crate::error::RendererError;

pub const fn align_to_256(n: usize) -> usize {
    (n + 255) & !255
}

/// Rounds up to `wgpu::COPY_BUFFER_ALIGNMENT`.
pub fn align_to_copy(n: u64) -> u64 {
    let align = wgpu::COPY_BUFFER_ALIGNMENT;
    n.div_ceil(align).max(1) * align
}

/// Compiles WGSL inside a validation error scope so a bad shader surfaces as an error.
pub fn create_shader_module(
    device: &wgpu::Device,
    label: &str,
    source: &str,
) -> Result<wgpu::ShaderModule, RendererError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    device.poll(wgpu::Maintain::Wait);
    match pollster::block_on(device.pop_error_scope()) {
        Some(e) => Err(RendererError::Shader {
            label: label.to_string(),
            message: e.to_string(),
        }),
        None => Ok(shader),
    }
}
