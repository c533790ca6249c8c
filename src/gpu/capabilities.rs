//! Device capability snapshot, grounded on `aero-gpu`'s `GpuCapabilities`
//! (queried once per device, then consulted by the pipeline cache to gate
//! feature use rather than letting `wgpu` panic on an unsupported call).

/// Backend the device was created against. Only `WebGpu`/`Native` matter
/// here; `aero-gpu` also distinguishes a WebGL2 fallback, which this crate
/// does not target (compute shaders require WebGPU or a native backend).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuBackendKind {
    Native,
    WebGpu,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuCapabilities {
    pub backend: GpuBackendKind,
    pub supports_compute: bool,
    pub supports_timestamp_queries: bool,
    pub max_compute_workgroups_per_dimension: u32,
    pub max_storage_buffer_binding_size: u32,
}

impl GpuCapabilities {
    pub fn from_device(device: &wgpu::Device) -> Self {
        let limits = device.limits();
        let features = device.features();
        GpuCapabilities {
            backend: GpuBackendKind::Native,
            supports_compute: limits.max_compute_workgroups_per_dimension > 0,
            supports_timestamp_queries: features.contains(wgpu::Features::TIMESTAMP_QUERY),
            max_compute_workgroups_per_dimension: limits.max_compute_workgroups_per_dimension,
            max_storage_buffer_binding_size: limits.max_storage_buffer_binding_size,
        }
    }

    pub fn supports_timestamp_queries(&self) -> bool {
        self.supports_timestamp_queries
    }
}
