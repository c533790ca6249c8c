//! GPU device acquisition and the resource manager shared by every pass.

pub mod capabilities;
pub mod kernel_cache;
pub mod pipeline_cache;
pub mod shader_lib;

use crate::error::{Result, SiftError};
use capabilities::GpuCapabilities;
use kernel_cache::KernelCache;
use pipeline_cache::{PipelineCache, PipelineCacheConfig};

/// Owns the `wgpu` device/queue and the caches every compute pass draws on.
///
/// Construction tries a high-performance adapter first and falls back to
/// low-power (or any available adapter) rather than failing outright --
/// headless CI runners frequently expose only a software adapter.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub capabilities: GpuCapabilities,
    pub pipelines: PipelineCache,
    pub kernels: KernelCache,
}

impl GpuContext {
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = Self::request_adapter(&instance).await?;
        tracing::info!(adapter = ?adapter.get_info(), "acquired gpu adapter");

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("sift-gpu-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| SiftError::unavailable(format!("request_device failed: {e}")))?;

        let capabilities = GpuCapabilities::from_device(&device);
        if !capabilities.supports_compute {
            return Err(SiftError::unavailable(
                "device reports zero compute workgroups per dimension",
            ));
        }

        Ok(GpuContext {
            device,
            queue,
            capabilities,
            pipelines: PipelineCache::new(PipelineCacheConfig::default(), capabilities),
            kernels: KernelCache::new(),
        })
    }

    async fn request_adapter(instance: &wgpu::Instance) -> Result<wgpu::Adapter> {
        let high_performance = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await;
        if let Some(adapter) = high_performance {
            return Ok(adapter);
        }

        tracing::warn!("no high-performance adapter; falling back to low-power");
        let low_power = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await;
        low_power.ok_or_else(|| SiftError::unavailable("no wgpu adapter available"))
    }
}
