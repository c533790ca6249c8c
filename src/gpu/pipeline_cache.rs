//! Compute pipeline cache keyed by shader source hash and bind-group layout
//! identity, grounded on `aero-gpu`'s `pipeline_cache`/`pipeline_key` modules
//! (see `aero-gpu/tests/pipeline_cache_integration.rs`): shader modules are
//! cached by content hash so identical WGSL text compiles once, and
//! pipelines are cached by a small `Key` struct so repeated
//! `get_or_create_*` calls with the same key return the same handle instead
//! of recompiling.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::error::{Result, SiftError};
use crate::gpu::capabilities::GpuCapabilities;

/// Identifies a bind group layout by a caller-assigned opaque id rather than
/// by structural comparison of `wgpu::BindGroupLayoutEntry` — cheap to hash
/// and sufficient because this crate creates each layout exactly once per
/// shader stage at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineLayoutKey(pub u64);

impl PipelineLayoutKey {
    pub const fn empty() -> Self {
        PipelineLayoutKey(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComputePipelineKey {
    pub shader: u64,
    pub entry_point: &'static str,
    pub layout: PipelineLayoutKey,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineCacheStats {
    pub shader_hits: u64,
    pub shader_misses: u64,
    pub compute_pipeline_hits: u64,
    pub compute_pipeline_misses: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineCacheConfig {
    /// Soft cap on distinct compute pipelines retained; the set of shaders
    /// this crate compiles is fixed and small (one per pass, per variant),
    /// so the default is generous and eviction should never trigger in
    /// practice.
    pub max_compute_pipelines: usize,
}

impl Default for PipelineCacheConfig {
    fn default() -> Self {
        PipelineCacheConfig {
            max_compute_pipelines: 64,
        }
    }
}

pub struct PipelineCache {
    config: PipelineCacheConfig,
    capabilities: GpuCapabilities,
    shaders: HashMap<u64, wgpu::ShaderModule>,
    compute_pipelines: HashMap<ComputePipelineKey, wgpu::ComputePipeline>,
    stats: PipelineCacheStats,
}

impl PipelineCache {
    pub fn new(config: PipelineCacheConfig, capabilities: GpuCapabilities) -> Self {
        PipelineCache {
            config,
            capabilities,
            shaders: HashMap::new(),
            compute_pipelines: HashMap::new(),
            stats: PipelineCacheStats::default(),
        }
    }

    pub fn stats(&self) -> PipelineCacheStats {
        self.stats
    }

    /// Returns the content hash and a reference to a compiled shader module,
    /// compiling it only on first sight of this exact source text.
    pub fn get_or_create_shader_module(
        &mut self,
        device: &wgpu::Device,
        source: &str,
        label: Option<&str>,
    ) -> (u64, &wgpu::ShaderModule) {
        let hash = xxhash_rust::xxh3::xxh3_64(source.as_bytes());
        if self.shaders.contains_key(&hash) {
            self.stats.shader_hits += 1;
        } else {
            self.stats.shader_misses += 1;
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label,
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
            });
            self.shaders.insert(hash, module);
        }
        (hash, self.shaders.get(&hash).expect("just inserted"))
    }

    /// Returns a cached compute pipeline for `key`, invoking `create` only
    /// on a miss. Fails with [`SiftError::Unavailable`] if the device does
    /// not support compute.
    pub fn get_or_create_compute_pipeline(
        &mut self,
        device: &wgpu::Device,
        key: ComputePipelineKey,
        create: impl FnOnce(&wgpu::Device, &wgpu::ShaderModule) -> wgpu::ComputePipeline,
    ) -> Result<&wgpu::ComputePipeline> {
        if !self.capabilities.supports_compute {
            return Err(SiftError::unavailable("device does not support compute shaders"));
        }
        if self.compute_pipelines.contains_key(&key) {
            self.stats.compute_pipeline_hits += 1;
        } else {
            self.stats.compute_pipeline_misses += 1;
            if self.compute_pipelines.len() >= self.config.max_compute_pipelines {
                tracing::warn!(
                    capacity = self.config.max_compute_pipelines,
                    "pipeline cache at capacity; evicting an arbitrary entry"
                );
                if let Some(evict_key) = self.compute_pipelines.keys().next().cloned() {
                    self.compute_pipelines.remove(&evict_key);
                }
            }
            let shader = self
                .shaders
                .get(&key.shader)
                .expect("shader module must be created before its pipeline");
            let pipeline = create(device, shader);
            self.compute_pipelines.insert(key.clone(), pipeline);
        }
        Ok(self.compute_pipelines.get(&key).expect("just inserted"))
    }
}
