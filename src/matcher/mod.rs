//! Brute-force descriptor matching: plain (float), quantized, and
//! epipolar-guided variants share one shader module and one result layout
//! (see `src/gpu/shaders/matcher.wgsl`); Lowe's ratio test is applied
//! host-side against the raw best/second-best distances each variant
//! writes.

use bytemuck::cast_slice;
use wgpu::util::DeviceExt;

use crate::descriptor::{GpuMatchResult, Match};
use crate::error::Result;
use crate::gpu::pipeline_cache::{ComputePipelineKey, PipelineLayoutKey};
use crate::gpu::shader_lib::BuiltinShader;
use crate::gpu::GpuContext;
use crate::readback::{readback_buffer, StagingRing};

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct MatchParams {
    num_queries: u32,
    num_train: u32,
    _pad0: u32,
    _pad1: u32,
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct GuidedParams {
    num_queries: u32,
    num_train: u32,
    epipolar_threshold: f32,
    _pad: u32,
    // mat3x3<f32> in WGSL is laid out as three vec4-aligned columns.
    fundamental: [[f32; 4]; 3],
}

/// A row-major 3x3 fundamental matrix, uploaded for the guided variant.
pub type FundamentalMatrix = [[f32; 3]; 3];

fn guided_params_layout(num_queries: u32, num_train: u32, epipolar_threshold: f32, f: FundamentalMatrix) -> GuidedParams {
    let mut fundamental = [[0.0f32; 4]; 3];
    for col in 0..3 {
        for row in 0..3 {
            fundamental[col][row] = f[row][col];
        }
    }
    GuidedParams {
        num_queries,
        num_train,
        epipolar_threshold,
        _pad: 0,
        fundamental,
    }
}

pub struct DescriptorMatcher;

impl DescriptorMatcher {
    /// Matches `query` against `train` (both flattened `128 * count` f32
    /// arrays) and returns matches accepted by Lowe's ratio test.
    pub fn match_plain(
        ctx: &mut GpuContext,
        query: &[f32],
        train: &[f32],
        ratio: f32,
    ) -> Result<Vec<Match>> {
        let num_queries = (query.len() / 128) as u32;
        let num_train = (train.len() / 128) as u32;
        let results = Self::run_plain(ctx, query, train, num_queries, num_train)?;
        Ok(accept_matches(&results, ratio))
    }

    pub fn match_quantized(
        ctx: &mut GpuContext,
        query: &[u8],
        train: &[u8],
        ratio: f32,
    ) -> Result<Vec<Match>> {
        let num_queries = (query.len() / 128) as u32;
        let num_train = (train.len() / 128) as u32;
        let results = Self::run_quantized(ctx, query, train, num_queries, num_train)?;
        Ok(accept_matches(&results, ratio))
    }

    pub fn match_guided(
        ctx: &mut GpuContext,
        query: &[f32],
        train: &[f32],
        query_points: &[[f32; 2]],
        train_points: &[[f32; 2]],
        fundamental: FundamentalMatrix,
        epipolar_threshold: f32,
        ratio: f32,
    ) -> Result<Vec<Match>> {
        let num_queries = (query.len() / 128) as u32;
        let num_train = (train.len() / 128) as u32;
        let results = Self::run_guided(
            ctx,
            query,
            train,
            query_points,
            train_points,
            fundamental,
            epipolar_threshold,
            num_queries,
            num_train,
        )?;
        Ok(accept_matches(&results, ratio))
    }

    fn run_plain(ctx: &mut GpuContext, query: &[f32], train: &[f32], num_queries: u32, num_train: u32) -> Result<Vec<GpuMatchResult>> {
        let (hash, _) = ctx.pipelines.get_or_create_shader_module(&ctx.device, BuiltinShader::Matcher.wgsl(), Some("matcher"));
        let bgl = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("matcher_plain_bgl"),
            entries: &[storage_entry(0, true), storage_entry(1, true), storage_entry(2, false), uniform_entry(3)],
        });
        let key = ComputePipelineKey { shader: hash, entry_point: "main_plain", layout: PipelineLayoutKey(50) };
        let bgl_ref = &bgl;
        let pipeline = ctx.pipelines.get_or_create_compute_pipeline(&ctx.device, key, |device, module| {
            build_pipeline(device, module, bgl_ref, "main_plain", "matcher_plain")
        })?;

        let query_buf = upload(&ctx.device, "matcher_query", query);
        let train_buf = upload(&ctx.device, "matcher_train", train);
        let results_buf = result_buffer(&ctx.device, num_queries);
        let params_buf = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("matcher_plain_params"),
            contents: cast_slice(&[MatchParams { num_queries, num_train, _pad0: 0, _pad1: 0 }]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("matcher_plain_bind_group"),
            layout: &bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: query_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: train_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: results_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: params_buf.as_entire_binding() },
            ],
        });

        dispatch_match(ctx, pipeline, &bind_group, num_queries, "matcher_plain");
        read_results(ctx, &results_buf, num_queries)
    }

    fn run_quantized(ctx: &mut GpuContext, query: &[u8], train: &[u8], num_queries: u32, num_train: u32) -> Result<Vec<GpuMatchResult>> {
        let (hash, _) = ctx.pipelines.get_or_create_shader_module(&ctx.device, BuiltinShader::Matcher.wgsl(), Some("matcher"));
        let bgl = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("matcher_quantized_bgl"),
            entries: &[storage_entry(4, true), storage_entry(5, true), storage_entry(6, false), uniform_entry(7)],
        });
        let key = ComputePipelineKey { shader: hash, entry_point: "main_quantized", layout: PipelineLayoutKey(51) };
        let bgl_ref = &bgl;
        let pipeline = ctx.pipelines.get_or_create_compute_pipeline(&ctx.device, key, |device, module| {
            build_pipeline(device, module, bgl_ref, "main_quantized", "matcher_quantized")
        })?;

        let query_words: Vec<u32> = query.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
        let train_words: Vec<u32> = train.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
        let query_buf = upload(&ctx.device, "matcher_query_q", &query_words);
        let train_buf = upload(&ctx.device, "matcher_train_q", &train_words);
        let results_buf = result_buffer(&ctx.device, num_queries);
        let params_buf = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("matcher_quantized_params"),
            contents: cast_slice(&[MatchParams { num_queries, num_train, _pad0: 0, _pad1: 0 }]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("matcher_quantized_bind_group"),
            layout: &bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 4, resource: query_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 5, resource: train_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 6, resource: results_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 7, resource: params_buf.as_entire_binding() },
            ],
        });

        dispatch_match(ctx, pipeline, &bind_group, num_queries, "matcher_quantized");
        read_results(ctx, &results_buf, num_queries)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_guided(
        ctx: &mut GpuContext,
        query: &[f32],
        train: &[f32],
        query_points: &[[f32; 2]],
        train_points: &[[f32; 2]],
        fundamental: FundamentalMatrix,
        epipolar_threshold: f32,
        num_queries: u32,
        num_train: u32,
    ) -> Result<Vec<GpuMatchResult>> {
        let (hash, _) = ctx.pipelines.get_or_create_shader_module(&ctx.device, BuiltinShader::Matcher.wgsl(), Some("matcher"));
        let bgl = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("matcher_guided_bgl"),
            entries: &[
                storage_entry(8, true),
                storage_entry(9, true),
                storage_entry(10, true),
                storage_entry(11, true),
                storage_entry(12, false),
                uniform_entry(13),
            ],
        });
        let key = ComputePipelineKey { shader: hash, entry_point: "main_guided", layout: PipelineLayoutKey(52) };
        let bgl_ref = &bgl;
        let pipeline = ctx.pipelines.get_or_create_compute_pipeline(&ctx.device, key, |device, module| {
            build_pipeline(device, module, bgl_ref, "main_guided", "matcher_guided")
        })?;

        let query_buf = upload(&ctx.device, "matcher_guided_query", query);
        let train_buf = upload(&ctx.device, "matcher_guided_train", train);
        let query_points_buf = upload(&ctx.device, "matcher_guided_query_points", query_points);
        let train_points_buf = upload(&ctx.device, "matcher_guided_train_points", train_points);
        let results_buf = result_buffer(&ctx.device, num_queries);
        let params_buf = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("matcher_guided_params"),
            contents: cast_slice(&[guided_params_layout(num_queries, num_train, epipolar_threshold, fundamental)]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("matcher_guided_bind_group"),
            layout: &bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 8, resource: query_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 9, resource: train_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 10, resource: query_points_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 11, resource: train_points_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 12, resource: results_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 13, resource: params_buf.as_entire_binding() },
            ],
        });

        dispatch_match(ctx, pipeline, &bind_group, num_queries, "matcher_guided");
        read_results(ctx, &results_buf, num_queries)
    }
}

fn accept_matches(results: &[GpuMatchResult], ratio: f32) -> Vec<Match> {
    results
        .iter()
        .enumerate()
        .filter(|(_, r)| r.accept(ratio))
        .map(|(query_index, r)| Match {
            query_index: query_index as u32,
            train_index: r.best_index as u32,
            distance: r.best_distance2.sqrt(),
        })
        .collect()
}

fn upload<T: bytemuck::Pod>(device: &wgpu::Device, label: &str, data: &[T]) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: cast_slice(data),
        usage: wgpu::BufferUsages::STORAGE,
    })
}

fn result_buffer(device: &wgpu::Device, num_queries: u32) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("matcher_results"),
        size: GpuMatchResult::SIZE * num_queries.max(1) as u64,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    })
}

fn build_pipeline(
    device: &wgpu::Device,
    module: &wgpu::ShaderModule,
    bgl: &wgpu::BindGroupLayout,
    entry_point: &'static str,
    label: &str,
) -> wgpu::ComputePipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[bgl],
        push_constant_ranges: &[],
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        module,
        entry_point,
        compilation_options: Default::default(),
        cache: None,
    })
}

fn dispatch_match(ctx: &GpuContext, pipeline: &wgpu::ComputePipeline, bind_group: &wgpu::BindGroup, num_queries: u32, label: &str) {
    let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor { label: Some(label), timestamp_writes: None });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups((num_queries + 63) / 64, 1, 1);
    }
    ctx.queue.submit(Some(encoder.finish()));
}

fn read_results(ctx: &GpuContext, results_buf: &wgpu::Buffer, num_queries: u32) -> Result<Vec<GpuMatchResult>> {
    let size = GpuMatchResult::SIZE * num_queries.max(1) as u64;
    let mut ring = StagingRing::new(&ctx.device, size, crate::readback::MIN_STAGING_SLOTS);
    let staging = ring.acquire().clone();
    let bytes = readback_buffer(&ctx.device, &ctx.queue, results_buf, &staging, size)?;
    Ok(bytemuck::cast_slice(&bytes)[..num_queries as usize].to_vec())
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Storage { read_only }, has_dynamic_offset: false, min_binding_size: None },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Uniform, has_dynamic_offset: false, min_binding_size: None },
        count: None,
    }
}
