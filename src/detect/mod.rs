//! Scale-space extremum detection (the "C3" pass): dispatches the
//! extremum shader over every middle DoG scale of an octave, appending
//! surviving keypoints into a per-octave GPU buffer.

use bytemuck::cast_slice;
use wgpu::util::DeviceExt;

use crate::error::Result;
use crate::gpu::pipeline_cache::{ComputePipelineKey, PipelineLayoutKey};
use crate::gpu::shader_lib::BuiltinShader;
use crate::gpu::GpuContext;
use crate::keypoint::{AppendBufferHeader, GpuKeypointRecord};
use crate::options::SiftOptions;
use crate::pyramid::Octave;

/// Which extremum entry point to dispatch. Chosen once per [`crate::Detector`]
/// construction, not swapped mid-run: `Packed` aggregates candidates into
/// workgroup-shared memory before a single atomic reservation per
/// workgroup, trading shared memory for less atomic contention under dense
/// keypoint fields; `Default` does one atomic append per candidate and is
/// simpler to reason about on sparse images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtremumVariant {
    Default,
    Packed,
}

impl ExtremumVariant {
    fn entry_point(self) -> &'static str {
        match self {
            ExtremumVariant::Default => "main_default",
            ExtremumVariant::Packed => "main_packed",
        }
    }
}

/// A per-octave append buffer: header (atomic count) followed immediately
/// by `capacity` keypoint records.
pub struct AppendBuffer {
    pub header: wgpu::Buffer,
    pub records: wgpu::Buffer,
    pub capacity: u32,
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ExtremumParams {
    packed_width: u32,
    packed_height: u32,
    logical_width: u32,
    logical_height: u32,
    octave: u32,
    scale_index: u32,
    scales_per_octave: u32,
    capacity: u32,
    contrast_threshold: f32,
    edge_threshold: f32,
    sigma_base: f32,
    _pad: f32,
}

pub struct ExtremumDetector {
    variant: ExtremumVariant,
    bgl: wgpu::BindGroupLayout,
}

impl ExtremumDetector {
    pub fn new(device: &wgpu::Device, variant: ExtremumVariant) -> Self {
        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("extremum_bgl"),
            entries: &[
                texture2d_entry(0),
                texture2d_entry(1),
                texture2d_entry(2),
                uniform_entry(3),
                storage_entry(4, false),
                storage_entry(5, false),
            ],
        });
        ExtremumDetector { variant, bgl }
    }

    pub fn alloc_append_buffer(device: &wgpu::Device, octave: u32, capacity: u32) -> AppendBuffer {
        let header = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("append_header_o{octave}")),
            contents: cast_slice(&[AppendBufferHeader { count: 0, _pad: [0; 3] }]),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        });
        let records = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("append_records_o{octave}")),
            size: GpuKeypointRecord::SIZE * capacity.max(1) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        AppendBuffer { header, records, capacity }
    }

    /// Records one extremum dispatch per middle DoG scale (`1..=scales_per_octave`).
    pub fn record(
        &self,
        ctx: &mut GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        options: &SiftOptions,
        octave_index: u32,
        octave: &Octave,
        append: &AppendBuffer,
    ) -> Result<()> {
        let (hash, _) = ctx.pipelines.get_or_create_shader_module(
            &ctx.device,
            BuiltinShader::Extremum.wgsl(),
            Some("extremum"),
        );
        let entry_point = self.variant.entry_point();

        for s in 1..=options.scales_per_octave {
            let params = ExtremumParams {
                packed_width: octave.packed_width,
                packed_height: octave.packed_height,
                logical_width: octave.logical_width,
                logical_height: octave.logical_height,
                octave: octave_index,
                scale_index: s,
                scales_per_octave: options.scales_per_octave,
                capacity: append.capacity,
                contrast_threshold: options.contrast_threshold,
                edge_threshold: options.edge_threshold,
                sigma_base: options.sigma_base,
                _pad: 0.0,
            };
            let params_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("extremum_params"),
                contents: cast_slice(&[params]),
                usage: wgpu::BufferUsages::UNIFORM,
            });

            let key = ComputePipelineKey {
                shader: hash,
                entry_point,
                layout: PipelineLayoutKey(20),
            };
            let bgl = &self.bgl;
            let pipeline = ctx
                .pipelines
                .get_or_create_compute_pipeline(&ctx.device, key, |device, module| {
                    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                        label: Some("extremum_layout"),
                        bind_group_layouts: &[bgl],
                        push_constant_ranges: &[],
                    });
                    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                        label: Some("extremum_pipeline"),
                        layout: Some(&layout),
                        module,
                        entry_point,
                        compilation_options: Default::default(),
                        cache: None,
                    })
                })?;

            let prev_view = octave.dog[(s - 1) as usize].create_view(&wgpu::TextureViewDescriptor::default());
            let curr_view = octave.dog[s as usize].create_view(&wgpu::TextureViewDescriptor::default());
            let next_view = octave.dog[(s + 1) as usize].create_view(&wgpu::TextureViewDescriptor::default());

            let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("extremum_bind_group"),
                layout: &self.bgl,
                entries: &[
                    wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&prev_view) },
                    wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&curr_view) },
                    wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(&next_view) },
                    wgpu::BindGroupEntry { binding: 3, resource: params_buffer.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 4, resource: append.header.as_entire_binding() },
                    wgpu::BindGroupEntry { binding: 5, resource: append.records.as_entire_binding() },
                ],
            });

            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("extremum"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let wg_x = (octave.packed_width + 7) / 8;
            let wg_y = (octave.packed_height + 7) / 8;
            pass.dispatch_workgroups(wg_x.max(1), wg_y.max(1), 1);
        }

        Ok(())
    }
}

fn texture2d_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
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

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Storage { read_only }, has_dynamic_offset: false, min_binding_size: None },
        count: None,
    }
}
