//! Descriptor extraction (the "C5" pass): one indirectly dispatched
//! workgroup per keypoint, writing either the float or quantized variant
//! selected at [`crate::Detector`] construction.

use bytemuck::cast_slice;
use wgpu::util::DeviceExt;

use crate::descriptor::{GpuDescriptorFloatRecord, GpuDescriptorQuantizedRecord};
use crate::error::Result;
use crate::gpu::pipeline_cache::{ComputePipelineKey, PipelineLayoutKey};
use crate::gpu::shader_lib::BuiltinShader;
use crate::gpu::GpuContext;
use crate::keypoint::IndirectDispatchRecord;
use crate::pyramid::Octave;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct DescriptorParams {
    logical_width: u32,
    logical_height: u32,
    octave: u32,
    _pad: u32,
}

pub struct DescriptorExtractor {
    bgl: wgpu::BindGroupLayout,
}

impl DescriptorExtractor {
    pub fn new(device: &wgpu::Device) -> Self {
        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("descriptor_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        multisampled: false,
                    },
                    count: None,
                },
                storage_entry(1, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Uniform, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
                storage_entry(3, false),
                storage_entry(4, false),
            ],
        });
        DescriptorExtractor { bgl }
    }

    pub fn alloc_float_buffer(device: &wgpu::Device, capacity: u32) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("descriptor_float_buffer"),
            size: GpuDescriptorFloatRecord::SIZE * capacity.max(1) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    pub fn alloc_quantized_buffer(device: &wgpu::Device, capacity: u32) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("descriptor_quantized_buffer"),
            size: GpuDescriptorQuantizedRecord::SIZE * capacity.max(1) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    /// Records an indirect dispatch of `entry_point` ("main_float" or
    /// "main_quantized") over `keypoints`. Both output buffers must be
    /// bound even when only one variant is in use — the unused one is
    /// simply never written by the chosen entry point.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        ctx: &mut GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        entry_point: &'static str,
        octave_index: u32,
        octave: &Octave,
        keypoints: &wgpu::Buffer,
        float_out: &wgpu::Buffer,
        quantized_out: &wgpu::Buffer,
        dispatch_buffer: &wgpu::Buffer,
    ) -> Result<()> {
        let (hash, _) = ctx.pipelines.get_or_create_shader_module(
            &ctx.device,
            BuiltinShader::Descriptor.wgsl(),
            Some("descriptor"),
        );
        let key = ComputePipelineKey {
            shader: hash,
            entry_point,
            layout: PipelineLayoutKey(40),
        };
        let bgl = &self.bgl;
        let pipeline = ctx
            .pipelines
            .get_or_create_compute_pipeline(&ctx.device, key, |device, module| {
                let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("descriptor_layout"),
                    bind_group_layouts: &[bgl],
                    push_constant_ranges: &[],
                });
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("descriptor_pipeline"),
                    layout: Some(&layout),
                    module,
                    entry_point,
                    compilation_options: Default::default(),
                    cache: None,
                })
            })?;

        let params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("descriptor_params"),
            contents: cast_slice(&[DescriptorParams {
                logical_width: octave.logical_width,
                logical_height: octave.logical_height,
                octave: octave_index,
                _pad: 0,
            }]),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let array_view = octave.gaussian_array.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("descriptor_bind_group"),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&array_view) },
                wgpu::BindGroupEntry { binding: 1, resource: keypoints.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: float_out.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: quantized_out.as_entire_binding() },
            ],
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("descriptor"),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups_indirect(dispatch_buffer, IndirectDispatchRecord::DESCRIPTOR_OFFSET);
        Ok(())
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
