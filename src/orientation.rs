//! Dominant-orientation assignment (the "C4" pass): one indirectly
//! dispatched workgroup per keypoint, updating `orientation` in place.

use bytemuck::cast_slice;
use wgpu::util::DeviceExt as _;

use crate::error::Result;
use crate::gpu::pipeline_cache::{ComputePipelineKey, PipelineLayoutKey};
use crate::gpu::shader_lib::BuiltinShader;
use crate::gpu::GpuContext;
use crate::keypoint::IndirectDispatchRecord;
use crate::pyramid::Octave;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct OrientationParams {
    logical_width: u32,
    logical_height: u32,
    octave: u32,
    _pad: u32,
}

pub struct OrientationAssigner {
    bgl: wgpu::BindGroupLayout,
}

impl OrientationAssigner {
    pub fn new(device: &wgpu::Device) -> Self {
        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("orientation_bgl"),
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
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer { ty: wgpu::BufferBindingType::Uniform, has_dynamic_offset: false, min_binding_size: None },
                    count: None,
                },
            ],
        });
        OrientationAssigner { bgl }
    }

    /// Records an indirect dispatch over `keypoints`, sized by
    /// `dispatch_buffer`'s `IndirectDispatchRecord::ORIENTATION_OFFSET` words.
    pub fn record(
        &self,
        ctx: &mut GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        octave_index: u32,
        octave: &Octave,
        keypoints: &wgpu::Buffer,
        dispatch_buffer: &wgpu::Buffer,
    ) -> Result<()> {
        let (hash, _) = ctx.pipelines.get_or_create_shader_module(
            &ctx.device,
            BuiltinShader::Orientation.wgsl(),
            Some("orientation"),
        );
        let key = ComputePipelineKey {
            shader: hash,
            entry_point: "main",
            layout: PipelineLayoutKey(30),
        };
        let bgl = &self.bgl;
        let pipeline = ctx
            .pipelines
            .get_or_create_compute_pipeline(&ctx.device, key, |device, module| {
                let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("orientation_layout"),
                    bind_group_layouts: &[bgl],
                    push_constant_ranges: &[],
                });
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("orientation_pipeline"),
                    layout: Some(&layout),
                    module,
                    entry_point: "main",
                    compilation_options: Default::default(),
                    cache: None,
                })
            })?;

        let params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("orientation_params"),
            contents: cast_slice(&[OrientationParams {
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
            label: Some("orientation_bind_group"),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&array_view) },
                wgpu::BindGroupEntry { binding: 1, resource: keypoints.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: params.as_entire_binding() },
            ],
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("orientation"),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups_indirect(dispatch_buffer, IndirectDispatchRecord::ORIENTATION_OFFSET);
        Ok(())
    }
}
