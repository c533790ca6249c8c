//! GPU orchestration of the Gaussian/DoG scale-space pyramid: grayscale
//! packing, per-scale separable blur, octave decimation, and the
//! Difference-of-Gaussians subtraction that feeds extremum detection.

pub mod params;

use bytemuck::cast_slice;
use wgpu::util::DeviceExt;

use crate::error::Result;
use crate::formats::PixelFormat;
use crate::gpu::kernel_cache::KernelCache;
use crate::gpu::pipeline_cache::{ComputePipelineKey, PipelineLayoutKey};
use crate::gpu::shader_lib::BuiltinShader;
use crate::gpu::GpuContext;
use crate::options::SiftOptions;

const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// One octave's worth of Gaussian scale textures plus the DoG textures
/// derived from adjacent pairs of them.
pub struct Octave {
    pub logical_width: u32,
    pub logical_height: u32,
    pub packed_width: u32,
    pub packed_height: u32,
    pub gaussian: Vec<wgpu::Texture>,
    pub dog: Vec<wgpu::Texture>,
    /// All of `gaussian`'s scales aggregated into one array texture (layer
    /// = scale index), for the orientation/descriptor passes that index a
    /// scale dynamically via `texture_2d_array`.
    pub gaussian_array: wgpu::Texture,
}

fn array_texture(device: &wgpu::Device, label: &str, width: u32, height: u32, layers: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: layers.max(1),
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TEXTURE_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

pub struct Pyramid {
    pub octaves: Vec<Octave>,
}

struct PassParams {
    width: u32,
    height: u32,
}

fn uniform_buffer(device: &wgpu::Device, label: &str, params: PassParams) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: cast_slice(&[params.width, params.height]),
        usage: wgpu::BufferUsages::UNIFORM,
    })
}

fn storage_texture(device: &wgpu::Device, label: &str, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TEXTURE_FORMAT,
        usage: wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

impl Pyramid {
    /// Builds the full pyramid from an RGBA8 source image already uploaded
    /// into `source`, the dimensions of which are `(src_width, src_height)`.
    pub fn build(
        ctx: &mut GpuContext,
        options: &SiftOptions,
        source: &wgpu::Texture,
        src_width: u32,
        src_height: u32,
        _format: PixelFormat,
    ) -> Result<Pyramid> {
        let span = tracing::info_span!("pyramid_build", src_width, src_height);
        let _enter = span.enter();

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("pyramid_build"),
            });

        let mut octaves = Vec::with_capacity(options.num_octaves as usize);
        let mut prev_octave_top: Option<wgpu::Texture> = None;

        for o in 0..options.num_octaves {
            let (logical_width, logical_height) = params::octave_dims(src_width, src_height, o);
            let (packed_width, packed_height) = params::packed_dims(logical_width, logical_height);

            let gaussian_scales = options.gaussian_scales();
            let mut gaussian = Vec::with_capacity(gaussian_scales as usize);

            for s in 0..gaussian_scales {
                let tex = storage_texture(
                    &ctx.device,
                    &format!("gaussian_o{o}_s{s}"),
                    packed_width,
                    packed_height,
                );
                if o == 0 && s == 0 {
                    self_grayscale_pack(
                        ctx,
                        &mut encoder,
                        source,
                        &tex,
                        src_width,
                        src_height,
                    )?;
                } else if s == 0 {
                    let prev_top = prev_octave_top
                        .as_ref()
                        .expect("previous octave must have produced a top scale");
                    self_downsample(ctx, &mut encoder, prev_top, &tex, packed_width, packed_height)?;
                } else {
                    let sigma = params::incremental_sigma(options, s);
                    let radius = KernelCache::radius_for_sigma(sigma);
                    self_blur(
                        ctx,
                        &mut encoder,
                        &gaussian[(s - 1) as usize],
                        &tex,
                        packed_width,
                        packed_height,
                        sigma,
                        radius,
                    )?;
                }
                gaussian.push(tex);
            }

            let gaussian_array = array_texture(
                &ctx.device,
                &format!("gaussian_array_o{o}"),
                packed_width,
                packed_height,
                gaussian_scales,
            );
            for (s, tex) in gaussian.iter().enumerate() {
                encoder.copy_texture_to_texture(
                    wgpu::ImageCopyTexture {
                        texture: tex,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::ImageCopyTexture {
                        texture: &gaussian_array,
                        mip_level: 0,
                        origin: wgpu::Origin3d { x: 0, y: 0, z: s as u32 },
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::Extent3d { width: packed_width.max(1), height: packed_height.max(1), depth_or_array_layers: 1 },
                );
            }

            let dog_scales = options.dog_scales();
            let mut dog = Vec::with_capacity(dog_scales as usize);
            for s in 0..dog_scales {
                let tex = storage_texture(
                    &ctx.device,
                    &format!("dog_o{o}_s{s}"),
                    packed_width,
                    packed_height,
                );
                self_dog(
                    ctx,
                    &mut encoder,
                    &gaussian[(s + 1) as usize],
                    &gaussian[s as usize],
                    &tex,
                    packed_width,
                    packed_height,
                )?;
                dog.push(tex);
            }

            prev_octave_top = Some(gaussian[options.scales_per_octave as usize].clone_handle());
            octaves.push(Octave {
                logical_width,
                logical_height,
                packed_width,
                packed_height,
                gaussian,
                dog,
                gaussian_array,
            });
        }

        ctx.queue.submit(Some(encoder.finish()));
        Ok(Pyramid { octaves })
    }
}

/// `wgpu::Texture` is internally reference-counted; `clone()` is a cheap
/// handle copy, not a device-side duplicate. Named for clarity at call
/// sites where a real copy might otherwise be assumed.
trait CloneHandle {
    fn clone_handle(&self) -> Self;
}

impl CloneHandle for wgpu::Texture {
    fn clone_handle(&self) -> Self {
        self.clone()
    }
}

fn dispatch_2d(encoder: &mut wgpu::CommandEncoder, pipeline: &wgpu::ComputePipeline, bind_group: &wgpu::BindGroup, width: u32, height: u32, label: &str) {
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, &[]);
    let wg_x = (width + 7) / 8;
    let wg_y = (height + 7) / 8;
    pass.dispatch_workgroups(wg_x.max(1), wg_y.max(1), 1);
}

fn self_grayscale_pack(
    ctx: &mut GpuContext,
    encoder: &mut wgpu::CommandEncoder,
    source_rgba: &wgpu::Texture,
    dst_packed: &wgpu::Texture,
    src_width: u32,
    src_height: u32,
) -> Result<()> {
    let (hash, _) = ctx.pipelines.get_or_create_shader_module(
        &ctx.device,
        BuiltinShader::GrayscalePack.wgsl(),
        Some("grayscale_pack"),
    );

    let bgl = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("grayscale_pack_bgl"),
        entries: &[
            texture_entry(0, wgpu::TextureSampleType::Float { filterable: false }),
            storage_texture_entry(1),
            uniform_entry(2),
        ],
    });

    let key = ComputePipelineKey {
        shader: hash,
        entry_point: "main",
        layout: PipelineLayoutKey(1),
    };
    let pipeline = ctx.pipelines.get_or_create_compute_pipeline(&ctx.device, key, |device, module| {
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("grayscale_pack_layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("grayscale_pack_pipeline"),
            layout: Some(&layout),
            module,
            entry_point: "main",
            compilation_options: Default::default(),
            cache: None,
        })
    })?;

    let params = uniform_buffer(&ctx.device, "grayscale_pack_params", PassParams { width: src_width, height: src_height });
    let src_view = source_rgba.create_view(&wgpu::TextureViewDescriptor::default());
    let dst_view = dst_packed.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("grayscale_pack_bind_group"),
        layout: &bgl,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&src_view) },
            wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&dst_view) },
            wgpu::BindGroupEntry { binding: 2, resource: params.as_entire_binding() },
        ],
    });

    let (packed_w, packed_h) = params::packed_dims(src_width, src_height);
    dispatch_2d(encoder, pipeline, &bind_group, packed_w, packed_h, "grayscale_pack");
    Ok(())
}

fn self_blur(
    ctx: &mut GpuContext,
    encoder: &mut wgpu::CommandEncoder,
    src: &wgpu::Texture,
    dst: &wgpu::Texture,
    packed_width: u32,
    packed_height: u32,
    sigma: f32,
    radius: u32,
) -> Result<()> {
    let (hash, _) = ctx.pipelines.get_or_create_shader_module(
        &ctx.device,
        BuiltinShader::GaussianBlur.wgsl(),
        Some("gaussian_blur"),
    );

    let bgl = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("gaussian_blur_bgl"),
        entries: &[
            texture_entry(0, wgpu::TextureSampleType::Float { filterable: false }),
            storage_texture_entry(1),
            storage_buffer_entry(2, true),
            uniform_entry(3),
        ],
    });

    let intermediate = storage_texture(&ctx.device, "gaussian_blur_intermediate", packed_width, packed_height);

    let kernel_buffer = ctx.kernels.get_or_create(&ctx.device, &ctx.queue, sigma, radius);
    let blur_params = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("blur_params"),
        contents: cast_slice(&[packed_width, packed_height, radius, 0u32]),
        usage: wgpu::BufferUsages::UNIFORM,
    });

    for (pass_entry, src_tex, dst_tex, label) in [
        ("blur_horizontal", src, &intermediate, "gaussian_blur_h"),
        ("blur_vertical", &intermediate, dst, "gaussian_blur_v"),
    ] {
        let key = ComputePipelineKey {
            shader: hash,
            entry_point: pass_entry,
            layout: PipelineLayoutKey(2),
        };
        let pipeline = ctx.pipelines.get_or_create_compute_pipeline(&ctx.device, key, |device, module| {
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("gaussian_blur_layout"),
                bind_group_layouts: &[&bgl],
                push_constant_ranges: &[],
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                module,
                entry_point: pass_entry,
                compilation_options: Default::default(),
                cache: None,
            })
        })?;

        let src_view = src_tex.create_view(&wgpu::TextureViewDescriptor::default());
        let dst_view = dst_tex.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gaussian_blur_bind_group"),
            layout: &bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&src_view) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&dst_view) },
                wgpu::BindGroupEntry { binding: 2, resource: kernel_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: blur_params.as_entire_binding() },
            ],
        });

        // Horizontal pass tiles over x (workgroup_size(64,1,1)); vertical
        // pass tiles over y (workgroup_size(1,64,1)).
        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        cpass.set_pipeline(pipeline);
        cpass.set_bind_group(0, &bind_group, &[]);
        if pass_entry == "blur_horizontal" {
            cpass.dispatch_workgroups((packed_width + 63) / 64, packed_height.max(1), 1);
        } else {
            cpass.dispatch_workgroups(packed_width.max(1), (packed_height + 63) / 64, 1);
        }
    }

    Ok(())
}

fn self_downsample(
    ctx: &mut GpuContext,
    encoder: &mut wgpu::CommandEncoder,
    src: &wgpu::Texture,
    dst: &wgpu::Texture,
    dst_width: u32,
    dst_height: u32,
) -> Result<()> {
    let (hash, _) = ctx.pipelines.get_or_create_shader_module(
        &ctx.device,
        BuiltinShader::Downsample.wgsl(),
        Some("downsample"),
    );
    let bgl = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("downsample_bgl"),
        entries: &[
            texture_entry(0, wgpu::TextureSampleType::Float { filterable: false }),
            storage_texture_entry(1),
            uniform_entry(2),
        ],
    });
    let key = ComputePipelineKey { shader: hash, entry_point: "main", layout: PipelineLayoutKey(3) };
    let pipeline = ctx.pipelines.get_or_create_compute_pipeline(&ctx.device, key, |device, module| {
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("downsample_layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("downsample_pipeline"),
            layout: Some(&layout),
            module,
            entry_point: "main",
            compilation_options: Default::default(),
            cache: None,
        })
    })?;

    let params = uniform_buffer(&ctx.device, "downsample_params", PassParams { width: dst_width, height: dst_height });
    let src_view = src.create_view(&wgpu::TextureViewDescriptor::default());
    let dst_view = dst.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("downsample_bind_group"),
        layout: &bgl,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&src_view) },
            wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&dst_view) },
            wgpu::BindGroupEntry { binding: 2, resource: params.as_entire_binding() },
        ],
    });
    dispatch_2d(encoder, pipeline, &bind_group, dst_width, dst_height, "downsample");
    Ok(())
}

fn self_dog(
    ctx: &mut GpuContext,
    encoder: &mut wgpu::CommandEncoder,
    hi: &wgpu::Texture,
    lo: &wgpu::Texture,
    dst: &wgpu::Texture,
    width: u32,
    height: u32,
) -> Result<()> {
    let (hash, _) = ctx.pipelines.get_or_create_shader_module(&ctx.device, BuiltinShader::Dog.wgsl(), Some("dog"));
    let bgl = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("dog_bgl"),
        entries: &[
            texture_entry(0, wgpu::TextureSampleType::Float { filterable: false }),
            texture_entry(1, wgpu::TextureSampleType::Float { filterable: false }),
            storage_texture_entry(2),
            uniform_entry(3),
        ],
    });
    let key = ComputePipelineKey { shader: hash, entry_point: "main", layout: PipelineLayoutKey(4) };
    let pipeline = ctx.pipelines.get_or_create_compute_pipeline(&ctx.device, key, |device, module| {
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("dog_layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("dog_pipeline"),
            layout: Some(&layout),
            module,
            entry_point: "main",
            compilation_options: Default::default(),
            cache: None,
        })
    })?;

    let params = uniform_buffer(&ctx.device, "dog_params", PassParams { width, height });
    let hi_view = hi.create_view(&wgpu::TextureViewDescriptor::default());
    let lo_view = lo.create_view(&wgpu::TextureViewDescriptor::default());
    let dst_view = dst.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("dog_bind_group"),
        layout: &bgl,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&hi_view) },
            wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&lo_view) },
            wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(&dst_view) },
            wgpu::BindGroupEntry { binding: 3, resource: params.as_entire_binding() },
        ],
    });
    dispatch_2d(encoder, pipeline, &bind_group, width, height, "dog");
    Ok(())
}

fn texture_entry(binding: u32, sample_type: wgpu::TextureSampleType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture { sample_type, view_dimension: wgpu::TextureViewDimension::D2, multisampled: false },
        count: None,
    }
}

fn storage_texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: TEXTURE_FORMAT,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

fn storage_buffer_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
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
