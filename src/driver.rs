//! Top-level orchestration: the public [`Detector`] ties the pyramid,
//! extremum detector, indirect-dispatch derivation, orientation assigner,
//! and descriptor extractor into `load_image`/`detect_keypoints`/
//! `detect_and_compute`/`compute_descriptors`.

use bytemuck::cast_slice;
use wgpu::util::DeviceExt as _;

use crate::descriptor::Descriptor;
use crate::descriptor_extractor::DescriptorExtractor;
use crate::detect::{ExtremumDetector, ExtremumVariant};
use crate::error::{Result, SiftError, Truncated};
use crate::formats::PixelFormat;
use crate::gpu::GpuContext;
use crate::indirect::{derive_cpu, IndirectDispatchPass};
use crate::keypoint::{AppendBufferHeader, GpuKeypointRecord, IndirectDispatchRecord, Keypoint};
use crate::options::SiftOptions;
use crate::orientation::OrientationAssigner;
use crate::pyramid::{Octave, Pyramid};
use crate::readback::{readback_buffer, StagingRing};

/// Non-fatal warnings returned alongside a successful detect call.
#[derive(Debug, Clone, Default)]
pub struct DetectWarnings {
    pub truncated: Option<Truncated>,
}

pub struct DetectResult {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
    pub warnings: DetectWarnings,
}

/// The image last uploaded via [`Detector::load_image`], together with the
/// pyramid built from it. Kept around so `compute_descriptors` and repeated
/// detect calls on the same frame reuse the pyramid rather than rebuilding.
struct LoadedImage {
    width: u32,
    height: u32,
    /// Multiplies detected coordinates/sigmas back to the dimensions of the
    /// buffer passed to `load_image`, undoing `max_image_dimension` downscale.
    scale_restore: f32,
    pyramid: Option<Pyramid>,
}

/// Owns a [`GpuContext`] and the per-pass pipelines, configured once at
/// construction from [`SiftOptions`].
pub struct Detector {
    ctx: GpuContext,
    options: SiftOptions,
    extremum: ExtremumDetector,
    indirect: IndirectDispatchPass,
    orientation: OrientationAssigner,
    descriptor: DescriptorExtractor,
    current: Option<LoadedImage>,
}

impl Detector {
    pub async fn new(options: SiftOptions) -> Result<Self> {
        options.validate()?;
        let ctx = GpuContext::new().await?;
        let extremum = ExtremumDetector::new(&ctx.device, ExtremumVariant::Default);
        let indirect = IndirectDispatchPass::new(&ctx.device);
        let orientation = OrientationAssigner::new(&ctx.device);
        let descriptor = DescriptorExtractor::new(&ctx.device);
        Ok(Detector {
            ctx,
            options,
            extremum,
            indirect,
            orientation,
            descriptor,
            current: None,
        })
    }

    pub fn options(&self) -> &SiftOptions {
        &self.options
    }

    /// Uploads a host pixel buffer as the current source image, expanding
    /// grayscale/RGB8 buffers to RGBA8 on the host first. When
    /// `max_image_dimension > 0` and `max(w, h)` exceeds it, the buffer is
    /// nearest-neighbor downscaled before upload and `scale_restore` is set
    /// to the inverse factor, applied to every coordinate and sigma returned
    /// by later detect/compute calls against this image.
    pub fn load_image(&mut self, pixels: &[u8], width: u32, height: u32, format: PixelFormat) -> Result<()> {
        if width.min(height) < 8 {
            return Err(SiftError::bad_config(format!(
                "image too small: {width}x{height}, minimum side is 8"
            )));
        }
        let rgba = expand_to_rgba8(pixels, width, height, format)?;

        let (upload_width, upload_height, scale_restore, rgba) = match self.options.max_image_dimension {
            0 => (width, height, 1.0, rgba),
            max_dim if width.max(height) > max_dim => {
                let (dw, dh) = downscaled_dims(width, height, max_dim);
                let resized = nearest_resize_rgba8(&rgba, width, height, dw, dh);
                let restore = width.max(height) as f32 / max_dim as f32;
                (dw, dh, restore, resized)
            }
            _ => (width, height, 1.0, rgba),
        };

        let texture = self.ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("source_rgba"),
            size: wgpu::Extent3d { width: upload_width, height: upload_height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.ctx.queue.write_texture(
            wgpu::ImageCopyTexture { texture: &texture, mip_level: 0, origin: wgpu::Origin3d::ZERO, aspect: wgpu::TextureAspect::All },
            &rgba,
            wgpu::ImageDataLayout { offset: 0, bytes_per_row: Some(4 * upload_width), rows_per_image: Some(upload_height) },
            wgpu::Extent3d { width: upload_width, height: upload_height, depth_or_array_layers: 1 },
        );

        let pyramid = Pyramid::build(&mut self.ctx, &self.options, &texture, upload_width, upload_height, PixelFormat::Rgba8)?;
        self.current = Some(LoadedImage {
            width: upload_width,
            height: upload_height,
            scale_restore,
            pyramid: Some(pyramid),
        });
        Ok(())
    }

    pub fn detect_keypoints(&mut self) -> Result<(Vec<Keypoint>, DetectWarnings)> {
        let ((keypoints, warnings), _descriptors) = self.run(false)?;
        Ok((keypoints, warnings))
    }

    pub fn detect_and_compute(&mut self) -> Result<DetectResult> {
        let ((keypoints, warnings), descriptors) = self.run(true)?;
        Ok(DetectResult { keypoints, descriptors, warnings })
    }

    /// Recomputes orientation and descriptors for caller-supplied keypoints
    /// against the pyramid of the last-loaded image, reusing it rather than
    /// rebuilding. Keypoints must carry coordinates in the same space
    /// `load_image` was last called with (i.e. already divided by
    /// `scale_restore` if the caller obtained them from a previous detect
    /// call on this image).
    pub fn compute_descriptors(&mut self, keypoints: &[Keypoint]) -> Result<Vec<(Keypoint, Descriptor)>> {
        let image = self
            .current
            .as_ref()
            .ok_or_else(|| SiftError::bad_config("compute_descriptors called before load_image"))?;
        let scale_restore = image.scale_restore;
        let pyramid = image
            .pyramid
            .as_ref()
            .ok_or_else(|| SiftError::bad_config("no pyramid cached for the current image"))?;

        let mut by_octave: Vec<Vec<(usize, Keypoint)>> = vec![Vec::new(); pyramid.octaves.len()];
        for (i, kp) in keypoints.iter().enumerate() {
            if let Some(bucket) = by_octave.get_mut(kp.octave as usize) {
                bucket.push((i, *kp));
            }
        }

        let mut out: Vec<Option<(Keypoint, Descriptor)>> = vec![None; keypoints.len()];
        for (octave_index, bucket) in by_octave.into_iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            let octave_index = octave_index as u32;
            let octave = &pyramid.octaves[octave_index as usize];
            let count = bucket.len() as u32;

            let records: Vec<GpuKeypointRecord> = bucket
                .iter()
                .map(|(_, kp)| GpuKeypointRecord {
                    x: kp.x,
                    y: kp.y,
                    octave: kp.octave as f32,
                    scale: kp.scale as f32,
                    sigma: kp.sigma,
                    orientation: kp.orientation,
                    _pad0: 0.0,
                    _pad1: 0.0,
                })
                .collect();
            let keypoint_buf = self.ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("compute_descriptors_keypoints"),
                contents: cast_slice(&records),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            });

            let dispatch_record = derive_cpu(count);
            let dispatch_buffer = self.ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("compute_descriptors_dispatch"),
                contents: cast_slice(&[dispatch_record]),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::INDIRECT,
            });

            let float_buf = DescriptorExtractor::alloc_float_buffer(&self.ctx.device, count);
            let quantized_buf = DescriptorExtractor::alloc_quantized_buffer(&self.ctx.device, count);

            let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("compute_descriptors_octave"),
            });
            self.orientation.record(&mut self.ctx, &mut encoder, octave_index, octave, &keypoint_buf, &dispatch_buffer)?;
            let entry = if self.options.quantize_descriptors { "main_quantized" } else { "main_float" };
            self.descriptor.record(
                &mut self.ctx,
                &mut encoder,
                entry,
                octave_index,
                octave,
                &keypoint_buf,
                &float_buf,
                &quantized_buf,
                &dispatch_buffer,
            )?;
            self.ctx.queue.submit(Some(encoder.finish()));

            let updated = read_keypoint_records(&self.ctx, &keypoint_buf, count)?;
            let descriptors = if self.options.quantize_descriptors {
                read_quantized_descriptors(&self.ctx, &quantized_buf, count)?
            } else {
                read_float_descriptors(&self.ctx, &float_buf, count)?
            };

            for ((original_index, _), (rec, desc)) in bucket.into_iter().zip(updated.into_iter().zip(descriptors)) {
                out[original_index] = Some((rec.to_keypoint(scale_restore), desc));
            }
        }

        Ok(out.into_iter().flatten().collect())
    }

    #[allow(clippy::type_complexity)]
    fn run(&mut self, with_descriptors: bool) -> Result<((Vec<Keypoint>, DetectWarnings), Vec<Descriptor>)> {
        let image = self
            .current
            .as_ref()
            .ok_or_else(|| SiftError::bad_config("detect called before load_image"))?;
        let scale_restore = image.scale_restore;
        let pyramid = image
            .pyramid
            .as_ref()
            .ok_or_else(|| SiftError::bad_config("no pyramid cached for the current image"))?;

        let span = tracing::info_span!("sift_detect", width = image.width, height = image.height);
        let _enter = span.enter();

        let mut all_keypoints = Vec::new();
        let mut all_descriptors = Vec::new();
        let mut any_truncated = None;

        for (octave_index, octave) in pyramid.octaves.iter().enumerate() {
            let octave_index = octave_index as u32;
            let (keypoints, descriptors, truncated) =
                self.detect_octave(octave_index, octave, with_descriptors, scale_restore)?;
            if let Some(t) = truncated {
                any_truncated = Some(t);
            }
            all_keypoints.extend(keypoints);
            all_descriptors.extend(descriptors);
        }

        if (all_keypoints.len() as u32) > self.options.max_keypoints {
            any_truncated = Some(Truncated { kept: self.options.max_keypoints, capacity: self.options.max_keypoints });
            all_keypoints.truncate(self.options.max_keypoints as usize);
            all_descriptors.truncate(self.options.max_keypoints as usize);
        }

        Ok(((all_keypoints, DetectWarnings { truncated: any_truncated }), all_descriptors))
    }

    fn detect_octave(
        &mut self,
        octave_index: u32,
        octave: &Octave,
        with_descriptors: bool,
        scale_restore: f32,
    ) -> Result<(Vec<Keypoint>, Vec<Descriptor>, Option<Truncated>)> {
        let capacity = self.options.max_keypoints;
        let append = ExtremumDetector::alloc_append_buffer(&self.ctx.device, octave_index, capacity);
        let dispatch_buffer = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("indirect_dispatch_record"),
            size: IndirectDispatchRecord::SIZE,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("detect_octave"),
        });
        self.extremum.record(&mut self.ctx, &mut encoder, &self.options, octave_index, octave, &append)?;
        self.indirect.record(&mut self.ctx, &mut encoder, &append.header, &dispatch_buffer)?;
        self.orientation.record(&mut self.ctx, &mut encoder, octave_index, octave, &append.records, &dispatch_buffer)?;

        let float_buf = DescriptorExtractor::alloc_float_buffer(&self.ctx.device, capacity);
        let quantized_buf = DescriptorExtractor::alloc_quantized_buffer(&self.ctx.device, capacity);
        if with_descriptors {
            let entry = if self.options.quantize_descriptors { "main_quantized" } else { "main_float" };
            self.descriptor.record(
                &mut self.ctx,
                &mut encoder,
                entry,
                octave_index,
                octave,
                &append.records,
                &float_buf,
                &quantized_buf,
                &dispatch_buffer,
            )?;
        }
        self.ctx.queue.submit(Some(encoder.finish()));

        let count = read_count(&self.ctx, &append.header)?;
        let kept = count.min(capacity);
        let truncated = if count > capacity {
            tracing::warn!(octave = octave_index, count, capacity, "append-buffer overflow; truncating");
            Some(Truncated { kept, capacity })
        } else {
            None
        };

        let records = read_keypoint_records(&self.ctx, &append.records, kept)?;
        let keypoints: Vec<_> = records.iter().map(|r| r.to_keypoint(scale_restore)).collect();

        let mut descriptors = Vec::new();
        if with_descriptors && kept > 0 {
            descriptors = if self.options.quantize_descriptors {
                read_quantized_descriptors(&self.ctx, &quantized_buf, kept)?
            } else {
                read_float_descriptors(&self.ctx, &float_buf, kept)?
            };
        }

        Ok((keypoints, descriptors, truncated))
    }
}

fn downscaled_dims(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    let longest = width.max(height) as f32;
    let factor = max_dim as f32 / longest;
    (((width as f32 * factor).round() as u32).max(1), ((height as f32 * factor).round() as u32).max(1))
}

/// Nearest-neighbor resize: simple and deterministic, adequate for the
/// load-time downscale which only needs to keep keypoint geometry in the
/// right ballpark before the scale-restore factor is reapplied.
fn nearest_resize_rgba8(src: &[u8], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Vec<u8> {
    let mut out = vec![0u8; dst_w as usize * dst_h as usize * 4];
    for dy in 0..dst_h {
        let sy = ((dy as u64 * src_h as u64) / dst_h as u64).min(src_h as u64 - 1) as u32;
        for dx in 0..dst_w {
            let sx = ((dx as u64 * src_w as u64) / dst_w as u64).min(src_w as u64 - 1) as u32;
            let src_idx = ((sy * src_w + sx) * 4) as usize;
            let dst_idx = ((dy * dst_w + dx) * 4) as usize;
            out[dst_idx..dst_idx + 4].copy_from_slice(&src[src_idx..src_idx + 4]);
        }
    }
    out
}

fn expand_to_rgba8(pixels: &[u8], width: u32, height: u32, format: PixelFormat) -> Result<Vec<u8>> {
    let bpp = format.bytes_per_pixel();
    let expected = bpp * (width as usize) * (height as usize);
    if pixels.len() < expected {
        return Err(SiftError::bad_config(format!(
            "pixel buffer too small: expected at least {expected} bytes, got {}",
            pixels.len()
        )));
    }
    match format {
        PixelFormat::Rgba8 => Ok(pixels[..expected].to_vec()),
        PixelFormat::Rgb8 => {
            let mut out = Vec::with_capacity(width as usize * height as usize * 4);
            for px in pixels.chunks_exact(3) {
                out.extend_from_slice(&[px[0], px[1], px[2], 255]);
            }
            Ok(out)
        }
        PixelFormat::Gray8 => {
            let mut out = Vec::with_capacity(width as usize * height as usize * 4);
            for &g in pixels.iter().take((width * height) as usize) {
                out.extend_from_slice(&[g, g, g, 255]);
            }
            Ok(out)
        }
    }
}

fn read_count(ctx: &GpuContext, header: &wgpu::Buffer) -> Result<u32> {
    let size = AppendBufferHeader::SIZE;
    let mut ring = StagingRing::new(&ctx.device, size, crate::readback::MIN_STAGING_SLOTS);
    let staging = ring.acquire().clone();
    let bytes = readback_buffer(&ctx.device, &ctx.queue, header, &staging, size)?;
    let header: &AppendBufferHeader = &cast_slice(&bytes)[0];
    Ok(header.count)
}

fn read_keypoint_records(ctx: &GpuContext, records: &wgpu::Buffer, count: u32) -> Result<Vec<GpuKeypointRecord>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let size = GpuKeypointRecord::SIZE * count as u64;
    let mut ring = StagingRing::new(&ctx.device, size, crate::readback::MIN_STAGING_SLOTS);
    let staging = ring.acquire().clone();
    let bytes = readback_buffer(&ctx.device, &ctx.queue, records, &staging, size)?;
    Ok(cast_slice(&bytes).to_vec())
}

fn read_buffer_prefix(ctx: &GpuContext, buffer: &wgpu::Buffer, size: u64) -> Result<Vec<u8>> {
    if size == 0 {
        return Ok(Vec::new());
    }
    let mut ring = StagingRing::new(&ctx.device, size, crate::readback::MIN_STAGING_SLOTS);
    let staging = ring.acquire().clone();
    readback_buffer(&ctx.device, &ctx.queue, buffer, &staging, size)
}

fn read_float_descriptors(ctx: &GpuContext, buffer: &wgpu::Buffer, count: u32) -> Result<Vec<Descriptor>> {
    let bytes = read_buffer_prefix(ctx, buffer, count as u64 * 128 * 4)?;
    Ok(bytes
        .chunks_exact(128 * 4)
        .map(|chunk| {
            let values: &[f32] = cast_slice(chunk);
            let arr: [f32; 128] = values.try_into().expect("128 f32 chunk");
            Descriptor::Float(Box::new(arr))
        })
        .collect())
}

fn read_quantized_descriptors(ctx: &GpuContext, buffer: &wgpu::Buffer, count: u32) -> Result<Vec<Descriptor>> {
    let bytes = read_buffer_prefix(ctx, buffer, count as u64 * 32)?;
    Ok(bytes
        .chunks_exact(32)
        .map(|chunk| {
            let words: &[u32] = cast_slice(chunk);
            let record = crate::descriptor::GpuDescriptorQuantizedRecord {
                words: words.try_into().expect("32 u32 chunk"),
            };
            Descriptor::Quantized(Box::new(record.unpack()))
        })
        .collect())
}
