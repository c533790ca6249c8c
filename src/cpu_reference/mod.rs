//! Pure-Rust reference implementation (the "C8" component): the same
//! pyramid/extremum/orientation/descriptor math as the compute shaders,
//! executed single-threaded on the host for cross-validation and as a
//! no-GPU fallback. Deliberately not parallelized — correctness is the
//! only goal here, matching the shader's bin-ordering and sigma
//! conventions exactly so GPU and CPU descriptors compare directly.

use crate::descriptor::Descriptor;
use crate::keypoint::Keypoint;
use crate::options::SiftOptions;
use crate::pyramid::params;

const ORIENTATION_BINS: usize = 36;
const ORIENTATION_SIGMA_FACTOR: f32 = 1.5;
const DESCR_SPATIAL_BINS: usize = 4;
const DESCR_ORIENTATION_BINS: usize = 8;
const DESCR_DIMS: usize = DESCR_SPATIAL_BINS * DESCR_SPATIAL_BINS * DESCR_ORIENTATION_BINS;
const DESCR_STEP_FACTOR: f32 = 0.75;
const DESCR_GRID_RADIUS: i32 = 8;
const TAU: f32 = std::f32::consts::TAU;

/// A single-channel `f32` image in `[0, 1]`, row-major.
#[derive(Debug, Clone)]
pub struct GrayImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<f32>,
}

impl GrayImage {
    pub fn new(width: u32, height: u32, pixels: Vec<f32>) -> Self {
        assert_eq!(pixels.len(), (width * height) as usize);
        GrayImage { width, height, pixels }
    }

    fn get(&self, x: i32, y: i32) -> f32 {
        let x = x.clamp(0, self.width as i32 - 1) as u32;
        let y = y.clamp(0, self.height as i32 - 1) as u32;
        self.pixels[(y * self.width + x) as usize]
    }

    fn set(&mut self, x: u32, y: u32, v: f32) {
        self.pixels[(y * self.width + x) as usize] = v;
    }

    fn bilinear(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let ix0 = x0 as i32;
        let iy0 = y0 as i32;
        let top = self.get(ix0, iy0) + (self.get(ix0 + 1, iy0) - self.get(ix0, iy0)) * fx;
        let bottom = self.get(ix0, iy0 + 1) + (self.get(ix0 + 1, iy0 + 1) - self.get(ix0, iy0 + 1)) * fx;
        top + (bottom - top) * fy
    }
}

/// Converts interleaved RGBA8 to a luma `GrayImage`, using the same BT.601
/// weights as [`crate::formats::PixelFormat::luma`].
pub fn grayscale_from_rgba8(rgba: &[u8], width: u32, height: u32) -> GrayImage {
    let mut pixels = Vec::with_capacity((width * height) as usize);
    for px in rgba.chunks_exact(4) {
        let r = px[0] as f32 / 255.0;
        let g = px[1] as f32 / 255.0;
        let b = px[2] as f32 / 255.0;
        pixels.push(0.299 * r + 0.587 * g + 0.114 * b);
    }
    GrayImage::new(width, height, pixels)
}

/// Separable Gaussian blur with the same `ceil(3*sigma)` radius convention
/// as [`crate::gpu::kernel_cache::KernelCache::radius_for_sigma`].
pub fn gaussian_blur(src: &GrayImage, sigma: f32) -> GrayImage {
    let radius = crate::gpu::kernel_cache::KernelCache::radius_for_sigma(sigma);
    let kernel = crate::gpu::kernel_cache::KernelCache::sample_kernel(sigma, radius);
    let r = radius as i32;

    let mut horizontal = GrayImage::new(src.width, src.height, vec![0.0; src.pixels.len()]);
    for y in 0..src.height as i32 {
        for x in 0..src.width as i32 {
            let mut acc = 0.0;
            for (k, &w) in kernel.iter().enumerate() {
                let offset = k as i32 - r;
                acc += src.get(x + offset, y) * w;
            }
            horizontal.set(x as u32, y as u32, acc);
        }
    }

    let mut vertical = GrayImage::new(src.width, src.height, vec![0.0; src.pixels.len()]);
    for y in 0..src.height as i32 {
        for x in 0..src.width as i32 {
            let mut acc = 0.0;
            for (k, &w) in kernel.iter().enumerate() {
                let offset = k as i32 - r;
                acc += horizontal.get(x, y + offset) * w;
            }
            vertical.set(x as u32, y as u32, acc);
        }
    }
    vertical
}

/// Keeps the top-left sample of every 2x2 block, mirroring `downsample.wgsl`.
fn decimate_half(src: &GrayImage) -> GrayImage {
    let dst_w = ((src.width + 1) / 2).max(1);
    let dst_h = ((src.height + 1) / 2).max(1);
    let mut pixels = Vec::with_capacity((dst_w * dst_h) as usize);
    for y in 0..dst_h {
        for x in 0..dst_w {
            pixels.push(src.get((x * 2) as i32, (y * 2) as i32));
        }
    }
    GrayImage::new(dst_w, dst_h, pixels)
}

/// One octave's Gaussian and DoG scale images, in logical (unpacked) pixel
/// resolution — no texel packing on the CPU path, since it exists purely to
/// hide GPU texture-format constraints.
pub struct CpuOctave {
    pub width: u32,
    pub height: u32,
    pub gaussian: Vec<GrayImage>,
    pub dog: Vec<GrayImage>,
}

pub struct CpuPyramid {
    pub octaves: Vec<CpuOctave>,
}

impl CpuPyramid {
    pub fn build(options: &SiftOptions, base: &GrayImage) -> Self {
        let mut octaves = Vec::with_capacity(options.num_octaves as usize);
        let mut prev_top: Option<GrayImage> = None;

        for o in 0..options.num_octaves {
            let seed = if o == 0 {
                gaussian_blur(base, options.sigma_base)
            } else {
                decimate_half(prev_top.as_ref().expect("previous octave produced a top scale"))
            };

            let mut gaussian = Vec::with_capacity(options.gaussian_scales() as usize);
            gaussian.push(seed);
            for s in 1..options.gaussian_scales() {
                let inc_sigma = params::incremental_sigma(options, s);
                let blurred = gaussian_blur(&gaussian[(s - 1) as usize], inc_sigma);
                gaussian.push(blurred);
            }

            let mut dog = Vec::with_capacity(options.dog_scales() as usize);
            for s in 0..options.dog_scales() {
                dog.push(subtract(&gaussian[(s + 1) as usize], &gaussian[s as usize]));
            }

            prev_top = Some(gaussian[options.scales_per_octave as usize].clone());
            let (width, height) = (gaussian[0].width, gaussian[0].height);
            octaves.push(CpuOctave { width, height, gaussian, dog });
        }

        CpuPyramid { octaves }
    }
}

fn subtract(hi: &GrayImage, lo: &GrayImage) -> GrayImage {
    let pixels = hi.pixels.iter().zip(lo.pixels.iter()).map(|(a, b)| a - b).collect();
    GrayImage::new(hi.width, hi.height, pixels)
}

/// Detects scale-space extrema across every middle DoG scale of every
/// octave, applying the same contrast and principal-curvature edge tests
/// as `extremum.wgsl`.
pub fn detect_extrema(options: &SiftOptions, pyramid: &CpuPyramid) -> Vec<Keypoint> {
    let mut keypoints = Vec::new();
    for (o, octave) in pyramid.octaves.iter().enumerate() {
        let octave_scale = 2f32.powi(o as i32);
        for s in 1..=options.scales_per_octave {
            let (prev, curr, next) = (
                &octave.dog[(s - 1) as usize],
                &octave.dog[s as usize],
                &octave.dog[(s + 1) as usize],
            );
            for y in 1..octave.height as i32 - 1 {
                for x in 1..octave.width as i32 - 1 {
                    let value = curr.get(x, y);
                    if value.abs() < options.contrast_threshold / options.scales_per_octave as f32 {
                        continue;
                    }
                    if !is_extremum(prev, curr, next, x, y, value) {
                        continue;
                    }
                    if !passes_edge_test(curr, x, y, options.edge_threshold) {
                        continue;
                    }
                    let sigma = params::gaussian_sigma(options, s) * octave_scale;
                    keypoints.push(Keypoint {
                        x: x as f32 * octave_scale,
                        y: y as f32 * octave_scale,
                        octave: o as i32,
                        scale: s as i32,
                        sigma,
                        orientation: 0.0,
                    });
                }
            }
        }
    }
    keypoints
}

fn is_extremum(prev: &GrayImage, curr: &GrayImage, next: &GrayImage, x: i32, y: i32, value: f32) -> bool {
    let mut is_max = true;
    let mut is_min = true;
    for (img, skip_center) in [(prev, false), (curr, true), (next, false)] {
        for dy in -1..=1 {
            for dx in -1..=1 {
                if skip_center && dx == 0 && dy == 0 {
                    continue;
                }
                let n = img.get(x + dx, y + dy);
                if n >= value {
                    is_max = false;
                }
                if n <= value {
                    is_min = false;
                }
            }
        }
    }
    is_max || is_min
}

fn passes_edge_test(curr: &GrayImage, x: i32, y: i32, edge_threshold: f32) -> bool {
    let dxx = curr.get(x + 1, y) - 2.0 * curr.get(x, y) + curr.get(x - 1, y);
    let dyy = curr.get(x, y + 1) - 2.0 * curr.get(x, y) + curr.get(x, y - 1);
    let dxy = (curr.get(x + 1, y + 1) - curr.get(x + 1, y - 1) - curr.get(x - 1, y + 1) + curr.get(x - 1, y - 1)) / 4.0;
    let trace = dxx + dyy;
    let det = dxx * dyy - dxy * dxy;
    if det <= 0.0 {
        return false;
    }
    let r = edge_threshold;
    trace * trace * r < (r + 1.0) * (r + 1.0) * det
}

/// Assigns the dominant gradient-histogram orientation to every keypoint in
/// place, the same algorithm as `orientation.wgsl`'s single-threaded path.
pub fn assign_orientations(options: &SiftOptions, pyramid: &CpuPyramid, keypoints: &mut [Keypoint]) {
    for kp in keypoints.iter_mut() {
        let octave = &pyramid.octaves[kp.octave as usize];
        let octave_scale = 2f32.powi(kp.octave);
        let center_x = (kp.x / octave_scale).round() as i32;
        let center_y = (kp.y / octave_scale).round() as i32;
        let layer = &octave.gaussian[(kp.scale + 1) as usize];

        let sigma_w = ORIENTATION_SIGMA_FACTOR * (kp.sigma / octave_scale);
        let radius = sigma_w.mul_add(3.0, 0.0).round() as i32;
        let mut histogram = [0.0f32; ORIENTATION_BINS];

        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy > radius * radius {
                    continue;
                }
                let lx = center_x + dx;
                let ly = center_y + dy;
                if lx < 1 || ly < 1 || lx >= layer.width as i32 - 1 || ly >= layer.height as i32 - 1 {
                    continue;
                }
                let gx = layer.get(lx + 1, ly) - layer.get(lx - 1, ly);
                let gy = layer.get(lx, ly + 1) - layer.get(lx, ly - 1);
                let mag = (gx * gx + gy * gy).sqrt();
                let mut angle = gy.atan2(gx);
                if angle < 0.0 {
                    angle += TAU;
                }
                let weight = (-((dx * dx + dy * dy) as f32) / (2.0 * sigma_w * sigma_w)).exp();
                let bin = ((angle / TAU * ORIENTATION_BINS as f32) as usize).min(ORIENTATION_BINS - 1);
                histogram[bin] += mag * weight;
            }
        }

        let mut smoothed = [0.0f32; ORIENTATION_BINS];
        for b in 0..ORIENTATION_BINS {
            let bm1 = histogram[(b + ORIENTATION_BINS - 1) % ORIENTATION_BINS];
            let b0 = histogram[b];
            let bp1 = histogram[(b + 1) % ORIENTATION_BINS];
            smoothed[b] = 0.25 * bm1 + 0.5 * b0 + 0.25 * bp1;
        }
        histogram = smoothed;

        let (peak_bin, peak_val) = histogram
            .iter()
            .enumerate()
            .fold((0usize, f32::MIN), |(pb, pv), (b, &v)| if v > pv { (b, v) } else { (pb, pv) });
        let left = histogram[(peak_bin + ORIENTATION_BINS - 1) % ORIENTATION_BINS];
        let right = histogram[(peak_bin + 1) % ORIENTATION_BINS];
        let denom = left - 2.0 * peak_val + right;
        let offset = if denom.abs() > 1e-12 { 0.5 * (left - right) / denom } else { 0.0 };
        let mut theta = (peak_bin as f32 + offset) * (TAU / ORIENTATION_BINS as f32);
        theta %= TAU;
        if theta < 0.0 {
            theta += TAU;
        }
        kp.orientation = theta;
    }
}

fn hist_index(xi: usize, yi: usize, oi: usize) -> usize {
    (xi * DESCR_SPATIAL_BINS + yi) * DESCR_ORIENTATION_BINS + (oi % DESCR_ORIENTATION_BINS)
}

/// Extracts the 128-bin descriptor for one keypoint, matching
/// `descriptor.wgsl`'s `gather_and_normalize` bin-for-bin.
pub fn compute_descriptor(pyramid: &CpuPyramid, kp: &Keypoint) -> [f32; DESCR_DIMS] {
    let octave = &pyramid.octaves[kp.octave as usize];
    let octave_scale = 2f32.powi(kp.octave);
    let kx = kp.x / octave_scale;
    let ky = kp.y / octave_scale;
    let layer = &octave.gaussian[(kp.scale + 1) as usize];
    let theta = kp.orientation;
    let (sin_t, cos_t) = theta.sin_cos();

    let sigma_local = kp.sigma / octave_scale;
    let step = DESCR_STEP_FACTOR * sigma_local;

    let mut hist = [0.0f32; DESCR_DIMS];
    for r in -DESCR_GRID_RADIUS..DESCR_GRID_RADIUS {
        for c in -DESCR_GRID_RADIUS..DESCR_GRID_RADIUS {
            let sx = kx + step * (c as f32 * cos_t - r as f32 * sin_t);
            let sy = ky + step * (c as f32 * sin_t + r as f32 * cos_t);

            // Bilinear taps plus a central-difference neighbor on each side
            // need a 2-pixel margin from the octave-local image border.
            if sx < 2.0
                || sy < 2.0
                || sx > layer.width as f32 - 3.0
                || sy > layer.height as f32 - 3.0
            {
                continue;
            }

            let gx = layer.bilinear(sx + 1.0, sy) - layer.bilinear(sx - 1.0, sy);
            let gy = layer.bilinear(sx, sy + 1.0) - layer.bilinear(sx, sy - 1.0);
            let mag = (gx * gx + gy * gy).sqrt();
            let mut angle = gy.atan2(gx) - theta;
            angle %= TAU;
            if angle < 0.0 {
                angle += TAU;
            }
            let weight = (-((r * r + c * c) as f32) / 128.0).exp();
            let contribution = mag * weight;

            let bin_r = (r as f32 + DESCR_GRID_RADIUS as f32) / DESCR_SPATIAL_BINS as f32 - 0.5;
            let bin_c = (c as f32 + DESCR_GRID_RADIUS as f32) / DESCR_SPATIAL_BINS as f32 - 0.5;
            let bin_o = angle / TAU * DESCR_ORIENTATION_BINS as f32;

            let r0 = bin_r.floor();
            let c0 = bin_c.floor();
            let o0 = bin_o.floor();
            let dr_frac = bin_r - r0;
            let dc_frac = bin_c - c0;
            let do_frac = bin_o - o0;

            for dri in 0..2 {
                let ri = r0 as i32 + dri;
                if ri < 0 || ri >= DESCR_SPATIAL_BINS as i32 {
                    continue;
                }
                let wr = if dri == 1 { dr_frac } else { 1.0 - dr_frac };
                for dci in 0..2 {
                    let ci = c0 as i32 + dci;
                    if ci < 0 || ci >= DESCR_SPATIAL_BINS as i32 {
                        continue;
                    }
                    let wc = if dci == 1 { dc_frac } else { 1.0 - dc_frac };
                    for doi in 0..2 {
                        let oi = ((o0 as i32 + doi + DESCR_ORIENTATION_BINS as i32) as usize) % DESCR_ORIENTATION_BINS;
                        let wo = if doi == 1 { do_frac } else { 1.0 - do_frac };
                        hist[hist_index(ri as usize, ci as usize, oi)] += contribution * wr * wc * wo;
                    }
                }
            }
        }
    }

    normalize_descriptor(&mut hist);
    hist
}

fn normalize_descriptor(hist: &mut [f32; DESCR_DIMS]) {
    let norm: f32 = hist.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in hist.iter_mut() {
            *v = (*v / norm).min(0.2);
        }
    }
    let renorm: f32 = hist.iter().map(|v| v * v).sum::<f32>().sqrt();
    if renorm > 0.0 {
        for v in hist.iter_mut() {
            *v /= renorm;
        }
    }
}

/// Runs the full no-GPU pipeline: pyramid, extrema, orientation, descriptors.
pub fn detect_and_compute(options: &SiftOptions, rgba: &[u8], width: u32, height: u32) -> (Vec<Keypoint>, Vec<Descriptor>) {
    let base = grayscale_from_rgba8(rgba, width, height);
    let pyramid = CpuPyramid::build(options, &base);
    let mut keypoints = detect_extrema(options, &pyramid);
    if keypoints.len() as u32 > options.max_keypoints {
        keypoints.truncate(options.max_keypoints as usize);
    }
    assign_orientations(options, &pyramid, &mut keypoints);
    let descriptors = keypoints
        .iter()
        .map(|kp| {
            let bins = compute_descriptor(&pyramid, kp);
            if options.quantize_descriptors {
                Descriptor::Quantized(Box::new(Descriptor::quantize(&bins)))
            } else {
                Descriptor::Float(Box::new(bins))
            }
        })
        .collect();
    (keypoints, descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_image(width: u32, height: u32, value: f32) -> GrayImage {
        GrayImage::new(width, height, vec![value; (width * height) as usize])
    }

    #[test]
    fn blank_image_yields_no_extrema() {
        let options = SiftOptions::default();
        let base = flat_image(64, 64, 0.5);
        let pyramid = CpuPyramid::build(&options, &base);
        let keypoints = detect_extrema(&options, &pyramid);
        assert!(keypoints.is_empty());
    }

    #[test]
    fn decimate_half_keeps_every_other_sample() {
        let mut pixels = Vec::new();
        for y in 0..4u32 {
            for x in 0..4u32 {
                pixels.push((y * 4 + x) as f32);
            }
        }
        let src = GrayImage::new(4, 4, pixels);
        let dst = decimate_half(&src);
        assert_eq!((dst.width, dst.height), (2, 2));
        assert_eq!(dst.get(0, 0), 0.0);
        assert_eq!(dst.get(1, 0), 2.0);
        assert_eq!(dst.get(0, 1), 8.0);
    }

    #[test]
    fn descriptor_normalizes_to_unit_l2_when_nonzero() {
        let mut hist = [0.0f32; DESCR_DIMS];
        hist[0] = 1.0;
        hist[10] = 3.0;
        normalize_descriptor(&mut hist);
        let norm: f32 = hist.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
        assert!(hist.iter().all(|&v| v <= 0.2 + 1e-6));
    }

    #[test]
    fn dog_equals_gaussian_difference() {
        let options = SiftOptions::default();
        let base = flat_image(32, 32, 0.3);
        let pyramid = CpuPyramid::build(&options, &base);
        let octave = &pyramid.octaves[0];
        for s in 0..options.dog_scales() as usize {
            let expected = subtract(&octave.gaussian[s + 1], &octave.gaussian[s]);
            for (a, b) in octave.dog[s].pixels.iter().zip(expected.pixels.iter()) {
                assert!((a - b).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn hist_index_matches_shader_layout() {
        // (xi * 4 + yi) * 8 + oi, as in descriptor.wgsl's hist_index().
        assert_eq!(hist_index(0, 0, 0), 0);
        assert_eq!(hist_index(1, 0, 0), 8);
        assert_eq!(hist_index(0, 1, 0), 8 * 1);
        assert_eq!(hist_index(1, 2, 3), (1 * 4 + 2) * 8 + 3);
    }
}
