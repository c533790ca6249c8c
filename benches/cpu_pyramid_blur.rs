//! Timing for the separable Gaussian blur in the CPU reference path — the
//! one piece of per-pixel work on that path expensive enough to regress
//! silently.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sift_gpu::cpu_reference::{gaussian_blur, GrayImage};

fn flat_image(width: u32, height: u32) -> GrayImage {
    let mut pixels = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            pixels.push(((x ^ y) % 255) as f32 / 255.0);
        }
    }
    GrayImage::new(width, height, pixels)
}

fn bench_gaussian_blur(c: &mut Criterion) {
    let image = flat_image(512, 512);
    let mut group = c.benchmark_group("cpu_pyramid_blur");
    for sigma in [1.0f32, 1.6, 3.2] {
        group.bench_function(format!("sigma_{sigma}"), |b| {
            b.iter(|| black_box(gaussian_blur(black_box(&image), black_box(sigma))));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_gaussian_blur);
criterion_main!(benches);
