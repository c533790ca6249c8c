//! Shared helpers for the end-to-end detector tests. CI without a GPU
//! adapter skips these tests by default; set `SIFT_REQUIRE_WEBGPU=1` to
//! turn a missing adapter into a hard failure instead.

use sift_gpu::{Detector, SiftOptions};

pub fn require_webgpu() -> bool {
    let Ok(raw) = std::env::var("SIFT_REQUIRE_WEBGPU") else {
        return false;
    };
    let v = raw.trim();
    v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes") || v.eq_ignore_ascii_case("on")
}

pub fn skip_or_panic(test_name: &str, reason: &str) {
    if require_webgpu() {
        panic!("SIFT_REQUIRE_WEBGPU is enabled but {test_name} cannot run: {reason}");
    }
    eprintln!("skipping {test_name}: {reason}");
}

/// Builds a `Detector` with `options`, or returns `None` after logging a
/// skip reason when no suitable adapter is available.
pub async fn try_new_detector(test_name: &str, options: SiftOptions) -> Option<Detector> {
    match Detector::new(options).await {
        Ok(detector) => Some(detector),
        Err(e) => {
            skip_or_panic(test_name, &format!("{e}"));
            None
        }
    }
}

/// A flat mid-gray RGBA8 image with a single bright square near the center,
/// large enough to produce at least one stable blob-like keypoint.
pub fn disk_image(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = vec![40u8; (width * height * 4) as usize];
    let (cx, cy) = (width as i32 / 2, height as i32 / 2);
    let radius = (width.min(height) / 6) as i32;
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let dx = x - cx;
            let dy = y - cy;
            if dx * dx + dy * dy <= radius * radius {
                let idx = ((y as u32 * width + x as u32) * 4) as usize;
                pixels[idx..idx + 3].copy_from_slice(&[230, 230, 230]);
                pixels[idx + 3] = 255;
            }
        }
    }
    for px in pixels.chunks_exact_mut(4) {
        px[3] = 255;
    }
    pixels
}

pub fn blank_image(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = vec![0u8; (width * height * 4) as usize];
    for px in pixels.chunks_exact_mut(4) {
        px[3] = 255;
    }
    pixels
}
