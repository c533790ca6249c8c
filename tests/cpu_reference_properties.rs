//! End-to-end properties of the pure-Rust reference pipeline. These need no
//! GPU adapter at all, so they always run.

mod common;

use sift_gpu::cpu_reference::{compute_descriptor, detect_and_compute};
use sift_gpu::SiftOptions;

#[test]
fn blank_image_yields_no_keypoints() {
    let options = SiftOptions::default();
    let pixels = common::blank_image(128, 128);
    let (keypoints, descriptors) = detect_and_compute(&options, &pixels, 128, 128);
    assert!(keypoints.is_empty());
    assert!(descriptors.is_empty());
}

#[test]
fn disk_image_yields_at_least_one_keypoint_near_center() {
    let options = SiftOptions::default();
    let pixels = common::disk_image(256, 256);
    let (keypoints, descriptors) = detect_and_compute(&options, &pixels, 256, 256);
    assert!(!keypoints.is_empty(), "expected at least one keypoint on a bright disk");
    assert_eq!(keypoints.len(), descriptors.len());

    let (cx, cy) = (128.0f32, 128.0f32);
    let nearest = keypoints
        .iter()
        .map(|kp| ((kp.x - cx).powi(2) + (kp.y - cy).powi(2)).sqrt())
        .fold(f32::INFINITY, f32::min);
    assert!(nearest < 64.0, "nearest keypoint to the disk center was {nearest} px away");
}

#[test]
fn keypoint_count_never_exceeds_max_keypoints() {
    let options = SiftOptions { max_keypoints: 3, ..Default::default() };
    let pixels = common::disk_image(256, 256);
    let (keypoints, _) = detect_and_compute(&options, &pixels, 256, 256);
    assert!(keypoints.len() <= 3);
}

#[test]
fn float_descriptor_bins_are_unit_l2_norm() {
    let options = SiftOptions::default();
    let pixels = common::disk_image(256, 256);
    let (_, descriptors) = detect_and_compute(&options, &pixels, 256, 256);
    assert!(!descriptors.is_empty());
    for d in &descriptors {
        let norm = d.l2_norm();
        assert!((0.999..=1.001).contains(&norm), "descriptor norm {norm} out of range");
    }
}

#[test]
fn descriptor_is_deterministic_given_the_same_pyramid_and_keypoint() {
    let options = SiftOptions::default();
    let pixels = common::disk_image(256, 256);
    let base = sift_gpu::cpu_reference::grayscale_from_rgba8(&pixels, 256, 256);
    let pyramid = sift_gpu::cpu_reference::CpuPyramid::build(&options, &base);
    let mut keypoints = sift_gpu::cpu_reference::detect_extrema(&options, &pyramid);
    sift_gpu::cpu_reference::assign_orientations(&options, &pyramid, &mut keypoints);
    assert!(!keypoints.is_empty());

    let kp = keypoints[0];
    let first = compute_descriptor(&pyramid, &kp);
    let second = compute_descriptor(&pyramid, &kp);
    assert_eq!(first, second);
}
