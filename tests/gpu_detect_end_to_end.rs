//! Full GPU detector scenarios. Skipped (not failed) when no adapter is
//! available, unless `SIFT_REQUIRE_WEBGPU=1`; see `common::skip_or_panic`.

mod common;

use sift_gpu::{Detector, PixelFormat, SiftOptions};

#[test]
fn blank_image_produces_no_keypoints() {
    pollster::block_on(async {
        let Some(mut detector) = common::try_new_detector("blank_image_produces_no_keypoints", SiftOptions::default()).await else {
            return;
        };
        let pixels = common::blank_image(128, 128);
        detector.load_image(&pixels, 128, 128, PixelFormat::Rgba8).unwrap();
        let (keypoints, warnings) = detector.detect_keypoints().unwrap();
        assert!(keypoints.is_empty());
        assert!(warnings.truncated.is_none());
    });
}

#[test]
fn disk_image_produces_a_keypoint_near_its_center() {
    pollster::block_on(async {
        let Some(mut detector) = common::try_new_detector("disk_image_produces_a_keypoint_near_its_center", SiftOptions::default()).await
        else {
            return;
        };
        let pixels = common::disk_image(256, 256);
        detector.load_image(&pixels, 256, 256, PixelFormat::Rgba8).unwrap();
        let result = detector.detect_and_compute().unwrap();
        assert!(!result.keypoints.is_empty());
        assert_eq!(result.keypoints.len(), result.descriptors.len());

        let nearest = result
            .keypoints
            .iter()
            .map(|kp| ((kp.x - 128.0).powi(2) + (kp.y - 128.0).powi(2)).sqrt())
            .fold(f32::INFINITY, f32::min);
        assert!(nearest < 64.0);
    });
}

#[test]
fn max_image_dimension_restores_original_coordinate_scale() {
    pollster::block_on(async {
        let options = SiftOptions { max_image_dimension: 128, ..Default::default() };
        let Some(mut detector) = common::try_new_detector("max_image_dimension_restores_original_coordinate_scale", options).await else {
            return;
        };
        let pixels = common::disk_image(512, 512);
        detector.load_image(&pixels, 512, 512, PixelFormat::Rgba8).unwrap();
        let (keypoints, _) = detector.detect_keypoints().unwrap();
        assert!(!keypoints.is_empty());

        // Coordinates must be expressed in the original 512x512 space, not
        // the downscaled 128x128 pyramid's — the disk's keypoints should
        // still cluster near (256, 256).
        let nearest = keypoints
            .iter()
            .map(|kp| ((kp.x - 256.0).powi(2) + (kp.y - 256.0).powi(2)).sqrt())
            .fold(f32::INFINITY, f32::min);
        assert!(nearest < 128.0, "nearest keypoint was {nearest} px from the expected center");
    });
}

#[test]
fn quantized_and_float_descriptors_agree_on_keypoint_count() {
    pollster::block_on(async {
        let Some(mut float_detector) =
            common::try_new_detector("quantized_and_float_descriptors_agree_on_keypoint_count", SiftOptions::default()).await
        else {
            return;
        };
        let quantized_options = SiftOptions { quantize_descriptors: true, ..Default::default() };
        let Some(mut quantized_detector) =
            common::try_new_detector("quantized_and_float_descriptors_agree_on_keypoint_count", quantized_options).await
        else {
            return;
        };

        let pixels = common::disk_image(256, 256);
        float_detector.load_image(&pixels, 256, 256, PixelFormat::Rgba8).unwrap();
        quantized_detector.load_image(&pixels, 256, 256, PixelFormat::Rgba8).unwrap();

        let float_result = float_detector.detect_and_compute().unwrap();
        let quantized_result = quantized_detector.detect_and_compute().unwrap();

        let diff = (float_result.keypoints.len() as i64 - quantized_result.keypoints.len() as i64).abs();
        assert!(diff <= 1, "keypoint counts diverged: {} vs {}", float_result.keypoints.len(), quantized_result.keypoints.len());
        for d in &quantized_result.descriptors {
            assert!(d.as_float().is_none());
        }
    });
}

#[test]
fn compute_descriptors_is_idempotent_on_the_same_pyramid() {
    pollster::block_on(async {
        let Some(mut detector) = common::try_new_detector("compute_descriptors_is_idempotent_on_the_same_pyramid", SiftOptions::default()).await
        else {
            return;
        };
        let pixels = common::disk_image(256, 256);
        detector.load_image(&pixels, 256, 256, PixelFormat::Rgba8).unwrap();
        let (keypoints, _) = detector.detect_keypoints().unwrap();
        assert!(!keypoints.is_empty());

        let first = detector.compute_descriptors(&keypoints).unwrap();
        let second = detector.compute_descriptors(&keypoints).unwrap();
        assert_eq!(first.len(), second.len());
        for ((_, d1), (_, d2)) in first.iter().zip(second.iter()) {
            assert_eq!(d1.as_float(), d2.as_float());
        }
    });
}
