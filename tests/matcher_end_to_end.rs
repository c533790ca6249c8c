//! Brute-force matcher scenarios against synthetic descriptor sets.

mod common;

use sift_gpu::gpu::GpuContext;
use sift_gpu::DescriptorMatcher;

const DIMS: usize = 128;

fn unit_descriptor(dominant_bin: usize) -> [f32; DIMS] {
    let mut d = [0f32; DIMS];
    d[dominant_bin] = 1.0;
    d
}

fn flatten(descriptors: &[[f32; DIMS]]) -> Vec<f32> {
    descriptors.iter().flat_map(|d| d.iter().copied()).collect()
}

async fn try_new_ctx(test_name: &str) -> Option<GpuContext> {
    match GpuContext::new().await {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            common::skip_or_panic(test_name, &format!("{e}"));
            None
        }
    }
}

#[test]
fn identical_descriptor_sets_match_every_query_to_itself() {
    pollster::block_on(async {
        let Some(mut ctx) = try_new_ctx("identical_descriptor_sets_match_every_query_to_itself").await else {
            return;
        };
        let descriptors: Vec<_> = (0..5).map(unit_descriptor).collect();
        let flat = flatten(&descriptors);

        let matches = DescriptorMatcher::match_plain(&mut ctx, &flat, &flat, 0.8).unwrap();
        assert_eq!(matches.len(), 5);
        for m in &matches {
            assert_eq!(m.query_index, m.train_index);
            assert!(m.distance < 1e-4);
        }
    });
}

#[test]
fn ambiguous_descriptors_are_rejected_by_the_ratio_test() {
    pollster::block_on(async {
        let Some(mut ctx) = try_new_ctx("ambiguous_descriptors_are_rejected_by_the_ratio_test").await else {
            return;
        };
        // Two train descriptors nearly identical to the query: the ratio
        // test should reject the ambiguous match.
        let query = flatten(&[unit_descriptor(0)]);
        let mut near_duplicate = unit_descriptor(0);
        near_duplicate[1] = 0.05;
        let train = flatten(&[unit_descriptor(0), near_duplicate]);

        let matches = DescriptorMatcher::match_plain(&mut ctx, &query, &train, 0.9).unwrap();
        assert!(matches.is_empty(), "expected ratio test to reject an ambiguous pair");
    });
}

#[test]
fn quantized_matching_agrees_with_float_matching_on_distinct_descriptors() {
    pollster::block_on(async {
        let Some(mut ctx) = try_new_ctx("quantized_matching_agrees_with_float_matching_on_distinct_descriptors").await else {
            return;
        };
        let descriptors: Vec<_> = (0..8).map(unit_descriptor).collect();
        let flat = flatten(&descriptors);
        let quantized: Vec<u8> = descriptors
            .iter()
            .flat_map(|d| sift_gpu::Descriptor::quantize(d))
            .collect();

        let float_matches = DescriptorMatcher::match_plain(&mut ctx, &flat, &flat, 0.8).unwrap();
        let quantized_matches = DescriptorMatcher::match_quantized(&mut ctx, &quantized, &quantized, 0.8).unwrap();

        assert_eq!(float_matches.len(), quantized_matches.len());
        for (f, q) in float_matches.iter().zip(quantized_matches.iter()) {
            assert_eq!(f.query_index, q.query_index);
            assert_eq!(f.train_index, q.train_index);
        }
    });
}
