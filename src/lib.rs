//! GPU compute-shader SIFT: keypoint detection and descriptor extraction on
//! `wgpu`, with a brute-force descriptor matcher (plain, quantized, and
//! epipolar-guided variants) and a pure-Rust CPU reference path for
//! cross-validation and headless use.
//!
//! The typical call sequence is [`Detector::new`], then per frame
//! [`Detector::load_image`] followed by [`Detector::detect_and_compute`] or
//! [`Detector::detect_keypoints`]/[`Detector::compute_descriptors`] when
//! orientation/descriptors are only needed for a caller-supplied subset of
//! keypoints.

pub mod cpu_reference;
pub mod descriptor;
pub mod descriptor_extractor;
pub mod detect;
pub mod driver;
pub mod error;
pub mod formats;
pub mod gpu;
pub mod indirect;
pub mod io;
pub mod keypoint;
pub mod matcher;
pub mod options;
pub mod orientation;
pub mod pyramid;
pub mod readback;

#[cfg(test)]
mod tests;

pub use descriptor::{Descriptor, Match};
pub use driver::{DetectResult, DetectWarnings, Detector};
pub use error::{Result, SiftError, Truncated};
pub use formats::PixelFormat;
pub use keypoint::Keypoint;
pub use matcher::{DescriptorMatcher, FundamentalMatrix};
pub use options::SiftOptions;
