//! Detector configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SiftError};

/// Construction-time options for a [`crate::Detector`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftOptions {
    pub num_octaves: u32,
    pub scales_per_octave: u32,
    pub sigma_base: f32,
    pub contrast_threshold: f32,
    pub edge_threshold: f32,
    pub max_keypoints: u32,
    pub max_image_dimension: u32,
    pub quantize_descriptors: bool,
}

impl Default for SiftOptions {
    fn default() -> Self {
        SiftOptions {
            num_octaves: 4,
            scales_per_octave: 3,
            sigma_base: 1.6,
            contrast_threshold: 0.03,
            edge_threshold: 10.0,
            max_keypoints: 100_000,
            max_image_dimension: 3000,
            quantize_descriptors: false,
        }
    }
}

impl SiftOptions {
    /// Rejects sane-range violations as [`SiftError::BadConfig`].
    pub fn validate(&self) -> Result<()> {
        if self.num_octaves == 0 {
            return Err(SiftError::bad_config("num_octaves must be >= 1"));
        }
        if self.scales_per_octave == 0 {
            return Err(SiftError::bad_config("scales_per_octave must be >= 1"));
        }
        if !(self.sigma_base > 0.0) {
            return Err(SiftError::bad_config("sigma_base must be > 0"));
        }
        if self.contrast_threshold < 0.0 {
            return Err(SiftError::bad_config("contrast_threshold must be >= 0"));
        }
        if !(self.edge_threshold > 0.0) {
            return Err(SiftError::bad_config("edge_threshold must be > 0"));
        }
        if self.max_keypoints == 0 {
            return Err(SiftError::bad_config("max_keypoints must be >= 1"));
        }
        if self.max_image_dimension != 0 && self.max_image_dimension < 8 {
            return Err(SiftError::bad_config(
                "max_image_dimension must be 0 (disabled) or >= 8",
            ));
        }
        Ok(())
    }

    /// Number of DoG scales per octave: `S + 2`.
    pub fn dog_scales(&self) -> u32 {
        self.scales_per_octave + 2
    }

    /// Number of Gaussian scales per octave: `S + 3`.
    pub fn gaussian_scales(&self) -> u32 {
        self.scales_per_octave + 3
    }
}
