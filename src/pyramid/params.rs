//! Pure sizing/sigma math for the scale-space pyramid, kept separate from
//! the GPU orchestration in [`super::Pyramid`] so it can be unit tested
//! without a device.

use crate::options::SiftOptions;

/// Logical (unpacked) pixel dimensions of octave `o`, halved each octave
/// and floored, with a minimum of one pixel per side.
pub fn octave_dims(base_width: u32, base_height: u32, octave: u32) -> (u32, u32) {
    let w = (base_width >> octave).max(1);
    let h = (base_height >> octave).max(1);
    (w, h)
}

/// Packed-texel dimensions backing `octave_dims`: `ceil(dim / 2)`.
pub fn packed_dims(logical_width: u32, logical_height: u32) -> (u32, u32) {
    ((logical_width + 1) / 2, (logical_height + 1) / 2)
}

/// Absolute sigma of Gaussian scale `s` within an octave (`s` in
/// `0..gaussian_scales()`), before octave rescaling: `sigma_base * 2^(s/S)`.
pub fn gaussian_sigma(options: &SiftOptions, s: u32) -> f32 {
    options.sigma_base * 2f32.powf(s as f32 / options.scales_per_octave as f32)
}

/// Incremental sigma to blur G[s-1] into G[s]: `sqrt(sigma(s)^2 -
/// sigma(s-1)^2)`, the amount of additional smoothing a separable blur
/// pass must apply so the cumulative blur matches `gaussian_sigma(s)`.
pub fn incremental_sigma(options: &SiftOptions, s: u32) -> f32 {
    assert!(s > 0, "incremental_sigma is undefined for s == 0");
    let sigma_s = gaussian_sigma(options, s);
    let sigma_prev = gaussian_sigma(options, s - 1);
    (sigma_s * sigma_s - sigma_prev * sigma_prev).max(0.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octave_dims_halve_and_floor() {
        assert_eq!(octave_dims(1001, 768, 0), (1001, 768));
        assert_eq!(octave_dims(1001, 768, 1), (500, 384));
        assert_eq!(octave_dims(1, 1, 5), (1, 1));
    }

    #[test]
    fn packed_dims_round_up() {
        assert_eq!(packed_dims(1001, 768), (501, 384));
        assert_eq!(packed_dims(4, 4), (2, 2));
    }

    #[test]
    fn sigma_progression_is_increasing_within_octave() {
        let options = SiftOptions::default();
        let mut prev = gaussian_sigma(&options, 0);
        for s in 1..options.gaussian_scales() {
            let sigma = gaussian_sigma(&options, s);
            assert!(sigma > prev);
            prev = sigma;
        }
    }

    #[test]
    fn incremental_sigma_blurs_from_previous_cumulative() {
        let options = SiftOptions::default();
        for s in 1..options.gaussian_scales() {
            let prev = gaussian_sigma(&options, s - 1);
            let inc = incremental_sigma(&options, s);
            let combined = (prev * prev + inc * inc).sqrt();
            assert!((combined - gaussian_sigma(&options, s)).abs() < 1e-4);
        }
    }
}
