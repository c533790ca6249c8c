//! Descriptor data model: the host-side descriptor array and the GPU-visible
//! records that back it.

use bytemuck::{Pod, Zeroable};

pub const DESCRIPTOR_DIMS: usize = 128;

/// A 128-bin SIFT descriptor, owned host-side after readback.
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    Float(Box<[f32; DESCRIPTOR_DIMS]>),
    Quantized(Box<[u8; DESCRIPTOR_DIMS]>),
}

impl Descriptor {
    /// L2 norm; only meaningful for [`Descriptor::Float`].
    pub fn l2_norm(&self) -> f32 {
        match self {
            Descriptor::Float(d) => d.iter().map(|v| v * v).sum::<f32>().sqrt(),
            Descriptor::Quantized(_) => f32::NAN,
        }
    }

    pub fn as_float(&self) -> Option<&[f32; DESCRIPTOR_DIMS]> {
        match self {
            Descriptor::Float(d) => Some(d),
            Descriptor::Quantized(_) => None,
        }
    }

    /// Quantizes a float descriptor to bytes: `round(min(255, d·512))`.
    pub fn quantize(values: &[f32; DESCRIPTOR_DIMS]) -> [u8; DESCRIPTOR_DIMS] {
        let mut out = [0u8; DESCRIPTOR_DIMS];
        for (o, v) in out.iter_mut().zip(values.iter()) {
            *o = (v * 512.0).round().min(255.0).max(0.0) as u8;
        }
        out
    }
}

/// GPU-visible float descriptor record: 128 packed `f32` words.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct GpuDescriptorFloatRecord {
    pub bins: [f32; DESCRIPTOR_DIMS],
}

impl GpuDescriptorFloatRecord {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

/// GPU-visible quantized descriptor record: 128 `u8` quanta packed four per
/// `u32` word (32 words total).
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct GpuDescriptorQuantizedRecord {
    pub words: [u32; DESCRIPTOR_DIMS / 4],
}

impl GpuDescriptorQuantizedRecord {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn pack(bytes: &[u8; DESCRIPTOR_DIMS]) -> Self {
        let mut words = [0u32; DESCRIPTOR_DIMS / 4];
        for (w, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *w = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        GpuDescriptorQuantizedRecord { words }
    }

    pub fn unpack(&self) -> [u8; DESCRIPTOR_DIMS] {
        let mut out = [0u8; DESCRIPTOR_DIMS];
        for (chunk, w) in out.chunks_exact_mut(4).zip(self.words.iter()) {
            chunk.copy_from_slice(&w.to_le_bytes());
        }
        out
    }
}

/// Per-query match result written by the matcher.
///
/// `best_index = -1` signals "no candidate considered"; a match is emitted
/// only when `best_index >= 0` and `best_distance2 < ratio^2 * second_distance2`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuMatchResult {
    pub best_index: i32,
    pub best_distance2: f32,
    pub second_distance2: f32,
    pub _pad: i32,
}

impl GpuMatchResult {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
    pub const NO_CANDIDATE: i32 = -1;

    pub fn empty() -> Self {
        GpuMatchResult {
            best_index: Self::NO_CANDIDATE,
            best_distance2: f32::INFINITY,
            second_distance2: f32::INFINITY,
            _pad: 0,
        }
    }

    /// Accepts iff `best_index >= 0` and Lowe's ratio test passes.
    pub fn accept(&self, ratio: f32) -> bool {
        self.best_index >= 0 && self.best_distance2 < ratio * ratio * self.second_distance2
    }
}

/// An accepted match between two descriptor arrays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub query_index: u32,
    pub train_index: u32,
    pub distance: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_clamps_and_scales() {
        let mut values = [0.0f32; DESCRIPTOR_DIMS];
        values[0] = 0.5; // 256 -> clamp to 255
        values[1] = 0.1; // 51.2 -> round to 51
        let q = Descriptor::quantize(&values);
        assert_eq!(q[0], 255);
        assert_eq!(q[1], 51);
    }

    #[test]
    fn quantized_record_round_trips() {
        let mut bytes = [0u8; DESCRIPTOR_DIMS];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (i % 256) as u8;
        }
        let packed = GpuDescriptorQuantizedRecord::pack(&bytes);
        assert_eq!(packed.unpack(), bytes);
    }

    #[test]
    fn ratio_test_rejects_close_second_best() {
        let m = GpuMatchResult {
            best_index: 3,
            best_distance2: 10.0,
            second_distance2: 12.0,
            _pad: 0,
        };
        assert!(!m.accept(0.75)); // 10.0 < 0.5625*12.0=6.75 is false
    }

    #[test]
    fn ratio_test_accepts_clear_winner() {
        let m = GpuMatchResult {
            best_index: 3,
            best_distance2: 1.0,
            second_distance2: 12.0,
            _pad: 0,
        };
        assert!(m.accept(0.75));
    }

    #[test]
    fn no_candidate_never_accepted() {
        let m = GpuMatchResult::empty();
        assert!(!m.accept(0.75));
    }
}
