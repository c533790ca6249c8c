//! Keypoint data model: the host-side detected keypoint and the GPU-visible
//! records that back it in the append-buffer pipeline.

use bytemuck::{Pod, Zeroable};

/// A detected keypoint in original-image coordinates.
///
/// Lifetime: appended by the extremum detector (C3), its `orientation`
/// field updated in place by the orientation assigner (C4); never deleted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub octave: i32,
    pub scale: i32,
    /// Sigma in original-image coordinates: `sigma(s)·2^o`, scaled further
    /// by the load-time scale-restore factor.
    pub sigma: f32,
    /// Dominant orientation in radians, `[0, 2π)`.
    pub orientation: f32,
}

/// GPU-visible keypoint record: 8 float words (`x, y, octave, scale, sigma,
/// orientation`, two padding words so the record is a round 32 bytes —
/// convenient for storage-buffer stride).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuKeypointRecord {
    pub x: f32,
    pub y: f32,
    pub octave: f32,
    pub scale: f32,
    pub sigma: f32,
    pub orientation: f32,
    pub _pad0: f32,
    pub _pad1: f32,
}

impl GpuKeypointRecord {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn to_keypoint(self, scale_restore: f32) -> Keypoint {
        Keypoint {
            x: self.x * scale_restore,
            y: self.y * scale_restore,
            octave: self.octave.round() as i32,
            scale: self.scale.round() as i32,
            sigma: self.sigma * scale_restore,
            orientation: self.orientation,
        }
    }
}

/// Header of the GPU append-buffer: an atomic count plus three padding
/// words to keep the struct 16-byte aligned.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct AppendBufferHeader {
    pub count: u32,
    pub _pad: [u32; 3],
}

impl AppendBufferHeader {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

/// Indirect-dispatch record derived from the append-buffer count, read by
/// the orientation and descriptor passes' indirect compute dispatches.
///
/// `(ori_x, ori_y, 1, desc_x, 1, 1)`: the first three words are the
/// orientation pass's `dispatch_workgroups_indirect` arguments, the last
/// three the descriptor pass's.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct IndirectDispatchRecord {
    pub orientation_x: u32,
    pub orientation_y: u32,
    pub orientation_z: u32,
    pub descriptor_x: u32,
    pub descriptor_y: u32,
    pub descriptor_z: u32,
}

impl IndirectDispatchRecord {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Orientation dispatch offset (word 0) within the combined buffer.
    pub const ORIENTATION_OFFSET: u64 = 0;
    /// Descriptor dispatch offset (word 3) within the combined buffer.
    pub const DESCRIPTOR_OFFSET: u64 = 3 * std::mem::size_of::<u32>() as u64;

    /// Derives the record from `count`: `ori_x = min(count, 65535)`,
    /// `ori_y = ceil(count / 65535)`, `desc_x = ceil(count / 64)`, each
    /// floored at 1 so an empty dispatch is still valid.
    pub fn from_count(count: u32) -> Self {
        let ori_x = count.min(65535).max(1);
        let ori_y = div_ceil(count, 65535).max(1);
        let desc_x = div_ceil(count, 64).max(1);
        IndirectDispatchRecord {
            orientation_x: ori_x,
            orientation_y: ori_y,
            orientation_z: 1,
            descriptor_x: desc_x,
            descriptor_y: 1,
            descriptor_z: 1,
        }
    }
}

fn div_ceil(a: u32, b: u32) -> u32 {
    if a == 0 {
        0
    } else {
        (a + b - 1) / b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_count_dispatches_floor_at_one() {
        let rec = IndirectDispatchRecord::from_count(0);
        assert_eq!(rec.orientation_x, 1);
        assert_eq!(rec.orientation_y, 1);
        assert_eq!(rec.descriptor_x, 1);
    }

    #[test]
    fn small_count_uses_count_directly() {
        let rec = IndirectDispatchRecord::from_count(42);
        assert_eq!(rec.orientation_x, 42);
        assert_eq!(rec.orientation_y, 1);
        assert_eq!(rec.descriptor_x, 1); // ceil(42/64) = 1
    }

    #[test]
    fn large_count_spreads_into_y_dimension() {
        let rec = IndirectDispatchRecord::from_count(70_000);
        assert_eq!(rec.orientation_x, 65535);
        assert_eq!(rec.orientation_y, 2);
        assert_eq!(rec.descriptor_x, div_ceil(70_000, 64));
    }

    #[test]
    fn keypoint_record_round_trips_scale_restore() {
        let rec = GpuKeypointRecord {
            x: 10.0,
            y: 20.0,
            octave: 2.0,
            scale: 1.0,
            sigma: 3.2,
            orientation: 1.5,
            _pad0: 0.0,
            _pad1: 0.0,
        };
        let kp = rec.to_keypoint(0.5);
        assert_eq!(kp.x, 5.0);
        assert_eq!(kp.y, 10.0);
        assert_eq!(kp.octave, 2);
        assert_eq!(kp.sigma, 1.6);
    }
}
