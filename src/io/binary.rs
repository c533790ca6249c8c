//! The `WSFT` binary descriptor file format: a fixed 32-byte header
//! followed by one fixed-size record per keypoint.
//!
//! Record layout (532 bytes): `x, y, scale, orientation` as `f32` (16
//! bytes), `octave` as `i32` (4 bytes), then 128 `f32` descriptor bins
//! (512 bytes). Always little-endian, always float descriptors — callers
//! holding [`Descriptor::Quantized`] values must dequantize before saving.

use std::io::{Read, Write};

use crate::descriptor::{Descriptor, DESCRIPTOR_DIMS};
use crate::error::{Result, SiftError};
use crate::keypoint::Keypoint;

const MAGIC: [u8; 4] = *b"WSFT";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 4 + 4 + 4 + 8; // magic, version, count, dim, width, height, reserved
const RECORD_LEN: usize = 4 * 4 + 4 + DESCRIPTOR_DIMS * 4; // x,y,scale,orientation + octave + 128 bins

/// Writes `keypoints`/`descriptors` (equal length, index-paired) to `writer`
/// as a `WSFT` file. `original_width`/`original_height` record the
/// coordinate space the keypoints are expressed in.
pub fn write<W: Write>(
    writer: &mut W,
    keypoints: &[Keypoint],
    descriptors: &[Descriptor],
    original_width: u32,
    original_height: u32,
) -> Result<()> {
    if keypoints.len() != descriptors.len() {
        return Err(SiftError::bad_config(format!(
            "keypoint count {} does not match descriptor count {}",
            keypoints.len(),
            descriptors.len()
        )));
    }

    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(&MAGIC);
    header.extend_from_slice(&VERSION.to_le_bytes());
    header.extend_from_slice(&(keypoints.len() as u32).to_le_bytes());
    header.extend_from_slice(&(DESCRIPTOR_DIMS as u32).to_le_bytes());
    header.extend_from_slice(&original_width.to_le_bytes());
    header.extend_from_slice(&original_height.to_le_bytes());
    header.extend_from_slice(&[0u8; 8]);
    writer.write_all(&header)?;

    let mut record = [0u8; RECORD_LEN];
    for (kp, descriptor) in keypoints.iter().zip(descriptors.iter()) {
        record[0..4].copy_from_slice(&kp.x.to_le_bytes());
        record[4..8].copy_from_slice(&kp.y.to_le_bytes());
        record[8..12].copy_from_slice(&(kp.sigma).to_le_bytes());
        record[12..16].copy_from_slice(&kp.orientation.to_le_bytes());
        record[16..20].copy_from_slice(&kp.octave.to_le_bytes());

        let bins = dequantize(descriptor);
        for (i, v) in bins.iter().enumerate() {
            let offset = 20 + i * 4;
            record[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
        }
        writer.write_all(&record)?;
    }
    Ok(())
}

/// Reads a `WSFT` file, returning index-paired keypoints, float descriptors,
/// and the `(width, height)` the coordinates were captured at.
pub fn read<R: Read>(reader: &mut R) -> Result<(Vec<Keypoint>, Vec<Descriptor>, (u32, u32))> {
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header)?;
    if header[0..4] != MAGIC {
        return Err(SiftError::parse("bad magic: not a WSFT descriptor file"));
    }
    let version = u32::from_le_bytes(header[4..8].try_into().unwrap());
    if version != VERSION {
        return Err(SiftError::parse(format!("unsupported WSFT version {version}")));
    }
    let count = u32::from_le_bytes(header[8..12].try_into().unwrap()) as usize;
    let dim = u32::from_le_bytes(header[12..16].try_into().unwrap()) as usize;
    if dim != DESCRIPTOR_DIMS {
        return Err(SiftError::parse(format!(
            "unexpected descriptor dimension {dim}, expected {DESCRIPTOR_DIMS}"
        )));
    }
    let width = u32::from_le_bytes(header[16..20].try_into().unwrap());
    let height = u32::from_le_bytes(header[20..24].try_into().unwrap());

    let mut keypoints = Vec::with_capacity(count);
    let mut descriptors = Vec::with_capacity(count);
    let mut record = [0u8; RECORD_LEN];
    for _ in 0..count {
        reader.read_exact(&mut record)?;
        let x = f32::from_le_bytes(record[0..4].try_into().unwrap());
        let y = f32::from_le_bytes(record[4..8].try_into().unwrap());
        let sigma = f32::from_le_bytes(record[8..12].try_into().unwrap());
        let orientation = f32::from_le_bytes(record[12..16].try_into().unwrap());
        let octave = i32::from_le_bytes(record[16..20].try_into().unwrap());

        let mut bins = [0f32; DESCRIPTOR_DIMS];
        for (i, v) in bins.iter_mut().enumerate() {
            let offset = 20 + i * 4;
            *v = f32::from_le_bytes(record[offset..offset + 4].try_into().unwrap());
        }

        keypoints.push(Keypoint { x, y, octave, scale: 0, sigma, orientation });
        descriptors.push(Descriptor::Float(Box::new(bins)));
    }
    Ok((keypoints, descriptors, (width, height)))
}

fn dequantize(descriptor: &Descriptor) -> [f32; DESCRIPTOR_DIMS] {
    match descriptor {
        Descriptor::Float(bins) => **bins,
        Descriptor::Quantized(bytes) => {
            let mut out = [0f32; DESCRIPTOR_DIMS];
            for (o, &b) in out.iter_mut().zip(bytes.iter()) {
                *o = b as f32 / 512.0;
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_a_byte_buffer() {
        let keypoints = vec![
            Keypoint { x: 12.5, y: 33.0, octave: 1, scale: 2, sigma: 2.4, orientation: 1.1 },
            Keypoint { x: 0.0, y: 0.0, octave: 0, scale: 0, sigma: 1.6, orientation: 0.0 },
        ];
        let mut bins_a = [0f32; DESCRIPTOR_DIMS];
        bins_a[5] = 0.3;
        let descriptors = vec![
            Descriptor::Float(Box::new(bins_a)),
            Descriptor::Float(Box::new([0f32; DESCRIPTOR_DIMS])),
        ];

        let mut buf = Vec::new();
        write(&mut buf, &keypoints, &descriptors, 640, 480).unwrap();

        let (round_kp, round_desc, dims) = read(&mut buf.as_slice()).unwrap();
        assert_eq!(dims, (640, 480));
        assert_eq!(round_kp.len(), 2);
        assert_eq!(round_kp[0].x, 12.5);
        assert_eq!(round_kp[0].octave, 1);
        assert_eq!(round_desc[0].as_float().unwrap()[5], 0.3);
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = vec![0u8; HEADER_LEN];
        let err = read(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, SiftError::Parse { .. }));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let keypoints = vec![Keypoint { x: 0.0, y: 0.0, octave: 0, scale: 0, sigma: 1.0, orientation: 0.0 }];
        let mut buf = Vec::new();
        let err = write(&mut buf, &keypoints, &[], 10, 10).unwrap_err();
        assert!(matches!(err, SiftError::BadConfig { .. }));
    }
}
