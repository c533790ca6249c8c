//! The Lowe/VisualSFM-style plain-text descriptor format: a header line
//! `"<count> 128"` followed by one line per keypoint, each a
//! whitespace-separated `x y scale orientation d0 d1 … d127` row of
//! integer-quantized descriptor bins.
//!
//! The save and load scale factors intentionally differ (512 on save, 128
//! on load) to match the de facto VisualSFM reader behavior this format
//! grew out of — see the text-format note in `DESIGN.md`. Round-tripping a
//! descriptor through this format is therefore only guaranteed to preserve
//! its *direction* after L2 renormalization, not its raw magnitude.

use std::io::{BufRead, Write};

use crate::descriptor::{Descriptor, DESCRIPTOR_DIMS};
use crate::error::{Result, SiftError};
use crate::keypoint::Keypoint;

const SAVE_SCALE: f32 = 512.0;
const LOAD_DIVISOR: f32 = 128.0;

pub fn write<W: Write>(writer: &mut W, keypoints: &[Keypoint], descriptors: &[Descriptor]) -> Result<()> {
    if keypoints.len() != descriptors.len() {
        return Err(SiftError::bad_config(format!(
            "keypoint count {} does not match descriptor count {}",
            keypoints.len(),
            descriptors.len()
        )));
    }

    writeln!(writer, "{} {}", keypoints.len(), DESCRIPTOR_DIMS)?;
    for (kp, descriptor) in keypoints.iter().zip(descriptors.iter()) {
        let bins = as_float_bins(descriptor);
        write!(writer, "{} {} {} {}", kp.x, kp.y, kp.sigma, kp.orientation)?;
        for v in bins.iter() {
            let quantum = (v * SAVE_SCALE).round().clamp(0.0, 255.0) as u32;
            write!(writer, " {quantum}")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

pub fn read<R: BufRead>(reader: &mut R) -> Result<(Vec<Keypoint>, Vec<Descriptor>)> {
    let mut lines = reader.lines();
    let header = lines
        .next()
        .ok_or_else(|| SiftError::parse("empty descriptor text file"))??;
    let mut header_fields = header.split_whitespace();
    let count: usize = header_fields
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| SiftError::parse("missing keypoint count in header"))?;
    let dim: usize = header_fields
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| SiftError::parse("missing descriptor dimension in header"))?;
    if dim != DESCRIPTOR_DIMS {
        return Err(SiftError::parse(format!(
            "unexpected descriptor dimension {dim}, expected {DESCRIPTOR_DIMS}"
        )));
    }

    let mut keypoints = Vec::with_capacity(count);
    let mut descriptors = Vec::with_capacity(count);
    for _ in 0..count {
        let line = lines
            .next()
            .ok_or_else(|| SiftError::parse("descriptor file truncated before all rows were read"))??;
        let mut fields = line.split_whitespace();
        let x: f32 = next_field(&mut fields, "x")?;
        let y: f32 = next_field(&mut fields, "y")?;
        let sigma: f32 = next_field(&mut fields, "scale")?;
        let orientation: f32 = next_field(&mut fields, "orientation")?;

        let mut bins = [0f32; DESCRIPTOR_DIMS];
        for v in bins.iter_mut() {
            let quantum: f32 = next_field(&mut fields, "descriptor bin")?;
            *v = quantum / LOAD_DIVISOR;
        }

        keypoints.push(Keypoint { x, y, octave: 0, scale: 0, sigma, orientation });
        descriptors.push(Descriptor::Float(Box::new(bins)));
    }
    Ok((keypoints, descriptors))
}

fn next_field<T: std::str::FromStr>(fields: &mut std::str::SplitWhitespace<'_>, name: &str) -> Result<T> {
    fields
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| SiftError::parse(format!("missing or malformed {name} field")))
}

fn as_float_bins(descriptor: &Descriptor) -> [f32; DESCRIPTOR_DIMS] {
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

    fn unit_vector_descriptor() -> Descriptor {
        let mut bins = [0f32; DESCRIPTOR_DIMS];
        bins[0] = 0.6;
        bins[1] = 0.8;
        Descriptor::Float(Box::new(bins))
    }

    #[test]
    fn round_trip_preserves_direction_after_renormalization() {
        let keypoints = vec![Keypoint { x: 4.0, y: 5.0, octave: 0, scale: 1, sigma: 1.6, orientation: 0.5 }];
        let descriptors = vec![unit_vector_descriptor()];

        let mut buf = Vec::new();
        write(&mut buf, &keypoints, &descriptors).unwrap();

        let (round_kp, round_desc) = read(&mut std::io::Cursor::new(buf)).unwrap();
        assert_eq!(round_kp.len(), 1);
        assert!((round_kp[0].x - 4.0).abs() < 1e-3);

        let loaded = round_desc[0].as_float().unwrap();
        let norm: f32 = loaded.iter().map(|v| v * v).sum::<f32>().sqrt();
        let normalized: Vec<f32> = loaded.iter().map(|v| v / norm).collect();
        assert!((normalized[0] - 0.6).abs() < 0.01);
        assert!((normalized[1] - 0.8).abs() < 0.01);
    }

    #[test]
    fn rejects_wrong_dimension_header() {
        let mut buf = Vec::new();
        writeln!(buf, "1 64").unwrap();
        writeln!(buf, "0 0 1.0 0.0").unwrap();
        let err = read(&mut std::io::Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, SiftError::Parse { .. }));
    }

    #[test]
    fn rejects_truncated_rows() {
        let mut buf = Vec::new();
        writeln!(buf, "1 128").unwrap();
        let err = read(&mut std::io::Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, SiftError::Parse { .. }));
    }
}
