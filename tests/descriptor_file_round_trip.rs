//! Descriptor file formats round-trip through the filesystem, not just an
//! in-memory buffer — this exercises the `Read`/`Write` trait boundary the
//! unit tests in `src/io` don't.

use std::fs::File;
use std::io::{BufReader, BufWriter};

use sift_gpu::io::{binary, text};
use sift_gpu::{Descriptor, Keypoint};

fn sample_data() -> (Vec<Keypoint>, Vec<Descriptor>) {
    let keypoints = vec![
        Keypoint { x: 10.0, y: 20.0, octave: 0, scale: 1, sigma: 1.6, orientation: 0.2 },
        Keypoint { x: 30.5, y: 40.25, octave: 1, scale: 2, sigma: 3.2, orientation: 2.1 },
    ];
    let mut bins0 = [0f32; 128];
    bins0[3] = 1.0;
    let mut bins1 = [0f32; 128];
    bins1[0] = 0.6;
    bins1[1] = 0.8;
    let descriptors = vec![Descriptor::Float(Box::new(bins0)), Descriptor::Float(Box::new(bins1))];
    (keypoints, descriptors)
}

#[test]
fn binary_format_round_trips_through_a_real_file() {
    let (keypoints, descriptors) = sample_data();
    let path = std::env::temp_dir().join(format!("sift_gpu_test_{}.wsft", std::process::id()));

    {
        let mut writer = BufWriter::new(File::create(&path).unwrap());
        binary::write(&mut writer, &keypoints, &descriptors, 800, 600).unwrap();
    }
    let (round_kp, round_desc, dims) = {
        let mut reader = BufReader::new(File::open(&path).unwrap());
        binary::read(&mut reader).unwrap()
    };
    std::fs::remove_file(&path).ok();

    assert_eq!(dims, (800, 600));
    assert_eq!(round_kp.len(), 2);
    assert_eq!(round_kp[1].octave, 1);
    assert_eq!(round_desc[0].as_float().unwrap()[3], 1.0);
}

#[test]
fn text_format_round_trips_through_a_real_file() {
    let (keypoints, descriptors) = sample_data();
    let path = std::env::temp_dir().join(format!("sift_gpu_test_{}.sift.txt", std::process::id()));

    {
        let mut writer = BufWriter::new(File::create(&path).unwrap());
        text::write(&mut writer, &keypoints, &descriptors).unwrap();
    }
    let (round_kp, round_desc) = {
        let mut reader = BufReader::new(File::open(&path).unwrap());
        text::read(&mut reader).unwrap()
    };
    std::fs::remove_file(&path).ok();

    assert_eq!(round_kp.len(), 2);
    assert!((round_kp[0].x - 10.0).abs() < 1e-2);
    assert_eq!(round_desc.len(), 2);
}
