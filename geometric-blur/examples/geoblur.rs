use std::{fs, io::Write, path::Path};

use geometric_blur::{column_headers, GeometricBlur, KeyPoint, Sequential};

fn replace_ext(filename: &str, new: &str) -> String {
    let stemmed = Path::new(filename).file_stem().unwrap().to_str().unwrap();
    format!("{stemmed}{new}")
}

/// Reads one `x, y` pair per line. Lines that do not parse are skipped.
fn read_keypoints(path: &str) -> Vec<KeyPoint> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter_map(|line| {
            let mut fields = line.split(',').map(|field| field.trim().parse::<f32>());
            match (fields.next(), fields.next()) {
                (Some(Ok(x)), Some(Ok(y))) => Some(KeyPoint::at(x, y)),
                _ => None,
            }
        })
        .collect()
}

/// Usage: `geoblur <image> <keypoints.csv>`
///
/// Writes `<image stem>_geoblur.csv` with one descriptor per keypoint.
fn main() {
    pretty_env_logger::init_timed();
    let args: Vec<_> = std::env::args().collect();
    let (image_path, keypoint_path) = match &args[..] {
        [_, image, keypoints] => (image, keypoints),
        _ => {
            eprintln!("usage: {} <image> <keypoints.csv>", args[0]);
            std::process::exit(2);
        }
    };
    let keypoints = read_keypoints(keypoint_path);
    let descriptors = GeometricBlur::default()
        .describe_path(image_path, &keypoints, &Sequential)
        .unwrap();
    for failure in &descriptors.failed_planes {
        eprintln!(
            "channel {} level {} was not blurred: {}",
            failure.channel, failure.level, failure.error
        );
    }

    let mut out = fs::File::create(replace_ext(image_path, "_geoblur.csv")).unwrap();
    writeln!(out, "x, y, {}", column_headers().join(", ")).unwrap();
    for (keypoint, row) in keypoints.iter().zip(descriptors.matrix.outer_iter()) {
        let values: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(
            out,
            "{}, {}, {}",
            keypoint.point.0,
            keypoint.point.1,
            values.join(", ")
        )
        .unwrap();
    }
}
