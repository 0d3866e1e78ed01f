use approx::assert_abs_diff_eq;
use geometric_blur::ring::{ring_offsets, RING_RADII};
use geometric_blur::{
    ChannelImage, Error, Executor, ExtraChannels, GeometricBlur, KeyPoint, PixelSnap, Sequential,
    DESCRIPTOR_LEN,
};
use log::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

fn random_image(channels: usize, width: usize, height: usize, seed: u64) -> ChannelImage {
    let mut rng = Pcg64::seed_from_u64(seed);
    let mut image = ChannelImage::new(channels, width, height);
    image.mapv_inplace(|_| rng.gen_range(0.0f32..1.0));
    image
}

/// Center tap of the normalized sigma=2 kernel.
fn center_tap_sigma_2() -> f64 {
    1.0 / (1.0 + 2.0 * (1..7).map(|x| (-(x * x) as f64 / 8.0).exp()).sum::<f64>())
}

#[test]
fn single_pixel_impulse() {
    let _ = pretty_env_logger::try_init_timed();
    let mut image = ChannelImage::new(4, 10, 10);
    image.put(5, 5, 0, 1.0);
    let descriptors = GeometricBlur::default()
        .describe(&image, &[KeyPoint::at(5.0, 5.0)], &Sequential)
        .unwrap();
    info!("Described {} keypoints", descriptors.len());
    assert!(descriptors.failed_planes.is_empty());
    assert_eq!(descriptors.matrix.dim(), (1, DESCRIPTOR_LEN));

    let row = descriptors.row(0);
    let k0 = center_tap_sigma_2();
    assert_abs_diff_eq!(row[0], k0 * k0, epsilon = 1e-12);
    // Channel 0 rings see a blurred copy of the impulse.
    assert!(row.iter().take(49).skip(1).all(|&v| v > 0.0));
    // Channels 1 to 3 are empty.
    assert!(row.iter().skip(49).all(|&v| v == 0.0));
}

#[test]
fn shape_and_extra_channels() {
    let _ = pretty_env_logger::try_init_timed();
    let image = random_image(6, 24, 17, 0);
    let keypoints: Vec<KeyPoint> = (0..9)
        .map(|i| KeyPoint::at(i as f32 * 2.5, i as f32 * 1.5))
        .collect();
    let config = GeometricBlur::new(1.0, 8.0, 7);
    let descriptors = config.describe(&image, &keypoints, &Sequential).unwrap();
    assert_eq!(descriptors.matrix.dim(), (9, 196));

    // Extra channels never reach the descriptor.
    let mut first_four = image.clone();
    first_four.0 = image.slice(ndarray::s![..4, .., ..]).to_owned();
    let reference = config.describe(&first_four, &keypoints, &Sequential).unwrap();
    assert_eq!(descriptors.matrix, reference.matrix);
}

#[test]
fn describing_twice_gives_the_same_result() {
    let image = random_image(4, 32, 20, 1);
    let keypoints = [
        KeyPoint::at(3.0, 4.0),
        KeyPoint::at(16.2, 10.9),
        KeyPoint::at(31.0, 19.0),
    ];
    let config = GeometricBlur::default();
    let first = config.describe(&image, &keypoints, &Sequential).unwrap();
    let second = config.describe(&image, &keypoints, &Sequential).unwrap();
    assert_eq!(first.matrix, second.matrix);
}

#[test]
fn equal_keypoints_give_equal_rows() {
    let image = random_image(4, 20, 20, 2);
    let keypoints = [
        KeyPoint::at(7.0, 9.0),
        KeyPoint::at(1.0, 1.0),
        KeyPoint::at(7.0, 9.0),
    ];
    let descriptors = GeometricBlur::default()
        .describe(&image, &keypoints, &Sequential)
        .unwrap();
    assert_eq!(descriptors.row(0), descriptors.row(2));
    assert_ne!(descriptors.row(0), descriptors.row(1));
}

#[test]
fn keypoints_in_input_order() {
    let image = random_image(4, 20, 20, 3);
    let keypoints = [KeyPoint::at(2.0, 3.0), KeyPoint::at(15.0, 4.0)];
    let config = GeometricBlur::default();
    let both = config.describe(&image, &keypoints, &Sequential).unwrap();
    for (i, keypoint) in keypoints.iter().enumerate() {
        let single = config.describe(&image, &[*keypoint], &Sequential).unwrap();
        assert_eq!(both.row(i), single.row(0));
    }
}

#[test]
fn border_keypoints_read_mirrored_samples() {
    let image = random_image(4, 10, 10, 4);
    let config = GeometricBlur::default();
    let volume = config.build_volume(&image, &Sequential).unwrap();
    for &(x, y) in &[(0isize, 0isize), (9, 9)] {
        let descriptors = config
            .assemble_descriptors(&volume, &[KeyPoint::at(x as f32, y as f32)], &Sequential)
            .unwrap();
        let row = descriptors.row(0);
        let mut column = 0;
        for channel in 0..4 {
            assert_eq!(row[column], volume.sample(x, y, channel, 0));
            column += 1;
            for (ring, &radius) in RING_RADII.iter().enumerate() {
                for (dx, dy) in ring_offsets(radius) {
                    let mx = mirror(x + dx as isize, 10);
                    let my = mirror(y + dy as isize, 10);
                    assert_eq!(
                        row[column],
                        volume.plane(channel, ring + 1)[[my, mx]],
                        "keypoint ({x}, {y}) column {column}"
                    );
                    column += 1;
                }
            }
        }
        assert_eq!(column, DESCRIPTOR_LEN);
    }
}

/// Reflect without repeating the edge pixel, one bounce at a time.
fn mirror(mut i: isize, len: isize) -> usize {
    loop {
        if i < 0 {
            i = -i;
        } else if i >= len {
            i = 2 * (len - 1) - i;
        } else {
            return i as usize;
        }
    }
}

#[test]
fn constant_sigma_ramp_repeats_the_same_blur() {
    let image = random_image(4, 12, 12, 5);
    let volume = GeometricBlur::new(3.0, 3.0, 5)
        .build_volume(&image, &Sequential)
        .unwrap();
    for channel in 0..4 {
        for level in 1..5 {
            assert_eq!(volume.plane(channel, 0), volume.plane(channel, level));
        }
    }
}

#[test]
fn pixel_snap_changes_the_sampled_pixel() {
    let image = random_image(4, 16, 16, 6);
    let keypoints = [KeyPoint::at(5.7, 5.7)];
    let truncate = GeometricBlur::default()
        .describe(&image, &keypoints, &Sequential)
        .unwrap();
    let round = GeometricBlur {
        pixel_snap: PixelSnap::Round,
        ..Default::default()
    }
    .describe(&image, &keypoints, &Sequential)
    .unwrap();
    let at_5 = GeometricBlur::default()
        .describe(&image, &[KeyPoint::at(5.0, 5.0)], &Sequential)
        .unwrap();
    let at_6 = GeometricBlur::default()
        .describe(&image, &[KeyPoint::at(6.0, 6.0)], &Sequential)
        .unwrap();
    assert_eq!(truncate.matrix, at_5.matrix);
    assert_eq!(round.matrix, at_6.matrix);
}

#[test]
fn configuration_errors() {
    let image = random_image(4, 8, 8, 7);
    let keypoints = [KeyPoint::at(1.0, 1.0)];
    assert!(matches!(
        GeometricBlur::new(2.0, 10.0, 4).describe(&image, &keypoints, &Sequential),
        Err(Error::TooFewBlurLevels { levels: 4, .. })
    ));
    assert!(matches!(
        GeometricBlur::new(5.0, 4.0, 5).describe(&image, &keypoints, &Sequential),
        Err(Error::InvertedSigmaRange { .. })
    ));
    assert!(matches!(
        GeometricBlur::default().describe(&random_image(2, 8, 8, 8), &keypoints, &Sequential),
        Err(Error::TooFewChannels { found: 2, .. })
    ));
    let strict = GeometricBlur {
        extra_channels: ExtraChannels::Reject,
        ..Default::default()
    };
    assert!(matches!(
        strict.describe(&random_image(5, 8, 8, 9), &keypoints, &Sequential),
        Err(Error::UnexpectedChannels { found: 5, .. })
    ));
}

#[test]
fn oversized_kernels_are_reported() {
    let _ = pretty_env_logger::try_init_timed();
    let image = random_image(4, 8, 8, 10);
    let descriptors = GeometricBlur::new(1.0, 1e6, 5)
        .describe(&image, &[KeyPoint::at(4.0, 4.0)], &Sequential)
        .unwrap();
    // Only level 0 is small enough to blur.
    assert_eq!(descriptors.failed_planes.len(), 16);
    assert!(descriptors
        .failed_planes
        .iter()
        .all(|failure| failure.level >= 1 && matches!(failure.error, Error::KernelTooLarge { .. })));
    let row = descriptors.row(0);
    for channel in 0..4 {
        assert!(row[channel * 49] > 0.0);
        assert!(row
            .iter()
            .skip(channel * 49 + 1)
            .take(48)
            .all(|&v| v == 0.0));
    }
}

#[test]
fn empty_keypoint_list() {
    let descriptors = GeometricBlur::default()
        .describe(&random_image(4, 8, 8, 11), &[], &Sequential)
        .unwrap();
    assert!(descriptors.is_empty());
    assert_eq!(descriptors.matrix.dim(), (0, DESCRIPTOR_LEN));
}

#[cfg(feature = "rayon")]
#[test]
fn thread_pool_matches_sequential() {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .unwrap();
    let image = random_image(5, 40, 30, 12);
    let keypoints: Vec<KeyPoint> = (0..20)
        .map(|i| KeyPoint::at((i * 2) as f32, i as f32))
        .collect();
    let config = GeometricBlur::default();
    let sequential = config.describe(&image, &keypoints, &Sequential).unwrap();
    let parallel = config.describe(&image, &keypoints, &pool).unwrap();
    let global = config
        .describe(&image, &keypoints, &geometric_blur::GlobalPool)
        .unwrap();
    assert_eq!(sequential.matrix, parallel.matrix);
    assert_eq!(sequential.matrix, global.matrix);
}

#[test]
fn describe_image_file() {
    let _ = pretty_env_logger::try_init_timed();
    let path = std::env::temp_dir().join("geometric_blur_describe_image_file.png");
    let gray = image::GrayImage::from_fn(32, 24, |x, _| image::Luma([if x < 16 { 0 } else { 255 }]));
    gray.save(&path).unwrap();

    let keypoints = [KeyPoint::at(15.0, 12.0)];
    let descriptors = GeometricBlur::default()
        .describe_path(&path, &keypoints, &Sequential)
        .unwrap();
    let _ = std::fs::remove_file(&path);
    let row = descriptors.row(0);
    // A dark to bright step only excites the rising horizontal channel.
    assert!(row[0] > 0.0);
    assert!(row.iter().skip(49).take(49).all(|&v| v == 0.0));

    assert!(matches!(
        GeometricBlur::default().describe_path(
            std::env::temp_dir().join("geometric_blur_missing.png"),
            &keypoints,
            &Sequential
        ),
        Err(Error::Image(_))
    ));
}

#[test]
fn far_away_keypoints_do_not_overflow() {
    let image = random_image(4, 16, 16, 13);
    let config = GeometricBlur::default();
    let describe = |x: f32| {
        config
            .describe(&image, &[KeyPoint::at(x, 4.0)], &Sequential)
            .unwrap()
            .matrix
    };
    assert_eq!(describe(1e30), describe(isize::MAX.rem_euclid(30) as f32));
    assert_eq!(describe(-1e30), describe(isize::MIN.rem_euclid(30) as f32));
}

#[test]
fn nan_keypoints_are_rejected() {
    let image = random_image(4, 8, 8, 14);
    assert!(matches!(
        GeometricBlur::default().describe(&image, &[KeyPoint::at(f32::NAN, 1.0)], &Sequential),
        Err(Error::NonFiniteKeyPoint { index: 0, .. })
    ));
}

/// Runs jobs in order on the calling thread and counts them.
#[derive(Default)]
struct CountingExecutor {
    batches: AtomicUsize,
    jobs: AtomicUsize,
    rayon_jobs: AtomicUsize,
}

impl Executor for CountingExecutor {
    fn map<I, O, F>(&self, inputs: Vec<I>, job: F) -> Vec<O>
    where
        I: Send,
        O: Send,
        F: Fn(I) -> O + Send + Sync,
    {
        self.batches.fetch_add(1, Ordering::SeqCst);
        Sequential.map(inputs, |input| {
            self.jobs.fetch_add(1, Ordering::SeqCst);
            #[cfg(feature = "rayon")]
            if rayon::current_thread_index().is_some() {
                self.rayon_jobs.fetch_add(1, Ordering::SeqCst);
            }
            job(input)
        })
    }
}

#[test]
fn all_work_runs_on_the_given_executor() {
    let image = random_image(4, 12, 12, 15);
    let keypoints = [KeyPoint::at(1.0, 2.0), KeyPoint::at(6.0, 6.0), KeyPoint::at(11.0, 0.0)];
    let executor = CountingExecutor::default();
    let descriptors = GeometricBlur::default()
        .describe(&image, &keypoints, &executor)
        .unwrap();
    assert_eq!(descriptors.len(), 3);
    // One batch of 5 levels x 4 channels planes, one batch of keypoints.
    assert_eq!(executor.batches.load(Ordering::SeqCst), 2);
    assert_eq!(executor.jobs.load(Ordering::SeqCst), 20 + 3);
    assert_eq!(executor.rayon_jobs.load(Ordering::SeqCst), 0);

    let sequential = GeometricBlur::default()
        .describe(&image, &keypoints, &Sequential)
        .unwrap();
    assert_eq!(descriptors.matrix, sequential.matrix);
}
