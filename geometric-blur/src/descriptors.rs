use crate::executor::Executor;
use crate::image::mirror_period_index;
use crate::ring::{ring_offsets, RING_RADII, SAMPLES_PER_RING};
use crate::{BlurVolume, Error, GeometricBlur, KeyPoint, PlaneFailure};
use ndarray::{Array2, ArrayView1, Axis};

/// Number of leading image channels that are sampled.
pub const DESCRIPTOR_CHANNELS: usize = 4;

/// Blur levels needed by the descriptor: level 0 for the center, one per ring.
pub const REQUIRED_BLUR_LEVELS: usize = RING_RADII.len() + 1;

/// Length of one descriptor: per channel the center plus every ring sample.
pub const DESCRIPTOR_LEN: usize = DESCRIPTOR_CHANNELS * (1 + RING_RADII.len() * SAMPLES_PER_RING);

type Rings = [[(i32, i32); SAMPLES_PER_RING]; RING_RADII.len()];

/// Descriptors of a keypoint list, one row per keypoint in input order.
#[derive(Debug)]
pub struct Descriptors {
    /// Shape `(keypoints, DESCRIPTOR_LEN)`.
    pub matrix: Array2<f64>,
    /// Blur planes that were zero-filled while building the volume.
    pub failed_planes: Vec<PlaneFailure>,
}

impl Descriptors {
    pub fn len(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.nrows() == 0
    }

    pub fn row(&self, index: usize) -> ArrayView1<f64> {
        self.matrix.index_axis(Axis(0), index)
    }
}

/// Human readable column labels, "Descriptor Value #1" to "Descriptor Value #196".
pub fn column_headers() -> Vec<String> {
    (1..=DESCRIPTOR_LEN)
        .map(|i| format!("Descriptor Value #{i}"))
        .collect()
}

impl GeometricBlur {
    /// Extract descriptors from keypoints/a blur volume
    ///
    /// # Arguments
    /// * `volume` - a fully built blur volume with at least 4 channels and 5 levels.
    /// * `keypoints` - the keypoints to describe, sharing one position across channels.
    /// * `executor` - runs one job per keypoint.
    /// # Return value
    /// A matrix with one [`DESCRIPTOR_LEN`] row per keypoint, in input order.
    pub fn assemble_descriptors<E: Executor>(
        &self,
        volume: &BlurVolume,
        keypoints: &[KeyPoint],
        executor: &E,
    ) -> Result<Array2<f64>, Error> {
        self.check_channels(volume.channels())?;
        if volume.levels() < REQUIRED_BLUR_LEVELS {
            return Err(Error::TooFewBlurLevels {
                levels: volume.levels(),
                required: REQUIRED_BLUR_LEVELS,
            });
        }
        if let Some((index, keypoint)) = keypoints
            .iter()
            .enumerate()
            .find(|(_, keypoint)| !(keypoint.point.0.is_finite() && keypoint.point.1.is_finite()))
        {
            return Err(Error::NonFiniteKeyPoint {
                index,
                x: keypoint.point.0,
                y: keypoint.point.1,
            });
        }
        let rings: Rings = RING_RADII.map(ring_offsets);

        let rows: Vec<[f64; DESCRIPTOR_LEN]> =
            executor.map(keypoints.iter().collect(), |keypoint: &KeyPoint| {
                self.get_descriptor(keypoint, volume, &rings)
            });

        Ok(Array2::from_shape_vec(
            (rows.len(), DESCRIPTOR_LEN),
            rows.iter().flatten().copied().collect(),
        )?)
    }

    /// Sample the center and the rings of one keypoint.
    ///
    /// For each channel: the center at level 0, then ring `k` at level `k` in
    /// clockwise order.
    fn get_descriptor(
        &self,
        keypoint: &KeyPoint,
        volume: &BlurVolume,
        rings: &Rings,
    ) -> [f64; DESCRIPTOR_LEN] {
        let (x, y) = self.pixel_snap.snap(keypoint.point);
        // Far away keypoints saturate the cast; this brings them next to the image.
        let x = mirror_period_index(x, volume.width());
        let y = mirror_period_index(y, volume.height());
        let mut descriptor = [0f64; DESCRIPTOR_LEN];
        let mut dpos = 0usize;
        for channel in 0..DESCRIPTOR_CHANNELS {
            descriptor[dpos] = volume.sample(x, y, channel, 0);
            dpos += 1;
            for (ring, offsets) in rings.iter().enumerate() {
                for &(dx, dy) in offsets {
                    descriptor[dpos] =
                        volume.sample(x + dx as isize, y + dy as isize, channel, ring + 1);
                    dpos += 1;
                }
            }
        }
        debug_assert_eq!(dpos, DESCRIPTOR_LEN);
        descriptor
    }
}
