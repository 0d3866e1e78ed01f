//! Geometric blur descriptors for keypoints of multi-channel edge images.
//!
//! Every channel of the input is blurred at a ramp of increasing sigmas. The
//! descriptor of a keypoint then reads the least blurred level at the keypoint
//! itself and increasingly blurred levels on four rings of growing radius around
//! it, so structure far from the point is described more coarsely.
//!
//! The two stages can be run separately ([`GeometricBlur::build_volume`] and
//! [`GeometricBlur::assemble_descriptors`]) or together with
//! [`GeometricBlur::describe`].

mod descriptors;
mod error;
pub mod executor;
pub mod image;
pub mod ring;
mod volume;

pub use crate::descriptors::{
    column_headers, Descriptors, DESCRIPTOR_CHANNELS, DESCRIPTOR_LEN, REQUIRED_BLUR_LEVELS,
};
pub use crate::error::Error;
#[cfg(feature = "rayon")]
pub use crate::executor::GlobalPool;
pub use crate::executor::{Executor, Sequential};
pub use crate::image::ChannelImage;
pub use crate::volume::{BlurVolume, PlaneFailure, SigmaRamp};

use log::*;
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A point of interest in an image.
/// This pretty much follows from OpenCV conventions.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeyPoint {
    /// Position in pixels. `x` grows to the right starting from the left edge
    /// of the image, `y` grows downward starting from the top edge.
    pub point: (f32, f32),
    /// The magnitude of response from the detector.
    pub response: f32,

    /// The radius defining the extent of the keypoint, in pixel units
    pub size: f32,

    /// The octave (or channel) in which the keypoint was detected.
    ///
    /// Not used: all channels share one keypoint list.
    pub octave: usize,

    /// The orientation angle
    pub angle: f32,
}

impl KeyPoint {
    /// A keypoint with only a position.
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            point: (x, y),
            response: 0.0,
            size: 0.0,
            octave: 0,
            angle: 0.0,
        }
    }
}

/// What to do with channels past the first [`DESCRIPTOR_CHANNELS`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExtraChannels {
    /// Blur them along with the others but never sample them.
    #[default]
    Ignore,
    /// Fail with [`Error::UnexpectedChannels`].
    Reject,
}

/// How a keypoint position is turned into a pixel index.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PixelSnap {
    /// Truncate toward zero.
    #[default]
    Truncate,
    /// Round to the nearest pixel, halfway cases away from zero.
    Round,
}

impl PixelSnap {
    /// Snap a position to pixel indices.
    ///
    /// Coordinates beyond the range of `isize` saturate. A NaN coordinate snaps to 0;
    /// [`GeometricBlur::assemble_descriptors`] rejects such keypoints before snapping.
    pub fn snap(self, (x, y): (f32, f32)) -> (isize, isize) {
        match self {
            PixelSnap::Truncate => (x as isize, y as isize),
            PixelSnap::Round => (x.round() as isize, y.round() as isize),
        }
    }
}

/// Contains the configuration parameters of the geometric blur descriptor.
///
/// The blur at level `l` is `min_sigma + l * (max_sigma - min_sigma) / blur_levels`.
/// The center of a descriptor is read from level 0 and its four rings from levels
/// 1 to 4, so `blur_levels` must be at least [`REQUIRED_BLUR_LEVELS`].
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeometricBlur {
    /// Sigma of blur level 0.
    pub min_sigma: f64,

    /// Upper end of the sigma ramp.
    pub max_sigma: f64,

    /// Number of blur levels.
    pub blur_levels: usize,

    /// Policy for images with more than four channels.
    pub extra_channels: ExtraChannels,

    /// How keypoint positions map to pixels.
    pub pixel_snap: PixelSnap,
}

impl GeometricBlur {
    /// Create a `GeometricBlur` with the given sigma ramp and defaults for the rest.
    pub fn new(min_sigma: f64, max_sigma: f64, blur_levels: usize) -> Self {
        Self {
            min_sigma,
            max_sigma,
            blur_levels,
            ..Default::default()
        }
    }
}

impl Default for GeometricBlur {
    fn default() -> GeometricBlur {
        GeometricBlur {
            min_sigma: 2.0,
            max_sigma: 10.0,
            blur_levels: 5,
            extra_channels: ExtraChannels::Ignore,
            pixel_snap: PixelSnap::Truncate,
        }
    }
}

impl GeometricBlur {
    /// The validated sigma ramp of this configuration.
    pub fn sigma_ramp(&self) -> Result<SigmaRamp, Error> {
        let ramp = SigmaRamp::new(self.min_sigma, self.max_sigma, self.blur_levels)?;
        if self.blur_levels < REQUIRED_BLUR_LEVELS {
            return Err(Error::TooFewBlurLevels {
                levels: self.blur_levels,
                required: REQUIRED_BLUR_LEVELS,
            });
        }
        Ok(ramp)
    }

    fn check_channels(&self, found: usize) -> Result<(), Error> {
        if found < DESCRIPTOR_CHANNELS {
            return Err(Error::TooFewChannels {
                found,
                required: DESCRIPTOR_CHANNELS,
            });
        }
        if found > DESCRIPTOR_CHANNELS && self.extra_channels == ExtraChannels::Reject {
            return Err(Error::UnexpectedChannels {
                found,
                expected: DESCRIPTOR_CHANNELS,
            });
        }
        Ok(())
    }

    /// Blur every channel of `image` at every level of the sigma ramp.
    ///
    /// The configuration and the channel count are checked before any work is done.
    pub fn build_volume<E: Executor>(
        &self,
        image: &ChannelImage,
        executor: &E,
    ) -> Result<BlurVolume, Error> {
        let ramp = self.sigma_ramp()?;
        self.check_channels(image.num_channels())?;
        debug!(
            "Building a {} x {} x {} blur volume with {} levels.",
            image.width(),
            image.height(),
            image.num_channels(),
            ramp.levels()
        );
        BlurVolume::build(image, &ramp, executor)
    }

    /// Compute descriptors for all keypoints of an image.
    ///
    /// This performs all operations end-to-end: validating the configuration,
    /// building the blur volume on `executor` and sampling every keypoint.
    ///
    /// # Arguments
    /// * `image` - At least four channels. All channels share `keypoints`.
    /// * `keypoints` - The keypoints to describe.
    /// * `executor` - Runs the blur jobs and the per keypoint sampling jobs.
    ///
    /// Returns one row per keypoint and any blur planes that had to be zero-filled.
    ///
    /// # Example
    /// ```
    /// use geometric_blur::{ChannelImage, GeometricBlur, KeyPoint, Sequential};
    ///
    /// let image = ChannelImage::new(4, 32, 32);
    /// let keypoints = [KeyPoint::at(16.0, 16.0)];
    /// let descriptors = GeometricBlur::default()
    ///     .describe(&image, &keypoints, &Sequential)
    ///     .unwrap();
    /// assert_eq!(descriptors.matrix.dim(), (1, 196));
    /// ```
    pub fn describe<E: Executor>(
        &self,
        image: &ChannelImage,
        keypoints: &[KeyPoint],
        executor: &E,
    ) -> Result<Descriptors, Error> {
        let volume = self.build_volume(image, executor)?;
        trace!("Extracting descriptors.");
        let matrix = self.assemble_descriptors(&volume, keypoints, executor)?;
        info!("Extracted {} descriptors", matrix.nrows());
        Ok(Descriptors {
            matrix,
            failed_planes: volume.into_failures(),
        })
    }

    /// Compute descriptors for keypoints of an image on disk.
    ///
    /// The image is converted to four oriented edge channels with
    /// [`ChannelImage::from_dynamic`] first.
    pub fn describe_path<E: Executor>(
        &self,
        path: impl AsRef<Path>,
        keypoints: &[KeyPoint],
        executor: &E,
    ) -> Result<Descriptors, Error> {
        let image = ChannelImage::from_dynamic(&::image::open(path)?)?;
        self.describe(&image, keypoints, executor)
    }
}
