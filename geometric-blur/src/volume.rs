use crate::executor::Executor;
use crate::image::{gaussian_blur, mirror_index, ChannelImage};
use crate::Error;
use log::*;
use ndarray::{Array4, ArrayView2, ArrayViewMut2, Axis};

/// The linear sigma ramp between a minimum and a maximum blur.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SigmaRamp {
    min_sigma: f64,
    max_sigma: f64,
    levels: usize,
}

impl SigmaRamp {
    /// Validate and construct a ramp of `levels` sigmas starting at `min_sigma`.
    pub fn new(min_sigma: f64, max_sigma: f64, levels: usize) -> Result<Self, Error> {
        if levels == 0 {
            return Err(Error::NoBlurLevels);
        }
        if !min_sigma.is_finite() || !max_sigma.is_finite() {
            return Err(Error::NonFiniteSigma {
                min_sigma,
                max_sigma,
            });
        }
        if min_sigma < 0.0 {
            return Err(Error::NegativeSigma(min_sigma));
        }
        if max_sigma < min_sigma {
            return Err(Error::InvertedSigmaRange {
                min_sigma,
                max_sigma,
            });
        }
        Ok(Self {
            min_sigma,
            max_sigma,
            levels,
        })
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    /// Sigma of the given level.
    ///
    /// The step is `(max - min) / levels`, so `max_sigma` itself is never reached.
    pub fn sigma(&self, level: usize) -> f64 {
        let step = (self.max_sigma - self.min_sigma) / self.levels as f64;
        self.min_sigma + level as f64 * step
    }
}

/// A blur plane that could not be computed. The plane is left zero-filled.
#[derive(Debug)]
pub struct PlaneFailure {
    pub level: usize,
    pub channel: usize,
    pub sigma: f64,
    pub error: Error,
}

/// Every channel of an image, blurred at every level of a sigma ramp.
#[derive(Debug)]
pub struct BlurVolume {
    /// Samples with shape `(levels, channels, height, width)`.
    data: Array4<f64>,
    ramp: SigmaRamp,
    failures: Vec<PlaneFailure>,
}

struct PlaneJob<'a> {
    level: usize,
    channel: usize,
    plane: ArrayViewMut2<'a, f64>,
}

impl BlurVolume {
    /// Blur each channel of `image` at each level of `ramp`.
    ///
    /// Every `(level, channel)` plane is an independent job on `executor`, writing
    /// to its own region of the volume. This returns after all jobs are done. A plane
    /// whose kernel cannot be built is zero-filled and reported instead of failing
    /// the build; see [`BlurVolume::failures`].
    pub fn build<E: Executor>(
        image: &ChannelImage,
        ramp: &SigmaRamp,
        executor: &E,
    ) -> Result<Self, Error> {
        let (channels, height, width) = image.dim();
        if width == 0 || height == 0 {
            return Err(Error::EmptyImage { width, height });
        }
        let levels = ramp.levels();
        for level in 0..levels {
            debug!("Blur level {} uses sigma={}.", level, ramp.sigma(level));
        }

        let mut data = Array4::zeros((levels, channels, height, width));
        let failures: Vec<PlaneFailure> = {
            let mut planes = data
                .view_mut()
                .into_shape((levels * channels, height, width))?;
            let jobs: Vec<PlaneJob> = planes
                .outer_iter_mut()
                .enumerate()
                .map(|(index, plane)| PlaneJob {
                    level: index / channels,
                    channel: index % channels,
                    plane,
                })
                .collect();
            executor
                .map(jobs, |mut job| {
                    let sigma = ramp.sigma(job.level);
                    trace!("Blurring channel {} at level {}.", job.channel, job.level);
                    let source = image.plane(job.channel);
                    match gaussian_blur(source, job.plane.view_mut(), sigma) {
                        Ok(()) => None,
                        Err(error) => {
                            job.plane.fill(0.0);
                            warn!(
                                "Blur of channel {} at level {} (sigma={}) failed: {}",
                                job.channel, job.level, sigma, error
                            );
                            Some(PlaneFailure {
                                level: job.level,
                                channel: job.channel,
                                sigma,
                                error,
                            })
                        }
                    }
                })
                .into_iter()
                .flatten()
                .collect()
        };
        trace!("Blur volume finished.");

        Ok(Self {
            data,
            ramp: *ramp,
            failures,
        })
    }

    pub fn width(&self) -> usize {
        self.data.dim().3
    }

    pub fn height(&self) -> usize {
        self.data.dim().2
    }

    pub fn channels(&self) -> usize {
        self.data.dim().1
    }

    pub fn levels(&self) -> usize {
        self.data.dim().0
    }

    pub fn sigma(&self, level: usize) -> f64 {
        self.ramp.sigma(level)
    }

    /// Every plane that was zero-filled because its blur failed.
    pub fn failures(&self) -> &[PlaneFailure] {
        &self.failures
    }

    pub fn into_failures(self) -> Vec<PlaneFailure> {
        self.failures
    }

    /// Whether every plane was blurred.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// A view of one blurred plane with shape `(height, width)`.
    pub fn plane(&self, channel: usize, level: usize) -> ArrayView2<f64> {
        self.data
            .index_axis(Axis(0), level)
            .index_axis_move(Axis(0), channel)
    }

    #[cfg(test)]
    pub(crate) fn plane_mut(&mut self, channel: usize, level: usize) -> ArrayViewMut2<f64> {
        self.data
            .index_axis_mut(Axis(0), level)
            .index_axis_move(Axis(0), channel)
    }

    /// Read a sample, mirroring `x` and `y` back into the image.
    ///
    /// `channel` and `level` must be in range.
    #[inline]
    pub fn sample(&self, x: isize, y: isize, channel: usize, level: usize) -> f64 {
        let x = mirror_index(x, self.width());
        let y = mirror_index(y, self.height());
        self.data[[level, channel, y, x]]
    }
}
