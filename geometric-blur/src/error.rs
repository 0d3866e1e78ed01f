use thiserror::Error;

/// Everything that can go wrong while building a blur volume or assembling descriptors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("blur level count must be at least 1")]
    NoBlurLevels,
    #[error("descriptor sampling needs at least {required} blur levels, got {levels}")]
    TooFewBlurLevels { levels: usize, required: usize },
    #[error("sigma must be finite, got min_sigma={min_sigma} max_sigma={max_sigma}")]
    NonFiniteSigma { min_sigma: f64, max_sigma: f64 },
    #[error("min_sigma must not be negative, got {0}")]
    NegativeSigma(f64),
    #[error("max_sigma ({max_sigma}) is smaller than min_sigma ({min_sigma})")]
    InvertedSigmaRange { min_sigma: f64, max_sigma: f64 },
    #[error("image has {found} channels but at least {required} are required")]
    TooFewChannels { found: usize, required: usize },
    #[error("image has {found} channels and extra channels are rejected (expected {expected})")]
    UnexpectedChannels { found: usize, expected: usize },
    #[error("image has no pixels ({width} x {height})")]
    EmptyImage { width: usize, height: usize },
    #[error("keypoint {index} has a non-finite position ({x}, {y})")]
    NonFiniteKeyPoint { index: usize, x: f32, y: f32 },
    #[error("gaussian kernel for sigma={sigma} is not defined")]
    InvalidKernelSigma { sigma: f64 },
    #[error("gaussian kernel radius {radius} for sigma={sigma} exceeds the supported maximum of {max}")]
    KernelTooLarge { sigma: f64, radius: usize, max: usize },
    #[error("plane of {width} x {height} does not match the destination of {dst_width} x {dst_height}")]
    PlaneSizeMismatch {
        width: usize,
        height: usize,
        dst_width: usize,
        dst_height: usize,
    },
    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}
