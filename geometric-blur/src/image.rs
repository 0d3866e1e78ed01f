use crate::Error;
use derive_more::{Deref, DerefMut};
use image::DynamicImage;
use log::*;
use ndarray::{Array2, Array3, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis};
use wide::f64x4;

/// Largest gaussian kernel radius (in pixels) that a blur plane may use.
pub const MAX_KERNEL_RADIUS: usize = 1 << 16;

/// A stack of equally sized single channel float planes.
///
/// The underlying array has the shape `(channels, height, width)` so that each
/// channel is a contiguous plane. For the geometric blur descriptor these are
/// usually oriented edge responses, but any real-valued channels work.
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct ChannelImage(pub Array3<f32>);

impl ChannelImage {
    /// A zero-filled image.
    pub fn new(channels: usize, width: usize, height: usize) -> Self {
        Self(Array3::zeros((channels, height, width)))
    }

    /// Stack planes of shape `(height, width)` into one image, in order.
    pub fn from_planes(planes: &[Array2<f32>]) -> Result<Self, Error> {
        if let Some(first) = planes.first() {
            if let Some(bad) = planes.iter().find(|plane| plane.dim() != first.dim()) {
                return Err(Error::PlaneSizeMismatch {
                    width: bad.ncols(),
                    height: bad.nrows(),
                    dst_width: first.ncols(),
                    dst_height: first.nrows(),
                });
            }
        }
        let views: Vec<ArrayView2<f32>> = planes.iter().map(|plane| plane.view()).collect();
        Ok(Self(ndarray::stack(Axis(0), &views)?))
    }

    /// Derive the four oriented edge channels from an image of the image crate.
    ///
    /// The image is converted to grayscale first; see [`ChannelImage::oriented_edges`].
    pub fn from_dynamic(input_image: &DynamicImage) -> Result<Self, Error> {
        let gray = gray_from_dynamic(input_image)?;
        Self::oriented_edges(gray.view())
    }

    /// Compute four half-wave rectified edge channels from a grayscale plane.
    ///
    /// The channels are, in order: rising horizontal gradient, falling horizontal
    /// gradient, rising vertical gradient, falling vertical gradient. The gradients
    /// are normalized Scharr derivatives with mirrored borders.
    pub fn oriented_edges(gray: ArrayView2<f32>) -> Result<Self, Error> {
        let (height, width) = gray.dim();
        if width == 0 || height == 0 {
            return Err(Error::EmptyImage { width, height });
        }
        let mut lx = Array2::zeros((height, width));
        let mut ly = Array2::zeros((height, width));
        separable_filter(gray, lx.view_mut(), &SCHARR_DERIVATIVE, &SCHARR_SMOOTHING)?;
        trace!("Computing derivative Lx done.");
        separable_filter(gray, ly.view_mut(), &SCHARR_SMOOTHING, &SCHARR_DERIVATIVE)?;
        trace!("Computing derivative Ly done.");

        let mut edges = Self::new(4, width, height);
        for (((y, x), &dx), &dy) in lx.indexed_iter().zip(ly.iter()) {
            edges.put(x, y, 0, dx.max(0.0) as f32);
            edges.put(x, y, 1, (-dx).max(0.0) as f32);
            edges.put(x, y, 2, dy.max(0.0) as f32);
            edges.put(x, y, 3, (-dy).max(0.0) as f32);
        }
        Ok(edges)
    }

    pub fn width(&self) -> usize {
        self.0.dim().2
    }

    pub fn height(&self) -> usize {
        self.0.dim().1
    }

    pub fn num_channels(&self) -> usize {
        self.0.dim().0
    }

    /// A view of one channel with shape `(height, width)`.
    pub fn plane(&self, channel: usize) -> ArrayView2<f32> {
        self.0.index_axis(Axis(0), channel)
    }

    pub fn get(&self, x: usize, y: usize, channel: usize) -> f32 {
        self.0[[channel, y, x]]
    }

    pub fn put(&mut self, x: usize, y: usize, channel: usize, value: f32) {
        self.0[[channel, y, x]] = value;
    }
}

/// Convert any image of the image crate to a grayscale float plane of shape `(height, width)`.
pub fn gray_from_dynamic(input_image: &DynamicImage) -> Result<Array2<f32>, Error> {
    let gray = input_image.to_luma32f();
    let (width, height) = gray.dimensions();
    info!("Loaded a {} x {} image", width, height);
    Ok(Array2::from_shape_vec(
        (height as usize, width as usize),
        gray.into_raw(),
    )?)
}

const SCHARR_DERIVATIVE: [f64; 3] = [-1.0, 0.0, 1.0];
const SCHARR_SMOOTHING: [f64; 3] = [3.0 / 32.0, 10.0 / 32.0, 3.0 / 32.0];

/// Map an index onto `[0, len)` by mirroring across the edge pixels.
///
/// The edge pixel itself is not repeated: for `len = 5`, `-1` maps to `1` and
/// `5` maps to `3`. A line of length 1 maps everything to 0.
#[inline]
pub fn mirror_index(i: isize, len: usize) -> usize {
    debug_assert!(len > 0);
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let i = i.rem_euclid(period);
    if i >= len as isize {
        (period - i) as usize
    } else {
        i as usize
    }
}

/// Reduce an index modulo the mirror period `2 * (len - 1)` of [`mirror_index`].
///
/// The result is in `[0, 2 * (len - 1))` and mirrors to the same pixel as `i`, so small
/// offsets can be added to it without overflowing.
#[inline]
pub fn mirror_period_index(i: isize, len: usize) -> isize {
    debug_assert!(len > 0);
    if len == 1 {
        return 0;
    }
    i.rem_euclid(2 * (len as isize - 1))
}

/// Half-size of the sampled gaussian kernel, including the center tap.
pub fn gaussian_half_kernel_size(sigma: f64) -> usize {
    usize::max(2, (3.0 * sigma + 0.5) as usize + 1)
}

/// Generate a normalized, symmetric gaussian kernel of length `2 * half - 1`.
///
/// The taps are `exp(-x^2 / (2 sigma^2))` scaled to sum to one. A sigma of zero
/// produces the identity kernel.
pub fn gaussian_kernel(sigma: f64) -> Result<Vec<f64>, Error> {
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(Error::InvalidKernelSigma { sigma });
    }
    let half = gaussian_half_kernel_size(sigma);
    if half - 1 > MAX_KERNEL_RADIUS {
        return Err(Error::KernelTooLarge {
            sigma,
            radius: half - 1,
            max: MAX_KERNEL_RADIUS,
        });
    }
    let mut half_kernel = vec![0.0f64; half];
    half_kernel[0] = 1.0;
    if sigma > 0.0 {
        let two_sq_sigma = 2.0 * sigma * sigma;
        for (x, tap) in half_kernel.iter_mut().enumerate().skip(1) {
            *tap = (-((x * x) as f64) / two_sq_sigma).exp();
        }
    }
    let sum = half_kernel[0] + 2.0 * half_kernel[1..].iter().sum::<f64>();
    Ok(half_kernel[1..]
        .iter()
        .rev()
        .chain(half_kernel.iter())
        .map(|tap| tap / sum)
        .collect())
}

/// Blur `src` with an isotropic gaussian of the given sigma into `dst`.
pub fn gaussian_blur<A>(src: ArrayView2<A>, dst: ArrayViewMut2<f64>, sigma: f64) -> Result<(), Error>
where
    A: Copy + Into<f64>,
{
    let kernel = gaussian_kernel(sigma)?;
    separable_filter(src, dst, &kernel, &kernel)
}

/// Correlate `src` with `h_kernel` along rows, then with `v_kernel` along columns.
///
/// Both kernels must have odd length. Borders are handled by [`mirror_index`].
pub fn separable_filter<A>(
    src: ArrayView2<A>,
    mut dst: ArrayViewMut2<f64>,
    h_kernel: &[f64],
    v_kernel: &[f64],
) -> Result<(), Error>
where
    A: Copy + Into<f64>,
{
    if src.dim() != dst.dim() {
        return Err(Error::PlaneSizeMismatch {
            width: src.ncols(),
            height: src.nrows(),
            dst_width: dst.ncols(),
            dst_height: dst.nrows(),
        });
    }
    let (height, width) = src.dim();
    if width == 0 || height == 0 {
        return Err(Error::EmptyImage { width, height });
    }
    let mut horizontal = Array2::zeros((height, width));
    let mut h = LineFilter::new(h_kernel, width);
    for (row_in, row_out) in src.axis_iter(Axis(0)).zip(horizontal.axis_iter_mut(Axis(0))) {
        h.apply(row_in, row_out);
    }
    let mut v = LineFilter::new(v_kernel, height);
    for (col_in, col_out) in horizontal.axis_iter(Axis(1)).zip(dst.axis_iter_mut(Axis(1))) {
        v.apply(col_in, col_out);
    }
    Ok(())
}

/// A 1d kernel prepared for lines of a fixed length.
struct LineFilter {
    kernel_simd: Vec<f64x4>,
    kernel_simd_size: usize,
    radius: usize,
    scratch: Vec<f64>,
}

impl LineFilter {
    fn new(kernel: &[f64], line_len: usize) -> Self {
        let kernel_size = kernel.len();
        debug_assert!(kernel_size % 2 == 1);
        // Create SIMD kernel, padded with 0.
        let kernel_simd = kernel
            .chunks(4)
            .map(|chunk| {
                let mut data = [0.0; 4];
                data[..chunk.len()].copy_from_slice(chunk);
                f64x4::new(data)
            })
            .collect::<Vec<_>>();
        let kernel_simd_size = kernel_simd.len() * 4;
        let radius = kernel_size / 2;
        let scratch = vec![0f64; line_len + 2 * radius + (kernel_simd_size - kernel_size)];
        Self {
            kernel_simd,
            kernel_simd_size,
            radius,
            scratch,
        }
    }

    fn apply<A>(&mut self, line_in: ArrayView1<A>, mut line_out: ArrayViewMut1<f64>)
    where
        A: Copy + Into<f64>,
    {
        let len = line_in.len();
        let radius = self.radius as isize;
        // Prefill extended buffer with the mirrored line, the SIMD tail stays 0.
        for (i, value) in self.scratch[..len + 2 * self.radius].iter_mut().enumerate() {
            *value = line_in[mirror_index(i as isize - radius, len)].into();
        }
        self.scratch
            .windows(self.kernel_simd_size)
            .zip(line_out.iter_mut())
            .for_each(|(window, output)| {
                *output = window
                    .chunks_exact(4)
                    .map(|chunk| f64x4::new([chunk[0], chunk[1], chunk[2], chunk[3]]))
                    .zip(self.kernel_simd.iter())
                    .fold(f64x4::splat(0.), |acc, (a, b)| a.mul_add(*b, acc))
                    .reduce_add()
            });
    }
}
