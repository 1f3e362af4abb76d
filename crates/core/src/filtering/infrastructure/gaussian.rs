/// Kernels longer than this blur a downscaled copy instead of full size.
const MAX_DIRECT_KERNEL_LEN: usize = 50;

/// Separable Gaussian blur for a fixed standard deviation.
///
/// For large sigmas the patch is area-downscaled by an integer factor,
/// blurred with a proportionally smaller kernel and bilinearly upscaled
/// back, which keeps the cost roughly independent of the radius.
pub struct GaussianBlur {
    kernel: Vec<f32>,
    small_kernel: Vec<f32>,
    scale: usize,
}

impl GaussianBlur {
    pub fn new(sigma: f32) -> Self {
        let kernel = kernel_for_sigma(sigma);
        let scale = (kernel.len() / MAX_DIRECT_KERNEL_LEN).max(1);
        let small_kernel = kernel_for_sigma(sigma / scale as f32);
        Self {
            kernel,
            small_kernel,
            scale,
        }
    }

    pub fn kernel_len(&self) -> usize {
        self.kernel.len()
    }

    /// Blurs `data` (`width` x `height` x `channels`) in place, reusing `temp`.
    ///
    /// Edges are clamped, so the result depends only on pixels inside `data`.
    pub fn apply(
        &self,
        data: &mut [u8],
        width: usize,
        height: usize,
        channels: usize,
        temp: &mut Vec<f32>,
    ) {
        let s = self.scale;
        if s <= 1 || width < s * 2 || height < s * 2 {
            convolve_separable(data, width, height, channels, &self.kernel, temp);
            return;
        }
        let (mut small, sw, sh) = downscale(data, width, height, channels, s);
        convolve_separable(&mut small, sw, sh, channels, &self.small_kernel, temp);
        let upscaled = upscale(&small, sw, sh, channels, width, height);
        data.copy_from_slice(&upscaled);
    }
}

/// Normalized 1D Gaussian kernel covering +/- 3 sigma.
///
/// A non-positive sigma yields the identity kernel `[1.0]`.
pub fn kernel_for_sigma(sigma: f32) -> Vec<f32> {
    if !(sigma > 0.0) {
        return vec![1.0];
    }
    let sigma = sigma as f64;
    let half = (3.0 * sigma).ceil() as usize;
    let weights: Vec<f64> = (0..=2 * half)
        .map(|i| {
            let x = i as f64 - half as f64;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.iter().map(|&w| (w / sum) as f32).collect()
}

fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

/// Horizontal pass into `temp`, vertical pass back into `data`.
fn convolve_separable(
    data: &mut [u8],
    width: usize,
    height: usize,
    channels: usize,
    kernel: &[f32],
    temp: &mut Vec<f32>,
) {
    if kernel.len() <= 1 || width == 0 || height == 0 {
        return;
    }
    let half = (kernel.len() / 2) as isize;
    temp.clear();
    temp.resize(width * height * channels, 0.0);

    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                temp[(y * width + x) * channels + c] = kernel
                    .iter()
                    .enumerate()
                    .map(|(k, &w)| {
                        let sx = clamp_index(x as isize + k as isize - half, width);
                        data[(y * width + sx) * channels + c] as f32 * w
                    })
                    .sum();
            }
        }
    }

    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let sum: f32 = kernel
                    .iter()
                    .enumerate()
                    .map(|(k, &w)| {
                        let sy = clamp_index(y as isize + k as isize - half, height);
                        temp[(sy * width + x) * channels + c] * w
                    })
                    .sum();
                data[(y * width + x) * channels + c] = sum.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Area-average downscale by an integer factor. Trailing partial cells are dropped.
fn downscale(
    data: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    scale: usize,
) -> (Vec<u8>, usize, usize) {
    let (new_w, new_h) = (width / scale, height / scale);
    let cell = (scale * scale) as u32;
    let mut out = vec![0u8; new_w * new_h * channels];

    for y in 0..new_h {
        for x in 0..new_w {
            for c in 0..channels {
                let mut sum = 0u32;
                for sy in y * scale..(y + 1) * scale {
                    for sx in x * scale..(x + 1) * scale {
                        sum += data[(sy * width + sx) * channels + c] as u32;
                    }
                }
                out[(y * new_w + x) * channels + c] = (sum / cell) as u8;
            }
        }
    }
    (out, new_w, new_h)
}

/// Bilinear upscale to `target_w` x `target_h`, aligning corner samples.
fn upscale(
    data: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    target_w: usize,
    target_h: usize,
) -> Vec<u8> {
    let ratio = |src: usize, dst: usize| (src as f32 - 1.0) / (dst as f32 - 1.0).max(1.0);
    let (rx, ry) = (ratio(width, target_w), ratio(height, target_h));
    let mut out = vec![0u8; target_w * target_h * channels];

    for y in 0..target_h {
        let fy = y as f32 * ry;
        let y0 = (fy as usize).min(height - 1);
        let y1 = (y0 + 1).min(height - 1);
        let ty = fy - y0 as f32;
        for x in 0..target_w {
            let fx = x as f32 * rx;
            let x0 = (fx as usize).min(width - 1);
            let x1 = (x0 + 1).min(width - 1);
            let tx = fx - x0 as f32;
            for c in 0..channels {
                let at = |sx: usize, sy: usize| data[(sy * width + sx) * channels + c] as f32;
                let top = at(x0, y0) + (at(x1, y0) - at(x0, y0)) * tx;
                let bottom = at(x0, y1) + (at(x1, y1) - at(x0, y1)) * tx;
                let v = top + (bottom - top) * ty;
                out[(y * target_w + x) * channels + c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_kernel_sums_to_one() {
        let k = kernel_for_sigma(2.0);
        assert_relative_eq!(k.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_kernel_covers_three_sigma() {
        assert_eq!(kernel_for_sigma(2.0).len(), 13);
        assert_eq!(kernel_for_sigma(0.5).len(), 5);
    }

    #[test]
    fn test_kernel_is_symmetric_and_peaked() {
        let k = kernel_for_sigma(1.5);
        let mid = k.len() / 2;
        for i in 0..mid {
            assert_relative_eq!(k[i], k[k.len() - 1 - i], epsilon = 1e-6);
            assert!(k[mid] >= k[i]);
        }
    }

    #[test]
    fn test_non_positive_sigma_is_identity() {
        assert_eq!(kernel_for_sigma(0.0), vec![1.0]);
        assert_eq!(kernel_for_sigma(-3.0), vec![1.0]);
        assert_eq!(kernel_for_sigma(f32::NAN), vec![1.0]);
    }

    #[test]
    fn test_uniform_patch_unchanged() {
        let mut data = vec![128u8; 10 * 10 * 3];
        let mut temp = Vec::new();
        GaussianBlur::new(2.0).apply(&mut data, 10, 10, 3, &mut temp);
        assert!(data.iter().all(|&v| (v as i32 - 128).abs() <= 1));
    }

    #[test]
    fn test_spreads_single_bright_pixel() {
        let mut data = vec![0u8; 10 * 10 * 3];
        let center = (5 * 10 + 5) * 3;
        data[center] = 255;
        let mut temp = Vec::new();
        GaussianBlur::new(1.0).apply(&mut data, 10, 10, 3, &mut temp);
        assert!(data[center] < 255);
        assert!(data[(5 * 10 + 6) * 3] > 0);
        assert_eq!(data[center + 1], 0, "channels must not bleed");
    }

    #[test]
    fn test_large_sigma_uses_downscale() {
        let blur = GaussianBlur::new(40.0);
        assert!(blur.scale > 1);
        assert!(blur.small_kernel.len() < blur.kernel_len());
    }

    #[test]
    fn test_large_sigma_on_small_patch_falls_back() {
        let mut data = vec![90u8; 4 * 4 * 3];
        let mut temp = Vec::new();
        GaussianBlur::new(40.0).apply(&mut data, 4, 4, 3, &mut temp);
        assert!(data.iter().all(|&v| (v as i32 - 90).abs() <= 1));
    }

    #[test]
    fn test_downscale_upscale_preserves_uniform() {
        let data = vec![100u8; 8 * 8 * 3];
        let (small, sw, sh) = downscale(&data, 8, 8, 3, 2);
        assert_eq!((sw, sh), (4, 4));
        let big = upscale(&small, sw, sh, 3, 8, 8);
        assert!(big.iter().all(|&v| (v as i32 - 100).abs() <= 1));
    }
}
