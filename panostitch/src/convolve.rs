use crate::error::{PanoError, Result};
use crate::image::{Image, Shape};
use crate::pixel::Pixel;

/// Single-row kernel `[1 2 1] / 4` centred on index 1.
pub fn binomial_3() -> Image<f32> {
    kernel(&[0.25, 0.5, 0.25], 1)
}

/// Single-row kernel `[1 4 6 4 1] / 16` centred on index 2.
pub fn binomial_5() -> Image<f32> {
    kernel(&[1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0], 2)
}

/// Builds a one-row kernel whose centre tap is `origin`.
pub fn kernel(taps: &[f32], origin: isize) -> Image<f32> {
    let mut k = Image::<f32>::new(Shape::new(taps.len(), 1, 1));
    k.data_mut().copy_from_slice(taps);
    k.set_origin(origin, 0);
    k
}

fn check_kernel(k: &Image<f32>) -> Result<()> {
    if k.height() != 1 || k.bands() != 1 || k.width() == 0 {
        return Err(PanoError::shape_mismatch("a non-empty 1-row, 1-band kernel", k.shape()));
    }
    Ok(())
}

/// Convolves with `x_kernel` along rows and `y_kernel` along columns, then keeps
/// every `subsample`-th pixel.
///
/// Output `(x, y)` is `sum_k kernel[k] * src[x + k - origin]` per axis, where
/// reads outside `src` follow its [`BorderMode`](crate::image::BorderMode).
/// The intermediate pass stays in `f32`; only the final value is clamped.
pub fn convolve_separable<T: Pixel>(
    src: &Image<T>,
    x_kernel: &Image<f32>,
    y_kernel: &Image<f32>,
    subsample: usize,
) -> Result<Image<T>> {
    check_kernel(x_kernel)?;
    check_kernel(y_kernel)?;
    if subsample == 0 {
        return Err(PanoError::InvalidArgument("subsample must be at least 1".into()));
    }

    let shape = src.shape();
    let bands = shape.bands;
    let border = src.border_mode();
    let (kx_origin, _) = x_kernel.origin();
    let (ky_origin, _) = y_kernel.origin();

    // Horizontal pass.
    let mut tmp = Image::<f32>::new(shape);
    for y in 0..shape.height {
        let src_row = src.row(y);
        let tmp_row = tmp.row_mut(y);
        for x in 0..shape.width {
            for (k, &w) in x_kernel.data().iter().enumerate() {
                let sx = x as isize + k as isize - kx_origin;
                if let Some(sx) = border.map_index(sx, shape.width) {
                    for b in 0..bands {
                        tmp_row[x * bands + b] += w * src_row[sx * bands + b].to_f32();
                    }
                }
            }
        }
    }

    // Vertical pass straight into the subsampled output.
    let out_shape = Shape::new(
        shape.width.div_ceil(subsample),
        shape.height.div_ceil(subsample),
        bands,
    );
    let mut dst = Image::<T>::new(out_shape);
    dst.set_border_mode(border);
    let mut acc = vec![0.0f32; bands];
    for oy in 0..out_shape.height {
        let y = oy * subsample;
        for ox in 0..out_shape.width {
            let x = ox * subsample;
            acc.fill(0.0);
            for (k, &w) in y_kernel.data().iter().enumerate() {
                let sy = y as isize + k as isize - ky_origin;
                if let Some(sy) = border.map_index(sy, shape.height) {
                    for (b, a) in acc.iter_mut().enumerate() {
                        *a += w * tmp.pixel(x, sy)[b];
                    }
                }
            }
            for (d, a) in dst.pixel_mut(ox, oy).iter_mut().zip(&acc) {
                *d = T::from_f32(*a);
            }
        }
    }
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::BorderMode;

    #[test]
    fn constant_image_is_preserved_with_replicate_border() {
        let img = Image::<u8>::filled(Shape::new(9, 7, 3), 80).with_border_mode(BorderMode::Replicate);
        let out = convolve_separable(&img, &binomial_5(), &binomial_5(), 1).unwrap();
        assert!(out.data().iter().all(|&v| v == 80));
    }

    #[test]
    fn zero_border_darkens_edges() {
        let img = Image::<f32>::filled(Shape::new(5, 5, 1), 1.0);
        let out = convolve_separable(&img, &binomial_3(), &binomial_3(), 1).unwrap();
        assert!((out.pixel(2, 2)[0] - 1.0).abs() < 1e-6);
        assert!((out.pixel(0, 2)[0] - 0.75).abs() < 1e-6);
        assert!((out.pixel(0, 0)[0] - 0.5625).abs() < 1e-6);
    }

    #[test]
    fn kernel_origin_shifts_the_result() {
        let mut img = Image::<f32>::new(Shape::new(5, 1, 1));
        img.data_mut().copy_from_slice(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        let delta = kernel(&[1.0], 0);
        let shift = kernel(&[0.0, 1.0], 0);
        let out = convolve_separable(&img, &shift, &delta, 1).unwrap();
        assert_eq!(out.data(), &[1.0, 2.0, 3.0, 4.0, 0.0]);
    }

    #[test]
    fn subsampling_rounds_up() {
        let img = Image::<u8>::filled(Shape::new(7, 5, 1), 3);
        let out = convolve_separable(&img, &kernel(&[1.0], 0), &kernel(&[1.0], 0), 2).unwrap();
        assert_eq!(out.shape(), Shape::new(4, 3, 1));
    }

    #[test]
    fn rejects_two_row_kernels() {
        let img = Image::<u8>::new(Shape::new(3, 3, 1));
        let bad = Image::<f32>::new(Shape::new(3, 2, 1));
        assert!(convolve_separable(&img, &bad, &binomial_3(), 1).is_err());
        assert!(convolve_separable(&img, &binomial_3(), &binomial_3(), 0).is_err());
    }
}
