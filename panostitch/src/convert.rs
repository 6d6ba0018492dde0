use crate::error::{PanoError, Result};
use crate::image::{Image, Shape};
use crate::pixel::Pixel;

/// Alpha value written for fully opaque pixels.
pub const OPAQUE: f32 = 255.0;

/// Converts between pixel kinds, computing `v * scale + offset` and clamping
/// to the destination kind.
pub fn convert<S: Pixel, D: Pixel>(src: &Image<S>, scale: f32, offset: f32) -> Image<D> {
    let mut dst = Image::<D>::new(src.shape());
    for (d, &s) in dst.data_mut().iter_mut().zip(src.data()) {
        *d = D::from_f32(s.to_f32() * scale + offset);
    }
    dst.set_border_mode(src.border_mode());
    let (ox, oy) = src.origin();
    dst.set_origin(ox, oy);
    dst
}

/// Expands an image to four bands (RGBA).
///
/// Gray is replicated into RGB, gray+alpha keeps its alpha, RGB gains an
/// opaque alpha, RGBA is copied as is.
pub fn to_rgba<T: Pixel>(src: &Image<T>) -> Result<Image<T>> {
    let bands = src.bands();
    if bands == 4 {
        return Ok(src.clone());
    }
    if bands == 0 || bands > 4 {
        return Err(PanoError::shape_mismatch("1 to 4 bands", src.shape()));
    }
    let opaque = T::from_f32(OPAQUE);
    let mut data = Vec::with_capacity(src.width() * src.height() * 4);
    for px in src.data().chunks_exact(bands) {
        match *px {
            [g] => data.extend_from_slice(&[g, g, g, opaque]),
            [g, a] => data.extend_from_slice(&[g, g, g, a]),
            [r, g, b] => data.extend_from_slice(&[r, g, b, opaque]),
            _ => unreachable!("band count checked above"),
        }
    }
    Image::from_vec(Shape::new(src.width(), src.height(), 4), data)
}

/// Rec. 709 luminance of an RGB or RGBA image. Single-band images are copied.
pub fn to_gray<T: Pixel>(src: &Image<T>) -> Result<Image<T>> {
    match src.bands() {
        1 => Ok(src.clone()),
        3 | 4 => {
            let data = src
                .data()
                .chunks_exact(src.bands())
                .map(|p| {
                    T::from_f32(0.212671 * p[0].to_f32() + 0.715160 * p[1].to_f32() + 0.072169 * p[2].to_f32())
                })
                .collect();
            Image::from_vec(Shape::new(src.width(), src.height(), 1), data)
        }
        _ => Err(PanoError::shape_mismatch("1, 3 or 4 bands", src.shape())),
    }
}
