//! Reading and writing 8-bit images through the `image` crate.
//!
//! The file format follows the extension. Gray, gray+alpha, RGB and RGBA map
//! to 1, 2, 3 and 4 bands.

use crate::error::{PanoError, Result};
use crate::image::{Image, Shape};
use image::GenericImageView;
use log::debug;
use std::path::Path;

/// Loads an image, keeping its band count. Deeper sample types are reduced to 8 bits.
pub fn load(path: impl AsRef<Path>) -> Result<Image<u8>> {
    let path = path.as_ref();
    let img = image::open(path)?;
    let (width, height) = (img.width() as usize, img.height() as usize);
    let bands = img.color().channel_count() as usize;
    let data = match bands {
        1 => img.to_luma8().into_raw(),
        2 => img.to_luma_alpha8().into_raw(),
        3 => img.to_rgb8().into_raw(),
        _ => img.to_rgba8().into_raw(),
    };
    let bands = bands.min(4);
    debug!("read {} ({width}x{height}x{bands})", path.display());
    Image::from_vec(Shape::new(width, height, bands), data)
}

/// Saves an image with 1 to 4 bands.
pub fn save(img: &Image<u8>, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let dim = |v: usize| {
        u32::try_from(v).map_err(|_| PanoError::InvalidArgument(format!("{v} pixels is too large to encode")))
    };
    let (w, h) = (dim(img.width())?, dim(img.height())?);
    let data = img.data().to_vec();
    let mismatch = || PanoError::shape_mismatch("a buffer matching the image size", img.shape());
    match img.bands() {
        1 => image::GrayImage::from_raw(w, h, data).ok_or_else(mismatch)?.save(path)?,
        2 => image::GrayAlphaImage::from_raw(w, h, data).ok_or_else(mismatch)?.save(path)?,
        3 => image::RgbImage::from_raw(w, h, data).ok_or_else(mismatch)?.save(path)?,
        4 => image::RgbaImage::from_raw(w, h, data).ok_or_else(mismatch)?.save(path)?,
        _ => return Err(PanoError::shape_mismatch("1 to 4 bands", img.shape())),
    }
    debug!("wrote {} ({})", path.display(), img.shape());
    Ok(())
}
