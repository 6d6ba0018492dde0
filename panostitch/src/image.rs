use crate::error::{PanoError, Result};
use crate::pixel::Pixel;
use std::fmt;

/// Width, height and band count of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    pub width: usize,
    pub height: usize,
    pub bands: usize,
}

impl Shape {
    pub fn new(width: usize, height: usize, bands: usize) -> Self {
        Shape { width, height, bands }
    }

    /// Number of samples an image of this shape stores.
    pub fn sample_count(&self) -> Option<usize> {
        self.width.checked_mul(self.height)?.checked_mul(self.bands)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.bands)
    }
}

/// How reads outside the image are resolved by neighbourhood operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BorderMode {
    /// Out-of-range samples read as zero.
    #[default]
    Zero,
    /// Clamp to the nearest edge sample.
    Replicate,
    /// Mirror about the edge sample without repeating it (`dcb|abcd|cba`).
    Reflect,
    /// Wrap around.
    Cyclic,
}

impl BorderMode {
    /// Maps a possibly out-of-range index into `0..len`, or `None` for zero fill.
    pub fn map_index(self, i: isize, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        if i >= 0 && (i as usize) < len {
            return Some(i as usize);
        }
        match self {
            BorderMode::Zero => None,
            BorderMode::Replicate => Some(if i < 0 { 0 } else { len - 1 }),
            BorderMode::Reflect => {
                if len == 1 {
                    return Some(0);
                }
                let period = (2 * len - 2) as isize;
                let r = i.rem_euclid(period) as usize;
                Some(if r < len { r } else { 2 * len - 2 - r })
            }
            BorderMode::Cyclic => Some(i.rem_euclid(len as isize) as usize),
        }
    }
}

/// An owned, interleaved, multi-band raster.
///
/// Samples are stored row-major with the bands of a pixel adjacent. The
/// image owns its storage: `clone()` copies it, and the only way to share
/// storage is to borrow a view ([`ImageView`] / [`ImageViewMut`]).
///
/// # Examples
/// ```
/// # use panostitch::image::{Image, Shape};
/// let mut img = Image::<u8>::new(Shape::new(4, 3, 3));
/// img.pixel_mut(1, 2)[0] = 200;
///
/// // Writes through a mutable sub-view land in the parent image.
/// img.sub_view_mut(1, 1, 2, 2).unwrap().pixel_mut(1, 0)[2] = 7;
/// assert_eq!(img.pixel(2, 1)[2], 7);
///
/// // A clone is independent storage.
/// let copy = img.clone();
/// img.pixel_mut(0, 0)[0] = 1;
/// assert_eq!(copy.pixel(0, 0)[0], 0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Image<T> {
    shape: Shape,
    data: Vec<T>,
    border: BorderMode,
    origin: (isize, isize),
}

impl<T: Pixel> Image<T> {
    /// Allocates a zero-filled image.
    pub fn new(shape: Shape) -> Self {
        Self::filled(shape, T::default())
    }

    pub fn filled(shape: Shape, value: T) -> Self {
        let len = shape.sample_count().unwrap_or(0);
        Image {
            shape,
            data: vec![value; len],
            border: BorderMode::default(),
            origin: (0, 0),
        }
    }

    /// Wraps interleaved samples. Fails when `data.len()` does not match `shape`.
    pub fn from_vec(shape: Shape, data: Vec<T>) -> Result<Self> {
        let expected = shape
            .sample_count()
            .ok_or_else(|| PanoError::InvalidArgument(format!("image shape {shape} overflows")))?;
        if data.len() != expected {
            return Err(PanoError::shape_mismatch(
                format!("{expected} samples for {shape}"),
                format!("{} samples", data.len()),
            ));
        }
        Ok(Image {
            shape,
            data,
            border: BorderMode::default(),
            origin: (0, 0),
        })
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn width(&self) -> usize {
        self.shape.width
    }

    pub fn height(&self) -> usize {
        self.shape.height
    }

    pub fn bands(&self) -> usize {
        self.shape.bands
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn border_mode(&self) -> BorderMode {
        self.border
    }

    pub fn set_border_mode(&mut self, mode: BorderMode) {
        self.border = mode;
    }

    pub fn with_border_mode(mut self, mode: BorderMode) -> Self {
        self.border = mode;
        self
    }

    /// Index of the pixel treated as the centre when the image is used as a kernel.
    pub fn origin(&self) -> (isize, isize) {
        self.origin
    }

    pub fn set_origin(&mut self, x: isize, y: isize) {
        self.origin = (x, y);
    }

    /// Samples in one row, `width * bands` long.
    pub fn row_len(&self) -> usize {
        self.shape.width * self.shape.bands
    }

    #[inline]
    fn offset(&self, x: usize, y: usize) -> usize {
        assert!(
            x < self.shape.width && y < self.shape.height,
            "pixel ({x}, {y}) outside {}",
            self.shape
        );
        (y * self.shape.width + x) * self.shape.bands
    }

    /// All bands of pixel `(x, y)`. Panics when out of bounds.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> &[T] {
        let i = self.offset(x, y);
        &self.data[i..i + self.shape.bands]
    }

    #[inline]
    pub fn pixel_mut(&mut self, x: usize, y: usize) -> &mut [T] {
        let i = self.offset(x, y);
        let bands = self.shape.bands;
        &mut self.data[i..i + bands]
    }

    /// Checked single-sample read.
    pub fn get(&self, x: usize, y: usize, band: usize) -> Option<T> {
        if x >= self.shape.width || y >= self.shape.height || band >= self.shape.bands {
            return None;
        }
        Some(self.data[(y * self.shape.width + x) * self.shape.bands + band])
    }

    /// Checked single-sample write.
    pub fn set(&mut self, x: usize, y: usize, band: usize, value: T) -> Result<()> {
        if band >= self.shape.bands {
            return Err(PanoError::InvalidArgument(format!(
                "band {band} out of range for {}",
                self.shape
            )));
        }
        if x >= self.shape.width || y >= self.shape.height {
            return Err(PanoError::InvalidArgument(format!(
                "pixel ({x}, {y}) outside {}",
                self.shape
            )));
        }
        let i = (y * self.shape.width + x) * self.shape.bands + band;
        self.data[i] = value;
        Ok(())
    }

    /// Reads a sample at a possibly out-of-range location, resolved by the border mode.
    pub fn get_with_border(&self, x: isize, y: isize, band: usize) -> T {
        let mapped = self
            .border
            .map_index(x, self.shape.width)
            .zip(self.border.map_index(y, self.shape.height));
        match mapped {
            Some((mx, my)) if band < self.shape.bands => {
                self.data[(my * self.shape.width + mx) * self.shape.bands + band]
            }
            _ => T::default(),
        }
    }

    pub fn row(&self, y: usize) -> &[T] {
        let len = self.row_len();
        &self.data[y * len..(y + 1) * len]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        let len = self.row_len();
        &mut self.data[y * len..(y + 1) * len]
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Copies one band out into a single-band image.
    pub fn band(&self, band: usize) -> Result<Image<T>> {
        if band >= self.shape.bands {
            return Err(PanoError::InvalidArgument(format!(
                "band {band} out of range for {}",
                self.shape
            )));
        }
        let data = self
            .data
            .iter()
            .skip(band)
            .step_by(self.shape.bands)
            .copied()
            .collect();
        Image::from_vec(Shape::new(self.shape.width, self.shape.height, 1), data)
    }

    /// Borrows the whole image.
    pub fn as_view(&self) -> ImageView<'_, T> {
        ImageView {
            shape: self.shape,
            stride: self.row_len(),
            data: &self.data,
        }
    }

    pub fn as_view_mut(&mut self) -> ImageViewMut<'_, T> {
        let stride = self.row_len();
        ImageViewMut {
            shape: self.shape,
            stride,
            data: &mut self.data,
        }
    }

    /// Borrows the rectangle `(x, y, width, height)`; the view shares storage.
    pub fn sub_view(&self, x: usize, y: usize, width: usize, height: usize) -> Result<ImageView<'_, T>> {
        self.as_view().sub_view(x, y, width, height)
    }

    pub fn sub_view_mut(
        &mut self,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    ) -> Result<ImageViewMut<'_, T>> {
        let shape = self.shape;
        let start = check_rect(shape, x, y, width, height)?;
        let stride = self.row_len();
        let start = start.min(self.data.len());
        Ok(ImageViewMut {
            shape: Shape::new(width, height, shape.bands),
            stride,
            data: &mut self.data[start..],
        })
    }
}

fn check_rect(shape: Shape, x: usize, y: usize, width: usize, height: usize) -> Result<usize> {
    if x > shape.width || y > shape.height || width > shape.width - x || height > shape.height - y {
        return Err(PanoError::InvalidArgument(format!(
            "region {width}x{height}+{x}+{y} outside {shape}"
        )));
    }
    Ok((y * shape.width + x) * shape.bands)
}

/// A read-only borrowed window into an image.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a, T> {
    shape: Shape,
    /// Samples between the starts of consecutive rows.
    stride: usize,
    data: &'a [T],
}

impl<'a, T: Pixel> ImageView<'a, T> {
    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn width(&self) -> usize {
        self.shape.width
    }

    pub fn height(&self) -> usize {
        self.shape.height
    }

    pub fn bands(&self) -> usize {
        self.shape.bands
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> &'a [T] {
        assert!(x < self.shape.width && y < self.shape.height, "pixel ({x}, {y}) outside {}", self.shape);
        let i = y * self.stride + x * self.shape.bands;
        &self.data[i..i + self.shape.bands]
    }

    pub fn row(&self, y: usize) -> &'a [T] {
        assert!(y < self.shape.height, "row {y} outside {}", self.shape);
        let start = y * self.stride;
        &self.data[start..start + self.shape.width * self.shape.bands]
    }

    /// Narrows the view further; the result still borrows the original storage.
    pub fn sub_view(&self, x: usize, y: usize, width: usize, height: usize) -> Result<ImageView<'a, T>> {
        if x > self.shape.width
            || y > self.shape.height
            || width > self.shape.width - x
            || height > self.shape.height - y
        {
            return Err(PanoError::InvalidArgument(format!(
                "region {width}x{height}+{x}+{y} outside {}",
                self.shape
            )));
        }
        let start = y * self.stride + x * self.shape.bands;
        Ok(ImageView {
            shape: Shape::new(width, height, self.shape.bands),
            stride: self.stride,
            data: &self.data[start.min(self.data.len())..],
        })
    }

    /// Copies the viewed pixels into a new, independent image.
    pub fn to_image(&self) -> Image<T> {
        let mut data = Vec::with_capacity(self.shape.width * self.shape.height * self.shape.bands);
        for y in 0..self.shape.height {
            data.extend_from_slice(self.row(y));
        }
        Image {
            shape: self.shape,
            data,
            border: BorderMode::default(),
            origin: (0, 0),
        }
    }
}

/// A mutable borrowed window into an image. Writes go to the parent's storage.
#[derive(Debug)]
pub struct ImageViewMut<'a, T> {
    shape: Shape,
    stride: usize,
    data: &'a mut [T],
}

impl<'a, T: Pixel> ImageViewMut<'a, T> {
    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn pixel_mut(&mut self, x: usize, y: usize) -> &mut [T] {
        assert!(x < self.shape.width && y < self.shape.height, "pixel ({x}, {y}) outside {}", self.shape);
        let i = y * self.stride + x * self.shape.bands;
        let bands = self.shape.bands;
        &mut self.data[i..i + bands]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        assert!(y < self.shape.height, "row {y} outside {}", self.shape);
        let start = y * self.stride;
        let len = self.shape.width * self.shape.bands;
        &mut self.data[start..start + len]
    }

    pub fn fill(&mut self, value: T) {
        for y in 0..self.shape.height {
            self.row_mut(y).fill(value);
        }
    }

    /// Copies `src` into this view. Both must have the same shape.
    pub fn copy_from(&mut self, src: &ImageView<'_, T>) -> Result<()> {
        if src.shape() != self.shape {
            return Err(PanoError::shape_mismatch(self.shape, src.shape()));
        }
        for y in 0..self.shape.height {
            self.row_mut(y).copy_from_slice(src.row(y));
        }
        Ok(())
    }
}
