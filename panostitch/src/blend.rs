//! Feathered compositing of placed images into one mosaic.
//!
//! [`blend_images`] runs the whole chain: [`image_bounding_box`] sizes the
//! composite, [`accumulate`] sums weighted samples of every placement into a
//! float image carrying an extra weight band, [`normalize`] divides the weight
//! back out, and [`drift_correction`] shears and crops the composite so the
//! first and last images line up.

use crate::convert::{convert, OPAQUE};
use crate::error::{PanoError, Result};
use crate::image::{Image, Shape};
use crate::pixel::Pixel;
use crate::transform::Transform3x3;
use crate::warp::{Interpolation, Resampler};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decides which source pixels carry data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coverage {
    /// [`Coverage::Alpha`] for 4-band images, [`Coverage::Black`] otherwise.
    #[default]
    Auto,
    /// The last band is alpha; zero alpha means no data and partial alpha
    /// scales the weight.
    Alpha,
    /// A footprint whose samples are all exactly zero means no data.
    Black,
    /// Every in-bounds footprint carries data.
    All,
}

impl Coverage {
    fn resolve(self, bands: usize) -> Coverage {
        match self {
            Coverage::Auto if bands == 4 => Coverage::Alpha,
            Coverage::Auto => Coverage::Black,
            other => other,
        }
    }

    /// Fraction of the sample that is data, `None` when nothing is.
    fn amount(self, sample: &[f32]) -> Option<f32> {
        match self {
            Coverage::Alpha => {
                let alpha = sample.last().copied().unwrap_or(0.0);
                (alpha > 0.0).then(|| (alpha / OPAQUE).min(1.0))
            }
            Coverage::Black => sample.iter().any(|v| !v.is_zero()).then_some(1.0),
            Coverage::All | Coverage::Auto => Some(1.0),
        }
    }
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Coverage::Auto => "auto",
            Coverage::Alpha => "alpha",
            Coverage::Black => "black",
            Coverage::All => "all",
        })
    }
}

impl FromStr for Coverage {
    type Err = PanoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Coverage::Auto),
            "alpha" => Ok(Coverage::Alpha),
            "black" => Ok(Coverage::Black),
            "all" => Ok(Coverage::All),
            other => Err(PanoError::InvalidArgument(format!(
                "unknown coverage '{other}' (expected auto, alpha, black or all)"
            ))),
        }
    }
}

/// An image and the transform taking its pixel coordinates into the mosaic frame.
#[derive(Debug, Clone)]
pub struct Placement<T> {
    pub image: Image<T>,
    pub transform: Transform3x3,
}

impl<T: Pixel> Placement<T> {
    pub fn new(image: Image<T>, transform: Transform3x3) -> Self {
        Placement { image, transform }
    }

    /// Mosaic-frame position of the top midpoint `(0.5 W, 0)`.
    fn top_midpoint(&self) -> (f64, f64) {
        self.transform.apply(0.5 * self.image.width() as f64, 0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendOptions {
    /// Half-width in pixels of the feathered band along left and right edges.
    pub blend_width: f64,
    pub coverage: Coverage,
    /// Used by the drift-correction warp; accumulation is always bilinear.
    pub interpolation: Interpolation,
}

impl Default for BlendOptions {
    fn default() -> Self {
        BlendOptions {
            blend_width: 50.0,
            coverage: Coverage::Auto,
            interpolation: Interpolation::Bilinear,
        }
    }
}

impl BlendOptions {
    pub fn new(blend_width: f64) -> Self {
        BlendOptions {
            blend_width,
            ..Default::default()
        }
    }
}

/// Inclusive integer pixel bounds in the mosaic frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x_min: i64,
    pub y_min: i64,
    pub x_max: i64,
    pub y_max: i64,
}

impl BoundingBox {
    /// Counts both end pixels.
    pub fn width(&self) -> usize {
        (self.x_max - self.x_min + 1).max(0) as usize
    }

    pub fn height(&self) -> usize {
        (self.y_max - self.y_min + 1).max(0) as usize
    }

    fn union(self, other: BoundingBox) -> BoundingBox {
        BoundingBox {
            x_min: self.x_min.min(other.x_min),
            y_min: self.y_min.min(other.y_min),
            x_max: self.x_max.max(other.x_max),
            y_max: self.y_max.max(other.y_max),
        }
    }
}

fn placement_bounds(shape: Shape, m: &Transform3x3) -> Result<BoundingBox> {
    if shape.width == 0 || shape.height == 0 {
        return Err(PanoError::InvalidArgument(format!("cannot place an empty {shape} image")));
    }
    let (w, h) = ((shape.width - 1) as f64, (shape.height - 1) as f64);
    let (mut x_lo, mut y_lo) = (f64::INFINITY, f64::INFINITY);
    let (mut x_hi, mut y_hi) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for (cx, cy) in [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)] {
        let (x, y) = m.apply(cx, cy);
        if !x.is_finite() || !y.is_finite() {
            return Err(PanoError::InvalidArgument(format!(
                "placement maps corner ({cx}, {cy}) to infinity"
            )));
        }
        x_lo = x_lo.min(x);
        y_lo = y_lo.min(y);
        x_hi = x_hi.max(x);
        y_hi = y_hi.max(y);
    }
    Ok(BoundingBox {
        x_min: x_lo.floor() as i64,
        y_min: y_lo.floor() as i64,
        x_max: x_hi.ceil() as i64,
        y_max: y_hi.ceil() as i64,
    })
}

/// Union of the transformed corner bounds of every placement.
///
/// # Errors
/// [`PanoError::InvalidArgument`] for an empty list or an empty image.
pub fn image_bounding_box<T: Pixel>(placements: &[Placement<T>]) -> Result<BoundingBox> {
    let mut bounds = placements
        .iter()
        .map(|p| placement_bounds(p.image.shape(), &p.transform));
    let first = bounds
        .next()
        .ok_or_else(|| PanoError::InvalidArgument("no images to blend".into()))??;
    let bbox = bounds.try_fold(first, |acc, b| b.map(|b| acc.union(b)))?;
    debug!(
        "bounding box x {}..={}, y {}..={}",
        bbox.x_min, bbox.x_max, bbox.y_min, bbox.y_max
    );
    Ok(bbox)
}

/// Feather weight for a sample `d` pixels from the nearer left or right edge.
pub fn feather_weight(d: f64, blend_width: f64) -> f64 {
    ((d + 1.0) / (blend_width + 1.0)).min(1.0)
}

fn common_bands<T: Pixel>(placements: &[Placement<T>]) -> Result<usize> {
    let first = placements
        .first()
        .ok_or_else(|| PanoError::InvalidArgument("no images to blend".into()))?;
    let bands = first.image.bands();
    if let Some(p) = placements.iter().find(|p| p.image.bands() != bands) {
        return Err(PanoError::shape_mismatch(
            format!("{bands} bands like the first image"),
            p.image.shape(),
        ));
    }
    Ok(bands)
}

struct Prepared {
    source: Image<f32>,
    inverse: Transform3x3,
    coverage: Coverage,
    cols: (usize, usize),
    rows: (usize, usize),
}

/// Float copy of a placed image. With alpha coverage the colour bands are
/// multiplied by alpha, so a transparent tap adds nothing to an interpolated colour.
fn prepare_source<T: Pixel>(image: &Image<T>, coverage: Coverage) -> Image<f32> {
    let mut source: Image<f32> = convert(image, 1.0, 0.0);
    if coverage == Coverage::Alpha {
        let bands = source.bands();
        for px in source.data_mut().chunks_exact_mut(bands) {
            let alpha = px[bands - 1] / OPAQUE;
            for v in &mut px[..bands - 1] {
                *v *= alpha;
            }
        }
    }
    source
}

/// Sums `w * sample` and `w` for every placement into an image with
/// `bands + 1` bands, weight last.
///
/// Destination pixels are inverse-mapped into each source and sampled
/// bilinearly. Footprints leaving the source and pixels without data (see
/// [`Coverage`]) are skipped. With alpha coverage each tap's colour counts in
/// proportion to its alpha, whatever colour a transparent pixel stores.
pub fn accumulate<T: Pixel>(
    placements: &[Placement<T>],
    bbox: &BoundingBox,
    opts: &BlendOptions,
) -> Result<Image<f32>> {
    let bands = common_bands(placements)?;
    if !(opts.blend_width >= 0.0 && opts.blend_width.is_finite()) {
        return Err(PanoError::InvalidArgument(format!(
            "blend width must be non-negative, got {}",
            opts.blend_width
        )));
    }
    let (width, height) = (bbox.width(), bbox.height());

    let prepared = placements
        .iter()
        .map(|p| {
            let local = placement_bounds(p.image.shape(), &p.transform)?;
            let clamp = |v: i64, min: i64, len: usize| (v - min).clamp(0, len as i64 - 1) as usize;
            let coverage = opts.coverage.resolve(bands);
            Ok(Prepared {
                source: prepare_source(&p.image, coverage),
                inverse: p.transform.inverse()?,
                coverage,
                cols: (clamp(local.x_min, bbox.x_min, width), clamp(local.x_max, bbox.x_min, width)),
                rows: (clamp(local.y_min, bbox.y_min, height), clamp(local.y_max, bbox.y_min, height)),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut acc = Image::<f32>::new(Shape::new(width, height, bands + 1));
    let row_len = acc.row_len();
    if row_len == 0 {
        return Ok(acc);
    }
    let resampler = Resampler::new(Interpolation::Bilinear);
    let blend_width = opts.blend_width;

    acc.data_mut()
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            let mut sample = vec![0.0f32; bands];
            let my = (y as i64 + bbox.y_min) as f64;
            for p in prepared.iter().filter(|p| (p.rows.0..=p.rows.1).contains(&y)) {
                let view = p.source.as_view();
                let right_edge = (view.width() - 1) as f64;
                for x in p.cols.0..=p.cols.1 {
                    let (u, v) = p.inverse.apply((x as i64 + bbox.x_min) as f64, my);
                    if !resampler.sample(&view, u as f32, v as f32, &mut sample) {
                        continue;
                    }
                    let Some(amount) = p.coverage.amount(&sample) else {
                        continue;
                    };
                    let w = feather_weight(u.min(right_edge - u).max(0.0), blend_width) as f32;
                    let px = &mut row[x * (bands + 1)..(x + 1) * (bands + 1)];
                    for (a, s) in px.iter_mut().zip(&sample) {
                        *a += w * s;
                    }
                    px[bands] += w * amount;
                }
            }
        });
    Ok(acc)
}

/// Divides the colour bands of an accumulator by its weight band.
/// Pixels with zero weight stay zero.
pub fn normalize<T: Pixel>(acc: &Image<f32>) -> Result<Image<T>> {
    if acc.bands() < 2 {
        return Err(PanoError::shape_mismatch(
            "an accumulator with a weight band",
            acc.shape(),
        ));
    }
    let bands = acc.bands() - 1;
    let mut out = Image::<T>::new(Shape::new(acc.width(), acc.height(), bands));
    for (dst, src) in out
        .data_mut()
        .chunks_exact_mut(bands)
        .zip(acc.data().chunks_exact(bands + 1))
    {
        let weight = src[bands];
        if weight > 0.0 {
            for (d, s) in dst.iter_mut().zip(src) {
                *d = T::from_f32(s / weight);
            }
        }
    }
    Ok(out)
}

/// Transform from output pixels to composite pixels, and the output size.
///
/// The line through the top midpoints of the first and last placement is
/// straightened with a vertical shear of slope `s`, and the output starts at
/// whichever midpoint is further left, `composite width - W_first` wide and
/// `H_first` tall. When the midpoints are less than one pixel apart
/// horizontally there is nothing to trim and the whole composite is kept.
pub fn drift_correction<T: Pixel>(
    placements: &[Placement<T>],
    bbox: &BoundingBox,
) -> Result<(Transform3x3, usize, usize)> {
    let (first, last) = match (placements.first(), placements.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return Err(PanoError::InvalidArgument("no images to blend".into())),
    };
    let to_composite = Transform3x3::translation(-bbox.x_min as f64, -bbox.y_min as f64);
    let (x_init, y_init) = first.top_midpoint();
    let (x_final, y_final) = last.top_midpoint();

    if (x_final - x_init).abs() < 1.0 {
        debug!("first and last midlines coincide, keeping the full composite");
        return Ok((Transform3x3::identity(), bbox.width(), bbox.height()));
    }

    let slope = (y_final - y_init) / (x_final - x_init);
    let (x0, y0) = if x_init <= x_final { (x_init, y_init) } else { (x_final, y_final) };
    let width = bbox.width().saturating_sub(first.image.width());
    if width == 0 {
        return Err(PanoError::InvalidArgument(format!(
            "composite width {} leaves nothing after trimming {} columns",
            bbox.width(),
            first.image.width()
        )));
    }
    debug!("drift slope {slope:.5}, crop origin ({x0:.1}, {y0:.1})");
    let shear = Transform3x3::from_rows([[1.0, 0.0, x0], [slope, 1.0, y0], [0.0, 0.0, 1.0]]);
    Ok((to_composite * shear, width, first.image.height()))
}

/// Blends ordered placements into one drift-corrected, cropped mosaic.
///
/// # Errors
/// [`PanoError::InvalidArgument`] for an empty list or a negative blend width,
/// [`PanoError::ShapeMismatch`] when band counts differ,
/// [`PanoError::SingularMatrix`] for a non-invertible placement.
pub fn blend_images<T: Pixel>(placements: &[Placement<T>], opts: &BlendOptions) -> Result<Image<T>> {
    let bbox = image_bounding_box(placements)?;
    info!(
        "blending {} images into a {}x{} composite",
        placements.len(),
        bbox.width(),
        bbox.height()
    );
    let acc = accumulate(placements, &bbox, opts)?;
    let composite: Image<T> = normalize(&acc)?;
    let (m, width, height) = drift_correction(placements, &bbox)?;
    let out = Resampler::new(opts.interpolation).warp_global(composite.as_view(), &m, width, height)?;
    info!("mosaic is {}", out.shape());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: usize, height: usize) -> Image<u8> {
        let mut img = Image::<u8>::new(Shape::new(width, height, 3));
        for y in 0..height {
            for x in 0..width {
                let px = img.pixel_mut(x, y);
                px[0] = (1 + x * 3) as u8;
                px[1] = (1 + y * 5) as u8;
                px[2] = 200;
            }
        }
        img
    }

    #[test]
    fn bounding_box_counts_both_end_pixels() {
        let a = Placement::new(Image::<u8>::new(Shape::new(100, 80, 1)), Transform3x3::identity());
        let b = Placement::new(Image::<u8>::new(Shape::new(100, 80, 1)), Transform3x3::translation(60.0, -4.5));
        let bbox = image_bounding_box(&[a, b]).unwrap();
        assert_eq!(bbox, BoundingBox { x_min: 0, y_min: -5, x_max: 159, y_max: 79 });
        assert_eq!((bbox.width(), bbox.height()), (160, 85));
    }

    #[test]
    fn single_image_blends_to_itself() {
        let img = gradient(20, 12);
        let out = blend_images(&[Placement::new(img.clone(), Transform3x3::identity())], &BlendOptions::new(5.0)).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn identical_placements_blend_to_the_image() {
        let img = gradient(16, 10);
        let placements = vec![
            Placement::new(img.clone(), Transform3x3::identity()),
            Placement::new(img.clone(), Transform3x3::identity()),
        ];
        let out = blend_images(&placements, &BlendOptions::new(3.0)).unwrap();
        assert_eq!(out.data(), img.data());
    }

    #[test]
    fn feather_weight_ramps_to_one() {
        assert!((feather_weight(0.0, 4.0) - 0.2).abs() < 1e-12);
        assert_eq!(feather_weight(4.0, 4.0), 1.0);
        assert_eq!(feather_weight(10.0, 4.0), 1.0);
        assert_eq!(feather_weight(0.0, 0.0), 1.0);
    }

    #[test]
    fn black_pixels_carry_no_data() {
        let mut img = Image::<u8>::filled(Shape::new(4, 1, 1), 100);
        img.pixel_mut(1, 0)[0] = 0;
        let bbox = image_bounding_box(&[Placement::new(img.clone(), Transform3x3::identity())]).unwrap();
        let placements = [Placement::new(img, Transform3x3::identity())];

        let acc = accumulate(&placements, &bbox, &BlendOptions::new(0.0)).unwrap();
        assert_eq!(acc.pixel(1, 0), &[0.0, 0.0]);
        assert_eq!(acc.pixel(2, 0), &[100.0, 1.0]);

        let all = BlendOptions { coverage: Coverage::All, ..BlendOptions::new(0.0) };
        assert_eq!(accumulate(&placements, &bbox, &all).unwrap().pixel(1, 0), &[0.0, 1.0]);
    }

    #[test]
    fn zero_alpha_carries_no_data() {
        let img = Image::from_vec(Shape::new(2, 1, 4), vec![9u8, 9, 9, 255, 0, 0, 0, 0]).unwrap();
        let placements = [Placement::new(img, Transform3x3::identity())];
        let bbox = image_bounding_box(&placements).unwrap();
        let acc = accumulate(&placements, &bbox, &BlendOptions::new(0.0)).unwrap();
        assert_eq!(acc.pixel(0, 0), &[9.0, 9.0, 9.0, 255.0, 1.0]);
        assert_eq!(acc.pixel(1, 0), &[0.0; 5]);
        let out: Image<u8> = normalize(&acc).unwrap();
        assert_eq!(out.data(), &[9, 9, 9, 255, 0, 0, 0, 0]);
    }

    #[test]
    fn transparent_colour_does_not_leak_between_taps() {
        let img = Image::from_vec(Shape::new(2, 1, 4), vec![100u8, 100, 100, 255, 255, 255, 255, 0]).unwrap();
        let placements = [Placement::new(img, Transform3x3::translation(0.5, 0.0))];
        let bbox = image_bounding_box(&placements).unwrap();
        let acc = accumulate(&placements, &bbox, &BlendOptions::new(0.0)).unwrap();
        assert_eq!(acc.pixel(1, 0), &[50.0, 50.0, 50.0, 127.5, 0.5]);
        let out: Image<u8> = normalize(&acc).unwrap();
        assert_eq!(out.pixel(1, 0), &[100, 100, 100, 255]);
    }

    #[test]
    fn drift_shear_follows_the_midlines() {
        let img = Image::<u8>::new(Shape::new(100, 50, 1));
        let placements = [
            Placement::new(img.clone(), Transform3x3::identity()),
            Placement::new(img, Transform3x3::translation(60.0, 6.0)),
        ];
        let bbox = image_bounding_box(&placements).unwrap();
        let (m, w, h) = drift_correction(&placements, &bbox).unwrap();
        assert_eq!((w, h), (60, 50));
        let (x, y) = m.apply(10.0, 0.0);
        assert!((x - 60.0).abs() < 1e-12);
        assert!((y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn leftward_pans_crop_from_the_last_image() {
        let img = Image::<u8>::new(Shape::new(100, 50, 1));
        let placements = [
            Placement::new(img.clone(), Transform3x3::identity()),
            Placement::new(img, Transform3x3::translation(-60.0, 0.0)),
        ];
        let bbox = image_bounding_box(&placements).unwrap();
        let (m, w, _) = drift_correction(&placements, &bbox).unwrap();
        assert_eq!(w, 60);
        assert_eq!(m.apply(0.0, 0.0), (50.0, 0.0));
    }

    #[test]
    fn rejects_bad_inputs() {
        let none: [Placement<u8>; 0] = [];
        assert!(matches!(blend_images(&none, &BlendOptions::default()), Err(PanoError::InvalidArgument(_))));

        let mixed = [
            Placement::new(Image::<u8>::new(Shape::new(4, 4, 3)), Transform3x3::identity()),
            Placement::new(Image::<u8>::new(Shape::new(4, 4, 4)), Transform3x3::identity()),
        ];
        assert!(matches!(blend_images(&mixed, &BlendOptions::default()), Err(PanoError::ShapeMismatch { .. })));

        let one = [Placement::new(gradient(4, 4), Transform3x3::identity())];
        assert!(blend_images(&one, &BlendOptions::new(-1.0)).is_err());

        let singular = [Placement::new(gradient(4, 4), Transform3x3::from_rows([[1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 1.0]]))];
        assert!(matches!(blend_images(&singular, &BlendOptions::default()), Err(PanoError::SingularMatrix { .. })));
    }

    #[test]
    fn coverage_names() {
        assert_eq!("Alpha".parse::<Coverage>().unwrap(), Coverage::Alpha);
        assert_eq!(Coverage::Black.to_string(), "black");
        assert!("mask".parse::<Coverage>().is_err());
    }
}
