//! Inverse-warp resampling.
//!
//! Every destination pixel looks up the source location it comes from, either
//! from a per-pixel coordinate field ([`Resampler::warp_local`]) or from a
//! single transform applied to the destination grid ([`Resampler::warp_global`]).
//! When the interpolation footprint around that location leaves the source
//! image, all bands of the destination pixel are zero.

use crate::error::{PanoError, Result};
use crate::image::{Image, ImageView, Shape};
use crate::pixel::Pixel;
use crate::transform::Transform3x3;
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of fractional steps in the cubic lookup table.
pub const CUBIC_TABLE_SIZE: usize = 256;

/// Slope of the cubic kernel at |x| = 1 used unless configured otherwise.
pub const DEFAULT_CUBIC_A: f32 = -0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Interpolation::Nearest => "nearest",
            Interpolation::Bilinear => "bilinear",
            Interpolation::Bicubic => "bicubic",
        };
        f.write_str(name)
    }
}

impl FromStr for Interpolation {
    type Err = PanoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Interpolation::Nearest),
            "bilinear" | "linear" => Ok(Interpolation::Bilinear),
            "bicubic" | "cubic" => Ok(Interpolation::Bicubic),
            other => Err(PanoError::InvalidArgument(format!(
                "unknown interpolation '{other}' (expected nearest, bilinear or bicubic)"
            ))),
        }
    }
}

/// Cubic convolution kernel with slope `a` at |x| = 1.
fn cubic_kernel(x: f32, a: f32) -> f32 {
    let x = x.abs();
    if x <= 1.0 {
        ((a + 2.0) * x - (a + 3.0)) * x * x + 1.0
    } else if x < 2.0 {
        ((a * x - 5.0 * a) * x + 8.0 * a) * x - 4.0 * a
    } else {
        0.0
    }
}

/// Precomputed 4-tap cubic weights indexed by the fractional coordinate.
#[derive(Debug, Clone)]
pub struct CubicTable {
    a: f32,
    weights: Vec<[f32; 4]>,
}

impl CubicTable {
    pub fn new(a: f32) -> Self {
        let weights = (0..CUBIC_TABLE_SIZE)
            .map(|i| {
                let f = i as f32 / CUBIC_TABLE_SIZE as f32;
                [
                    cubic_kernel(1.0 + f, a),
                    cubic_kernel(f, a),
                    cubic_kernel(1.0 - f, a),
                    cubic_kernel(2.0 - f, a),
                ]
            })
            .collect();
        CubicTable { a, weights }
    }

    pub fn a(&self) -> f32 {
        self.a
    }

    /// Weights for taps at offsets -1, 0, +1, +2 from the floor of the coordinate.
    pub fn weights(&self, frac: f32) -> [f32; 4] {
        let i = ((frac * CUBIC_TABLE_SIZE as f32) as usize).min(CUBIC_TABLE_SIZE - 1);
        self.weights[i]
    }
}

/// Source taps along one axis: `len` consecutive indices from `start`.
#[derive(Debug, Clone, Copy)]
struct Taps {
    start: isize,
    len: usize,
    weights: [f32; 4],
}

impl Taps {
    fn single(i: isize) -> Self {
        Taps { start: i, len: 1, weights: [1.0, 0.0, 0.0, 0.0] }
    }

    fn inside(&self, size: usize) -> bool {
        self.start >= 0 && self.start as usize + self.len <= size
    }
}

/// Inverse-warp engine holding the interpolation mode and the cubic table.
///
/// # Examples
/// ```
/// # use panostitch::image::{Image, Shape};
/// # use panostitch::transform::Transform3x3;
/// # use panostitch::warp::{Interpolation, Resampler};
/// let src = Image::<u8>::filled(Shape::new(8, 8, 1), 50);
/// let resampler = Resampler::new(Interpolation::Bilinear);
/// let out = resampler
///     .warp_global(src.as_view(), &Transform3x3::translation(0.5, 0.0), 8, 8)
///     .unwrap();
/// assert_eq!(out.pixel(3, 3)[0], 50);
/// // The last column needs a sample beyond the source edge.
/// assert_eq!(out.pixel(7, 3)[0], 0);
/// ```
#[derive(Debug, Clone)]
pub struct Resampler {
    interpolation: Interpolation,
    cubic: CubicTable,
}

impl Default for Resampler {
    fn default() -> Self {
        Resampler::new(Interpolation::default())
    }
}

impl Resampler {
    pub fn new(interpolation: Interpolation) -> Self {
        Resampler {
            interpolation,
            cubic: CubicTable::new(DEFAULT_CUBIC_A),
        }
    }

    pub fn with_cubic_a(mut self, a: f32) -> Self {
        self.set_cubic_a(a);
        self
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        self.interpolation = interpolation;
    }

    pub fn cubic_a(&self) -> f32 {
        self.cubic.a()
    }

    /// Changes the cubic kernel slope, rebuilding the lookup table when it differs.
    pub fn set_cubic_a(&mut self, a: f32) {
        if a != self.cubic.a() {
            debug!("rebuilding cubic table for a = {a}");
            self.cubic = CubicTable::new(a);
        }
    }

    pub fn cubic_table(&self) -> &CubicTable {
        &self.cubic
    }

    fn taps(&self, c: f32) -> Taps {
        match self.interpolation {
            Interpolation::Nearest => Taps::single((c + 0.5).floor() as isize),
            Interpolation::Bilinear => {
                let i = c.floor();
                let f = c - i;
                if f == 0.0 {
                    Taps::single(i as isize)
                } else {
                    Taps { start: i as isize, len: 2, weights: [1.0 - f, f, 0.0, 0.0] }
                }
            }
            Interpolation::Bicubic => {
                let i = c.floor();
                let f = c - i;
                if f == 0.0 {
                    Taps::single(i as isize)
                } else {
                    Taps { start: i as isize - 1, len: 4, weights: self.cubic.weights(f) }
                }
            }
        }
    }

    /// Interpolates all bands at `(u, v)` into `out`.
    ///
    /// Returns `false`, leaving `out` untouched, when any participating tap lies
    /// outside `src` or the coordinate is not finite. Taps whose weight is
    /// exactly zero (an integer coordinate along that axis) do not participate.
    pub fn sample<T: Pixel>(&self, src: &ImageView<'_, T>, u: f32, v: f32, out: &mut [f32]) -> bool {
        if !u.is_finite() || !v.is_finite() {
            return false;
        }
        let tx = self.taps(u);
        let ty = self.taps(v);
        if !tx.inside(src.width()) || !ty.inside(src.height()) {
            return false;
        }

        let bands = src.bands();
        out[..bands].fill(0.0);
        for j in 0..ty.len {
            let row = src.row(ty.start as usize + j);
            let wy = ty.weights[j];
            for i in 0..tx.len {
                let w = wy * tx.weights[i];
                let base = (tx.start as usize + i) * bands;
                for (b, acc) in out[..bands].iter_mut().enumerate() {
                    *acc += w * row[base + b].to_f32();
                }
            }
        }
        true
    }

    /// Warps `src` through a 2-band coordinate field.
    ///
    /// The output has the field's width and height and the source's bands.
    /// With `relative`, the field holds offsets added to each destination
    /// pixel's own coordinates; otherwise it holds absolute source coordinates.
    pub fn warp_local<T: Pixel>(
        &self,
        src: ImageView<'_, T>,
        field: &Image<f32>,
        relative: bool,
    ) -> Result<Image<T>> {
        if field.bands() != 2 {
            return Err(PanoError::shape_mismatch(
                "a 2-band coordinate field",
                field.shape(),
            ));
        }
        let shape = Shape::new(field.width(), field.height(), src.bands());
        debug!(
            "warp_local {} -> {} ({}, relative = {relative})",
            src.shape(),
            shape,
            self.interpolation
        );
        Ok(self.warp_rows(&src, shape, |x, y| {
            let uv = field.pixel(x, y);
            if relative {
                (x as f32 + uv[0], y as f32 + uv[1])
            } else {
                (uv[0], uv[1])
            }
        }))
    }

    /// Warps `src` into a `width x height` image where destination pixel `(x, y)`
    /// samples the source at `m * (x, y, 1)`.
    ///
    /// `m` maps destination to source coordinates. The homogeneous divide is
    /// done per pixel when `m` is projective.
    pub fn warp_global<T: Pixel>(
        &self,
        src: ImageView<'_, T>,
        m: &Transform3x3,
        width: usize,
        height: usize,
    ) -> Result<Image<T>> {
        let shape = Shape::new(width, height, src.bands());
        let affine = m.is_affine();
        let mat = *m.matrix();
        debug!("warp_global {} -> {} (affine = {affine})", src.shape(), shape);
        Ok(self.warp_rows(&src, shape, |x, y| {
            let (x, y) = (x as f64, y as f64);
            let u = mat[(0, 0)] * x + mat[(0, 1)] * y + mat[(0, 2)];
            let v = mat[(1, 0)] * x + mat[(1, 1)] * y + mat[(1, 2)];
            if affine {
                (u as f32, v as f32)
            } else {
                let w = mat[(2, 0)] * x + mat[(2, 1)] * y + mat[(2, 2)];
                ((u / w) as f32, (v / w) as f32)
            }
        }))
    }

    fn warp_rows<T, F>(&self, src: &ImageView<'_, T>, shape: Shape, coord: F) -> Image<T>
    where
        T: Pixel,
        F: Fn(usize, usize) -> (f32, f32) + Sync,
    {
        let mut dst = Image::<T>::new(shape);
        let row_len = dst.row_len();
        if row_len == 0 {
            return dst;
        }
        let bands = shape.bands;
        dst.data_mut()
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| {
                let mut acc = vec![0.0f32; bands];
                for (x, px) in row.chunks_exact_mut(bands).enumerate() {
                    let (u, v) = coord(x, y);
                    if self.sample(src, u, v, &mut acc) {
                        for (dst_sample, value) in px.iter_mut().zip(&acc) {
                            *dst_sample = T::from_f32(*value);
                        }
                    }
                }
            });
        dst
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: usize, height: usize) -> Image<f32> {
        let mut img = Image::<f32>::new(Shape::new(width, height, 1));
        for y in 0..height {
            for x in 0..width {
                img.pixel_mut(x, y)[0] = 2.0 * x as f32 + 3.0 * y as f32 + 10.0;
            }
        }
        img
    }

    fn checker(width: usize, height: usize) -> Image<u8> {
        let mut img = Image::<u8>::new(Shape::new(width, height, 3));
        for y in 0..height {
            for x in 0..width {
                let v = if (x / 3 + y / 3) % 2 == 0 { 240 } else { 15 };
                img.pixel_mut(x, y).copy_from_slice(&[v, (x * 10) as u8, (y * 10) as u8]);
            }
        }
        img
    }

    fn offset_field(width: usize, height: usize, du: f32, dv: f32) -> Image<f32> {
        let mut field = Image::<f32>::new(Shape::new(width, height, 2));
        for y in 0..height {
            for x in 0..width {
                field.pixel_mut(x, y).copy_from_slice(&[du, dv]);
            }
        }
        field
    }

    #[test]
    fn identity_reproduces_source_for_every_mode() {
        let src = checker(12, 9);
        for mode in [Interpolation::Nearest, Interpolation::Bilinear, Interpolation::Bicubic] {
            let out = Resampler::new(mode)
                .warp_global(src.as_view(), &Transform3x3::identity(), 12, 9)
                .expect("warp");
            assert_eq!(out, src, "{mode}");
        }
    }

    #[test]
    fn footprint_outside_source_zeroes_all_bands() {
        let src = Image::<u8>::filled(Shape::new(6, 4, 3), 90);
        let out = Resampler::new(Interpolation::Bilinear)
            .warp_global(src.as_view(), &Transform3x3::translation(0.25, 0.5), 6, 4)
            .expect("warp");
        for y in 0..4 {
            for x in 0..6 {
                let expected = if x == 5 || y == 3 { 0 } else { 90 };
                assert_eq!(out.pixel(x, y), &[expected; 3], "({x}, {y})");
            }
        }
    }

    #[test]
    fn bicubic_needs_a_wider_footprint() {
        let src = Image::<u8>::filled(Shape::new(8, 8, 1), 100);
        let out = Resampler::new(Interpolation::Bicubic)
            .warp_global(src.as_view(), &Transform3x3::translation(0.5, 0.0), 8, 8)
            .expect("warp");
        assert_eq!(out.pixel(0, 4)[0], 0);
        assert_eq!(out.pixel(1, 4)[0], 100);
        assert_eq!(out.pixel(5, 4)[0], 100);
        assert_eq!(out.pixel(6, 4)[0], 0);
    }

    #[test]
    fn bilinear_is_exact_on_linear_ramps() {
        let src = gradient(16, 16);
        let out = Resampler::new(Interpolation::Bilinear)
            .warp_global(src.as_view(), &Transform3x3::translation(1.25, 0.75), 16, 16)
            .expect("warp");
        let expected = 2.0 * (4.0 + 1.25) + 3.0 * (5.0 + 0.75) + 10.0;
        assert!((out.pixel(4, 5)[0] - expected).abs() < 1e-4);
    }

    #[test]
    fn relative_field_round_trip_recovers_smooth_image() {
        let mut src = Image::<f32>::new(Shape::new(40, 30, 1));
        for y in 0..30 {
            for x in 0..40 {
                src.pixel_mut(x, y)[0] = 100.0 + 40.0 * (x as f32 / 9.0).sin() + 25.0 * (y as f32 / 7.0).cos();
            }
        }
        let resampler = Resampler::new(Interpolation::Bilinear);
        let forward = resampler
            .warp_local(src.as_view(), &offset_field(40, 30, 2.3, -1.6), true)
            .expect("forward");
        let back = resampler
            .warp_local(forward.as_view(), &offset_field(40, 30, -2.3, 1.6), true)
            .expect("back");
        for y in 4..26 {
            for x in 4..36 {
                let err = (back.pixel(x, y)[0] - src.pixel(x, y)[0]).abs();
                assert!(err < 2.0, "({x}, {y}) error {err}");
            }
        }
    }

    #[test]
    fn absolute_field_reads_requested_location() {
        let src = checker(10, 10);
        let mut field = Image::<f32>::new(Shape::new(2, 1, 2));
        field.pixel_mut(0, 0).copy_from_slice(&[7.0, 2.0]);
        field.pixel_mut(1, 0).copy_from_slice(&[-1.0, 2.0]);
        let out = Resampler::new(Interpolation::Nearest)
            .warp_local(src.as_view(), &field, false)
            .expect("warp");
        assert_eq!(out.pixel(0, 0), src.pixel(7, 2));
        assert_eq!(out.pixel(1, 0), &[0, 0, 0]);
    }

    #[test]
    fn field_must_have_two_bands() {
        let src = checker(4, 4);
        let field = Image::<f32>::new(Shape::new(4, 4, 3));
        let err = Resampler::default().warp_local(src.as_view(), &field, false).unwrap_err();
        assert!(matches!(err, PanoError::ShapeMismatch { .. }));
    }

    #[test]
    fn projective_transform_divides_per_pixel() {
        let src = gradient(32, 32);
        let m = Transform3x3::from_rows([[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 2.0]]);
        let out = Resampler::new(Interpolation::Bilinear)
            .warp_global(src.as_view(), &m, 32, 32)
            .expect("warp");
        assert_eq!(out, src);
    }

    #[test]
    fn integer_output_is_clamped() {
        let mut src = Image::<u8>::new(Shape::new(8, 1, 1));
        src.data_mut().copy_from_slice(&[0, 0, 0, 255, 255, 0, 0, 0]);
        let out = Resampler::new(Interpolation::Bicubic)
            .with_cubic_a(-2.0)
            .warp_global(src.as_view(), &Transform3x3::translation(0.5, 0.0), 8, 1)
            .expect("warp");
        // Raw values are 382.5 and -63.75 here.
        assert_eq!(out.pixel(3, 0)[0], 255);
        assert_eq!(out.pixel(1, 0)[0], 0);
        assert_eq!(out.pixel(2, 0)[0], 128);
    }

    #[test]
    fn cubic_table_rebuilds_when_slope_changes() {
        let mut resampler = Resampler::new(Interpolation::Bicubic);
        let before = resampler.cubic_table().weights(0.25);
        resampler.set_cubic_a(-0.75);
        let after = resampler.cubic_table().weights(0.25);
        assert_eq!(resampler.cubic_a(), -0.75);
        assert_ne!(before, after);
        for i in 0..CUBIC_TABLE_SIZE {
            let w = resampler.cubic_table().weights(i as f32 / CUBIC_TABLE_SIZE as f32);
            assert!((w.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
        assert_eq!(resampler.cubic_table().weights(0.0), [0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn interpolation_parses_names() {
        assert_eq!("Cubic".parse::<Interpolation>().unwrap(), Interpolation::Bicubic);
        assert_eq!("linear".parse::<Interpolation>().unwrap(), Interpolation::Bilinear);
        assert!("lanczos".parse::<Interpolation>().is_err());
    }
}
