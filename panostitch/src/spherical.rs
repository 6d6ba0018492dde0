//! Coordinate fields that map angular (spherical or cylindrical) mosaic pixels
//! back into a flat perspective photograph, undoing radial lens distortion.

use crate::error::{PanoError, Result};
use crate::image::{Image, Shape};
use crate::transform::Transform3x3;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Angular projection of the destination image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Projection {
    /// Longitude along x, latitude along y.
    Spherical,
    /// Longitude along x, height on a unit cylinder along y.
    #[default]
    Cylindrical,
}

impl Projection {
    /// Unit-focal-length viewing direction for angular coordinates `(xf, yf)`.
    pub fn direction(self, xf: f64, yf: f64) -> Vector3<f64> {
        let (sin_t, cos_t) = xf.sin_cos();
        match self {
            Projection::Spherical => {
                let (sin_p, cos_p) = yf.sin_cos();
                Vector3::new(sin_t * cos_p, sin_p, cos_t * cos_p)
            }
            Projection::Cylindrical => Vector3::new(sin_t, yf, cos_t),
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Projection::Spherical => "spherical",
            Projection::Cylindrical => "cylindrical",
        })
    }
}

impl FromStr for Projection {
    type Err = PanoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "spherical" | "sphere" => Ok(Projection::Spherical),
            "cylindrical" | "cylinder" => Ok(Projection::Cylindrical),
            other => Err(PanoError::InvalidArgument(format!(
                "unknown projection '{other}' (expected spherical or cylindrical)"
            ))),
        }
    }
}

/// Camera and lens parameters for one warp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphericalParams {
    /// Focal length in pixels.
    pub focal_length: f64,
    /// Quadratic radial distortion coefficient.
    pub k1: f64,
    /// Quartic radial distortion coefficient.
    pub k2: f64,
    /// Rotation applied to each viewing direction before projecting.
    pub rotation: Transform3x3,
    pub projection: Projection,
}

impl SphericalParams {
    pub fn new(focal_length: f64) -> Self {
        SphericalParams {
            focal_length,
            k1: 0.0,
            k2: 0.0,
            rotation: Transform3x3::identity(),
            projection: Projection::default(),
        }
    }

    pub fn with_distortion(mut self, k1: f64, k2: f64) -> Self {
        self.k1 = k1;
        self.k2 = k2;
        self
    }

    pub fn with_rotation(mut self, rotation: Transform3x3) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// Source coordinate for destination pixel `(x, y)`.
    ///
    /// Directions pointing behind the camera return `(-1, -1)`, which lies
    /// outside every source image and therefore resamples to zero.
    pub fn source_coordinate(&self, x: f64, y: f64, dst: Shape, src: Shape) -> (f64, f64) {
        let f = self.focal_length;
        let xf = (x - 0.5 * dst.width as f64) / f;
        let yf = (y - 0.5 * dst.height as f64) / f;

        let p = self.rotation * self.projection.direction(xf, yf);
        if p.z <= 0.0 {
            return (-1.0, -1.0);
        }
        let xt = p.x / p.z;
        let yt = p.y / p.z;

        let r2 = xt * xt + yt * yt;
        let scale = 1.0 + self.k1 * r2 + self.k2 * r2 * r2;

        (
            0.5 * src.width as f64 + xt * scale * f,
            0.5 * src.height as f64 + yt * scale * f,
        )
    }
}

/// Builds the absolute coordinate field that warps a `src`-shaped perspective
/// image into a `dst`-shaped angular image.
///
/// The result has two bands `(u, v)` and is meant for
/// [`Resampler::warp_local`](crate::warp::Resampler::warp_local) with
/// `relative = false`.
///
/// # Errors
/// [`PanoError::InvalidArgument`] when the focal length is not positive and finite.
pub fn spherical_field(src: Shape, dst: Shape, params: &SphericalParams) -> Result<Image<f32>> {
    if !(params.focal_length.is_finite() && params.focal_length > 0.0) {
        return Err(PanoError::InvalidArgument(format!(
            "focal length must be positive, got {}",
            params.focal_length
        )));
    }
    let mut field = Image::<f32>::new(Shape::new(dst.width, dst.height, 2));
    for y in 0..dst.height {
        for (x, uv) in field.row_mut(y).chunks_exact_mut(2).enumerate() {
            let (u, v) = params.source_coordinate(x as f64, y as f64, dst, src);
            uv[0] = u as f32;
            uv[1] = v as f32;
        }
    }
    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centre_maps_to_source_centre() {
        for projection in [Projection::Spherical, Projection::Cylindrical] {
            let src = Shape::new(384, 256, 4);
            let dst = Shape::new(384, 256, 4);
            let params = SphericalParams::new(595.0).with_projection(projection);
            let field = spherical_field(src, dst, &params).expect("field");
            assert_eq!(field.pixel(192, 128), &[192.0, 128.0], "{projection}");
        }
    }

    #[test]
    fn distortion_leaves_centre_fixed_and_pushes_edges() {
        let src = Shape::new(200, 100, 3);
        let plain = SphericalParams::new(300.0);
        let barrel = plain.with_distortion(-0.2, 0.05);
        assert_eq!(barrel.source_coordinate(100.0, 50.0, src, src), (100.0, 50.0));
        let (u0, _) = plain.source_coordinate(190.0, 50.0, src, src);
        let (u1, _) = barrel.source_coordinate(190.0, 50.0, src, src);
        assert!(u1 < u0);
    }

    #[test]
    fn horizontal_angle_follows_tangent() {
        let f = 250.0;
        let src = Shape::new(500, 300, 1);
        let params = SphericalParams::new(f);
        let (u, v) = params.source_coordinate(250.0 + 0.3 * f, 150.0, src, src);
        assert!((u - (250.0 + f * 0.3f64.tan())).abs() < 1e-9);
        assert!((v - 150.0).abs() < 1e-9);
    }

    #[test]
    fn off_axis_rows_map_away_from_centre() {
        let f = 200.0;
        let src = Shape::new(400, 400, 1);
        let cyl = SphericalParams::new(f);
        let sph = cyl.with_projection(Projection::Spherical);
        let (_, v_edge) = cyl.source_coordinate(350.0, 300.0, src, src);
        let (_, v_mid) = cyl.source_coordinate(200.0, 300.0, src, src);
        assert!(v_edge > v_mid);
        let (_, s_edge) = sph.source_coordinate(350.0, 300.0, src, src);
        assert!(s_edge > 300.0);
    }

    #[test]
    fn rotation_shifts_the_view() {
        let src = Shape::new(300, 200, 1);
        let params = SphericalParams::new(300.0).with_rotation(Transform3x3::yaw(10.0));
        let (u, _) = params.source_coordinate(150.0, 100.0, src, src);
        assert!((u - (150.0 + 300.0 * 10f64.to_radians().tan())).abs() < 1e-9);
    }

    #[test]
    fn directions_behind_camera_fall_outside() {
        let src = Shape::new(100, 100, 1);
        let params = SphericalParams::new(20.0);
        assert_eq!(params.source_coordinate(100.0, 50.0, src, src), (-1.0, -1.0));
    }

    #[test]
    fn rejects_bad_focal_length() {
        let s = Shape::new(10, 10, 1);
        assert!(spherical_field(s, s, &SphericalParams::new(0.0)).is_err());
        assert!(spherical_field(s, s, &SphericalParams::new(f64::NAN)).is_err());
    }
}
