//! # Panostitch Library
//!
//! The `panostitch` library builds panoramic mosaics from overlapping photographs.
//! Each photo is warped into a common cylindrical or spherical frame, adjacent
//! pairs are aligned from feature correspondences with RANSAC, and the aligned
//! images are feathered together into one drift-corrected, cropped mosaic.
//!
//! ## Overview of Modules
//!
//! - **`image`**: Owned multi-band pixel buffers (`Image<T>`) with border modes
//!   and kernel origins, plus borrowed read-only and mutable views.
//!
//! - **`pixel`**: The `Pixel` trait over the supported sample kinds (`u8`, `i32`,
//!   `f32`) with their clamping rules.
//!
//! - **`transform`**: 3x3 homogeneous transforms with composition, inversion and
//!   the rotation helpers used by the spherical warp.
//!
//! - **`warp`**: Inverse-warp resampling with nearest, bilinear and bicubic
//!   interpolation, driven by a coordinate field or a single transform.
//!
//! - **`spherical`**: Builds the coordinate field mapping angular mosaic pixels
//!   back into a perspective photograph, undoing radial distortion.
//!
//! - **`features`**: Feature points and correspondences, with their text formats
//!   (native and SIFT keypoint files) and selection helpers.
//!
//! - **`matcher`**: Nearest-neighbour descriptor matching over a kd-tree with a
//!   ratio test.
//!
//! - **`align`**: RANSAC and least-squares estimation of translate or
//!   translate+rotate motion between two feature sets.
//!
//! - **`blend`**: Feathered accumulation of placed images, normalization, drift
//!   correction and crop.
//!
//! - **`pair_list`**: The placement list format chaining adjacent image pairs.
//!
//! - **`codec`**, **`convert`**, **`convolve`**: Image files, band and kind
//!   conversions, separable filtering.
//!
//! - **`config`**: TOML configuration for all stages.
//!
//! - **`pipeline`**: File-level operations used by the `panostitch` binary.

pub mod align;
pub mod blend;
pub mod codec;
pub mod config;
pub mod convert;
pub mod convolve;
pub mod error;
pub mod features;
pub mod image;
pub mod matcher;
pub mod pair_list;
pub mod pipeline;
pub mod pixel;
pub mod spherical;
pub mod transform;
pub mod warp;

pub use error::{PanoError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
