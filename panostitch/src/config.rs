//! Configuration for the stitching stages, stored as TOML.
//!
//! Every field has a default, so a file only needs the values it changes.
//! Command-line arguments take precedence over anything loaded here.

use crate::align::{AlignOptions, MotionModel};
use crate::blend::{BlendOptions, Coverage};
use crate::error::{PanoError, Result};
use crate::spherical::Projection;
use crate::warp::{Interpolation, Resampler, DEFAULT_CUBIC_A};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanoramaConfig {
    pub warp: WarpConfig,
    pub align: AlignConfig,
    pub blend: BlendConfig,
}

/// Spherical warp settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarpConfig {
    /// Focal length in pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<f64>,
    /// Radial distortion coefficients
    pub k1: f64,
    pub k2: f64,
    pub projection: Projection,
    pub interpolation: Interpolation,
    /// Cubic kernel slope at |x| = 1
    pub cubic_a: f32,
    /// Camera rotation in degrees
    pub pitch: f64,
    pub yaw: f64,
}

impl Default for WarpConfig {
    fn default() -> Self {
        WarpConfig {
            focal_length: None,
            k1: 0.0,
            k2: 0.0,
            projection: Projection::default(),
            interpolation: Interpolation::default(),
            cubic_a: DEFAULT_CUBIC_A,
            pitch: 0.0,
            yaw: 0.0,
        }
    }
}

/// Matching and RANSAC settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    pub iterations: usize,
    /// Inlier bound on the squared distance
    pub threshold: f64,
    pub motion_model: MotionModel,
    pub seed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<f64>,
    /// Lowe ratio for descriptor matching
    pub ratio: f64,
}

impl Default for AlignConfig {
    fn default() -> Self {
        let opts = AlignOptions::default();
        AlignConfig {
            iterations: opts.iterations,
            threshold: opts.threshold,
            motion_model: opts.model,
            seed: opts.seed,
            focal_length: None,
            ratio: 0.8,
        }
    }
}

/// Compositing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    pub blend_width: f64,
    pub coverage: Coverage,
}

impl Default for BlendConfig {
    fn default() -> Self {
        BlendConfig {
            blend_width: 50.0,
            coverage: Coverage::Auto,
        }
    }
}

impl PanoramaConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            PanoError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: PanoramaConfig = toml::from_str(&contents).map_err(|e| {
            PanoError::Config(format!("failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| PanoError::Config(format!("failed to serialize config: {e}")))?;
        fs::write(path, toml_string)?;
        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Loads `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_file(p),
            None => Ok(Self::default()),
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(PanoError::Config(msg));
        for (name, f) in [("warp.focal_length", self.warp.focal_length), ("align.focal_length", self.align.focal_length)] {
            if let Some(f) = f {
                if !(f > 0.0 && f.is_finite()) {
                    return bad(format!("{name} must be positive, got {f}"));
                }
            }
        }
        if !self.warp.cubic_a.is_finite() {
            return bad("warp.cubic_a must be finite".into());
        }
        if self.align.iterations == 0 {
            return bad("align.iterations must be at least 1".into());
        }
        if !(self.align.threshold >= 0.0) {
            return bad(format!("align.threshold must be non-negative, got {}", self.align.threshold));
        }
        if !(self.align.ratio > 0.0 && self.align.ratio <= 1.0) {
            return bad(format!("align.ratio must be in (0, 1], got {}", self.align.ratio));
        }
        if !(self.blend.blend_width >= 0.0 && self.blend.blend_width.is_finite()) {
            return bad(format!("blend.blend_width must be non-negative, got {}", self.blend.blend_width));
        }
        Ok(())
    }

    pub fn align_options(&self) -> AlignOptions {
        AlignOptions {
            model: self.align.motion_model,
            iterations: self.align.iterations,
            threshold: self.align.threshold,
            focal_length: self.align.focal_length,
            seed: self.align.seed,
        }
    }

    pub fn blend_options(&self) -> BlendOptions {
        BlendOptions {
            blend_width: self.blend.blend_width,
            coverage: self.blend.coverage,
            interpolation: self.warp.interpolation,
        }
    }

    pub fn resampler(&self) -> Resampler {
        Resampler::new(self.warp.interpolation).with_cubic_a(self.warp.cubic_a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PanoramaConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.align.iterations, 500);
        assert_eq!(config.align.threshold, 2.0);
        assert_eq!(config.blend.blend_width, 50.0);
        assert_eq!(config.warp.cubic_a, -0.5);
    }

    #[test]
    fn partial_files_keep_defaults() {
        let config: PanoramaConfig = toml::from_str(
            "[align]\nmotion_model = \"translate-rotate\"\niterations = 50\n\n[warp]\nprojection = \"spherical\"\n",
        )
        .unwrap();
        assert_eq!(config.align.motion_model, MotionModel::TranslateRotate);
        assert_eq!(config.align.iterations, 50);
        assert_eq!(config.align.ratio, 0.8);
        assert_eq!(config.warp.projection, Projection::Spherical);
        assert_eq!(config.blend, BlendConfig::default());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut c = PanoramaConfig::default();
        c.align.iterations = 0;
        assert!(c.validate().is_err());

        let mut c = PanoramaConfig::default();
        c.warp.focal_length = Some(-3.0);
        assert!(c.validate().is_err());

        let mut c = PanoramaConfig::default();
        c.align.ratio = 1.5;
        assert!(c.validate().is_err());

        let mut c = PanoramaConfig::default();
        c.blend.blend_width = -1.0;
        assert!(matches!(c.validate(), Err(PanoError::Config(_))));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pano.toml");
        let mut config = PanoramaConfig::default();
        config.warp.focal_length = Some(595.0);
        config.blend.coverage = Coverage::Black;
        config.save_to_file(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("[warp]") && text.contains("[align]") && text.contains("[blend]"));
        assert_eq!(PanoramaConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn missing_or_broken_files_are_config_errors() {
        assert!(matches!(
            PanoramaConfig::load_from_file("no_such_panostitch.toml"),
            Err(PanoError::Config(_))
        ));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[align]\niterations = \"many\"\n").unwrap();
        assert!(PanoramaConfig::load_from_file(&path).is_err());
        assert_eq!(PanoramaConfig::load_or_default(None).unwrap(), PanoramaConfig::default());
    }
}
