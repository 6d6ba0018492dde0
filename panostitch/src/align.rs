//! Robust pairwise alignment from feature correspondences.
//!
//! Each run goes through sampling (draw a minimal set of matches), scoring
//! (count inliers of the exact fit), best selection (largest inlier count,
//! earliest on ties) and refinement (least squares over the best inliers).

use crate::error::{PanoError, Result};
use crate::features::{FeatureMatch, FeatureSet};
use crate::transform::Transform3x3;
use log::{debug, info, warn};
use nalgebra::{Point2, Vector2};
use rand::prelude::IndexedRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How many times a degenerate minimal sample is re-drawn within one iteration.
pub const MAX_RESAMPLE: usize = 32;

/// Motion between two images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MotionModel {
    /// Pure translation (1 match per hypothesis).
    #[default]
    Translate,
    /// In-plane rotation plus translation (2 matches per hypothesis).
    TranslateRotate,
}

impl MotionModel {
    pub fn min_samples(self) -> usize {
        match self {
            MotionModel::Translate => 1,
            MotionModel::TranslateRotate => 2,
        }
    }
}

impl fmt::Display for MotionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MotionModel::Translate => "translate",
            MotionModel::TranslateRotate => "translate-rotate",
        })
    }
}

impl FromStr for MotionModel {
    type Err = PanoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "translate" | "translation" => Ok(MotionModel::Translate),
            "translate-rotate" | "rotate" | "rigid" => Ok(MotionModel::TranslateRotate),
            other => Err(PanoError::InvalidArgument(format!(
                "unknown motion model '{other}' (expected translate or translate-rotate)"
            ))),
        }
    }
}

/// Parameters of one RANSAC run.
#[derive(Debug, Clone)]
pub struct AlignOptions {
    pub model: MotionModel,
    /// Number of hypotheses drawn.
    pub iterations: usize,
    /// Inlier bound on the squared distance, in pixels squared.
    pub threshold: f64,
    /// Focal length in pixels; when set, the result reports pan/tilt angles.
    pub focal_length: Option<f64>,
    /// RNG seed, so runs are reproducible.
    pub seed: u64,
}

impl Default for AlignOptions {
    fn default() -> Self {
        AlignOptions {
            model: MotionModel::Translate,
            iterations: 500,
            threshold: 2.0,
            focal_length: None,
            seed: 1_234_567,
        }
    }
}

/// A matched pair of pixel locations, `p1` in the first image and `p2` in the second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub p1: Point2<f64>,
    pub p2: Point2<f64>,
}

/// Outcome of a successful alignment.
#[derive(Debug, Clone)]
pub struct Alignment {
    /// Maps first-image coordinates onto second-image coordinates.
    pub transform: Transform3x3,
    /// Indices into the match list of the best hypothesis' inliers.
    pub inliers: Vec<usize>,
    pub iterations: usize,
    /// Root-mean-square residual of the refined transform over the inliers.
    pub rms: f64,
    /// `(tx / f, ty / f)` in radians when a focal length was given.
    pub pan_tilt: Option<(f64, f64)>,
}

impl Alignment {
    pub fn translation(&self) -> (f64, f64) {
        self.transform.translation_part()
    }

    /// Rotation angle of the transform in degrees.
    pub fn rotation_degrees(&self) -> f64 {
        self.transform[(1, 0)].atan2(self.transform[(0, 0)]).to_degrees()
    }
}

/// Looks up the pixel locations of every match.
///
/// # Errors
/// [`PanoError::InvalidArgument`] when a match refers to an id missing from its set.
pub fn correspondences(f1: &FeatureSet, f2: &FeatureSet, matches: &[FeatureMatch]) -> Result<Vec<Correspondence>> {
    matches
        .iter()
        .map(|m| {
            let a = f1.by_id(m.id1).ok_or_else(|| {
                PanoError::InvalidArgument(format!("match refers to feature {} of {} in the first set", m.id1, f1.len()))
            })?;
            let b = f2.by_id(m.id2).ok_or_else(|| {
                PanoError::InvalidArgument(format!("match refers to feature {} of {} in the second set", m.id2, f2.len()))
            })?;
            Ok(Correspondence {
                p1: Point2::new(a.x as f64, a.y as f64),
                p2: Point2::new(b.x as f64, b.y as f64),
            })
        })
        .collect()
}

fn apply(m: &Transform3x3, p: &Point2<f64>) -> Point2<f64> {
    let (x, y) = m.apply(p.x, p.y);
    Point2::new(x, y)
}

fn rigid(theta: f64, t: Vector2<f64>) -> Transform3x3 {
    let (s, c) = theta.sin_cos();
    Transform3x3::from_rows([[c, -s, t.x], [s, c, t.y], [0.0, 0.0, 1.0]])
}

fn is_degenerate(model: MotionModel, data: &[Correspondence], sample: &[usize]) -> bool {
    match model {
        MotionModel::Translate => false,
        MotionModel::TranslateRotate => {
            let (a, b) = (&data[sample[0]], &data[sample[1]]);
            (b.p1 - a.p1).norm() < 1e-9 || (b.p2 - a.p2).norm() < 1e-9
        }
    }
}

/// Exact fit to a minimal sample.
fn fit_minimal(model: MotionModel, data: &[Correspondence], sample: &[usize]) -> Transform3x3 {
    match model {
        MotionModel::Translate => {
            let c = &data[sample[0]];
            let t = c.p2 - c.p1;
            Transform3x3::translation(t.x, t.y)
        }
        MotionModel::TranslateRotate => {
            let (a, b) = (&data[sample[0]], &data[sample[1]]);
            let d1 = b.p1 - a.p1;
            let d2 = b.p2 - a.p2;
            let theta = d2.y.atan2(d2.x) - d1.y.atan2(d1.x);
            let r = rigid(theta, Vector2::zeros());
            let rotated = apply(&r, &a.p1);
            rigid(theta, a.p2 - rotated)
        }
    }
}

/// Indices of the correspondences whose `p1`, mapped by `m`, lands within
/// squared distance `threshold` of `p2`.
pub fn count_inliers(data: &[Correspondence], m: &Transform3x3, threshold: f64) -> Vec<usize> {
    data.iter()
        .enumerate()
        .filter(|(_, c)| (apply(m, &c.p1) - c.p2).norm_squared() <= threshold)
        .map(|(i, _)| i)
        .collect()
}

/// Least-squares transform over the given correspondences.
///
/// Translation uses the mean displacement. Translate+rotate uses the closed-form
/// 2-D Procrustes solution about the centroids.
///
/// # Errors
/// [`PanoError::InvalidArgument`] for an empty or out-of-range inlier list.
pub fn least_squares_fit(data: &[Correspondence], inliers: &[usize], model: MotionModel) -> Result<Transform3x3> {
    if inliers.is_empty() {
        return Err(PanoError::InvalidArgument(
            "least-squares fit needs at least one inlier".into(),
        ));
    }
    if let Some(&bad) = inliers.iter().find(|&&i| i >= data.len()) {
        return Err(PanoError::InvalidArgument(format!(
            "inlier index {bad} out of range for {} correspondences",
            data.len()
        )));
    }

    let n = inliers.len() as f64;
    let c1 = inliers.iter().fold(Vector2::zeros(), |acc, &i| acc + data[i].p1.coords) / n;
    let c2 = inliers.iter().fold(Vector2::zeros(), |acc, &i| acc + data[i].p2.coords) / n;

    match model {
        MotionModel::Translate => {
            let t = c2 - c1;
            Ok(Transform3x3::translation(t.x, t.y))
        }
        MotionModel::TranslateRotate => {
            let (mut sin_sum, mut cos_sum) = (0.0, 0.0);
            for &i in inliers {
                let a = data[i].p1.coords - c1;
                let b = data[i].p2.coords - c2;
                cos_sum += a.dot(&b);
                sin_sum += a.x * b.y - a.y * b.x;
            }
            let theta = sin_sum.atan2(cos_sum);
            let r = rigid(theta, Vector2::zeros());
            let rc1 = apply(&r, &Point2::from(c1));
            Ok(rigid(theta, c2 - rc1.coords))
        }
    }
}

/// Runs RANSAC over resolved correspondences.
///
/// # Errors
/// [`PanoError::AlignmentFailure`] when no hypothesis gathers a single inlier,
/// including when every minimal sample was degenerate or there are fewer
/// matches than the model needs.
pub fn ransac(data: &[Correspondence], opts: &AlignOptions) -> Result<Alignment> {
    let failure = || PanoError::AlignmentFailure {
        matches: data.len(),
        iterations: opts.iterations,
    };
    let k = opts.model.min_samples();
    if data.len() < k {
        warn!("{} matches, {} model needs {k}", data.len(), opts.model);
        return Err(failure());
    }

    let all: Vec<usize> = (0..data.len()).collect();
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut best: Option<(Transform3x3, Vec<usize>)> = None;
    let mut degenerate = 0usize;
    let mut exhausted = 0usize;

    for iter in 0..opts.iterations {
        // Sampling
        let mut sample = Vec::with_capacity(k);
        for _ in 0..MAX_RESAMPLE {
            sample.clear();
            sample.extend(all.as_slice().choose_multiple(&mut rng, k).copied());
            if !is_degenerate(opts.model, data, &sample) {
                break;
            }
            degenerate += 1;
            sample.clear();
        }
        if sample.is_empty() {
            exhausted += 1;
            continue;
        }

        // Scoring
        let candidate = fit_minimal(opts.model, data, &sample);
        let inliers = count_inliers(data, &candidate, opts.threshold);

        // Best selection
        let best_count = best.as_ref().map_or(0, |(_, b)| b.len());
        if inliers.len() > best_count {
            debug!("iteration {iter}: {} inliers", inliers.len());
            best = Some((candidate, inliers));
        }
    }
    if degenerate > 0 {
        debug!("re-drew {degenerate} degenerate samples");
    }
    if exhausted > 0 {
        warn!("{exhausted} of {} iterations found no usable sample", opts.iterations);
    }

    let (_, inliers) = best.ok_or_else(failure)?;

    // Refinement
    let transform = least_squares_fit(data, &inliers, opts.model)?;
    let rms = (inliers
        .iter()
        .map(|&i| (apply(&transform, &data[i].p1) - data[i].p2).norm_squared())
        .sum::<f64>()
        / inliers.len() as f64)
        .sqrt();
    let (tx, ty) = transform.translation_part();
    let pan_tilt = opts
        .focal_length
        .filter(|f| *f > 0.0)
        .map(|f| (tx / f, ty / f));

    info!(
        "{} alignment: t = ({tx:.2}, {ty:.2}), {} of {} matches inlying, rms {rms:.3}",
        opts.model,
        inliers.len(),
        data.len()
    );
    Ok(Alignment {
        transform,
        inliers,
        iterations: opts.iterations,
        rms,
        pan_tilt,
    })
}

/// Estimates the transform taking `f1` coordinates onto `f2` coordinates.
pub fn align_pair(
    f1: &FeatureSet,
    f2: &FeatureSet,
    matches: &[FeatureMatch],
    opts: &AlignOptions,
) -> Result<Alignment> {
    let data = correspondences(f1, f2, matches)?;
    ransac(&data, opts)
}
