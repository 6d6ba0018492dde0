use crate::error::{PanoError, Result};
use crate::features::{Feature, FeatureMatch, FeatureSet, SIFT_DESCRIPTOR_LEN};
use kd_tree::{KdPoint, KdTree};
use log::{debug, info};
use rayon::prelude::*;

/// Descriptor values are multiplied by this before rounding to integers for the tree.
pub const DESCRIPTOR_SCALE: f64 = 1000.0;

/// Largest quantised magnitude the tree accepts. 128 squared differences of
/// values within `±MAX_QUANTIZED` stay below `i64::MAX`.
const MAX_QUANTIZED: f64 = 1.0e8;

/// A 128-d descriptor quantised to integers, tagged with its feature id.
#[derive(Debug, Clone)]
struct QuantizedDescriptor {
    id: usize,
    values: Box<[i64; SIFT_DESCRIPTOR_LEN]>,
}

impl QuantizedDescriptor {
    fn quantizable(f: &Feature) -> bool {
        f.descriptor
            .iter()
            .all(|v| (v * DESCRIPTOR_SCALE).abs() <= MAX_QUANTIZED)
    }

    fn from_feature(f: &Feature) -> Option<Self> {
        if f.descriptor.len() != SIFT_DESCRIPTOR_LEN || !Self::quantizable(f) {
            return None;
        }
        let mut values = Box::new([0i64; SIFT_DESCRIPTOR_LEN]);
        for (q, v) in values.iter_mut().zip(&f.descriptor) {
            *q = (v * DESCRIPTOR_SCALE).round() as i64;
        }
        Some(QuantizedDescriptor { id: f.id, values })
    }
}

impl KdPoint for QuantizedDescriptor {
    type Scalar = i64;
    type Dim = typenum::U128;
    fn at(&self, k: usize) -> i64 {
        self.values[k]
    }
}

/// Matches descriptors of one feature set against another.
///
/// Each feature of the first set is paired with its nearest neighbour in the
/// second set when that neighbour passes Lowe's ratio test against the second
/// nearest. 128-d descriptors go through a [KdTree]; any other length falls
/// back to a linear scan. Matches are not made mutually unique.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorMatcher {
    ratio: f64,
}

impl Default for DescriptorMatcher {
    fn default() -> Self {
        DescriptorMatcher { ratio: 0.8 }
    }
}

impl DescriptorMatcher {
    /// # Errors
    /// [`PanoError::InvalidArgument`] unless `0 < ratio <= 1`.
    pub fn new(ratio: f64) -> Result<Self> {
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(PanoError::InvalidArgument(format!(
                "ratio must be in (0, 1], got {ratio}"
            )));
        }
        Ok(DescriptorMatcher { ratio })
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Returns matches `(f1 id, f2 id, distance)` in `f1` order.
    pub fn match_sets(&self, f1: &FeatureSet, f2: &FeatureSet) -> Result<Vec<FeatureMatch>> {
        if f2.is_empty() {
            return Ok(Vec::new());
        }
        let dim = f2.as_slice()[0].descriptor.len();
        if let Some(bad) = f1.iter().chain(f2.iter()).find(|f| f.descriptor.len() != dim) {
            return Err(PanoError::InvalidArgument(format!(
                "feature {} has a {}-d descriptor, expected {dim}",
                bad.id,
                bad.descriptor.len()
            )));
        }

        let matches: Vec<FeatureMatch> = if dim != SIFT_DESCRIPTOR_LEN {
            debug!("{dim}-d descriptors, using linear scan");
            self.match_linear(f1, f2)
        } else if !f1.iter().chain(f2.iter()).all(QuantizedDescriptor::quantizable) {
            debug!("descriptor values exceed the quantised range, using linear scan");
            self.match_linear(f1, f2)
        } else {
            self.match_with_tree(f1, f2)
        };
        info!(
            "matched {} of {} features (ratio {})",
            matches.len(),
            f1.len(),
            self.ratio
        );
        Ok(matches)
    }

    fn accept(&self, id1: usize, best: (usize, f64), second: Option<f64>) -> Option<FeatureMatch> {
        let d1 = best.1.sqrt();
        match second {
            Some(d2) if d1 >= self.ratio * d2.sqrt() => None,
            _ => Some(FeatureMatch {
                id1,
                id2: best.0,
                score: d1,
            }),
        }
    }

    fn match_with_tree(&self, f1: &FeatureSet, f2: &FeatureSet) -> Vec<FeatureMatch> {
        let points: Vec<QuantizedDescriptor> =
            f2.iter().filter_map(QuantizedDescriptor::from_feature).collect();
        let tree = KdTree::build(points);
        let scale2 = DESCRIPTOR_SCALE * DESCRIPTOR_SCALE;

        f1.as_slice()
            .par_iter()
            .filter_map(|f| {
                let query = QuantizedDescriptor::from_feature(f)?;
                let found = tree.nearests(&query, 2);
                let best = found.first()?;
                let second = found.get(1).map(|n| n.squared_distance as f64 / scale2);
                self.accept(
                    f.id,
                    (best.item.id, best.squared_distance as f64 / scale2),
                    second,
                )
            })
            .collect()
    }

    fn match_linear(&self, f1: &FeatureSet, f2: &FeatureSet) -> Vec<FeatureMatch> {
        f1.as_slice()
            .par_iter()
            .filter_map(|f| {
                let mut best: Option<(usize, f64)> = None;
                let mut second: Option<f64> = None;
                for g in f2 {
                    let d: f64 = f
                        .descriptor
                        .iter()
                        .zip(&g.descriptor)
                        .map(|(a, b)| (a - b) * (a - b))
                        .sum();
                    match best {
                        Some((_, bd)) if d >= bd => {
                            if second.map_or(true, |s| d < s) {
                                second = Some(d);
                            }
                        }
                        _ => {
                            second = best.map(|(_, bd)| bd);
                            best = Some((g.id, d));
                        }
                    }
                }
                self.accept(f.id, best?, second)
            })
            .collect()
    }
}
