//! Feature points, correspondences and their text file formats.
//!
//! Native feature files start with a count line followed, per feature, by
//! `type`, `id`, `x y`, `angle`, the descriptor length `n` and `n` values.
//! SIFT keypoint files start with `count 128` followed, per feature, by
//! `row col scale orientation` and 128 descriptor values.
//! Correspondence files start with a count line followed by `id1 id2 score`.

use crate::error::{PanoError, Result};
use log::{debug, warn};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Type tag given to features read from SIFT keypoint files.
pub const SIFT_FEATURE_TYPE: i32 = 9;

/// Descriptor length of SIFT keypoints.
pub const SIFT_DESCRIPTOR_LEN: usize = 128;

/// Half-size of the square `select_point` toggles features in.
pub const SELECT_RADIUS: i32 = 3;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Feature {
    pub feature_type: i32,
    /// 1-based identifier referenced by [`FeatureMatch`].
    pub id: usize,
    pub x: i32,
    pub y: i32,
    pub angle_radians: f64,
    pub descriptor: Vec<f64>,
    pub selected: bool,
}

/// A correspondence between feature `id1` of the first set and `id2` of the second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureMatch {
    pub id1: usize,
    pub id2: usize,
    pub score: f64,
}

/// Whitespace-separated token reader that remembers line numbers for errors.
struct Tokens<'a> {
    path: &'a Path,
    iter: Box<dyn Iterator<Item = (usize, &'a str)> + 'a>,
    line: usize,
}

impl<'a> Tokens<'a> {
    fn new(path: &'a Path, text: &'a str) -> Self {
        let iter = text
            .lines()
            .enumerate()
            .flat_map(|(i, line)| line.split_whitespace().map(move |t| (i + 1, t)));
        Tokens {
            path,
            iter: Box::new(iter),
            line: 1,
        }
    }

    fn next<T: FromStr>(&mut self, what: &str) -> Result<T> {
        match self.iter.next() {
            Some((line, token)) => {
                self.line = line;
                token.parse().map_err(|_| {
                    PanoError::malformed(self.path, line, format!("expected {what}, found '{token}'"))
                })
            }
            None => Err(PanoError::malformed(
                self.path,
                self.line,
                format!("unexpected end of file while reading {what}"),
            )),
        }
    }
}

pub(crate) fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        PanoError::Io(std::io::Error::new(e.kind(), format!("{}: {e}", path.display())))
    })
}

/// An ordered collection of features, loaded once from a file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    features: Vec<Feature>,
}

impl FeatureSet {
    pub fn new(features: Vec<Feature>) -> Self {
        FeatureSet { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }

    pub fn as_slice(&self) -> &[Feature] {
        &self.features
    }

    /// The feature a 1-based id refers to (`f[id - 1]`).
    pub fn by_id(&self, id: usize) -> Option<&Feature> {
        id.checked_sub(1).and_then(|i| self.features.get(i))
    }

    /// Loads a native feature file.
    pub fn load(path: impl AsRef<Path>) -> Result<FeatureSet> {
        let path = path.as_ref();
        let text = read_text(path)?;
        let mut tokens = Tokens::new(path, &text);
        let count: usize = tokens.next("feature count")?;
        let mut features = Vec::with_capacity(count);
        for _ in 0..count {
            let feature_type = tokens.next("feature type")?;
            let id = tokens.next("feature id")?;
            let x = tokens.next("x coordinate")?;
            let y = tokens.next("y coordinate")?;
            let angle_radians = tokens.next("angle")?;
            let n: usize = tokens.next("descriptor length")?;
            let descriptor = (0..n)
                .map(|_| tokens.next("descriptor value"))
                .collect::<Result<Vec<f64>>>()?;
            features.push(Feature {
                feature_type,
                id,
                x,
                y,
                angle_radians,
                descriptor,
                selected: false,
            });
        }
        debug!("loaded {} features from {}", features.len(), path.display());
        Ok(FeatureSet { features })
    }

    /// Loads a SIFT keypoint file. Ids are assigned 1..=n in file order.
    pub fn load_sift(path: impl AsRef<Path>) -> Result<FeatureSet> {
        let path = path.as_ref();
        let text = read_text(path)?;
        let mut tokens = Tokens::new(path, &text);
        let count: usize = tokens.next("keypoint count")?;
        let len: usize = tokens.next("descriptor length")?;
        if len != SIFT_DESCRIPTOR_LEN {
            return Err(PanoError::malformed(
                path,
                1,
                format!("SIFT descriptor length must be {SIFT_DESCRIPTOR_LEN}, found {len}"),
            ));
        }
        let mut features = Vec::with_capacity(count);
        for id in 1..=count {
            // Rows come first, then columns.
            let row: f64 = tokens.next("keypoint row")?;
            let col: f64 = tokens.next("keypoint column")?;
            let _scale: f64 = tokens.next("keypoint scale")?;
            let angle_radians = tokens.next("keypoint orientation")?;
            let descriptor = (0..SIFT_DESCRIPTOR_LEN)
                .map(|_| tokens.next("descriptor value"))
                .collect::<Result<Vec<f64>>>()?;
            features.push(Feature {
                feature_type: SIFT_FEATURE_TYPE,
                id,
                x: col.round() as i32,
                y: row.round() as i32,
                angle_radians,
                descriptor,
                selected: false,
            });
        }
        debug!("loaded {} SIFT keypoints from {}", features.len(), path.display());
        Ok(FeatureSet { features })
    }

    /// Writes the native text format.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.features.len());
        for f in &self.features {
            let _ = writeln!(out, "{}", f.feature_type);
            let _ = writeln!(out, "{}", f.id);
            let _ = writeln!(out, "{} {}", f.x, f.y);
            let _ = writeln!(out, "{}", f.angle_radians);
            let _ = writeln!(out, "{}", f.descriptor.len());
            for v in &f.descriptor {
                let _ = writeln!(out, "{v}");
            }
        }
        fs::write(path.as_ref(), out)?;
        Ok(())
    }

    /// Toggles the selection of every feature within [`SELECT_RADIUS`] of `(x, y)`.
    pub fn select_point(&mut self, x: i32, y: i32) {
        for f in &mut self.features {
            if (f.x - x).abs() <= SELECT_RADIUS && (f.y - y).abs() <= SELECT_RADIUS {
                f.selected = !f.selected;
            }
        }
    }

    /// Toggles the selection of every feature inside the inclusive box.
    pub fn select_box(&mut self, x_min: i32, x_max: i32, y_min: i32, y_max: i32) {
        for f in &mut self.features {
            if (x_min..=x_max).contains(&f.x) && (y_min..=y_max).contains(&f.y) {
                f.selected = !f.selected;
            }
        }
    }

    pub fn select_all(&mut self) {
        self.features.iter_mut().for_each(|f| f.selected = true);
    }

    pub fn deselect_all(&mut self) {
        self.features.iter_mut().for_each(|f| f.selected = false);
    }

    /// A new set holding copies of the selected features.
    pub fn selected(&self) -> FeatureSet {
        FeatureSet {
            features: self.features.iter().filter(|f| f.selected).cloned().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a FeatureSet {
    type Item = &'a Feature;
    type IntoIter = std::slice::Iter<'a, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}

/// Reads a correspondence file.
pub fn load_matches(path: impl AsRef<Path>) -> Result<Vec<FeatureMatch>> {
    let path = path.as_ref();
    let text = read_text(path)?;
    let mut tokens = Tokens::new(path, &text);
    let count: usize = tokens.next("match count")?;
    let mut matches = Vec::with_capacity(count);
    for _ in 0..count {
        let id1 = tokens.next("first feature id")?;
        let id2 = tokens.next("second feature id")?;
        let score = tokens.next("match score")?;
        matches.push(FeatureMatch { id1, id2, score });
    }
    if matches.is_empty() {
        warn!("{} contains no matches", path.display());
    }
    Ok(matches)
}

/// Writes a correspondence file.
pub fn save_matches(path: impl AsRef<Path>, matches: &[FeatureMatch]) -> Result<()> {
    let mut out = String::new();
    let _ = writeln!(out, "{}", matches.len());
    for m in matches {
        let _ = writeln!(out, "{} {} {}", m.id1, m.id2, m.score);
    }
    fs::write(path.as_ref(), out)?;
    Ok(())
}
