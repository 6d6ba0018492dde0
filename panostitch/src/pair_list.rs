//! Placement lists: the chain of adjacent image pairs fed to the blender.
//!
//! Each line reads `file1 file2 dx dy`, where `(dx, dy)` is the translation
//! printed by `align` for the pair: the motion carrying features of `file1`
//! onto `file2`. `file2` therefore sits at `(-dx, -dy)` in the pixel frame of
//! `file1`. Blank lines and lines starting with `//` or `#` are ignored.

use crate::error::{PanoError, Result};
use crate::features::read_text;
use crate::transform::Transform3x3;
use log::{debug, warn};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Resolves `file` against `base` unless it is already absolute.
pub fn resolve_relative(base: &Path, file: &str) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairEntry {
    pub first: PathBuf,
    pub second: PathBuf,
    pub dx: f64,
    pub dy: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairList {
    pub entries: Vec<PairEntry>,
}

impl PairList {
    /// Parses list text; relative file names are resolved against `base`.
    /// `source` only labels errors.
    pub fn parse(text: &str, base: &Path, source: &Path) -> Result<PairList> {
        let mut entries = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [first, second, dx, dy] = fields[..] else {
                return Err(PanoError::malformed(
                    source,
                    i + 1,
                    format!("expected 'file1 file2 dx dy', found {} fields", fields.len()),
                ));
            };
            let number = |s: &str| {
                s.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| PanoError::malformed(source, i + 1, format!("expected a displacement, found '{s}'")))
            };
            entries.push(PairEntry {
                first: resolve_relative(base, first),
                second: resolve_relative(base, second),
                dx: number(dx)?,
                dy: number(dy)?,
            });
        }
        for (n, pair) in entries.windows(2).enumerate() {
            if pair[0].second != pair[1].first {
                warn!(
                    "pair {} ends at {} but pair {} starts at {}",
                    n + 1,
                    pair[0].second.display(),
                    n + 2,
                    pair[1].first.display()
                );
            }
        }
        Ok(PairList { entries })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<PairList> {
        let path = path.as_ref();
        let text = read_text(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let list = PairList::parse(&text, base, path)?;
        debug!("{}: {} pairs", path.display(), list.entries.len());
        Ok(list)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut out = String::new();
        for e in &self.entries {
            let _ = writeln!(out, "{} {} {} {}", e.first.display(), e.second.display(), e.dx, e.dy);
        }
        fs::write(path.as_ref(), out)?;
        Ok(())
    }

    /// Every image in chain order with its placement in the frame of the first:
    /// `P_0 = I`, `P_n = P_{n-1} * Translation(-dx_n, -dy_n)`.
    pub fn placements(&self) -> Vec<(PathBuf, Transform3x3)> {
        let Some(head) = self.entries.first() else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(self.entries.len() + 1);
        let mut current = Transform3x3::identity();
        out.push((head.first.clone(), current));
        for e in &self.entries {
            current = current * Transform3x3::translation(-e.dx, -e.dy);
            out.push((e.second.clone(), current));
        }
        out
    }
}
