use std::path::PathBuf;
use thiserror::Error;

/// Errors produced anywhere in the stitching pipeline.
///
/// File- and argument-level errors abort the current command. Out-of-bounds
/// resampling is not an error (the destination pixel is zero-filled instead).
#[derive(Debug, Error)]
pub enum PanoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Codec(#[from] image::ImageError),

    /// A text file (features, matches, placement list) that is truncated or malformed.
    #[error("{}:{line}: {message}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("matrix is singular (zero pivot in column {column})")]
    SingularMatrix { column: usize },

    /// RANSAC never found a hypothesis with at least one inlier.
    #[error("alignment failed: no inliers among {matches} matches after {iterations} iterations")]
    AlignmentFailure { matches: usize, iterations: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, PanoError>;

impl PanoError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        PanoError::Malformed {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    pub(crate) fn shape_mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        PanoError::ShapeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
