use thiserror::Error;

use crate::region::BoundingBox;

/// Failures of a single compositing call. The destination image is left
/// untouched when any of these is returned before the blend stage.
#[derive(Debug, Error)]
pub enum SwapError {
    #[error("no landmarks found in region {0:?}")]
    NoLandmarks(BoundingBox),

    #[error("landmark set has {found} points, need at least {expected}")]
    TooFewLandmarks { found: usize, expected: usize },

    #[error("alignment keypoints are collinear, no affine transform exists")]
    DegenerateTransform,

    #[error("region {0:?} lies outside the image")]
    RegionOutsideImage(BoundingBox),

    #[error("image size mismatch: source {source_size:?}, destination {destination_size:?}")]
    SizeMismatch {
        source_size: (u32, u32),
        destination_size: (u32, u32),
    },

    #[error("convex hull of the destination landmarks is empty")]
    EmptyHull,

    #[error(transparent)]
    Landmarks(#[from] anyhow::Error),
}

/// Failures while reading or writing a face-region record.
#[derive(Debug, Error)]
pub enum RegionFileError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("region record version {found} does not match {expected}")]
    VersionMismatch { found: i32, expected: i32 },

    #[error("malformed value for `{field}`: {value:?}")]
    Parse { field: &'static str, value: String },

    #[error("record ended before `{field}`")]
    UnexpectedEof { field: &'static str },
}
