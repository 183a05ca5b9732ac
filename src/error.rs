use std::path::PathBuf;

use thiserror::Error;

/// A source artifact could not be turned into pixel data.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no valid images found in {0}")]
    NoValidImages(PathBuf),

    #[error("no frames with the expected channel count in {0}")]
    NoConformingFrames(PathBuf),

    #[error("{reason}: {path}")]
    Dicom { path: PathBuf, reason: &'static str },

    #[error("unsupported source {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },

    #[error("malformed container {path}: {reason}")]
    Container { path: PathBuf, reason: String },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    pub(crate) fn container(path: &std::path::Path, reason: impl Into<String>) -> Self {
        Self::Container {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Spatial shapes that do not line up.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("series has no slices")]
    EmptySeries,

    #[error("slice {index} is {found:?} (height, width), expected {expected:?}")]
    SliceDimensions {
        index: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("{component} attention has shape {found:?}, expected {expected:?}")]
    AttentionShape {
        component: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("target shape {0:?} has a zero-sized axis")]
    EmptyTarget((usize, usize, usize)),
}

/// Writing an overlay artifact failed.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("refusing to export an empty frame sequence")]
    EmptySequence,

    #[error("frame {index} is {found:?}, expected {expected:?}")]
    FrameSize {
        index: usize,
        expected: (u32, u32),
        found: (u32, u32),
    },

    #[error("encoding error: {0}")]
    Encode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("failed to read prediction {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse prediction: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("prediction is malformed: {0}")]
    Malformed(String),
}

/// Splitting an animation or stacking frames into a container failed.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything that can end the processing of one study.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Predict(#[from] PredictError),
}
