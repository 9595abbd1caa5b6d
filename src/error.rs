use std::io::Error as IOError;
use std::path::PathBuf;

use image::ImageError;
use thiserror::Error;

use crate::crop::BoundingBox;

pub type LprResult<T> = Result<T, LprError>;

#[derive(Debug, Error)]
pub enum LprError {
    /// file exists but can not be decoded as an image, the file is skipped
    #[error("can not decode image {}: {source}", path.display())]
    UnreadableImage {
        path: PathBuf,
        #[source]
        source: ImageError,
    },

    /// bounding box clipped to nothing, the box is skipped
    #[error("bounding box {0:?} clips to an empty crop")]
    EmptyCrop(BoundingBox),

    /// crop is too narrow or taller than wide
    #[error("crop of {width}x{height} is not plate shaped")]
    InvalidCropGeometry { width: u32, height: u32 },

    /// recognizer gave nothing usable, recorded as empty text
    #[error("recognizer returned no usable result: {0}")]
    RecognitionEmpty(String),

    #[error("can not parse a frame id from {}", .0.display())]
    MalformedFilename(PathBuf),

    #[error("can not read directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: IOError,
    },

    #[error("can not write {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: IOError,
    },

    #[error("can not encode {}: {source}", path.display())]
    EncodeImage {
        path: PathBuf,
        #[source]
        source: ImageError,
    },

    #[error("invalid config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("report serialization failed: {0}")]
    Report(#[from] serde_json::Error),

    #[error("unexpected tensor shape: {0}")]
    Shape(String),

    #[error("character dictionary: {0}")]
    Dictionary(String),

    #[error("{0} backend is not compiled in, rebuild with `--features tensorflow`")]
    BackendUnavailable(&'static str),

    #[cfg(feature = "tensorflow")]
    #[error("tensorflow: {0}")]
    Tensorflow(#[from] tensorflow::Status),

    #[error(transparent)]
    IO(#[from] IOError),
}

impl LprError {
    /// Errors that abort the whole batch instead of a single frame or crop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LprError::Directory { .. }
                | LprError::Output { .. }
                | LprError::EncodeImage { .. }
                | LprError::Config { .. }
                | LprError::Report(_)
        )
    }
}

impl From<ndarray::ShapeError> for LprError {
    fn from(e: ndarray::ShapeError) -> Self {
        Self::Shape(e.to_string())
    }
}
