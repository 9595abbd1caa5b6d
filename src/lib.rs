//! License plate recognition batch pipeline: frame discovery, plate
//! cropping, geometric rectification and CTC decoding of recognizer output,
//! written up as one JSON report per batch.

pub mod config;
pub mod crop;
pub mod decode;
pub mod error;
pub mod frames;
pub mod image_process;
pub mod pipeline;
pub mod recognizer;
pub mod rectify;
pub mod report;
pub mod server;
#[cfg(feature = "tensorflow")]
pub mod tf;
pub mod utils;

pub use config::PipelineConfig;
pub use crop::{BoundingBox, Crop};
pub use decode::CharDictionary;
pub use error::{LprError, LprResult};
pub use pipeline::{CropSummary, Pipeline, RecognitionSummary, RunSummary};
pub use recognizer::{CtcRecognizer, Detector, LogitModel, Recognition, Recognizer};
pub use rectify::{Correction, PlateRectifier};
pub use report::{Outcome, RecognitionResult, Report};
