use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{LprError, LprResult};
use crate::recognizer::Recognition;

/// Recognition fields of one report entry, flattened next to `time` and
/// `filename`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome {
    Dual {
        plate_text_raw: String,
        confidence_raw: f32,
        plate_text_processed: String,
        confidence_processed: f32,
    },
    Single {
        plate_text: String,
        confidence: f32,
    },
}

impl Outcome {
    pub fn single(processed: Recognition) -> Self {
        Outcome::Single {
            plate_text: processed.text,
            confidence: processed.confidence,
        }
    }

    pub fn dual(raw: Recognition, processed: Recognition) -> Self {
        Outcome::Dual {
            plate_text_raw: raw.text,
            confidence_raw: raw.confidence,
            plate_text_processed: processed.text,
            confidence_processed: processed.confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    /// frame id the crop came from
    pub time: String,
    pub filename: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl RecognitionResult {
    pub fn new(time: impl Into<String>, filename: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            time: time.into(),
            filename: filename.into(),
            outcome,
        }
    }

    /// Entry for a crop that was skipped before recognition.
    pub fn placeholder(time: impl Into<String>, filename: impl Into<String>, dual: bool) -> Self {
        let outcome = if dual {
            Outcome::dual(Recognition::empty(), Recognition::empty())
        } else {
            Outcome::single(Recognition::empty())
        };
        Self::new(time, filename, outcome)
    }
}

/// Ordered results of one batch, written once at the end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Report {
    entries: Vec<RecognitionResult>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: RecognitionResult) {
        self.entries.push(result);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<RecognitionResult> {
        self.entries
    }

    /// Serialize to `path` through a temporary file in the same directory, so
    /// readers never see a half written report.
    pub fn write_atomic(&self, path: impl AsRef<Path>) -> LprResult<()> {
        let path = path.as_ref();
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
        let output_err = |source| LprError::Output {
            path: path.to_path_buf(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(output_err)?;
        serde_json::to_writer_pretty(&mut tmp, &self.entries)?;
        tmp.write_all(b"\n").map_err(output_err)?;
        tmp.persist(path).map_err(|e| output_err(e.error))?;
        info!("wrote {} results to {}", self.len(), path.display());
        Ok(())
    }
}
