use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LprError, LprResult};

/// What to do with a frame whose filename has no `_<id>` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameIdPolicy {
    /// warn and drop the file
    Skip,
    /// fail the whole batch
    Abort,
    /// use a zero padded running index instead
    Sequential,
}

/// Memory layout of the recognizer input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    Nchw,
    Nhwc,
}

/// Which recognition passes end up in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportVariant {
    /// rectified crop only, `plate_text`/`confidence`
    Single,
    /// raw and rectified crop side by side
    Dual,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub frames: FramesConfig,
    pub crops: CropsConfig,
    pub rectifier: RectifierConfig,
    pub normalize: NormalizeConfig,
    pub recognition: RecognitionConfig,
    pub detector: DetectorConfig,
    pub models: ModelsConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramesConfig {
    pub extensions: Vec<String>,
    pub malformed_filename: FrameIdPolicy,
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            extensions: crate::frames::IMAGE_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            malformed_filename: FrameIdPolicy::Skip,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropsConfig {
    /// extension (and so encoding) of written crop files
    pub extension: String,
}

impl Default for CropsConfig {
    fn default() -> Self {
        Self { extension: "png".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RectifierConfig {
    pub min_width: u32,
    pub min_aspect_ratio: f32,
    /// gaussian sigma, 0.8 matches a 3x3 kernel
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// degrees
    pub rotation_threshold: f32,
    pub tilt_threshold: f32,
    /// polygon tolerance as a fraction of the contour perimeter
    pub approx_epsilon: f64,
}

impl Default for RectifierConfig {
    fn default() -> Self {
        Self {
            min_width: 95,
            min_aspect_ratio: 1.0,
            blur_sigma: 0.8,
            canny_low: 50.0,
            canny_high: 150.0,
            rotation_threshold: 5.0,
            tilt_threshold: 0.12,
            approx_epsilon: 0.02,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub height: u32,
    pub contrast: f32,
    pub blur_sigma: f32,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            height: 100,
            contrast: 1.2,
            blur_sigma: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub input_height: u32,
    pub max_width: u32,
    pub layout: TensorLayout,
    pub variant: ReportVariant,
    /// write an empty placeholder entry for crops that were skipped
    pub record_skipped: bool,
    pub report_name: String,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            input_height: 32,
            max_width: 320,
            layout: TensorLayout::Nchw,
            variant: ReportVariant::Dual,
            record_skipped: false,
            report_name: "results.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub score_threshold: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self { score_threshold: 0.25 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub detection: PathBuf,
    pub detection_input: String,
    pub detection_boxes: String,
    pub detection_scores: String,
    pub recognition: PathBuf,
    pub recognition_input: String,
    pub recognition_output: String,
    /// one entry per line, the built-in plate alphabet when unset
    pub dictionary: Option<PathBuf>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            detection: PathBuf::from("./models/detect.pb"),
            detection_input: "image_tensor".to_string(),
            detection_boxes: "detection_boxes".to_string(),
            detection_scores: "detection_scores".to_string(),
            recognition: PathBuf::from("./models/recognize.pb"),
            recognition_input: "input_1".to_string(),
            recognition_output: "logits".to_string(),
            dictionary: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen: "127.0.0.1:8000".to_string() }
    }
}

impl PipelineConfig {
    pub fn load(path: impl AsRef<Path>) -> LprResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text).map_err(|source| LprError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
