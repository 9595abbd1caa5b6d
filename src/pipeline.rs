//! Batch orchestration.
//!
//! The crop stage walks a frame directory, runs the detector and writes one
//! file per plate crop. The recognition stage walks a crop directory, gates,
//! rectifies, normalizes and recognizes every crop and writes the report.
//! `process_frames` chains both in one pass. Per-item failures are logged and
//! absorbed, only directory level failures end a batch.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{FrameIdPolicy, PipelineConfig, ReportVariant};
use crate::crop::{self, Crop};
use crate::error::{LprError, LprResult};
use crate::frames;
use crate::image_process;
use crate::recognizer::{self, Detector, Recognizer};
use crate::rectify::PlateRectifier;
use crate::report::{Outcome, RecognitionResult, Report};

const STATUS_OK: &str = "ok";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropSummary {
    pub status: String,
    pub crops_saved: usize,
    pub frames_processed: usize,
    pub frames_skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionSummary {
    pub status: String,
    pub total_processed: usize,
    pub results: Vec<RecognitionResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: String,
    pub crops_saved: usize,
    pub frames_processed: usize,
    pub frames_skipped: usize,
    pub total_processed: usize,
    pub results: Vec<RecognitionResult>,
}

pub struct Pipeline {
    detector: Arc<dyn Detector>,
    recognizer: Arc<dyn Recognizer>,
    rectifier: PlateRectifier,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(detector: Arc<dyn Detector>, recognizer: Arc<dyn Recognizer>, config: PipelineConfig) -> Self {
        let rectifier = PlateRectifier::new(config.rectifier.clone());
        Self {
            detector,
            recognizer,
            rectifier,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Detect plates in every frame under `raw_dir` and write the crops to
    /// `crops_dir`.
    pub fn crop_frames(&self, raw_dir: impl AsRef<Path>, crops_dir: impl AsRef<Path>) -> LprResult<CropSummary> {
        self.crop_stage(raw_dir.as_ref(), crops_dir.as_ref(), |_, _| {})
    }

    /// Recognize every crop file under `crops_dir` and write the report into
    /// `result_dir`.
    pub fn recognize_crops(
        &self,
        crops_dir: impl AsRef<Path>,
        result_dir: impl AsRef<Path>,
    ) -> LprResult<RecognitionSummary> {
        let crops_dir = crops_dir.as_ref();
        let result_dir = result_dir.as_ref();
        let files = frames::discover_frames(crops_dir, &self.config.frames.extensions)?;
        create_dir(result_dir)?;
        info!("recognizing {} crops from {}", files.len(), crops_dir.display());

        let mut report = Report::new();
        for (n, path) in files.iter().enumerate() {
            let time = match self.resolve_id(path, n)? {
                Some(time) => time,
                None => continue,
            };
            let filename = file_name(path);
            match image::open(path) {
                Ok(image) => {
                    let plate = Crop::new(image, time, path, 0);
                    if let Some(entry) = self.recognize_crop(&plate, &filename) {
                        report.push(entry);
                    }
                }
                Err(source) => {
                    let e = LprError::UnreadableImage {
                        path: path.clone(),
                        source,
                    };
                    warn!("{}", e);
                    if self.config.recognition.record_skipped {
                        report.push(self.placeholder(&time, &filename));
                    }
                }
            }
        }

        report.write_atomic(result_dir.join(&self.config.recognition.report_name))?;
        Ok(RecognitionSummary {
            status: STATUS_OK.to_string(),
            total_processed: report.len(),
            results: report.into_entries(),
        })
    }

    /// Both stages in one pass. Crops are written to `<out_dir>/crops` and
    /// recognized from memory, the report lands in `out_dir`.
    pub fn process_frames(&self, frames_dir: impl AsRef<Path>, out_dir: impl AsRef<Path>) -> LprResult<RunSummary> {
        let out_dir = out_dir.as_ref();
        let mut report = Report::new();
        let crops = self.crop_stage(frames_dir.as_ref(), &out_dir.join("crops"), |plate, filename| {
            if let Some(entry) = self.recognize_crop(plate, filename) {
                report.push(entry);
            }
        })?;

        report.write_atomic(out_dir.join(&self.config.recognition.report_name))?;
        Ok(RunSummary {
            status: STATUS_OK.to_string(),
            crops_saved: crops.crops_saved,
            frames_processed: crops.frames_processed,
            frames_skipped: crops.frames_skipped,
            total_processed: report.len(),
            results: report.into_entries(),
        })
    }

    /// Gate, rectify, normalize and recognize one crop. `None` when the crop
    /// is rejected and skipped crops are not recorded.
    pub fn recognize_crop(&self, plate: &Crop, filename: &str) -> Option<RecognitionResult> {
        let time = plate.frame_id.as_str();
        if let Err(e) = self.rectifier.check_crop(&plate.image) {
            info!("{}: {}, skipped", filename, e);
            return if self.config.recognition.record_skipped {
                Some(self.placeholder(time, filename))
            } else {
                None
            };
        }

        let rectified = plate.with_image(self.rectifier.rectify(&plate.image));
        let normalized = image_process::normalize_plate(&rectified.image, &self.config.normalize);
        let processed = recognizer::recognize_or_empty(self.recognizer.as_ref(), &DynamicImage::ImageLuma8(normalized));
        let outcome = match self.config.recognition.variant {
            ReportVariant::Single => Outcome::single(processed),
            ReportVariant::Dual => {
                let raw = recognizer::recognize_or_empty(self.recognizer.as_ref(), &plate.image);
                Outcome::dual(raw, processed)
            }
        };
        Some(RecognitionResult::new(time, filename, outcome))
    }

    fn crop_stage<F>(&self, raw_dir: &Path, crops_dir: &Path, mut on_crop: F) -> LprResult<CropSummary>
    where
        F: FnMut(&Crop, &str),
    {
        let frames = frames::discover_frames(raw_dir, &self.config.frames.extensions)?;
        create_dir(crops_dir)?;
        info!("cropping {} frames from {}", frames.len(), raw_dir.display());

        let ext = &self.config.crops.extension;
        // frames may share an id, names are unique per batch
        let mut written = HashSet::new();
        let mut summary = CropSummary {
            status: STATUS_OK.to_string(),
            crops_saved: 0,
            frames_processed: 0,
            frames_skipped: 0,
        };
        for (n, path) in frames.iter().enumerate() {
            let frame_id = match self.resolve_id(path, n)? {
                Some(id) => id,
                None => {
                    summary.frames_skipped += 1;
                    continue;
                }
            };
            let image = match image::open(path) {
                Ok(image) => image,
                Err(source) => {
                    warn!("{}", LprError::UnreadableImage { path: path.clone(), source });
                    summary.frames_skipped += 1;
                    continue;
                }
            };
            let boxes = match self.detector.detect(&image) {
                Ok(boxes) => boxes,
                Err(e) => {
                    warn!("detection failed on {}: {}", path.display(), e);
                    summary.frames_skipped += 1;
                    continue;
                }
            };

            let crops = crop::extract_crops(&image, &frame_id, path, &boxes);
            debug!("{}: {} boxes, {} crops", path.display(), boxes.len(), crops.len());
            for plate in &crops {
                let mut filename = plate.file_name(ext);
                let mut index = plate.index;
                while written.contains(&filename) {
                    index += 1;
                    filename = crop::crop_file_name(&plate.frame_id, index, ext);
                }
                written.insert(filename.clone());
                let out = crops_dir.join(&filename);
                plate
                    .image
                    .to_rgb8()
                    .save(&out)
                    .map_err(|source| LprError::EncodeImage { path: out.clone(), source })?;
                summary.crops_saved += 1;
                on_crop(plate, &filename);
            }
            summary.frames_processed += 1;
        }

        info!(
            "{} crops saved from {} frames, {} frames skipped",
            summary.crops_saved, summary.frames_processed, summary.frames_skipped
        );
        Ok(summary)
    }

    /// Frame id of `path` under the configured policy, `None` when the file
    /// is to be skipped.
    fn resolve_id(&self, path: &Path, n: usize) -> LprResult<Option<String>> {
        match frames::frame_id(path) {
            Ok(id) => Ok(Some(id)),
            Err(e) => match self.config.frames.malformed_filename {
                FrameIdPolicy::Skip => {
                    warn!("{}, skipped", e);
                    Ok(None)
                }
                FrameIdPolicy::Abort => Err(e),
                FrameIdPolicy::Sequential => {
                    let id = crop::sequential_id(n);
                    debug!("{}, using {}", e, id);
                    Ok(Some(id))
                }
            },
        }
    }

    fn placeholder(&self, time: &str, filename: &str) -> RecognitionResult {
        let dual = self.config.recognition.variant == ReportVariant::Dual;
        RecognitionResult::placeholder(time, filename, dual)
    }
}

fn create_dir(path: &Path) -> LprResult<()> {
    fs::create_dir_all(path).map_err(|source| LprError::Output {
        path: PathBuf::from(path),
        source,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
