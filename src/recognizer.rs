//! Model capabilities the pipeline is parameterized over.
//!
//! A detector turns a frame into boxes, a recognizer turns a plate crop into
//! text. Recognizers either return finished text directly or expose raw
//! per-timestep class scores through [`LogitModel`], in which case
//! [`CtcRecognizer`] owns preprocessing and decoding. Plain closures implement
//! all three traits, which is how tests plug in fake models.

use std::sync::Arc;

use image::DynamicImage;
use ndarray::{Array3, Array4};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{RecognitionConfig, TensorLayout};
use crate::crop::BoundingBox;
use crate::decode::{self, CharDictionary};
use crate::error::{LprError, LprResult};

/// Decoded plate text with a confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub text: String,
    pub confidence: f32,
}

impl Recognition {
    /// Confidence is clamped to `[0, 1]`, NaN and infinities count as 0.
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        let confidence = if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            text: text.into(),
            confidence,
        }
    }

    /// Outcome for an unreadable plate.
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
        }
    }
}

pub trait Detector: Send + Sync {
    /// Plate boxes in detector output order.
    fn detect(&self, image: &DynamicImage) -> LprResult<Vec<BoundingBox>>;
}

pub trait Recognizer: Send + Sync {
    /// `None` when the model has nothing to say about the crop.
    fn recognize(&self, image: &DynamicImage) -> LprResult<Option<Recognition>>;
}

pub trait LogitModel: Send + Sync {
    /// `[1, T, C]` class scores for one preprocessed crop.
    fn infer(&self, input: &Array4<f32>) -> LprResult<Array3<f32>>;
}

impl<F> Detector for F
where
    F: Fn(&DynamicImage) -> LprResult<Vec<BoundingBox>> + Send + Sync,
{
    fn detect(&self, image: &DynamicImage) -> LprResult<Vec<BoundingBox>> {
        self(image)
    }
}

impl<F> Recognizer for F
where
    F: Fn(&DynamicImage) -> LprResult<Option<Recognition>> + Send + Sync,
{
    fn recognize(&self, image: &DynamicImage) -> LprResult<Option<Recognition>> {
        self(image)
    }
}

impl<F> LogitModel for F
where
    F: Fn(&Array4<f32>) -> LprResult<Array3<f32>> + Send + Sync,
{
    fn infer(&self, input: &Array4<f32>) -> LprResult<Array3<f32>> {
        self(input)
    }
}

/// Recognizer over a raw-score model: resize and scale the crop, run the
/// model, greedy decode against the dictionary.
pub struct CtcRecognizer<M> {
    model: M,
    dict: Arc<CharDictionary>,
    input_height: u32,
    max_width: u32,
    layout: TensorLayout,
}

impl<M: LogitModel> CtcRecognizer<M> {
    pub fn new(model: M, dict: Arc<CharDictionary>, config: &RecognitionConfig) -> Self {
        Self {
            model,
            dict,
            input_height: config.input_height,
            max_width: config.max_width,
            layout: config.layout,
        }
    }
}

impl<M: LogitModel> Recognizer for CtcRecognizer<M> {
    fn recognize(&self, image: &DynamicImage) -> LprResult<Option<Recognition>> {
        let input = decode::preprocess_for_recognition(image, self.input_height, self.max_width, self.layout);
        let logits = self.model.infer(&input)?;
        if logits.is_empty() {
            return Ok(None);
        }
        decode::decode_logits(&logits, &self.dict).map(Some)
    }
}

/// Run `recognizer`, degrading any failure or missing result to
/// [`Recognition::empty`].
pub fn recognize_or_empty(recognizer: &dyn Recognizer, image: &DynamicImage) -> Recognition {
    match recognizer.recognize(image) {
        Ok(Some(res)) => {
            debug!("recognized {:?} ({:.3})", res.text, res.confidence);
            Recognition::new(res.text, res.confidence)
        }
        Ok(None) => {
            debug!("{}", LprError::RecognitionEmpty("no result".to_string()));
            Recognition::empty()
        }
        Err(e) => {
            warn!("{}", LprError::RecognitionEmpty(e.to_string()));
            Recognition::empty()
        }
    }
}
