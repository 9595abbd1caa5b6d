//! Recognizer input preparation and greedy CTC decoding of raw class scores.

use std::fs;
use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use ndarray::{Array3, Array4, ArrayView2, Axis};

use crate::config::TensorLayout;
use crate::error::{LprError, LprResult};
use crate::recognizer::Recognition;
use crate::utils;

// CHARS for Chinese license plate
const CHARS: [&str; 83] = [
    "京", "沪", "津", "渝", "冀", "晋", "蒙", "辽", "吉", "黑", "苏", "浙", "皖", "闽", "赣", "鲁", "豫", "鄂", "湘", "粤", "桂",
    "琼", "川", "贵", "云", "藏", "陕", "甘", "青", "宁", "新", "0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "A",
    "B", "C", "D", "E", "F", "G", "H", "J", "K", "L", "M", "N", "P", "Q", "R", "S", "T", "U", "V", "W", "X",
    "Y", "Z", "港", "学", "使", "警", "澳", "挂", "军", "北", "南", "广", "沈", "兰", "成", "济", "海", "民", "航", "空",
];

/// Ordered class index to character mapping. The class right after the last
/// entry is the CTC blank.
#[derive(Debug, Clone, PartialEq)]
pub struct CharDictionary {
    chars: Vec<String>,
}

impl CharDictionary {
    pub fn new(chars: Vec<String>) -> LprResult<Self> {
        if chars.is_empty() {
            return Err(LprError::Dictionary("dictionary has no entries".to_string()));
        }
        Ok(Self { chars })
    }

    /// One entry per line, blank lines ignored.
    pub fn from_file(path: impl AsRef<Path>) -> LprResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| LprError::Dictionary(format!("{}: {}", path.display(), e)))?;
        let chars = text
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect();
        Self::new(chars)
    }

    pub fn chinese_plates() -> Self {
        Self {
            chars: CHARS.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn blank_index(&self) -> usize {
        self.chars.len()
    }

    /// Number of classes a recognizer using this dictionary must output.
    pub fn num_classes(&self) -> usize {
        self.chars.len() + 1
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.chars.get(index).map(String::as_str)
    }
}

impl Default for CharDictionary {
    fn default() -> Self {
        Self::chinese_plates()
    }
}

/// Greedy CTC collapse. The previous index is updated on every timestep,
/// blanks included, so `A, blank, A` gives `AA` while `A, A, blank` gives `A`.
pub fn ctc_greedy_decode(indices: &[usize], dict: &CharDictionary) -> String {
    let blank = dict.blank_index();
    let mut text = String::new();
    let mut last_idx = None;
    for &idx in indices {
        if Some(idx) != last_idx && idx != blank {
            if let Some(c) = dict.get(idx) {
                text.push_str(c);
            }
        }
        last_idx = Some(idx);
    }
    text
}

/// Mean over all timesteps of the largest softmax probability. An empty
/// sequence has zero confidence.
pub fn sequence_confidence(scores: ArrayView2<f32>) -> f32 {
    let steps = scores.nrows();
    if steps == 0 {
        return 0.0;
    }
    let total: f32 = scores.axis_iter(Axis(0)).map(utils::softmax_max).sum();
    (total / steps as f32).clamp(0.0, 1.0)
}

/// Decode a `[1, T, C]` score tensor, `C` has to be the dictionary size plus
/// the blank class.
pub fn decode_logits(logits: &Array3<f32>, dict: &CharDictionary) -> LprResult<Recognition> {
    let (batch, _, classes) = logits.dim();
    if batch != 1 {
        return Err(LprError::Shape(format!("expected batch of 1, got {}", batch)));
    }
    if classes != dict.num_classes() {
        return Err(LprError::Shape(format!(
            "expected {} classes for a dictionary of {}, got {}",
            dict.num_classes(),
            dict.len(),
            classes
        )));
    }
    let scores = logits.index_axis(Axis(0), 0);
    let indices = utils::argmax_in_axis1(scores);
    Ok(Recognition {
        text: ctc_greedy_decode(&indices, dict),
        confidence: sequence_confidence(scores),
    })
}

/// Target size for the recognizer: `height` high with the width following the
/// aspect ratio, or `max_width` wide with the height following it when the
/// proportional width would be larger.
pub fn recognition_size(width: u32, height: u32, target_height: u32, max_width: u32) -> (u32, u32) {
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);
    let scaled = (w * target_height as f32 / h).round().max(1.0) as u32;
    if scaled <= max_width {
        (scaled, target_height)
    } else {
        let fitted = (h * max_width as f32 / w).round().max(1.0) as u32;
        (max_width, fitted)
    }
}

/// RGB tensor with values in `[0, 1]`, batch of one.
pub fn preprocess_for_recognition(
    image: &DynamicImage,
    target_height: u32,
    max_width: u32,
    layout: TensorLayout,
) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let (w, h) = recognition_size(width, height, target_height, max_width);
    let resized = image.resize_exact(w, h, FilterType::Triangle).to_rgb8();
    let (w, h) = (w as usize, h as usize);

    let pixel = |y: usize, x: usize, c: usize| resized.get_pixel(x as u32, y as u32).0[c] as f32 / 255.0;
    match layout {
        TensorLayout::Nchw => Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| pixel(y, x, c)),
        TensorLayout::Nhwc => Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| pixel(y, x, c)),
    }
}
