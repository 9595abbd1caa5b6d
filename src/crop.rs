use std::path::{Path, PathBuf};

use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LprError, LprResult};

/// Detector box in image pixels, `x1 < x2`, `y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// From detection graph output, `ymin, xmin, ymax, xmax` normalized to 1.
    pub fn from_normalized(v: &[f32], width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self::new(v[1] * w, v[0] * h, v[3] * w, v[2] * h)
    }

    /// Integer `(x, y, width, height)` after clipping to the image, `None`
    /// when nothing of the box is left.
    pub fn clip(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let clamp = |v: f32, max: u32| (v.max(0.0) as u32).min(max);
        let x1 = clamp(self.x1, width);
        let y1 = clamp(self.y1, height);
        let x2 = clamp(self.x2, width);
        let y2 = clamp(self.y2, height);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

/// A plate candidate cut out of one frame.
#[derive(Debug, Clone)]
pub struct Crop {
    pub image: DynamicImage,
    pub frame_id: String,
    pub source_path: PathBuf,
    /// position among the crops of its frame
    pub index: usize,
}

impl Crop {
    pub fn new(image: DynamicImage, frame_id: impl Into<String>, source_path: impl AsRef<Path>, index: usize) -> Self {
        Self {
            image,
            frame_id: frame_id.into(),
            source_path: source_path.as_ref().to_path_buf(),
            index,
        }
    }

    /// `crop_<frame_id>.<ext>` for the first crop of a frame, later crops
    /// get a `_<index>` suffix so they do not overwrite each other.
    pub fn file_name(&self, ext: &str) -> String {
        crop_file_name(&self.frame_id, self.index, ext)
    }

    /// Same crop with a new image, used by rectification.
    pub fn with_image(&self, image: DynamicImage) -> Self {
        Self {
            image,
            frame_id: self.frame_id.clone(),
            source_path: self.source_path.clone(),
            index: self.index,
        }
    }
}

pub fn crop_file_name(frame_id: &str, index: usize, ext: &str) -> String {
    if index == 0 {
        format!("crop_{}.{}", frame_id, ext)
    } else {
        format!("crop_{}_{}.{}", frame_id, index, ext)
    }
}

/// Identifier used when a filename carries no frame id.
pub fn sequential_id(n: usize) -> String {
    format!("{:06}", n)
}

pub fn extract_crop(image: &DynamicImage, a_box: &BoundingBox) -> LprResult<DynamicImage> {
    let (width, height) = image.dimensions();
    let (x, y, w, h) = a_box.clip(width, height).ok_or(LprError::EmptyCrop(*a_box))?;
    Ok(image.crop_imm(x, y, w, h))
}

/// One crop per box that survives clipping, in box order. Empty boxes are
/// logged and skipped.
pub fn extract_crops(image: &DynamicImage, frame_id: &str, source_path: &Path, boxes: &[BoundingBox]) -> Vec<Crop> {
    let mut crops = Vec::with_capacity(boxes.len());
    for a_box in boxes {
        match extract_crop(image, a_box) {
            Ok(plate) => {
                let index = crops.len();
                crops.push(Crop::new(plate, frame_id, source_path, index));
            }
            Err(e) => warn!("{}: {}", source_path.display(), e),
        }
    }
    crops
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn frame() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(200, 100, |x, y| image::Rgb([x as u8, y as u8, 0])))
    }

    #[test]
    fn boxes_are_clipped_to_the_image() {
        let a_box = BoundingBox::new(-10.0, 90.0, 150.0, 140.0);
        assert_eq!(a_box.clip(200, 100), Some((0, 90, 150, 10)));
    }

    #[test]
    fn empty_box_is_an_error() {
        let outside = BoundingBox::new(210.0, 10.0, 260.0, 40.0);
        assert!(matches!(extract_crop(&frame(), &outside), Err(LprError::EmptyCrop(_))));
        let flat = BoundingBox::new(10.0, 20.0, 60.0, 20.5);
        assert!(matches!(extract_crop(&frame(), &flat), Err(LprError::EmptyCrop(_))));
    }

    #[test]
    fn crops_keep_pixels_and_order() {
        let boxes = [
            BoundingBox::new(10.0, 5.0, 60.0, 25.0),
            BoundingBox::new(300.0, 5.0, 400.0, 25.0),
            BoundingBox::new(100.0, 50.0, 180.0, 90.0),
        ];
        let crops = extract_crops(&frame(), "0042", Path::new("cam_0042.png"), &boxes);
        assert_eq!(crops.len(), 2);
        assert_eq!(crops[0].image.dimensions(), (50, 20));
        assert_eq!(crops[0].image.to_rgb8().get_pixel(0, 0), &image::Rgb([10, 5, 0]));
        assert_eq!(crops[1].index, 1);
        assert_eq!(crops[1].image.dimensions(), (80, 40));
        assert_eq!(crops[0].file_name("png"), "crop_0042.png");
        assert_eq!(crops[1].file_name("png"), "crop_0042_1.png");
    }

    #[test]
    fn normalized_boxes_scale_to_pixels() {
        let a_box = BoundingBox::from_normalized(&[0.1, 0.25, 0.5, 0.75], 200, 100);
        assert_eq!(a_box, BoundingBox::new(50.0, 10.0, 150.0, 50.0));
    }

    #[test]
    fn sequential_ids_are_zero_padded() {
        assert_eq!(crop_file_name(&sequential_id(7), 0, "jpg"), "crop_000007.jpg");
    }
}
