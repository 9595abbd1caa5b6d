//! Geometric normalization of a single plate crop.
//!
//! Correction runs in two passes: an in-plane rotation taken from the
//! minimum area rectangle of the strongest outline, then, only when that
//! outline is a clearly distorted quadrilateral, a perspective warp onto its
//! own bounding box.

use image::{DynamicImage, GenericImageView, RgbImage};
use imageproc::point::Point;
use tracing::debug;

use crate::config::RectifierConfig;
use crate::error::{LprError, LprResult};
use crate::image_process::{self, Contour};

/// What rectification did to a crop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// no outline found, input returned as is
    Unchanged,
    /// rotation pass only, `angle` is zero when the tilt was under threshold
    Rotated { angle: f32 },
    /// rotation followed by a perspective warp
    Perspective { angle: f32, diff_ratio: f32 },
}

#[derive(Debug, Clone, Default)]
pub struct PlateRectifier {
    config: RectifierConfig,
}

impl PlateRectifier {
    pub fn new(config: RectifierConfig) -> Self {
        Self { config }
    }

    /// Plates are wide, a crop narrower than the minimum width or taller than
    /// wide is rejected.
    pub fn is_valid_crop(&self, image: &DynamicImage) -> bool {
        self.check_crop(image).is_ok()
    }

    pub fn check_crop(&self, image: &DynamicImage) -> LprResult<()> {
        let (width, height) = image.dimensions();
        let too_narrow = width < self.config.min_width;
        let too_tall = height == 0 || (width as f32 / height as f32) < self.config.min_aspect_ratio;
        if too_narrow || too_tall {
            return Err(LprError::InvalidCropGeometry { width, height });
        }
        Ok(())
    }

    pub fn rectify(&self, image: &DynamicImage) -> DynamicImage {
        self.rectify_with_report(image).0
    }

    /// Rectified image together with the correction that produced it. The
    /// output is always a new image, the input is never touched.
    pub fn rectify_with_report(&self, image: &DynamicImage) -> (DynamicImage, Correction) {
        let rgb = image.to_rgb8();

        let contour = match self.largest_outline(&rgb) {
            Some(contour) => contour,
            None => {
                debug!("no outline found, crop left as is");
                return (image.clone(), Correction::Unchanged);
            }
        };

        let angle = image_process::min_area_angle(&contour);
        let (rotated, angle) = if angle.abs() > self.config.rotation_threshold {
            let center = image_process::contour_centroid(&contour);
            debug!("rotating by {:.2} degrees about {:?}", angle, center);
            (image_process::deskew(&rgb, center, angle), angle)
        } else {
            (rgb, 0.0)
        };

        let contour = match self.largest_outline(&rotated) {
            Some(contour) => contour,
            None => return (DynamicImage::ImageRgb8(rotated), Correction::Rotated { angle }),
        };

        let epsilon = self.config.approx_epsilon * image_process::perimeter(&contour);
        let polygon = image_process::approx_closed_polygon(&contour, epsilon);
        if polygon.len() != 4 {
            debug!("outline simplifies to {} vertices, no perspective pass", polygon.len());
            return (DynamicImage::ImageRgb8(rotated), Correction::Rotated { angle });
        }

        let (corners, width, height, diff_ratio) = quad_deviation(&polygon);
        if diff_ratio <= self.config.tilt_threshold {
            debug!("diff ratio {:.3} under threshold, keeping rotation result", diff_ratio);
            return (DynamicImage::ImageRgb8(rotated), Correction::Rotated { angle });
        }

        match image_process::warp_quad_to_rect(&rotated, corners, width, height) {
            Some(warped) => {
                debug!("perspective corrected to {}x{}, diff ratio {:.3}", width, height, diff_ratio);
                (DynamicImage::ImageRgb8(warped), Correction::Perspective { angle, diff_ratio })
            }
            None => (DynamicImage::ImageRgb8(rotated), Correction::Rotated { angle }),
        }
    }

    fn largest_outline(&self, image: &RgbImage) -> Option<Contour> {
        let edges = image_process::edge_map(
            image,
            self.config.blur_sigma,
            self.config.canny_low,
            self.config.canny_high,
        );
        let contours = image_process::external_contours(&edges);
        image_process::largest_contour(&contours).cloned()
    }
}

/// Corners of `quad` paired with its bounding box corners, the size of the
/// box and the mean corner distance to the box relative to its larger side.
fn quad_deviation(quad: &[Point<i32>]) -> ([(f32, f32); 4], u32, u32, f32) {
    let (x, y, w, h) = image_process::bounding_rect(quad);
    let (x, y) = (x as f32, y as f32);
    let (right, bottom) = (x + (w - 1) as f32, y + (h - 1) as f32);
    let box_corners = [(x, y), (right, y), (right, bottom), (x, bottom)];

    let (corners, total) = image_process::order_corners(quad, box_corners);
    let diff_ratio = total / 4.0 / w.max(h).max(1) as f32;
    (corners, w.max(1) as u32, h.max(1) as u32, diff_ratio)
}
