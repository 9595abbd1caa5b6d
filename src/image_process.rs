/// Low level image operations used by rectification and normalization.
///
/// Edge detection, contour tracing and polygon simplification come from
/// imageproc; this file glues them into the contour queries a plate outline
/// needs (area, centroid, tilt, corners) and the two warps.
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::equalize_histogram;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{warp, warp_with, Interpolation, Projection};
use imageproc::geometry::{approximate_polygon_dp, arc_length, min_area_rect};
use imageproc::point::Point;

use crate::config::NormalizeConfig;

pub type Contour = Vec<Point<i32>>;

/// Grayscale, light blur, Canny.
pub fn edge_map(image: &RgbImage, blur_sigma: f32, low: f32, high: f32) -> GrayImage {
    let gray = imageops::grayscale(image);
    let gray = if blur_sigma > 0.0 {
        gaussian_blur_f32(&gray, blur_sigma)
    } else {
        gray
    };
    canny(&gray, low, high)
}

/// Outermost borders only, holes and nested borders are dropped.
pub fn external_contours(edges: &GrayImage) -> Vec<Contour> {
    find_contours::<i32>(edges)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|c| c.points)
        .collect()
}

/// Shoelace area of a closed contour.
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(p, q)| p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64)
        .sum();
    (twice as f64 / 2.0).abs()
}

/// First contour with the largest area.
pub fn largest_contour(contours: &[Contour]) -> Option<&Contour> {
    let mut best: Option<(&Contour, f64)> = None;
    for contour in contours {
        let area = contour_area(contour);
        match best {
            Some((_, best_area)) if area <= best_area => {}
            _ => best = Some((contour, area)),
        }
    }
    best.map(|(contour, _)| contour)
}

/// Area centroid, falls back to the mean point for degenerate contours.
pub fn contour_centroid(points: &[Point<i32>]) -> (f32, f32) {
    if points.is_empty() {
        return (0.0, 0.0);
    }
    let (mut a, mut cx, mut cy) = (0.0f64, 0.0f64, 0.0f64);
    for (p, q) in points.iter().zip(points.iter().cycle().skip(1)) {
        let cross = p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64;
        a += cross;
        cx += (p.x + q.x) as f64 * cross;
        cy += (p.y + q.y) as f64 * cross;
    }
    if a.abs() < 1e-6 {
        let n = points.len() as f64;
        let sx: f64 = points.iter().map(|p| p.x as f64).sum();
        let sy: f64 = points.iter().map(|p| p.y as f64).sum();
        return ((sx / n) as f32, (sy / n) as f32);
    }
    ((cx / (3.0 * a)) as f32, (cy / (3.0 * a)) as f32)
}

/// Tilt of the minimum area rectangle around `points`, in degrees within
/// (-45, 45]. Measured along the rectangle's longer side.
pub fn min_area_angle(points: &[Point<i32>]) -> f32 {
    if points.is_empty() {
        return 0.0;
    }
    let corners = min_area_rect(points);
    let edge = |a: Point<i32>, b: Point<i32>| ((b.x - a.x) as f32, (b.y - a.y) as f32);
    let e1 = edge(corners[0], corners[1]);
    let e2 = edge(corners[1], corners[2]);
    let (dx, dy) = if e1.0.hypot(e1.1) >= e2.0.hypot(e2.1) { e1 } else { e2 };
    if dx == 0.0 && dy == 0.0 {
        return 0.0;
    }
    fold_angle(dy.atan2(dx).to_degrees())
}

pub fn fold_angle(mut angle: f32) -> f32 {
    while angle > 45.0 {
        angle -= 90.0;
    }
    while angle <= -45.0 {
        angle += 90.0;
    }
    angle
}

pub fn perimeter(points: &[Point<i32>]) -> f64 {
    arc_length(points, true)
}

/// Douglas-Peucker on a closed contour. The contour is split at the point
/// farthest from its start and both halves are simplified as open curves,
/// so the result never repeats its first vertex.
pub fn approx_closed_polygon(points: &[Point<i32>], epsilon: f64) -> Contour {
    if points.len() < 3 || epsilon <= 0.0 {
        return points.to_vec();
    }
    let start = points[0];
    let dist2 = |p: &Point<i32>| {
        let dx = (p.x - start.x) as i64;
        let dy = (p.y - start.y) as i64;
        dx * dx + dy * dy
    };
    let far = points
        .iter()
        .enumerate()
        .max_by_key(|(_, p)| dist2(*p))
        .map(|(i, _)| i)
        .unwrap_or(0);
    if far == 0 {
        return vec![start];
    }

    let mut polygon = approximate_polygon_dp(&points[..=far], epsilon, false);
    let mut closing = points[far..].to_vec();
    closing.push(start);
    let back = approximate_polygon_dp(&closing, epsilon, false);
    if back.len() > 2 {
        polygon.extend_from_slice(&back[1..back.len() - 1]);
    }
    polygon
}

/// `(x, y, width, height)` of the axis aligned box around `points`, inclusive.
pub fn bounding_rect(points: &[Point<i32>]) -> (i32, i32, i32, i32) {
    let min_x = points.iter().map(|p| p.x).min().unwrap_or(0);
    let max_x = points.iter().map(|p| p.x).max().unwrap_or(0);
    let min_y = points.iter().map(|p| p.y).min().unwrap_or(0);
    let max_y = points.iter().map(|p| p.y).max().unwrap_or(0);
    (min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
}

/// Quadrilateral corners matched to `target` (top-left, top-right,
/// bottom-right, bottom-left) and their summed distance to it.
///
/// The corners keep their clockwise order around the centroid; of the four
/// rotations of that cycle the one closest to `target` wins, so the pairing
/// and the distance move continuously with the corners.
pub fn order_corners(quad: &[Point<i32>], target: [(f32, f32); 4]) -> ([(f32, f32); 4], f32) {
    let mut corners: Vec<(f32, f32)> = quad.iter().map(|p| (p.x as f32, p.y as f32)).collect();
    corners.resize(4, corners.last().copied().unwrap_or((0.0, 0.0)));
    let cx = corners.iter().map(|c| c.0).sum::<f32>() / 4.0;
    let cy = corners.iter().map(|c| c.1).sum::<f32>() / 4.0;
    // y grows downwards, so increasing angle is clockwise on screen
    corners.sort_by(|a, b| (a.1 - cy).atan2(a.0 - cx).total_cmp(&(b.1 - cy).atan2(b.0 - cx)));

    let distance = |shift: usize| -> f32 {
        (0..4)
            .map(|i| {
                let (c, t) = (corners[(i + shift) % 4], target[i]);
                (c.0 - t.0).hypot(c.1 - t.1)
            })
            .sum()
    };
    let (shift, total) = (0..4)
        .map(|shift| (shift, distance(shift)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap_or((0, 0.0));
    corners.rotate_left(shift);
    ([corners[0], corners[1], corners[2], corners[3]], total)
}

/// Rotate about `center` so a line tilted by `degrees` becomes horizontal.
///
/// Sample coordinates are clamped into the interpolation's valid interior,
/// which replicates the border instead of pulling in black.
pub fn deskew(image: &RgbImage, center: (f32, f32), degrees: f32) -> RgbImage {
    let (w, h) = image.dimensions();
    let (interpolation, low, pad) = if w >= 5 && h >= 5 {
        (Interpolation::Bicubic, 1.0, 4.0)
    } else if w >= 2 && h >= 2 {
        (Interpolation::Bilinear, 0.0, 2.0)
    } else {
        return image.clone();
    };
    let (max_x, max_y) = (w as f32 - pad, h as f32 - pad);
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (cx, cy) = center;
    warp_with(
        image,
        move |x, y| {
            let (dx, dy) = (x - cx, y - cy);
            let sx = cos * dx - sin * dy + cx;
            let sy = sin * dx + cos * dy + cy;
            (sx.max(low).min(max_x), sy.max(low).min(max_y))
        },
        interpolation,
        Rgb([0, 0, 0]),
    )
}

/// Map the ordered quad `corners` onto a `width` x `height` rectangle.
/// `None` when the corners do not define a projective transform.
pub fn warp_quad_to_rect(image: &RgbImage, corners: [(f32, f32); 4], width: u32, height: u32) -> Option<RgbImage> {
    if width < 2 || height < 2 {
        return None;
    }
    let (w, h) = ((width - 1) as f32, (height - 1) as f32);
    let target = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
    let projection = Projection::from_control_points(corners, target)?;
    let warped = warp(image, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]));
    let width = width.min(warped.width());
    let height = height.min(warped.height());
    Some(imageops::crop_imm(&warped, 0, 0, width, height).to_image())
}

/// Canonical grayscale strip for recognition: equalize, scale contrast,
/// blur, resize to a fixed height and stretch to the full 0-255 range.
pub fn normalize_plate(image: &DynamicImage, config: &NormalizeConfig) -> GrayImage {
    let gray = image.to_luma8();
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray;
    }
    let mut img = equalize_histogram(&gray);
    for p in img.pixels_mut() {
        p.0[0] = (p.0[0] as f32 * config.contrast).round().min(255.0) as u8;
    }
    if config.blur_sigma > 0.0 {
        img = gaussian_blur_f32(&img, config.blur_sigma);
    }
    let height = config.height.max(1);
    let width = ((w as f32 * height as f32 / h as f32).round() as u32).max(1);
    let img = imageops::resize(&img, width, height, FilterType::CatmullRom);
    stretch_to_full_range(img)
}

/// Min-max normalization, a flat image becomes black.
pub fn stretch_to_full_range(mut img: GrayImage) -> GrayImage {
    let (min, max) = img
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    if max <= min {
        img.pixels_mut().for_each(|p| p.0[0] = 0);
        return img;
    }
    let scale = 255.0 / (max - min) as f32;
    for p in img.pixels_mut() {
        p.0[0] = ((p.0[0] - min) as f32 * scale).round() as u8;
    }
    img
}
