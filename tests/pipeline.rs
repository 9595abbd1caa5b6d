use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use ndarray::{Array3, Array4};
use serde_json::Value;

use lpr_pipeline::config::{FrameIdPolicy, ReportVariant};
use lpr_pipeline::{
    BoundingBox, CharDictionary, CtcRecognizer, Detector, LprError, LprResult, Pipeline, PipelineConfig, Recognizer,
};

/// 320x240 frame with a dark plate turned by 10 degrees around (160, 120).
fn frame_with_rotated_plate() -> RgbImage {
    let mut img = RgbImage::from_pixel(320, 240, Rgb([200, 200, 200]));
    let (sin, cos) = 10f32.to_radians().sin_cos();
    let corner = |dx: f32, dy: f32| {
        Point::new((160.0 + dx * cos - dy * sin).round() as i32, (120.0 + dx * sin + dy * cos).round() as i32)
    };
    let poly = [corner(-70.0, -22.0), corner(70.0, -22.0), corner(70.0, 22.0), corner(-70.0, 22.0)];
    draw_polygon_mut(&mut img, &poly, Rgb([25, 35, 150]));
    img
}

fn fixed_boxes(boxes: Vec<BoundingBox>) -> Arc<dyn Detector> {
    Arc::new(move |_: &DynamicImage| -> LprResult<Vec<BoundingBox>> { Ok(boxes.clone()) })
}

/// Recognizer over a fake model that always reads "AB".
fn ab_recognizer() -> Arc<dyn Recognizer> {
    let dict = Arc::new(CharDictionary::new(vec!["A".into(), "B".into()]).unwrap());
    let model = |input: &Array4<f32>| -> LprResult<Array3<f32>> {
        assert_eq!(input.dim().0, 1);
        let best = [0usize, 2, 1, 1];
        Ok(Array3::from_shape_fn((1, 4, 3), |(_, t, c)| if best[t] == c { 4.0 } else { 1.0 }))
    };
    Arc::new(CtcRecognizer::new(model, dict, &PipelineConfig::default().recognition))
}

fn plate_box() -> BoundingBox {
    BoundingBox::new(60.0, 60.0, 260.0, 180.0)
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn one_rotated_plate_gives_one_crop_and_one_entry() -> Result<(), Box<dyn Error>> {
    let frames = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    frame_with_rotated_plate().save(frames.path().join("cam_0001.png"))?;

    let pipeline = Pipeline::new(fixed_boxes(vec![plate_box()]), ab_recognizer(), PipelineConfig::default());
    let summary = pipeline.process_frames(frames.path(), out.path())?;

    assert_eq!(summary.crops_saved, 1);
    assert_eq!(summary.total_processed, 1);
    assert_eq!(file_names(&out.path().join("crops")), vec!["crop_0001.png"]);

    let report: Value = serde_json::from_str(&fs::read_to_string(out.path().join("results.json"))?)?;
    let entries = report.as_array().ok_or("report is not an array")?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["time"], "0001");
    assert_eq!(entries[0]["filename"], "crop_0001.png");
    for key in ["confidence_raw", "confidence_processed"] {
        let c = entries[0][key].as_f64().ok_or("confidence missing")?;
        assert!((0.0..=1.0).contains(&c), "{} = {}", key, c);
    }
    assert_eq!(entries[0]["plate_text_processed"], "AB");
    Ok(())
}

#[test]
fn frames_without_boxes_contribute_nothing() -> Result<(), Box<dyn Error>> {
    let frames = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    frame_with_rotated_plate().save(frames.path().join("cam_0001.png"))?;
    frame_with_rotated_plate().save(frames.path().join("cam_0002.jpg"))?;

    let pipeline = Pipeline::new(fixed_boxes(vec![]), ab_recognizer(), PipelineConfig::default());
    let summary = pipeline.process_frames(frames.path(), out.path())?;

    assert_eq!(summary.status, "ok");
    assert_eq!(summary.frames_processed, 2);
    assert_eq!(summary.crops_saved, 0);
    assert!(summary.results.is_empty());
    assert!(file_names(&out.path().join("crops")).is_empty());
    let report: Value = serde_json::from_str(&fs::read_to_string(out.path().join("results.json"))?)?;
    assert_eq!(report, Value::Array(vec![]));
    Ok(())
}

#[test]
fn two_stages_through_the_crop_directory() -> Result<(), Box<dyn Error>> {
    let frames = tempfile::tempdir()?;
    let crops = tempfile::tempdir()?;
    let results = tempfile::tempdir()?;
    frame_with_rotated_plate().save(frames.path().join("cam_1700000000.png"))?;
    // unreadable frame and a frame without an id
    fs::write(frames.path().join("cam_1700000001.png"), b"not a png")?;
    frame_with_rotated_plate().save(frames.path().join("snapshot.png"))?;

    let boxes = vec![plate_box(), BoundingBox::new(400.0, 0.0, 500.0, 10.0), BoundingBox::new(0.0, 0.0, 40.0, 30.0)];
    let mut config = PipelineConfig::default();
    config.recognition.variant = ReportVariant::Single;
    let pipeline = Pipeline::new(fixed_boxes(boxes), ab_recognizer(), config);

    let cropped = pipeline.crop_frames(frames.path(), crops.path())?;
    assert_eq!(cropped.frames_processed, 1);
    assert_eq!(cropped.frames_skipped, 2);
    // the box outside the frame is dropped, the small one is kept as a second crop
    assert_eq!(cropped.crops_saved, 2);
    assert_eq!(
        file_names(crops.path()),
        vec!["crop_1700000000.png", "crop_1700000000_1.png"]
    );

    let recognized = pipeline.recognize_crops(crops.path(), results.path())?;
    // the 40x30 crop fails the geometry gate
    assert_eq!(recognized.total_processed, 1);
    let entry = serde_json::to_value(&recognized.results[0])?;
    assert_eq!(entry["time"], "1700000000");
    assert_eq!(entry["plate_text"], "AB");
    assert!(entry.get("plate_text_raw").is_none());
    assert!(results.path().join("results.json").exists());
    Ok(())
}

#[test]
fn frames_sharing_an_id_keep_every_crop() -> Result<(), Box<dyn Error>> {
    let frames = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    frame_with_rotated_plate().save(frames.path().join("a_100.png"))?;
    frame_with_rotated_plate().save(frames.path().join("b_100.bmp"))?;

    let pipeline = Pipeline::new(fixed_boxes(vec![plate_box()]), ab_recognizer(), PipelineConfig::default());
    let summary = pipeline.process_frames(frames.path(), out.path())?;

    assert_eq!(summary.frames_processed, 2);
    assert_eq!(summary.crops_saved, 2);
    assert_eq!(file_names(&out.path().join("crops")), vec!["crop_100.png", "crop_100_1.png"]);

    let report: Value = serde_json::from_str(&fs::read_to_string(out.path().join("results.json"))?)?;
    let entries = report.as_array().ok_or("report is not an array")?;
    let names: Vec<&str> = entries.iter().filter_map(|e| e["filename"].as_str()).collect();
    assert_eq!(names, vec!["crop_100.png", "crop_100_1.png"]);
    assert!(entries.iter().all(|e| e["time"] == "100"));
    Ok(())
}

#[test]
fn abort_policy_fails_the_batch_on_bad_names() -> Result<(), Box<dyn Error>> {
    let frames = tempfile::tempdir()?;
    let crops = tempfile::tempdir()?;
    frame_with_rotated_plate().save(frames.path().join("snapshot.png"))?;

    let mut config = PipelineConfig::default();
    config.frames.malformed_filename = FrameIdPolicy::Abort;
    let pipeline = Pipeline::new(fixed_boxes(vec![plate_box()]), ab_recognizer(), config.clone());
    let err = pipeline.crop_frames(frames.path(), crops.path()).unwrap_err();
    assert!(matches!(err, LprError::MalformedFilename(_)));

    config.frames.malformed_filename = FrameIdPolicy::Sequential;
    let pipeline = Pipeline::new(fixed_boxes(vec![plate_box()]), ab_recognizer(), config);
    pipeline.crop_frames(frames.path(), crops.path())?;
    assert_eq!(file_names(crops.path()), vec!["crop_000000.png"]);
    Ok(())
}

#[test]
fn missing_frame_directory_is_fatal() -> Result<(), Box<dyn Error>> {
    let out = tempfile::tempdir()?;
    let pipeline = Pipeline::new(fixed_boxes(vec![]), ab_recognizer(), PipelineConfig::default());
    let err = pipeline.process_frames(out.path().join("nope"), out.path()).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, LprError::Directory { .. }));
    Ok(())
}
