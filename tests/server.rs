use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Method, Request, StatusCode};
use image::{DynamicImage, Rgb, RgbImage};
use serde_json::{json, Value};
use tower::util::ServiceExt; // for `oneshot`

use lpr_pipeline::recognizer::Recognition;
use lpr_pipeline::{server, BoundingBox, LprResult, Pipeline, PipelineConfig};

fn test_pipeline() -> Arc<Pipeline> {
    let detector = |_: &DynamicImage| -> LprResult<Vec<BoundingBox>> { Ok(vec![BoundingBox::new(10.0, 10.0, 170.0, 70.0)]) };
    let recognizer = |_: &DynamicImage| -> LprResult<Option<Recognition>> { Ok(Some(Recognition::new("沪C77777", 0.8))) };
    Arc::new(Pipeline::new(Arc::new(detector), Arc::new(recognizer), PipelineConfig::default()))
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Result<Value, Box<dyn Error>> {
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn write_frame(dir: &Path, name: &str) -> Result<(), Box<dyn Error>> {
    RgbImage::from_pixel(200, 100, Rgb([120, 120, 120])).save(dir.join(name))?;
    Ok(())
}

#[tokio::test]
async fn crop_then_recognize_over_http() -> Result<(), Box<dyn Error>> {
    let frames = tempfile::tempdir()?;
    let crops = tempfile::tempdir()?;
    let results = tempfile::tempdir()?;
    write_frame(frames.path(), "cam_42.png")?;
    let app = server::router(test_pipeline());

    let response = app
        .clone()
        .oneshot(post(
            "/api/cropToLicensePlates",
            json!({ "RawDataPath": frames.path(), "ResultDataPath": crops.path() }),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let summary = json_body(response).await?;
    assert_eq!(summary["status"], "ok");
    assert_eq!(summary["crops_saved"], 1);
    assert_eq!(summary["frames_processed"], 1);

    let response = app
        .oneshot(post(
            "/api/recognizeLicensePlates",
            json!({ "CropsDataPath": crops.path(), "ResultDataPath": results.path() }),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let summary = json_body(response).await?;
    assert_eq!(summary["total_processed"], 1);
    assert_eq!(summary["results"][0]["filename"], "crop_42.png");
    assert_eq!(summary["results"][0]["plate_text_processed"], "沪C77777");
    assert!(results.path().join("results.json").exists());
    Ok(())
}

#[tokio::test]
async fn missing_input_directory_is_a_bad_request() -> Result<(), Box<dyn Error>> {
    let out = tempfile::tempdir()?;
    let response = server::router(test_pipeline())
        .oneshot(post(
            "/api/cropToLicensePlates",
            json!({ "RawDataPath": out.path().join("nope"), "ResultDataPath": out.path() }),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn malformed_body_is_rejected() -> Result<(), Box<dyn Error>> {
    let response = server::router(test_pipeline())
        .oneshot(post("/api/recognizeLicensePlates", json!({ "CropsDataPath": "/tmp" })))
        .await?;
    assert!(response.status().is_client_error());
    Ok(())
}

#[tokio::test]
async fn only_post_is_routed() -> Result<(), Box<dyn Error>> {
    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/cropToLicensePlates")
        .body(Body::empty())?;
    let response = server::router(test_pipeline()).oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    Ok(())
}
