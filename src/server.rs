//! HTTP front end for the two batch stages.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LprError, LprResult};
use crate::pipeline::{CropSummary, Pipeline, RecognitionSummary};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CropRequest {
    pub raw_data_path: PathBuf,
    pub result_data_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecognizeRequest {
    pub crops_data_path: PathBuf,
    pub result_data_path: PathBuf,
}

type ApiError = (StatusCode, String);

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/api/cropToLicensePlates", post(crop_handler))
        .route("/api/recognizeLicensePlates", post(recognize_handler))
        .with_state(pipeline)
}

/// Serve until ctrl-c.
pub async fn serve(pipeline: Arc<Pipeline>, addr: SocketAddr) -> LprResult<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("can not listen for ctrl-c: {}", e);
            }
        })
        .await?;
    Ok(())
}

/// POST /api/cropToLicensePlates
async fn crop_handler(
    State(pipeline): State<Arc<Pipeline>>,
    Json(request): Json<CropRequest>,
) -> Result<Json<CropSummary>, ApiError> {
    info!("crop request for {}", request.raw_data_path.display());
    let summary = tokio::task::spawn_blocking(move || {
        pipeline.crop_frames(&request.raw_data_path, &request.result_data_path)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    .map_err(into_api_error)?;
    Ok(Json(summary))
}

/// POST /api/recognizeLicensePlates
async fn recognize_handler(
    State(pipeline): State<Arc<Pipeline>>,
    Json(request): Json<RecognizeRequest>,
) -> Result<Json<RecognitionSummary>, ApiError> {
    info!("recognize request for {}", request.crops_data_path.display());
    let summary = tokio::task::spawn_blocking(move || {
        pipeline.recognize_crops(&request.crops_data_path, &request.result_data_path)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    .map_err(into_api_error)?;
    Ok(Json(summary))
}

/// A missing input directory or an unparsable name is the caller's fault,
/// everything else is ours.
fn into_api_error(e: LprError) -> ApiError {
    let status = match e {
        LprError::Directory { .. } | LprError::MalformedFilename(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!("request failed with {}: {}", status, e);
    (status, e.to_string())
}
