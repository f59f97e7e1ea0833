use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::catalog::ConnectionListing;
use crate::core::{Dataset, SelectionKey};
use crate::export::Delivery;
use crate::history::HistoryEntry;
use crate::join::JoinSpec;
use crate::pipeline::{StepConfig, TransformationStep};
use crate::profile::ProfilingReport;
use crate::selection::SelectedTable;
use crate::service::JunctionService;

use super::error::ApiError;
use super::types::{
    DeliveredResponse, ExportRequest, PageRequest, RefreshResponse, RunResponse, ToggleResponse,
};

type AppState = State<Arc<JunctionService>>;

pub async fn health() -> &'static str {
    "OK"
}

pub async fn list_catalog(State(service): AppState) -> Json<Vec<ConnectionListing>> {
    Json(service.list_catalog().await)
}

pub async fn refresh_connection(
    State(service): AppState,
    Path(connection): Path<String>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let outcome = service.refresh(&connection).await?;
    Ok(Json(outcome.into()))
}

pub async fn list_selection(State(service): AppState) -> Json<Vec<SelectedTable>> {
    Json(service.selection().await)
}

pub async fn toggle_selection(
    State(service): AppState,
    Json(key): Json<SelectionKey>,
) -> Result<Json<ToggleResponse>, ApiError> {
    let result = service.toggle(key.clone()).await?;
    Ok(Json(ToggleResponse::new(key, result)))
}

pub async fn load_page(
    State(service): AppState,
    Json(req): Json<PageRequest>,
) -> Result<Json<SelectedTable>, ApiError> {
    let table = service.load_page(req.key, req.offset, req.limit).await?;
    Ok(Json(table))
}

pub async fn join(
    State(service): AppState,
    Json(spec): Json<JoinSpec>,
) -> Result<Json<Dataset>, ApiError> {
    Ok(Json(service.join(&spec).await?))
}

pub async fn list_steps(State(service): AppState) -> Json<Vec<TransformationStep>> {
    Json(service.steps().await)
}

pub async fn add_step(
    State(service): AppState,
    Json(config): Json<StepConfig>,
) -> Result<(StatusCode, Json<TransformationStep>), ApiError> {
    let step = service.add_step(config).await?;
    Ok((StatusCode::CREATED, Json(step)))
}

pub async fn remove_step(
    State(service): AppState,
    Path(id): Path<u64>,
) -> Result<Json<TransformationStep>, ApiError> {
    Ok(Json(service.remove_step(id).await?))
}

pub async fn clear_steps(State(service): AppState) -> StatusCode {
    service.clear_pipeline().await;
    StatusCode::NO_CONTENT
}

pub async fn run_pipeline(State(service): AppState) -> Result<Json<RunResponse>, ApiError> {
    let outcome = service.run_pipeline().await?;
    Ok(Json(outcome.into()))
}

pub async fn get_dataset(State(service): AppState) -> Response {
    match service.dataset().await {
        Some(dataset) => Json(dataset).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "no dataset has been produced yet"})),
        )
            .into_response(),
    }
}

pub async fn profile(State(service): AppState) -> Result<Json<Vec<ProfilingReport>>, ApiError> {
    Ok(Json(service.profile().await?))
}

pub async fn list_history(State(service): AppState) -> Json<Vec<HistoryEntry>> {
    Json(service.history().await)
}

pub async fn clear_history(State(service): AppState) -> StatusCode {
    service.clear_history().await;
    StatusCode::NO_CONTENT
}

pub async fn export(
    State(service): AppState,
    Json(req): Json<ExportRequest>,
) -> Result<Response, ApiError> {
    let delivery = service
        .export(req.format, req.destination, req.file_name.as_deref())
        .await?;

    match delivery {
        Delivery::Download(export) => Ok((
            [
                (header::CONTENT_TYPE, export.format.content_type().to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", export.file_name),
                ),
            ],
            export.payload,
        )
            .into_response()),
        Delivery::Delivered {
            destination,
            location,
            bytes,
        } => Ok(Json(DeliveredResponse {
            destination,
            location,
            bytes,
        })
        .into_response()),
    }
}
