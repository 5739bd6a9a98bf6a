use crate::server::ApiError;
use crate::state::AppState;
use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::JsonRejection,
        Multipart, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use clipscope_core::{Error, ModelPredictions, Result};
use clipscope_models::{ModelsSnapshot, PromptTemplate, SequentialRequest, Workbench};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Run a workbench operation on the blocking pool while holding the session lock
async fn with_workbench<T, F>(state: &AppState, op: F) -> ApiResult<T>
where
    F: FnOnce(&mut Workbench) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let workbench = Arc::clone(&state.workbench);

    let outcome = tokio::task::spawn_blocking(move || {
        let mut guard = workbench.lock();
        op(&mut guard)
    })
        .await
        .map_err(|e| Error::internal(format!("Worker task failed: {}", e)))?;

    Ok(outcome?)
}

fn status_ok() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ============================================================================
// Health endpoints
// ============================================================================

pub async fn health() -> impl IntoResponse {
    status_ok()
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}

// ============================================================================
// Image and prediction endpoints
// ============================================================================

pub async fn upload(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Value>> {
    let mut multipart = multipart.map_err(|e| Error::validation(e.body_text()))?;
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::validation(format!("Malformed upload: {}", e)))?
    {
        let is_file = field.name() == Some("file") || field.file_name().is_some();
        if !is_file {
            continue;
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| Error::validation(format!("Malformed upload: {}", e)))?;
        upload = Some(bytes);
        break;
    }

    let bytes = upload.ok_or_else(|| Error::validation("No file uploaded"))?;
    with_workbench(&state, move |workbench| workbench.upload_image(&bytes)).await?;

    Ok(status_ok())
}

pub async fn predict(State(state): State<AppState>) -> ApiResult<Json<ModelPredictions>> {
    let predictions = with_workbench(&state, |workbench| workbench.predict()).await?;
    Ok(Json(predictions))
}

pub async fn predict_sequential(State(state): State<AppState>) -> ApiResult<Json<ModelPredictions>> {
    let predictions = with_workbench(&state, |workbench| workbench.predict_sequential()).await?;
    Ok(Json(predictions))
}

// ============================================================================
// Class name and prompt endpoints
// ============================================================================

pub async fn get_class_names(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    let names = with_workbench(&state, |workbench| workbench.reload_class_names()).await?;
    Ok(Json(names))
}

#[derive(Debug, Deserialize)]
pub struct SaveClassNamesRequest {
    pub text: Vec<String>,
}

pub async fn save_class_names(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SaveClassNamesRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(req) = payload?;
    with_workbench(&state, move |workbench| workbench.save_class_names(req.text)).await?;
    Ok(status_ok())
}

pub async fn get_prompt(State(state): State<AppState>) -> ApiResult<Json<PromptTemplate>> {
    let prompt = with_workbench(&state, |workbench| Ok(workbench.prompt().clone())).await?;
    Ok(Json(prompt))
}

pub async fn save_prompt(
    State(state): State<AppState>,
    payload: std::result::Result<Json<PromptTemplate>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(prompt) = payload?;
    with_workbench(&state, move |workbench| {
        workbench.save_prompt(prompt);
        Ok(())
    })
    .await?;
    Ok(status_ok())
}

// ============================================================================
// Model selection endpoints
// ============================================================================

pub async fn get_models(State(state): State<AppState>) -> ApiResult<Json<ModelsSnapshot>> {
    let snapshot = with_workbench(&state, |workbench| Ok(workbench.models())).await?;
    Ok(Json(snapshot))
}

pub async fn set_active_models(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Vec<Value>>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(values) = payload?;

    let flags: Vec<i64> = values.iter().map(activation_flag).collect();

    let active = with_workbench(&state, move |workbench| workbench.set_active_models(&flags)).await?;
    Ok(Json(json!({ "status": "ok", "active": active })))
}

/// Integer value of one activation entry
///
/// `true`/`false` and integral floats count as 1/0. Anything else maps to an
/// invalid flag.
fn activation_flag(value: &Value) -> i64 {
    match value {
        Value::Bool(flag) => i64::from(*flag),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() <= 1.0).map(|f| f as i64))
            .unwrap_or(-1),
        _ => -1,
    }
}

#[derive(Debug, Deserialize)]
pub struct SetSequentialModelsRequest {
    pub models: Vec<SequentialRequest>,
}

pub async fn set_sequential_models(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SetSequentialModelsRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(req) = payload?;
    let models =
        with_workbench(&state, move |workbench| workbench.set_sequential_models(&req.models)).await?;
    Ok(Json(json!({ "status": "ok", "models": models })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_flag_accepts_bools_and_integral_floats() {
        assert_eq!(activation_flag(&json!(1)), 1);
        assert_eq!(activation_flag(&json!(0)), 0);
        assert_eq!(activation_flag(&json!(true)), 1);
        assert_eq!(activation_flag(&json!(false)), 0);
        assert_eq!(activation_flag(&json!(1.0)), 1);
        assert_eq!(activation_flag(&json!(0.0)), 0);
    }

    #[test]
    fn test_activation_flag_rejects_everything_else() {
        assert_eq!(activation_flag(&json!(0.5)), -1);
        assert_eq!(activation_flag(&json!("1")), -1);
        assert_eq!(activation_flag(&json!(null)), -1);
    }
}
