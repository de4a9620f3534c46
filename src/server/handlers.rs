//! Request handlers binding JSON payloads to pipeline operations.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::error::{Error, Result};
use crate::models::OrderMode;
use crate::pipeline;
use crate::repository::RunStore;

/// Map pipeline errors onto HTTP statuses with an `{ok:false, error}` body.
fn error_response(err: Error) -> Response {
    let status = match &err {
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({"ok": false, "error": err.to_string()}))).into_response()
}

fn json_response(result: Result<Value>) -> Response {
    match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn index(State(state): State<AppState>) -> Response {
    Json(json!({
        "name": "commentlens",
        "status": "ok",
        "model_provider": state.config.ai.provider,
        "ai_api_url": state.config.ai.api_url.clone().unwrap_or_default(),
    }))
    .into_response()
}

pub async fn health() -> Response {
    Json(json!({"ok": true})).into_response()
}

#[derive(Debug, Deserialize)]
pub struct PipelineRequest {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    order: Option<String>,
    #[serde(default)]
    max_comments: Option<i64>,
}

/// Unified dispatch endpoint: collect, clean, return the normalized result.
pub async fn pipeline(State(state): State<AppState>, Json(req): Json<PipelineRequest>) -> Response {
    json_response(run_pipeline(&state, req).await)
}

async fn run_pipeline(state: &AppState, req: PipelineRequest) -> Result<Value> {
    let url = required_url(req.url.as_deref())?;
    let order = OrderMode::parse(req.order.as_deref().unwrap_or("hot"))?;
    let max_comments = req
        .max_comments
        .unwrap_or(state.config.youtube.default_max_comments);

    let (run_id, video_id, raw_count) =
        pipeline::collect(&state.config, &url, order, max_comments).await?;
    let clean_count = pipeline::clean_run(&state.config, run_id)?;
    let result = pipeline::fetch_clean_result(&state.config, run_id)?;

    Ok(json!({
        "ok": true,
        "run_id": run_id,
        "video_id": video_id,
        "raw_count": raw_count,
        "clean_count": clean_count,
        "result_count": result.len(),
        "result": result,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PortraitRequest {
    #[serde(default)]
    run_id: Option<i64>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    order: Option<String>,
    #[serde(default)]
    max_comments: Option<i64>,
    #[serde(default)]
    overwrite: bool,
}

/// Generate (or return the cached) portrait, either for an existing run or
/// for a URL that is collected and cleaned first.
pub async fn portrait(State(state): State<AppState>, Json(req): Json<PortraitRequest>) -> Response {
    json_response(run_portrait(&state, req).await)
}

async fn run_portrait(state: &AppState, req: PortraitRequest) -> Result<Value> {
    let run_id = match (req.run_id, req.url.as_deref()) {
        (Some(run_id), _) => positive_run_id(Some(run_id))?,
        (None, Some(_)) => {
            let url = required_url(req.url.as_deref())?;
            let order = OrderMode::parse(req.order.as_deref().unwrap_or("hot"))?;
            let max_comments = req
                .max_comments
                .unwrap_or(state.config.youtube.default_max_comments);
            let (run_id, _, _) =
                pipeline::collect(&state.config, &url, order, max_comments).await?;
            pipeline::clean_run(&state.config, run_id)?;
            run_id
        }
        (None, None) => {
            return Err(Error::InvalidInput(
                "provide run_id or url".to_string(),
            ))
        }
    };

    let result = pipeline::generate_portrait(&state.config, run_id, req.overwrite).await?;
    let mut body = serde_json::to_value(&result)?;
    body["ok"] = json!(true);
    Ok(body)
}

#[derive(Debug, Deserialize)]
pub struct RunIdRequest {
    #[serde(default)]
    run_id: Option<i64>,
}

pub async fn portrait_query(
    State(state): State<AppState>,
    Json(req): Json<RunIdRequest>,
) -> Response {
    json_response(run_portrait_query(&state, req))
}

fn run_portrait_query(state: &AppState, req: RunIdRequest) -> Result<Value> {
    let run_id = positive_run_id(req.run_id)?;
    let store = RunStore::open(&state.config.database_path())?;
    let detail = store
        .portrait_detail(run_id)?
        .ok_or_else(|| Error::NotFound(format!("no portrait for run {run_id}")))?;

    let portrait: Option<Value> = match (&detail.portrait.portrait_json, detail.portrait.parse_ok) {
        (Some(text), true) => serde_json::from_str(text).ok(),
        _ => None,
    };

    Ok(json!({
        "ok": true,
        "run_id": run_id,
        "portrait": portrait,
        "portrait_raw": detail.portrait.portrait_raw,
        "parse_ok": detail.portrait.parse_ok,
        "error": detail.portrait.error,
        "prompt_name": detail.portrait.prompt_name,
        "prompt_version": detail.portrait.prompt_version,
        "provider": detail.portrait.provider,
        "model": detail.portrait.model,
        "created_at": detail.portrait.created_at,
        "video_url": detail.video_url,
        "video_title": detail.video_title,
        "channel_title": detail.channel_title,
        "channel_id": detail.channel_id,
    }))
}

pub async fn portrait_delete(
    State(state): State<AppState>,
    Json(req): Json<RunIdRequest>,
) -> Response {
    json_response(run_portrait_delete(&state, req))
}

fn run_portrait_delete(state: &AppState, req: RunIdRequest) -> Result<Value> {
    let run_id = positive_run_id(req.run_id)?;
    let store = RunStore::open(&state.config.database_path())?;
    let deleted = store.delete_ai_portrait(run_id)?;
    Ok(json!({"ok": true, "run_id": run_id, "deleted": deleted}))
}

pub async fn list_portraits(State(state): State<AppState>) -> Response {
    json_response(run_list_portraits(&state))
}

fn run_list_portraits(state: &AppState) -> Result<Value> {
    let store = RunStore::open(&state.config.database_path())?;
    let items = store.list_ai_portraits()?;
    Ok(json!({"ok": true, "count": items.len(), "items": items}))
}

pub async fn list_collections(State(state): State<AppState>) -> Response {
    json_response(run_list_collections(&state))
}

fn run_list_collections(state: &AppState) -> Result<Value> {
    let store = RunStore::open(&state.config.database_path())?;
    let items = store.list_collection_runs()?;
    Ok(json!({"ok": true, "count": items.len(), "items": items}))
}

fn required_url(raw: Option<&str>) -> Result<String> {
    raw.map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidInput("missing url".to_string()))
}

fn positive_run_id(raw: Option<i64>) -> Result<i64> {
    match raw {
        Some(id) if id > 0 => Ok(id),
        _ => Err(Error::InvalidInput(
            "run_id must be a positive integer".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_run_id() {
        assert_eq!(positive_run_id(Some(3)).unwrap(), 3);
        assert!(positive_run_id(None).is_err());
        assert!(positive_run_id(Some(0)).is_err());
        assert!(positive_run_id(Some(-1)).is_err());
    }

    #[test]
    fn test_required_url() {
        assert_eq!(required_url(Some(" x ")).unwrap(), "x");
        assert!(required_url(Some("   ")).is_err());
        assert!(required_url(None).is_err());
    }

    #[test]
    fn test_error_status_mapping() {
        let resp = error_response(Error::InvalidInput("bad".to_string()));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = error_response(Error::NotFound("gone".to_string()));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = error_response(Error::Upstream("boom".to_string()));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
