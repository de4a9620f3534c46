//! Domain records for collection runs, raw threads, clean comments and
//! portraits.

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Comment sort preference accepted by the pipeline.
///
/// The public API takes `hot`/`time`; the upstream commentThreads endpoint
/// calls popularity sorting `relevance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderMode {
    Relevance,
    Time,
}

impl OrderMode {
    /// Parse the API-facing order value.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hot" => Ok(OrderMode::Relevance),
            "time" => Ok(OrderMode::Time),
            other => Err(Error::InvalidInput(format!(
                "order must be hot|time, got {other:?}"
            ))),
        }
    }

    /// The upstream `order` parameter value.
    pub fn as_str(self) -> &'static str {
        match self {
            OrderMode::Relevance => "relevance",
            OrderMode::Time => "time",
        }
    }
}

/// One invocation of comment collection for one video.
///
/// Immutable once created except for the metadata columns, which are filled
/// by a later best-effort lookup.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionRun {
    pub run_id: i64,
    pub video_id: String,
    pub video_url: String,
    pub video_title: Option<String>,
    pub channel_title: Option<String>,
    pub channel_id: Option<String>,
    pub collected_at: String,
    pub order_mode: String,
    pub max_comments: i64,
}

/// Video/channel metadata used to enrich a run after collection.
#[derive(Debug, Clone, Default)]
pub struct VideoMetadata {
    pub video_title: Option<String>,
    pub channel_title: Option<String>,
    pub channel_id: Option<String>,
}

/// Projection of a stored raw thread consumed by the cleaning stage.
#[derive(Debug, Clone)]
pub struct RawThreadRow {
    pub id: i64,
    pub video_id: String,
    pub thread_id: String,
    pub item_json: String,
}

/// The pipeline's external projection of a normalized comment.
///
/// Exactly these seven fields are exposed through the dispatch layer; raw
/// payloads and internal row ids stay inside the store.
#[derive(Debug, Clone, Serialize)]
pub struct CleanComment {
    pub video_id: String,
    pub comment_id: String,
    pub published_at: Option<String>,
    pub author: Option<String>,
    pub like_count: Option<i64>,
    pub reply_count: Option<i64>,
    pub text: String,
}

/// A normalized comment ready for insertion.
#[derive(Debug, Clone)]
pub struct NewCleanComment {
    pub raw_thread_id: i64,
    pub video_id: String,
    pub comment_id: String,
    pub published_at: Option<String>,
    pub author: Option<String>,
    pub like_count: Option<i64>,
    pub reply_count: Option<i64>,
    pub text: String,
    pub text_original: String,
}

/// A portrait row to upsert; one row per run, full overwrite on conflict.
#[derive(Debug, Clone)]
pub struct NewPortrait {
    pub run_id: i64,
    pub provider: String,
    pub model: String,
    pub prompt_name: Option<String>,
    pub prompt_version: Option<i64>,
    pub input_json: String,
    pub portrait_json: Option<String>,
    pub portrait_raw: Option<String>,
    pub parse_ok: bool,
    pub error: Option<String>,
}

/// A stored portrait row.
#[derive(Debug, Clone)]
pub struct PortraitRecord {
    pub run_id: i64,
    pub created_at: String,
    pub provider: String,
    pub model: String,
    pub prompt_name: Option<String>,
    pub prompt_version: Option<i64>,
    pub input_json: String,
    pub portrait_json: Option<String>,
    pub portrait_raw: Option<String>,
    pub parse_ok: bool,
    pub error: Option<String>,
}

/// A portrait joined with its owning run, for the query endpoint.
#[derive(Debug, Clone)]
pub struct PortraitDetail {
    pub portrait: PortraitRecord,
    pub video_id: String,
    pub video_url: String,
    pub video_title: Option<String>,
    pub channel_title: Option<String>,
    pub channel_id: Option<String>,
}

/// One row of the portrait list endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PortraitSummary {
    pub run_id: i64,
    pub portrait_created_at: String,
    pub parse_ok: bool,
    pub prompt_name: Option<String>,
    pub prompt_version: Option<i64>,
    pub provider: String,
    pub model: String,
    pub video_id: String,
    pub video_url: String,
    pub video_title: Option<String>,
    pub channel_title: Option<String>,
    pub channel_id: Option<String>,
    pub collected_at: String,
}

/// Result of a portrait generation call, fresh or cached.
#[derive(Debug, Clone, Serialize)]
pub struct PortraitResult {
    pub run_id: i64,
    pub video_id: Option<String>,
    pub parse_ok: bool,
    pub portrait: Option<Value>,
    pub portrait_raw: Option<String>,
    pub error: Option<String>,
    pub prompt_name: Option<String>,
    pub prompt_version: Option<i64>,
    pub provider: String,
    pub model: String,
    pub cached: bool,
}
