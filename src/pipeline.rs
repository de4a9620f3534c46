//! Pipeline orchestration: collect, clean and portrait operations.
//!
//! Each operation opens its own store connection and closes it on return;
//! there is no long-lived connection or shared mutable state between
//! invocations. Lower-layer errors propagate untouched; mapping to status
//! codes is the dispatch layer's job.

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::clean::{extract_top_level, normalize_text};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::llm::{self, ChatClient};
use crate::models::{CleanComment, NewCleanComment, NewPortrait, OrderMode, PortraitResult};
use crate::repository::RunStore;
use crate::youtube::{parse_video_id, CommentClient};

/// Clamp the requested comment count to the supported window.
pub fn clamp_max_comments(requested: i64) -> i64 {
    requested.clamp(1, 100)
}

/// Collect raw comment threads for a video URL into a new run.
///
/// Returns `(run_id, video_id, raw_count)` where `raw_count` is the number
/// of items fetched from upstream. The fetch happens before any row is
/// written, so an upstream failure never leaves an empty run behind.
pub async fn collect(
    config: &AppConfig,
    url: &str,
    order: OrderMode,
    max_comments: i64,
) -> Result<(i64, String, usize)> {
    let max_comments = clamp_max_comments(max_comments);
    let video_id = parse_video_id(url)?;

    let client = CommentClient::new(&config.youtube)?;
    let items = client
        .fetch_comment_threads(&video_id, order, max_comments as usize)
        .await?;

    let mut store = RunStore::open(&config.database_path())?;
    let run_id = store.insert_collection_run(&video_id, url, order, max_comments)?;
    let stored = store.insert_raw_threads(run_id, &video_id, &items)?;
    info!(run_id, video_id = %video_id, fetched = items.len(), stored, "collection stored");

    // Enrichment is best-effort; a failed lookup never fails the collection.
    match client.fetch_video_metadata(&video_id).await {
        Ok(Some(meta)) => store.update_run_metadata(run_id, &meta)?,
        Ok(None) => {}
        Err(e) => warn!(run_id, error = %e, "video metadata lookup failed"),
    }

    Ok((run_id, video_id, items.len()))
}

/// Normalize the raw threads of a run into clean comments.
///
/// Threads without an extractable top-level body, or whose text is empty
/// after whitespace collapse, are skipped. Safe to re-run: the store ignores
/// already-seen (run, comment) pairs. Returns the inserted-or-ignored count.
pub fn clean_run(config: &AppConfig, run_id: i64) -> Result<usize> {
    let mut store = RunStore::open(&config.database_path())?;
    let threads = store.raw_threads(run_id)?;

    let mut candidates = Vec::new();
    for row in &threads {
        let item: Value = serde_json::from_str(&row.item_json)?;

        let Some(extracted) = extract_top_level(&item) else {
            continue;
        };
        let text = normalize_text(&extracted.text_original);
        if text.is_empty() {
            continue;
        }

        candidates.push(NewCleanComment {
            raw_thread_id: row.id,
            video_id: row.video_id.clone(),
            comment_id: extracted.comment_id,
            published_at: extracted.published_at,
            author: extracted.author,
            like_count: extracted.like_count,
            reply_count: extracted.reply_count,
            text,
            text_original: extracted.text_original,
        });
    }

    let count = store.insert_clean_comments(run_id, &candidates)?;
    info!(run_id, scanned = threads.len(), inserted_or_ignored = count, "cleaning pass done");
    Ok(count)
}

/// The cleaned comments of a run, in insertion order.
pub fn fetch_clean_result(config: &AppConfig, run_id: i64) -> Result<Vec<CleanComment>> {
    let store = RunStore::open(&config.database_path())?;
    store.clean_comments(run_id)
}

/// Generate (or return the cached) audience portrait for a run.
///
/// With `overwrite` false an existing portrait is returned as-is without any
/// LLM call: at most one call per run unless explicitly forced. A fresh
/// generation persists its outcome whether or not the reply parsed; a failed
/// LLM call persists nothing, so a transient outage never destroys a prior
/// cached portrait.
pub async fn generate_portrait(
    config: &AppConfig,
    run_id: i64,
    overwrite: bool,
) -> Result<PortraitResult> {
    let store = RunStore::open(&config.database_path())?;

    if !overwrite {
        if let Some(existing) = store.get_ai_portrait(run_id)? {
            let portrait = match (&existing.portrait_json, existing.parse_ok) {
                (Some(text), true) if !text.is_empty() => serde_json::from_str(text).ok(),
                _ => None,
            };
            return Ok(PortraitResult {
                run_id,
                video_id: None,
                parse_ok: existing.parse_ok,
                portrait,
                portrait_raw: existing.portrait_raw,
                error: existing.error,
                prompt_name: existing.prompt_name,
                prompt_version: existing.prompt_version,
                provider: existing.provider,
                model: existing.model,
                cached: true,
            });
        }
    }

    let comments = store.clean_comments(run_id)?;
    if comments.is_empty() {
        return Err(Error::NotFound(format!(
            "no clean comments for run {run_id}; run cleaning first"
        )));
    }
    let video_id = comments[0].video_id.clone();

    let input = json!({
        "video_id": video_id,
        "comments": comments
            .iter()
            .map(|c| {
                json!({
                    "comment_id": c.comment_id,
                    "author": c.author,
                    "published_at": c.published_at,
                    "like_count": c.like_count,
                    "reply_count": c.reply_count,
                    "text": c.text,
                })
            })
            .collect::<Vec<_>>(),
    });
    let input_json = input.to_string();

    let prompt = llm::resolve_prompt(&config.ai)?;
    let client = ChatClient::new(&config.ai)?;

    let response = client
        .chat_completions(&prompt.system_prompt, &input_json)
        .await?;
    let raw_content = llm::extract_message_content(&response)?;

    let (portrait_json, portrait, parse_ok, error) =
        match serde_json::from_str::<Value>(llm::extract_json_text(&raw_content)) {
            Ok(parsed) => (Some(parsed.to_string()), Some(parsed), true, None),
            Err(e) => (
                None,
                None,
                false,
                Some(format!("portrait JSON parse failed: {e}")),
            ),
        };

    let prompt_name = Some(prompt.prompt_name());
    let prompt_version = Some(prompt.prompt_version());

    store.upsert_ai_portrait(&NewPortrait {
        run_id,
        provider: config.ai.provider.clone(),
        model: client.model.clone(),
        prompt_name: prompt_name.clone(),
        prompt_version,
        input_json,
        portrait_json,
        portrait_raw: Some(raw_content.clone()),
        parse_ok,
        error: error.clone(),
    })?;
    info!(run_id, parse_ok, "portrait stored");

    Ok(PortraitResult {
        run_id,
        video_id: Some(video_id),
        parse_ok,
        portrait,
        portrait_raw: Some(raw_content),
        error,
        prompt_name,
        prompt_version,
        provider: config.ai.provider.clone(),
        model: client.model.clone(),
        cached: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_max_comments() {
        assert_eq!(clamp_max_comments(500), 100);
        assert_eq!(clamp_max_comments(0), 1);
        assert_eq!(clamp_max_comments(-3), 1);
        assert_eq!(clamp_max_comments(42), 42);
        assert_eq!(clamp_max_comments(100), 100);
    }
}
