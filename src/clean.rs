//! Normalization of raw comment threads into clean comments.
//!
//! Extraction is deliberately forgiving: the upstream payload is treated as a
//! loosely shaped JSON tree, and any missing path means "skip this thread",
//! never an error.

use serde_json::Value;

/// Fields extracted from a thread's top-level comment.
#[derive(Debug, Clone, PartialEq)]
pub struct TopLevelComment {
    pub comment_id: String,
    pub published_at: Option<String>,
    pub author: Option<String>,
    pub like_count: Option<i64>,
    pub reply_count: Option<i64>,
    pub text_original: String,
}

/// Collapse all whitespace runs (newlines, tabs, repeated spaces) into single
/// ASCII spaces and trim the ends.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract the top-level comment of a commentThread item.
///
/// Returns `None` when the `snippet.topLevelComment.snippet` chain is missing
/// or the comment id is empty. Threads without an extractable top-level body
/// are valid; they simply yield no clean comment.
pub fn extract_top_level(item: &Value) -> Option<TopLevelComment> {
    let snippet = item.get("snippet")?.as_object()?;
    let top = snippet.get("topLevelComment")?.as_object()?;
    let top_snippet = top.get("snippet")?.as_object()?;

    let comment_id = top.get("id").and_then(Value::as_str).unwrap_or("").trim();
    if comment_id.is_empty() {
        return None;
    }

    Some(TopLevelComment {
        comment_id: comment_id.to_string(),
        published_at: top_snippet
            .get("publishedAt")
            .and_then(Value::as_str)
            .map(str::to_string),
        author: top_snippet
            .get("authorDisplayName")
            .and_then(Value::as_str)
            .map(str::to_string),
        like_count: top_snippet.get("likeCount").and_then(Value::as_i64),
        reply_count: snippet.get("totalReplyCount").and_then(Value::as_i64),
        text_original: top_snippet
            .get("textDisplay")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
    })
}
