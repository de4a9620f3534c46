//! YouTube comment source client and video URL resolution.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::YoutubeConfig;
use crate::error::{Error, Result};
use crate::models::{OrderMode, VideoMetadata};

/// Transient statuses worth another attempt.
const RETRYABLE_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

/// Extract the video identifier from a YouTube URL.
///
/// Supported shapes:
/// - `https://youtu.be/<id>` (first path segment)
/// - `https://www.youtube.com/watch?v=<id>` (also `m.youtube.com`)
/// - `https://www.youtube.com/shorts/<id>` and `/embed/<id>`
///
/// Anything else fails with `InvalidInput`. Pure parsing, no network.
pub fn parse_video_id(raw: &str) -> Result<String> {
    let parsed = Url::parse(raw.trim()).map_err(|_| unsupported(raw))?;
    let host = parsed.host_str().unwrap_or("").to_ascii_lowercase();

    if host == "youtu.be" || host.ends_with(".youtu.be") {
        if let Some(candidate) = parsed.path_segments().and_then(|mut s| s.next()) {
            if !candidate.is_empty() {
                return Ok(candidate.to_string());
            }
        }
    }

    if host == "youtube.com" || host.ends_with(".youtube.com") {
        if parsed.path().trim_end_matches('/') == "/watch" {
            if let Some((_, v)) = parsed.query_pairs().find(|(k, _)| k == "v") {
                if !v.is_empty() {
                    return Ok(v.into_owned());
                }
            }
        }

        let parts: Vec<&str> = parsed.path().split('/').filter(|p| !p.is_empty()).collect();
        if parts.len() >= 2 && matches!(parts[0], "shorts" | "embed") && !parts[1].is_empty() {
            return Ok(parts[1].to_string());
        }
    }

    Err(unsupported(raw))
}

fn unsupported(url: &str) -> Error {
    Error::InvalidInput(format!("unsupported or invalid YouTube URL: {url}"))
}

/// Paginated client for the commentThreads endpoint.
///
/// Fetching is pure network I/O; persisting the result belongs to the
/// orchestrator, which keeps this client testable independent of storage.
pub struct CommentClient {
    client: Client,
    api_key: String,
    threads_api_url: String,
    videos_api_url: String,
    retry_times: u32,
    retry_interval: Duration,
}

impl CommentClient {
    /// Build a client from configuration. A missing API key is a
    /// configuration error at the point of use.
    pub fn new(config: &YoutubeConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::Config("missing YOUTUBE_API_KEY".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            threads_api_url: config.threads_api_url.clone(),
            videos_api_url: config.videos_api_url.clone(),
            retry_times: config.retry_times,
            retry_interval: Duration::from_secs(config.retry_interval_secs),
        })
    }

    /// Fetch up to `max_total` comment threads for a video, paging with the
    /// upstream cursor. Each page requests `min(100, remaining)` items; the
    /// fetch ends when the total is reached or no further page token is
    /// reported.
    pub async fn fetch_comment_threads(
        &self,
        video_id: &str,
        order: OrderMode,
        max_total: usize,
    ) -> Result<Vec<Value>> {
        let mut items: Vec<Value> = Vec::new();
        let mut page_token: Option<String> = None;

        while items.len() < max_total {
            let per_page = (max_total - items.len()).min(100);
            let mut params: Vec<(&str, String)> = vec![
                ("part", "snippet".to_string()),
                ("videoId", video_id.to_string()),
                ("maxResults", per_page.to_string()),
                ("textFormat", "plainText".to_string()),
                ("key", self.api_key.clone()),
                ("order", order.as_str().to_string()),
            ];
            if let Some(ref token) = page_token {
                params.push(("pageToken", token.clone()));
            }

            let data = self.get_with_retries(&self.threads_api_url, &params).await?;

            match data.get("items") {
                Some(Value::Array(batch)) => items.extend(batch.iter().cloned()),
                Some(Value::Null) | None => {}
                Some(_) => {
                    return Err(Error::Upstream(
                        "unexpected API response: items is not a list".to_string(),
                    ))
                }
            }

            page_token = data
                .get("nextPageToken")
                .and_then(Value::as_str)
                .map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }

        Ok(items)
    }

    /// Best-effort video metadata lookup used to enrich a collection run.
    pub async fn fetch_video_metadata(&self, video_id: &str) -> Result<Option<VideoMetadata>> {
        let params = vec![
            ("part", "snippet".to_string()),
            ("id", video_id.to_string()),
            ("key", self.api_key.clone()),
        ];
        let data = self.get_with_retries(&self.videos_api_url, &params).await?;

        let snippet = data
            .get("items")
            .and_then(|items| items.get(0))
            .and_then(|item| item.get("snippet"));

        Ok(snippet.map(|s| VideoMetadata {
            video_title: s.get("title").and_then(Value::as_str).map(str::to_string),
            channel_title: s
                .get("channelTitle")
                .and_then(Value::as_str)
                .map(str::to_string),
            channel_id: s.get("channelId").and_then(Value::as_str).map(str::to_string),
        }))
    }

    /// One page request with bounded retry.
    ///
    /// Transport failures, unreadable bodies and HTTP 429/500/502/503/504 are
    /// retried up to `retry_times` additional attempts with a fixed sleep in
    /// between. Any other non-200 status aborts immediately.
    async fn get_with_retries(&self, url: &str, params: &[(&str, String)]) -> Result<Value> {
        let mut last_err = String::new();

        for attempt in 0..=self.retry_times {
            match self.client.get(url).query(params).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::OK {
                        match resp.json::<Value>().await {
                            Ok(data) => return Ok(data),
                            Err(e) => last_err = format!("invalid JSON body: {e}"),
                        }
                    } else if RETRYABLE_STATUS.contains(&status.as_u16()) {
                        last_err = format!("HTTP {}", status.as_u16());
                    } else {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(Error::Upstream(format!(
                            "HTTP {}: {}",
                            status.as_u16(),
                            truncate(&body, 500)
                        )));
                    }
                }
                Err(e) => last_err = e.to_string(),
            }

            if attempt < self.retry_times {
                debug!(attempt, error = %last_err, "comment page request failed, retrying");
                tokio::time::sleep(self.retry_interval).await;
            }
        }

        Err(Error::Upstream(format!(
            "request failed after retries: {last_err}"
        )))
    }
}

/// Truncate to at most `max` bytes at a char boundary.
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watch_url() {
        let id = parse_video_id("https://www.youtube.com/watch?v=MdTAJ1J2LeM").unwrap();
        assert_eq!(id, "MdTAJ1J2LeM");
    }

    #[test]
    fn test_parse_watch_url_mobile_host() {
        let id = parse_video_id("https://m.youtube.com/watch?v=MdTAJ1J2LeM&t=12s").unwrap();
        assert_eq!(id, "MdTAJ1J2LeM");
    }

    #[test]
    fn test_parse_short_link() {
        let id = parse_video_id("https://youtu.be/MdTAJ1J2LeM").unwrap();
        assert_eq!(id, "MdTAJ1J2LeM");
    }

    #[test]
    fn test_parse_shorts_and_embed_paths() {
        assert_eq!(
            parse_video_id("https://www.youtube.com/shorts/MdTAJ1J2LeM").unwrap(),
            "MdTAJ1J2LeM"
        );
        assert_eq!(
            parse_video_id("https://www.youtube.com/embed/MdTAJ1J2LeM").unwrap(),
            "MdTAJ1J2LeM"
        );
    }

    #[test]
    fn test_parse_trims_surrounding_whitespace() {
        let id = parse_video_id("  https://youtu.be/MdTAJ1J2LeM\n").unwrap();
        assert_eq!(id, "MdTAJ1J2LeM");
    }

    #[test]
    fn test_parse_rejects_unsupported_shapes() {
        for url in [
            "not a url",
            "https://example.com/watch?v=MdTAJ1J2LeM",
            "https://www.youtube.com/",
            "https://www.youtube.com/watch",
            "https://www.youtube.com/playlist?list=PL123",
            "https://www.youtube.com/channel/UC123",
        ] {
            let err = parse_video_id(url).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{url} should be rejected");
        }
    }

    #[test]
    fn test_client_requires_api_key() {
        let config = YoutubeConfig::default();
        assert!(matches!(CommentClient::new(&config), Err(Error::Config(_))));

        let config = YoutubeConfig {
            api_key: Some("   ".to_string()),
            ..YoutubeConfig::default()
        };
        assert!(matches!(CommentClient::new(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        // Multi-byte char straddling the cut point is dropped whole.
        assert_eq!(truncate("héllo", 2), "h");
    }
}
