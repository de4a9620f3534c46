//! Prompt resolution for portrait generation.
//!
//! Priority: explicit file override, then a language/template-derived file
//! under the prompt directory, then the built-in default.

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::config::AiConfig;
use crate::error::{Error, Result};

/// Built-in system prompt used when no prompt file is configured.
pub const DEFAULT_PORTRAIT_PROMPT: &str = r#"You are an audience analyst. You receive a JSON object with a video_id and a list of viewer comments (comment_id, author, published_at, like_count, reply_count, text) collected from one video.

Analyze the comments and respond with ONLY a single JSON object, no markdown fences and no explanations, with exactly these keys:
- "topics": array of the main discussion topics, most prominent first
- "sentiment": object with "positive", "neutral" and "negative" ratios summing to 1.0
- "languages": object mapping language names to their share of comments
- "tags": array of 3-8 short lowercase tags describing this audience
- "summary": 2-3 sentences describing who this audience is and what they care about

Base every claim only on the provided comments."#;

pub const DEFAULT_PROMPT_NAME: &str = "audience_portrait_default";
pub const DEFAULT_PROMPT_VERSION: i64 = 1;

/// A resolved system prompt with its identity.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<i64>,
    pub system_prompt: String,
}

impl PromptSpec {
    fn built_in() -> Self {
        Self {
            name: Some(DEFAULT_PROMPT_NAME.to_string()),
            version: Some(DEFAULT_PROMPT_VERSION),
            system_prompt: DEFAULT_PORTRAIT_PROMPT.to_string(),
        }
    }

    /// Name recorded alongside the portrait.
    pub fn prompt_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| DEFAULT_PROMPT_NAME.to_string())
    }

    /// Version recorded alongside the portrait.
    pub fn prompt_version(&self) -> i64 {
        self.version.unwrap_or(DEFAULT_PROMPT_VERSION)
    }
}

/// Load a prompt file: a JSON object with a string `system_prompt` and
/// optional `name`/`version`.
pub fn load_prompt_file(path: &Path) -> Result<PromptSpec> {
    let text = std::fs::read_to_string(path)?;
    let spec: PromptSpec = serde_json::from_str(&text)
        .map_err(|e| Error::Config(format!("invalid prompt file {}: {e}", path.display())))?;
    if spec.system_prompt.trim().is_empty() {
        return Err(Error::Config(format!(
            "prompt file {} has an empty system_prompt",
            path.display()
        )));
    }
    Ok(spec)
}

/// Resolve the prompt used for portrait generation.
///
/// An explicit override pointing at a missing file falls through to the next
/// tier (a `.txt` override is also tried with a `.json` extension first).
pub fn resolve_prompt(config: &AiConfig) -> Result<PromptSpec> {
    if let Some(path) = &config.prompt_path {
        if path.exists() {
            return load_prompt_file(path);
        }
        if path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("txt"))
            .unwrap_or(false)
        {
            let candidate = path.with_extension("json");
            if candidate.exists() {
                return load_prompt_file(&candidate);
            }
        }
        warn!(path = %path.display(), "configured prompt file not found, falling back");
    }

    let derived = config
        .prompt_dir
        .join(format!("{}_{}.json", config.prompt_template, config.language));
    if derived.exists() {
        return load_prompt_file(&derived);
    }

    Ok(PromptSpec::built_in())
}
