//! Configuration management for commentlens.
//!
//! An [`AppConfig`] is assembled once per process entry point (CLI command or
//! server start) from defaults, an optional `commentlens.toml` file and
//! environment variables, then passed by parameter into every component.
//! Nothing below this module reads the process environment.

use std::env;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

/// Default commentThreads endpoint.
pub const DEFAULT_THREADS_API_URL: &str =
    "https://www.googleapis.com/youtube/v3/commentThreads";

/// Default videos endpoint, used for run metadata enrichment.
pub const DEFAULT_VIDEOS_API_URL: &str = "https://www.googleapis.com/youtube/v3/videos";

/// Comment source settings.
#[derive(Debug, Clone)]
pub struct YoutubeConfig {
    /// API key; required at collection time, not at startup.
    pub api_key: Option<String>,
    pub threads_api_url: String,
    pub videos_api_url: String,
    /// Additional attempts per page request on transient failures.
    pub retry_times: u32,
    /// Seconds to sleep between attempts.
    pub retry_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Default comment-thread total when a request does not specify one.
    pub default_max_comments: i64,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            threads_api_url: DEFAULT_THREADS_API_URL.to_string(),
            videos_api_url: DEFAULT_VIDEOS_API_URL.to_string(),
            retry_times: 3,
            retry_interval_secs: 5,
            request_timeout_secs: 30,
            default_max_comments: 50,
        }
    }
}

/// LLM provider settings.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub provider: String,
    /// Credentials and model; required at portrait time, not at startup.
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    /// Explicit prompt file override (first resolution tier).
    pub prompt_path: Option<PathBuf>,
    /// Directory searched for language/template-derived prompt files.
    pub prompt_dir: PathBuf,
    pub prompt_template: String,
    pub language: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            api_key: None,
            api_url: None,
            model: None,
            temperature: 0.2,
            max_tokens: 1024,
            request_timeout_secs: 180,
            prompt_path: None,
            prompt_dir: PathBuf::from("prompts"),
            prompt_template: "audience_portrait".to_string(),
            language: "en".to_string(),
        }
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename inside the data directory.
    pub database_filename: String,
    pub host: String,
    pub port: u16,
    pub youtube: YoutubeConfig,
    pub ai: AiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("commentlens");

        Self {
            data_dir,
            database_filename: "commentlens.db".to_string(),
            host: "127.0.0.1".to_string(),
            port: 5076,
            youtube: YoutubeConfig::default(),
            ai: AiConfig::default(),
        }
    }
}

impl AppConfig {
    /// Get the full path to the database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir)
    }

    /// Load configuration from `commentlens.toml` (if present) and the
    /// environment. Call `dotenvy::dotenv()` first to pick up an `.env` file.
    pub fn load() -> Self {
        let mut config = Self::default();
        if let Some(file) = ConfigFile::discover() {
            file.apply(&mut config);
        }
        apply_env(&mut config);
        config
    }
}

/// Configuration file structure (`commentlens.toml`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// Target directory for data.
    #[serde(default)]
    pub target: Option<String>,
    /// Database filename.
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub youtube: YoutubeFileConfig,
    #[serde(default)]
    pub ai: AiFileConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct YoutubeFileConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub videos_api_url: Option<String>,
    #[serde(default)]
    pub retry_times: Option<u32>,
    #[serde(default)]
    pub retry_interval: Option<u64>,
    #[serde(default)]
    pub request_timeout: Option<u64>,
    #[serde(default)]
    pub max_comments: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AiFileConfig {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub request_timeout: Option<u64>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub prompt_dir: Option<String>,
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl ConfigFile {
    /// Look for `commentlens.toml` in the working directory, then in the
    /// user config directory.
    pub fn discover() -> Option<Self> {
        let mut candidates = vec![PathBuf::from("commentlens.toml")];
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("commentlens").join("commentlens.toml"));
        }

        for path in candidates {
            if let Ok(text) = fs::read_to_string(&path) {
                match toml::from_str(&text) {
                    Ok(parsed) => return Some(parsed),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
                    }
                }
            }
        }
        None
    }

    /// Apply file values over the defaults.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(ref target) = self.target {
            let path = shellexpand::tilde(target);
            config.data_dir = PathBuf::from(path.as_ref());
        }
        if let Some(ref database) = self.database {
            config.database_filename = database.clone();
        }
        if let Some(ref host) = self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }

        let y = &self.youtube;
        set_opt(&mut config.youtube.api_key, y.api_key.clone());
        set(&mut config.youtube.threads_api_url, y.api_url.clone());
        set(&mut config.youtube.videos_api_url, y.videos_api_url.clone());
        set(&mut config.youtube.retry_times, y.retry_times);
        set(&mut config.youtube.retry_interval_secs, y.retry_interval);
        set(&mut config.youtube.request_timeout_secs, y.request_timeout);
        set(&mut config.youtube.default_max_comments, y.max_comments);

        let a = &self.ai;
        set(&mut config.ai.provider, a.provider.clone());
        set_opt(&mut config.ai.api_key, a.api_key.clone());
        set_opt(&mut config.ai.api_url, a.api_url.clone());
        set_opt(&mut config.ai.model, a.model.clone());
        set(&mut config.ai.temperature, a.temperature);
        set(&mut config.ai.max_tokens, a.max_tokens);
        set(&mut config.ai.request_timeout_secs, a.request_timeout);
        if let Some(ref prompt) = a.prompt {
            config.ai.prompt_path = Some(PathBuf::from(shellexpand::tilde(prompt).as_ref()));
        }
        if let Some(ref dir) = a.prompt_dir {
            config.ai.prompt_dir = PathBuf::from(shellexpand::tilde(dir).as_ref());
        }
        set(&mut config.ai.prompt_template, a.prompt_template.clone());
        set(&mut config.ai.language, a.language.clone());
    }
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn set_opt<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

/// Environment variables override file values. Variable names match the
/// original deployment (`YOUTUBE_API_KEY`, `AI_API_KEY`, ...).
fn apply_env(config: &mut AppConfig) {
    set_opt(&mut config.youtube.api_key, env_str("YOUTUBE_API_KEY"));
    set(&mut config.youtube.threads_api_url, env_str("YOUTUBE_API_URL"));
    set(&mut config.youtube.videos_api_url, env_str("YOUTUBE_VIDEOS_API_URL"));
    set(&mut config.youtube.retry_times, env_parse("RETRY_TIMES"));
    set(&mut config.youtube.retry_interval_secs, env_parse("RETRY_INTERVAL"));

    set(&mut config.ai.provider, env_str("AI_PROVIDER"));
    set_opt(&mut config.ai.api_key, env_str("AI_API_KEY"));
    set_opt(&mut config.ai.api_url, env_str("AI_API_URL"));
    set_opt(
        &mut config.ai.model,
        env_str("AI_MODEL_NAME").or_else(|| env_str("AI_MODEL")),
    );
    set(&mut config.ai.temperature, env_parse("AI_TEMPERATURE"));
    set(&mut config.ai.max_tokens, env_parse("AI_MAX_TOKENS"));
    if let Some(prompt) = env_str("AI_PROMPT") {
        let trimmed = prompt.trim_matches('"').to_string();
        if !trimmed.is_empty() {
            config.ai.prompt_path = Some(PathBuf::from(shellexpand::tilde(&trimmed).as_ref()));
        }
    }

    if let Some(target) = env_str("COMMENTLENS_DATA_DIR") {
        config.data_dir = PathBuf::from(shellexpand::tilde(&target).as_ref());
    }
    set(&mut config.host, env_str("HOST"));
    set(&mut config.port, env_parse("PORT"));
}

fn env_str(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_str(name).and_then(|v| v.parse().ok())
}
