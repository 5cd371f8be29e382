//! Configuration loader and validator for the feed → Telegram/VK relay.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema. Every section is
/// optional in the file and falls back to the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub app: App,
    pub feeds: Vec<String>,
    pub rewrite: Rewrite,
    pub telegram: Telegram,
    pub vk: Vk,
    pub preview: Preview,
}

/// Run-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct App {
    pub data_dir: String,
    /// Entries with at least one successful delivery allowed per run.
    pub max_posts: usize,
    /// How many pending entries a single run may examine.
    pub max_candidates: i64,
    pub lookback_days: i64,
    pub post_interval_ms: u64,
    pub request_timeout_secs: u64,
}

/// OpenRouter chat-completions settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Rewrite {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub referer: String,
    pub title: String,
}

/// Telegram channel credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Telegram {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

/// VK group wall credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Vk {
    pub group_token: Option<String>,
    pub group_id: Option<String>,
    pub api_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Preview {
    pub max_width: u32,
}

impl Default for App {
    fn default() -> Self {
        Self {
            data_dir: "./data".into(),
            max_posts: 3,
            max_candidates: 50,
            lookback_days: 3,
            post_interval_ms: 2000,
            request_timeout_secs: 30,
        }
    }
}

impl Default for Rewrite {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://openrouter.ai/api/v1/".into(),
            model: "openrouter/auto".into(),
            temperature: 0.4,
            referer: "https://example.com".into(),
            title: "Tech Rewriter".into(),
        }
    }
}

impl Default for Vk {
    fn default() -> Self {
        Self {
            group_token: None,
            group_id: None,
            api_version: "5.199".into(),
        }
    }
}

impl Default for Preview {
    fn default() -> Self {
        Self { max_width: 1280 }
    }
}

/// Feeds polled when the config file does not list any.
pub fn default_feeds() -> Vec<String> {
    [
        "https://www.gsmarena.com/rss-news-reviews.php3",
        "https://www.androidpolice.com/feed/",
        "https://www.theverge.com/rss/index.xml",
        "https://www.tomshardware.com/feeds/all",
        "https://www.xda-developers.com/feed/",
        "https://www.engadget.com/rss.xml",
        "https://feeds.arstechnica.com/arstechnica/gadgets/",
        "https://9to5google.com/feed/",
        "https://www.anandtech.com/rss/",
        "https://news.samsung.com/global/feed",
        "https://nvidianews.nvidia.com/rss",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Treat missing and blank credentials the same way.
pub fn credential(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl App {
    /// `data_dir` with a leading `~/` expanded against `$HOME`.
    pub fn resolved_data_dir(&self) -> String {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => match std::env::var("HOME") {
                Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
                Err(_) => self.data_dir.clone(),
            },
            None => self.data_dir.clone(),
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.app.resolved_data_dir())
    }

    /// Overlay credentials and limits from the environment, using the same
    /// variable names the deployment workflow exports.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("OPENROUTER_API_KEY") {
            self.rewrite.api_key = Some(v);
        }
        if let Some(v) = lookup("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = lookup("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = Some(v);
        }
        if let Some(v) = lookup("VK_GROUP_TOKEN") {
            self.vk.group_token = Some(v);
        }
        if let Some(v) = lookup("VK_GROUP_ID") {
            self.vk.group_id = Some(v);
        }
        if let Some(v) = lookup("MAX_POSTS") {
            self.app.max_posts = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("MAX_POSTS must be a positive integer"))?;
        }
        Ok(())
    }
}

/// Load configuration from a YAML file, overlay the process environment and
/// validate the result.
/// - If `path` is None, uses `config.yaml` in the current working directory
///   when present and built-in defaults otherwise.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut cfg = match path {
        Some(p) => parse(&fs::read_to_string(p)?)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            parse(&fs::read_to_string(DEFAULT_CONFIG_PATH)?)?
        }
        None => parse("{}")?,
    };
    cfg.apply_env(|key| std::env::var(key).ok())?;
    validate(&cfg)?;
    Ok(cfg)
}

fn parse(content: &str) -> Result<Config, ConfigError> {
    let mut cfg: Config = serde_yaml::from_str(content)?;
    if cfg.feeds.is_empty() {
        cfg.feeds = default_feeds();
    }
    Ok(cfg)
}

/// Validate a configuration instance. Missing credentials are not an error:
/// the affected collaborator is skipped at run time.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.max_posts == 0 {
        return Err(ConfigError::Invalid("app.max_posts must be > 0"));
    }
    if cfg.app.max_candidates <= 0 {
        return Err(ConfigError::Invalid("app.max_candidates must be > 0"));
    }
    if cfg.app.lookback_days <= 0 {
        return Err(ConfigError::Invalid("app.lookback_days must be > 0"));
    }
    if cfg.app.request_timeout_secs == 0 {
        return Err(ConfigError::Invalid("app.request_timeout_secs must be > 0"));
    }
    if cfg.feeds.iter().all(|f| f.trim().is_empty()) {
        return Err(ConfigError::Invalid("feeds must list at least one URL"));
    }
    if cfg.rewrite.endpoint.trim().is_empty() {
        return Err(ConfigError::Invalid("rewrite.endpoint must be non-empty"));
    }
    if cfg.vk.api_version.trim().is_empty() {
        return Err(ConfigError::Invalid("vk.api_version must be non-empty"));
    }
    if cfg.preview.max_width == 0 {
        return Err(ConfigError::Invalid("preview.max_width must be > 0"));
    }
    Ok(())
}

/// Example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  max_posts: 3
  max_candidates: 50
  lookback_days: 3
  post_interval_ms: 2000
  request_timeout_secs: 30

feeds:
  - "https://www.theverge.com/rss/index.xml"
  - "https://www.engadget.com/rss.xml"

rewrite:
  api_key: "YOUR_OPENROUTER_API_KEY"
  model: "openrouter/auto"
  temperature: 0.4

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"
  chat_id: "@your_channel"

vk:
  group_token: "YOUR_VK_GROUP_TOKEN"
  group_id: "123456789"

preview:
  max_width: 1280
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg = parse(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.feeds.len(), 2);
        assert_eq!(cfg.vk.api_version, "5.199");
        assert_eq!(cfg.rewrite.endpoint, "https://openrouter.ai/api/v1/");
    }

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = parse("{}").unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.max_posts, 3);
        assert_eq!(cfg.app.lookback_days, 3);
        assert_eq!(cfg.feeds, default_feeds());
        assert!(cfg.rewrite.api_key.is_none());
        assert!(cfg.telegram.bot_token.is_none());
    }

    #[test]
    fn invalid_limits() {
        let mut cfg = parse(example()).unwrap();
        cfg.app.max_posts = 0;
        match validate(&cfg).unwrap_err() {
            ConfigError::Invalid(msg) => assert!(msg.contains("max_posts")),
            _ => panic!("wrong error"),
        }

        let mut cfg = parse(example()).unwrap();
        cfg.app.lookback_days = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = parse(example()).unwrap();
        cfg.app.max_candidates = -1;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = parse(example()).unwrap();
        cfg.feeds = vec!["  ".into()];
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_credentials_are_valid() {
        let mut cfg = parse(example()).unwrap();
        cfg.rewrite.api_key = None;
        cfg.telegram = Telegram::default();
        cfg.vk.group_token = Some("   ".into());
        validate(&cfg).unwrap();
        assert_eq!(credential(&cfg.vk.group_token), None);
    }

    #[test]
    fn env_overrides_credentials_and_quota() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENROUTER_API_KEY", "or-key"),
            ("TELEGRAM_CHAT_ID", "-100123"),
            ("VK_GROUP_ID", "42"),
            ("MAX_POSTS", "5"),
        ]);
        let mut cfg = parse("{}").unwrap();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(credential(&cfg.rewrite.api_key), Some("or-key"));
        assert_eq!(cfg.telegram.chat_id.as_deref(), Some("-100123"));
        assert_eq!(cfg.vk.group_id.as_deref(), Some("42"));
        assert_eq!(cfg.app.max_posts, 5);

        let mut cfg = parse("{}").unwrap();
        let err = cfg
            .apply_env(|k| (k == "MAX_POSTS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg = parse(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.max_candidates, 50);
        assert_eq!(cfg.preview.max_width, 1280);
    }
}
