//! Configuration management for aidigest.
//!
//! Loads configuration from ${AIDIGEST_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use aidigest_providers::{ChatConfig, Provider, gemini, openai};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::github::{self, GitHubSettings};
use crate::sources::{
    Category, FoloSettings, FoloSource, FoloTarget, ProjectsSource, SourceRegistry,
};

pub mod paths {
    //! Path resolution for configuration and stored data.
    //!
    //! AIDIGEST_HOME resolution order:
    //! 1. AIDIGEST_HOME environment variable (if set)
    //! 2. ~/.config/aidigest (default)
    //! 3. ./.aidigest when no home directory can be determined

    use std::path::PathBuf;

    pub const HOME_ENV: &str = "AIDIGEST_HOME";

    /// Returns the aidigest home directory.
    pub fn aidigest_home() -> PathBuf {
        if let Ok(home) = std::env::var(HOME_ENV)
            && !home.trim().is_empty()
        {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".aidigest"),
            |h| h.join(".config").join("aidigest"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        aidigest_home().join("config.toml")
    }

    /// Default directory of the file-backed key-value store.
    pub fn data_dir() -> PathBuf {
        aidigest_home().join("data")
    }
}

/// Resolves an API key with precedence: config > env.
///
/// # Errors
/// Returns an error when neither source provides a non-empty key.
pub fn resolve_api_key(
    config_api_key: Option<&str>,
    env_var: &str,
    config_section: &str,
) -> Result<String> {
    resolve_secret(config_api_key, env_var).with_context(|| {
        format!("No API key available. Set {env_var} or api_key in [{config_section}].")
    })
}

/// Optional secret with precedence: config > env.
pub fn resolve_secret(config_value: Option<&str>, env_var: &str) -> Option<String> {
    if let Some(value) = config_value {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    std::env::var(env_var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolves a base URL with precedence: env > config > default.
///
/// # Errors
/// Returns an error if the chosen URL does not parse.
pub fn resolve_base_url(
    config_base_url: Option<&str>,
    env_var: &str,
    default_url: &str,
    provider_name: &str,
) -> Result<String> {
    let env_url = std::env::var(env_var).ok();
    for candidate in [env_url.as_deref(), config_base_url].into_iter().flatten() {
        let trimmed = candidate.trim();
        if !trimmed.is_empty() {
            validate_url(trimmed, provider_name)?;
            return Ok(trimmed.to_string());
        }
    }
    Ok(default_url.to_string())
}

fn validate_url(url: &str, provider_name: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid {provider_name} base URL: {url}"))?;
    Ok(())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Chat provider section (`[gemini]`, `[openai]`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    /// Optional API key (overrides environment variable).
    pub api_key: Option<String>,
    /// Optional API base URL (for proxies).
    pub base_url: Option<String>,
    /// Model name; the provider default when unset.
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub token: Option<String>,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub branch: String,
    pub api_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            owner: None,
            repo: None,
            branch: github::DEFAULT_BRANCH.to_string(),
            api_url: github::DEFAULT_API_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FoloConfig {
    /// Entries endpoint (POST).
    pub data_api: Option<String>,
    /// Session cookie forwarded with each request.
    pub cookie: Option<String>,
    /// Only entries from the last N days (fetch date included) are kept.
    pub filter_days: u32,
    /// Pause between pages of the same source.
    pub page_delay_ms: u64,
}

impl Default for FoloConfig {
    fn default() -> Self {
        Self {
            data_api: None,
            cookie: None,
            filter_days: 3,
            page_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Folo,
    Projects,
}

fn default_view() -> u8 {
    1
}

fn default_pages() -> u32 {
    3
}

/// One `[[sources]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub category: Category,
    #[serde(default)]
    pub kind: SourceKind,
    #[serde(default)]
    pub feed_id: Option<String>,
    #[serde(default)]
    pub list_id: Option<String>,
    #[serde(default = "default_view")]
    pub view: u8,
    #[serde(default = "default_pages")]
    pub pages: u32,
    /// Endpoint for `projects` sources.
    #[serde(default)]
    pub url: Option<String>,
    /// Translate entry titles of a Folo source when `translate` is on.
    #[serde(default)]
    pub translate_titles: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub title: String,
    pub subtitle: String,
    /// Public site root; prefixed to report links in the RSS feed.
    pub site_link: String,
    /// Prefix inserted before image URLs in rendered reports.
    pub image_proxy: String,
    /// File whose contents replace the built-in report instructions.
    pub prompt_file: Option<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: "AI洞察日报".to_string(),
            subtitle: "每日精选 AI 动态".to_string(),
            site_link: String::new(),
            image_proxy: String::new(),
            prompt_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Key-value store directory; `${AIDIGEST_HOME}/data` when unset.
    pub dir: Option<PathBuf>,
    pub ttl_days: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: None,
            ttl_days: 7,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat platform; anything starting with "open" selects OpenAI.
    pub platform: String,

    /// Upper bound for a chat request until response headers arrive.
    pub request_timeout_secs: u64,

    /// Translate project descriptions while fetching.
    pub translate: bool,

    /// Texts per translation request.
    pub translate_batch_size: usize,

    pub gemini: ProviderConfig,

    pub openai: ProviderConfig,

    pub github: GitHubConfig,

    pub folo: FoloConfig,

    pub sources: Vec<SourceConfig>,

    pub report: ReportConfig,

    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform: "gemini".to_string(),
            request_timeout_secs: 60,
            translate: false,
            translate_batch_size: crate::translate::DEFAULT_BATCH_SIZE,
            gemini: ProviderConfig::default(),
            openai: ProviderConfig::default(),
            github: GitHubConfig::default(),
            folo: FoloConfig::default(),
            sources: Vec::new(),
            report: ReportConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Returns the default config template with comments.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

impl Config {
    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Creates a default config file at the given path.
    /// Returns an error if the file already exists.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            bail!("Config file already exists at {}", path.display());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, default_config_template())
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    pub fn provider(&self) -> Provider {
        Provider::from_platform(&self.platform)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resolves the chat endpoint for the configured platform.
    ///
    /// # Errors
    /// Returns an error when no API key is available or a URL is malformed.
    pub fn chat_config(&self) -> Result<ChatConfig> {
        let provider = self.provider();
        let (section, section_name, key_env, url_env, default_url, default_model) = match provider
        {
            Provider::Gemini => (
                &self.gemini,
                "gemini",
                "GEMINI_API_KEY",
                "GEMINI_API_URL",
                gemini::DEFAULT_BASE_URL,
                gemini::DEFAULT_MODEL,
            ),
            Provider::OpenAI => (
                &self.openai,
                "openai",
                "OPENAI_API_KEY",
                "OPENAI_API_URL",
                openai::DEFAULT_BASE_URL,
                openai::DEFAULT_MODEL,
            ),
        };

        let api_key = resolve_api_key(section.api_key.as_deref(), key_env, section_name)?;
        let base_url = resolve_base_url(
            section.base_url.as_deref(),
            url_env,
            default_url,
            provider.display_name(),
        )?;
        let model = non_empty(section.model.as_deref()).unwrap_or(default_model);

        Ok(ChatConfig::new(provider, base_url, api_key, model).with_timeout(self.request_timeout()))
    }

    /// GitHub settings; missing values stay empty and are rejected by the client.
    pub fn github_settings(&self) -> GitHubSettings {
        let github = &self.github;
        GitHubSettings {
            api_url: non_empty(Some(&github.api_url))
                .unwrap_or(github::DEFAULT_API_URL)
                .to_string(),
            token: resolve_secret(github.token.as_deref(), "GITHUB_TOKEN").unwrap_or_default(),
            owner: non_empty(github.owner.as_deref())
                .unwrap_or_default()
                .to_string(),
            repo: non_empty(github.repo.as_deref()).unwrap_or_default().to_string(),
            branch: non_empty(Some(&github.branch))
                .unwrap_or(github::DEFAULT_BRANCH)
                .to_string(),
        }
    }

    pub fn folo_settings(&self) -> FoloSettings {
        FoloSettings {
            data_api: non_empty(self.folo.data_api.as_deref()).map(str::to_string),
            cookie: resolve_secret(self.folo.cookie.as_deref(), "FOLO_COOKIE"),
            filter_days: self.folo.filter_days,
            page_delay: Duration::from_millis(self.folo.page_delay_ms),
        }
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.storage.dir.clone().unwrap_or_else(paths::data_dir)
    }

    pub fn storage_ttl(&self) -> Duration {
        Duration::from_secs(self.storage.ttl_days.saturating_mul(24 * 60 * 60))
    }

    /// Report instructions: the configured prompt file, else the built-in text.
    pub fn report_prompt(&self) -> Result<String> {
        match non_empty(self.report.prompt_file.as_deref()) {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("Failed to read prompt file {path}")),
            None => Ok(crate::report::DEFAULT_PROMPT.to_string()),
        }
    }

    /// Builds a registry from `[[sources]]`.
    ///
    /// # Errors
    /// Returns an error for entries missing their feed/list id or URL.
    pub fn source_registry(&self) -> Result<SourceRegistry> {
        let mut registry = SourceRegistry::new();
        for source in &self.sources {
            let name = source.name.clone().unwrap_or_else(|| source.id.clone());
            match source.kind {
                SourceKind::Folo => {
                    let target = match (
                        non_empty(source.feed_id.as_deref()),
                        non_empty(source.list_id.as_deref()),
                    ) {
                        (Some(feed), None) => FoloTarget::Feed(feed.to_string()),
                        (None, Some(list)) => FoloTarget::List(list.to_string()),
                        _ => bail!(
                            "Source '{}' must set exactly one of feed_id or list_id",
                            source.id
                        ),
                    };
                    registry.register(Box::new(
                        FoloSource::new(&source.id, name, source.category, target)
                            .with_view(source.view)
                            .with_pages(source.pages)
                            .with_title_translation(source.translate_titles),
                    ));
                }
                SourceKind::Projects => {
                    let url = non_empty(source.url.as_deref())
                        .with_context(|| format!("Source '{}' needs a url", source.id))?;
                    validate_url(url, &name)?;
                    if source.category != Category::Project {
                        bail!("Source '{}' of kind projects must use category project", source.id);
                    }
                    registry.register(Box::new(ProjectsSource::new(&source.id, url)));
                }
            }
        }
        Ok(registry)
    }
}
