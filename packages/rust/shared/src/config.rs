//! Application configuration for enquete.
//!
//! User config lives at `~/.enquete/enquete.toml`. Environment variables
//! override config file values, CLI flags override both. The resolved
//! [`AppConfig`] is built once at startup and each component receives the
//! section it needs.

use std::path::{Path, PathBuf};

use chrono::Weekday;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{EnqueteError, Result};
use crate::types::DEFAULT_QUESTION_CHARS;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "enquete.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".enquete";

// ---------------------------------------------------------------------------
// Config structs (matching enquete.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default log filter when neither `RUST_LOG` nor `-v` is given.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// News portal to scrape.
    #[serde(default)]
    pub portal: PortalConfig,

    /// Gemini question generation.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Question length budget.
    #[serde(default)]
    pub rewrite: RewriteConfig,

    /// Downstream consumer endpoint.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Weekly trigger.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Local database.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            portal: PortalConfig::default(),
            gemini: GeminiConfig::default(),
            rewrite: RewriteConfig::default(),
            dispatch: DispatchConfig::default(),
            schedule: ScheduleConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

/// Which layout the portal uses. Picked once, when the fetcher is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortalKind {
    /// Câmara Municipal do Recife (`article.news-item`).
    Camara,
    /// Prefeitura do Recife (`.box-last-news`).
    Prefeitura,
    /// Any list page, blocks matched by `list_selector`.
    Generic,
    /// An RSS or Atom feed (`<item>` title and link).
    Rss,
}

/// `[portal]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Listing page URL; relative article links are resolved against it.
    #[serde(default = "default_portal_url")]
    pub url: String,

    /// Layout adapter: camara, prefeitura, generic or rss.
    #[serde(default = "default_portal_kind")]
    pub adapter: PortalKind,

    /// Block selector for the `generic` adapter.
    #[serde(default = "default_list_selector")]
    pub list_selector: String,

    /// HTTP timeout in seconds.
    #[serde(default = "default_portal_timeout")]
    pub timeout_secs: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            url: default_portal_url(),
            adapter: default_portal_kind(),
            list_selector: default_list_selector(),
            timeout_secs: default_portal_timeout(),
        }
    }
}

fn default_portal_url() -> String {
    "https://www.recife.pe.leg.br/comunicacao/noticias".into()
}
fn default_portal_kind() -> PortalKind {
    PortalKind::Camara
}
fn default_list_selector() -> String {
    ".article".into()
}
fn default_portal_timeout() -> u64 {
    10
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// API base, without the `/models/...` suffix.
    #[serde(default = "default_gemini_endpoint")]
    pub endpoint: String,

    /// Model id.
    #[serde(default = "default_gemini_model")]
    pub model: String,

    /// HTTP timeout in seconds.
    #[serde(default = "default_gemini_timeout")]
    pub timeout_secs: u64,

    /// `generationConfig.maxOutputTokens`.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// `generationConfig.temperature`.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            endpoint: default_gemini_endpoint(),
            model: default_gemini_model(),
            timeout_secs: default_gemini_timeout(),
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl GeminiConfig {
    /// Resolve the API key through `lookup` (normally `std::env::var`).
    /// Empty values count as missing.
    pub fn api_key(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        lookup(&self.api_key_env).filter(|k| !k.trim().is_empty())
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_gemini_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_gemini_model() -> String {
    "gemini-1.5-flash".into()
}
fn default_gemini_timeout() -> u64 {
    20
}
fn default_max_output_tokens() -> u32 {
    60
}
fn default_temperature() -> f32 {
    0.7
}

/// `[rewrite]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteConfig {
    /// Hard ceiling on the question length, spaces included.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    DEFAULT_QUESTION_CHARS
}

/// `[dispatch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Consumer endpoint. Unset means every dispatch is recorded as an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// HTTP timeout in seconds.
    #[serde(default = "default_dispatch_timeout")]
    pub timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_dispatch_timeout(),
        }
    }
}

fn default_dispatch_timeout() -> u64 {
    10
}

/// `[schedule]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Day of week (`mon`, `tuesday`, ...).
    #[serde(default = "default_weekday")]
    pub weekday: String,

    /// Local hour, 0-23.
    #[serde(default = "default_hour")]
    pub hour: u32,

    /// Local minute, 0-59.
    #[serde(default)]
    pub minute: u32,

    /// IANA timezone name.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            weekday: default_weekday(),
            hour: default_hour(),
            minute: 0,
            timezone: default_timezone(),
        }
    }
}

impl ScheduleConfig {
    /// Parsed day of week.
    pub fn weekday(&self) -> Result<Weekday> {
        self.weekday
            .trim()
            .parse::<Weekday>()
            .map_err(|_| EnqueteError::config(format!("invalid weekday `{}`", self.weekday)))
    }

    /// Parsed IANA timezone.
    pub fn timezone(&self) -> Result<Tz> {
        self.timezone.trim().parse::<Tz>().map_err(|e| {
            EnqueteError::config(format!("invalid timezone `{}`: {e}", self.timezone))
        })
    }
}

fn default_weekday() -> String {
    "mon".into()
}
fn default_hour() -> u32 {
    9
}
fn default_timezone() -> String {
    "America/Sao_Paulo".into()
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file; a leading `~/` is expanded to the home directory.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl StorageConfig {
    /// Database path with `~/` expanded.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        match self.database_path.strip_prefix("~/") {
            Some(rest) => {
                let home = dirs::home_dir()
                    .ok_or_else(|| EnqueteError::config("could not determine home directory"))?;
                Ok(home.join(rest))
            }
            None => Ok(PathBuf::from(&self.database_path)),
        }
    }
}

fn default_database_path() -> String {
    format!("~/{CONFIG_DIR_NAME}/enquete.db")
}

// ---------------------------------------------------------------------------
// Environment overrides and validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Overlay values from the environment. `lookup` is `std::env::var` in
    /// production and a map in tests.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("NEWS_PORTAL_URL") {
            self.portal.url = url;
        }
        if let Some(url) = get("EXTERNAL_API_URL") {
            self.dispatch.url = Some(url);
        }
        if let Some(tz) = get("SCHEDULER_TIMEZONE") {
            self.schedule.timezone = tz;
        }
        if let Some(path) = get("DATABASE_PATH") {
            self.storage.database_path = path;
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.log_level = level.to_lowercase();
        }
    }

    /// Reject values that would only fail later, deep inside a run.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.portal.url).map_err(|e| {
            EnqueteError::config(format!("invalid portal url `{}`: {e}", self.portal.url))
        })?;

        if let Some(url) = &self.dispatch.url {
            Url::parse(url)
                .map_err(|e| EnqueteError::config(format!("invalid dispatch url `{url}`: {e}")))?;
        }

        if self.rewrite.max_chars == 0 {
            return Err(EnqueteError::config("rewrite.max_chars must be at least 1"));
        }

        self.schedule.weekday()?;
        self.schedule.timezone()?;
        if self.schedule.hour > 23 || self.schedule.minute > 59 {
            return Err(EnqueteError::config(format!(
                "invalid schedule time {:02}:{:02}",
                self.schedule.hour, self.schedule.minute
            )));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.enquete/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| EnqueteError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.enquete/enquete.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| EnqueteError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| EnqueteError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| EnqueteError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| EnqueteError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| EnqueteError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
