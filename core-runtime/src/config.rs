//! # Core Configuration Module
//!
//! Builder-based configuration for the enrichment core.
//!
//! ## Overview
//!
//! [`CoreConfigBuilder`] collects the library root, the cache root, tuning
//! knobs for the enrichment pipeline and the bridge implementations the core
//! runs on. [`build()`](CoreConfigBuilder::build) fills in desktop defaults
//! when the `desktop-shims` feature is enabled and fails fast with an
//! actionable error otherwise.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .music_root("/music")
//!     .cache_dir("/app/cache")
//!     .enrichment_cooldown(Duration::from_secs(3600))
//!     .max_workers(2)
//!     .build()?;
//! ```
//!
//! ### From the environment
//!
//! ```ignore
//! let config = CoreConfigBuilder::from_env()?.build()?;
//! ```
//!
//! | Variable | Default |
//! |----------|---------|
//! | `MUSIC_DIR` | `/music` |
//! | `CACHE_DIR` | `/app/cache` |
//! | `LYRICS_API_BASE` | `https://api.lrc.cx` |
//! | `ENRICH_COOLDOWN_SECS` | `21600` |
//! | `ENRICH_WORKERS` | `4` |

use crate::error::{Error, Result};
use bridge_traits::{Clock, FileSystemAccess, HttpClient, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MUSIC_ROOT: &str = "/music";
pub const DEFAULT_CACHE_DIR: &str = "/app/cache";
pub const DEFAULT_REMOTE_BASE_URL: &str = "https://api.lrc.cx";

/// Extensions the scanner treats as audio, compared case-insensitively.
pub const DEFAULT_AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a"];

/// Core configuration.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Root of the music library tree
    pub music_root: PathBuf,

    /// Root of the enrichment cache (`lyrics/` and `covers/` live below it)
    pub cache_dir: PathBuf,

    /// Lowercase extensions (without dot) accepted by the scanner
    pub audio_extensions: Vec<String>,

    pub http_client: Arc<dyn HttpClient>,
    pub file_system: Arc<dyn FileSystemAccess>,
    pub clock: Arc<dyn Clock>,

    pub enrichment: EnrichmentSettings,
    pub remote_api: RemoteApiConfig,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("music_root", &self.music_root)
            .field("cache_dir", &self.cache_dir)
            .field("audio_extensions", &self.audio_extensions)
            .field("http_client", &"HttpClient { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field("clock", &"Clock { ... }")
            .field("enrichment", &self.enrichment)
            .field("remote_api", &self.remote_api)
            .finish()
    }
}

/// Tuning for the enrichment coordinator and its worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentSettings {
    /// How long an "unavailable" outcome suppresses new remote attempts
    pub cooldown: Duration,
    /// Maximum concurrent remote fetches
    pub max_workers: usize,
    /// Pending fetch tasks beyond this are dropped
    pub queue_capacity: usize,
    /// Upper bound on one background fetch, whatever the provider does
    pub task_timeout: Duration,
    /// Time granted to running fetches on shutdown before they are cancelled
    pub shutdown_grace: Duration,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(6 * 60 * 60),
            max_workers: 4,
            queue_capacity: 256,
            task_timeout: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl EnrichmentSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::Config(
                "Enrichment worker count must be greater than 0".to_string(),
            ));
        }
        if self.max_workers > 64 {
            return Err(Error::Config(
                "Enrichment worker count exceeds maximum of 64".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config(
                "Enrichment queue capacity must be greater than 0".to_string(),
            ));
        }
        if self.task_timeout.is_zero() {
            return Err(Error::Config(
                "Enrichment task timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Remote lyrics/cover API settings.
///
/// # Example
///
/// ```no_run
/// use core_runtime::config::RemoteApiConfig;
/// use std::time::Duration;
///
/// let config = RemoteApiConfig::new()
///     .with_base_url("https://api.lrc.cx")
///     .with_request_timeout(Duration::from_secs(5))
///     .with_rate_limit_delay_ms(1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteApiConfig {
    /// Base URL; `/lyrics` and `/cover` are appended
    pub base_url: String,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Minimum delay between consecutive requests. `0` disables the limiter.
    pub rate_limit_delay_ms: u64,

    /// Overrides the HTTP client's default user agent
    pub user_agent: Option<String>,
}

impl Default for RemoteApiConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteApiConfig {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_REMOTE_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            rate_limit_delay_ms: 1000,
            user_agent: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_rate_limit_delay_ms(mut self, delay_ms: u64) -> Self {
        self.rate_limit_delay_ms = delay_ms;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "Remote API base URL must be http(s): {}",
                self.base_url
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Remote request timeout must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit_delay_ms > 60_000 {
            return Err(Error::Config(
                "Rate limit delay exceeds maximum of 60 seconds (60,000ms)".to_string(),
            ));
        }

        if matches!(self.user_agent.as_deref(), Some("")) {
            return Err(Error::Config("User agent cannot be empty".to_string()));
        }

        Ok(())
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Checks paths and nested settings.
    pub fn validate(&self) -> Result<()> {
        if self.music_root.as_os_str().is_empty() {
            return Err(Error::Config("Music root cannot be empty".to_string()));
        }

        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("Cache directory cannot be empty".to_string()));
        }

        if self.audio_extensions.is_empty() {
            return Err(Error::Config(
                "At least one audio extension is required".to_string(),
            ));
        }

        self.enrichment.validate()?;
        self.remote_api.validate()?;
        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "No {} implementation provided. \
             Desktop: enable the 'desktop-shims' feature. \
             Other hosts: inject an adapter through CoreConfig::builder().",
            capability
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(remote_api: &RemoteApiConfig) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(remote_api.request_timeout)
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_remote_api: &RemoteApiConfig) -> Result<Arc<dyn HttpClient>> {
    Err(capability_missing("HttpClient"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Ok(Arc::new(bridge_desktop::TokioFileSystem::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Err(capability_missing("FileSystemAccess"))
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    music_root: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    audio_extensions: Option<Vec<String>>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    clock: Option<Arc<dyn Clock>>,
    enrichment: EnrichmentSettings,
    remote_api: RemoteApiConfig,
}

impl CoreConfigBuilder {
    /// Seed a builder from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Seed a builder from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::default()
            .music_root(lookup("MUSIC_DIR").unwrap_or_else(|| DEFAULT_MUSIC_ROOT.to_string()))
            .cache_dir(lookup("CACHE_DIR").unwrap_or_else(|| DEFAULT_CACHE_DIR.to_string()));

        if let Some(base_url) = lookup("LYRICS_API_BASE") {
            builder.remote_api.base_url = base_url;
        }

        if let Some(raw) = lookup("ENRICH_COOLDOWN_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|e| {
                Error::Config(format!("ENRICH_COOLDOWN_SECS must be an integer: {}", e))
            })?;
            builder.enrichment.cooldown = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup("ENRICH_WORKERS") {
            builder.enrichment.max_workers = raw.trim().parse::<usize>().map_err(|e| {
                Error::Config(format!("ENRICH_WORKERS must be an integer: {}", e))
            })?;
        }

        Ok(builder)
    }

    pub fn music_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.music_root = Some(path.into());
        self
    }

    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    /// Replace the audio extension allowlist. Leading dots are stripped.
    pub fn audio_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.audio_extensions = Some(
            extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
        );
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// Falls back to `ReqwestHttpClient` with `desktop-shims`.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the file system implementation.
    ///
    /// Falls back to `TokioFileSystem` with `desktop-shims`.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Sets the time source. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn enrichment(mut self, settings: EnrichmentSettings) -> Self {
        self.enrichment = settings;
        self
    }

    pub fn enrichment_cooldown(mut self, cooldown: Duration) -> Self {
        self.enrichment.cooldown = cooldown;
        self
    }

    pub fn max_workers(mut self, workers: usize) -> Self {
        self.enrichment.max_workers = workers;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.enrichment.queue_capacity = capacity;
        self
    }

    pub fn remote_api(mut self, config: RemoteApiConfig) -> Self {
        self.remote_api = config;
        self
    }

    /// Builds the final `CoreConfig`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when a path is missing or a setting is out of range
    /// - [`Error::CapabilityMissing`] when a bridge is absent and no desktop
    ///   default is compiled in
    pub fn build(self) -> Result<CoreConfig> {
        let music_root = self.music_root.ok_or_else(|| {
            Error::Config("Music root is required. Use .music_root() to set it.".to_string())
        })?;

        let cache_dir = self.cache_dir.ok_or_else(|| {
            Error::Config("Cache directory is required. Use .cache_dir() to set it.".to_string())
        })?;

        // Range-check before constructing default bridges from these values.
        self.remote_api.validate()?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(&self.remote_api)?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };

        let config = CoreConfig {
            music_root,
            cache_dir,
            audio_extensions: self.audio_extensions.unwrap_or_else(|| {
                DEFAULT_AUDIO_EXTENSIONS
                    .iter()
                    .map(|ext| ext.to_string())
                    .collect()
            }),
            http_client,
            file_system,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            enrichment: self.enrichment,
            remote_api: self.remote_api,
        };

        config.validate()?;

        Ok(config)
    }
}
