use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::foundation::error::{StickerError, StickerResult};
use crate::foundation::retry::RetryPolicy;

/// Mirror serving the upstream sticker art and `src/characters.json`.
pub const DEFAULT_ASSET_PREFIX: &str =
    "https://raw.githubusercontent.com/TheOriginalAyaka/sekai-stickers/main/";

/// Repository serving the caption font under `fonts/`.
pub const DEFAULT_REPO_PREFIX: &str =
    "https://raw.githubusercontent.com/Agnes4m/nonebot_plugin_pjsk/main/";

/// Caption font fetched into `fonts/` when no `font_path` is configured.
pub const DEFAULT_FONT_FILE: &str = "YurukaFangTang.ttf";

const PROXY_ENV_VARS: [&str; 6] = [
    "HTTPS_PROXY",
    "https_proxy",
    "HTTP_PROXY",
    "http_proxy",
    "ALL_PROXY",
    "all_proxy",
];

/// Engine configuration, read once at startup.
///
/// Every field has a default so a partial JSON file (or none at all) is valid input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Attempts per remote fetch, >= 1.
    pub retry_count: u32,
    /// Timeout of a single fetch attempt, in seconds.
    pub fetch_timeout_seconds: f64,
    /// When `false`, every request is rendered.
    pub cache_enabled: bool,
    /// Purge persisted render cache entries before first use.
    pub clear_cache_on_start: bool,

    /// Root of `resource/`, `cache/`, `fonts/` and `characters.json`.
    pub data_dir: PathBuf,
    /// Fixed manifest file. When unset the manifest is refreshed from the mirrors into
    /// `data_dir/characters.json`.
    pub manifest: Option<PathBuf>,
    /// Remote mirrors, tried in order.
    pub asset_prefixes: Vec<String>,
    /// Explicit HTTP proxy. Falls back to the usual proxy environment variables.
    pub proxy: Option<String>,

    /// Deadline for one sandbox render call, in seconds.
    pub render_timeout_seconds: f64,
    /// Sandbox render attempts before giving up, >= 1.
    pub render_attempts: u32,
    /// Number of long-lived sandbox sessions. `1` serializes rendering.
    pub sandbox_pool_size: usize,
    /// Font file used for captions instead of the provisioned one.
    pub font_path: Option<PathBuf>,
    /// File name of the provisioned caption font, fetched from `repo_prefixes` into `fonts/`.
    pub font_file: String,
    /// Mirrors of the font repository, tried in order. Empty disables font provisioning.
    pub repo_prefixes: Vec<String>,
    /// Font family requested by the layout when no caption font could be loaded.
    pub font_family: String,
    /// Load the platform's installed fonts into every sandbox session.
    pub system_fonts: bool,
    /// Parallel downloads during asset prefetch.
    pub prefetch_workers: usize,

    /// Maximum caption length in characters.
    pub max_text_chars: usize,
    /// Largest accepted font size.
    pub max_font_size_px: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_count: 1,
            fetch_timeout_seconds: 10.0,
            cache_enabled: true,
            clear_cache_on_start: false,
            data_dir: PathBuf::from("data/stickers"),
            manifest: None,
            asset_prefixes: vec![DEFAULT_ASSET_PREFIX.to_owned()],
            proxy: None,
            render_timeout_seconds: 10.0,
            render_attempts: 2,
            sandbox_pool_size: 1,
            font_path: None,
            font_file: DEFAULT_FONT_FILE.to_owned(),
            repo_prefixes: vec![DEFAULT_REPO_PREFIX.to_owned()],
            font_family: "YurukaStd".to_owned(),
            system_fonts: true,
            prefetch_workers: 10,
            max_text_chars: 100,
            max_font_size_px: 200,
        }
    }
}

impl EngineConfig {
    /// Read and validate a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> StickerResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_reader(BufReader::new(f))
            .map_err(|e| StickerError::config(format!("parse '{}': {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check value ranges.
    pub fn validate(&self) -> StickerResult<()> {
        if self.retry_count == 0 {
            return Err(StickerError::config("retry_count must be >= 1"));
        }
        self.fetch_timeout()?;
        self.render_timeout()?;
        if self.render_attempts == 0 {
            return Err(StickerError::config("render_attempts must be >= 1"));
        }
        if self.sandbox_pool_size == 0 {
            return Err(StickerError::config("sandbox_pool_size must be >= 1"));
        }
        if self.prefetch_workers == 0 {
            return Err(StickerError::config("prefetch_workers must be >= 1"));
        }
        if self.max_text_chars == 0 {
            return Err(StickerError::config("max_text_chars must be >= 1"));
        }
        if self.max_font_size_px == 0 {
            return Err(StickerError::config("max_font_size_px must be >= 1"));
        }
        if self.font_file.trim().is_empty() {
            return Err(StickerError::config("font_file must not be empty"));
        }
        for p in self.asset_prefixes.iter().chain(&self.repo_prefixes) {
            if !(p.starts_with("http://") || p.starts_with("https://") || p.starts_with("file://"))
            {
                return Err(StickerError::config(format!(
                    "asset prefix '{p}' must be an http(s):// or file:// URL"
                )));
            }
        }
        Ok(())
    }

    /// Retry policy for remote fetches.
    pub fn fetch_policy(&self) -> StickerResult<RetryPolicy> {
        RetryPolicy::new(
            self.retry_count,
            self.fetch_timeout()?,
        )
    }

    /// Retry policy for sandbox renders.
    pub fn render_policy(&self) -> StickerResult<RetryPolicy> {
        RetryPolicy::new(
            self.render_attempts,
            self.render_timeout()?,
        )
    }

    /// Timeout of a single fetch attempt.
    pub fn fetch_timeout(&self) -> StickerResult<Duration> {
        seconds("fetch_timeout_seconds", self.fetch_timeout_seconds)
    }

    /// Deadline of a single sandbox render call.
    pub fn render_timeout(&self) -> StickerResult<Duration> {
        seconds("render_timeout_seconds", self.render_timeout_seconds)
    }

    /// Proxy to use for remote fetches, if any.
    pub fn effective_proxy(&self) -> Option<String> {
        self.proxy.clone().or_else(|| {
            PROXY_ENV_VARS
                .iter()
                .filter_map(|v| std::env::var(v).ok())
                .find(|v| !v.is_empty())
        })
    }

    /// Local mirror of template images.
    pub fn resource_dir(&self) -> PathBuf {
        self.data_dir.join("resource")
    }

    /// Persisted render cache directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    /// Local copy of the catalogue manifest.
    pub fn manifest_path(&self) -> PathBuf {
        self.manifest
            .clone()
            .unwrap_or_else(|| self.data_dir.join("characters.json"))
    }

    /// Bundled font directory.
    pub fn fonts_dir(&self) -> PathBuf {
        self.data_dir.join("fonts")
    }
}

// Positive, and representable as a non-zero `Duration`.
fn seconds(field: &str, value: f64) -> StickerResult<Duration> {
    match Duration::try_from_secs_f64(value) {
        Ok(d) if !d.is_zero() => Ok(d),
        _ => Err(StickerError::config(format!(
            "{field} must be a positive number of seconds, got {value}"
        ))),
    }
}
