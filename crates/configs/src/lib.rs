//! # configs
//!
//! Layered settings: compiled defaults, then `config/default.toml`, then
//! `config/{FITSOCIAL_ENV}.toml`, then `FITSOCIAL__*` environment variables.
//! A `.env` file is loaded into the environment first.

use std::path::Path;

use chrono::FixedOffset;
use config::{Config, ConfigError, Environment, File, Map};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use domains::dto::TextLimits;

const ENV_PREFIX: &str = "FITSOCIAL";
const MAX_OFFSET_MINUTES: i32 = 14 * 60;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] ConfigError),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogSettings {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedSettings {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreakSettings {
    /// Offset from UTC that decides which calendar day a completion
    /// belongs to.
    pub utc_offset_minutes: i32,
}

impl StreakSettings {
    pub fn day_offset(&self) -> Result<FixedOffset, SettingsError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            SettingsError::Invalid(format!(
                "streak.utc_offset_minutes {} is out of range",
                self.utc_offset_minutes
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContentSettings {
    pub max_caption_len: usize,
    pub max_comment_len: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub log: LogSettings,
    pub feed: FeedSettings,
    pub streak: StreakSettings,
    pub content: ContentSettings,
}

impl Settings {
    /// Loads `.env`, then the layered sources rooted at `./config`.
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self::load_from(Path::new("config"), None)
    }

    /// Loads from `dir`. When `env` is given it replaces the process
    /// environment as the source of `FITSOCIAL__*` overrides.
    pub fn load_from(dir: &Path, env: Option<Map<String, String>>) -> Result<Self, SettingsError> {
        let profile = match &env {
            Some(vars) => vars.get("FITSOCIAL_ENV").cloned(),
            None => std::env::var("FITSOCIAL_ENV").ok(),
        };

        let mut builder = Config::builder()
            .set_default("log.level", "info")?
            .set_default("log.format", "pretty")?
            .set_default("feed.default_page_size", 20_i64)?
            .set_default("feed.max_page_size", 100_i64)?
            .set_default("streak.utc_offset_minutes", 0_i64)?
            .set_default("content.max_caption_len", 500_i64)?
            .set_default("content.max_comment_len", 500_i64)?
            .add_source(File::from(dir.join("default")).required(false));

        if let Some(profile) = profile {
            builder = builder.add_source(File::from(dir.join(profile)).required(false));
        }

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let feed = &self.feed;
        if feed.default_page_size == 0 || feed.max_page_size == 0 {
            return Err(SettingsError::Invalid("page sizes must be at least 1".into()));
        }
        if feed.default_page_size > feed.max_page_size {
            return Err(SettingsError::Invalid(format!(
                "feed.default_page_size {} exceeds feed.max_page_size {}",
                feed.default_page_size, feed.max_page_size
            )));
        }
        if self.streak.utc_offset_minutes.abs() > MAX_OFFSET_MINUTES {
            return Err(SettingsError::Invalid(format!(
                "streak.utc_offset_minutes must be within ±{MAX_OFFSET_MINUTES}"
            )));
        }
        if self.content.max_caption_len == 0 || self.content.max_comment_len == 0 {
            return Err(SettingsError::Invalid("text limits must be at least 1".into()));
        }
        Ok(())
    }

    pub fn text_limits(&self) -> TextLimits {
        TextLimits {
            max_caption_len: self.content.max_caption_len,
            max_comment_len: self.content.max_comment_len,
        }
    }
}
