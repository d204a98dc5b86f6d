use std::path::{Path, PathBuf};

use color_eyre::Result;
use color_eyre::eyre::{Context, OptionExt, ensure};
use serde::{Deserialize, Serialize};

use crate::services::collector::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_WORKERS, PoolOptions};
use crate::services::fetcher::{DEFAULT_PAGE_SIZE, FetchOptions, RetryPolicy};
use crate::spotify_rs::auth::SpotifyApiCredentials;

pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/callback";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Spotify application client id, falls back to `SPOTIFY_CLIENT_ID`
    pub client_id: Option<String>,
    /// Spotify application client secret, falls back to `SPOTIFY_CLIENT_SECRET`
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub workers: u32,
    pub page_size: u32,
    pub channel_capacity: usize,
    pub max_retries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            workers: DEFAULT_WORKERS,
            page_size: DEFAULT_PAGE_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_retries: RetryPolicy::default().max_retries,
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("liked-gaps").join("config.toml"))
    }

    /// Load the default config file, or defaults when there is none
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Write the default config to `path` unless a file already exists there
    pub fn create_default_at(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents =
            toml::to_string_pretty(&Self::default()).wrap_err("Failed to serialize config")?;
        std::fs::write(path, contents)
            .wrap_err_with(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(true)
    }

    pub fn create_default() -> Result<PathBuf> {
        let path = Self::config_path().ok_or_eyre("No config directory on this platform")?;
        if !Self::create_default_at(&path)? {
            tracing::info!("Config file already exists at {}", path.display());
        }
        Ok(path)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.workers > 0, "workers must be at least 1");
        ensure!(
            (1..=DEFAULT_PAGE_SIZE).contains(&self.page_size),
            "page_size must be between 1 and {}, got {}",
            DEFAULT_PAGE_SIZE,
            self.page_size
        );
        ensure!(self.channel_capacity > 0, "channel_capacity must be at least 1");
        Ok(())
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            workers: self.workers,
            channel_capacity: self.channel_capacity,
            fetch: FetchOptions {
                page_size: self.page_size,
                retry: RetryPolicy {
                    max_retries: self.max_retries,
                    ..RetryPolicy::default()
                },
            },
        }
    }

    /// Spotify credentials, with environment variables filling in missing values
    pub fn credentials(&self) -> Result<SpotifyApiCredentials> {
        self.credentials_with(|key| std::env::var(key).ok())
    }

    fn credentials_with(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<SpotifyApiCredentials> {
        let client_id = self
            .client_id
            .clone()
            .or_else(|| env("SPOTIFY_CLIENT_ID"))
            .filter(|id| !id.is_empty())
            .ok_or_eyre("Spotify client id missing, set client_id or SPOTIFY_CLIENT_ID")?;
        let client_secret = self
            .client_secret
            .clone()
            .or_else(|| env("SPOTIFY_CLIENT_SECRET"))
            .filter(|secret| !secret.is_empty());

        Ok(SpotifyApiCredentials {
            client_id,
            client_secret,
            redirect_uri: self.redirect_uri.clone(),
        })
    }
}
