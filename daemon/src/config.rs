//! Daemon configuration
//!
//! Read from `~/.restomod/config.toml`. Each endpoint setting resolves in
//! this order:
//! 1. Config file value (if set)
//! 2. Environment variable
//! 3. Built-in default (research only; image generation stays disabled)

use std::path::Path;
use std::time::Duration;

use restomod_core::ImageStyle;
use serde::Deserialize;
use tracing::{debug, warn};

const DEFAULT_RESEARCH_ENDPOINT: &str = "http://127.0.0.1:5000/api/research";
const DEFAULT_RESEARCH_TIMEOUT_SECS: u64 = 15;
const DEFAULT_IMAGE_TIMEOUT_SECS: u64 = 30;

pub const RESEARCH_URL_ENV: &str = "RESTOMOD_RESEARCH_URL";
pub const RESEARCH_API_KEY_ENV: &str = "RESTOMOD_RESEARCH_API_KEY";
pub const IMAGE_URL_ENV: &str = "RESTOMOD_IMAGE_URL";

/// Research endpoint settings
#[derive(Debug, Clone, Deserialize)]
pub struct ResearchConfig {
    /// Endpoint override (optional)
    pub endpoint: Option<String>,
    /// Bearer token for the endpoint (optional)
    pub api_key: Option<String>,
    /// Request timeout (default: 15s)
    #[serde(default = "default_research_timeout")]
    pub timeout_secs: u64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_secs: default_research_timeout(),
        }
    }
}

impl ResearchConfig {
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_RESEARCH_ENDPOINT)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Image generation settings
#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    /// Generation endpoint; generation is disabled without one
    pub endpoint: Option<String>,
    #[serde(default = "default_image_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub default_style: ImageStyle,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_image_timeout(),
            default_style: ImageStyle::default(),
        }
    }
}

impl ImageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_research_timeout() -> u64 {
    DEFAULT_RESEARCH_TIMEOUT_SECS
}

fn default_image_timeout() -> u64 {
    DEFAULT_IMAGE_TIMEOUT_SECS
}

/// Complete daemon configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub research: ResearchConfig,
    #[serde(default)]
    pub images: ImageConfig,
}

impl DaemonConfig {
    /// Load `config.toml` from `home` and fill gaps from the environment.
    ///
    /// A missing or unparsable file falls back to defaults.
    pub fn load(home: &Path) -> Self {
        let mut config = Self::load_file(home).unwrap_or_default();
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    fn load_file(home: &Path) -> Option<Self> {
        let config_file = home.join("config.toml");
        if !config_file.exists() {
            return None;
        }

        let content = std::fs::read_to_string(&config_file).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Ignoring invalid {:?}: {}", config_file, e);
                None
            }
        }
    }

    /// Fill unset endpoint values from environment lookups.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if self.research.endpoint.is_none() {
            if let Some(url) = var(RESEARCH_URL_ENV) {
                debug!("Using research endpoint from {}", RESEARCH_URL_ENV);
                self.research.endpoint = Some(url);
            }
        }

        let has_key = self
            .research
            .api_key
            .as_deref()
            .is_some_and(|k| !k.is_empty());
        if has_key {
            debug!("Using research API key from config file");
        } else if let Some(key) = var(RESEARCH_API_KEY_ENV) {
            debug!("Using research API key from {}", RESEARCH_API_KEY_ENV);
            self.research.api_key = Some(key);
        }

        if self.images.endpoint.is_none() {
            self.images.endpoint = var(IMAGE_URL_ENV);
        }
    }
}
