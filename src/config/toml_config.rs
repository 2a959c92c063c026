//! TOML Configuration with Environment Variable Overrides
//!
//! Settings are read from `$CONFIG_DIR/nameplate-ai/config.toml` (or an
//! explicit path), then environment variables are applied on top:
//! - `NAMEPLATE_MIN_CONFIDENCE`
//! - `NAMEPLATE_REQUEST_TIMEOUT_SECS`
//! - `NAMEPLATE_TEXT_DEADLINE_SECS`
//! - `NAMEPLATE_VISION_DEADLINE_SECS`
//!
//! Backend credentials come from the usual `*_API_KEY` variables, with the
//! `[credentials]` table as a fallback. A missing credential only makes that
//! backend unavailable; it never fails start-up.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ai::catalog::{BackendKind, CapabilityTier, Catalog, CatalogError, ProviderDescriptor};
use crate::core::utils::non_blank;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid provider catalog: {0}")]
    Catalog(#[from] CatalogError),
    #[error("Invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    /// Fallback credentials, keyed by backend name
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
    /// Base-URL overrides for proxies and tests, keyed by backend name
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    #[serde(default)]
    pub catalog: CatalogOverrides,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_text_deadline_secs")]
    pub text_deadline_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    60
}
fn default_text_deadline_secs() -> u64 {
    120
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
            text_deadline_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_vision_deadline_secs")]
    pub deadline_secs: u64,
    #[serde(default = "default_vision_max_tokens")]
    pub max_tokens: u32,
}

fn default_min_confidence() -> f64 {
    0.7
}
fn default_vision_deadline_secs() -> u64 {
    90
}
fn default_vision_max_tokens() -> u32 {
    1024
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            deadline_secs: 90,
            max_tokens: 1024,
        }
    }
}

/// Replacement cost tables; anything left out keeps its default
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CatalogOverrides {
    #[serde(default)]
    pub vision: Option<Vec<ProviderDescriptor>>,
    /// Keyed by tier name
    #[serde(default)]
    pub tiers: BTreeMap<String, Vec<ProviderDescriptor>>,
}

pub fn get_config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("nameplate-ai");
    path.push("config.toml");
    path
}

/// Table lookup tolerant of backend aliases ("claude", "google") and case
fn lookup_backend(table: &BTreeMap<String, String>, kind: BackendKind) -> Option<String> {
    table
        .iter()
        .find(|(name, _)| BackendKind::from_str(name) == Some(kind))
        .map(|(_, value)| value.clone())
}

impl Settings {
    /// Load from the default location; a missing file yields defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&get_config_path())
    }

    /// Load from `path` and apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let settings = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let settings =
                toml::from_str::<Settings>(&contents).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            tracing::info!("Loaded config from {:?}", path);
            settings
        } else {
            tracing::debug!("No config at {:?}, using defaults", path);
            Settings::default()
        };

        let settings = settings.with_env_overrides(|name| std::env::var(name).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `NAMEPLATE_*` overrides read through `lookup`. Unparsable values are ignored.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("NAMEPLATE_MIN_CONFIDENCE") {
            match value.trim().parse::<f64>() {
                Ok(v) => self.vision.min_confidence = v,
                Err(_) => tracing::warn!("Ignoring NAMEPLATE_MIN_CONFIDENCE={}", value),
            }
        }

        let secs = |name: &str| -> Option<u64> {
            let value = lookup(name)?;
            let parsed = value.trim().parse::<u64>().ok();
            if parsed.is_none() {
                tracing::warn!("Ignoring {}={}", name, value);
            }
            parsed
        };

        if let Some(v) = secs("NAMEPLATE_REQUEST_TIMEOUT_SECS") {
            self.routing.request_timeout_secs = v;
        }
        if let Some(v) = secs("NAMEPLATE_TEXT_DEADLINE_SECS") {
            self.routing.text_deadline_secs = v;
        }
        if let Some(v) = secs("NAMEPLATE_VISION_DEADLINE_SECS") {
            self.vision.deadline_secs = v;
        }

        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.vision.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "min_confidence must be within [0, 1], got {}",
                self.vision.min_confidence
            )));
        }
        if self.routing.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        for name in self.credentials.keys().chain(self.endpoints.keys()) {
            if BackendKind::from_str(name).is_none() {
                return Err(ConfigError::Invalid(format!("unknown backend '{}'", name)));
            }
        }
        self.catalog()?;
        Ok(())
    }

    /// Default catalog with the configured replacements applied and validated
    pub fn catalog(&self) -> Result<Catalog, CatalogError> {
        let mut catalog = Catalog::default();
        if let Some(vision) = &self.catalog.vision {
            catalog = catalog.with_vision_chain(vision.clone())?;
        }
        for (name, chain) in &self.catalog.tiers {
            let tier: CapabilityTier = name.parse()?;
            catalog = catalog.with_tier(tier, chain.clone())?;
        }
        Ok(catalog)
    }

    /// Credential for a backend: environment first, then the `[credentials]` table
    pub fn credential(&self, kind: BackendKind) -> Option<String> {
        self.credential_with(kind, |name| std::env::var(name).ok())
    }

    pub fn credential_with<F>(&self, kind: BackendKind, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        kind.credential_env_vars()
            .iter()
            .find_map(|name| non_blank(lookup(name)))
            .or_else(|| non_blank(lookup_backend(&self.credentials, kind)))
    }

    pub fn endpoint(&self, kind: BackendKind) -> Option<String> {
        non_blank(lookup_backend(&self.endpoints, kind))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.routing.request_timeout_secs)
    }

    pub fn text_deadline(&self) -> Duration {
        Duration::from_secs(self.routing.text_deadline_secs)
    }

    pub fn vision_deadline(&self) -> Duration {
        Duration::from_secs(self.vision.deadline_secs)
    }

    pub fn min_confidence(&self) -> f64 {
        self.vision.min_confidence
    }
}
