//! Config module - settings file, environment overrides and credentials

pub mod toml_config;

// Re-export commonly used types
pub use toml_config::{
    get_config_path, CatalogOverrides, ConfigError, RoutingConfig, Settings, VisionConfig,
};
