//! Configuration loading for oncurate.
//! Reads oncurate.toml from the current directory or the path in ONCURATE_CONFIG.

use oncurate_annotation::AnnotationConfig;
use oncurate_common::GeneticType;
use oncurate_history::DiffView;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_ENV: &str = "ONCURATE_CONFIG";
pub const ANNOTATOR_URL_ENV: &str = "ONCURATE_ANNOTATOR_URL";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub annotation: AnnotationConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Full name of the acting curator.
    #[serde(default)]
    pub current_user: String,
    #[serde(default)]
    pub genetic_type: GeneticType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub diff_view: DiffView,
}

impl Config {
    /// Load from ONCURATE_CONFIG or ./oncurate.toml, then apply environment
    /// overrides.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "oncurate.toml".to_string());

        if !Path::new(&path).exists() {
            anyhow::bail!(
                "Config file not found: {}\n\
                 Copy oncurate.example.toml to oncurate.toml and edit it, or set {}.",
                path,
                CONFIG_ENV
            );
        }

        let content = std::fs::read_to_string(&path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ANNOTATOR_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.annotation.base_url = url;
        }
    }
}

mod tests;
