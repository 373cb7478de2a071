//! Engine configuration, loadable from RON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Tunables for a story session. Every field has a default, so a RON file
/// only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Start scene used when the story document names none.
    pub start_scene_fallback: String,
    /// Agent chosen when the selector is absent or unknown.
    pub default_agent: String,
    pub show_back_button: bool,
    /// Refuse agent switching until every ending has been found.
    pub require_all_endings_to_switch_agent: bool,
    /// How many `friendN` personas are picked for templating.
    pub max_friends: usize,
    /// Rendered for placeholders that have no field-specific fallback.
    pub fallback_text: String,
    /// Prefix for the per-agent progress key.
    pub storage_prefix: String,
    /// Directory for scenes that do not name their image.
    pub scene_image_dir: String,
    /// Fixed RNG seed; entropy when absent.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            start_scene_fallback: "intro".to_string(),
            default_agent: "generic".to_string(),
            show_back_button: true,
            require_all_endings_to_switch_agent: true,
            max_friends: 6,
            fallback_text: "Agente".to_string(),
            storage_prefix: "portal27_endings_".to_string(),
            scene_image_dir: "img/scenarios".to_string(),
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Load a config from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a config from a RON string.
    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        Ok(ron::from_str(input)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_ron_keeps_defaults() {
        let config = EngineConfig::parse_ron("(show_back_button: false, seed: Some(7))").unwrap();
        assert!(!config.show_back_button);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.default_agent, "generic");
        assert_eq!(config.max_friends, 6);
    }

    #[test]
    fn empty_struct_is_default() {
        assert_eq!(EngineConfig::parse_ron("()").unwrap(), EngineConfig::default());
    }

    #[test]
    fn malformed_ron_is_an_error() {
        assert!(EngineConfig::parse_ron("(max_friends: \"six\")").is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.ron");
        std::fs::write(&path, "(fallback_text: \"Agent\")").unwrap();
        let config = EngineConfig::load_from_ron(&path).unwrap();
        assert_eq!(config.fallback_text, "Agent");
    }
}
