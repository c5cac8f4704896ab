//! Manager and session configuration

use crate::error::{TxnError, TxnResult};
use serde::{Deserialize, Serialize};

/// Transaction manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// History depth of the default session
    pub max_undo_steps: usize,
    /// Merge a commit into the top history entry when the two compose
    pub compose_consecutive: bool,
    /// Record history at all
    pub undo_redo_enabled: bool,
}

impl ManagerConfig {
    pub const DEFAULT_MAX_UNDO_STEPS: usize = 25;

    /// Parse from a TOML fragment. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> TxnResult<Self> {
        toml::from_str(content).map_err(|e| TxnError::InvalidConfig(e.to_string()))
    }

    pub fn to_toml_string(&self) -> TxnResult<String> {
        toml::to_string_pretty(self).map_err(|e| TxnError::InvalidConfig(e.to_string()))
    }

    /// Builder: history depth
    pub fn with_max_undo_steps(mut self, steps: usize) -> Self {
        self.max_undo_steps = steps;
        self
    }

    /// Builder: compose consecutive commits
    pub fn with_compose_consecutive(mut self, compose: bool) -> Self {
        self.compose_consecutive = compose;
        self
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_undo_steps: Self::DEFAULT_MAX_UNDO_STEPS,
            compose_consecutive: false,
            undo_redo_enabled: true,
        }
    }
}

/// Options for a nested session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// History depth, unbounded when `None`
    pub max_undo_steps: Option<usize>,
    /// Whether manager-level undo/redo may operate inside this session.
    /// Sessions without it are skipped (and aborted) by undo/redo.
    pub undo_redo: bool,
    /// Description of the merged history entry
    pub description: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_undo_steps: None,
            undo_redo: true,
            description: None,
        }
    }
}

impl SessionOptions {
    /// Session that merges into one history entry
    pub fn grouped(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::default()
        }
    }

    /// Builder: allow undo/redo within the session
    pub fn with_undo_redo(mut self, enabled: bool) -> Self {
        self.undo_redo = enabled;
        self
    }

    /// Builder: history depth
    pub fn with_max_undo_steps(mut self, steps: usize) -> Self {
        self.max_undo_steps = Some(steps);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.max_undo_steps, 25);
        assert!(!config.compose_consecutive);
        assert!(config.undo_redo_enabled);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ManagerConfig::from_toml_str("max_undo_steps = 3").unwrap();
        assert_eq!(config.max_undo_steps, 3);
        assert!(config.undo_redo_enabled);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ManagerConfig::default()
            .with_max_undo_steps(50)
            .with_compose_consecutive(true);
        let text = config.to_toml_string().unwrap();
        assert_eq!(ManagerConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = ManagerConfig::from_toml_str("max_undo_steps = \"many\"").unwrap_err();
        assert!(matches!(err, TxnError::InvalidConfig(_)));
    }
}
