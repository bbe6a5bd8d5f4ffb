use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Errors raised while parsing configuration values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown update criterion '{0}', expected turn:N, action:P or goal:P")]
    UnknownCriterion(String),
    #[error("invalid value '{value}' for update criterion '{kind}'")]
    InvalidValue { kind: String, value: String },
}

/// When the watcher folds the last observed knower move into its beliefs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum UpdateCriterion {
    /// Every n-th watcher move.
    Turn(usize),
    /// When the observed knower position had predicted probability below the threshold.
    Action(f64),
    /// When the observed position's likelihood under the leading goal is below the threshold.
    Goal(f64),
}

impl Default for UpdateCriterion {
    fn default() -> Self {
        UpdateCriterion::Turn(1)
    }
}

impl fmt::Display for UpdateCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateCriterion::Turn(n) => write!(f, "turn:{n}"),
            UpdateCriterion::Action(p) => write!(f, "action:{p}"),
            UpdateCriterion::Goal(p) => write!(f, "goal:{p}"),
        }
    }
}

impl FromStr for UpdateCriterion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| ConfigError::UnknownCriterion(s.to_string()))?;
        let invalid = || ConfigError::InvalidValue {
            kind: kind.to_string(),
            value: value.to_string(),
        };
        match kind.trim() {
            "turn" => match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => Ok(UpdateCriterion::Turn(n)),
                _ => Err(invalid()),
            },
            "action" => value
                .trim()
                .parse()
                .map(UpdateCriterion::Action)
                .map_err(|_| invalid()),
            "goal" => value
                .trim()
                .parse()
                .map(UpdateCriterion::Goal)
                .map_err(|_| invalid()),
            _ => Err(ConfigError::UnknownCriterion(s.to_string())),
        }
    }
}

/// How a model watcher turns its move distribution into a move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Take the most probable position.
    #[default]
    Argmax,
    /// Draw from the distribution with a seeded generator.
    Sample { seed: u64 },
}

/// Parameters of the watcher's inference model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Rationality temperature applied to path-length weights.
    pub alpha: f64,
    pub update: UpdateCriterion,
    pub selection: Selection,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig {
            alpha: 1.0,
            update: UpdateCriterion::default(),
            selection: Selection::default(),
        }
    }
}

/// Parameters of one game or replay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Watcher moves after which an unsolved session stops.
    pub max_rounds: usize,
    pub watcher: WatcherConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_rounds: 100,
            watcher: WatcherConfig::default(),
        }
    }
}
