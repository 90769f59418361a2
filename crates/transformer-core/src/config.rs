//! Session and replication settings, loadable from JSON.

use crate::domain::{GizmoPlacement, Granularity, SpaceType, TransformationKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Ray length used when only a direction is known.
pub const DEFAULT_TRACE_DISTANCE: f32 = 1.0e9;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Snapping state for one transformation kind.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SnapSetting {
    pub enabled: bool,
    /// Step size. Rotation increments are in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub increment: Option<f32>,
}

/// Per-kind snapping table. A kind without an entry does not snap.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnappingConfig {
    settings: HashMap<TransformationKind, SnapSetting>,
}

impl SnappingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper to enable snapping for a kind.
    pub fn with(mut self, kind: TransformationKind, increment: f32) -> Self {
        self.settings.insert(
            kind,
            SnapSetting {
                enabled: true,
                increment: Some(increment),
            },
        );
        self
    }

    pub fn get(&self, kind: TransformationKind) -> Option<&SnapSetting> {
        self.settings.get(&kind)
    }

    pub fn set_enabled(&mut self, kind: TransformationKind, enabled: bool) {
        self.settings.entry(kind).or_default().enabled = enabled;
    }

    pub fn set_increment(&mut self, kind: TransformationKind, increment: f32) {
        self.settings.entry(kind).or_default().increment = Some(increment);
    }

    /// The increment to snap to, if snapping is on for this kind and a
    /// usable increment is configured.
    pub fn increment_for(&self, kind: TransformationKind) -> Option<f32> {
        let setting = self.settings.get(&kind)?;
        if !setting.enabled {
            return None;
        }
        setting.increment.filter(|inc| *inc > 0.0 && inc.is_finite())
    }

    fn validate(&self) -> ConfigResult<()> {
        for (kind, setting) in &self.settings {
            if let Some(inc) = setting.increment {
                if !(inc > 0.0 && inc.is_finite()) {
                    return Err(ConfigError::Invalid(format!(
                        "snapping increment for {:?} must be positive, got {}",
                        kind, inc
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Behavior of a single manipulation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub placement: GizmoPlacement,
    pub initial_kind: TransformationKind,
    pub initial_space: SpaceType,
    pub granularity: Granularity,
    /// Re-selecting a member deselects it.
    pub toggle_selected_in_multi_selection: bool,
    /// Move focus-capable members in addition to notifying them.
    pub transform_focusables: bool,
    /// Rotate members around their own origin instead of orbiting the gizmo.
    pub rotate_on_local_axis: bool,
    /// Move members even when they are not flagged movable.
    pub force_mobility: bool,
    /// Drop trace hits on members that are not replicated.
    pub ignore_non_replicated: bool,
    pub trace_distance: f32,
    pub snapping: SnappingConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            placement: GizmoPlacement::OnLastSelection,
            initial_kind: TransformationKind::Translation,
            initial_space: SpaceType::World,
            granularity: Granularity::Entity,
            toggle_selected_in_multi_selection: true,
            transform_focusables: true,
            rotate_on_local_axis: false,
            force_mobility: false,
            ignore_non_replicated: false,
            trace_distance: DEFAULT_TRACE_DISTANCE,
            snapping: SnappingConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.trace_distance > 0.0 && self.trace_distance.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "trace_distance must be positive, got {}",
                self.trace_distance
            )));
        }
        self.snapping.validate()
    }
}

/// Timing of the replication polling loops, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub clone_check_interval_ms: u64,
    /// How long a clone must exist before it may be announced.
    pub min_clone_time_ms: u64,
    pub resync_interval_ms: u64,
    /// Upper bound for any polling loop before it gives up with a warning.
    pub max_poll_wait_ms: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            clone_check_interval_ms: 50,
            min_clone_time_ms: 10,
            resync_interval_ms: 100,
            max_poll_wait_ms: 5_000,
        }
    }
}

impl ReplicationConfig {
    pub fn clone_check_interval(&self) -> Duration {
        Duration::from_millis(self.clone_check_interval_ms)
    }

    pub fn min_clone_time(&self) -> Duration {
        Duration::from_millis(self.min_clone_time_ms)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_millis(self.resync_interval_ms)
    }

    pub fn max_poll_wait(&self) -> Duration {
        Duration::from_millis(self.max_poll_wait_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.clone_check_interval_ms == 0 || self.resync_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "polling intervals must be non-zero".to_string(),
            ));
        }
        if self.max_poll_wait_ms < self.clone_check_interval_ms
            || self.max_poll_wait_ms < self.resync_interval_ms
        {
            return Err(ConfigError::Invalid(
                "max_poll_wait_ms must cover at least one polling interval".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformerConfig {
    pub session: SessionConfig,
    pub replication: ReplicationConfig,
}

impl TransformerConfig {
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.session.validate()?;
        self.replication.validate()
    }
}
