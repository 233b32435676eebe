//! Host-supplied board configuration.
//!
//! Canvas and note dimensions plus the timing constants that drive sampling,
//! throttling, debouncing and the liveness watchdogs. Hosts either use
//! [`BoardConfig::default`] or deserialize a partial JSON object on top of it.

use kurbo::Size;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default canvas width in pixels.
pub const CANVAS_WIDTH: f64 = 1920.0;
/// Default canvas height in pixels.
pub const CANVAS_HEIGHT: f64 = 1080.0;
/// Default sticky note width in pixels.
pub const NOTE_WIDTH: f64 = 256.0;
/// Default sticky note height in pixels.
pub const NOTE_HEIGHT: f64 = 256.0;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid dimension for {field}: {value}")]
    InvalidDimension { field: &'static str, value: f64 },
    #[error(
        "Note ({note_width}x{note_height}) does not fit on canvas ({canvas_width}x{canvas_height})"
    )]
    NoteLargerThanCanvas {
        note_width: f64,
        note_height: f64,
        canvas_width: f64,
        canvas_height: f64,
    },
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Board dimensions and timing policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BoardConfig {
    /// Canvas width in pixels.
    pub canvas_width: f64,
    /// Canvas height in pixels.
    pub canvas_height: f64,
    /// Sticky note width in pixels.
    pub note_width: f64,
    /// Sticky note height in pixels.
    pub note_height: f64,
    /// Minimum distance between accepted stroke samples.
    pub min_point_distance: f64,
    /// Throttle window for note drag emissions.
    pub position_throttle_ms: u64,
    /// Quiet period before a final note content emission.
    pub content_debounce_ms: u64,
    /// Longest a single stroke may stay active before it is force-ended.
    pub max_stroke_duration_ms: u64,
    /// How long a remote "is drawing" flag stays valid without activity.
    pub presence_timeout_ms: u64,
    /// Lifetime of transient notifications.
    pub notification_ms: u64,
    /// Delay before retrying a failed stop-drawing notification.
    pub force_clear_retry_ms: u64,
    /// Extra margin around the viewport when culling sticky notes.
    pub viewport_buffer: f64,
    /// Maximum number of undo snapshots kept.
    pub history_limit: usize,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            canvas_width: CANVAS_WIDTH,
            canvas_height: CANVAS_HEIGHT,
            note_width: NOTE_WIDTH,
            note_height: NOTE_HEIGHT,
            min_point_distance: 1.5,
            position_throttle_ms: 50,
            content_debounce_ms: 500,
            max_stroke_duration_ms: 30_000,
            presence_timeout_ms: 15_000,
            notification_ms: 3_000,
            force_clear_retry_ms: 1_000,
            viewport_buffer: 500.0,
            history_limit: 50,
        }
    }
}

impl BoardConfig {
    /// Parse a (possibly partial) JSON config and validate it.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that dimensions and limits are usable.
    pub fn validate(&self) -> ConfigResult<()> {
        for (field, value) in [
            ("canvasWidth", self.canvas_width),
            ("canvasHeight", self.canvas_height),
            ("noteWidth", self.note_width),
            ("noteHeight", self.note_height),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidDimension { field, value });
            }
        }

        if self.note_width > self.canvas_width || self.note_height > self.canvas_height {
            return Err(ConfigError::NoteLargerThanCanvas {
                note_width: self.note_width,
                note_height: self.note_height,
                canvas_width: self.canvas_width,
                canvas_height: self.canvas_height,
            });
        }

        if !self.min_point_distance.is_finite() || self.min_point_distance < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "minPointDistance",
                reason: format!("must be a non-negative number, got {}", self.min_point_distance),
            });
        }

        if !self.viewport_buffer.is_finite() || self.viewport_buffer < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "viewportBuffer",
                reason: format!("must be a non-negative number, got {}", self.viewport_buffer),
            });
        }

        if self.history_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "historyLimit",
                reason: "must keep at least one snapshot".to_string(),
            });
        }

        Ok(())
    }

    /// Canvas size.
    pub fn canvas_size(&self) -> Size {
        Size::new(self.canvas_width, self.canvas_height)
    }

    /// Sticky note size.
    pub fn note_size(&self) -> Size {
        Size::new(self.note_width, self.note_height)
    }

    pub fn position_throttle(&self) -> Duration {
        Duration::from_millis(self.position_throttle_ms)
    }

    pub fn content_debounce(&self) -> Duration {
        Duration::from_millis(self.content_debounce_ms)
    }

    pub fn max_stroke_duration(&self) -> Duration {
        Duration::from_millis(self.max_stroke_duration_ms)
    }

    pub fn presence_timeout(&self) -> Duration {
        Duration::from_millis(self.presence_timeout_ms)
    }

    pub fn notification_duration(&self) -> Duration {
        Duration::from_millis(self.notification_ms)
    }

    pub fn force_clear_retry(&self) -> Duration {
        Duration::from_millis(self.force_clear_retry_ms)
    }
}
