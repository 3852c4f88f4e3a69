//! Engine tuning options

use crate::error::EngineError;
use std::time::Duration;

/// Tunables shared by every job a worker runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Size of the buffer used to stream one file between sides
    pub copy_buffer_size: usize,

    /// How long a paused checkpoint sleeps before looking at the flags again
    pub pause_poll_interval: Duration,

    /// Number of speed samples kept for the rolling transfer-speed average
    pub speed_samples: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            copy_buffer_size: 128 * 1024,
            pause_poll_interval: Duration::from_millis(50),
            speed_samples: 500,
        }
    }
}

impl EngineOptions {
    /// Validate options
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.copy_buffer_size == 0 {
            return Err(EngineError::InvalidOptions(
                "copy buffer size must be greater than zero".to_string(),
            ));
        }

        if self.pause_poll_interval.is_zero() {
            return Err(EngineError::InvalidOptions(
                "pause poll interval must be greater than zero".to_string(),
            ));
        }

        if self.speed_samples == 0 {
            return Err(EngineError::InvalidOptions(
                "speed sample window must hold at least one sample".to_string(),
            ));
        }

        Ok(())
    }
}
