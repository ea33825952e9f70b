//! Engine configuration
//!
//! Settings the host application passes in when it creates a frame
//! collection:
//! - Window length for the fixed-interval ("second") view and statistics
//! - Y-axis divisor for plot data
//! - Whether displayed times start at the stream's first timestamp

use serde::{Deserialize, Serialize};

/// Default fixed-interval window, seconds
pub const DEFAULT_WINDOW_LENGTH: f64 = 1.0;

/// Default y-axis divisor (bytes -> kB, bits/s -> kb/s)
pub const DEFAULT_SIZE_DIVISOR: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window_length: f64,
    pub size_divisor: u64,
    pub adjust_start_time: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_length: DEFAULT_WINDOW_LENGTH,
            size_divisor: DEFAULT_SIZE_DIVISOR,
            adjust_start_time: true,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config; missing keys take their defaults
    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| format!("Invalid engine config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.window_length.is_finite() || self.window_length <= 0.0 {
            return Err(format!(
                "window_length must be a positive number of seconds, got {}",
                self.window_length
            ));
        }
        if self.size_divisor == 0 {
            return Err("size_divisor must not be zero".to_string());
        }
        Ok(())
    }
}
