//! Shared types handed to the plotting/GUI side

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Plot Types
// ============================================================================

/// How frames are presented on the plot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// One point per frame, y = frame size
    Frame,
    /// One point per keyframe-delimited GOP, y = GOP bit rate
    Gop,
    /// One point per fixed window (one second by default), y = window bit rate
    Second,
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "frame" => Ok(ViewMode::Frame),
            "gop" => Ok(ViewMode::Gop),
            "second" => Ok(ViewMode::Second),
            other => Err(format!("Unknown view mode: {}", other)),
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViewMode::Frame => "frame",
            ViewMode::Gop => "gop",
            ViewMode::Second => "second",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Seconds from the display origin
    pub x: f64,
    /// Size or bit rate divided by the requested divisor
    pub y: f64,
}

impl DataPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

// ============================================================================
// Bitrate Statistics Types
// ============================================================================

/// Whole-stream bit rates in bits per second
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitRateStats {
    pub avg: Option<u64>,
    pub max: Option<u64>,
    pub min: Option<u64>,
}

/// Everything the plot needs for one file in one view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotSeries {
    pub view: ViewMode,
    pub data_points: Vec<DataPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_x: Option<f64>,
    pub max_y: u64,
    pub stats: BitRateStats,
}

// ============================================================================
// Ingest Types
// ============================================================================

/// Counters for one pass over a probe output stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Lines read, blank ones included
    pub lines: usize,
    /// Lines that parsed into a packet or frame entry
    pub records: usize,
    /// Frames inserted into the collection
    pub added: usize,
    /// Entries missing duration, size or a usable position
    pub unconstructible: usize,
    /// Frames rejected because one with the same timestamp was already present
    pub duplicates: usize,
    /// Reading stopped on the caller's cancellation flag
    pub cancelled: bool,
}
