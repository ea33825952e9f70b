//! ffbitrate - frame, GOP and per-second bit rates from ffprobe output
//!
//! This is the library entry point that exposes the aggregation engine
//! and the types a plotting front end consumes.

// Module declarations
pub mod bitrate;
pub mod config;
pub mod types;

// Re-export commonly used types
pub use bitrate::{
    ingest_lines, parse_compact_line, Frame, FrameCollection, FrameRecord, FrameType, Gop,
    Grouping, GroupingStrategy, PacketRecord, ProbeRecord,
};
pub use config::EngineConfig;
pub use types::*;
