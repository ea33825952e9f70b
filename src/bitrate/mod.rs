//! Bitrate analysis module
//!
//! This module turns per-frame ffprobe entries into bit-rate series:
//! - Frame construction from packet and frame entries
//! - Ordered insertion and timestamp back-fill
//! - Grouping into keyframe GOPs or fixed time windows
//! - Plot coordinates and avg/max/min bit rate statistics
//!
//! Running ffprobe itself is left to the caller; it only has to hand over
//! the compact output line by line.

mod collection;
mod frame;
mod gop;
mod grouping;
mod parser;

pub use collection::FrameCollection;
pub use frame::{Frame, FrameRecord, FrameType, PacketRecord, KEYFRAME_FLAG};
pub use gop::Gop;
pub use grouping::{Grouping, GroupingStrategy};
pub use parser::{ingest_lines, parse_compact_line, ProbeRecord};
