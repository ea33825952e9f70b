//! Frame records and the typed ffprobe entries they are built from
//!
//! A `Frame` is one decoded frame or demuxed packet: a time interval plus a
//! byte size. Frames are built from either packet entries (`-show_packets`)
//! or frame entries (`-show_frames`); both arrive already split into typed
//! fields by the line parser.

use serde::{Deserialize, Serialize};

/// Marker ffprobe puts in a packet's `flags` field for keyframes
pub const KEYFRAME_FLAG: char = 'K';

/// Picture type of a video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameType {
    I,
    P,
    B,
}

impl FrameType {
    /// Map ffprobe's single-character `pict_type` code
    pub fn from_pict_type(code: &str) -> Option<Self> {
        match code.trim().chars().next()? {
            'I' => Some(FrameType::I),
            'P' => Some(FrameType::P),
            'B' => Some(FrameType::B),
            _ => None,
        }
    }
}

/// Packet entry as produced by `ffprobe -show_packets`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PacketRecord {
    pub duration_time: Option<f64>,
    pub size: Option<u64>,
    pub pts_time: Option<f64>,
    pub dts_time: Option<f64>,
    pub flags: Option<String>,
    pub pos: Option<u64>,
}

/// Frame entry as produced by `ffprobe -show_frames`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FrameRecord {
    pub pkt_duration_time: Option<f64>,
    pub pkt_size: Option<u64>,
    pub best_effort_timestamp_time: Option<f64>,
    pub pkt_pts_time: Option<f64>,
    pub pict_type: Option<String>,
    pub pkt_pos: Option<u64>,
}

/// A single frame (or packet) with its presentation interval and size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// Seconds, never negative
    pub duration: f64,
    /// Bytes
    pub size: u64,
    pub frame_type: Option<FrameType>,
    /// Source already delivers frames in presentation order
    pub is_ordered: bool,
    /// Byte position in the file, the ordering key while `start_time` is unresolved
    pub byte_offset: Option<u64>,
    start_time: Option<f64>,
}

impl Frame {
    /// Frame with a known start time
    pub fn new(start_time: f64, duration: f64, size: u64) -> Self {
        Self {
            duration: duration.max(0.0),
            size,
            frame_type: None,
            is_ordered: true,
            byte_offset: None,
            start_time: Some(start_time),
        }
    }

    /// Frame whose start time will be back-filled from its neighbours
    pub fn unresolved(byte_offset: u64, duration: f64, size: u64) -> Self {
        Self {
            duration: duration.max(0.0),
            size,
            frame_type: None,
            is_ordered: true,
            byte_offset: Some(byte_offset),
            start_time: None,
        }
    }

    pub fn with_frame_type(mut self, frame_type: Option<FrameType>) -> Self {
        self.frame_type = frame_type;
        self
    }

    pub fn with_byte_offset(mut self, byte_offset: Option<u64>) -> Self {
        self.byte_offset = byte_offset;
        self
    }

    pub fn with_ordered(mut self, is_ordered: bool) -> Self {
        self.is_ordered = is_ordered;
        self
    }

    /// Build a frame from a packet entry.
    ///
    /// Packets come in decode order, so the resulting frame is marked as
    /// unordered and gets placed by timestamp on insertion. Returns `None`
    /// when duration, size or pts is missing.
    pub fn from_packet_record(record: &PacketRecord) -> Option<Self> {
        let duration = record.duration_time?;
        let size = record.size?;
        let pts = record.pts_time?;
        if duration < 0.0 || !pts.is_finite() {
            return None;
        }

        let is_key = record
            .flags
            .as_deref()
            .map(|flags| flags.contains(KEYFRAME_FLAG))
            .unwrap_or(false);

        Some(
            Frame::new(pts, duration, size)
                .with_frame_type(is_key.then_some(FrameType::I))
                .with_byte_offset(record.pos)
                .with_ordered(false),
        )
    }

    /// Build a frame from a decoded frame entry.
    ///
    /// The timestamp comes from `best_effort_timestamp_time`, then
    /// `pkt_pts_time`. Without either, the frame is kept unresolved and
    /// ordered by `pkt_pos`; without that too it cannot be placed at all.
    pub fn from_frame_record(record: &FrameRecord) -> Option<Self> {
        let duration = record.pkt_duration_time?;
        let size = record.pkt_size?;
        if duration < 0.0 {
            return None;
        }

        let frame_type = record
            .pict_type
            .as_deref()
            .and_then(FrameType::from_pict_type);

        let timestamp = record
            .best_effort_timestamp_time
            .or(record.pkt_pts_time)
            .filter(|t| t.is_finite());

        let frame = match timestamp {
            Some(start) => Frame::new(start, duration, size).with_byte_offset(record.pkt_pos),
            None => Frame::unresolved(record.pkt_pos?, duration, size),
        };
        Some(frame.with_frame_type(frame_type))
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<f64> {
        self.start_time.map(|start| start + self.duration)
    }

    pub fn is_resolved(&self) -> bool {
        self.start_time.is_some()
    }

    pub fn is_keyframe(&self) -> bool {
        self.frame_type == Some(FrameType::I)
    }

    /// The single deferred write allowed after insertion (back-fill pass)
    pub(crate) fn resolve_start_time(&mut self, start_time: f64) {
        self.start_time = Some(start_time);
    }

    /// Bytes of this frame attributed to `[start, end)`.
    ///
    /// A frame straddling the interval contributes in proportion to the time
    /// it overlaps it, rounded half away from zero. Without an interval, or
    /// for a frame whose start is still unresolved, the full size is returned.
    pub fn overlap_size(&self, interval: Option<(f64, f64)>) -> u64 {
        let (Some((interval_start, interval_end)), Some(start)) = (interval, self.start_time)
        else {
            return self.size;
        };
        let end = start + self.duration;

        if self.duration <= 0.0 {
            // Instantaneous frames belong wholly to the interval holding their start
            return if start >= interval_start && start < interval_end {
                self.size
            } else {
                0
            };
        }

        if end <= interval_start || start >= interval_end {
            return 0;
        }
        if start >= interval_start && end <= interval_end {
            return self.size;
        }

        let overlap = end.min(interval_end) - start.max(interval_start);
        (self.size as f64 * (overlap / self.duration)).round() as u64
    }
}
