//! Parsing of ffprobe compact output and streaming it into a collection
//!
//! ffprobe is run with `-print_format compact`, which writes one entry per
//! line:
//!
//! ```text
//! packet|pts_time=0.040000|dts_time=0.000000|duration_time=0.040000|size=1543|pos=48|flags=__
//! frame|best_effort_timestamp_time=0.040000|pkt_duration_time=0.040000|pkt_size=1543|pict_type=B
//! ```
//!
//! Known keys map straight onto the typed record fields; everything else
//! is ignored.

use log::{debug, info, warn};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use super::collection::FrameCollection;
use super::frame::{Frame, FrameRecord, PacketRecord};
use crate::types::IngestSummary;

/// One parsed line of probe output
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeRecord {
    Packet(PacketRecord),
    Frame(FrameRecord),
}

impl ProbeRecord {
    /// Frame for this entry, `None` when mandatory fields are missing
    pub fn to_frame(&self) -> Option<Frame> {
        match self {
            ProbeRecord::Packet(packet) => Frame::from_packet_record(packet),
            ProbeRecord::Frame(frame) => Frame::from_frame_record(frame),
        }
    }
}

fn parse_time(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_count(value: &str) -> Option<u64> {
    value.parse::<u64>().ok()
}

fn apply_packet_field(record: &mut PacketRecord, key: &str, value: &str) {
    match key {
        "duration_time" => record.duration_time = parse_time(value),
        "size" => record.size = parse_count(value),
        "pts_time" => record.pts_time = parse_time(value),
        "dts_time" => record.dts_time = parse_time(value),
        "flags" => record.flags = Some(value.to_string()),
        "pos" => record.pos = parse_count(value),
        _ => {}
    }
}

fn apply_frame_field(record: &mut FrameRecord, key: &str, value: &str) {
    match key {
        // Newer ffprobe builds dropped the pkt_ prefix on duration
        "pkt_duration_time" | "duration_time" => record.pkt_duration_time = parse_time(value),
        "pkt_size" => record.pkt_size = parse_count(value),
        "best_effort_timestamp_time" => record.best_effort_timestamp_time = parse_time(value),
        "pkt_pts_time" | "pts_time" => record.pkt_pts_time = parse_time(value),
        "pict_type" => record.pict_type = Some(value.to_string()),
        "pkt_pos" => record.pkt_pos = parse_count(value),
        _ => {}
    }
}

/// Split `key=value` pairs after the section name, skipping empty and `N/A` values
fn fields(rest: &str) -> impl Iterator<Item = (&str, &str)> {
    rest.split('|').filter_map(|part| {
        let (key, value) = part.split_once('=')?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() || value == "N/A" {
            None
        } else {
            Some((key, value))
        }
    })
}

/// Parse one line of `-print_format compact` output.
///
/// Returns `None` for blank lines, sections other than `packet`/`frame`,
/// and lines without any fields.
pub fn parse_compact_line(line: &str) -> Option<ProbeRecord> {
    let (section, rest) = line.trim().split_once('|')?;
    if rest.is_empty() {
        return None;
    }

    match section.trim() {
        "packet" => {
            let mut record = PacketRecord::default();
            for (key, value) in fields(rest) {
                apply_packet_field(&mut record, key, value);
            }
            Some(ProbeRecord::Packet(record))
        }
        "frame" => {
            let mut record = FrameRecord::default();
            for (key, value) in fields(rest) {
                apply_frame_field(&mut record, key, value);
            }
            Some(ProbeRecord::Frame(record))
        }
        _ => None,
    }
}

/// Stream probe output into `frames`, one line at a time.
///
/// The caller's `cancelled` flag is checked before every line. On
/// cancellation the frames read so far stay in the collection but
/// `analyze` is not run; otherwise the collection is analyzed once the
/// reader is exhausted.
pub fn ingest_lines<R: BufRead>(
    reader: R,
    frames: &mut FrameCollection,
    cancelled: &AtomicBool,
) -> Result<IngestSummary, String> {
    let start = Instant::now();
    let mut summary = IngestSummary::default();

    for line in reader.lines() {
        if cancelled.load(Ordering::SeqCst) {
            info!(
                "Ingest cancelled after {} lines ({} frames kept)",
                summary.lines, summary.added
            );
            summary.cancelled = true;
            return Ok(summary);
        }

        let line = line.map_err(|e| format!("Failed to read probe output: {}", e))?;
        summary.lines += 1;

        let Some(record) = parse_compact_line(&line) else {
            continue;
        };
        summary.records += 1;

        match record.to_frame() {
            Some(frame) => match frames.add(frame, None) {
                Some(_) => summary.added += 1,
                None => summary.duplicates += 1,
            },
            None => summary.unconstructible += 1,
        }
    }

    if summary.unconstructible > 0 {
        debug!(
            "Skipped {} entries with missing data ({:.1}%)",
            summary.unconstructible,
            summary.unconstructible as f64 / summary.records.max(1) as f64 * 100.0
        );
    }
    if summary.records == 0 && summary.lines > 0 {
        warn!(
            "No packet or frame entries found in {} lines of probe output",
            summary.lines
        );
    }

    frames.analyze();

    info!(
        "Ingested {} frames from {} lines in {:.2}s (duplicates: {}, skipped: {})",
        summary.added,
        summary.lines,
        start.elapsed().as_secs_f64(),
        summary.duplicates,
        summary.unconstructible
    );
    Ok(summary)
}
