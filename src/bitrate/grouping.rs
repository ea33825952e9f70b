//! Grouping of an ordered frame sequence into GOPs or fixed time windows
//!
//! Both strategies make one pass over frames sorted by start time and
//! collect running max/min/total statistics as buckets are closed.

use log::{debug, error, warn};

use super::frame::Frame;
use super::gop::Gop;

/// Upper bound on the windows one interval pass may produce
const MAX_WINDOWS: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GroupingStrategy {
    /// Variable-length GOPs, each opened by an I-frame
    Keyframe,
    /// Contiguous windows of `window_length` seconds, aligned on `start_offset`
    Interval { window_length: f64, start_offset: f64 },
}

/// Buckets produced by one grouping pass plus their aggregate statistics
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Grouping {
    pub gops: Vec<Gop>,
    /// Highest bucket bit rate, bits/s
    pub max_bit_rate: Option<u64>,
    /// Lowest positive bucket bit rate, bits/s
    pub min_bit_rate: Option<u64>,
    /// Sum of accumulated bucket sizes, bytes
    pub total_size: u64,
}

impl Grouping {
    fn push(&mut self, gop: Gop) {
        let bit_rate = gop.bit_rate();
        if bit_rate > 0 {
            self.max_bit_rate = Some(self.max_bit_rate.map_or(bit_rate, |m| m.max(bit_rate)));
            self.min_bit_rate = Some(self.min_bit_rate.map_or(bit_rate, |m| m.min(bit_rate)));
        }
        self.total_size += gop.size();
        self.gops.push(gop);
    }

    pub fn is_empty(&self) -> bool {
        self.gops.is_empty()
    }

    pub fn end_time(&self) -> Option<f64> {
        self.gops.last().map(Gop::end_time)
    }
}

impl GroupingStrategy {
    /// Group `frames`, which must be sorted by start time.
    ///
    /// Frames whose start time is still unresolved are skipped.
    pub fn group(&self, frames: &[Frame]) -> Grouping {
        let grouping = match *self {
            GroupingStrategy::Keyframe => group_by_keyframe(frames),
            GroupingStrategy::Interval {
                window_length,
                start_offset,
            } => group_by_interval(frames, window_length, start_offset, MAX_WINDOWS),
        };
        debug!(
            "Grouped {} frames into {} buckets ({:?}), max={:?} min={:?} total={} bytes",
            frames.len(),
            grouping.gops.len(),
            self,
            grouping.max_bit_rate,
            grouping.min_bit_rate,
            grouping.total_size
        );
        grouping
    }
}

fn add_to_bucket(gop: &mut Gop, frame: Frame) {
    if let Err(e) = gop.add(frame) {
        error!("Keyframe grouping fault: {}", e);
        debug_assert!(false, "{}", e);
    }
}

fn group_by_keyframe(frames: &[Frame]) -> Grouping {
    let mut result = Grouping::default();
    let mut current: Option<Gop> = None;

    for frame in frames.iter().filter(|f| f.is_resolved()) {
        match current.as_mut() {
            Some(gop) if !frame.is_keyframe() => add_to_bucket(gop, *frame),
            _ => {
                if let Some(done) = current.take() {
                    result.push(done);
                }
                let mut gop = Gop::real();
                add_to_bucket(&mut gop, *frame);
                current = Some(gop);
            }
        }
    }

    if let Some(done) = current.filter(|gop| !gop.is_empty()) {
        result.push(done);
    }
    result
}

fn group_by_interval(
    frames: &[Frame],
    window_length: f64,
    start_offset: f64,
    max_windows: usize,
) -> Grouping {
    let mut result = Grouping::default();
    if window_length <= 0.0 || !window_length.is_finite() {
        return result;
    }

    let mut resolved = frames.iter().filter(|f| f.is_resolved()).peekable();
    let Some(first_start) = resolved.peek().and_then(|f| f.start_time()) else {
        return result;
    };
    let stream_end = frames
        .iter()
        .filter_map(Frame::end_time)
        .fold(first_start, f64::max);

    let window_at = |index: i64| {
        Gop::window(start_offset + index as f64 * window_length, window_length)
            .with_extent(first_start, stream_end)
    };

    let mut index = ((first_start - start_offset) / window_length).floor() as i64;
    let mut current = window_at(index);

    'frames: for frame in resolved {
        let (Some(start), Some(end)) = (frame.start_time(), frame.end_time()) else {
            continue;
        };

        // Close windows the frame starts after; empty ones stay as gaps
        while start >= window_end(&current) {
            if !next_window(&mut result, &mut current, &mut index, &window_at, max_windows) {
                break 'frames;
            }
        }
        add_to_bucket(&mut current, *frame);

        // Carry the remaining slices of a long frame into the following windows
        while end > window_end(&current) {
            if !next_window(&mut result, &mut current, &mut index, &window_at, max_windows) {
                break 'frames;
            }
            add_to_bucket(&mut current, *frame);
        }
    }

    result.push(current);
    result
}

/// Close `current` and open the window after it.
///
/// Returns false, leaving `current` open, once `max_windows` is reached or
/// when the next window start no longer advances at this timestamp magnitude.
fn next_window(
    result: &mut Grouping,
    current: &mut Gop,
    index: &mut i64,
    window_at: &impl Fn(i64) -> Gop,
    max_windows: usize,
) -> bool {
    if result.gops.len() + 1 >= max_windows {
        warn!(
            "Interval grouping stopped at {} windows (window start {}s)",
            max_windows,
            current.window_start()
        );
        return false;
    }
    let next = window_at(*index + 1);
    if next.window_start() <= current.window_start() {
        warn!(
            "Interval grouping stopped, window start no longer advances at {}s",
            current.window_start()
        );
        return false;
    }
    result.push(std::mem::replace(current, next));
    *index += 1;
    true
}

fn window_end(gop: &Gop) -> f64 {
    gop.window_end().unwrap_or(f64::INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitrate::frame::FrameType;

    fn typed(start: f64, frame_type: FrameType) -> Frame {
        Frame::new(start, 0.04, 1000).with_frame_type(Some(frame_type))
    }

    fn interval(window_length: f64, start_offset: f64) -> GroupingStrategy {
        GroupingStrategy::Interval {
            window_length,
            start_offset,
        }
    }

    // ========== keyframe grouping tests ==========

    #[test]
    fn test_keyframe_grouping_counts() {
        let frames = vec![
            typed(0.00, FrameType::I),
            typed(0.04, FrameType::P),
            typed(0.08, FrameType::B),
            typed(0.12, FrameType::I),
            typed(0.16, FrameType::P),
        ];
        let grouping = GroupingStrategy::Keyframe.group(&frames);
        assert_eq!(grouping.gops.len(), 2);
        let counts: Vec<usize> = grouping.gops.iter().map(|g| g.frames().len()).collect();
        assert_eq!(counts, vec![3, 2]);
        assert_eq!(grouping.total_size, 5000);
    }

    #[test]
    fn test_keyframe_grouping_leading_non_keyframes() {
        let frames = vec![
            typed(0.00, FrameType::P),
            typed(0.04, FrameType::B),
            typed(0.08, FrameType::I),
        ];
        let grouping = GroupingStrategy::Keyframe.group(&frames);
        assert_eq!(grouping.gops.len(), 2);
        assert_eq!(grouping.gops[0].frames().len(), 2);
        assert!(grouping.gops[1].frames()[0].is_keyframe());
    }

    #[test]
    fn test_keyframe_grouping_statistics() {
        // GOP 1: 3000 bytes over 0.12 s, GOP 2: 1000 bytes over 0.04 s
        let frames = vec![
            typed(0.00, FrameType::I),
            typed(0.04, FrameType::P),
            typed(0.08, FrameType::P),
            typed(0.12, FrameType::I),
        ];
        let grouping = GroupingStrategy::Keyframe.group(&frames);
        assert_eq!(grouping.max_bit_rate, Some(200_000));
        assert_eq!(grouping.min_bit_rate, Some(200_000));
    }

    #[test]
    fn test_keyframe_grouping_empty() {
        let grouping = GroupingStrategy::Keyframe.group(&[]);
        assert!(grouping.is_empty());
        assert_eq!(grouping.max_bit_rate, None);
        assert_eq!(grouping.min_bit_rate, None);
        assert_eq!(grouping.end_time(), None);
    }

    // ========== interval grouping tests ==========

    #[test]
    fn test_interval_grouping_basic() {
        let frames = vec![
            Frame::new(0.0, 0.5, 1000),
            Frame::new(0.5, 0.5, 1000),
            Frame::new(1.0, 0.5, 3000),
            Frame::new(1.5, 0.5, 1000),
        ];
        let grouping = interval(1.0, 0.0).group(&frames);
        assert_eq!(grouping.gops.len(), 2);
        assert_eq!(grouping.gops[0].bit_rate(), 16_000);
        assert_eq!(grouping.gops[1].bit_rate(), 32_000);
        assert_eq!(grouping.max_bit_rate, Some(32_000));
        assert_eq!(grouping.min_bit_rate, Some(16_000));
    }

    #[test]
    fn test_interval_grouping_splits_long_frame() {
        // 2.5 s frame starting at 0 covers windows 0, 1 and half of 2
        let frames = vec![Frame::new(0.0, 2.5, 1000)];
        let grouping = interval(1.0, 0.0).group(&frames);
        let sizes: Vec<u64> = grouping.gops.iter().map(Gop::size).collect();
        assert_eq!(sizes, vec![400, 400, 200]);
        assert_eq!(grouping.total_size, 1000);
        assert_eq!(grouping.gops[2].duration(), 0.5);
    }

    #[test]
    fn test_interval_grouping_empty_windows_are_gaps() {
        let frames = vec![Frame::new(0.0, 0.5, 1000), Frame::new(3.0, 0.5, 1000)];
        let grouping = interval(1.0, 0.0).group(&frames);
        assert_eq!(grouping.gops.len(), 4);
        assert!(grouping.gops[1].is_empty());
        assert!(grouping.gops[2].is_empty());
        assert_eq!(grouping.gops[1].bit_rate(), 0);
        // Last window is clipped to the stream end at 3.5 s
        assert_eq!(grouping.max_bit_rate, Some(16_000));
        // Empty windows do not count towards the minimum
        assert_eq!(grouping.min_bit_rate, Some(8_000));
    }

    #[test]
    fn test_interval_grouping_start_offset() {
        let frames = vec![Frame::new(10.0, 1.0, 1000), Frame::new(11.0, 1.0, 2000)];
        let grouping = interval(1.0, 10.0).group(&frames);
        assert_eq!(grouping.gops.len(), 2);
        assert_eq!(grouping.gops[0].window_start(), 10.0);
        assert_eq!(grouping.gops[1].window_start(), 11.0);
    }

    #[test]
    fn test_interval_grouping_first_window_aligned_on_offset() {
        let frames = vec![Frame::new(2.3, 0.4, 1000)];
        let grouping = interval(1.0, 0.0).group(&frames);
        assert_eq!(grouping.gops.len(), 1);
        assert_eq!(grouping.gops[0].window_start(), 2.0);
        // Clipped to the stream extent on both sides
        assert!((grouping.gops[0].start_time() - 2.3).abs() < 1e-9);
        assert!((grouping.gops[0].end_time() - 2.7).abs() < 1e-9);
    }

    #[test]
    fn test_interval_grouping_conserves_bytes() {
        // 30 fps frames of varying size, windows of 0.25 s
        let frames: Vec<Frame> = (0..300)
            .map(|i| Frame::new(i as f64 / 30.0, 1.0 / 30.0, 1000 + (i * 37 % 500) as u64))
            .collect();
        let expected: u64 = frames.iter().map(|f| f.size).sum();

        let grouping = interval(0.25, 0.0).group(&frames);
        let splits: usize = grouping
            .gops
            .iter()
            .map(|g| g.frames().len())
            .sum::<usize>()
            - frames.len();

        let diff = (grouping.total_size as i64 - expected as i64).unsigned_abs() as usize;
        assert!(diff <= splits.max(1), "diff {} with {} splits", diff, splits);
    }

    #[test]
    fn test_interval_grouping_skips_unresolved_frames() {
        let frames = vec![Frame::unresolved(0, 1.0, 999), Frame::new(0.0, 1.0, 1000)];
        let grouping = interval(1.0, 0.0).group(&frames);
        assert_eq!(grouping.total_size, 1000);
    }

    #[test]
    fn test_interval_grouping_window_count_is_bounded() {
        // Bogus duration spanning a million windows
        let frames = vec![Frame::new(0.0, 1.0e6, 1000)];
        let grouping = group_by_interval(&frames, 1.0, 0.0, 8);
        assert_eq!(grouping.gops.len(), 8);

        // Same for a wide gap between two frames
        let frames = vec![Frame::new(0.0, 0.5, 1000), Frame::new(1.0e6, 0.5, 1000)];
        let grouping = group_by_interval(&frames, 1.0, 0.0, 8);
        assert_eq!(grouping.gops.len(), 8);
        assert_eq!(grouping.gops[0].size(), 1000);
    }

    #[test]
    fn test_interval_grouping_stops_when_windows_stop_advancing() {
        // At 1e17 s one window length is below the f64 resolution
        let frames = vec![Frame::new(1.0e17, 0.5, 1000), Frame::new(1.0e17 + 64.0, 0.5, 1000)];
        let grouping = interval(1.0, 0.0).group(&frames);
        assert!(grouping.gops.len() <= 2);
    }

    #[test]
    fn test_interval_grouping_invalid_window() {
        let frames = vec![Frame::new(0.0, 1.0, 1000)];
        assert!(interval(0.0, 0.0).group(&frames).is_empty());
        assert!(interval(-1.0, 0.0).group(&frames).is_empty());
    }
}
