//! Frame collection for one probed stream
//!
//! Holds frames sorted by start time as they stream in, reconstructs
//! missing timestamps once the stream ends, and serves plot series and
//! bit-rate statistics from cached groupings.
//!
//! Lifecycle: created empty, filled with `add` while the probe runs,
//! finalized with `analyze`, then queried any number of times. `clear`
//! returns it to the empty state.

use log::{debug, info, warn};
use std::cmp::Ordering;

use super::frame::Frame;
use super::grouping::{Grouping, GroupingStrategy};
use crate::config::EngineConfig;
use crate::types::{BitRateStats, DataPoint, PlotSeries, ViewMode};

/// Fixed-interval grouping together with the parameters it was built for
#[derive(Debug, Clone)]
struct IntervalCache {
    window_length: f64,
    start_offset: f64,
    grouping: Grouping,
}

#[derive(Debug, Clone)]
pub struct FrameCollection {
    frames: Vec<Frame>,
    adjust_start_time: bool,
    /// Stream start from container metadata, overrides the first frame's timestamp
    start_time: Option<f64>,
    window_length: f64,
    needs_backfill: bool,
    max_frame_size: Option<u64>,
    keyframe_cache: Option<Grouping>,
    interval_cache: Option<IntervalCache>,
    keyframe_computations: usize,
    interval_computations: usize,
}

impl Default for FrameCollection {
    fn default() -> Self {
        Self::with_config(&EngineConfig::default())
    }
}

impl FrameCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        Self {
            frames: Vec::new(),
            adjust_start_time: config.adjust_start_time,
            start_time: None,
            window_length: config.window_length,
            needs_backfill: false,
            max_frame_size: None,
            keyframe_cache: None,
            interval_cache: None,
            keyframe_computations: 0,
            interval_computations: 0,
        }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Some frame still lacks a start time and `analyze` has not run since
    pub fn needs_backfill(&self) -> bool {
        self.needs_backfill
    }

    pub fn window_length(&self) -> f64 {
        self.window_length
    }

    pub fn adjust_start_time(&self) -> bool {
        self.adjust_start_time
    }

    /// Insert a frame keeping the sequence sorted.
    ///
    /// `force_order` overrides the frame's own `is_ordered` flag. Unordered
    /// frames are placed by a backward scan from the tail, ordered ones are
    /// appended when they strictly follow the tail and searched for
    /// otherwise. Returns the index the frame landed at, or `None` if a
    /// frame with the same key is already present.
    pub fn add(&mut self, frame: Frame, force_order: Option<bool>) -> Option<usize> {
        let needs_order = force_order.unwrap_or(!frame.is_ordered);

        let index = if !needs_order && self.follows_tail(&frame) {
            self.frames.len()
        } else {
            self.find_position(&frame)?
        };

        if !frame.is_resolved() {
            self.needs_backfill = true;
        }
        self.max_frame_size = Some(self.max_frame_size.map_or(frame.size, |m| m.max(frame.size)));
        self.frames.insert(index, frame);
        self.invalidate();
        Some(index)
    }

    /// The frame's key is strictly greater than the tail's key of the same kind
    fn follows_tail(&self, frame: &Frame) -> bool {
        let Some(last) = self.frames.last() else {
            return true;
        };
        match (last.start_time(), frame.start_time()) {
            (Some(a), Some(b)) => a < b,
            (_, None) => matches!((last.byte_offset, frame.byte_offset), (Some(a), Some(b)) if a < b),
            (None, Some(_)) => false,
        }
    }

    fn find_position(&self, frame: &Frame) -> Option<usize> {
        let index = match frame.start_time() {
            Some(start) => self.position_by_time(start, frame.byte_offset),
            None => match frame.byte_offset {
                Some(offset) => self.position_by_offset(offset, 0, self.frames.len()),
                None => Some(self.frames.len()),
            },
        };
        if index.is_none() {
            debug!(
                "Duplicate frame at {:?} (offset {:?}) rejected",
                frame.start_time(),
                frame.byte_offset
            );
        }
        index
    }

    /// Slot between the nearest earlier and later timestamped frames.
    ///
    /// Unresolved frames in that gap are ordered by byte offset; without an
    /// offset the frame goes after them.
    fn position_by_time(&self, start: f64, byte_offset: Option<u64>) -> Option<usize> {
        let mut lower = 0;
        let mut upper = self.frames.len();
        for (idx, existing) in self.frames.iter().enumerate().rev() {
            let Some(existing_start) = existing.start_time() else {
                continue;
            };
            match existing_start.partial_cmp(&start) {
                Some(Ordering::Less) => {
                    lower = idx + 1;
                    break;
                }
                Some(Ordering::Equal) => return None,
                _ => upper = idx,
            }
        }

        match byte_offset {
            Some(offset) => self.position_by_offset(offset, lower, upper),
            None => Some(upper),
        }
    }

    /// Index right after the last frame in `lower..upper` with a smaller byte
    /// offset. Frames without an offset are skipped; if none carries one the
    /// frame goes to `upper`.
    fn position_by_offset(&self, offset: u64, lower: usize, upper: usize) -> Option<usize> {
        let mut index = upper;
        for idx in (lower..upper).rev() {
            match self.frames[idx].byte_offset {
                Some(existing) if existing == offset => return None,
                Some(existing) if existing < offset => return Some(idx + 1),
                Some(_) => index = idx,
                None => continue,
            }
        }
        Some(index)
    }

    /// Finalize the collection once the stream has ended.
    ///
    /// Frames without a start time get one from a running clock: every
    /// resolved frame resets the clock to its end, every unresolved frame
    /// starts at the clock and advances it by its duration. Calling it
    /// again is a no-op.
    pub fn analyze(&mut self) {
        if !self.needs_backfill {
            debug!("analyze: {} frames, no back-fill needed", self.frames.len());
            return;
        }

        let mut clock = 0.0;
        let mut anchors = 0usize;
        let mut filled = 0usize;
        for frame in self.frames.iter_mut() {
            match frame.start_time() {
                Some(start) => {
                    clock = start + frame.duration;
                    anchors += 1;
                }
                None => {
                    frame.resolve_start_time(clock);
                    clock += frame.duration;
                    filled += 1;
                }
            }
        }

        if anchors == 0 {
            warn!(
                "No frame carried a timestamp, assumed a contiguous timeline from 0 for {} frames",
                filled
            );
        }

        let sorted = self
            .frames
            .windows(2)
            .all(|w| w[0].start_time() <= w[1].start_time());
        if !sorted {
            warn!("Back-filled timestamps out of order, re-sorting {} frames", self.frames.len());
            self.frames.sort_by(|a, b| {
                let a = a.start_time().unwrap_or(0.0);
                let b = b.start_time().unwrap_or(0.0);
                a.total_cmp(&b)
            });
        }

        self.needs_backfill = false;
        self.invalidate();
        info!(
            "analyze: back-filled {} of {} frames ({} anchors)",
            filled,
            self.frames.len(),
            anchors
        );
    }

    /// Drop all frames, the start time override and cached groupings
    pub fn clear(&mut self) {
        self.frames.clear();
        self.start_time = None;
        self.needs_backfill = false;
        self.max_frame_size = None;
        self.keyframe_computations = 0;
        self.interval_computations = 0;
        self.invalidate();
    }

    pub fn set_adjust_start_time(&mut self, adjust: bool) {
        if self.adjust_start_time != adjust {
            self.adjust_start_time = adjust;
            self.invalidate();
        }
    }

    /// Stream start reported by the container, used as the display origin
    pub fn set_start_time(&mut self, start_time: Option<f64>) {
        if self.start_time != start_time {
            self.start_time = start_time;
            self.invalidate();
        }
    }

    fn invalidate(&mut self) {
        self.keyframe_cache = None;
        self.interval_cache = None;
    }

    /// Time subtracted from every displayed timestamp
    pub fn start_offset(&self) -> f64 {
        if !self.adjust_start_time {
            return 0.0;
        }
        self.start_time
            .or_else(|| self.frames.iter().find_map(Frame::start_time))
            .unwrap_or(0.0)
    }

    /// Span from the first frame's start to the furthest frame end
    pub fn duration(&self) -> Option<f64> {
        let start = self.frames.iter().find_map(Frame::start_time)?;
        let end = self
            .frames
            .iter()
            .filter_map(Frame::end_time)
            .fold(start, f64::max);
        Some(end - start)
    }

    fn furthest_end(&self) -> Option<f64> {
        self.frames.iter().filter_map(Frame::end_time).reduce(f64::max)
    }

    /// Keyframe-delimited GOPs, computed once per change to the frames
    pub fn gops_by_keyframe(&mut self) -> &Grouping {
        let frames = &self.frames;
        let computations = &mut self.keyframe_computations;
        self.keyframe_cache.get_or_insert_with(|| {
            *computations += 1;
            GroupingStrategy::Keyframe.group(frames)
        })
    }

    /// Fixed windows for the given parameters.
    ///
    /// The last result is reused while the parameters match.
    pub fn gops_by_interval(&mut self, window_length: f64, start_offset: f64) -> &Grouping {
        let fresh = matches!(
            &self.interval_cache,
            Some(cache) if cache.window_length == window_length && cache.start_offset == start_offset
        );
        if fresh {
            debug!(
                "Interval grouping cache hit (window={}s, offset={}s)",
                window_length, start_offset
            );
        } else {
            self.interval_cache = None;
        }

        let frames = &self.frames;
        let computations = &mut self.interval_computations;
        let cache = self.interval_cache.get_or_insert_with(|| {
            *computations += 1;
            IntervalCache {
                window_length,
                start_offset,
                grouping: GroupingStrategy::Interval {
                    window_length,
                    start_offset,
                }
                .group(frames),
            }
        });
        &cache.grouping
    }

    /// Fixed windows for the configured window length and current display origin
    pub fn gops_by_second(&mut self) -> &Grouping {
        let start_offset = self.start_offset();
        let window_length = self.window_length;
        self.gops_by_interval(window_length, start_offset)
    }

    fn bucket_grouping(&mut self, view: ViewMode) -> Option<&Grouping> {
        match view {
            ViewMode::Frame => None,
            ViewMode::Gop => Some(self.gops_by_keyframe()),
            ViewMode::Second => Some(self.gops_by_second()),
        }
    }

    /// Plot coordinates for `view`, y divided by `size_divisor`.
    ///
    /// Bucket views get one point per bucket start plus a closing point at
    /// the last bucket's end.
    pub fn data_points(&mut self, view: ViewMode, size_divisor: u64) -> Vec<DataPoint> {
        let offset = self.start_offset();
        let divisor = size_divisor.max(1) as f64;

        if view == ViewMode::Frame {
            return self
                .frames
                .iter()
                .filter_map(|f| {
                    f.start_time()
                        .map(|start| DataPoint::new(start - offset, f.size as f64 / divisor))
                })
                .collect();
        }

        let Some(grouping) = self.bucket_grouping(view) else {
            return Vec::new();
        };

        let mut points: Vec<DataPoint> = grouping
            .gops
            .iter()
            .map(|gop| DataPoint::new(gop.start_time() - offset, gop.bit_rate() as f64 / divisor))
            .collect();
        if let (Some(last), Some(end)) = (points.last().copied(), grouping.end_time()) {
            points.push(DataPoint::new(end - offset, last.y));
        }
        points
    }

    /// Right edge of the plot in displayed seconds
    pub fn max_x(&mut self, view: ViewMode) -> Option<f64> {
        let offset = self.start_offset();
        let end = match view {
            ViewMode::Frame => self.furthest_end(),
            _ => self.bucket_grouping(view).and_then(Grouping::end_time),
        };
        end.map(|end| end - offset)
    }

    /// Largest unscaled y value: frame size in bytes, or bucket bit rate in bits/s
    pub fn max_y(&mut self, view: ViewMode) -> u64 {
        match view {
            ViewMode::Frame => self.max_frame_size.unwrap_or(0),
            _ => self
                .bucket_grouping(view)
                .and_then(|grouping| grouping.max_bit_rate)
                .unwrap_or(0),
        }
    }

    /// Average, max and min bit rate over the fixed-interval windows.
    ///
    /// The average is total bytes over the stream's duration, not a mean of
    /// window bit rates. Everything is `None` for an empty or zero-length
    /// stream.
    pub fn bit_rate_stats(&mut self) -> BitRateStats {
        let Some(duration) = self.duration().filter(|d| *d > 0.0) else {
            return BitRateStats::default();
        };

        let grouping = self.gops_by_second();
        let avg = (grouping.total_size as f64 * 8.0 / duration).round() as u64;
        BitRateStats {
            avg: Some(avg),
            max: grouping.max_bit_rate,
            min: grouping.min_bit_rate,
        }
    }

    pub fn plot_series(&mut self, view: ViewMode, size_divisor: u64) -> PlotSeries {
        PlotSeries {
            view,
            data_points: self.data_points(view, size_divisor),
            max_x: self.max_x(view),
            max_y: self.max_y(view),
            stats: self.bit_rate_stats(),
        }
    }
}
