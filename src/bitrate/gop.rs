//! Accumulation bucket for a group of frames
//!
//! A bucket is either a real GOP (keyframe-delimited, bounds taken from its
//! member frames) or a fixed time window (bounds taken from the window and
//! clipped to the stream extent).

use super::frame::Frame;

#[derive(Debug, Clone, PartialEq)]
pub struct Gop {
    /// `None` for a keyframe-delimited GOP, window length otherwise
    fixed_duration: Option<f64>,
    /// Nominal window start before clipping to the stream extent
    window_start: f64,
    /// Stream extent the window bounds are clipped to
    extent: Option<(f64, f64)>,
    frames: Vec<Frame>,
    size: u64,
}

impl Gop {
    /// Empty keyframe-delimited GOP
    pub fn real() -> Self {
        Self {
            fixed_duration: None,
            window_start: 0.0,
            extent: None,
            frames: Vec::new(),
            size: 0,
        }
    }

    /// Empty fixed window `[window_start, window_start + duration)`
    pub fn window(window_start: f64, duration: f64) -> Self {
        Self {
            fixed_duration: Some(duration),
            window_start,
            extent: None,
            frames: Vec::new(),
            size: 0,
        }
    }

    /// Clip the reported bounds of a fixed window to `[start, end]`
    pub fn with_extent(mut self, start: f64, end: f64) -> Self {
        self.extent = Some((start, end));
        self
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed_duration.is_some()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Accumulated bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn window_start(&self) -> f64 {
        self.window_start
    }

    /// Nominal window end, before clipping
    pub fn window_end(&self) -> Option<f64> {
        self.fixed_duration.map(|d| self.window_start + d)
    }

    /// Add a frame to the bucket.
    ///
    /// In a keyframe GOP an I-frame may only open an empty bucket. A non-I
    /// frame opening the bucket is accepted: packets can arrive out of
    /// presentation order and the earlier I-frame may land later.
    pub fn add(&mut self, frame: Frame) -> Result<(), String> {
        if !self.is_fixed() && frame.is_keyframe() && !self.frames.is_empty() {
            return Err(format!(
                "I-frame at {:?} added to a GOP that already holds {} frames",
                frame.start_time(),
                self.frames.len()
            ));
        }

        let interval = self.window_end().map(|end| (self.window_start, end));
        self.size += frame.overlap_size(interval);
        self.frames.push(frame);
        Ok(())
    }

    pub fn start_time(&self) -> f64 {
        match self.fixed_duration {
            Some(_) => match self.extent {
                Some((start, _)) => self.window_start.max(start),
                None => self.window_start,
            },
            None => self
                .frames
                .iter()
                .filter_map(Frame::start_time)
                .reduce(f64::min)
                .unwrap_or(self.window_start),
        }
    }

    pub fn end_time(&self) -> f64 {
        match self.fixed_duration {
            Some(duration) => {
                let end = self.window_start + duration;
                match self.extent {
                    Some((_, extent_end)) => end.min(extent_end),
                    None => end,
                }
            }
            None => self
                .frames
                .iter()
                .filter_map(Frame::end_time)
                .reduce(f64::max)
                .unwrap_or(self.window_start),
        }
    }

    pub fn duration(&self) -> f64 {
        (self.end_time() - self.start_time()).max(0.0)
    }

    /// Bits per second over the bucket's duration, 0 for an instantaneous bucket
    pub fn bit_rate(&self) -> u64 {
        let duration = self.duration();
        if duration > 0.0 {
            (self.size as f64 * 8.0 / duration).round() as u64
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitrate::frame::FrameType;

    fn typed(start: f64, size: u64, frame_type: FrameType) -> Frame {
        Frame::new(start, 0.5, size).with_frame_type(Some(frame_type))
    }

    #[test]
    fn test_real_gop_bounds_from_members() {
        let mut gop = Gop::real();
        gop.add(typed(2.0, 1000, FrameType::I)).unwrap();
        gop.add(typed(2.5, 500, FrameType::P)).unwrap();
        gop.add(typed(3.0, 500, FrameType::B)).unwrap();

        assert_eq!(gop.start_time(), 2.0);
        assert_eq!(gop.end_time(), 3.5);
        assert_eq!(gop.size(), 2000);
        // 2000 bytes * 8 / 1.5 s
        assert_eq!(gop.bit_rate(), 10667);
    }

    #[test]
    fn test_real_gop_rejects_second_keyframe() {
        let mut gop = Gop::real();
        gop.add(typed(0.0, 1000, FrameType::I)).unwrap();
        assert!(gop.add(typed(0.5, 1000, FrameType::I)).is_err());
        assert_eq!(gop.frames().len(), 1);
    }

    #[test]
    fn test_real_gop_accepts_non_keyframe_first() {
        let mut gop = Gop::real();
        assert!(gop.add(typed(0.0, 100, FrameType::P)).is_ok());
        assert!(gop.add(typed(0.5, 100, FrameType::B)).is_ok());
    }

    #[test]
    fn test_window_apportions_straddling_frame() {
        let mut gop = Gop::window(1.0, 1.0);
        gop.add(Frame::new(0.5, 1.0, 1000)).unwrap();
        assert_eq!(gop.size(), 500);
        assert_eq!(gop.start_time(), 1.0);
        assert_eq!(gop.end_time(), 2.0);
        assert_eq!(gop.bit_rate(), 4000);
    }

    #[test]
    fn test_window_accepts_multiple_keyframes() {
        let mut gop = Gop::window(0.0, 1.0);
        assert!(gop.add(typed(0.0, 10, FrameType::I)).is_ok());
        assert!(gop.add(typed(0.5, 10, FrameType::I)).is_ok());
    }

    #[test]
    fn test_window_clipped_to_extent() {
        let mut gop = Gop::window(9.0, 1.0).with_extent(0.0, 9.5);
        gop.add(Frame::new(9.0, 0.5, 125_000)).unwrap();
        assert_eq!(gop.duration(), 0.5);
        assert_eq!(gop.bit_rate(), 2_000_000);
        assert_eq!(gop.window_start(), 9.0);
    }

    #[test]
    fn test_empty_buckets() {
        assert_eq!(Gop::real().bit_rate(), 0);
        let window = Gop::window(3.0, 1.0);
        assert!(window.is_empty());
        assert_eq!(window.duration(), 1.0);
        assert_eq!(window.bit_rate(), 0);
    }
}
