//! Grayscale frames and per-feed motion history.
//!
//! - `GrayFrame`: one 8-bit luma image with its dimensions.
//! - `MotionHistory`: fixed 3-slot FIFO of the most recent frames of one feed.
//!
//! Motion is measured with a three-frame difference: a pixel counts as changed
//! only when it differs both between the newest and oldest frame and between
//! the oldest and middle frame. Counting runs on every 2nd row and column, so
//! thresholds are calibrated against a quarter of the pixels.

use anyhow::{anyhow, Result};
use std::collections::VecDeque;

/// Number of frames the motion difference needs.
pub const HISTORY_LEN: usize = 3;

/// Binary threshold applied to the combined difference mask.
pub const DEFAULT_PIXEL_THRESHOLD: u8 = 32;

/// Row and column step of the changed-pixel count.
const SUBSAMPLE_STEP: usize = 2;

// ----------------------------------------------------------------------------
// GrayFrame
// ----------------------------------------------------------------------------

/// 8-bit grayscale frame, row-major, no padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl GrayFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("gray frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "gray frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Uniform frame, mostly useful for tests and idle feeds.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            data: vec![value; width as usize * height as usize],
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    pub fn same_dimensions(&self, other: &GrayFrame) -> bool {
        self.width == other.width && self.height == other.height
    }
}

// ----------------------------------------------------------------------------
// MotionHistory
// ----------------------------------------------------------------------------

/// The three most recent frames of one feed, oldest first.
///
/// All stored frames share the same dimensions. A frame with different
/// dimensions restarts the history, which puts the feed back into cold start.
#[derive(Debug, Default)]
pub struct MotionHistory {
    frames: VecDeque<GrayFrame>,
}

impl MotionHistory {
    pub fn new() -> Self {
        Self {
            frames: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    /// Push the newest frame, evicting the oldest when full.
    pub fn push(&mut self, frame: GrayFrame) {
        if let Some(latest) = self.frames.back() {
            if !latest.same_dimensions(&frame) {
                log::debug!(
                    "motion history reset: {}x{} -> {}x{}",
                    latest.width(),
                    latest.height(),
                    frame.width(),
                    frame.height()
                );
                self.frames.clear();
            }
        }

        while self.frames.len() >= HISTORY_LEN {
            self.frames.pop_front();
        }

        self.frames.push_back(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() == HISTORY_LEN
    }

    pub fn latest(&self) -> Option<&GrayFrame> {
        self.frames.back()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Changed-pixel count over the stored frames. Zero until the history is full.
    pub fn motion_score(&self, pixel_threshold: u8) -> u32 {
        let (Some(oldest), Some(previous), Some(newest)) =
            (self.frames.front(), self.frames.get(1), self.frames.get(2))
        else {
            return 0;
        };
        count_changed(oldest, previous, newest, pixel_threshold)
    }
}

/// `(|t - (t-2)| AND |(t-2) - (t-1)|) > threshold`, sampled on even rows and columns.
fn count_changed(oldest: &GrayFrame, previous: &GrayFrame, newest: &GrayFrame, threshold: u8) -> u32 {
    let width = newest.width as usize;
    let height = newest.height as usize;
    let mut changed = 0u32;

    for y in (0..height).step_by(SUBSAMPLE_STEP) {
        let row = y * width;
        for x in (0..width).step_by(SUBSAMPLE_STEP) {
            let i = row + x;
            let diff_a = newest.data[i].abs_diff(oldest.data[i]);
            let diff_b = oldest.data[i].abs_diff(previous.data[i]);
            if diff_a & diff_b > threshold {
                changed += 1;
            }
        }
    }

    changed
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_block(width: u32, height: u32, value: u8, block: (u32, u32, u32)) -> GrayFrame {
        let (bx, by, size) = block;
        let mut data = vec![0u8; (width * height) as usize];
        for y in by..(by + size).min(height) {
            for x in bx..(bx + size).min(width) {
                data[(y * width + x) as usize] = value;
            }
        }
        GrayFrame::new(data, width, height).unwrap()
    }

    #[test]
    fn gray_frame_validates_length() {
        assert!(GrayFrame::new(vec![0; 12], 4, 3).is_ok());
        assert!(GrayFrame::new(vec![0; 11], 4, 3).is_err());
    }

    #[test]
    fn cold_start_scores_zero() {
        let mut history = MotionHistory::new();
        assert_eq!(history.motion_score(DEFAULT_PIXEL_THRESHOLD), 0);

        history.push(GrayFrame::filled(8, 8, 0));
        history.push(GrayFrame::filled(8, 8, 255));
        assert_eq!(history.len(), 2);
        assert_eq!(history.motion_score(DEFAULT_PIXEL_THRESHOLD), 0);
    }

    #[test]
    fn history_keeps_three_most_recent_frames() {
        let mut history = MotionHistory::new();
        for value in [10u8, 20, 30, 40, 50] {
            history.push(GrayFrame::filled(2, 2, value));
        }
        assert_eq!(history.len(), HISTORY_LEN);
        assert!(history.is_full());
        assert_eq!(history.latest().unwrap().pixel(0, 0), Some(50));
        assert_eq!(history.frames.front().unwrap().pixel(0, 0), Some(30));
    }

    #[test]
    fn dimension_change_restarts_history() {
        let mut history = MotionHistory::new();
        history.push(GrayFrame::filled(4, 4, 0));
        history.push(GrayFrame::filled(4, 4, 100));
        history.push(GrayFrame::filled(2, 2, 200));
        assert_eq!(history.len(), 1);
        assert_eq!(history.motion_score(DEFAULT_PIXEL_THRESHOLD), 0);
    }

    #[test]
    fn static_scene_has_no_motion() {
        let mut history = MotionHistory::new();
        for _ in 0..3 {
            history.push(GrayFrame::filled(16, 16, 90));
        }
        assert_eq!(history.motion_score(DEFAULT_PIXEL_THRESHOLD), 0);
    }

    #[test]
    fn uniform_change_counts_subsampled_pixels() {
        let mut history = MotionHistory::new();
        history.push(GrayFrame::filled(5, 3, 0));
        history.push(GrayFrame::filled(5, 3, 100));
        history.push(GrayFrame::filled(5, 3, 200));
        // |200-0| & |0-100| = 200 & 100 = 64; rows 0,2 x cols 0,2,4
        assert_eq!(history.motion_score(DEFAULT_PIXEL_THRESHOLD), 6);
    }

    #[test]
    fn mask_uses_bitwise_and_of_differences() {
        let mut history = MotionHistory::new();
        // |128-0| = 128, |0-64| = 64, 128 & 64 = 0: no pixel counts.
        history.push(GrayFrame::filled(4, 4, 0));
        history.push(GrayFrame::filled(4, 4, 64));
        history.push(GrayFrame::filled(4, 4, 128));
        assert_eq!(history.motion_score(DEFAULT_PIXEL_THRESHOLD), 0);
    }

    #[test]
    fn change_at_threshold_is_ignored() {
        let mut history = MotionHistory::new();
        history.push(GrayFrame::filled(4, 4, 0));
        history.push(GrayFrame::filled(4, 4, 32));
        history.push(GrayFrame::filled(4, 4, 32));
        // 32 & 32 = 32, not above the threshold
        assert_eq!(history.motion_score(DEFAULT_PIXEL_THRESHOLD), 0);
        assert_eq!(history.motion_score(31), 4);
    }

    #[test]
    fn moving_block_is_detected_on_even_grid_only() {
        let mut history = MotionHistory::new();
        history.push(frame_with_block(16, 16, 255, (0, 0, 4)));
        history.push(frame_with_block(16, 16, 0, (0, 0, 4)));
        history.push(frame_with_block(16, 16, 0, (0, 0, 4)));
        // block present only in the oldest frame: diff_a = 255, diff_b = 255
        assert_eq!(history.motion_score(DEFAULT_PIXEL_THRESHOLD), 4);

        let mut odd = MotionHistory::new();
        odd.push(frame_with_block(16, 16, 255, (1, 1, 1)));
        odd.push(frame_with_block(16, 16, 0, (1, 1, 1)));
        odd.push(frame_with_block(16, 16, 0, (1, 1, 1)));
        assert_eq!(odd.motion_score(DEFAULT_PIXEL_THRESHOLD), 0);
    }
}
