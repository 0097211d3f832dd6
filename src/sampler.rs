//! Per-feed signal sampling.
//!
//! `SignalSampler` owns one feed's source, gain and motion history, and turns
//! raw reads into the two scores the policy works with. Read failures are
//! absorbed here: the score falls back to its sentinel and the failure is only
//! visible through `FeedScores::valid` and the log.

use anyhow::{anyhow, Result};

use crate::frame::{GrayFrame, MotionHistory};
use crate::ingest::FeedSource;
use crate::{FeedIndex, SwitchError};

/// Samples per loudness block.
pub const DEFAULT_BLOCK_LEN: usize = 1024;

/// Loudness reported for silence and for feeds that could not be read.
pub const SILENCE_DB: f32 = f32::NEG_INFINITY;

/// `20 * log10(rms) + gain_db`, or `SILENCE_DB` when the block is empty,
/// silent or yields a non-finite level.
pub fn loudness_db(samples: &[f32], gain_db: f32) -> f32 {
    if samples.is_empty() {
        return SILENCE_DB;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (sum_sq / samples.len() as f64).sqrt();
    if rms <= 0.0 || !rms.is_finite() {
        return SILENCE_DB;
    }
    let db = (20.0 * rms.log10()) as f32 + gain_db;
    if db.is_nan() {
        return SILENCE_DB;
    }
    db
}

/// Which signals an evaluation needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleKind {
    Loudness,
    Motion,
    Both,
}

impl SampleKind {
    fn loudness(self) -> bool {
        matches!(self, SampleKind::Loudness | SampleKind::Both)
    }

    fn motion(self) -> bool {
        matches!(self, SampleKind::Motion | SampleKind::Both)
    }
}

/// Scores of one feed for one evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeedScores {
    pub loudness_db: f32,
    pub motion_score: u32,
    /// False when every requested read failed or timed out.
    pub valid: bool,
}

impl FeedScores {
    /// Sentinel scores for a feed that produced nothing this evaluation.
    pub fn unavailable() -> Self {
        Self {
            loudness_db: SILENCE_DB,
            motion_score: 0,
            valid: false,
        }
    }

    pub fn loudness(loudness_db: f32) -> Self {
        Self {
            loudness_db,
            motion_score: 0,
            valid: true,
        }
    }

    pub fn motion(motion_score: u32) -> Self {
        Self {
            loudness_db: SILENCE_DB,
            motion_score,
            valid: true,
        }
    }
}

impl Default for FeedScores {
    fn default() -> Self {
        Self::unavailable()
    }
}

/// Sampling parameters shared by all feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerSettings {
    pub block_len: usize,
    pub pixel_threshold: u8,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            block_len: DEFAULT_BLOCK_LEN,
            pixel_threshold: crate::frame::DEFAULT_PIXEL_THRESHOLD,
        }
    }
}

pub struct SignalSampler {
    index: FeedIndex,
    name: String,
    gain_db: f32,
    source: Box<dyn FeedSource>,
    history: MotionHistory,
}

impl SignalSampler {
    pub fn new(index: FeedIndex, name: impl Into<String>, gain_db: f32, source: Box<dyn FeedSource>) -> Self {
        Self {
            index,
            name: name.into(),
            gain_db,
            source,
            history: MotionHistory::new(),
        }
    }

    pub fn index(&self) -> FeedIndex {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn set_gain_db(&mut self, gain_db: f32) {
        self.gain_db = gain_db;
    }

    /// Forget stored frames so motion scoring starts cold again.
    pub fn reset_history(&mut self) {
        self.history.clear();
    }

    pub fn history(&self) -> &MotionHistory {
        &self.history
    }

    /// Loudness of one fresh audio block; `SILENCE_DB` on read failure.
    pub fn sample_loudness(&mut self, block_len: usize) -> f32 {
        match self.read_loudness(block_len) {
            Ok(db) => db,
            Err(err) => {
                log::debug!("{}", err);
                SILENCE_DB
            }
        }
    }

    /// Push the current frame into the history and score it; 0 on read failure
    /// or while fewer than three frames are stored.
    pub fn sample_motion(&mut self, pixel_threshold: u8) -> u32 {
        match self.read_motion(pixel_threshold) {
            Ok(score) => score,
            Err(err) => {
                log::debug!("{}", err);
                0
            }
        }
    }

    /// Sample the requested signals, recording whether any read succeeded.
    pub fn sample(&mut self, kind: SampleKind, settings: SamplerSettings) -> FeedScores {
        let mut scores = FeedScores::unavailable();
        let mut failures = Vec::new();

        if kind.loudness() {
            match self.read_loudness(settings.block_len) {
                Ok(db) => {
                    scores.loudness_db = db;
                    scores.valid = true;
                }
                Err(err) => failures.push(err),
            }
        }
        if kind.motion() {
            match self.read_motion(settings.pixel_threshold) {
                Ok(score) => {
                    scores.motion_score = score;
                    scores.valid = true;
                }
                Err(err) => failures.push(err),
            }
        }

        for err in failures {
            log::debug!("{}", err);
        }
        scores
    }

    /// Frame for display. Does not touch the motion history.
    pub fn current_frame(&mut self) -> Result<GrayFrame> {
        self.source.read_current_frame().map_err(|e| {
            anyhow!(SwitchError::SampleUnavailable {
                feed: self.index.get(),
                reason: format!("{} frame read failed: {}", self.name, e),
            })
        })
    }

    fn read_loudness(&mut self, block_len: usize) -> Result<f32, SwitchError> {
        let block = self
            .source
            .read_audio_block(block_len)
            .map_err(|e| self.unavailable(format!("audio read failed: {}", e)))?;
        Ok(loudness_db(&block, self.gain_db))
    }

    fn read_motion(&mut self, pixel_threshold: u8) -> Result<u32, SwitchError> {
        let frame = self
            .source
            .read_current_frame()
            .map_err(|e| self.unavailable(format!("frame read failed: {}", e)))?;
        self.history.push(frame);
        Ok(self.history.motion_score(pixel_threshold))
    }

    fn unavailable(&self, reason: String) -> SwitchError {
        SwitchError::SampleUnavailable {
            feed: self.index.get(),
            reason: format!("{}: {}", self.name, reason),
        }
    }
}
