//! Selection policy.
//!
//! A pure decision over one evaluation's score vector: given the mode, the
//! feed currently on air and the thresholds, pick the feed that should be on
//! air next. Nothing here reads devices, keeps state or logs.

use crate::sampler::FeedScores;
use crate::{FeedIndex, Mode};

pub const DEFAULT_LOUDNESS_THRESHOLD_DB: f32 = -29.0;
pub const DEFAULT_MOTION_THRESHOLD: u32 = 3;

/// Above this many moving feeds the scene is treated as ambiguous.
const MAX_UNAMBIGUOUS_ACTIVE: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    /// A feed must be strictly louder than this to be selected.
    pub loudness_db: f32,
    /// A feed must score strictly more changed pixels than this to count as moving.
    pub motion: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            loudness_db: DEFAULT_LOUDNESS_THRESHOLD_DB,
            motion: DEFAULT_MOTION_THRESHOLD,
        }
    }
}

/// Why the policy returned what it returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// A different feed won.
    Switched,
    /// The winner is already on air.
    Kept,
    /// Nothing cleared the threshold.
    BelowThreshold,
    /// More than two feeds are moving; the policy defers.
    Ambiguous { active: usize },
    /// The mode does not evaluate scores (`Disabled`, `Manual`).
    Skipped,
    /// The mode has no implementation (`AutoCombined`).
    Unsupported,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decision {
    pub feed: FeedIndex,
    pub outcome: Outcome,
}

impl Decision {
    fn stay(current: FeedIndex, outcome: Outcome) -> Self {
        Self {
            feed: current,
            outcome,
        }
    }

    /// `winner` is a position in a score vector of `feed_count` entries.
    fn pick(current: FeedIndex, winner: usize, feed_count: usize) -> Self {
        let Ok(feed) = FeedIndex::new(winner, feed_count) else {
            return Self::stay(current, Outcome::Skipped);
        };
        let outcome = if feed == current {
            Outcome::Kept
        } else {
            Outcome::Switched
        };
        Self { feed, outcome }
    }

    pub fn switched(&self) -> bool {
        self.outcome == Outcome::Switched
    }
}

/// Decide the next feed. `scores` must hold exactly one entry per feed, in
/// feed order; the returned feed always indexes into `scores`.
///
/// A score vector that does not cover `current` is malformed and leaves the
/// selection alone.
pub fn evaluate(
    mode: Mode,
    current: FeedIndex,
    scores: &[FeedScores],
    thresholds: &Thresholds,
) -> Decision {
    if current.get() >= scores.len() {
        return Decision::stay(current, Outcome::Skipped);
    }

    match mode {
        Mode::Disabled | Mode::Manual => Decision::stay(current, Outcome::Skipped),
        Mode::AutoCombined => Decision::stay(current, Outcome::Unsupported),
        Mode::AutoAudio => select_by_loudness(current, scores, thresholds.loudness_db),
        Mode::AutoMotion => select_by_motion(current, scores, thresholds.motion),
    }
}

/// Loudest feed, if it clears the threshold.
///
/// Several feeds above the threshold (a multi-speaker scene) are handled the
/// same way as one: the single loudest still wins.
fn select_by_loudness(current: FeedIndex, scores: &[FeedScores], threshold_db: f32) -> Decision {
    let Some(loudest) = argmax_by(scores.iter().map(|s| comparable_db(s.loudness_db))) else {
        return Decision::stay(current, Outcome::BelowThreshold);
    };
    if comparable_db(scores[loudest].loudness_db) > threshold_db {
        Decision::pick(current, loudest, scores.len())
    } else {
        Decision::stay(current, Outcome::BelowThreshold)
    }
}

/// Feed with the most motion, when one or two feeds are moving.
fn select_by_motion(current: FeedIndex, scores: &[FeedScores], threshold: u32) -> Decision {
    let active = scores.iter().filter(|s| s.motion_score > threshold).count();
    match active {
        0 => Decision::stay(current, Outcome::BelowThreshold),
        1..=MAX_UNAMBIGUOUS_ACTIVE => {
            let moving = scores.iter().map(|s| {
                if s.motion_score > threshold {
                    s.motion_score as f32
                } else {
                    f32::NEG_INFINITY
                }
            });
            match argmax_by(moving) {
                Some(winner) => Decision::pick(current, winner, scores.len()),
                None => Decision::stay(current, Outcome::BelowThreshold),
            }
        }
        _ => Decision::stay(current, Outcome::Ambiguous { active }),
    }
}

/// NaN never wins a comparison.
fn comparable_db(db: f32) -> f32 {
    if db.is_nan() {
        f32::NEG_INFINITY
    } else {
        db
    }
}

/// Index of the maximum; the first index wins exact ties.
fn argmax_by(values: impl Iterator<Item = f32>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, value) in values.enumerate() {
        match best {
            Some((_, top)) if value <= top => {}
            _ => best = Some((i, value)),
        }
    }
    best.map(|(i, _)| i)
}
