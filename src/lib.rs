//! Automatic feed switcher
//!
//! This crate implements the source selection engine of a live multi-camera
//! production switcher. Several co-located camera+microphone feeds are sampled
//! on a fixed tick, and the engine decides which single feed is shown.
//!
//! # Architecture
//!
//! The engine is built leaf-first:
//!
//! 1. **MotionHistory** (`frame`): a 3-slot ring of grayscale frames per feed.
//! 2. **SignalSampler** (`sampler`): loudness (dB RMS + gain) and motion
//!    (changed-pixel count) scores for one feed.
//! 3. **SelectionPolicy** (`policy`): pure decision over a score vector.
//! 4. **SwitchController** (`engine`): tick scheduler, mode state, rate
//!    limiting (`cadence`), operator commands and switch notifications.
//!
//! Device capture and decoding are external collaborators. The engine only
//! sees them through the `FeedSource` capability trait (`ingest`).
//!
//! # Module Structure
//!
//! - `frame`: grayscale frames and motion history
//! - `ingest`: the `FeedSource` trait, synthetic feeds, pixel normalisation
//! - `sampler`, `policy`, `cadence`: decision pipeline
//! - `engine`: controller, scheduler thread, operator handle, output sink
//! - `config`: file + environment configuration

use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub mod cadence;
pub mod config;
pub mod engine;
pub mod frame;
pub mod ingest;
pub mod policy;
pub mod sampler;

pub use cadence::RateLimiter;
pub use config::{FeedSettings, SwitcherConfig};
pub use engine::{
    ControlHandle, EngineHandle, EngineSettings, FeedSnapshot, FeedSpec, LogSink, NullSink,
    OutputSink, SelectionState, Snapshot, SwitchController, SwitchEvent, SwitchReason,
    TickPhase, TickReport,
};
pub use frame::{GrayFrame, MotionHistory, DEFAULT_PIXEL_THRESHOLD, HISTORY_LEN};
pub use ingest::{FeedSource, SyntheticConfig, SyntheticControls, SyntheticSource};
pub use policy::{Decision, Outcome, Thresholds};
pub use sampler::{loudness_db, FeedScores, SampleKind, SignalSampler, SILENCE_DB};

// -------------------- Feed Identity --------------------

/// Validated index of a feed within the engine's feed collection.
///
/// Only constructible through range-checked constructors, so any `FeedIndex`
/// handed out by the engine addresses an existing feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FeedIndex(usize);

impl FeedIndex {
    /// Zero-based index, checked against the number of feeds.
    pub fn new(index: usize, feed_count: usize) -> Result<Self, SwitchError> {
        if index >= feed_count {
            return Err(SwitchError::InvalidManualSelection {
                requested: index,
                feeds: feed_count,
            });
        }
        Ok(Self(index))
    }

    /// Operator numbering: feed `1..=N` maps to index `0..N`.
    pub fn from_operator(number: usize, feed_count: usize) -> Result<Self, SwitchError> {
        if number == 0 || number > feed_count {
            return Err(SwitchError::InvalidManualSelection {
                requested: number,
                feeds: feed_count,
            });
        }
        Ok(Self(number - 1))
    }

    /// The first feed. Every engine has at least one.
    pub fn first() -> Self {
        Self(0)
    }

    pub fn get(self) -> usize {
        self.0
    }

    /// One-based number as shown to the operator.
    pub fn operator_number(self) -> usize {
        self.0 + 1
    }

    /// Next feed, wrapping to the first after the last.
    pub fn next_wrapping(self, feed_count: usize) -> Self {
        if self.0 + 1 >= feed_count {
            Self(0)
        } else {
            Self(self.0 + 1)
        }
    }

    pub(crate) fn from_position(index: usize) -> Self {
        Self(index)
    }
}

impl std::fmt::Display for FeedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "feed{}", self.operator_number())
    }
}

// -------------------- Modes --------------------

/// Switching strategy. Every variant has an explicit handler in the policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Automatic switching off; the current feed stays on air.
    Disabled,
    /// Switch to the loudest feed above the loudness threshold.
    #[default]
    AutoAudio,
    /// Switch to the feed with the most motion when the scene is unambiguous.
    AutoMotion,
    /// Reserved. Behaves as `Disabled`.
    AutoCombined,
    /// Operator picks the feed; scores are ignored.
    Manual,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::Disabled,
        Mode::AutoAudio,
        Mode::AutoMotion,
        Mode::AutoCombined,
        Mode::Manual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Disabled => "disabled",
            Mode::AutoAudio => "auto_audio",
            Mode::AutoMotion => "auto_motion",
            Mode::AutoCombined => "auto_combined",
            Mode::Manual => "manual",
        }
    }

    /// True when the engine has a working implementation for the mode.
    pub fn is_supported(self) -> bool {
        !matches!(self, Mode::AutoCombined)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = SwitchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disabled" | "off" => Ok(Mode::Disabled),
            "auto_audio" | "audio" => Ok(Mode::AutoAudio),
            "auto_motion" | "motion" => Ok(Mode::AutoMotion),
            "auto_combined" | "combined" => Ok(Mode::AutoCombined),
            "manual" => Ok(Mode::Manual),
            other => Err(SwitchError::Config(format!("unknown mode '{}'", other))),
        }
    }
}

// -------------------- Errors --------------------

/// Operator-facing error taxonomy.
///
/// Sampling errors never escape a tick; they are recorded as sentinel scores.
/// Only `Config` is fatal, and only at startup.
#[derive(Clone, Debug, PartialEq)]
pub enum SwitchError {
    /// A feed could not be read (device error or timeout).
    SampleUnavailable { feed: usize, reason: String },
    /// Manual selection outside the feed range. State is unchanged.
    InvalidManualSelection { requested: usize, feeds: usize },
    /// The mode has no implementation and acts as a no-op.
    UnsupportedMode(Mode),
    /// The engine thread is gone; commands cannot be delivered.
    EngineStopped,
    /// Configuration rejected at startup.
    Config(String),
}

impl SwitchError {
    pub fn code(&self) -> &'static str {
        match self {
            SwitchError::SampleUnavailable { .. } => "SAMPLE_UNAVAILABLE",
            SwitchError::InvalidManualSelection { .. } => "INVALID_MANUAL_SELECTION",
            SwitchError::UnsupportedMode(_) => "UNSUPPORTED_MODE",
            SwitchError::EngineStopped => "ENGINE_STOPPED",
            SwitchError::Config(_) => "CONFIG_INVALID",
        }
    }
}

impl std::fmt::Display for SwitchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwitchError::SampleUnavailable { feed, reason } => {
                write!(f, "{}: feed index {}: {}", self.code(), feed, reason)
            }
            SwitchError::InvalidManualSelection { requested, feeds } => write!(
                f,
                "{}: feed {} is out of range ({} feeds available)",
                self.code(),
                requested,
                feeds
            ),
            SwitchError::UnsupportedMode(mode) => {
                write!(f, "{}: mode {} is not implemented", self.code(), mode)
            }
            SwitchError::EngineStopped => write!(f, "{}: engine is not running", self.code()),
            SwitchError::Config(message) => write!(f, "{}: {}", self.code(), message),
        }
    }
}

impl std::error::Error for SwitchError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_numbers_are_one_based() {
        assert_eq!(FeedIndex::from_operator(1, 4).unwrap().get(), 0);
        assert_eq!(FeedIndex::from_operator(4, 4).unwrap().get(), 3);
        assert!(FeedIndex::from_operator(0, 4).is_err());

        let err = FeedIndex::from_operator(7, 4).unwrap_err();
        assert_eq!(
            err,
            SwitchError::InvalidManualSelection {
                requested: 7,
                feeds: 4
            }
        );
        assert_eq!(err.code(), "INVALID_MANUAL_SELECTION");
    }

    #[test]
    fn next_wraps_to_first_feed() {
        let last = FeedIndex::new(2, 3).unwrap();
        assert_eq!(last.next_wrapping(3), FeedIndex::first());
        assert_eq!(FeedIndex::first().next_wrapping(3).get(), 1);
        assert_eq!(FeedIndex::first().next_wrapping(1), FeedIndex::first());
    }

    #[test]
    fn mode_parses_short_and_long_names() {
        assert_eq!("audio".parse::<Mode>().unwrap(), Mode::AutoAudio);
        assert_eq!("AUTO_MOTION".parse::<Mode>().unwrap(), Mode::AutoMotion);
        assert_eq!(" manual ".parse::<Mode>().unwrap(), Mode::Manual);
        assert!("loudest".parse::<Mode>().is_err());
        for mode in Mode::ALL {
            assert_eq!(mode.as_str().parse::<Mode>().unwrap(), mode);
        }
    }

    #[test]
    fn only_combined_mode_is_unsupported() {
        let unsupported: Vec<Mode> = Mode::ALL
            .into_iter()
            .filter(|mode| !mode.is_supported())
            .collect();
        assert_eq!(unsupported, vec![Mode::AutoCombined]);
    }
}
