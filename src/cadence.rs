//! Evaluation cadence.
//!
//! The scheduler ticks at the display rate; policy evaluation is far more
//! expensive (every feed is sampled) and runs on a sub-multiple of it. The
//! `RateLimiter` owns that relationship so it can be tested without a clock.

use crate::Mode;

pub const DEFAULT_AUDIO_INTERVAL_TICKS: u32 = 10;
pub const DEFAULT_MOTION_INTERVAL_TICKS: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimiter {
    audio_interval: u32,
    motion_interval: u32,
}

impl RateLimiter {
    /// Intervals are clamped to at least one tick.
    pub fn new(audio_interval: u32, motion_interval: u32) -> Self {
        Self {
            audio_interval: audio_interval.max(1),
            motion_interval: motion_interval.max(1),
        }
    }

    pub fn audio_interval(&self) -> u32 {
        self.audio_interval
    }

    pub fn motion_interval(&self) -> u32 {
        self.motion_interval
    }

    /// Ticks between evaluations for `mode`; `None` when the mode never evaluates.
    pub fn interval_for(&self, mode: Mode) -> Option<u32> {
        match mode {
            Mode::AutoAudio => Some(self.audio_interval),
            Mode::AutoMotion => Some(self.motion_interval),
            Mode::Disabled | Mode::AutoCombined | Mode::Manual => None,
        }
    }

    /// Count one tick. Returns true when the policy is due, resetting the counter.
    ///
    /// Modes without a cadence hold the counter at zero so a later switch into
    /// an automatic mode waits a full interval before its first evaluation.
    pub fn on_tick(&self, mode: Mode, tick_counter: &mut u32) -> bool {
        *tick_counter = tick_counter.saturating_add(1);
        let Some(interval) = self.interval_for(mode) else {
            *tick_counter = 0;
            return false;
        };
        if *tick_counter / interval >= 1 {
            *tick_counter = 0;
            true
        } else {
            false
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIO_INTERVAL_TICKS, DEFAULT_MOTION_INTERVAL_TICKS)
    }
}
