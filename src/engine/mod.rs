//! Switch controller.
//!
//! `SwitchController` owns the feeds, the selection state and the output sink.
//! Each call to `tick` runs one pass of the state machine:
//!
//! 1. apply queued operator commands (tick boundary)
//! 2. refresh the on-air frame, whatever the mode
//! 3. advance the rate limiter
//! 4. when due, sample every feed, join, and run the policy
//! 5. apply a changed selection and notify subscribers
//!
//! Sampling failures are absorbed as sentinel scores. Repeated evaluations in
//! which no feed could be read suspend automatic switching until the operator
//! picks a mode again.

mod command;
mod output;
mod runner;
mod sampling;
mod snapshot;

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, TryLockError};
use std::time::Duration;

use crate::cadence::{RateLimiter, DEFAULT_AUDIO_INTERVAL_TICKS, DEFAULT_MOTION_INTERVAL_TICKS};
use crate::frame::DEFAULT_PIXEL_THRESHOLD;
use crate::ingest::FeedSource;
use crate::policy::{self, Decision, Thresholds};
use crate::sampler::{
    FeedScores, SampleKind, SamplerSettings, SignalSampler, DEFAULT_BLOCK_LEN, SILENCE_DB,
};
use crate::{FeedIndex, Mode, SwitchError};

use command::Command;
use sampling::SharedSampler;

pub use command::ControlHandle;
pub use output::{LogSink, NullSink, OutputSink};
pub use runner::EngineHandle;
pub use snapshot::{FeedSnapshot, Snapshot, SwitchEvent, SwitchReason};

pub const DEFAULT_TICK: Duration = Duration::from_millis(40);
pub const DEFAULT_SAMPLE_TIMEOUT: Duration = Duration::from_millis(200);
pub const DEFAULT_MAX_FAILED_EVALUATIONS: u32 = 5;

// ----------------------------------------------------------------------------
// Settings and state
// ----------------------------------------------------------------------------

/// Everything the controller needs from configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    pub mode: Mode,
    /// Display refresh period.
    pub tick: Duration,
    pub thresholds: Thresholds,
    pub audio_interval_ticks: u32,
    pub motion_interval_ticks: u32,
    pub sampler: SamplerSettings,
    /// Upper bound on one evaluation's sampling.
    pub sample_timeout: Duration,
    /// Consecutive all-failed evaluations before automatic switching is suspended.
    pub max_failed_evaluations: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            tick: DEFAULT_TICK,
            thresholds: Thresholds::default(),
            audio_interval_ticks: DEFAULT_AUDIO_INTERVAL_TICKS,
            motion_interval_ticks: DEFAULT_MOTION_INTERVAL_TICKS,
            sampler: SamplerSettings {
                block_len: DEFAULT_BLOCK_LEN,
                pixel_threshold: DEFAULT_PIXEL_THRESHOLD,
            },
            sample_timeout: DEFAULT_SAMPLE_TIMEOUT,
            max_failed_evaluations: DEFAULT_MAX_FAILED_EVALUATIONS,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), SwitchError> {
        if self.tick.is_zero() {
            return Err(SwitchError::Config("tick period must be greater than zero".into()));
        }
        if self.audio_interval_ticks == 0 || self.motion_interval_ticks == 0 {
            return Err(SwitchError::Config(
                "evaluation intervals must be at least one tick".into(),
            ));
        }
        if self.sampler.block_len == 0 {
            return Err(SwitchError::Config("audio block length must be greater than zero".into()));
        }
        if self.sample_timeout.is_zero() {
            return Err(SwitchError::Config("sample timeout must be greater than zero".into()));
        }
        if !self.thresholds.loudness_db.is_finite() {
            return Err(SwitchError::Config("loudness threshold must be finite".into()));
        }
        if self.max_failed_evaluations == 0 {
            return Err(SwitchError::Config(
                "max_failed_evaluations must be at least one".into(),
            ));
        }
        Ok(())
    }
}

/// Selection state. Only the controller mutates it.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionState {
    pub mode: Mode,
    pub current_feed: FeedIndex,
    /// Ticks since the last evaluation.
    pub tick_counter: u32,
    pub loudness_threshold_db: f32,
    pub motion_threshold: u32,
}

impl SelectionState {
    fn thresholds(&self) -> Thresholds {
        Thresholds {
            loudness_db: self.loudness_threshold_db,
            motion: self.motion_threshold,
        }
    }
}

/// Where a tick currently is. Observable for diagnostics only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickPhase {
    Idle,
    Sampling,
    Applying,
}

/// What one tick did.
#[derive(Clone, Debug, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub decision: Option<Decision>,
    pub switched: Option<SwitchEvent>,
}

impl TickReport {
    pub fn evaluated(&self) -> bool {
        self.decision.is_some()
    }
}

/// One feed handed to the controller at construction.
pub struct FeedSpec {
    pub name: String,
    pub gain_db: f32,
    pub source: Box<dyn FeedSource>,
}

impl FeedSpec {
    pub fn new(name: impl Into<String>, gain_db: f32, source: impl FeedSource + 'static) -> Self {
        Self {
            name: name.into(),
            gain_db,
            source: Box::new(source),
        }
    }
}

struct FeedSlot {
    name: String,
    gain_db: f32,
    sampler: Arc<SharedSampler>,
    loudness_db: f32,
    motion_score: u32,
}

// ----------------------------------------------------------------------------
// SwitchController
// ----------------------------------------------------------------------------

pub struct SwitchController {
    feeds: Vec<FeedSlot>,
    state: SelectionState,
    settings: EngineSettings,
    limiter: RateLimiter,
    sink: Box<dyn OutputSink>,
    commands_tx: Sender<Command>,
    commands_rx: Receiver<Command>,
    subscribers: Vec<Sender<SwitchEvent>>,
    phase: TickPhase,
    ticks: u64,
    evaluations: u64,
    failed_evaluations: u32,
    degraded: bool,
}

impl SwitchController {
    /// Build a controller over `feeds`. Feed 1 is on air initially.
    pub fn new(
        settings: EngineSettings,
        feeds: Vec<FeedSpec>,
        sink: Box<dyn OutputSink>,
    ) -> Result<Self, SwitchError> {
        settings.validate()?;
        if feeds.is_empty() {
            return Err(SwitchError::Config("at least one feed is required".into()));
        }
        if let Some(feed) = feeds.iter().find(|feed| !feed.gain_db.is_finite()) {
            return Err(SwitchError::Config(format!(
                "gain for feed '{}' must be finite",
                feed.name
            )));
        }

        let slots: Vec<FeedSlot> = feeds
            .into_iter()
            .enumerate()
            .map(|(i, spec)| FeedSlot {
                sampler: Arc::new(SharedSampler::new(SignalSampler::new(
                    FeedIndex::from_position(i),
                    spec.name.clone(),
                    spec.gain_db,
                    spec.source,
                ))),
                name: spec.name,
                gain_db: spec.gain_db,
                loudness_db: SILENCE_DB,
                motion_score: 0,
            })
            .collect();

        if !settings.mode.is_supported() {
            log::warn!("{}; automatic switching is paused", SwitchError::UnsupportedMode(settings.mode));
        }
        log::info!(
            "switch controller ready: {} feeds, mode={}, tick={}ms",
            slots.len(),
            settings.mode,
            settings.tick.as_millis()
        );

        let (commands_tx, commands_rx) = mpsc::channel();
        Ok(Self {
            feeds: slots,
            state: SelectionState {
                mode: settings.mode,
                current_feed: FeedIndex::first(),
                tick_counter: 0,
                loudness_threshold_db: settings.thresholds.loudness_db,
                motion_threshold: settings.thresholds.motion,
            },
            limiter: RateLimiter::new(settings.audio_interval_ticks, settings.motion_interval_ticks),
            settings,
            sink,
            commands_tx,
            commands_rx,
            subscribers: Vec::new(),
            phase: TickPhase::Idle,
            ticks: 0,
            evaluations: 0,
            failed_evaluations: 0,
            degraded: false,
        })
    }

    pub fn feed_count(&self) -> usize {
        self.feeds.len()
    }

    pub fn active_feed(&self) -> FeedIndex {
        self.state.current_feed
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn phase(&self) -> TickPhase {
        self.phase
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Handle for queueing operator input from other threads.
    pub fn control(&self) -> ControlHandle {
        ControlHandle::new(self.commands_tx.clone(), self.feeds.len())
    }

    /// Receive a `SwitchEvent` for every change of the current feed.
    pub fn subscribe(&mut self) -> Receiver<SwitchEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Change the switching mode. Re-asserting the current mode is a no-op
    /// unless automatic switching was suspended.
    ///
    /// Entering `AutoMotion` drops every feed's stored frames, so motion is
    /// scored from fresh frames only.
    pub fn set_mode(&mut self, mode: Mode) {
        if mode == self.state.mode && !self.degraded {
            return;
        }
        if !mode.is_supported() {
            log::warn!("{}; automatic switching is paused", SwitchError::UnsupportedMode(mode));
        }
        log::info!("mode {} -> {}", self.state.mode, mode);
        if mode == Mode::AutoMotion {
            for slot in &self.feeds {
                slot.sampler.queue_history_reset();
            }
        }
        self.state.mode = mode;
        self.state.tick_counter = 0;
        self.failed_evaluations = 0;
        self.degraded = false;
    }

    /// Put operator feed `number` (`1..=N`) on air and enter manual mode.
    pub fn select_manual(&mut self, number: usize) -> Result<FeedIndex, SwitchError> {
        let feed = FeedIndex::from_operator(number, self.feeds.len())?;
        self.select(feed, SwitchReason::Manual);
        Ok(feed)
    }

    /// Put the next feed on air (wrapping) and enter manual mode.
    pub fn cycle_next(&mut self) -> FeedIndex {
        let next = self.state.current_feed.next_wrapping(self.feeds.len());
        self.select(next, SwitchReason::Cycle);
        next
    }

    pub fn set_gain_db(&mut self, feed: FeedIndex, gain_db: f32) {
        let Some(slot) = self.feeds.get_mut(feed.get()) else {
            return;
        };
        slot.sampler.queue_gain_db(gain_db);
        log::info!("{} gain {:.1} dB -> {:.1} dB", feed, slot.gain_db, gain_db);
        slot.gain_db = gain_db;
    }

    /// Diagnostics for the operator shell.
    pub fn debug_snapshot(&self) -> Snapshot {
        Snapshot {
            mode: self.state.mode,
            current_feed: self.state.current_feed,
            degraded: self.degraded,
            ticks: self.ticks,
            evaluations: self.evaluations,
            feeds: self
                .feeds
                .iter()
                .enumerate()
                .map(|(i, slot)| FeedSnapshot {
                    index: FeedIndex::from_position(i),
                    name: slot.name.clone(),
                    loudness_db: slot.loudness_db,
                    motion_score: slot.motion_score,
                    active: i == self.state.current_feed.get(),
                    gain_db: slot.gain_db,
                })
                .collect(),
        }
    }

    /// Run one scheduler tick.
    pub fn tick(&mut self) -> TickReport {
        self.apply_commands();
        self.ticks += 1;

        self.phase = TickPhase::Sampling;
        self.refresh_output();

        let mode = self.state.mode;
        let due = self.limiter.on_tick(mode, &mut self.state.tick_counter);
        let mut report = TickReport {
            tick: self.ticks,
            decision: None,
            switched: None,
        };

        if let (true, Some(kind)) = (due, sample_kind(mode)) {
            let samplers: Vec<_> = self.feeds.iter().map(|slot| Arc::clone(&slot.sampler)).collect();
            let scores = sampling::sample_all(
                &samplers,
                kind,
                self.settings.sampler,
                self.settings.sample_timeout,
            );
            if scores.len() != self.feeds.len() {
                log::warn!(
                    "sampling returned {} scores for {} feeds; skipping evaluation",
                    scores.len(),
                    self.feeds.len()
                );
                self.phase = TickPhase::Idle;
                return report;
            }
            self.record_scores(kind, &scores);

            self.phase = TickPhase::Applying;
            let decision = policy::evaluate(mode, self.state.current_feed, &scores, &self.state.thresholds());
            self.evaluations += 1;
            if log::log_enabled!(log::Level::Debug) {
                log::debug!(
                    "evaluation #{} ({}): {} -> {:?}",
                    self.evaluations,
                    mode,
                    self.score_line(kind),
                    decision.outcome
                );
            }
            if decision.switched() {
                report.switched = Some(self.switch_to(decision.feed, reason_for(mode)));
            }
            self.track_failures(&scores);
            report.decision = Some(decision);
        }

        self.phase = TickPhase::Idle;
        report
    }

    fn apply_commands(&mut self) {
        loop {
            match self.commands_rx.try_recv() {
                Ok(Command::SetMode(mode)) => self.set_mode(mode),
                Ok(Command::Select(feed)) => self.select(feed, SwitchReason::Manual),
                Ok(Command::CycleNext) => {
                    self.cycle_next();
                }
                Ok(Command::SetGain(feed, gain_db)) => self.set_gain_db(feed, gain_db),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn select(&mut self, feed: FeedIndex, reason: SwitchReason) {
        if self.state.mode != Mode::Manual {
            self.set_mode(Mode::Manual);
        }
        if feed != self.state.current_feed {
            self.switch_to(feed, reason);
        }
    }

    fn switch_to(&mut self, feed: FeedIndex, reason: SwitchReason) -> SwitchEvent {
        let event = SwitchEvent {
            previous: self.state.current_feed,
            current: feed,
            reason,
            tick: self.ticks,
        };
        self.state.current_feed = feed;
        log::info!(
            "switched {} -> {} ({:?}) [{}]",
            event.previous,
            event.current,
            reason,
            self.feeds[feed.get()].name
        );
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        self.refresh_output();
        event
    }

    /// Hand the on-air feed's current frame to the sink.
    ///
    /// A feed still busy with a timed-out sampling read is skipped for this
    /// tick; the sink keeps showing its previous frame.
    fn refresh_output(&mut self) {
        let feed = self.state.current_feed;
        let frame = match self.feeds[feed.get()].sampler.try_lock() {
            Ok(mut sampler) => sampler.current_frame(),
            Err(TryLockError::WouldBlock) => {
                log::debug!("{} busy; keeping previous frame", feed);
                return;
            }
            Err(TryLockError::Poisoned(_)) => {
                log::warn!("{} sampler lock poisoned; no frame", feed);
                return;
            }
        };
        match frame {
            Ok(frame) => self.sink.render(feed, &frame),
            Err(err) => log::debug!("{}", err),
        }
    }

    fn record_scores(&mut self, kind: SampleKind, scores: &[FeedScores]) {
        for (slot, score) in self.feeds.iter_mut().zip(scores) {
            if matches!(kind, SampleKind::Loudness | SampleKind::Both) {
                slot.loudness_db = score.loudness_db;
            }
            if matches!(kind, SampleKind::Motion | SampleKind::Both) {
                slot.motion_score = score.motion_score;
            }
        }
    }

    fn track_failures(&mut self, scores: &[FeedScores]) {
        if scores.iter().any(|score| score.valid) {
            self.failed_evaluations = 0;
            return;
        }
        self.failed_evaluations += 1;
        log::warn!(
            "no feed could be sampled ({}/{})",
            self.failed_evaluations,
            self.settings.max_failed_evaluations
        );
        if self.failed_evaluations >= self.settings.max_failed_evaluations {
            log::warn!(
                "suspending automatic switching after {} failed evaluations; {} stays on air",
                self.failed_evaluations,
                self.state.current_feed
            );
            self.state.mode = Mode::Disabled;
            self.state.tick_counter = 0;
            self.degraded = true;
        }
    }

    fn score_line(&self, kind: SampleKind) -> String {
        let snapshot = self.debug_snapshot();
        match kind {
            SampleKind::Motion => snapshot.motion_line(),
            SampleKind::Loudness | SampleKind::Both => snapshot.levels_line(),
        }
    }
}

fn sample_kind(mode: Mode) -> Option<SampleKind> {
    match mode {
        Mode::AutoAudio => Some(SampleKind::Loudness),
        Mode::AutoMotion => Some(SampleKind::Motion),
        Mode::Disabled | Mode::AutoCombined | Mode::Manual => None,
    }
}

fn reason_for(mode: Mode) -> SwitchReason {
    match mode {
        Mode::AutoMotion => SwitchReason::Motion,
        Mode::AutoAudio => SwitchReason::Loudness,
        Mode::Disabled | Mode::AutoCombined | Mode::Manual => SwitchReason::Manual,
    }
}
