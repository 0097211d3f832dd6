//! Operator commands.
//!
//! The UI shell runs on other threads than the scheduler. Its requests are
//! queued here and applied by the controller at the start of the next tick,
//! so they never race the controller's own write of the current feed.

use std::sync::mpsc::Sender;

use crate::{FeedIndex, Mode, SwitchError};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Command {
    SetMode(Mode),
    Select(FeedIndex),
    CycleNext,
    SetGain(FeedIndex, f32),
}

/// Cloneable handle for queueing operator input to a controller.
#[derive(Clone, Debug)]
pub struct ControlHandle {
    tx: Sender<Command>,
    feed_count: usize,
}

impl ControlHandle {
    pub(crate) fn new(tx: Sender<Command>, feed_count: usize) -> Self {
        Self { tx, feed_count }
    }

    pub fn feed_count(&self) -> usize {
        self.feed_count
    }

    pub fn set_mode(&self, mode: Mode) -> Result<(), SwitchError> {
        self.send(Command::SetMode(mode))
    }

    /// Queue a manual selection by operator number (`1..=N`).
    ///
    /// Out-of-range numbers are rejected here and never reach the engine.
    pub fn select_manual(&self, number: usize) -> Result<FeedIndex, SwitchError> {
        let feed = FeedIndex::from_operator(number, self.feed_count)?;
        self.send(Command::Select(feed))?;
        Ok(feed)
    }

    /// Queue a switch to the next feed, wrapping after the last.
    pub fn cycle_next(&self) -> Result<(), SwitchError> {
        self.send(Command::CycleNext)
    }

    pub fn set_gain_db(&self, number: usize, gain_db: f32) -> Result<(), SwitchError> {
        if !gain_db.is_finite() {
            return Err(SwitchError::Config(format!(
                "gain must be finite, got {}",
                gain_db
            )));
        }
        let feed = FeedIndex::from_operator(number, self.feed_count)?;
        self.send(Command::SetGain(feed, gain_db))
    }

    fn send(&self, command: Command) -> Result<(), SwitchError> {
        self.tx
            .send(command)
            .map_err(|_| SwitchError::EngineStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn out_of_range_selection_is_not_queued() {
        let (tx, rx) = mpsc::channel();
        let handle = ControlHandle::new(tx, 4);

        let err = handle.select_manual(7).unwrap_err();
        assert_eq!(err.code(), "INVALID_MANUAL_SELECTION");
        assert!(rx.try_recv().is_err());

        assert_eq!(handle.select_manual(2).unwrap().get(), 1);
        assert_eq!(rx.try_recv().unwrap(), Command::Select(FeedIndex::new(1, 4).unwrap()));
    }

    #[test]
    fn non_finite_gain_is_rejected() {
        let (tx, rx) = mpsc::channel();
        let handle = ControlHandle::new(tx, 2);
        assert!(handle.set_gain_db(1, f32::NAN).is_err());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stopped_engine_reports_error() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let handle = ControlHandle::new(tx, 2);
        assert_eq!(handle.set_mode(Mode::Manual), Err(SwitchError::EngineStopped));
        assert_eq!(handle.cycle_next(), Err(SwitchError::EngineStopped));
    }
}
