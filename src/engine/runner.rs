//! Scheduler thread.
//!
//! Drives `SwitchController::tick` at the configured period on a dedicated
//! thread and publishes a diagnostics snapshot after every tick.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::{ControlHandle, Snapshot, SwitchController};
use crate::FeedIndex;

/// Handle to a running controller.
///
/// Dropping the handle asks the thread to stop without waiting for it;
/// `stop` waits and hands the controller back.
pub struct EngineHandle {
    control: ControlHandle,
    snapshot: Arc<Mutex<Snapshot>>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<SwitchController>>,
}

impl EngineHandle {
    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    /// Snapshot published after the most recent tick.
    pub fn snapshot(&self) -> Snapshot {
        match self.snapshot.lock() {
            Ok(snapshot) => snapshot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn active_feed(&self) -> FeedIndex {
        self.snapshot().current_feed
    }

    pub fn is_running(&self) -> bool {
        self.join
            .as_ref()
            .map(|join| !join.is_finished())
            .unwrap_or(false)
    }

    pub fn stop(mut self) -> Result<SwitchController> {
        self.shutdown.store(true, Ordering::SeqCst);
        let join = self
            .join
            .take()
            .ok_or_else(|| anyhow!("switch engine already stopped"))?;
        join.join()
            .map_err(|_| anyhow!("switch engine thread panicked"))
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl SwitchController {
    /// Move the controller onto its own scheduler thread.
    pub fn spawn(self) -> Result<EngineHandle> {
        let control = self.control();
        let snapshot = Arc::new(Mutex::new(self.debug_snapshot()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let snapshot_thread = Arc::clone(&snapshot);
        let shutdown_thread = Arc::clone(&shutdown);
        let join = thread::Builder::new()
            .name("switch-engine".into())
            .spawn(move || run(self, snapshot_thread, shutdown_thread))?;

        Ok(EngineHandle {
            control,
            snapshot,
            shutdown,
            join: Some(join),
        })
    }
}

fn run(
    mut controller: SwitchController,
    snapshot: Arc<Mutex<Snapshot>>,
    shutdown: Arc<AtomicBool>,
) -> SwitchController {
    let period = controller.settings().tick;
    log::info!("switch engine running (tick {}ms)", period.as_millis());

    let mut next = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        controller.tick();
        publish(&snapshot, controller.debug_snapshot());

        next += period;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            // Overran; restart the schedule instead of bursting to catch up.
            log::trace!("tick overran by {}ms", (now - next).as_millis());
            next = now;
        }
    }

    log::info!("switch engine stopped after {} ticks", controller.debug_snapshot().ticks);
    controller
}

fn publish(slot: &Mutex<Snapshot>, snapshot: Snapshot) {
    match slot.lock() {
        Ok(mut current) => *current = snapshot,
        Err(poisoned) => *poisoned.into_inner() = snapshot,
    }
}
