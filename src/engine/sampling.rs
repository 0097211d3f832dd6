//! Fan-out sampling of all feeds for one evaluation.
//!
//! Each feed is read on its own worker thread so one slow device cannot hold
//! up the others. The caller gets a complete score vector back: feeds that
//! answered within the timeout carry their scores, the rest carry sentinels.
//! A worker that misses the deadline keeps running until its read returns, so
//! the feed's motion history is never left half-updated; its late answer is
//! dropped with the channel. While that worker is still out, the feed is not
//! sampled again: it scores as unavailable without a new thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, TryLockResult};
use std::thread;
use std::time::{Duration, Instant};

use crate::sampler::{FeedScores, SampleKind, SamplerSettings, SignalSampler};

/// Adjustments queued for a sampler that may be busy on a worker thread.
#[derive(Debug, Default)]
struct Pending {
    gain_db: Option<f32>,
    reset_history: bool,
}

/// A feed's sampler plus the bookkeeping that keeps one worker per feed.
pub(crate) struct SharedSampler {
    sampler: Mutex<SignalSampler>,
    in_flight: AtomicBool,
    pending: Mutex<Pending>,
}

impl SharedSampler {
    pub(crate) fn new(sampler: SignalSampler) -> Self {
        Self {
            sampler: Mutex::new(sampler),
            in_flight: AtomicBool::new(false),
            pending: Mutex::new(Pending::default()),
        }
    }

    pub(crate) fn try_lock(&self) -> TryLockResult<MutexGuard<'_, SignalSampler>> {
        self.sampler.try_lock()
    }

    /// Applied before the next read; never waits on a busy device.
    pub(crate) fn queue_gain_db(&self, gain_db: f32) {
        self.update_pending(|pending| pending.gain_db = Some(gain_db));
    }

    /// Drop the motion history before the next read.
    pub(crate) fn queue_history_reset(&self) {
        self.update_pending(|pending| pending.reset_history = true);
    }

    fn update_pending(&self, apply: impl FnOnce(&mut Pending)) {
        match self.pending.lock() {
            Ok(mut pending) => apply(&mut pending),
            Err(poisoned) => apply(&mut poisoned.into_inner()),
        }
    }

    fn apply_pending(&self, sampler: &mut SignalSampler) {
        let pending = match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        if let Some(gain_db) = pending.gain_db {
            sampler.set_gain_db(gain_db);
        }
        if pending.reset_history {
            sampler.reset_history();
        }
    }

    fn claim(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn sample(&self, kind: SampleKind, settings: SamplerSettings) -> Option<FeedScores> {
        match self.sampler.lock() {
            Ok(mut sampler) => {
                self.apply_pending(&mut sampler);
                Some(sampler.sample(kind, settings))
            }
            Err(_) => None,
        }
    }
}

/// Clears the in-flight flag when a worker ends, panics included.
struct Release(Arc<SharedSampler>);

impl Drop for Release {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::SeqCst);
    }
}

pub(crate) fn sample_all(
    samplers: &[Arc<SharedSampler>],
    kind: SampleKind,
    settings: SamplerSettings,
    timeout: Duration,
) -> Vec<FeedScores> {
    let (tx, rx) = mpsc::channel();
    let mut scores = vec![FeedScores::unavailable(); samplers.len()];
    let mut answered = vec![false; samplers.len()];
    let mut pending = 0usize;

    for (i, shared) in samplers.iter().enumerate() {
        if !shared.claim() {
            log::warn!("feed{} still busy with an earlier read; scoring it as unavailable", i + 1);
            answered[i] = true;
            continue;
        }
        let release = Release(Arc::clone(shared));
        let tx = tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("sample-feed{}", i + 1))
            .spawn(move || {
                let result = release.0.sample(kind, settings).unwrap_or_else(|| {
                    log::warn!("feed{} sampler lock poisoned", i + 1);
                    FeedScores::unavailable()
                });
                drop(release);
                // The receiver is gone once the evaluation has timed out.
                let _ = tx.send((i, result));
            });
        match spawned {
            Ok(_) => pending += 1,
            Err(e) => log::warn!("feed{} sampler thread failed to start: {}", i + 1, e),
        }
    }
    drop(tx);

    let deadline = Instant::now() + timeout;
    while pending > 0 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((i, result)) => {
                scores[i] = result;
                answered[i] = true;
                pending -= 1;
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    for (i, done) in answered.iter().enumerate() {
        if !done {
            log::warn!(
                "feed{} did not answer within {}ms; scoring it as unavailable",
                i + 1,
                timeout.as_millis()
            );
        }
    }

    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::GrayFrame;
    use crate::ingest::FeedSource;
    use crate::FeedIndex;
    use anyhow::{anyhow, Result};

    struct Fixed {
        amplitude: f32,
        delay: Duration,
        fail: bool,
    }

    impl FeedSource for Fixed {
        fn read_audio_block(&mut self, block_len: usize) -> Result<Vec<f32>> {
            thread::sleep(self.delay);
            if self.fail {
                return Err(anyhow!("read error"));
            }
            Ok(vec![self.amplitude; block_len])
        }

        fn read_current_frame(&mut self) -> Result<GrayFrame> {
            Ok(GrayFrame::filled(2, 2, 0))
        }
    }

    /// Blocks every audio read until the gate opens.
    struct Gated {
        open: Arc<AtomicBool>,
        reads: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl FeedSource for Gated {
        fn read_audio_block(&mut self, block_len: usize) -> Result<Vec<f32>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            while !self.open.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(vec![0.5; block_len])
        }

        fn read_current_frame(&mut self) -> Result<GrayFrame> {
            Ok(GrayFrame::filled(2, 2, 0))
        }
    }

    fn shared(i: usize, source: impl FeedSource + 'static) -> Arc<SharedSampler> {
        Arc::new(SharedSampler::new(SignalSampler::new(
            FeedIndex::new(i, 8).unwrap(),
            format!("cam{}", i + 1),
            0.0,
            Box::new(source),
        )))
    }

    fn feed(i: usize, amplitude: f32, delay_ms: u64, fail: bool) -> Arc<SharedSampler> {
        shared(
            i,
            Fixed {
                amplitude,
                delay: Duration::from_millis(delay_ms),
                fail,
            },
        )
    }

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn every_feed_is_sampled() {
        let feeds = vec![feed(0, 0.01, 0, false), feed(1, 0.1, 0, false), feed(2, 1.0, 0, false)];
        let scores = sample_all(
            &feeds,
            SampleKind::Loudness,
            SamplerSettings::default(),
            Duration::from_secs(2),
        );
        assert_eq!(scores.len(), 3);
        assert!(scores.iter().all(|s| s.valid));
        assert!((scores[0].loudness_db + 40.0).abs() < 1e-3);
        assert!((scores[1].loudness_db + 20.0).abs() < 1e-3);
        assert!(scores[2].loudness_db.abs() < 1e-3);
    }

    #[test]
    fn failing_feed_does_not_spoil_others() {
        let feeds = vec![feed(0, 0.1, 0, true), feed(1, 0.1, 0, false)];
        let scores = sample_all(
            &feeds,
            SampleKind::Loudness,
            SamplerSettings::default(),
            Duration::from_secs(2),
        );
        assert_eq!(scores[0], FeedScores::unavailable());
        assert!(scores[1].valid);
    }

    #[test]
    fn slow_feed_times_out_to_sentinel() {
        let feeds = vec![feed(0, 0.1, 0, false), feed(1, 0.5, 400, false)];
        let started = Instant::now();
        let scores = sample_all(
            &feeds,
            SampleKind::Loudness,
            SamplerSettings::default(),
            Duration::from_millis(50),
        );
        assert!(started.elapsed() < Duration::from_millis(350));
        assert!(scores[0].valid);
        assert_eq!(scores[1], FeedScores::unavailable());
    }

    #[test]
    fn hung_feed_keeps_a_single_worker() {
        let open = Arc::new(AtomicBool::new(false));
        let reads = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let hung = shared(
            0,
            Gated {
                open: Arc::clone(&open),
                reads: Arc::clone(&reads),
            },
        );
        let feeds = vec![hung, feed(1, 0.1, 0, false)];

        for _ in 0..50 {
            let scores = sample_all(
                &feeds,
                SampleKind::Loudness,
                SamplerSettings::default(),
                Duration::from_millis(20),
            );
            assert_eq!(scores[0], FeedScores::unavailable());
            assert!(scores[1].valid);
        }
        // The caller plus the one worker still stuck in the first read.
        assert_eq!(Arc::strong_count(&feeds[0]), 2);
        assert!(wait_until(|| reads.load(Ordering::SeqCst) == 1));

        open.store(true, Ordering::SeqCst);
        assert!(wait_until(|| Arc::strong_count(&feeds[0]) == 1));
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        let scores = sample_all(
            &feeds,
            SampleKind::Loudness,
            SamplerSettings::default(),
            Duration::from_secs(2),
        );
        assert!(scores[0].valid);
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn queued_adjustments_apply_before_next_read() {
        let feeds = vec![feed(0, 0.1, 0, false)];
        feeds[0].queue_gain_db(6.0);
        let scores = sample_all(
            &feeds,
            SampleKind::Loudness,
            SamplerSettings::default(),
            Duration::from_secs(2),
        );
        assert!((scores[0].loudness_db + 14.0).abs() < 1e-3);

        sample_all(&feeds, SampleKind::Motion, SamplerSettings::default(), Duration::from_secs(2));
        assert!(wait_until(|| feeds[0]
            .try_lock()
            .map(|sampler| sampler.history().len() == 1)
            .unwrap_or(false)));
        feeds[0].queue_history_reset();
        sample_all(&feeds, SampleKind::Motion, SamplerSettings::default(), Duration::from_secs(2));
        assert!(wait_until(|| feeds[0]
            .try_lock()
            .map(|sampler| sampler.history().len() == 1)
            .unwrap_or(false)));
    }
}
