use crate::frame::GrayFrame;
use crate::FeedIndex;

/// Rendering collaborator. Receives the active feed's frame every tick.
///
/// Called on the scheduler thread; implementations should hand the frame off
/// and return quickly.
pub trait OutputSink: Send {
    fn render(&mut self, feed: FeedIndex, frame: &GrayFrame);
}

/// Discards frames.
#[derive(Debug, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn render(&mut self, _feed: FeedIndex, _frame: &GrayFrame) {}
}

/// Logs what would be put on screen.
#[derive(Debug, Default)]
pub struct LogSink {
    frames: u64,
    on_air: Option<FeedIndex>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl OutputSink for LogSink {
    fn render(&mut self, feed: FeedIndex, frame: &GrayFrame) {
        self.frames += 1;
        if self.on_air != Some(feed) {
            log::debug!(
                "output: now showing {} ({}x{})",
                feed,
                frame.width(),
                frame.height()
            );
            self.on_air = Some(feed);
        }
        log::trace!("output: frame #{} from {}", self.frames, feed);
    }
}
