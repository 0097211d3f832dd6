//! Feed sources.
//!
//! A feed is one camera plus its microphone, switched as a single unit. The
//! engine never talks to capture devices; it consumes two capabilities per
//! feed through `FeedSource`:
//! - a fixed-size block of raw mono audio samples
//! - the current decoded frame, already reduced to grayscale
//!
//! Device enumeration, codec setup and sample-format negotiation belong to
//! the implementor. This module ships the synthetic source used by the
//! binaries and tests, plus the pixel normalisation it relies on.

mod normalize;
pub mod synthetic;

use anyhow::Result;

use crate::frame::GrayFrame;

pub use normalize::{to_gray, PixelFormat};
pub use synthetic::{SyntheticConfig, SyntheticControls, SyntheticSource};

/// Capability object for one feed.
///
/// Calls may block on device I/O; the engine bounds them with a timeout and
/// runs them off the scheduler thread. Implementations report failures as
/// errors and never panic on a bad read.
pub trait FeedSource: Send {
    /// Read `block_len` mono samples in `[-1.0, 1.0]`.
    fn read_audio_block(&mut self, block_len: usize) -> Result<Vec<f32>>;

    /// Grab the frame currently on the feed.
    fn read_current_frame(&mut self) -> Result<GrayFrame>;
}

impl<S: FeedSource + ?Sized> FeedSource for Box<S> {
    fn read_audio_block(&mut self, block_len: usize) -> Result<Vec<f32>> {
        (**self).read_audio_block(block_len)
    }

    fn read_current_frame(&mut self) -> Result<GrayFrame> {
        (**self).read_current_frame()
    }
}
