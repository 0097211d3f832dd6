//! Synthetic feed source.
//!
//! Stands in for a real camera+microphone pair. The audio is a sine tone at a
//! configurable level (dBFS) over a faint noise floor; the picture is a static
//! RGB test pattern with a bright block that drifts across the frame while
//! motion is switched on. Both can be changed at runtime through
//! `SyntheticControls`, which is how the binaries script scenarios.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::{SQRT_2, TAU};
use std::sync::{Arc, Mutex};

use super::normalize::{to_gray, PixelFormat};
use super::FeedSource;
use crate::frame::GrayFrame;

const SAMPLE_RATE_HZ: f32 = 44_100.0;
const TONE_HZ: f32 = 440.0;
const NOISE_AMPLITUDE: f32 = 1.0e-5;
const BLOCK_SIZE_PX: u32 = 24;
const BLOCK_STEP_PX: u32 = 8;

/// Configuration for a synthetic feed.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    /// Tone level in dBFS (RMS). `None` produces digital silence.
    pub level_db: Option<f32>,
    /// Whether the test block moves between frames.
    pub moving: bool,
    /// RNG seed for the noise floor; random when unset.
    pub seed: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            level_db: None,
            moving: false,
            seed: None,
        }
    }
}

#[derive(Clone, Debug)]
struct Scene {
    level_db: Option<f32>,
    moving: bool,
    offline: bool,
}

/// Runtime handle to a synthetic feed's scene.
#[derive(Clone, Debug)]
pub struct SyntheticControls {
    scene: Arc<Mutex<Scene>>,
}

impl SyntheticControls {
    pub fn set_level_db(&self, level_db: Option<f32>) {
        self.update(|scene| scene.level_db = level_db);
    }

    pub fn set_moving(&self, moving: bool) {
        self.update(|scene| scene.moving = moving);
    }

    /// Make every read fail, as an unplugged device would.
    pub fn set_offline(&self, offline: bool) {
        self.update(|scene| scene.offline = offline);
    }

    fn update(&self, apply: impl FnOnce(&mut Scene)) {
        match self.scene.lock() {
            Ok(mut scene) => apply(&mut scene),
            Err(poisoned) => apply(&mut poisoned.into_inner()),
        }
    }
}

pub struct SyntheticSource {
    width: u32,
    height: u32,
    scene: Arc<Mutex<Scene>>,
    rng: StdRng,
    phase: f32,
    block_x: u32,
    frames_read: u64,
    blocks_read: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic feed needs non-zero dimensions"));
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            width: config.width,
            height: config.height,
            scene: Arc::new(Mutex::new(Scene {
                level_db: config.level_db,
                moving: config.moving,
                offline: false,
            })),
            rng,
            phase: 0.0,
            block_x: 0,
            frames_read: 0,
            blocks_read: 0,
        })
    }

    pub fn controls(&self) -> SyntheticControls {
        SyntheticControls {
            scene: self.scene.clone(),
        }
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn blocks_read(&self) -> u64 {
        self.blocks_read
    }

    fn scene(&self) -> Result<Scene> {
        let scene = self
            .scene
            .lock()
            .map_err(|_| anyhow!("synthetic scene lock poisoned"))?;
        if scene.offline {
            return Err(anyhow!("synthetic feed offline"));
        }
        Ok(scene.clone())
    }

    fn render_rgb(&self) -> Vec<u8> {
        let w = self.width as usize;
        let h = self.height as usize;
        let mut rgb = vec![0u8; w * h * 3];
        for y in 0..h {
            for x in 0..w {
                let offset = (y * w + x) * 3;
                // Low-contrast bars so the static background stays well under the motion threshold.
                let shade = 60 + ((x * 8 / w.max(1)) as u8) * 4;
                rgb[offset] = shade;
                rgb[offset + 1] = shade;
                rgb[offset + 2] = shade.saturating_add(10);
            }
        }

        let size = BLOCK_SIZE_PX.min(self.width).min(self.height) as usize;
        let top = (h - size) / 2;
        let left = self.block_x as usize % w;
        for y in top..top + size {
            for dx in 0..size {
                let x = (left + dx) % w;
                let offset = (y * w + x) * 3;
                rgb[offset] = 250;
                rgb[offset + 1] = 240;
                rgb[offset + 2] = 200;
            }
        }
        rgb
    }
}

impl FeedSource for SyntheticSource {
    fn read_audio_block(&mut self, block_len: usize) -> Result<Vec<f32>> {
        let scene = self.scene()?;
        self.blocks_read += 1;

        let Some(level_db) = scene.level_db else {
            return Ok(vec![0.0; block_len]);
        };

        let amplitude = SQRT_2 * 10f32.powf(level_db / 20.0);
        let step = TAU * TONE_HZ / SAMPLE_RATE_HZ;
        let mut block = Vec::with_capacity(block_len);
        for _ in 0..block_len {
            let noise = self.rng.gen_range(-NOISE_AMPLITUDE..=NOISE_AMPLITUDE);
            block.push((amplitude * self.phase.sin() + noise).clamp(-1.0, 1.0));
            self.phase = (self.phase + step) % TAU;
        }
        Ok(block)
    }

    fn read_current_frame(&mut self) -> Result<GrayFrame> {
        let scene = self.scene()?;
        self.frames_read += 1;
        if scene.moving {
            self.block_x = (self.block_x + BLOCK_STEP_PX) % self.width;
        }
        let rgb = self.render_rgb();
        to_gray(&rgb, self.width, self.height, PixelFormat::Rgb24)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{MotionHistory, DEFAULT_PIXEL_THRESHOLD};
    use crate::sampler::loudness_db;

    fn source(level_db: Option<f32>, moving: bool) -> SyntheticSource {
        SyntheticSource::new(SyntheticConfig {
            width: 64,
            height: 48,
            level_db,
            moving,
            seed: Some(7),
        })
        .unwrap()
    }

    #[test]
    fn tone_level_matches_configuration() -> Result<()> {
        let mut src = source(Some(-20.0), false);
        let block = src.read_audio_block(1024)?;
        let db = loudness_db(&block, 0.0);
        assert!((db + 20.0).abs() < 0.5, "measured {db} dB");
        Ok(())
    }

    #[test]
    fn silence_is_all_zero() -> Result<()> {
        let mut src = source(None, false);
        let block = src.read_audio_block(256)?;
        assert_eq!(block.len(), 256);
        assert!(block.iter().all(|s| *s == 0.0));
        Ok(())
    }

    #[test]
    fn moving_block_produces_motion() -> Result<()> {
        let mut src = source(None, true);
        let mut history = MotionHistory::new();
        for _ in 0..3 {
            history.push(src.read_current_frame()?);
        }
        assert!(history.motion_score(DEFAULT_PIXEL_THRESHOLD) > 3);
        Ok(())
    }

    #[test]
    fn static_pattern_produces_no_motion() -> Result<()> {
        let mut src = source(None, false);
        let mut history = MotionHistory::new();
        for _ in 0..3 {
            history.push(src.read_current_frame()?);
        }
        assert_eq!(history.motion_score(DEFAULT_PIXEL_THRESHOLD), 0);
        Ok(())
    }

    #[test]
    fn controls_change_the_running_source() -> Result<()> {
        let mut src = source(None, false);
        let controls = src.controls();

        controls.set_level_db(Some(-6.0));
        let db = loudness_db(&src.read_audio_block(1024)?, 0.0);
        assert!(db > -7.0 && db < -5.0, "measured {db} dB");

        controls.set_offline(true);
        assert!(src.read_audio_block(1024).is_err());
        assert!(src.read_current_frame().is_err());

        controls.set_offline(false);
        assert_eq!(src.read_current_frame()?.width(), 64);
        assert_eq!(src.blocks_read(), 1);
        assert_eq!(src.frames_read(), 1);
        Ok(())
    }
}
