use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::EngineSettings;
use crate::policy::Thresholds;
use crate::sampler::SamplerSettings;
use crate::Mode;

const DEFAULT_FEED_COUNT: usize = 3;
const DEFAULT_FEED_WIDTH: u32 = 320;
const DEFAULT_FEED_HEIGHT: u32 = 240;

#[derive(Debug, Deserialize, Default)]
struct SwitcherConfigFile {
    mode: Option<String>,
    tick_ms: Option<u64>,
    audio: Option<AudioConfigFile>,
    motion: Option<MotionConfigFile>,
    sampling: Option<SamplingConfigFile>,
    feeds: Option<Vec<FeedConfigFile>>,
}

#[derive(Debug, Deserialize, Default)]
struct AudioConfigFile {
    block_len: Option<usize>,
    interval_ticks: Option<u32>,
    threshold_db: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct MotionConfigFile {
    interval_ticks: Option<u32>,
    threshold: Option<u32>,
    pixel_threshold: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplingConfigFile {
    timeout_ms: Option<u64>,
    max_failed_evaluations: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct FeedConfigFile {
    name: Option<String>,
    gain_db: Option<f32>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Engine settings plus the feed list, as loaded at startup.
#[derive(Debug, Clone)]
pub struct SwitcherConfig {
    pub engine: EngineSettings,
    pub feeds: Vec<FeedSettings>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedSettings {
    pub name: String,
    pub gain_db: f32,
    pub width: u32,
    pub height: u32,
}

impl FeedSettings {
    /// Default settings for the feed at zero-based position `index`.
    pub fn numbered(index: usize) -> Self {
        Self {
            name: format!("cam{}", index + 1),
            gain_db: 0.0,
            width: DEFAULT_FEED_WIDTH,
            height: DEFAULT_FEED_HEIGHT,
        }
    }
}

impl Default for SwitcherConfig {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            feeds: (0..DEFAULT_FEED_COUNT).map(FeedSettings::numbered).collect(),
        }
    }
}

impl SwitcherConfig {
    /// Defaults, then the file named by `SWITCHER_CONFIG`, then `SWITCHER_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SWITCHER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        Self::build(file_cfg.unwrap_or_default())
    }

    /// Like `load`, with an explicit file instead of `SWITCHER_CONFIG`.
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::build(read_config_file(path)?)
    }

    fn build(file: SwitcherConfigFile) -> Result<Self> {
        let mut cfg = Self::from_file(file)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SwitcherConfigFile) -> Result<Self> {
        let defaults = EngineSettings::default();
        let mode = match file.mode.as_deref() {
            Some(mode) => parse_mode(mode)?,
            None => defaults.mode,
        };
        let audio = file.audio.unwrap_or_default();
        let motion = file.motion.unwrap_or_default();
        let sampling = file.sampling.unwrap_or_default();

        let engine = EngineSettings {
            mode,
            tick: file
                .tick_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick),
            thresholds: Thresholds {
                loudness_db: audio
                    .threshold_db
                    .unwrap_or(defaults.thresholds.loudness_db),
                motion: motion.threshold.unwrap_or(defaults.thresholds.motion),
            },
            audio_interval_ticks: audio
                .interval_ticks
                .unwrap_or(defaults.audio_interval_ticks),
            motion_interval_ticks: motion
                .interval_ticks
                .unwrap_or(defaults.motion_interval_ticks),
            sampler: SamplerSettings {
                block_len: audio.block_len.unwrap_or(defaults.sampler.block_len),
                pixel_threshold: motion
                    .pixel_threshold
                    .unwrap_or(defaults.sampler.pixel_threshold),
            },
            sample_timeout: sampling
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.sample_timeout),
            max_failed_evaluations: sampling
                .max_failed_evaluations
                .unwrap_or(defaults.max_failed_evaluations),
        };

        let feeds = match file.feeds {
            Some(feeds) => feeds
                .into_iter()
                .enumerate()
                .map(|(i, feed)| {
                    let fallback = FeedSettings::numbered(i);
                    FeedSettings {
                        name: feed.name.unwrap_or(fallback.name),
                        gain_db: feed.gain_db.unwrap_or(fallback.gain_db),
                        width: feed.width.unwrap_or(fallback.width),
                        height: feed.height.unwrap_or(fallback.height),
                    }
                })
                .collect(),
            None => (0..DEFAULT_FEED_COUNT).map(FeedSettings::numbered).collect(),
        };

        Ok(Self { engine, feeds })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(mode) = env_value("SWITCHER_MODE") {
            self.engine.mode = parse_mode(&mode)?;
        }
        if let Some(tick_ms) = env_parse::<u64>("SWITCHER_TICK_MS", "an integer number of milliseconds")? {
            self.engine.tick = Duration::from_millis(tick_ms);
        }
        if let Some(ticks) = env_parse::<u32>("SWITCHER_AUDIO_INTERVAL", "an integer tick count")? {
            self.engine.audio_interval_ticks = ticks;
        }
        if let Some(db) = env_parse::<f32>("SWITCHER_LOUDNESS_THRESHOLD_DB", "a number of decibels")? {
            self.engine.thresholds.loudness_db = db;
        }
        if let Some(ticks) = env_parse::<u32>("SWITCHER_MOTION_INTERVAL", "an integer tick count")? {
            self.engine.motion_interval_ticks = ticks;
        }
        if let Some(pixels) = env_parse::<u32>("SWITCHER_MOTION_THRESHOLD", "an integer pixel count")? {
            self.engine.thresholds.motion = pixels;
        }
        if let Some(ms) = env_parse::<u64>("SWITCHER_SAMPLE_TIMEOUT_MS", "an integer number of milliseconds")? {
            self.engine.sample_timeout = Duration::from_millis(ms);
        }
        if let Some(count) = env_parse::<usize>("SWITCHER_FEEDS", "an integer feed count")? {
            self.feeds.truncate(count);
            let existing = self.feeds.len();
            self.feeds
                .extend((existing..count).map(FeedSettings::numbered));
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.feeds.is_empty() {
            return Err(anyhow!("at least one feed must be configured"));
        }
        for feed in &self.feeds {
            if feed.name.trim().is_empty() {
                return Err(anyhow!("feed names must not be empty"));
            }
            if !feed.gain_db.is_finite() {
                return Err(anyhow!("gain for feed '{}' must be finite", feed.name));
            }
            if feed.width == 0 || feed.height == 0 {
                return Err(anyhow!("feed '{}' must have non-zero dimensions", feed.name));
            }
        }
        self.engine.validate()?;
        Ok(())
    }
}

fn parse_mode(value: &str) -> Result<Mode> {
    Mode::from_str(value).map_err(|e| anyhow!(e))
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str, expected: &str) -> Result<Option<T>> {
    match env_value(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be {}", key, expected)),
        None => Ok(None),
    }
}

fn read_config_file(path: &Path) -> Result<SwitcherConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
