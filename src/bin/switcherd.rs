//! switcherd - automatic feed switcher daemon
//!
//! Runs the switch engine over synthetic feeds and reads operator commands
//! from stdin:
//!
//! - `1`..`N`            put feed N on air (manual mode)
//! - `n`                 cycle to the next feed (manual mode)
//! - `a` / `m` / `d` / `x` / `manual`
//!                       auto audio / auto motion / disabled / auto combined / manual
//! - `level N DB|off`    set feed N's tone level in dBFS, or silence it
//! - `move N on|off`     start or stop motion on feed N
//! - `unplug N` / `plug N`
//! - `gain N DB`         set feed N's gain offset
//! - `s`                 print the diagnostics line
//! - `q`                 quit (Ctrl-C works too)

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::BufRead;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use feed_switcher::{
    ControlHandle, EngineHandle, FeedSpec, LogSink, Mode, SwitchController, SwitcherConfig,
    SyntheticConfig, SyntheticControls, SyntheticSource,
};

#[derive(Parser, Debug)]
#[command(name = "switcherd", about = "Automatic multi-camera feed switcher")]
struct Args {
    /// Starting mode (overrides config): disabled|auto_audio|auto_motion|auto_combined|manual
    #[arg(long)]
    mode: Option<Mode>,
    /// Number of synthetic feeds (overrides config)
    #[arg(long)]
    feeds: Option<usize>,
    /// Initial tone level of every feed in dBFS
    #[arg(long, default_value_t = -45.0, allow_hyphen_values = true)]
    level_db: f32,
    /// Seconds between periodic status lines (0 disables them)
    #[arg(long, default_value_t = 5)]
    status_secs: u64,
}

enum Input {
    Line(String),
    Quit,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = SwitcherConfig::load()?;
    if let Some(mode) = args.mode {
        cfg.engine.mode = mode;
    }
    if let Some(count) = args.feeds {
        if count == 0 {
            return Err(anyhow!("--feeds must be >= 1"));
        }
        cfg.feeds.truncate(count);
        let existing = cfg.feeds.len();
        cfg.feeds
            .extend((existing..count).map(feed_switcher::FeedSettings::numbered));
    }

    let mut feeds = Vec::with_capacity(cfg.feeds.len());
    let mut scenes = Vec::with_capacity(cfg.feeds.len());
    for feed in &cfg.feeds {
        let source = SyntheticSource::new(SyntheticConfig {
            width: feed.width,
            height: feed.height,
            level_db: Some(args.level_db),
            ..SyntheticConfig::default()
        })?;
        scenes.push(source.controls());
        feeds.push(FeedSpec::new(feed.name.clone(), feed.gain_db, source));
    }

    let mut controller = SwitchController::new(cfg.engine.clone(), feeds, Box::new(LogSink::new()))?;
    let events = controller.subscribe();
    let engine = controller.spawn()?;
    let control = engine.control();

    let (tx, rx) = mpsc::channel();
    let ctrlc_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(Input::Quit);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;
    std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(Input::Line(line)).is_err() {
                    break;
                }
            }
            let _ = tx.send(Input::Quit);
        })?;

    log::info!(
        "switcherd running: {} feeds, mode={} (type 'q' or Ctrl-C to stop)",
        cfg.feeds.len(),
        cfg.engine.mode
    );

    let poll = Duration::from_millis(250);
    let status_every = Duration::from_secs(args.status_secs);
    let mut since_status = Duration::ZERO;
    loop {
        match rx.recv_timeout(poll) {
            Ok(Input::Quit) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(Input::Line(line)) => {
                if line.trim() == "q" {
                    break;
                }
                if let Err(err) = handle_command(&line, &control, &scenes, &engine) {
                    log::warn!("{}", err);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                since_status += poll;
                if !status_every.is_zero() && since_status >= status_every {
                    since_status = Duration::ZERO;
                    print_status(&engine);
                }
            }
        }
        while let Ok(event) = events.try_recv() {
            log::info!(
                "on air: {} -> {} ({:?}, tick {})",
                event.previous,
                event.current,
                event.reason,
                event.tick
            );
        }
    }

    log::info!("shutdown requested, stopping switch engine...");
    let controller = engine.stop()?;
    log::info!("final state: {}", controller.debug_snapshot().levels_line());
    Ok(())
}

fn handle_command(
    line: &str,
    control: &ControlHandle,
    scenes: &[SyntheticControls],
    engine: &EngineHandle,
) -> Result<()> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        [] => Ok(()),
        ["n"] => Ok(control.cycle_next()?),
        ["a"] => Ok(control.set_mode(Mode::AutoAudio)?),
        ["m"] => Ok(control.set_mode(Mode::AutoMotion)?),
        ["d"] => Ok(control.set_mode(Mode::Disabled)?),
        ["x"] => Ok(control.set_mode(Mode::AutoCombined)?),
        ["manual"] => Ok(control.set_mode(Mode::Manual)?),
        ["s"] => {
            print_status(engine);
            Ok(())
        }
        ["level", feed, "off"] => {
            scene(scenes, feed)?.set_level_db(None);
            Ok(())
        }
        ["level", feed, db] => {
            scene(scenes, feed)?.set_level_db(Some(parse_db(db)?));
            Ok(())
        }
        ["move", feed, state] => {
            let moving = match *state {
                "on" => true,
                "off" => false,
                other => return Err(anyhow!("expected on|off, got '{}'", other)),
            };
            scene(scenes, feed)?.set_moving(moving);
            Ok(())
        }
        ["unplug", feed] => {
            scene(scenes, feed)?.set_offline(true);
            Ok(())
        }
        ["plug", feed] => {
            scene(scenes, feed)?.set_offline(false);
            Ok(())
        }
        ["gain", feed, db] => Ok(control.set_gain_db(parse_feed(feed)?, parse_db(db)?)?),
        [number] => {
            let number = parse_feed(number)?;
            control.select_manual(number)?;
            Ok(())
        }
        _ => Err(anyhow!("unrecognised command '{}'", line.trim())),
    }
}

fn print_status(engine: &EngineHandle) {
    let snapshot = engine.snapshot();
    let mut line = format!(
        "[{}] levels: {} | motion: {}",
        snapshot.mode,
        snapshot.levels_line(),
        snapshot.motion_line()
    );
    if snapshot.degraded {
        line.push_str(" | automatic switching suspended");
    }
    println!("{}", line);
}

fn scene<'a>(scenes: &'a [SyntheticControls], feed: &str) -> Result<&'a SyntheticControls> {
    let number = parse_feed(feed)?;
    number
        .checked_sub(1)
        .and_then(|i| scenes.get(i))
        .ok_or_else(|| anyhow!("feed {} is out of range (1..={})", number, scenes.len()))
}

fn parse_feed(value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| anyhow!("'{}' is not a feed number", value))
}

fn parse_db(value: &str) -> Result<f32> {
    value
        .parse()
        .map_err(|_| anyhow!("'{}' is not a level in dB", value))
}
