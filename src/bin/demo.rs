//! demo - scripted synthetic run of the feed switcher
//!
//! Drives a controller tick by tick through a few scenes (a loud feed, a
//! moving feed, an operator override, unplugged feeds) and reports whether the
//! engine put the expected feed on air.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::time::Duration;

use feed_switcher::{
    EngineSettings, FeedIndex, FeedSpec, Mode, NullSink, SwitchController, SyntheticConfig,
    SyntheticControls, SyntheticSource,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of synthetic feeds.
    #[arg(long, default_value_t = 3)]
    feeds: usize,
    /// Sleep this long between ticks (0 runs as fast as possible).
    #[arg(long, default_value_t = 0)]
    pace_ms: u64,
    /// Deterministic seed for the noise floor.
    #[arg(long)]
    seed: Option<u64>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

struct Rig {
    controller: SwitchController,
    scenes: Vec<SyntheticControls>,
    pace: Duration,
}

impl Rig {
    fn new(args: &Args) -> Result<Self> {
        let mut feeds = Vec::with_capacity(args.feeds);
        let mut scenes = Vec::with_capacity(args.feeds);
        for i in 0..args.feeds {
            let source = SyntheticSource::new(SyntheticConfig {
                width: 96,
                height: 64,
                level_db: Some(-45.0),
                moving: false,
                seed: args.seed.map(|seed| seed.wrapping_add(i as u64)),
            })?;
            scenes.push(source.controls());
            feeds.push(FeedSpec::new(format!("cam{}", i + 1), 0.0, source));
        }
        let controller = SwitchController::new(EngineSettings::default(), feeds, Box::new(NullSink))?;
        Ok(Self {
            controller,
            scenes,
            pace: Duration::from_millis(args.pace_ms),
        })
    }

    fn run(&mut self, progress: &ui::ScenarioProgress, ticks: u64) {
        for _ in 0..ticks {
            let report = self.controller.tick();
            if let Some(event) = report.switched {
                progress.note(&format!(
                    "tick {}: {} -> {} ({:?})",
                    event.tick, event.previous, event.current, event.reason
                ));
            }
            let snapshot = self.controller.debug_snapshot();
            let status = match self.controller.mode() {
                Mode::AutoMotion => snapshot.motion_line(),
                _ => snapshot.levels_line(),
            };
            progress.tick(&status);
            if !self.pace.is_zero() {
                std::thread::sleep(self.pace);
            }
        }
    }

    fn reset_scenes(&self) {
        for scene in &self.scenes {
            scene.set_level_db(Some(-45.0));
            scene.set_moving(false);
            scene.set_offline(false);
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if args.feeds < 2 {
        return Err(anyhow!("--feeds must be >= 2"));
    }
    let ui = ui::Ui::new(
        ui::UiMode::parse(&args.ui),
        std::io::stderr().is_terminal(),
        !std::io::stdout().is_terminal(),
    );
    let mut rig = Rig::new(&args)?;
    let last = FeedIndex::new(args.feeds - 1, args.feeds)?;
    let mut failures = 0;

    {
        let progress = ui.scenario("loudest feed", 20);
        rig.scenes[1].set_level_db(Some(-12.0));
        rig.run(&progress, 20);
        let on_air = rig.controller.active_feed();
        let passed = on_air.get() == 1;
        failures += usize::from(!passed);
        progress.finish(passed, format!("on air: {}", on_air));
    }

    {
        rig.reset_scenes();
        rig.controller.set_mode(Mode::AutoMotion);
        let progress = ui.scenario("moving feed", 30);
        rig.scenes[last.get()].set_moving(true);
        rig.run(&progress, 30);
        let on_air = rig.controller.active_feed();
        let passed = on_air == last;
        failures += usize::from(!passed);
        progress.finish(passed, format!("on air: {}", on_air));
    }

    {
        rig.reset_scenes();
        let progress = ui.scenario("operator override", 30);
        rig.controller.select_manual(1)?;
        rig.scenes[1].set_level_db(Some(-6.0));
        rig.run(&progress, 30);
        let on_air = rig.controller.active_feed();
        let passed = on_air == FeedIndex::first() && rig.controller.mode() == Mode::Manual;
        failures += usize::from(!passed);
        progress.finish(passed, format!("on air: {}", on_air));
    }

    {
        rig.reset_scenes();
        rig.controller.set_mode(Mode::AutoAudio);
        let budget = u64::from(rig.controller.settings().audio_interval_ticks)
            * u64::from(rig.controller.settings().max_failed_evaluations);
        let progress = ui.scenario("unplugged feeds", budget);
        for scene in &rig.scenes {
            scene.set_offline(true);
        }
        rig.run(&progress, budget);
        let passed = rig.controller.is_degraded() && rig.controller.mode() == Mode::Disabled;
        failures += usize::from(!passed);
        progress.finish(
            passed,
            format!("degraded: {}, on air: {}", rig.controller.is_degraded(), rig.controller.active_feed()),
        );
    }

    if failures > 0 {
        return Err(anyhow!("{} scenario(s) did not behave as expected", failures));
    }
    println!("all scenarios passed");
    Ok(())
}
