use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    pub fn parse(flag: &str) -> Self {
        match flag {
            "plain" => UiMode::Plain,
            "pretty" => UiMode::Pretty,
            _ => UiMode::Auto,
        }
    }
}

/// Progress reporting for scripted scenarios. Bars on a terminal, plain lines elsewhere.
#[derive(Clone, Debug)]
pub struct Ui {
    pretty: bool,
}

impl Ui {
    /// `disable_pretty` turns bars off in `Auto` mode only (stdout piped to a
    /// file, for instance); `Pretty` still draws them on a terminal.
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        let pretty = is_tty
            && match mode {
                UiMode::Pretty => true,
                UiMode::Auto => !disable_pretty,
                UiMode::Plain => false,
            };
        Self { pretty }
    }

    /// Start a scenario expected to run for `ticks` scheduler ticks.
    pub fn scenario(&self, name: &str, ticks: u64) -> ScenarioProgress {
        let bar = if self.pretty {
            let bar = ProgressBar::new(ticks);
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template("{prefix:>18} [{bar:30}] {pos}/{len} {msg}")
                .map(|style| style.progress_chars("=> "))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar.set_prefix(name.to_string());
            Some(bar)
        } else {
            eprintln!("==> {} ({} ticks)", name, ticks);
            None
        };
        ScenarioProgress {
            name: name.to_string(),
            start: Instant::now(),
            bar,
            outcome: None,
        }
    }
}

pub struct ScenarioProgress {
    name: String,
    start: Instant,
    bar: Option<ProgressBar>,
    outcome: Option<(bool, String)>,
}

impl ScenarioProgress {
    /// Advance one tick, showing `status` next to the bar.
    pub fn tick(&self, status: &str) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
            bar.set_message(status.to_string());
        }
    }

    /// Note a notable event (a switch). Printed above the bar.
    pub fn note(&self, line: &str) {
        match &self.bar {
            Some(bar) => bar.println(format!("    {}", line)),
            None => eprintln!("    {}", line),
        }
    }

    /// Record whether the scenario met its expectation.
    pub fn finish(mut self, passed: bool, detail: impl Into<String>) {
        self.outcome = Some((passed, detail.into()));
    }
}

impl Drop for ScenarioProgress {
    fn drop(&mut self) {
        let (mark, detail) = match self.outcome.take() {
            Some((true, detail)) => ("ok", detail),
            Some((false, detail)) => ("FAILED", detail),
            None => ("aborted", String::new()),
        };
        let message = format!(
            "{} {} ({}) {}",
            mark,
            self.name,
            format_duration(self.start.elapsed()),
            detail
        );
        match &self.bar {
            Some(bar) => bar.finish_with_message(message),
            None => eprintln!("{}", message.trim_end()),
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_pick_bars_or_plain_lines() {
        assert!(Ui::new(UiMode::Pretty, true, true).pretty);
        assert!(Ui::new(UiMode::Auto, true, false).pretty);
        assert!(!Ui::new(UiMode::Auto, true, true).pretty);
        assert!(!Ui::new(UiMode::Plain, true, false).pretty);
        for mode in [UiMode::Auto, UiMode::Plain, UiMode::Pretty] {
            assert!(!Ui::new(mode, false, false).pretty, "{:?}", mode);
        }
    }

    #[test]
    fn unknown_flag_falls_back_to_auto() {
        assert_eq!(UiMode::parse("pretty"), UiMode::Pretty);
        assert_eq!(UiMode::parse("plain"), UiMode::Plain);
        assert_eq!(UiMode::parse("fancy"), UiMode::Auto);
    }
}
