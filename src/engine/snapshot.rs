use serde::Serialize;

use crate::{FeedIndex, Mode};

/// Why the feed on air changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchReason {
    Loudness,
    Motion,
    Manual,
    Cycle,
}

/// Fired whenever the current feed changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SwitchEvent {
    pub previous: FeedIndex,
    pub current: FeedIndex,
    pub reason: SwitchReason,
    /// Scheduler tick on which the switch was applied.
    pub tick: u64,
}

/// Per-feed diagnostics.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeedSnapshot {
    pub index: FeedIndex,
    pub name: String,
    /// Latest loudness; `-inf` (serialised as `null`) for silence or no data.
    pub loudness_db: f32,
    pub motion_score: u32,
    pub active: bool,
    pub gain_db: f32,
}

/// On-screen diagnostics for the operator shell.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub mode: Mode,
    pub current_feed: FeedIndex,
    /// Automatic switching was suspended after repeated sampling failures.
    pub degraded: bool,
    pub ticks: u64,
    pub evaluations: u64,
    pub feeds: Vec<FeedSnapshot>,
}

impl Snapshot {
    /// Loudness per feed, `*` after the feed on air: `-40 -10* -35`.
    pub fn levels_line(&self) -> String {
        self.line(|feed| format!("{:.0}", feed.loudness_db))
    }

    /// Motion score per feed, same layout as `levels_line`.
    pub fn motion_line(&self) -> String {
        self.line(|feed| feed.motion_score.to_string())
    }

    pub fn active_count(&self) -> usize {
        self.feeds.iter().filter(|feed| feed.active).count()
    }

    fn line(&self, value: impl Fn(&FeedSnapshot) -> String) -> String {
        self.feeds
            .iter()
            .map(|feed| {
                let mut cell = value(feed);
                if feed.active {
                    cell.push('*');
                }
                cell
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(levels: &[f32], current: usize) -> Snapshot {
        Snapshot {
            mode: Mode::AutoAudio,
            current_feed: FeedIndex::new(current, levels.len()).unwrap(),
            degraded: false,
            ticks: 10,
            evaluations: 1,
            feeds: levels
                .iter()
                .enumerate()
                .map(|(i, &db)| FeedSnapshot {
                    index: FeedIndex::new(i, levels.len()).unwrap(),
                    name: format!("cam{}", i + 1),
                    loudness_db: db,
                    motion_score: i as u32,
                    active: i == current,
                    gain_db: 0.0,
                })
                .collect(),
        }
    }

    #[test]
    fn levels_line_marks_active_feed() {
        let snap = snapshot(&[-40.2, -10.0, -35.4], 1);
        assert_eq!(snap.levels_line(), "-40 -10* -35");
        assert_eq!(snap.motion_line(), "0 1* 2");
        assert_eq!(snap.active_count(), 1);
    }

    #[test]
    fn silence_renders_as_negative_infinity() {
        let snap = snapshot(&[f32::NEG_INFINITY], 0);
        assert_eq!(snap.levels_line(), "-inf*");
    }

    #[test]
    fn snapshot_serialises_for_the_shell() {
        let snap = snapshot(&[f32::NEG_INFINITY, -12.0], 0);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["mode"], "auto_audio");
        assert_eq!(json["current_feed"], 0);
        assert!(json["feeds"][0]["loudness_db"].is_null());
        assert_eq!(json["feeds"][1]["loudness_db"], -12.0);
    }
}
