use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use feed_switcher::config::SwitcherConfig;
use feed_switcher::Mode;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SWITCHER_CONFIG",
        "SWITCHER_MODE",
        "SWITCHER_TICK_MS",
        "SWITCHER_AUDIO_INTERVAL",
        "SWITCHER_LOUDNESS_THRESHOLD_DB",
        "SWITCHER_MOTION_INTERVAL",
        "SWITCHER_MOTION_THRESHOLD",
        "SWITCHER_SAMPLE_TIMEOUT_MS",
        "SWITCHER_FEEDS",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(suffix: &str, body: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(&mut file, body.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SwitcherConfig::load().expect("load defaults");
    assert_eq!(cfg.engine.mode, Mode::AutoAudio);
    assert_eq!(cfg.engine.tick, Duration::from_millis(40));
    assert_eq!(cfg.engine.audio_interval_ticks, 10);
    assert_eq!(cfg.engine.motion_interval_ticks, 3);
    assert_eq!(cfg.engine.thresholds.loudness_db, -29.0);
    assert_eq!(cfg.engine.thresholds.motion, 3);
    assert_eq!(cfg.engine.sampler.block_len, 1024);
    assert_eq!(cfg.engine.sampler.pixel_threshold, 32);
    assert_eq!(cfg.engine.max_failed_evaluations, 5);
    let names: Vec<&str> = cfg.feeds.iter().map(|feed| feed.name.as_str()).collect();
    assert_eq!(names, vec!["cam1", "cam2", "cam3"]);
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".json",
        r#"{
            "mode": "auto_motion",
            "tick_ms": 20,
            "audio": { "block_len": 512, "interval_ticks": 5, "threshold_db": -35.5 },
            "motion": { "interval_ticks": 4, "threshold": 10, "pixel_threshold": 40 },
            "sampling": { "timeout_ms": 150, "max_failed_evaluations": 2 },
            "feeds": [
                { "name": "wide", "gain_db": -3.0 },
                { "name": "host", "gain_db": 6.0, "width": 640, "height": 360 }
            ]
        }"#,
    );

    std::env::set_var("SWITCHER_CONFIG", file.path());
    std::env::set_var("SWITCHER_MODE", "audio");
    std::env::set_var("SWITCHER_LOUDNESS_THRESHOLD_DB", "-20");
    std::env::set_var("SWITCHER_FEEDS", "3");

    let cfg = SwitcherConfig::load().expect("load config");

    assert_eq!(cfg.engine.mode, Mode::AutoAudio);
    assert_eq!(cfg.engine.tick, Duration::from_millis(20));
    assert_eq!(cfg.engine.sampler.block_len, 512);
    assert_eq!(cfg.engine.audio_interval_ticks, 5);
    assert_eq!(cfg.engine.thresholds.loudness_db, -20.0);
    assert_eq!(cfg.engine.motion_interval_ticks, 4);
    assert_eq!(cfg.engine.thresholds.motion, 10);
    assert_eq!(cfg.engine.sampler.pixel_threshold, 40);
    assert_eq!(cfg.engine.sample_timeout, Duration::from_millis(150));
    assert_eq!(cfg.engine.max_failed_evaluations, 2);

    assert_eq!(cfg.feeds.len(), 3);
    assert_eq!(cfg.feeds[0].name, "wide");
    assert_eq!(cfg.feeds[0].gain_db, -3.0);
    assert_eq!(cfg.feeds[0].width, 320);
    assert_eq!(cfg.feeds[1].name, "host");
    assert_eq!((cfg.feeds[1].width, cfg.feeds[1].height), (640, 360));
    assert_eq!(cfg.feeds[2].name, "cam3");

    clear_env();
}

#[test]
fn loads_toml_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".toml",
        r#"
mode = "manual"

[audio]
threshold_db = -40.0

[[feeds]]
name = "left"

[[feeds]]
name = "right"
gain_db = 2.5
"#,
    );

    let cfg = SwitcherConfig::from_path(file.path()).expect("load toml");
    assert_eq!(cfg.engine.mode, Mode::Manual);
    assert_eq!(cfg.engine.thresholds.loudness_db, -40.0);
    assert_eq!(cfg.feeds.len(), 2);
    assert_eq!(cfg.feeds[1].name, "right");
    assert_eq!(cfg.feeds[1].gain_db, 2.5);

    clear_env();
}

#[test]
fn rejects_invalid_settings() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let empty = write_config(".json", r#"{ "feeds": [] }"#);
    let err = SwitcherConfig::from_path(empty.path()).unwrap_err();
    assert!(err.to_string().contains("at least one feed"), "{}", err);

    let zero_interval = write_config(".json", r#"{ "audio": { "interval_ticks": 0 } }"#);
    assert!(SwitcherConfig::from_path(zero_interval.path()).is_err());

    let zero_tick = write_config(".json", r#"{ "tick_ms": 0 }"#);
    assert!(SwitcherConfig::from_path(zero_tick.path()).is_err());

    let bad_mode = write_config(".json", r#"{ "mode": "loudest" }"#);
    let err = SwitcherConfig::from_path(bad_mode.path()).unwrap_err();
    assert!(err.to_string().contains("unknown mode"), "{}", err);

    std::env::set_var("SWITCHER_TICK_MS", "fast");
    let err = SwitcherConfig::load().unwrap_err();
    assert!(err.to_string().contains("SWITCHER_TICK_MS"), "{}", err);
    clear_env();

    std::env::set_var("SWITCHER_FEEDS", "0");
    assert!(SwitcherConfig::load().is_err());
    clear_env();

    std::env::set_var("SWITCHER_CONFIG", "/nonexistent/switcher.json");
    let err = SwitcherConfig::load().unwrap_err();
    assert!(err.to_string().contains("failed to read config file"), "{}", err);

    clear_env();
}
