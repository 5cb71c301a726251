use std::env;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use der_coordinator::{CoordinatorConfig, SiteSource};
use types::LimiterKind;

static ENV_LOCK: Mutex<()> = Mutex::new(());

const OVERRIDES: &[&str] = &[
    "DER_CONFIG",
    "DER_POLL_INTERVAL_MS",
    "DER_FIXED_EXPORT_LIMIT_W",
    "DER_LIMITER_PRIORITY",
    "DER_INVERTERS",
];

fn clear_env() {
    for key in OVERRIDES {
        env::remove_var(key);
    }
}

#[test]
fn toml_config_validates() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("DER_CONFIG", fixture_path("config-valid.toml"));

    let config = CoordinatorConfig::load().expect("load config");
    config.validate().expect("validate config");

    assert_eq!(config.inverters.len(), 2);
    assert_eq!(config.inverters[0].port, 502);
    assert_eq!(config.inverters[1].port, 1502);
    assert_eq!(config.meters[0].unit_id, 240);
    assert_eq!(config.modbus_timeout_ms, 1_500);
    assert_eq!(config.controller.interval, Duration::from_millis(500));
    assert_eq!(
        config.sep2.as_ref().map(|sep2| sep2.device_capability_uri.as_str()),
        Some("/api/v2/dcap")
    );
    assert_eq!(config.sep2.as_ref().map(|sep2| sep2.post_rate_seconds), Some(120));
    assert_eq!(
        config.fixed_limit.and_then(|limit| limit.op_mod_exp_lim_w),
        Some(5_000.0)
    );
    assert_eq!(
        config.enabled_limiters(),
        vec![
            LimiterKind::Sep2,
            LimiterKind::Fixed,
            LimiterKind::TwoWayTariff,
            LimiterKind::NegativeFeedIn
        ]
    );

    clear_env();
}

#[test]
fn json_config_validates() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("DER_CONFIG", fixture_path("config-valid.json"));

    let config = CoordinatorConfig::load().expect("load config");
    config.validate().expect("validate config");

    assert_eq!(config.site_source, SiteSource::External);
    assert!(config.meters.is_empty());
    assert_eq!(config.fixed_limit.and_then(|limit| limit.ramp_tms), Some(600));
    assert_eq!(
        config.enabled_limiters(),
        vec![LimiterKind::Mqtt, LimiterKind::Fixed]
    );

    clear_env();
}

#[test]
fn invalid_config_fails_validation() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("DER_CONFIG", fixture_path("config-invalid.toml"));

    let config = CoordinatorConfig::load().expect("load config");
    assert!(config.validate().is_err());

    clear_env();
}

#[test]
fn environment_overrides_the_file() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("DER_CONFIG", fixture_path("config-valid.toml"));
    env::set_var("DER_POLL_INTERVAL_MS", "250");
    env::set_var("DER_FIXED_EXPORT_LIMIT_W", "2500");
    env::set_var("DER_LIMITER_PRIORITY", "twoWayTariff,fixed");

    let config = CoordinatorConfig::load().expect("load config");
    config.validate().expect("validate config");

    assert_eq!(config.poller.poll_interval, Duration::from_millis(250));
    assert_eq!(
        config.fixed_limit.and_then(|limit| limit.op_mod_exp_lim_w),
        Some(2_500.0)
    );
    assert_eq!(
        config.enabled_limiters()[..2],
        [LimiterKind::TwoWayTariff, LimiterKind::Fixed]
    );

    clear_env();
}

#[test]
fn missing_inverters_fail_validation() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();

    let config = CoordinatorConfig::load().expect("defaults");
    assert!(config.validate().is_err());

    env::set_var("DER_INVERTERS", "10.0.0.10");
    let config = CoordinatorConfig {
        site_source: SiteSource::External,
        ..CoordinatorConfig::load().expect("env config")
    };
    config.validate().expect("single inverter with external site data");

    clear_env();
}

fn fixture_path(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path.to_string_lossy().to_string()
}
