use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use limit_control::{ControllerConfig, TariffConfig, TariffWindow, TwoWayTariffLimiter};
use poller_actor::PollerConfig;
use serde::Deserialize;
use sunspec_codec::SUNSPEC_BASE_ADDRESS;
use types::{ControlLimit, DeviceIdentity, LimiterKind};

const DEFAULT_MODBUS_PORT: u16 = 502;
const DEFAULT_MODBUS_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_SEP2_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SEP2_POST_RATE_SECONDS: u64 = 60;
const DEFAULT_FEED_CAPACITY: usize = 64;
const LFDI_HEX_LEN: usize = 40;

/// Where site (connection point) measurements come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteSource {
    Sunspec,
    External,
}

impl std::str::FromStr for SiteSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "sunspec" => Ok(SiteSource::Sunspec),
            "external" => Ok(SiteSource::External),
            _ => Err(format!("unknown site source {value}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sep2Config {
    pub host: String,
    pub device_capability_uri: String,
    pub lfdi: String,
    pub request_timeout_ms: u64,
    /// How often readings and DER status are sent to the utility server.
    pub post_rate_seconds: u64,
}

#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    pub inverters: Vec<DeviceIdentity>,
    pub meters: Vec<DeviceIdentity>,
    pub site_source: SiteSource,
    pub base_address: u16,
    pub modbus_timeout_ms: u64,
    pub poller: PollerConfig,
    pub controller: ControllerConfig,
    pub sep2: Option<Sep2Config>,
    pub fixed_limit: Option<ControlLimit>,
    pub two_way_tariff: Option<TariffConfig>,
    pub negative_feed_in: bool,
    pub mqtt: bool,
    /// Attribution order for fused limits. Enabled limiters missing here follow in default order.
    pub limiter_priority: Vec<LimiterKind>,
    pub feed_capacity: usize,
}

impl CoordinatorConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    pub fn load_with_path(config_path: Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(file_config) = load_file_config(config_path.as_deref())? {
            apply_file_config(&mut config, file_config);
        }

        apply_env_overrides(&mut config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.inverters.is_empty() {
            anyhow::bail!("at least one inverter must be configured");
        }
        for device in self.inverters.iter().chain(&self.meters) {
            if device.ip.trim().is_empty() {
                anyhow::bail!("device ip must be non-empty");
            }
            if device.port == 0 {
                anyhow::bail!("device {device} port must be between 1 and 65535");
            }
        }
        if self.site_source == SiteSource::Sunspec && self.meters.is_empty() {
            anyhow::bail!("site.source = \"sunspec\" requires at least one meter");
        }
        if self.base_address == 0 {
            anyhow::bail!("sunspec.base_address must be >= 1");
        }
        if self.modbus_timeout_ms == 0 {
            anyhow::bail!("sunspec.modbus_timeout_ms must be >= 1");
        }
        if self.poller.poll_interval.as_millis() == 0 {
            anyhow::bail!("poller.poll_interval_ms must be >= 1");
        }
        if self.controller.interval.as_millis() == 0 {
            anyhow::bail!("controller.interval_ms must be >= 1");
        }
        if self.feed_capacity == 0 {
            anyhow::bail!("feed_capacity must be >= 1");
        }
        if let Some(sep2) = &self.sep2 {
            validate_sep2(sep2)?;
        }
        if let Some(limit) = &self.fixed_limit {
            limit
                .validate()
                .map_err(|reason| anyhow::anyhow!("limiters.fixed: {reason}"))?;
        }
        if let Some(tariff) = &self.two_way_tariff {
            TwoWayTariffLimiter::new(tariff).context("limiters.two_way_tariff")?;
        }

        let mut seen = HashSet::new();
        for kind in &self.limiter_priority {
            if !seen.insert(*kind) {
                anyhow::bail!("limiters.priority lists {kind} more than once");
            }
        }

        Ok(())
    }

    pub fn is_enabled(&self, kind: LimiterKind) -> bool {
        match kind {
            LimiterKind::Sep2 => self.sep2.is_some(),
            LimiterKind::Fixed => self.fixed_limit.is_some(),
            LimiterKind::TwoWayTariff => self.two_way_tariff.is_some(),
            LimiterKind::NegativeFeedIn => self.negative_feed_in,
            LimiterKind::Mqtt => self.mqtt,
        }
    }

    /// Enabled limiters in priority order.
    pub fn enabled_limiters(&self) -> Vec<LimiterKind> {
        let mut ordered: Vec<LimiterKind> = self
            .limiter_priority
            .iter()
            .copied()
            .filter(|kind| self.is_enabled(*kind))
            .collect();
        for kind in LimiterKind::ALL {
            if self.is_enabled(kind) && !ordered.contains(&kind) {
                ordered.push(kind);
            }
        }
        ordered
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            inverters: Vec::new(),
            meters: Vec::new(),
            site_source: SiteSource::Sunspec,
            base_address: SUNSPEC_BASE_ADDRESS,
            modbus_timeout_ms: DEFAULT_MODBUS_TIMEOUT_MS,
            poller: PollerConfig::default(),
            controller: ControllerConfig::default(),
            sep2: None,
            fixed_limit: None,
            two_way_tariff: None,
            negative_feed_in: false,
            mqtt: false,
            limiter_priority: LimiterKind::ALL.to_vec(),
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }
}

fn validate_sep2(sep2: &Sep2Config) -> Result<()> {
    if !(sep2.host.starts_with("https://") || sep2.host.starts_with("http://")) {
        anyhow::bail!("sep2.host must be an http(s) url");
    }
    if !sep2.device_capability_uri.starts_with('/') {
        anyhow::bail!("sep2.device_capability_uri must start with '/'");
    }
    if sep2.lfdi.len() != LFDI_HEX_LEN || !sep2.lfdi.chars().all(|ch| ch.is_ascii_hexdigit()) {
        anyhow::bail!("sep2.lfdi must be {LFDI_HEX_LEN} hexadecimal characters");
    }
    if sep2.request_timeout_ms == 0 {
        anyhow::bail!("sep2.request_timeout_ms must be >= 1");
    }
    if sep2.post_rate_seconds == 0 {
        anyhow::bail!("sep2.post_rate_seconds must be >= 1");
    }
    Ok(())
}

fn apply_env_overrides(config: &mut CoordinatorConfig) {
    if let Ok(value) = env::var("DER_INVERTERS") {
        config.inverters = parse_devices(&value);
    }

    if let Ok(value) = env::var("DER_METERS") {
        config.meters = parse_devices(&value);
    }

    if let Some(source) = env::var("DER_SITE_SOURCE").ok().and_then(|value| value.parse().ok()) {
        config.site_source = source;
    }

    if let Some(interval_ms) = parse_env_u64("DER_POLL_INTERVAL_MS") {
        config.poller.poll_interval = Duration::from_millis(interval_ms);
    }

    if let Some(jitter_ms) = parse_env_u64("DER_JITTER_MS") {
        config.poller.jitter_ms = jitter_ms;
    }

    if let Some(interval_ms) = parse_env_u64("DER_CONTROL_INTERVAL_MS") {
        config.controller.interval = Duration::from_millis(interval_ms);
    }

    config.base_address = parse_env_u16("DER_BASE_ADDRESS").unwrap_or(config.base_address);
    config.modbus_timeout_ms =
        parse_env_u64("DER_MODBUS_TIMEOUT_MS").unwrap_or(config.modbus_timeout_ms);
    config.feed_capacity = parse_env_usize("DER_FEED_CAPACITY").unwrap_or(config.feed_capacity);

    if let Ok(host) = env::var("DER_SEP2_HOST") {
        let sep2 = config.sep2.get_or_insert_with(|| Sep2Config {
            host: String::new(),
            device_capability_uri: "/dcap".to_string(),
            lfdi: String::new(),
            request_timeout_ms: DEFAULT_SEP2_TIMEOUT_MS,
            post_rate_seconds: DEFAULT_SEP2_POST_RATE_SECONDS,
        });
        sep2.host = host;
    }
    if let Some(sep2) = config.sep2.as_mut() {
        if let Ok(uri) = env::var("DER_SEP2_DCAP_URI") {
            sep2.device_capability_uri = uri;
        }
        if let Ok(lfdi) = env::var("DER_SEP2_LFDI") {
            sep2.lfdi = lfdi;
        }
        sep2.post_rate_seconds =
            parse_env_u64("DER_SEP2_POST_RATE_SECONDS").unwrap_or(sep2.post_rate_seconds);
    }

    if let Some(watts) = parse_env_f64("DER_FIXED_EXPORT_LIMIT_W") {
        config
            .fixed_limit
            .get_or_insert_with(ControlLimit::default)
            .op_mod_exp_lim_w = Some(watts);
    }

    config.negative_feed_in =
        parse_env_bool("DER_NEGATIVE_FEED_IN").unwrap_or(config.negative_feed_in);
    config.mqtt = parse_env_bool("DER_MQTT").unwrap_or(config.mqtt);

    if let Ok(value) = env::var("DER_LIMITER_PRIORITY") {
        config.limiter_priority = value
            .split(',')
            .filter_map(|entry| entry.trim().parse().ok())
            .collect();
    }
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    inverters: Option<Vec<FileDeviceConfig>>,
    site: Option<FileSiteConfig>,
    sunspec: Option<FileSunspecConfig>,
    poller: Option<FilePollerConfig>,
    controller: Option<FileControllerConfig>,
    sep2: Option<FileSep2Config>,
    limiters: Option<FileLimitersConfig>,
    feed_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct FileDeviceConfig {
    ip: String,
    port: Option<u16>,
    unit_id: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct FileSiteConfig {
    source: Option<SiteSource>,
    meters: Option<Vec<FileDeviceConfig>>,
}

#[derive(Debug, Deserialize)]
struct FileSunspecConfig {
    base_address: Option<u16>,
    modbus_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FilePollerConfig {
    poll_interval_ms: Option<u64>,
    jitter_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileControllerConfig {
    interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileSep2Config {
    host: String,
    device_capability_uri: Option<String>,
    lfdi: String,
    request_timeout_ms: Option<u64>,
    post_rate_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileLimitersConfig {
    priority: Option<Vec<LimiterKind>>,
    fixed: Option<FileFixedLimit>,
    two_way_tariff: Option<FileTariffConfig>,
    negative_feed_in: Option<bool>,
    mqtt: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct FileFixedLimit {
    connect: Option<bool>,
    energize: Option<bool>,
    export_limit_watts: Option<f64>,
    generation_limit_watts: Option<f64>,
    import_limit_watts: Option<f64>,
    load_limit_watts: Option<f64>,
    ramp_tms: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct FileTariffConfig {
    utc_offset_minutes: Option<i32>,
    windows: Vec<FileTariffWindow>,
}

#[derive(Debug, Deserialize)]
struct FileTariffWindow {
    start: String,
    end: String,
    export_limit_watts: f64,
}

fn load_file_config(config_path: Option<&str>) -> Result<Option<FileConfig>> {
    let path = match config_path {
        Some(path) => path.to_string(),
        None => match env::var("DER_CONFIG") {
            Ok(value) => value,
            Err(_) => return Ok(None),
        },
    };

    let content =
        fs::read_to_string(&path).with_context(|| format!("read config file {path}"))?;
    let ext = Path::new(&path).extension().and_then(|value| value.to_str());

    let config = match ext {
        Some("json") => serde_json::from_str(&content).context("parse json config")?,
        _ => toml::from_str(&content).context("parse toml config")?,
    };

    Ok(Some(config))
}

fn device_identity(device: FileDeviceConfig) -> DeviceIdentity {
    DeviceIdentity {
        ip: device.ip,
        port: device.port.unwrap_or(DEFAULT_MODBUS_PORT),
        unit_id: device.unit_id.unwrap_or(1),
    }
}

fn apply_file_config(config: &mut CoordinatorConfig, file: FileConfig) {
    if let Some(inverters) = file.inverters {
        config.inverters = inverters.into_iter().map(device_identity).collect();
    }

    if let Some(site) = file.site {
        if let Some(source) = site.source {
            config.site_source = source;
        }
        if let Some(meters) = site.meters {
            config.meters = meters.into_iter().map(device_identity).collect();
        }
    }

    if let Some(sunspec) = file.sunspec {
        if let Some(base) = sunspec.base_address {
            config.base_address = base;
        }
        if let Some(timeout_ms) = sunspec.modbus_timeout_ms {
            config.modbus_timeout_ms = timeout_ms;
        }
    }

    if let Some(poller) = file.poller {
        if let Some(interval_ms) = poller.poll_interval_ms {
            config.poller.poll_interval = Duration::from_millis(interval_ms);
        }
        if let Some(jitter_ms) = poller.jitter_ms {
            config.poller.jitter_ms = jitter_ms;
        }
    }

    if let Some(interval_ms) = file.controller.and_then(|controller| controller.interval_ms) {
        config.controller.interval = Duration::from_millis(interval_ms);
    }

    if let Some(sep2) = file.sep2 {
        config.sep2 = Some(Sep2Config {
            host: sep2.host,
            device_capability_uri: sep2
                .device_capability_uri
                .unwrap_or_else(|| "/dcap".to_string()),
            lfdi: sep2.lfdi,
            request_timeout_ms: sep2.request_timeout_ms.unwrap_or(DEFAULT_SEP2_TIMEOUT_MS),
            post_rate_seconds: sep2
                .post_rate_seconds
                .unwrap_or(DEFAULT_SEP2_POST_RATE_SECONDS),
        });
    }

    if let Some(limiters) = file.limiters {
        if let Some(priority) = limiters.priority {
            config.limiter_priority = priority;
        }
        if let Some(fixed) = limiters.fixed {
            config.fixed_limit = Some(ControlLimit {
                op_mod_connect: fixed.connect,
                op_mod_energize: fixed.energize,
                op_mod_exp_lim_w: fixed.export_limit_watts,
                op_mod_gen_lim_w: fixed.generation_limit_watts,
                op_mod_imp_lim_w: fixed.import_limit_watts,
                op_mod_load_lim_w: fixed.load_limit_watts,
                ramp_tms: fixed.ramp_tms,
            });
        }
        if let Some(tariff) = limiters.two_way_tariff {
            config.two_way_tariff = Some(TariffConfig {
                utc_offset_minutes: tariff.utc_offset_minutes.unwrap_or_default(),
                windows: tariff
                    .windows
                    .into_iter()
                    .map(|window| TariffWindow {
                        start: window.start,
                        end: window.end,
                        export_limit_watts: window.export_limit_watts,
                    })
                    .collect(),
            });
        }
        if let Some(enabled) = limiters.negative_feed_in {
            config.negative_feed_in = enabled;
        }
        if let Some(enabled) = limiters.mqtt {
            config.mqtt = enabled;
        }
    }

    if let Some(capacity) = file.feed_capacity {
        config.feed_capacity = capacity;
    }
}

fn parse_env_u16(key: &str) -> Option<u16> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_f64(key: &str) -> Option<f64> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_bool(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

/// `ip[:port[:unit]]`, comma separated.
fn parse_devices(value: &str) -> Vec<DeviceIdentity> {
    value
        .split(',')
        .filter_map(|entry| {
            let trimmed = entry.trim();
            if trimmed.is_empty() {
                return None;
            }
            let mut parts = trimmed.split(':');
            let ip = parts.next()?.to_string();
            let port = parts
                .next()
                .and_then(|port| port.parse().ok())
                .unwrap_or(DEFAULT_MODBUS_PORT);
            let unit_id = parts.next().and_then(|unit| unit.parse().ok()).unwrap_or(1);
            Some(DeviceIdentity { ip, port, unit_id })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_lists() {
        let devices = parse_devices("10.0.0.10, 10.0.0.11:1502,10.0.0.12:502:3,");
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].port, 502);
        assert_eq!(devices[1].port, 1502);
        assert_eq!(devices[2].unit_id, 3);
    }

    #[test]
    fn enabled_limiters_follow_priority() {
        let config = CoordinatorConfig {
            fixed_limit: Some(ControlLimit::default()),
            mqtt: true,
            negative_feed_in: true,
            limiter_priority: vec![LimiterKind::Mqtt, LimiterKind::Sep2],
            ..CoordinatorConfig::default()
        };
        assert_eq!(
            config.enabled_limiters(),
            vec![LimiterKind::Mqtt, LimiterKind::Fixed, LimiterKind::NegativeFeedIn]
        );
    }

    #[test]
    fn lfdi_must_be_hex() {
        let mut sep2 = Sep2Config {
            host: "https://utility.example".to_string(),
            device_capability_uri: "/dcap".to_string(),
            lfdi: "3E4F45AB31EDFE5B67E343E5E4562E31984E23E5".to_string(),
            request_timeout_ms: 1_000,
            post_rate_seconds: 60,
        };
        validate_sep2(&sep2).expect("valid");
        sep2.post_rate_seconds = 0;
        assert!(validate_sep2(&sep2).is_err());
        sep2.post_rate_seconds = 60;
        sep2.lfdi = "not-hex".to_string();
        assert!(validate_sep2(&sep2).is_err());
    }
}
