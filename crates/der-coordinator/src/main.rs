use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use der_coordinator::{Coordinator, CoordinatorConfig};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config_path = parse_config_arg();
    let config = CoordinatorConfig::load_with_path(config_path).context("load config failed")?;
    config.validate().context("config validation failed")?;

    let coordinator = Coordinator::start(&config).context("coordinator start failed")?;
    let inputs = coordinator.inputs();
    if inputs.site_samples.is_some() || inputs.external_limits.is_some() || inputs.feed_in_prices.is_some() {
        info!("external inputs enabled, waiting for a provider bridge");
    }

    notify_ready();
    let watchdog = CancellationToken::new();
    let watchdog_handle = start_watchdog(watchdog.clone());

    let result = coordinator
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "ctrl-c handler failed");
            }
            info!("shutdown signal received");
        })
        .await;

    watchdog.cancel();
    if let Some(handle) = watchdog_handle {
        let _ = handle.await;
    }
    result
}

fn parse_config_arg() -> Option<String> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

#[cfg(target_os = "linux")]
fn notify_ready() {
    if let Err(err) = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]) {
        warn!(error = %err, "systemd ready notify failed");
    }
}

#[cfg(not(target_os = "linux"))]
fn notify_ready() {}

#[cfg(target_os = "linux")]
fn start_watchdog(cancel: CancellationToken) -> Option<tokio::task::JoinHandle<()>> {
    let interval = watchdog_interval()?;
    Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sleep(interval) => {
                    if let Err(err) = sd_notify::notify(false, &[sd_notify::NotifyState::Watchdog]) {
                        warn!(error = %err, "systemd watchdog notify failed");
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    }))
}

#[cfg(not(target_os = "linux"))]
fn start_watchdog(_cancel: CancellationToken) -> Option<tokio::task::JoinHandle<()>> {
    None
}

#[cfg(target_os = "linux")]
fn watchdog_interval() -> Option<Duration> {
    let watchdog_usec = env::var("WATCHDOG_USEC").ok()?.parse::<u64>().ok()?;
    if let Some(pid) = env::var("WATCHDOG_PID")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
    {
        if pid != std::process::id() {
            return None;
        }
    }

    let interval = watchdog_usec.saturating_div(2).max(100_000);
    Some(Duration::from_micros(interval))
}
