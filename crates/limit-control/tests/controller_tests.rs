use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use limit_control::{
    ControllerConfig, CycleOutcome, ExternalLimiter, FixedLimiter, InverterController,
    LimiterHandle, SkipReason, TariffConfig, TariffWindow, TwoWayTariffLimiter,
};
use modbus_client::{ClientError, RegisterTransport};
use poller_actor::{InverterSnapshot, InvertersSample, NameplateTotals, SunSpecDevice};
use sunspec_codec::models::{
    CommonModel, ControlsModel, InverterModel, NameplateModel, SettingsModel, StatusModel,
};
use sunspec_codec::{SunSpecConnection, SUNSPEC_BASE_ADDRESS};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use types::{
    ControlLimit, DerSample, DeviceIdentity, LimiterKind, PowerReading, SiteSample,
    VoltageReading,
};

const BASE: u16 = SUNSPEC_BASE_ADDRESS;
/// Model 123 starts after the sentinel and a common block of length 66.
const CONTROLS_OFFSET: usize = 2 + 68;

struct FakeInverter {
    registers: Mutex<Vec<u16>>,
    writes: AtomicUsize,
    rejecting_writes: AtomicBool,
}

impl FakeInverter {
    fn new() -> Self {
        let mut registers = vec![0x5375, 0x6e53, 1, 66];
        registers.extend(vec![0u16; 66]);
        registers.extend([123, 24]);
        registers.extend(vec![0u16; 24]);
        registers.extend([0xFFFF, 0]);
        Self {
            registers: Mutex::new(registers),
            writes: AtomicUsize::new(0),
            rejecting_writes: AtomicBool::new(false),
        }
    }

    fn controls_register(&self, offset: usize) -> u16 {
        self.registers.lock().expect("lock")[CONTROLS_OFFSET + offset]
    }
}

#[async_trait]
impl RegisterTransport for FakeInverter {
    async fn read_holding_registers(&self, start: u16, count: u16) -> Result<Vec<u16>, ClientError> {
        let registers = self.registers.lock().expect("lock");
        let offset = usize::from(start - BASE);
        registers
            .get(offset..offset + usize::from(count))
            .map(|slice| slice.to_vec())
            .ok_or(ClientError::ShortRead {
                expected: count,
                received: 0,
            })
    }

    async fn write_registers(&self, start: u16, values: &[u16]) -> Result<(), ClientError> {
        if self.rejecting_writes.load(Ordering::SeqCst) {
            return Err(ClientError::Timeout { timeout_ms: 1_000 });
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut registers = self.registers.lock().expect("lock");
        let offset = usize::from(start - BASE);
        registers[offset..offset + values.len()].copy_from_slice(values);
        Ok(())
    }
}

fn identity(ip: &str) -> DeviceIdentity {
    DeviceIdentity {
        ip: ip.to_string(),
        port: 502,
        unit_id: 1,
    }
}

fn inverter(ip: &str) -> (SunSpecDevice<FakeInverter>, Arc<SunSpecConnection<FakeInverter>>) {
    let connection = Arc::new(SunSpecConnection::new(FakeInverter::new(), BASE));
    (
        SunSpecDevice {
            identity: identity(ip),
            connection: Arc::clone(&connection),
        },
        connection,
    )
}

fn snapshot(ip: &str, scale_factor: i16) -> InverterSnapshot {
    InverterSnapshot {
        identity: identity(ip),
        common: CommonModel::default(),
        inverter: InverterModel::default(),
        nameplate: NameplateModel::default(),
        settings: SettingsModel::default(),
        status: StatusModel::default(),
        controls: ControlsModel {
            w_max_lim_pct_sf: scale_factor,
            ..ControlsModel::default()
        },
    }
}

fn inverters_sample(ips: &[&str], solar_watts: f64, max_w: f64) -> InvertersSample {
    let date = Utc::now();
    InvertersSample {
        date,
        devices: ips.iter().map(|ip| snapshot(ip, -2)).collect(),
        der: DerSample {
            date,
            real_power: PowerReading::NoPhase { net: solar_watts },
            reactive_power: PowerReading::NoPhase { net: 0.0 },
            voltage: None,
            frequency: None,
        },
        nameplate: NameplateTotals {
            max_w,
            max_va: max_w,
            max_var: 0.0,
        },
    }
}

fn site_sample(net_watts: f64) -> SiteSample {
    SiteSample {
        date: Utc::now(),
        real_power: PowerReading::NoPhase { net: net_watts },
        reactive_power: PowerReading::NoPhase { net: 0.0 },
        voltage: VoltageReading {
            phase_a: 240.0,
            phase_b: None,
            phase_c: None,
        },
        frequency: Some(50.0),
    }
}

fn fixed(export_watts: f64) -> LimiterHandle {
    FixedLimiter::handle(ControlLimit {
        op_mod_exp_lim_w: Some(export_watts),
        ..ControlLimit::default()
    })
    .expect("fixed limit")
}

type Receivers = (
    watch::Sender<Option<Arc<InvertersSample>>>,
    watch::Sender<Option<Arc<SiteSample>>>,
);

fn controller(
    devices: Vec<SunSpecDevice<FakeInverter>>,
    limiters: Vec<LimiterHandle>,
    inverters: Option<InvertersSample>,
    site: Option<SiteSample>,
) -> (InverterController<FakeInverter>, Receivers) {
    let (inverters_tx, inverters_rx) = watch::channel(inverters.map(Arc::new));
    let (site_tx, site_rx) = watch::channel(site.map(Arc::new));
    (
        InverterController::new(
            devices,
            limiters,
            inverters_rx,
            site_rx,
            ControllerConfig::default(),
        ),
        (inverters_tx, site_tx),
    )
}

#[tokio::test]
async fn tariff_window_tightens_fixed_export_limit() {
    let cancel = CancellationToken::new();
    let (tariff, _task) = TwoWayTariffLimiter::new(&TariffConfig {
        utc_offset_minutes: 0,
        // start == end covers the whole day
        windows: vec![TariffWindow {
            start: "00:00".to_string(),
            end: "00:00".to_string(),
            export_limit_watts: 3_000.0,
        }],
    })
    .expect("tariff")
    .spawn(Duration::from_secs(60), cancel.clone());

    let (device, connection) = inverter("10.0.0.10");
    let (mut controller, _senders) = controller(
        vec![device],
        vec![fixed(5_000.0), tariff],
        Some(inverters_sample(&["10.0.0.10"], 6_000.0, 8_000.0)),
        Some(site_sample(-4_000.0)),
    );
    let status = controller.status();

    let outcome = controller.tick().await;
    let CycleOutcome::Applied {
        configuration,
        written,
        failed,
    } = outcome
    else {
        panic!("expected a write, got {outcome:?}");
    };
    // exporting 4000 W against a 3000 W cap removes 1000 W from 6000 W of solar
    assert_eq!(configuration.target_solar_watts, 5_000.0);
    assert_eq!(configuration.target_solar_power_ratio, 0.625);
    assert_eq!((written, failed), (1, 0));

    let fused = status.borrow().fused;
    let export = fused.op_mod_exp_lim_w.expect("export limit");
    assert_eq!(export.value, 3_000.0);
    assert_eq!(export.source, LimiterKind::TwoWayTariff);

    let fake = connection.transport();
    assert_eq!(fake.controls_register(4), 1, "Conn");
    assert_eq!(fake.controls_register(5), 6_250, "WMaxLimPct");
    assert_eq!(fake.controls_register(9), 1, "WMaxLim_Ena");
    cancel.cancel();
}

#[tokio::test]
async fn missing_nameplate_skips_without_writing() {
    let (device, connection) = inverter("10.0.0.10");
    let (mut controller, _senders) =
        controller(vec![device], vec![fixed(5_000.0)], None, Some(site_sample(0.0)));

    assert_eq!(
        controller.tick().await,
        CycleOutcome::Skipped {
            reason: SkipReason::NoNameplate
        }
    );
    assert_eq!(connection.transport().writes.load(Ordering::SeqCst), 0);
    assert_eq!(
        controller.status().borrow().last_outcome,
        Some(CycleOutcome::Skipped {
            reason: SkipReason::NoNameplate
        })
    );
}

#[tokio::test]
async fn zero_nameplate_skips_without_writing() {
    let (device, connection) = inverter("10.0.0.10");
    let (mut controller, _senders) = controller(
        vec![device],
        vec![fixed(5_000.0)],
        Some(inverters_sample(&["10.0.0.10"], 2_000.0, 0.0)),
        Some(site_sample(0.0)),
    );

    assert_eq!(
        controller.tick().await,
        CycleOutcome::Skipped {
            reason: SkipReason::NoNameplate
        }
    );
    assert_eq!(connection.transport().writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn inverter_missing_from_sample_counts_as_failed() {
    let (first, first_connection) = inverter("10.0.0.10");
    let (second, second_connection) = inverter("10.0.0.11");
    let (mut controller, _senders) = controller(
        vec![first, second],
        vec![fixed(5_000.0)],
        Some(inverters_sample(&["10.0.0.10"], 2_000.0, 5_000.0)),
        Some(site_sample(0.0)),
    );

    match controller.tick().await {
        CycleOutcome::Applied { written, failed, .. } => {
            assert_eq!(written, 1);
            assert_eq!(failed, 1);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(first_connection.transport().writes.load(Ordering::SeqCst), 1);
    assert_eq!(second_connection.transport().writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn export_limit_needs_a_site_sample() {
    let (device, _) = inverter("10.0.0.10");
    let (mut controller, (_, site)) = controller(
        vec![device],
        vec![fixed(1_000.0)],
        Some(inverters_sample(&["10.0.0.10"], 2_000.0, 5_000.0)),
        None,
    );

    assert_eq!(
        controller.tick().await,
        CycleOutcome::Skipped {
            reason: SkipReason::NoSiteSample
        }
    );

    site.send_replace(Some(Arc::new(site_sample(500.0))));
    assert!(matches!(controller.tick().await, CycleOutcome::Applied { .. }));
}

#[tokio::test]
async fn identical_configuration_is_written_once() {
    let (device, connection) = inverter("10.0.0.10");
    let (mut controller, _senders) = controller(
        vec![device],
        vec![fixed(5_000.0)],
        Some(inverters_sample(&["10.0.0.10"], 3_000.0, 5_000.0)),
        Some(site_sample(-1_000.0)),
    );

    assert!(matches!(controller.tick().await, CycleOutcome::Applied { .. }));
    assert_eq!(
        controller.tick().await,
        CycleOutcome::Skipped {
            reason: SkipReason::Unchanged
        }
    );
    assert_eq!(connection.transport().writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn disconnect_overrides_export_headroom() {
    let (device, connection) = inverter("10.0.0.10");
    let (external, external_handle) = ExternalLimiter::channel();
    external
        .push_json(r#"{"opModConnect": false}"#)
        .expect("limit");
    let (mut controller, _senders) = controller(
        vec![device],
        vec![fixed(5_000.0), external_handle],
        Some(inverters_sample(&["10.0.0.10"], 3_000.0, 5_000.0)),
        None,
    );

    let outcome = controller.tick().await;
    let CycleOutcome::Applied { configuration, .. } = outcome else {
        panic!("expected a write, got {outcome:?}");
    };
    assert!(!configuration.connect);
    assert_eq!(configuration.target_solar_watts, 0.0);
    assert_eq!(connection.transport().controls_register(4), 0, "Conn");
    assert_eq!(connection.transport().controls_register(5), 0, "WMaxLimPct");
}

#[tokio::test]
async fn failed_inverter_does_not_block_the_fleet() {
    let (healthy, healthy_connection) = inverter("10.0.0.10");
    let (broken, broken_connection) = inverter("10.0.0.11");
    broken_connection
        .transport()
        .rejecting_writes
        .store(true, Ordering::SeqCst);

    let (mut controller, _senders) = controller(
        vec![healthy, broken],
        vec![fixed(0.0)],
        Some(inverters_sample(&["10.0.0.10", "10.0.0.11"], 4_000.0, 10_000.0)),
        Some(site_sample(-500.0)),
    );

    let outcome = controller.tick().await;
    assert!(matches!(
        outcome,
        CycleOutcome::Applied {
            written: 1,
            failed: 1,
            ..
        }
    ));
    assert_eq!(healthy_connection.transport().writes.load(Ordering::SeqCst), 1);

    // nothing was confirmed for the whole fleet, so the next cycle writes again
    broken_connection
        .transport()
        .rejecting_writes
        .store(false, Ordering::SeqCst);
    assert!(matches!(
        controller.tick().await,
        CycleOutcome::Applied {
            written: 2,
            failed: 0,
            ..
        }
    ));
}

#[tokio::test]
async fn controller_runs_until_cancelled() {
    let (device, connection) = inverter("10.0.0.10");
    let (controller, _senders) = controller(
        vec![device],
        vec![fixed(5_000.0)],
        Some(inverters_sample(&["10.0.0.10"], 3_000.0, 5_000.0)),
        Some(site_sample(-1_000.0)),
    );
    let status = controller.status();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(controller.run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(700)).await;
    cancel.cancel();
    task.await.expect("controller stopped");

    assert_eq!(connection.transport().writes.load(Ordering::SeqCst), 1);
    assert!(status.borrow().last_applied_at.is_some());
}
