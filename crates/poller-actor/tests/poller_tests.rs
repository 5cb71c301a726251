use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use modbus_client::{ClientError, RegisterTransport};
use poller_actor::{
    ExternalSiteSource, InverterPoller, MeterPoller, PollerActor, PollerConfig, PollerError,
    SampleSource, SunSpecDevice,
};
use sunspec_codec::{SunSpecConnection, SUNSPEC_BASE_ADDRESS};
use tokio_util::sync::CancellationToken;
use types::{DeviceIdentity, PowerReading};

const BASE: u16 = SUNSPEC_BASE_ADDRESS;

struct FakeDevice {
    registers: Mutex<Vec<u16>>,
    offline: AtomicBool,
}

#[async_trait]
impl RegisterTransport for FakeDevice {
    async fn read_holding_registers(&self, start: u16, count: u16) -> Result<Vec<u16>, ClientError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ClientError::Timeout { timeout_ms: 1_000 });
        }
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

    async fn write_registers(&self, _start: u16, _values: &[u16]) -> Result<(), ClientError> {
        Ok(())
    }
}

fn block(id: u16, len: u16, values: &[(usize, u16)]) -> Vec<u16> {
    let mut block = vec![0u16; usize::from(len) + 2];
    block[0] = id;
    block[1] = len;
    for (offset, value) in values {
        block[*offset] = *value;
    }
    block
}

fn sunspec_map(blocks: Vec<Vec<u16>>) -> Vec<u16> {
    let mut registers = vec![0x5375, 0x6e53];
    for block in blocks {
        registers.extend(block);
    }
    registers.extend([0xFFFF, 0]);
    registers
}

fn inverter_registers(watts: u16, rated: u16) -> Vec<u16> {
    sunspec_map(vec![
        block(1, 66, &[]),
        block(
            103,
            50,
            &[(10, 2_400), (13, (-1i16) as u16), (14, watts), (16, 5_000), (17, (-2i16) as u16)],
        ),
        block(120, 26, &[(3, rated), (5, rated)]),
        block(121, 30, &[(2, rated)]),
        block(122, 44, &[(2, 1)]),
        block(123, 24, &[(23, 0)]),
    ])
}

fn meter_registers(phase_a: i16, phase_b: i16) -> Vec<u16> {
    sunspec_map(vec![block(
        203,
        105,
        &[
            (8, 2_410),
            (9, 2_390),
            (15, (-1i16) as u16),
            (16, 50),
            (18, (phase_a + phase_b) as u16),
            (19, phase_a as u16),
            (20, phase_b as u16),
            (21, 0x8000),
        ],
    )])
}

fn device(ip: &str, registers: Vec<u16>) -> (SunSpecDevice<FakeDevice>, Arc<SunSpecConnection<FakeDevice>>) {
    let connection = Arc::new(SunSpecConnection::new(
        FakeDevice {
            registers: Mutex::new(registers),
            offline: AtomicBool::new(false),
        },
        BASE,
    ));
    let device = SunSpecDevice {
        identity: DeviceIdentity {
            ip: ip.to_string(),
            port: 502,
            unit_id: 1,
        },
        connection: Arc::clone(&connection),
    };
    (device, connection)
}

#[tokio::test]
async fn inverter_poller_aggregates_fleet() {
    let (first, _) = device("10.0.0.10", inverter_registers(3_000, 5_000));
    let (second, _) = device("10.0.0.11", inverter_registers(1_500, 3_000));
    let poller = InverterPoller::new(vec![first, second]);

    let sample = poller.poll().await.expect("sample");
    assert_eq!(sample.devices.len(), 2);
    assert_eq!(sample.der.real_power, PowerReading::NoPhase { net: 4_500.0 });
    assert_eq!(sample.nameplate.max_w, 8_000.0);
    assert_eq!(sample.nameplate.max_va, 8_000.0);
    let voltage = sample.der.voltage.expect("voltage");
    assert!((voltage.phase_a - 240.0).abs() < 1e-9);
    assert!((sample.der.frequency.expect("frequency") - 50.0).abs() < 1e-9);
}

#[tokio::test]
async fn one_failing_inverter_fails_the_tick() {
    let (first, _) = device("10.0.0.10", inverter_registers(3_000, 5_000));
    let (second, connection) = device("10.0.0.11", inverter_registers(1_500, 3_000));
    connection.transport().offline.store(true, Ordering::SeqCst);

    let poller = InverterPoller::new(vec![first, second]);
    let err = poller.poll().await.expect_err("offline");
    match err {
        PollerError::Device { device, .. } => assert_eq!(device.ip, "10.0.0.11"),
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn meter_poller_builds_site_sample() {
    let (meter, _) = device("10.0.0.20", meter_registers(-1_200, 200));
    let poller = MeterPoller::new(vec![meter]);

    let sample = poller.poll().await.expect("site sample");
    assert_eq!(
        sample.real_power,
        PowerReading::PerPhaseNet {
            phase_a: -1_200.0,
            phase_b: Some(200.0),
            phase_c: None,
            net: -1_000.0,
        }
    );
    assert!((sample.voltage.phase_a - 241.0).abs() < 1e-9);
    assert_eq!(sample.frequency, Some(50.0));
}

#[tokio::test]
async fn actor_publishes_and_stops_on_cancel() {
    let (first, _) = device("10.0.0.10", inverter_registers(2_000, 5_000));
    let cancel = CancellationToken::new();
    let (actor, mut receiver) = PollerActor::new(
        InverterPoller::new(vec![first]),
        PollerConfig {
            poll_interval: Duration::from_millis(200),
            jitter_ms: 0,
        },
        cancel.clone(),
    );
    let handle = actor.spawn();

    receiver.changed().await.expect("published");
    let sample = receiver.borrow().clone().expect("sample");
    assert_eq!(sample.der.real_power.net(), 2_000.0);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("stopped")
        .expect("joined");
}

#[tokio::test]
async fn external_source_republishes_last_valid_payload() {
    let (feed, source) = ExternalSiteSource::channel();
    assert!(matches!(source.poll().await, Err(PollerError::NoData)));

    feed.push_json(
        r#"{
            "realPower": {"type": "noPhase", "net": -2500},
            "reactivePower": {"type": "noPhase", "net": 0},
            "voltage": {"type": "perPhase", "phaseA": 240, "phaseB": null, "phaseC": null},
            "frequency": 50
        }"#,
    )
    .expect("valid payload");
    assert!(feed.push_json("{\"realPower\": \"lots\"}").is_err());

    let first = source.poll().await.expect("sample");
    let second = source.poll().await.expect("sample");
    assert_eq!(first.real_power.net(), -2_500.0);
    assert_eq!(second.real_power, first.real_power);
    assert!(second.date >= first.date);
}
