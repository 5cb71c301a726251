use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use modbus_client::{ClientError, RegisterTransport};
use sunspec_codec::converters::{
    i16_to_registers, registers_to_i16, registers_to_string, registers_to_u16, u16_to_registers,
};
use sunspec_codec::{read_field, write_field, CodecError, ModelAddress, RegisterModel};

#[derive(Debug, Default, PartialEq)]
struct TestModel {
    id: u16,
    hello: u16,
    world: i16,
    test: String,
}

#[derive(Debug, Default)]
struct TestWrite {
    hello: u16,
    world: i16,
}

const TEST_MODEL: RegisterModel<TestModel, TestWrite> = RegisterModel {
    name: "test",
    address_length: 6,
    fields: &[
        read_field!("ID", 0, 1, id, registers_to_u16),
        write_field!("Hello", 1, 2, hello, registers_to_u16, u16_to_registers),
        write_field!("World", 2, 3, world, registers_to_i16, i16_to_registers),
        read_field!("Test", 3, 6, test, registers_to_string),
    ],
};

/// Register bank starting at address 0. Offsets in `stuck` ignore writes.
struct FakeDevice {
    registers: Mutex<Vec<u16>>,
    stuck: HashSet<usize>,
    writes: AtomicUsize,
}

impl FakeDevice {
    fn new(registers: Vec<u16>) -> Self {
        Self {
            registers: Mutex::new(registers),
            stuck: HashSet::new(),
            writes: AtomicUsize::new(0),
        }
    }

    fn with_stuck(mut self, offset: usize) -> Self {
        self.stuck.insert(offset);
        self
    }
}

#[async_trait]
impl RegisterTransport for FakeDevice {
    async fn read_holding_registers(&self, start: u16, count: u16) -> Result<Vec<u16>, ClientError> {
        let registers = self.registers.lock().expect("lock");
        let start = usize::from(start);
        let end = start + usize::from(count);
        registers
            .get(start..end)
            .map(|slice| slice.to_vec())
            .ok_or(ClientError::ShortRead {
                expected: count,
                received: registers.len().saturating_sub(start),
            })
    }

    async fn write_registers(&self, start: u16, values: &[u16]) -> Result<(), ClientError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut registers = self.registers.lock().expect("lock");
        for (index, value) in values.iter().enumerate() {
            let offset = usize::from(start) + index;
            if !self.stuck.contains(&offset) {
                registers[offset] = *value;
            }
        }
        Ok(())
    }
}

const ADDRESS: ModelAddress = ModelAddress {
    start: 0,
    length: 6,
};

#[test]
fn field_table_is_valid() {
    TEST_MODEL.validate().expect("valid mapping");
}

#[test]
fn overlapping_fields_are_rejected() {
    const OVERLAP: RegisterModel<TestModel> = RegisterModel {
        name: "overlap",
        address_length: 3,
        fields: &[
            read_field!("ID", 0, 2, id, registers_to_u16),
            read_field!("Hello", 1, 2, hello, registers_to_u16),
        ],
    };
    let err = OVERLAP.validate().expect_err("overlap");
    assert!(matches!(err, CodecError::InvalidMapping { field: "Hello", .. }));
}

#[test]
fn decodes_registers_into_model() {
    let model = TEST_MODEL
        .decode(&[1, 0x11, 0x111, 0x6865, 0x6c6c, 0x6f00])
        .expect("decode");
    assert_eq!(
        model,
        TestModel {
            id: 1,
            hello: 0x11,
            world: 0x111,
            test: "hello".to_string(),
        }
    );
}

#[test]
fn decode_rejects_short_blocks() {
    let err = TEST_MODEL.decode(&[1, 2, 3]).expect_err("truncated");
    assert!(matches!(
        err,
        CodecError::Truncated {
            expected: 6,
            actual: 3,
            ..
        }
    ));
}

#[test]
fn encode_writes_only_writable_fields() {
    let registers = TEST_MODEL
        .encode(&TestWrite { hello: 3, world: -128 }, 6)
        .expect("encode");
    assert_eq!(registers, vec![0, 3, 0xff80, 0, 0, 0]);
}

#[tokio::test]
async fn read_uses_one_block_request() {
    let device = FakeDevice::new(vec![1, 0x11, 0x111, 0x6865, 0x6c6c, 0x6f00]);
    let model = TEST_MODEL.read(&device, ADDRESS).await.expect("read");
    assert_eq!(model.test, "hello");
    assert_eq!(model.world, 0x111);
}

#[tokio::test]
async fn write_round_trips_through_device() {
    let device = FakeDevice::new(vec![1, 0x11, 0x111, 0x6865, 0x6c6c, 0x6f00]);
    let values = TestWrite { hello: 3, world: -128 };

    TEST_MODEL
        .write(&values, &device, ADDRESS)
        .await
        .expect("verified write");
    assert_eq!(device.writes.load(Ordering::SeqCst), 1);

    let model = TEST_MODEL.read(&device, ADDRESS).await.expect("read");
    assert_eq!(model.hello, 3);
    assert_eq!(model.world, -128);
}

#[tokio::test]
async fn write_fails_when_device_keeps_old_value() {
    let device = FakeDevice::new(vec![1, 0x11, 0x111, 0, 0, 0]).with_stuck(1);
    let values = TestWrite { hello: 3, world: -128 };

    let err = TEST_MODEL
        .write(&values, &device, ADDRESS)
        .await
        .expect_err("mismatch");
    assert!(matches!(err, CodecError::WriteVerification { field: "Hello", .. }));
    assert!(err.to_string().contains("Failed to write value for key Hello"));
}

#[test]
fn shipped_model_tables_are_valid() {
    use sunspec_codec::models::{
        COMMON_MODEL, CONTROLS_MODEL, INVERTER_MODEL, METER_MODEL, NAMEPLATE_MODEL,
        SETTINGS_MODEL, STATUS_MODEL,
    };

    COMMON_MODEL.validate().expect("common");
    INVERTER_MODEL.validate().expect("inverter");
    NAMEPLATE_MODEL.validate().expect("nameplate");
    SETTINGS_MODEL.validate().expect("settings");
    STATUS_MODEL.validate().expect("status");
    CONTROLS_MODEL.validate().expect("controls");
    METER_MODEL.validate().expect("meter");
}

#[test]
fn controls_encode_then_decode_keeps_every_writable_field() {
    use sunspec_codec::models::{ControlsWrite, CONTROLS_MODEL};

    let cases = [
        ControlsWrite::default(),
        ControlsWrite {
            conn_win_tms: u16::MAX,
            conn_rvrt_tms: u16::MAX,
            conn: u16::MAX,
            w_max_lim_pct: u16::MAX,
            w_max_lim_pct_win_tms: u16::MAX,
            w_max_lim_pct_rvrt_tms: u16::MAX,
            w_max_lim_pct_rmp_tms: u16::MAX,
            w_max_lim_ena: u16::MAX,
        },
        ControlsWrite {
            conn_win_tms: 1,
            conn_rvrt_tms: 2,
            conn: 3,
            w_max_lim_pct: 4,
            w_max_lim_pct_win_tms: 5,
            w_max_lim_pct_rvrt_tms: 6,
            w_max_lim_pct_rmp_tms: 7,
            w_max_lim_ena: 8,
        },
        ControlsWrite {
            conn: 1,
            w_max_lim_pct: 6_250,
            w_max_lim_pct_rmp_tms: 6,
            w_max_lim_ena: 1,
            ..ControlsWrite::default()
        },
    ];

    for values in cases {
        let registers = CONTROLS_MODEL.encode(&values, 26).expect("encode");
        assert_eq!(registers.len(), 26);
        let decoded = CONTROLS_MODEL.decode(&registers).expect("decode");
        let round_tripped = ControlsWrite {
            conn_win_tms: decoded.conn_win_tms,
            conn_rvrt_tms: decoded.conn_rvrt_tms,
            conn: decoded.conn,
            w_max_lim_pct: decoded.w_max_lim_pct,
            w_max_lim_pct_win_tms: decoded.w_max_lim_pct_win_tms,
            w_max_lim_pct_rvrt_tms: decoded.w_max_lim_pct_rvrt_tms,
            w_max_lim_pct_rmp_tms: decoded.w_max_lim_pct_rmp_tms,
            w_max_lim_ena: decoded.w_max_lim_ena,
        };
        assert_eq!(round_tripped, values);
        // read-only registers stay zero-filled
        assert_eq!(decoded.out_pf_set, 0);
        assert_eq!(decoded.var_pct_ena, 0);
    }
}
