pub mod connection;
pub mod converters;
pub mod model;
pub mod models;

use modbus_client::{ClientError, RegisterTransport};
use thiserror::Error;
use tracing::{debug, warn};
use types::PointValue;

pub use connection::SunSpecConnection;
pub use model::{Field, ModelAddress, RegisterModel};

#[derive(Debug, Clone)]
pub struct ModelDefinition {
    pub id: u16,
    pub name: String,
    /// Register start address for this model.
    pub start: u16,
    /// Total register count including the model header (ID + length).
    pub length: u16,
}

impl ModelDefinition {
    pub fn address(&self) -> ModelAddress {
        ModelAddress {
            start: self.start,
            length: self.length,
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("missing SunSpec sentinel at base address")]
    InvalidSentinel,
    #[error("model length overflow")]
    LengthOverflow,
    #[error("model map exceeds {0} entries")]
    TooManyModels(usize),
    #[error("{model} needs {expected} registers, received {actual}")]
    Truncated {
        model: &'static str,
        expected: u16,
        actual: usize,
    },
    #[error("converter expected {expected} registers, received {actual}")]
    Width { expected: usize, actual: usize },
    #[error("scale factor {0} outside -10..=10")]
    InvalidScaleFactor(i16),
    #[error("invalid mapping for {model}.{field}")]
    InvalidMapping {
        model: &'static str,
        field: &'static str,
    },
    #[error("Failed to write value for key {field} of model {model}.")]
    WriteVerification {
        model: &'static str,
        field: &'static str,
    },
    #[error("model {0} not found on device")]
    ModelNotFound(u16),
    #[error("value out of range for {0}")]
    OutOfRange(&'static str),
    #[error(transparent)]
    Transport(#[from] ClientError),
}

pub const SUNSPEC_BASE_ADDRESS: u16 = 40_000;
const SUNSPEC_ID0: u16 = 0x5375;
const SUNSPEC_ID1: u16 = 0x6e53;
const SUNSPEC_END_ID: u16 = 0xFFFF;
const MAX_MODELS: usize = 64;

/// Walks the SunSpec model map one header at a time, starting at `base_address`.
pub async fn discover_models<T>(
    transport: &T,
    base_address: u16,
) -> Result<Vec<ModelDefinition>, CodecError>
where
    T: RegisterTransport + ?Sized,
{
    let sentinel = transport.read_holding_registers(base_address, 2).await?;
    if sentinel.as_slice() != [SUNSPEC_ID0, SUNSPEC_ID1] {
        return Err(CodecError::InvalidSentinel);
    }

    let mut address = base_address
        .checked_add(2)
        .ok_or(CodecError::LengthOverflow)?;
    let mut models = Vec::new();

    loop {
        let header = transport.read_holding_registers(address, 2).await?;
        let (model_id, model_len) = match header.as_slice() {
            [id, len] => (*id, *len),
            _ => return Err(CodecError::LengthOverflow),
        };
        if model_id == SUNSPEC_END_ID {
            break;
        }

        let length = model_len.checked_add(2).ok_or(CodecError::LengthOverflow)?;
        debug!(model_id, start = address, length, "sunspec model found");
        models.push(ModelDefinition {
            id: model_id,
            name: model_name(model_id),
            start: address,
            length,
        });

        if models.len() > MAX_MODELS {
            warn!(count = models.len(), "sunspec model map does not terminate");
            return Err(CodecError::TooManyModels(MAX_MODELS));
        }
        address = address.checked_add(length).ok_or(CodecError::LengthOverflow)?;
    }

    Ok(models)
}

/// SunSpec marks absent values with sentinel patterns (e.g., 0x8000 for i16). Returns None when
/// the raw value or the scale factor is a sentinel.
pub fn apply_scale(raw: PointValue, scale_factor: i16) -> Option<f64> {
    if scale_factor == i16::MIN {
        return None;
    }
    let factor = 10f64.powi(i32::from(scale_factor));
    match raw {
        PointValue::I16(v) if v == i16::MIN => None,
        PointValue::U16(v) if v == u16::MAX => None,
        PointValue::I32(v) if v == i32::MIN => None,
        PointValue::U32(v) if v == u32::MAX => None,
        PointValue::I16(v) => Some(f64::from(v) * factor),
        PointValue::U16(v) => Some(f64::from(v) * factor),
        PointValue::I32(v) => Some(f64::from(v) * factor),
        PointValue::U32(v) => Some(f64::from(v) * factor),
        PointValue::U64(v) => Some((v as f64) * factor),
    }
}

fn model_name(model_id: u16) -> String {
    match model_id {
        1 => "common".to_string(),
        101 => "inverter".to_string(),
        102 => "split_phase_inverter".to_string(),
        103 => "three_phase_inverter".to_string(),
        120 => "nameplate".to_string(),
        121 => "settings".to_string(),
        122 => "status".to_string(),
        123 => "controls".to_string(),
        160 => "mppt".to_string(),
        201 => "meter".to_string(),
        202 => "split_phase_meter".to_string(),
        203 => "wye_meter".to_string(),
        204 => "delta_meter".to_string(),
        _ => format!("model_{model_id}"),
    }
}
