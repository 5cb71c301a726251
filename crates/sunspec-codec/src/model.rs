use modbus_client::RegisterTransport;
use tracing::{debug, warn};

use crate::CodecError;

pub type ReadFn<R> = fn(&[u16], &mut R) -> Result<(), CodecError>;
pub type WriteFn<W> = fn(&W, &mut [u16]) -> Result<(), CodecError>;

/// One field of a register model, covering `start..end` relative to the model start.
pub struct Field<R: 'static, W: 'static> {
    pub name: &'static str,
    pub start: usize,
    pub end: usize,
    pub read: ReadFn<R>,
    /// Read-only fields have no writer and no counterpart in `W`.
    pub write: Option<WriteFn<W>>,
}

/// Where a model lives on a particular device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelAddress {
    pub start: u16,
    pub length: u16,
}

/// Declarative mapping between a contiguous register block and the typed model `R`.
///
/// `W` is the writable projection of `R`. Models without writable fields use `()`.
pub struct RegisterModel<R: 'static, W: 'static = ()> {
    pub name: &'static str,
    pub address_length: u16,
    pub fields: &'static [Field<R, W>],
}

impl<R, W> RegisterModel<R, W>
where
    R: Default + Send,
    W: Sync,
{
    /// Checks that field ranges are non-empty, in bounds and non-overlapping.
    pub fn validate(&self) -> Result<(), CodecError> {
        let length = usize::from(self.address_length);
        let mut ranges: Vec<(usize, usize, &'static str)> = self
            .fields
            .iter()
            .map(|field| (field.start, field.end, field.name))
            .collect();
        ranges.sort_unstable();

        let mut previous_end = 0usize;
        for (start, end, name) in ranges {
            if start >= end || end > length || start < previous_end {
                return Err(CodecError::InvalidMapping {
                    model: self.name,
                    field: name,
                });
            }
            previous_end = end;
        }
        Ok(())
    }

    pub fn decode(&self, registers: &[u16]) -> Result<R, CodecError> {
        if registers.len() < usize::from(self.address_length) {
            return Err(CodecError::Truncated {
                model: self.name,
                expected: self.address_length,
                actual: registers.len(),
            });
        }

        let mut model = R::default();
        for field in self.fields {
            (field.read)(&registers[field.start..field.end], &mut model)?;
        }
        Ok(model)
    }

    /// Words not covered by a writable field are left as zero.
    pub fn encode(&self, values: &W, length: usize) -> Result<Vec<u16>, CodecError> {
        let mut registers = vec![0u16; length];
        for field in self.fields {
            let Some(write) = field.write else {
                continue;
            };
            let slot = registers
                .get_mut(field.start..field.end)
                .ok_or(CodecError::InvalidMapping {
                    model: self.name,
                    field: field.name,
                })?;
            write(values, slot)?;
        }
        Ok(registers)
    }

    pub async fn read<T>(&self, transport: &T, address: ModelAddress) -> Result<R, CodecError>
    where
        T: RegisterTransport + ?Sized,
    {
        let registers = transport
            .read_holding_registers(address.start, address.length)
            .await?;
        self.decode(&registers)
    }

    /// Writes `values`, reads the block back and fails on the first writable field whose
    /// registers differ. Devices may clamp or ignore writes while still acknowledging them.
    pub async fn write<T>(
        &self,
        values: &W,
        transport: &T,
        address: ModelAddress,
    ) -> Result<(), CodecError>
    where
        T: RegisterTransport + ?Sized,
    {
        let length = usize::from(address.length);
        let written = self.encode(values, length)?;
        transport.write_registers(address.start, &written).await?;

        let readback = transport
            .read_holding_registers(address.start, address.length)
            .await?;
        self.decode(&readback)?;

        for field in self.fields.iter().filter(|field| field.write.is_some()) {
            if written[field.start..field.end] != readback[field.start..field.end] {
                warn!(
                    model = self.name,
                    field = field.name,
                    written = ?&written[field.start..field.end],
                    readback = ?&readback[field.start..field.end],
                    "register write not applied"
                );
                return Err(CodecError::WriteVerification {
                    model: self.name,
                    field: field.name,
                });
            }
        }

        debug!(model = self.name, start = address.start, "register write verified");
        Ok(())
    }
}

/// Builds a read-only [`Field`] that stores the converted slice into `model.$field`.
#[macro_export]
macro_rules! read_field {
    ($name:literal, $start:expr, $end:expr, $field:ident, $read:path) => {
        $crate::model::Field {
            name: $name,
            start: $start,
            end: $end,
            read: |registers, model| {
                model.$field = $read(registers)?;
                Ok(())
            },
            write: None,
        }
    };
}

/// Builds a writable [`Field`]; the writer reads `values.$field` from the write projection.
#[macro_export]
macro_rules! write_field {
    ($name:literal, $start:expr, $end:expr, $field:ident, $read:path, $write:path) => {
        $crate::model::Field {
            name: $name,
            start: $start,
            end: $end,
            read: |registers, model| {
                model.$field = $read(registers)?;
                Ok(())
            },
            write: Some(|values, registers| $write(values.$field, registers)),
        }
    };
}
