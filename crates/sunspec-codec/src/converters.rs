//! Register slice converters. Multi-word values are big-endian by word, as SunSpec mandates.

use crate::CodecError;

fn expect_width(registers: &[u16], width: usize) -> Result<(), CodecError> {
    if registers.len() != width {
        return Err(CodecError::Width {
            expected: width,
            actual: registers.len(),
        });
    }
    Ok(())
}

pub fn registers_to_u16(registers: &[u16]) -> Result<u16, CodecError> {
    expect_width(registers, 1)?;
    Ok(registers[0])
}

pub fn registers_to_i16(registers: &[u16]) -> Result<i16, CodecError> {
    expect_width(registers, 1)?;
    Ok(registers[0] as i16)
}

pub fn registers_to_u32(registers: &[u16]) -> Result<u32, CodecError> {
    expect_width(registers, 2)?;
    Ok((u32::from(registers[0]) << 16) | u32::from(registers[1]))
}

pub fn registers_to_i32(registers: &[u16]) -> Result<i32, CodecError> {
    registers_to_u32(registers).map(|value| value as i32)
}

pub fn registers_to_u64(registers: &[u16]) -> Result<u64, CodecError> {
    expect_width(registers, 4)?;
    Ok(registers
        .iter()
        .fold(0u64, |acc, word| (acc << 16) | u64::from(*word)))
}

/// Scale factors are signed exponents limited to -10..=10; `0x8000` marks "not implemented".
pub fn registers_to_sunssf(registers: &[u16]) -> Result<i16, CodecError> {
    let value = registers_to_i16(registers)?;
    if value != i16::MIN && !(-10..=10).contains(&value) {
        return Err(CodecError::InvalidScaleFactor(value));
    }
    Ok(value)
}

/// Two ASCII bytes per word, NUL padded.
pub fn registers_to_string(registers: &[u16]) -> Result<String, CodecError> {
    let bytes: Vec<u8> = registers
        .iter()
        .flat_map(|word| word.to_be_bytes())
        .take_while(|byte| *byte != 0)
        .collect();
    Ok(String::from_utf8_lossy(&bytes).trim_end().to_string())
}

pub fn u16_to_registers(value: u16, registers: &mut [u16]) -> Result<(), CodecError> {
    expect_width(registers, 1)?;
    registers[0] = value;
    Ok(())
}

pub fn i16_to_registers(value: i16, registers: &mut [u16]) -> Result<(), CodecError> {
    u16_to_registers(value as u16, registers)
}

pub fn sunssf_to_registers(value: i16, registers: &mut [u16]) -> Result<(), CodecError> {
    if value != i16::MIN && !(-10..=10).contains(&value) {
        return Err(CodecError::InvalidScaleFactor(value));
    }
    i16_to_registers(value, registers)
}

pub fn u32_to_registers(value: u32, registers: &mut [u16]) -> Result<(), CodecError> {
    expect_width(registers, 2)?;
    registers[0] = (value >> 16) as u16;
    registers[1] = value as u16;
    Ok(())
}

pub fn i32_to_registers(value: i32, registers: &mut [u16]) -> Result<(), CodecError> {
    u32_to_registers(value as u32, registers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_signed_and_wide_values() {
        assert_eq!(registers_to_i16(&[0xff80]).expect("i16"), -128);
        assert_eq!(registers_to_u32(&[0x0001, 0x0002]).expect("u32"), 0x0001_0002);
        assert_eq!(registers_to_i32(&[0xffff, 0xfffe]).expect("i32"), -2);
        assert_eq!(
            registers_to_u64(&[0, 0, 0x0001, 0x0000]).expect("u64"),
            0x0001_0000
        );
    }

    #[test]
    fn decodes_nul_padded_strings() {
        let value = registers_to_string(&[0x6865, 0x6c6c, 0x6f00]).expect("string");
        assert_eq!(value, "hello");
        assert_eq!(registers_to_string(&[0, 0]).expect("empty"), "");
    }

    #[test]
    fn rejects_width_mismatch() {
        assert!(matches!(
            registers_to_u32(&[1]),
            Err(CodecError::Width {
                expected: 2,
                actual: 1
            })
        ));
        let mut out = [0u16; 2];
        assert!(u16_to_registers(1, &mut out).is_err());
    }

    #[test]
    fn scale_factor_range_is_enforced() {
        assert_eq!(registers_to_sunssf(&[0xfffe]).expect("sf"), -2);
        assert_eq!(registers_to_sunssf(&[0x8000]).expect("sentinel"), i16::MIN);
        assert!(matches!(
            registers_to_sunssf(&[11]),
            Err(CodecError::InvalidScaleFactor(11))
        ));
    }
}
