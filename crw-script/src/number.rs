//! Script numbers: signed integers encoded as minimally-sized little-endian
//! byte strings with a sign bit in the most significant byte, the way
//! Bitcoin's `CScriptNum` works.

use crate::error::ScriptError;

/// The interpreter only accepts numeric operands up to 4 bytes wide;
/// `OP_CHECKSEQUENCEVERIFY`/`OP_CHECKLOCKTIMEVERIFY` read wider ones
/// directly as unsigned values instead of going through this type.
pub const MAX_NUM_SIZE: usize = 4;

/// Decodes a stack element as a script number.
///
/// `require_minimal` rejects encodings with unnecessary trailing zero (or
/// `0x80`) bytes, matching the `MINIMALDATA` behavior the interpreter
/// enables unconditionally for arithmetic inputs.
pub fn decode(bytes: &[u8], require_minimal: bool) -> Result<i64, ScriptError> {
    if bytes.len() > MAX_NUM_SIZE {
        return Err(ScriptError::NumericOverflow);
    }
    if bytes.is_empty() {
        return Ok(0);
    }
    if require_minimal {
        let last = bytes[bytes.len() - 1];
        if last & 0x7f == 0 {
            let unambiguous = bytes.len() <= 1 || bytes[bytes.len() - 2] & 0x80 != 0;
            if unambiguous {
                return Err(ScriptError::NonMinimalPush);
            }
        }
    }

    let mut result: i64 = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        result |= (byte as i64) << (8 * i);
    }

    let last = bytes[bytes.len() - 1];
    if last & 0x80 != 0 {
        result &= !(0x80i64 << (8 * (bytes.len() - 1)));
        result = -result;
    }
    Ok(result)
}

/// Encodes a signed integer as a minimal script number.
pub fn encode(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }

    let negative = value < 0;
    let mut magnitude = value.unsigned_abs();
    let mut bytes = Vec::new();
    while magnitude > 0 {
        bytes.push((magnitude & 0xff) as u8);
        magnitude >>= 8;
    }

    if bytes.last().copied().unwrap_or(0) & 0x80 != 0 {
        bytes.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        *bytes.last_mut().expect("non-zero value has at least one byte") |= 0x80;
    }
    bytes
}

/// Interprets a stack element as a boolean the way the interpreter's final
/// stack-top check and `OP_IF`/`OP_NOTIF` do: any non-zero byte string that
/// isn't the single negative-zero encoding `[0x80]` is "true".
pub fn to_bool(bytes: &[u8]) -> bool {
    for (i, &byte) in bytes.iter().enumerate() {
        if byte != 0 {
            if i == bytes.len() - 1 && byte == 0x80 {
                return false;
            }
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        for value in [-500_000i64, -1, 0, 1, 127, 128, 32767, 500_000] {
            let encoded = encode(value);
            assert_eq!(decode(&encoded, true).unwrap(), value);
        }
    }

    #[test]
    fn rejects_non_minimal_encoding() {
        assert!(decode(&[0x01, 0x00], true).is_err());
        assert!(decode(&[0x01, 0x00], false).is_ok());
    }

    #[test]
    fn negative_zero_is_false() {
        assert!(!to_bool(&[0x80]));
        assert!(!to_bool(&[]));
        assert!(to_bool(&[0x01]));
    }
}
