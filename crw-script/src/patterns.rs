//! Pure pattern recognizers for the standard output script templates.

use crate::interpreter::next_instruction;
use crate::opcode::*;

/// `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
pub fn is_p2pkh(script: &[u8]) -> bool {
    script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 0x14
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
}

/// `OP_HASH160 <20 bytes> OP_EQUAL`
pub fn is_p2sh(script: &[u8]) -> bool {
    script.len() == 23 && script[0] == OP_HASH160 && script[1] == 0x14 && script[22] == OP_EQUAL
}

/// `<pubkey> OP_CHECKSIG`, for either a compressed (33-byte) or
/// uncompressed (65-byte) public key.
pub fn is_p2pk(script: &[u8]) -> bool {
    let compressed = script.len() == 35 && script[0] == 0x21 && script[34] == OP_CHECKSIG;
    let uncompressed = script.len() == 67 && script[0] == 0x41 && script[66] == OP_CHECKSIG;
    compressed || uncompressed
}

/// `OP_0 <20 bytes>`, a version-0 witness program committing to a pubkey
/// hash.
pub fn is_p2wpkh(script: &[u8]) -> bool {
    script.len() == 22 && script[0] == OP_0 && script[1] == 0x14
}

/// `OP_0 <32 bytes>`, a version-0 witness program committing to a script
/// hash.
pub fn is_p2wsh(script: &[u8]) -> bool {
    script.len() == 34 && script[0] == OP_0 && script[1] == 0x20
}

/// `true` if `script` is any recognized version-0 witness program.
pub fn is_witness_program(script: &[u8]) -> bool {
    is_p2wpkh(script) || is_p2wsh(script)
}

/// `true` if every opcode in `script` is a data push (`OP_0`..`OP_16`, a
/// direct-length push, or `OP_PUSHDATA1`/`2`/`4`), as BIP16 requires of a
/// P2SH scriptSig. A malformed script (truncated push) is not push-only.
pub fn is_push_only(script: &[u8]) -> bool {
    let mut pos = 0;
    loop {
        match next_instruction(script, &mut pos) {
            Ok(Some(instruction)) => {
                if instruction.opcode > OP_16 {
                    return false;
                }
            }
            Ok(None) => return true,
            Err(_) => return false,
        }
    }
}

/// `<m> <pubkey>... <n> OP_CHECKMULTISIG`, for small `m`/`n` encoded as
/// `OP_1`..`OP_16` pushes.
pub fn is_bare_multisig(script: &[u8]) -> bool {
    if script.len() < 3 {
        return false;
    }
    if *script.last().unwrap() != OP_CHECKMULTISIG {
        return false;
    }
    let m = script[0];
    if !is_small_int(m) {
        return false;
    }
    let mut pos = 1;
    let mut key_count = 0i64;
    while pos < script.len() - 2 {
        let len = script[pos] as usize;
        if len == 0 || len > 0x4b {
            return false;
        }
        pos += 1 + len;
        key_count += 1;
    }
    if pos != script.len() - 2 {
        return false;
    }
    let n = script[script.len() - 2];
    is_small_int(n) && small_int_value(n) == key_count && small_int_value(m) <= key_count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_p2pkh() {
        let mut script = vec![OP_DUP, OP_HASH160, 0x14];
        script.extend_from_slice(&[0u8; 20]);
        script.push(OP_EQUALVERIFY);
        script.push(OP_CHECKSIG);
        assert!(is_p2pkh(&script));
        assert!(!is_p2sh(&script));
    }

    #[test]
    fn recognizes_p2wpkh() {
        let mut script = vec![OP_0, 0x14];
        script.extend_from_slice(&[0u8; 20]);
        assert!(is_p2wpkh(&script));
        assert!(is_witness_program(&script));
        assert!(!is_p2wsh(&script));
    }

    #[test]
    fn push_only_accepts_data_pushes_and_small_ints() {
        assert!(is_push_only(&[0x01, 0xab]));
        assert!(is_push_only(&[OP_0, OP_1, OP_16]));
        assert!(is_push_only(&[]));
    }

    #[test]
    fn push_only_rejects_a_non_push_opcode() {
        assert!(!is_push_only(&[0x01, 0xab, OP_CHECKSIG]));
        assert!(!is_push_only(&[OP_DUP]));
    }
}
