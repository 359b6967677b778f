//! Signature hash computation and the concrete [`SignatureChecker`] used to
//! validate a real transaction input.

use sha2::{Digest, Sha256};

use crw_chain::{
    amount::{Amount, NonNegative},
    transaction::{LockTime, Transaction},
    transparent,
};

use crate::{checker::SignatureChecker, error::ScriptError, flags::Flags};

pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_NONE: u32 = 0x02;
pub const SIGHASH_SINGLE: u32 = 0x03;
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

const SIGHASH_OUTPUT_MASK: u32 = 0x1f;

fn sha256d(bytes: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(bytes);
    let second = Sha256::digest(&first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

/// Removes every `OP_CODESEPARATOR` byte (0xab) from `script`, and any bytes
/// pushed by `OP_CODESEPARATOR`-preceding pushdata are left untouched since
/// `OP_CODESEPARATOR` never appears as push data here: the caller already
/// sliced the script at the last separator before calling in.
fn drop_code_separators(script: &[u8]) -> Vec<u8> {
    script.iter().copied().filter(|&b| b != crate::opcode::OP_CODESEPARATOR).collect()
}

/// Computes the pre-segwit (legacy) signature hash for spending `input_index`
/// of `tx`, using `script_code` (the subscript, already sliced at the last
/// `OP_CODESEPARATOR`) as the scriptCode.
pub fn legacy_sighash(tx: &Transaction, input_index: usize, script_code: &[u8], hash_type: u32) -> [u8; 32] {
    let script_code = drop_code_separators(script_code);

    let anyone_can_pay = hash_type & SIGHASH_ANYONECANPAY != 0;
    let base_type = hash_type & !SIGHASH_ANYONECANPAY;

    let mut inputs = Vec::new();
    if anyone_can_pay {
        if let Some(transparent::Input::PrevOut { outpoint, sequence, .. }) = tx.inputs.get(input_index) {
            inputs.push(transparent::Input::PrevOut {
                outpoint: *outpoint,
                unlock_script: transparent::Script(script_code.clone()),
                sequence: *sequence,
                witness: Vec::new(),
            });
        }
    } else {
        for (i, input) in tx.inputs.iter().enumerate() {
            match input {
                transparent::Input::PrevOut { outpoint, sequence, .. } => {
                    let sequence = if i != input_index && (base_type == SIGHASH_NONE || base_type == SIGHASH_SINGLE) {
                        0
                    } else {
                        *sequence
                    };
                    let script = if i == input_index {
                        transparent::Script(script_code.clone())
                    } else {
                        transparent::Script(Vec::new())
                    };
                    inputs.push(transparent::Input::PrevOut {
                        outpoint: *outpoint,
                        unlock_script: script,
                        sequence,
                        witness: Vec::new(),
                    });
                }
                coinbase @ transparent::Input::Coinbase { .. } => inputs.push(coinbase.clone()),
            }
        }
    }

    let outputs = match base_type {
        SIGHASH_NONE => Vec::new(),
        SIGHASH_SINGLE => {
            if input_index >= tx.outputs.len() {
                // The reference behavior for an out-of-range SIGHASH_SINGLE
                // index: hash the constant `0000...0001`, handled by the
                // caller inspecting this case before calling in. Here we
                // just produce an empty output list and let that caller path
                // take over; this function is never reached for that case.
                Vec::new()
            } else {
                tx.outputs[..=input_index].to_vec()
            }
        }
        _ => tx.outputs.clone(),
    };

    let stripped = Transaction::new(tx.version, inputs, outputs, tx.locktime.clone());

    let mut preimage = Vec::new();
    crw_chain::BitcoinSerialize::bitcoin_serialize(&stripped, &mut preimage)
        .expect("serializing to a Vec cannot fail");
    preimage.extend_from_slice(&hash_type.to_le_bytes());

    sha256d(&preimage)
}

/// BIP143 witness program signature hash.
#[allow(clippy::too_many_arguments)]
pub fn segwit_sighash(
    tx: &Transaction,
    input_index: usize,
    script_code: &[u8],
    amount: Amount<NonNegative>,
    hash_type: u32,
) -> [u8; 32] {
    let anyone_can_pay = hash_type & SIGHASH_ANYONECANPAY != 0;
    let base_type = hash_type & SIGHASH_OUTPUT_MASK;

    let hash_prevouts = if anyone_can_pay {
        [0u8; 32]
    } else {
        let mut bytes = Vec::new();
        for input in &tx.inputs {
            if let transparent::Input::PrevOut { outpoint, .. } = input {
                crw_chain::BitcoinSerialize::bitcoin_serialize(outpoint, &mut bytes).unwrap();
            }
        }
        sha256d(&bytes)
    };

    let hash_sequence = if !anyone_can_pay && base_type != SIGHASH_NONE && base_type != SIGHASH_SINGLE {
        let mut bytes = Vec::new();
        for input in &tx.inputs {
            if let transparent::Input::PrevOut { sequence, .. } = input {
                bytes.extend_from_slice(&sequence.to_le_bytes());
            }
        }
        sha256d(&bytes)
    } else {
        [0u8; 32]
    };

    let hash_outputs = if base_type != SIGHASH_NONE && base_type != SIGHASH_SINGLE {
        let mut bytes = Vec::new();
        for output in &tx.outputs {
            crw_chain::BitcoinSerialize::bitcoin_serialize(output, &mut bytes).unwrap();
        }
        sha256d(&bytes)
    } else if base_type == SIGHASH_SINGLE && input_index < tx.outputs.len() {
        let mut bytes = Vec::new();
        crw_chain::BitcoinSerialize::bitcoin_serialize(&tx.outputs[input_index], &mut bytes).unwrap();
        sha256d(&bytes)
    } else {
        [0u8; 32]
    };

    let (outpoint, sequence) = match &tx.inputs[input_index] {
        transparent::Input::PrevOut { outpoint, sequence, .. } => (*outpoint, *sequence),
        transparent::Input::Coinbase { .. } => panic!("segwit sighash requested for a coinbase input"),
    };

    let mut preimage = Vec::new();
    preimage.extend_from_slice(&tx.version.to_le_bytes());
    preimage.extend_from_slice(&hash_prevouts);
    preimage.extend_from_slice(&hash_sequence);
    crw_chain::BitcoinSerialize::bitcoin_serialize(&outpoint, &mut preimage).unwrap();
    let script_code = drop_code_separators(script_code);
    crw_chain::compactint::CompactInt::from(script_code.len())
        .bitcoin_serialize(&mut preimage)
        .unwrap();
    preimage.extend_from_slice(&script_code);
    preimage.extend_from_slice(&amount.satoshis().to_le_bytes());
    preimage.extend_from_slice(&sequence.to_le_bytes());
    preimage.extend_from_slice(&hash_outputs);
    match &tx.locktime {
        LockTime::Height(height) => preimage.extend_from_slice(&height.0.to_le_bytes()),
        LockTime::Time(time) => preimage.extend_from_slice(&time.timestamp().to_le_bytes()),
    }
    preimage.extend_from_slice(&hash_type.to_le_bytes());

    sha256d(&preimage)
}

/// Information about the output being spent, supplied by the caller (the
/// UTXO set lookup happens outside the script engine).
pub struct SpentOutput {
    pub amount: Amount<NonNegative>,
    pub is_witness: bool,
}

/// A [`SignatureChecker`] backed by a real transaction, input index, and the
/// output it spends.
pub struct TransactionSignatureChecker<'a> {
    pub tx: &'a Transaction,
    pub input_index: usize,
    pub spent: SpentOutput,
    pub flags: Flags,
}

impl<'a> TransactionSignatureChecker<'a> {
    pub fn new(tx: &'a Transaction, input_index: usize, spent: SpentOutput, flags: Flags) -> Self {
        TransactionSignatureChecker { tx, input_index, spent, flags }
    }
}

impl<'a> SignatureChecker for TransactionSignatureChecker<'a> {
    fn check_sig(&self, signature: &[u8], pubkey: &[u8], script_code: &[u8]) -> Result<bool, ScriptError> {
        if signature.is_empty() {
            return Ok(false);
        }
        let (sig_der, hash_type) = signature.split_at(signature.len() - 1);
        let hash_type = hash_type[0] as u32;

        if self.flags.contains(Flags::STRICT_DER) && !is_strict_der(sig_der) {
            return Err(ScriptError::InvalidSignatureEncoding);
        }
        let public_key = secp256k1::PublicKey::from_slice(pubkey).map_err(|_| ScriptError::InvalidPubkeyEncoding)?;
        let mut signature =
            secp256k1::Signature::from_der_lax(sig_der).map_err(|_| ScriptError::InvalidSignatureEncoding)?;
        if self.flags.contains(Flags::LOW_S) {
            signature.normalize_s();
        }

        let message_hash = if self.spent.is_witness {
            segwit_sighash(self.tx, self.input_index, script_code, self.spent.amount, hash_type)
        } else {
            legacy_sighash(self.tx, self.input_index, script_code, hash_type)
        };
        let message = secp256k1::Message::from_slice(&message_hash).expect("32-byte hash is a valid message");

        let secp = secp256k1::Secp256k1::verification_only();
        Ok(secp.verify(&message, &signature, &public_key).is_ok())
    }

    fn check_lock_time(&self, lock_time: i64) -> bool {
        let tx_lock_time: i64 = match &self.tx.locktime {
            LockTime::Height(h) => h.0 as i64,
            LockTime::Time(t) => t.timestamp(),
        };

        let comparing_heights = lock_time < LockTime::LOCKTIME_THRESHOLD as i64;
        let tx_comparing_heights = tx_lock_time < LockTime::LOCKTIME_THRESHOLD as i64;
        if comparing_heights != tx_comparing_heights {
            return false;
        }
        if lock_time > tx_lock_time {
            return false;
        }
        match self.tx.inputs.get(self.input_index) {
            Some(transparent::Input::PrevOut { sequence, .. }) => *sequence != 0xffff_ffff,
            _ => false,
        }
    }

    fn check_sequence(&self, sequence: i64) -> bool {
        const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;
        const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;
        const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000_ffff;

        if self.tx.version < 2 {
            return false;
        }
        let tx_sequence = match self.tx.inputs.get(self.input_index) {
            Some(transparent::Input::PrevOut { sequence, .. }) => *sequence,
            _ => return false,
        };
        if tx_sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
            return false;
        }
        let sequence = sequence as u32;
        if sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
            return false;
        }
        let type_flag = SEQUENCE_LOCKTIME_TYPE_FLAG;
        if (tx_sequence & type_flag) != (sequence & type_flag) {
            return false;
        }
        (sequence & SEQUENCE_LOCKTIME_MASK) <= (tx_sequence & SEQUENCE_LOCKTIME_MASK)
    }
}

/// A minimal DER-strictness check (BIP66): a fixed `0x30 len 0x02 ...`
/// structure with no extra trailing bytes beyond the sighash type, which the
/// caller has already stripped.
fn is_strict_der(sig: &[u8]) -> bool {
    if sig.len() < 9 || sig.len() > 72 {
        return false;
    }
    if sig[0] != 0x30 || sig[1] as usize != sig.len() - 2 {
        return false;
    }
    if sig[2] != 0x02 {
        return false;
    }
    let r_len = sig[3] as usize;
    if r_len == 0 || 4 + r_len >= sig.len() {
        return false;
    }
    if sig[4] & 0x80 != 0 {
        return false;
    }
    let s_offset = 4 + r_len;
    if sig[s_offset] != 0x02 {
        return false;
    }
    let s_len = sig[s_offset + 1] as usize;
    if s_len == 0 || s_offset + 2 + s_len != sig.len() {
        return false;
    }
    if sig[s_offset + 2] & 0x80 != 0 {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_der_rejects_short_signature() {
        assert!(!is_strict_der(&[0x30, 0x02, 0x02, 0x00]));
    }
}
