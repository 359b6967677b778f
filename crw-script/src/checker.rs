//! The interface the interpreter uses to validate signatures and time locks
//! without knowing anything about transactions itself.

use crate::error::ScriptError;

/// Supplies the transaction-dependent checks `OP_CHECKSIG`,
/// `OP_CHECKMULTISIG`, `OP_CHECKLOCKTIMEVERIFY`, and
/// `OP_CHECKSEQUENCEVERIFY` need.
///
/// Keeping this as a trait rather than threading a `Transaction` and input
/// index through the interpreter directly means the interpreter can be
/// exercised (and fuzzed) against bare scripts with a stub checker, with no
/// transaction machinery in scope at all.
pub trait SignatureChecker {
    /// Verifies `signature` (including its trailing sighash-type byte)
    /// against `pubkey` over the sighash computed using `script_code` as
    /// the scriptCode (the subscript, with the other inputs' scripts
    /// blanked and `OP_CODESEPARATOR`-preceding bytes removed).
    fn check_sig(&self, signature: &[u8], pubkey: &[u8], script_code: &[u8]) -> Result<bool, ScriptError>;

    /// BIP65: `true` if the spending transaction's locktime has passed the
    /// value `OP_CHECKLOCKTIMEVERIFY` asserts.
    fn check_lock_time(&self, lock_time: i64) -> bool;

    /// BIP112: `true` if the spent input's relative-locktime (sequence
    /// number) has passed the value `OP_CHECKSEQUENCEVERIFY` asserts.
    fn check_sequence(&self, sequence: i64) -> bool;
}

/// A checker that always fails every signature and time-lock check.
///
/// Used to evaluate a standalone script (no spending transaction context),
/// e.g. to sanity-check a freshly constructed output script.
pub struct NullChecker;

impl SignatureChecker for NullChecker {
    fn check_sig(&self, _signature: &[u8], _pubkey: &[u8], _script_code: &[u8]) -> Result<bool, ScriptError> {
        Ok(false)
    }

    fn check_lock_time(&self, _lock_time: i64) -> bool {
        false
    }

    fn check_sequence(&self, _sequence: i64) -> bool {
        false
    }
}
