//! The errors a script can fail validation with.

use thiserror::Error;

/// Why a script failed to validate.
///
/// Every variant here corresponds to a concrete, deterministic failure mode
/// of the interpreter -- there is no catch-all "invalid script" case, so
/// callers can distinguish a malformed script from one that's merely false.
#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum ScriptError {
    #[error("popped from an empty stack")]
    StackUnderflow,

    #[error("script exceeds the maximum size of {0} bytes")]
    ScriptTooLarge(usize),

    #[error("combined stack depth {0} exceeds the maximum of {1}")]
    StackTooDeep(usize, usize),

    #[error("executed opcode count {0} exceeds the maximum of {1}")]
    OpCountExceeded(usize, usize),

    #[error("signature is not a validly DER-encoded ECDSA signature")]
    InvalidSignatureEncoding,

    #[error("public key is not a validly encoded secp256k1 point")]
    InvalidPubkeyEncoding,

    #[error("data push did not use the minimal encoding for its length")]
    NonMinimalPush,

    #[error("numeric operand out of the 4-byte range the interpreter accepts")]
    NumericOverflow,

    #[error("script evaluation ended with a false top stack element")]
    EvalFalse,

    #[error("opcode {0:#04x} is permanently disabled")]
    DisabledOpcode(u8),

    #[error("invalid stack operation")]
    InvalidStackOperation,

    #[error("OP_VERIFY failed")]
    VerifyFailed,

    #[error("pushed element of {0} bytes exceeds the maximum of {1}")]
    PushSizeExceeded(usize, usize),

    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    #[error("OP_IF/OP_NOTIF without a matching OP_ENDIF")]
    UnbalancedConditional,

    #[error("OP_CHECKMULTISIG key or signature count out of range")]
    PubkeyCount,

    #[error("CHECKLOCKTIMEVERIFY requires a 4-byte stack argument and an unlocked locktime")]
    UnsatisfiedLockTime,

    #[error("CHECKSEQUENCEVERIFY requires a 4-byte stack argument and an unlocked sequence")]
    UnsatisfiedSequence,

    #[error("witness program length does not match a known version")]
    InvalidWitnessProgram,

    #[error("P2SH redeem script hash does not match the committed hash")]
    RedeemScriptMismatch,

    #[error("P2SH scriptSig contains non-push opcodes")]
    SigScriptNotPushOnly,
}
