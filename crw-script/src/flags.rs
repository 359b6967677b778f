//! Per-activation interpreter behavior, derived by the caller from height.
//!
//! The interpreter never looks at a block height or network upgrade table
//! itself; the chain engine derives a `Flags` value from the currently
//! active [`crw_chain::parameters::NetworkUpgrade`] and passes it in. This
//! keeps the interpreter a pure function of (script, flags, signature
//! checker).

use bitflags::bitflags;

bitflags! {
    /// Which soft-fork rules the interpreter should enforce.
    pub struct Flags: u32 {
        /// BIP16: treat a script matching the P2SH pattern specially,
        /// evaluating the redeem script it commits to.
        const P2SH = 1 << 0;
        /// BIP66: require strict DER encoding for ECDSA signatures.
        const STRICT_DER = 1 << 1;
        /// BIP65: enable `OP_CHECKLOCKTIMEVERIFY`.
        const CHECKLOCKTIMEVERIFY = 1 << 2;
        /// BIP68/112: enable `OP_CHECKSEQUENCEVERIFY`.
        const CHECKSEQUENCEVERIFY = 1 << 3;
        /// BIP141/143/144: recognize and evaluate witness programs.
        const WITNESS = 1 << 4;
        /// Require the `S` component of ECDSA signatures to be in the lower
        /// half of the curve order (BIP62 malleability fix, subsumed by
        /// segwit's sighash but still enforced for legacy inputs post-fork).
        const LOW_S = 1 << 5;
        /// BIP147: require `OP_IF`/`OP_NOTIF` branch conditions to be exactly
        /// `0x01` or the empty string, not merely truthy.
        const MINIMAL_IF = 1 << 6;
        /// BIP147: require the dummy element consumed by `OP_CHECKMULTISIG`
        /// to be the empty string.
        const NULLDUMMY = 1 << 7;
    }
}

impl Flags {
    /// All rules active from genesis onward, with no soft forks enabled.
    pub const NONE: Flags = Flags::empty();
}

impl Default for Flags {
    fn default() -> Self {
        Flags::empty()
    }
}
