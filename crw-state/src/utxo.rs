use crw_chain::{block, transparent};

/// An unspent output, together with the provenance the chain engine needs
/// to enforce coinbase maturity.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Utxo {
    pub output: transparent::Output,
    pub height: block::Height,
    pub is_coinbase: bool,
}

impl Utxo {
    pub fn new(output: transparent::Output, height: block::Height, is_coinbase: bool) -> Self {
        Utxo { output, height, is_coinbase }
    }

    /// `true` once `tip_height` is at least `maturity` blocks past `self.height`.
    pub fn is_mature(&self, tip_height: block::Height, maturity: u32) -> bool {
        if !self.is_coinbase {
            return true;
        }
        tip_height.0.saturating_sub(self.height.0) >= maturity
    }
}
