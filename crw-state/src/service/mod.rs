pub mod pending_utxos;

use crate::Utxo;

/// The answer to a [`pending_utxos::PendingUtxos::queue`] future.
#[derive(Clone, Debug)]
pub enum Response {
    Utxo(Utxo),
}
