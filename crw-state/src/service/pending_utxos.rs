use std::collections::HashMap;
use std::future::Future;

use tokio::sync::broadcast;

use crw_chain::transparent;

use crate::{BoxError, Utxo};

use super::Response;

/// Tracks in-flight UTXO lookups that named an output not yet in the store,
/// so a caller can await the output arriving instead of polling for it.
#[derive(Debug, Default)]
pub struct PendingUtxos(HashMap<transparent::OutPoint, broadcast::Sender<Utxo>>);

impl PendingUtxos {
    /// Returns a future that resolves to the `transparent::Output` pointed
    /// to by `outpoint` once it's available.
    pub fn queue(&mut self, outpoint: transparent::OutPoint) -> impl Future<Output = Result<Response, BoxError>> {
        let mut receiver = self
            .0
            .entry(outpoint)
            .or_insert_with(|| {
                let (sender, _) = broadcast::channel(1);
                sender
            })
            .subscribe();

        async move { receiver.recv().await.map(Response::Utxo).map_err(BoxError::from) }
    }

    /// Notifies every request waiting on `outpoint` that `utxo` has arrived.
    pub fn respond(&mut self, outpoint: &transparent::OutPoint, utxo: Utxo) {
        if let Some(sender) = self.0.remove(outpoint) {
            tracing::trace!(?outpoint, "found pending UTXO");
            let _ = sender.send(utxo);
        }
    }

    /// Checks every pending request against a freshly committed UTXO set.
    pub fn check_against(&mut self, utxos: &HashMap<transparent::OutPoint, Utxo>) {
        for (outpoint, utxo) in utxos.iter() {
            if let Some(sender) = self.0.remove(outpoint) {
                tracing::trace!(?outpoint, "found pending UTXO");
                let _ = sender.send(utxo.clone());
            }
        }
    }

    /// Drops entries whose last receiver has gone away.
    pub fn prune(&mut self) {
        self.0.retain(|_, chan| chan.receiver_count() > 0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
