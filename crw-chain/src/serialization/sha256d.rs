//! Double-SHA256, the hash function used for block and transaction ids.

use sha2::{Digest, Sha256};
use std::io;

/// A streaming double-SHA256 writer.
///
/// Feed it the bytes to be hashed via `io::Write`, then call [`Writer::finish`]
/// to get the digest. Used so header/transaction hashes can be computed
/// directly from the serialization path without building an intermediate
/// `Vec<u8>`.
#[derive(Default, Clone)]
pub struct Writer {
    hasher: Sha256,
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Writer {
    /// Finalizes the writer, returning the double-SHA256 digest.
    pub fn finish(self) -> [u8; 32] {
        let first = self.hasher.finalize();
        let second = Sha256::digest(&first);
        let mut out = [0u8; 32];
        out.copy_from_slice(&second);
        out
    }
}

/// Computes the double-SHA256 digest of `data` in one call.
pub fn hash(data: &[u8]) -> [u8; 32] {
    let mut w = Writer::default();
    io::Write::write_all(&mut w, data).expect("writing to a Writer is infallible");
    w.finish()
}
