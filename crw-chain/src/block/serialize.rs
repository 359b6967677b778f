/// The maximum size of a block, in bytes.
///
/// After SegWit activation this includes the size of the witness structure.
pub const MAX_BLOCK_BYTES: u64 = 4_000_000;
