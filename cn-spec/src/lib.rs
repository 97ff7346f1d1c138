//! Layout constants shared between the mining engine and any Cryptonight
//! kernel implementation.

/// Slow scratchpad per hashing lane.
pub const CN_SCRATCHPAD_BYTES: usize = 2 * 1024 * 1024;
/// Fast working region per hashing lane.
pub const CN_CACHE_BYTES: usize = 200 * 1024;
/// Digest width of every family member.
pub const CN_DIGEST_BYTES: usize = 32;
/// Capacity of the work blob carried by a job.
pub const CN_MAX_BLOB_BYTES: usize = 112;
/// Byte offset of the little-endian u32 nonce slot inside the blob.
pub const CN_NONCE_OFFSET: usize = 39;
/// Byte offset of the little-endian u64 target comparand inside each digest.
pub const CN_COMPARAND_OFFSET: usize = 24;
/// Widest multiway kernel in the family.
pub const CN_MAX_WAYS: usize = 6;

/// Memory footprint of one hashing lane.
pub const LANE_MEMORY_BYTES: u64 = (CN_SCRATCHPAD_BYTES + CN_CACHE_BYTES) as u64;
