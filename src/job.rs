use anyhow::{ensure, Result};
use trawl_cn_spec::{CN_COMPARAND_OFFSET, CN_DIGEST_BYTES, CN_MAX_BLOB_BYTES, CN_NONCE_OFFSET};

/// Opaque pool-assigned job identifier, echoed on every solution.
pub type JobId = [u8; 8];

/// One unit of work from the pool. Published by value: the pool writes it
/// into the shared slot and every worker copies it out whole, so publisher
/// and workers never share a live reference.
#[derive(Debug, Clone, Copy)]
pub struct WorkItem {
    pub job_id: JobId,
    pub work_blob: [u8; CN_MAX_BLOB_BYTES],
    pub work_size: usize,
    /// A hash qualifies iff its trailing little-endian u64 is strictly below this.
    pub target: u64,
    /// Base nonce for this job; each worker adds its own slice of the nonce space.
    pub resume_nonce: u32,
    /// Preserve the top nonce byte (pool-assigned identifier); only the low
    /// 24 bits are searched.
    pub nicehash: bool,
    pub pool_id: usize,
    /// No current work; workers wait for the next generation.
    pub stall: bool,
}

impl WorkItem {
    /// The boot sentinel: workers start against this and sleep until the
    /// executor delivers a real job.
    pub fn stalled() -> Self {
        Self {
            job_id: [0u8; 8],
            work_blob: [0u8; CN_MAX_BLOB_BYTES],
            work_size: 0,
            target: 0,
            resume_nonce: 0,
            nicehash: false,
            pool_id: 0,
            stall: true,
        }
    }

    pub fn new(
        job_id: JobId,
        blob: &[u8],
        target: u64,
        resume_nonce: u32,
        nicehash: bool,
        pool_id: usize,
    ) -> Result<Self> {
        ensure!(
            blob.len() > CN_NONCE_OFFSET + 3,
            "work blob too short for a nonce slot: {} bytes",
            blob.len()
        );
        ensure!(
            blob.len() <= CN_MAX_BLOB_BYTES,
            "work blob exceeds {} bytes: {}",
            CN_MAX_BLOB_BYTES,
            blob.len()
        );

        let mut work_blob = [0u8; CN_MAX_BLOB_BYTES];
        work_blob[..blob.len()].copy_from_slice(blob);
        Ok(Self {
            job_id,
            work_blob,
            work_size: blob.len(),
            target,
            resume_nonce,
            nicehash,
            pool_id,
            stall: false,
        })
    }
}

/// A qualifying hash found by a worker, routed back to the pool connection
/// identified by `pool_id`.
#[derive(Debug, Clone)]
pub struct Solution {
    pub job_id: JobId,
    pub nonce: u32,
    pub digest: [u8; CN_DIGEST_BYTES],
    pub pool_id: usize,
}

/// Events the pool pushes to the external executor.
#[derive(Debug, Clone)]
pub enum MinerEvent {
    Solution(Solution),
    Error { thread_no: usize, message: String },
}

/// Splice a nonce into a single lane's blob at the family nonce slot.
pub(crate) fn set_nonce(lane: &mut [u8], nonce: u32) {
    lane[CN_NONCE_OFFSET..CN_NONCE_OFFSET + 4].copy_from_slice(&nonce.to_le_bytes());
}

/// Read the nonce currently spliced into a lane's blob.
pub(crate) fn nonce_of(lane: &[u8]) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&lane[CN_NONCE_OFFSET..CN_NONCE_OFFSET + 4]);
    u32::from_le_bytes(bytes)
}

/// The 64-bit word a digest is judged by: its trailing 8 bytes, little-endian.
pub fn digest_comparand(digest: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[CN_COMPARAND_OFFSET..CN_COMPARAND_OFFSET + 8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_splice_is_little_endian_at_offset_39() {
        let mut lane = [0u8; 76];
        set_nonce(&mut lane, 0xAB12_34CD);
        assert_eq!(&lane[39..43], &[0xCD, 0x34, 0x12, 0xAB]);
        assert_eq!(nonce_of(&lane), 0xAB12_34CD);
        assert!(lane[..39].iter().all(|b| *b == 0));
        assert!(lane[43..].iter().all(|b| *b == 0));
    }

    #[test]
    fn comparand_is_trailing_le_u64() {
        let mut digest = [0u8; 32];
        digest[24..32].copy_from_slice(&[0xb3, 0x25, 0x36, 0x49, 0xc0, 0xbe, 0x66, 0x05]);
        assert_eq!(digest_comparand(&digest), 0x0566_bec0_4936_25b3);
    }

    #[test]
    fn new_rejects_bad_blob_sizes() {
        assert!(WorkItem::new([1u8; 8], &[0u8; 42], 0, 0, false, 0).is_err());
        assert!(WorkItem::new([1u8; 8], &[0u8; 113], 0, 0, false, 0).is_err());
        let work = WorkItem::new([1u8; 8], &[0u8; 76], 0, 0, false, 0).unwrap();
        assert_eq!(work.work_size, 76);
        assert!(!work.stall);
    }

    #[test]
    fn stalled_sentinel_is_flagged() {
        assert!(WorkItem::stalled().stall);
    }
}
