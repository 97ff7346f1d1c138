use anyhow::{bail, Context, Result};
use trawl_cn_spec::{CN_DIGEST_BYTES, CN_MAX_WAYS};

use crate::kernel::KernelSet;
use crate::scratchpad::{CnContext, SlowMemory};

const SINGLE_INPUT: &[u8] = b"This is a test";
const DOUBLE_INPUT: &[u8] =
    b"The quick brown fox jumps over the lazy dogThe quick brown fox jumps over the lazy log";
const DOUBLE_WORK_SIZE: usize = 43;

const SINGLE_DIGEST: [u8; 32] = [
    0xa0, 0x84, 0xf0, 0x1d, 0x14, 0x37, 0xa0, 0x9c, 0x69, 0x85, 0x40, 0x1b, 0x60, 0xd4, 0x35,
    0x54, 0xae, 0x10, 0x58, 0x02, 0xc5, 0xf5, 0xd8, 0xa9, 0xb3, 0x25, 0x36, 0x49, 0xc0, 0xbe,
    0x66, 0x05,
];

const DOUBLE_DIGEST: [u8; 64] = [
    0x3e, 0xbb, 0x7f, 0x9f, 0x7d, 0x27, 0x3d, 0x7c, 0x31, 0x8d, 0x86, 0x94, 0x77, 0x55, 0x0c,
    0xc8, 0x00, 0xcf, 0xb1, 0x1b, 0x0c, 0xad, 0xb7, 0xff, 0xbd, 0xf6, 0xf8, 0x9f, 0x3a, 0x47,
    0x1c, 0x59, 0xb4, 0x77, 0xd5, 0x02, 0xe4, 0xd8, 0x48, 0x7f, 0x42, 0xdf, 0xe3, 0x8e, 0xed,
    0x73, 0x81, 0x7a, 0xda, 0x91, 0xb7, 0xe2, 0x63, 0xd2, 0x91, 0x71, 0xb6, 0x5c, 0x44, 0x3a,
    0x01, 0x2a, 0x41, 0x22,
];

/// One-shot known-answer verification of every kernel width, run before any
/// worker spawns. An N-way kernel fed N copies of the same pre-image must
/// produce N copies of the single-way digest; the double kernel has its own
/// vector.
pub fn self_test(kernels: &KernelSet, mode: SlowMemory) -> Result<()> {
    let mut ctxs = Vec::with_capacity(CN_MAX_WAYS);
    for _ in 0..CN_MAX_WAYS {
        ctxs.push(CnContext::alloc(mode).context("self-test scratchpad allocation failed")?);
    }

    let mut out = [0u8; CN_DIGEST_BYTES * CN_MAX_WAYS];

    (kernels.single)(SINGLE_INPUT, SINGLE_INPUT.len(), &mut out[..32], &mut ctxs[..1]);
    verify_digest(1, &out[..32], &SINGLE_DIGEST)?;

    (kernels.double)(
        DOUBLE_INPUT,
        DOUBLE_WORK_SIZE,
        &mut out[..64],
        &mut ctxs[..2],
    );
    verify_digest(2, &out[..64], &DOUBLE_DIGEST)?;

    for (width, hash_fn) in [(4, kernels.quad), (5, kernels.pent), (6, kernels.hex)] {
        let input = SINGLE_INPUT.repeat(width);
        let span = width * CN_DIGEST_BYTES;
        hash_fn(&input, SINGLE_INPUT.len(), &mut out[..span], &mut ctxs[..width]);
        for lane in 0..width {
            verify_digest(
                width,
                &out[lane * CN_DIGEST_BYTES..(lane + 1) * CN_DIGEST_BYTES],
                &SINGLE_DIGEST,
            )?;
        }
    }

    Ok(())
}

fn verify_digest(width: usize, got: &[u8], expected: &[u8]) -> Result<()> {
    if got != expected {
        bail!(
            "cryptonight {width}-way self-test digest mismatch; \
             this may be caused by bad compiler optimizations"
        );
    }
    Ok(())
}

/// Test doubles: a kernel that reproduces the known-answer vectors, shared
/// by every mock kernel that has to get past `self_test`.
#[cfg(test)]
pub(crate) mod kat {
    use super::*;

    /// Answer a known-answer input; returns false for anything else.
    pub(crate) fn respond(input: &[u8], work_size: usize, output: &mut [u8]) -> bool {
        if work_size == DOUBLE_WORK_SIZE && input == DOUBLE_INPUT {
            output[..64].copy_from_slice(&DOUBLE_DIGEST);
            return true;
        }
        if work_size == SINGLE_INPUT.len()
            && !input.is_empty()
            && input.len() % SINGLE_INPUT.len() == 0
            && input.chunks(SINGLE_INPUT.len()).all(|lane| lane == SINGLE_INPUT)
        {
            let lanes = input.len() / SINGLE_INPUT.len();
            for lane in 0..lanes {
                output[lane * 32..(lane + 1) * 32].copy_from_slice(&SINGLE_DIGEST);
            }
            return true;
        }
        false
    }

    pub(crate) fn kat_kernel(
        input: &[u8],
        work_size: usize,
        output: &mut [u8],
        _ctxs: &mut [CnContext],
    ) {
        respond(input, work_size, output);
    }
}
