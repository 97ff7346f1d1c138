use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::Sender;
use trawl_cn_spec::{CN_DIGEST_BYTES, CN_MAX_BLOB_BYTES, CN_MAX_WAYS};

use crate::affinity;
use crate::job::{self, MinerEvent, Solution, WorkItem};
use crate::kernel::{CnHashFn, Multiway};
use crate::log::{self, Level, Scope};
use crate::pool::{GlobalWorkSlot, JOB_POLL_INTERVAL};
use crate::scratchpad::{CnContext, SlowMemory};
use crate::telemetry::{self, Telemetry};

pub(crate) struct WorkerContext {
    pub thread_no: usize,
    pub width: Multiway,
    pub cpu_affinity: Option<u32>,
    pub slow_memory: SlowMemory,
    pub hash_fn: CnHashFn,
    pub initial_work: WorkItem,
    pub slot: Arc<GlobalWorkSlot>,
    pub telemetry: Arc<Telemetry>,
    pub events: Sender<MinerEvent>,
    pub quit: Arc<AtomicBool>,
}

/// Body of one worker thread: pin, allocate lane contexts, then hash the
/// current work item until the generation moves or `quit` is set.
pub(crate) fn worker_main(ctx: WorkerContext) {
    if let Some(cpu_id) = ctx.cpu_affinity {
        // Memory policy first so the scratchpads below land on the pinned
        // core's NUMA node.
        affinity::bind_memory_to_numa(ctx.thread_no, cpu_id);
        affinity::pin_current_thread(ctx.thread_no, cpu_id);
    }

    let ways = ctx.width.ways();
    let mut lanes: Vec<CnContext> = Vec::with_capacity(ways);
    for _ in 0..ways {
        match CnContext::alloc(ctx.slow_memory) {
            Ok(lane) => lanes.push(lane),
            Err(err) => {
                let _ = ctx.events.send(MinerEvent::Error {
                    thread_no: ctx.thread_no,
                    message: format!("scratchpad allocation failed: {err:#}"),
                });
                park_acknowledging(&ctx.slot, &ctx.quit);
                return;
            }
        }
    }

    let mut local_work = ctx.initial_work;
    let mut local_job_no = 0u64;
    let mut count = 0u64;
    let sample_mask: u64 = if ways == 1 { 0xF } else { 0x3 };
    let mut blob = [0u8; CN_MAX_BLOB_BYTES * CN_MAX_WAYS];
    let mut digests = [0u8; CN_DIGEST_BYTES * CN_MAX_WAYS];
    let mut lane_nonces = [0u32; CN_MAX_WAYS];

    // Ready: count ourselves as having consumed the initial generation.
    ctx.slot.consume_count.fetch_add(1, Ordering::Release);

    'outer: while !ctx.quit.load(Ordering::Relaxed) {
        if local_work.stall {
            // No job yet (network latency or a dropped socket upstream);
            // sleep until the executor publishes one.
            while ctx.slot.global_job_no.load(Ordering::Acquire) == local_job_no {
                if ctx.quit.load(Ordering::Relaxed) {
                    break 'outer;
                }
                thread::sleep(JOB_POLL_INTERVAL);
            }
            local_work = match consume_work(&ctx.slot, &mut local_job_no) {
                Some(work) => work,
                None => {
                    report_slot_poisoned(&ctx);
                    break 'outer;
                }
            };
            continue;
        }

        let work_size = local_work.work_size;
        for lane in 0..ways {
            blob[lane * work_size..(lane + 1) * work_size]
                .copy_from_slice(&local_work.work_blob[..work_size]);
        }
        let mut nonce = start_nonce(
            &local_work,
            ctx.thread_no as u32,
            ctx.slot.thread_count as u32,
        );

        while ctx.slot.global_job_no.load(Ordering::Acquire) == local_job_no {
            // One sample roughly every 16 hashes regardless of width.
            if (count & sample_mask) == 0 {
                ctx.telemetry
                    .push(ctx.thread_no, count, telemetry::timestamp_ms());
            }
            count += ways as u64;

            for lane in 0..ways {
                nonce = next_nonce(nonce, local_work.nicehash);
                lane_nonces[lane] = nonce;
                job::set_nonce(&mut blob[lane * work_size..(lane + 1) * work_size], nonce);
            }

            (ctx.hash_fn)(
                &blob[..ways * work_size],
                work_size,
                &mut digests[..ways * CN_DIGEST_BYTES],
                &mut lanes,
            );

            for lane in 0..ways {
                let digest = &digests[lane * CN_DIGEST_BYTES..(lane + 1) * CN_DIGEST_BYTES];
                if job::digest_comparand(digest) < local_work.target {
                    let mut found = [0u8; CN_DIGEST_BYTES];
                    found.copy_from_slice(digest);
                    let _ = ctx.events.send(MinerEvent::Solution(Solution {
                        job_id: local_work.job_id,
                        nonce: lane_nonces[lane],
                        digest: found,
                        pool_id: local_work.pool_id,
                    }));
                }
            }

            thread::yield_now();
        }

        local_work = match consume_work(&ctx.slot, &mut local_job_no) {
            Some(work) => work,
            None => {
                report_slot_poisoned(&ctx);
                break 'outer;
            }
        };
    }
}

fn report_slot_poisoned(ctx: &WorkerContext) {
    log::line(
        Level::Error,
        Scope::Worker(ctx.thread_no),
        "lost the work slot; stopping",
    );
    let _ = ctx.events.send(MinerEvent::Error {
        thread_no: ctx.thread_no,
        message: "work slot lock poisoned".to_string(),
    });
}

/// Copy the published work item, advance the local generation, and
/// acknowledge consumption. `None` means the slot lock is poisoned and the
/// worker should stop.
fn consume_work(slot: &GlobalWorkSlot, local_job_no: &mut u64) -> Option<WorkItem> {
    let work = match slot.current_work.read() {
        Ok(guard) => *guard,
        Err(_) => return None,
    };
    *local_job_no += 1;
    slot.consume_count.fetch_add(1, Ordering::Release);
    Some(work)
}

/// A worker that failed startup keeps acknowledging generations so
/// `switch_work` never waits on it forever.
fn park_acknowledging(slot: &GlobalWorkSlot, quit: &AtomicBool) {
    let mut local_job_no = 0u64;
    slot.consume_count.fetch_add(1, Ordering::Release);
    while !quit.load(Ordering::Relaxed) {
        if slot.global_job_no.load(Ordering::Acquire) != local_job_no {
            local_job_no += 1;
            slot.consume_count.fetch_add(1, Ordering::Release);
        } else {
            thread::sleep(JOB_POLL_INTERVAL);
        }
    }
}

/// First nonce of this worker's slice of the 32-bit search space. NiceHash
/// jobs keep the pool-assigned top byte already spliced into the blob and
/// search only the low 24 bits.
fn start_nonce(work: &WorkItem, thread_no: u32, thread_count: u32) -> u32 {
    let slice = u32::MAX / thread_count.max(1);
    let resume = work.resume_nonce.wrapping_add(slice.wrapping_mul(thread_no));
    if work.nicehash {
        (job::nonce_of(&work.work_blob) & 0xFF00_0000) | (resume & 0x00FF_FFFF)
    } else {
        resume
    }
}

/// Pre-increment: the first nonce tested on a job is `start + 1`. NiceHash
/// increments wrap inside the low 24 bits, preserving the top byte.
fn next_nonce(nonce: u32, nicehash: bool) -> u32 {
    if nicehash {
        (nonce & 0xFF00_0000) | (nonce.wrapping_add(1) & 0x00FF_FFFF)
    } else {
        nonce.wrapping_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_work(resume_nonce: u32) -> WorkItem {
        WorkItem::new([7u8; 8], &[0u8; 76], u64::MAX, resume_nonce, false, 0).unwrap()
    }

    #[test]
    fn start_nonce_splits_search_space_evenly() {
        let work = plain_work(0);
        let slice = u32::MAX / 4;
        for thread_no in 0..4 {
            assert_eq!(start_nonce(&work, thread_no, 4), slice * thread_no);
        }
    }

    #[test]
    fn start_nonce_offsets_by_resume() {
        let work = plain_work(1_000);
        assert_eq!(start_nonce(&work, 0, 2), 1_000);
        assert_eq!(start_nonce(&work, 1, 2), 1_000 + u32::MAX / 2);
    }

    #[test]
    fn nicehash_start_keeps_blob_top_byte() {
        let mut blob = [0u8; 76];
        job::set_nonce(&mut blob, 0xAB00_0000);
        let mut work = WorkItem::new([7u8; 8], &blob, u64::MAX, 0, true, 0).unwrap();
        work.resume_nonce = 0x0012_3456;
        assert_eq!(start_nonce(&work, 0, 1), 0xAB12_3456);
    }

    #[test]
    fn nicehash_increment_never_leaves_top_byte() {
        let mut nonce = 0xABFF_FFFE;
        for _ in 0..4 {
            nonce = next_nonce(nonce, true);
            assert_eq!(nonce & 0xFF00_0000, 0xAB00_0000);
        }
        // Wrapped through the low 24 bits.
        assert_eq!(nonce, 0xAB00_0002);
    }

    #[test]
    fn plain_increment_is_sequential() {
        assert_eq!(next_nonce(41, false), 42);
        assert_eq!(next_nonce(u32::MAX, false), 0);
    }
}
