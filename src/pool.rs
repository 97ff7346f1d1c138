use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::Sender;

use crate::config::CpuConfig;
use crate::job::{MinerEvent, WorkItem};
use crate::kernel::KernelSet;
use crate::log::{self, Level, Scope};
use crate::scratchpad;
use crate::selftest;
use crate::telemetry::Telemetry;
use crate::worker::{self, WorkerContext};

/// Poll cadence for the publish wait and the worker stall waits. Pools
/// cannot emit jobs faster than a few hundred milliseconds, so a coarse
/// sleep-poll is enough; no condition variable needed.
pub(crate) const JOB_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Coordination state shared by the publisher and every worker.
///
/// `current_work` is only written after all workers acknowledged the prior
/// generation and only read inside `consume_work`, after a worker observes
/// the generation bump; the release store on `global_job_no` publishes the
/// blob.
pub(crate) struct GlobalWorkSlot {
    pub(crate) current_work: RwLock<WorkItem>,
    pub(crate) global_job_no: AtomicU64,
    pub(crate) consume_count: AtomicU64,
    pub(crate) thread_count: u64,
}

/// Aggregate hashrate over a window. Threads whose ring cannot answer yet
/// contribute zero and are counted in `incomplete_threads`.
#[derive(Debug, Clone, Copy)]
pub struct PoolHashrate {
    pub total: f64,
    pub incomplete_threads: usize,
}

struct WorkerHandle {
    thread_no: usize,
    quit: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Owns the worker threads and the shared work slot. Work flows in through
/// [`switch_work`](WorkerPool::switch_work); solutions flow out through the
/// event channel handed to [`start`](WorkerPool::start).
pub struct WorkerPool {
    slot: Arc<GlobalWorkSlot>,
    telemetry: Arc<Telemetry>,
    workers: Vec<WorkerHandle>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl WorkerPool {
    /// Verify the platform and kernels, then spawn one worker per
    /// configured thread. Workers idle against `initial_work` (usually the
    /// stalled sentinel) until the first real job arrives.
    pub fn start(
        initial_work: WorkItem,
        config: &CpuConfig,
        kernels: KernelSet,
        events: Sender<MinerEvent>,
    ) -> Result<Self> {
        config.validate()?;
        scratchpad::scratchpad_init(config.slow_memory)?;
        selftest::self_test(&kernels, config.slow_memory)
            .context("cryptonight kernel self-test failed")?;
        log::line(
            Level::Ok,
            Scope::SelfTest,
            "all kernel widths produced known-answer digests",
        );

        let thread_count = config.thread_count();
        let slot = Arc::new(GlobalWorkSlot {
            current_work: RwLock::new(initial_work),
            global_job_no: AtomicU64::new(0),
            consume_count: AtomicU64::new(0),
            thread_count: thread_count as u64,
        });
        let telemetry = Arc::new(Telemetry::new(thread_count));

        let mut pool = Self {
            slot: Arc::clone(&slot),
            telemetry: Arc::clone(&telemetry),
            workers: Vec::with_capacity(thread_count),
        };

        for (thread_no, thread_config) in config.threads.iter().enumerate() {
            let quit = Arc::new(AtomicBool::new(false));
            let context = WorkerContext {
                thread_no,
                width: thread_config.multiway,
                cpu_affinity: thread_config.cpu_affinity,
                slow_memory: config.slow_memory,
                hash_fn: kernels.for_width(thread_config.multiway),
                initial_work,
                slot: Arc::clone(&slot),
                telemetry: Arc::clone(&telemetry),
                events: events.clone(),
                quit: Arc::clone(&quit),
            };

            let spawned = thread::Builder::new()
                .name(format!("trawl-worker-{thread_no}"))
                .spawn(move || worker::worker_main(context));
            let handle = match spawned {
                Ok(handle) => handle,
                Err(err) => {
                    pool.stop_workers();
                    return Err(err)
                        .with_context(|| format!("failed to spawn worker {thread_no}"));
                }
            };

            match thread_config.cpu_affinity {
                Some(cpu_id) => log::line(
                    Level::Info,
                    Scope::Pool,
                    format!(
                        "starting {}x thread, affinity: {cpu_id}",
                        thread_config.multiway.ways()
                    ),
                ),
                None => log::line(
                    Level::Info,
                    Scope::Pool,
                    format!("starting {}x thread, no affinity", thread_config.multiway.ways()),
                ),
            }

            pool.workers.push(WorkerHandle {
                thread_no,
                quit,
                handle,
            });
        }

        Ok(pool)
    }

    /// Publish a new work item. Blocks until every worker has consumed the
    /// previous generation (only then is the slot guaranteed unread), then
    /// swaps the item in and bumps the generation.
    pub fn switch_work(&self, work: WorkItem) -> Result<()> {
        while self.slot.consume_count.load(Ordering::SeqCst) < self.slot.thread_count {
            thread::sleep(JOB_POLL_INTERVAL);
        }

        {
            let mut current = self
                .slot
                .current_work
                .write()
                .map_err(|_| anyhow!("work slot lock poisoned"))?;
            *current = work;
        }
        self.slot.consume_count.store(0, Ordering::SeqCst);
        self.slot.global_job_no.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Sum of per-worker hashrates over the window.
    pub fn hashrate(&self, window_ms: u64) -> PoolHashrate {
        let mut total = 0.0;
        let mut incomplete_threads = 0;
        for worker in &self.workers {
            let rate = self.telemetry.hashrate(worker.thread_no, window_ms);
            if rate.is_nan() {
                incomplete_threads += 1;
            } else {
                total += rate;
            }
        }
        PoolHashrate {
            total,
            incomplete_threads,
        }
    }

    pub fn thread_hashrate(&self, thread_no: usize, window_ms: u64) -> f64 {
        self.telemetry.hashrate(thread_no, window_ms)
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop and join every worker. Workers notice within one poll quantum
    /// even when stalled or mid-job.
    pub fn shutdown(mut self) {
        self.stop_workers();
        log::line(Level::Info, Scope::Pool, "all workers stopped");
    }

    fn stop_workers(&mut self) {
        for worker in &self.workers {
            worker.quit.store(true, Ordering::Relaxed);
        }
        // Kick workers out of inner loops and stall waits so the quit flag
        // is seen at the next job boundary.
        self.slot.global_job_no.fetch_add(1, Ordering::Release);
        for worker in self.workers.drain(..) {
            let _ = worker.handle.join();
        }
    }
}
