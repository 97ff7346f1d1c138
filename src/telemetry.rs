use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

const RING_SIZE: usize = 128;
const RING_MASK: usize = RING_SIZE - 1;

/// Rolling (hash_count, timestamp_ms) samples, one ring per worker.
///
/// Each worker writes only its own ring; hashrate queries come from the
/// pool thread. Samples are relaxed atomics: a reader that races a writer
/// may see a torn pair, which the walk-back below reports as NaN rather
/// than guessing.
pub struct Telemetry {
    rings: Vec<Ring>,
}

struct Ring {
    hash_counts: [AtomicU64; RING_SIZE],
    timestamps: [AtomicU64; RING_SIZE],
    top: AtomicUsize,
}

impl Ring {
    fn new() -> Self {
        Self {
            hash_counts: std::array::from_fn(|_| AtomicU64::new(0)),
            timestamps: std::array::from_fn(|_| AtomicU64::new(0)),
            top: AtomicUsize::new(0),
        }
    }
}

impl Telemetry {
    /// Every ring fully zeroed; a zero timestamp marks an unwritten slot.
    pub fn new(thread_count: usize) -> Self {
        Self {
            rings: (0..thread_count).map(|_| Ring::new()).collect(),
        }
    }

    pub fn thread_count(&self) -> usize {
        self.rings.len()
    }

    /// Record one sample for `thread_no`. Never blocks; called from the
    /// worker's hot loop.
    pub fn push(&self, thread_no: usize, hash_count: u64, timestamp_ms: u64) {
        let ring = &self.rings[thread_no];
        let top = ring.top.load(Ordering::Relaxed);
        ring.hash_counts[top].store(hash_count, Ordering::Relaxed);
        ring.timestamps[top].store(timestamp_ms, Ordering::Relaxed);
        ring.top.store((top + 1) & RING_MASK, Ordering::Relaxed);
    }

    /// Hashes per second over the most recent samples no older than
    /// `window_ms`. NaN until the ring holds a sample older than the window
    /// and at least two samples inside it.
    pub fn hashrate(&self, thread_no: usize, window_ms: u64) -> f64 {
        self.hashrate_at(thread_no, window_ms, timestamp_ms())
    }

    fn hashrate_at(&self, thread_no: usize, window_ms: u64, now_ms: u64) -> f64 {
        let ring = &self.rings[thread_no];
        let top = ring.top.load(Ordering::Relaxed);

        let mut latest_stamp = 0u64;
        let mut latest_count = 0u64;
        let mut earliest_stamp = 0u64;
        let mut earliest_count = 0u64;
        let mut have_full_set = false;

        // Walk backward from the newest sample; top points at the next
        // empty slot.
        for i in 1..RING_SIZE {
            let idx = top.wrapping_sub(i) & RING_MASK;
            let stamp = ring.timestamps[idx].load(Ordering::Relaxed);
            if stamp == 0 {
                break;
            }

            if latest_stamp == 0 {
                latest_stamp = stamp;
                latest_count = ring.hash_counts[idx].load(Ordering::Relaxed);
            }

            if now_ms.saturating_sub(stamp) > window_ms {
                have_full_set = true;
                break;
            }

            earliest_stamp = stamp;
            earliest_count = ring.hash_counts[idx].load(Ordering::Relaxed);
        }

        if !have_full_set || earliest_stamp == 0 || latest_stamp == 0 {
            return f64::NAN;
        }

        let span_ms = latest_stamp.saturating_sub(earliest_stamp);
        if span_ms == 0 {
            return f64::NAN;
        }

        let hashes = latest_count.wrapping_sub(earliest_count) as f64;
        hashes / (span_ms as f64 / 1000.0)
    }
}

/// Milliseconds on a process-local monotonic clock; elapsed-time math on
/// sample stamps can never run backward the way wall-clock time can.
/// Offset by one so the very first sample cannot collide with the ring's
/// unwritten-slot sentinel.
pub(crate) fn timestamp_ms() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = *EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_millis() as u64 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ring_reports_nan() {
        let telemetry = Telemetry::new(2);
        assert!(telemetry.hashrate(0, 10_000).is_nan());
        assert!(telemetry.hashrate(1, 10_000).is_nan());
    }

    #[test]
    fn single_sample_reports_nan() {
        let telemetry = Telemetry::new(1);
        let now = 1_000_000u64;
        telemetry.push(0, 100, now - 50);
        assert!(telemetry.hashrate_at(0, 10_000, now).is_nan());
    }

    #[test]
    fn samples_all_inside_window_report_nan() {
        // Without a sample older than the window there is no proof the
        // window is fully covered.
        let telemetry = Telemetry::new(1);
        let now = 1_000_000u64;
        for i in 0..10u64 {
            telemetry.push(0, i * 16, now - 1_000 + i * 100);
        }
        assert!(telemetry.hashrate_at(0, 10_000, now).is_nan());
    }

    #[test]
    fn windowed_rate_uses_oldest_in_window_sample() {
        let telemetry = Telemetry::new(1);
        let now = 1_000_000u64;
        // One sample beyond the window closes the set.
        telemetry.push(0, 0, now - 5_000);
        telemetry.push(0, 1_000, now - 2_000);
        telemetry.push(0, 3_000, now - 1_000);
        telemetry.push(0, 5_000, now);

        // Window of 3 s covers the last three samples: 4000 hashes over 2 s.
        let rate = telemetry.hashrate_at(0, 3_000, now);
        assert!((rate - 2_000.0).abs() < 1e-9);
    }

    #[test]
    fn identical_stamps_report_nan() {
        let telemetry = Telemetry::new(1);
        let now = 1_000_000u64;
        telemetry.push(0, 0, now - 5_000);
        telemetry.push(0, 500, now - 100);
        // Only one sample inside the window: earliest == latest.
        assert!(telemetry.hashrate_at(0, 1_000, now).is_nan());
    }

    #[test]
    fn ring_wraps_without_mixing_old_samples() {
        let telemetry = Telemetry::new(1);
        let now = 10_000_000u64;
        // Overfill the ring; only the newest RING_SIZE samples remain.
        for i in 0..(RING_SIZE as u64 * 2) {
            telemetry.push(0, i * 10, now - 100_000 + i * 500);
        }
        let rate = telemetry.hashrate_at(0, 20_000, now);
        // 10 hashes per 500 ms.
        assert!((rate - 20.0).abs() < 1e-9);
    }

    #[test]
    fn rings_are_independent_per_thread() {
        let telemetry = Telemetry::new(2);
        let now = 1_000_000u64;
        telemetry.push(0, 0, now - 5_000);
        telemetry.push(0, 2_000, now - 1_000);
        telemetry.push(0, 4_000, now);
        assert!(telemetry.hashrate_at(0, 2_000, now) > 0.0);
        assert!(telemetry.hashrate_at(1, 2_000, now).is_nan());
    }
}
