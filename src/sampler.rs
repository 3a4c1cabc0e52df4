use crate::level::Level;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const COUNTERS_PER_LEVEL: usize = 1024;
// TRACE through FATAL; out-of-range levels share the nearest slot.
const LEVEL_SLOTS: usize = 8;

/// Limits log volume per level and message within a fixed tick.
///
/// In each tick the first `initial` records with a given level and message
/// are kept, then every `thereafter`-th. A `thereafter` of zero drops
/// everything past `initial`. Messages are bucketed by hash, so distinct
/// messages may occasionally share a counter.
pub struct Sampler {
    tick: Duration,
    initial: u64,
    thereafter: u64,
    epoch: Instant,
    counters: Vec<Counter>,
}

#[derive(Default)]
struct Counter {
    reset_at: AtomicU64,
    count: AtomicU64,
}

impl Counter {
    fn incr_check_reset(&self, now: u64, tick: u64) -> u64 {
        let reset_after = self.reset_at.load(Ordering::Relaxed);
        if reset_after > now {
            return self.count.fetch_add(1, Ordering::Relaxed) + 1;
        }

        self.count.store(1, Ordering::Relaxed);
        let new_reset = now.saturating_add(tick);
        if self
            .reset_at
            .compare_exchange(reset_after, new_reset, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            // Another thread reset the counter first.
            return self.count.fetch_add(1, Ordering::Relaxed) + 1;
        }
        1
    }
}

impl Sampler {
    pub fn new(tick: Duration, initial: u64, thereafter: u64) -> Self {
        let counters = std::iter::repeat_with(Counter::default)
            .take(LEVEL_SLOTS * COUNTERS_PER_LEVEL)
            .collect();
        Self {
            tick,
            initial,
            thereafter,
            epoch: Instant::now(),
            counters,
        }
    }

    /// Returns `true` if a record with `level` and `message` observed at
    /// `now` should be written.
    pub fn check(&self, level: Level, message: &str, now: Instant) -> bool {
        let slot = (i16::from(level.as_i8()) - i16::from(Level::TRACE.as_i8()))
            .clamp(0, LEVEL_SLOTS as i16 - 1) as usize;
        let bucket = fnv32a(message) as usize % COUNTERS_PER_LEVEL;
        let counter = &self.counters[slot * COUNTERS_PER_LEVEL + bucket];

        let elapsed = now.saturating_duration_since(self.epoch).as_nanos() as u64;
        let n = counter.incr_check_reset(elapsed, self.tick.as_nanos() as u64);
        if n <= self.initial {
            return true;
        }
        self.thereafter != 0 && (n - self.initial) % self.thereafter == 0
    }
}

fn fnv32a(s: &str) -> u32 {
    const OFFSET: u32 = 2_166_136_261;
    const PRIME: u32 = 16_777_619;
    s.bytes()
        .fold(OFFSET, |hash, b| (hash ^ u32::from(b)).wrapping_mul(PRIME))
}
