//! Cycle-counter timestamps and their translation to wall-clock time.
//!
//! Producers stamp every record with the raw counter value returned by
//! [`Clock::now_cycles`]; only the poller pays for converting it to
//! nanoseconds since the Unix epoch.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::_rdtsc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default sampling window used by [`TscClock::calibrate`].
pub const DEFAULT_CALIBRATION: Duration = Duration::from_millis(10);

/// Source of record timestamps.
///
/// `now_cycles` is called on the logging hot path and must be cheap and
/// monotonic per thread. `cycles_to_nanoseconds` is only called by the poller.
pub trait Clock: Send + Sync {
    /// Current counter value.
    fn now_cycles(&self) -> u64;

    /// Converts a counter value to nanoseconds since the Unix epoch.
    fn cycles_to_nanoseconds(&self, cycles: u64) -> u64;
}

/// Raw counter value stamped on each record by [`TscClock`].
///
/// Reads the time stamp counter on x86_64. The units are CPU ticks until a
/// calibrated clock converts them.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
pub fn get_timestamp() -> u64 {
    // SAFETY: RDTSC is available on every x86_64 CPU.
    unsafe { _rdtsc() }
}

/// Reads the ARM virtual counter, which ticks at a fixed frequency.
#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn get_timestamp() -> u64 {
    let value: u64;
    // SAFETY: CNTVCT_EL0 is readable from EL0 on Linux and macOS.
    unsafe { std::arch::asm!("mrs {}, cntvct_el0", out(reg) value) };
    value
}

/// No cheap counter on this target: nanoseconds since the Unix epoch.
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[inline(always)]
pub fn get_timestamp() -> u64 {
    wall_clock_ns()
}

fn wall_clock_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// Reads the counter and the wall clock as close together as possible.
fn sample_pair() -> (u64, u64) {
    let before = get_timestamp();
    let ns = wall_clock_ns();
    let after = get_timestamp();
    (before + after.saturating_sub(before) / 2, ns)
}

/// Hardware counter clock calibrated against the system wall clock.
///
/// Calibration samples the counter and `SystemTime` at the start and end of a
/// short window and derives a linear mapping from the two points.
///
/// # Examples
///
/// ```
/// # use fast_logger::clock::{Clock, TscClock};
/// # use std::time::Duration;
/// let clock = TscClock::calibrate_for(Duration::from_millis(1));
/// let a = clock.now_cycles();
/// let b = clock.now_cycles();
/// assert!(clock.cycles_to_nanoseconds(b) >= clock.cycles_to_nanoseconds(a));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TscClock {
    base_cycles: u64,
    base_ns: u64,
    ns_per_cycle: f64,
}

impl TscClock {
    /// Calibrates over [`DEFAULT_CALIBRATION`]. Blocks the caller for that long.
    pub fn calibrate() -> Self {
        Self::calibrate_for(DEFAULT_CALIBRATION)
    }

    pub fn calibrate_for(window: Duration) -> Self {
        let (start_cycles, start_ns) = sample_pair();
        if !window.is_zero() {
            std::thread::sleep(window);
        }
        let (end_cycles, end_ns) = sample_pair();

        let cycles = end_cycles.saturating_sub(start_cycles);
        let ns = end_ns.saturating_sub(start_ns);
        let ns_per_cycle = if cycles == 0 || ns == 0 {
            1.0
        } else {
            ns as f64 / cycles as f64
        };

        Self {
            base_cycles: end_cycles,
            base_ns: end_ns,
            ns_per_cycle,
        }
    }

    pub fn ns_per_cycle(&self) -> f64 {
        self.ns_per_cycle
    }
}

impl Clock for TscClock {
    #[inline(always)]
    fn now_cycles(&self) -> u64 {
        get_timestamp()
    }

    fn cycles_to_nanoseconds(&self, cycles: u64) -> u64 {
        let delta = cycles as i128 - self.base_cycles as i128;
        let ns = self.base_ns as i128 + (delta as f64 * self.ns_per_cycle) as i128;
        ns.clamp(0, u64::MAX as i128) as u64
    }
}

/// A clock that only moves when told to.
///
/// Cycles are interpreted directly as nanoseconds since the Unix epoch. Useful
/// for replaying recorded streams and for deterministic tests of the poller's
/// watermark.
#[derive(Debug, Default)]
pub struct ManualClock {
    cycles: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            cycles: AtomicU64::new(start),
        }
    }

    pub fn set(&self, cycles: u64) {
        self.cycles.store(cycles, Ordering::SeqCst);
    }

    pub fn advance(&self, cycles: u64) -> u64 {
        self.cycles.fetch_add(cycles, Ordering::SeqCst) + cycles
    }
}

impl Clock for ManualClock {
    fn now_cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    fn cycles_to_nanoseconds(&self, cycles: u64) -> u64 {
        cycles
    }
}
