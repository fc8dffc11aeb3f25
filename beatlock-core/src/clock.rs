//! # Clock State
//!
//! The virtual musical clock: a tempo and an unbounded bar phase whose
//! integer part counts bars and whose fractional part is the position inside
//! the current bar.
//!
//! ## Ownership
//! `ClockState` is owned and mutated by the audio thread only. Other threads
//! see it through a `ClockReader`, which reads a snapshot published with a
//! sequence lock over atomics: the writer never waits, and a reader that
//! races a write simply retries.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering, fence};

use crate::config::{BEATS_PER_BAR, EstimatorConfig, RESYNC_MEASURE_BARS};
use crate::controller::Correction;

/// Fractional part of a bar phase, always in `[0, 1)`.
pub fn bar_fraction(bar_phase: f64) -> f64 {
    let fraction = bar_phase - bar_phase.floor();
    // Tiny negative phases round up to exactly 1.0.
    if fraction >= 1.0 { 0.0 } else { fraction }
}

/// Tempo plus bar phase, mutated only by the tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockState {
    pub bpm: f64,
    pub bar_phase: f64,
}

impl ClockState {
    pub fn new(bpm: f64) -> Self {
        Self { bpm, bar_phase: 0.0 }
    }

    /// Moves the phase forward by `delta_ms` of wall time at the current tempo.
    pub fn advance(&mut self, delta_ms: f64) {
        self.bar_phase += self.bpm / 60.0 / 1000.0 / BEATS_PER_BAR * delta_ms;
    }

    /// Applies a controller correction, keeping the tempo inside the configured range.
    pub fn apply(&mut self, correction: &Correction, config: &EstimatorConfig) {
        self.bpm = config.clamp_bpm(self.bpm + correction.bpm);
        self.bar_phase -= correction.phase;
    }

    /// Reseeds the tempo and snaps the phase back to the start of the last
    /// 4-bar measure.
    pub fn resync(&mut self, bpm: f64, config: &EstimatorConfig) {
        self.bpm = config.clamp_bpm(bpm);
        self.bar_phase -= self.bar_phase % RESYNC_MEASURE_BARS;
    }

    /// Position inside the current bar, in `[0, 1)`.
    pub fn bar_progress(&self) -> f64 {
        bar_fraction(self.bar_phase)
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            bpm: self.bpm,
            bar_phase: self.bar_phase,
        }
    }
}

/// Immutable copy of the clock as published to readers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSnapshot {
    pub bpm: f64,
    pub bar_phase: f64,
}

impl ClockSnapshot {
    pub fn bar_progress(&self) -> f64 {
        bar_fraction(self.bar_phase)
    }

    /// Whole bars elapsed since the clock started.
    pub fn bar_count(&self) -> i64 {
        self.bar_phase.floor() as i64
    }
}

/// Sequence-locked storage for the published snapshot.
#[derive(Debug)]
struct SharedClock {
    sequence: AtomicU64,
    bpm: AtomicU64,
    bar_phase: AtomicU64,
}

/// Writer side of the published clock. Owned by the estimator.
#[derive(Debug)]
pub(crate) struct ClockPublisher {
    shared: Arc<SharedClock>,
}

impl ClockPublisher {
    pub(crate) fn new(initial: ClockSnapshot) -> Self {
        let shared = SharedClock {
            sequence: AtomicU64::new(0),
            bpm: AtomicU64::new(initial.bpm.to_bits()),
            bar_phase: AtomicU64::new(initial.bar_phase.to_bits()),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Publishes a snapshot without blocking.
    pub(crate) fn publish(&self, snapshot: ClockSnapshot) {
        let shared = &self.shared;
        let seq = shared.sequence.load(Ordering::Relaxed);
        shared.sequence.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        shared.bpm.store(snapshot.bpm.to_bits(), Ordering::Relaxed);
        shared.bar_phase.store(snapshot.bar_phase.to_bits(), Ordering::Relaxed);
        shared.sequence.store(seq.wrapping_add(2), Ordering::Release);
    }

    pub(crate) fn reader(&self) -> ClockReader {
        ClockReader {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Read-only handle on the published clock, for consumers on other threads.
#[derive(Debug, Clone)]
pub struct ClockReader {
    shared: Arc<SharedClock>,
}

impl ClockReader {
    /// Latest consistent snapshot. Spins only while a publish is in flight.
    pub fn snapshot(&self) -> ClockSnapshot {
        let shared = &self.shared;
        loop {
            let before = shared.sequence.load(Ordering::Acquire);
            if before % 2 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let bpm = f64::from_bits(shared.bpm.load(Ordering::Relaxed));
            let bar_phase = f64::from_bits(shared.bar_phase.load(Ordering::Relaxed));
            fence(Ordering::Acquire);
            let after = shared.sequence.load(Ordering::Relaxed);
            if before == after {
                return ClockSnapshot { bpm, bar_phase };
            }
            std::hint::spin_loop();
        }
    }

    pub fn current_bpm(&self) -> f64 {
        self.snapshot().bpm
    }

    pub fn bar_progress(&self) -> f64 {
        self.snapshot().bar_progress()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_fraction_range() {
        assert_eq!(bar_fraction(3.25), 0.25);
        assert_eq!(bar_fraction(-0.25), 0.75);
        assert_eq!(bar_fraction(-1e-20), 0.0);
        assert_eq!(bar_fraction(7.0), 0.0);
    }

    #[test]
    fn test_advance_one_bar_at_120() {
        let mut clock = ClockState::new(120.0);
        clock.advance(2000.0);
        assert!((clock.bar_phase - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_resync_snaps_to_measure_start() {
        let config = EstimatorConfig::default();
        let mut clock = ClockState {
            bpm: 100.0,
            bar_phase: 9.6,
        };
        clock.resync(128.0, &config);
        assert_eq!(clock.bpm, 128.0);
        assert!((clock.bar_phase - 8.0).abs() < 1e-12);
        assert_eq!(clock.bar_progress(), 0.0);
    }

    #[test]
    fn test_resync_clamps_bpm() {
        let config = EstimatorConfig::default();
        let mut clock = ClockState::new(120.0);
        clock.resync(400.0, &config);
        assert_eq!(clock.bpm, 190.0);
        clock.resync(-3.0, &config);
        assert_eq!(clock.bpm, 50.0);
    }

    #[test]
    fn test_apply_clamps_to_range() {
        let config = EstimatorConfig::default();
        let mut clock = ClockState::new(189.9);
        clock.apply(&Correction { bpm: 5.0, phase: 0.0 }, &config);
        assert_eq!(clock.bpm, 190.0);
    }

    #[test]
    fn test_reader_sees_latest_publish() {
        let publisher = ClockPublisher::new(ClockState::new(120.0).snapshot());
        let reader = publisher.reader();
        assert_eq!(reader.current_bpm(), 120.0);

        publisher.publish(ClockSnapshot {
            bpm: 133.0,
            bar_phase: 2.5,
        });
        let snap = reader.snapshot();
        assert_eq!(snap.bpm, 133.0);
        assert_eq!(snap.bar_count(), 2);
        assert_eq!(reader.bar_progress(), 0.5);
    }

    #[test]
    fn test_concurrent_reads_are_never_torn() {
        let publisher = ClockPublisher::new(ClockSnapshot {
            bpm: 0.0,
            bar_phase: 0.0,
        });
        let reader = publisher.reader();

        let handle = std::thread::spawn(move || {
            for _ in 0..20_000 {
                let snap = reader.snapshot();
                // The writer always publishes bar_phase == bpm * 2.
                assert_eq!(snap.bar_phase, snap.bpm * 2.0);
            }
        });
        for i in 0..20_000 {
            let v = i as f64;
            publisher.publish(ClockSnapshot { bpm: v, bar_phase: v * 2.0 });
        }
        handle.join().unwrap();
    }
}
