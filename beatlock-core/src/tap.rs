/// Tap-tempo helper for manual resyncs.
///
/// Collects tap timestamps (milliseconds) from a UI thread and turns them
/// into a BPM once enough taps have arrived. The result is meant to be
/// handed to `ResyncHandle::resync`.
///
/// ```
/// use beatlock_core::TapTempo;
///
/// let mut tapper = TapTempo::new(4, 2000.0);
/// let mut bpm = None;
/// for t in [0.0, 500.0, 1000.0, 1500.0] {
///     bpm = tapper.add_tap(t);
/// }
/// assert_eq!(bpm, Some(120.0));
/// ```
#[derive(Debug, Clone)]
pub struct TapTempo {
    taps_needed: usize,
    reset_gap_ms: f64,
    taps: Vec<f64>,
}

impl TapTempo {
    /// * `taps_needed` - taps required before a BPM is produced (at least 2)
    /// * `reset_gap_ms` - a longer pause between taps starts a new sequence
    pub fn new(taps_needed: usize, reset_gap_ms: f64) -> Self {
        let taps_needed = taps_needed.max(2);
        Self {
            taps_needed,
            reset_gap_ms: reset_gap_ms.max(0.0),
            taps: Vec::with_capacity(taps_needed),
        }
    }

    /// Registers a tap. Returns `Some(bpm)` when the sequence is complete.
    pub fn add_tap(&mut self, timestamp_ms: f64) -> Option<f64> {
        if let Some(&last) = self.taps.last() {
            if timestamp_ms - last > self.reset_gap_ms || timestamp_ms <= last {
                self.taps.clear();
            }
        }
        self.taps.push(timestamp_ms);

        if self.taps.len() < self.taps_needed {
            return None;
        }

        let first = self.taps[0];
        let last = self.taps[self.taps.len() - 1];
        let avg_interval = (last - first) / (self.taps.len() - 1) as f64;
        self.taps.clear();

        if avg_interval > 0.0 {
            Some(60000.0 / avg_interval)
        } else {
            None
        }
    }

    pub fn pending_taps(&self) -> usize {
        self.taps.len()
    }

    pub fn reset(&mut self) {
        self.taps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::TapTempo;

    #[test]
    fn test_needs_enough_taps() {
        let mut tapper = TapTempo::new(3, 2000.0);
        assert_eq!(tapper.add_tap(0.0), None);
        assert_eq!(tapper.add_tap(600.0), None);
        let bpm = tapper.add_tap(1200.0).unwrap();
        assert!((bpm - 100.0).abs() < 1e-9);
        assert_eq!(tapper.pending_taps(), 0);
    }

    #[test]
    fn test_long_gap_restarts_sequence() {
        let mut tapper = TapTempo::new(3, 1000.0);
        tapper.add_tap(0.0);
        tapper.add_tap(500.0);
        assert_eq!(tapper.add_tap(5000.0), None);
        assert_eq!(tapper.pending_taps(), 1);
    }

    #[test]
    fn test_out_of_order_tap_restarts_sequence() {
        let mut tapper = TapTempo::new(2, 1000.0);
        tapper.add_tap(500.0);
        assert_eq!(tapper.add_tap(400.0), None);
        assert_eq!(tapper.add_tap(900.0), Some(120.0));
    }
}
