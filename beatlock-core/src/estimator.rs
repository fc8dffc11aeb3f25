//! # Tempo Estimator
//!
//! Ties the pipeline together. One `TempoEstimator` is built per audio
//! session and driven by `tick`, once per delivered audio buffer, from the
//! audio callback:
//!
//! 1. Apply the most recent pending resync command, if any
//! 2. Advance the clock by the elapsed wall time
//! 3. Prune onsets that fell out of the lookback window
//! 4. Run onset detection on every tracked band
//! 5. Match the onset history against the rhythmic templates
//! 6. Correct tempo and phase from the normalized error
//! 7. Publish the clock for readers on other threads
//!
//! The tick takes no locks and, once constructed, performs no allocation.
//! Resync requests from other threads land in a single pending slot that is
//! only consumed here, so the clock keeps a single writer.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::band::{BandRegistry, BandType};
use crate::clock::{ClockPublisher, ClockReader, ClockSnapshot, ClockState};
use crate::config::EstimatorConfig;
use crate::controller::{ControllerStep, TempoPhaseController};
use crate::error::Result;
use crate::feed::SpectralFeed;
use crate::matcher::TemplateMatcher;
use crate::onset::{OnsetDetector, OnsetHistory};
use crate::profiling::{NullSink, ProfilingSink};

/// Lifecycle of the estimator. There is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// Constructed, never ticked nor resynced.
    Uninitialized,
    /// Running.
    Tracking,
}

/// What happened during one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    /// Onsets fired this tick, across all bands.
    pub onsets_detected: usize,
    /// Correction applied to the clock, `None` when it free-ran.
    pub step: Option<ControllerStep>,
    /// Whether a queued resync was applied at the start of the tick.
    pub resynced: bool,
}

/// Cloneable, thread-safe way to ask the audio thread for a resync.
///
/// At most one request is pending at a time; a newer request replaces an
/// older one that the audio thread has not consumed yet.
#[derive(Debug, Clone)]
pub struct ResyncHandle {
    sender: Sender<f64>,
    pending: Receiver<f64>,
}

impl ResyncHandle {
    /// Requests a resync to `bpm`, applied at the start of the next tick.
    ///
    /// Never blocks. Returns `false` for a NaN tempo, which is not sent.
    pub fn resync(&self, bpm: f64) -> bool {
        if bpm.is_nan() {
            log::warn!("[RESYNC] Ignoring NaN tempo request");
            return false;
        }

        let mut request = bpm;
        loop {
            match self.sender.try_send(request) {
                Ok(()) => return true,
                Err(TrySendError::Full(rejected)) => {
                    // Evict the stale request; the tick may have taken it already.
                    if let Ok(stale) = self.pending.try_recv() {
                        log::debug!("[RESYNC] Replacing pending {stale:.2} BPM with {rejected:.2} BPM");
                    }
                    request = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }
}

/// Real-time tempo-and-phase estimator.
pub struct TempoEstimator {
    config: EstimatorConfig,
    registry: BandRegistry,
    detector: OnsetDetector,
    history: OnsetHistory,
    matcher: TemplateMatcher,
    controller: TempoPhaseController,
    clock: ClockState,
    publisher: ClockPublisher,
    resync_tx: Sender<f64>,
    resync_rx: Receiver<f64>,
    sink: Box<dyn ProfilingSink>,
    state: TrackerState,
    ticks: u64,
    last_phase_error: Option<f64>,
}

impl TempoEstimator {
    /// Builds an estimator for one audio session.
    ///
    /// # Errors
    /// Returns an error if the configuration or its band list is invalid.
    pub fn new(config: EstimatorConfig) -> Result<Self> {
        config.validate()?;
        let registry = BandRegistry::new(config.bands.clone())?;

        let detector = OnsetDetector::new(&registry, &config);
        let history = OnsetHistory::new(&config, registry.len());
        let clock = ClockState::new(config.clamp_bpm(config.initial_bpm));
        let publisher = ClockPublisher::new(clock.snapshot());
        let (resync_tx, resync_rx) = bounded(1);

        log::debug!(
            "[INIT] TempoEstimator bands={} bpm_range={}..{} start_bpm={}",
            registry.len(),
            config.min_bpm,
            config.max_bpm,
            clock.bpm
        );

        Ok(Self {
            matcher: TemplateMatcher::new(config.tolerance_widening),
            controller: TempoPhaseController::new(&config),
            config,
            registry,
            detector,
            history,
            clock,
            publisher,
            resync_tx,
            resync_rx,
            sink: Box::new(NullSink),
            state: TrackerState::Uninitialized,
            ticks: 0,
            last_phase_error: None,
        })
    }

    /// Replaces the diagnostics sink.
    pub fn with_profiling_sink(mut self, sink: impl ProfilingSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Runs one estimator step for the current audio buffer.
    ///
    /// # Arguments
    /// * `now_ms` - Timestamp of the buffer
    /// * `delta_ms` - Wall time elapsed since the previous tick
    /// * `feed` - Per-band attack strengths for this buffer
    pub fn tick<F: SpectralFeed + ?Sized>(&mut self, now_ms: f64, delta_ms: f64, feed: &F) -> TickOutcome {
        let resynced = self.apply_pending_resync();
        self.state = TrackerState::Tracking;
        self.ticks += 1;

        self.clock.advance(delta_ms);
        self.history.prune(now_ms);

        let mut onsets_detected = 0;
        for index in 0..self.registry.len() {
            let strength = feed.band_attack(index);
            if let Some(onset) = self.detector.try_detect_at(index, strength, now_ms) {
                self.history.push(onset);
                self.sink.record(onset.band_type.profile_key(), onset.amplitude as f64);
                onsets_detected += 1;
            }
        }

        let errors = self
            .matcher
            .accumulate(self.history.as_slice(), now_ms, self.clock.bpm, self.clock.bar_phase);
        let step = self.controller.step(&errors);
        if let Some(step) = &step {
            self.clock.apply(&step.correction, &self.config);
            self.last_phase_error = Some(step.normalized_phase_error);
            self.sink.record("phase_error", step.normalized_phase_error);
            self.sink.record("bpm_correction", step.correction.bpm);
        }

        self.sink.record("rejected_samples", self.detector.rejected_samples() as f64);
        self.sink.record("bar_progress", self.clock.bar_progress());
        self.sink.record("bpm", self.clock.bpm);
        self.publisher.publish(self.clock.snapshot());

        TickOutcome {
            onsets_detected,
            step,
            resynced,
        }
    }

    /// Reseeds the clock immediately. For use by the thread that owns the
    /// estimator; other threads go through `resync_handle`.
    ///
    /// Out-of-range tempos, infinities included, clamp to the nearest bound.
    /// NaN is ignored.
    pub fn resync_now(&mut self, initial_bpm: f64) {
        if initial_bpm.is_nan() {
            log::warn!("[RESYNC] Ignoring NaN tempo");
            return;
        }
        self.clock.resync(initial_bpm, &self.config);
        self.detector.reset();
        self.history.clear();
        self.last_phase_error = None;
        self.state = TrackerState::Tracking;
        self.publisher.publish(self.clock.snapshot());
        log::debug!("[RESYNC] bpm={:.2} bar_phase={:.3}", self.clock.bpm, self.clock.bar_phase);
    }

    /// Consumes the pending resync request, if any.
    fn apply_pending_resync(&mut self) -> bool {
        match self.resync_rx.try_recv().ok() {
            Some(bpm) => {
                self.resync_now(bpm);
                true
            }
            None => false,
        }
    }

    pub fn resync_handle(&self) -> ResyncHandle {
        ResyncHandle {
            sender: self.resync_tx.clone(),
            pending: self.resync_rx.clone(),
        }
    }

    /// Lock-free reader of the published clock.
    pub fn reader(&self) -> ClockReader {
        self.publisher.reader()
    }

    pub fn current_bpm(&self) -> f64 {
        self.clock.bpm
    }

    /// Position inside the current bar, in `[0, 1)`.
    pub fn bar_progress(&self) -> f64 {
        self.clock.bar_progress()
    }

    pub fn clock(&self) -> ClockSnapshot {
        self.clock.snapshot()
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Normalized phase error of the most recent corrected tick.
    pub fn last_phase_error(&self) -> Option<f64> {
        self.last_phase_error
    }

    pub fn history(&self) -> &OnsetHistory {
        &self.history
    }

    pub fn detector(&self) -> &OnsetDetector {
        &self.detector
    }

    pub fn registry(&self) -> &BandRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Feed index of a band type, if tracked.
    pub fn band_index(&self, band_type: BandType) -> Option<usize> {
        self.registry.index_of(band_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EstimatorError;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingSink(Arc<Mutex<Vec<(&'static str, f64)>>>);

    impl ProfilingSink for RecordingSink {
        fn record(&mut self, name: &'static str, value: f64) {
            self.0.lock().unwrap().push((name, value));
        }
    }

    #[test]
    fn test_starts_uninitialized_then_tracks() {
        let mut est = TempoEstimator::new(EstimatorConfig::default()).unwrap();
        assert_eq!(est.state(), TrackerState::Uninitialized);
        est.tick(10.0, 10.0, &[0.0f32; 3]);
        assert_eq!(est.state(), TrackerState::Tracking);
        assert_eq!(est.ticks(), 1);
    }

    #[test]
    fn test_silence_free_runs() {
        let mut est = TempoEstimator::new(EstimatorConfig::default()).unwrap();
        for i in 1..=100 {
            let outcome = est.tick(i as f64 * 10.0, 10.0, &[0.0f32; 3]);
            assert_eq!(outcome.step, None);
        }
        assert_eq!(est.current_bpm(), 120.0);
        // 1000 ms at 120 BPM is half a bar.
        assert!((est.bar_progress() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EstimatorConfig {
            bands: vec![],
            ..EstimatorConfig::default()
        };
        assert!(matches!(TempoEstimator::new(config), Err(EstimatorError::InvalidConfig(_))));
    }

    #[test]
    fn test_initial_bpm_is_clamped() {
        let config = EstimatorConfig {
            initial_bpm: 20.0,
            ..EstimatorConfig::default()
        };
        let est = TempoEstimator::new(config).unwrap();
        assert_eq!(est.current_bpm(), 50.0);
    }

    #[test]
    fn test_queued_resync_applies_on_next_tick_only() {
        let mut est = TempoEstimator::new(EstimatorConfig::default()).unwrap();
        let handle = est.resync_handle();
        assert!(handle.resync(90.0));
        assert!(handle.resync(140.0));
        assert_eq!(est.current_bpm(), 120.0);

        let outcome = est.tick(10.0, 10.0, &[0.0f32; 3]);
        assert!(outcome.resynced);
        assert_eq!(est.current_bpm(), 140.0);

        let outcome = est.tick(20.0, 10.0, &[0.0f32; 3]);
        assert!(!outcome.resynced);
    }

    #[test]
    fn test_latest_resync_request_wins() {
        let mut est = TempoEstimator::new(EstimatorConfig::default()).unwrap();
        let handle = est.resync_handle();
        for bpm in [90.0, 100.0, 110.0, 120.0, 140.0] {
            assert!(handle.resync(bpm));
        }

        let outcome = est.tick(10.0, 10.0, &[0.0f32; 3]);
        assert!(outcome.resynced);
        assert_eq!(est.current_bpm(), 140.0);
        assert!(!est.tick(20.0, 10.0, &[0.0f32; 3]).resynced);
    }

    #[test]
    fn test_nan_resync_request_is_not_sent() {
        let mut est = TempoEstimator::new(EstimatorConfig::default()).unwrap();
        let handle = est.resync_handle();
        assert!(handle.resync(100.0));
        assert!(!handle.resync(f64::NAN));

        est.tick(10.0, 10.0, &[0.0f32; 3]);
        assert_eq!(est.current_bpm(), 100.0);
    }

    #[test]
    fn test_nan_resync_now_is_ignored() {
        let mut est = TempoEstimator::new(EstimatorConfig::default()).unwrap();
        est.resync_now(100.0);
        est.resync_now(f64::NAN);
        assert_eq!(est.current_bpm(), 100.0);
    }

    #[test]
    fn test_resync_clears_history_and_windows() {
        let mut est = TempoEstimator::new(EstimatorConfig::default()).unwrap();
        est.tick(10.0, 10.0, &[0.0f32, 0.0, 0.0]);
        let outcome = est.tick(20.0, 10.0, &[1.0f32, 0.0, 0.0]);
        assert_eq!(outcome.onsets_detected, 1);
        assert_eq!(est.history().len(), 1);

        est.resync_now(120.0);
        assert!(est.history().is_empty());
        assert_eq!(est.detector().average(BandType::Bass), Some(0.0));
    }

    #[test]
    fn test_profiling_sink_receives_tick_values() {
        let sink = RecordingSink::default();
        let records = Arc::clone(&sink.0);
        let mut est = TempoEstimator::new(EstimatorConfig::default())
            .unwrap()
            .with_profiling_sink(sink);

        est.tick(10.0, 10.0, &[0.0f32; 3]);
        est.tick(20.0, 10.0, &[1.0f32, 0.0, 0.0]);

        let records = records.lock().unwrap();
        let names: Vec<&str> = records.iter().map(|(n, _)| *n).collect();
        assert!(names.contains(&"onset/bass"));
        assert!(names.contains(&"bar_progress"));
        assert!(names.contains(&"bpm"));
    }

    #[test]
    fn test_rejected_samples_reach_profiling_sink() {
        let sink = RecordingSink::default();
        let records = Arc::clone(&sink.0);
        let mut est = TempoEstimator::new(EstimatorConfig::default())
            .unwrap()
            .with_profiling_sink(sink);

        est.tick(10.0, 10.0, &[f32::NAN, 0.0, f32::INFINITY]);
        est.tick(20.0, 10.0, &[f32::NAN, 0.0, 0.0]);

        let records = records.lock().unwrap();
        let rejected: Vec<f64> = records
            .iter()
            .filter(|(name, _)| *name == "rejected_samples")
            .map(|(_, value)| *value)
            .collect();
        assert_eq!(rejected, vec![2.0, 3.0]);
    }
}
