//! Fire-and-forget diagnostics sinks.
//!
//! The estimator reports a handful of named values every tick. A sink must
//! never block and is never needed for correctness.

/// Receives named diagnostic values from the audio thread.
pub trait ProfilingSink: Send {
    fn record(&mut self, name: &'static str, value: f64);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProfilingSink for NullSink {
    fn record(&mut self, _name: &'static str, _value: f64) {}
}

/// Forwards values to the `log` facade at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProfilingSink for LogSink {
    fn record(&mut self, name: &'static str, value: f64) {
        log::trace!(target: "beatlock::profile", "{name}={value:.6}");
    }
}
