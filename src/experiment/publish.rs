//! Publish sinks for experiment results.

use tracing::{debug, info};

use super::record::{Event, MismatchRecord};

/// Sink that receives the outcome of every full experiment run.
///
/// Implementations must not panic; a panicking publisher unwinds through
/// `Experiment::run`.
pub trait Publisher: Send + Sync {
    /// Receive one event and its payload.
    fn publish(&self, event: Event, payload: &MismatchRecord);
}

impl<F> Publisher for F
where
    F: Fn(Event, &MismatchRecord) + Send + Sync,
{
    fn publish(&self, event: Event, payload: &MismatchRecord) {
        self(event, payload);
    }
}

/// Publisher that discards everything. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl Publisher for NoopPublisher {
    fn publish(&self, _event: Event, _payload: &MismatchRecord) {}
}

/// Publisher that writes events to `tracing`.
///
/// Matches are logged at `debug`, mismatches at `info` with both sides'
/// durations and failure classes as fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPublisher;

impl Publisher for TracingPublisher {
    fn publish(&self, event: Event, payload: &MismatchRecord) {
        let control = payload.control();
        let candidate = payload.candidate();
        if event.is_mismatch() {
            info!(
                experiment = payload.experiment(),
                first = %payload.first(),
                control_ms = control.duration(),
                candidate_ms = candidate.duration(),
                control_exception = control.exception().map(|e| e.class()),
                candidate_exception = candidate.exception().map(|e| e.class()),
                "experiment mismatch"
            );
        } else {
            debug!(
                experiment = payload.experiment(),
                first = %payload.first(),
                control_ms = control.duration(),
                candidate_ms = candidate.duration(),
                "experiment match"
            );
        }
    }
}
