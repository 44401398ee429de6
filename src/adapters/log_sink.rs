//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing each heater event as one structured
//! log line. A message-bus or web-socket adapter implements the same trait.

use log::{info, warn};

use crate::app::events::HeaterEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`HeaterEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &HeaterEvent) {
        match event {
            HeaterEvent::Started(mode) => info!("START | requested_mode={mode}"),
            HeaterEvent::ModeChanged { from, to } => info!("MODE | {from} -> {to}"),
            HeaterEvent::FaultRaised(kind) => warn!("FAULT | raised {kind}"),
            HeaterEvent::FaultsCleared => info!("FAULT | all cleared"),
            HeaterEvent::OutputTestStarted { pct, duration_ms } => {
                info!("TEST | output {pct:.1}% for {duration_ms} ms");
            }
            HeaterEvent::OutputTestEnded => info!("TEST | ended"),
            HeaterEvent::AutotunePhaseChanged { from, to } => info!("TUNE | {from} -> {to}"),
            HeaterEvent::GainsCommitted(g) => {
                info!("TUNE | committed kp={:.4} ki={:.5} kd={:.3}", g.kp, g.ki, g.kd);
            }
            HeaterEvent::ConfigApplied => info!("CONFIG | applied"),
        }
    }
}
