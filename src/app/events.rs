//! Outbound heater events and the status snapshot.
//!
//! The [`HeaterService`](super::service::HeaterService) emits events through
//! the [`EventSink`](super::ports::EventSink) port. Adapters on the other
//! side decide what to do with them: log to serial, publish on the message
//! bus, push to a web socket.

use serde::Serialize;

use crate::autotune::rules::PidGains;
use crate::autotune::{AutotunePhase, AutotuneStatus};
use crate::drivers::input::InputStates;
use crate::error::{FaultKind, FaultMask};
use crate::mode::ControlMode;
use crate::sensors::ControlTemp;

/// Structured events emitted by the heater core.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaterEvent {
    /// The service came up (carries the initial requested mode).
    Started(ControlMode),

    /// The effective mode changed.
    ModeChanged { from: ControlMode, to: ControlMode },

    /// A fault kind became set (active or latched).
    FaultRaised(FaultKind),

    /// No fault bit remains.
    FaultsCleared,

    OutputTestStarted { pct: f32, duration_ms: u32 },

    /// Expired or cancelled.
    OutputTestEnded,

    AutotunePhaseChanged { from: AutotunePhase, to: AutotunePhase },

    GainsCommitted(PidGains),

    ConfigApplied,
}

/// Point-in-time status, suitable for serialising to any presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeaterStatus {
    pub enabled: bool,
    pub enabled_effective: bool,
    pub requested_mode: ControlMode,
    pub mode: ControlMode,
    pub target_c: f32,
    pub output_pct: f32,
    pub applied_pct: f32,
    pub heater_on: bool,
    pub control_temp: ControlTemp,
    pub fault_active: FaultMask,
    pub fault_latched: FaultMask,
    pub last_fault: Option<FaultKind>,
    pub last_fault_ms: Option<u32>,
    pub inputs: InputStates,
    pub override_active: bool,
    pub output_test_active: bool,
    pub autotune: AutotuneStatus,
}
