//! Heater service: the composition root of the heater core.
//!
//! [`HeaterService`] owns the control engine, the autotune session and the
//! configuration store. It exposes a hardware-agnostic API; every
//! interaction with sensors, the message bus and the heater pin flows
//! through port traits injected at call sites, so the whole service is
//! testable with mock adapters.
//!
//! ```text
//!  TemperatureSource ──▶ ┌──────────────────────────┐ ──▶ EventSink
//!  ExternalLink      ──▶ │      HeaterService        │
//!  InputPort         ──▶ │ HeaterController · Autotune│
//!  HeaterActuator    ◀── └──────────────────────────┘ ◀─▶ ConfigPort
//! ```

use log::{info, warn};

use crate::autotune::{Autotune, AutotuneOptions, AutotunePhase};
use crate::config::HeaterConfig;
use crate::control::heater::{ControlAuthority, HeaterController};
use crate::error::{ConfigError, FaultMask, Result};
use crate::mode::ControlMode;

use super::commands::HeaterCommand;
use super::events::{HeaterEvent, HeaterStatus};
use super::ports::{ConfigPort, EventSink, ExternalLink, HeaterActuator, InputPort, TemperatureSource};

/// What the last event diff saw.
#[derive(Debug, Clone, Copy)]
struct Observed {
    mode: ControlMode,
    faults: FaultMask,
    output_test: bool,
    autotune: AutotunePhase,
}

// ───────────────────────────────────────────────────────────────
// HeaterService
// ───────────────────────────────────────────────────────────────

pub struct HeaterService<C: ConfigPort> {
    store: C,
    heater: HeaterController,
    autotune: Autotune,
    observed: Observed,
}

impl<C: ConfigPort> HeaterService<C> {
    /// Load the configuration from `store` and build the controller.
    ///
    /// A missing or unreadable configuration falls back to defaults; an
    /// invalid one is applied anyway and surfaces as `CONFIG_INVALID`.
    pub fn new(store: C, now_ms: u32) -> Self {
        let config = match store.load() {
            Ok(cfg) => cfg,
            Err(ConfigError::NotFound) => {
                info!("no stored heater config, using defaults");
                HeaterConfig::default()
            }
            Err(e) => {
                warn!("heater config load failed ({e}), using defaults");
                HeaterConfig::default()
            }
        };
        let heater = HeaterController::new(config, now_ms);
        let observed = Observed {
            mode: heater.effective_mode(),
            faults: FaultMask::EMPTY,
            output_test: false,
            autotune: AutotunePhase::Idle,
        };
        Self {
            store,
            heater,
            autotune: Autotune::new(),
            observed,
        }
    }

    /// Announce the initial state.
    pub fn start(&mut self, sink: &mut impl EventSink) {
        let mode = self.heater.requested_mode();
        info!("heater service started, requested mode {mode}");
        sink.emit(&HeaterEvent::Started(mode));
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// One control cycle: heater tick, then autotune tick, then events.
    ///
    /// `io` satisfies both [`InputPort`] and [`HeaterActuator`], which keeps
    /// the switch inputs and the heater pin behind one mutable borrow.
    pub fn tick(
        &mut self,
        now_ms: u32,
        temps: &impl TemperatureSource,
        link: &impl ExternalLink,
        io: &mut (impl InputPort + HeaterActuator),
        sink: &mut impl EventSink,
    ) {
        self.heater.tick(now_ms, temps, link, io);
        self.autotune.tick(&mut self.heater, now_ms);

        if self.autotune.auto_commit_pending() {
            if let Err(e) = self.commit_autotune(now_ms, sink) {
                warn!("autotune auto-save failed: {e}");
            }
        }
        self.emit_changes(sink);
    }

    // ── Command handling ──────────────────────────────────────

    pub fn handle_command(&mut self, cmd: HeaterCommand, now_ms: u32, sink: &mut impl EventSink) -> Result<()> {
        match cmd {
            HeaterCommand::SetMode(mode) => {
                info!("requested mode -> {mode}");
                self.heater.set_requested_mode(mode);
            }
            HeaterCommand::SetEnabled(enabled) => {
                info!("heater enabled -> {enabled}");
                self.heater.set_enabled(enabled);
            }
            HeaterCommand::ResetFaults => {
                info!("fault reset requested");
                self.heater.request_fault_reset();
            }
            HeaterCommand::StartOutputTest { pct, duration_ms } => {
                self.heater.start_output_test(pct, duration_ms, now_ms)?;
                sink.emit(&HeaterEvent::OutputTestStarted { pct, duration_ms });
            }
            HeaterCommand::CancelOutputTest => self.heater.cancel_output_test(),
            HeaterCommand::ApplyConfig(config) => {
                config.validate()?;
                self.store.save(&config)?;
                self.heater.apply_config(*config, now_ms);
                sink.emit(&HeaterEvent::ConfigApplied);
            }
            HeaterCommand::StartAutotune {
                auto_save,
                aggressiveness,
                max_duration_s,
            } => {
                let options = AutotuneOptions {
                    auto_save,
                    aggressiveness,
                    max_duration_s,
                };
                self.autotune.start(&mut self.heater, options, now_ms)?;
            }
            HeaterCommand::AbortAutotune => self.autotune.abort(&mut self.heater)?,
            HeaterCommand::CommitAutotune => self.commit_autotune(now_ms, sink)?,
            HeaterCommand::DiscardAutotune => self.autotune.discard(&mut self.heater)?,
        }
        self.emit_changes(sink);
        Ok(())
    }

    /// Gains into a copy of the live config, persist, re-apply.
    fn commit_autotune(&mut self, now_ms: u32, sink: &mut impl EventSink) -> Result<()> {
        let mut config = self.heater.config().clone();
        let gains = self.autotune.commit(&mut config)?;
        self.store.save(&config)?;
        self.heater.apply_config(config, now_ms);
        sink.emit(&HeaterEvent::GainsCommitted(gains));
        Ok(())
    }

    fn emit_changes(&mut self, sink: &mut impl EventSink) {
        let mode = self.heater.effective_mode();
        if mode != self.observed.mode {
            sink.emit(&HeaterEvent::ModeChanged {
                from: self.observed.mode,
                to: mode,
            });
        }

        let faults = self.heater.fault_active().union(self.heater.fault_latched());
        for kind in faults.iter().filter(|k| !self.observed.faults.contains(*k)) {
            sink.emit(&HeaterEvent::FaultRaised(kind));
        }
        if faults.is_empty() && !self.observed.faults.is_empty() {
            sink.emit(&HeaterEvent::FaultsCleared);
        }

        let output_test = self.heater.output_test_active();
        if self.observed.output_test && !output_test {
            sink.emit(&HeaterEvent::OutputTestEnded);
        }

        let phase = self.autotune.phase();
        if phase != self.observed.autotune {
            sink.emit(&HeaterEvent::AutotunePhaseChanged {
                from: self.observed.autotune,
                to: phase,
            });
        }

        self.observed = Observed {
            mode,
            faults,
            output_test,
            autotune: phase,
        };
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn status(&self, now_ms: u32) -> HeaterStatus {
        let h = &self.heater;
        let last = h.last_fault();
        HeaterStatus {
            enabled: h.config().enabled,
            enabled_effective: h.is_enabled_effective(),
            requested_mode: h.requested_mode(),
            mode: h.effective_mode(),
            target_c: h.target(),
            output_pct: h.output_pct(),
            applied_pct: h.applied_pct(),
            heater_on: h.heater_on(),
            control_temp: h.control_temp(),
            fault_active: h.fault_active(),
            fault_latched: h.fault_latched(),
            last_fault: last.map(|(kind, _)| kind),
            last_fault_ms: last.map(|(_, ms)| ms),
            inputs: h.input_states(),
            override_active: h.authority() != ControlAuthority::Internal,
            output_test_active: h.output_test_active(),
            autotune: self.autotune.status(now_ms),
        }
    }

    pub fn heater(&self) -> &HeaterController {
        &self.heater
    }

    pub fn autotune(&self) -> &Autotune {
        &self.autotune
    }

    pub fn config(&self) -> &HeaterConfig {
        self.heater.config()
    }

    pub fn store(&self) -> &C {
        &self.store
    }
}
