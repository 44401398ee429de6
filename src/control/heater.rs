//! Heater control engine.
//!
//! One [`HeaterController::tick`] per control cycle:
//!
//! ```text
//!  inputs ─▶ enable gate ─▶ mode resolution ─▶ target
//!        ─▶ fault supervision ─▶ (safe state | algorithm) ─▶ output stage
//! ```
//!
//! The controller owns its configuration snapshot, control state and fault
//! state. An external session (autotune) can only steer it through the
//! [`OverrideChannel`] implementation at the bottom of this file.

use log::{debug, info, warn};
use serde::Serialize;

use crate::app::ports::{ExternalLink, HeaterActuator, InputPort, OverrideChannel, TemperatureSource};
use crate::config::{ControlAlgorithm, HeaterConfig, LossPolicy};
use crate::drivers::input::{InputBank, InputStates};
use crate::error::{CommandError, ConfigError, FaultKind, FaultMask};
use crate::mode::{resolve_mode, ControlMode, ModeInputs, SensorRole};
use crate::pins;
use crate::safety::{FaultState, RunawayInputs, RunawayMonitor, RunawayTrigger, StuckTracker};
use crate::sensors::{ControlTemp, ControlTempSelector, Readings, SensorHealth};

use super::hysteresis::Hysteresis;
use super::output::{clamp_pct, Drive, OutputStage, RampGate};
use super::pid::PidController;

/// The PID is evaluated at most this often; the output is held in between.
pub const PID_INTERVAL_MS: u32 = 250;

/// Who decides target and output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub enum ControlAuthority {
    /// Mode-driven control by the configured algorithm.
    #[default]
    Internal,
    /// An autotune session owns the heater.
    Autotune { target_c: f32, output_pct: f32 },
}

#[derive(Debug, Clone, Copy)]
struct OutputTest {
    pct: f32,
    started_ms: u32,
    duration_ms: u32,
}

pub struct HeaterController {
    cfg: HeaterConfig,
    config_error: Option<ConfigError>,
    output_wired: bool,

    requested_mode: ControlMode,
    effective_mode: ControlMode,
    target_c: f32,
    output_pct: f32,
    enabled_effective: bool,
    last_mode_change_ms: Option<u32>,

    inputs: InputBank,
    pid: PidController,
    hysteresis: Hysteresis,
    output: OutputStage,

    selector: ControlTempSelector,
    control: ControlTemp,
    faults: FaultState,
    runaway: RunawayMonitor,
    stuck: StuckTracker,

    test: Option<OutputTest>,
    authority: ControlAuthority,
}

impl HeaterController {
    /// Build the controller; `now_ms` is the boot reference for the sensor
    /// grace windows and the output hold timers.
    pub fn new(config: HeaterConfig, now_ms: u32) -> Self {
        let mut ctl = Self {
            config_error: None,
            output_wired: false,
            requested_mode: config.mode,
            effective_mode: ControlMode::Idle,
            target_c: config.targets.for_mode(ControlMode::Idle),
            output_pct: 0.0,
            enabled_effective: false,
            last_mode_change_ms: None,
            inputs: InputBank::new(config.inputs.enable, config.inputs.mode, config.inputs.manual),
            pid: PidController::new(),
            hysteresis: Hysteresis::default(),
            output: OutputStage::new(now_ms),
            selector: ControlTempSelector::new(now_ms),
            control: ControlTemp::default(),
            faults: FaultState::default(),
            runaway: RunawayMonitor::default(),
            stuck: StuckTracker::default(),
            test: None,
            authority: ControlAuthority::Internal,
            cfg: config.clone(),
        };
        ctl.apply_config(config, now_ms);
        ctl
    }

    /// Replace the configuration snapshot wholesale.
    ///
    /// Resets the requested mode to the configured one, re-initialises the
    /// inputs and output bookkeeping, and re-bounds the PID integral.
    pub fn apply_config(&mut self, config: HeaterConfig, now_ms: u32) {
        self.config_error = config.validate().err();
        if let Some(e) = self.config_error {
            warn!("heater config rejected: {e}");
        }
        self.output_wired = config.output.pin.is_some_and(pins::is_valid_output_pin);
        self.requested_mode = config.mode;
        self.inputs
            .reconfigure(config.inputs.enable, config.inputs.mode, config.inputs.manual);
        self.output = OutputStage::new(now_ms);
        self.pid.clamp_integral(config.pid.integral_limit);
        self.cfg = config;
        info!(
            "heater config applied: enabled={} mode={} algorithm={:?}",
            self.cfg.enabled, self.requested_mode, self.cfg.algorithm
        );
    }

    // ── Per-tick orchestration ────────────────────────────────

    pub fn tick(
        &mut self,
        now_ms: u32,
        temps: &impl TemperatureSource,
        link: &impl ExternalLink,
        io: &mut (impl InputPort + HeaterActuator),
    ) {
        // 1. Inputs and the mode-cycle switch
        if self.inputs.update(io, now_ms) {
            let next = self.requested_mode.cycled(self.cfg.frost_enabled);
            info!("mode switch: {} -> {}", self.requested_mode, next);
            self.requested_mode = next;
        }

        // 2. Enable gate
        let link_timed_out = link.is_timed_out(now_ms);
        let link_kills = self.cfg.link.loss_policy == LossPolicy::Off && link_timed_out;
        self.enabled_effective = self.cfg.enabled && self.inputs.enable_permits() && !link_kills;

        // 3. Mode and target
        let mode = resolve_mode(&ModeInputs {
            requested: self.requested_mode,
            external: link.external_mode(now_ms),
            manual_active: self.inputs.manual_active(),
            link_timed_out,
            loss_policy: self.cfg.link.loss_policy,
            frost_enabled: self.cfg.frost_enabled,
        });
        if mode != self.effective_mode {
            self.on_mode_change(mode, now_ms);
        }
        self.effective_mode = mode;
        self.target_c = match self.authority {
            ControlAuthority::Autotune { target_c, .. } => target_c,
            ControlAuthority::Internal => self.cfg.targets.for_mode(mode),
        };

        // 4. Faults
        self.supervise(now_ms, temps, link, link_timed_out);

        // 5. Safe state
        let faulted = self.faults.is_faulted();
        if faulted || !self.enabled_effective {
            if faulted {
                self.effective_mode = ControlMode::Fault;
            }
            self.output_pct = 0.0;
            self.reset_algorithms();
            let drive = self.output.force_off(&self.cfg.output, now_ms);
            self.actuate(io, drive);
            return;
        }

        // 6. Algorithm
        if let Some(test) = self.test {
            if now_ms.wrapping_sub(test.started_ms) >= test.duration_ms {
                info!("output test finished");
                self.test = None;
            }
        }
        let desired = self.desired_output(now_ms);
        self.output_pct = clamp_pct(&self.cfg.output, desired);

        // 7. Output stage
        let automatic = self.test.is_none()
            && self.effective_mode != ControlMode::Manual
            && (self.cfg.algorithm == ControlAlgorithm::Pid
                || self.authority != ControlAuthority::Internal);
        let ramp = RampGate {
            since_mode_change_ms: self.last_mode_change_ms.map(|t| now_ms.wrapping_sub(t)),
            automatic,
        };
        let drive = self.output.update(&self.cfg.output, now_ms, self.output_pct, ramp);
        self.actuate(io, drive);
    }

    fn on_mode_change(&mut self, mode: ControlMode, now_ms: u32) {
        let new_target = self.cfg.targets.for_mode(mode);
        let lowered = new_target < self.target_c;
        debug!("effective mode {} -> {} (target lowered: {lowered})", self.effective_mode, mode);
        self.last_mode_change_ms = Some(now_ms);
        if lowered {
            self.pid.reset();
        }
        self.runaway.on_mode_change(lowered);
    }

    fn desired_output(&mut self, now_ms: u32) -> f32 {
        if let ControlAuthority::Autotune { output_pct, .. } = self.authority {
            self.reset_algorithms();
            return output_pct;
        }
        if let Some(test) = self.test {
            self.reset_algorithms();
            return test.pct;
        }
        if self.effective_mode == ControlMode::Manual {
            self.reset_algorithms();
            return self.cfg.output.manual_output_pct;
        }
        let Some(temp_c) = self.control.value_c else {
            self.pid.reset();
            return 0.0;
        };

        match self.cfg.algorithm {
            ControlAlgorithm::Pid => {
                let due = self
                    .pid
                    .last_update_ms()
                    .is_none_or(|last| now_ms.wrapping_sub(last) >= PID_INTERVAL_MS);
                if due {
                    let ceiling = self.cfg.output_ceiling_pct();
                    self.pid.compute(&self.cfg.pid, ceiling, now_ms, self.target_c, temp_c)
                } else {
                    self.output_pct
                }
            }
            ControlAlgorithm::Hysteresis => {
                self.pid.reset();
                if self.hysteresis.update(&self.cfg.hysteresis, self.target_c, temp_c) {
                    self.cfg.output.max_output_pct
                } else {
                    0.0
                }
            }
        }
    }

    fn reset_algorithms(&mut self) {
        self.pid.reset();
        self.hysteresis.reset();
    }

    fn actuate(&self, io: &mut impl HeaterActuator, drive: Drive) {
        if !self.output_wired {
            return;
        }
        match drive {
            Drive::Duty(duty) => io.write_duty(duty),
            Drive::Level(level) => io.write_level(level),
        }
    }

    // ── Fault supervision ─────────────────────────────────────

    fn supervise(
        &mut self,
        now_ms: u32,
        temps: &impl TemperatureSource,
        link: &impl ExternalLink,
        link_timed_out: bool,
    ) {
        let safety = self.cfg.safety;
        self.faults.begin_tick();

        if self.config_error.is_some() {
            self.faults.raise(FaultKind::ConfigInvalid, true, now_ms);
        }

        // Control temperature
        let readings = Readings {
            primary_c: temps.role_temp_c(SensorRole::BatteryPrimary),
            fallback_c: if self.cfg.link.temp_fallback {
                link.external_temp_c(now_ms)
            } else {
                None
            },
            last_scan_ms: temps.last_scan_ms(),
        };
        let (control, health) = self.selector.select(now_ms, readings);
        self.control = control;
        if let SensorHealth::Failed { latch } = health {
            self.faults.raise(FaultKind::SensorPrimaryFail, latch, now_ms);
        }

        // Over-temperature and plausibility
        if let Some(temp) = control.value_c {
            if temp > safety.max_temp_c {
                self.faults.raise(FaultKind::OverTemp, true, now_ms);
            }
            if let Some(secondary) = temps.role_temp_c(SensorRole::BatterySecondary) {
                if (temp - secondary).abs() > safety.max_delta_c {
                    self.faults.raise(FaultKind::PlausibilityFail, true, now_ms);
                }
            }
        }

        if link_timed_out && self.cfg.link.loss_policy == LossPolicy::Off {
            self.faults.raise(FaultKind::LinkTimeout, true, now_ms);
        }

        // Stuck output
        let applied = self.output.applied_pct();
        if self.stuck.update(&safety, now_ms, applied, control.value_c) {
            self.faults.raise(FaultKind::StuckOnNoHeat, true, now_ms);
        }

        // Thermal runaway
        if let Some(temp) = control.value_c.filter(|_| safety.runaway_enabled) {
            self.runaway.observe(temps.last_update_ms(), temp, safety.runaway_window_s);
        }
        let runaway = self.runaway.evaluate(
            &safety,
            &RunawayInputs {
                now_ms,
                temp_c: control.value_c,
                target_c: self.target_c,
                applied_pct: applied,
                since_mode_change_ms: self.last_mode_change_ms.map(|t| now_ms.wrapping_sub(t)),
                check_overshoot: self.effective_mode != ControlMode::Manual,
            },
        );
        if let Some(trigger) = runaway {
            match trigger {
                RunawayTrigger::Rate { c_per_min } => warn!(
                    "runaway: rate {c_per_min:.3} C/min > {:.3}, target {:.2}, applied {applied:.1}%",
                    safety.runaway_rate_c_per_min, self.target_c
                ),
                RunawayTrigger::Overshoot => warn!(
                    "runaway: overshoot beyond {:.2} C margin, target {:.2}, applied {applied:.1}%",
                    safety.runaway_margin_c, self.target_c
                ),
            }
            self.faults.raise(FaultKind::ThermalRunaway, safety.runaway_latch, now_ms);
        }

        self.faults.finish_tick();
    }

    // ── Commands ──────────────────────────────────────────────

    pub fn set_requested_mode(&mut self, mode: ControlMode) {
        self.requested_mode = mode;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.cfg.enabled = enabled;
    }

    /// Latches clear on the next tick with no active condition.
    pub fn request_fault_reset(&mut self) {
        self.faults.request_reset();
    }

    pub fn start_output_test(&mut self, pct: f32, duration_ms: u32, now_ms: u32) -> Result<(), CommandError> {
        if !(0.0..=100.0).contains(&pct) || duration_ms == 0 {
            return Err(CommandError::OutOfRange);
        }
        if self.authority != ControlAuthority::Internal {
            return Err(CommandError::OverrideActive);
        }
        if self.faults.is_faulted() {
            return Err(CommandError::Faulted);
        }
        info!("output test: {pct:.1}% for {duration_ms} ms");
        self.test = Some(OutputTest {
            pct,
            started_ms: now_ms,
            duration_ms,
        });
        Ok(())
    }

    pub fn cancel_output_test(&mut self) {
        if self.test.take().is_some() {
            info!("output test cancelled");
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn config(&self) -> &HeaterConfig {
        &self.cfg
    }

    pub fn config_error(&self) -> Option<ConfigError> {
        self.config_error
    }

    pub fn requested_mode(&self) -> ControlMode {
        self.requested_mode
    }

    pub fn effective_mode(&self) -> ControlMode {
        self.effective_mode
    }

    pub fn is_enabled_effective(&self) -> bool {
        self.enabled_effective
    }

    pub fn target(&self) -> f32 {
        self.target_c
    }

    pub fn output_pct(&self) -> f32 {
        self.output_pct
    }

    /// Output after hold timers and ramp, as driven this tick.
    pub fn applied_pct(&self) -> f32 {
        self.output.applied_pct()
    }

    pub fn heater_on(&self) -> bool {
        self.output.heater_on()
    }

    pub fn control_temp(&self) -> ControlTemp {
        self.control
    }

    pub fn fault_active(&self) -> FaultMask {
        self.faults.active()
    }

    pub fn fault_latched(&self) -> FaultMask {
        self.faults.latched()
    }

    pub fn last_fault(&self) -> Option<(FaultKind, u32)> {
        self.faults.last_fault()
    }

    pub fn input_states(&self) -> InputStates {
        self.inputs.states()
    }

    pub fn authority(&self) -> ControlAuthority {
        self.authority
    }

    pub fn output_test_active(&self) -> bool {
        self.test.is_some()
    }

    pub fn pid_integral(&self) -> f32 {
        self.pid.integral()
    }
}

impl OverrideChannel for HeaterController {
    fn enabled_effective(&self) -> bool {
        self.enabled_effective
    }

    fn is_faulted(&self) -> bool {
        self.faults.is_faulted()
    }

    fn control_temp_c(&self) -> Option<f32> {
        self.control.value_c
    }

    fn target_c(&self) -> f32 {
        self.target_c
    }

    fn max_temp_c(&self) -> f32 {
        self.cfg.safety.max_temp_c
    }

    fn max_output_pct(&self) -> f32 {
        self.cfg.output.max_output_pct
    }

    fn install_override(&mut self, target_c: f32, output_pct: f32) {
        if self.authority == ControlAuthority::Internal {
            info!("override installed: target {target_c:.2} C, output {output_pct:.1}%");
        }
        self.test = None;
        self.authority = ControlAuthority::Autotune {
            target_c,
            output_pct,
        };
    }

    fn release_override(&mut self) {
        if self.authority != ControlAuthority::Internal {
            info!("override released");
        }
        self.authority = ControlAuthority::Internal;
    }
}
