//! Relay-feedback PID autotune.
//!
//! ## Session lifecycle
//!
//! ```text
//!  IDLE ──start──▶ PROBE_RUNNING ──rate found──▶ TUNE_RUNNING ──cycles ok──▶ FINISHED
//!                       │                             │
//!                       ├──no response / timeout──────┼──timeout──▶ FAILED
//!                       ├──fault / disabled / no temp─┘
//!                       └──abort──▶ ABORTED
//!  FINISHED | FAILED | ABORTED ──discard──▶ IDLE
//! ```
//!
//! The session drives the heater only through an [`OverrideChannel`]. Every
//! terminal transition releases the override within the same tick and bumps
//! the result id.
//!
//! | Phase   | Progress                                   |
//! |---------|--------------------------------------------|
//! | probe   | 0..20 % over the longest probe schedule     |
//! | tune    | 20..100 % by completed cycles              |
//! | finished| 100 %                                      |

pub mod plan;
pub mod probe;
pub mod relay;
pub mod rules;

use core::fmt;
use core::str::FromStr;

use log::{info, warn};
use serde::Serialize;

use crate::app::ports::OverrideChannel;
use crate::config::{ControlAlgorithm, HeaterConfig};
use crate::control::output::HEAT_START_PCT;
use crate::error::CommandError;
use crate::mode::UnknownName;

use self::plan::{RateClass, TunePlan};
use self::probe::{Probe, ProbeStep, PROBE_WINDOW_MAX_MS, PROBE_WINDOW_START_MS};
use self::relay::RelayTuner;
use self::rules::{PidGains, TuningRule};

/// Finish requires at least this oscillation quality.
pub const QUALITY_THRESHOLD: f32 = 0.55;
/// The provisional target sits at least this far above the current temperature.
const TARGET_LIFT_C: f32 = 0.5;
/// The provisional target stays this far below the over-temperature limit.
const TARGET_MAX_MARGIN_C: f32 = 1.0;
/// Probe progress is scaled over the longest window schedule.
const PROBE_PROGRESS_SPAN_MS: u32 = PROBE_WINDOW_MAX_MS + PROBE_WINDOW_START_MS;

// ── Enumerations ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AutotunePhase {
    #[default]
    Idle,
    ProbeRunning,
    TuneRunning,
    Finished,
    Aborted,
    Failed,
}

impl AutotunePhase {
    pub fn is_running(self) -> bool {
        matches!(self, Self::ProbeRunning | Self::TuneRunning)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Aborted | Self::Failed)
    }
}

impl fmt::Display for AutotunePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "IDLE",
            Self::ProbeRunning => "PROBE_RUNNING",
            Self::TuneRunning => "TUNE_RUNNING",
            Self::Finished => "FINISHED",
            Self::Aborted => "ABORTED",
            Self::Failed => "FAILED",
        })
    }
}

impl FromStr for AutotunePhase {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let eq = |name: &str| s.eq_ignore_ascii_case(name);
        if eq("IDLE") {
            Ok(Self::Idle)
        } else if eq("PROBE_RUNNING") || eq("PROBE") {
            Ok(Self::ProbeRunning)
        } else if eq("TUNE_RUNNING") || eq("TUNE") {
            Ok(Self::TuneRunning)
        } else if eq("FINISHED") {
            Ok(Self::Finished)
        } else if eq("ABORTED") {
            Ok(Self::Aborted)
        } else if eq("FAILED") {
            Ok(Self::Failed)
        } else {
            Err(UnknownName)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Aggressiveness {
    #[default]
    Conservative,
    Normal,
    Aggressive,
}

impl fmt::Display for Aggressiveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Conservative => "conservative",
            Self::Normal => "normal",
            Self::Aggressive => "aggressive",
        })
    }
}

impl FromStr for Aggressiveness {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("conservative") {
            Ok(Self::Conservative)
        } else if s.eq_ignore_ascii_case("normal") {
            Ok(Self::Normal)
        } else if s.eq_ignore_ascii_case("aggressive") {
            Ok(Self::Aggressive)
        } else {
            Err(UnknownName)
        }
    }
}

/// Why a session ended without finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailReason {
    SafetyFault,
    Disabled,
    SensorInvalid,
    InsufficientResponse,
    Timeout,
    Aborted,
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SafetyFault => "SAFETY_FAULT",
            Self::Disabled => "DISABLED",
            Self::SensorInvalid => "SENSOR_INVALID",
            Self::InsufficientResponse => "INSUFFICIENT_RESPONSE",
            Self::Timeout => "TIMEOUT",
            Self::Aborted => "ABORTED",
        })
    }
}

// ── Session data ──────────────────────────────────────────────

/// Identified plant and derived gains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AutotuneResult {
    pub gains: PidGains,
    pub ku: f32,
    pub pu_s: f32,
    /// 0..1
    pub quality: f32,
    pub rule: Option<TuningRule>,
    pub valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AutotuneOptions {
    /// Commit gains automatically on a successful finish.
    pub auto_save: bool,
    pub aggressiveness: Aggressiveness,
    /// 0 = regime default.
    pub max_duration_s: u32,
}

/// Snapshot for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AutotuneStatus {
    pub phase: AutotunePhase,
    pub auto_save: bool,
    pub aggressiveness: Aggressiveness,
    pub elapsed_s: u32,
    pub last_update_ms: Option<u32>,
    pub detected_class: Option<RateClass>,
    pub measured_rate_c_per_min: Option<f32>,
    pub target_c: Option<f32>,
    pub output_pct: f32,
    pub noise_band_c: Option<f32>,
    pub sample_period_ms: Option<u32>,
    pub required_cycles: Option<u8>,
    pub cycles: u8,
    pub max_duration_s: u32,
    pub last_error: Option<FailReason>,
    pub progress_pct: u8,
    pub result_id: u32,
    pub result: AutotuneResult,
}

enum Stage {
    Probe(Probe),
    Tune { plan: TunePlan, relay: RelayTuner },
}

pub struct Autotune {
    phase: AutotunePhase,
    options: AutotuneOptions,
    started_ms: u32,
    phase_started_ms: u32,
    last_update_ms: Option<u32>,
    /// Effective limit; filled from the regime when the caller left it 0.
    max_duration_s: u32,
    target_c: Option<f32>,
    stage: Option<Stage>,
    /// Last plan, kept for status after the session ends.
    plan: Option<TunePlan>,
    last_cycles: u8,
    last_output_pct: f32,
    last_error: Option<FailReason>,
    result: AutotuneResult,
    result_id: u32,
    committed: bool,
}

impl Default for Autotune {
    fn default() -> Self {
        Self::new()
    }
}

impl Autotune {
    pub fn new() -> Self {
        Self {
            phase: AutotunePhase::Idle,
            options: AutotuneOptions::default(),
            started_ms: 0,
            phase_started_ms: 0,
            last_update_ms: None,
            max_duration_s: 0,
            target_c: None,
            stage: None,
            plan: None,
            last_cycles: 0,
            last_output_pct: 0.0,
            last_error: None,
            result: AutotuneResult::default(),
            result_id: 0,
            committed: false,
        }
    }

    // ── Commands ──────────────────────────────────────────────

    pub fn start(
        &mut self,
        heater: &mut impl OverrideChannel,
        options: AutotuneOptions,
        now_ms: u32,
    ) -> Result<(), CommandError> {
        if self.phase.is_running() {
            return Err(CommandError::AutotuneRunning);
        }
        if !heater.enabled_effective() {
            return Err(CommandError::Disabled);
        }
        if heater.is_faulted() {
            return Err(CommandError::Faulted);
        }
        let Some(temp_c) = heater.control_temp_c() else {
            return Err(CommandError::NoValidTemperature);
        };

        self.reset(heater);

        let mut target = heater.target_c();
        if !target.is_finite() {
            target = temp_c;
        }
        if temp_c > target - TARGET_LIFT_C {
            target = temp_c + TARGET_LIFT_C;
        }
        target = target.min(heater.max_temp_c() - TARGET_MAX_MARGIN_C);

        let probe = Probe::new(now_ms, HEAT_START_PCT, heater.max_output_pct());
        self.last_output_pct = probe.output_pct();
        heater.install_override(target, probe.output_pct());

        self.phase = AutotunePhase::ProbeRunning;
        self.options = options;
        self.max_duration_s = options.max_duration_s;
        self.started_ms = now_ms;
        self.phase_started_ms = now_ms;
        self.last_update_ms = Some(now_ms);
        self.target_c = Some(target);
        self.stage = Some(Stage::Probe(probe));
        info!(
            "autotune started: target {target:.2} C, probe output {:.0}%, {}",
            self.last_output_pct, options.aggressiveness
        );
        Ok(())
    }

    pub fn abort(&mut self, heater: &mut impl OverrideChannel) -> Result<(), CommandError> {
        if !self.phase.is_running() {
            return Err(CommandError::AutotuneNotRunning);
        }
        self.phase = AutotunePhase::Aborted;
        self.last_error = Some(FailReason::Aborted);
        self.stage = None;
        self.result_id = self.result_id.wrapping_add(1);
        heater.release_override();
        info!("autotune aborted");
        Ok(())
    }

    /// Return a terminal session to idle.
    pub fn discard(&mut self, heater: &mut impl OverrideChannel) -> Result<(), CommandError> {
        if self.phase.is_running() {
            return Err(CommandError::AutotuneRunning);
        }
        if !self.phase.is_terminal() {
            return Err(CommandError::AutotuneNotFinished);
        }
        self.reset(heater);
        info!("autotune result discarded");
        Ok(())
    }

    /// Write the result into `config`: gains, and the PID algorithm.
    ///
    /// Persisting and re-applying the configuration is the caller's job.
    pub fn commit(&mut self, config: &mut HeaterConfig) -> Result<PidGains, CommandError> {
        if self.phase != AutotunePhase::Finished {
            return Err(CommandError::AutotuneNotFinished);
        }
        if !self.result.valid {
            return Err(CommandError::NoValidResult);
        }
        let gains = self.result.gains;
        config.pid.kp = gains.kp;
        config.pid.ki = gains.ki;
        config.pid.kd = gains.kd;
        config.algorithm = ControlAlgorithm::Pid;
        self.committed = true;
        info!(
            "autotune gains committed: kp={:.4} ki={:.5} kd={:.3}",
            gains.kp, gains.ki, gains.kd
        );
        Ok(gains)
    }

    /// A finished auto-save session whose gains were not committed yet.
    pub fn auto_commit_pending(&self) -> bool {
        self.phase == AutotunePhase::Finished && self.options.auto_save && !self.committed
    }

    // ── Tick ──────────────────────────────────────────────────

    /// Advance a running session. Call after the heater tick.
    pub fn tick(&mut self, heater: &mut impl OverrideChannel, now_ms: u32) {
        if !self.phase.is_running() {
            return;
        }
        self.last_update_ms = Some(now_ms);

        if heater.is_faulted() {
            self.fail(heater, FailReason::SafetyFault);
            return;
        }
        if !heater.enabled_effective() {
            self.fail(heater, FailReason::Disabled);
            return;
        }
        let Some(temp_c) = heater.control_temp_c() else {
            self.fail(heater, FailReason::SensorInvalid);
            return;
        };
        let Some(target_c) = self.target_c else {
            self.fail(heater, FailReason::SensorInvalid);
            return;
        };

        let elapsed_s = now_ms.wrapping_sub(self.started_ms) / 1000;
        let timed_out = self.max_duration_s > 0 && elapsed_s >= self.max_duration_s;

        match self.stage.take() {
            Some(Stage::Probe(mut probe)) => {
                heater.install_override(target_c, probe.output_pct());
                self.last_output_pct = probe.output_pct();
                if timed_out {
                    self.fail(heater, FailReason::Timeout);
                    return;
                }
                match probe.step(now_ms, temp_c) {
                    ProbeStep::Pending => self.stage = Some(Stage::Probe(probe)),
                    ProbeStep::Detected { rate_c_per_min } => {
                        self.enter_tune(heater, target_c, rate_c_per_min, now_ms);
                    }
                    ProbeStep::Exhausted => self.fail(heater, FailReason::InsufficientResponse),
                }
            }
            Some(Stage::Tune { plan, mut relay }) => {
                let output = relay.step(now_ms, temp_c);
                heater.install_override(target_c, output);
                self.last_output_pct = output;
                self.last_cycles = relay.cycles();
                let osc = relay.oscillation();

                if timed_out {
                    // Best effort: keep what was identified so far.
                    if let Some(osc) = osc {
                        self.record(osc);
                    }
                    self.fail(heater, FailReason::Timeout);
                    return;
                }
                match osc {
                    Some(osc) if relay.cycles() >= plan.required_cycles && osc.quality >= QUALITY_THRESHOLD => {
                        self.record(osc);
                        self.finish(heater);
                    }
                    _ => self.stage = Some(Stage::Tune { plan, relay }),
                }
            }
            None => self.fail(heater, FailReason::SensorInvalid),
        }
    }

    fn enter_tune(&mut self, heater: &mut impl OverrideChannel, target_c: f32, rate: f32, now_ms: u32) {
        let plan = TunePlan::for_rate(rate).with_aggressiveness(self.options.aggressiveness, heater.max_output_pct());
        if self.max_duration_s == 0 {
            self.max_duration_s = plan.default_max_duration_s;
        }
        info!(
            "autotune: {} plant at {rate:.3} C/min; band {:.2} C, output {:.1}%, period {} ms, {} cycles",
            plan.class, plan.noise_band_c, plan.output_pct, plan.sample_period_ms, plan.required_cycles
        );
        let relay = RelayTuner::new(target_c, plan.noise_band_c, plan.output_pct, plan.sample_period_ms);
        self.last_output_pct = relay.output_pct();
        heater.install_override(target_c, relay.output_pct());
        self.plan = Some(plan);
        self.stage = Some(Stage::Tune { plan, relay });
        self.phase = AutotunePhase::TuneRunning;
        self.phase_started_ms = now_ms;
    }

    fn record(&mut self, osc: relay::Oscillation) {
        let rule = TuningRule::for_aggressiveness(self.options.aggressiveness);
        self.result = AutotuneResult {
            gains: rule.gains(osc.ku, osc.pu_s),
            ku: osc.ku,
            pu_s: osc.pu_s,
            quality: osc.quality,
            rule: Some(rule),
            valid: true,
        };
    }

    fn finish(&mut self, heater: &mut impl OverrideChannel) {
        self.phase = AutotunePhase::Finished;
        self.stage = None;
        self.result_id = self.result_id.wrapping_add(1);
        heater.release_override();
        let r = &self.result;
        info!(
            "autotune finished: Ku={:.3} Pu={:.1}s quality={:.2} kp={:.4} ki={:.5} kd={:.3}",
            r.ku, r.pu_s, r.quality, r.gains.kp, r.gains.ki, r.gains.kd
        );
    }

    fn fail(&mut self, heater: &mut impl OverrideChannel, reason: FailReason) {
        self.phase = AutotunePhase::Failed;
        self.stage = None;
        self.last_error = Some(reason);
        self.result_id = self.result_id.wrapping_add(1);
        heater.release_override();
        warn!("autotune failed: {reason}");
    }

    fn reset(&mut self, heater: &mut impl OverrideChannel) {
        let result_id = self.result_id;
        *self = Self::new();
        self.result_id = result_id;
        heater.release_override();
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn phase(&self) -> AutotunePhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase.is_running()
    }

    pub fn result(&self) -> &AutotuneResult {
        &self.result
    }

    pub fn result_id(&self) -> u32 {
        self.result_id
    }

    pub fn last_error(&self) -> Option<FailReason> {
        self.last_error
    }

    pub fn last_update_ms(&self) -> Option<u32> {
        self.last_update_ms
    }

    pub fn progress_pct(&self, now_ms: u32) -> u8 {
        match self.phase {
            AutotunePhase::ProbeRunning => {
                let elapsed = u64::from(now_ms.wrapping_sub(self.phase_started_ms));
                (elapsed * 20 / u64::from(PROBE_PROGRESS_SPAN_MS)).min(20) as u8
            }
            AutotunePhase::TuneRunning => {
                let required = self.plan.map_or(0, |p| u32::from(p.required_cycles));
                if required == 0 {
                    return 20;
                }
                20 + (u32::from(self.last_cycles) * 80 / required).min(80) as u8
            }
            AutotunePhase::Finished => 100,
            _ => 0,
        }
    }

    pub fn status(&self, now_ms: u32) -> AutotuneStatus {
        let elapsed_s = if self.phase == AutotunePhase::Idle {
            0
        } else {
            now_ms.wrapping_sub(self.started_ms) / 1000
        };
        AutotuneStatus {
            phase: self.phase,
            auto_save: self.options.auto_save,
            aggressiveness: self.options.aggressiveness,
            elapsed_s,
            last_update_ms: self.last_update_ms,
            detected_class: self.plan.map(|p| p.class),
            measured_rate_c_per_min: self.plan.map(|p| p.rate_c_per_min),
            target_c: self.target_c,
            output_pct: self.last_output_pct,
            noise_band_c: self.plan.map(|p| p.noise_band_c),
            sample_period_ms: self.plan.map(|p| p.sample_period_ms),
            required_cycles: self.plan.map(|p| p.required_cycles),
            cycles: self.last_cycles,
            max_duration_s: self.max_duration_s,
            last_error: self.last_error,
            progress_pct: self.progress_pct(now_ms),
            result_id: self.result_id,
            result: self.result,
        }
    }
}
