//! Heater configuration snapshot.
//!
//! All tunable parameters for the heater controller. The snapshot is
//! immutable during a tick and replaced wholesale by an explicit apply call;
//! the controller never accepts partial updates.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::mode::ControlMode;
use crate::pins;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ControlAlgorithm {
    #[default]
    Pid,
    Hysteresis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputType {
    Pwm,
    /// Time-proportioning window on a plain digital pin.
    #[default]
    Window,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InputPull {
    #[default]
    None,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActiveLevel {
    #[default]
    High,
    Low,
}

/// What to do when the external link times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LossPolicy {
    /// Disable heating and raise `LINK_TIMEOUT`.
    Off,
    #[default]
    FrostProtect,
    Idle,
    KeepLast,
}

/// Per-mode setpoints (°C).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Targets {
    pub idle_c: f32,
    pub charge_c: f32,
    pub discharge_c: f32,
    pub frost_c: f32,
}

impl Targets {
    /// Setpoint for a mode. Manual and fault fall back to the idle target.
    pub fn for_mode(&self, mode: ControlMode) -> f32 {
        match mode {
            ControlMode::Charge => self.charge_c,
            ControlMode::Discharge => self.discharge_c,
            ControlMode::FrostProtect => self.frost_c,
            ControlMode::Idle | ControlMode::Manual | ControlMode::Fault => self.idle_c,
        }
    }

    fn iter(&self) -> [f32; 4] {
        [self.idle_c, self.charge_c, self.discharge_c, self.frost_c]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidConfig {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Integral accumulator bound (°C·s), symmetric.
    pub integral_limit: f32,
    /// Derivative low-pass coefficient, 0 = unfiltered.
    pub deriv_filter: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HysteresisConfig {
    /// Turn on at `target - on_delta_c`.
    pub on_delta_c: f32,
    /// Turn off at `target + off_delta_c`.
    pub off_delta_c: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub kind: OutputType,
    pub invert: bool,
    pub pin: Option<u8>,
    pub pwm_freq_hz: u32,
    pub pwm_resolution_bits: u8,
    pub window_ms: u32,
    pub max_output_pct: f32,
    pub manual_output_pct: f32,
    pub min_on_ms: u32,
    pub min_off_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    pub max_temp_c: f32,
    /// Maximum plausible primary/secondary disagreement.
    pub max_delta_c: f32,
    pub stuck_on_pct: f32,
    pub stuck_on_s: u32,
    pub min_rise_c: f32,
    pub rise_window_s: u32,
    pub runaway_enabled: bool,
    pub runaway_rate_c_per_min: f32,
    pub runaway_window_s: u32,
    pub runaway_margin_c: f32,
    pub runaway_latch: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub loss_policy: LossPolicy,
    /// Use the externally supplied temperature when the primary sensor fails.
    pub temp_fallback: bool,
    /// Silence longer than this counts as link loss.
    pub timeout_s: u32,
    /// Externally supplied values older than this are ignored.
    pub value_max_age_s: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputConfig {
    pub pin: Option<u8>,
    /// Applied when the HAL pin is constructed; [`HalInputs`] only reads
    /// levels.
    ///
    /// [`HalInputs`]: crate::drivers::input::HalInputs
    pub pull: InputPull,
    pub active: ActiveLevel,
    pub debounce_ms: u16,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            pin: None,
            pull: InputPull::None,
            active: ActiveLevel::High,
            debounce_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InputsConfig {
    pub enable: InputConfig,
    pub mode: InputConfig,
    pub manual: InputConfig,
}

/// Complete controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaterConfig {
    pub enabled: bool,
    /// Mode requested at apply time.
    pub mode: ControlMode,
    pub frost_enabled: bool,
    pub targets: Targets,
    pub algorithm: ControlAlgorithm,
    pub pid: PidConfig,
    pub hysteresis: HysteresisConfig,
    pub output: OutputConfig,
    pub safety: SafetyConfig,
    pub link: LinkConfig,
    pub one_wire_pin: Option<u8>,
    pub inputs: InputsConfig,
}

impl Default for HeaterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: ControlMode::Idle,
            frost_enabled: true,
            targets: Targets {
                idle_c: 5.0,
                charge_c: 15.0,
                discharge_c: 15.0,
                frost_c: 2.0,
            },
            algorithm: ControlAlgorithm::Pid,
            pid: PidConfig {
                kp: 10.0,
                ki: 0.05,
                kd: 0.0,
                integral_limit: 30.0,
                deriv_filter: 0.1,
            },
            hysteresis: HysteresisConfig {
                on_delta_c: 1.0,
                off_delta_c: 0.5,
            },
            output: OutputConfig {
                kind: OutputType::Window,
                invert: false,
                pin: None,
                pwm_freq_hz: 1000,
                pwm_resolution_bits: 10,
                window_ms: 2000,
                max_output_pct: 100.0,
                manual_output_pct: 50.0,
                min_on_ms: 2000,
                min_off_ms: 2000,
            },
            safety: SafetyConfig {
                max_temp_c: 50.0,
                max_delta_c: 5.0,
                stuck_on_pct: 70.0,
                stuck_on_s: 300,
                min_rise_c: 1.0,
                rise_window_s: 300,
                runaway_enabled: true,
                runaway_rate_c_per_min: 5.0,
                runaway_window_s: 120,
                runaway_margin_c: 5.0,
                runaway_latch: true,
            },
            link: LinkConfig {
                loss_policy: LossPolicy::FrostProtect,
                temp_fallback: false,
                timeout_s: 60,
                value_max_age_s: 60,
            },
            one_wire_pin: None,
            inputs: InputsConfig::default(),
        }
    }
}

impl HeaterConfig {
    /// Output ceiling actually honoured by the output stage.
    pub fn output_ceiling_pct(&self) -> f32 {
        self.output.max_output_pct.clamp(0.0, 100.0)
    }

    /// Check pin assignments and target ordering.
    ///
    /// Targets are bounded above by `max_temp_c` only.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Some(out) = self.output.pin else {
            return Err(ConfigError::Invalid("output pin unassigned"));
        };
        if !pins::is_valid_output_pin(out) {
            return Err(ConfigError::Invalid("output pin not output-capable"));
        }
        if self.one_wire_pin.is_some_and(|p| !pins::is_valid_output_pin(p)) {
            return Err(ConfigError::Invalid("1-wire pin not output-capable"));
        }

        let inputs = [
            ("enable input pin invalid", self.inputs.enable.pin),
            ("mode input pin invalid", self.inputs.mode.pin),
            ("manual input pin invalid", self.inputs.manual.pin),
        ];
        for (rule, pin) in inputs {
            if pin.is_some_and(|p| !pins::is_valid_input_pin(p)) {
                return Err(ConfigError::Invalid(rule));
            }
        }

        if self.one_wire_pin == Some(out) {
            return Err(ConfigError::Invalid("output pin shared with 1-wire"));
        }
        if inputs.iter().any(|(_, pin)| *pin == Some(out)) {
            return Err(ConfigError::Invalid("output pin shared with an input"));
        }

        if self.targets.iter().iter().any(|t| *t > self.safety.max_temp_c) {
            return Err(ConfigError::Invalid("target above max temperature"));
        }
        Ok(())
    }
}
