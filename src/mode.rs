//! Operating modes, the mode-cycle switch, and mode resolution.
//!
//! The effective mode is resolved from the requested mode through an ordered
//! list of override rules. Rules are evaluated highest precedence first and
//! the first rule that yields a mode wins:
//!
//! | Order | Rule        | Yields                                          |
//! |-------|-------------|-------------------------------------------------|
//! | 1     | `link_loss` | policy mode while the link is timed out         |
//! | 2     | `manual`    | `Manual` while the manual switch is active      |
//! | 3     | `external`  | the externally supplied mode, when valid        |
//! | -     | (base)      | the requested / cycled mode                     |
//!
//! The winning mode is then normalised: `FrostProtect` falls back to `Idle`
//! when frost protection is disabled.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::LossPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ControlMode {
    #[default]
    Idle = 0,
    Charge = 1,
    Discharge = 2,
    FrostProtect = 3,
    Manual = 4,
    Fault = 5,
}

impl ControlMode {
    /// Next mode for a rising edge on the mode-cycle switch.
    pub fn cycled(self, frost_enabled: bool) -> Self {
        match self {
            Self::Idle => Self::Charge,
            Self::Charge => Self::Discharge,
            Self::Discharge if frost_enabled => Self::FrostProtect,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "IDLE",
            Self::Charge => "CHARGE",
            Self::Discharge => "DISCHARGE",
            Self::FrostProtect => "FROST_PROTECT",
            Self::Manual => "MANUAL",
            Self::Fault => "FAULT",
        })
    }
}

/// Error returned when a name does not match any known variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownName;

impl fmt::Display for UnknownName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown name")
    }
}

impl FromStr for ControlMode {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let eq = |name: &str| s.eq_ignore_ascii_case(name);
        if eq("IDLE") {
            Ok(Self::Idle)
        } else if eq("CHARGE") {
            Ok(Self::Charge)
        } else if eq("DISCHARGE") {
            Ok(Self::Discharge)
        } else if eq("FROST") || eq("FROST_PROTECT") {
            Ok(Self::FrostProtect)
        } else if eq("MANUAL") {
            Ok(Self::Manual)
        } else if eq("FAULT") {
            Ok(Self::Fault)
        } else {
            Err(UnknownName)
        }
    }
}

/// Role a temperature sensor plays for the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorRole {
    BatteryPrimary,
    BatterySecondary,
    Ambient,
}

impl fmt::Display for SensorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BatteryPrimary => "battery_primary",
            Self::BatterySecondary => "battery_secondary",
            Self::Ambient => "ambient",
        })
    }
}

impl FromStr for SensorRole {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let eq = |name: &str| s.eq_ignore_ascii_case(name);
        if eq("battery_primary") || eq("primary") {
            Ok(Self::BatteryPrimary)
        } else if eq("battery_secondary") || eq("secondary") {
            Ok(Self::BatterySecondary)
        } else if eq("ambient") {
            Ok(Self::Ambient)
        } else {
            Err(UnknownName)
        }
    }
}

// ── Mode resolution ───────────────────────────────────────────

/// Everything the override rules look at, captured once per tick.
#[derive(Debug, Clone, Copy)]
pub struct ModeInputs {
    pub requested: ControlMode,
    pub external: Option<ControlMode>,
    pub manual_active: bool,
    pub link_timed_out: bool,
    pub loss_policy: LossPolicy,
    pub frost_enabled: bool,
}

/// A single override rule: returns `Some(mode)` to claim the tick.
pub type ModeRule = fn(&ModeInputs) -> Option<ControlMode>;

/// Override rules, highest precedence first.
pub const MODE_RULES: [(&str, ModeRule); 3] = [
    ("link_loss", link_loss_rule),
    ("manual", manual_rule),
    ("external", external_rule),
];

fn link_loss_rule(inputs: &ModeInputs) -> Option<ControlMode> {
    if !inputs.link_timed_out {
        return None;
    }
    match inputs.loss_policy {
        LossPolicy::Idle => Some(ControlMode::Idle),
        LossPolicy::FrostProtect => Some(ControlMode::FrostProtect),
        // Off raises a fault instead; KeepLast leaves the mode alone.
        LossPolicy::Off | LossPolicy::KeepLast => None,
    }
}

fn manual_rule(inputs: &ModeInputs) -> Option<ControlMode> {
    inputs.manual_active.then_some(ControlMode::Manual)
}

fn external_rule(inputs: &ModeInputs) -> Option<ControlMode> {
    inputs.external
}

/// Resolve the effective operating mode.
pub fn resolve_mode(inputs: &ModeInputs) -> ControlMode {
    let mode = MODE_RULES
        .iter()
        .find_map(|(_, rule)| rule(inputs))
        .unwrap_or(inputs.requested);

    if mode == ControlMode::FrostProtect && !inputs.frost_enabled {
        ControlMode::Idle
    } else {
        mode
    }
}
