//! Unified error types for the heater controller.
//!
//! Commands and configuration paths funnel into a single `Error` enum so the
//! service layer handles every rejection uniformly. All variants are `Copy`
//! so they can be returned from the control path without allocation.
//!
//! Safety faults are *not* errors: they are tracked as [`FaultKind`] bits in
//! a [`FaultMask`] by the fault supervisor and force the safe state.

use core::fmt;

// ── Top-level error ───────────────────────────────────────────

/// Every fallible operation in the controller funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Configuration is invalid or could not be loaded/stored.
    Config(ConfigError),
    /// A runtime command was rejected.
    Command(CommandError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Command(e) => write!(f, "command: {e}"),
        }
    }
}

impl core::error::Error for Error {}

// ── Configuration errors ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A validity rule failed; the string names the rule.
    Invalid(&'static str),
    /// No configuration found in the store.
    NotFound,
    /// Stored blob failed to deserialize.
    Corrupted,
    /// The store could not be written.
    Io,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(rule) => write!(f, "invalid: {rule}"),
            Self::NotFound => write!(f, "not found"),
            Self::Corrupted => write!(f, "corrupted"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ── Command errors ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Percentage or duration out of range.
    OutOfRange,
    /// An external override currently owns the heater.
    OverrideActive,
    /// A fault (active or latched) is present.
    Faulted,
    /// Heater is not enabled.
    Disabled,
    /// No valid control temperature.
    NoValidTemperature,
    /// An autotune session is already running.
    AutotuneRunning,
    /// No autotune session is running.
    AutotuneNotRunning,
    /// Session is not in a terminal state.
    AutotuneNotFinished,
    /// Session did not finish with a valid result.
    NoValidResult,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "argument out of range"),
            Self::OverrideActive => write!(f, "override active"),
            Self::Faulted => write!(f, "fault present"),
            Self::Disabled => write!(f, "heater disabled"),
            Self::NoValidTemperature => write!(f, "no valid control temperature"),
            Self::AutotuneRunning => write!(f, "autotune already running"),
            Self::AutotuneNotRunning => write!(f, "autotune not running"),
            Self::AutotuneNotFinished => write!(f, "autotune not in a terminal state"),
            Self::NoValidResult => write!(f, "no valid autotune result"),
        }
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Self::Command(e)
    }
}

// ── Safety faults ─────────────────────────────────────────────

/// Independent fault conditions supervised every tick.
///
/// Each kind owns one bit in a [`FaultMask`]; the discriminant is the bit
/// index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum FaultKind {
    OverTemp = 0,
    SensorPrimaryFail = 1,
    PlausibilityFail = 2,
    StuckOnNoHeat = 3,
    ThermalRunaway = 4,
    LinkTimeout = 5,
    ConfigInvalid = 6,
}

impl FaultKind {
    pub const ALL: [FaultKind; 7] = [
        Self::OverTemp,
        Self::SensorPrimaryFail,
        Self::PlausibilityFail,
        Self::StuckOnNoHeat,
        Self::ThermalRunaway,
        Self::LinkTimeout,
        Self::ConfigInvalid,
    ];

    /// Return the bitmask for this fault.
    pub const fn mask(self) -> u32 {
        1 << (self as u8)
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OverTemp => "OVER_TEMP",
            Self::SensorPrimaryFail => "SENSOR_PRIMARY_FAIL",
            Self::PlausibilityFail => "PLAUSIBILITY_FAIL",
            Self::StuckOnNoHeat => "STUCK_ON_NO_HEAT",
            Self::ThermalRunaway => "THERMAL_RUNAWAY",
            Self::LinkTimeout => "LINK_TIMEOUT",
            Self::ConfigInvalid => "CONFIG_INVALID",
        };
        f.write_str(name)
    }
}

/// Bitset over [`FaultKind`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct FaultMask(u32);

impl FaultMask {
    pub const EMPTY: Self = Self(0);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, kind: FaultKind) -> bool {
        self.0 & kind.mask() != 0
    }

    pub fn insert(&mut self, kind: FaultKind) {
        self.0 |= kind.mask();
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Iterate the kinds set in this mask, lowest bit first.
    pub fn iter(self) -> impl Iterator<Item = FaultKind> {
        FaultKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl fmt::Display for FaultMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        for (i, kind) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{kind}")?;
        }
        Ok(())
    }
}

// ── Convenience Result alias ──────────────────────────────────

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
