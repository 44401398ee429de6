//! Ultimate-gain tuning rules.
//!
//! | Rule                          | kp         | Ti       | Td        | kd           |
//! |-------------------------------|------------|----------|-----------|--------------|
//! | Tyreus-Luyben                 | Ku / 2.2   | 2.2 Pu   | Pu / 6.3  | 0.7 kp Td    |
//! | Ziegler-Nichols               | 0.6 Ku     | 0.5 Pu   | 0.125 Pu  | kp Td        |
//! | Ziegler-Nichols (aggressive)  | 0.8 Ku     | 0.4 Pu   | 0.15 Pu   | kp Td        |
//!
//! In every rule `ki = kp / Ti`.

use core::fmt;

use serde::Serialize;

use super::Aggressiveness;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TuningRule {
    TyreusLuyben,
    ZieglerNichols,
    ZieglerNicholsAggressive,
}

/// Derived controller gains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl TuningRule {
    pub fn for_aggressiveness(aggr: Aggressiveness) -> Self {
        match aggr {
            Aggressiveness::Conservative => Self::TyreusLuyben,
            Aggressiveness::Normal => Self::ZieglerNichols,
            Aggressiveness::Aggressive => Self::ZieglerNicholsAggressive,
        }
    }

    /// Map ultimate gain `ku` and ultimate period `pu_s` to gains.
    pub fn gains(self, ku: f32, pu_s: f32) -> PidGains {
        let (kp, ti, td, kd_scale) = match self {
            Self::TyreusLuyben => (ku / 2.2, 2.2 * pu_s, pu_s / 6.3, 0.7),
            Self::ZieglerNichols => (0.6 * ku, 0.5 * pu_s, 0.125 * pu_s, 1.0),
            Self::ZieglerNicholsAggressive => (0.8 * ku, 0.4 * pu_s, 0.15 * pu_s, 1.0),
        };
        PidGains {
            kp,
            ki: kp / ti,
            kd: kp * td * kd_scale,
        }
    }
}

impl fmt::Display for TuningRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TyreusLuyben => "Tyreus-Luyben",
            Self::ZieglerNichols => "Ziegler-Nichols",
            Self::ZieglerNicholsAggressive => "Ziegler-Nichols (aggressive)",
        })
    }
}
