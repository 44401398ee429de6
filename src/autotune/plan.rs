//! Tune-phase parameters derived from the probed rise rate.
//!
//! Rates are in °C/min at the probe output. Within each regime, `t` runs
//! from 0 at the lower rate bound to 1 at the upper one and every parameter
//! is interpolated linearly:
//!
//! | Regime | Rate range    | Sample period   | Noise band     | Output      | Cycles | Max duration |
//! |--------|---------------|-----------------|----------------|-------------|--------|--------------|
//! | fast   | 0.20 .. 0.60  | 2000 - 1000t ms | 0.25 - 0.10t   | 25 - 15t %  | 7      | 3600 s       |
//! | medium | 0.05 .. 0.20  | 5000 - 3000t ms | 0.40 - 0.15t   | 40 - 20t %  | 6      | 5400 s       |
//! | slow   | 0.01 .. 0.05  | 10000 - 5000t ms| 0.60 - 0.20t   | 60 - 30t %  | 5      | 9000 s       |

use core::fmt;
use core::str::FromStr;

use serde::Serialize;

use super::Aggressiveness;
use crate::mode::UnknownName;

const FAST_RATE: f32 = 0.20;
const FAST_RATE_CAP: f32 = 0.60;
const MEDIUM_RATE: f32 = 0.05;
const SLOW_RATE_MIN: f32 = 0.01;

const MIN_OUTPUT_PCT: f32 = 5.0;
const MIN_NOISE_BAND_C: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RateClass {
    Fast,
    Medium,
    Slow,
}

impl RateClass {
    pub fn classify(rate_c_per_min: f32) -> Self {
        if rate_c_per_min >= FAST_RATE {
            Self::Fast
        } else if rate_c_per_min >= MEDIUM_RATE {
            Self::Medium
        } else {
            Self::Slow
        }
    }
}

impl fmt::Display for RateClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fast => "FAST",
            Self::Medium => "MEDIUM",
            Self::Slow => "SLOW",
        })
    }
}

impl FromStr for RateClass {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("FAST") {
            Ok(Self::Fast)
        } else if s.eq_ignore_ascii_case("MEDIUM") {
            Ok(Self::Medium)
        } else if s.eq_ignore_ascii_case("SLOW") {
            Ok(Self::Slow)
        } else {
            Err(UnknownName)
        }
    }
}

/// Relay experiment parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TunePlan {
    pub class: RateClass,
    pub rate_c_per_min: f32,
    pub sample_period_ms: u32,
    pub noise_band_c: f32,
    /// Relay "high" output.
    pub output_pct: f32,
    pub required_cycles: u8,
    /// Regime default, used when the session did not set one.
    pub default_max_duration_s: u32,
}

fn lerp_t(rate: f32, lo: f32, hi: f32) -> f32 {
    (rate.clamp(lo, hi) - lo) / (hi - lo)
}

impl TunePlan {
    /// Regime parameters for a measured rate, before aggressiveness.
    pub fn for_rate(rate_c_per_min: f32) -> Self {
        let class = RateClass::classify(rate_c_per_min);
        let (period, band, output, cycles, max_s) = match class {
            RateClass::Fast => {
                let t = lerp_t(rate_c_per_min, FAST_RATE, FAST_RATE_CAP);
                (2000.0 - t * 1000.0, 0.25 - t * 0.10, 25.0 - t * 15.0, 7, 3600)
            }
            RateClass::Medium => {
                let t = lerp_t(rate_c_per_min, MEDIUM_RATE, FAST_RATE);
                (5000.0 - t * 3000.0, 0.40 - t * 0.15, 40.0 - t * 20.0, 6, 5400)
            }
            RateClass::Slow => {
                let t = lerp_t(rate_c_per_min, SLOW_RATE_MIN, MEDIUM_RATE);
                (10_000.0 - t * 5000.0, 0.60 - t * 0.20, 60.0 - t * 30.0, 5, 9000)
            }
        };
        Self {
            class,
            rate_c_per_min,
            sample_period_ms: period as u32,
            noise_band_c: band,
            output_pct: output,
            required_cycles: cycles,
            default_max_duration_s: max_s,
        }
    }

    /// Clamp output and band for the chosen aggressiveness and the heater's
    /// output ceiling.
    pub fn with_aggressiveness(mut self, aggr: Aggressiveness, max_output_pct: f32) -> Self {
        let (cap, band_scale) = match aggr {
            Aggressiveness::Conservative => (40.0, 1.25),
            Aggressiveness::Normal => (60.0, 1.0),
            Aggressiveness::Aggressive => (80.0, 0.85),
        };
        self.noise_band_c *= band_scale;

        // Fast plants overshoot hard at full relay amplitude.
        if self.rate_c_per_min >= 0.50 {
            self.output_pct = self.output_pct.min(15.0);
        } else if self.rate_c_per_min >= 0.30 {
            self.output_pct = self.output_pct.min(20.0);
        }

        self.output_pct = self.output_pct.min(max_output_pct.min(cap)).max(MIN_OUTPUT_PCT);
        self.noise_band_c = self.noise_band_c.max(MIN_NOISE_BAND_C);
        self
    }
}
