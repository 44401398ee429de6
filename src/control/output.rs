//! Heater output stage.
//!
//! Turns a requested percentage into a physical drive value:
//!
//! 1. clamp to `[0, min(max_output_pct, 100)]`
//! 2. minimum on/off hold times on enable transitions
//! 3. startup ramp after a mode or target change (automatic control only)
//! 4. PWM duty (resolution and polarity aware) or time-proportioning window
//!
//! `heater_on` reports the logical heater state, before polarity inversion.

use crate::config::{OutputConfig, OutputType};

/// Output cap at the start of the ramp (or `max_output_pct` if lower).
pub const HEAT_START_PCT: f32 = 20.0;
/// Ramp duration after a mode change.
pub const HEAT_RAMP_MS: u32 = 60_000;

/// Physical value for the heater actuator, polarity applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drive {
    Duty(u32),
    Level(bool),
}

/// Whether the startup ramp may shape this tick's output.
#[derive(Debug, Clone, Copy)]
pub struct RampGate {
    /// Time since the last mode change, if one happened.
    pub since_mode_change_ms: Option<u32>,
    /// PID control or an external override; not manual, not output test.
    pub automatic: bool,
}

fn max_duty(resolution_bits: u8) -> u32 {
    (1u32 << u32::from(resolution_bits.min(31))) - 1
}

pub fn clamp_pct(cfg: &OutputConfig, pct: f32) -> f32 {
    let ceiling = cfg.max_output_pct.clamp(0.0, 100.0);
    if pct.is_nan() {
        return 0.0;
    }
    pct.clamp(0.0, ceiling)
}

#[derive(Debug, Clone)]
pub struct OutputStage {
    /// Logical enable state used for the hold timers.
    enabled: bool,
    applied_pct: f32,
    last_change_ms: u32,
    window_start_ms: u32,
    heater_on: bool,
}

impl OutputStage {
    /// Hold timers count from construction.
    pub fn new(now_ms: u32) -> Self {
        Self {
            enabled: false,
            applied_pct: 0.0,
            last_change_ms: now_ms,
            window_start_ms: now_ms,
            heater_on: false,
        }
    }

    pub fn applied_pct(&self) -> f32 {
        self.applied_pct
    }

    pub fn heater_on(&self) -> bool {
        self.heater_on
    }

    pub fn update(&mut self, cfg: &OutputConfig, now_ms: u32, desired_pct: f32, ramp: RampGate) -> Drive {
        let mut pct = clamp_pct(cfg, desired_pct);
        let mut request = pct > 0.0;
        let since_change = now_ms.wrapping_sub(self.last_change_ms);

        if !self.enabled && request && since_change < cfg.min_off_ms {
            pct = 0.0;
            request = false;
        } else if self.enabled && !request && since_change < cfg.min_on_ms {
            pct = self.applied_pct;
            request = pct > 0.0;
        }

        if request != self.enabled {
            self.enabled = request;
            self.last_change_ms = now_ms;
        }

        if request && ramp.automatic {
            if let Some(elapsed) = ramp.since_mode_change_ms.filter(|e| *e < HEAT_RAMP_MS) {
                let ceiling = cfg.max_output_pct.clamp(0.0, 100.0);
                let start = ceiling.min(HEAT_START_PCT);
                let t = elapsed as f32 / HEAT_RAMP_MS as f32;
                pct = pct.min(start + (ceiling - start) * t);
            }
        }

        self.applied_pct = pct;
        self.drive(cfg, now_ms)
    }

    /// Safe state: output off now, bypassing the minimum-on hold.
    pub fn force_off(&mut self, cfg: &OutputConfig, now_ms: u32) -> Drive {
        if self.enabled {
            self.enabled = false;
            self.last_change_ms = now_ms;
        }
        self.applied_pct = 0.0;
        self.drive(cfg, now_ms)
    }

    fn drive(&mut self, cfg: &OutputConfig, now_ms: u32) -> Drive {
        let pct = self.applied_pct;
        match cfg.kind {
            OutputType::Pwm => {
                let full = max_duty(cfg.pwm_resolution_bits);
                let duty = if pct <= 0.0 {
                    0
                } else {
                    ((pct / 100.0) * full as f32) as u32
                };
                self.heater_on = duty > 0;
                Drive::Duty(if cfg.invert { full - duty } else { duty })
            }
            OutputType::Window => {
                let on = if pct <= 0.0 {
                    false
                } else if pct >= 100.0 {
                    true
                } else {
                    if now_ms.wrapping_sub(self.window_start_ms) >= cfg.window_ms {
                        self.window_start_ms = now_ms;
                    }
                    let on_ms = (cfg.window_ms as f32 * (pct / 100.0)) as u32;
                    now_ms.wrapping_sub(self.window_start_ms) < on_ms
                };
                self.heater_on = on;
                Drive::Level(on != cfg.invert)
            }
        }
    }
}
