//! Deadband bang-bang control.

use crate::config::HysteresisConfig;

#[derive(Debug, Clone, Copy, Default)]
pub struct Hysteresis {
    on: bool,
}

impl Hysteresis {
    /// Turn on at `target - on_delta`, off at `target + off_delta`.
    pub fn update(&mut self, cfg: &HysteresisConfig, target_c: f32, temp_c: f32) -> bool {
        if !self.on && temp_c <= target_c - cfg.on_delta_c {
            self.on = true;
        } else if self.on && temp_c >= target_c + cfg.off_delta_c {
            self.on = false;
        }
        self.on
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn reset(&mut self) {
        self.on = false;
    }
}
