//! PID controller for heater output.
//!
//! Proportional-integral-derivative on a lookahead-predicted temperature:
//! the filtered temperature slope is projected a fixed horizon ahead so the
//! heater backs off before the pack overshoots. Conditional integration
//! prevents windup while the output is saturated.

use crate::config::PidConfig;

/// Weight of the previous slope estimate in the slope low-pass.
const SLOPE_FILTER: f32 = 0.85;
/// Horizon for the predicted temperature.
const LOOKAHEAD_S: f32 = 20.0;
/// Maximum deviation of the prediction from the measured temperature.
const LOOKAHEAD_MAX_DELTA_C: f32 = 2.0;
/// Time step used on the first evaluation or a non-positive delta.
const NOMINAL_DT_S: f32 = 0.1;

/// PID controller state. Gains live in the configuration snapshot.
#[derive(Debug, Clone, Default)]
pub struct PidController {
    integral: f32,
    last_error: f32,
    filtered_deriv: f32,
    last_temp_c: Option<f32>,
    slope_c_per_s: f32,
    last_update_ms: Option<u32>,
}

impl PidController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp of the last evaluation, `None` after a reset.
    pub fn last_update_ms(&self) -> Option<u32> {
        self.last_update_ms
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    /// Re-bound the accumulator after a limit change.
    pub fn clamp_integral(&mut self, limit: f32) {
        let limit = limit.abs();
        self.integral = self.integral.clamp(-limit, limit);
    }

    /// Compute the raw (unclamped) output for `temp_c` against `target_c`.
    ///
    /// `ceiling_pct` is the output stage limit; it only decides whether the
    /// integral may accumulate this step.
    pub fn compute(
        &mut self,
        gains: &PidConfig,
        ceiling_pct: f32,
        now_ms: u32,
        target_c: f32,
        temp_c: f32,
    ) -> f32 {
        let dt = match self.last_update_ms {
            Some(last) => now_ms.wrapping_sub(last) as f32 / 1000.0,
            None => 0.0,
        };
        let dt = if dt > 0.0 { dt } else { NOMINAL_DT_S };
        self.last_update_ms = Some(now_ms);

        // Slope estimate
        match self.last_temp_c {
            Some(last) => {
                let raw = (temp_c - last) / dt;
                self.slope_c_per_s = self.slope_c_per_s * SLOPE_FILTER + raw * (1.0 - SLOPE_FILTER);
            }
            None => self.slope_c_per_s = 0.0,
        }
        self.last_temp_c = Some(temp_c);

        let lookahead = (self.slope_c_per_s * LOOKAHEAD_S)
            .clamp(-LOOKAHEAD_MAX_DELTA_C, LOOKAHEAD_MAX_DELTA_C);
        let error = target_c - (temp_c + lookahead);

        // Derivative
        let deriv = (error - self.last_error) / dt;
        self.last_error = error;
        self.filtered_deriv =
            self.filtered_deriv * gains.deriv_filter + deriv * (1.0 - gains.deriv_filter);

        let p = gains.kp * error;
        let d = gains.kd * self.filtered_deriv;
        let output = p + gains.ki * self.integral + d;

        // Conditional integration: skip when saturated and the error pushes
        // further into the limit.
        let clamped = output.clamp(0.0, ceiling_pct);
        let at_high = clamped >= ceiling_pct && output > clamped;
        let at_low = clamped <= 0.0 && output < clamped;
        if (at_high && error > 0.0) || (at_low && error < 0.0) {
            return output;
        }

        let limit = gains.integral_limit.abs();
        self.integral = (self.integral + error * dt).clamp(-limit, limit);
        p + gains.ki * self.integral + d
    }

    /// Reset controller state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gains() -> PidConfig {
        PidConfig {
            kp: 10.0,
            ki: 0.05,
            kd: 0.0,
            integral_limit: 30.0,
            deriv_filter: 0.1,
        }
    }

    #[test]
    fn first_step_uses_nominal_dt() {
        let mut pid = PidController::new();
        let out = pid.compute(&gains(), 100.0, 1000, 10.0, 9.0);
        // P = 10, I = 0.05 * (1.0 * 0.1)
        assert!((out - 10.005).abs() < 1e-4);
        assert!((pid.integral() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn rising_temperature_reduces_output() {
        let mut steady = PidController::new();
        let mut rising = PidController::new();
        for i in 0..10u32 {
            steady.compute(&gains(), 100.0, i * 250, 10.0, 8.0);
            rising.compute(&gains(), 100.0, i * 250, 10.0, 8.0 + i as f32 * 0.05);
        }
        let a = steady.compute(&gains(), 100.0, 2500, 10.0, 8.0);
        let b = rising.compute(&gains(), 100.0, 2500, 10.0, 8.5);
        assert!(b < a);
    }

    #[test]
    fn lookahead_is_clamped() {
        let mut pid = PidController::new();
        let g = PidConfig { ki: 0.0, ..gains() };
        pid.compute(&g, 100.0, 0, 20.0, 0.0);
        // 10 °C in one second: slope projection far beyond the clamp.
        let out = pid.compute(&g, 100.0, 1000, 20.0, 10.0);
        assert!((out - 10.0 * (20.0 - 12.0)).abs() < 1e-3);
    }

    #[test]
    fn integral_frozen_while_saturated_high() {
        let mut pid = PidController::new();
        pid.compute(&gains(), 50.0, 0, 40.0, 0.0);
        let before = pid.integral();
        for i in 1..20u32 {
            pid.compute(&gains(), 50.0, i * 250, 40.0, 0.0);
        }
        assert_eq!(pid.integral(), before);
    }

    #[test]
    fn integral_respects_limit() {
        let mut pid = PidController::new();
        let g = PidConfig {
            kp: 0.0,
            ki: 0.001,
            integral_limit: 2.0,
            ..gains()
        };
        for i in 0..200u32 {
            pid.compute(&g, 100.0, i * 1000, 10.0, 0.0);
        }
        assert!(pid.integral() <= 2.0);
        pid.clamp_integral(1.0);
        assert_eq!(pid.integral(), 1.0);
    }

    #[test]
    fn reset_clears_state() {
        let mut pid = PidController::new();
        pid.compute(&gains(), 100.0, 0, 10.0, 5.0);
        pid.reset();
        assert_eq!(pid.integral(), 0.0);
        assert_eq!(pid.last_update_ms(), None);
    }
}
