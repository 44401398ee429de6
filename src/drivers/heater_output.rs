//! Heater output drivers over embedded-hal.
//!
//! The controller computes the physical value (PWM duty in
//! `0..2^resolution` or a digital level, polarity already applied); these
//! drivers only move it onto the peripheral. Both are dumb actuators: the
//! safe state is enforced upstream.

use embedded_hal::digital::OutputPin;
use embedded_hal::pwm::SetDutyCycle;
use log::warn;

use crate::app::ports::HeaterActuator;

/// Heater on a PWM channel (MOSFET gate driven by LEDC or similar).
pub struct PwmHeater<P> {
    pwm: P,
    /// Controller-side full scale, `2^resolution - 1`.
    full_scale: u32,
    duty: u32,
}

impl<P: SetDutyCycle> PwmHeater<P> {
    pub fn new(pwm: P, resolution_bits: u8) -> Self {
        let bits = u32::from(resolution_bits.min(31));
        Self {
            pwm,
            full_scale: (1u32 << bits) - 1,
            duty: 0,
        }
    }

    /// Last duty written, in controller units.
    pub fn duty(&self) -> u32 {
        self.duty
    }

    fn apply(&mut self, duty: u32) {
        let duty = duty.min(self.full_scale);
        let hw_max = u64::from(self.pwm.max_duty_cycle());
        let scaled = if self.full_scale == 0 {
            0
        } else {
            (u64::from(duty) * hw_max / u64::from(self.full_scale)) as u16
        };
        if self.pwm.set_duty_cycle(scaled).is_err() {
            warn!("heater pwm: duty write failed");
        }
        self.duty = duty;
    }
}

impl<P: SetDutyCycle> HeaterActuator for PwmHeater<P> {
    fn write_duty(&mut self, duty: u32) {
        self.apply(duty);
    }

    fn write_level(&mut self, high: bool) {
        self.apply(if high { self.full_scale } else { 0 });
    }
}

/// Heater on a plain GPIO (SSR or relay), time-proportioned by the controller.
pub struct SwitchedHeater<O> {
    pin: O,
    high: bool,
}

impl<O: OutputPin> SwitchedHeater<O> {
    pub fn new(pin: O) -> Self {
        Self { pin, high: false }
    }

    pub fn is_high(&self) -> bool {
        self.high
    }
}

impl<O: OutputPin> HeaterActuator for SwitchedHeater<O> {
    fn write_duty(&mut self, duty: u32) {
        self.write_level(duty > 0);
    }

    fn write_level(&mut self, high: bool) {
        let res = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if res.is_err() {
            warn!("heater pin: write failed");
        }
        self.high = high;
    }
}
