//! Debounced switch inputs.
//!
//! ## Hardware
//!
//! Three optional maintained switches: heater enable, mode cycle, and manual
//! override. Each has its own pin, pull, active level and debounce time.
//! The raw level is sampled once per control tick through the
//! [`InputPort`]; `update()` runs the debounce state machine.
//!
//! | Input  | Effect while active                          |
//! |--------|----------------------------------------------|
//! | enable | heater may run (absent switch = always on)   |
//! | mode   | rising edge advances the requested mode      |
//! | manual | forces `MANUAL` mode                         |

use embedded_hal::digital::InputPin;
use log::warn;

use crate::app::ports::{InputId, InputPort};
use crate::config::{ActiveLevel, InputConfig};

/// One software-debounced digital input.
#[derive(Debug, Clone)]
pub struct DebouncedInput {
    config: InputConfig,
    /// Debounced raw level; `None` until the first sample.
    stable_level: Option<bool>,
    last_level: bool,
    last_change_ms: u32,
}

impl DebouncedInput {
    pub fn new(config: InputConfig) -> Self {
        Self {
            config,
            stable_level: None,
            last_level: false,
            last_change_ms: 0,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.pin.is_some()
    }

    /// Feed the current raw pin level. Unconfigured inputs ignore it.
    pub fn update(&mut self, raw_level: bool, now_ms: u32) {
        if !self.is_configured() {
            return;
        }
        let Some(stable) = self.stable_level else {
            // First sample seeds the filter without an edge.
            self.stable_level = Some(raw_level);
            self.last_level = raw_level;
            self.last_change_ms = now_ms;
            return;
        };

        if raw_level != self.last_level {
            self.last_level = raw_level;
            self.last_change_ms = now_ms;
        }
        let settled = now_ms.wrapping_sub(self.last_change_ms) >= u32::from(self.config.debounce_ms);
        if settled && raw_level != stable {
            self.stable_level = Some(raw_level);
        }
    }

    /// Debounced logical state, polarity applied. Unconfigured reads inactive.
    pub fn is_active(&self) -> bool {
        let Some(level) = self.stable_level.filter(|_| self.is_configured()) else {
            return false;
        };
        match self.config.active {
            ActiveLevel::High => level,
            ActiveLevel::Low => !level,
        }
    }
}

/// Debounced state of all three switches, as reported in status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct InputStates {
    pub enable: bool,
    pub mode: bool,
    pub manual: bool,
}

/// The three switch inputs plus mode-switch edge memory.
#[derive(Debug, Clone)]
pub struct InputBank {
    enable: DebouncedInput,
    mode: DebouncedInput,
    manual: DebouncedInput,
    mode_was_active: bool,
}

impl InputBank {
    pub fn new(enable: InputConfig, mode: InputConfig, manual: InputConfig) -> Self {
        Self {
            enable: DebouncedInput::new(enable),
            mode: DebouncedInput::new(mode),
            manual: DebouncedInput::new(manual),
            mode_was_active: false,
        }
    }

    /// Swap in new input settings. The debouncers start over but the
    /// mode-switch edge memory is kept, so a held switch is not read as a
    /// fresh press.
    pub fn reconfigure(&mut self, enable: InputConfig, mode: InputConfig, manual: InputConfig) {
        let mode_was_active = self.mode_was_active;
        *self = Self::new(enable, mode, manual);
        self.mode_was_active = mode_was_active;
    }

    /// Sample every configured input. Returns `true` on a rising edge of
    /// the debounced mode switch.
    pub fn update(&mut self, port: &mut impl InputPort, now_ms: u32) -> bool {
        for (id, input) in [
            (InputId::Enable, &mut self.enable),
            (InputId::Mode, &mut self.mode),
            (InputId::Manual, &mut self.manual),
        ] {
            if input.is_configured() {
                input.update(port.read_level(id), now_ms);
            }
        }

        let mode_active = self.mode.is_active();
        let rising = mode_active && !self.mode_was_active;
        self.mode_was_active = mode_active;
        rising
    }

    /// Enable switch permits heating (an absent switch always permits).
    pub fn enable_permits(&self) -> bool {
        !self.enable.is_configured() || self.enable.is_active()
    }

    pub fn manual_active(&self) -> bool {
        self.manual.is_active()
    }

    pub fn states(&self) -> InputStates {
        InputStates {
            enable: self.enable.is_active(),
            mode: self.mode.is_active(),
            manual: self.manual.is_active(),
        }
    }
}

// ── embedded-hal adapter ──────────────────────────────────────

/// [`InputPort`] over three optional embedded-hal input pins.
///
/// Pull resistors are configured by whoever constructs the pins; a read
/// error is logged and reported as a low level.
pub struct HalInputs<E, M, U> {
    enable: Option<E>,
    mode: Option<M>,
    manual: Option<U>,
}

impl<E: InputPin, M: InputPin, U: InputPin> HalInputs<E, M, U> {
    pub fn new(enable: Option<E>, mode: Option<M>, manual: Option<U>) -> Self {
        Self {
            enable,
            mode,
            manual,
        }
    }
}

fn read_pin(pin: Option<&mut impl InputPin>, id: InputId) -> bool {
    let Some(pin) = pin else {
        return false;
    };
    pin.is_high().unwrap_or_else(|_| {
        warn!("input {id:?}: pin read failed");
        false
    })
}

impl<E: InputPin, M: InputPin, U: InputPin> InputPort for HalInputs<E, M, U> {
    fn read_level(&mut self, input: InputId) -> bool {
        match input {
            InputId::Enable => read_pin(self.enable.as_mut(), input),
            InputId::Mode => read_pin(self.mode.as_mut(), input),
            InputId::Manual => read_pin(self.manual.as_mut(), input),
        }
    }
}
