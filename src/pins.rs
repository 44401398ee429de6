//! GPIO capability map for the ESP32 heater board.
//!
//! Single source of truth for which pin numbers may be assigned to the heater
//! output, the 1-Wire bus, and the three switch inputs. Configuration
//! validation consults these tables; an invalid assignment raises
//! `CONFIG_INVALID`.

/// Highest GPIO number that exists on the chip.
pub const MAX_GPIO: u8 = 39;

/// Pin numbers inside `0..=MAX_GPIO` that are not bonded out.
const MISSING_GPIOS: [u8; 6] = [20, 24, 28, 29, 30, 31];

/// SPI flash pins. Touching these bricks the module.
const FLASH_GPIOS: [u8; 6] = [6, 7, 8, 9, 10, 11];

/// Boot strapping pins. A heater or switch on these can change boot mode.
const STRAPPING_GPIOS: [u8; 6] = [0, 2, 4, 5, 12, 15];

/// GPIOs at or above this number are input-only.
const FIRST_INPUT_ONLY_GPIO: u8 = 34;

fn is_valid_gpio(pin: u8) -> bool {
    pin <= MAX_GPIO && !MISSING_GPIOS.contains(&pin) && !FLASH_GPIOS.contains(&pin)
}

pub fn is_strapping_pin(pin: u8) -> bool {
    STRAPPING_GPIOS.contains(&pin)
}

/// Pin may be used for a switch input.
pub fn is_valid_input_pin(pin: u8) -> bool {
    is_valid_gpio(pin) && !is_strapping_pin(pin)
}

/// Pin may drive the heater or the 1-Wire bus.
pub fn is_valid_output_pin(pin: u8) -> bool {
    is_valid_input_pin(pin) && pin < FIRST_INPUT_ONLY_GPIO
}
