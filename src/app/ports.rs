//! Port traits: the hexagonal boundary between the heater core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ HeaterService (domain)
//! ```
//!
//! Driven adapters (sensor bus, external link, switches, heater output,
//! config storage, event sinks) implement these traits. The
//! [`HeaterService`](super::service::HeaterService) and the
//! [`HeaterController`](crate::control::heater::HeaterController) consume
//! them via generics, so the domain core never touches hardware directly.

use crate::config::HeaterConfig;
use crate::error::ConfigError;
use crate::mode::{ControlMode, SensorRole};

// ───────────────────────────────────────────────────────────────
// Temperature source (driven adapter: sensor bus → domain)
// ───────────────────────────────────────────────────────────────

/// Validated temperature readings, owned by the sensor bus manager.
pub trait TemperatureSource {
    /// Latest valid reading for a role, `None` if absent or invalid.
    fn role_temp_c(&self, role: SensorRole) -> Option<f32>;

    /// Timestamp of the last bus rescan, if any.
    fn last_scan_ms(&self) -> Option<u32>;

    /// Timestamp of the last completed conversion, if any.
    fn last_update_ms(&self) -> Option<u32>;
}

// ───────────────────────────────────────────────────────────────
// External link (driven adapter: BMS message bus → domain)
// ───────────────────────────────────────────────────────────────

/// Externally supplied mode and temperature, with loss detection.
///
/// Accessors return `None` when the value is missing or outside its own
/// validity window.
pub trait ExternalLink {
    fn external_mode(&self, now_ms: u32) -> Option<ControlMode>;

    fn external_temp_c(&self, now_ms: u32) -> Option<f32>;

    /// The link has been silent for longer than its timeout.
    fn is_timed_out(&self, now_ms: u32) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Switch inputs (driven adapter: GPIO → domain)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputId {
    Enable,
    Mode,
    Manual,
}

/// Raw pin levels for the three switch inputs. Debouncing and polarity
/// are handled by the core.
pub trait InputPort {
    fn read_level(&mut self, input: InputId) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Heater actuator (driven adapter: domain → PWM / GPIO)
// ───────────────────────────────────────────────────────────────

/// Write-side port for the heater output stage.
///
/// Values arrive fully computed: resolution scaling and polarity inversion
/// have already been applied.
pub trait HeaterActuator {
    /// PWM duty in `0..=2^resolution - 1`.
    fn write_duty(&mut self, duty: u32);

    /// Digital level for time-proportioned output.
    fn write_level(&mut self, high: bool);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`HeaterEvent`](super::events::HeaterEvent)s
/// through this port. Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::HeaterEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the heater configuration.
///
/// Implementations MUST validate before persisting: an invalid snapshot is
/// rejected with [`ConfigError::Invalid`], never silently clamped.
pub trait ConfigPort {
    fn load(&self) -> Result<HeaterConfig, ConfigError>;

    fn save(&self, config: &HeaterConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Override channel (controller ↔ autotune)
// ───────────────────────────────────────────────────────────────

/// The only way the autotune engine may influence the heater.
///
/// Read accessors expose what a session needs for its preconditions;
/// `install_override` / `release_override` hand control authority over and
/// back.
pub trait OverrideChannel {
    fn enabled_effective(&self) -> bool;

    /// Any fault bit, active or latched.
    fn is_faulted(&self) -> bool;

    /// Current control temperature, `None` when invalid.
    fn control_temp_c(&self) -> Option<f32>;

    fn target_c(&self) -> f32;

    fn max_temp_c(&self) -> f32;

    fn max_output_pct(&self) -> f32;

    fn install_override(&mut self, target_c: f32, output_pct: f32);

    fn release_override(&mut self);
}
