//! Mock hardware adapters for integration tests.
//!
//! Records every heater write so tests can assert on the drive history
//! without touching real GPIO/PWM registers.

use frostguard::app::events::HeaterEvent;
use frostguard::app::ports::{EventSink, ExternalLink, HeaterActuator, InputId, InputPort, TemperatureSource};
use frostguard::config::HeaterConfig;
use frostguard::mode::{ControlMode, SensorRole};

// ── Temperatures ──────────────────────────────────────────────

/// Sensor bus stand-in. `set_primary` also stamps a fresh conversion.
#[derive(Debug, Default)]
pub struct MockTemps {
    pub primary: Option<f32>,
    pub secondary: Option<f32>,
    pub updated_ms: Option<u32>,
    pub scan_ms: Option<u32>,
}

#[allow(dead_code)]
impl MockTemps {
    pub fn at(primary: f32) -> Self {
        Self {
            primary: Some(primary),
            ..Self::default()
        }
    }

    pub fn set_primary(&mut self, temp_c: f32, now_ms: u32) {
        self.primary = Some(temp_c);
        self.updated_ms = Some(now_ms);
    }
}

impl TemperatureSource for MockTemps {
    fn role_temp_c(&self, role: SensorRole) -> Option<f32> {
        match role {
            SensorRole::BatteryPrimary => self.primary,
            SensorRole::BatterySecondary => self.secondary,
            SensorRole::Ambient => None,
        }
    }

    fn last_scan_ms(&self) -> Option<u32> {
        self.scan_ms
    }

    fn last_update_ms(&self) -> Option<u32> {
        self.updated_ms
    }
}

// ── External link ─────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockLink {
    pub mode: Option<ControlMode>,
    pub temp_c: Option<f32>,
    pub timed_out: bool,
}

impl ExternalLink for MockLink {
    fn external_mode(&self, _now_ms: u32) -> Option<ControlMode> {
        self.mode
    }

    fn external_temp_c(&self, _now_ms: u32) -> Option<f32> {
        self.temp_c
    }

    fn is_timed_out(&self, _now_ms: u32) -> bool {
        self.timed_out
    }
}

// ── Switch inputs and heater pin ──────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterWrite {
    Duty(u32),
    Level(bool),
}

#[derive(Debug, Default)]
pub struct MockIo {
    pub enable_level: bool,
    pub mode_level: bool,
    pub manual_level: bool,
    pub writes: Vec<HeaterWrite>,
}

#[allow(dead_code)]
impl MockIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_write(&self) -> Option<HeaterWrite> {
        self.writes.last().copied()
    }

    /// Whether the pin was last driven high (or with a non-zero duty).
    pub fn driven(&self) -> bool {
        match self.last_write() {
            Some(HeaterWrite::Duty(d)) => d > 0,
            Some(HeaterWrite::Level(l)) => l,
            None => false,
        }
    }
}

impl InputPort for MockIo {
    fn read_level(&mut self, input: InputId) -> bool {
        match input {
            InputId::Enable => self.enable_level,
            InputId::Mode => self.mode_level,
            InputId::Manual => self.manual_level,
        }
    }
}

impl HeaterActuator for MockIo {
    fn write_duty(&mut self, duty: u32) {
        self.writes.push(HeaterWrite::Duty(duty));
    }

    fn write_level(&mut self, high: bool) {
        self.writes.push(HeaterWrite::Level(high));
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<HeaterEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, event: &HeaterEvent) -> bool {
        self.events.iter().any(|e| e == event)
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &HeaterEvent) {
        self.events.push(event.clone());
    }
}

// ── Configurations ────────────────────────────────────────────

/// Enabled, wired, charging configuration.
pub fn charging_config() -> HeaterConfig {
    let mut c = HeaterConfig::default();
    c.enabled = true;
    c.mode = ControlMode::Charge;
    c.output.pin = Some(25);
    c
}
