//! External link state (BMS message bus).
//!
//! Tracks connection state and the last externally supplied mode and
//! temperature. Implements [`ExternalLink`] for the controller.
//!
//! | Query            | Valid while                                        |
//! |------------------|----------------------------------------------------|
//! | `external_mode`  | received within `value_max_age_s`                  |
//! | `external_temp_c`| received within `value_max_age_s`, finite          |
//! | `is_timed_out`   | disconnected for longer than `timeout_s`           |
//!
//! A link that has never disconnected is not timed out.

use log::{info, warn};

use crate::app::ports::ExternalLink;
use crate::config::LinkConfig;
use crate::mode::ControlMode;

#[derive(Debug, Clone)]
pub struct LinkMonitor {
    timeout_ms: u32,
    max_age_ms: u32,
    connected: bool,
    disconnected_at_ms: Option<u32>,
    mode: Option<(u32, ControlMode)>,
    temp: Option<(u32, f32)>,
}

impl LinkMonitor {
    pub fn new(cfg: &LinkConfig) -> Self {
        Self {
            timeout_ms: cfg.timeout_s.saturating_mul(1000),
            max_age_ms: cfg.value_max_age_s.saturating_mul(1000),
            connected: false,
            disconnected_at_ms: None,
            mode: None,
            temp: None,
        }
    }

    pub fn set_connected(&mut self, connected: bool, now_ms: u32) {
        if connected == self.connected {
            return;
        }
        self.connected = connected;
        if connected {
            info!("link connected");
            self.disconnected_at_ms = None;
        } else {
            warn!("link lost");
            self.disconnected_at_ms = Some(now_ms);
        }
    }

    pub fn on_mode(&mut self, mode: ControlMode, now_ms: u32) {
        self.mode = Some((now_ms, mode));
    }

    pub fn on_temp(&mut self, temp_c: f32, now_ms: u32) {
        if !temp_c.is_finite() {
            warn!("link: ignoring non-finite temperature");
            return;
        }
        self.temp = Some((now_ms, temp_c));
    }

    fn fresh<T: Copy>(&self, value: Option<(u32, T)>, now_ms: u32) -> Option<T> {
        value
            .filter(|(at, _)| now_ms.wrapping_sub(*at) <= self.max_age_ms)
            .map(|(_, v)| v)
    }
}

impl ExternalLink for LinkMonitor {
    fn external_mode(&self, now_ms: u32) -> Option<ControlMode> {
        self.fresh(self.mode, now_ms)
    }

    fn external_temp_c(&self, now_ms: u32) -> Option<f32> {
        self.fresh(self.temp, now_ms)
    }

    fn is_timed_out(&self, now_ms: u32) -> bool {
        !self.connected
            && self
                .disconnected_at_ms
                .is_some_and(|at| now_ms.wrapping_sub(at) > self.timeout_ms)
    }
}
