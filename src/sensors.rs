//! Control-temperature selection.
//!
//! Preference order, first valid wins:
//!
//! | Source          | Marked        | Condition                           |
//! |-----------------|---------------|-------------------------------------|
//! | primary sensor  |               | role reading valid                  |
//! | external link   | `from_link`   | fallback enabled, link temp valid   |
//! | last good value | `stale`       | within `LAST_GOOD_HOLD_MS`          |
//! | none            | invalid       |                                     |
//!
//! Sensor-failure reporting is held off by three grace windows (boot,
//! post-rescan, short invalid) and only latches once a valid primary
//! reading has been seen.

use serde::Serialize;

/// How long a last-good reading stands in for a missing one.
pub const LAST_GOOD_HOLD_MS: u32 = 8_000;
/// No sensor failure is reported this soon after boot.
pub const BOOT_GRACE_MS: u32 = 10_000;
/// Bus rescans briefly drop readings.
pub const RESCAN_GRACE_MS: u32 = 4_000;
/// The primary may be missing this long before it counts as failed.
pub const INVALID_GRACE_MS: u32 = 3_000;

/// Selected control temperature and its provenance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ControlTemp {
    pub value_c: Option<f32>,
    /// Last-good hold in use.
    pub stale: bool,
    /// External link fallback in use.
    pub from_link: bool,
}

impl ControlTemp {
    pub fn is_valid(&self) -> bool {
        self.value_c.is_some()
    }
}

/// Sensor-failure verdict for this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorHealth {
    Ok,
    Failed { latch: bool },
}

/// Readings offered to the selector for one tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct Readings {
    pub primary_c: Option<f32>,
    /// Link temperature, already gated by the fallback setting.
    pub fallback_c: Option<f32>,
    pub last_scan_ms: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ControlTempSelector {
    boot_ms: u32,
    had_valid_primary: bool,
    primary_invalid_since_ms: Option<u32>,
    last_good: Option<(u32, f32)>,
}

impl ControlTempSelector {
    pub fn new(boot_ms: u32) -> Self {
        Self {
            boot_ms,
            had_valid_primary: false,
            primary_invalid_since_ms: None,
            last_good: None,
        }
    }

    pub fn select(&mut self, now_ms: u32, readings: Readings) -> (ControlTemp, SensorHealth) {
        if let Some(t) = readings.primary_c {
            self.had_valid_primary = true;
            self.primary_invalid_since_ms = None;
            self.last_good = Some((now_ms, t));
            return (ControlTemp { value_c: Some(t), ..ControlTemp::default() }, SensorHealth::Ok);
        }

        if let Some(t) = readings.fallback_c {
            self.primary_invalid_since_ms = None;
            self.last_good = Some((now_ms, t));
            let temp = ControlTemp {
                value_c: Some(t),
                stale: false,
                from_link: true,
            };
            return (temp, SensorHealth::Ok);
        }

        let invalid_since = *self.primary_invalid_since_ms.get_or_insert(now_ms);

        if let Some((at, t)) = self.last_good {
            if now_ms.wrapping_sub(at) <= LAST_GOOD_HOLD_MS {
                let temp = ControlTemp {
                    value_c: Some(t),
                    stale: true,
                    from_link: false,
                };
                return (temp, SensorHealth::Ok);
            }
        }

        let in_boot = now_ms.wrapping_sub(self.boot_ms) < BOOT_GRACE_MS;
        let in_rescan = readings
            .last_scan_ms
            .is_some_and(|scan| now_ms.wrapping_sub(scan) < RESCAN_GRACE_MS);
        let short_invalid = now_ms.wrapping_sub(invalid_since) < INVALID_GRACE_MS;

        let health = if in_boot || in_rescan || short_invalid {
            SensorHealth::Ok
        } else {
            SensorHealth::Failed {
                latch: self.had_valid_primary,
            }
        };
        (ControlTemp::default(), health)
    }
}
