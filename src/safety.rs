//! Fault supervision state.
//!
//! The controller recomputes the **active** mask from scratch every tick;
//! safety-critical kinds also set the **latched** mask, which survives until
//! an explicit reset is honoured.
//!
//! ## Fault lifecycle
//!
//! 1. `begin_tick()` clears the active mask.
//! 2. Each check that trips calls `raise(kind, latch, now)`.
//! 3. Any bit (active or latched) forces the safe state.
//! 4. `finish_tick()` consumes a pending reset request; latches are only
//!    cleared when no condition is active this tick.
//!
//! Runaway and stuck-output detection keep their own history here
//! ([`RunawayMonitor`], [`StuckTracker`]).

use heapless::Deque;
use log::{error, info, warn};

use crate::config::SafetyConfig;
use crate::error::{FaultKind, FaultMask};

/// Runaway detection is held off this long after a mode change.
pub const RUNAWAY_MODE_CHANGE_GRACE_MS: u32 = 60_000;
/// Overshoot beyond the margin must persist this long.
pub const RUNAWAY_OVERSHOOT_HOLD_MS: u32 = 15_000;
/// Runaway ring capacity.
const RUNAWAY_MAX_SAMPLES: usize = 64;
/// Floor on the spacing between kept runaway samples.
const RUNAWAY_MIN_SPACING_MS: u32 = 1000;

/// Kept samples are spaced so a full window never exceeds the ring, which
/// leaves age as the only reason a sample is dropped.
fn runaway_spacing_ms(window_ms: u32) -> u32 {
    (window_ms / (RUNAWAY_MAX_SAMPLES as u32 - 4)).max(RUNAWAY_MIN_SPACING_MS)
}

// ── Fault state ───────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct FaultState {
    active: FaultMask,
    latched: FaultMask,
    last: Option<(FaultKind, u32)>,
    reset_requested: bool,
}

impl FaultState {
    pub fn active(&self) -> FaultMask {
        self.active
    }

    pub fn latched(&self) -> FaultMask {
        self.latched
    }

    /// True if **any** fault is active or latched.
    pub fn is_faulted(&self) -> bool {
        !self.active.union(self.latched).is_empty()
    }

    /// Most recently raised kind and when.
    pub fn last_fault(&self) -> Option<(FaultKind, u32)> {
        self.last
    }

    pub fn request_reset(&mut self) {
        self.reset_requested = true;
    }

    pub fn begin_tick(&mut self) {
        self.active.clear();
    }

    pub fn raise(&mut self, kind: FaultKind, latch: bool, now_ms: u32) {
        let already = self.active.union(self.latched).contains(kind);
        self.active.insert(kind);
        if latch {
            self.latched.insert(kind);
        }
        if !already {
            error!("SAFETY FAULT SET: {kind}{}", if latch { " (latched)" } else { "" });
            self.last = Some((kind, now_ms));
        }
    }

    /// Consume a pending reset request. Returns `true` if latches were
    /// cleared.
    pub fn finish_tick(&mut self) -> bool {
        if !core::mem::take(&mut self.reset_requested) {
            return false;
        }
        if !self.active.is_empty() {
            warn!("fault reset refused, active: {}", self.active);
            return false;
        }
        if !self.latched.is_empty() {
            info!("SAFETY LATCHES CLEARED: {}", self.latched);
        }
        self.latched.clear();
        true
    }
}

// ── Runaway monitor ───────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Sample {
    ms: u32,
    temp_c: f32,
}

/// Conditions the runaway checks depend on this tick.
#[derive(Debug, Clone, Copy)]
pub struct RunawayInputs {
    pub now_ms: u32,
    /// Control temperature, `None` when invalid.
    pub temp_c: Option<f32>,
    pub target_c: f32,
    pub applied_pct: f32,
    pub since_mode_change_ms: Option<u32>,
    /// Overshoot detection applies (not in manual mode).
    pub check_overshoot: bool,
}

/// Why runaway tripped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunawayTrigger {
    Rate { c_per_min: f32 },
    Overshoot,
}

/// Rate-of-rise and sustained-overshoot detection.
#[derive(Debug, Clone, Default)]
pub struct RunawayMonitor {
    samples: Deque<Sample, RUNAWAY_MAX_SAMPLES>,
    last_sample_ms: Option<u32>,
    overshoot_since_ms: Option<u32>,
    wait_for_cooling: bool,
}

impl RunawayMonitor {
    /// Forget history after a mode change. `lowered` arms the
    /// wait-for-cooling latch.
    pub fn on_mode_change(&mut self, lowered: bool) {
        self.samples.clear();
        self.last_sample_ms = None;
        self.wait_for_cooling = lowered;
    }

    pub fn waiting_for_cooling(&self) -> bool {
        self.wait_for_cooling
    }

    /// Record a conversion stamped `update_ms`, downsampled to the window's
    /// spacing. Repeated stamps are ignored.
    pub fn observe(&mut self, update_ms: Option<u32>, temp_c: f32, window_s: u32) {
        let Some(ms) = update_ms else { return };
        let window_ms = window_s.saturating_mul(1000);
        if self
            .last_sample_ms
            .is_some_and(|last| ms.wrapping_sub(last) < runaway_spacing_ms(window_ms))
        {
            return;
        }
        self.last_sample_ms = Some(ms);

        while self
            .samples
            .front()
            .is_some_and(|oldest| ms.wrapping_sub(oldest.ms) > window_ms)
        {
            self.samples.pop_front();
        }
        if self.samples.is_full() {
            // Only after the window grew since the older samples were kept.
            warn!("runaway ring full, dropping oldest sample");
            self.samples.pop_front();
        }
        let _ = self.samples.push_back(Sample { ms, temp_c });
    }

    /// Rise rate between oldest and newest sample, °C/min.
    pub fn rate_c_per_min(&self) -> Option<f32> {
        let (oldest, newest) = (self.samples.front()?, self.samples.back()?);
        let dt_min = newest.ms.wrapping_sub(oldest.ms) as f32 / 60_000.0;
        (dt_min > 0.0).then(|| (newest.temp_c - oldest.temp_c) / dt_min)
    }

    pub fn evaluate(&mut self, cfg: &SafetyConfig, x: &RunawayInputs) -> Option<RunawayTrigger> {
        let rate = if cfg.runaway_enabled && x.temp_c.is_some() {
            self.rate_c_per_min()
        } else {
            None
        };
        if self.wait_for_cooling && rate.is_some_and(|r| r < 0.0) {
            info!("runaway: cooling observed, detection re-armed");
            self.wait_for_cooling = false;
        }

        let in_grace = x
            .since_mode_change_ms
            .is_some_and(|e| e < RUNAWAY_MODE_CHANGE_GRACE_MS);
        let armed = cfg.runaway_enabled && !in_grace && !self.wait_for_cooling && x.applied_pct > 0.0;
        let Some(temp_c) = x.temp_c.filter(|_| armed) else {
            self.overshoot_since_ms = None;
            return None;
        };

        let mut trigger = rate
            .filter(|r| *r > cfg.runaway_rate_c_per_min)
            .map(|c_per_min| RunawayTrigger::Rate { c_per_min });

        if x.check_overshoot {
            let cooling = rate.is_some_and(|r| r < 0.0);
            if !cooling && temp_c > x.target_c + cfg.runaway_margin_c {
                match self.overshoot_since_ms {
                    None => self.overshoot_since_ms = Some(x.now_ms),
                    Some(since) if x.now_ms.wrapping_sub(since) >= RUNAWAY_OVERSHOOT_HOLD_MS => {
                        trigger = trigger.or(Some(RunawayTrigger::Overshoot));
                    }
                    Some(_) => {}
                }
            } else {
                self.overshoot_since_ms = None;
            }
        }
        trigger
    }
}

// ── Stuck-output tracker ──────────────────────────────────────

/// Detects high output that produces no temperature rise.
#[derive(Debug, Clone, Default)]
pub struct StuckTracker {
    since: Option<(u32, f32)>,
}

impl StuckTracker {
    /// Returns `true` when the output has been high for the hold time and
    /// the rise over the rise window is insufficient.
    pub fn update(&mut self, cfg: &SafetyConfig, now_ms: u32, applied_pct: f32, temp_c: Option<f32>) -> bool {
        let Some(temp) = temp_c.filter(|_| applied_pct >= cfg.stuck_on_pct) else {
            self.since = None;
            return false;
        };
        let Some((start_ms, start_temp)) = self.since else {
            self.since = Some((now_ms, temp));
            return false;
        };

        let elapsed = now_ms.wrapping_sub(start_ms);
        if elapsed < cfg.stuck_on_s.saturating_mul(1000) || elapsed < cfg.rise_window_s.saturating_mul(1000) {
            return false;
        }
        // Window complete: judge it and start a fresh one.
        self.since = None;
        temp - start_temp < cfg.min_rise_c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeaterConfig;

    fn safety() -> SafetyConfig {
        HeaterConfig::default().safety
    }

    #[test]
    fn raise_records_first_occurrence_only() {
        let mut f = FaultState::default();
        f.begin_tick();
        f.raise(FaultKind::OverTemp, true, 100);
        f.begin_tick();
        f.raise(FaultKind::OverTemp, true, 200);
        assert_eq!(f.last_fault(), Some((FaultKind::OverTemp, 100)));
    }

    #[test]
    fn reset_refused_while_active() {
        let mut f = FaultState::default();
        f.begin_tick();
        f.raise(FaultKind::OverTemp, true, 0);
        f.request_reset();
        assert!(!f.finish_tick());
        assert!(f.latched().contains(FaultKind::OverTemp));

        // Request was consumed: clearing the condition alone does not reset.
        f.begin_tick();
        assert!(!f.finish_tick());
        assert!(f.is_faulted());

        f.request_reset();
        assert!(f.finish_tick());
        assert!(!f.is_faulted());
    }

    #[test]
    fn runaway_ring_is_pruned_by_age() {
        let mut m = RunawayMonitor::default();
        for i in 0..5u32 {
            m.observe(Some(i * 60_000), i as f32, 120);
        }
        // Window 120 s keeps samples at 120, 180, 240 s.
        assert_eq!(m.samples.len(), 3);
        let rate = m.rate_c_per_min().unwrap();
        assert!((rate - 1.0).abs() < 1e-4);
    }

    #[test]
    fn fast_sensor_rate_spans_whole_window() {
        let cfg = safety();
        let mut m = RunawayMonitor::default();
        // 2 s updates: flat for 90 s, then +3 °C over the last 30 s.
        let mut ms = 0;
        while ms <= 120_000 {
            let temp = if ms <= 90_000 { 10.0 } else { 10.0 + (ms - 90_000) as f32 / 10_000.0 };
            m.observe(Some(ms), temp, 120);
            ms += 2000;
        }
        assert_eq!(m.samples.front().map(|s| s.ms), Some(0));
        let rate = m.rate_c_per_min().unwrap();
        assert!((rate - 1.5).abs() < 1e-3, "rate {rate}");

        let x = RunawayInputs {
            now_ms: 120_000,
            temp_c: Some(13.0),
            target_c: 25.0,
            applied_pct: 50.0,
            since_mode_change_ms: None,
            check_overshoot: true,
        };
        assert_eq!(m.evaluate(&cfg, &x), None);
    }

    #[test]
    fn samples_closer_than_spacing_are_skipped() {
        let mut m = RunawayMonitor::default();
        for ms in (0..=10_000).step_by(250) {
            m.observe(Some(ms), 1.0, 120);
        }
        // 120 s window keeps one sample per 2 s.
        assert_eq!(m.samples.len(), 6);
    }

    #[test]
    fn duplicate_update_stamp_ignored() {
        let mut m = RunawayMonitor::default();
        m.observe(Some(1000), 1.0, 120);
        m.observe(Some(1000), 5.0, 120);
        assert_eq!(m.samples.len(), 1);
    }

    #[test]
    fn rate_trigger_respects_grace_and_cooling_latch() {
        let cfg = safety();
        let mut m = RunawayMonitor::default();
        m.observe(Some(0), 10.0, 120);
        m.observe(Some(60_000), 20.0, 120);
        let mut x = RunawayInputs {
            now_ms: 60_000,
            temp_c: Some(20.0),
            target_c: 25.0,
            applied_pct: 50.0,
            since_mode_change_ms: Some(30_000),
            check_overshoot: true,
        };
        assert_eq!(m.evaluate(&cfg, &x), None);
        x.since_mode_change_ms = None;
        assert_eq!(m.evaluate(&cfg, &x), Some(RunawayTrigger::Rate { c_per_min: 10.0 }));
        x.applied_pct = 0.0;
        assert_eq!(m.evaluate(&cfg, &x), None);

        m.on_mode_change(true);
        x.applied_pct = 50.0;
        m.observe(Some(61_000), 20.0, 120);
        m.observe(Some(63_000), 30.0, 120);
        assert_eq!(m.evaluate(&cfg, &x), None);
        assert!(m.waiting_for_cooling());
    }

    #[test]
    fn overshoot_needs_hold_time() {
        let cfg = safety();
        let mut m = RunawayMonitor::default();
        let mut x = RunawayInputs {
            now_ms: 0,
            temp_c: Some(31.0),
            target_c: 25.0,
            applied_pct: 10.0,
            since_mode_change_ms: None,
            check_overshoot: true,
        };
        assert_eq!(m.evaluate(&cfg, &x), None);
        x.now_ms = 14_999;
        assert_eq!(m.evaluate(&cfg, &x), None);
        x.now_ms = 15_000;
        assert_eq!(m.evaluate(&cfg, &x), Some(RunawayTrigger::Overshoot));
        x.check_overshoot = false;
        x.now_ms = 16_000;
        assert_eq!(m.evaluate(&cfg, &x), None);
    }

    #[test]
    fn stuck_output_detected_after_hold() {
        let cfg = safety(); // 70 %, 300 s hold, 1 °C over 300 s
        let mut s = StuckTracker::default();
        assert!(!s.update(&cfg, 0, 80.0, Some(5.0)));
        assert!(!s.update(&cfg, 299_999, 80.0, Some(5.5)));
        assert!(s.update(&cfg, 300_000, 80.0, Some(5.5)));
    }

    #[test]
    fn stuck_tracker_restarts_when_heat_arrives() {
        let cfg = safety();
        let mut s = StuckTracker::default();
        s.update(&cfg, 0, 80.0, Some(5.0));
        assert!(!s.update(&cfg, 300_000, 80.0, Some(7.0)));
        assert!(!s.update(&cfg, 300_001, 50.0, Some(7.0)));
    }
}
