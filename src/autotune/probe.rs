//! Ramp-rate probe.
//!
//! Holds a constant output and samples the control temperature every
//! [`PROBE_SAMPLE_MS`]. A rate is accepted once the rise over the current
//! window reaches [`PROBE_MIN_RISE_C`] and the samples span at least 70 % of
//! that window. Without enough rise, the window doubles up to
//! [`PROBE_WINDOW_MAX_MS`], then the output steps up by [`PROBE_STEP_PCT`]
//! until it would exceed the heater's ceiling.

use heapless::Deque;
use log::info;

pub const PROBE_SAMPLE_MS: u32 = 10_000;
pub const PROBE_WINDOW_START_MS: u32 = 120_000;
pub const PROBE_WINDOW_MAX_MS: u32 = 600_000;
pub const PROBE_STEP_PCT: f32 = 10.0;
pub const PROBE_MIN_RISE_C: f32 = 0.2;

/// 64 samples at 10 s cover the largest window.
const MAX_SAMPLES: usize = 64;
/// Required sample span as a fraction of the window.
const MIN_SPAN_FRACTION: f32 = 0.7;

#[derive(Debug, Clone, Copy)]
struct Sample {
    ms: u32,
    temp_c: f32,
}

/// Rise measured over one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiseWindow {
    pub rate_c_per_min: f32,
    pub delta_c: f32,
    pub span_min: f32,
}

/// Outcome of one probe tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeStep {
    Pending,
    Detected { rate_c_per_min: f32 },
    /// Window and output growth exhausted without enough rise.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct Probe {
    output_pct: f32,
    max_output_pct: f32,
    window_ms: u32,
    last_adjust_ms: u32,
    last_sample_ms: Option<u32>,
    samples: Deque<Sample, MAX_SAMPLES>,
}

impl Probe {
    /// Start at `min(max_output, start_pct)`.
    pub fn new(now_ms: u32, start_pct: f32, max_output_pct: f32) -> Self {
        let output_pct = start_pct.min(max_output_pct);
        Self {
            output_pct,
            max_output_pct: max_output_pct.max(output_pct),
            window_ms: PROBE_WINDOW_START_MS,
            last_adjust_ms: now_ms,
            last_sample_ms: None,
            samples: Deque::new(),
        }
    }

    pub fn output_pct(&self) -> f32 {
        self.output_pct
    }

    pub fn window_ms(&self) -> u32 {
        self.window_ms
    }

    pub fn step(&mut self, now_ms: u32, temp_c: f32) -> ProbeStep {
        if self
            .last_sample_ms
            .is_some_and(|last| now_ms.wrapping_sub(last) < PROBE_SAMPLE_MS)
        {
            return ProbeStep::Pending;
        }
        self.last_sample_ms = Some(now_ms);
        self.push(now_ms, temp_c);

        if let Some(w) = self.rise() {
            let min_span = self.window_ms as f32 / 60_000.0 * MIN_SPAN_FRACTION;
            if w.span_min >= min_span && w.delta_c >= PROBE_MIN_RISE_C {
                return ProbeStep::Detected {
                    rate_c_per_min: w.rate_c_per_min,
                };
            }
        }

        if now_ms.wrapping_sub(self.last_adjust_ms) < self.window_ms {
            return ProbeStep::Pending;
        }
        if self.window_ms < PROBE_WINDOW_MAX_MS {
            self.window_ms = self.window_ms.saturating_mul(2).min(PROBE_WINDOW_MAX_MS);
            info!("autotune probe: window -> {} s", self.window_ms / 1000);
        } else if self.output_pct + PROBE_STEP_PCT <= self.max_output_pct {
            self.output_pct += PROBE_STEP_PCT;
            info!("autotune probe: output -> {:.0}%", self.output_pct);
        } else {
            return ProbeStep::Exhausted;
        }
        self.last_adjust_ms = now_ms;
        self.samples.clear();
        ProbeStep::Pending
    }

    fn push(&mut self, ms: u32, temp_c: f32) {
        if self.samples.is_full() {
            self.samples.pop_front();
        }
        // Capacity freed above.
        let _ = self.samples.push_back(Sample { ms, temp_c });
        while self.samples.len() > 1 {
            match self.samples.front() {
                Some(oldest) if ms.wrapping_sub(oldest.ms) > PROBE_WINDOW_MAX_MS => {
                    self.samples.pop_front();
                }
                _ => break,
            }
        }
    }

    /// Rise from the oldest sample inside the current window to the newest.
    pub fn rise(&self) -> Option<RiseWindow> {
        let newest = self.samples.back()?;
        let oldest = self
            .samples
            .iter()
            .find(|s| newest.ms.wrapping_sub(s.ms) <= self.window_ms)
            .or(self.samples.front())?;
        let span_min = newest.ms.wrapping_sub(oldest.ms) as f32 / 60_000.0;
        if span_min <= 0.0 {
            return None;
        }
        let delta_c = newest.temp_c - oldest.temp_c;
        Some(RiseWindow {
            rate_c_per_min: delta_c / span_min,
            delta_c,
            span_min,
        })
    }
}
