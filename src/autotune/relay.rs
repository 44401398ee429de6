//! Relay experiment: bang-bang drive, peak detection, and oscillation
//! statistics.
//!
//! The relay switches to its high output below `target - band` and to zero
//! above `target + band`, holding its last decision inside the band. Peaks
//! are sampled every `sample_period_ms` and detected as slope-sign reversals
//! at least `max(3 * period, 10 s)` apart.
//!
//! From the last (up to) three complete cycles:
//!
//! ```text
//! a  = |max - min| / 2          (mean over cycles)
//! Pu = t(max[i+1]) - t(max[i])  (mean over cycles)
//! Ku = 4 d / (pi a)             with d = relay output / 2
//! quality = 1 - max(std(a)/mean(a), std(Pu)/mean(Pu)), clamped to 0..1
//! ```

use heapless::Vec;
use log::debug;

/// Peaks kept per direction; the oldest is shifted out.
pub const MAX_PEAKS: usize = 10;
/// Cycles averaged for Ku and Pu.
const ANALYSIS_CYCLES: usize = 3;
const MIN_PEAK_DISTANCE_MS: u32 = 10_000;
/// Slopes smaller than this do not replace the remembered slope.
const SLOPE_EPSILON_C: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub ms: u32,
    pub temp_c: f32,
}

/// Identified oscillation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Oscillation {
    pub ku: f32,
    pub pu_s: f32,
    pub amplitude_c: f32,
    /// 0..1, 1 = perfectly regular.
    pub quality: f32,
}

#[derive(Debug, Clone)]
pub struct RelayTuner {
    target_c: f32,
    band_c: f32,
    high_pct: f32,
    sample_period_ms: u32,
    output_pct: f32,

    last_sample_ms: Option<u32>,
    prev: Option<Peak>,
    prev_slope: f32,
    last_peak_ms: Option<u32>,
    maxima: Vec<Peak, MAX_PEAKS>,
    minima: Vec<Peak, MAX_PEAKS>,
}

fn push_peak(list: &mut Vec<Peak, MAX_PEAKS>, peak: Peak) {
    if list.is_full() {
        list.remove(0);
    }
    // Capacity freed above.
    let _ = list.push(peak);
}

fn mean_and_rel_std(values: &[f32]) -> Option<(f32, f32)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    if mean <= 0.0 {
        return None;
    }
    let var = values.iter().map(|v| v * v).sum::<f32>() / n - mean * mean;
    let std = if var > 0.0 { var.sqrt() } else { 0.0 };
    Some((mean, std / mean))
}

impl RelayTuner {
    /// The relay starts high.
    pub fn new(target_c: f32, band_c: f32, high_pct: f32, sample_period_ms: u32) -> Self {
        Self {
            target_c,
            band_c,
            high_pct,
            sample_period_ms,
            output_pct: high_pct,
            last_sample_ms: None,
            prev: None,
            prev_slope: 0.0,
            last_peak_ms: None,
            maxima: Vec::new(),
            minima: Vec::new(),
        }
    }

    pub fn output_pct(&self) -> f32 {
        self.output_pct
    }

    pub fn maxima(&self) -> &[Peak] {
        &self.maxima
    }

    pub fn minima(&self) -> &[Peak] {
        &self.minima
    }

    /// Complete cycles observed so far.
    pub fn cycles(&self) -> u8 {
        if self.maxima.len() < 2 || self.minima.len() < 2 {
            return 0;
        }
        (self.maxima.len().min(self.minima.len()) - 1) as u8
    }

    /// Relay decision for this tick, then peak detection on sample ticks.
    /// Returns the output to apply.
    pub fn step(&mut self, now_ms: u32, temp_c: f32) -> f32 {
        if temp_c > self.target_c + self.band_c {
            self.output_pct = 0.0;
        } else if temp_c < self.target_c - self.band_c {
            self.output_pct = self.high_pct;
        }

        if self
            .last_sample_ms
            .is_some_and(|last| now_ms.wrapping_sub(last) < self.sample_period_ms)
        {
            return self.output_pct;
        }
        self.last_sample_ms = Some(now_ms);
        self.detect_peak(now_ms, temp_c);
        self.output_pct
    }

    fn detect_peak(&mut self, now_ms: u32, temp_c: f32) {
        let Some(prev) = self.prev else {
            self.prev = Some(Peak { ms: now_ms, temp_c });
            self.prev_slope = 0.0;
            return;
        };

        let slope = temp_c - prev.temp_c;
        let min_distance = self.sample_period_ms.saturating_mul(3).max(MIN_PEAK_DISTANCE_MS);
        let spaced = self
            .last_peak_ms
            .is_none_or(|last| prev.ms.wrapping_sub(last) >= min_distance);

        if spaced && self.prev_slope > 0.0 && slope <= 0.0 {
            debug!("autotune: max {:.3} C at {} ms", prev.temp_c, prev.ms);
            push_peak(&mut self.maxima, prev);
            self.last_peak_ms = Some(prev.ms);
        } else if spaced && self.prev_slope < 0.0 && slope >= 0.0 {
            debug!("autotune: min {:.3} C at {} ms", prev.temp_c, prev.ms);
            push_peak(&mut self.minima, prev);
            self.last_peak_ms = Some(prev.ms);
        }

        if slope.abs() > SLOPE_EPSILON_C {
            self.prev_slope = slope;
        }
        self.prev = Some(Peak { ms: now_ms, temp_c });
    }

    /// Ku, Pu and quality from the most recent cycles, once at least one
    /// complete cycle exists.
    pub fn oscillation(&self) -> Option<Oscillation> {
        let used = usize::from(self.cycles()).min(ANALYSIS_CYCLES);
        if used == 0 {
            return None;
        }

        let pairs = self.maxima.len().min(self.minima.len());
        let mut amplitudes: Vec<f32, ANALYSIS_CYCLES> = Vec::new();
        for i in pairs - used..pairs {
            let a = (self.maxima[i].temp_c - self.minima[i].temp_c).abs() * 0.5;
            let _ = amplitudes.push(a);
        }

        let last = self.maxima.len() - 1;
        let mut periods: Vec<f32, ANALYSIS_CYCLES> = Vec::new();
        for i in last - used..last {
            let p = self.maxima[i + 1].ms.wrapping_sub(self.maxima[i].ms) as f32 / 1000.0;
            let _ = periods.push(p);
        }

        let (amplitude_c, amp_rel) = mean_and_rel_std(&amplitudes)?;
        let (pu_s, per_rel) = mean_and_rel_std(&periods)?;
        let d = self.high_pct * 0.5;
        Some(Oscillation {
            ku: 4.0 * d / (core::f32::consts::PI * amplitude_c),
            pu_s,
            amplitude_c,
            quality: (1.0 - amp_rel.max(per_rel)).clamp(0.0, 1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Triangle wave between 9.5 and 10.5 with the given period.
    fn triangle(ms: u32, period_ms: u32) -> f32 {
        let phase = (ms % period_ms) as f32 / period_ms as f32;
        if phase < 0.5 {
            9.5 + 2.0 * phase
        } else {
            10.5 - 2.0 * (phase - 0.5)
        }
    }

    #[test]
    fn relay_holds_inside_band() {
        let mut r = RelayTuner::new(10.0, 0.3, 40.0, 1000);
        assert_eq!(r.step(0, 10.0), 40.0);
        assert_eq!(r.step(1, 10.31), 0.0);
        assert_eq!(r.step(2, 10.0), 0.0);
        assert_eq!(r.step(3, 9.69), 40.0);
        assert_eq!(r.step(4, 10.2), 40.0);
    }

    #[test]
    fn regular_oscillation_identified() {
        let mut r = RelayTuner::new(10.0, 0.3, 40.0, 1000);
        let period = 120_000;
        for ms in (0..=10 * period).step_by(1000) {
            r.step(ms, triangle(ms, period));
        }
        assert!(r.cycles() >= 5);
        let osc = r.oscillation().expect("oscillation");
        assert!((osc.pu_s - 120.0).abs() < 1.5, "pu {}", osc.pu_s);
        assert!((osc.amplitude_c - 0.5).abs() < 0.02);
        assert!(osc.quality > 0.95);
        let expected_ku = 4.0 * 20.0 / (core::f32::consts::PI * osc.amplitude_c);
        assert!((osc.ku - expected_ku).abs() < 1e-3);
    }

    #[test]
    fn peak_lists_are_bounded() {
        let mut r = RelayTuner::new(10.0, 0.3, 40.0, 1000);
        let period = 60_000;
        for ms in (0..=30 * period).step_by(1000) {
            r.step(ms, triangle(ms, period));
        }
        assert_eq!(r.maxima().len(), MAX_PEAKS);
        assert_eq!(r.minima().len(), MAX_PEAKS);
        assert!(r.maxima()[MAX_PEAKS - 1].ms > 28 * period);
    }

    #[test]
    fn close_reversals_ignored() {
        let mut r = RelayTuner::new(10.0, 0.3, 40.0, 5000);
        // Rise, dip, rise again within the 15 s minimum distance.
        for (ms, t) in [(0, 9.0), (5_000, 9.5), (10_000, 9.4), (15_000, 9.6), (20_000, 9.5)] {
            r.step(ms, t);
        }
        assert_eq!(r.maxima().len(), 1);
        assert!(r.minima().is_empty());
        assert!(r.oscillation().is_none());
    }
}
