//! Diadochokinetic syllable timing.

use super::cepstral::{HOP, log_mel_spectrogram};
use crate::dsp::mean_std;
use crate::signal::AudioSignal;

/// Peak-picking parameters on the onset envelope, in frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakPick {
    pub pre_max: usize,
    pub post_max: usize,
    pub pre_avg: usize,
    pub post_avg: usize,
    pub delta: f64,
    pub wait: usize,
}

impl Default for PeakPick {
    fn default() -> Self {
        Self {
            pre_max: 3,
            post_max: 3,
            pre_avg: 3,
            post_avg: 5,
            delta: 0.07,
            wait: 4,
        }
    }
}

/// Ratio of late to early syllable spacing below which speech is festinating.
pub const FESTINATION_RATIO: f64 = 0.85;
const MIN_ONSETS_FOR_VARIABILITY: usize = 3;
const MIN_ONSETS_FOR_FESTINATION: usize = 6;
const MIN_IOIS_FOR_FESTINATION: usize = 4;

// ── Onset detection ──

/// Mean positive log-mel flux per frame, aligned with the centered STFT frames.
pub fn onset_envelope(signal: &AudioSignal) -> Vec<f64> {
    let mel = log_mel_spectrogram(signal);
    let n = mel.len();
    let mut env = vec![0.0; n];
    // Centered frames: flux between frames t-1 and t is reported at t + n_fft/(2*hop).
    let lag_offset = 1 + super::cepstral::N_FFT / (2 * HOP);
    for t in 1..n {
        let flux = mel[t]
            .iter()
            .zip(&mel[t - 1])
            .map(|(a, b)| (a - b).max(0.0))
            .sum::<f64>()
            / mel[t].len() as f64;
        let slot = t - 1 + lag_offset;
        if slot < n {
            env[slot] = flux;
        }
    }
    env
}

/// Frame indices that are local maxima, exceed the local mean by `delta`,
/// and are at least `wait` frames after the previous pick.
pub fn peak_pick(x: &[f64], p: &PeakPick) -> Vec<usize> {
    let n = x.len();
    let mut peaks = Vec::new();
    let mut last: Option<usize> = None;
    for i in 0..n {
        let max_lo = i.saturating_sub(p.pre_max);
        let max_hi = (i + p.post_max).min(n);
        let local_max = x[max_lo..max_hi].iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if x[i] != local_max {
            continue;
        }
        let avg_lo = i.saturating_sub(p.pre_avg);
        let avg_hi = (i + p.post_avg).min(n);
        let window = &x[avg_lo..avg_hi];
        let local_avg = window.iter().sum::<f64>() / window.len() as f64;
        if x[i] < local_avg + p.delta {
            continue;
        }
        if last.is_none_or(|l| i > l + p.wait) {
            peaks.push(i);
            last = Some(i);
        }
    }
    peaks
}

/// Move each onset back to the nearest preceding local minimum of `energy`.
pub fn backtrack(onsets: &[usize], energy: &[f64]) -> Vec<usize> {
    let mut minima = vec![0usize];
    for i in 1..energy.len().saturating_sub(1) {
        if energy[i] <= energy[i - 1] && energy[i] < energy[i + 1] {
            minima.push(i);
        }
    }
    onsets
        .iter()
        .map(|&onset| {
            let idx = minima.partition_point(|&m| m <= onset);
            minima[idx.saturating_sub(1)]
        })
        .collect()
}

/// Syllable onset times in seconds.
pub fn detect_onsets(signal: &AudioSignal) -> Vec<f64> {
    let mut env = onset_envelope(signal);
    let lo = env.iter().copied().fold(f64::INFINITY, f64::min);
    for v in env.iter_mut() {
        *v -= lo;
    }
    let hi = env.iter().copied().fold(0.0_f64, f64::max);
    if hi <= 0.0 || !hi.is_finite() {
        return Vec::new();
    }
    for v in env.iter_mut() {
        *v /= hi;
    }

    let peaks = peak_pick(&env, &PeakPick::default());
    let sr = f64::from(signal.sample_rate());
    backtrack(&peaks, &env)
        .into_iter()
        .map(|frame| (frame * HOP) as f64 / sr)
        .collect()
}

// ── Timing metrics ──

/// Timing summary of a DDK recording. Every field is `None` below two onsets.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DdkMetrics {
    pub onset_count: Option<u64>,
    /// Syllables per second between first and last onset.
    pub rate: Option<f64>,
    pub mean_ioi: Option<f64>,
    pub sd_ioi: Option<f64>,
    /// Coefficient of variation of inter-onset intervals.
    pub regularity_cv: Option<f64>,
    pub festination: Option<bool>,
}

impl DdkMetrics {
    pub fn from_onsets(times: &[f64]) -> Self {
        if times.len() < 2 {
            return Self::default();
        }
        let n = times.len();
        let span = times[n - 1] - times[0];
        let rate = (span > 0.0).then(|| n as f64 / span);

        let iois: Vec<f64> = times
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|d| *d > 0.0)
            .collect();

        let mut metrics = Self {
            onset_count: Some(n as u64),
            rate,
            ..Self::default()
        };

        if n >= MIN_ONSETS_FOR_VARIABILITY {
            if let Some((mean, sd)) = mean_std(&iois) {
                metrics.mean_ioi = Some(mean);
                metrics.sd_ioi = Some(sd);
                metrics.regularity_cv = (mean > 0.0).then(|| sd / mean);
            }
        }

        if n >= MIN_ONSETS_FOR_FESTINATION && iois.len() >= MIN_IOIS_FOR_FESTINATION {
            let mid = iois.len() / 2;
            let first = iois[..mid].iter().sum::<f64>() / mid as f64;
            let second = iois[mid..].iter().sum::<f64>() / (iois.len() - mid) as f64;
            let ratio = if first > 0.0 { second / first } else { 1.0 };
            metrics.festination = Some(ratio < FESTINATION_RATIO);
        }

        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn regular_train() {
        let times: Vec<f64> = (0..10).map(|i| 0.5 + 0.2 * i as f64).collect();
        let m = DdkMetrics::from_onsets(&times);
        assert_eq!(m.onset_count, Some(10));
        assert_relative_eq!(m.rate.unwrap(), 10.0 / 1.8, epsilon = 1e-9);
        assert_relative_eq!(m.mean_ioi.unwrap(), 0.2, epsilon = 1e-9);
        assert!(m.sd_ioi.unwrap() < 1e-9);
        assert!(m.regularity_cv.unwrap() < 1e-9);
        assert_eq!(m.festination, Some(false));
    }

    #[test]
    fn accelerating_train_festinates() {
        let iois = [0.3, 0.3, 0.3, 0.3, 0.2, 0.2, 0.2, 0.2];
        let mut t = 0.0;
        let mut times = vec![t];
        for d in iois {
            t += d;
            times.push(t);
        }
        let m = DdkMetrics::from_onsets(&times);
        assert_eq!(m.festination, Some(true));

        let mild = [0.2, 0.2, 0.2, 0.2, 0.19, 0.19, 0.19, 0.19];
        let mut t = 0.0;
        let mut times = vec![t];
        for d in mild {
            t += d;
            times.push(t);
        }
        assert_eq!(DdkMetrics::from_onsets(&times).festination, Some(false));
    }

    #[test]
    fn too_few_onsets() {
        assert_eq!(DdkMetrics::from_onsets(&[]), DdkMetrics::default());
        assert_eq!(DdkMetrics::from_onsets(&[1.0]).onset_count, None);

        let two = DdkMetrics::from_onsets(&[1.0, 1.5]);
        assert_eq!(two.onset_count, Some(2));
        assert_relative_eq!(two.rate.unwrap(), 4.0);
        assert_eq!(two.mean_ioi, None);
        assert_eq!(two.festination, None);
    }

    #[test]
    fn peak_pick_respects_wait() {
        let mut x = vec![0.0; 30];
        x[5] = 1.0;
        x[8] = 0.9;
        x[20] = 1.0;
        let peaks = peak_pick(&x, &PeakPick::default());
        assert_eq!(peaks, vec![5, 20]);
    }

    #[test]
    fn backtrack_to_preceding_minimum() {
        let energy = [0.5, 0.2, 0.4, 0.9, 0.3, 0.1, 0.6, 1.0];
        assert_eq!(backtrack(&[3, 7], &energy), vec![1, 5]);
        assert_eq!(backtrack(&[0], &energy), vec![0]);
    }

    #[test]
    fn detects_bursts() {
        let sr = 16_000;
        let mut samples = vec![0.0; 3 * sr];
        // Noise bursts every 250 ms, 60 ms long.
        let mut state = 99u64;
        for k in 0..10 {
            let start = 4000 + k * 4000;
            for s in samples.iter_mut().skip(start).take(960) {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                *s = ((state >> 40) as f64 / (1u64 << 24) as f64) - 0.5;
            }
        }
        let onsets = detect_onsets(&AudioSignal::new(samples, sr as u32));
        assert!((8..=11).contains(&onsets.len()), "{onsets:?}");
        let m = DdkMetrics::from_onsets(&onsets);
        assert!((m.rate.unwrap() - 4.0).abs() < 0.8, "{m:?}");
    }

    #[test]
    fn silence_has_no_onsets() {
        let onsets = detect_onsets(&AudioSignal::new(vec![0.0; 32_000], 16_000));
        assert!(onsets.is_empty());
    }
}
