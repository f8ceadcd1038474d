//! Cross-correlation harmonicity: per-frame HNR in dB.

use super::pitch::extract_frame;
use super::{BackendError, Harmonicity, HarmonicityParams, SILENT_FRAME_DB};
use crate::signal::AudioSignal;

/// Shortest lag considered; the search is open up to the Nyquist rate.
const MIN_LAG: usize = 2;

/// Highest normalized cross-correlation among local maxima in `[MIN_LAG, max_lag)`.
fn best_correlation(segment: &[f64], window_len: usize, max_lag: usize) -> f64 {
    let head = &segment[..window_len];
    let head_energy: f64 = head.iter().map(|x| x * x).sum();
    if head_energy <= 0.0 {
        return 0.0;
    }

    let r: Vec<f64> = (0..=max_lag)
        .map(|lag| {
            if lag < MIN_LAG - 1 {
                return 0.0;
            }
            let tail = &segment[lag..lag + window_len];
            let tail_energy: f64 = tail.iter().map(|x| x * x).sum();
            if tail_energy <= 0.0 {
                return 0.0;
            }
            let cross: f64 = head.iter().zip(tail).map(|(a, b)| a * b).sum();
            cross / (head_energy * tail_energy).sqrt()
        })
        .collect();

    let mut best = 0.0_f64;
    for lag in MIN_LAG..max_lag {
        let (prev, cur, next) = (r[lag - 1], r[lag], r[lag + 1]);
        if cur > prev && cur >= next {
            let denom = prev - 2.0 * cur + next;
            let peak = if denom.abs() > 1e-12 {
                let delta = 0.5 * (prev - next) / denom;
                cur - 0.25 * (prev - next) * delta
            } else {
                cur
            };
            best = best.max(peak.min(1.0));
        }
    }
    best
}

/// Map a correlation coefficient to dB, saturating at +-150 dB.
pub fn correlation_to_db(r: f64) -> f64 {
    if r <= 1e-15 {
        -150.0
    } else if r > 1.0 - 1e-15 {
        150.0
    } else {
        10.0 * (r / (1.0 - r)).log10()
    }
}

pub fn sound_to_harmonicity(
    signal: &AudioSignal,
    params: &HarmonicityParams,
) -> Result<Harmonicity, BackendError> {
    if signal.is_empty() {
        return Err(BackendError::EmptySignal);
    }
    let global_peak = signal.peak();
    if global_peak <= 0.0 {
        return Err(BackendError::Silent);
    }

    let sr = f64::from(signal.sample_rate());
    let window_duration = params.periods_per_window / params.min_pitch;
    let window_len = (window_duration * sr).round().max(1.0) as usize;
    let max_lag = (sr / params.min_pitch).floor() as usize;
    let span = window_len + max_lag + 1;
    let span_duration = span as f64 / sr;

    let duration = signal.duration();
    if duration < span_duration {
        return Err(BackendError::TooShort {
            analysis: "harmonicity",
            needed: span_duration,
            actual: duration,
        });
    }

    let n_frames = ((duration - span_duration) / params.time_step + 1e-9).floor() as usize + 1;
    let t1 = (duration - (n_frames - 1) as f64 * params.time_step) / 2.0;
    let samples = signal.samples();

    let frames = (0..n_frames)
        .map(|i| {
            let t = t1 + i as f64 * params.time_step;
            let start = (t * sr).round() as isize - (span / 2) as isize;
            let segment = extract_frame(samples, start, span);
            let local_peak = segment.iter().fold(0.0_f64, |m, s| m.max(s.abs()));
            if local_peak < params.silence_threshold * global_peak {
                SILENT_FRAME_DB
            } else {
                correlation_to_db(best_correlation(&segment, window_len, max_lag))
            }
        })
        .collect();

    Ok(Harmonicity {
        time_step: params.time_step,
        frames,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) as f64 / (1u64 << 31) as f64) - 0.5
            })
            .collect()
    }

    #[test]
    fn clean_tone_is_highly_harmonic() {
        let sr = 16_000;
        let samples: Vec<f64> = (0..sr)
            .map(|i| 0.5 * (2.0 * std::f64::consts::PI * 150.0 * i as f64 / sr as f64).sin())
            .collect();
        let h = sound_to_harmonicity(&AudioSignal::new(samples, sr as u32), &HarmonicityParams::default())
            .unwrap();
        assert!(h.mean().unwrap() > 25.0, "hnr {:?}", h.mean());
    }

    #[test]
    fn noise_is_not() {
        let h = sound_to_harmonicity(&AudioSignal::new(noise(16_000, 7), 16_000), &HarmonicityParams::default())
            .unwrap();
        assert!(h.mean().unwrap() < 5.0, "hnr {:?}", h.mean());
    }

    #[test]
    fn silence_is_rejected() {
        let sig = AudioSignal::new(vec![0.0; 16_000], 16_000);
        assert_eq!(
            sound_to_harmonicity(&sig, &HarmonicityParams::default()),
            Err(BackendError::Silent)
        );
    }

    #[test]
    fn db_mapping_saturates() {
        assert_eq!(correlation_to_db(0.0), -150.0);
        assert_eq!(correlation_to_db(1.0), 150.0);
        assert!((correlation_to_db(0.5)).abs() < 1e-12);
    }
}
