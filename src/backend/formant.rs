//! Burg LPC formant tracking.
//!
//! The signal is resampled to twice the formant ceiling, pre-emphasized, cut
//! into Gaussian-windowed frames and fitted with an order-`2 * max_formants`
//! all-pole model. Formants are the upper-half-plane roots of the predictor
//! polynomial, found as companion-matrix eigenvalues.

use nalgebra::DMatrix;
use rustfft::num_complex::Complex;

use super::pitch::extract_frame;
use super::{BackendError, FormantFrame, FormantParams, FormantPoint, FormantTrack};
use crate::dsp::resample::resample;
use crate::signal::AudioSignal;

type C64 = Complex<f64>;

/// Lowest formant kept, and margin below the ceiling.
const EDGE_HZ: f64 = 50.0;

fn gaussian_window(n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![1.0; n];
    }
    let mid = (n - 1) as f64 / 2.0;
    (0..n)
        .map(|i| {
            let x = (i as f64 - mid) / mid;
            (-12.0 * x * x).exp()
        })
        .collect()
}

fn pre_emphasize(samples: &[f64], from_hz: f64, sample_rate: f64) -> Vec<f64> {
    let alpha = (-2.0 * std::f64::consts::PI * from_hz / sample_rate).exp();
    let mut out = samples.to_vec();
    for i in (1..samples.len()).rev() {
        out[i] -= alpha * samples[i - 1];
    }
    out
}

/// Predictor coefficients `a[0..=order]` with `a[0] = 1`, by Burg's method.
fn burg(x: &[f64], order: usize) -> Vec<f64> {
    let n = x.len();
    let mut a = vec![0.0; order + 1];
    a[0] = 1.0;
    if n <= order {
        return a;
    }

    let mut forward = x.to_vec();
    let mut backward = x.to_vec();
    for k in 1..=order {
        let mut num = 0.0;
        let mut den = 0.0;
        for i in k..n {
            num += forward[i] * backward[i - 1];
            den += forward[i] * forward[i] + backward[i - 1] * backward[i - 1];
        }
        if den < 1e-30 {
            break;
        }
        let reflection = -2.0 * num / den;

        // Update in reverse so backward[i - 1] is still the old value.
        for i in (k..n).rev() {
            let f = forward[i];
            forward[i] = f + reflection * backward[i - 1];
            backward[i] = backward[i - 1] + reflection * f;
        }

        let prev = a.clone();
        for i in 1..k {
            a[i] = prev[i] + reflection * prev[k - i];
        }
        a[k] = reflection;
    }
    a
}

/// `(P(z), P'(z))` for `P(z) = z^p + a1 z^(p-1) + ... + ap`.
fn eval_polynomial(a: &[f64], z: C64) -> (C64, C64) {
    let mut p = C64::new(1.0, 0.0);
    let mut dp = C64::new(0.0, 0.0);
    for &c in &a[1..] {
        dp = p + z * dp;
        p = p * z + c;
    }
    (p, dp)
}

fn polish(a: &[f64], mut z: C64) -> C64 {
    for _ in 0..10 {
        let (p, dp) = eval_polynomial(a, z);
        if dp.norm() < 1e-30 {
            break;
        }
        let step = p / dp;
        z -= step;
        if step.norm() < 1e-10 * z.norm() {
            break;
        }
    }
    z
}

fn lpc_roots(a: &[f64]) -> Vec<C64> {
    let order = a.len().saturating_sub(1);
    if order == 0 || a[1..].iter().map(|c| c.abs()).sum::<f64>() < 1e-10 {
        return Vec::new();
    }

    let mut companion = DMatrix::<f64>::zeros(order, order);
    for i in 0..order {
        companion[(0, i)] = -a[i + 1];
    }
    for i in 1..order {
        companion[(i, i - 1)] = 1.0;
    }

    companion
        .schur()
        .complex_eigenvalues()
        .iter()
        .map(|e| {
            let mut z = C64::new(e.re, e.im);
            let r = z.norm();
            if r > 1.0 {
                z = z.conj() / (r * r);
            }
            polish(a, z)
        })
        .collect()
}

fn roots_to_formants(roots: &[C64], sample_rate: f64, ceiling: f64) -> Vec<FormantPoint> {
    let mut formants: Vec<FormantPoint> = roots
        .iter()
        .filter(|z| z.im > 0.0)
        .filter_map(|z| {
            let r = z.norm();
            let frequency = z.arg() * sample_rate / (2.0 * std::f64::consts::PI);
            let bandwidth = if r > 0.0 {
                -r.ln() * sample_rate / std::f64::consts::PI
            } else {
                f64::INFINITY
            };
            (frequency >= EDGE_HZ && frequency <= ceiling - EDGE_HZ && bandwidth > 0.0)
                .then_some(FormantPoint { frequency, bandwidth })
        })
        .collect();
    formants.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
    formants
}

pub fn sound_to_formants(signal: &AudioSignal, params: &FormantParams) -> Result<FormantTrack, BackendError> {
    if signal.is_empty() {
        return Err(BackendError::EmptySignal);
    }
    let original_rate = signal.sample_rate();
    let target_rate = (2.0 * params.max_formant_hz).round() as u32;
    let (samples, sr) = if target_rate < original_rate {
        let resampled = resample(signal.samples(), original_rate, target_rate)
            .map_err(|e| BackendError::Resample(e.to_string()))?;
        (resampled, f64::from(target_rate))
    } else {
        (signal.samples().to_vec(), f64::from(original_rate))
    };
    let samples = pre_emphasize(&samples, params.pre_emphasis_from, sr);

    let physical = 2.0 * params.window_length;
    let duration = signal.duration();
    if duration < physical {
        return Err(BackendError::TooShort {
            analysis: "formants",
            needed: physical,
            actual: duration,
        });
    }
    let mut window_len = (physical * sr).round() as usize;
    if window_len % 2 == 0 {
        window_len += 1;
    }
    let window = gaussian_window(window_len);
    let time_step = if params.time_step > 0.0 {
        params.time_step
    } else {
        params.window_length / 4.0
    };
    let order = 2 * params.max_formants;

    let n_frames = (((duration - physical) / time_step).floor() as usize + 1).max(1);
    let t1 = (duration - (n_frames - 1) as f64 * time_step) / 2.0;

    let frames = (0..n_frames)
        .map(|i| {
            let time = t1 + i as f64 * time_step;
            let start = (time * sr).round() as isize - (window_len / 2) as isize;
            let windowed: Vec<f64> = extract_frame(&samples, start, window_len)
                .iter()
                .zip(&window)
                .map(|(s, w)| s * w)
                .collect();
            let mut formants = roots_to_formants(&lpc_roots(&burg(&windowed, order)), sr, params.max_formant_hz);
            formants.truncate(params.max_formants);
            FormantFrame { time, formants }
        })
        .collect();

    Ok(FormantTrack { time_step, frames })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burg_fits_resonator() {
        // Second-order resonance at 1 kHz, fs = 11 kHz.
        let sr = 11_000.0;
        let (r, theta) = (0.97_f64, 2.0 * std::f64::consts::PI * 1000.0 / sr);
        let (a1, a2) = (-2.0 * r * theta.cos(), r * r);
        let mut x = vec![0.0; 2000];
        x[0] = 1.0;
        for i in 1..x.len() {
            let y1 = x[i - 1];
            let y2 = if i >= 2 { x[i - 2] } else { 0.0 };
            x[i] += -a1 * y1 - a2 * y2;
        }
        let a = burg(&x, 2);
        assert!((a[1] - a1).abs() < 1e-2, "{a:?}");
        assert!((a[2] - a2).abs() < 1e-2, "{a:?}");

        let formants = roots_to_formants(&lpc_roots(&a), sr, 5500.0);
        assert_eq!(formants.len(), 1);
        assert!((formants[0].frequency - 1000.0).abs() < 10.0);
    }

    #[test]
    fn silent_frames_have_no_formants() {
        let sig = AudioSignal::new(vec![0.0; 16_000], 16_000);
        let track = sound_to_formants(&sig, &FormantParams::default()).unwrap();
        assert!(!track.frames.is_empty());
        assert!(track.formant_values(1).is_empty());
    }

    #[test]
    fn frame_grid() {
        let sig = AudioSignal::new(vec![0.0; 16_000], 16_000);
        let track = sound_to_formants(&sig, &FormantParams::default()).unwrap();
        assert!((track.time_step - 0.00625).abs() < 1e-12);
        assert!((152..=153).contains(&track.frames.len()), "{}", track.frames.len());
    }

    #[test]
    fn gaussian_window_peaks_in_middle() {
        let w = gaussian_window(5);
        assert_eq!(w[2], 1.0);
        assert!(w[0] < 1e-5);
    }
}
