use super::cepstral::{HOP, N_FFT};
use super::{MeasureError, MeasureResult, finite};
use crate::dsp::median_in_place;
use crate::dsp::spectrum::Stft;
use crate::signal::AudioSignal;

/// Median filter length for harmonic/percussive separation, in frames and bins.
const HPSS_KERNEL: usize = 31;
const MASK_POWER: i32 = 2;

fn reflect(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

/// Running median with half-sample symmetric reflection at the edges.
fn median_filter(x: &[f64], kernel: usize) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }
    let half = (kernel / 2) as isize;
    let mut scratch = vec![0.0; kernel];
    (0..n as isize)
        .map(|i| {
            for (k, slot) in scratch.iter_mut().enumerate() {
                *slot = x[reflect(i - half + k as isize, n)];
            }
            median_in_place(&mut scratch).unwrap_or(0.0)
        })
        .collect()
}

/// Soft masks from median-filtered magnitude: harmonic mask `[frame][bin]`.
fn harmonic_mask(magnitude: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n_frames = magnitude.len();
    let n_bins = magnitude.first().map_or(0, Vec::len);

    // Harmonic: smooth each bin along time.
    let mut harmonic = vec![vec![0.0; n_bins]; n_frames];
    let mut track = vec![0.0; n_frames];
    for bin in 0..n_bins {
        for (t, frame) in magnitude.iter().enumerate() {
            track[t] = frame[bin];
        }
        for (t, v) in median_filter(&track, HPSS_KERNEL).into_iter().enumerate() {
            harmonic[t][bin] = v;
        }
    }

    // Percussive: smooth each frame along frequency.
    magnitude
        .iter()
        .zip(&harmonic)
        .map(|(frame, h_frame)| {
            let percussive = median_filter(frame, HPSS_KERNEL);
            h_frame
                .iter()
                .zip(&percussive)
                .map(|(&h, &p)| {
                    let z = h.max(p);
                    if z < f64::MIN_POSITIVE {
                        return 0.0;
                    }
                    let hm = (h / z).powi(MASK_POWER);
                    let pm = (p / z).powi(MASK_POWER);
                    hm / (hm + pm)
                })
                .collect()
        })
        .collect()
}

/// Share of signal energy in the harmonic component of a median-filter HPSS.
pub fn spectral_harmonicity(signal: &AudioSignal) -> MeasureResult<f64> {
    let samples = signal.samples();
    let total: f64 = samples.iter().map(|x| x * x).sum();
    if total <= 0.0 {
        return Err(MeasureError::Degenerate("zero energy"));
    }

    let mut stft = Stft::compute(samples, N_FFT, HOP);
    let mask = harmonic_mask(&stft.magnitude());
    for (frame, m) in stft.frames.iter_mut().zip(&mask) {
        for (c, w) in frame.iter_mut().zip(m) {
            *c *= *w;
        }
    }
    let harmonic = stft.inverse(samples.len());
    let harmonic_energy: f64 = harmonic.iter().map(|x| x * x).sum();
    finite(harmonic_energy / total)
}

/// Amplitude floor and dynamic range of the frame levels, as in an amplitude-to-dB conversion.
const LEVEL_AMIN: f64 = 1e-5;
const LEVEL_TOP_DB: f64 = 80.0;

/// Spread between the loudest and quietest 2048-sample frame RMS, dB.
///
/// Levels are floored at `LEVEL_AMIN` and clipped to `LEVEL_TOP_DB` below the
/// loudest frame, so the range never exceeds 80 dB.
pub fn energy_range_db(signal: &AudioSignal) -> MeasureResult<f64> {
    let samples = signal.samples();
    if samples.is_empty() {
        return Err(MeasureError::InsufficientData("empty signal"));
    }
    let pad = N_FFT / 2;
    let mut padded = vec![0.0; samples.len() + 2 * pad];
    padded[pad..pad + samples.len()].copy_from_slice(samples);

    let levels: Vec<f64> = padded
        .windows(N_FFT)
        .step_by(HOP)
        .map(|frame| {
            let rms = (frame.iter().map(|x| x * x).sum::<f64>() / N_FFT as f64).sqrt();
            20.0 * rms.max(LEVEL_AMIN).log10()
        })
        .collect();

    let max = levels.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = levels
        .iter()
        .map(|&l| l.max(max - LEVEL_TOP_DB))
        .fold(f64::INFINITY, f64::min);
    finite(max - min)
}
