use rustfft::FftPlanner;

use super::{MeasureError, MeasureResult, finite};
use crate::dsp::mel::{MelFilterbank, dct_ortho, power_to_db};
use crate::dsp::spectrum::{Stft, hann, power_cepstrum};
use crate::dsp::{linear_fit, mean};
use crate::signal::AudioSignal;

const CPP_FRAME_SECS: f64 = 0.040;
const CPP_HOP_SECS: f64 = 0.010;
/// Quefrency search band expressed as pitch limits.
const CPP_MAX_F0: f64 = 500.0;
const CPP_MIN_F0: f64 = 75.0;

pub const N_FFT: usize = 2048;
pub const HOP: usize = 512;
pub const N_MELS: usize = 128;
pub const N_MFCC: usize = 13;

/// Cepstral peak prominence of one windowed frame, dB.
fn frame_cpp(frame: &[f64], lo: usize, hi: usize, planner: &mut FftPlanner<f64>) -> Option<f64> {
    let cep = power_cepstrum(frame, planner);
    let region = cep.get(lo..hi)?;
    let (peak_idx, &peak) = region
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))?;
    let q: Vec<f64> = (0..region.len()).map(|i| i as f64).collect();
    let (slope, intercept) = linear_fit(&q, region)?;
    Some(peak - (slope * peak_idx as f64 + intercept))
}

/// Mean cepstral peak prominence over 40 ms Hann frames with a 10 ms hop.
///
/// The peak is searched between the quefrencies of 500 Hz and 75 Hz and
/// measured above a straight-line fit of that region.
pub fn cpp(signal: &AudioSignal) -> MeasureResult<f64> {
    let sr = f64::from(signal.sample_rate());
    let samples = signal.samples();
    let frame_len = (CPP_FRAME_SECS * sr) as usize;
    let hop = ((CPP_HOP_SECS * sr) as usize).max(1);
    if samples.len() <= frame_len {
        return Err(MeasureError::InsufficientData("shorter than one cepstral frame"));
    }
    let lo = (sr / CPP_MAX_F0) as usize;
    let hi = ((sr / CPP_MIN_F0) as usize).min(frame_len - 1);

    let window = hann(frame_len);
    let mut planner = FftPlanner::new();
    let values: Vec<f64> = (0..samples.len() - frame_len)
        .step_by(hop)
        .filter_map(|start| {
            let frame: Vec<f64> = samples[start..start + frame_len]
                .iter()
                .zip(&window)
                .map(|(s, w)| s * w)
                .collect();
            frame_cpp(&frame, lo, hi, &mut planner)
        })
        .collect();

    finite(mean(&values).ok_or(MeasureError::InsufficientData("no cepstral frames"))?)
}

/// Log-mel spectrogram (dB, top 80 dB kept), `[frame][band]`.
pub fn log_mel_spectrogram(signal: &AudioSignal) -> Vec<Vec<f64>> {
    let stft = Stft::compute(signal.samples(), N_FFT, HOP);
    let filterbank = MelFilterbank::new(f64::from(signal.sample_rate()), N_FFT, N_MELS);
    let mut mel = filterbank.spectrogram(&stft.power());
    power_to_db(&mut mel, 1e-10, 80.0);
    mel
}

/// Mean over frames of MFCC number `index` (0-based, so `1` is the second coefficient).
pub fn mfcc_mean(signal: &AudioSignal, index: usize) -> MeasureResult<f64> {
    if index >= N_MFCC {
        return Err(MeasureError::Degenerate("mfcc index out of range"));
    }
    let coeffs: Vec<f64> = log_mel_spectrogram(signal)
        .iter()
        .map(|frame| dct_ortho(frame, index + 1)[index])
        .collect();
    finite(mean(&coeffs).ok_or(MeasureError::InsufficientData("no spectral frames"))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse_train(f0: f64, secs: f64) -> AudioSignal {
        let sr = 16_000;
        let n = (secs * sr as f64) as usize;
        let period = sr as f64 / f0;
        let mut samples = vec![0.0; n];
        let mut t = 0.0;
        while (t as usize) < n {
            samples[t as usize] = 1.0;
            t += period;
        }
        AudioSignal::new(samples, sr)
    }

    fn noise(n: usize) -> Vec<f64> {
        let mut state = 0x2545F4914F6CDD1D_u64;
        (0..n)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state as f64 / u64::MAX as f64) - 0.5
            })
            .collect()
    }

    #[test]
    fn periodic_source_is_more_prominent_than_noise() {
        let periodic = cpp(&pulse_train(125.0, 1.0)).unwrap();
        let noisy = cpp(&AudioSignal::new(noise(16_000), 16_000)).unwrap();
        assert!(periodic > noisy + 3.0, "periodic {periodic} noise {noisy}");
    }

    #[test]
    fn silence_gives_zero_prominence() {
        let v = cpp(&AudioSignal::new(vec![0.0; 16_000], 16_000)).unwrap();
        assert!(v.abs() < 1e-9);
    }

    #[test]
    fn cpp_needs_a_full_frame() {
        let short = AudioSignal::new(vec![0.1; 640], 16_000);
        assert!(cpp(&short).is_err());
    }

    #[test]
    fn mfcc_is_finite_and_deterministic() {
        let sig = AudioSignal::new(noise(16_000), 16_000);
        let a = mfcc_mean(&sig, 1).unwrap();
        let b = mfcc_mean(&sig, 1).unwrap();
        assert!(a.is_finite());
        assert_eq!(a, b);
        assert!(mfcc_mean(&sig, 13).is_err());
    }
}
