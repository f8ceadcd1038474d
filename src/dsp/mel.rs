//! Mel filterbank, dB conversion and DCT in the conventions of the common
//! Python audio stack (Slaney mel scale, area-normalized triangles).

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4_f64.ln() / 27.0
}

pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Triangular mel filters spanning `0..sample_rate/2`, `[band][bin]`.
pub struct MelFilterbank {
    weights: Vec<Vec<f64>>,
}

impl MelFilterbank {
    pub fn new(sample_rate: f64, n_fft: usize, n_mels: usize) -> Self {
        let n_bins = n_fft / 2 + 1;
        let fft_freqs: Vec<f64> = (0..n_bins)
            .map(|k| k as f64 * sample_rate / n_fft as f64)
            .collect();

        let max_mel = hz_to_mel(sample_rate / 2.0);
        let mel_points: Vec<f64> = (0..n_mels + 2)
            .map(|i| mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64))
            .collect();

        let weights = (0..n_mels)
            .map(|m| {
                let (lo, center, hi) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
                let enorm = 2.0 / (hi - lo);
                fft_freqs
                    .iter()
                    .map(|&f| {
                        let lower = (f - lo) / (center - lo);
                        let upper = (hi - f) / (hi - center);
                        lower.min(upper).max(0.0) * enorm
                    })
                    .collect()
            })
            .collect();

        Self { weights }
    }

    pub fn n_mels(&self) -> usize {
        self.weights.len()
    }

    /// Project one power-spectrum frame onto the mel bands.
    pub fn apply(&self, power: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .map(|w| w.iter().zip(power).map(|(a, b)| a * b).sum())
            .collect()
    }

    /// Mel power spectrogram from a `[frame][bin]` power spectrogram.
    pub fn spectrogram(&self, power: &[Vec<f64>]) -> Vec<Vec<f64>> {
        power.iter().map(|frame| self.apply(frame)).collect()
    }
}

/// Convert a power spectrogram to dB (reference 1.0), flooring at `amin` and
/// clipping everything more than `top_db` below the global maximum.
pub fn power_to_db(spec: &mut [Vec<f64>], amin: f64, top_db: f64) {
    let mut max_db = f64::NEG_INFINITY;
    for frame in spec.iter_mut() {
        for v in frame.iter_mut() {
            *v = 10.0 * v.max(amin).log10();
            max_db = max_db.max(*v);
        }
    }
    let floor = max_db - top_db;
    for frame in spec.iter_mut() {
        for v in frame.iter_mut() {
            *v = v.max(floor);
        }
    }
}

/// Orthonormal DCT-II keeping the first `n_coeffs` outputs.
pub fn dct_ortho(input: &[f64], n_coeffs: usize) -> Vec<f64> {
    let n = input.len() as f64;
    (0..n_coeffs)
        .map(|k| {
            let sum: f64 = input
                .iter()
                .enumerate()
                .map(|(i, &x)| {
                    x * (std::f64::consts::PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos()
                })
                .sum();
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            sum * scale
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mel_scale_round_trips() {
        for hz in [0.0, 440.0, 1000.0, 3500.0, 8000.0] {
            assert_relative_eq!(mel_to_hz(hz_to_mel(hz)), hz, epsilon = 1e-9);
        }
        assert_relative_eq!(hz_to_mel(1000.0), 15.0);
    }

    #[test]
    fn filterbank_shape() {
        let fb = MelFilterbank::new(16_000.0, 2048, 128);
        assert_eq!(fb.n_mels(), 128);
        let flat = vec![1.0; 1025];
        let bands = fb.apply(&flat);
        assert!(bands.iter().all(|b| *b >= 0.0));
        assert!(bands.iter().any(|b| *b > 0.0));
    }

    #[test]
    fn db_clips_to_top_db() {
        let mut spec = vec![vec![1.0, 1e-12, 0.0]];
        power_to_db(&mut spec, 1e-10, 80.0);
        assert_relative_eq!(spec[0][0], 0.0);
        assert_relative_eq!(spec[0][1], -80.0);
        assert_relative_eq!(spec[0][2], -80.0);
    }

    #[test]
    fn dct_of_constant_has_only_dc() {
        let c = dct_ortho(&[2.0; 8], 4);
        assert_relative_eq!(c[0], 2.0 * 8.0_f64.sqrt(), epsilon = 1e-12);
        for v in &c[1..] {
            assert!(v.abs() < 1e-12);
        }
    }
}
