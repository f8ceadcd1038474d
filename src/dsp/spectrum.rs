use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Periodic Hann window (the `fftbins=True` flavour used for spectral analysis).
pub fn hann(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / n as f64).cos())
        .collect()
}

/// Short-time Fourier transform with centered frames.
///
/// The input is zero-padded by `n_fft / 2` on both sides, so frame `t` is
/// centered on sample `t * hop`. Each frame keeps the `n_fft / 2 + 1`
/// non-negative frequency bins.
pub struct Stft {
    pub n_fft: usize,
    pub hop: usize,
    pub frames: Vec<Vec<Complex<f64>>>,
}

impl Stft {
    pub fn compute(samples: &[f64], n_fft: usize, hop: usize) -> Self {
        let pad = n_fft / 2;
        let mut padded = vec![0.0; samples.len() + 2 * pad];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        let window = hann(n_fft);
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(n_fft);
        let n_bins = n_fft / 2 + 1;

        let n_frames = if padded.len() >= n_fft {
            1 + (padded.len() - n_fft) / hop
        } else {
            0
        };

        let mut frames = Vec::with_capacity(n_frames);
        let mut buf = vec![Complex::new(0.0, 0.0); n_fft];
        for t in 0..n_frames {
            let start = t * hop;
            for (i, slot) in buf.iter_mut().enumerate() {
                *slot = Complex::new(padded[start + i] * window[i], 0.0);
            }
            fft.process(&mut buf);
            frames.push(buf[..n_bins].to_vec());
        }

        Self { n_fft, hop, frames }
    }

    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    /// Magnitude spectrogram, `[frame][bin]`.
    pub fn magnitude(&self) -> Vec<Vec<f64>> {
        self.frames
            .iter()
            .map(|f| f.iter().map(|c| c.norm()).collect())
            .collect()
    }

    /// Power spectrogram, `[frame][bin]`.
    pub fn power(&self) -> Vec<Vec<f64>> {
        self.frames
            .iter()
            .map(|f| f.iter().map(|c| c.norm_sqr()).collect())
            .collect()
    }

    /// Inverse STFT by weighted overlap-add, trimmed back to `length` samples.
    pub fn inverse(&self, length: usize) -> Vec<f64> {
        let n_fft = self.n_fft;
        let pad = n_fft / 2;
        let window = hann(n_fft);
        let total = n_fft + self.hop * self.frames.len().saturating_sub(1);

        let mut out = vec![0.0; total.max(length + 2 * pad)];
        let mut norm = vec![0.0; out.len()];

        let mut planner = FftPlanner::<f64>::new();
        let ifft = planner.plan_fft_inverse(n_fft);
        let mut buf = vec![Complex::new(0.0, 0.0); n_fft];

        for (t, frame) in self.frames.iter().enumerate() {
            hermitian_fill(frame, &mut buf);
            ifft.process(&mut buf);
            let start = t * self.hop;
            for i in 0..n_fft {
                let w = window[i];
                out[start + i] += buf[i].re / n_fft as f64 * w;
                norm[start + i] += w * w;
            }
        }

        for (y, w) in out.iter_mut().zip(&norm) {
            if *w > f64::MIN_POSITIVE {
                *y /= w;
            }
        }

        out.into_iter().skip(pad).take(length).collect()
    }
}

/// Rebuild a full `buf.len()`-point spectrum from its non-negative half.
fn hermitian_fill(half: &[Complex<f64>], buf: &mut [Complex<f64>]) {
    let n = buf.len();
    for (k, slot) in buf.iter_mut().enumerate() {
        *slot = if k < half.len() {
            half[k]
        } else {
            half[n - k].conj()
        };
    }
}

/// Real cepstrum of an already-windowed frame: inverse FFT of the dB power spectrum.
///
/// Power is floored at `1e-12` before the logarithm.
pub fn power_cepstrum(frame: &[f64], planner: &mut FftPlanner<f64>) -> Vec<f64> {
    let n = frame.len();
    let fft = planner.plan_fft_forward(n);
    let ifft = planner.plan_fft_inverse(n);

    let mut buf: Vec<Complex<f64>> = frame.iter().map(|&x| Complex::new(x, 0.0)).collect();
    fft.process(&mut buf);
    for c in buf.iter_mut() {
        let power = c.norm_sqr().max(1e-12);
        *c = Complex::new(10.0 * power.log10(), 0.0);
    }
    ifft.process(&mut buf);
    buf.iter().map(|c| c.re / n as f64).collect()
}
