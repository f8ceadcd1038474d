//! Whole-signal sample-rate conversion on top of rubato's FFT resampler.

use rubato::{FftFixedIn, Resampler};
use thiserror::Error;

/// Input frames handed to rubato per call.
const CHUNK_FRAMES: usize = 1024;
const SUB_CHUNKS: usize = 2;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResampleError {
    #[error("resampler setup failed: {0}")]
    Construction(String),
    #[error("resampling failed: {0}")]
    Process(String),
}

impl From<rubato::ResamplerConstructionError> for ResampleError {
    fn from(e: rubato::ResamplerConstructionError) -> Self {
        ResampleError::Construction(e.to_string())
    }
}

impl From<rubato::ResampleError> for ResampleError {
    fn from(e: rubato::ResampleError) -> Self {
        ResampleError::Process(e.to_string())
    }
}

/// Convert mono `samples` from `from_rate` to `to_rate`.
///
/// The output is aligned with the input (the resampler delay is trimmed) and
/// holds `round(len * to_rate / from_rate)` samples.
pub fn resample(samples: &[f64], from_rate: u32, to_rate: u32) -> Result<Vec<f64>, ResampleError> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let expected = (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).round() as usize;

    let mut resampler = FftFixedIn::<f64>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_FRAMES,
        SUB_CHUNKS,
        1,
    )?;
    let delay = resampler.output_delay();
    let wanted = delay + expected;
    let mut out = Vec::with_capacity(wanted + CHUNK_FRAMES);

    let mut pos = 0;
    while pos + resampler.input_frames_next() <= samples.len() {
        let n = resampler.input_frames_next();
        let chunk: &[&[f64]] = &[&samples[pos..pos + n]];
        let chunk = resampler.process(chunk, None)?;
        out.extend_from_slice(&chunk[0]);
        pos += n;
    }
    let tail: &[&[f64]] = &[&samples[pos..]];
    let tail = resampler.process_partial(Some(tail), None)?;
    out.extend_from_slice(&tail[0]);

    // Flush the delay line with silence.
    while out.len() < wanted {
        let chunk = resampler.process_partial(None::<&[&[f64]]>, None)?;
        if chunk[0].is_empty() {
            break;
        }
        out.extend_from_slice(&chunk[0]);
    }

    out.drain(..delay.min(out.len()));
    out.resize(expected, 0.0);
    log::trace!("resampled {} -> {} samples ({} -> {} Hz)", samples.len(), out.len(), from_rate, to_rate);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, sr: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sr).sin())
            .collect()
    }

    #[test]
    fn same_rate_is_identity() {
        let x = sine(200.0, 16_000.0, 500);
        assert_eq!(resample(&x, 16_000, 16_000).unwrap(), x);
        assert!(resample(&[], 44_100, 16_000).unwrap().is_empty());
    }

    #[test]
    fn downsampled_tone_stays_aligned() {
        let x = sine(200.0, 16_000.0, 16_000);
        let y = resample(&x, 16_000, 11_000).unwrap();
        assert_eq!(y.len(), 11_000);
        let expected = sine(200.0, 11_000.0, 11_000);
        for i in 500..10_500 {
            assert!((y[i] - expected[i]).abs() < 0.02, "sample {i}: {} vs {}", y[i], expected[i]);
        }
    }

    #[test]
    fn odd_length_upsampling() {
        let x = sine(440.0, 22_050.0, 22_051);
        let y = resample(&x, 22_050, 32_000).unwrap();
        assert_eq!(y.len(), (22_051.0_f64 * 32_000.0 / 22_050.0).round() as usize);
    }
}
