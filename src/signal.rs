use std::sync::Arc;

/// Recordings shorter than this are rejected before any analysis.
pub const MIN_DURATION_SECS: f64 = 1.0;

/// Mono PCM at a fixed sample rate, shared cheaply between analyzers.
#[derive(Debug, Clone)]
pub struct AudioSignal {
    samples: Arc<[f64]>,
    sample_rate: u32,
}

impl AudioSignal {
    pub fn new(samples: Vec<f64>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    pub fn is_too_short(&self) -> bool {
        self.duration() < MIN_DURATION_SECS
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f64 {
        self.samples.iter().fold(0.0_f64, |m, s| m.max(s.abs()))
    }

    /// Every `step`-th sample, with `step = max(1, len / max_len)`.
    ///
    /// The quadratic nonlinear measures run on this view to stay tractable.
    pub fn decimated(&self, max_len: usize) -> Vec<f64> {
        let step = (self.samples.len() / max_len.max(1)).max(1);
        self.samples.iter().step_by(step).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_and_threshold() {
        let sig = AudioSignal::new(vec![0.0; 15_999], 16_000);
        assert!(sig.is_too_short());
        let sig = AudioSignal::new(vec![0.0; 16_000], 16_000);
        assert!(!sig.is_too_short());
        assert_eq!(sig.duration(), 1.0);
    }

    #[test]
    fn decimation_step() {
        let sig = AudioSignal::new((0..12_000).map(f64::from).collect(), 16_000);
        let d = sig.decimated(5000);
        assert_eq!(d.len(), 6000);
        assert_eq!(d[1], 2.0);

        let short = AudioSignal::new(vec![1.0; 100], 16_000);
        assert_eq!(short.decimated(5000).len(), 100);
    }

    #[test]
    fn peak_is_absolute() {
        let sig = AudioSignal::new(vec![0.1, -0.7, 0.5], 16_000);
        assert_eq!(sig.peak(), 0.7);
    }
}
