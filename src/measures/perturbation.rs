use super::{AnalysisContext, MeasureError, MeasureResult, finite};
use crate::backend::{PitchTrack, PointProcess};
use crate::dsp::{mean, mean_std};
use crate::signal::AudioSignal;

/// Shortest and longest admissible glottal period, seconds.
pub const SHORTEST_PERIOD: f64 = 0.0001;
pub const LONGEST_PERIOD: f64 = 0.02;
/// Largest ratio between neighbouring periods that still counts as one phonation.
pub const MAX_PERIOD_FACTOR: f64 = 1.3;
/// Largest ratio between neighbouring period amplitudes for shimmer.
pub const MAX_AMPLITUDE_FACTOR: f64 = 1.6;

// ── F0 ──

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct F0Summary {
    pub mean: f64,
    /// Population standard deviation.
    pub sd: f64,
    pub min: f64,
    pub max: f64,
}

impl F0Summary {
    pub fn range(&self) -> f64 {
        self.max - self.min
    }
}

/// Summary of the voiced frames of a pitch track.
pub fn f0_summary(pitch: &PitchTrack) -> MeasureResult<F0Summary> {
    let voiced = pitch.voiced_frequencies();
    let (mean, sd) = mean_std(&voiced).ok_or(MeasureError::Unvoiced)?;
    let min = voiced.iter().copied().fold(f64::INFINITY, f64::min);
    let max = voiced.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok(F0Summary { mean, sd, min, max })
}

/// Voiced pitch frames over all pitch frames.
pub fn articulation_rate(ctx: &AnalysisContext) -> MeasureResult<f64> {
    ctx.pitch()?
        .voiced_fraction()
        .ok_or(MeasureError::InsufficientData("empty pitch track"))
}

// ── Cycle-to-cycle perturbation ──

/// A per-period quantity (period length or peak amplitude) with the periods it belongs to.
///
/// Only runs of consecutive periods that are all inside the admissible range,
/// pairwise within `MAX_PERIOD_FACTOR`, and (for amplitudes) pairwise within
/// `value_factor` contribute to a measure.
pub struct CycleSeries {
    values: Vec<f64>,
    periods: Vec<f64>,
    value_factor: Option<f64>,
}

fn period_ok(p: f64) -> bool {
    (SHORTEST_PERIOD..=LONGEST_PERIOD).contains(&p)
}

fn ratio_ok(a: f64, b: f64, factor: f64) -> bool {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    lo > 0.0 && hi / lo <= factor
}

impl CycleSeries {
    /// Period lengths from glottal pulses.
    pub fn periods(pulses: &PointProcess) -> Self {
        let periods = pulses.periods();
        Self {
            values: periods.clone(),
            periods,
            value_factor: None,
        }
    }

    /// Peak absolute amplitude inside each period.
    pub fn amplitudes(signal: &AudioSignal, pulses: &PointProcess) -> Self {
        let sr = f64::from(signal.sample_rate());
        let samples = signal.samples();
        let values = pulses
            .times
            .windows(2)
            .map(|w| {
                let lo = (w[0] * sr).ceil().max(0.0) as usize;
                let hi = ((w[1] * sr).floor().max(0.0) as usize).min(samples.len().saturating_sub(1));
                samples
                    .get(lo..=hi)
                    .map(|s| s.iter().fold(0.0_f64, |m, v| m.max(v.abs())))
                    .unwrap_or(0.0)
            })
            .collect();
        Self {
            values,
            periods: pulses.periods(),
            value_factor: Some(MAX_AMPLITUDE_FACTOR),
        }
    }

    /// Mean value over admissible periods; the normalizer of the relative measures.
    fn mean_value(&self) -> MeasureResult<f64> {
        let admissible: Vec<f64> = self
            .values
            .iter()
            .zip(&self.periods)
            .filter(|(_, p)| period_ok(**p))
            .map(|(v, _)| *v)
            .collect();
        match mean(&admissible) {
            Some(m) if m > 0.0 => Ok(m),
            Some(_) => Err(MeasureError::Degenerate("zero mean")),
            None => Err(MeasureError::InsufficientData("no admissible periods")),
        }
    }

    /// Value windows of `width` consecutive periods that pass every check.
    fn windows(&self, width: usize) -> Vec<&[f64]> {
        let n = self.values.len();
        if width == 0 || n < width {
            return Vec::new();
        }
        (0..=n - width)
            .filter(|&start| {
                let periods = &self.periods[start..start + width];
                let values = &self.values[start..start + width];
                periods.iter().all(|p| period_ok(*p))
                    && periods.windows(2).all(|w| ratio_ok(w[0], w[1], MAX_PERIOD_FACTOR))
                    && self
                        .value_factor
                        .is_none_or(|f| values.windows(2).all(|w| ratio_ok(w[0], w[1], f)))
            })
            .map(|start| &self.values[start..start + width])
            .collect()
    }

    fn mean_over_windows(&self, width: usize, f: impl Fn(&[f64]) -> f64) -> MeasureResult<f64> {
        let terms: Vec<f64> = self.windows(width).into_iter().map(f).collect();
        mean(&terms).ok_or(MeasureError::InsufficientData("no comparable cycles"))
    }

    /// Mean absolute difference of neighbours, in the units of the values.
    pub fn absolute_local(&self) -> MeasureResult<f64> {
        finite(self.mean_over_windows(2, |w| (w[1] - w[0]).abs())?)
    }

    /// Absolute local perturbation relative to the mean value.
    pub fn local(&self) -> MeasureResult<f64> {
        finite(self.absolute_local()? / self.mean_value()?)
    }

    /// Mean |20 log10(v[i+1]/v[i])|.
    pub fn local_db(&self) -> MeasureResult<f64> {
        finite(self.mean_over_windows(2, |w| (20.0 * (w[1] / w[0]).log10()).abs())?)
    }

    /// `width`-point perturbation quotient: deviation of the centre from the window mean.
    pub fn quotient(&self, width: usize) -> MeasureResult<f64> {
        let mid = width / 2;
        let numerator = self.mean_over_windows(width, |w| {
            let avg = w.iter().sum::<f64>() / w.len() as f64;
            (w[mid] - avg).abs()
        })?;
        finite(numerator / self.mean_value()?)
    }

    /// Mean absolute second difference relative to the mean value.
    pub fn second_difference(&self) -> MeasureResult<f64> {
        let numerator = self.mean_over_windows(3, |w| ((w[2] - w[1]) - (w[1] - w[0])).abs())?;
        finite(numerator / self.mean_value()?)
    }
}

/// All jitter variants from one pulse train.
#[derive(Debug, Clone, PartialEq)]
pub struct Jitter {
    pub local: MeasureResult<f64>,
    pub local_abs: MeasureResult<f64>,
    pub rap: MeasureResult<f64>,
    pub ppq5: MeasureResult<f64>,
    pub ddp: MeasureResult<f64>,
}

pub fn jitter(ctx: &AnalysisContext) -> Jitter {
    match ctx.pulses() {
        Ok(pulses) => {
            let series = CycleSeries::periods(pulses);
            Jitter {
                local: series.local(),
                local_abs: series.absolute_local(),
                rap: series.quotient(3),
                ppq5: series.quotient(5),
                ddp: series.second_difference(),
            }
        }
        Err(e) => Jitter {
            local: Err(e.clone()),
            local_abs: Err(e.clone()),
            rap: Err(e.clone()),
            ppq5: Err(e.clone()),
            ddp: Err(e),
        },
    }
}

/// All shimmer variants from one pulse train.
#[derive(Debug, Clone, PartialEq)]
pub struct Shimmer {
    pub local: MeasureResult<f64>,
    pub local_db: MeasureResult<f64>,
    pub apq3: MeasureResult<f64>,
    pub apq5: MeasureResult<f64>,
    pub apq11: MeasureResult<f64>,
    pub dda: MeasureResult<f64>,
}

pub fn shimmer(ctx: &AnalysisContext) -> Shimmer {
    match ctx.pulses() {
        Ok(pulses) => {
            let series = CycleSeries::amplitudes(ctx.signal(), pulses);
            Shimmer {
                local: series.local(),
                local_db: series.local_db(),
                apq3: series.quotient(3),
                apq5: series.quotient(5),
                apq11: series.quotient(11),
                dda: series.second_difference(),
            }
        }
        Err(e) => Shimmer {
            local: Err(e.clone()),
            local_db: Err(e.clone()),
            apq3: Err(e.clone()),
            apq5: Err(e.clone()),
            apq11: Err(e.clone()),
            dda: Err(e),
        },
    }
}

// ── Noise ──

/// Mean harmonics-to-noise ratio over non-silent frames, dB.
pub fn hnr(ctx: &AnalysisContext) -> MeasureResult<f64> {
    let harmonicity = ctx.harmonicity()?;
    finite(harmonicity.mean().ok_or(MeasureError::Unvoiced)?)
}

/// Noise-to-harmonics ratio from HNR (dB): `1 / 10^(hnr/10)`.
pub fn nhr(hnr: &MeasureResult<f64>) -> MeasureResult<f64> {
    match hnr {
        Ok(h) if *h == 0.0 => Err(MeasureError::Degenerate("zero hnr")),
        Ok(h) => finite(1.0 / 10f64.powf(h / 10.0)),
        Err(e) => Err(e.clone()),
    }
}
