//! Nonlinear dynamics of the waveform and the pitch contour.
//!
//! The waveform measures are quadratic in the series length, so they run on a
//! decimated copy of the signal (see `AudioSignal::decimated`).

use super::{MeasureError, MeasureResult, finite};
use crate::dsp::{linear_fit, mean, sample_std};

/// Target lengths of the decimated series.
pub const ENTROPY_MAX_LEN: usize = 5000;
pub const DFA_MAX_LEN: usize = 5000;
pub const D2_MAX_LEN: usize = 3000;

pub const PPE_BINS: usize = 30;

// ── Sample entropy ──

/// Sample entropy with Chebyshev distance and tolerance `0.2 * sd`.
///
/// Reported as `rpde`: a recurrence-period proxy that tracks the same
/// regularity of the waveform.
pub fn sample_entropy(data: &[f64], emb_dim: usize) -> MeasureResult<f64> {
    let n = data.len();
    if n <= emb_dim + 1 {
        return Err(MeasureError::InsufficientData("series shorter than embedding"));
    }
    let sd = sample_std(data).ok_or(MeasureError::InsufficientData("too few samples"))?;
    if sd <= 0.0 {
        return Err(MeasureError::Degenerate("constant series"));
    }
    let tolerance = 0.2 * sd;

    // Templates of length m + 1; counts for m use the same template starts.
    let n_templates = n - emb_dim;
    let mut matches_m = 0u64;
    let mut matches_m1 = 0u64;
    for i in 0..n_templates - 1 {
        let a = &data[i..i + emb_dim + 1];
        for j in i + 1..n_templates {
            let b = &data[j..j + emb_dim + 1];
            let mut dist = 0.0_f64;
            for k in 0..emb_dim {
                dist = dist.max((a[k] - b[k]).abs());
            }
            if dist < tolerance {
                matches_m += 1;
                if (a[emb_dim] - b[emb_dim]).abs().max(dist) < tolerance {
                    matches_m1 += 1;
                }
            }
        }
    }

    if matches_m == 0 || matches_m1 == 0 {
        return Err(MeasureError::Degenerate("no template matches"));
    }
    finite(-(matches_m1 as f64 / matches_m as f64).ln())
}

// ── Detrended fluctuation analysis ──

/// Integer window sizes growing geometrically from `min_n` up to `max_n`.
pub fn logarithmic_n(min_n: f64, max_n: f64, factor: f64) -> Vec<usize> {
    if max_n <= min_n || factor <= 1.0 {
        return Vec::new();
    }
    let max_i = ((max_n / min_n).ln() / factor.ln()).floor() as i32;
    let mut ns = vec![min_n as usize];
    for i in 0..=max_i {
        let n = (min_n * factor.powi(i)).floor() as usize;
        if n > *ns.last().unwrap_or(&0) {
            ns.push(n);
        }
    }
    ns
}

fn fluctuation(profile: &[f64], n: usize) -> Option<f64> {
    let step = (n / 2).max(1);
    if profile.len() < n {
        return None;
    }
    let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let flucs: Vec<f64> = (0..=profile.len() - n)
        .step_by(step)
        .filter_map(|start| {
            let window = &profile[start..start + n];
            let (slope, intercept) = linear_fit(&x, window)?;
            let ss: f64 = window
                .iter()
                .zip(&x)
                .map(|(y, xi)| (y - (slope * xi + intercept)).powi(2))
                .sum();
            Some((ss / n as f64).sqrt())
        })
        .collect();
    mean(&flucs)
}

/// DFA scaling exponent: slope of log F(n) against log n.
pub fn dfa(data: &[f64]) -> MeasureResult<f64> {
    let ns = logarithmic_n(4.0, 0.1 * data.len() as f64, 1.2);
    if ns.len() < 2 {
        return Err(MeasureError::InsufficientData("series too short for dfa"));
    }
    let avg = mean(data).ok_or(MeasureError::InsufficientData("empty series"))?;
    let mut acc = 0.0;
    let profile: Vec<f64> = data
        .iter()
        .map(|v| {
            acc += v - avg;
            acc
        })
        .collect();

    let (log_n, log_f): (Vec<f64>, Vec<f64>) = ns
        .iter()
        .filter_map(|&n| {
            let f = fluctuation(&profile, n)?;
            (f > 0.0).then(|| ((n as f64).ln(), f.ln()))
        })
        .unzip();
    let (slope, _) = linear_fit(&log_n, &log_f).ok_or(MeasureError::Degenerate("flat fluctuation"))?;
    finite(slope)
}

// ── Correlation dimension ──

/// Radii growing geometrically from `min_r` while not exceeding `max_r`.
fn logarithmic_r(min_r: f64, max_r: f64, factor: f64) -> Vec<f64> {
    let max_i = ((max_r / min_r).ln() / factor.ln()).floor() as i32;
    (0..=max_i).map(|i| min_r * factor.powi(i)).collect()
}

/// Grassberger-Procaccia correlation dimension with delay-1 embedding.
pub fn correlation_dimension(data: &[f64], emb_dim: usize) -> MeasureResult<f64> {
    if data.len() < emb_dim + 2 {
        return Err(MeasureError::InsufficientData("series shorter than embedding"));
    }
    let sd = sample_std(data).ok_or(MeasureError::InsufficientData("too few samples"))?;
    if sd <= 0.0 {
        return Err(MeasureError::Degenerate("constant series"));
    }
    let radii = logarithmic_r(0.1 * sd, 0.5 * sd, 1.03);
    let radii_sq: Vec<f64> = radii.iter().map(|r| r * r).collect();

    let n = data.len() - emb_dim + 1;
    // counts[k]: pairs whose distance falls below radii[k] but not radii[k - 1].
    let mut counts = vec![0u64; radii.len()];
    for i in 0..n - 1 {
        let a = &data[i..i + emb_dim];
        for j in i + 1..n {
            let b = &data[j..j + emb_dim];
            let d2: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
            let first = radii_sq.partition_point(|r2| *r2 <= d2);
            if first < counts.len() {
                counts[first] += 1;
            }
        }
    }

    let pairs = (n * (n - 1)) as f64 / 2.0;
    let mut cumulative = 0u64;
    let (log_r, log_c): (Vec<f64>, Vec<f64>) = radii
        .iter()
        .zip(&counts)
        .filter_map(|(r, c)| {
            cumulative += c;
            (cumulative > 0).then(|| (r.ln(), (cumulative as f64 / pairs).ln()))
        })
        .unzip();
    let (slope, _) = linear_fit(&log_r, &log_c).ok_or(MeasureError::Degenerate("no neighbours"))?;
    finite(slope)
}

// ── Pitch period entropy ──

/// Entropy (bits) of the semitone steps between consecutive voiced F0 values.
pub fn pitch_period_entropy(voiced_f0: &[f64]) -> MeasureResult<f64> {
    if voiced_f0.len() < 3 {
        return Err(MeasureError::InsufficientData("fewer than three voiced frames"));
    }
    let steps: Vec<f64> = voiced_f0
        .windows(2)
        .map(|w| 12.0 * (w[1] / w[0]).log2())
        .collect();

    let mut lo = steps.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = steps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(lo.is_finite() && hi.is_finite()) {
        return Err(MeasureError::NonFinite);
    }
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }

    let mut hist = [0u64; PPE_BINS];
    let width = (hi - lo) / PPE_BINS as f64;
    for s in &steps {
        let bin = (((s - lo) / width) as usize).min(PPE_BINS - 1);
        hist[bin] += 1;
    }
    let total = steps.len() as f64;
    let entropy: f64 = hist
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum();
    finite(entropy)
}
