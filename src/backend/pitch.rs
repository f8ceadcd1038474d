//! Autocorrelation pitch tracking (Boersma 1993) with Viterbi path selection.

use super::{BackendError, PitchFrame, PitchParams, PitchTrack};
use crate::signal::AudioSignal;

const MAX_CANDIDATES: usize = 15;
const PERIODS_PER_WINDOW: f64 = 3.0;
const VOICING_THRESHOLD: f64 = 0.45;
const SILENCE_THRESHOLD: f64 = 0.03;
const OCTAVE_COST: f64 = 0.01;
const OCTAVE_JUMP_COST: f64 = 0.35;
const VOICED_UNVOICED_COST: f64 = 0.14;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    frequency: f64,
    strength: f64,
}

/// Symmetric Hann window, `0.5 - 0.5 cos(2 pi i / (n - 1))`.
fn hann_symmetric(n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

fn autocorrelation(x: &[f64], max_lag: usize) -> Vec<f64> {
    let n = x.len();
    (0..=max_lag)
        .map(|lag| {
            if lag >= n {
                0.0
            } else {
                x[..n - lag].iter().zip(&x[lag..]).map(|(a, b)| a * b).sum()
            }
        })
        .collect()
}

/// Copy `len` samples starting at `start` (possibly negative), zero-padding outside the signal.
pub(super) fn extract_frame(samples: &[f64], start: isize, len: usize) -> Vec<f64> {
    let mut frame = vec![0.0; len];
    let n = samples.len() as isize;
    let src_start = start.max(0);
    let src_end = (start + len as isize).min(n);
    if src_end > src_start {
        let dst = (src_start - start) as usize;
        let count = (src_end - src_start) as usize;
        frame[dst..dst + count]
            .copy_from_slice(&samples[src_start as usize..src_end as usize]);
    }
    frame
}

/// Local maxima of the window-normalized autocorrelation between `min_lag` and `max_lag`.
fn peak_candidates(
    r: &[f64],
    r_w: &[f64],
    min_lag: usize,
    max_lag: usize,
    sample_rate: f64,
) -> Vec<Candidate> {
    let r0 = r[0];
    if r0 <= 0.0 || r_w[0] <= 0.0 {
        return Vec::new();
    }
    let norm: Vec<f64> = (0..=max_lag)
        .map(|lag| {
            if r_w[lag] > 0.0 {
                (r[lag] / r0) / (r_w[lag] / r_w[0])
            } else {
                0.0
            }
        })
        .collect();

    let mut peaks = Vec::new();
    for lag in min_lag.max(1)..max_lag {
        let (prev, cur, next) = (norm[lag - 1], norm[lag], norm[lag + 1]);
        if !(cur > prev && cur > next) || cur <= 0.5 * VOICING_THRESHOLD {
            continue;
        }
        let denom = prev - 2.0 * cur + next;
        let (refined, mut r) = if denom.abs() > 1e-10 {
            let delta = 0.5 * (prev - next) / denom;
            if delta.abs() < 1.0 {
                (lag as f64 + delta, cur - 0.25 * (prev - next) * delta)
            } else {
                (lag as f64, cur)
            }
        } else {
            (lag as f64, cur)
        };
        // Window correction can push the interpolated peak above 1.
        if r > 1.0 {
            r = 1.0 / r;
        }
        peaks.push(Candidate {
            frequency: sample_rate / refined,
            strength: r,
        });
    }
    peaks.sort_by(|a, b| b.strength.total_cmp(&a.strength));
    peaks.truncate(MAX_CANDIDATES);
    peaks
}

/// Pick one candidate per frame minimizing strength loss plus transition costs.
fn viterbi(frames: &[Vec<Candidate>], time_step: f64) -> Vec<usize> {
    let n = frames.len();
    if n == 0 {
        return Vec::new();
    }
    let time_correction = 0.01 / time_step;

    let mut cost: Vec<Vec<f64>> = frames.iter().map(|c| vec![f64::INFINITY; c.len()]).collect();
    let mut back: Vec<Vec<usize>> = frames.iter().map(|c| vec![0; c.len()]).collect();
    for (j, c) in frames[0].iter().enumerate() {
        cost[0][j] = -c.strength;
    }

    for i in 1..n {
        for (j, cur) in frames[i].iter().enumerate() {
            for (k, prev) in frames[i - 1].iter().enumerate() {
                let transition = match (prev.frequency > 0.0, cur.frequency > 0.0) {
                    (false, false) => 0.0,
                    (true, true) => OCTAVE_JUMP_COST * (cur.frequency / prev.frequency).log2().abs(),
                    _ => VOICED_UNVOICED_COST,
                };
                let total = cost[i - 1][k] + transition * time_correction - cur.strength;
                if total < cost[i][j] {
                    cost[i][j] = total;
                    back[i][j] = k;
                }
            }
        }
    }

    let mut path = vec![0usize; n];
    path[n - 1] = cost[n - 1]
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    for i in (0..n - 1).rev() {
        path[i] = back[i + 1][path[i + 1]];
    }
    path
}

pub fn sound_to_pitch(signal: &AudioSignal, params: &PitchParams) -> Result<PitchTrack, BackendError> {
    if signal.is_empty() {
        return Err(BackendError::EmptySignal);
    }
    let samples = signal.samples();
    let sample_rate = f64::from(signal.sample_rate());
    let duration = signal.duration();
    let time_step = params.effective_time_step();

    let window_duration = PERIODS_PER_WINDOW / params.floor;
    if duration < window_duration {
        return Err(BackendError::TooShort {
            analysis: "pitch",
            needed: window_duration,
            actual: duration,
        });
    }

    let min_lag = (sample_rate / params.ceiling).ceil() as usize;
    let max_lag = (sample_rate / params.floor).floor() as usize;
    let mut window_len = (window_duration * sample_rate).round() as usize;
    if window_len % 2 == 0 {
        window_len += 1;
    }
    let half = window_len / 2;
    let window = hann_symmetric(window_len);
    let r_w = autocorrelation(&window, max_lag);

    let n_frames = (((duration - window_duration) / time_step + 1e-9).floor() as usize + 1).max(1);
    let t1 = (duration - (n_frames - 1) as f64 * time_step) / 2.0;
    let global_peak = signal.peak();

    let mut times = Vec::with_capacity(n_frames);
    let mut candidates = Vec::with_capacity(n_frames);
    for i in 0..n_frames {
        let t = t1 + i as f64 * time_step;
        let center = (t * sample_rate).round() as isize;
        let frame = extract_frame(samples, center - half as isize, window_len);

        let local_peak = frame.iter().fold(0.0_f64, |m, s| m.max(s.abs()));
        let local_intensity = local_peak / (global_peak + 1e-30);

        let windowed: Vec<f64> = frame.iter().zip(&window).map(|(s, w)| s * w).collect();
        let r = autocorrelation(&windowed, max_lag);

        // Voicing is decided by periodicity; loudness only matters near silence.
        let unvoiced_strength = VOICING_THRESHOLD
            + (2.0 - local_intensity / (SILENCE_THRESHOLD / (1.0 + VOICING_THRESHOLD))).max(0.0);
        let mut frame_candidates = vec![Candidate {
            frequency: 0.0,
            strength: unvoiced_strength,
        }];
        for peak in peak_candidates(&r, &r_w, min_lag, max_lag, sample_rate) {
            if peak.frequency > 0.0 {
                frame_candidates.push(Candidate {
                    frequency: peak.frequency,
                    strength: peak.strength - OCTAVE_COST * (params.ceiling / peak.frequency).log2(),
                });
            }
        }

        times.push(t);
        candidates.push(frame_candidates);
    }

    let path = viterbi(&candidates, time_step);
    let frames = times
        .into_iter()
        .zip(candidates.iter().zip(path))
        .map(|(time, (cands, best))| {
            let c = cands[best];
            PitchFrame {
                time,
                frequency: c.frequency,
                strength: c.strength,
            }
        })
        .collect();

    log::trace!("pitch: {} frames at {:.4}s step", n_frames, time_step);
    Ok(PitchTrack { time_step, frames })
}
