//! Glottal pulse placement.
//!
//! Within each voiced stretch of the pitch track, a seed pulse is put on the
//! largest waveform excursion near the middle of the stretch. Pulses are then
//! chained outward one local period at a time, each snapped to the extremum of
//! the same polarity within 20% of the predicted position.

use super::{BackendError, PitchTrack, PointProcess};
use crate::signal::AudioSignal;

const SEARCH_FRACTION: f64 = 0.2;

struct Stretch {
    start: f64,
    end: f64,
    mean_f0: f64,
}

fn voiced_stretches(pitch: &PitchTrack, duration: f64) -> Vec<Stretch> {
    let half = 0.5 * pitch.time_step;
    let mut out = Vec::new();
    let mut run: Vec<(f64, f64)> = Vec::new();

    let flush = |run: &mut Vec<(f64, f64)>, out: &mut Vec<Stretch>| {
        if let (Some(first), Some(last)) = (run.first(), run.last()) {
            let mean_f0 = run.iter().map(|r| r.1).sum::<f64>() / run.len() as f64;
            out.push(Stretch {
                start: (first.0 - half).max(0.0),
                end: (last.0 + half).min(duration),
                mean_f0,
            });
        }
        run.clear();
    };

    for frame in &pitch.frames {
        if frame.is_voiced() {
            run.push((frame.time, frame.frequency));
        } else {
            flush(&mut run, &mut out);
        }
    }
    flush(&mut run, &mut out);
    out
}

/// Sub-sample time of the polarity-signed maximum in `[lo, hi]` (seconds).
fn extremum_time(samples: &[f64], sr: f64, lo: f64, hi: f64, polarity: f64) -> Option<f64> {
    let i_lo = (lo * sr).ceil().max(0.0) as usize;
    let i_hi = ((hi * sr).floor() as usize).min(samples.len().checked_sub(1)?);
    if i_lo > i_hi {
        return None;
    }
    let (best, _) = (i_lo..=i_hi)
        .map(|i| (i, polarity * samples[i]))
        .max_by(|a, b| a.1.total_cmp(&b.1))?;

    let mut offset = 0.0;
    if best > 0 && best + 1 < samples.len() {
        let (a, b, c) = (
            polarity * samples[best - 1],
            polarity * samples[best],
            polarity * samples[best + 1],
        );
        let denom = a - 2.0 * b + c;
        if denom.abs() > 1e-12 {
            offset = (0.5 * (a - c) / denom).clamp(-0.5, 0.5);
        }
    }
    Some((best as f64 + offset) / sr)
}

pub fn sound_to_pulses(signal: &AudioSignal, pitch: &PitchTrack) -> Result<PointProcess, BackendError> {
    if signal.is_empty() {
        return Err(BackendError::EmptySignal);
    }
    let samples = signal.samples();
    let sr = f64::from(signal.sample_rate());
    let mut times = Vec::new();

    for stretch in voiced_stretches(pitch, signal.duration()) {
        let period_at = |t: f64| 1.0 / pitch.frequency_at(t).unwrap_or(stretch.mean_f0);

        let mid = 0.5 * (stretch.start + stretch.end);
        let t0 = period_at(mid);
        let lo = (mid - 0.5 * t0).max(stretch.start);
        let hi = (mid + 0.5 * t0).min(stretch.end);
        let Some(seed) = extremum_time(samples, sr, lo, hi, 1.0) else {
            continue;
        };
        let seed_index = (seed * sr).round() as usize;
        let polarity = if samples.get(seed_index).copied().unwrap_or(0.0) < 0.0 {
            -1.0
        } else {
            1.0
        };
        // Re-seed with the polarity-aware search so both directions agree.
        let seed = extremum_time(samples, sr, lo, hi, polarity).unwrap_or(seed);
        let mut stretch_pulses = vec![seed];

        let mut t = seed;
        loop {
            let period = period_at(t);
            let guess = t + period;
            if guess > stretch.end {
                break;
            }
            let window = SEARCH_FRACTION * period;
            match extremum_time(samples, sr, guess - window, (guess + window).min(stretch.end), polarity) {
                Some(next) if next > t => {
                    stretch_pulses.push(next);
                    t = next;
                }
                _ => break,
            }
        }

        let mut t = seed;
        loop {
            let period = period_at(t);
            let guess = t - period;
            if guess < stretch.start {
                break;
            }
            let window = SEARCH_FRACTION * period;
            match extremum_time(samples, sr, (guess - window).max(stretch.start), guess + window, polarity) {
                Some(prev) if prev < t => {
                    stretch_pulses.push(prev);
                    t = prev;
                }
                _ => break,
            }
        }

        times.extend(stretch_pulses);
    }

    times.sort_by(f64::total_cmp);
    times.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
    log::trace!("pulses: {} glottal pulses", times.len());
    Ok(PointProcess { times })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{PitchFrame, PitchParams, pitch::sound_to_pitch};

    #[test]
    fn pulses_follow_period_of_tone() {
        let sr = 16_000;
        let samples: Vec<f64> = (0..sr)
            .map(|i| 0.6 * (2.0 * std::f64::consts::PI * 125.0 * i as f64 / sr as f64).sin())
            .collect();
        let signal = AudioSignal::new(samples, sr as u32);
        let pitch = sound_to_pitch(&signal, &PitchParams::default()).unwrap();
        let pp = sound_to_pulses(&signal, &pitch).unwrap();

        assert!(pp.len() > 100, "only {} pulses", pp.len());
        for period in pp.periods() {
            assert!((period - 0.008).abs() < 1e-4, "period {period}");
        }
    }

    #[test]
    fn unvoiced_track_gives_no_pulses() {
        let signal = AudioSignal::new(vec![0.0; 16_000], 16_000);
        let pitch = PitchTrack {
            time_step: 0.01,
            frames: (0..97)
                .map(|i| PitchFrame {
                    time: 0.02 + i as f64 * 0.01,
                    frequency: 0.0,
                    strength: 0.45,
                })
                .collect(),
        };
        assert!(sound_to_pulses(&signal, &pitch).unwrap().is_empty());
    }
}
