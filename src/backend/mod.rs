//! Periodicity and resonance analysis behind a single trait.
//!
//! Measures never talk to a concrete implementation: they ask an
//! `AnalysisContext` which forwards to whatever `SignalAnalysisBackend` the
//! caller supplied. `NativeBackend` is the in-process implementation; tests
//! plug in stubs to exercise the measures without real audio.

pub mod formant;
pub mod harmonicity;
pub mod pitch;
pub mod pulses;

use crate::signal::AudioSignal;
use thiserror::Error;

/// Harmonicity value reported for frames below the silence threshold.
pub const SILENT_FRAME_DB: f64 = -200.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("signal is empty")]
    EmptySignal,
    #[error("signal is silent")]
    Silent,
    #[error("signal too short for {analysis}: need {needed:.3}s, have {actual:.3}s")]
    TooShort {
        analysis: &'static str,
        needed: f64,
        actual: f64,
    },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("resampling failed: {0}")]
    Resample(String),
}

// ── Parameters ──

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchParams {
    /// Frame step in seconds; `0.0` selects `0.75 / floor`.
    pub time_step: f64,
    pub floor: f64,
    pub ceiling: f64,
}

impl Default for PitchParams {
    fn default() -> Self {
        Self {
            time_step: 0.0,
            floor: 75.0,
            ceiling: 500.0,
        }
    }
}

impl PitchParams {
    pub fn effective_time_step(&self) -> f64 {
        if self.time_step > 0.0 {
            self.time_step
        } else {
            0.75 / self.floor
        }
    }

    fn validate(&self) -> Result<(), BackendError> {
        if !(self.floor > 0.0 && self.ceiling > self.floor) {
            return Err(BackendError::InvalidParameter(format!(
                "pitch range {}..{} Hz",
                self.floor, self.ceiling
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicityParams {
    pub time_step: f64,
    pub min_pitch: f64,
    /// Frames whose local peak is below this fraction of the global peak are silent.
    pub silence_threshold: f64,
    pub periods_per_window: f64,
}

impl Default for HarmonicityParams {
    fn default() -> Self {
        Self {
            time_step: 0.01,
            min_pitch: 75.0,
            silence_threshold: 0.1,
            periods_per_window: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormantParams {
    /// Frame step in seconds; `0.0` selects a quarter of `window_length`.
    pub time_step: f64,
    pub max_formants: usize,
    pub max_formant_hz: f64,
    /// Nominal window length; the Gaussian window physically spans twice this.
    pub window_length: f64,
    pub pre_emphasis_from: f64,
}

impl Default for FormantParams {
    fn default() -> Self {
        Self {
            time_step: 0.0,
            max_formants: 5,
            max_formant_hz: 5500.0,
            window_length: 0.025,
            pre_emphasis_from: 50.0,
        }
    }
}

// ── Analysis products ──

/// One pitch frame. `frequency == 0.0` marks an unvoiced frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchFrame {
    pub time: f64,
    pub frequency: f64,
    pub strength: f64,
}

impl PitchFrame {
    pub fn is_voiced(&self) -> bool {
        self.frequency > 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PitchTrack {
    pub time_step: f64,
    pub frames: Vec<PitchFrame>,
}

impl PitchTrack {
    /// F0 values of voiced frames, in time order.
    pub fn voiced_frequencies(&self) -> Vec<f64> {
        self.frames
            .iter()
            .filter(|f| f.is_voiced())
            .map(|f| f.frequency)
            .collect()
    }

    /// Fraction of frames that are voiced. `None` for an empty track.
    pub fn voiced_fraction(&self) -> Option<f64> {
        if self.frames.is_empty() {
            return None;
        }
        let voiced = self.frames.iter().filter(|f| f.is_voiced()).count();
        Some(voiced as f64 / self.frames.len() as f64)
    }

    /// F0 at `time`, linearly interpolated between voiced neighbours.
    ///
    /// `None` when the nearest frame is unvoiced or `time` is off the track.
    pub fn frequency_at(&self, time: f64) -> Option<f64> {
        let first = self.frames.first()?;
        let pos = (time - first.time) / self.time_step;
        if pos < -0.5 || pos > self.frames.len() as f64 - 0.5 {
            return None;
        }
        let nearest = (pos.round().max(0.0) as usize).min(self.frames.len() - 1);
        if !self.frames[nearest].is_voiced() {
            return None;
        }
        let lo = (pos.floor().max(0.0) as usize).min(self.frames.len() - 1);
        let hi = (lo + 1).min(self.frames.len() - 1);
        let (a, b) = (self.frames[lo], self.frames[hi]);
        if lo == hi || !a.is_voiced() || !b.is_voiced() {
            return Some(self.frames[nearest].frequency);
        }
        let frac = (pos - lo as f64).clamp(0.0, 1.0);
        Some(a.frequency + frac * (b.frequency - a.frequency))
    }
}

/// Glottal pulse instants in seconds, strictly increasing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointProcess {
    pub times: Vec<f64>,
}

impl PointProcess {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Durations between consecutive pulses.
    pub fn periods(&self) -> Vec<f64> {
        self.times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

/// Per-frame harmonics-to-noise ratio in dB.
#[derive(Debug, Clone, PartialEq)]
pub struct Harmonicity {
    pub time_step: f64,
    pub frames: Vec<f64>,
}

impl Harmonicity {
    /// Mean over non-silent frames. `None` when every frame is silent.
    pub fn mean(&self) -> Option<f64> {
        let voiced: Vec<f64> = self
            .frames
            .iter()
            .copied()
            .filter(|&v| v != SILENT_FRAME_DB)
            .collect();
        crate::dsp::mean(&voiced)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormantPoint {
    pub frequency: f64,
    pub bandwidth: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormantFrame {
    pub time: f64,
    /// Ascending by frequency; F1 is `formants[0]`.
    pub formants: Vec<FormantPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormantTrack {
    pub time_step: f64,
    pub frames: Vec<FormantFrame>,
}

impl FormantTrack {
    /// Positive frequencies of formant `number` (1-based) across all frames that have it.
    pub fn formant_values(&self, number: usize) -> Vec<f64> {
        if number == 0 {
            return Vec::new();
        }
        self.frames
            .iter()
            .filter_map(|f| f.formants.get(number - 1))
            .map(|p| p.frequency)
            .filter(|v| v.is_finite() && *v > 0.0)
            .collect()
    }
}

// ── The seam ──

/// Periodicity, pulse, harmonicity and formant analysis of a mono signal.
pub trait SignalAnalysisBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn to_pitch(&self, signal: &AudioSignal, params: &PitchParams)
    -> Result<PitchTrack, BackendError>;

    /// Glottal pulses inside the voiced stretches of `pitch`.
    fn to_point_process(
        &self,
        signal: &AudioSignal,
        pitch: &PitchTrack,
    ) -> Result<PointProcess, BackendError>;

    fn to_harmonicity(
        &self,
        signal: &AudioSignal,
        params: &HarmonicityParams,
    ) -> Result<Harmonicity, BackendError>;

    fn to_formants(
        &self,
        signal: &AudioSignal,
        params: &FormantParams,
    ) -> Result<FormantTrack, BackendError>;
}

/// Pure-Rust implementation of the backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl SignalAnalysisBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn to_pitch(
        &self,
        signal: &AudioSignal,
        params: &PitchParams,
    ) -> Result<PitchTrack, BackendError> {
        params.validate()?;
        pitch::sound_to_pitch(signal, params)
    }

    fn to_point_process(
        &self,
        signal: &AudioSignal,
        pitch: &PitchTrack,
    ) -> Result<PointProcess, BackendError> {
        pulses::sound_to_pulses(signal, pitch)
    }

    fn to_harmonicity(
        &self,
        signal: &AudioSignal,
        params: &HarmonicityParams,
    ) -> Result<Harmonicity, BackendError> {
        harmonicity::sound_to_harmonicity(signal, params)
    }

    fn to_formants(
        &self,
        signal: &AudioSignal,
        params: &FormantParams,
    ) -> Result<FormantTrack, BackendError> {
        formant::sound_to_formants(signal, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(freqs: &[f64]) -> PitchTrack {
        PitchTrack {
            time_step: 0.01,
            frames: freqs
                .iter()
                .enumerate()
                .map(|(i, &f)| PitchFrame {
                    time: 0.02 + i as f64 * 0.01,
                    frequency: f,
                    strength: if f > 0.0 { 0.9 } else { 0.0 },
                })
                .collect(),
        }
    }

    #[test]
    fn voiced_fraction_counts_nonzero_frames() {
        let t = track(&[0.0, 100.0, 110.0, 0.0]);
        assert_eq!(t.voiced_frequencies(), vec![100.0, 110.0]);
        assert_eq!(t.voiced_fraction(), Some(0.5));
        assert_eq!(track(&[]).voiced_fraction(), None);
    }

    #[test]
    fn frequency_at_interpolates_between_voiced_frames() {
        let t = track(&[100.0, 200.0, 0.0]);
        let mid = t.frequency_at(0.025).unwrap();
        assert!((mid - 150.0).abs() < 1e-9);
        assert_eq!(t.frequency_at(0.04), None);
        assert_eq!(t.frequency_at(5.0), None);
    }

    #[test]
    fn harmonicity_mean_skips_silent_frames() {
        let h = Harmonicity {
            time_step: 0.01,
            frames: vec![SILENT_FRAME_DB, 10.0, 20.0],
        };
        assert_eq!(h.mean(), Some(15.0));
        let silent = Harmonicity {
            time_step: 0.01,
            frames: vec![SILENT_FRAME_DB; 3],
        };
        assert_eq!(silent.mean(), None);
    }

    #[test]
    fn formant_values_skip_missing() {
        let track = FormantTrack {
            time_step: 0.00625,
            frames: vec![
                FormantFrame {
                    time: 0.03,
                    formants: vec![
                        FormantPoint { frequency: 500.0, bandwidth: 80.0 },
                        FormantPoint { frequency: 1500.0, bandwidth: 90.0 },
                    ],
                },
                FormantFrame {
                    time: 0.036,
                    formants: vec![FormantPoint { frequency: 520.0, bandwidth: 70.0 }],
                },
            ],
        };
        assert_eq!(track.formant_values(1), vec![500.0, 520.0]);
        assert_eq!(track.formant_values(2), vec![1500.0]);
        assert!(track.formant_values(0).is_empty());
    }
}
