//! Scalar acoustic measures.
//!
//! Every measure returns `MeasureResult<f64>` and fails on its own: the
//! feature assembly turns an `Err` into a null entry without affecting any
//! other measure.

pub mod cepstral;
pub mod ddk;
pub mod nonlinear;
pub mod perturbation;
pub mod spectral;
pub mod vowel_space;

use std::cell::OnceCell;

use crate::backend::{
    BackendError, FormantParams, FormantTrack, HarmonicityParams, Harmonicity, PitchParams,
    PitchTrack, PointProcess, SignalAnalysisBackend,
};
use crate::signal::AudioSignal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeasureError {
    #[error("not enough data: {0}")]
    InsufficientData(&'static str),
    #[error("no voiced frames")]
    Unvoiced,
    #[error("degenerate input: {0}")]
    Degenerate(&'static str),
    #[error("result is not finite")]
    NonFinite,
    #[error("backend: {0}")]
    Backend(#[from] BackendError),
}

pub type MeasureResult<T> = Result<T, MeasureError>;

/// Reject NaN and infinities.
pub fn finite(value: f64) -> MeasureResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MeasureError::NonFinite)
    }
}

/// One recording plus the backend products shared by several measures.
///
/// Pitch, pulses, harmonicity and formants are computed at most once per
/// recording, on first use.
pub struct AnalysisContext<'a> {
    signal: &'a AudioSignal,
    backend: &'a dyn SignalAnalysisBackend,
    pitch: OnceCell<Result<PitchTrack, BackendError>>,
    pulses: OnceCell<MeasureResult<PointProcess>>,
    harmonicity: OnceCell<Result<Harmonicity, BackendError>>,
    formants: OnceCell<Result<FormantTrack, BackendError>>,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(signal: &'a AudioSignal, backend: &'a dyn SignalAnalysisBackend) -> Self {
        Self {
            signal,
            backend,
            pitch: OnceCell::new(),
            pulses: OnceCell::new(),
            harmonicity: OnceCell::new(),
            formants: OnceCell::new(),
        }
    }

    pub fn signal(&self) -> &AudioSignal {
        self.signal
    }

    pub fn pitch(&self) -> MeasureResult<&PitchTrack> {
        self.pitch
            .get_or_init(|| self.backend.to_pitch(self.signal, &PitchParams::default()))
            .as_ref()
            .map_err(|e| e.clone().into())
    }

    pub fn pulses(&self) -> MeasureResult<&PointProcess> {
        self.pulses
            .get_or_init(|| {
                let pitch = self.pitch()?;
                Ok(self.backend.to_point_process(self.signal, pitch)?)
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    pub fn harmonicity(&self) -> MeasureResult<&Harmonicity> {
        self.harmonicity
            .get_or_init(|| {
                self.backend
                    .to_harmonicity(self.signal, &HarmonicityParams::default())
            })
            .as_ref()
            .map_err(|e| e.clone().into())
    }

    pub fn formants(&self) -> MeasureResult<&FormantTrack> {
        self.formants
            .get_or_init(|| self.backend.to_formants(self.signal, &FormantParams::default()))
            .as_ref()
            .map_err(|e| e.clone().into())
    }
}
