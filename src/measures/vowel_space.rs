use super::{AnalysisContext, MeasureError, MeasureResult, finite};
use crate::dsp::mean;

/// Mean of formant `number` (1-based) over frames where it was found.
pub fn formant_mean(ctx: &AnalysisContext, number: usize) -> MeasureResult<f64> {
    let values = ctx.formants()?.formant_values(number);
    finite(mean(&values).ok_or(MeasureError::InsufficientData("formant not found in any frame"))?)
}

/// Vowel articulation index, approximated from a single vowel as F2 / F1.
pub fn vowel_articulation_index(f1: &MeasureResult<f64>, f2: &MeasureResult<f64>) -> MeasureResult<f64> {
    match (f1, f2) {
        (Ok(f1), Ok(f2)) if *f1 > 0.0 && *f2 > 0.0 => finite(f2 / f1),
        (Err(e), _) | (_, Err(e)) => Err(e.clone()),
        _ => Err(MeasureError::Degenerate("non-positive formant")),
    }
}

/// Vowel space area needs corner vowels (/a/, /i/, /u/) from separate
/// recordings; a single recording cannot provide it.
pub fn vowel_space_area() -> MeasureResult<f64> {
    Err(MeasureError::InsufficientData("requires multiple vowel recordings"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measures::testing::{StubBackend, quiet_signal};
    use approx::assert_relative_eq;

    #[test]
    fn means_and_ratio() {
        let backend = StubBackend {
            formants: vec![(700.0, 1200.0), (720.0, 1260.0), (0.0, 0.0)],
            ..Default::default()
        };
        let signal = quiet_signal();
        let ctx = AnalysisContext::new(&signal, &backend);
        let f1 = formant_mean(&ctx, 1);
        let f2 = formant_mean(&ctx, 2);
        assert_relative_eq!(*f1.as_ref().unwrap(), 710.0);
        assert_relative_eq!(*f2.as_ref().unwrap(), 1230.0);
        assert_relative_eq!(vowel_articulation_index(&f1, &f2).unwrap(), 1230.0 / 710.0);
        assert!(vowel_space_area().is_err());
    }

    #[test]
    fn missing_formants() {
        let backend = StubBackend {
            formants: vec![(0.0, 0.0); 4],
            ..Default::default()
        };
        let signal = quiet_signal();
        let ctx = AnalysisContext::new(&signal, &backend);
        let f1 = formant_mean(&ctx, 1);
        assert!(f1.is_err());
        assert!(vowel_articulation_index(&f1, &Ok(1000.0)).is_err());
    }
}
