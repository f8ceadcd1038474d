use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use super::task::{Gender, GenderNorm, TaskType};
use crate::TARGET_SAMPLE_RATE;
use crate::measures::cepstral::{cpp, mfcc_mean};
use crate::measures::ddk::{DdkMetrics, detect_onsets};
use crate::measures::nonlinear::{
    D2_MAX_LEN, DFA_MAX_LEN, ENTROPY_MAX_LEN, correlation_dimension, dfa, pitch_period_entropy,
    sample_entropy,
};
use crate::measures::perturbation::{
    F0Summary, articulation_rate, f0_summary, hnr, jitter, nhr, shimmer,
};
use crate::measures::spectral::{energy_range_db, spectral_harmonicity};
use crate::measures::vowel_space::{formant_mean, vowel_articulation_index, vowel_space_area};
use crate::measures::{AnalysisContext, MeasureResult};
use crate::signal::AudioSignal;

// ── Key sets ──

pub const TIER1_KEYS: &[&str] = &[
    "f0_mean",
    "f0_sd",
    "f0_range",
    "jitter_local",
    "shimmer_local",
    "hnr",
    "mfcc2_mean",
];

pub const TIER2_KEYS: &[&str] = &[
    "rpde",
    "dfa",
    "ppe",
    "cpp",
    "articulation_rate",
    "f1_mean",
    "f2_mean",
    "spectral_harmonicity",
    "energy_range",
];

pub const SUSTAINED_VOWEL_KEYS: &[&str] = &[
    "jitter_local",
    "jitter_local_abs",
    "jitter_rap",
    "jitter_ppq5",
    "jitter_ddp",
    "shimmer_local",
    "shimmer_local_db",
    "shimmer_apq3",
    "shimmer_apq5",
    "shimmer_apq11",
    "shimmer_dda",
    "hnr",
    "nhr",
    "cpp",
    "f0_mean",
    "f0_sd",
    "f0_min",
    "f0_max",
    "f0_range",
    "rpde",
    "dfa",
    "ppe",
    "d2",
];

pub const VOWEL_SPACE_KEYS: &[&str] = &["f1_mean", "f2_mean", "vsa", "vai"];

pub const DDK_KEYS: &[&str] = &[
    "onset_count",
    "ddk_rate",
    "ddk_regularity_cv",
    "ddk_mean_ioi",
    "ddk_sd_ioi",
    "festination",
];

/// Keys emitted for `task`, in output order.
pub fn feature_keys(task: TaskType) -> Vec<&'static str> {
    match task {
        TaskType::Fluency => TIER1_KEYS.to_vec(),
        TaskType::Conversation => [TIER1_KEYS, TIER2_KEYS].concat(),
        TaskType::SustainedVowel => [SUSTAINED_VOWEL_KEYS, VOWEL_SPACE_KEYS].concat(),
        TaskType::Ddk => DDK_KEYS.to_vec(),
    }
}

// ── FeatureSet ──

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Count(u64),
    Flag(bool),
}

impl FeatureValue {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            FeatureValue::Number(v) => Some(v),
            FeatureValue::Count(n) => Some(n as f64),
            FeatureValue::Flag(_) => None,
        }
    }
}

/// Named feature values in insertion order; `None` serializes as `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    entries: Vec<(&'static str, Option<FeatureValue>)>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key. The first write wins; non-finite numbers are stored as null.
    pub fn insert(&mut self, key: &'static str, value: Option<FeatureValue>) {
        if self.contains(key) {
            log::warn!("feature {} already set, keeping first value", key);
            return;
        }
        let value = value.filter(|v| !matches!(v, FeatureValue::Number(x) if !x.is_finite()));
        self.entries.push((key, value));
    }

    /// Add a measure outcome; a failed measure becomes null.
    pub fn insert_measure(&mut self, key: &'static str, result: MeasureResult<f64>) {
        let value = match result {
            Ok(v) => Some(FeatureValue::Number(v)),
            Err(e) => {
                log::debug!("{}: {}", key, e);
                None
            }
        };
        self.insert(key, value);
    }

    pub fn insert_number(&mut self, key: &'static str, value: Option<f64>) {
        self.insert(key, value.map(FeatureValue::Number));
    }

    pub fn extend(&mut self, other: FeatureSet) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }

    /// `None` if the key is absent, `Some(None)` if it is present but null.
    pub fn get(&self, key: &str) -> Option<Option<FeatureValue>> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).flatten().and_then(|v| v.as_f64())
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for FeatureSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

// ── Analyzer groups ──

fn insert_f0(fs: &mut FeatureSet, summary: &MeasureResult<F0Summary>, keys: &[&'static str]) {
    for &key in keys {
        let value = summary.as_ref().map_err(Clone::clone).map(|s| match key {
            "f0_mean" => s.mean,
            "f0_sd" => s.sd,
            "f0_min" => s.min,
            "f0_max" => s.max,
            _ => s.range(),
        });
        fs.insert_measure(key, value);
    }
}

fn pitch_summary(ctx: &AnalysisContext) -> MeasureResult<F0Summary> {
    f0_summary(ctx.pitch()?)
}

fn ppe(ctx: &AnalysisContext) -> MeasureResult<f64> {
    pitch_period_entropy(&ctx.pitch()?.voiced_frequencies())
}

fn rpde(signal: &AudioSignal) -> MeasureResult<f64> {
    sample_entropy(&signal.decimated(ENTROPY_MAX_LEN), 2)
}

fn waveform_dfa(signal: &AudioSignal) -> MeasureResult<f64> {
    dfa(&signal.decimated(DFA_MAX_LEN))
}

/// Pitch and perturbation, tier 1.
pub fn tier1(ctx: &AnalysisContext) -> FeatureSet {
    let mut fs = FeatureSet::new();
    insert_f0(&mut fs, &pitch_summary(ctx), &["f0_mean", "f0_sd", "f0_range"]);
    fs.insert_measure("jitter_local", jitter(ctx).local);
    fs.insert_measure("shimmer_local", shimmer(ctx).local);
    fs.insert_measure("hnr", hnr(ctx));
    fs.insert_measure("mfcc2_mean", mfcc_mean(ctx.signal(), 1));
    fs
}

/// Nonlinear, cepstral, formant and spectral extras for connected speech.
pub fn tier2(ctx: &AnalysisContext) -> FeatureSet {
    let signal = ctx.signal();
    let mut fs = FeatureSet::new();
    fs.insert_measure("rpde", rpde(signal));
    fs.insert_measure("dfa", waveform_dfa(signal));
    fs.insert_measure("ppe", ppe(ctx));
    fs.insert_measure("cpp", cpp(signal));
    fs.insert_measure("articulation_rate", articulation_rate(ctx));
    fs.insert_measure("f1_mean", formant_mean(ctx, 1));
    fs.insert_measure("f2_mean", formant_mean(ctx, 2));
    fs.insert_measure("spectral_harmonicity", spectral_harmonicity(signal));
    fs.insert_measure("energy_range", energy_range_db(signal));
    fs
}

/// Full perturbation suite, noise, F0 statistics and nonlinear dynamics.
pub fn sustained_vowel(ctx: &AnalysisContext) -> FeatureSet {
    let signal = ctx.signal();
    let mut fs = FeatureSet::new();

    let j = jitter(ctx);
    fs.insert_measure("jitter_local", j.local);
    fs.insert_measure("jitter_local_abs", j.local_abs);
    fs.insert_measure("jitter_rap", j.rap);
    fs.insert_measure("jitter_ppq5", j.ppq5);
    fs.insert_measure("jitter_ddp", j.ddp);

    let s = shimmer(ctx);
    fs.insert_measure("shimmer_local", s.local);
    fs.insert_measure("shimmer_local_db", s.local_db);
    fs.insert_measure("shimmer_apq3", s.apq3);
    fs.insert_measure("shimmer_apq5", s.apq5);
    fs.insert_measure("shimmer_apq11", s.apq11);
    fs.insert_measure("shimmer_dda", s.dda);

    let h = hnr(ctx);
    let n = nhr(&h);
    fs.insert_measure("hnr", h);
    fs.insert_measure("nhr", n);
    fs.insert_measure("cpp", cpp(signal));

    insert_f0(
        &mut fs,
        &pitch_summary(ctx),
        &["f0_mean", "f0_sd", "f0_min", "f0_max", "f0_range"],
    );

    fs.insert_measure("rpde", rpde(signal));
    fs.insert_measure("dfa", waveform_dfa(signal));
    fs.insert_measure("ppe", ppe(ctx));
    fs.insert_measure(
        "d2",
        correlation_dimension(&signal.decimated(D2_MAX_LEN), 10),
    );
    fs
}

/// Mean F1/F2 and the vowel-space indices derivable from one recording.
pub fn vowel_space(ctx: &AnalysisContext) -> FeatureSet {
    let f1 = formant_mean(ctx, 1);
    let f2 = formant_mean(ctx, 2);
    let vai = vowel_articulation_index(&f1, &f2);
    let mut fs = FeatureSet::new();
    fs.insert_measure("f1_mean", f1);
    fs.insert_measure("f2_mean", f2);
    fs.insert_measure("vsa", vowel_space_area());
    fs.insert_measure("vai", vai);
    fs
}

/// Syllable rate and timing regularity.
pub fn ddk(signal: &AudioSignal) -> FeatureSet {
    let onsets = detect_onsets(signal);
    log::debug!("ddk: {} onsets", onsets.len());
    let m = DdkMetrics::from_onsets(&onsets);
    let mut fs = FeatureSet::new();
    fs.insert("onset_count", m.onset_count.map(FeatureValue::Count));
    fs.insert_number("ddk_rate", m.rate);
    fs.insert_number("ddk_regularity_cv", m.regularity_cv);
    fs.insert_number("ddk_mean_ioi", m.mean_ioi);
    fs.insert_number("ddk_sd_ioi", m.sd_ioi);
    fs.insert("festination", m.festination.map(FeatureValue::Flag));
    fs
}

/// Run the analyzer groups for `task` and merge them in dispatch order.
pub fn extract(task: TaskType, ctx: &AnalysisContext) -> FeatureSet {
    match task {
        TaskType::Fluency => tier1(ctx),
        TaskType::Conversation => {
            let mut fs = tier1(ctx);
            fs.extend(tier2(ctx));
            fs
        }
        TaskType::SustainedVowel => {
            let mut fs = sustained_vowel(ctx);
            fs.extend(vowel_space(ctx));
            fs
        }
        TaskType::Ddk => ddk(ctx.signal()),
    }
}

// ── Result record ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// One recording's outcome, serialized as the output JSON object.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub task_type: TaskType,
    pub gender: Gender,
    pub duration_s: Option<f64>,
    pub sample_rate: u32,
    pub f0_norm_ref: GenderNorm,
    pub features: FeatureSet,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResult {
    pub fn ok(task: TaskType, gender: Gender, signal: &AudioSignal, features: FeatureSet) -> Self {
        Self {
            task_type: task,
            gender,
            duration_s: Some(signal.duration()),
            sample_rate: signal.sample_rate(),
            f0_norm_ref: gender.norm(),
            features,
            status: Status::Ok,
            error: None,
        }
    }

    /// File-level failure. `duration_s` is known only when decoding succeeded.
    pub fn failed(task: TaskType, gender: Gender, duration_s: Option<f64>, error: String) -> Self {
        Self {
            task_type: task,
            gender,
            duration_s,
            sample_rate: TARGET_SAMPLE_RATE,
            f0_norm_ref: gender.norm(),
            features: FeatureSet::new(),
            status: Status::Error,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}
