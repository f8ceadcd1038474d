use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use vocalmark::analyzer::decode::DecodeOptions;
use vocalmark::analyzer::features::{FeatureValue, Status, feature_keys};
use vocalmark::analyzer::task::{Gender, GenderNorm, TaskType};
use vocalmark::analyzer::{analyze_batch, analyze_file, validate_request};
use vocalmark::backend::NativeBackend;

const SR: u32 = 16_000;

fn write_wav(path: &Path, samples: &[f64]) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SR,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut w = hound::WavWriter::create(path, spec).unwrap();
    for s in samples {
        w.write_sample((s.clamp(-1.0, 1.0) * 32767.0) as i16).unwrap();
    }
    w.finalize().unwrap();
}

/// Harmonic-rich steady phonation at `f0`.
fn vowel(f0: f64, secs: f64) -> Vec<f64> {
    let n = (secs * SR as f64) as usize;
    (0..n)
        .map(|i| {
            let t = i as f64 / SR as f64;
            (1..=8)
                .map(|h| 0.3 / h as f64 * (2.0 * PI * f0 * h as f64 * t).sin())
                .sum()
        })
        .collect()
}

/// Noise bursts of 60 ms every `spacing` seconds.
fn bursts(count: usize, spacing: f64, secs: f64) -> Vec<f64> {
    let mut samples = vec![0.0; (secs * SR as f64) as usize];
    let mut state = 7u64;
    for k in 0..count {
        let start = ((0.25 + k as f64 * spacing) * SR as f64) as usize;
        for s in samples.iter_mut().skip(start).take(960) {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            *s = ((state >> 40) as f64 / (1u64 << 24) as f64) - 0.5;
        }
    }
    samples
}

fn fixture(dir: &Path, name: &str, samples: &[f64]) -> PathBuf {
    let path = dir.join(name);
    write_wav(&path, samples);
    path
}

fn run(path: &Path, task: TaskType, gender: Gender) -> vocalmark::analyzer::features::ExtractionResult {
    analyze_file(path, task, gender, &DecodeOptions::default(), &NativeBackend)
}

#[test]
fn every_task_emits_its_key_set() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(dir.path(), "vowel.wav", &vowel(140.0, 2.0));
    for task in TaskType::ALL {
        let result = run(&path, task, Gender::Female);
        assert_eq!(result.status, Status::Ok, "{task}");
        assert_eq!(result.features.keys().collect::<Vec<_>>(), feature_keys(task), "{task}");
    }
}

#[test]
fn sustained_vowel_measures_a_steady_tone() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(dir.path(), "vowel.wav", &vowel(140.0, 2.0));
    let result = run(&path, TaskType::SustainedVowel, Gender::Male);
    let f = &result.features;

    let f0 = f.number("f0_mean").unwrap();
    assert!((f0 - 140.0).abs() < 5.0, "f0 {f0}");
    assert!(f.number("jitter_local").unwrap() < 0.02);
    assert!(f.number("hnr").unwrap() > 10.0);
    assert_eq!(f.get("vsa"), Some(None));
    assert_eq!(result.duration_s, Some(2.0));
    assert_eq!(result.sample_rate, 16_000);
}

#[test]
fn duration_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let short = fixture(dir.path(), "short.wav", &vowel(140.0, 0.9));
    let long = fixture(dir.path(), "long.wav", &vowel(140.0, 1.1));

    let r = run(&short, TaskType::Fluency, Gender::Female);
    assert_eq!(r.status, Status::Error);
    assert!(r.error.as_deref().unwrap().contains("too_short"));
    assert!(r.features.is_empty());

    let r = run(&long, TaskType::Fluency, Gender::Female);
    assert_eq!(r.status, Status::Ok);
    assert!(r.error.is_none());
    assert_eq!(r.features.len(), feature_keys(TaskType::Fluency).len());
}

#[test]
fn silence_yields_nulls_not_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(dir.path(), "silence.wav", &vec![0.0; 2 * SR as usize]);
    let r = run(&path, TaskType::Conversation, Gender::Female);
    assert_eq!(r.status, Status::Ok);
    for key in ["hnr", "spectral_harmonicity", "f0_mean", "f0_sd", "f0_range", "jitter_local", "ppe"] {
        assert_eq!(r.features.get(key), Some(None), "{key}");
    }
}

#[test]
fn gender_selects_norm_reference() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(dir.path(), "ddk.wav", &bursts(8, 0.2, 2.5));
    let male = run(&path, TaskType::Ddk, Gender::Male);
    let female = run(&path, TaskType::Ddk, Gender::Female);
    assert_eq!(male.f0_norm_ref, GenderNorm { mean: 120, sd: 20 });
    assert_eq!(female.f0_norm_ref, GenderNorm { mean: 210, sd: 30 });
    assert_eq!(
        serde_json::to_value(&male.features).unwrap(),
        serde_json::to_value(&female.features).unwrap()
    );
}

#[test]
fn ddk_counts_syllables() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(dir.path(), "ddk.wav", &bursts(10, 0.2, 2.5));
    let r = run(&path, TaskType::Ddk, Gender::Female);
    let count = match r.features.get("onset_count") {
        Some(Some(FeatureValue::Count(n))) => n,
        other => panic!("onset_count {other:?}"),
    };
    assert!((8..=11).contains(&count), "count {count}");
    let rate = r.features.number("ddk_rate").unwrap();
    assert!((rate - 5.0).abs() < 1.0, "rate {rate}");
    assert!(matches!(r.features.get("festination"), Some(Some(FeatureValue::Flag(_)))));
}

#[test]
fn unknown_task_is_rejected_up_front() {
    let failure = validate_request("unknown", "female").unwrap_err();
    let json = serde_json::to_value(&failure).unwrap();
    assert_eq!(json["status"], "error");
    assert_eq!(json["task_type"], "unknown");
    assert!(json["error"].as_str().unwrap().contains("unknown_task_type"));
    assert!(json.get("features").is_none());
}

#[test]
fn undecodable_file_is_an_error_result() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.wav");
    std::fs::write(&path, b"RIFF....not really").unwrap();
    let r = run(&path, TaskType::Conversation, Gender::Female);
    assert_eq!(r.status, Status::Error);
    assert!(r.error.as_deref().unwrap().starts_with("decode_error"));
    assert!(r.features.is_empty());
}

#[test]
fn analysis_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(dir.path(), "vowel.wav", &vowel(180.0, 1.5));
    let a = serde_json::to_string(&run(&path, TaskType::Conversation, Gender::Female)).unwrap();
    let b = serde_json::to_string(&run(&path, TaskType::Conversation, Gender::Female)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn batch_keeps_input_order_and_isolates_failures() {
    let dir = tempfile::tempdir().unwrap();
    let good = fixture(dir.path(), "good.wav", &vowel(150.0, 1.2));
    let short = fixture(dir.path(), "short.wav", &vowel(150.0, 0.5));
    let broken = dir.path().join("broken.wav");
    std::fs::write(&broken, b"nope").unwrap();

    let paths = vec![broken.clone(), good.clone(), short.clone()];
    let entries = analyze_batch(
        &paths,
        TaskType::Fluency,
        Gender::Female,
        2,
        &DecodeOptions::default(),
        &NativeBackend,
    )
    .unwrap();

    let order: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
    let expected: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    assert_eq!(order, expected.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(entries[0].result.status, Status::Error);
    assert_eq!(entries[1].result.status, Status::Ok);
    assert!(entries[2].result.error.as_deref().unwrap().contains("too_short"));
}
