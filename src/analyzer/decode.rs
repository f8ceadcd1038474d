use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::TARGET_SAMPLE_RATE;
use crate::dsp::resample::{ResampleError, resample};
use crate::signal::AudioSignal;

/// Containers decoded in-process; everything else goes through ffmpeg.
pub const NATIVE_EXTENSIONS: &[&str] = &[
    "wav", "wave", "flac", "mp3", "ogg", "oga", "m4a", "mp4", "aac", "aif", "aiff", "caf", "mkv",
];

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("symphonia decode error: {0}")]
    Symphonia(String),
    #[error("no audio track found")]
    NoTrack,
    #[error("decoded audio is empty")]
    Empty,
    #[error("ffmpeg not found (required for .{0} files)")]
    FfmpegNotFound(String),
    #[error("ffmpeg decode error: {0}")]
    Ffmpeg(String),
    #[error("decoding timed out after {0}s")]
    Timeout(u64),
    #[error("resampling failed: {0}")]
    Resample(#[from] ResampleError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SymphoniaError> for DecodeError {
    fn from(e: SymphoniaError) -> Self {
        match e {
            SymphoniaError::Unsupported(what) => DecodeError::UnsupportedFormat(what.to_string()),
            other => DecodeError::Symphonia(other.to_string()),
        }
    }
}

/// How to reach the external decoder and how long any decode may take.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    pub timeout: Duration,
    pub ffmpeg: PathBuf,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Decode any supported file to 16 kHz mono.
pub fn load_audio(path: &Path, opts: &DecodeOptions) -> Result<AudioSignal, DecodeError> {
    let ext = extension(path);
    let (samples, rate) = if NATIVE_EXTENSIONS.contains(&ext.as_str()) {
        decode_native_with_timeout(path, opts.timeout)?
    } else {
        decode_via_ffmpeg(path, &ext, opts)?
    };
    if samples.is_empty() || rate == 0 {
        return Err(DecodeError::Empty);
    }

    let samples: Vec<f64> = samples.into_iter().map(f64::from).collect();
    let samples = if rate == TARGET_SAMPLE_RATE {
        samples
    } else {
        log::debug!("resampling {} Hz -> {} Hz", rate, TARGET_SAMPLE_RATE);
        resample(&samples, rate, TARGET_SAMPLE_RATE)?
    };
    Ok(AudioSignal::new(samples, TARGET_SAMPLE_RATE))
}

/// Run the in-process decoder on a worker thread and give up after `timeout`.
///
/// An abandoned decode keeps running on its thread until it finishes; its
/// result is dropped.
fn decode_native_with_timeout(path: &Path, timeout: Duration) -> Result<(Vec<f32>, u32), DecodeError> {
    let (tx, rx) = mpsc::channel();
    let owned = path.to_path_buf();
    std::thread::Builder::new()
        .name("decode".into())
        .spawn(move || {
            let _ = tx.send(decode_native(&owned));
        })?;
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(DecodeError::Timeout(timeout.as_secs())),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(DecodeError::Symphonia("decoder thread panicked".into()))
        }
    }
}

/// Decode with symphonia, averaging channels to mono.
pub fn decode_native(path: &Path) -> Result<(Vec<f32>, u32), DecodeError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut mono = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                log::debug!("skipping undecodable packet: {}", msg);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        if sample_rate == 0 {
            sample_rate = spec.rate;
        }
        let channels = spec.channels.count().max(1);
        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        mono.extend(
            buf.samples()
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32),
        );
    }

    Ok((mono, sample_rate))
}

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Convert with an ffmpeg subprocess into a 16 kHz mono s16 WAV temp file, then decode that.
fn decode_via_ffmpeg(path: &Path, ext: &str, opts: &DecodeOptions) -> Result<(Vec<f32>, u32), DecodeError> {
    if Command::new(&opts.ffmpeg)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_err()
    {
        return Err(DecodeError::FfmpegNotFound(ext.to_string()));
    }

    let tmp_wav = std::env::temp_dir().join(format!(
        "{}_{}_{}.wav",
        crate::APP_NAME,
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let result = run_ffmpeg(path, &tmp_wav, opts).and_then(|()| decode_native(&tmp_wav));
    std::fs::remove_file(&tmp_wav).ok();
    result
}

fn run_ffmpeg(input: &Path, output: &Path, opts: &DecodeOptions) -> Result<(), DecodeError> {
    let rate = TARGET_SAMPLE_RATE.to_string();
    let mut child = Command::new(&opts.ffmpeg)
        .args(["-nostdin", "-v", "error", "-y", "-i"])
        .arg(input)
        .args(["-ar", rate.as_str(), "-ac", "1", "-sample_fmt", "s16", "-f", "wav"])
        .arg(output)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    let deadline = Instant::now() + opts.timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            if status.success() {
                return Ok(());
            }
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                use std::io::Read;
                pipe.read_to_string(&mut stderr).ok();
            }
            return Err(DecodeError::Ffmpeg(stderr.trim().to_string()));
        }
        if Instant::now() >= deadline {
            child.kill().ok();
            child.wait().ok();
            return Err(DecodeError::Timeout(opts.timeout.as_secs()));
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, rate: u32, channels: u16, frames: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(path, spec).unwrap();
        for &s in frames {
            w.write_sample(s).unwrap();
        }
        w.finalize().unwrap();
    }

    #[test]
    fn decodes_mono_wav_at_target_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav(&path, 16_000, 1, &vec![8192; 16_000]);
        let sig = load_audio(&path, &DecodeOptions::default()).unwrap();
        assert_eq!(sig.sample_rate(), 16_000);
        assert_eq!(sig.len(), 16_000);
        assert!((sig.samples()[100] - 0.25).abs() < 1e-4);
    }

    #[test]
    fn stereo_is_averaged_and_resampled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.wav");
        let frames: Vec<i16> = (0..32_000).flat_map(|_| [16384i16, 0]).collect();
        write_wav(&path, 32_000, 2, &frames);
        let sig = load_audio(&path, &DecodeOptions::default()).unwrap();
        assert_eq!(sig.sample_rate(), 16_000);
        assert_eq!(sig.len(), 16_000);
        assert!((sig.samples()[8000] - 0.25).abs() < 1e-2);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.wav");
        std::fs::write(&path, b"definitely not audio").unwrap();
        assert!(load_audio(&path, &DecodeOptions::default()).is_err());
    }

    #[test]
    fn missing_ffmpeg_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.webm");
        std::fs::write(&path, b"\x1a\x45\xdf\xa3").unwrap();
        let opts = DecodeOptions {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ..DecodeOptions::default()
        };
        assert!(matches!(
            load_audio(&path, &opts),
            Err(DecodeError::FfmpegNotFound(ext)) if ext == "webm"
        ));
    }
}
