pub mod analyzer;
pub mod backend;
pub mod config;
pub mod dsp;
pub mod measures;
pub mod signal;

/// Audio file extensions we support
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    // Native (symphonia)
    "wav", "wave", "flac", "mp3", "ogg", "oga", "m4a", "mp4", "aac", "aif", "aiff", "caf", "mkv",
    // ffmpeg fallback
    "webm", "opus", "3gp", "amr", "wma",
];

/// Application name for XDG paths
pub const APP_NAME: &str = "vocalmark";

/// Every recording is analyzed at this rate, mono.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;
