//! Landmark extraction pipeline.
//!
//! Wires decoding, framing, spectral analysis, peak detection and pair
//! hashing together to turn raw audio bytes into fingerprint landmarks.

use thiserror::Error;

mod decode;
mod extraction;
pub mod hashing;
pub(crate) mod peaks;

pub use hashing::{Key, Landmark};

/// Analysis sample rate; all extraction happens at this rate.
pub const TARGET_RATE: u32 = 11_025;

/// STFT frame length in samples.
pub const FRAME_SIZE: usize = 1024;

/// Samples between frame starts (75 % overlap).
pub const HOP_SIZE: usize = 256;

/// Longest allowed gap between paired peaks, seconds.
pub const MAX_DT: f64 = 0.5;

/// Peak band matched to sung/hummed fundamentals, Hz.
pub const BAND_LOW_HZ: f64 = 80.0;
pub const BAND_HIGH_HZ: f64 = 1000.0;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("audio decode failed: {0}")]
    Decode(String),
    #[error("resampling failed: {0}")]
    Resample(String),
}

/// Named extraction profile.
///
/// Ingestion favors a high-information window and denser peaks; queries
/// favor latency with a short leading window and a stricter threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Ingestion,
    Query,
}

impl Profile {
    fn percentile(self) -> f64 {
        match self {
            Profile::Ingestion => 95.0,
            Profile::Query => 97.0,
        }
    }

    fn max_pairs(self) -> usize {
        match self {
            Profile::Ingestion => 20,
            Profile::Query => 15,
        }
    }

    /// Select the analysis window of the clip.
    ///
    /// Ingestion takes seconds 30 to 55 when the clip is long enough (intros
    /// and outros carry less distinctive content), otherwise the whole
    /// clip. Queries take the leading 15 seconds.
    fn window(self, samples: &[f32], rate: u32) -> &[f32] {
        let rate = rate as usize;
        match self {
            Profile::Ingestion => {
                if samples.len() > 55 * rate {
                    &samples[30 * rate..55 * rate]
                } else {
                    samples
                }
            }
            Profile::Query => &samples[..samples.len().min(15 * rate)],
        }
    }
}

/// Run the full pipeline on raw audio bytes.
pub fn extract_landmarks(audio_bytes: &[u8], profile: Profile) -> Result<Vec<Landmark>, ExtractError> {
    let pcm_buffer = decode::ingest(audio_bytes)?;
    Ok(landmarks_from_samples(&pcm_buffer, TARGET_RATE, profile))
}

/// Pipeline stages after preprocessing, starting from mono PCM.
pub fn landmarks_from_samples(samples: &[f32], rate: u32, profile: Profile) -> Vec<Landmark> {
    let window = profile.window(samples, rate);
    let frames = extraction::frame(window);
    let magnitudes = extraction::fft_magnitude(frames);
    let peaks = peaks::detect_peaks(&magnitudes, rate, profile.percentile());

    hashing::generate_landmarks(&peaks, profile.max_pairs())
}

/// Degrade extraction failures to an empty landmark set.
///
/// Unreadable audio yields zero fingerprints instead of failing the whole
/// request: an ingest records a song with no landmarks and a query reports
/// no match.
pub fn extract_or_empty(audio_bytes: &[u8], profile: Profile) -> Vec<Landmark> {
    match extract_landmarks(audio_bytes, profile) {
        Ok(landmarks) => landmarks,
        Err(e) => {
            log::warn!("landmark extraction failed, treating as empty: {e}");
            Vec::new()
        }
    }
}
