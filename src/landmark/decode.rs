//! Audio preprocessing: decode, mono downmix and resampling.
//!
//! Everything downstream of this module works on a mono PCM buffer at
//! [`TARGET_RATE`](crate::landmark::TARGET_RATE).

use std::io::Cursor;

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{Decoder, DecoderOptions},
    formats::{FormatOptions, FormatReader, Track},
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use crate::landmark::{ExtractError, TARGET_RATE};

/// Decode raw audio bytes into a mono PCM buffer at [`TARGET_RATE`].
pub fn ingest(bytes: &[u8]) -> Result<Vec<f32>, ExtractError> {
    let (samples, rate, channels) = decode_audio(bytes)?;
    log::debug!(
        "decoded {} bytes: {} samples, {} channels at {} Hz",
        bytes.len(),
        samples.len(),
        channels,
        rate
    );

    resample(&to_mono(&samples, channels), rate, TARGET_RATE)
}

fn resample(input: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>, ExtractError> {
    if input_rate == 0 || output_rate == 0 {
        return Err(ExtractError::Resample(format!(
            "invalid sample rate conversion {input_rate} -> {output_rate}"
        )));
    }
    if input_rate == output_rate {
        return Ok(input.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        oversampling_factor: 64,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };

    let chunk_size = 1024;

    let mut resampler = SincFixedIn::<f32>::new(
        output_rate as f64 / input_rate as f64,
        2.0,
        params,
        chunk_size,
        1,
    )
    .map_err(|e| ExtractError::Resample(e.to_string()))?;

    process(chunk_size, input, &mut resampler)
}

fn process(
    chunk_size: usize,
    input: &[f32],
    resampler: &mut SincFixedIn<f32>,
) -> Result<Vec<f32>, ExtractError> {
    let mut output = Vec::new();
    let mut position = 0;

    while position + chunk_size <= input.len() {
        let chunk = vec![input[position..position + chunk_size].to_vec()];
        let result = resampler
            .process(&chunk, None)
            .map_err(|e| ExtractError::Resample(e.to_string()))?;

        output.extend_from_slice(&result[0]);
        position += chunk_size;
    }

    // Pad the tail chunk with zeros so the resampler sees a full block.
    let remaining = input.len() - position;
    if remaining > 0 {
        let mut padded = vec![0.0; chunk_size];
        padded[..remaining].copy_from_slice(&input[position..]);

        let result = resampler
            .process(&[padded], None)
            .map_err(|e| ExtractError::Resample(e.to_string()))?;

        output.extend_from_slice(&result[0]);
    }

    Ok(output)
}

fn to_mono(input: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return input.to_vec();
    }

    input
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn decode_audio(bytes: &[u8]) -> Result<(Vec<f32>, u32, usize), ExtractError> {
    let cursor = Cursor::new(bytes.to_vec());
    let media_source_stream = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut format = get_format(media_source_stream)?;
    let track = format
        .default_track()
        .ok_or_else(|| ExtractError::Decode("no default audio track".into()))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| ExtractError::Decode("track is missing a sample rate".into()))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(0);
    if channels == 0 {
        return Err(ExtractError::Decode("track has no channels".into()));
    }
    let track_id = track.id;

    let mut decoder = get_decoder(track)?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(_) => break,
        };

        if packet.track_id() != track_id {
            continue;
        }

        // Corrupt packets are skipped rather than aborting the whole clip.
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(_) => continue,
        };

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    Ok((samples, sample_rate, channels))
}

fn get_format(media_source_stream: MediaSourceStream) -> Result<Box<dyn FormatReader>, ExtractError> {
    let hint = Hint::new();
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            media_source_stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ExtractError::Decode(e.to_string()))?;

    Ok(probed.format)
}

fn get_decoder(track: &Track) -> Result<Box<dyn Decoder>, ExtractError> {
    symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| ExtractError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: &[i16], rate: u32) -> Vec<u8> {
        let data_len = samples.len() * 2;
        let mut v = Vec::new();
        v.extend_from_slice(b"RIFF");
        v.extend_from_slice(&((36 + data_len) as u32).to_le_bytes());
        v.extend_from_slice(b"WAVE");
        v.extend_from_slice(b"fmt ");
        v.extend_from_slice(&16u32.to_le_bytes());
        v.extend_from_slice(&1u16.to_le_bytes()); // PCM
        v.extend_from_slice(&1u16.to_le_bytes()); // mono
        v.extend_from_slice(&rate.to_le_bytes());
        v.extend_from_slice(&(rate * 2).to_le_bytes());
        v.extend_from_slice(&2u16.to_le_bytes());
        v.extend_from_slice(&16u16.to_le_bytes());
        v.extend_from_slice(b"data");
        v.extend_from_slice(&(data_len as u32).to_le_bytes());
        for s in samples {
            v.extend_from_slice(&s.to_le_bytes());
        }
        v
    }

    fn sine_i16(freq: f64, rate: u32, secs: f64) -> Vec<i16> {
        let n = (rate as f64 * secs) as usize;
        (0..n)
            .map(|i| {
                let x = (2.0 * std::f64::consts::PI * freq * i as f64 / rate as f64).sin();
                (x * 0.5 * i16::MAX as f64) as i16
            })
            .collect()
    }

    #[test]
    fn garbage_bytes_fail_with_decode_error() {
        let err = ingest(&[0u8; 64]).unwrap_err();
        assert!(matches!(err, ExtractError::Decode(_)));
    }

    #[test]
    fn wav_at_target_rate_passes_through() {
        let samples = sine_i16(440.0, TARGET_RATE, 1.0);
        let bytes = wav_bytes(&samples, TARGET_RATE);

        let pcm = ingest(&bytes).unwrap();
        assert_eq!(pcm.len(), samples.len());
        assert!(pcm.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn wav_at_other_rate_is_resampled() {
        let samples = sine_i16(440.0, 22_050, 1.0);
        let bytes = wav_bytes(&samples, 22_050);

        let pcm = ingest(&bytes).unwrap();
        // Chunked resampling pads the tail, so allow some slack around 1 s.
        assert!(pcm.len() > 10_500 && pcm.len() < 11_800, "got {}", pcm.len());
        assert!(pcm.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn zero_rate_is_a_resample_error() {
        let err = resample(&[0.0; 512], 0, TARGET_RATE).unwrap_err();
        assert!(matches!(err, ExtractError::Resample(_)));
    }

    #[test]
    fn stereo_is_averaged_to_mono() {
        let interleaved = [1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(to_mono(&interleaved, 2), vec![0.5, 0.5, 0.0]);
    }
}
