//! Spectral analysis: framing, windowing and FFT magnitudes.

use std::f32::consts::PI;

use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use crate::landmark::{FRAME_SIZE, HOP_SIZE};

/// Compute the magnitude spectrum of each frame.
///
/// Returns one vector of `FRAME_SIZE / 2` magnitudes per frame; phase is
/// discarded. Frames are independent, so the FFT runs in parallel while
/// preserving frame order.
pub fn fft_magnitude(frames: Vec<Vec<f32>>) -> Vec<Vec<f32>> {
    if frames.is_empty() {
        return vec![];
    }

    let n = frames[0].len();
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n);

    frames
        .into_par_iter()
        .map(|frame| {
            let mut buffer: Vec<Complex<f32>> =
                frame.iter().map(|&v| Complex { re: v, im: 0.0 }).collect();
            fft.process(&mut buffer);

            buffer[..n / 2]
                .iter()
                .map(|c| (c.re * c.re + c.im * c.im).sqrt())
                .collect()
        })
        .collect()
}

/// Split a PCM buffer into overlapping Hann-windowed frames.
///
/// Frame `i` starts at sample `i * HOP_SIZE`; the trailing frame is
/// zero-padded to `FRAME_SIZE`.
pub fn frame(pcm_buffer: &[f32]) -> Vec<Vec<f32>> {
    let mut frames: Vec<Vec<f32>> = Vec::new();
    let window = hann_window(FRAME_SIZE);

    let mut position = 0;
    while position < pcm_buffer.len() {
        let mut frame = vec![0.0; FRAME_SIZE];

        let end = (position + FRAME_SIZE).min(pcm_buffer.len());
        let len = end - position;

        frame[..len].copy_from_slice(&pcm_buffer[position..end]);
        apply_window(&mut frame, &window);
        frames.push(frame);

        position += HOP_SIZE;
    }

    frames
}

fn apply_window(frame: &mut [f32], window: &[f32]) {
    for (sample, w) in frame.iter_mut().zip(window.iter()) {
        *sample *= *w;
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (n - 1.0)).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::TARGET_RATE;

    #[test]
    fn frame_count_follows_hop_size() {
        let pcm = vec![0.0; TARGET_RATE as usize]; // 1 s
        let frames = frame(&pcm);

        // One frame per hop until the buffer is exhausted.
        let expected = (TARGET_RATE as usize + HOP_SIZE - 1) / HOP_SIZE;
        assert_eq!(frames.len(), expected);
        assert!(frames.iter().all(|f| f.len() == FRAME_SIZE));
    }

    #[test]
    fn empty_input_yields_no_frames() {
        assert!(frame(&[]).is_empty());
        assert!(fft_magnitude(vec![]).is_empty());
    }

    #[test]
    fn hann_window_tapers_to_zero_at_the_edges() {
        let w = hann_window(FRAME_SIZE);
        assert!(w[0].abs() < 1e-6);
        assert!(w[FRAME_SIZE - 1].abs() < 1e-6);
        assert!((w[FRAME_SIZE / 2] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn sine_energy_lands_in_the_expected_bin() {
        // A sine exactly on bin 32 should dominate that bin after windowing.
        let bin = 32;
        let freq = bin as f64 * TARGET_RATE as f64 / FRAME_SIZE as f64;
        let pcm: Vec<f32> = (0..FRAME_SIZE * 4)
            .map(|i| {
                (2.0 * std::f64::consts::PI * freq * i as f64 / TARGET_RATE as f64).sin() as f32
            })
            .collect();

        let mags = fft_magnitude(frame(&pcm));
        let first = &mags[0];
        let argmax = first
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(argmax, bin);
    }

    #[test]
    fn magnitudes_are_deterministic_across_runs() {
        let pcm: Vec<f32> = (0..FRAME_SIZE * 8).map(|i| ((i % 97) as f32) / 97.0).collect();
        let a = fft_magnitude(frame(&pcm));
        let b = fft_magnitude(frame(&pcm));
        assert_eq!(a, b);
    }
}
