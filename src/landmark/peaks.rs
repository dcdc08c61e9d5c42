//! Adaptive peak detection over the melodic frequency band.

use crate::landmark::{BAND_HIGH_HZ, BAND_LOW_HZ, FRAME_SIZE, HOP_SIZE};

/// A strong spectral point: time in seconds, frequency in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub time: f64,
    pub freq: f64,
}

/// Extract per-frame spectral peaks inside the 80-1000 Hz band.
///
/// A bin qualifies when it is a strict local maximum of the in-band column
/// and its magnitude reaches the per-frame percentile threshold. The
/// threshold self-limits peak density, so there is no fixed per-frame cap.
/// The result is sorted by time.
pub fn detect_peaks(magnitudes: &[Vec<f32>], rate: u32, percentile_rank: f64) -> Vec<Peak> {
    let bin_hz = rate as f64 / FRAME_SIZE as f64;
    let band: Vec<usize> = (0..FRAME_SIZE / 2)
        .filter(|&b| {
            let f = b as f64 * bin_hz;
            (BAND_LOW_HZ..=BAND_HIGH_HZ).contains(&f)
        })
        .collect();

    if band.len() < 3 {
        return vec![];
    }

    let mut peaks = Vec::new();

    for (ti, frame) in magnitudes.iter().enumerate() {
        let col: Vec<f32> = band.iter().map(|&b| frame[b]).collect();
        let threshold = percentile(&col, percentile_rank);

        let time = ti as f64 * HOP_SIZE as f64 / rate as f64;
        for i in 1..col.len() - 1 {
            if col[i] > col[i - 1] && col[i] > col[i + 1] && col[i] >= threshold {
                peaks.push(Peak {
                    time,
                    freq: band[i] as f64 * bin_hz,
                });
            }
        }
    }

    // Frames are already scanned in order, but the generator depends on
    // time-sorted input, so the invariant is enforced here.
    peaks.sort_by(|a, b| a.time.total_cmp(&b.time));
    peaks
}

/// Percentile with linear interpolation between closest ranks.
pub fn percentile(values: &[f32], rank: f64) -> f32 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = rank / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let w = (pos - lo as f64) as f32;

    sorted[lo] + (sorted[hi] - sorted[lo]) * w
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::TARGET_RATE;

    fn blank_frames(count: usize) -> Vec<Vec<f32>> {
        vec![vec![0.0; FRAME_SIZE / 2]; count]
    }

    #[test]
    fn percentile_matches_known_values() {
        let values: Vec<f32> = (0..=100).map(|v| v as f32).collect();
        assert_eq!(percentile(&values, 95.0), 95.0);
        assert_eq!(percentile(&values, 0.0), 0.0);
        assert_eq!(percentile(&values, 100.0), 100.0);

        // Interpolation between ranks.
        assert_eq!(percentile(&[0.0, 10.0], 50.0), 5.0);
        assert_eq!(percentile(&[7.0], 95.0), 7.0);
    }

    #[test]
    fn silence_produces_no_peaks() {
        let peaks = detect_peaks(&blank_frames(40), TARGET_RATE, 95.0);
        assert!(peaks.is_empty());
    }

    #[test]
    fn single_hot_bin_becomes_one_peak() {
        let bin_hz = TARGET_RATE as f64 / FRAME_SIZE as f64;
        let hot_bin = 30; // ~323 Hz, inside the band
        let mut frames = blank_frames(3);
        frames[1][hot_bin] = 1.0;

        let peaks = detect_peaks(&frames, TARGET_RATE, 95.0);
        assert_eq!(peaks.len(), 1);
        let peak = peaks[0];
        assert!((peak.freq - hot_bin as f64 * bin_hz).abs() < 1e-9);
        assert!((peak.time - HOP_SIZE as f64 / TARGET_RATE as f64).abs() < 1e-9);
    }

    #[test]
    fn out_of_band_bins_are_ignored() {
        let mut frames = blank_frames(1);
        frames[0][2] = 1.0; // ~21 Hz, below the band
        frames[0][400] = 1.0; // ~4.3 kHz, above the band

        let peaks = detect_peaks(&frames, TARGET_RATE, 95.0);
        assert!(peaks.is_empty());
    }

    #[test]
    fn peaks_are_sorted_by_time() {
        let mut frames = blank_frames(6);
        for f in frames.iter_mut() {
            f[25] = 1.0;
            f[40] = 0.9;
        }

        let peaks = detect_peaks(&frames, TARGET_RATE, 50.0);
        assert!(peaks.windows(2).all(|w| w[0].time <= w[1].time));
    }
}
