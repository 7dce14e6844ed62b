//! Average-hash frame fingerprints.
//!
//! A frame is reduced to 32×32 grayscale (1024 pixels); each bit is 1 iff the
//! pixel is at or above the frame mean. Differences between frames are the
//! Hamming distance over the 1024 bits, expressed as a ratio in [0, 1].

use std::time::Duration;

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::tools::ToolPaths;

/// Side length of the downscaled grayscale frame.
pub const HASH_SIZE: usize = 32;
/// Total bits in a fingerprint.
pub const HASH_BITS: usize = HASH_SIZE * HASH_SIZE;

/// A 1024-bit frame fingerprint.
pub type FrameHash = [u64; HASH_BITS / 64];

/// Compute the average hash of raw 32×32 grayscale pixels.
pub fn average_hash(pixels: &[u8]) -> MediaResult<FrameHash> {
    if pixels.len() < HASH_BITS {
        return Err(MediaError::InvalidMedia(format!(
            "expected {} grayscale bytes, got {}",
            HASH_BITS,
            pixels.len()
        )));
    }
    let pixels = &pixels[..HASH_BITS];

    let sum: u64 = pixels.iter().map(|&p| p as u64).sum();
    let mean = (sum / HASH_BITS as u64) as u8;

    let mut hash: FrameHash = [0; HASH_BITS / 64];
    for (i, &p) in pixels.iter().enumerate() {
        if p >= mean {
            hash[i / 64] |= 1 << (i % 64);
        }
    }
    Ok(hash)
}

/// Hamming distance between two fingerprints as a ratio in [0, 1].
pub fn hamming_ratio(a: &FrameHash, b: &FrameHash) -> f64 {
    let differing: u32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x ^ y).count_ones())
        .sum();
    differing as f64 / HASH_BITS as f64
}

/// Hash the frame at `timestamp` of `input` (file path or stream URL).
pub async fn frame_hash_at(
    tools: &ToolPaths,
    input: &str,
    timestamp: f64,
    timeout: Duration,
) -> MediaResult<FrameHash> {
    let cmd = FfmpegCommand::new(input, "pipe:1")
        .seek(timestamp)
        .single_frame()
        .video_filter(format!("scale={HASH_SIZE}:{HASH_SIZE},format=gray"))
        .output_arg("-f")
        .output_arg("rawvideo");

    let output = cmd.run(tools, timeout).await?;
    average_hash(&output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(value: u8) -> Vec<u8> {
        vec![value; HASH_BITS]
    }

    #[test]
    fn test_identical_frames_have_zero_diff() {
        let mut pixels = flat(10);
        for p in pixels.iter_mut().skip(512) {
            *p = 200;
        }
        let a = average_hash(&pixels).unwrap();
        let b = average_hash(&pixels).unwrap();
        assert_eq!(hamming_ratio(&a, &b), 0.0);
    }

    #[test]
    fn test_inverted_halves_have_full_diff() {
        // Frame A: bright bottom half; frame B: bright top half.
        let mut a_px = flat(0);
        for p in a_px.iter_mut().skip(HASH_BITS / 2) {
            *p = 255;
        }
        let mut b_px = flat(0);
        for p in b_px.iter_mut().take(HASH_BITS / 2) {
            *p = 255;
        }
        let a = average_hash(&a_px).unwrap();
        let b = average_hash(&b_px).unwrap();
        assert!((hamming_ratio(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_uniform_frame_hashes_all_ones() {
        // Every pixel equals the mean, so every bit is set.
        let hash = average_hash(&flat(128)).unwrap();
        assert!(hash.iter().all(|&w| w == u64::MAX));
    }

    #[test]
    fn test_short_buffer_rejected() {
        assert!(average_hash(&[0u8; 100]).is_err());
    }

    #[test]
    fn test_small_change_small_ratio() {
        let mut a_px = flat(0);
        for p in a_px.iter_mut().skip(HASH_BITS / 2) {
            *p = 255;
        }
        let mut b_px = a_px.clone();
        // Flip 32 pixels.
        for p in b_px.iter_mut().take(32) {
            *p = 255;
        }
        let a = average_hash(&a_px).unwrap();
        let b = average_hash(&b_px).unwrap();
        let ratio = hamming_ratio(&a, &b);
        assert!(ratio > 0.0 && ratio < 0.1, "ratio was {ratio}");
    }
}
