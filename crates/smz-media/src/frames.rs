//! Frame extraction and luminance statistics.

use std::path::Path;
use std::time::Duration;

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::tools::ToolPaths;

/// Normalized luminance statistics for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    /// YAVG / 255, in [0, 1].
    pub brightness: f64,
    /// (YMAX − YMIN) / 255, in [0, 1].
    pub contrast: f64,
}

impl FrameStats {
    /// Composite quality score used by thumbnail refinement.
    pub fn score(&self) -> f64 {
        0.55 * self.brightness + 0.45 * self.contrast
    }
}

/// Extract the frame at `timestamp` into `output` (PNG), returning its stats.
///
/// A single decode pass both writes the image and runs `signalstats`, whose
/// metadata lines land on stderr.
pub async fn extract_frame(
    tools: &ToolPaths,
    input: &str,
    timestamp: f64,
    output: &Path,
    timeout: Duration,
) -> MediaResult<FrameStats> {
    let cmd = FfmpegCommand::new(input, output.to_string_lossy())
        .seek(timestamp)
        .single_frame()
        .video_filter("signalstats,metadata=mode=print")
        .log_level("info");

    let result = cmd.run(tools, timeout).await?;

    if !output.exists() {
        return Err(MediaError::command_failed(
            "ffmpeg",
            format!("no frame produced at {timestamp:.2}s"),
            Some(result.stderr),
        ));
    }

    parse_signalstats(&result.stderr).ok_or_else(|| {
        MediaError::InvalidMedia(format!("no signalstats output for frame at {timestamp:.2}s"))
    })
}

/// Probe stats only, without writing an image.
pub async fn frame_stats(
    tools: &ToolPaths,
    input: &str,
    timestamp: f64,
    timeout: Duration,
) -> MediaResult<FrameStats> {
    let cmd = FfmpegCommand::null_output(input)
        .seek(timestamp)
        .single_frame()
        .video_filter("signalstats,metadata=mode=print")
        .log_level("info");

    let result = cmd.run(tools, timeout).await?;
    parse_signalstats(&result.stderr).ok_or_else(|| {
        MediaError::InvalidMedia(format!("no signalstats output for frame at {timestamp:.2}s"))
    })
}

/// Parse `lavfi.signalstats.*` metadata lines.
fn parse_signalstats(stderr: &str) -> Option<FrameStats> {
    let mut yavg = None;
    let mut ymin = None;
    let mut ymax = None;

    for line in stderr.lines() {
        let line = line.trim();
        let grab = |key: &str| -> Option<f64> {
            line.split_once(key)
                .and_then(|(_, rest)| rest.trim_start_matches('=').trim().parse().ok())
        };
        if let Some(v) = grab("lavfi.signalstats.YAVG") {
            yavg = Some(v);
        } else if let Some(v) = grab("lavfi.signalstats.YMIN") {
            ymin = Some(v);
        } else if let Some(v) = grab("lavfi.signalstats.YMAX") {
            ymax = Some(v);
        }
    }

    match (yavg, ymin, ymax) {
        (Some(avg), Some(min), Some(max)) => Some(FrameStats {
            brightness: (avg / 255.0).clamp(0.0, 1.0),
            contrast: ((max - min) / 255.0).clamp(0.0, 1.0),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
[Parsed_metadata_1 @ 0x0] frame:0    pts:12      pts_time:0.4\n\
[Parsed_metadata_1 @ 0x0] lavfi.signalstats.YMIN=16\n\
[Parsed_metadata_1 @ 0x0] lavfi.signalstats.YMAX=235\n\
[Parsed_metadata_1 @ 0x0] lavfi.signalstats.YAVG=121.5\n";

    #[test]
    fn test_parse_signalstats() {
        let stats = parse_signalstats(SAMPLE).unwrap();
        assert!((stats.brightness - 121.5 / 255.0).abs() < 1e-9);
        assert!((stats.contrast - (235.0 - 16.0) / 255.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_signalstats_missing_lines() {
        assert_eq!(parse_signalstats("no metadata here"), None);
        assert_eq!(
            parse_signalstats("[x] lavfi.signalstats.YAVG=100"),
            None,
            "all three stats are required"
        );
    }

    #[test]
    fn test_score_weighting() {
        let bright = FrameStats {
            brightness: 1.0,
            contrast: 0.0,
        };
        let contrasty = FrameStats {
            brightness: 0.0,
            contrast: 1.0,
        };
        assert!((bright.score() - 0.55).abs() < 1e-9);
        assert!((contrasty.score() - 0.45).abs() < 1e-9);
    }
}
