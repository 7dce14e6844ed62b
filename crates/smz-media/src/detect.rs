//! Scene-change detection via ffmpeg's `select` filter.

use std::time::Duration;

use tracing::debug;

use crate::command::FfmpegCommand;
use crate::error::MediaResult;
use crate::tools::ToolPaths;

/// Detect scene-change timestamps in `[start, start + span)` of `input`.
///
/// Returned timestamps are relative to `start`; the caller re-bases them when
/// stitching segments together. `threshold` feeds ffmpeg's `scene` score
/// directly.
pub async fn detect_scenes(
    tools: &ToolPaths,
    input: &str,
    start: f64,
    span: f64,
    threshold: f64,
    timeout: Duration,
) -> MediaResult<Vec<f64>> {
    let filter = format!("select='gt(scene,{threshold:.4})',showinfo");
    let cmd = FfmpegCommand::null_output(input)
        .seek(start)
        .duration(span)
        .video_filter(filter)
        .log_level("info");

    let output = cmd.run(tools, timeout).await?;
    let timestamps = parse_showinfo_timestamps(&output.stderr);
    debug!(
        start,
        span,
        threshold,
        detections = timestamps.len(),
        "Scene detection segment finished"
    );
    Ok(timestamps)
}

/// Pull `pts_time:` values out of showinfo stderr lines.
fn parse_showinfo_timestamps(stderr: &str) -> Vec<f64> {
    let mut out = Vec::new();
    for line in stderr.lines() {
        if !line.contains("Parsed_showinfo") {
            continue;
        }
        if let Some(idx) = line.find("pts_time:") {
            let rest = &line[idx + "pts_time:".len()..];
            let token: String = rest
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            if let Ok(ts) = token.parse::<f64>() {
                if ts >= 0.0 {
                    out.push(ts);
                }
            }
        }
    }
    out.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
[Parsed_showinfo_1 @ 0x55] n:   0 pts:  90090 pts_time:3.003   duration_time:0.033367 fmt:yuv420p\n\
[Parsed_showinfo_1 @ 0x55] color_range:tv color_space:bt709\n\
[Parsed_showinfo_1 @ 0x55] n:   1 pts: 270270 pts_time:9.009   duration_time:0.033367 fmt:yuv420p\n\
[out#0/null @ 0x56] video:2kB audio:0kB\n";

    #[test]
    fn test_parse_showinfo_timestamps() {
        let ts = parse_showinfo_timestamps(SAMPLE);
        assert_eq!(ts.len(), 2);
        assert!((ts[0] - 3.003).abs() < 1e-9);
        assert!((ts[1] - 9.009).abs() < 1e-9);
    }

    #[test]
    fn test_parse_ignores_unrelated_lines() {
        assert!(parse_showinfo_timestamps("[x] pts_time:3.0").is_empty());
        assert!(parse_showinfo_timestamps("").is_empty());
    }

    #[test]
    fn test_parse_sorts_out_of_order() {
        let raw = "\
[Parsed_showinfo_1 @ 0x55] n: 0 pts_time:9.5 x\n\
[Parsed_showinfo_1 @ 0x55] n: 1 pts_time:2.5 x\n";
        let ts = parse_showinfo_timestamps(raw);
        assert_eq!(ts, vec![2.5, 9.5]);
    }
}
