//! Video source acquisition using yt-dlp.
//!
//! Detection may run against a live stream URL; frame extraction prefers a
//! local download in a broadly-decodable format (H.264/MP4, capped at 720p).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::tools::ToolPaths;

/// Default yt-dlp format selector for downloads.
pub const DEFAULT_YTDLP_FORMAT: &str =
    "bv*[height<=720][vcodec^=avc1]+ba[ext=m4a]/b[height<=720][ext=mp4]/b[height<=720]/b";

/// Format selector when only a stream URL is needed.
pub const DEFAULT_STREAM_FORMAT: &str = "b[height<=720][protocol^=http]/b[height<=720]/b";

async fn run_ytdlp(
    tools: &ToolPaths,
    args: &[&str],
    timeout: Duration,
) -> MediaResult<std::process::Output> {
    let ytdlp = tools.ytdlp()?;
    debug!(args = ?args, "Running yt-dlp");

    let child = Command::new(ytdlp)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| MediaError::Timeout(timeout.as_secs()))??;
    Ok(output)
}

fn last_error_line(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("unknown error")
        .to_string()
}

/// Resolve a direct stream URL without downloading.
pub async fn resolve_stream_url(
    tools: &ToolPaths,
    url: &str,
    format: &str,
    timeout: Duration,
) -> MediaResult<String> {
    let output = run_ytdlp(
        tools,
        &["--no-playlist", "-f", format, "-g", url],
        timeout,
    )
    .await?;

    if !output.status.success() {
        return Err(MediaError::download_failed(format!(
            "yt-dlp stream resolution failed: {}",
            last_error_line(&output.stderr)
        )));
    }

    let stream_url = String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or("")
        .trim()
        .to_string();
    if stream_url.is_empty() {
        return Err(MediaError::download_failed("yt-dlp produced no stream URL"));
    }

    debug!(url = %url, "Resolved stream URL");
    Ok(stream_url)
}

/// Download a video into `dest_dir`, returning the produced file path.
///
/// The destination directory is owned by the caller (typically a scoped temp
/// directory removed on every exit path).
pub async fn download_video(
    tools: &ToolPaths,
    url: &str,
    format: &str,
    dest_dir: &Path,
    timeout: Duration,
) -> MediaResult<PathBuf> {
    tokio::fs::create_dir_all(dest_dir).await?;
    let template = dest_dir.join("source.%(ext)s");
    let template_str = template.to_string_lossy().to_string();

    info!(url = %url, dest = %dest_dir.display(), "Downloading video source");

    let output = run_ytdlp(
        tools,
        &[
            "--no-playlist",
            "--no-progress",
            "-f",
            format,
            "--merge-output-format",
            "mp4",
            "-o",
            &template_str,
            url,
        ],
        timeout,
    )
    .await?;

    if !output.status.success() {
        let message = last_error_line(&output.stderr);
        warn!(url = %url, error = %message, "yt-dlp download failed");
        return Err(MediaError::download_failed(format!(
            "yt-dlp failed: {message}"
        )));
    }

    // yt-dlp picks the final extension; find what it wrote.
    let mut entries = tokio::fs::read_dir(dest_dir).await?;
    let mut best: Option<(u64, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.file_stem().is_some_and(|s| s == "source") {
            let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
            if best.as_ref().map(|(s, _)| size > *s).unwrap_or(true) {
                best = Some((size, path));
            }
        }
    }

    match best {
        Some((size, path)) if size > 0 => {
            info!(
                path = %path.display(),
                size_mb = size as f64 / (1024.0 * 1024.0),
                "Downloaded video source"
            );
            Ok(path)
        }
        _ => Err(MediaError::download_failed("output file not created")),
    }
}

/// Fetch the source title without downloading.
pub async fn fetch_video_title(
    tools: &ToolPaths,
    url: &str,
    timeout: Duration,
) -> MediaResult<String> {
    let output = run_ytdlp(
        tools,
        &["--no-playlist", "--no-download", "--print", "title", url],
        timeout,
    )
    .await?;

    if !output.status.success() {
        return Err(MediaError::download_failed(format!(
            "yt-dlp title fetch failed: {}",
            last_error_line(&output.stderr)
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_error_line_skips_blanks() {
        assert_eq!(
            last_error_line(b"WARNING: x\nERROR: real problem\n\n"),
            "ERROR: real problem"
        );
        assert_eq!(last_error_line(b""), "unknown error");
    }

    #[test]
    fn test_default_format_caps_resolution() {
        assert!(DEFAULT_YTDLP_FORMAT.contains("height<=720"));
        assert!(DEFAULT_YTDLP_FORMAT.contains("avc1"));
    }
}
