//! FFmpeg command builder and runner.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::tools::ToolPaths;

/// Captured output of one ffmpeg run.
#[derive(Debug)]
pub struct FfmpegOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// Builder for ffmpeg invocations.
///
/// Input args go before `-i`, output args after. The output target may be a
/// file, `pipe:1` or the null muxer.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: String,
    output: String,
    input_args: Vec<String>,
    output_args: Vec<String>,
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new command. `input` may be a path or a stream URL.
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            log_level: "error".to_string(),
        }
    }

    /// Discard decoded output (`-f null -`), used for analysis passes.
    pub fn null_output(input: impl Into<String>) -> Self {
        let mut cmd = Self::new(input, "-");
        cmd.output_args.push("-f".into());
        cmd.output_args.push("null".into());
        cmd
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Seek before the input (fast keyframe seek).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Bound the decoded duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format!("{:.3}", seconds))
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Extract a single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-frames:v").output_arg("1")
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Assemble the argv.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-y".to_string(),
            "-v".to_string(),
            self.log_level.clone(),
        ];
        args.extend(self.input_args.clone());
        args.push("-i".to_string());
        args.push(self.input.clone());
        args.extend(self.output_args.clone());
        args.push(self.output.clone());
        args
    }

    /// Run to completion, capturing stdout and stderr.
    ///
    /// A timeout kills the child and surfaces [`MediaError::Timeout`]; the
    /// caller's own cancellation drops the future, which also kills the
    /// child (`kill_on_drop`).
    pub async fn run(&self, tools: &ToolPaths, timeout: Duration) -> MediaResult<FfmpegOutput> {
        let ffmpeg = tools.ffmpeg()?;
        let args = self.build_args();
        debug!(args = ?args, "Running ffmpeg");

        let child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| MediaError::Timeout(timeout.as_secs()))??;

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            let message = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("unknown error")
                .to_string();
            return Err(MediaError::command_failed("ffmpeg", message, Some(stderr)));
        }

        Ok(FfmpegOutput {
            stdout: output.stdout,
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_ordering() {
        let cmd = FfmpegCommand::new("in.mp4", "out.png")
            .seek(12.5)
            .single_frame()
            .video_filter("scale=32:32");
        let args = cmd.build_args();

        let i_pos = args.iter().position(|a| a == "-i").unwrap();
        let ss_pos = args.iter().position(|a| a == "-ss").unwrap();
        let vf_pos = args.iter().position(|a| a == "-vf").unwrap();

        assert!(ss_pos < i_pos, "seek must precede -i");
        assert!(vf_pos > i_pos, "filters must follow -i");
        assert_eq!(args[ss_pos + 1], "12.500");
        assert_eq!(args.last().unwrap(), "out.png");
    }

    #[test]
    fn test_null_output() {
        let args = FfmpegCommand::null_output("in.mp4").build_args();
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "null"));
        assert_eq!(args.last().unwrap(), "-");
    }
}
