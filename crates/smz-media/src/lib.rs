//! Media plumbing: ffprobe probing, ffmpeg frame work, yt-dlp downloads.
//!
//! Everything here shells out to external tools resolved through
//! [`ToolPaths`]; nothing touches the network directly.

pub mod command;
pub mod detect;
pub mod download;
pub mod error;
pub mod frames;
pub mod hash;
pub mod probe;
pub mod tools;

pub use command::FfmpegCommand;
pub use detect::detect_scenes;
pub use download::{download_video, fetch_video_title, resolve_stream_url, DEFAULT_YTDLP_FORMAT};
pub use error::{MediaError, MediaResult};
pub use frames::{extract_frame, frame_stats, FrameStats};
pub use hash::{average_hash, frame_hash_at, hamming_ratio, FrameHash, HASH_BITS};
pub use probe::{probe_media, VideoInfo};
pub use tools::ToolPaths;
