//! Run lifecycle and streamed event types.

use serde::{Deserialize, Serialize};

/// Daemon-side run state; transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Queued,
    Running,
    Done,
    Failed,
}

impl RunState {
    /// Whether the run has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

/// One event in a run's append-only log.
///
/// The wire form is an SSE frame `event: <name>\ndata: <json>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum RunEvent {
    /// A merged streaming delta.
    Chunk { text: String },
    /// A terminal error for the run.
    Error { message: String },
    /// Slide pipeline progress or completion payload.
    Slides(serde_json::Value),
    /// Coarse status transitions (queued, extracting, summarizing, ...).
    Status { message: String },
    /// End of stream.
    Done {},
}

impl RunEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::Chunk { .. } => "chunk",
            RunEvent::Error { .. } => "error",
            RunEvent::Slides(_) => "slides",
            RunEvent::Status { .. } => "status",
            RunEvent::Done {} => "done",
        }
    }

    /// SSE data payload.
    pub fn data_json(&self) -> serde_json::Value {
        match self {
            RunEvent::Chunk { text } => serde_json::json!({ "text": text }),
            RunEvent::Error { message } => serde_json::json!({ "message": message }),
            RunEvent::Slides(value) => value.clone(),
            RunEvent::Status { message } => serde_json::json!({ "message": message }),
            RunEvent::Done {} => serde_json::json!({}),
        }
    }
}
