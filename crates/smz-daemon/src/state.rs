//! Daemon application state.

use std::path::PathBuf;
use std::sync::Arc;

use smz_core::{RunOptions, RunServices, RuntimeContext};

use crate::runs::RunRegistry;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub ctx: RuntimeContext,
    pub services: RunServices,
    /// Per-request options start from these daemon defaults.
    pub base_options: RunOptions,
    /// The bearer token every non-liveness request must carry.
    pub token: String,
    pub runs: Arc<RunRegistry>,
    /// Root directory slide images are served from.
    pub slides_root: PathBuf,
    pub version: String,
}
