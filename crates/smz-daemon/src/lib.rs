//! The summarize daemon: a bearer-token-guarded local HTTP server sharing
//! the core pipeline with the CLI.

pub mod auth;
pub mod handlers;
pub mod routes;
pub mod runs;
pub mod service;
pub mod state;

pub use routes::create_router;
pub use runs::{RunRegistry, RunSnapshot};
pub use service::{DaemonFile, ServiceDefinition};
pub use state::AppState;
