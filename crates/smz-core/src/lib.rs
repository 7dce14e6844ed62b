//! Orchestration core: configuration, the run flow, cost reporting.

pub mod config;
pub mod context;
pub mod error;
pub mod prompt;
pub mod recovery;
pub mod report;
pub mod run;

pub use config::{CacheSection, FileConfig, MediaSection, Paths};
pub use context::RuntimeContext;
pub use error::{CoreError, CoreResult};
pub use recovery::{is_unreachable_error, DaemonStatus, RecoveryTracker};
pub use report::render_report;
pub use run::{
    run_flow, EventSink, RunInput, RunOptions, RunOutcome, RunServices, SlideRunOptions,
};
