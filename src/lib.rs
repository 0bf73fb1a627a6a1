pub mod assemble;
pub mod config;
pub mod constants;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod storage;
pub mod types;

pub use error::{Result, ScraperError};
pub use pipeline::{run_now, Orchestrator};
pub use types::{Cost, Event, RunResult, SourceDescriptor, SourceKind};
