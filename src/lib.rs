// src/lib.rs
pub mod batch;
pub mod cli;
pub mod error;
pub mod io;
pub mod loader;
pub mod processing;

pub use error::{Error, Result};
pub use processing::{IndexJob, IndexProcessor, ProcessingOptions, RunSummary};

// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
