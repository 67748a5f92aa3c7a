// src/processing/mod.rs
pub mod engine;
pub mod grid;
pub mod indices;
pub mod kernel;
pub mod parallel;
pub mod processor;

// Re-export main components
pub use engine::{run_blocks, run_whole, BandSet, OutputSet};
pub use grid::{BlockGrid, BlockSize, Window};
pub use indices::{BandRole, IndexKind, IndexSpec};
pub use kernel::{compute_index, IndexParams, IndexResult, MaskStats, NodataValues, Threshold};
pub use parallel::run_pipelined;
pub use processor::{IndexJob, IndexProcessor, Mode, ProcessingOptions, RunSummary, Variant};
