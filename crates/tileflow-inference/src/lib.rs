//! Bundled inference executors
//!
//! Tile-chunked executors for the two built-in job types. Each executor
//! streams the input image in fixed-size tiles, performs its per-tile
//! computation on the blocking thread pool, reports progress after every
//! tile and writes a JSON result descriptor into the results directory.
//! The scheduler treats both the work and the descriptor as opaque.

mod executors;

pub use executors::{
    executor_registry, CellSegmentationExecutor, InferenceConfig, TissueMaskExecutor,
};
