//! Crate error type.
//!
//! Spec classifies failures into three kinds (see spec.md §7): `Fatal` I/O
//! and invariant violations abort the run, `ExpectedBounded` is the
//! matching-overshoot safety floor (logged, not propagated as a crash), and
//! `Observable` conditions are just logged. `PlotError` models the first
//! two; `Observable` conditions are plain `tracing` calls at the call site
//! and never constructed as an error.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pair delta overflow: right-left = {delta} exceeds 0xFFFF (l={l}, r={r})")]
    PairDeltaOverflow { l: u32, r: u32, delta: u64 },

    #[error("group boundary not found while splitting range [{start}, {end})")]
    GroupBoundaryNotFound { start: usize, end: usize },

    #[error("bucket {bucket} overfull: {count} entries exceeds capacity {capacity}")]
    BucketOverfull { bucket: usize, count: u64, capacity: u64 },

    #[error("heap allocation of {size} bytes (align {align}) can never fit in a heap of {heap_size} bytes")]
    AllocationTooLarge { size: usize, align: usize, heap_size: usize },

    #[error("sort key is not a permutation of [0, {expected}): {detail}")]
    NotAPermutation { expected: u64, detail: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PlotError>;

/// Attach a path to an [`std::io::Error`], the way `anyhow::Context` reads
/// at call sites but producing our typed [`PlotError::Io`] variant instead.
pub trait IoContext<T> {
    fn io_ctx(self, path: impl Into<std::path::PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_ctx(self, path: impl Into<std::path::PathBuf>) -> Result<T> {
        self.map_err(|source| PlotError::Io { path: path.into(), source })
    }
}
