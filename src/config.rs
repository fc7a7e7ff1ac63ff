//! User-facing plotter configuration, builder-style (modeled on the
//! teacher's `ETLOptions`).

use crate::constants::BUCKET_COUNT;
use std::path::{Path, PathBuf};

/// 32-byte plot identifier; seeds the ChaCha8 keystream for F1.
pub type PlotId = [u8; 32];

#[derive(Clone, Debug)]
pub struct PlotConfig {
    pub plot_id: PlotId,
    pub plot_memo: Vec<u8>,
    pub k: u32,

    pub plot_dir: PathBuf,
    pub temp_dir: PathBuf,

    pub thread_count: usize,
    pub io_thread_count: usize,

    /// Bytes of Fx output accumulated per table before a chunk is flushed
    /// to disk; indexed `[table - 2]` for tables 2..=7 (table 1 uses a
    /// fixed chunk size since there is no Fx to size around).
    pub write_intervals: [usize; 6],

    /// Size in bytes of the producer-side command-buffer heap.
    pub io_heap_bytes: usize,

    /// Gate direct-I/O + block-alignment behavior.
    pub direct_io: bool,

    pub progress: bool,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            plot_id: [0u8; 32],
            plot_memo: Vec::new(),
            k: 32,
            plot_dir: PathBuf::from("./plot"),
            temp_dir: PathBuf::from("./plot_tmp"),
            thread_count: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            io_thread_count: 1,
            write_intervals: [256 * 1024 * 1024; 6],
            io_heap_bytes: 1024 * 1024 * 1024,
            direct_io: false,
            progress: true,
        }
    }
}

impl PlotConfig {
    pub fn with_plot_id(mut self, plot_id: PlotId) -> Self {
        self.plot_id = plot_id;
        self
    }
    pub fn with_plot_memo(mut self, memo: impl Into<Vec<u8>>) -> Self {
        self.plot_memo = memo.into();
        self
    }
    pub fn with_k(mut self, k: u32) -> Self {
        self.k = k;
        self
    }
    pub fn with_plot_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.plot_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_temp_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.temp_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_thread_count(mut self, n: usize) -> Self {
        self.thread_count = n.max(1);
        self
    }
    pub fn with_io_thread_count(mut self, n: usize) -> Self {
        self.io_thread_count = n.max(1);
        self
    }
    pub fn with_write_interval_bytes(mut self, bytes: usize) -> Self {
        self.write_intervals = [bytes.max(BUCKET_COUNT * 64); 6];
        self
    }
    pub fn with_io_heap_bytes(mut self, bytes: usize) -> Self {
        self.io_heap_bytes = bytes;
        self
    }
    pub fn with_direct_io(mut self, yes: bool) -> Self {
        self.direct_io = yes;
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.k == 0 || self.k > crate::constants::MAX_K {
            return Err(crate::error::PlotError::Config(format!(
                "k must be in 1..={}, got {}",
                crate::constants::MAX_K,
                self.k
            )));
        }
        if self.io_heap_bytes < BUCKET_COUNT * crate::constants::BLOCK_SIZE {
            return Err(crate::error::PlotError::Config(
                "io_heap_bytes too small to hold one block per bucket".to_string(),
            ));
        }
        Ok(())
    }
}
