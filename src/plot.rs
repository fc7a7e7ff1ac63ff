//! Top-level plotting entry point (spec.md §1 "Purpose/Scope"), tying
//! [`PlotConfig`] to the per-table driver the way the teacher's `RedditETL`
//! ties `ETLOptions` to its scan/shard/aggregate pipeline -- a small builder
//! with `with_*`-style methods that delegates straight to the config it
//! wraps, plus a `run()` that owns the driver's lifetime.

use std::path::Path;

use crate::config::{PlotConfig, PlotId};
use crate::constants::LAST_TABLE;
use crate::driver::PlotDriver;
use crate::entry::TableCounts;
use crate::error::Result;
use crate::progress::ProgressScope;

/// Builder for a single plotting run.
#[derive(Clone, Debug, Default)]
pub struct Plot {
    cfg: PlotConfig,
}

impl Plot {
    pub fn new() -> Self {
        Self { cfg: PlotConfig::default() }
    }

    pub fn plot_id(mut self, id: PlotId) -> Self {
        self.cfg = self.cfg.with_plot_id(id);
        self
    }
    pub fn plot_memo(mut self, memo: impl Into<Vec<u8>>) -> Self {
        self.cfg = self.cfg.with_plot_memo(memo);
        self
    }
    pub fn k(mut self, k: u32) -> Self {
        self.cfg = self.cfg.with_k(k);
        self
    }
    pub fn plot_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cfg = self.cfg.with_plot_dir(dir);
        self
    }
    pub fn temp_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cfg = self.cfg.with_temp_dir(dir);
        self
    }
    pub fn thread_count(mut self, n: usize) -> Self {
        self.cfg = self.cfg.with_thread_count(n);
        self
    }
    pub fn io_thread_count(mut self, n: usize) -> Self {
        self.cfg = self.cfg.with_io_thread_count(n);
        self
    }
    pub fn io_heap_bytes(mut self, bytes: usize) -> Self {
        self.cfg = self.cfg.with_io_heap_bytes(bytes);
        self
    }
    pub fn direct_io(mut self, yes: bool) -> Self {
        self.cfg = self.cfg.with_direct_io(yes);
        self
    }
    pub fn progress(mut self, yes: bool) -> Self {
        self.cfg = self.cfg.with_progress(yes);
        self
    }

    /// Runs Phase 1 to completion: generates table 1 via F1, then tables
    /// 2..=7 via sort/match/stitch/Fx, persisting every table's sorted
    /// `Y`/`MetaA`/`MetaB`/`SortKey`, forward map, and back-pointer pairs
    /// under `temp_dir`, plus a `counts.t*.bin` sidecar per table under
    /// `plot_dir`. Returns each table's [`TableCounts`] in table order.
    pub fn run(self) -> Result<Vec<TableCounts>> {
        crate::logging::init_tracing_once();
        let show_progress = self.cfg.progress;
        std::fs::create_dir_all(&self.cfg.plot_dir).map_err(|e| crate::error::PlotError::Io { path: self.cfg.plot_dir.clone(), source: e })?;

        let mut driver = PlotDriver::new(self.cfg)?;
        let progress = show_progress.then(|| ProgressScope::count("Phase 1 tables", LAST_TABLE as u64));

        let counts = driver.run(progress.as_ref())?;
        if let Some(p) = &progress {
            p.finish("Phase 1 complete");
        }
        driver.write_counts_sidecar(&counts);
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_methods_thread_through_config() {
        let plot = Plot::new().k(18).thread_count(2).direct_io(true).progress(false);
        assert_eq!(plot.cfg.k, 18);
        assert_eq!(plot.cfg.thread_count, 2);
        assert!(plot.cfg.direct_io);
        assert!(!plot.cfg.progress);
    }
}
