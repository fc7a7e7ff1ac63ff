use std::path::PathBuf;

use diskplot::Plot;

/// Small, deterministic, temp-dir-backed plot run (mirrors the teacher's
/// `tests/common::make_corpus_basic` fixture-builder shape): `k` small
/// enough that a full Phase 1 run completes in well under a second, with
/// both the plot and temp directories torn down once `TempDirs` drops.
pub struct TempDirs {
    pub plot_dir: tempfile::TempDir,
    pub temp_dir: tempfile::TempDir,
}

impl TempDirs {
    pub fn new() -> Self {
        Self { plot_dir: tempfile::tempdir().unwrap(), temp_dir: tempfile::tempdir().unwrap() }
    }

    pub fn plot_path(&self) -> PathBuf {
        self.plot_dir.path().to_path_buf()
    }

    pub fn temp_path(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }
}

pub fn small_plot(dirs: &TempDirs, k: u32) -> Plot {
    Plot::new().plot_id([7u8; 32]).k(k).plot_dir(dirs.plot_path()).temp_dir(dirs.temp_path()).thread_count(2).progress(false)
}
