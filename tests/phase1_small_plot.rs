mod common;

#[test]
fn runs_all_seven_tables_and_writes_sidecars() {
    let dirs = common::TempDirs::new();
    // Large enough that match density per group is high (so every table
    // keeps producing entries), small enough to stay a quick deterministic
    // fixture the way the teacher's own integration tests are.
    let k = 16u32;
    let plot = common::small_plot(&dirs, k);

    let counts = plot.run().expect("phase 1 run should succeed for a small k");

    assert_eq!(counts.len(), 7, "one TableCounts per table 1..=7");
    assert_eq!(counts[0].entry_counts, vec![1u64 << k], "table 1 has exactly 2^k entries (spec.md §8f)");

    for (t, c) in counts.iter().enumerate() {
        assert!(c.entry_counts[0] > 0, "table {} produced zero entries", t + 1);
    }

    for t in 1..=7u8 {
        let sidecar = dirs.plot_path().join(format!("counts.t{t}.bin"));
        assert!(sidecar.exists(), "missing sidecar for table {t}");
        assert!(std::fs::metadata(&sidecar).unwrap().len() > 0);
    }
}
