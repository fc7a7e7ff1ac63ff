use anyhow::Result;
use diskplot::Plot;

const PLOT_DIR: &str = "./plot_out";
const TEMP_DIR: &str = "./plot_tmp";

fn main() -> Result<()> {
    let plot_id: [u8; 32] = rand_plot_id();

    let counts = Plot::new()
        .plot_id(plot_id)
        .k(18)
        .plot_dir(PLOT_DIR)
        .temp_dir(TEMP_DIR)
        .thread_count(std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4))
        .progress(true)
        .run()?;

    for (i, c) in counts.iter().enumerate() {
        println!("table {}: {} entries", i + 1, c.entry_counts.last().copied().unwrap_or(0));
    }
    Ok(())
}

/// A demo plot id derived from the system clock; real callers should pass a
/// caller-chosen 32-byte id (spec.md §2 treats it as an opaque seed, not
/// something this crate generates for production use).
fn rand_plot_id() -> [u8; 32] {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    let mut id = [0u8; 32];
    id[..16].copy_from_slice(&nanos.to_le_bytes());
    id
}
