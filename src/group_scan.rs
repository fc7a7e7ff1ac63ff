//! Group scan (spec.md §4.4): splits a sorted bucket's `y` values into
//! maximal runs sharing `Y / PARAM_BC`, in parallel.
//!
//! Grounded on the teacher's `dedupe::build_runs_sorted` approach to
//! "parallel-probe for a safe split point, then scan sequentially within
//! each worker's range" -- here workers probe for a *group* boundary rather
//! than a dedupe-key boundary.

use rayon::prelude::*;

use crate::entry::Group;

/// `Y / PARAM_BC`, `Y` being the [`crate::constants::full_y`] value.
#[inline]
fn group_id(full_y: u64) -> u64 {
    full_y / crate::constants::PARAM_BC as u64
}

/// Splits `[0, n)` into `workers` near-equal ranges, nudging each boundary
/// forward until it lands on a group boundary (or the end of the slice),
/// then scans sequentially within each adjusted range. Returns groups in
/// left-to-right order. `y` holds each entry's own `y` value (not yet
/// folded with the bucket prefix); `bucket_idx`/`width` are passed straight
/// through to [`crate::constants::full_y`].
pub fn scan_groups(y: &[u32], bucket_idx: usize, width: u32, workers: usize) -> Vec<Group> {
    let full = |i: usize| crate::constants::full_y(bucket_idx, y[i], width);
    let n = y.len();
    if n == 0 {
        return Vec::new();
    }
    let workers = workers.max(1).min(n);
    let nominal = n.div_ceil(workers);

    // Adjust each interior split point forward to the next group boundary so
    // worker ranges never split a group across two workers.
    let mut splits = vec![0usize];
    for w in 1..workers {
        let mut i = (w * nominal).min(n);
        if i > 0 && i < n {
            let g = group_id(full(i));
            while i < n && group_id(full(i)) == g {
                i += 1;
            }
        }
        splits.push(i.min(n));
    }
    splits.push(n);
    splits.dedup();

    let ranges: Vec<(usize, usize)> = splits.windows(2).map(|w| (w[0], w[1])).filter(|(s, e)| s < e).collect();

    let per_range_groups: Vec<Vec<Group>> = ranges
        .par_iter()
        .map(|&(start, end)| {
            let mut groups = Vec::new();
            let mut run_start = start;
            let mut run_id = group_id(full(start));
            for i in start + 1..end {
                let g = group_id(full(i));
                if g != run_id {
                    groups.push(Group { start: run_start, end: i, group_id: run_id });
                    run_start = i;
                    run_id = g;
                }
            }
            groups.push(Group { start: run_start, end, group_id: run_id });
            groups
        })
        .collect();

    // Merge adjacent ranges' boundary groups: if the last group of one
    // range and the first group of the next share a group id (can only
    // happen if our forward-nudge above left a range starting mid-group,
    // which it should not, but merging is cheap insurance and keeps this
    // function correct even if `workers` exceeds the number of groups).
    let mut merged: Vec<Group> = Vec::with_capacity(n);
    for groups in per_range_groups {
        for g in groups {
            if let Some(last) = merged.last_mut() {
                if last.group_id == g.group_id && last.end == g.start {
                    last.end = g.end;
                    continue;
                }
            }
            merged.push(g);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PARAM_BC;

    #[test]
    fn single_worker_matches_sequential_scan() {
        let y: Vec<u32> = (0..5000u32).map(|i| (i * 37) % (PARAM_BC * 20)).collect();
        let mut sorted = y.clone();
        sorted.sort_unstable();
        let width = 20;
        let groups = scan_groups(&sorted, 0, width, 1);
        let total: usize = groups.iter().map(|g| g.len()).sum();
        assert_eq!(total, sorted.len());
        for w in groups.windows(2) {
            assert!(w[0].group_id < w[1].group_id);
            assert_eq!(w[0].end, w[1].start);
        }
    }

    #[test]
    fn parallel_matches_sequential() {
        let y: Vec<u32> = (0..20000u32).map(|i| (i * 97 + 3) % (PARAM_BC * 50)).collect();
        let mut sorted = y.clone();
        sorted.sort_unstable();
        let width = 24;
        let seq = scan_groups(&sorted, 2, width, 1);
        let par = scan_groups(&sorted, 2, width, 8);
        assert_eq!(seq, par);
    }
}
