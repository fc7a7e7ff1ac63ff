//! Matching (spec.md §4.5): for each pair of consecutive groups, finds every
//! `(L, R)` entry pair whose `y` values satisfy the domain's matching
//! predicate.
//!
//! Grounded on `calculate_left_targets`/`find_matches`/`RmapItem` in the
//! chiapos reference file: a `[parity][r][0..PARAM_M)` lookup table of
//! target residues, and a small per-group-pair `rmap` keyed by residue
//! within `[0, PARAM_BC)` that turns the naive O(|L|·|R|) comparison into
//! O(|L|·PARAM_M + |R|).

use std::sync::OnceLock;

use crate::constants::{MAX_GROUP_ENTRIES, PARAM_B, PARAM_BC, PARAM_C, PARAM_M};
use crate::entry::{Group, Pair};
use crate::error::{PlotError, Result};

/// `left_targets[parity][r][m]` is the right-side residue a left entry with
/// local residue `r` (and the given group parity) can match against its
/// `m`-th candidate, `m ∈ [0, PARAM_M)`. Stored flat (`parity * PARAM_BC *
/// PARAM_M + r * PARAM_M + m`) to avoid a multi-megabyte nested-array type.
pub struct LeftTargets {
    data: Vec<u16>,
}

fn left_target(parity: u32, r: u32, m: u32) -> u32 {
    let c = r / PARAM_C;
    ((c + m) % PARAM_B) * PARAM_C + (((2 * m + parity) * (2 * m + parity) + r) % PARAM_C)
}

impl LeftTargets {
    #[inline]
    fn row(&self, parity: u32, r: u32) -> &[u16] {
        let base = (parity as usize * PARAM_BC as usize + r as usize) * PARAM_M;
        &self.data[base..base + PARAM_M]
    }
}

fn build_left_targets() -> LeftTargets {
    let mut data = vec![0u16; 2 * PARAM_BC as usize * PARAM_M];
    for parity in 0..2u32 {
        for r in 0..PARAM_BC {
            let base = (parity as usize * PARAM_BC as usize + r as usize) * PARAM_M;
            for m in 0..PARAM_M as u32 {
                data[base + m as usize] = left_target(parity, r, m) as u16;
            }
        }
    }
    LeftTargets { data }
}

static LEFT_TARGETS: OnceLock<LeftTargets> = OnceLock::new();

pub fn left_targets() -> &'static LeftTargets {
    LEFT_TARGETS.get_or_init(build_left_targets)
}

/// One slot of the right-group residue map: first matching local index
/// within the right group, plus how many consecutive entries share it
/// (entries with equal `y` occupy consecutive positions after sorting).
#[derive(Clone, Copy, Default)]
struct RmapSlot {
    start: u16,
    count: u16,
}

/// Matches consecutive groups `group_l`, `group_r` of a sorted `y` slice,
/// appending `Pair { l, r }` (both bucket-local, `l`/`r` as absolute
/// positions before delta-encoding) to `out`. Caller is responsible for
/// verifying `group_r.group_id == group_l.group_id + 1` first (stitching
/// and the plain per-bucket path both need to decide what "adjacent" means
/// for their own index spaces).
///
/// `index_offset_l`/`index_offset_r` are added to each group's *0-based*
/// position (not to `group.start`) before it is pushed: callers working
/// directly on a bucket's own arrays pass `group_l.start`/`group_r.start`
/// themselves (so the result is that bucket-local index), while
/// [`crate::stitch`] -- which hands `match_groups` a temporary buffer
/// concatenating two different buckets' groups -- passes each side's real
/// bucket-local group start instead, since the temp buffer's own internal
/// offsets carry no meaning for the caller.
pub fn match_groups(
    full_y: &[u64],
    group_l: Group,
    group_r: Group,
    index_offset_l: u32,
    index_offset_r: u32,
    max_pairs: usize,
    out: &mut Vec<(u32, u32)>,
) -> Result<()> {
    let r_len = group_r.len();
    if r_len == 0 || group_l.len() == 0 {
        return Ok(());
    }
    if r_len > MAX_GROUP_ENTRIES || group_l.len() > MAX_GROUP_ENTRIES {
        return Err(PlotError::BucketOverfull {
            bucket: 0,
            count: r_len.max(group_l.len()) as u64,
            capacity: MAX_GROUP_ENTRIES as u64,
        });
    }

    let right_base = group_r.group_id * PARAM_BC as u64;
    let left_base = right_base - PARAM_BC as u64;
    let parity = ((left_base / PARAM_BC as u64) % 2) as u32;

    let mut rmap = [RmapSlot::default(); PARAM_BC as usize];
    for (j, &yr) in full_y[group_r.start..group_r.end].iter().enumerate() {
        let resid = (yr - right_base) as usize;
        let slot = &mut rmap[resid];
        if slot.count == 0 {
            slot.start = j as u16;
        }
        slot.count += 1;
    }

    let targets = left_targets();
    for (i, &yl) in full_y[group_l.start..group_l.end].iter().enumerate() {
        let resid_l = (yl - left_base) as u32;
        let row = targets.row(parity, resid_l);
        for &t in row.iter() {
            let slot = rmap[t as usize];
            if slot.count == 0 {
                continue;
            }
            for j in slot.start..slot.start + slot.count {
                if out.len() >= max_pairs {
                    return Ok(());
                }
                out.push((index_offset_l + i as u32, index_offset_r + j as u32));
            }
        }
    }
    Ok(())
}

/// Runs [`match_groups`] over every adjacent pair of groups in `groups`,
/// skipping non-adjacent pairs (spec.md invariant 2: `groupOf(l)+1 ==
/// groupOf(r)`).
pub fn match_all_adjacent(full_y: &[u64], groups: &[Group], max_pairs: usize) -> Result<Vec<Pair>> {
    let mut raw: Vec<(u32, u32)> = Vec::new();
    for w in groups.windows(2) {
        let (gl, gr) = (w[0], w[1]);
        if gr.group_id != gl.group_id + 1 {
            continue;
        }
        match_groups(full_y, gl, gr, gl.start as u32, gr.start as u32, max_pairs, &mut raw)?;
    }
    raw.into_iter()
        .map(|(l, r)| {
            let delta = r as u64 - l as u64;
            if delta == 0 || delta > 0xFFFF {
                return Err(PlotError::PairDeltaOverflow { l, r, delta });
            }
            Ok(Pair { l, r: delta as u16 })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_targets_are_within_bc_range() {
        let t = left_targets();
        for parity in 0..2u32 {
            for r in 0..10u32 {
                for &v in t.row(parity, r) {
                    assert!((v as u32) < PARAM_BC);
                }
            }
        }
    }

    #[test]
    fn matching_two_synthetic_groups_is_deterministic() {
        // Build a left group and a right group whose first residue is a
        // guaranteed match for parity 0, residue 0, m = 0 target.
        let left_base = 0u64;
        let right_base = PARAM_BC as u64;
        let target_r = left_target(0, 0, 0) as u64;
        let full_y = vec![left_base, right_base + target_r];
        let gl = Group { start: 0, end: 1, group_id: 0 };
        let gr = Group { start: 1, end: 2, group_id: 1 };
        let mut out = Vec::new();
        match_groups(&full_y, gl, gr, gl.start as u32, gr.start as u32, 10_000, &mut out).unwrap();
        assert_eq!(out, vec![(0u32, 1u32)]);
    }

    #[test]
    fn empty_groups_produce_no_pairs() {
        let full_y: Vec<u64> = vec![];
        let gl = Group { start: 0, end: 0, group_id: 0 };
        let gr = Group { start: 0, end: 0, group_id: 1 };
        let mut out = Vec::new();
        match_groups(&full_y, gl, gr, 0, 0, 10, &mut out).unwrap();
        assert!(out.is_empty());
    }
}
