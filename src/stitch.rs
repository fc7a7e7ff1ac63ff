//! Cross-bucket stitching (spec.md §4.6): carries the last two groups of
//! bucket `b-1` forward so they can be matched against the first two groups
//! of bucket `b`, the way group boundaries that straddle a bucket split
//! would be matched if the two buckets were one contiguous array.
//!
//! Grounded on the teacher's old `stitch.rs` for the general shape of
//! "carry state across a shard boundary and reassemble before emitting the
//! final ordered stream" -- rebuilt here with matching semantics instead of
//! file concatenation: the previous bucket's tail groups are concatenated
//! with the current bucket's head groups in a small scratch buffer and
//! handed to [`crate::matching::match_groups`] directly.

use crate::constants::{full_y, PARAM_BC};
use crate::entry::{CrossBucketCarry, FlatMeta, Group};
use crate::error::Result;
use crate::matching::match_groups;

/// Builds the carry to hand to the *next* bucket: the last two groups (or
/// fewer, if the bucket has fewer than two) of `y`/`meta_a`/`meta_b`.
pub fn build_carry(y: &[u32], meta_a: &FlatMeta, meta_b: &FlatMeta, groups: &[Group], bucket_idx: usize) -> CrossBucketCarry {
    let tail: Vec<&Group> = groups.iter().rev().take(2).collect();
    if tail.is_empty() {
        return CrossBucketCarry::default();
    }
    let (first, last) = (*tail.last().unwrap(), *tail.first().unwrap());
    let start = first.start;
    let end = last.end;

    let mut out = CrossBucketCarry {
        y: y[start..end].to_vec(),
        meta_a: slice_meta(meta_a, start, end),
        meta_b: slice_meta(meta_b, start, end),
        group_offsets: [0; 2],
        group_counts: [0; 2],
        base_index: start,
        prev_bucket_idx: bucket_idx,
    };
    if tail.len() == 2 {
        out.group_offsets = [first.start - start, last.start - start];
        out.group_counts = [first.len(), last.len()];
    } else {
        out.group_offsets = [0, first.start - start];
        out.group_counts = [0, first.len()];
    }
    out
}

fn slice_meta(meta: &FlatMeta, start: usize, end: usize) -> FlatMeta {
    if meta.stride == 0 {
        return FlatMeta { stride: 0, bytes: Vec::new() };
    }
    FlatMeta { stride: meta.stride, bytes: meta.bytes[start * meta.stride..end * meta.stride].to_vec() }
}

/// One stitched match, with each side still in its *own* bucket's local
/// numbering: `l_local` is bucket `b-1`'s own index, `r_local` is bucket
/// `b`'s own index. The two sides don't share a base (and `r_local` is
/// typically much *smaller* than `l_local`, since the carry holds `b-1`'s
/// tail and the match lands near `b`'s head), so unlike [`Pair`] this is
/// deliberately not delta-encoded yet -- the caller combines each side with
/// its own bucket's global base (spec.md §4.6: "left indices are offset by
/// the previous bucket's group offset, right indices by the first-group
/// size of the current bucket") and only then recomputes a real `Pair`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StitchedPair {
    pub l_local: u32,
    pub r_local: u32,
}

/// Result of stitching bucket `b-1`'s carry against bucket `b`'s head.
pub struct StitchResult {
    pub pairs: Vec<StitchedPair>,
}

/// Attempts the two boundary matches between `carry` (bucket `b-1`'s tail)
/// and bucket `b`'s first two groups, in order: penultimate-vs-first, then
/// last-vs-second. Indices in the returned pairs are bucket-local to
/// bucket `b-1` (left) and bucket `b` (right) respectively, ready for the
/// caller to combine with its own index bases when writing back-pointers.
pub fn stitch(carry: &CrossBucketCarry, cur_y: &[u32], cur_groups: &[Group], cur_bucket_idx: usize, width: u32, max_pairs: usize) -> Result<StitchResult> {
    let mut pairs = Vec::new();
    if carry.is_empty() || cur_groups.is_empty() {
        return Ok(StitchResult { pairs });
    }

    let carry_groups = carry_as_groups(carry);

    // (i) penultimate group of b-1 vs first group of b.
    if carry_groups.len() == 2 && !cur_groups.is_empty() {
        try_stitch_pair(&carry_groups[0], &cur_groups[0], carry, cur_y, cur_bucket_idx, width, max_pairs, &mut pairs)?;
    }
    // (ii) last group of b-1 vs second group of b.
    if !carry_groups.is_empty() && cur_groups.len() >= 2 {
        let last = carry_groups.last().unwrap();
        try_stitch_pair(last, &cur_groups[1], carry, cur_y, cur_bucket_idx, width, max_pairs, &mut pairs)?;
    }

    Ok(StitchResult { pairs })
}

fn carry_as_groups(carry: &CrossBucketCarry) -> Vec<Group> {
    let mut out = Vec::with_capacity(2);
    for i in 0..2 {
        if carry.group_counts[i] == 0 {
            continue;
        }
        let start = carry.group_offsets[i];
        let end = start + carry.group_counts[i];
        // group_id is recomputed below via full_y once concatenated; a
        // placeholder here is fine since `try_stitch_pair` derives its own.
        out.push(Group { start, end, group_id: 0 });
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn try_stitch_pair(
    carry_group: &Group,
    cur_group: &Group,
    carry: &CrossBucketCarry,
    cur_y: &[u32],
    cur_bucket_idx: usize,
    width: u32,
    max_pairs: usize,
    pairs: &mut Vec<StitchedPair>,
) -> Result<()> {
    let l_full: Vec<u64> = carry.y[carry_group.start..carry_group.end]
        .iter()
        .map(|&y| full_y(carry.prev_bucket_idx, y, width))
        .collect();
    let r_full: Vec<u64> = cur_y[cur_group.start..cur_group.end].iter().map(|&y| full_y(cur_bucket_idx, y, width)).collect();

    let l_gid = l_full[0] / PARAM_BC as u64;
    let r_gid = r_full[0] / PARAM_BC as u64;
    if r_gid != l_gid + 1 {
        return Ok(());
    }

    let mut combined = l_full;
    let l_len = combined.len();
    combined.extend(r_full);

    let gl = Group { start: 0, end: l_len, group_id: l_gid };
    let gr = Group { start: l_len, end: combined.len(), group_id: r_gid };

    // Left indices are bucket-local to the carry's *previous* bucket
    // (`base_index` translates from the carry's own local numbering back
    // to that bucket's global index space); right indices are bucket-local
    // to the current bucket, offset to `cur_group.start`. The two sides
    // have no shared base -- `r_local` is routinely *smaller* than
    // `l_local` since it restarts near 0 in the next bucket, so they are
    // kept apart rather than delta-encoded into a `Pair` here (that would
    // underflow). The caller combines each with its own bucket's global
    // base and computes the real delta once both are known.
    let mut raw = Vec::new();
    let index_offset_l = (carry.base_index + carry_group.start) as u32;
    match_groups(&combined, gl, gr, index_offset_l, cur_group.start as u32, max_pairs, &mut raw)?;
    for (l, r) in raw {
        pairs.push(StitchedPair { l_local: l, r_local: r });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{PARAM_B, PARAM_C};

    /// Same `(B, C)` target-residue formula as `matching::left_target`,
    /// duplicated here so this test can construct a guaranteed boundary
    /// match without reaching into that module's private helpers.
    fn left_target(parity: u32, r: u32, m: u32) -> u32 {
        let c = r / PARAM_C;
        ((c + m) % PARAM_B) * PARAM_C + (((2 * m + parity) * (2 * m + parity) + r) % PARAM_C)
    }

    fn flat_u32(vals: &[u32]) -> FlatMeta {
        FlatMeta { stride: 4, bytes: vals.iter().flat_map(|v| v.to_le_bytes()).collect() }
    }

    #[test]
    fn empty_carry_produces_no_pairs() {
        let carry = CrossBucketCarry::default();
        let groups = vec![Group { start: 0, end: 4, group_id: 3 }];
        let result = stitch(&carry, &[1, 2, 3, 4], &groups, 1, 20, 1000).unwrap();
        assert!(result.pairs.is_empty());
    }

    #[test]
    fn build_carry_takes_last_two_groups_and_preserves_base_index() {
        let y = vec![10u32, 11, 20, 21, 22, 30];
        let meta_a = flat_u32(&[1, 2, 3, 4, 5, 6]);
        let meta_b = FlatMeta::default();
        let groups = vec![
            Group { start: 0, end: 2, group_id: 100 },
            Group { start: 2, end: 5, group_id: 101 },
            Group { start: 5, end: 6, group_id: 102 },
        ];
        let carry = build_carry(&y, &meta_a, &meta_b, &groups, 7);
        assert_eq!(carry.base_index, 2);
        assert_eq!(carry.y, vec![20, 21, 22, 30]);
        assert_eq!(carry.prev_bucket_idx, 7);
        assert_eq!(carry.group_counts, [3, 1]);
    }

    #[test]
    fn build_carry_with_single_group_only_fills_the_last_slot() {
        let y = vec![10u32, 11, 12];
        let meta_a = FlatMeta::default();
        let meta_b = FlatMeta::default();
        let groups = vec![Group { start: 0, end: 3, group_id: 5 }];
        let carry = build_carry(&y, &meta_a, &meta_b, &groups, 0);
        assert_eq!(carry.group_counts, [0, 3]);
        assert_eq!(carry.y, vec![10, 11, 12]);
    }

    #[test]
    fn stitch_finds_a_boundary_match_across_the_carry() {
        // Branch (i): penultimate group of b-1 vs first group of b. Carry
        // holds two one-entry groups (group id 0 is the penultimate one);
        // the current bucket's first group (id 1) is built to guarantee a
        // match against it.
        let target_r = left_target(0, 0, 0) as u64;
        let carry_y = vec![0u32, 999u32]; // only y[0] (group id 0) participates in branch (i)
        let cur_y = vec![(PARAM_BC as u64 + target_r) as u32];
        let meta_a = flat_u32(&[42, 43]);
        let meta_b = FlatMeta::default();

        let carry = CrossBucketCarry {
            y: carry_y,
            meta_a,
            meta_b,
            group_offsets: [0, 1],
            group_counts: [1, 1],
            base_index: 0,
            prev_bucket_idx: 0,
        };

        let cur_groups = vec![Group { start: 0, end: 1, group_id: 1 }];
        let result = stitch(&carry, &cur_y, &cur_groups, 0, 32, 1000).unwrap();
        assert_eq!(result.pairs.len(), 1);
        // Both indices are bucket-local (to b-1 and b respectively), per
        // spec.md §4.6; with base_index 0 and the matched group at the
        // very start of each bucket, both land at position 0.
        assert_eq!(result.pairs[0].l_local, 0);
        assert_eq!(result.pairs[0].r_local, 0);
    }

    #[test]
    fn stitched_pair_keeps_sides_in_their_own_local_space_without_underflow() {
        // Mirrors the typical real-world shape: the carry's match sits near
        // the tail of bucket b-1 (large l_local) while the current bucket's
        // match sits near its head (small r_local). A delta-encoded Pair
        // couldn't represent this without underflowing, so StitchedPair
        // must keep both sides as plain, independent local positions.
        let target_r = left_target(0, 0, 0) as u64;
        // y = 0 everywhere; only its local *position* changes between this
        // test and `stitch_finds_a_boundary_match_across_the_carry` above.
        let carry_y = vec![0u32; 1000];
        let cur_y = vec![(PARAM_BC as u64 + target_r) as u32];
        let meta_a = flat_u32(&vec![0u32; 1000]);
        let meta_b = FlatMeta::default();

        let carry = CrossBucketCarry {
            y: carry_y,
            meta_a,
            meta_b,
            group_offsets: [998, 999],
            group_counts: [1, 1],
            base_index: 0,
            prev_bucket_idx: 0,
        };
        let cur_groups = vec![Group { start: 0, end: 1, group_id: 1 }];
        let result = stitch(&carry, &cur_y, &cur_groups, 0, 32, 1000).unwrap();
        assert_eq!(result.pairs.len(), 1);
        assert_eq!(result.pairs[0].l_local, 998);
        assert_eq!(result.pairs[0].r_local, 0);
        assert!(result.pairs[0].r_local < result.pairs[0].l_local);
    }
}
