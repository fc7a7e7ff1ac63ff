//! Domain constants for the matching algorithm and on-disk layout.
//!
//! `PARAM_EXT`/`PARAM_B`/`PARAM_C`/`PARAM_BC`/`PARAM_M` are the classic
//! proof-of-space matching constants (see DESIGN.md for where they're
//! grounded): they are independent of `k` and fixed at compile time.

/// Number of extra bits folded into `y` beyond the raw `k`-bit domain.
pub const PARAM_EXT: u32 = 6;

/// `B` parameter of the `(B, C)` matching lattice.
pub const PARAM_B: u32 = 119;

/// `C` parameter of the `(B, C)` matching lattice.
pub const PARAM_C: u32 = 127;

/// Group modulus: a group is a maximal run of entries sharing `Y / PARAM_BC`.
pub const PARAM_BC: u32 = PARAM_B * PARAM_C;

/// Number of precomputed match targets per left entry (`1 << PARAM_EXT`).
pub const PARAM_M: usize = 1 << PARAM_EXT;

/// Number of on-disk slices per table.
pub const BUCKET_COUNT: usize = 64;

/// `log2(BUCKET_COUNT)`, used to shift `y` down to a bucket index.
pub const BUCKET_BITS: u32 = BUCKET_COUNT.trailing_zeros();

/// Largest number of entries we ever expect inside a single kBC group.
/// `rMapCounts`/`rMapIndices` in the matching step are sized to this; a
/// group that overflows it is an invariant violation (fatal, see error.rs).
pub const MAX_GROUP_ENTRIES: usize = 350;

/// Device block size assumed for direct-I/O alignment.
pub const BLOCK_SIZE: usize = 4096;

/// First table index.
pub const FIRST_TABLE: u8 = 1;

/// Last table index produced by Phase 1.
pub const LAST_TABLE: u8 = 7;

/// Upper bound on `k` this crate supports (keeps `y` plus `PARAM_EXT` within
/// 32 bits and all position/metadata arithmetic inside `u32`/`u64`).
pub const MAX_K: u32 = 32;

/// Reconstructs the full, globally-ordered `Y` value for an entry: its
/// bucket id folded in above the entry's own `width`-bit `y`, so that
/// grouping and matching (which operate on `Y / PARAM_BC`) see a single
/// consistent domain whether two entries come from the same bucket or, for
/// cross-bucket stitching, adjacent ones.
#[inline]
pub fn full_y(bucket_idx: usize, y: u32, width: u32) -> u64 {
    ((bucket_idx as u64) << width) | y as u64
}

/// Total entry count for a given `k`: `2^k`.
#[inline]
pub fn entry_count_for_k(k: u32) -> u64 {
    1u64 << k
}

/// Safe upper bound on entries landing in any single bucket, with headroom
/// for distributional skew of the pseudo-random `y` values.
///
/// Entries are bucketed uniformly at random across `BUCKET_COUNT` buckets;
/// the expected occupancy is `entry_count / BUCKET_COUNT`. We size for
/// ~3% headroom above that, which is generous for the binomial tail at any
/// `k` this crate supports.
#[inline]
pub fn bucket_max_entries(k: u32) -> u64 {
    let mean = entry_count_for_k(k) / BUCKET_COUNT as u64;
    mean + mean / 32 + 1024
}

/// Per-table metadata width, in bytes, carried as input (`metaA`/`metaB` of
/// the parent table) and produced as output (`metaA'`/`metaB'` for the next
/// table). Resolved per SPEC_FULL.md's "Per-table metadata sizes" table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetaShape {
    pub meta_a_bytes: usize,
    pub meta_b_bytes: usize,
}

impl MetaShape {
    #[inline]
    pub const fn new(meta_a_bytes: usize, meta_b_bytes: usize) -> Self {
        Self { meta_a_bytes, meta_b_bytes }
    }

    #[inline]
    pub const fn total_bytes(&self) -> usize {
        self.meta_a_bytes + self.meta_b_bytes
    }
}

/// `out_shape(t)` is the metadata shape table `t` writes to disk (and the
/// shape table `t+1` reads as its input). Table 7's output carries no
/// metadata forward since there is no table 8.
#[inline]
pub fn table_out_shape(table: u8) -> MetaShape {
    match table {
        1 => MetaShape::new(4, 0),
        2 => MetaShape::new(4, 4),
        3 => MetaShape::new(8, 8),
        4 => MetaShape::new(8, 8),
        5 => MetaShape::new(8, 4),
        6 => MetaShape::new(4, 4),
        7 => MetaShape::new(0, 0),
        _ => unreachable!("table index out of range: {table}"),
    }
}

/// The metadata shape table `t` consumes as input (its parent's output).
#[inline]
pub fn table_in_shape(table: u8) -> MetaShape {
    assert!(table >= 2, "table 1 has no parent metadata");
    table_out_shape(table - 1)
}
