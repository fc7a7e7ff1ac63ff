//! Fx pipeline (spec.md §4.7): the BLAKE3-based compression function that
//! derives `T_{t+1}`'s `(y', metaA', metaB')` from a matched pair in `T_t`,
//! plus the chunked bucketize-and-write counting sort of its output.
//!
//! Grounded on `compute_fn` in the chiapos reference file for the general
//! shape -- concatenate `y` and both sides' metadata into one buffer, hash
//! it, derive `y'` from the hash's leading bits and `metaA'/metaB'` from the
//! bytes after -- adapted from that file's arbitrary-bit-offset packing (it
//! supports metadata widths down to single bits) to this crate's
//! byte-aligned per-table widths (§"Per-table metadata sizes" in
//! SPEC_FULL.md), which only ever need whole-byte concatenation.
//!
//! The output bucketizer mirrors the teacher's `dedupe::build_runs_sorted`
//! bounded-accumulate-then-flush shape, generalized to a fixed
//! `entries_per_chunk` (direct I/O wants a hard heap bound here, not a soft
//! memory fraction) and parallelized the same way `radix_sort`'s counting
//! pass is: per-thread local histograms, a sequential prefix sum, then a
//! parallel scatter.

use rayon::prelude::*;

use crate::constants::{table_out_shape, BUCKET_BITS, PARAM_EXT};

/// Computes `(y', metaA', metaB')` for one matched pair. `full_yl` is the
/// left entry's [`crate::constants::full_y`] value; `k` is the plot's size
/// parameter (used only to size `y'` to `k + PARAM_EXT` bits, same as F1).
pub fn compute_fx(table: u8, full_yl: u64, meta_a_l: &[u8], meta_b_l: &[u8], meta_a_r: &[u8], meta_b_r: &[u8], k: u32) -> (u32, Vec<u8>, Vec<u8>) {
    let width = k + PARAM_EXT;
    // The full 64-bit bucket-prefixed `Y` (not just the on-disk `y`) feeds
    // the hash, so two entries with identical local `y` but different
    // owning buckets still produce distinct `y'`/`metaA'`/`metaB'`.
    let y_be = full_yl.to_be_bytes();

    let mut input = Vec::with_capacity(8 + meta_a_l.len() + meta_b_l.len() + meta_a_r.len() + meta_b_r.len());
    input.extend_from_slice(&y_be);
    input.extend_from_slice(meta_a_l);
    input.extend_from_slice(meta_b_l);
    input.extend_from_slice(meta_a_r);
    input.extend_from_slice(meta_b_r);

    let hash = blake3::hash(&input);
    let hash = hash.as_bytes();

    let y_prime_raw = u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]]);
    let y_prime = y_prime_raw >> (32 - width);

    let out_shape = table_out_shape(table);
    let mut offset = 4usize;
    let meta_a_out = hash[offset..offset + out_shape.meta_a_bytes].to_vec();
    offset += out_shape.meta_a_bytes;
    let meta_b_out = hash[offset..offset + out_shape.meta_b_bytes].to_vec();

    (y_prime, meta_a_out, meta_b_out)
}

/// `bucketIdx(y') = y' >> (width - log2(BucketCount))`.
#[inline]
pub fn bucket_of(y_prime: u32, k: u32) -> usize {
    let width = k + PARAM_EXT;
    (y_prime >> (width - BUCKET_BITS)) as usize
}

/// One Fx output entry, pre-bucketization. `source_index` is the left
/// entry's position in *this table's own* global sorted order (spec.md
/// §4.8's `lookupIdx`), carried forward so the next table can persist it as
/// its own `SortKey_t` file.
#[derive(Clone)]
pub struct FxOut {
    pub y: u32,
    pub meta_a: Vec<u8>,
    pub meta_b: Vec<u8>,
    pub source_index: u32,
    pub bucket: usize,
}

/// The four parallel per-bucket byte streams a bucketized Fx chunk produces,
/// matching the persisted layout's separate `Y_t`/`MetaA_t`/`MetaB_t`/
/// `SortKey_t` files (spec.md §6 / SPEC_FULL.md §13) -- entry `i` of
/// `y[b]`/`meta_a[b]`/`meta_b[b]`/`source_index[b]` all describe the same
/// logical entry.
pub struct BucketizedFx {
    pub y: Vec<Vec<u8>>,
    pub meta_a: Vec<Vec<u8>>,
    pub meta_b: Vec<Vec<u8>>,
    pub source_index: Vec<Vec<u8>>,
}

/// Counting-sorts `entries` into [`crate::constants::BUCKET_COUNT`] groups
/// by `bucket`, using a parallel prefix sum (spec.md §4.7: "each thread
/// computes local counts, a barrier forms the global prefix, each thread
/// subtracts its own counts to get its write offset"). The same entry
/// position within a bucket is used across all four output streams, so they
/// stay aligned without needing to interleave them on disk.
pub fn bucketize_chunk(entries: &[FxOut], jobs: usize) -> BucketizedFx {
    use crate::constants::BUCKET_COUNT;

    if entries.is_empty() {
        return BucketizedFx {
            y: vec![Vec::new(); BUCKET_COUNT],
            meta_a: vec![Vec::new(); BUCKET_COUNT],
            meta_b: vec![Vec::new(); BUCKET_COUNT],
            source_index: vec![Vec::new(); BUCKET_COUNT],
        };
    }
    let n = entries.len();
    let jobs = jobs.max(1).min(n);
    let chunk_len = n.div_ceil(jobs);
    let ranges: Vec<(usize, usize)> =
        (0..jobs).map(|j| (j * chunk_len, ((j + 1) * chunk_len).min(n))).filter(|(s, e)| s < e).collect();

    // Stage 1: each chunk scans its own disjoint slice of `entries` and
    // routes them into buffers it allocates itself -- no thread ever
    // touches another thread's memory, so this needs no raw pointers.
    struct ChunkBuckets {
        y: Vec<Vec<u8>>,
        meta_a: Vec<Vec<u8>>,
        meta_b: Vec<Vec<u8>>,
        source_index: Vec<Vec<u8>>,
    }

    let per_chunk: Vec<ChunkBuckets> = ranges
        .par_iter()
        .map(|&(start, end)| {
            let mut y = vec![Vec::new(); BUCKET_COUNT];
            let mut meta_a = vec![Vec::new(); BUCKET_COUNT];
            let mut meta_b = vec![Vec::new(); BUCKET_COUNT];
            let mut source_index = vec![Vec::new(); BUCKET_COUNT];
            for e in &entries[start..end] {
                let b = e.bucket;
                y[b].extend_from_slice(&e.y.to_le_bytes());
                meta_a[b].extend_from_slice(&e.meta_a);
                meta_b[b].extend_from_slice(&e.meta_b);
                source_index[b].extend_from_slice(&e.source_index.to_le_bytes());
            }
            ChunkBuckets { y, meta_a, meta_b, source_index }
        })
        .collect();

    // Stage 2: stitching each bucket's per-chunk pieces back together in
    // chunk order is itself independent across buckets, so it parallelizes
    // over buckets instead of chunks.
    let merged: Vec<(Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>)> = (0..BUCKET_COUNT)
        .into_par_iter()
        .map(|b| {
            let mut y = Vec::new();
            let mut meta_a = Vec::new();
            let mut meta_b = Vec::new();
            let mut source_index = Vec::new();
            for chunk in &per_chunk {
                y.extend_from_slice(&chunk.y[b]);
                meta_a.extend_from_slice(&chunk.meta_a[b]);
                meta_b.extend_from_slice(&chunk.meta_b[b]);
                source_index.extend_from_slice(&chunk.source_index[b]);
            }
            (y, meta_a, meta_b, source_index)
        })
        .collect();

    let mut y_out = Vec::with_capacity(BUCKET_COUNT);
    let mut meta_a_out = Vec::with_capacity(BUCKET_COUNT);
    let mut meta_b_out = Vec::with_capacity(BUCKET_COUNT);
    let mut src_out = Vec::with_capacity(BUCKET_COUNT);
    for (y, a, b, s) in merged {
        y_out.push(y);
        meta_a_out.push(a);
        meta_b_out.push(b);
        src_out.push(s);
    }

    BucketizedFx { y: y_out, meta_a: meta_a_out, meta_b: meta_b_out, source_index: src_out }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_fx_is_deterministic() {
        let a = compute_fx(2, 12345, &[1, 2, 3, 4], &[], &[5, 6, 7, 8], &[], 18);
        let b = compute_fx(2, 12345, &[1, 2, 3, 4], &[], &[5, 6, 7, 8], &[], 18);
        assert_eq!(a.0, b.0);
        assert_eq!(a.1, b.1);
        assert_eq!(a.2, b.2);
    }

    #[test]
    fn compute_fx_output_shapes_match_table() {
        let (_, meta_a, meta_b) = compute_fx(3, 99, &[1, 2, 3, 4], &[1, 2, 3, 4], &[5, 6, 7, 8], &[5, 6, 7, 8], 20);
        let shape = table_out_shape(3);
        assert_eq!(meta_a.len(), shape.meta_a_bytes);
        assert_eq!(meta_b.len(), shape.meta_b_bytes);
    }

    #[test]
    fn y_prime_fits_in_width() {
        let k = 20;
        let (y_prime, _, _) = compute_fx(1, 42, &[9, 9, 9, 9], &[], &[1, 1, 1, 1], &[], k);
        assert!(y_prime < (1u32 << (k + PARAM_EXT)));
    }

    #[test]
    fn bucketize_chunk_preserves_all_entries_and_routes_correctly() {
        let entries: Vec<FxOut> = (0..500u32)
            .map(|i| FxOut {
                y: i,
                meta_a: vec![(i % 256) as u8; 4],
                meta_b: vec![],
                source_index: i,
                bucket: (i as usize) % crate::constants::BUCKET_COUNT,
            })
            .collect();
        let out = bucketize_chunk(&entries, 4);
        let mut total = 0;
        for b in 0..crate::constants::BUCKET_COUNT {
            let y_bytes = &out.y[b];
            let meta_a_bytes = &out.meta_a[b];
            let src_bytes = &out.source_index[b];
            assert_eq!(y_bytes.len() % 4, 0);
            assert_eq!(meta_a_bytes.len(), y_bytes.len());
            assert_eq!(src_bytes.len(), y_bytes.len());
            let count = y_bytes.len() / 4;
            total += count;
            for i in 0..count {
                let y = u32::from_le_bytes(y_bytes[i * 4..i * 4 + 4].try_into().unwrap());
                let src = u32::from_le_bytes(src_bytes[i * 4..i * 4 + 4].try_into().unwrap());
                assert_eq!((y as usize) % crate::constants::BUCKET_COUNT, b);
                assert_eq!(src, y);
            }
        }
        assert_eq!(total, entries.len());
    }
}
