//! Bucketed radix sort (spec.md §4.2): parallel LSB byte-wise radix sort of
//! `y` keys, lifting a companion `sortKey` array, followed by a metadata
//! permutation pass once the final ordering is known.
//!
//! The per-pass counting sort is a chunked parallel prefix-sum over
//! [`rayon`] worker ranges -- the same shape the Fx pipeline (`fx.rs`) uses
//! for its bucketize-and-write counting sort, grounded on the teacher's
//! `dedupe::build_runs_sorted` bounded-accumulation-then-flush loop.

use rayon::prelude::*;

use crate::entry::FlatMeta;

const RADIX_BITS: u32 = 8;
const RADIX_SIZE: usize = 1 << RADIX_BITS;
const RADIX_PASSES: u32 = 32 / RADIX_BITS;

/// Sorts `y` ascending, carrying `sort_key` along (`sort_key[i]` is always
/// the original pre-sort index of whatever now sits at `y[i]`). `max_jobs`
/// bounds the number of chunks the counting-sort pass is split into (renamed
/// from the original's `BB_MAX_JOBS`, same role).
///
/// The sort is not stable beyond what LSB radix already provides; matching
/// only depends on `y` order, and `sort_key` records true origin explicitly,
/// so stability beyond that is unneeded (spec.md §4.2).
pub fn sort_bucket(y: &mut [u32], sort_key: &mut [u32], max_jobs: usize) {
    debug_assert_eq!(y.len(), sort_key.len());
    let n = y.len();
    if n < 2 {
        return;
    }

    let mut y_buf = vec![0u32; n];
    let mut key_buf = vec![0u32; n];
    let jobs = max_jobs.max(1).min(n);

    let (mut src_y, mut dst_y) = (y, &mut y_buf[..]);
    let (mut src_key, mut dst_key) = (sort_key, &mut key_buf[..]);

    for pass in 0..RADIX_PASSES {
        let shift = pass * RADIX_BITS;
        radix_pass(src_y, src_key, dst_y, dst_key, shift, jobs);
        std::mem::swap(&mut src_y, &mut dst_y);
        std::mem::swap(&mut src_key, &mut dst_key);
    }

    // RADIX_PASSES is even, so after the loop `src_*` already points back at
    // the caller's original slices; nothing further to copy.
    debug_assert_eq!(RADIX_PASSES % 2, 0);
}

/// One LSB counting-sort pass on the byte at `shift`, split into `jobs`
/// roughly-equal chunks. Each chunk first buckets its own slice by digit
/// into buffers it owns (stage 1, parallel over chunks); merging each
/// digit's per-chunk pieces back together in chunk order is then
/// independent across digits, so it parallelizes over digits instead
/// (stage 2); the final concatenation into `dst_y`/`dst_key` has to run in
/// digit order, so it's the one sequential step (stage 3).
fn radix_pass(src_y: &[u32], src_key: &[u32], dst_y: &mut [u32], dst_key: &mut [u32], shift: u32, jobs: usize) {
    let n = src_y.len();
    let chunk_len = n.div_ceil(jobs);
    let chunks: Vec<(usize, usize)> = (0..jobs)
        .map(|j| (j * chunk_len, ((j + 1) * chunk_len).min(n)))
        .filter(|(s, e)| s < e)
        .collect();

    struct ChunkDigits {
        y: Vec<Vec<u32>>,
        key: Vec<Vec<u32>>,
    }

    let per_chunk: Vec<ChunkDigits> = chunks
        .par_iter()
        .map(|&(start, end)| {
            let mut y: Vec<Vec<u32>> = vec![Vec::new(); RADIX_SIZE];
            let mut key: Vec<Vec<u32>> = vec![Vec::new(); RADIX_SIZE];
            for i in start..end {
                let v = src_y[i];
                let digit = ((v >> shift) & (RADIX_SIZE as u32 - 1)) as usize;
                y[digit].push(v);
                key[digit].push(src_key[i]);
            }
            ChunkDigits { y, key }
        })
        .collect();

    let merged: Vec<(Vec<u32>, Vec<u32>)> = (0..RADIX_SIZE)
        .into_par_iter()
        .map(|d| {
            let mut y = Vec::new();
            let mut key = Vec::new();
            for chunk in &per_chunk {
                y.extend_from_slice(&chunk.y[d]);
                key.extend_from_slice(&chunk.key[d]);
            }
            (y, key)
        })
        .collect();

    let mut pos = 0usize;
    for (y_digit, key_digit) in merged {
        let len = y_digit.len();
        dst_y[pos..pos + len].copy_from_slice(&y_digit);
        dst_key[pos..pos + len].copy_from_slice(&key_digit);
        pos += len;
    }
}

/// Companion metadata permutation: `meta` is reordered so that
/// `meta.get(i)` after this call equals `meta.get(sort_key[i])` before it,
/// i.e. metadata now tracks the same permutation `y`/`sort_key` were just
/// sorted by. A separate pass from the key sort itself (spec.md §4.2:
/// `Sort<T>(key, in, out)`).
pub fn permute_metadata(meta: &FlatMeta, order: &[u32]) -> FlatMeta {
    meta.permuted_by(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_ascending_and_carries_sort_key() {
        let mut y = vec![5u32, 1, 4, 2, 3, 2, 1, 0];
        let mut key: Vec<u32> = (0..y.len() as u32).collect();
        let original = y.clone();
        sort_bucket(&mut y, &mut key, 4);
        let mut expected = original.clone();
        expected.sort_unstable();
        assert_eq!(y, expected);
        // sort_key must reproduce the sorted sequence when used to index
        // into the original array.
        for (i, &k) in key.iter().enumerate() {
            assert_eq!(original[k as usize], y[i]);
        }
    }

    #[test]
    fn sort_key_is_a_permutation() {
        let mut y: Vec<u32> = (0..2000u32).rev().collect();
        let mut key: Vec<u32> = (0..y.len() as u32).collect();
        sort_bucket(&mut y, &mut key, 7);
        let mut sorted_key = key.clone();
        sorted_key.sort_unstable();
        let expected: Vec<u32> = (0..y.len() as u32).collect();
        assert_eq!(sorted_key, expected);
    }

    #[test]
    fn empty_and_singleton_are_noops() {
        let mut y: Vec<u32> = vec![];
        let mut key: Vec<u32> = vec![];
        sort_bucket(&mut y, &mut key, 4);
        assert!(y.is_empty());

        let mut y = vec![42u32];
        let mut key = vec![0u32];
        sort_bucket(&mut y, &mut key, 4);
        assert_eq!(y, vec![42]);
        assert_eq!(key, vec![0]);
    }

    #[test]
    fn handles_single_job() {
        let mut y = vec![9u32, 3, 7, 1, 8, 2];
        let mut key: Vec<u32> = (0..y.len() as u32).collect();
        sort_bucket(&mut y, &mut key, 1);
        assert_eq!(y, vec![1, 2, 3, 7, 8, 9]);
    }

    proptest::proptest! {
        /// spec.md §8 invariant: sorting never loses or duplicates entries --
        /// `sort_key` is always a permutation of `0..n`, and re-applying it to
        /// the pre-sort array reproduces the sorted one, for arbitrary `y` and
        /// job counts, not just the fixed fixtures above.
        #[test]
        fn sort_key_is_always_a_permutation_of_its_input(
            original in proptest::collection::vec(proptest::prelude::any::<u32>(), 0..200),
            jobs in 1usize..9,
        ) {
            let mut y = original.clone();
            let mut key: Vec<u32> = (0..y.len() as u32).collect();
            sort_bucket(&mut y, &mut key, jobs);

            let mut expected = original.clone();
            expected.sort_unstable();
            proptest::prop_assert_eq!(&y, &expected);

            let mut sorted_key = key.clone();
            sorted_key.sort_unstable();
            let identity: Vec<u32> = (0..original.len() as u32).collect();
            proptest::prop_assert_eq!(sorted_key, identity);

            for (i, &k) in key.iter().enumerate() {
                proptest::prop_assert_eq!(original[k as usize], y[i]);
            }
        }
    }
}
