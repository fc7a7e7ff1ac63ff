//! Core data model: entries, pairs, groups, and the small structs carried
//! across bucket/table boundaries (spec.md §3 "Entities").

use crate::constants::MetaShape;

/// A flat, stride-addressed byte buffer used for per-entry metadata
/// (`metaA`/`metaB`). Avoids a `Vec<Vec<u8>>` per entry; each entry's
/// metadata lives in a fixed-width slice `[i*stride, (i+1)*stride)`.
#[derive(Clone, Debug, Default)]
pub struct FlatMeta {
    pub stride: usize,
    pub bytes: Vec<u8>,
}

impl FlatMeta {
    pub fn with_capacity(stride: usize, entries: usize) -> Self {
        Self { stride, bytes: Vec::with_capacity(stride * entries) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        if self.stride == 0 { 0 } else { self.bytes.len() / self.stride }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, i: usize) -> &[u8] {
        if self.stride == 0 {
            return &[];
        }
        &self.bytes[i * self.stride..(i + 1) * self.stride]
    }

    pub fn push(&mut self, value: &[u8]) {
        debug_assert_eq!(value.len(), self.stride);
        self.bytes.extend_from_slice(value);
    }

    /// Build a new `FlatMeta` permuted by `order`: `order[i]` is the source
    /// index to place at destination `i` (used after the radix sort's
    /// companion-key pass computes the permutation).
    pub fn permuted_by(&self, order: &[u32]) -> Self {
        if self.stride == 0 {
            return Self { stride: 0, bytes: Vec::new() };
        }
        let mut bytes = vec![0u8; order.len() * self.stride];
        for (dst, &src) in order.iter().enumerate() {
            let s = self.get(src as usize);
            bytes[dst * self.stride..(dst + 1) * self.stride].copy_from_slice(s);
        }
        Self { stride: self.stride, bytes }
    }
}

/// All entries of one bucket of one table, in whatever order they were
/// last written/read (sorted only after `radix_sort::sort_bucket` runs).
#[derive(Clone, Debug, Default)]
pub struct Bucket {
    pub y: Vec<u32>,
    pub meta_a: FlatMeta,
    pub meta_b: FlatMeta,
    /// Table 1 only: the raw `x` values (entry's position in `[0, 2^k)`).
    pub x: Vec<u32>,
    /// Table >1 only: this bucket's entries' positions in `T_{t-1}`'s
    /// *sorted* output (i.e. the `lookupIdx`/reverse-map source index).
    pub source_index: Vec<u32>,
}

impl Bucket {
    pub fn new(shape: MetaShape) -> Self {
        Self {
            y: Vec::new(),
            meta_a: FlatMeta { stride: shape.meta_a_bytes, bytes: Vec::new() },
            meta_b: FlatMeta { stride: shape.meta_b_bytes, bytes: Vec::new() },
            x: Vec::new(),
            source_index: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.y.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// A matched pair local to a bucket: `l` is the left entry's position in
/// its (sorted) bucket; `r` is `right_index - left_index`, always `<= 0xFFFF`
/// (spec.md §3 invariant 3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pair {
    pub l: u32,
    pub r: u16,
}

impl Pair {
    #[inline]
    pub fn right_index(&self) -> u32 {
        self.l + self.r as u32
    }
}

/// A contiguous run `[start, end)` of sorted entries sharing `Y / PARAM_BC`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Group {
    pub start: usize,
    pub end: usize,
    pub group_id: u64,
}

impl Group {
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }
}

/// Last two groups of a bucket, retained so the *next* bucket can stitch
/// groups spanning the boundary (spec.md §3 "CrossBucketCarry").
#[derive(Clone, Debug, Default)]
pub struct CrossBucketCarry {
    pub y: Vec<u32>,
    pub meta_a: FlatMeta,
    pub meta_b: FlatMeta,
    /// Offsets of the start of each of the two carried groups *within
    /// `y`/`meta_a`/`meta_b` above*, and their lengths, oldest group first.
    pub group_offsets: [usize; 2],
    pub group_counts: [usize; 2],
    /// The index, within the previous bucket's full array, that `y[0]`
    /// (the first entry carried here) occupied -- lets the stitcher
    /// translate a position local to this carry back into the previous
    /// bucket's own global index space.
    pub base_index: usize,
    /// The bucket index the carried entries came from -- needed to
    /// reconstruct their [`crate::constants::full_y`] value, since that
    /// folds in the *owning* bucket, which by the time of the next bucket's
    /// stitch is no longer the "current" bucket.
    pub prev_bucket_idx: usize,
}

impl CrossBucketCarry {
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// Per-table aggregate counters persisted alongside the raw tables
/// (spec.md §3 "Counts", §6 "Persisted sidecar").
#[derive(Clone, Debug, Default)]
pub struct TableCounts {
    pub bucket_counts: Vec<[u64; crate::constants::BUCKET_COUNT]>,
    pub entry_counts: Vec<u64>,
    pub ptr_table_bucket_counts: Vec<[u64; crate::constants::BUCKET_COUNT]>,
}

impl TableCounts {
    /// Plain little-endian serialization (SPEC_FULL.md §13: "serialized with
    /// serde/bincode-free plain little-endian arrays"): a `u32` length
    /// prefix followed by that many `BUCKET_COUNT`-wide `u64` rows, repeated
    /// for `bucket_counts` then `ptr_table_bucket_counts`, with
    /// `entry_counts` (its own length-prefixed flat `u64` array) sandwiched
    /// in between.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        const ROW: usize = crate::constants::BUCKET_COUNT;
        let mut out = Vec::with_capacity(
            4 + self.bucket_counts.len() * ROW * 8 + 4 + self.entry_counts.len() * 8 + 4 + self.ptr_table_bucket_counts.len() * ROW * 8,
        );
        write_rows(&mut out, &self.bucket_counts);
        out.extend_from_slice(&(self.entry_counts.len() as u32).to_le_bytes());
        for &v in &self.entry_counts {
            out.extend_from_slice(&v.to_le_bytes());
        }
        write_rows(&mut out, &self.ptr_table_bucket_counts);
        out
    }

    pub fn from_le_bytes(bytes: &[u8]) -> crate::error::Result<Self> {
        let mut cursor = 0usize;
        let bucket_counts = read_rows(bytes, &mut cursor)?;
        let entry_counts = {
            let n = read_u32(bytes, &mut cursor)? as usize;
            let mut v = Vec::with_capacity(n);
            for _ in 0..n {
                v.push(read_u64(bytes, &mut cursor)?);
            }
            v
        };
        let ptr_table_bucket_counts = read_rows(bytes, &mut cursor)?;
        Ok(Self { bucket_counts, entry_counts, ptr_table_bucket_counts })
    }
}

fn write_rows(out: &mut Vec<u8>, rows: &[[u64; crate::constants::BUCKET_COUNT]]) {
    out.extend_from_slice(&(rows.len() as u32).to_le_bytes());
    for row in rows {
        for &v in row {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
}

fn read_rows(bytes: &[u8], cursor: &mut usize) -> crate::error::Result<Vec<[u64; crate::constants::BUCKET_COUNT]>> {
    const ROW: usize = crate::constants::BUCKET_COUNT;
    let n = read_u32(bytes, cursor)? as usize;
    let mut rows = Vec::with_capacity(n);
    for _ in 0..n {
        let mut row = [0u64; ROW];
        for slot in row.iter_mut() {
            *slot = read_u64(bytes, cursor)?;
        }
        rows.push(row);
    }
    Ok(rows)
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> crate::error::Result<u32> {
    let end = *cursor + 4;
    let slice = bytes
        .get(*cursor..end)
        .ok_or_else(|| crate::error::PlotError::Config("truncated counts sidecar (u32)".to_string()))?;
    *cursor = end;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

fn read_u64(bytes: &[u8], cursor: &mut usize) -> crate::error::Result<u64> {
    let end = *cursor + 8;
    let slice = bytes
        .get(*cursor..end)
        .ok_or_else(|| crate::error::PlotError::Config("truncated counts sidecar (u64)".to_string()))?;
    *cursor = end;
    Ok(u64::from_le_bytes(slice.try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_counts_round_trip() {
        let mut bucket_row = [0u64; crate::constants::BUCKET_COUNT];
        bucket_row[3] = 12345;
        let counts = TableCounts {
            bucket_counts: vec![bucket_row, [7u64; crate::constants::BUCKET_COUNT]],
            entry_counts: vec![1, 2, 3],
            ptr_table_bucket_counts: vec![[1u64; crate::constants::BUCKET_COUNT]],
        };
        let bytes = counts.to_le_bytes();
        let parsed = TableCounts::from_le_bytes(&bytes).unwrap();
        assert_eq!(parsed.bucket_counts, counts.bucket_counts);
        assert_eq!(parsed.entry_counts, counts.entry_counts);
        assert_eq!(parsed.ptr_table_bucket_counts, counts.ptr_table_bucket_counts);
    }

    #[test]
    fn truncated_bytes_error_instead_of_panicking() {
        let counts = TableCounts { bucket_counts: vec![[1u64; crate::constants::BUCKET_COUNT]], entry_counts: vec![9], ptr_table_bucket_counts: vec![] };
        let mut bytes = counts.to_le_bytes();
        bytes.truncate(bytes.len() - 3);
        assert!(TableCounts::from_le_bytes(&bytes).is_err());
    }
}
