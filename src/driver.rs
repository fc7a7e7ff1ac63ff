//! Per-table driver (spec.md §4.9): the per-table, per-bucket loop that
//! generates table 1 via F1, then repeatedly reads a table's unsorted raw
//! bucket, sorts it, scans groups, matches (stitching across the previous
//! bucket's tail), computes Fx into the next table, and persists the
//! forward map and back-pointer pairs -- gluing together every module built
//! so far (`f1`, `radix_sort`, `group_scan`, `matching`, `stitch`, `fx`,
//! `backptr`) the way the teacher's `pipeline.rs` glues `paths`/`streaming`/
//! `shard`/`stitch` into `RedditETL`'s operations.
//!
//! One simplification versus a fully pipelined implementation: buckets are
//! processed strictly in order on the calling thread (the within-bucket
//! work -- sort, group scan, Fx bucketize -- is itself `rayon`-parallel).
//! A later revision that prefetches bucket `b+1` while computing `b` would
//! need a fencing primitive to order that overlap; see DESIGN.md.

use std::io::SeekFrom;
use std::path::PathBuf;

use crate::backptr::{scatter_forward_map, serialize_pairs};
use crate::config::PlotConfig;
use crate::constants::{self, bucket_max_entries, entry_count_for_k, full_y, table_in_shape, table_out_shape, BUCKET_COUNT, LAST_TABLE, PARAM_EXT};
use crate::entry::{CrossBucketCarry, FlatMeta, Pair, TableCounts};
use crate::error::{PlotError, Result};
use crate::f1::F1Generator;
use crate::fx::{bucket_of as fx_bucket_of, bucketize_chunk, compute_fx, FxOut};
use crate::group_scan::scan_groups;
use crate::io_queue::{FileId, FileKind, IoQueue};
use crate::matching::match_all_adjacent;
use crate::radix_sort::{permute_metadata, sort_bucket};
use crate::stitch::{build_carry, stitch, StitchedPair};

/// Number of `(y, x)` pairs accumulated per bucket before table 1's
/// generation pass flushes it through the I/O queue (spec.md §4.3 "Output
/// is streamed ... as growing slices").
const TABLE1_FLUSH_ENTRIES: usize = 1 << 16;

/// Drives all seven tables end to end. Builds its own buffers directly
/// rather than drawing them from [`crate::heap::IoHeap`]; the heap's
/// back-pressure budget currently gates only the I/O queue's own internal
/// overflow buffers. Wiring the driver's per-bucket allocations through the
/// heap too is future work (see DESIGN.md).
pub struct PlotDriver {
    cfg: PlotConfig,
    io: IoQueue,
}

impl PlotDriver {
    pub fn new(cfg: PlotConfig) -> Result<Self> {
        cfg.validate()?;
        let io = IoQueue::start();
        Ok(Self { cfg, io })
    }

    fn table_dir(&self, table: u8) -> PathBuf {
        self.cfg.temp_dir.join(format!("t{table}"))
    }

    /// Runs all seven tables end to end, returning one [`TableCounts`] per
    /// table in order. `progress`, if given, is incremented by one item per
    /// table completed.
    pub fn run(&mut self, progress: Option<&crate::progress::ProgressScope>) -> Result<Vec<TableCounts>> {
        let k = self.cfg.k;
        let mut all_counts = Vec::with_capacity(LAST_TABLE as usize);

        let _span = crate::progress::TimingSpan::start("table1.generate_and_process");
        let raw_counts = self.generate_table1()?;
        let (t1_counts, mut in_counts) = self.process_table(1, &raw_counts, None)?;
        all_counts.push(t1_counts);
        if let Some(p) = progress {
            p.inc_items(1);
        }

        // Address space table 2's forward map scatters against: table 1's
        // own total entry count (every x in [0, 2^k)).
        let mut prev_total = entry_count_for_k(k);

        for t in 2..=LAST_TABLE {
            let _span = crate::progress::TimingSpan::start(format!("table{t}.process"));
            let table_total: u64 = in_counts.iter().sum();
            let (counts, next_in_counts) = self.process_table(t, &in_counts, Some(prev_total))?;
            all_counts.push(counts);
            prev_total = table_total;
            in_counts = next_in_counts;
            if let Some(p) = progress {
                p.inc_items(1);
            }
        }

        Ok(all_counts)
    }

    /// Serializes and writes the sidecar counts file (SPEC_FULL.md §13).
    pub fn write_counts_sidecar(&mut self, all_counts: &[TableCounts]) {
        for (i, counts) in all_counts.iter().enumerate() {
            let path = self.cfg.plot_dir.join(format!("counts.t{}.bin", i + 1));
            self.io.write_sidecar(path, counts.to_le_bytes());
        }
        self.io.commit_commands();
    }

    /// F1 generation (spec.md §4.3): scans `x ∈ [0, 2^k)` once, computing
    /// `y = F1(x)` and routing `(y, x)` into one of `BUCKET_COUNT` growing
    /// on-disk slices. Returns each bucket's raw (unsorted) entry count,
    /// which `process_table(1, ..)` uses to size its read-back.
    fn generate_table1(&mut self) -> Result<[u64; BUCKET_COUNT]> {
        let k = self.cfg.k;
        let dir = self.table_dir(1);
        self.io.open_file_set(FileId::new(1, FileKind::Y), &dir, self.cfg.direct_io);
        self.io.open_file_set(FileId::new(1, FileKind::X), &dir, self.cfg.direct_io);
        self.io.commit_commands();

        let mut f1 = F1Generator::new(&self.cfg.plot_id, k);
        let mut buf_y: Vec<Vec<u32>> = vec![Vec::new(); BUCKET_COUNT];
        let mut buf_x: Vec<Vec<u32>> = vec![Vec::new(); BUCKET_COUNT];
        let mut counts = [0u64; BUCKET_COUNT];

        let n = entry_count_for_k(k);
        for x in 0..n {
            let x = x as u32;
            let y = f1.compute(x);
            let b = f1.bucket_of(y);
            buf_y[b].push(y);
            buf_x[b].push(x);
            counts[b] += 1;
            if buf_y[b].len() >= TABLE1_FLUSH_ENTRIES {
                self.flush_table1_bucket(b, &mut buf_y[b], &mut buf_x[b]);
            }
        }
        for b in 0..BUCKET_COUNT {
            if !buf_y[b].is_empty() {
                self.flush_table1_bucket(b, &mut buf_y[b], &mut buf_x[b]);
            }
        }
        self.io.flush_overflow(FileId::new(1, FileKind::Y));
        self.io.flush_overflow(FileId::new(1, FileKind::X));
        self.io.commit_commands();

        Ok(counts)
    }

    fn flush_table1_bucket(&mut self, b: usize, y: &mut Vec<u32>, x: &mut Vec<u32>) {
        let y_bytes: Vec<u8> = y.iter().flat_map(|v| v.to_le_bytes()).collect();
        let x_bytes: Vec<u8> = x.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.io.write_bucket(FileId::new(1, FileKind::Y), b, y_bytes);
        self.io.write_bucket(FileId::new(1, FileKind::X), b, x_bytes);
        self.io.commit_commands();
        y.clear();
        x.clear();
    }

    /// Processes every bucket of table `t`: read back its raw (unsorted)
    /// contents, sort, scan groups, match (stitching with the previous
    /// bucket's carry), compute Fx into table `t+1`, and persist the
    /// forward map (if `t >= 2`) and back-pointer pairs (if `t < 7`).
    /// Returns table `t`'s own counts plus table `t+1`'s raw per-bucket
    /// entry counts (empty/unused when `t == LAST_TABLE`).
    fn process_table(&mut self, t: u8, in_counts: &[u64; BUCKET_COUNT], prev_total: Option<u64>) -> Result<(TableCounts, [u64; BUCKET_COUNT])> {
        let k = self.cfg.k;
        let width = k + PARAM_EXT;
        let has_next = t < LAST_TABLE;
        let has_incoming_map = t >= 2;

        let (in_meta_a_stride, in_meta_b_stride) = if t == 1 {
            (4usize, 0usize)
        } else {
            let shape = table_in_shape(t);
            (shape.meta_a_bytes, shape.meta_b_bytes)
        };

        let dir_t = self.table_dir(t);
        if has_incoming_map {
            self.io.open_file_set(FileId::new(t, FileKind::Map), &dir_t, self.cfg.direct_io);
        }
        if has_next {
            self.io.open_file_set(FileId::new(t, FileKind::PtrL), &dir_t, self.cfg.direct_io);
            self.io.open_file_set(FileId::new(t, FileKind::PtrR), &dir_t, self.cfg.direct_io);

            let next_dir = self.table_dir(t + 1);
            let out_shape = table_out_shape(t);
            self.io.open_file_set(FileId::new(t + 1, FileKind::Y), &next_dir, self.cfg.direct_io);
            if out_shape.meta_a_bytes > 0 {
                self.io.open_file_set(FileId::new(t + 1, FileKind::MetaA), &next_dir, self.cfg.direct_io);
            }
            if out_shape.meta_b_bytes > 0 {
                self.io.open_file_set(FileId::new(t + 1, FileKind::MetaB), &next_dir, self.cfg.direct_io);
            }
            self.io.open_file_set(FileId::new(t + 1, FileKind::SortKey), &next_dir, self.cfg.direct_io);
        }
        self.io.commit_commands();

        let mut bucket_counts = [0u64; BUCKET_COUNT];
        let mut ptr_bucket_counts = [0u64; BUCKET_COUNT];
        let mut next_in_counts = [0u64; BUCKET_COUNT];
        let mut table_total: u64 = 0;

        let mut carry: Option<CrossBucketCarry> = None;
        let mut prev_bucket_base: u64 = 0;

        for b in 0..BUCKET_COUNT {
            let n = in_counts[b] as usize;
            bucket_counts[b] = in_counts[b];

            let (mut y, mut meta_a, mut meta_b, source_index) =
                self.read_table_bucket(t, b, n, in_meta_a_stride, in_meta_b_stride, has_incoming_map)?;

            let mut sort_key: Vec<u32> = (0..n as u32).collect();
            sort_bucket(&mut y, &mut sort_key, self.cfg.thread_count);
            meta_a = permute_metadata(&meta_a, &sort_key);
            if in_meta_b_stride > 0 {
                meta_b = permute_metadata(&meta_b, &sort_key);
            }
            let source_index_sorted = source_index.map(|src| permute_u32_array(&src, &sort_key));

            self.rewrite_table_bucket(t, b, &y, &meta_a, &meta_b, source_index_sorted.as_deref())?;

            if has_incoming_map {
                if let (Some(src), Some(prev_total)) = (&source_index_sorted, prev_total) {
                    let address_bits = bits_for(prev_total);
                    let scattered = scatter_forward_map(src, table_total as u32, address_bits);
                    let sizes: Vec<usize> = scattered.iter().map(|v| v.len()).collect();
                    let data: Vec<u8> = scattered.into_iter().flatten().collect();
                    self.io.write_buckets_scatter(FileId::new(t, FileKind::Map), data, sizes);
                }
            }

            let groups = scan_groups(&y, b, width, self.cfg.thread_count);

            if has_next {
                let max_pairs = (bucket_max_entries(k) as usize).max(n.max(1)) * 2;

                if let Some(c) = &carry {
                    if !c.is_empty() && !groups.is_empty() {
                        let result = stitch(c, &y, &groups, b, width, max_pairs)?;
                        if !result.pairs.is_empty() {
                            // Each pair's l_local lives in bucket b-1, so
                            // that's the slice the count is attributed to
                            // (spec.md §3 "Counts": ptrTableBucketCounts[t][b]
                            // counts pairs whose left side lives in slice b)
                            // -- but the bytes are written into bucket b's
                            // own T_t_L/T_t_R file, just before bucket b's
                            // own pairs, per spec.md §4.8 ("held ... and
                            // written just before bucket b+1's pairs") and
                            // §4.6 ("stitched pairs are written before the
                            // current bucket's pairs").
                            //
                            // `result.pairs` is still bucket-local on both
                            // sides (l_local to b-1, r_local to b, per
                            // stitch.rs) and not delta-encoded, since the two
                            // sides don't share a base; it must be translated
                            // into the table's global index space (computing
                            // the real delta for the first time) before
                            // hitting disk so that T_t_L stays non-decreasing
                            // across the stitched/own boundary (spec.md §8
                            // invariant 8).
                            let global_pairs: Vec<Pair> =
                                result.pairs.iter().map(|p| stitched_pair_to_global(*p, prev_bucket_base, table_total)).collect::<Result<_>>()?;
                            ptr_bucket_counts[b - 1] += global_pairs.len() as u64;
                            let (l_bytes, r_bytes) = serialize_pairs(&global_pairs, &[]);
                            self.io.write_bucket(FileId::new(t, FileKind::PtrL), b, l_bytes);
                            self.io.write_bucket(FileId::new(t, FileKind::PtrR), b, r_bytes);

                            let entries = fx_entries_for_stitched(t, k, width, &result.pairs, c, &meta_a, &meta_b, prev_bucket_base);
                            self.write_fx_entries(t, &entries, &mut next_in_counts);
                        }
                    }
                }

                let full_y_vec: Vec<u64> = y.iter().map(|&yy| full_y(b, yy, width)).collect();
                let own_pairs = match_all_adjacent(&full_y_vec, &groups, max_pairs)?;
                if !own_pairs.is_empty() {
                    ptr_bucket_counts[b] += own_pairs.len() as u64;
                    // Own pairs shift uniformly into the global space (both
                    // sides are local to the same bucket, so the delta `r`
                    // is unaffected) -- this keeps them monotonically after
                    // the stitched pairs above, which end at or below
                    // `table_total` (bucket b's own global start).
                    let global_own: Vec<Pair> = own_pairs.iter().map(|p| own_pair_to_global(*p, table_total)).collect();
                    let (l_bytes, r_bytes) = serialize_pairs(&[], &global_own);
                    self.io.write_bucket(FileId::new(t, FileKind::PtrL), b, l_bytes);
                    self.io.write_bucket(FileId::new(t, FileKind::PtrR), b, r_bytes);

                    let entries = fx_entries_for_own(t, k, width, &own_pairs, b, &y, &meta_a, &meta_b, table_total);
                    self.write_fx_entries(t, &entries, &mut next_in_counts);
                }

                prev_bucket_base = table_total;
                carry = Some(build_carry(&y, &meta_a, &meta_b, &groups, b));
            }

            table_total += n as u64;
            self.io.commit_commands();
        }

        if has_incoming_map {
            self.io.flush_overflow(FileId::new(t, FileKind::Map));
        }
        if has_next {
            self.io.flush_overflow(FileId::new(t, FileKind::PtrL));
            self.io.flush_overflow(FileId::new(t, FileKind::PtrR));
            let out_shape = table_out_shape(t);
            self.io.flush_overflow(FileId::new(t + 1, FileKind::Y));
            if out_shape.meta_a_bytes > 0 {
                self.io.flush_overflow(FileId::new(t + 1, FileKind::MetaA));
            }
            if out_shape.meta_b_bytes > 0 {
                self.io.flush_overflow(FileId::new(t + 1, FileKind::MetaB));
            }
            self.io.flush_overflow(FileId::new(t + 1, FileKind::SortKey));
        }
        self.io.commit_commands();

        let counts = TableCounts {
            bucket_counts: vec![bucket_counts],
            entry_counts: vec![table_total],
            ptr_table_bucket_counts: if has_next { vec![ptr_bucket_counts] } else { vec![] },
        };
        Ok((counts, next_in_counts))
    }

    fn read_table_bucket(
        &mut self,
        t: u8,
        b: usize,
        n: usize,
        meta_a_stride: usize,
        meta_b_stride: usize,
        has_source_index: bool,
    ) -> Result<(Vec<u32>, FlatMeta, FlatMeta, Option<Vec<u32>>)> {
        let y_bytes = self.io.read_bucket_blocking(FileId::new(t, FileKind::Y), b, n * 4)?;
        let y = parse_u32_array(&y_bytes);

        let meta_a_id = if t == 1 { FileId::new(1, FileKind::X) } else { FileId::new(t, FileKind::MetaA) };
        let meta_a_bytes = if meta_a_stride > 0 { self.io.read_bucket_blocking(meta_a_id, b, n * meta_a_stride)? } else { Vec::new() };
        let meta_a = FlatMeta { stride: meta_a_stride, bytes: meta_a_bytes };

        let meta_b_bytes = if meta_b_stride > 0 {
            self.io.read_bucket_blocking(FileId::new(t, FileKind::MetaB), b, n * meta_b_stride)?
        } else {
            Vec::new()
        };
        let meta_b = FlatMeta { stride: meta_b_stride, bytes: meta_b_bytes };

        let source_index = if has_source_index {
            let bytes = self.io.read_bucket_blocking(FileId::new(t, FileKind::SortKey), b, n * 4)?;
            Some(parse_u32_array(&bytes))
        } else {
            None
        };

        Ok((y, meta_a, meta_b, source_index))
    }

    /// Overwrites bucket `b`'s files in place with their sorted content --
    /// table `t`'s persisted `Y_t`/`MetaA_t`/`MetaB_t`/`SortKey_t` are the
    /// same physical files the raw (unsorted) Fx output was written to by
    /// table `t-1`; there is no separate front/back buffer pair to delete
    /// (see DESIGN.md for why spec.md §4.9's "delete all T_t inputs" step is
    /// a no-op under this layout).
    fn rewrite_table_bucket(&mut self, t: u8, b: usize, y: &[u32], meta_a: &FlatMeta, meta_b: &FlatMeta, source_index: Option<&[u32]>) -> Result<()> {
        let y_bytes: Vec<u8> = y.iter().flat_map(|v| v.to_le_bytes()).collect();
        let y_id = FileId::new(t, FileKind::Y);
        self.io.seek_bucket(y_id, b, SeekFrom::Start(0));
        self.io.truncate_bucket(y_id, b, y_bytes.len() as u64);
        self.io.write_bucket(y_id, b, y_bytes);

        let meta_a_id = if t == 1 { FileId::new(1, FileKind::X) } else { FileId::new(t, FileKind::MetaA) };
        if meta_a.stride > 0 {
            self.io.seek_bucket(meta_a_id, b, SeekFrom::Start(0));
            self.io.truncate_bucket(meta_a_id, b, meta_a.bytes.len() as u64);
            self.io.write_bucket(meta_a_id, b, meta_a.bytes.clone());
        }
        if meta_b.stride > 0 {
            let id = FileId::new(t, FileKind::MetaB);
            self.io.seek_bucket(id, b, SeekFrom::Start(0));
            self.io.truncate_bucket(id, b, meta_b.bytes.len() as u64);
            self.io.write_bucket(id, b, meta_b.bytes.clone());
        }
        if let Some(src) = source_index {
            let bytes: Vec<u8> = src.iter().flat_map(|v| v.to_le_bytes()).collect();
            let id = FileId::new(t, FileKind::SortKey);
            self.io.seek_bucket(id, b, SeekFrom::Start(0));
            self.io.truncate_bucket(id, b, bytes.len() as u64);
            self.io.write_bucket(id, b, bytes);
        }
        Ok(())
    }

    fn write_fx_entries(&mut self, t: u8, entries: &[FxOut], next_in_counts: &mut [u64; BUCKET_COUNT]) {
        if entries.is_empty() {
            return;
        }
        let bucketized = bucketize_chunk(entries, self.cfg.thread_count);
        let out_shape = table_out_shape(t);

        let y_sizes: Vec<usize> = bucketized.y.iter().map(|v| v.len()).collect();
        for (b, &sz) in y_sizes.iter().enumerate() {
            next_in_counts[b] += (sz / 4) as u64;
        }
        let y_data: Vec<u8> = bucketized.y.into_iter().flatten().collect();
        self.io.write_buckets_scatter(FileId::new(t + 1, FileKind::Y), y_data, y_sizes);

        if out_shape.meta_a_bytes > 0 {
            let sizes: Vec<usize> = bucketized.meta_a.iter().map(|v| v.len()).collect();
            let data: Vec<u8> = bucketized.meta_a.into_iter().flatten().collect();
            self.io.write_buckets_scatter(FileId::new(t + 1, FileKind::MetaA), data, sizes);
        }
        if out_shape.meta_b_bytes > 0 {
            let sizes: Vec<usize> = bucketized.meta_b.iter().map(|v| v.len()).collect();
            let data: Vec<u8> = bucketized.meta_b.into_iter().flatten().collect();
            self.io.write_buckets_scatter(FileId::new(t + 1, FileKind::MetaB), data, sizes);
        }

        let src_sizes: Vec<usize> = bucketized.source_index.iter().map(|v| v.len()).collect();
        let src_data: Vec<u8> = bucketized.source_index.into_iter().flatten().collect();
        self.io.write_buckets_scatter(FileId::new(t + 1, FileKind::SortKey), src_data, src_sizes);
    }
}

fn parse_u32_array(bytes: &[u8]) -> Vec<u32> {
    bytes.chunks_exact(4).map(|c| u32::from_le_bytes(<[u8; 4]>::try_from(c).unwrap())).collect()
}

/// Shifts a bucket-local own-pair into table `t`'s global index space by
/// adding the bucket's own global start. Both sides of an own pair are
/// local to the same bucket, so a uniform shift leaves the delta `r`
/// unchanged.
fn own_pair_to_global(p: Pair, bucket_base: u64) -> Pair {
    Pair { l: (p.l as u64 + bucket_base) as u32, r: p.r }
}

/// Shifts a stitched pair into the table's global index space. `p.l_local`
/// is local to the previous bucket and `p.r_local` is local to the current
/// bucket (see [`crate::stitch::StitchedPair`]); the two sides need
/// different shifts, so the delta has to be computed here, for the first
/// time, from the two global positions (spec.md §8 invariant 5: the
/// resulting delta must satisfy `0 < delta <= 0xFFFF`).
fn stitched_pair_to_global(p: StitchedPair, prev_bucket_base: u64, cur_bucket_base: u64) -> Result<Pair> {
    let l_global = prev_bucket_base + p.l_local as u64;
    let r_global = cur_bucket_base + p.r_local as u64;
    if r_global <= l_global || r_global - l_global > 0xFFFF {
        return Err(PlotError::PairDeltaOverflow {
            l: l_global as u32,
            r: r_global as u32,
            delta: r_global.saturating_sub(l_global),
        });
    }
    Ok(Pair { l: l_global as u32, r: (r_global - l_global) as u16 })
}

/// `dst[i] = src[order[i]]`, matching [`crate::entry::FlatMeta::permuted_by`]'s
/// convention but for a plain `u32` array (the `source_index`/`lookupIdx`
/// companion array, which travels alongside `y` through the sort the same
/// way metadata does but isn't itself `FlatMeta`-shaped on disk).
fn permute_u32_array(src: &[u32], order: &[u32]) -> Vec<u32> {
    order.iter().map(|&i| src[i as usize]).collect()
}

/// Number of bits needed to address `[0, n)`; `0` and `1` both need zero
/// bits (no routing choice to make).
fn bits_for(n: u64) -> u32 {
    if n <= 1 {
        0
    } else {
        64 - (n - 1).leading_zeros()
    }
}

#[allow(clippy::too_many_arguments)]
fn fx_entries_for_own(table: u8, k: u32, width: u32, pairs: &[Pair], bucket_idx: usize, y: &[u32], meta_a: &FlatMeta, meta_b: &FlatMeta, bucket_base: u64) -> Vec<FxOut> {
    pairs
        .iter()
        .map(|p| {
            let l = p.l as usize;
            let r = p.right_index() as usize;
            let yl = full_y(bucket_idx, y[l], width);
            let (y_prime, meta_a_out, meta_b_out) = compute_fx(table, yl, meta_a.get(l), meta_b.get(l), meta_a.get(r), meta_b.get(r), k);
            let bucket = fx_bucket_of(y_prime, k);
            FxOut { y: y_prime, meta_a: meta_a_out, meta_b: meta_b_out, source_index: (bucket_base + p.l as u64) as u32, bucket }
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn fx_entries_for_stitched(
    table: u8,
    k: u32,
    width: u32,
    pairs: &[StitchedPair],
    carry: &CrossBucketCarry,
    cur_meta_a: &FlatMeta,
    cur_meta_b: &FlatMeta,
    prev_bucket_base: u64,
) -> Vec<FxOut> {
    pairs
        .iter()
        .map(|p| {
            let idx = p.l_local as usize - carry.base_index;
            let r_local = p.r_local as usize;
            let yl = full_y(carry.prev_bucket_idx, carry.y[idx], width);
            let (y_prime, meta_a_out, meta_b_out) = compute_fx(table, yl, carry.meta_a.get(idx), carry.meta_b.get(idx), cur_meta_a.get(r_local), cur_meta_b.get(r_local), k);
            let bucket = fx_bucket_of(y_prime, k);
            FxOut { y: y_prime, meta_a: meta_a_out, meta_b: meta_b_out, source_index: (prev_bucket_base + p.l_local as u64) as u32, bucket }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_for_covers_boundary_sizes() {
        assert_eq!(bits_for(0), 0);
        assert_eq!(bits_for(1), 0);
        assert_eq!(bits_for(2), 1);
        assert_eq!(bits_for(3), 2);
        assert_eq!(bits_for(256), 8);
        assert_eq!(bits_for(257), 9);
    }

    #[test]
    fn permute_u32_array_matches_flat_meta_convention() {
        let src = vec![10u32, 20, 30, 40];
        let order = vec![2u32, 0, 3, 1];
        let out = permute_u32_array(&src, &order);
        assert_eq!(out, vec![30, 10, 40, 20]);

        let flat = FlatMeta { stride: 4, bytes: src.iter().flat_map(|v| v.to_le_bytes()).collect() };
        let permuted = flat.permuted_by(&order);
        let reparsed: Vec<u32> = (0..4).map(|i| u32::from_le_bytes(<[u8; 4]>::try_from(permuted.get(i)).unwrap())).collect();
        assert_eq!(out, reparsed);
    }

    #[test]
    fn own_pair_to_global_shifts_l_and_preserves_delta() {
        let p = Pair { l: 5, r: 3 };
        let shifted = own_pair_to_global(p, 1000);
        assert_eq!(shifted.l, 1005);
        assert_eq!(shifted.r, 3);
        assert_eq!(shifted.right_index(), 1008);
    }

    #[test]
    fn stitched_pair_to_global_is_monotonic_against_the_following_bucket_own_base() {
        // Bucket b-1 has 1000 entries; the matched left entry sits near its
        // tail (local index 995). Bucket b's matched right entry sits near
        // its head (local index 2) -- exactly the shape `Pair`'s delta
        // encoding can't represent directly, which is why stitch.rs hands
        // these over as independent local positions instead.
        let prev_bucket_base = 0u64;
        let cur_bucket_base = 1000u64;
        let local = StitchedPair { l_local: 995, r_local: 2 };
        let global = stitched_pair_to_global(local, prev_bucket_base, cur_bucket_base).unwrap();
        assert_eq!(global.l, 995);
        assert_eq!(global.right_index(), cur_bucket_base as u32 + 2);
        assert!(global.l < cur_bucket_base as u32, "stitched pairs must sort before bucket b's own pairs");
    }

    #[test]
    fn stitched_pair_to_global_rejects_non_positive_delta() {
        // A right side that doesn't actually land past the left global
        // index (malformed input) must error rather than wrap/panic.
        let local = StitchedPair { l_local: 10, r_local: 10 };
        let result = stitched_pair_to_global(local, 0, 0);
        assert!(result.is_err());
    }
}
