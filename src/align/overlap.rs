//! Seed, chain and extend overlap aligner.
//!
//! Given two reads and the region where they are expected to overlap, finds
//! k-mers unique to both reads on the expected diagonal band, chains exact
//! matches along their diagonals and extends the longest chains into full
//! alignments with the prefix edit-distance extender. The best extension
//! wins; a dovetail or containment ends the search.

use super::extend::Extender;
use crate::utils::Result;
use arrayvec::ArrayVec;
use std::collections::HashMap;
use std::fmt;

/// Largest k that still fits a 2-bit packed word after the widened retry.
const MAX_MER_SIZE: usize = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct OverlapParams {
    pub mer_size: usize,
    /// Smallest k tried before seeding gives up.
    pub min_mer_size: usize,
    pub error_rate: f64,
    pub min_overlap: usize,
    /// Also chain exact matches that touch without overlapping.
    pub merge_contiguous: bool,
    /// Stop extensions at the first drop in score.
    pub partial: bool,
}

impl Default for OverlapParams {
    fn default() -> Self {
        Self {
            mer_size: 17,
            min_mer_size: 8,
            error_rate: 0.06,
            min_overlap: 40,
            merge_contiguous: false,
            partial: false,
        }
    }
}

impl OverlapParams {
    pub fn validate(&self) -> Result<()> {
        if self.mer_size < self.min_mer_size || self.mer_size > MAX_MER_SIZE {
            return Err(format!(
                "K-mer size {} must be between {} and {}",
                self.mer_size, self.min_mer_size, MAX_MER_SIZE
            ));
        }
        if self.min_mer_size == 0 {
            return Err("Minimum k-mer size must be positive".to_string());
        }
        if !(0.0..1.0).contains(&self.error_rate) {
            return Err(format!("Error rate {} must be in [0, 1)", self.error_rate));
        }
        Ok(())
    }
}

/// Where the two reads are expected to overlap, 0-based half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapRegion {
    pub a_lo: usize,
    pub a_hi: usize,
    pub b_lo: usize,
    pub b_hi: usize,
}

impl OverlapRegion {
    /// Expects the whole of both reads to take part.
    pub fn whole(alen: usize, blen: usize) -> Self {
        Self {
            a_lo: 0,
            a_hi: alen,
            b_lo: 0,
            b_hi: blen,
        }
    }
}

/// Run of identical bases shared by both reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExactMatch {
    pub a_bgn: usize,
    pub b_bgn: usize,
    pub len: usize,
}

impl ExactMatch {
    pub fn new(a_bgn: usize, b_bgn: usize, len: usize) -> Self {
        Self { a_bgn, b_bgn, len }
    }
}

fn sort_matches(matches: &mut [ExactMatch]) {
    matches.sort_by(|x, y| {
        y.len
            .cmp(&x.len)
            .then(x.a_bgn.cmp(&y.a_bgn))
            .then(x.b_bgn.cmp(&y.b_bgn))
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapKind {
    /// One read lies entirely within the other.
    Contained,
    /// The alignment runs off one end of each read.
    Dovetail,
    /// At least one side stopped at a branch point.
    Partial,
}

impl fmt::Display for OverlapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlapKind::Contained => write!(f, "contained"),
            OverlapKind::Dovetail => write!(f, "dovetail"),
            OverlapKind::Partial => write!(f, "partial"),
        }
    }
}

/// Best alignment found so far, in 0-based half-open coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestResult {
    pub a_lo: usize,
    pub a_hi: usize,
    pub b_lo: usize,
    pub b_hi: usize,
    pub errors: usize,
    pub score: usize,
    pub kind: OverlapKind,
    /// Zero-terminated signed gap trace relative to `a_lo` and `b_lo`.
    pub trace: Vec<i32>,
}

impl BestResult {
    pub fn length(&self) -> usize {
        ((self.a_hi - self.a_lo) + (self.b_hi - self.b_lo)) / 2
    }

    pub fn error_rate(&self) -> f64 {
        if self.length() == 0 {
            0.0
        } else {
            self.errors as f64 / self.length() as f64
        }
    }

    /// A candidate replaces the incumbent when it scores higher, or scores
    /// the same over a shorter span.
    pub fn is_improved_by(&self, other: &BestResult) -> bool {
        self.score < other.score || (self.score <= other.score && self.length() > other.length())
    }
}

type MerMap = HashMap<u64, Option<usize>>;

/// One overlap computation between a pair of reads.
pub struct OverlapAligner<'a> {
    a: &'a [u8],
    b: &'a [u8],
    region: OverlapRegion,
    params: &'a OverlapParams,
    extender: Extender,
    min_diag: i64,
    max_diag: i64,
    align_len: usize,
    mer_size: usize,
    a_map: MerMap,
    b_map: MerMap,
    raw_hits: Vec<ExactMatch>,
    hits: Vec<ExactMatch>,
    best: Option<BestResult>,
}

impl<'a> OverlapAligner<'a> {
    pub fn new(
        a: &'a [u8],
        b: &'a [u8],
        region: OverlapRegion,
        params: &'a OverlapParams,
    ) -> Self {
        Self {
            a,
            b,
            region,
            params,
            extender: Extender::new(params.error_rate, params.partial),
            min_diag: 0,
            max_diag: 0,
            align_len: 0,
            mer_size: params.mer_size,
            a_map: MerMap::new(),
            b_map: MerMap::new(),
            raw_hits: Vec::new(),
            hits: Vec::new(),
            best: None,
        }
    }

    pub fn diagonals(&self) -> (i64, i64) {
        (self.min_diag, self.max_diag)
    }

    pub fn mer_size(&self) -> usize {
        self.mer_size
    }

    pub fn hits(&self) -> &[ExactMatch] {
        &self.hits
    }

    /// Sets the diagonal band seeds must fall in. Returns false when the
    /// expected overlap is too short to bother with.
    pub fn find_min_max_diagonal(&mut self) -> bool {
        let r = self.region;
        let a_len = r.a_hi as i64 - r.a_lo as i64;
        let b_len = r.b_hi as i64 - r.b_lo as i64;
        let align_len = a_len.max(b_len);
        self.min_diag = 0;
        self.max_diag = 0;
        if align_len < self.params.min_overlap as i64 {
            return false;
        }

        let bgn_diag = r.a_lo as i64 - r.b_lo as i64;
        let end_diag = r.a_hi as i64 - r.b_hi as i64;
        let slop = self.params.error_rate * align_len as f64 / 2.0;
        let (lo, hi) = if bgn_diag < end_diag {
            (bgn_diag, end_diag)
        } else {
            (end_diag, bgn_diag)
        };
        self.min_diag = (lo as f64 - slop) as i64;
        self.max_diag = (hi as f64 + slop) as i64;
        self.align_len = align_len as usize;
        true
    }

    /// Indexes k-mers of both reads, shrinking k (and finally tolerating
    /// repeated k-mers) until some seed survives.
    pub fn find_seeds(&mut self) -> bool {
        let schedule = seed_schedule(self.params.mer_size, self.params.min_mer_size);
        for (mer_size, dup_ignore) in schedule {
            self.mer_size = mer_size;
            self.a_map.clear();
            self.b_map.clear();

            self.find_mers_a(dup_ignore);
            if self.a_map.is_empty() {
                continue;
            }
            self.find_mers_b(dup_ignore);
            if !self.b_map.is_empty() {
                log::debug!(
                    "Found {} seeds at k={} (repeats {})",
                    self.b_map.len(),
                    mer_size,
                    if dup_ignore { "ignored" } else { "kept" }
                );
                return true;
            }
        }
        log::debug!("No seeds found");
        false
    }

    fn find_mers_a(&mut self, dup_ignore: bool) {
        let k = self.mer_size;
        let bgn = self.region.a_lo.saturating_sub(2 * k);
        let end = (self.region.a_hi + k).min(self.a.len());
        let map = &mut self.a_map;
        for_each_mer(self.a, bgn, end, k, |mer, pos| {
            record_mer(map, mer, pos, dup_ignore);
        });
    }

    fn find_mers_b(&mut self, dup_ignore: bool) {
        let k = self.mer_size;
        let bgn = self.region.b_lo.saturating_sub(2 * k);
        let end = (self.region.b_hi + k).min(self.b.len());
        let (a_map, b_map) = (&self.a_map, &mut self.b_map);
        let (min_diag, max_diag) = (self.min_diag, self.max_diag);
        for_each_mer(self.b, bgn, end, k, |mer, bpos| {
            let apos = match a_map.get(&mer) {
                Some(Some(apos)) => *apos,
                _ => return,
            };
            let diag = apos as i64 - bpos as i64;
            if diag < min_diag || diag > max_diag {
                return;
            }
            record_mer(b_map, mer, bpos, dup_ignore);
        });
    }

    /// One exact match per k-mer unique to both reads.
    pub fn find_hits(&mut self) {
        self.raw_hits = self
            .b_map
            .iter()
            .filter_map(|(mer, bpos)| {
                let bpos = (*bpos)?;
                let apos = self.a_map.get(mer).copied().flatten()?;
                let diag = apos as i64 - bpos as i64;
                debug_assert!((self.min_diag..=self.max_diag).contains(&diag));
                Some(ExactMatch::new(apos, bpos, self.mer_size))
            })
            .collect();
        log::debug!("Found {} hits", self.raw_hits.len());
    }

    /// Merges hits that continue the previous chain on the same diagonal.
    pub fn chain_hits(&mut self) {
        sort_matches(&mut self.raw_hits);
        self.hits.clear();

        for hit in &self.raw_hits {
            if let Some(last) = self.hits.last_mut() {
                let da = hit.a_bgn as i64 - (last.a_bgn + last.len) as i64;
                let db = hit.b_bgn as i64 - (last.b_bgn + last.len) as i64;
                let touching = da < 0 || (self.params.merge_contiguous && da == 0);
                if touching && da == db {
                    last.len = hit.a_bgn + hit.len - last.a_bgn;
                    continue;
                }
            }
            self.hits.push(*hit);
        }

        sort_matches(&mut self.hits);
        log::debug!("Found {} chains of hits", self.hits.len());
    }

    /// Extends chains longest first, keeping the best alignment.
    pub fn process_hits(&mut self) -> Option<&BestResult> {
        let expected = self.align_len as f64 * (1.0 - self.params.error_rate);
        for idx in 0..self.hits.len() {
            let hit = self.hits[idx];
            let candidate = self.extend_hit(&hit);
            log::trace!(
                "Chain {}-{} x {}-{} extends to {}-{} x {}-{} with {} errors",
                hit.a_bgn,
                hit.a_bgn + hit.len,
                hit.b_bgn,
                hit.b_bgn + hit.len,
                candidate.a_lo,
                candidate.a_hi,
                candidate.b_lo,
                candidate.b_hi,
                candidate.errors
            );

            let improved = match &self.best {
                None => true,
                Some(best) => best.is_improved_by(&candidate),
            };
            if improved {
                // A contained candidate may still lose to a later chain.
                let dovetail = candidate.kind == OverlapKind::Dovetail;
                self.best = Some(candidate);
                if dovetail {
                    break;
                }
            } else if self.best.as_ref().map_or(0, |b| b.score) as f64 >= 0.5 * expected {
                log::debug!("Stopping after {} of {} chains", idx + 1, self.hits.len());
                break;
            }
        }
        self.best.as_ref()
    }

    fn extend_hit(&self, hit: &ExactMatch) -> BestResult {
        let (a, b) = (self.a, self.b);
        let left = self.extender.reverse(&a[..hit.a_bgn], &b[..hit.b_bgn]);
        let a_seed_end = hit.a_bgn + hit.len;
        let b_seed_end = hit.b_bgn + hit.len;
        let right = self.extender.forward(&a[a_seed_end..], &b[b_seed_end..]);

        let a_lo = hit.a_bgn - left.a_len;
        let b_lo = hit.b_bgn - left.b_len;
        let a_hi = a_seed_end + right.a_len;
        let b_hi = b_seed_end + right.b_len;

        let a_shift = (a_seed_end - a_lo) as i32;
        let b_shift = (b_seed_end - b_lo) as i32;
        let mut trace = left.trace;
        trace.extend(
            right
                .trace
                .iter()
                .map(|&k| if k < 0 { k - a_shift } else { k + b_shift }),
        );
        trace.push(0);

        let kind = classify(a_lo, a_hi, a.len(), b_lo, b_hi, b.len());
        let errors = left.errors + right.errors;
        let length = ((a_hi - a_lo) + (b_hi - b_lo)) / 2;
        BestResult {
            a_lo,
            a_hi,
            b_lo,
            b_hi,
            errors,
            score: length.saturating_sub(errors),
            kind,
            trace,
        }
    }

    pub fn into_best(self) -> Option<BestResult> {
        self.best
    }
}

/// Runs the whole seed, chain and extend search for one read pair.
pub fn overlap_align(
    a: &[u8],
    b: &[u8],
    region: OverlapRegion,
    params: &OverlapParams,
) -> Option<BestResult> {
    let mut aligner = OverlapAligner::new(a, b, region, params);
    if !aligner.find_min_max_diagonal() {
        log::debug!("Expected overlap {:?} is too short", region);
        return None;
    }
    if !aligner.find_seeds() {
        return None;
    }
    aligner.find_hits();
    aligner.chain_hits();
    aligner.process_hits();
    aligner.into_best()
}

fn classify(
    a_lo: usize,
    a_hi: usize,
    alen: usize,
    b_lo: usize,
    b_hi: usize,
    blen: usize,
) -> OverlapKind {
    if (a_lo == 0 && a_hi == alen) || (b_lo == 0 && b_hi == blen) {
        OverlapKind::Contained
    } else if (a_lo == 0 || b_lo == 0) && (a_hi == alen || b_hi == blen) {
        OverlapKind::Dovetail
    } else {
        OverlapKind::Partial
    }
}

/// K-mer sizes tried while seeding: shrinking with repeats ignored, then
/// once more from a slightly larger k with the first copy of a repeat kept.
fn seed_schedule(initial: usize, floor: usize) -> ArrayVec<(usize, bool), 64> {
    let mut schedule = ArrayVec::new();
    for k in (floor..=initial).rev() {
        schedule.push((k, true));
    }
    for k in (floor..=initial + 2).rev() {
        schedule.push((k, false));
    }
    schedule
}

fn record_mer(map: &mut MerMap, mer: u64, pos: usize, dup_ignore: bool) {
    match map.get_mut(&mer) {
        Some(slot) => {
            if dup_ignore {
                *slot = None;
            }
        }
        None => {
            map.insert(mer, Some(pos));
        }
    }
}

fn base_bits(base: u8) -> Option<u64> {
    match base {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

/// Calls `f(mer, start)` for every k-mer of `seq[bgn..end]` made only of ACGT.
fn for_each_mer(seq: &[u8], bgn: usize, end: usize, k: usize, mut f: impl FnMut(u64, usize)) {
    let mask = if k >= 32 { u64::MAX } else { (1u64 << (2 * k)) - 1 };
    let mut mer = 0u64;
    let mut valid = 0;
    for (pos, &base) in seq.iter().enumerate().take(end).skip(bgn) {
        match base_bits(base) {
            Some(bits) => {
                mer = ((mer << 2) | bits) & mask;
                valid += 1;
            }
            None => {
                mer = 0;
                valid = 0;
            }
        }
        if valid >= k {
            f(mer, pos + 1 - k);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_seq(rng: &mut StdRng, len: usize) -> Vec<u8> {
        (0..len).map(|_| b"ACGT"[rng.random_range(0..4)]).collect()
    }

    #[test]
    fn test_seed_schedule() {
        let schedule = seed_schedule(17, 8);
        assert_eq!(schedule.first(), Some(&(17, true)));
        assert_eq!(schedule[9], (8, true));
        assert_eq!(schedule[10], (19, false));
        assert_eq!(schedule.last(), Some(&(8, false)));
        assert_eq!(schedule.len(), 22);
    }

    #[test]
    fn test_for_each_mer_skips_invalid_bases() {
        let mut found = Vec::new();
        for_each_mer(b"ACGNACGTA", 0, 9, 3, |mer, pos| found.push((mer, pos)));
        let positions: Vec<_> = found.iter().map(|&(_, pos)| pos).collect();
        assert_eq!(positions, vec![0, 4, 5, 6]);
        // ACG packs to 0b00_01_10
        assert_eq!(found[0].0, 0b000110);
        assert_eq!(found[0].0, found[1].0);
    }

    #[test]
    fn test_min_max_diagonal() {
        let params = OverlapParams::default();
        let a = vec![b'A'; 300];
        let region = OverlapRegion {
            a_lo: 100,
            a_hi: 300,
            b_lo: 0,
            b_hi: 201,
        };
        let mut aligner = OverlapAligner::new(&a, &a, region, &params);
        assert!(aligner.find_min_max_diagonal());
        assert_eq!(aligner.diagonals(), (92, 106));

        let short = OverlapRegion {
            a_lo: 0,
            a_hi: 20,
            b_lo: 0,
            b_hi: 30,
        };
        let mut aligner = OverlapAligner::new(&a, &a, short, &params);
        assert!(!aligner.find_min_max_diagonal());
    }

    #[test]
    fn test_chain_hits_merges_overlapping_matches() {
        let params = OverlapParams::default();
        let seq = vec![b'A'; 64];
        let mut aligner = OverlapAligner::new(&seq, &seq, OverlapRegion::whole(64, 64), &params);
        aligner.raw_hits = vec![
            ExactMatch::new(20, 10, 8),
            ExactMatch::new(5, 5, 8),
            ExactMatch::new(0, 0, 8),
            ExactMatch::new(1, 1, 8),
        ];
        aligner.chain_hits();
        assert_eq!(
            aligner.hits(),
            &[ExactMatch::new(0, 0, 13), ExactMatch::new(20, 10, 8)]
        );
    }

    #[test]
    fn test_chain_hits_contiguous_flag() {
        let mut params = OverlapParams::default();
        let seq = vec![b'A'; 64];
        let raw = vec![ExactMatch::new(0, 0, 8), ExactMatch::new(8, 8, 8)];

        let mut aligner = OverlapAligner::new(&seq, &seq, OverlapRegion::whole(64, 64), &params);
        aligner.raw_hits = raw.clone();
        aligner.chain_hits();
        assert_eq!(aligner.hits().len(), 2);

        params.merge_contiguous = true;
        let mut aligner = OverlapAligner::new(&seq, &seq, OverlapRegion::whole(64, 64), &params);
        aligner.raw_hits = raw;
        aligner.chain_hits();
        assert_eq!(aligner.hits(), &[ExactMatch::new(0, 0, 16)]);
    }

    #[test]
    fn test_overlap_dovetail_exact() {
        let mut rng = StdRng::seed_from_u64(11);
        let a = random_seq(&mut rng, 300);
        let mut b = a[100..].to_vec();
        b.extend(random_seq(&mut rng, 100));
        let region = OverlapRegion {
            a_lo: 100,
            a_hi: 300,
            b_lo: 0,
            b_hi: 200,
        };
        let best = overlap_align(&a, &b, region, &OverlapParams::default()).unwrap();
        assert_eq!(best.kind, OverlapKind::Dovetail);
        assert_eq!((best.a_lo, best.a_hi, best.b_lo, best.b_hi), (100, 300, 0, 200));
        assert_eq!(best.errors, 0);
        assert_eq!(best.score, 200);
        assert_eq!(best.trace, vec![0]);
    }

    #[test]
    fn test_overlap_dovetail_with_insertion() {
        let mut rng = StdRng::seed_from_u64(12);
        let a = random_seq(&mut rng, 300);
        let extra = *b"ACGT"
            .iter()
            .find(|&&c| c != a[199] && c != a[200])
            .unwrap();
        let mut b = a[100..200].to_vec();
        b.push(extra);
        b.extend_from_slice(&a[200..]);
        b.extend(random_seq(&mut rng, 100));
        let region = OverlapRegion {
            a_lo: 100,
            a_hi: 300,
            b_lo: 0,
            b_hi: 201,
        };
        let best = overlap_align(&a, &b, region, &OverlapParams::default()).unwrap();
        assert_eq!(best.kind, OverlapKind::Dovetail);
        assert_eq!((best.a_lo, best.a_hi, best.b_lo, best.b_hi), (100, 300, 0, 201));
        assert_eq!(best.errors, 1);
        assert_eq!(best.trace, vec![-101, 0]);
    }

    #[test]
    fn test_overlap_contained() {
        let mut rng = StdRng::seed_from_u64(13);
        let a = random_seq(&mut rng, 300);
        let b = a[50..250].to_vec();
        let region = OverlapRegion {
            a_lo: 50,
            a_hi: 250,
            b_lo: 0,
            b_hi: 200,
        };
        let best = overlap_align(&a, &b, region, &OverlapParams::default()).unwrap();
        assert_eq!(best.kind, OverlapKind::Contained);
        assert_eq!((best.b_lo, best.b_hi), (0, 200));
        assert_eq!((best.a_lo, best.a_hi), (50, 250));
        assert!(best.error_rate() < 1e-9);
    }

    #[test]
    fn test_overlap_without_seeds() {
        let a = vec![b'A'; 200];
        let b = vec![b'C'; 200];
        let region = OverlapRegion::whole(200, 200);
        assert_eq!(overlap_align(&a, &b, region, &OverlapParams::default()), None);
    }

    #[test]
    fn test_best_result_never_regresses() {
        let base = BestResult {
            a_lo: 0,
            a_hi: 100,
            b_lo: 0,
            b_hi: 100,
            errors: 2,
            score: 98,
            kind: OverlapKind::Partial,
            trace: vec![0],
        };
        let worse = BestResult {
            score: 90,
            ..base.clone()
        };
        let shorter = BestResult {
            a_hi: 98,
            b_hi: 98,
            errors: 0,
            ..base.clone()
        };
        assert!(!base.is_improved_by(&worse));
        assert!(base.is_improved_by(&shorter));
        assert!(!base.is_improved_by(&base.clone()));
    }

    /// `a` holds three copies of `b`: with 6 substitutions, with 3, and
    /// exact. Returns `a`, `b` and the offset of each copy in `a`.
    fn repeated_copies(rng: &mut StdRng) -> (Vec<u8>, Vec<u8>, [usize; 3]) {
        let b = random_seq(rng, 200);
        let mutate = |subs: &[usize]| {
            let mut copy = b.clone();
            for &i in subs {
                copy[i] = match copy[i] {
                    b'A' => b'C',
                    b'C' => b'G',
                    b'G' => b'T',
                    _ => b'A',
                };
            }
            copy
        };
        let mut a = random_seq(rng, 40);
        let mut offsets = [0; 3];
        let copies = [
            mutate(&[40, 70, 100, 130, 160, 190]),
            mutate(&[50, 100, 150]),
            b.clone(),
        ];
        for (i, copy) in copies.iter().enumerate() {
            offsets[i] = a.len();
            a.extend_from_slice(copy);
            a.extend(random_seq(rng, 60));
        }
        (a, b, offsets)
    }

    fn seed_in_copy(offset: usize) -> ExactMatch {
        ExactMatch::new(offset + 10, 10, 20)
    }

    #[test]
    fn test_process_hits_contained_does_not_stop_search() {
        let mut rng = StdRng::seed_from_u64(14);
        let (a, b, offsets) = repeated_copies(&mut rng);
        let params = OverlapParams::default();
        let mut aligner = OverlapAligner::new(&a, &b, OverlapRegion::whole(a.len(), b.len()), &params);
        assert!(aligner.find_min_max_diagonal());
        aligner.hits = vec![seed_in_copy(offsets[1]), seed_in_copy(offsets[2])];

        let best = aligner.process_hits().unwrap();
        assert_eq!(best.kind, OverlapKind::Contained);
        assert_eq!((best.a_lo, best.a_hi), (offsets[2], offsets[2] + 200));
        assert_eq!(best.errors, 0);
        assert_eq!(best.score, 200);
    }

    #[test]
    fn test_process_hits_best_score_never_decreases() {
        let mut rng = StdRng::seed_from_u64(15);
        let (a, b, offsets) = repeated_copies(&mut rng);
        let params = OverlapParams::default();
        let orders = [[1, 0, 2], [0, 1, 2], [2, 0, 1], [1, 2, 0]];
        for order in orders {
            let hits: Vec<_> = order.iter().map(|&i| seed_in_copy(offsets[i])).collect();
            let mut scores = Vec::new();
            for n in 1..=hits.len() {
                let mut aligner =
                    OverlapAligner::new(&a, &b, OverlapRegion::whole(a.len(), b.len()), &params);
                assert!(aligner.find_min_max_diagonal());
                aligner.hits = hits[..n].to_vec();
                scores.push(aligner.process_hits().unwrap().score);
            }
            assert!(scores.windows(2).all(|w| w[0] <= w[1]), "{:?} {:?}", order, scores);
            assert_eq!(*scores.last().unwrap(), 200, "{:?}", order);
        }
    }

    #[test]
    fn test_params_validation() {
        assert!(OverlapParams::default().validate().is_ok());
        let params = OverlapParams {
            mer_size: 31,
            ..OverlapParams::default()
        };
        assert!(params.validate().is_err());
        let params = OverlapParams {
            mer_size: 6,
            ..OverlapParams::default()
        };
        assert!(params.validate().is_err());
    }
}
