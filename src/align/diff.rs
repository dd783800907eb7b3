//! Linear-space affine-gap global alignment by divide and conquer.
//!
//! The forward pass scores the top half of the first sequence, the reverse
//! pass scores the bottom half, and the optimal path is split where it
//! crosses the middle row. Deletions running down the first or last column
//! are split explicitly because their cost is not linear when the alignment
//! ends are free or carry forced gaps.

use super::edit_script::{EditKind, EditScript};
use std::cmp::min;

/// Cost model for [`diff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffParams {
    /// Cost of opening a gap (`g`).
    pub gap_open: i64,
    /// Cost of each gapped base (`h`).
    pub gap_extend: i64,
    /// Cost of aligning two differing bases (`x`).
    pub mismatch: i64,
    /// Gaps touching the start of the alignment are free.
    pub free_start: bool,
    /// Gaps touching the end of the alignment are free.
    pub free_end: bool,
    /// Number of leading first-sequence bases that may be deleted at no cost.
    pub start_cgap: usize,
    /// Number of trailing first-sequence bases that may be deleted at no cost.
    pub end_cgap: usize,
}

impl Default for DiffParams {
    fn default() -> Self {
        Self {
            gap_open: 1,
            gap_extend: 1,
            mismatch: 1,
            free_start: false,
            free_end: false,
            start_cgap: 0,
            end_cgap: 0,
        }
    }
}

impl DiffParams {
    pub fn gap(&self, len: usize) -> i64 {
        if len == 0 {
            0
        } else {
            self.gap_open + self.gap_extend * len as i64
        }
    }

    /// Cost of a deletion run of `len` bases that starts the alignment.
    pub fn leading_deletion(&self, len: usize) -> i64 {
        if self.free_start || len <= self.start_cgap {
            0
        } else {
            self.gap(len - self.start_cgap)
        }
    }

    /// Cost of a deletion run of `len` bases that ends the alignment.
    pub fn trailing_deletion(&self, len: usize) -> i64 {
        if self.free_end || len <= self.end_cgap {
            0
        } else {
            self.gap(len - self.end_cgap)
        }
    }

    #[inline]
    fn weight(&self, a: u8, b: u8) -> i64 {
        if a == b {
            0
        } else {
            self.mismatch
        }
    }
}

/// Where a subproblem sits relative to the full alignment.
#[derive(Debug, Clone, Copy)]
struct Boundary {
    /// Open cost charged to a deletion that starts the subproblem.
    tb: i64,
    /// Open cost charged to a deletion that ends the subproblem.
    te: i64,
    at_start: bool,
    at_end: bool,
}

impl Boundary {
    fn whole(params: &DiffParams) -> Self {
        Self {
            tb: params.gap_open,
            te: params.gap_open,
            at_start: true,
            at_end: true,
        }
    }

    fn lead(&self, params: &DiffParams, len: usize) -> i64 {
        if len == 0 {
            0
        } else if self.at_start {
            params.leading_deletion(len)
        } else {
            self.tb + params.gap_extend * len as i64
        }
    }

    fn trail(&self, params: &DiffParams, len: usize) -> i64 {
        if len == 0 {
            0
        } else if self.at_end {
            params.trailing_deletion(len)
        } else {
            self.te + params.gap_extend * len as i64
        }
    }

    fn ins_lead(&self, params: &DiffParams, len: usize) -> i64 {
        if self.at_start && params.free_start {
            0
        } else {
            params.gap(len)
        }
    }

    fn ins_trail(&self, params: &DiffParams, len: usize) -> i64 {
        if self.at_end && params.free_end {
            0
        } else {
            params.gap(len)
        }
    }

    fn left(&self, te: i64) -> Self {
        Self {
            tb: self.tb,
            te,
            at_start: self.at_start,
            at_end: false,
        }
    }

    fn right(&self, tb: i64) -> Self {
        Self {
            tb,
            te: self.te,
            at_start: false,
            at_end: self.at_end,
        }
    }
}

/// How the optimal path crosses the middle row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Midpoint {
    /// Crosses at column `j` without a deletion spanning the middle rows.
    Diagonal(usize),
    /// A deletion at column `j` spans the middle row and the one below it.
    Deletion(usize),
    /// Deletes down the first column through the middle row, leaving it at `row`.
    LeadingDeletion(usize),
    /// Reaches the last column at `row` and deletes to the bottom.
    TrailingDeletion(usize),
}

/// Outcome of the single-row base case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SingleRow {
    DeleteThenInsert,
    InsertThenDelete,
    Align(usize),
}

struct Differ<'a> {
    a: &'a [u8],
    b: &'a [u8],
    params: &'a DiffParams,
    cc: Vec<i64>,
    dd: Vec<i64>,
    rr: Vec<i64>,
    ss: Vec<i64>,
    /// Forward cost of reaching the last column at each row above the midpoint.
    fwd_edge: Vec<i64>,
    /// Reverse cost of leaving the first column at each row below the midpoint.
    rev_edge: Vec<i64>,
    script: EditScript,
}

impl<'a> Differ<'a> {
    fn new(a: &'a [u8], b: &'a [u8], params: &'a DiffParams) -> Self {
        let n = b.len() + 1;
        Self {
            a,
            b,
            params,
            cc: vec![0; n],
            dd: vec![0; n],
            rr: vec![0; n],
            ss: vec![0; n],
            fwd_edge: Vec::with_capacity(a.len() / 2 + 1),
            rev_edge: Vec::with_capacity(a.len() / 2 + 2),
            script: EditScript::new(),
        }
    }

    fn solve(&mut self, a0: usize, a1: usize, b0: usize, b1: usize, bd: Boundary) -> i64 {
        let m = a1 - a0;
        let n = b1 - b0;
        let params = self.params;

        if n == 0 {
            self.script.push(EditKind::Del, m);
            return min(bd.lead(params, m), bd.trail(params, m));
        }
        if m == 0 {
            self.script.push(EditKind::Ins, n);
            return if (bd.at_start && params.free_start) || (bd.at_end && params.free_end) {
                0
            } else {
                params.gap(n)
            };
        }
        if m == 1 {
            return self.solve_single(a0, b0, b1, bd);
        }

        let midi = m / 2;
        self.forward(a0, midi, b0, b1, bd);
        self.reverse(a0, a1, midi, b0, b1, bd);
        let (cost, mid) = self.midpoint(m, n, midi, bd);

        let g = params.gap_open;
        match mid {
            Midpoint::Diagonal(j) => {
                self.solve(a0, a0 + midi, b0, b0 + j, bd.left(g));
                self.solve(a0 + midi, a1, b0 + j, b1, bd.right(g));
            }
            Midpoint::Deletion(j) => {
                self.solve(a0, a0 + midi - 1, b0, b0 + j, bd.left(0));
                self.script.push(EditKind::Del, 2);
                self.solve(a0 + midi + 1, a1, b0 + j, b1, bd.right(0));
            }
            Midpoint::LeadingDeletion(row) => {
                self.script.push(EditKind::Del, row);
                self.solve(a0 + row, a1, b0, b1, bd.right(g));
            }
            Midpoint::TrailingDeletion(row) => {
                self.solve(a0, a0 + row, b0, b1, bd.left(g));
                self.script.push(EditKind::Del, m - row);
            }
        }
        cost
    }

    fn solve_single(&mut self, a0: usize, b0: usize, b1: usize, bd: Boundary) -> i64 {
        let params = self.params;
        let n = b1 - b0;
        let ch = self.a[a0];

        let del_first = bd.lead(params, 1) + bd.ins_trail(params, n);
        let ins_first = bd.ins_lead(params, n) + bd.trail(params, 1);
        let (mut best, mut choice) = if ins_first < del_first {
            (ins_first, SingleRow::InsertThenDelete)
        } else {
            (del_first, SingleRow::DeleteThenInsert)
        };

        for j in 1..=n {
            let cost = bd.ins_lead(params, j - 1)
                + params.weight(ch, self.b[b0 + j - 1])
                + bd.ins_trail(params, n - j);
            if cost < best {
                best = cost;
                choice = SingleRow::Align(j);
            }
        }

        match choice {
            SingleRow::DeleteThenInsert => {
                self.script.push(EditKind::Del, 1);
                self.script.push(EditKind::Ins, n);
            }
            SingleRow::InsertThenDelete => {
                self.script.push(EditKind::Ins, n);
                self.script.push(EditKind::Del, 1);
            }
            SingleRow::Align(j) => {
                let kind = if ch == self.b[b0 + j - 1] {
                    EditKind::Mov
                } else {
                    EditKind::Sub
                };
                self.script.push(EditKind::Ins, j - 1);
                self.script.push(kind, 1);
                self.script.push(EditKind::Ins, n - j);
            }
        }
        best
    }

    /// Scores rows `a0..a0 + rows` top-down, leaving `cc`/`dd` at the last of them.
    fn forward(&mut self, a0: usize, rows: usize, b0: usize, b1: usize, bd: Boundary) {
        let Self {
            a,
            b,
            params,
            cc,
            dd,
            fwd_edge,
            ..
        } = self;
        let (a, b, params) = (*a, *b, *params);
        let n = b1 - b0;
        let g = params.gap_open;
        let h = params.gap_extend;

        for j in 0..=n {
            cc[j] = bd.ins_lead(params, j);
            dd[j] = cc[j] + g;
        }
        fwd_edge.clear();
        fwd_edge.push(cc[n]);

        for i in 1..=rows {
            let ai = a[a0 + i - 1];
            let mut s = cc[0];
            let mut c = bd.lead(params, i);
            cc[0] = c;
            let mut e = c + g;
            for j in 1..=n {
                e = min(e, c + g) + h;
                dd[j] = min(dd[j], cc[j] + g) + h;
                c = min(min(dd[j], e), s + params.weight(ai, b[b0 + j - 1]));
                s = cc[j];
                cc[j] = c;
            }
            fwd_edge.push(cc[n]);
        }
    }

    /// Scores rows `a0 + midi..a1` bottom-up, leaving `rr`/`ss` at row `midi`.
    fn reverse(&mut self, a0: usize, a1: usize, midi: usize, b0: usize, b1: usize, bd: Boundary) {
        let Self {
            a,
            b,
            params,
            rr,
            ss,
            rev_edge,
            ..
        } = self;
        let (a, b, params) = (*a, *b, *params);
        let m = a1 - a0;
        let n = b1 - b0;
        let g = params.gap_open;
        let h = params.gap_extend;

        for j in 0..=n {
            rr[j] = bd.ins_trail(params, n - j);
            ss[j] = rr[j] + g;
        }
        rev_edge.clear();
        rev_edge.resize(m - midi + 1, 0);
        rev_edge[m - midi] = rr[0];

        for i in (midi..m).rev() {
            let ai = a[a0 + i];
            let mut s = rr[n];
            let mut c = bd.trail(params, m - i);
            rr[n] = c;
            let mut e = c + g;
            for j in (0..n).rev() {
                e = min(e, c + g) + h;
                ss[j] = min(ss[j], rr[j] + g) + h;
                c = min(min(ss[j], e), s + params.weight(ai, b[b0 + j]));
                s = rr[j];
                rr[j] = c;
            }
            rev_edge[i - midi] = rr[0];
        }
    }

    /// Picks the cheapest crossing of row `midi`; the first minimum found wins.
    fn midpoint(&self, m: usize, n: usize, midi: usize, bd: Boundary) -> (i64, Midpoint) {
        let params = self.params;
        let mut best = self.cc[0] + self.rr[0];
        let mut mid = Midpoint::Diagonal(0);

        for j in 1..=n {
            let cost = self.cc[j] + self.rr[j];
            if cost < best {
                best = cost;
                mid = Midpoint::Diagonal(j);
            }
        }
        for j in (1..n).rev() {
            let cost = self.dd[j] + self.ss[j] - params.gap_open;
            if cost < best {
                best = cost;
                mid = Midpoint::Deletion(j);
            }
        }
        for (row, &reach) in self.fwd_edge.iter().enumerate() {
            let cost = reach + bd.trail(params, m - row);
            if cost < best {
                best = cost;
                mid = Midpoint::TrailingDeletion(row);
            }
        }
        for (k, &leave) in self.rev_edge.iter().enumerate() {
            let row = midi + k;
            let cost = bd.lead(params, row) + leave;
            if cost < best {
                best = cost;
                mid = Midpoint::LeadingDeletion(row);
            }
        }
        (best, mid)
    }
}

/// Aligns `a` (first sequence) against `b` (second sequence).
///
/// Returns the optimal cost and the raw, uncondensed edit script. Deleted
/// bases belong to `a`, inserted bases to `b`.
pub fn diff(a: &[u8], b: &[u8], params: &DiffParams) -> (i64, EditScript) {
    let mut differ = Differ::new(a, b, params);
    let cost = differ.solve(0, a.len(), 0, b.len(), Boundary::whole(params));
    (cost, differ.script)
}

/// Prices a condensed script under `params` the same way [`diff`] does.
pub fn script_cost(script: &EditScript, a: &[u8], b: &[u8], params: &DiffParams) -> i64 {
    let ops = script.ops();
    let last = ops.len().saturating_sub(1);
    let mut i = 0;
    let mut j = 0;
    let mut cost = 0;
    for (idx, op) in ops.iter().enumerate() {
        let first = idx == 0;
        let is_last = idx == last;
        match op.kind {
            EditKind::Sub | EditKind::Mov => {
                let mismatches = a[i..i + op.count]
                    .iter()
                    .zip(&b[j..j + op.count])
                    .filter(|(x, y)| x != y)
                    .count();
                cost += mismatches as i64 * params.mismatch;
                i += op.count;
                j += op.count;
            }
            EditKind::Del => {
                cost += match (first, is_last) {
                    (true, true) => min(
                        params.leading_deletion(op.count),
                        params.trailing_deletion(op.count),
                    ),
                    (true, false) => params.leading_deletion(op.count),
                    (false, true) => params.trailing_deletion(op.count),
                    (false, false) => params.gap(op.count),
                };
                i += op.count;
            }
            EditKind::Ins => {
                if !((first && params.free_start) || (is_last && params.free_end)) {
                    cost += params.gap(op.count);
                }
                j += op.count;
            }
            EditKind::Nop => {}
        }
    }
    cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn condensed(a: &[u8], b: &[u8], params: &DiffParams) -> (i64, EditScript) {
        let (cost, mut script) = diff(a, b, params);
        script.condense();
        (cost, script)
    }

    fn random_seq(rng: &mut StdRng, len: usize) -> Vec<u8> {
        (0..len).map(|_| b"ACGT"[rng.random_range(0..4)]).collect()
    }

    fn mutate(rng: &mut StdRng, seq: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(seq.len() + 8);
        for &base in seq {
            match rng.random_range(0..20) {
                0 => {}
                1 => out.push(b"ACGT"[rng.random_range(0..4)]),
                2 => {
                    out.push(base);
                    out.push(b"ACGT"[rng.random_range(0..4)]);
                }
                _ => out.push(base),
            }
        }
        out
    }

    fn levenshtein(a: &[u8], b: &[u8]) -> i64 {
        let mut prev: Vec<i64> = (0..=b.len() as i64).collect();
        for (i, &ca) in a.iter().enumerate() {
            let mut cur = vec![i as i64 + 1; b.len() + 1];
            for (j, &cb) in b.iter().enumerate() {
                let sub = prev[j] + i64::from(ca != cb);
                cur[j + 1] = sub.min(prev[j + 1] + 1).min(cur[j] + 1);
            }
            prev = cur;
        }
        prev[b.len()]
    }

    #[test]
    fn test_diff_empty_inputs() {
        let (cost, script) = condensed(b"", b"", &DiffParams::default());
        assert_eq!(cost, 0);
        assert!(script.is_empty());
    }

    #[test]
    fn test_diff_insert_only() {
        let (cost, script) = condensed(b"", b"ACGT", &DiffParams::default());
        assert_eq!(cost, 5);
        assert_eq!(script.to_string(), "4I");

        for (free_start, free_end) in [(true, false), (false, true), (true, true)] {
            let params = DiffParams {
                free_start,
                free_end,
                ..Default::default()
            };
            let (cost, script) = condensed(b"", b"ACGT", &params);
            assert_eq!(cost, 0);
            assert_eq!(script.to_string(), "4I");
        }
    }

    #[test]
    fn test_diff_delete_only() {
        let (cost, script) = condensed(b"ACG", b"", &DiffParams::default());
        assert_eq!(cost, 4);
        assert_eq!(script.to_string(), "3D");
    }

    #[test]
    fn test_diff_single_match() {
        let (cost, script) = condensed(b"A", b"A", &DiffParams::default());
        assert_eq!(cost, 0);
        assert_eq!(script.to_string(), "1M");
    }

    #[test]
    fn test_diff_single_mismatch_prefers_substitution() {
        let (cost, script) = condensed(b"A", b"C", &DiffParams::default());
        assert_eq!(cost, 1);
        assert_eq!(script.to_string(), "1X");
    }

    #[test]
    fn test_diff_single_base_against_run() {
        let params = DiffParams {
            mismatch: 3,
            ..Default::default()
        };
        let (cost, script) = condensed(b"G", b"AAGAA", &params);
        assert_eq!(cost, 6);
        assert_eq!(script.to_string(), "2I1M2I");
    }

    #[test]
    fn test_diff_affine_gap_is_single_run() {
        let params = DiffParams {
            gap_open: 4,
            gap_extend: 1,
            mismatch: 3,
            ..Default::default()
        };
        let (cost, script) = condensed(b"ACGTTTTTACGT", b"ACGTACGT", &params);
        assert_eq!(cost, 8);
        assert_eq!(script.len1(), 12);
        assert_eq!(script.len2(), 8);
        assert_eq!(script.total(EditKind::Del), 4);
        assert_eq!(
            script.iter().filter(|op| op.kind == EditKind::Del).count(),
            1
        );
    }

    #[test]
    fn test_diff_free_ends_absorb_overhangs() {
        let params = DiffParams {
            free_start: true,
            free_end: true,
            ..Default::default()
        };
        let (cost, script) = condensed(b"ACGTACGT", b"TTTTACGTACGTGGGG", &params);
        assert_eq!(cost, 0);
        assert_eq!(script.to_string(), "4I8M4I");
    }

    #[test]
    fn test_diff_forced_start_gap() {
        let params = DiffParams {
            start_cgap: 3,
            ..Default::default()
        };
        let (cost, script) = condensed(b"GGGACGT", b"ACGT", &params);
        assert_eq!(cost, 0);
        assert_eq!(script.to_string(), "3D4M");

        let (cost, _) = condensed(b"GGGACGT", b"ACGT", &DiffParams::default());
        assert_eq!(cost, 4);
    }

    #[test]
    fn test_diff_forced_end_gap() {
        let params = DiffParams {
            end_cgap: 3,
            ..Default::default()
        };
        let (cost, script) = condensed(b"ACGTCCC", b"ACGT", &params);
        assert_eq!(cost, 0);
        assert_eq!(script.to_string(), "4M3D");
    }

    #[test]
    fn test_diff_matches_edit_distance() {
        let params = DiffParams {
            gap_open: 0,
            gap_extend: 1,
            mismatch: 1,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let len_a = rng.random_range(0..40);
            let a = random_seq(&mut rng, len_a);
            let b = mutate(&mut rng, &a);
            let (cost, script) = condensed(&a, &b, &params);
            assert_eq!(cost, levenshtein(&a, &b));
            assert_eq!(script_cost(&script, &a, &b, &params), cost);
        }
    }

    #[test]
    fn test_diff_cost_matches_script() {
        let mut rng = StdRng::seed_from_u64(11);
        for round in 0..300 {
            let params = DiffParams {
                gap_open: rng.random_range(0..5),
                gap_extend: rng.random_range(1..3),
                mismatch: rng.random_range(1..4),
                free_start: round % 4 == 1 || round % 4 == 3,
                free_end: round % 4 == 2 || round % 4 == 3,
                start_cgap: if round % 5 == 0 { rng.random_range(0..4) } else { 0 },
                end_cgap: if round % 7 == 0 { rng.random_range(0..4) } else { 0 },
            };
            let len_a = rng.random_range(0..50);
            let len_b = rng.random_range(0..50);
            let a = random_seq(&mut rng, len_a);
            let b = if round % 2 == 0 {
                mutate(&mut rng, &a)
            } else {
                random_seq(&mut rng, len_b)
            };
            let (cost, script) = condensed(&a, &b, &params);
            assert_eq!(script.len1(), a.len());
            assert_eq!(script.len2(), b.len());
            assert_eq!(
                script_cost(&script, &a, &b, &params),
                cost,
                "a={} b={} script={} params={:?}",
                String::from_utf8_lossy(&a),
                String::from_utf8_lossy(&b),
                script,
                params
            );
        }
    }

    #[test]
    fn test_diff_mov_runs_are_exact_matches() {
        let mut rng = StdRng::seed_from_u64(3);
        let a = random_seq(&mut rng, 120);
        let b = mutate(&mut rng, &a);
        let (_, script) = condensed(&a, &b, &DiffParams::default());
        let (mut i, mut j) = (0, 0);
        for op in &script {
            match op.kind {
                EditKind::Mov => assert_eq!(a[i..i + op.count], b[j..j + op.count]),
                EditKind::Sub => assert!((0..op.count).all(|t| a[i + t] != b[j + t])),
                _ => {}
            }
            if op.kind.consumes_first() {
                i += op.count;
            }
            if op.kind.consumes_second() {
                j += op.count;
            }
        }
    }
}
