//! Splices a chain of independently found local alignment pieces into one
//! signed gap trace.
//!
//! Pieces come from a local overlapper and may overlap one another in either
//! sequence. Before a piece is emitted, every later piece that overlaps it is
//! either pseudo-deleted (when one piece contains the other) or trimmed back
//! at the cut point with the fewest mismatches. Gaps between surviving pieces
//! are then written as runs of trace entries and each piece is realigned with
//! the O(ND) reverse-wave aligner.
//!
//! Chain coordinates are 1-based half-open (`abpos..aepos`), the convention of
//! the trace format; [`LocalOverlap::from_segments`] converts from 0-based
//! overlapper output.

use super::okn::{okn_align, OknTrace};
use crate::utils::Result;
use std::fmt;

const GAP: u8 = b'-';

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocalSegment {
    pub abpos: i32,
    pub aepos: i32,
    pub bbpos: i32,
    pub bepos: i32,
    /// Fraction of differences observed when the piece was found.
    pub error: f64,
}

impl LocalSegment {
    pub fn new(abpos: i32, aepos: i32, bbpos: i32, bepos: i32, error: f64) -> Self {
        Self {
            abpos,
            aepos,
            bbpos,
            bepos,
            error,
        }
    }

    fn collapsed_at(aepos: i32, bepos: i32, error: f64) -> Self {
        Self::new(aepos, aepos, bepos, bepos, error)
    }
}

/// One chain record: the gap preceding a piece, then the piece itself.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocalChain {
    pub piece: LocalSegment,
    pub agap: i32,
    pub bgap: i32,
}

impl LocalChain {
    /// Pseudo-deleted records have no gaps and an empty span.
    pub fn is_deleted(&self) -> bool {
        self.agap == 0
            && self.bgap == 0
            && self.piece.abpos == self.piece.aepos
            && self.piece.bbpos == self.piece.bepos
    }
}

/// A chain of `num_pieces` pieces plus a sentinel record holding the
/// trailing gap.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalOverlap {
    /// Leading hang: positive when `a` starts first, negative when `b` does.
    pub begpos: i32,
    /// Trailing hang: positive when `b` ends last, negative when `a` does.
    pub endpos: i32,
    pub chain: Vec<LocalChain>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrace {
    pub ahang: i32,
    pub bhang: i32,
    /// Zero-terminated signed gap trace.
    pub trace: Vec<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalParams {
    /// Emit the smaller of two facing gap blocks first.
    pub use_size_to_order_blocks: bool,
    pub max_gaps: usize,
    pub max_beg_gap: i32,
    pub max_end_gap: i32,
    pub max_interior_gap: i32,
    /// Unaligned end bases tolerated before an end gap counts against the
    /// begin/end limits.
    pub max_free_flap: i32,
    /// Apply the flap rules instead of the symmetric end-gap rules.
    pub asymmetric_ends: bool,
    /// Chains at or above this error rate have their end gaps checked.
    pub error_rate: f64,
}

impl Default for LocalParams {
    fn default() -> Self {
        Self {
            use_size_to_order_blocks: true,
            max_gaps: 3,
            max_beg_gap: 200,
            max_end_gap: 200,
            max_interior_gap: 400,
            max_free_flap: 20,
            asymmetric_ends: false,
            error_rate: 0.06,
        }
    }
}

/// Which of the two pieces handed to [`fix_overlapping_pieces`] could not be
/// realigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceFailure {
    First,
    Second,
}

impl fmt::Display for PieceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PieceFailure::First => write!(f, "first piece failed to realign"),
            PieceFailure::Second => write!(f, "second piece failed to realign"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapRejection {
    BeginFlap(i32),
    EndFlap(i32),
    BeginGap(i32),
    EndGap(i32),
    InteriorGap { piece: usize, gap: i32 },
    TooManyPieces(usize),
}

impl fmt::Display for GapRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GapRejection::BeginFlap(n) => write!(f, "unaligned flap of {} bases at start", n),
            GapRejection::EndFlap(n) => write!(f, "unaligned flap of {} bases at end", n),
            GapRejection::BeginGap(n) => write!(f, "begin gap of {} bases", n),
            GapRejection::EndGap(n) => write!(f, "end gap of {} bases", n),
            GapRejection::InteriorGap { piece, gap } => {
                write!(f, "interior gap of {} bases before piece {}", gap, piece)
            }
            GapRejection::TooManyPieces(n) => write!(f, "too many pieces ({})", n),
        }
    }
}

/// Gapped rendering of one piece's alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairAlign {
    pub aseg: Vec<u8>,
    pub bseg: Vec<u8>,
}

impl LocalOverlap {
    /// Builds a chain from 0-based half-open overlapper segments, ordered by
    /// their position along `a`.
    ///
    /// The first and last records get a symmetric gap equal to the shorter
    /// unaligned end, the hangs come from the outermost segments, and all
    /// pieces are shifted to 1-based coordinates.
    pub fn from_segments(segments: &[LocalSegment], alen: usize, blen: usize) -> Result<Self> {
        let (first, last) = match (segments.first(), segments.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err("Local overlap needs at least one segment".to_string()),
        };
        let (alen, blen) = (alen as i32, blen as i32);

        for seg in segments {
            if seg.abpos < 0 || seg.bbpos < 0 || seg.aepos < seg.abpos || seg.bepos < seg.bbpos {
                return Err(format!("Malformed local segment {:?}", seg));
            }
            if seg.aepos > alen || seg.bepos > blen {
                return Err(format!(
                    "Local segment {:?} exceeds sequence lengths {}/{}",
                    seg, alen, blen
                ));
            }
        }

        let mut chain = Vec::with_capacity(segments.len() + 1);
        let lead = first.abpos.min(first.bbpos);
        for (i, seg) in segments.iter().enumerate() {
            let (agap, bgap) = if i == 0 {
                (lead, lead)
            } else {
                (
                    seg.abpos - segments[i - 1].aepos,
                    seg.bbpos - segments[i - 1].bepos,
                )
            };
            chain.push(LocalChain {
                piece: LocalSegment::new(
                    seg.abpos + 1,
                    seg.aepos + 1,
                    seg.bbpos + 1,
                    seg.bepos + 1,
                    seg.error,
                ),
                agap,
                bgap,
            });
        }
        let trail = (alen - last.aepos).min(blen - last.bepos);
        chain.push(LocalChain {
            piece: LocalSegment::new(-1, -1, -1, -1, 0.0),
            agap: trail,
            bgap: trail,
        });

        Ok(Self {
            begpos: first.abpos - first.bbpos,
            endpos: (blen - last.bepos) - (alen - last.aepos),
            chain,
        })
    }

    pub fn num_pieces(&self) -> usize {
        self.chain.len() - 1
    }

    /// Checks the chain against the gap limits of `params`.
    pub fn check_gaps(&self, params: &LocalParams) -> std::result::Result<(), GapRejection> {
        let n = self.num_pieces();
        let head = self.chain[0];
        let tail = self.chain[n];

        let overa = (self.chain[n - 1].piece.aepos + tail.agap) - (head.piece.abpos - head.agap);
        let overb = (self.chain[n - 1].piece.bepos + tail.bgap) - (head.piece.bbpos - head.bgap);
        let length = ((overa + overb) / 2).max(1) as f64;
        let diffs: f64 = self.chain[..n]
            .iter()
            .map(|c| {
                let p = c.piece;
                let seglen = 1 + (p.aepos - p.abpos + (p.bepos - p.bbpos).abs()) / 2;
                c.piece.error.max(0.0) * seglen as f64
            })
            .sum();

        if diffs / length >= params.error_rate {
            if params.asymmetric_ends {
                if head.bgap > params.max_free_flap
                    && head.bgap + (-self.begpos).max(0) > params.max_beg_gap
                {
                    return Err(GapRejection::BeginFlap(head.bgap));
                }
                if tail.agap > params.max_free_flap
                    && tail.agap + (-self.endpos).max(0) > params.max_end_gap
                {
                    return Err(GapRejection::EndFlap(tail.agap));
                }
            } else {
                let beg = head.agap.min(head.bgap);
                if beg > params.max_beg_gap {
                    return Err(GapRejection::BeginGap(beg));
                }
                let end = tail.agap.min(tail.bgap);
                if end > params.max_end_gap {
                    return Err(GapRejection::EndGap(end));
                }
            }
        }

        for (piece, c) in self.chain.iter().enumerate().take(n).skip(1) {
            let gap = c.agap.max(c.bgap);
            if gap > params.max_interior_gap {
                return Err(GapRejection::InteriorGap { piece, gap });
            }
        }

        let mut pieces = self.chain[..n]
            .iter()
            .filter(|c| c.piece.abpos < c.piece.aepos)
            .count() as i64;
        if head.bgap == 0 {
            pieces -= 1;
        }
        if tail.agap > 0 {
            pieces += 1;
        }
        if pieces > params.max_gaps as i64 {
            return Err(GapRejection::TooManyPieces(pieces.max(0) as usize));
        }
        Ok(())
    }

    fn live_before(&self, k: usize) -> usize {
        let mut l = k - 1;
        while l > 0 && self.chain[l].is_deleted() {
            l -= 1;
        }
        l
    }

    /// Removes piece `i`, which starts after an overlapping piece `k`.
    fn delete_first(&mut self, i: usize, k: usize, lastgood: Option<usize>) {
        let (aend, bend) = match lastgood {
            Some(l) => (self.chain[l].piece.aepos, self.chain[l].piece.bepos),
            None => (0, 0),
        };
        let error = self.chain[i].piece.error;
        self.chain[i] = LocalChain {
            piece: LocalSegment::collapsed_at(aend, bend, error),
            agap: 0,
            bgap: 0,
        };
        let next = &mut self.chain[k];
        next.agap = next.piece.abpos - aend;
        next.bgap = next.piece.bbpos - bend;
        if lastgood.is_none() {
            next.agap -= 1;
            next.bgap -= 1;
        }
    }

    /// Removes piece `k`, contained in piece `i`, and regaps its successor
    /// against the closest surviving predecessor.
    fn delete_second(&mut self, i: usize, k: usize) {
        let (aend, bend) = (self.chain[i].piece.aepos, self.chain[i].piece.bepos);
        let error = self.chain[k].piece.error;
        self.chain[k] = LocalChain {
            piece: LocalSegment::collapsed_at(aend, bend, error),
            agap: 0,
            bgap: 0,
        };
        if k < self.num_pieces() {
            let l = self.live_before(k);
            let (aend, bend) = (self.chain[l].piece.aepos, self.chain[l].piece.bepos);
            let next = &mut self.chain[k + 1];
            next.agap = next.piece.abpos - aend;
            next.bgap = next.piece.bbpos - bend;
        }
    }

    /// Removes piece `i` after trimming left it empty, regapping the first
    /// surviving piece up to `k`.
    fn delete_emptied(&mut self, i: usize, k: usize, lastgood: Option<usize>) {
        let (aend, bend) = match lastgood {
            Some(l) => (self.chain[l].piece.aepos, self.chain[l].piece.bepos),
            None => (0, 0),
        };
        let error = self.chain[i].piece.error;
        self.chain[i] = LocalChain {
            piece: LocalSegment::collapsed_at(aend, bend, error),
            agap: 0,
            bgap: 0,
        };
        if let Some(l) = (i + 1..=k).find(|&l| !self.chain[l].is_deleted()) {
            let next = &mut self.chain[l];
            next.agap = next.piece.abpos - aend;
            next.bgap = next.piece.bbpos - bend;
            if lastgood.is_none() {
                next.agap -= 1;
                next.bgap -= 1;
            }
        }
    }
}

/// Realigns one piece, folding any shift of its start into the preceding
/// gap. Returns `None` when the piece cannot be aligned within its budget.
pub fn get_trace(a: &[u8], b: &[u8], overlap: &mut LocalOverlap, piece: usize) -> Option<Vec<i32>> {
    let seg = overlap.chain[piece].piece;
    let aseg = &a[(seg.abpos - 1) as usize..(seg.aepos - 1) as usize];
    let bseg = &b[(seg.bbpos - 1) as usize..(seg.bepos - 1) as usize];
    let segdiff = ((seg.aepos - seg.abpos) as f64 * (1.5 * seg.error.max(0.0)) + 10.0) as usize;

    let OknTrace { mut trace, spnt } = okn_align(aseg, bseg, 0, segdiff)?;

    let record = &mut overlap.chain[piece];
    if spnt > 0 {
        record.agap += spnt;
        record.piece.abpos += spnt;
        for t in trace.iter_mut().filter(|t| **t < 0) {
            *t += spnt;
        }
    } else if spnt < 0 {
        record.bgap -= spnt;
        record.piece.bbpos -= spnt;
        for t in trace.iter_mut().filter(|t| **t > 0) {
            *t += spnt;
        }
    }
    Some(trace)
}

/// Renders a piece and its trace as two gapped rows.
pub fn construct_pair_align(a: &[u8], b: &[u8], piece: &LocalSegment, trace: &[i32]) -> PairAlign {
    let (starta, startb) = (piece.abpos, piece.bbpos);
    let (mut offseta, mut offsetb) = (starta, startb);
    let mut aseg = Vec::new();
    let mut bseg = Vec::new();

    for &t in trace.iter().take_while(|t| **t != 0) {
        if t < 0 {
            while offseta < -t + starta - 1 {
                aseg.push(a[(offseta - 1) as usize]);
                offseta += 1;
            }
            aseg.push(GAP);
        } else {
            while offsetb < t + startb - 1 {
                bseg.push(b[(offsetb - 1) as usize]);
                offsetb += 1;
            }
            bseg.push(GAP);
        }
    }
    while offseta < piece.aepos {
        aseg.push(a[(offseta - 1) as usize]);
        offseta += 1;
    }
    while offsetb < piece.bepos {
        bseg.push(b[(offsetb - 1) as usize]);
        offsetb += 1;
    }
    PairAlign { aseg, bseg }
}

fn column(row: &[u8], idx: isize) -> u8 {
    if idx < 0 {
        0
    } else {
        row.get(idx as usize).copied().unwrap_or(0)
    }
}

fn advances(row: &[u8], idx: isize) -> i32 {
    (column(row, idx) != GAP) as i32
}

fn mismatch(pair: &PairAlign, idx: isize) -> i32 {
    (column(&pair.aseg, idx) != column(&pair.bseg, idx)) as i32
}

/// Resolves the overlap between pieces `piece0` and `piece1` by moving the
/// boundary to the cut with the fewest mismatches on either side.
///
/// Containment discovered after realignment pseudo-deletes the contained
/// piece. A piece that cannot be realigned is reported as an error so the
/// caller can delete it.
pub fn fix_overlapping_pieces(
    a: &[u8],
    b: &[u8],
    overlap: &mut LocalOverlap,
    piece0: usize,
    piece1: usize,
) -> std::result::Result<(), PieceFailure> {
    let trace0 = get_trace(a, b, overlap, piece0).ok_or(PieceFailure::First)?;
    let trace1 = get_trace(a, b, overlap, piece1).ok_or(PieceFailure::Second)?;
    let first = overlap.chain[piece0].piece;
    let second = overlap.chain[piece1].piece;
    let align1 = construct_pair_align(a, b, &first, &trace0);
    let align2 = construct_pair_align(a, b, &second, &trace1);

    if !(first.aepos > second.abpos || first.bepos > second.bbpos) {
        log::trace!("Overlap of pieces {} and {} vanished on realignment", piece0, piece1);
        return Ok(());
    }

    if first.aepos > second.aepos || first.bepos > second.bepos {
        log::debug!("Piece {} contained in piece {} after realignment", piece1, piece0);
        overlap.chain[piece1] = LocalChain {
            piece: LocalSegment::collapsed_at(first.aepos, first.bepos, second.error),
            agap: 0,
            bgap: 0,
        };
        if piece1 < overlap.num_pieces() {
            let next = &mut overlap.chain[piece1 + 1];
            next.agap = next.piece.abpos - first.aepos;
            next.bgap = next.piece.bbpos - first.bepos;
        }
        return Ok(());
    }

    if first.abpos > second.abpos || first.bbpos > second.bbpos {
        log::debug!("Piece {} contained in piece {} after realignment", piece0, piece1);
        let (aend, bend) = if piece0 > 0 {
            let prev = overlap.chain[piece0 - 1].piece;
            (prev.aepos, prev.bepos)
        } else {
            (0, 0)
        };
        overlap.chain[piece0] = LocalChain {
            piece: LocalSegment::collapsed_at(aend, bend, first.error),
            agap: 0,
            bgap: 0,
        };
        let next = &mut overlap.chain[piece1];
        next.agap = next.piece.abpos - aend;
        next.bgap = next.piece.bbpos - bend;
        return Ok(());
    }

    // Walk the first alignment up to the column where the second piece can
    // begin to overlap it.
    let mut offseta1 = first.abpos - 1;
    let mut offsetb1 = first.bbpos - 1;
    let mut into1: isize = -1;
    while offseta1 < second.abpos && offsetb1 < second.bbpos {
        into1 += 1;
        offseta1 += advances(&align1.aseg, into1);
        offsetb1 += advances(&align1.bseg, into1);
    }

    let mut errs2: i32 = (0..align2.aseg.len() as isize).map(|i| mismatch(&align2, i)).sum();
    let mut into2: isize = 0;
    let mut errs1 = mismatch(&align1, into1);
    let mut minerrs = errs2;
    let mut offseta2 = second.abpos;
    let mut offsetb2 = second.bbpos;
    let mut bestend1a = offseta1 - advances(&align1.aseg, into1);
    let mut bestend1b = offsetb1 - advances(&align1.bseg, into1);
    let mut bestbeg2a = offseta2;
    let mut bestbeg2b = offsetb2;
    let mut bestinto1 = into1 - 1;
    let mut bestinto2: isize = 0;

    while column(&align1.aseg, into1) != 0 && column(&align2.aseg, into2) != 0 {
        while offseta1 >= offseta2 || offsetb1 >= offsetb2 {
            errs2 -= mismatch(&align2, into2);
            offseta2 += advances(&align2.aseg, into2);
            offsetb2 += advances(&align2.bseg, into2);
            into2 += 1;
            if column(&align2.aseg, into2) == 0 {
                break;
            }
        }

        if errs1 + errs2 <= minerrs && mismatch(&align1, into1) == 0 {
            minerrs = errs1 + errs2;
            bestend1a = offseta1;
            bestend1b = offsetb1;
            bestbeg2a = offseta2;
            bestbeg2b = offsetb2;
            bestinto1 = into1;
            bestinto2 = into2;
        }

        while offseta1 < offseta2 && offsetb1 < offsetb2 {
            into1 += 1;
            offseta1 += advances(&align1.aseg, into1);
            offsetb1 += advances(&align1.bseg, into1);
            if column(&align1.aseg, into1) == 0 {
                break;
            }
            errs1 += mismatch(&align1, into1);
        }
    }

    if bestend1a < first.aepos {
        bestend1a += 1;
    }
    if bestend1b < first.bepos {
        bestend1b += 1;
    }

    // Trim mismatches left hanging at the new boundary.
    while bestinto1 >= 0 && mismatch(&align1, bestinto1) != 0 {
        bestend1a -= advances(&align1.aseg, bestinto1);
        bestend1b -= advances(&align1.bseg, bestinto1);
        bestinto1 -= 1;
    }
    while column(&align2.aseg, bestinto2) != 0 && mismatch(&align2, bestinto2) != 0 {
        bestbeg2a += advances(&align2.aseg, bestinto2);
        bestbeg2b += advances(&align2.bseg, bestinto2);
        bestinto2 += 1;
    }

    overlap.chain[piece0].piece.aepos = bestend1a;
    overlap.chain[piece0].piece.bepos = bestend1b;
    let next = &mut overlap.chain[piece1];
    next.piece.abpos = bestbeg2a;
    next.piece.bbpos = bestbeg2b;
    next.agap = bestbeg2a - bestend1a;
    next.bgap = bestbeg2b - bestend1b;
    log::trace!(
        "Pieces {} and {} cut at a={} b={} with {} mismatches",
        piece0,
        piece1,
        bestend1a,
        bestend1b,
        minerrs
    );
    Ok(())
}

fn align_segment(aseg: &[u8], bseg: &[u8], segdiff: usize) -> Option<OknTrace> {
    let limit = (aseg.len() + bseg.len()).max(1);
    let mut budget = segdiff.clamp(1, limit);
    loop {
        if let Some(res) = okn_align(aseg, bseg, 0, budget) {
            return Some(res);
        }
        if budget >= limit {
            return None;
        }
        budget = (budget * 2).min(limit);
    }
}

fn push_run(trace: &mut Vec<i32>, value: i32, count: i32) {
    trace.extend(std::iter::repeat(value).take(count.max(0) as usize));
}

/// Resolves overlaps in the chain and builds the spliced trace of `a`
/// against `b`.
pub fn local_trace(
    overlap: &mut LocalOverlap,
    a: &[u8],
    b: &[u8],
    params: &LocalParams,
) -> Result<LocalTrace> {
    let n = overlap.num_pieces();
    if n == 0 {
        return Err("Local overlap has no pieces".to_string());
    }
    for (i, c) in overlap.chain[..n].iter().enumerate() {
        let p = c.piece;
        if c.is_deleted() {
            continue;
        }
        if p.abpos < 1 || p.bbpos < 1 || p.aepos < p.abpos || p.bepos < p.bbpos {
            return Err(format!("Piece {} has malformed coordinates {:?}", i, p));
        }
        if p.aepos - 1 > a.len() as i32 || p.bepos - 1 > b.len() as i32 {
            return Err(format!("Piece {} runs past the end of its sequences", i));
        }
    }

    overlap.chain[n].piece.abpos = overlap.chain[n].agap + overlap.chain[n - 1].piece.aepos;
    overlap.chain[n].piece.bbpos = overlap.chain[n].bgap + overlap.chain[n - 1].piece.bepos;

    let mut trace = Vec::new();
    let mut lastgood: Option<usize> = None;

    for i in 0..=n {
        if overlap.chain[i].is_deleted() {
            continue;
        }

        let mut k = i + 1;
        while k < n {
            if overlap.chain[k].is_deleted() {
                k += 1;
                continue;
            }
            let pi = overlap.chain[i].piece;
            let pk = overlap.chain[k].piece;
            if pk.abpos < pi.aepos || pk.bbpos < pi.bepos {
                if pi.abpos > pk.abpos || pi.bbpos > pk.bbpos {
                    log::debug!("Dropping piece {}: starts after overlapping piece {}", i, k);
                    overlap.delete_first(i, k, lastgood);
                } else if pi.aepos > pk.aepos || pi.bepos > pk.bepos {
                    log::debug!("Dropping piece {}: contained in piece {}", k, i);
                    overlap.delete_second(i, k);
                } else {
                    match fix_overlapping_pieces(a, b, overlap, i, k) {
                        Ok(()) => {
                            let pi = overlap.chain[i].piece;
                            let pk = overlap.chain[k].piece;
                            if pk.abpos == pk.aepos || pk.bbpos == pk.bepos {
                                overlap.delete_second(i, k);
                            } else if pi.abpos == pi.aepos || pi.bbpos == pi.bepos {
                                log::warn!("Piece {} emptied while trimming against piece {}", i, k);
                                overlap.delete_emptied(i, k, lastgood);
                            }
                        }
                        Err(PieceFailure::Second) => {
                            log::warn!("Dropping piece {}: {}", k, PieceFailure::Second);
                            overlap.delete_second(i, k);
                        }
                        Err(PieceFailure::First) => {
                            log::warn!("Dropping piece {}: {}", i, PieceFailure::First);
                            overlap.delete_emptied(i, k, lastgood);
                        }
                    }
                }
            }
            k += 1;
        }

        if overlap.chain[i].is_deleted() {
            continue;
        }

        let first = i == 0 || lastgood.is_none();
        let mut abeg = if i != n {
            overlap.chain[i].piece.abpos
        } else {
            match lastgood {
                Some(l) => overlap.chain[l].piece.aepos + overlap.chain[i].agap,
                None => return Err("No aligned piece survived overlap resolution".to_string()),
            }
        };

        // No gaps may precede the start of b.
        if first && overlap.chain[i].bgap > 0 {
            if overlap.begpos >= 0 {
                let record = &mut overlap.chain[i];
                overlap.begpos = record.piece.abpos - 1;
                record.agap = 0;
                if record.bgap != record.piece.bbpos - 1 {
                    log::debug!(
                        "Leading gap {} of piece {} disagrees with its start {}",
                        record.bgap,
                        i,
                        record.piece.bbpos
                    );
                }
                if lastgood.is_none() {
                    record.bgap = record.piece.bbpos - 1;
                }
            } else {
                if i == 0 {
                    overlap.begpos -= overlap.chain[i].bgap;
                } else {
                    overlap.begpos = -overlap.chain[i].bgap;
                }
                overlap.chain[i].bgap = 0;
            }
        }

        if i == n {
            let record = &mut overlap.chain[i];
            if overlap.endpos >= 0 {
                overlap.endpos += record.bgap;
                record.bgap = 0;
            } else {
                overlap.endpos -= record.agap;
                abeg -= record.agap;
                record.agap = 0;
            }
        }

        let mut bbeg = match lastgood {
            Some(l) if !first => overlap.chain[l].piece.bepos,
            _ => 1 - overlap.begpos.min(0),
        };

        // Tuck the shorter tail into a gap before the longer one.
        if i == n {
            let record = &mut overlap.chain[i];
            if overlap.endpos < 0 {
                record.agap += -overlap.endpos;
            } else {
                record.bgap += overlap.endpos;
            }
            if record.agap <= record.bgap {
                overlap.endpos = record.bgap;
                record.bgap = 0;
            } else {
                overlap.endpos = -record.agap;
                record.agap = 0;
            }
        }

        let LocalChain { agap, bgap, .. } = overlap.chain[i];
        if agap <= bgap || !params.use_size_to_order_blocks {
            push_run(&mut trace, bbeg, agap);
            push_run(&mut trace, -abeg, bgap);
        } else {
            abeg -= agap;
            bbeg += bgap;
            push_run(&mut trace, -abeg, bgap);
            push_run(&mut trace, bbeg, agap);
        }

        if i == n {
            break;
        }

        let seg = overlap.chain[i].piece;
        let (abeg, bbeg) = (seg.abpos, seg.bbpos);
        let aseg = &a[(abeg - 1) as usize..(seg.aepos - 1) as usize];
        let bseg = &b[(bbeg - 1) as usize..(seg.bepos - 1) as usize];
        let segdiff = 1 + ((seg.aepos - seg.abpos) as f64 * 1.5 * seg.error.max(0.0)) as usize;
        let aligned = align_segment(aseg, bseg, segdiff)
            .ok_or_else(|| format!("Piece {} failed to align", i))?;

        let spnt = aligned.spnt;
        let record = &mut overlap.chain[i];
        if spnt > 0 {
            record.agap += spnt;
            record.piece.abpos += spnt;
            push_run(&mut trace, bbeg, spnt);
        } else {
            record.bgap -= spnt;
            record.piece.bbpos -= spnt;
            push_run(&mut trace, -abeg, -spnt);
        }
        for &t in aligned.gaps() {
            if t < 0 {
                trace.push(-abeg + t + 1);
            } else {
                trace.push(bbeg + t - 1);
            }
        }

        lastgood = Some(i);
    }

    trace.push(0);
    Ok(LocalTrace {
        ahang: overlap.begpos,
        bhang: overlap.endpos,
        trace,
    })
}
