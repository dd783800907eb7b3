//! Per-tig consensus: reads are spliced one at a time into a growing
//! multi-alignment, each aligned against the current column calls.

use super::{Abacus, BeadId, MultiAlignId, SeqId};
use crate::align::{halign, DiffParams, EditKind, Halignment};
use crate::utils::{reverse_complement, Result};

/// Column calls of a multi-alignment along with their call beads.
///
/// Lowercase calls mark columns where gaps outvote every base.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frankenstein {
    pub bases: Vec<u8>,
    pub beads: Vec<BeadId>,
}

impl Frankenstein {
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }
}

impl Abacus {
    /// Calls every column by majority vote and renumbers the columns.
    pub fn rebuild(&mut self, ma: MultiAlignId) -> Frankenstein {
        self.renumber(ma);
        let columns = self.multi_align(ma).columns.clone();
        let mut frank = Frankenstein {
            bases: Vec::with_capacity(columns.len()),
            beads: Vec::with_capacity(columns.len()),
        };
        for col in columns {
            let counts = self.base_counts(col);
            let mut best = 0;
            let mut call = b'N';
            for (slot, &base) in b"ACGT".iter().enumerate() {
                if counts[slot] > best {
                    best = counts[slot];
                    call = base;
                }
            }
            if counts[5] > best {
                call = call.to_ascii_lowercase();
            }
            self.set_call(col, call);
            frank.bases.push(call);
            frank.beads.push(self.column(col).call);
        }
        frank
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutRead {
    pub name: String,
    pub seq: Vec<u8>,
    /// Approximate tig coordinates; `bgn > end` marks a reverse-strand read.
    pub bgn: i64,
    pub end: i64,
}

impl LayoutRead {
    pub fn is_reverse(&self) -> bool {
        self.bgn > self.end
    }

    fn span(&self) -> (i64, i64) {
        (self.bgn.min(self.end), self.bgn.max(self.end))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsensusParams {
    /// Maximum error rate of an accepted read alignment.
    pub error_rate: f64,
    /// Minimum aligned length, and minimum layout overlap with a placed read.
    pub min_overlap: usize,
    /// Least amount of extra consensus aligned to on either side.
    pub slop: usize,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            error_rate: 0.06,
            min_overlap: 40,
            slop: 10,
        }
    }
}

impl ConsensusParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.error_rate > 0.0 && self.error_rate < 1.0) {
            return Err(format!("Error rate {} must be in (0, 1)", self.error_rate));
        }
        if self.min_overlap == 0 {
            return Err("Minimum overlap must be at least 1".to_string());
        }
        Ok(())
    }

    fn pad(&self) -> i64 {
        (self.error_rate * 500.0 / 3.0) as i64
    }
}

/// Where a read ended up, in consensus coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPlacement {
    pub name: String,
    pub span: Option<(usize, usize)>,
    pub reverse: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TigResult {
    pub name: String,
    pub consensus: Vec<u8>,
    pub placements: Vec<ReadPlacement>,
}

impl TigResult {
    pub fn num_placed(&self) -> usize {
        self.placements.iter().filter(|p| p.span.is_some()).count()
    }
}

/// A read alignment accepted for splicing.
struct Placement {
    ahang: i32,
    trace: Vec<i32>,
}

/// Gap runs at the ends of an alignment and its interior error count.
struct AlignmentSummary {
    lead_hang: usize,
    trail_hang: usize,
    errors: usize,
    length: usize,
}

impl AlignmentSummary {
    fn new(aln: &Halignment) -> Self {
        let ops = aln.ops().collect::<Vec<_>>();
        let is_gap = |kind: EditKind| matches!(kind, EditKind::Ins | EditKind::Del);
        let lead = ops.iter().take_while(|op| is_gap(op.kind)).count();
        let trail = ops[lead..].iter().rev().take_while(|op| is_gap(op.kind)).count();

        let lead_hang = match ops.first() {
            Some(op) if op.kind == EditKind::Ins => op.count,
            _ => 0,
        };
        let trail_hang = match ops.last() {
            Some(op) if op.kind == EditKind::Ins && ops.len() > 1 => op.count,
            _ => 0,
        };

        let (mut errors, mut span1, mut span2) = (0, 0, 0);
        for op in &ops[lead..ops.len() - trail] {
            if op.kind != EditKind::Mov {
                errors += op.count;
            }
            if op.kind.consumes_first() {
                span1 += op.count;
            }
            if op.kind.consumes_second() {
                span2 += op.count;
            }
        }
        Self {
            lead_hang,
            trail_hang,
            errors,
            length: (span1 + span2) / 2,
        }
    }

    fn error_rate(&self) -> f64 {
        if self.length == 0 {
            1.0
        } else {
            self.errors as f64 / self.length as f64
        }
    }
}

pub struct TigConsensus<'a> {
    name: String,
    params: &'a ConsensusParams,
    abacus: Abacus,
    ma: MultiAlignId,
    frank: Frankenstein,
    reads: Vec<LayoutRead>,
    seqs: Vec<Option<SeqId>>,
    cnspos: Vec<Option<(i64, i64)>>,
}

impl<'a> TigConsensus<'a> {
    /// Seeds the multi-alignment with the leftmost read of the layout.
    pub fn new(name: &str, mut reads: Vec<LayoutRead>, params: &'a ConsensusParams) -> Result<Self> {
        params.validate()?;
        if let Some(read) = reads.iter().find(|r| r.seq.is_empty()) {
            return Err(format!("Read {} of tig {} has no bases", read.name, name));
        }
        reads.sort_by_key(|r| r.span());
        for read in reads.iter_mut().filter(|r| r.is_reverse()) {
            read.seq = reverse_complement(&read.seq);
        }

        let mut abacus = Abacus::new();
        let first = reads
            .first()
            .ok_or_else(|| format!("Tig {} has no reads", name))?;
        let seed = abacus.add_sequence(&first.name, &first.seq)?;
        let ma = abacus.add_multi_align(seed);
        let frank = abacus.rebuild(ma);

        let mut seqs = vec![None; reads.len()];
        let mut cnspos = vec![None; reads.len()];
        seqs[0] = Some(seed);
        cnspos[0] = Some((0, frank.len() as i64));

        Ok(Self {
            name: name.to_string(),
            params,
            abacus,
            ma,
            frank,
            reads,
            seqs,
            cnspos,
        })
    }

    pub fn frankenstein(&self) -> &Frankenstein {
        &self.frank
    }

    /// Places every remaining read in layout order.
    pub fn place_all(&mut self) -> usize {
        (1..self.reads.len()).filter(|&idx| self.place(idx)).count()
    }

    /// Aligns read `idx` against the consensus and splices it in.
    pub fn place(&mut self, idx: usize) -> bool {
        if self.seqs[idx].is_some() {
            return true;
        }
        let Some((anchor, expected)) = self.expected_position(idx) else {
            log::debug!(
                "{}: read {} overlaps no placed read",
                self.name,
                self.reads[idx].name
            );
            return false;
        };
        let Some(placement) = self.align_read(idx, anchor, expected) else {
            return false;
        };

        let read = &self.reads[idx];
        let seq = match self.abacus.add_sequence(&read.name, &read.seq) {
            Ok(seq) => seq,
            Err(e) => {
                log::warn!("{}: {}", self.name, e);
                return false;
            }
        };
        self.abacus
            .apply_alignment(&self.frank.beads, seq, placement.ahang, &placement.trace);
        self.seqs[idx] = Some(seq);
        self.frank = self.abacus.rebuild(self.ma);
        self.refresh_positions();
        true
    }

    fn refresh_positions(&mut self) {
        for (idx, seq) in self.seqs.iter().enumerate() {
            if let Some(seq) = seq {
                let s = self.abacus.sequence(*seq);
                let bgn = self.abacus.column(self.abacus.column_of(s.first_bead)).position;
                let end = self.abacus.column(self.abacus.column_of(s.last_bead())).position + 1;
                self.cnspos[idx] = Some((bgn as i64, end as i64));
            }
        }
    }

    /// Projects the read onto the consensus through the placed read whose
    /// layout overlaps it the most.
    fn expected_position(&self, idx: usize) -> Option<(usize, (i64, i64))> {
        let (lo, hi) = self.reads[idx].span();
        let frank_len = self.frank.len() as i64;
        let mut best: Option<(usize, (i64, i64))> = None;
        let mut thickest = 0;

        for (q, pos) in self.cnspos.iter().enumerate() {
            let Some((qbgn, qend)) = *pos else {
                continue;
            };
            let (qlo, qhi) = self.reads[q].span();
            if lo >= qhi || hi <= qlo {
                continue;
            }
            let bgn = qbgn + lo - qlo;
            let end = qend + hi - qhi;
            let overlap = end.min(frank_len) - bgn;
            if bgn < frank_len && bgn < end && overlap > thickest {
                thickest = overlap;
                best = Some((q, (bgn, end)));
            }
        }

        if thickest < self.params.min_overlap as i64 {
            return None;
        }
        best
    }

    fn align_read(&self, idx: usize, anchor: usize, expected: (i64, i64)) -> Option<Placement> {
        let read = &self.reads[idx];
        let params = self.params;
        let frank_len = self.frank.len() as i64;
        let Some((abgn, aend)) = self.cnspos[anchor] else {
            return None;
        };
        let (bgn, end) = expected;

        let extra = |delta: i64| -> i64 {
            ((params.error_rate * delta.abs() as f64).ceil() as i64).max(params.slop as i64)
        };
        let mut bgn_extra = extra(bgn - abgn);
        let mut end_extra = extra(end - aend);
        loop {
            let frank_bgn = (bgn - bgn_extra).max(0);
            let allow_ahang = frank_bgn == 0;
            let (frank_end, allow_bhang) = if end + end_extra < frank_len {
                (end + end_extra, false)
            } else {
                (frank_len, true)
            };
            if frank_bgn >= frank_end {
                log::debug!("{}: empty window for read {}", self.name, read.name);
                return None;
            }

            // Only consensus overhangs are free; read overhangs pay as gaps.
            let window = &self.frank.bases[frank_bgn as usize..frank_end as usize];
            let diff_params = DiffParams {
                start_cgap: window.len(),
                end_cgap: window.len(),
                ..DiffParams::default()
            };
            let aln = match halign(window, &read.seq, &diff_params) {
                Ok(aln) => aln,
                Err(e) => {
                    log::debug!("{}: {}", self.name, e);
                    return None;
                }
            };
            let summary = AlignmentSummary::new(&aln);

            let mut again = false;
            if summary.lead_hang > 0 && frank_bgn > 0 {
                bgn_extra += summary.lead_hang as i64 + params.pad();
                again = true;
            }
            if summary.trail_hang > 0 && !allow_bhang {
                end_extra += summary.trail_hang as i64 + params.pad();
                again = true;
            }
            if again {
                log::trace!(
                    "{}: widening window for read {} to {}+{}",
                    self.name,
                    read.name,
                    bgn_extra,
                    end_extra
                );
                continue;
            }

            if summary.lead_hang > 0 && !allow_ahang {
                return None;
            }
            let min_len = params.min_overlap.min(read.seq.len());
            if summary.error_rate() > params.error_rate || summary.length < min_len {
                log::debug!(
                    "{}: rejected read {} with {} errors over {} bases",
                    self.name,
                    read.name,
                    summary.errors,
                    summary.length
                );
                return None;
            }

            let aln = aln.with_offsets(frank_bgn as usize + 1, 1);
            return match aln.to_trace(self.frank.len()) {
                Ok((ahang, trace)) => Some(Placement { ahang, trace }),
                Err(e) => {
                    log::warn!("{}: {}", self.name, e);
                    None
                }
            };
        }
    }

    /// Drops gap-majority columns and reports read spans on what is left.
    pub fn finish(self) -> TigResult {
        let mut kept_before = Vec::with_capacity(self.frank.len() + 1);
        let mut consensus = Vec::with_capacity(self.frank.len());
        kept_before.push(0);
        for &base in &self.frank.bases {
            if !base.is_ascii_lowercase() {
                consensus.push(base);
            }
            kept_before.push(consensus.len());
        }

        let placements = self
            .reads
            .iter()
            .zip(&self.cnspos)
            .zip(&self.seqs)
            .map(|((read, pos), seq)| ReadPlacement {
                name: read.name.clone(),
                span: seq.and(*pos).map(|(bgn, end)| {
                    (kept_before[bgn as usize], kept_before[end as usize])
                }),
                reverse: read.is_reverse(),
            })
            .collect();

        TigResult {
            name: self.name,
            consensus,
            placements,
        }
    }
}

/// Builds the consensus of one tig from its layout.
pub fn tig_consensus(name: &str, reads: Vec<LayoutRead>, params: &ConsensusParams) -> Result<TigResult> {
    let total = reads.len();
    let mut tig = TigConsensus::new(name, reads, params)?;
    let placed = tig.place_all() + 1;
    tig.abacus.check_columns(tig.ma)?;
    if placed < total {
        log::warn!("{}: placed {} of {} reads", name, placed, total);
    }
    Ok(tig.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_seq(rng: &mut StdRng, len: usize) -> Vec<u8> {
        (0..len).map(|_| b"ACGT"[rng.random_range(0..4)]).collect()
    }

    fn layout(name: &str, seq: &[u8], bgn: i64, end: i64) -> LayoutRead {
        LayoutRead {
            name: name.to_string(),
            seq: seq.to_vec(),
            bgn,
            end,
        }
    }

    #[test]
    fn test_rebuild_majority_and_gap_calls() {
        let mut abacus = Abacus::new();
        let a = abacus.add_sequence("a", b"ACGTA").unwrap();
        let ma = abacus.add_multi_align(a);
        let b = abacus.add_sequence("b", b"ATCGTA").unwrap();
        let calls = abacus.rebuild(ma);
        abacus.apply_alignment(&calls.beads, b, 0, &[-2, 0]);

        let frank = abacus.rebuild(ma);
        // one T against one gap: the gap wins ties only when strictly more
        assert_eq!(frank.bases, b"ATCGTA".to_vec());

        let c = abacus.add_sequence("c", b"ACGTA").unwrap();
        abacus.apply_alignment(&abacus.sequence_beads(a), c, 0, &[0]);
        let frank = abacus.rebuild(ma);
        assert_eq!(frank.bases, b"AtCGTA".to_vec());
        assert_eq!(frank.len(), abacus.multi_align(ma).columns.len());
    }

    #[test]
    fn test_rebuild_empty_column_calls_n() {
        let mut abacus = Abacus::new();
        let a = abacus.add_sequence("a", b"ANA").unwrap();
        let ma = abacus.add_multi_align(a);
        assert_eq!(abacus.rebuild(ma).bases, b"ANA".to_vec());
    }

    #[test]
    fn test_params_validate() {
        assert!(ConsensusParams::default().validate().is_ok());
        let bad = ConsensusParams {
            error_rate: 1.5,
            ..ConsensusParams::default()
        };
        assert!(bad.validate().is_err());
        let bad = ConsensusParams {
            min_overlap: 0,
            ..ConsensusParams::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_tig_consensus_exact_tiling() {
        let mut rng = StdRng::seed_from_u64(3);
        let genome = random_seq(&mut rng, 300);
        let reads = vec![
            layout("r1", &genome[0..150], 0, 150),
            layout("r2", &genome[100..250], 100, 250),
            layout("r3", &genome[180..300], 180, 300),
        ];
        let result = tig_consensus("tig1", reads, &ConsensusParams::default()).unwrap();
        assert_eq!(result.consensus, genome);
        assert_eq!(result.num_placed(), 3);
        assert_eq!(result.placements[1].span, Some((100, 250)));
        assert_eq!(result.placements[2].span, Some((180, 300)));
    }

    #[test]
    fn test_tig_consensus_votes_out_errors() {
        let mut rng = StdRng::seed_from_u64(5);
        let genome = random_seq(&mut rng, 200);
        let mut noisy = genome[20..180].to_vec();
        noisy.remove(70);
        let mut extra = genome[40..200].to_vec();
        extra.insert(60, b'A');

        let reads = vec![
            layout("r1", &genome[0..160], 0, 160),
            layout("r2", &noisy, 20, 179),
            layout("r3", &genome[10..200], 10, 200),
            layout("r4", &extra, 40, 200),
        ];
        let result = tig_consensus("tig2", reads, &ConsensusParams::default()).unwrap();
        assert_eq!(result.num_placed(), 4);
        assert_eq!(result.consensus, genome);
    }

    #[test]
    fn test_tig_consensus_reverse_read() {
        let mut rng = StdRng::seed_from_u64(9);
        let genome = random_seq(&mut rng, 200);
        let reads = vec![
            layout("fwd", &genome[0..120], 0, 120),
            layout("rev", &reverse_complement(&genome[60..200]), 200, 60),
        ];
        let result = tig_consensus("tig3", reads, &ConsensusParams::default()).unwrap();
        assert_eq!(result.consensus, genome);
        assert!(result.placements[1].reverse);
        assert_eq!(result.placements[1].span, Some((60, 200)));
    }

    #[test]
    fn test_tig_consensus_leaves_unrelated_read_unplaced() {
        let mut rng = StdRng::seed_from_u64(11);
        let genome = random_seq(&mut rng, 150);
        let junk = random_seq(&mut rng, 100);
        let reads = vec![
            layout("r1", &genome, 0, 150),
            layout("junk", &junk, 50, 150),
        ];
        let result = tig_consensus("tig4", reads, &ConsensusParams::default()).unwrap();
        assert_eq!(result.consensus, genome);
        assert_eq!(result.placements[1].span, None);
    }

    #[test]
    fn test_tig_consensus_rejects_empty() {
        assert!(tig_consensus("none", vec![], &ConsensusParams::default()).is_err());
        let reads = vec![layout("r1", b"", 0, 0)];
        assert!(tig_consensus("empty", reads, &ConsensusParams::default()).is_err());
    }
}
