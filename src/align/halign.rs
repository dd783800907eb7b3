use super::diff::{diff, DiffParams};
use super::edit_script::{EditKind, EditOp, EditScript};
use crate::utils::Result;
use itertools::Itertools;

/// A finished pairwise alignment with its script packed into a flat array.
///
/// Element 0 of the packed array is the number of `(opcode, run length)`
/// pairs that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Halignment {
    /// 1-based start of the aligned segment in the first sequence.
    pub offset1: usize,
    /// 1-based start of the aligned segment in the second sequence.
    pub offset2: usize,
    /// Length of the aligned segment of the first sequence.
    pub len1: usize,
    /// Length of the aligned segment of the second sequence.
    pub len2: usize,
    pub score: i64,
    packed: Vec<i32>,
}

/// An ungapped stretch of an alignment, in 0-based sequence coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub bgn1: usize,
    pub bgn2: usize,
    pub len: usize,
    pub matches: usize,
}

/// Aligns two whole sequences with unit costs and no free ends.
pub fn halign_start(s1: &[u8], s2: &[u8]) -> Result<Halignment> {
    halign(s1, s2, &DiffParams::default())
}

pub fn halign(s1: &[u8], s2: &[u8], params: &DiffParams) -> Result<Halignment> {
    if s1.is_empty() || s2.is_empty() {
        return Err(format!(
            "Cannot align empty sequence (lengths {} and {})",
            s1.len(),
            s2.len()
        ));
    }

    let (score, mut script) = diff(s1, s2, params);
    log::trace!("Scored alignment {}x{}: {}", s1.len(), s2.len(), score);

    script.terminate();
    script.condense();
    debug_assert!(script.ops().first().map(|op| op.kind) != Some(EditKind::Nop));

    Ok(Halignment {
        offset1: 1,
        offset2: 1,
        len1: s1.len(),
        len2: s2.len(),
        score,
        packed: pack(&script),
    })
}

fn pack(script: &EditScript) -> Vec<i32> {
    let mut packed = Vec::with_capacity(2 * script.len() + 1);
    packed.push(0);
    let mut pairs = 0;
    for op in script {
        if op.kind == EditKind::Nop {
            continue;
        }
        let code = op.kind.opcode();
        let count = op.count as i32;
        if pairs > 0 && packed[packed.len() - 2] == code {
            if let Some(last) = packed.last_mut() {
                *last += count;
            }
        } else {
            packed.push(code);
            packed.push(count);
            pairs += 1;
        }
    }
    packed[0] = pairs;
    packed
}

impl Halignment {
    /// Rebuilds an alignment from a packed array, validating every pair.
    pub fn from_packed(
        offset1: usize,
        offset2: usize,
        len1: usize,
        len2: usize,
        score: i64,
        packed: Vec<i32>,
    ) -> Result<Self> {
        if offset1 == 0 || offset2 == 0 {
            return Err("Alignment offsets are 1-based".to_string());
        }
        let pairs = *packed
            .first()
            .ok_or_else(|| "Packed alignment is empty".to_string())?;
        if pairs < 0 || packed.len() != 2 * pairs as usize + 1 {
            return Err(format!(
                "Packed alignment declares {} pairs but holds {} values",
                pairs,
                packed.len() - 1
            ));
        }

        let (mut used1, mut used2) = (0, 0);
        for (&code, &count) in packed[1..].iter().tuples() {
            let kind = EditKind::from_opcode(code)
                .ok_or_else(|| format!("Invalid alignment opcode {}", code))?;
            if count <= 0 {
                return Err(format!("Invalid run length {} for {}", count, kind));
            }
            if kind.consumes_first() {
                used1 += count as usize;
            }
            if kind.consumes_second() {
                used2 += count as usize;
            }
        }
        if used1 != len1 || used2 != len2 {
            return Err(format!(
                "Packed alignment covers {}x{} bases, expected {}x{}",
                used1, used2, len1, len2
            ));
        }

        Ok(Self {
            offset1,
            offset2,
            len1,
            len2,
            score,
            packed,
        })
    }

    /// Places the aligned segments at 1-based offsets within longer sequences.
    pub fn with_offsets(mut self, offset1: usize, offset2: usize) -> Self {
        assert!(offset1 >= 1 && offset2 >= 1, "Alignment offsets are 1-based");
        self.offset1 = offset1;
        self.offset2 = offset2;
        self
    }

    pub fn packed(&self) -> &[i32] {
        &self.packed
    }

    pub fn num_ops(&self) -> usize {
        self.packed[0] as usize
    }

    pub fn ops(&self) -> impl Iterator<Item = EditOp> + '_ {
        self.packed[1..]
            .iter()
            .tuples()
            .map(|(&code, &count)| EditOp {
                kind: EditKind::from(code),
                count: count as usize,
            })
    }

    pub fn script(&self) -> EditScript {
        let mut script = EditScript::new();
        for op in self.ops() {
            script.push(op.kind, op.count);
        }
        script
    }

    /// Walks the ungapped segments from the start; every call restarts the walk.
    pub fn segments(&self) -> Segments<'_> {
        Segments {
            alignment: self,
            next_pair: 0,
            pos1: 0,
            pos2: 0,
        }
    }

    pub fn matches(&self) -> usize {
        self.ops()
            .filter(|op| op.kind == EditKind::Mov)
            .map(|op| op.count)
            .sum()
    }

    /// Converts the alignment into an overhang plus a zero-terminated indel trace.
    ///
    /// The first sequence is the reference (`a_total` bases in all), the
    /// second the sequence being placed, which must be aligned from its first
    /// base. Positive entries `k` put a gap in the placed sequence before its
    /// base `k`, negative entries `-k` put a gap in the reference before its
    /// base `k`; both are 1-based and absolute. Overhanging bases at either
    /// end of the reference are expressed through the overhang or left for
    /// the caller to append instead of being traced.
    pub fn to_trace(&self, a_total: usize) -> Result<(i32, Vec<i32>)> {
        if self.offset2 != 1 {
            return Err(format!(
                "Trace requires the placed sequence to start at 1, not {}",
                self.offset2
            ));
        }
        let a_start = self.offset1 - 1;
        if a_start + self.len1 > a_total {
            return Err(format!(
                "Alignment ends at {} past reference length {}",
                a_start + self.len1,
                a_total
            ));
        }
        let reaches_end = a_start + self.len1 == a_total;

        let ops = self.ops().collect::<Vec<_>>();
        let last = ops.len().saturating_sub(1);
        let mut ahang = a_start as i32;
        let mut apos = a_start;
        let mut bpos = 0;
        let mut trace = Vec::new();

        for (idx, op) in ops.iter().enumerate() {
            match op.kind {
                EditKind::Del if idx == 0 => {
                    ahang += op.count as i32;
                    apos += op.count;
                }
                EditKind::Del if idx == last => {}
                EditKind::Del => {
                    trace.extend(std::iter::repeat(bpos as i32 + 1).take(op.count));
                    apos += op.count;
                }
                EditKind::Ins if idx == 0 && a_start == 0 => {
                    ahang = -(op.count as i32);
                    bpos += op.count;
                }
                EditKind::Ins if idx == last && reaches_end => {}
                EditKind::Ins => {
                    trace.extend(std::iter::repeat(-(apos as i32 + 1)).take(op.count));
                    bpos += op.count;
                }
                EditKind::Sub | EditKind::Mov => {
                    apos += op.count;
                    bpos += op.count;
                }
                EditKind::Nop => {}
            }
        }
        trace.push(0);
        Ok((ahang, trace))
    }
}

pub struct Segments<'a> {
    alignment: &'a Halignment,
    next_pair: usize,
    pos1: usize,
    pos2: usize,
}

impl Iterator for Segments<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        let packed = &self.alignment.packed;
        let mut segment: Option<Segment> = None;
        while self.next_pair < self.alignment.num_ops() {
            let kind = EditKind::from(packed[1 + 2 * self.next_pair]);
            let count = packed[2 + 2 * self.next_pair] as usize;
            if kind.is_aligned() {
                let seg = segment.get_or_insert(Segment {
                    bgn1: self.alignment.offset1 - 1 + self.pos1,
                    bgn2: self.alignment.offset2 - 1 + self.pos2,
                    len: 0,
                    matches: 0,
                });
                seg.len += count;
                if kind == EditKind::Mov {
                    seg.matches += count;
                }
                self.pos1 += count;
                self.pos2 += count;
            } else if segment.is_some() {
                break;
            } else {
                if kind.consumes_first() {
                    self.pos1 += count;
                }
                if kind.consumes_second() {
                    self.pos2 += count;
                }
            }
            self.next_pair += 1;
        }
        segment
    }
}
