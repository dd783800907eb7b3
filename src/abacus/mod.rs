//! Column-oriented multiple alignment.
//!
//! Every base of every sequence is a bead. Beads of one sequence are chained
//! through `prev`/`next` in sequence order, beads sharing a column through
//! `up`/`down` below the column's call bead. Columns of one multi-alignment
//! form their own doubly linked list. All of it lives in index arenas owned
//! by [`Abacus`].

mod apply;
pub mod consensus;

pub use consensus::{
    tig_consensus, ConsensusParams, Frankenstein, LayoutRead, ReadPlacement, TigConsensus, TigResult,
};

use crate::utils::Result;
use std::fmt;

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

arena_id!(BeadId);
arena_id!(ColumnId);
arena_id!(SeqId);
arena_id!(MultiAlignId);

pub const GAP: u8 = b'-';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bead {
    pub base: u8,
    /// Owning sequence; `None` for column call beads.
    pub seq: Option<SeqId>,
    pub column: Option<ColumnId>,
    pub prev: Option<BeadId>,
    pub next: Option<BeadId>,
    pub up: Option<BeadId>,
    pub down: Option<BeadId>,
}

impl Bead {
    fn new(base: u8, seq: Option<SeqId>) -> Self {
        Self {
            base,
            seq,
            column: None,
            prev: None,
            next: None,
            up: None,
            down: None,
        }
    }

    pub fn is_gap(&self) -> bool {
        self.base == GAP
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub call: BeadId,
    pub ma: MultiAlignId,
    pub position: i32,
    pub prev: Option<ColumnId>,
    pub next: Option<ColumnId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub name: String,
    pub first_bead: BeadId,
    pub len: usize,
}

impl Sequence {
    /// Last base bead; gap beads added later never move it.
    pub fn last_bead(&self) -> BeadId {
        BeadId(self.first_bead.0 + self.len - 1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiAlign {
    pub first: Option<ColumnId>,
    pub last: Option<ColumnId>,
    /// Columns in list order as of the last renumbering.
    pub columns: Vec<ColumnId>,
}

/// Per-column base tallies, indexed A, C, G, T, N, gap.
pub type BaseCounts = [usize; 6];

pub fn base_slot(base: u8) -> usize {
    match base.to_ascii_uppercase() {
        b'A' => 0,
        b'C' => 1,
        b'G' => 2,
        b'T' => 3,
        GAP => 5,
        _ => 4,
    }
}

#[derive(Debug, Clone, Default)]
pub struct Abacus {
    beads: Vec<Bead>,
    columns: Vec<Column>,
    sequences: Vec<Sequence>,
    multi_aligns: Vec<MultiAlign>,
}

impl Abacus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bead(&self, id: BeadId) -> &Bead {
        &self.beads[id.0]
    }

    fn bead_mut(&mut self, id: BeadId) -> &mut Bead {
        &mut self.beads[id.0]
    }

    pub fn column(&self, id: ColumnId) -> &Column {
        &self.columns[id.0]
    }

    fn column_mut(&mut self, id: ColumnId) -> &mut Column {
        &mut self.columns[id.0]
    }

    pub fn sequence(&self, id: SeqId) -> &Sequence {
        &self.sequences[id.0]
    }

    pub fn multi_align(&self, id: MultiAlignId) -> &MultiAlign {
        &self.multi_aligns[id.0]
    }

    pub fn num_sequences(&self) -> usize {
        self.sequences.len()
    }

    pub fn num_beads(&self) -> usize {
        self.beads.len()
    }

    /// Column holding `bead`; panics for beads not yet placed.
    pub fn column_of(&self, bead: BeadId) -> ColumnId {
        match self.bead(bead).column {
            Some(col) => col,
            None => panic!("Bead {} is not aligned to any column", bead),
        }
    }

    /// Loads a sequence as a chain of unaligned beads.
    pub fn add_sequence(&mut self, name: &str, bases: &[u8]) -> Result<SeqId> {
        if bases.is_empty() {
            return Err(format!("Sequence {} is empty", name));
        }
        let seq = SeqId(self.sequences.len());
        let first = self.beads.len();
        for (i, &base) in bases.iter().enumerate() {
            let mut bead = Bead::new(base.to_ascii_uppercase(), Some(seq));
            if i > 0 {
                bead.prev = Some(BeadId(first + i - 1));
            }
            if i + 1 < bases.len() {
                bead.next = Some(BeadId(first + i + 1));
            }
            self.beads.push(bead);
        }
        self.sequences.push(Sequence {
            name: name.to_string(),
            first_bead: BeadId(first),
            len: bases.len(),
        });
        Ok(seq)
    }

    /// Base beads of a sequence in order; gap beads are not included.
    pub fn sequence_beads(&self, seq: SeqId) -> Vec<BeadId> {
        let s = self.sequence(seq);
        (0..s.len).map(|i| BeadId(s.first_bead.0 + i)).collect()
    }

    /// All beads of a sequence in chain order, gaps included.
    pub fn sequence_chain(&self, seq: SeqId) -> Vec<BeadId> {
        let mut chain = Vec::new();
        let mut first = self.sequence(seq).first_bead;
        while let Some(prev) = self.bead(first).prev {
            first = prev;
        }
        let mut cur = Some(first);
        while let Some(bead) = cur {
            chain.push(bead);
            cur = self.bead(bead).next;
        }
        chain
    }

    /// Starts a multi-alignment with one column per base of `seq`.
    pub fn add_multi_align(&mut self, seq: SeqId) -> MultiAlignId {
        let ma = MultiAlignId(self.multi_aligns.len());
        self.multi_aligns.push(MultiAlign::default());

        let beads = self.sequence_beads(seq);
        let mut last = self.add_column(ma, beads[0]);
        self.multi_aligns[ma.0].first = Some(last);
        self.multi_aligns[ma.0].last = Some(last);
        for &bead in &beads[1..] {
            last = self.append_column(last, bead);
        }
        self.renumber(ma);
        ma
    }

    /// Creates an unlinked column seeded with `bead` and its call bead.
    fn add_column(&mut self, ma: MultiAlignId, bead: BeadId) -> ColumnId {
        let col = ColumnId(self.columns.len());
        let call = BeadId(self.beads.len());
        let mut call_bead = Bead::new(self.bead(bead).base, None);
        call_bead.column = Some(col);
        self.beads.push(call_bead);
        self.columns.push(Column {
            call,
            ma,
            position: 0,
            prev: None,
            next: None,
        });
        self.align_bead_to_column(col, bead);
        col
    }

    /// Inserts a new column after `cid` seeded with `bead`. Every sequence
    /// that continues past `cid` receives a gap bead in the new column.
    pub fn append_column(&mut self, cid: ColumnId, bead: BeadId) -> ColumnId {
        let ma = self.column(cid).ma;
        let col = self.add_column(ma, bead);
        let prev_call = self.column(cid).call;
        let call = self.column(col).call;

        let next = self.column(cid).next;
        {
            let c = self.column_mut(col);
            c.prev = Some(cid);
            c.next = next;
        }
        self.column_mut(cid).next = Some(col);
        if let Some(next) = next {
            self.column_mut(next).prev = Some(col);
        }

        let prev_call_next = self.bead(prev_call).next;
        {
            let c = self.bead_mut(call);
            c.prev = Some(prev_call);
            c.next = prev_call_next;
        }
        self.bead_mut(prev_call).next = Some(call);
        if let Some(n) = prev_call_next {
            self.bead_mut(n).prev = Some(call);
        }

        for other in self.column_beads(cid) {
            if let Some(next) = self.bead(other).next {
                if next != bead {
                    let gap = self.append_gap_bead(other);
                    self.align_bead_to_column(col, gap);
                }
            }
        }

        self.column_mut(col).position = self.column(cid).position + 1;
        self.push_following(col);
        if next.is_none() {
            self.multi_aligns[ma.0].last = Some(col);
        }
        col
    }

    /// Inserts a new column before `cid` seeded with `bead`. Every sequence
    /// that started before `cid` receives a gap bead in the new column.
    pub fn prepend_column(&mut self, cid: ColumnId, bead: BeadId) -> ColumnId {
        let ma = self.column(cid).ma;
        let col = self.add_column(ma, bead);
        let next_call = self.column(cid).call;
        let call = self.column(col).call;

        let prev = self.column(cid).prev;
        {
            let c = self.column_mut(col);
            c.prev = prev;
            c.next = Some(cid);
        }
        self.column_mut(cid).prev = Some(col);
        if let Some(prev) = prev {
            self.column_mut(prev).next = Some(col);
        }

        let next_call_prev = self.bead(next_call).prev;
        {
            let c = self.bead_mut(call);
            c.prev = next_call_prev;
            c.next = Some(next_call);
        }
        self.bead_mut(next_call).prev = Some(call);
        if let Some(p) = next_call_prev {
            self.bead_mut(p).next = Some(call);
        }

        for other in self.column_beads(cid) {
            if let Some(prev) = self.bead(other).prev {
                if prev != bead {
                    let gap = self.prepend_gap_bead(other);
                    self.align_bead_to_column(col, gap);
                }
            }
        }

        match prev {
            Some(prev) => {
                self.column_mut(col).position = self.column(prev).position + 1;
                self.push_following(col);
            }
            None => self.column_mut(col).position = self.column(cid).position - 1,
        }
        if prev.is_none() {
            self.multi_aligns[ma.0].first = Some(col);
        }
        col
    }

    /// Adds a gap to the sequence of `bid`, right after it. The gap is not
    /// placed in any column.
    pub fn append_gap_bead(&mut self, bid: BeadId) -> BeadId {
        let gap = BeadId(self.beads.len());
        let next = self.bead(bid).next;
        let mut bead = Bead::new(GAP, self.bead(bid).seq);
        bead.prev = Some(bid);
        bead.next = next;
        self.beads.push(bead);
        self.bead_mut(bid).next = Some(gap);
        if let Some(next) = next {
            self.bead_mut(next).prev = Some(gap);
        }
        gap
    }

    /// Adds a gap to the sequence of `bid`, right before it.
    pub fn prepend_gap_bead(&mut self, bid: BeadId) -> BeadId {
        let gap = BeadId(self.beads.len());
        let prev = self.bead(bid).prev;
        let mut bead = Bead::new(GAP, self.bead(bid).seq);
        bead.prev = prev;
        bead.next = Some(bid);
        self.beads.push(bead);
        self.bead_mut(bid).prev = Some(gap);
        if let Some(prev) = prev {
            self.bead_mut(prev).next = Some(gap);
        }
        gap
    }

    /// Links `bid` into column `cid`, directly below the call bead.
    pub fn align_bead_to_column(&mut self, cid: ColumnId, bid: BeadId) {
        assert!(
            self.bead(bid).column.is_none(),
            "Bead {} is already in column {:?}",
            bid,
            self.bead(bid).column
        );
        let call = self.column(cid).call;
        let below = self.bead(call).down;
        {
            let bead = self.bead_mut(bid);
            bead.column = Some(cid);
            bead.up = Some(call);
            bead.down = below;
        }
        self.bead_mut(call).down = Some(bid);
        if let Some(below) = below {
            self.bead_mut(below).up = Some(bid);
        }
    }

    /// Non-call beads of a column, top to bottom.
    pub fn column_beads(&self, cid: ColumnId) -> Vec<BeadId> {
        let mut beads = Vec::new();
        let mut cur = self.bead(self.column(cid).call).down;
        while let Some(bead) = cur {
            beads.push(bead);
            cur = self.bead(bead).down;
        }
        beads
    }

    pub fn base_counts(&self, cid: ColumnId) -> BaseCounts {
        let mut counts = [0; 6];
        for bead in self.column_beads(cid) {
            counts[base_slot(self.bead(bead).base)] += 1;
        }
        counts
    }

    /// Finds the bead in the column of `bi` that belongs to the same
    /// sequence as `fi`, searching up first.
    pub fn find_bead_in_column(&self, bi: BeadId, fi: BeadId) -> Option<BeadId> {
        let target = self.bead(fi).seq;
        if self.bead(bi).seq == target {
            return Some(bi);
        }
        let mut cur = self.bead(bi).up;
        while let Some(bead) = cur {
            if self.bead(bead).seq == target {
                return Some(bead);
            }
            cur = self.bead(bead).up;
        }
        let mut cur = self.bead(bi).down;
        while let Some(bead) = cur {
            if self.bead(bead).seq == target {
                return Some(bead);
            }
            cur = self.bead(bead).down;
        }
        None
    }

    /// Columns of a multi-alignment in list order.
    pub fn walk_columns(&self, ma: MultiAlignId) -> ColumnWalk<'_> {
        ColumnWalk {
            abacus: self,
            next: self.multi_align(ma).first,
        }
    }

    /// Moves columns after `cid` up until positions increase strictly
    /// again.
    fn push_following(&mut self, cid: ColumnId) {
        let mut pos = self.column(cid).position;
        let mut cur = self.column(cid).next;
        while let Some(col) = cur {
            if self.column(col).position > pos {
                break;
            }
            pos += 1;
            self.column_mut(col).position = pos;
            cur = self.column(col).next;
        }
    }

    /// Assigns positions 0.. along the column list.
    pub fn renumber(&mut self, ma: MultiAlignId) {
        let order = self.walk_columns(ma).collect::<Vec<_>>();
        for (pos, &col) in order.iter().enumerate() {
            self.column_mut(col).position = pos as i32;
        }
        let m = &mut self.multi_aligns[ma.0];
        m.first = order.first().copied();
        m.last = order.last().copied();
        m.columns = order;
    }

    pub fn set_call(&mut self, cid: ColumnId, base: u8) {
        let call = self.column(cid).call;
        self.bead_mut(call).base = base;
    }

    /// Verifies the column list and both bead linkages of a multi-alignment.
    pub fn check_columns(&self, ma: MultiAlignId) -> Result<()> {
        let mut prev: Option<ColumnId> = None;
        let mut seen = vec![false; self.beads.len()];
        for col in self.walk_columns(ma) {
            let column = self.column(col);
            if column.ma != ma {
                return Err(format!("Column {} belongs to multi-alignment {}", col, column.ma));
            }
            if column.prev != prev {
                return Err(format!("Column {} has a broken prev link", col));
            }
            if let Some(p) = prev {
                if self.column(p).position >= column.position {
                    return Err(format!(
                        "Column {} at position {} follows position {}",
                        col,
                        column.position,
                        self.column(p).position
                    ));
                }
            }
            let mut up = column.call;
            for bead in self.column_beads(col) {
                let b = self.bead(bead);
                if b.column != Some(col) || b.up != Some(up) {
                    return Err(format!("Bead {} is misplaced in column {}", bead, col));
                }
                if std::mem::replace(&mut seen[bead.0], true) {
                    return Err(format!("Bead {} appears in two columns", bead));
                }
                up = bead;
            }
            prev = Some(col);
        }
        if self.multi_align(ma).last != prev {
            return Err("Multi-alignment last column is stale".to_string());
        }

        for (idx, bead) in self.beads.iter().enumerate() {
            if bead.seq.is_none() {
                continue;
            }
            if let Some(col) = bead.column {
                if self.column(col).ma == ma && !seen[idx] {
                    return Err(format!("Bead {} is not linked into column {}", idx, col));
                }
            }
            if let Some(next) = bead.next {
                if self.bead(next).prev != Some(BeadId(idx)) || self.bead(next).seq != bead.seq {
                    return Err(format!("Bead {} has a broken sequence link", idx));
                }
            }
        }
        Ok(())
    }
}

pub struct ColumnWalk<'a> {
    abacus: &'a Abacus,
    next: Option<ColumnId>,
}

impl Iterator for ColumnWalk<'_> {
    type Item = ColumnId;

    fn next(&mut self) -> Option<ColumnId> {
        let cur = self.next?;
        self.next = self.abacus.column(cur).next;
        Some(cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column_string(abacus: &Abacus, ma: MultiAlignId, seq: SeqId) -> String {
        abacus
            .walk_columns(ma)
            .map(|col| {
                abacus
                    .column_beads(col)
                    .into_iter()
                    .find(|&b| abacus.bead(b).seq == Some(seq))
                    .map_or(' ', |b| abacus.bead(b).base as char)
            })
            .collect()
    }

    #[test]
    fn test_add_sequence_links_beads() {
        let mut abacus = Abacus::new();
        let seq = abacus.add_sequence("r1", b"acgt").unwrap();
        let beads = abacus.sequence_beads(seq);
        assert_eq!(beads.len(), 4);
        assert_eq!(abacus.bead(beads[0]).prev, None);
        assert_eq!(abacus.bead(beads[1]).prev, Some(beads[0]));
        assert_eq!(abacus.bead(beads[3]).next, None);
        assert_eq!(abacus.bead(beads[2]).base, b'G');
        assert_eq!(abacus.sequence(seq).last_bead(), beads[3]);
        assert!(abacus.add_sequence("empty", b"").is_err());
    }

    #[test]
    fn test_add_multi_align_one_column_per_base() {
        let mut abacus = Abacus::new();
        let seq = abacus.add_sequence("r1", b"ACGTA").unwrap();
        let ma = abacus.add_multi_align(seq);
        let positions: Vec<_> = abacus
            .walk_columns(ma)
            .map(|c| abacus.column(c).position)
            .collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4]);
        assert_eq!(column_string(&abacus, ma, seq), "ACGTA");
        // a single sequence never needs gap beads
        assert_eq!(abacus.sequence_chain(seq).len(), 5);
        abacus.check_columns(ma).unwrap();
    }

    #[test]
    fn test_append_column_pads_spanning_sequences() {
        let mut abacus = Abacus::new();
        let a = abacus.add_sequence("a", b"ACG").unwrap();
        let b = abacus.add_sequence("b", b"T").unwrap();
        let ma = abacus.add_multi_align(a);
        let first = abacus.multi_align(ma).first.unwrap();
        abacus.append_column(first, abacus.sequence(b).first_bead);
        abacus.check_columns(ma).unwrap();
        abacus.renumber(ma);

        assert_eq!(column_string(&abacus, ma, a), "A-CG");
        assert_eq!(abacus.sequence_chain(a).len(), 4);
        assert_eq!(abacus.base_counts(abacus.multi_align(ma).columns[1]), [0, 0, 0, 1, 0, 1]);
        abacus.check_columns(ma).unwrap();
    }

    #[test]
    fn test_prepend_column_becomes_first() {
        let mut abacus = Abacus::new();
        let a = abacus.add_sequence("a", b"CG").unwrap();
        let b = abacus.add_sequence("b", b"T").unwrap();
        let ma = abacus.add_multi_align(a);
        let first = abacus.multi_align(ma).first.unwrap();
        let col = abacus.prepend_column(first, abacus.sequence(b).first_bead);
        assert_eq!(abacus.multi_align(ma).first, Some(col));
        assert_eq!(abacus.column(col).position, -1);
        abacus.check_columns(ma).unwrap();

        // sequence a starts in the old first column, so it gets no gap
        assert_eq!(abacus.sequence_chain(a).len(), 2);
        abacus.renumber(ma);
        assert_eq!(abacus.column(col).position, 0);
        abacus.check_columns(ma).unwrap();
    }

    #[test]
    fn test_inner_columns_push_later_positions() {
        let mut abacus = Abacus::new();
        let a = abacus.add_sequence("a", b"ACGT").unwrap();
        let b = abacus.add_sequence("b", b"T").unwrap();
        let c = abacus.add_sequence("c", b"G").unwrap();
        let ma = abacus.add_multi_align(a);
        let cols: Vec<_> = abacus.walk_columns(ma).collect();
        abacus.append_column(cols[1], abacus.sequence(b).first_bead);
        abacus.prepend_column(cols[1], abacus.sequence(c).first_bead);

        let positions: Vec<_> = abacus
            .walk_columns(ma)
            .map(|col| abacus.column(col).position)
            .collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(column_string(&abacus, ma, a), "A-C-GT");
        abacus.check_columns(ma).unwrap();
    }

    #[test]
    fn test_find_bead_in_column_searches_both_ways() {
        let mut abacus = Abacus::new();
        let a = abacus.add_sequence("a", b"A").unwrap();
        let b = abacus.add_sequence("b", b"A").unwrap();
        let c = abacus.add_sequence("c", b"A").unwrap();
        let ma = abacus.add_multi_align(a);
        let col = abacus.multi_align(ma).first.unwrap();
        let (ba, bb, bc) = (
            abacus.sequence(a).first_bead,
            abacus.sequence(b).first_bead,
            abacus.sequence(c).first_bead,
        );
        abacus.align_bead_to_column(col, bb);
        abacus.align_bead_to_column(col, bc);

        // column order below the call is c, b, a
        assert_eq!(abacus.column_beads(col), vec![bc, bb, ba]);
        assert_eq!(abacus.find_bead_in_column(ba, bc), Some(bc));
        assert_eq!(abacus.find_bead_in_column(bc, ba), Some(ba));
        assert_eq!(abacus.find_bead_in_column(bb, bb), Some(bb));
        let call = abacus.column(col).call;
        assert_eq!(abacus.find_bead_in_column(ba, call), Some(call));
    }

    #[test]
    #[should_panic(expected = "already in column")]
    fn test_align_bead_twice_panics() {
        let mut abacus = Abacus::new();
        let a = abacus.add_sequence("a", b"A").unwrap();
        let ma = abacus.add_multi_align(a);
        let col = abacus.multi_align(ma).first.unwrap();
        abacus.align_bead_to_column(col, abacus.sequence(a).first_bead);
    }

    #[test]
    fn test_check_columns_detects_bad_positions() {
        let mut abacus = Abacus::new();
        let a = abacus.add_sequence("a", b"ACG").unwrap();
        let ma = abacus.add_multi_align(a);
        let last = abacus.multi_align(ma).last.unwrap();
        abacus.column_mut(last).position = 0;
        assert!(abacus.check_columns(ma).is_err());
    }
}
