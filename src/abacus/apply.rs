use super::{Abacus, BeadId, SeqId};

/// Cursor state while one sequence is spliced into the columns.
struct Splice<'a> {
    aindex: &'a [BeadId],
    bindex: Vec<BeadId>,
    apos: usize,
    bpos: usize,
    lasta: Option<BeadId>,
    lastb: Option<BeadId>,
}

impl Splice<'_> {
    fn alen(&self) -> usize {
        self.aindex.len()
    }

    fn blen(&self) -> usize {
        self.bindex.len()
    }
}

/// Folds leading `+1` entries into the overhang and drops trailing entries
/// that point past either sequence. Returns the adjusted overhang and the
/// entries without the terminator.
///
/// Panics on an out-of-range entry followed by valid ones.
pub(crate) fn normalize_trace(ahang: i32, trace: &[i32], alen: usize, blen: usize) -> (i32, Vec<i32>) {
    let mut entries = trace.iter().copied().take_while(|&t| t != 0).peekable();
    let mut ahang = ahang;
    if ahang >= 0 {
        while entries.next_if_eq(&1).is_some() {
            ahang += 1;
        }
    }
    let in_range = |t: i32| {
        let k = t.unsigned_abs() as usize;
        if t > 0 {
            k <= blen
        } else {
            k <= alen
        }
    };
    let mut entries: Vec<i32> = entries.collect();
    while entries.last().is_some_and(|&t| !in_range(t)) {
        entries.pop();
    }
    if let Some(&bad) = entries.iter().find(|&&t| !in_range(t)) {
        panic!(
            "Trace entry {} is out of range for lengths {} and {}",
            bad, alen, blen
        );
    }
    (ahang, entries)
}

impl Abacus {
    /// Splices sequence `bseq` into the multi-alignment holding the beads
    /// of `aindex`, following an overhang and a signed gap trace.
    ///
    /// `aindex` lists one bead per reference position, every one already
    /// in a column; none of the beads of `bseq` may be in a column yet. A
    /// negative `ahang` places that many leading bases of `bseq` in new
    /// columns before the first one. Trace entry `-k` opens a new column
    /// before reference base `k`, entry `k` puts a gap in `bseq` before its
    /// base `k`. Bases of `bseq` left over at the end get new columns.
    pub fn apply_alignment(&mut self, aindex: &[BeadId], bseq: SeqId, ahang: i32, trace: &[i32]) {
        let bindex = self.sequence_beads(bseq);
        let (ahang, trace) = normalize_trace(ahang, trace, aindex.len(), bindex.len());

        let mut s = Splice {
            aindex,
            bindex,
            apos: ahang.max(0) as usize,
            bpos: 0,
            lasta: None,
            lastb: None,
        };
        assert!(s.apos < s.alen(), "Overhang {} is past the reference end {}", ahang, s.alen());

        for &bid in &s.bindex {
            assert!(
                self.bead(bid).column.is_none(),
                "Bead {} of the placed sequence is already in a column",
                bid
            );
        }
        for &aid in s.aindex {
            assert!(self.bead(aid).column.is_some(), "Reference bead {} has no column", aid);
        }

        if ahang < 0 {
            let first = self.bead(s.aindex[0]);
            assert!(first.prev.is_none(), "Negative overhang against an inner reference bead");
            let colp = self.column_of(s.aindex[0]);
            let hang = ahang.unsigned_abs() as usize;
            assert!(hang < s.blen(), "Overhang {} covers the whole sequence", ahang);
            while s.bpos < hang {
                self.prepend_column(colp, s.bindex[s.bpos]);
                s.bpos += 1;
            }
            s.lasta = self.bead(s.aindex[0]).prev;
            s.lastb = Some(s.bindex[s.bpos - 1]);
        }

        for &t in &trace {
            if t < 0 {
                self.open_reference_gap(&mut s, t.unsigned_abs() as usize);
            } else {
                self.open_sequence_gap(&mut s, t as usize);
            }
        }

        let rem = (s.blen() - s.bpos).min(s.alen() - s.apos);
        for _ in 0..rem {
            self.align_position(&mut s);
        }

        if s.bpos < s.blen() {
            let lastb = match s.lastb {
                Some(b) => b,
                None => panic!("No aligned base to extend sequence {} from", bseq),
            };
            let mut ci = self.column_of(lastb);
            if self.column(ci).next.is_some() {
                log::warn!(
                    "Appending {} bases of sequence {} inside the alignment, after column {}",
                    s.blen() - s.bpos,
                    self.sequence(bseq).name,
                    ci
                );
            }
            while s.bpos < s.blen() {
                ci = self.append_column(ci, s.bindex[s.bpos]);
                s.bpos += 1;
            }
        }
    }

    /// Handles trace entry `-k`: the placed sequence has an extra base
    /// before reference base `k`, which gets a column of its own.
    fn open_reference_gap(&mut self, s: &mut Splice<'_>, k: usize) {
        while s.apos + 1 < k {
            self.align_position(s);
        }
        assert!(s.apos < s.alen() && s.bpos < s.blen(), "Reference gap {} out of range", k);

        let bead = s.bindex[s.bpos];
        match s.lasta {
            Some(lasta) if s.bpos > 0 => {
                assert_eq!(Some(lasta), self.bead(s.aindex[s.apos]).prev);
                self.append_column(self.column_of(lasta), bead);
                s.lasta = self.bead(lasta).next;
            }
            lasta => {
                assert!(lasta.is_none() && s.bpos == 0, "Reference gap with a dangling cursor");
                self.prepend_column(self.column_of(s.aindex[s.apos]), bead);
                s.lasta = self.bead(s.aindex[s.apos]).prev;
            }
        }
        s.lastb = Some(bead);
        assert_eq!(s.lasta, self.bead(s.aindex[s.apos]).prev);
        s.bpos += 1;
    }

    /// Handles trace entry `k`: the placed sequence lacks the reference base
    /// aligned before its base `k` and gets a gap bead in that column.
    fn open_sequence_gap(&mut self, s: &mut Splice<'_>, k: usize) {
        while s.bpos + 1 < k {
            self.align_position(s);
        }
        assert!(s.apos < s.alen() && s.bpos < s.blen(), "Sequence gap {} out of range", k);

        let lasta = match s.lasta {
            Some(lasta) => self.bead(lasta).next,
            None => Some(s.aindex[s.apos]),
        };
        assert_eq!(lasta, Some(s.aindex[s.apos]));
        let lastb = match s.lastb {
            Some(b) => self.append_gap_bead(b),
            None => panic!("Sequence gap {} before any placed base", k),
        };
        self.align_bead_to_column(self.column_of(s.aindex[s.apos]), lastb);
        s.lasta = lasta;
        s.lastb = Some(lastb);
        s.apos += 1;
        self.align_gaps(s);
    }

    /// Aligns the next base of each side into the reference column.
    fn align_position(&mut self, s: &mut Splice<'_>) {
        assert!(s.apos < s.alen() && s.bpos < s.blen());
        let col = self.column_of(s.aindex[s.apos]);
        self.align_bead_to_column(col, s.bindex[s.bpos]);
        s.lasta = Some(s.aindex[s.apos]);
        s.lastb = Some(s.bindex[s.bpos]);
        s.apos += 1;
        s.bpos += 1;
        self.align_gaps(s);
    }

    /// Walks the placed sequence through columns opened by earlier
    /// sequences between the last aligned reference bead and the next one.
    fn align_gaps(&mut self, s: &mut Splice<'_>) {
        if s.apos >= s.alen() {
            return;
        }
        let Some(start) = s.lasta else {
            return;
        };
        let target = s.aindex[s.apos];
        let mut lasta = match self.find_bead_in_column(start, target) {
            Some(bead) => bead,
            None => panic!("Column of bead {} has no bead in the sequence of {}", start, target),
        };
        let mut lastb = match s.lastb {
            Some(b) => b,
            None => panic!("Aligning gaps before any placed base"),
        };

        let mut nexta = self.bead(lasta).next;
        while nexta != Some(target) {
            let Some(next) = nexta else {
                panic!("Reference bead {} is not reachable from bead {}", target, lasta);
            };
            lastb = self.append_gap_bead(lastb);
            lasta = next;
            self.align_bead_to_column(self.column_of(next), lastb);
            nexta = self.bead(next).next;
        }
        s.lasta = Some(lasta);
        s.lastb = Some(lastb);
    }
}
