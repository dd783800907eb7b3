use std::fmt;

/// Alignment operation kinds, numbered as they appear in packed alignment arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditKind {
    /// Base of the first sequence with no partner in the second.
    Del = 0,
    /// Base of the second sequence with no partner in the first.
    Ins = 1,
    /// Aligned pair of differing bases.
    Sub = 2,
    /// Aligned pair of identical bases.
    Mov = 3,
    /// Sentinel used while condensing; never survives into a finished script.
    Nop = 4,
}

impl EditKind {
    pub fn opcode(self) -> i32 {
        self as i32
    }

    /// Parses an opcode found in a packed alignment array. `Nop` is not a valid packed opcode.
    pub fn from_opcode(code: i32) -> Option<Self> {
        match code {
            0 => Some(EditKind::Del),
            1 => Some(EditKind::Ins),
            2 => Some(EditKind::Sub),
            3 => Some(EditKind::Mov),
            _ => None,
        }
    }

    pub fn consumes_first(self) -> bool {
        matches!(self, EditKind::Del | EditKind::Sub | EditKind::Mov)
    }

    pub fn consumes_second(self) -> bool {
        matches!(self, EditKind::Ins | EditKind::Sub | EditKind::Mov)
    }

    pub fn is_aligned(self) -> bool {
        matches!(self, EditKind::Sub | EditKind::Mov)
    }
}

impl From<i32> for EditKind {
    fn from(code: i32) -> Self {
        match EditKind::from_opcode(code) {
            Some(kind) => kind,
            None => panic!("Invalid alignment opcode {}", code),
        }
    }
}

impl fmt::Display for EditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditKind::Del => write!(f, "D"),
            EditKind::Ins => write!(f, "I"),
            EditKind::Sub => write!(f, "X"),
            EditKind::Mov => write!(f, "M"),
            EditKind::Nop => write!(f, "N"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditOp {
    pub kind: EditKind,
    pub count: usize,
}

/// Ordered run-length operations describing one pairwise alignment.
///
/// The aligner appends raw runs in path order; adjacent runs of the same
/// kind are only merged by [`EditScript::condense`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditScript {
    ops: Vec<EditOp>,
}

impl EditScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a run; empty runs are ignored.
    pub fn push(&mut self, kind: EditKind, count: usize) {
        if count > 0 {
            self.ops.push(EditOp { kind, count });
        }
    }

    /// Appends the `Nop` sentinel that marks the end of a raw script.
    pub fn terminate(&mut self) {
        self.ops.push(EditOp {
            kind: EditKind::Nop,
            count: 0,
        });
    }

    /// Merges adjacent runs of the same kind in place and drops sentinels.
    pub fn condense(&mut self) {
        let mut write = 0;
        for read in 0..self.ops.len() {
            let op = self.ops[read];
            if op.kind == EditKind::Nop || op.count == 0 {
                continue;
            }
            if write > 0 && self.ops[write - 1].kind == op.kind {
                self.ops[write - 1].count += op.count;
            } else {
                self.ops[write] = op;
                write += 1;
            }
        }
        self.ops.truncate(write);
    }

    pub fn ops(&self) -> &[EditOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EditOp> {
        self.ops.iter()
    }

    /// Number of first-sequence bases covered by the script.
    pub fn len1(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| op.kind.consumes_first())
            .map(|op| op.count)
            .sum()
    }

    /// Number of second-sequence bases covered by the script.
    pub fn len2(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| op.kind.consumes_second())
            .map(|op| op.count)
            .sum()
    }

    pub fn total(&self, kind: EditKind) -> usize {
        self.ops
            .iter()
            .filter(|op| op.kind == kind)
            .map(|op| op.count)
            .sum()
    }
}

impl fmt::Display for EditScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for op in &self.ops {
            write!(f, "{}{}", op.count, op.kind)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a EditScript {
    type Item = &'a EditOp;
    type IntoIter = std::slice::Iter<'a, EditOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}
