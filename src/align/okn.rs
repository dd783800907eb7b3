//! O(ND) reverse-wave aligner.
//!
//! Aligns `a[1..=alen]` against `b[1..=blen]` anchored at the common end of
//! both strings. Waves grow backwards from the finish diagonal until one of
//! the sequence starts is reached, so the alignment may begin anywhere on the
//! first row or column. The result is reported in the signed trace
//! convention: `+k` places a gap in `b` before its `k`-th base, `-k` places a
//! gap in `a` before its `k`-th base, both 1-based, and the trace ends in `0`.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OknTrace {
    /// Zero-terminated signed gap trace.
    pub trace: Vec<i32>,
    /// Start diagonal: a positive value skips that many leading bases of `a`,
    /// a negative value skips leading bases of `b`.
    pub spnt: i32,
}

impl OknTrace {
    /// Trace entries without the terminating zero.
    pub fn gaps(&self) -> &[i32] {
        &self.trace[..self.trace.len() - 1]
    }
}

/// Runs the reverse wave with the finish diagonal shifted by `spnt` and at
/// most `max_diff` differences. Returns `None` when the budget is exceeded.
pub fn okn_align(a: &[u8], b: &[u8], spnt: i32, max_diff: usize) -> Option<OknTrace> {
    let alen = a.len() as i32;
    let blen = b.len() as i32;
    let diag = (alen - blen) + spnt;
    let infinity = blen + 2;

    let zeroscript = OknTrace {
        trace: vec![0],
        spnt: diag,
    };
    if max_diff == 0 {
        return Some(zeroscript);
    }

    let mut j = if spnt < 0 { blen } else { blen - spnt };
    let mut i = diag + j;
    loop {
        if i <= 0 || j <= 0 {
            return Some(zeroscript);
        }
        if a[(i - 1) as usize] != b[(j - 1) as usize] {
            break;
        }
        i -= 1;
        j -= 1;
    }

    // Each wave carries two infinity cells at both ends; cell k of wave d
    // lives at index k + d + 2.
    let mut waves: Vec<Vec<i32>> = vec![vec![infinity, infinity, j, infinity, infinity]];

    let (level, finish_k, start) = 'grow: loop {
        let level = waves.len();
        if level > max_diff {
            return None;
        }
        let prev = &waves[level - 1];
        let mut wave = Vec::with_capacity(2 * level + 5);
        wave.push(infinity);
        wave.push(infinity);
        for k in -(level as i32)..=(level as i32) {
            let n = (k + level as i32 + 1) as usize;
            let mut j = prev[n] - 1;
            if prev[n - 1] - 1 < j {
                j = prev[n - 1] - 1;
            }
            if prev[n + 1] < j {
                j = prev[n + 1];
            }
            let mut i = (diag + k) + j;
            loop {
                if i <= 0 || j <= 0 {
                    let start = if i <= 0 { -j } else { i };
                    break 'grow (level, k, start);
                }
                if a[(i - 1) as usize] != b[(j - 1) as usize] {
                    break;
                }
                i -= 1;
                j -= 1;
            }
            wave.push(j);
        }
        wave.push(infinity);
        wave.push(infinity);
        waves.push(wave);
    };

    let mut trace = Vec::with_capacity(level + 1);
    let mut k = finish_k;
    for d in (0..level).rev() {
        let wave = &waves[d];
        let n = (k + d as i32 + 2) as usize;
        let mut j = wave[n] - 1;
        let mut step = 0;
        if wave[n - 1] - 1 < j {
            j = wave[n - 1] - 1;
            step = -1;
        }
        if wave[n + 1] < j {
            j = wave[n + 1];
            step = 1;
        }
        if step < 0 {
            trace.push(-((diag + k) + (j + 1)));
            k -= 1;
        } else if step > 0 {
            trace.push(j + 1);
            k += 1;
        }
    }
    trace.push(0);

    Some(OknTrace { trace, spnt: start })
}
