//! Prefix edit-distance extension.
//!
//! Grows an alignment outwards from a seed one error at a time, keeping the
//! furthest row reached on every diagonal. The extension stops as soon as it
//! runs off the end of either sequence; when the error budget runs out first,
//! or when the tail of the alignment is clearly worse than what came before
//! it, the best scoring prefix found so far is reported instead.

/// Errors allowed before the match limits start pruning diagonals.
const ERRORS_FOR_FREE: usize = 1;
/// Probability bound used to derive the per-error match limits.
const EDIT_DIST_PROB_BOUND: f64 = 1e-4;
const NORMAL_DISTRIB_THOLD: f64 = 3.62;
const MIN_BRANCH_END_DIST: i32 = 20;

/// Sentinel row for diagonals that are not live in a wave.
const DEAD: i32 = -2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    /// Bases of the first sequence covered by the extension.
    pub a_len: usize,
    /// Bases of the second sequence covered by the extension.
    pub b_len: usize,
    pub errors: usize,
    /// True when the extension reached the end of at least one sequence.
    pub to_end: bool,
    /// Signed gap trace relative to the extension start, without terminator.
    pub trace: Vec<i32>,
}

impl Extension {
    fn exact(len: usize) -> Self {
        Self {
            a_len: len,
            b_len: len,
            errors: 0,
            to_end: true,
            trace: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Extender {
    error_rate: f64,
    partial: bool,
    branch_match_value: f64,
    branch_tail_slope: f64,
}

impl Extender {
    /// `partial` stops an extension at the first drop in score instead of
    /// waiting for a clear branch point.
    pub fn new(error_rate: f64, partial: bool) -> Self {
        Self {
            error_rate,
            partial,
            branch_match_value: error_rate / (1.0 + error_rate),
            branch_tail_slope: if error_rate > 0.06 { 1.0 } else { 0.20 },
        }
    }

    pub fn error_rate(&self) -> f64 {
        self.error_rate
    }

    /// Error budget for an extension that may cover `len` bases.
    pub fn error_limit(&self, len: usize) -> usize {
        (len as f64 * self.error_rate + 1e-13) as usize + ERRORS_FOR_FREE
    }

    /// Extends rightwards from the start of both slices.
    pub fn forward(&self, a: &[u8], b: &[u8]) -> Extension {
        let limit = self.error_limit(a.len().min(b.len()));
        self.prefix_edit_dist(a, b, limit)
    }

    /// Extends leftwards from the end of both slices. The trace is expressed
    /// in forward coordinates of the slices.
    pub fn reverse(&self, a: &[u8], b: &[u8]) -> Extension {
        let ra = a.iter().rev().copied().collect::<Vec<_>>();
        let rb = b.iter().rev().copied().collect::<Vec<_>>();
        let mut ext = self.forward(&ra, &rb);

        let (la, lb) = (ext.a_len as i32, ext.b_len as i32);
        ext.trace = ext
            .trace
            .iter()
            .rev()
            .map(|&k| if k < 0 { -(la + k + 2) } else { lb - k + 2 })
            .collect();
        ext
    }

    fn prefix_edit_dist(&self, a: &[u8], b: &[u8], error_limit: usize) -> Extension {
        let m = a.len() as i32;
        let n = b.len() as i32;
        let limits = match_limits(self.error_rate, error_limit, a.len().max(b.len()));

        let mut row = slide(a, b, 0, 0);
        if row == m || row == n {
            return Extension::exact(row as usize);
        }

        let mut waves = vec![Wave::seeded(row)];
        let (mut left, mut right) = (0i32, 0i32);
        let (mut longest, mut best_d, mut best_e) = (0i32, 0i32, 0usize);
        let mut max_score = 0.0f64;
        let (mut max_score_len, mut max_score_d, mut max_score_e) = (0i32, 0i32, 0usize);

        for e in 1..=error_limit {
            left = (left - 1).max(-(e as i32));
            right = (right + 1).min(e as i32);

            let mut wave = Wave::new(e);
            for d in left..=right {
                let prev = &waves[e - 1];
                row = (prev.get(d) + 1).max(prev.get(d - 1)).max(prev.get(d + 1) + 1);
                row = slide(a, b, row, d);
                wave.set(d, row);

                if row == m || row + d == n {
                    let score = row as f64 * self.branch_match_value - e as f64;
                    let tail_len = row - max_score_len;
                    if (self.partial && score < max_score)
                        || (e as i32 > MIN_BRANCH_END_DIST / 2
                            && tail_len >= MIN_BRANCH_END_DIST
                            && (max_score - score) / tail_len as f64 >= self.branch_tail_slope)
                    {
                        waves.push(wave);
                        log::trace!(
                            "Branch point at row {} after {} errors",
                            max_score_len,
                            max_score_e
                        );
                        return self.finish(&waves, max_score_e, max_score_d, false);
                    }

                    // Prefer ending on a mismatch over a trailing deletion.
                    let mut d = d;
                    if row == m && prev.get(d + 1) + 1 == row && d < right {
                        d += 1;
                        wave.set(d, row);
                    }
                    waves.push(wave);
                    return self.finish(&waves, e, d, true);
                }
            }

            let limit = limits[e] as i32;
            while left <= right && left < 0 && wave.get(left) < limit {
                left += 1;
            }
            if left >= 0 {
                while left <= right && wave.get(left) + left < limit {
                    left += 1;
                }
            }
            if left > right {
                waves.push(wave);
                break;
            }
            while right > 0 && wave.get(right) + right < limit {
                right -= 1;
            }
            if right <= 0 {
                while right > left && wave.get(right) < limit {
                    right -= 1;
                }
            }
            wave.retain(left, right);

            for d in left..=right {
                if wave.get(d) > longest {
                    best_d = d;
                    best_e = e;
                    longest = wave.get(d);
                }
            }
            let score = longest as f64 * self.branch_match_value - e as f64;
            if score > max_score {
                max_score = score;
                max_score_len = longest;
                max_score_d = best_d;
                max_score_e = best_e;
            }
            waves.push(wave);
        }

        self.finish(&waves, max_score_e, max_score_d, false)
    }

    fn finish(&self, waves: &[Wave], e: usize, d: i32, to_end: bool) -> Extension {
        let row = waves[e].get(d);
        Extension {
            a_len: row as usize,
            b_len: (row + d) as usize,
            errors: e,
            to_end,
            trace: traceback(waves, e, d),
        }
    }
}

/// Furthest rows reached on each diagonal for one error count.
#[derive(Debug, Clone)]
struct Wave {
    errors: i32,
    rows: Vec<i32>,
}

impl Wave {
    fn new(errors: usize) -> Self {
        Self {
            errors: errors as i32,
            rows: vec![DEAD; 2 * errors + 5],
        }
    }

    fn seeded(row: i32) -> Self {
        let mut wave = Self::new(0);
        wave.set(0, row);
        wave
    }

    fn get(&self, d: i32) -> i32 {
        let idx = d + self.errors + 2;
        if idx < 0 || idx as usize >= self.rows.len() {
            DEAD
        } else {
            self.rows[idx as usize]
        }
    }

    fn set(&mut self, d: i32, row: i32) {
        let idx = (d + self.errors + 2) as usize;
        self.rows[idx] = row;
    }

    fn retain(&mut self, left: i32, right: i32) {
        for d in -self.errors - 2..=self.errors + 2 {
            if d < left || d > right {
                self.set(d, DEAD);
            }
        }
    }
}

fn slide(a: &[u8], b: &[u8], mut row: i32, d: i32) -> i32 {
    while row < a.len() as i32
        && row + d < b.len() as i32
        && same_base(a[row as usize], b[(row + d) as usize])
    {
        row += 1;
    }
    row
}

fn same_base(x: u8, y: u8) -> bool {
    x.eq_ignore_ascii_case(&y) || x == b'N' || y == b'N'
}

/// Walks back from `(e, d)` and emits the gaps in path order.
fn traceback(waves: &[Wave], e: usize, mut d: i32) -> Vec<i32> {
    let mut trace = Vec::with_capacity(e);
    for k in (1..=e).rev() {
        let prev = &waves[k - 1];
        let mut from = d;
        let mut max = 1 + prev.get(d);
        if prev.get(d - 1) > max {
            from = d - 1;
            max = prev.get(d - 1);
        }
        if 1 + prev.get(d + 1) > max {
            from = d + 1;
            max = 1 + prev.get(d + 1);
        }
        if from == d - 1 {
            trace.push(-(max + 1));
        } else if from == d + 1 {
            trace.push(max + d + 1);
        }
        d = from;
    }
    debug_assert_eq!(d, 0);
    trace.reverse();
    trace
}

/// Rows below `limits[e]` cannot plausibly carry `e` errors at this error rate.
fn match_limits(error_rate: f64, max_errors: usize, max_len: usize) -> Vec<usize> {
    let mut limits = vec![0; max_errors + 1];
    let mut start = 1;
    for e in ERRORS_FOR_FREE + 1..=max_errors {
        start = binomial_bound(e - ERRORS_FOR_FREE, error_rate, start, max_len);
        limits[e] = start - 1;
    }
    limits
}

/// Smallest length at which `e` or more errors become more likely than the
/// probability bound.
fn binomial_bound(e: usize, p: f64, start: usize, max_len: usize) -> usize {
    let q = 1.0 - p;
    for n in start.max(e)..max_len {
        let sum = if n <= 35 {
            let mut sum = 0.0;
            let mut coeff = 1.0;
            let mut p_pow = 1.0;
            let mut q_pow = q.powi(n as i32);
            for k in 0..e {
                if 1.0 - sum <= EDIT_DIST_PROB_BOUND {
                    break;
                }
                sum += coeff * p_pow * q_pow;
                coeff = coeff * (n - k) as f64 / (k + 1) as f64;
                p_pow *= p;
                q_pow /= q;
            }
            sum
        } else {
            let nf = n as f64;
            let z = (e as f64 - 0.5 - nf * p) / (nf * p * q).sqrt();
            if z <= NORMAL_DISTRIB_THOLD {
                return n;
            }
            let poisson = (-nf * p).exp();
            let mut sum = 0.0;
            let mut mu_pow = 1.0;
            let mut factorial = 1.0;
            for k in 0..e {
                sum += mu_pow * poisson / factorial;
                mu_pow *= nf * p;
                factorial *= (k + 1) as f64;
            }
            sum
        };
        if 1.0 - sum > EDIT_DIST_PROB_BOUND {
            return n;
        }
    }
    max_len.max(start)
}
