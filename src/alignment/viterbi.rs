use std::ops::Range;

/// Relative tolerance under which two primary path costs count as a tie.
const TIE_RELATIVE_TOLERANCE: f64 = 1e-9;

/// One state of the alignment lattice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SegmentState {
    /// Optional states (edge silence) may occupy zero frames.
    pub optional: bool,
    /// Expected run length in frames; `None` disables the duration penalty.
    pub prior_frames: Option<f64>,
    /// Vowel runs feed the evenness tie-break.
    pub vowel: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SegmentPath {
    /// Half-open frame range per state, contiguous and covering `[0, T)`.
    pub ranges: Vec<Range<usize>>,
    pub cost: f64,
    pub evenness: f64,
}

#[derive(Debug, Clone, Copy)]
struct PathCost {
    primary: f64,
    evenness: f64,
}

impl PathCost {
    const INFEASIBLE: Self = Self {
        primary: f64::INFINITY,
        evenness: f64::INFINITY,
    };

    fn is_feasible(self) -> bool {
        self.primary.is_finite()
    }

    /// Lexicographic order: primary cost first, then the more even vowel
    /// distribution among (near-)equal primaries.
    fn better_than(self, other: Self) -> bool {
        if !self.is_feasible() {
            return false;
        }
        if !other.is_feasible() {
            return true;
        }
        let scale = 1.0 + self.primary.abs().max(other.primary.abs());
        if (self.primary - other.primary).abs() <= TIE_RELATIVE_TOLERANCE * scale {
            self.evenness < other.evenness
        } else {
            self.primary < other.primary
        }
    }
}

/// Per-state prefix sums of emission costs. Infinite costs are counted
/// separately so a run touching one is rejected without NaN arithmetic.
struct EmissionPrefix {
    sums: Vec<Vec<f64>>,
    blocked: Vec<Vec<u32>>,
}

impl EmissionPrefix {
    fn new(emission_costs: &[Vec<f64>], t_len: usize) -> Self {
        let mut sums = Vec::with_capacity(emission_costs.len());
        let mut blocked = Vec::with_capacity(emission_costs.len());
        for row in emission_costs {
            let mut s = vec![0.0f64; t_len + 1];
            let mut b = vec![0u32; t_len + 1];
            for t in 0..t_len {
                let c = row[t];
                if c.is_finite() {
                    s[t + 1] = s[t] + c;
                    b[t + 1] = b[t];
                } else {
                    s[t + 1] = s[t];
                    b[t + 1] = b[t] + 1;
                }
            }
            sums.push(s);
            blocked.push(b);
        }
        Self { sums, blocked }
    }

    fn run_cost(&self, state: usize, range: Range<usize>) -> Option<f64> {
        if self.blocked[state][range.end] != self.blocked[state][range.start] {
            return None;
        }
        Some(self.sums[state][range.end] - self.sums[state][range.start])
    }
}

/// Segmental (explicit-duration) Viterbi over a `states × frames` lattice.
///
/// Every state takes one contiguous run of frames, in order, and the runs
/// tile `[0, t_len)`. A run of state `k` over `[a, b)` costs the sum of its
/// emission costs plus `duration_weight · ln(d / prior)²`. Returns `None`
/// when no finite-cost tiling exists.
pub(crate) fn segmental_viterbi(
    states: &[SegmentState],
    emission_costs: &[Vec<f64>],
    t_len: usize,
    duration_weight: f64,
) -> Option<SegmentPath> {
    let s_len = states.len();
    debug_assert_eq!(emission_costs.len(), s_len);
    if s_len == 0 {
        return (t_len == 0).then(|| SegmentPath {
            ranges: Vec::new(),
            cost: 0.0,
            evenness: 0.0,
        });
    }

    let mut mandatory_before = vec![0usize; s_len + 1];
    for (k, state) in states.iter().enumerate() {
        mandatory_before[k + 1] = mandatory_before[k] + usize::from(!state.optional);
    }
    let mandatory_total = mandatory_before[s_len];
    if mandatory_total > t_len {
        return None;
    }

    let prefix = EmissionPrefix::new(emission_costs, t_len);
    let width = t_len + 1;
    let mut prev = vec![PathCost::INFEASIBLE; width];
    let mut curr = vec![PathCost::INFEASIBLE; width];
    let mut bp = vec![usize::MAX; s_len * width];
    prev[0] = PathCost {
        primary: 0.0,
        evenness: 0.0,
    };

    for (k, state) in states.iter().enumerate() {
        curr.fill(PathCost::INFEASIBLE);
        let min_len = usize::from(!state.optional);
        let earliest_start = mandatory_before[k];
        let earliest_end = mandatory_before[k + 1];
        let latest_end = t_len - (mandatory_total - mandatory_before[k + 1]);
        let bp_offset = k * width;

        for end in earliest_end..=latest_end {
            let mut best = PathCost::INFEASIBLE;
            let mut best_start = usize::MAX;
            let Some(last_start) = end.checked_sub(min_len) else {
                continue;
            };
            for start in earliest_start..=last_start {
                let before = prev[start];
                if !before.is_feasible() {
                    continue;
                }
                let Some(run) = run_cost(&prefix, k, state, start..end, duration_weight) else {
                    continue;
                };
                let cand = PathCost {
                    primary: before.primary + run.primary,
                    evenness: before.evenness + run.evenness,
                };
                if cand.better_than(best) {
                    best = cand;
                    best_start = start;
                }
            }
            curr[end] = best;
            bp[bp_offset + end] = best_start;
        }

        std::mem::swap(&mut prev, &mut curr);
    }

    let total = prev[t_len];
    if !total.is_feasible() {
        return None;
    }

    let mut ranges = vec![0..0; s_len];
    let mut end = t_len;
    for k in (0..s_len).rev() {
        let start = bp[k * width + end];
        debug_assert!(start != usize::MAX && start <= end);
        ranges[k] = start..end;
        end = start;
    }
    debug_assert_eq!(end, 0, "segment path must start at frame 0");

    Some(SegmentPath {
        ranges,
        cost: total.primary,
        evenness: total.evenness,
    })
}

fn run_cost(
    prefix: &EmissionPrefix,
    k: usize,
    state: &SegmentState,
    range: Range<usize>,
    duration_weight: f64,
) -> Option<PathCost> {
    let d = range.len();
    if d == 0 {
        return Some(PathCost {
            primary: 0.0,
            evenness: 0.0,
        });
    }
    let emission = prefix.run_cost(k, range)?;
    let duration = match state.prior_frames {
        Some(prior) if duration_weight > 0.0 && prior > 0.0 => {
            let ratio = (d as f64 / prior).ln();
            duration_weight * ratio * ratio
        }
        _ => 0.0,
    };
    let evenness = if state.vowel { (d * d) as f64 } else { 0.0 };
    Some(PathCost {
        primary: emission + duration,
        evenness,
    })
}
