use crate::error::AlignmentError;

const ROW_SUM_TOLERANCE: f32 = 1e-3;

/// Frame-indexed posterior matrix produced by an acoustic scorer.
///
/// Rows hold probabilities (not log-probabilities) over the vocabulary and
/// sum to at most one; the remainder is implicit silence.
#[derive(Debug, Clone, PartialEq)]
pub struct AcousticFrames {
    probs: Vec<Vec<f32>>,
    blank_id: usize,
    frame_stride_ms: f64,
}

impl AcousticFrames {
    pub fn new(
        probs: Vec<Vec<f32>>,
        blank_id: usize,
        frame_stride_ms: f64,
    ) -> Result<Self, AlignmentError> {
        if !(frame_stride_ms.is_finite() && frame_stride_ms > 0.0) {
            return Err(AlignmentError::invalid_frames(format!(
                "frame stride must be positive, got {frame_stride_ms}"
            )));
        }
        let width = probs.first().map_or(0, Vec::len);
        for (t, row) in probs.iter().enumerate() {
            if row.len() != width {
                return Err(AlignmentError::invalid_frames(format!(
                    "frame {t} has {} columns, expected {width}",
                    row.len()
                )));
            }
            if let Some(bad) = row.iter().find(|p| !(p.is_finite() && (0.0..=1.0).contains(*p))) {
                return Err(AlignmentError::invalid_frames(format!(
                    "frame {t} holds probability {bad} outside [0, 1]"
                )));
            }
            let sum: f32 = row.iter().sum();
            if sum > 1.0 + ROW_SUM_TOLERANCE {
                return Err(AlignmentError::invalid_frames(format!(
                    "frame {t} probabilities sum to {sum:.4} > 1"
                )));
            }
        }
        if !probs.is_empty() && blank_id >= width {
            return Err(AlignmentError::invalid_frames(format!(
                "blank id {blank_id} outside vocabulary of {width}"
            )));
        }
        Ok(Self {
            probs,
            blank_id,
            frame_stride_ms,
        })
    }

    /// Builds frames from log-probabilities (e.g. a CTC log-softmax output).
    pub fn from_log_probs(
        log_probs: &[Vec<f32>],
        blank_id: usize,
        frame_stride_ms: f64,
    ) -> Result<Self, AlignmentError> {
        let probs = log_probs
            .iter()
            .map(|row| row.iter().map(|lp| lp.exp().min(1.0)).collect())
            .collect();
        Self::new(probs, blank_id, frame_stride_ms)
    }

    pub fn frame_count(&self) -> usize {
        self.probs.len()
    }

    pub fn vocab_size(&self) -> usize {
        self.probs.first().map_or(0, Vec::len)
    }

    pub fn blank_id(&self) -> usize {
        self.blank_id
    }

    pub fn frame_stride_ms(&self) -> f64 {
        self.frame_stride_ms
    }

    pub fn frame(&self, t: usize) -> &[f32] {
        &self.probs[t]
    }

    /// Blank column plus the unassigned remainder of the row.
    pub fn silence_prob(&self, t: usize) -> f32 {
        let row = &self.probs[t];
        let sum: f32 = row.iter().sum();
        let blank = row.get(self.blank_id).copied().unwrap_or(0.0);
        (blank + (1.0 - sum).max(0.0)).min(1.0)
    }

    /// Probability of `symbol` at frame `t`; the blank symbol reads as silence.
    pub fn prob(&self, t: usize, symbol: usize) -> f32 {
        if symbol == self.blank_id {
            return self.silence_prob(t);
        }
        self.probs[t].get(symbol).copied().unwrap_or(0.0)
    }

    pub fn best_non_blank_prob(&self, t: usize) -> f32 {
        self.probs[t]
            .iter()
            .enumerate()
            .filter(|&(id, _)| id != self.blank_id)
            .map(|(_, &p)| p)
            .fold(0.0, f32::max)
    }

    /// Highest-probability non-blank symbol at frame `t`.
    pub fn dominant_symbol(&self, t: usize) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (id, &p) in self.probs[t].iter().enumerate() {
            if id == self.blank_id {
                continue;
            }
            if best.map_or(true, |(_, bp)| p > bp) {
                best = Some((id, p));
            }
        }
        best
    }

    pub fn frames_to_seconds(&self, frames: usize) -> f64 {
        frames as f64 * self.frame_stride_ms / 1000.0
    }

    /// Converts a duration to a (fractional) frame count.
    pub fn ms_to_frames(&self, ms: f64) -> f64 {
        ms / self.frame_stride_ms
    }

    /// Column-wise transform used by posterior smoothing; skips validation
    /// because filtered rows may slightly exceed unit mass.
    pub(crate) fn map_columns(&self, mut f: impl FnMut(&[f32]) -> Vec<f32>) -> Self {
        let t_len = self.frame_count();
        let width = self.vocab_size();
        let mut probs = vec![vec![0.0f32; width]; t_len];
        let mut column = vec![0.0f32; t_len];
        for v in 0..width {
            for (t, row) in self.probs.iter().enumerate() {
                column[t] = row[v];
            }
            let filtered = f(&column);
            for (t, p) in filtered.into_iter().enumerate().take(t_len) {
                probs[t][v] = p.clamp(0.0, 1.0);
            }
        }
        Self {
            probs,
            blank_id: self.blank_id,
            frame_stride_ms: self.frame_stride_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_prob_includes_unassigned_mass() {
        let frames = AcousticFrames::new(vec![vec![0.1, 0.5, 0.2]], 0, 20.0).unwrap();
        assert!((frames.silence_prob(0) - 0.3).abs() < 1e-6);
        assert!((frames.prob(0, 0) - 0.3).abs() < 1e-6);
        assert!((frames.prob(0, 1) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn rejects_rows_summing_above_one() {
        let err = AcousticFrames::new(vec![vec![0.6, 0.6]], 0, 20.0).unwrap_err();
        assert_eq!(err.kind(), "invalid_frames");
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = AcousticFrames::new(vec![vec![0.1, 0.2], vec![0.1]], 0, 20.0).unwrap_err();
        assert_eq!(err.kind(), "invalid_frames");
    }

    #[test]
    fn rejects_blank_outside_vocab() {
        assert!(AcousticFrames::new(vec![vec![0.1, 0.2]], 5, 20.0).is_err());
    }

    #[test]
    fn from_log_probs_exponentiates() {
        let frames =
            AcousticFrames::from_log_probs(&[vec![(0.25f32).ln(), (0.75f32).ln()]], 0, 20.0)
                .unwrap();
        assert!((frames.prob(0, 1) - 0.75).abs() < 1e-5);
    }

    #[test]
    fn dominant_symbol_ignores_blank() {
        let frames = AcousticFrames::new(vec![vec![0.7, 0.1, 0.2]], 0, 20.0).unwrap();
        assert_eq!(frames.dominant_symbol(0).map(|(id, _)| id), Some(2));
        assert!((frames.best_non_blank_prob(0) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn time_conversions_follow_stride() {
        let frames = AcousticFrames::new(vec![vec![1.0]; 4], 0, 20.0).unwrap();
        assert!((frames.frames_to_seconds(50) - 1.0).abs() < 1e-12);
        assert!((frames.ms_to_frames(80.0) - 4.0).abs() < 1e-12);
    }
}
