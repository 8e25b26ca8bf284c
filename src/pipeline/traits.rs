use crate::alignment::frames::AcousticFrames;
use crate::alignment::vocabulary::Vocabulary;
use crate::error::AlignmentError;
use crate::types::{AudioSegment, CorrectedSpan, LineAlignment, PhonemeSequence, Syllable};

/// Produces per-frame phoneme posteriors for a line's audio.
///
/// Implementations may block; the aligner calls them on a helper thread and
/// gives up after the configured timeout.
///
/// Giving up does not stop the call. The helper thread is detached and runs
/// `score` to completion, its result discarded, so a scorer that never
/// returns keeps one thread alive per timed-out line for the life of the
/// process. Implementations should bound their own work, e.g. with an
/// internal deadline, rather than rely on the timeout to reclaim them.
pub trait AcousticScorer: Send + Sync {
    fn score(&self, audio: &AudioSegment) -> Result<AcousticFrames, AlignmentError>;

    /// Symbol inventory the returned frames are indexed by.
    fn vocabulary(&self) -> &Vocabulary;

    fn frame_stride_ms(&self) -> f64;
}

pub trait Segmenter: Send + Sync {
    fn segment(&self, line_index: usize, text: &str) -> Vec<Syllable>;
}

pub trait SequenceAligner: Send + Sync {
    fn align(
        &self,
        sequence: &PhonemeSequence,
        frames: &AcousticFrames,
        probability_floor: Option<f32>,
    ) -> Result<LineAlignment, AlignmentError>;
}

pub trait BoundaryCorrector: Send + Sync {
    fn correct(
        &self,
        alignment: &LineAlignment,
        syllables: &[Syllable],
        frames: &AcousticFrames,
    ) -> Result<Vec<CorrectedSpan>, AlignmentError>;
}
