use crate::alignment::engine::AlignmentEngine;
use crate::alignment::frames::AcousticFrames;
use crate::alignment::segmentation::SyllableSegmenter;
use crate::alignment::singing::SingingPostProcessor;
use crate::error::AlignmentError;
use crate::pipeline::traits::{BoundaryCorrector, Segmenter, SequenceAligner};
use crate::types::{CorrectedSpan, LineAlignment, PhonemeSequence, Syllable};

impl Segmenter for SyllableSegmenter {
    fn segment(&self, line_index: usize, text: &str) -> Vec<Syllable> {
        self.segment_line(line_index, text)
    }
}

impl SequenceAligner for AlignmentEngine {
    fn align(
        &self,
        sequence: &PhonemeSequence,
        frames: &AcousticFrames,
        probability_floor: Option<f32>,
    ) -> Result<LineAlignment, AlignmentError> {
        AlignmentEngine::align(self, sequence, frames, probability_floor)
    }
}

impl BoundaryCorrector for SingingPostProcessor {
    fn correct(
        &self,
        alignment: &LineAlignment,
        syllables: &[Syllable],
        frames: &AcousticFrames,
    ) -> Result<Vec<CorrectedSpan>, AlignmentError> {
        self.process(alignment, syllables, frames)
    }
}
