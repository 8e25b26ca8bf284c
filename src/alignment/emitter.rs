use crate::types::{CorrectedSpan, Syllable, SyllableTiming};

/// Converts corrected frame spans into song-timeline timings.
#[derive(Debug, Clone, Copy)]
pub struct TimingEmitter {
    frame_stride_ms: f64,
    offset_seconds: f64,
}

impl TimingEmitter {
    pub fn new(frame_stride_ms: f64, offset_seconds: f64) -> Self {
        Self {
            frame_stride_ms,
            offset_seconds,
        }
    }

    pub fn frame_to_seconds(&self, frame: usize) -> f64 {
        self.offset_seconds + frame as f64 * self.frame_stride_ms / 1000.0
    }

    pub fn emit(&self, corrected: &[CorrectedSpan], syllables: &[Syllable]) -> Vec<SyllableTiming> {
        let timings: Vec<SyllableTiming> = corrected
            .iter()
            .zip(syllables)
            .map(|(span, syllable)| SyllableTiming {
                syllable_index: span.syllable_index,
                line_index: span.line_index,
                text: syllable.text.clone(),
                start_seconds: self.frame_to_seconds(span.start_frame),
                end_seconds: self.frame_to_seconds(span.end_frame),
                low_confidence: span.low_confidence || syllable.low_confidence,
                backing_vocal: syllable.backing_vocal,
            })
            .collect();
        debug_assert!(
            timings
                .windows(2)
                .all(|w| w[0].end_seconds <= w[1].start_seconds + 1e-9),
            "syllable timings must be monotonic"
        );
        timings
    }
}
