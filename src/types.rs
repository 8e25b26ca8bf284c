use std::ops::Range;
use std::sync::Arc;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhonemeClass {
    Vowel,
    Consonant,
    /// Placeholder for graphemes the vocabulary cannot express.
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhonemeToken {
    /// Column of this phoneme in the acoustic probability matrix.
    pub symbol: usize,
    pub grapheme: char,
    pub class: PhonemeClass,
}

impl PhonemeToken {
    pub fn is_vowel(&self) -> bool {
        self.class == PhonemeClass::Vowel
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Syllable {
    pub text: String,
    pub phonemes: Vec<PhonemeToken>,
    /// Position of the syllable within its lyric line.
    pub index: usize,
    /// True when this syllable starts a new word.
    pub word_boundary: bool,
    pub line_index: usize,
    /// Set when the syllable came from the grapheme fallback.
    pub low_confidence: bool,
    /// Sung inside parentheses in the lyric text.
    pub backing_vocal: bool,
    /// Byte range of `text` inside the normalized line.
    pub char_range: Range<usize>,
}

impl Syllable {
    /// Phoneme indices of the nucleus: the first contiguous run of vowels.
    pub fn nucleus_range(&self) -> Option<Range<usize>> {
        let start = self.phonemes.iter().position(PhonemeToken::is_vowel)?;
        let len = self.phonemes[start..]
            .iter()
            .take_while(|p| p.is_vowel())
            .count();
        Some(start..start + len)
    }
}

/// Audio for one lyric line. `offset_seconds` places the segment on the
/// song timeline.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub samples: Arc<[f32]>,
    pub sample_rate_hz: u32,
    pub offset_seconds: f64,
}

#[derive(Debug, Clone)]
pub struct LyricLine {
    pub index: usize,
    pub text: String,
    pub audio: AudioSegment,
}

/// Flattened phonemes of one line, each tagged with its owning syllable.
#[derive(Debug, Clone, PartialEq)]
pub struct PhonemeSequence {
    pub tokens: Vec<PhonemeToken>,
    pub owners: Vec<usize>,
    pub leading_silence: bool,
    pub trailing_silence: bool,
}

impl PhonemeSequence {
    pub fn from_syllables(syllables: &[Syllable], edge_silence: bool) -> Self {
        let mut tokens = Vec::new();
        let mut owners = Vec::new();
        for (idx, syllable) in syllables.iter().enumerate() {
            for phoneme in &syllable.phonemes {
                tokens.push(phoneme.clone());
                owners.push(idx);
            }
        }
        Self {
            tokens,
            owners,
            leading_silence: edge_silence,
            trailing_silence: edge_silence,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Frame range of one phoneme. Interval is `[start_frame, end_frame)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlignmentSpan {
    pub phoneme_index: usize,
    pub syllable_index: usize,
    pub symbol: usize,
    pub start_frame: usize,
    pub end_frame: usize,
    /// Mean natural-log posterior of `symbol` over the span.
    pub mean_log_prob: f32,
}

impl AlignmentSpan {
    pub fn len(&self) -> usize {
        self.end_frame - self.start_frame
    }

    pub fn is_empty(&self) -> bool {
        self.end_frame == self.start_frame
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineAlignment {
    pub spans: Vec<AlignmentSpan>,
    pub frame_count: usize,
    pub leading_silence: Range<usize>,
    pub trailing_silence: Range<usize>,
    pub path_cost: f64,
    /// Epsilon that had to be added to every probability, if any.
    pub probability_floor: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionKind {
    ElongationMerge,
    MelismaRedistribution,
    VibratoFilter,
}

impl CorrectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CorrectionKind::ElongationMerge => "elongation_merge",
            CorrectionKind::MelismaRedistribution => "melisma_redistribution",
            CorrectionKind::VibratoFilter => "vibrato_filter",
        }
    }
}

/// Why a triggered correction left a syllable untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    LexicalBoundary,
    WouldCollapseNeighbor,
    WouldBreakInvariant,
    ShiftTooLarge,
    Pinned,
    RealignmentFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SkippedCorrection {
    pub kind: CorrectionKind,
    pub reason: SkipReason,
}

/// Syllable-level span after singing corrections. Interval is
/// `[start_frame, end_frame)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectedSpan {
    pub syllable_index: usize,
    pub line_index: usize,
    pub start_frame: usize,
    pub end_frame: usize,
    /// Frames of the sung vowel, when the syllable has one.
    pub nucleus: Option<Range<usize>>,
    pub low_confidence: bool,
    pub corrections: Vec<CorrectionKind>,
    pub skipped: Vec<SkippedCorrection>,
}

impl CorrectedSpan {
    pub fn len(&self) -> usize {
        self.end_frame - self.start_frame
    }

    pub fn is_empty(&self) -> bool {
        self.end_frame == self.start_frame
    }

    /// Frame bounds only, ignoring bookkeeping.
    pub fn frames(&self) -> (usize, usize, Option<Range<usize>>) {
        (self.start_frame, self.end_frame, self.nucleus.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyllableTiming {
    pub syllable_index: usize,
    pub line_index: usize,
    pub text: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub low_confidence: bool,
    pub backing_vocal: bool,
}

impl SyllableTiming {
    /// Millisecond interval is [start_ms, end_ms), i.e. start inclusive/end exclusive.
    pub fn start_ms(&self) -> u64 {
        (self.start_seconds * 1000.0).round().max(0.0) as u64
    }

    pub fn end_ms(&self) -> u64 {
        (self.end_seconds * 1000.0).round().max(0.0) as u64
    }
}

/// Everything produced for one successfully aligned line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineOutput {
    pub line_index: usize,
    pub syllables: Vec<Syllable>,
    pub corrected: Vec<CorrectedSpan>,
    pub timings: Vec<SyllableTiming>,
    pub probability_floor_used: bool,
}

impl LineOutput {
    pub fn is_degraded(&self) -> bool {
        self.probability_floor_used
            || self.syllables.iter().any(|s| s.low_confidence)
            || self.corrected.iter().any(|s| !s.skipped.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(symbol: usize, grapheme: char, class: PhonemeClass) -> PhonemeToken {
        PhonemeToken {
            symbol,
            grapheme,
            class,
        }
    }

    fn syllable(index: usize, phonemes: Vec<PhonemeToken>) -> Syllable {
        Syllable {
            text: phonemes.iter().map(|p| p.grapheme).collect(),
            phonemes,
            index,
            word_boundary: index == 0,
            line_index: 0,
            low_confidence: false,
            backing_vocal: false,
            char_range: 0..0,
        }
    }

    #[test]
    fn nucleus_range_covers_first_vowel_run() {
        let s = syllable(
            0,
            vec![
                token(1, 's', PhonemeClass::Consonant),
                token(2, 'o', PhonemeClass::Vowel),
                token(3, 'u', PhonemeClass::Vowel),
                token(4, 'n', PhonemeClass::Consonant),
            ],
        );
        assert_eq!(s.nucleus_range(), Some(1..3));
    }

    #[test]
    fn nucleus_range_none_without_vowel() {
        let s = syllable(0, vec![token(4, 'n', PhonemeClass::Consonant)]);
        assert_eq!(s.nucleus_range(), None);
    }

    #[test]
    fn phoneme_sequence_tracks_owners() {
        let syllables = vec![
            syllable(
                0,
                vec![
                    token(1, 'l', PhonemeClass::Consonant),
                    token(2, 'a', PhonemeClass::Vowel),
                ],
            ),
            syllable(1, vec![token(2, 'a', PhonemeClass::Vowel)]),
        ];
        let seq = PhonemeSequence::from_syllables(&syllables, true);
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.owners, vec![0, 0, 1]);
        assert!(seq.leading_silence && seq.trailing_silence);
    }

    #[test]
    fn syllable_timing_ms_rounds() {
        let t = SyllableTiming {
            syllable_index: 0,
            line_index: 0,
            text: "la".to_string(),
            start_seconds: 0.2,
            end_seconds: 0.4004,
            low_confidence: false,
            backing_vocal: false,
        };
        assert_eq!(t.start_ms(), 200);
        assert_eq!(t.end_ms(), 400);
    }
}
