//! Syllable-level forced alignment of song lyrics against singing audio.
//!
//! Each lyric line is segmented into syllables, scored by an
//! [`AcousticScorer`], aligned with a segmental Viterbi search and then
//! corrected for sung vowel elongation, melisma and vibrato before timings
//! are emitted on the song timeline.

pub mod alignment;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod types;

pub use alignment::frames::AcousticFrames;
pub use alignment::language::LanguageProfile;
pub use alignment::report::{BatchReport, LineFailure};
pub use alignment::segmentation::{alignment_transcript, lyric_lines, normalize_lyric_line};
pub use alignment::vocabulary::Vocabulary;
pub use config::AlignerConfig;
pub use error::{AlignmentError, BatchError, ConfigurationError, SegmentationError};
pub use pipeline::batch::{BatchOutcome, CancellationToken};
pub use pipeline::builder::KaraokeAlignerBuilder;
#[cfg(feature = "candle")]
pub use pipeline::candle_scorer::CandleCtcScorer;
pub use pipeline::runtime::KaraokeAligner;
pub use pipeline::traits::{AcousticScorer, BoundaryCorrector, Segmenter, SequenceAligner};
pub use types::{AudioSegment, CorrectedSpan, LineOutput, LyricLine, Syllable, SyllableTiming};
