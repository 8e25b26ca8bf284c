use thiserror::Error;

use crate::alignment::report::LineFailure;

/// A word could not be mapped onto phonemes by the language profile.
///
/// Never fatal: the segmenter falls back to a grapheme-level syllable and
/// flags it `low_confidence`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentationError {
    #[error("grapheme {grapheme:?} in word {word:?} has no phoneme mapping")]
    UnmappedGrapheme { word: String, grapheme: char },
    #[error("word {word:?} has no syllable nucleus")]
    NoSyllableNucleus { word: String },
    #[error("empty word")]
    EmptyWord,
}

/// Failure aligning one lyric line. Fatal for that line only.
#[derive(Debug, Error)]
pub enum AlignmentError {
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON parse error while {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{context}: {message}")]
    Runtime {
        context: &'static str,
        message: String,
    },
    #[error("audio too short for lyric line: {frames} frames < {phonemes} phonemes")]
    TooFewFrames { frames: usize, phonemes: usize },
    #[error("no finite-cost alignment path for {phonemes} phonemes over {frames} frames")]
    NoFeasiblePath { frames: usize, phonemes: usize },
    #[error("acoustic scorer did not answer within {timeout_ms} ms")]
    ScorerTimeout { timeout_ms: u64 },
    #[error("acoustic scorer unavailable: {message}")]
    ScorerUnavailable { message: String },
    #[error("invalid acoustic frames: {message}")]
    InvalidFrames { message: String },
    #[error("alignment cancelled before the line was processed")]
    Cancelled,
}

impl AlignmentError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    pub fn runtime(context: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Runtime {
            context,
            message: err.to_string(),
        }
    }

    pub fn scorer_unavailable(message: impl Into<String>) -> Self {
        Self::ScorerUnavailable {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_frames(message: impl Into<String>) -> Self {
        Self::InvalidFrames {
            message: message.into(),
        }
    }

    /// Stable label used in failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::Json { .. } => "json",
            Self::Runtime { .. } => "runtime",
            Self::TooFewFrames { .. } => "too_few_frames",
            Self::NoFeasiblePath { .. } => "no_feasible_path",
            Self::ScorerTimeout { .. } => "scorer_timeout",
            Self::ScorerUnavailable { .. } => "scorer_unavailable",
            Self::InvalidFrames { .. } => "invalid_frames",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Invalid tunables or profile selection, surfaced before any line runs.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("invalid `{field}` = {value}: {reason}")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("unknown language profile `{0}`")]
    UnknownLanguage(String),
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON parse error while {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("missing pipeline component: {0}")]
    MissingComponent(&'static str),
}

impl ConfigurationError {
    pub(crate) fn invalid(field: &'static str, value: impl ToString, reason: &'static str) -> Self {
        Self::InvalidValue {
            field,
            value: value.to_string(),
            reason,
        }
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("all {} lyric lines failed to align", .failures.len())]
    AllLinesFailed { failures: Vec<LineFailure> },
}
