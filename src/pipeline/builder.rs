use std::sync::Arc;

use crate::alignment::engine::AlignmentEngine;
use crate::alignment::language::LanguageProfile;
use crate::alignment::segmentation::SyllableSegmenter;
use crate::alignment::singing::SingingPostProcessor;
use crate::config::AlignerConfig;
use crate::error::ConfigurationError;
use crate::pipeline::runtime::{KaraokeAligner, KaraokeAlignerParts};
use crate::pipeline::traits::{AcousticScorer, BoundaryCorrector, Segmenter, SequenceAligner};

pub struct KaraokeAlignerBuilder {
    config: AlignerConfig,
    scorer: Option<Arc<dyn AcousticScorer>>,
    segmenter: Option<Box<dyn Segmenter>>,
    sequence_aligner: Option<Box<dyn SequenceAligner>>,
    corrector: Option<Box<dyn BoundaryCorrector>>,
}

impl KaraokeAlignerBuilder {
    pub fn new(config: AlignerConfig) -> Self {
        Self {
            config,
            scorer: None,
            segmenter: None,
            sequence_aligner: None,
            corrector: None,
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn AcousticScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn with_segmenter(mut self, segmenter: Box<dyn Segmenter>) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    pub fn with_sequence_aligner(mut self, sequence_aligner: Box<dyn SequenceAligner>) -> Self {
        self.sequence_aligner = Some(sequence_aligner);
        self
    }

    pub fn with_boundary_corrector(mut self, corrector: Box<dyn BoundaryCorrector>) -> Self {
        self.corrector = Some(corrector);
        self
    }

    /// Validates the configuration and fills unset stages with the defaults
    /// for the configured language.
    pub fn build(self) -> Result<KaraokeAligner, ConfigurationError> {
        self.config.validate()?;
        let profile = LanguageProfile::by_id(&self.config.language)?;
        let scorer = self
            .scorer
            .ok_or(ConfigurationError::MissingComponent("acoustic scorer"))?;
        let frame_stride_ms = scorer.frame_stride_ms();
        if !(frame_stride_ms.is_finite() && frame_stride_ms > 0.0) {
            return Err(ConfigurationError::invalid(
                "frame_stride_ms",
                frame_stride_ms,
                "scorer must declare a positive frame stride",
            ));
        }

        tracing::debug!(
            language = profile.code(),
            frame_stride_ms,
            vocab_size = scorer.vocabulary().size(),
            "building karaoke aligner"
        );

        let config = self.config;
        let segmenter: Box<dyn Segmenter> = match self.segmenter {
            Some(segmenter) => segmenter,
            None => Box::new(SyllableSegmenter::new(profile, scorer.vocabulary().clone())),
        };
        Ok(KaraokeAligner::from_parts(KaraokeAlignerParts {
            segmenter,
            sequence_aligner: self
                .sequence_aligner
                .unwrap_or_else(|| Box::new(AlignmentEngine::new(profile, &config))),
            corrector: self
                .corrector
                .unwrap_or_else(|| Box::new(SingingPostProcessor::new(profile, &config))),
            scorer,
            config,
        }))
    }
}
