use std::sync::Arc;

use crossbeam_channel::RecvTimeoutError;

use crate::alignment::emitter::TimingEmitter;
use crate::alignment::frames::AcousticFrames;
use crate::config::AlignerConfig;
use crate::error::AlignmentError;
use crate::pipeline::traits::{AcousticScorer, BoundaryCorrector, Segmenter, SequenceAligner};
use crate::types::{AudioSegment, LineOutput, LyricLine, PhonemeSequence};

/// Stride mismatch tolerated between a scorer's declared and returned frames.
const STRIDE_TOLERANCE_MS: f64 = 1e-6;

pub struct KaraokeAligner {
    scorer: Arc<dyn AcousticScorer>,
    segmenter: Box<dyn Segmenter>,
    sequence_aligner: Box<dyn SequenceAligner>,
    corrector: Box<dyn BoundaryCorrector>,
    config: AlignerConfig,
}

pub(crate) struct KaraokeAlignerParts {
    pub scorer: Arc<dyn AcousticScorer>,
    pub segmenter: Box<dyn Segmenter>,
    pub sequence_aligner: Box<dyn SequenceAligner>,
    pub corrector: Box<dyn BoundaryCorrector>,
    pub config: AlignerConfig,
}

impl KaraokeAligner {
    pub(crate) fn from_parts(parts: KaraokeAlignerParts) -> Self {
        Self {
            scorer: parts.scorer,
            segmenter: parts.segmenter,
            sequence_aligner: parts.sequence_aligner,
            corrector: parts.corrector,
            config: parts.config,
        }
    }

    pub fn config(&self) -> &AlignerConfig {
        &self.config
    }

    /// Segments, scores, aligns and corrects one lyric line.
    pub fn align_line(&self, line: &LyricLine) -> Result<LineOutput, AlignmentError> {
        let syllables = self.segmenter.segment(line.index, &line.text);
        if syllables.is_empty() {
            return Ok(LineOutput {
                line_index: line.index,
                syllables,
                corrected: Vec::new(),
                timings: Vec::new(),
                probability_floor_used: false,
            });
        }

        let frames = self.score_with_timeout(&line.audio)?;
        let declared = self.scorer.frame_stride_ms();
        if (frames.frame_stride_ms() - declared).abs() > STRIDE_TOLERANCE_MS {
            return Err(AlignmentError::invalid_frames(format!(
                "scorer declared a {declared} ms stride but returned {} ms frames",
                frames.frame_stride_ms()
            )));
        }

        let sequence = PhonemeSequence::from_syllables(&syllables, self.config.edge_silence);
        let alignment = match self.sequence_aligner.align(&sequence, &frames, None) {
            Err(AlignmentError::NoFeasiblePath { frames: t, phonemes }) => {
                tracing::warn!(
                    line_index = line.index,
                    frames = t,
                    phonemes,
                    epsilon = self.config.probability_floor_epsilon,
                    "no finite alignment path; retrying with probability floor"
                );
                self.sequence_aligner.align(
                    &sequence,
                    &frames,
                    Some(self.config.probability_floor_epsilon),
                )?
            }
            other => other?,
        };

        let corrected = self.corrector.correct(&alignment, &syllables, &frames)?;
        let timings = TimingEmitter::new(frames.frame_stride_ms(), line.audio.offset_seconds)
            .emit(&corrected, &syllables);

        tracing::debug!(
            line_index = line.index,
            syllables = syllables.len(),
            frames = frames.frame_count(),
            floor = alignment.probability_floor.is_some(),
            "aligned lyric line"
        );

        Ok(LineOutput {
            line_index: line.index,
            syllables,
            corrected,
            timings,
            probability_floor_used: alignment.probability_floor.is_some(),
        })
    }

    /// Runs the scorer on a helper thread and waits at most the configured
    /// timeout.
    ///
    /// The helper thread is not joined. After a timeout it keeps running
    /// until `score` returns and its send then fails against the dropped
    /// receiver; a scorer that never returns leaks that thread.
    fn score_with_timeout(&self, audio: &AudioSegment) -> Result<AcousticFrames, AlignmentError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let scorer = Arc::clone(&self.scorer);
        let audio = audio.clone();
        std::thread::Builder::new()
            .name("acoustic-scorer".to_string())
            .spawn(move || {
                let _ = tx.send(scorer.score(&audio));
            })
            .map_err(|e| AlignmentError::runtime("spawn scorer thread", e))?;

        match rx.recv_timeout(self.config.scorer_timeout()) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout_ms = self.config.scorer_timeout_ms,
                    "acoustic scorer timed out; its thread is left running"
                );
                Err(AlignmentError::ScorerTimeout {
                    timeout_ms: self.config.scorer_timeout_ms,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(AlignmentError::scorer_unavailable(
                "scorer thread exited without a result",
            )),
        }
    }
}

/// Zero-mean, unit-variance normalization expected by CTC acoustic models.
#[cfg_attr(not(feature = "candle"), allow(dead_code))]
pub(crate) fn normalize_audio(samples: &[f32]) -> Vec<f32> {
    let n = samples.len() as f64;
    let mean = samples.iter().map(|&x| x as f64).sum::<f64>() / n;
    let var = samples
        .iter()
        .map(|&x| {
            let d = x as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let std = var.sqrt().max(1e-7);
    samples
        .iter()
        .map(|&x| ((x as f64 - mean) / std) as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_audio_centers_and_scales() {
        let out = normalize_audio(&[1.0, 3.0, 1.0, 3.0]);
        let mean: f32 = out.iter().sum::<f32>() / out.len() as f32;
        assert!(mean.abs() < 1e-6);
        assert!((out[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_audio_silence_stays_finite() {
        let out = normalize_audio(&[0.0; 8]);
        assert!(out.iter().all(|x| x.is_finite() && *x == 0.0));
    }
}
