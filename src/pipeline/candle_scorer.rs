use candle_core::{Device, Module, Tensor, D};

use crate::alignment::frames::AcousticFrames;
use crate::alignment::vocabulary::Vocabulary;
use crate::error::AlignmentError;
use crate::pipeline::runtime::normalize_audio;
use crate::pipeline::traits::AcousticScorer;
use crate::types::AudioSegment;

/// Acoustic scorer backed by any Candle CTC module mapping `(1, samples)`
/// audio to `(1, frames, vocab)` logits.
pub struct CandleCtcScorer<M> {
    model: M,
    device: Device,
    vocab: Vocabulary,
    frame_stride_ms: f64,
    expected_sample_rate_hz: u32,
}

impl<M: Module + Send + Sync> CandleCtcScorer<M> {
    pub fn new(
        model: M,
        device: Device,
        vocab: Vocabulary,
        frame_stride_ms: f64,
        expected_sample_rate_hz: u32,
    ) -> Self {
        tracing::info!(
            vocab = vocab.size(),
            frame_stride_ms,
            expected_sample_rate_hz,
            ?device,
            "candle acoustic scorer ready"
        );
        Self {
            model,
            device,
            vocab,
            frame_stride_ms,
            expected_sample_rate_hz,
        }
    }

    fn build_audio_tensor(&self, normalized_audio: &[f32]) -> Result<Tensor, AlignmentError> {
        Tensor::from_vec(
            normalized_audio.to_vec(),
            (1, normalized_audio.len()),
            &self.device,
        )
        .map_err(|e| AlignmentError::runtime("tensor creation", e))
    }
}

impl<M: Module + Send + Sync> AcousticScorer for CandleCtcScorer<M> {
    fn score(&self, audio: &AudioSegment) -> Result<AcousticFrames, AlignmentError> {
        if audio.sample_rate_hz != self.expected_sample_rate_hz {
            tracing::warn!(
                got = audio.sample_rate_hz,
                expected = self.expected_sample_rate_hz,
                "audio sample rate differs from the model's"
            );
        }
        if audio.samples.is_empty() {
            return AcousticFrames::new(Vec::new(), self.vocab.blank_id(), self.frame_stride_ms);
        }

        let audio_tensor = self.build_audio_tensor(&normalize_audio(&audio.samples))?;
        let logits = self
            .model
            .forward(&audio_tensor)
            .map_err(|e| AlignmentError::runtime("forward pass", e))?;
        let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1)
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.to_vec2::<f32>())
            .map_err(|e| AlignmentError::runtime("log_softmax", e))?;

        tracing::debug!(
            samples = audio.samples.len(),
            frames = log_probs.len(),
            "scored audio segment"
        );
        AcousticFrames::from_log_probs(&log_probs, self.vocab.blank_id(), self.frame_stride_ms)
    }

    fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    fn frame_stride_ms(&self) -> f64 {
        self.frame_stride_ms
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    /// One frame per 320 samples, always favouring symbol 1.
    struct FixedLogits;

    impl Module for FixedLogits {
        fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
            let (_, samples) = xs.dims2()?;
            let frames = samples / 320;
            let row = [0.0f32, 4.0, 1.0];
            let data: Vec<f32> = row.iter().copied().cycle().take(frames * 3).collect();
            Tensor::from_vec(data, (1, frames, 3), xs.device())
        }
    }

    fn scorer() -> CandleCtcScorer<FixedLogits> {
        let vocab = Vocabulary::from_json_str(r#"{"<pad>": 0, "l": 1, "a": 2}"#, 0).unwrap();
        CandleCtcScorer::new(FixedLogits, Device::Cpu, vocab, 20.0, 16_000)
    }

    fn audio(samples: usize) -> AudioSegment {
        AudioSegment {
            samples: Arc::from((0..samples).map(|i| (i as f32 * 0.01).sin()).collect::<Vec<_>>()),
            sample_rate_hz: 16_000,
            offset_seconds: 0.0,
        }
    }

    #[test]
    fn scores_into_normalized_posteriors() {
        let frames = scorer().score(&audio(3200)).unwrap();
        assert_eq!(frames.frame_count(), 10);
        assert_eq!(frames.vocab_size(), 3);
        assert_eq!(frames.dominant_symbol(4).map(|(s, _)| s), Some(1));
        let sum: f32 = frames.frame(0).iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn empty_audio_gives_no_frames() {
        let frames = scorer().score(&audio(0)).unwrap();
        assert_eq!(frames.frame_count(), 0);
        assert_eq!(frames.frame_stride_ms(), 20.0);
    }
}
