use crate::alignment::frames::AcousticFrames;
use crate::alignment::language::LanguageProfile;
use crate::alignment::viterbi::{segmental_viterbi, SegmentState};
use crate::config::AlignerConfig;
use crate::error::AlignmentError;
use crate::types::{AlignmentSpan, LineAlignment, PhonemeClass, PhonemeSequence, PhonemeToken};

/// Duration-aware forced alignment of one line's phonemes against its
/// acoustic frames.
#[derive(Debug, Clone)]
pub struct AlignmentEngine {
    profile: LanguageProfile,
    duration_penalty_weight: f64,
}

impl AlignmentEngine {
    pub fn new(profile: LanguageProfile, config: &AlignerConfig) -> Self {
        Self {
            profile,
            duration_penalty_weight: config.duration_penalty_weight,
        }
    }

    pub fn profile(&self) -> LanguageProfile {
        self.profile
    }

    /// Aligns `sequence` to `frames`.
    ///
    /// With `probability_floor = Some(eps)`, `eps` is added to every
    /// probability before taking logs so zero-probability frames no longer
    /// block the path.
    pub fn align(
        &self,
        sequence: &PhonemeSequence,
        frames: &AcousticFrames,
        probability_floor: Option<f32>,
    ) -> Result<LineAlignment, AlignmentError> {
        let t_len = frames.frame_count();
        let n = sequence.len();
        if n == 0 {
            return Ok(LineAlignment {
                spans: Vec::new(),
                frame_count: t_len,
                leading_silence: 0..t_len,
                trailing_silence: t_len..t_len,
                path_cost: 0.0,
                probability_floor,
            });
        }
        if t_len < n {
            return Err(AlignmentError::TooFewFrames {
                frames: t_len,
                phonemes: n,
            });
        }
        let width = frames.vocab_size();
        if let Some(bad) = sequence
            .tokens
            .iter()
            .find(|tok| tok.class != PhonemeClass::Wildcard && tok.symbol >= width)
        {
            return Err(AlignmentError::invalid_frames(format!(
                "phoneme {:?} scores against column {} but frames have {width} columns",
                bad.grapheme, bad.symbol
            )));
        }

        let epsilon = f64::from(probability_floor.unwrap_or(0.0));
        let stride = frames.frame_stride_ms();
        let blank = frames.blank_id();

        let mut states = Vec::with_capacity(n + 2);
        let mut costs: Vec<Vec<f64>> = Vec::with_capacity(n + 2);
        if sequence.leading_silence {
            states.push(silence_state());
            costs.push(emission_row(frames, epsilon, |t| frames.prob(t, blank)));
        }
        for token in &sequence.tokens {
            states.push(SegmentState {
                optional: false,
                prior_frames: Some(self.profile.prior_ms(token.class) / stride),
                vowel: token.is_vowel(),
            });
            costs.push(emission_row(frames, epsilon, |t| token_prob(frames, token, t)));
        }
        if sequence.trailing_silence {
            states.push(silence_state());
            costs.push(emission_row(frames, epsilon, |t| frames.prob(t, blank)));
        }

        let path = segmental_viterbi(&states, &costs, t_len, self.duration_penalty_weight)
            .ok_or(AlignmentError::NoFeasiblePath {
                frames: t_len,
                phonemes: n,
            })?;

        let first_phoneme = usize::from(sequence.leading_silence);
        let leading_silence = if sequence.leading_silence {
            path.ranges[0].clone()
        } else {
            0..0
        };
        let trailing_silence = if sequence.trailing_silence {
            path.ranges[first_phoneme + n].clone()
        } else {
            t_len..t_len
        };

        let spans = sequence
            .tokens
            .iter()
            .enumerate()
            .map(|(i, token)| {
                let state = first_phoneme + i;
                let range = path.ranges[state].clone();
                let cost: f64 = costs[state][range.clone()].iter().sum();
                AlignmentSpan {
                    phoneme_index: i,
                    syllable_index: sequence.owners[i],
                    symbol: token.symbol,
                    start_frame: range.start,
                    end_frame: range.end,
                    mean_log_prob: (-cost / range.len() as f64) as f32,
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            phonemes = n,
            frames = t_len,
            path_cost = path.cost,
            floor = ?probability_floor,
            leading_silence = leading_silence.len(),
            trailing_silence = trailing_silence.len(),
            "engine: aligned line"
        );

        Ok(LineAlignment {
            spans,
            frame_count: t_len,
            leading_silence,
            trailing_silence,
            path_cost: path.cost,
            probability_floor,
        })
    }
}

fn silence_state() -> SegmentState {
    SegmentState {
        optional: true,
        prior_frames: None,
        vowel: false,
    }
}

/// Wildcards accept any non-blank sound.
fn token_prob(frames: &AcousticFrames, token: &PhonemeToken, t: usize) -> f32 {
    match token.class {
        PhonemeClass::Wildcard => frames
            .best_non_blank_prob(t)
            .max(frames.prob(t, token.symbol)),
        _ => frames.prob(t, token.symbol),
    }
}

fn emission_row(
    frames: &AcousticFrames,
    epsilon: f64,
    prob: impl Fn(usize) -> f32,
) -> Vec<f64> {
    (0..frames.frame_count())
        .map(|t| {
            let p = f64::from(prob(t)) + epsilon;
            if p > 0.0 {
                -p.ln()
            } else {
                f64::INFINITY
            }
        })
        .collect()
}
