//! Singing-specific boundary corrections applied on top of the raw
//! alignment: elongation merge, melisma redistribution and vibrato
//! smoothing, in that order.
//!
//! Each correction is a pure function over the current syllable windows
//! that either proposes an edit or explains why it left the line alone.
//! Every proposed edit is validated before it is committed, so the line
//! always stays contiguous and every phoneme keeps at least one frame.

mod elongation;
mod melisma;
mod vibrato;

#[cfg(test)]
mod tests;

use std::ops::Range;

use crate::alignment::engine::AlignmentEngine;
use crate::alignment::frames::AcousticFrames;
use crate::alignment::language::LanguageProfile;
use crate::config::AlignerConfig;
use crate::error::AlignmentError;
use crate::types::{
    CorrectedSpan, CorrectionKind, LineAlignment, PhonemeSequence, SkipReason, SkippedCorrection,
    Syllable,
};

#[derive(Debug, Clone, PartialEq)]
struct CorrectionSettings {
    elongation_threshold_multiplier: f64,
    melisma_threshold_seconds: f64,
    melisma_median_multiplier: f64,
    vibrato_filter_window_ms: f64,
    vibrato_min_duration_ms: f64,
    sustain_probability: f32,
    onset_spike_probability: f32,
    probability_floor_epsilon: f32,
    edge_silence: bool,
    enable_elongation_merge: bool,
    enable_melisma: bool,
    enable_vibrato_filter: bool,
}

impl CorrectionSettings {
    fn from_config(config: &AlignerConfig) -> Self {
        Self {
            elongation_threshold_multiplier: config.elongation_threshold_multiplier,
            melisma_threshold_seconds: config.melisma_threshold_seconds,
            melisma_median_multiplier: config.melisma_median_multiplier,
            vibrato_filter_window_ms: config.vibrato_filter_window_ms,
            vibrato_min_duration_ms: config.vibrato_min_duration_ms,
            sustain_probability: config.sustain_probability,
            onset_spike_probability: config.onset_spike_probability,
            probability_floor_epsilon: config.probability_floor_epsilon,
            edge_silence: config.edge_silence,
            enable_elongation_merge: config.enable_elongation_merge,
            enable_melisma: config.enable_melisma,
            enable_vibrato_filter: config.enable_vibrato_filter,
        }
    }
}

/// Frame extent of one syllable while corrections run.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Window {
    start: usize,
    end: usize,
    nucleus: Option<Range<usize>>,
}

impl Window {
    fn len(&self) -> usize {
        self.end - self.start
    }
}

/// Static phoneme layout of a syllable around its nucleus.
#[derive(Debug, Clone, PartialEq)]
struct SyllableShape {
    phoneme_count: usize,
    onset_len: usize,
    nucleus_len: usize,
    coda_len: usize,
    /// Vowel held during the nucleus (its last vowel).
    held_symbol: Option<usize>,
    first_symbol: Option<usize>,
}

impl SyllableShape {
    fn of(syllable: &Syllable) -> Self {
        let phoneme_count = syllable.phonemes.len();
        let first_symbol = syllable.phonemes.first().map(|p| p.symbol);
        match syllable.nucleus_range() {
            Some(nucleus) => Self {
                phoneme_count,
                onset_len: nucleus.start,
                nucleus_len: nucleus.len(),
                coda_len: phoneme_count - nucleus.end,
                held_symbol: Some(syllable.phonemes[nucleus.end - 1].symbol),
                first_symbol,
            },
            None => Self {
                phoneme_count,
                onset_len: 0,
                nucleus_len: 0,
                coda_len: 0,
                held_symbol: None,
                first_symbol,
            },
        }
    }

    /// Snaps the nucleus back inside its syllable after a boundary moved.
    fn settle(&self, window: &mut Window) {
        let Some(nucleus) = window.nucleus.as_mut() else {
            return;
        };
        let lo = window.start + self.onset_len;
        let hi = window.end.saturating_sub(self.coda_len).max(lo);
        let mut start = if self.onset_len == 0 {
            lo
        } else {
            nucleus.start.clamp(lo, hi)
        };
        let mut end = if self.coda_len == 0 {
            hi
        } else {
            nucleus.end.clamp(lo, hi)
        };
        if end < start + self.nucleus_len {
            end = (start + self.nucleus_len).min(hi);
            start = end.saturating_sub(self.nucleus_len).max(lo);
        }
        *nucleus = start..end;
    }
}

/// Read-only inputs shared by the individual corrections.
struct CorrectionContext<'a> {
    evidence: &'a AcousticFrames,
    shapes: &'a [SyllableShape],
    settings: &'a CorrectionSettings,
    vowel_prior_frames: f64,
    /// Expected length of a consonant-vowel syllable, used as the melisma
    /// reference when a line has no other syllables to compare with.
    syllable_prior_frames: f64,
    /// Frames the line covered before any correction.
    line: Range<usize>,
}

impl CorrectionContext<'_> {
    fn frame_count(&self) -> usize {
        self.evidence.frame_count()
    }

    /// A different voiced symbol takes over frame `t` from `held`.
    fn onset_spike(&self, t: usize, held: usize) -> bool {
        match self.evidence.dominant_symbol(t) {
            Some((symbol, p)) => {
                symbol != held
                    && p >= self.settings.onset_spike_probability
                    && p > self.evidence.prob(t, held)
            }
            None => false,
        }
    }

    fn sustains(&self, t: usize, held: usize) -> bool {
        self.evidence.prob(t, held) >= self.settings.sustain_probability
    }
}

/// Result of one correction applied to one syllable or boundary.
#[derive(Debug, Clone, PartialEq)]
enum CorrectionOutcome {
    /// Replacement windows, by syllable index.
    Corrected(Vec<(usize, Window)>),
    Unchanged(SkipReason),
    NotTriggered,
}

#[derive(Debug, Clone, Default)]
struct SyllableLog {
    corrections: Vec<CorrectionKind>,
    skipped: Vec<SkippedCorrection>,
}

impl SyllableLog {
    fn from_span(span: &CorrectedSpan) -> Self {
        Self {
            corrections: span.corrections.clone(),
            skipped: span.skipped.clone(),
        }
    }

    fn applied(&mut self, kind: CorrectionKind) {
        if !self.corrections.contains(&kind) {
            self.corrections.push(kind);
        }
    }

    fn skipped(&mut self, kind: CorrectionKind, reason: SkipReason) {
        let entry = SkippedCorrection { kind, reason };
        if !self.skipped.contains(&entry) {
            self.skipped.push(entry);
        }
    }
}

/// Corrects raw alignments of sung lines.
#[derive(Debug, Clone)]
pub struct SingingPostProcessor {
    engine: AlignmentEngine,
    profile: LanguageProfile,
    settings: CorrectionSettings,
}

impl SingingPostProcessor {
    pub fn new(profile: LanguageProfile, config: &AlignerConfig) -> Self {
        Self {
            engine: AlignmentEngine::new(profile, config),
            profile,
            settings: CorrectionSettings::from_config(config),
        }
    }

    /// Turns a raw phoneme alignment into corrected syllable spans.
    pub fn process(
        &self,
        alignment: &LineAlignment,
        syllables: &[Syllable],
        frames: &AcousticFrames,
    ) -> Result<Vec<CorrectedSpan>, AlignmentError> {
        let windows = initial_windows(alignment, syllables)?;
        let low_confidence = syllables
            .iter()
            .map(|s| s.low_confidence || alignment.probability_floor.is_some())
            .collect::<Vec<_>>();
        let logs = vec![SyllableLog::default(); syllables.len()];
        self.run(windows, logs, &low_confidence, syllables, frames)
    }

    /// Runs the corrections again over already-corrected spans. Applying it
    /// to the output of [`Self::process`] changes nothing.
    pub fn reprocess(
        &self,
        corrected: &[CorrectedSpan],
        syllables: &[Syllable],
        frames: &AcousticFrames,
    ) -> Result<Vec<CorrectedSpan>, AlignmentError> {
        if corrected.len() != syllables.len() {
            return Err(AlignmentError::runtime(
                "singing corrections",
                format!(
                    "{} corrected spans for {} syllables",
                    corrected.len(),
                    syllables.len()
                ),
            ));
        }
        let windows = corrected
            .iter()
            .map(|span| Window {
                start: span.start_frame,
                end: span.end_frame,
                nucleus: span.nucleus.clone(),
            })
            .collect();
        let logs = corrected.iter().map(SyllableLog::from_span).collect();
        let low_confidence = corrected.iter().map(|s| s.low_confidence).collect::<Vec<_>>();
        self.run(windows, logs, &low_confidence, syllables, frames)
    }

    fn run(
        &self,
        mut windows: Vec<Window>,
        mut logs: Vec<SyllableLog>,
        low_confidence: &[bool],
        syllables: &[Syllable],
        frames: &AcousticFrames,
    ) -> Result<Vec<CorrectedSpan>, AlignmentError> {
        let shapes: Vec<SyllableShape> = syllables.iter().map(SyllableShape::of).collect();
        let smoothed = if self.settings.enable_vibrato_filter {
            let window = vibrato::window_frames(
                self.settings.vibrato_filter_window_ms,
                frames.frame_stride_ms(),
            );
            Some(vibrato::median_filter(frames, window))
        } else {
            None
        };
        let evidence = smoothed.as_ref().unwrap_or(frames);
        let ctx = CorrectionContext {
            evidence,
            shapes: &shapes,
            settings: &self.settings,
            vowel_prior_frames: evidence.ms_to_frames(self.profile.vowel_prior_ms),
            syllable_prior_frames: evidence
                .ms_to_frames(self.profile.vowel_prior_ms + self.profile.consonant_prior_ms),
            line: windows.first().map_or(0, |w| w.start)..windows.last().map_or(0, |w| w.end),
        };
        let realigned = smoothed
            .as_ref()
            .map(|smoothed| self.realign_boundaries(syllables, smoothed));
        if let Some(Err(err)) = &realigned {
            tracing::warn!(error = %err, "singing: smoothed realignment failed");
        }

        // One pass per boundary plus a confirming pass.
        let max_passes = windows.len() + 2;
        let mut settled = false;
        for pass in 0..max_passes {
            let before = windows.clone();
            let mut pinned = vec![false; windows.len().saturating_sub(1)];

            if self.settings.enable_elongation_merge {
                for i in 0..windows.len() {
                    let outcome = elongation::merge_elongated_vowel(&ctx, &windows, i);
                    commit(
                        &ctx,
                        &mut windows,
                        &mut logs,
                        i,
                        CorrectionKind::ElongationMerge,
                        outcome,
                    );
                }
            }

            if self.settings.enable_melisma {
                for i in 0..windows.len() {
                    if melisma::sustain_end(&ctx, &windows, i).is_some() {
                        if let Some(pin) = pinned.get_mut(i) {
                            *pin = true;
                        }
                    }
                    let outcome = melisma::redistribute(&ctx, &windows, i);
                    commit(
                        &ctx,
                        &mut windows,
                        &mut logs,
                        i,
                        CorrectionKind::MelismaRedistribution,
                        outcome,
                    );
                }
            }

            match &realigned {
                Some(Ok(targets)) => {
                    let (outcome, skips) =
                        vibrato::snap_boundaries(&ctx, &windows, targets, &pinned);
                    for (boundary, reason) in skips {
                        commit(
                            &ctx,
                            &mut windows,
                            &mut logs,
                            boundary + 1,
                            CorrectionKind::VibratoFilter,
                            CorrectionOutcome::Unchanged(reason),
                        );
                    }
                    let log_index = match &outcome {
                        CorrectionOutcome::Corrected(edits) => edits.first().map_or(0, |(i, _)| *i),
                        _ => 0,
                    };
                    commit(
                        &ctx,
                        &mut windows,
                        &mut logs,
                        log_index,
                        CorrectionKind::VibratoFilter,
                        outcome,
                    );
                }
                Some(Err(_)) => {
                    for boundary in 0..pinned.len() {
                        commit(
                            &ctx,
                            &mut windows,
                            &mut logs,
                            boundary + 1,
                            CorrectionKind::VibratoFilter,
                            CorrectionOutcome::Unchanged(SkipReason::RealignmentFailed),
                        );
                    }
                }
                None => {}
            }

            if windows == before {
                tracing::trace!(passes = pass + 1, "singing: corrections settled");
                settled = true;
                break;
            }
        }
        if !settled {
            tracing::warn!(
                passes = max_passes,
                syllables = windows.len(),
                "singing: corrections still moving after the last pass"
            );
        }

        Ok(windows
            .into_iter()
            .zip(logs)
            .enumerate()
            .map(|(i, (window, log))| CorrectedSpan {
                syllable_index: syllables[i].index,
                line_index: syllables[i].line_index,
                start_frame: window.start,
                end_frame: window.end,
                nucleus: window.nucleus,
                low_confidence: low_confidence.get(i).copied().unwrap_or(false),
                corrections: log.corrections,
                skipped: log.skipped,
            })
            .collect())
    }

    /// Syllable start frames re-derived from the smoothed posteriors.
    fn realign_boundaries(
        &self,
        syllables: &[Syllable],
        smoothed: &AcousticFrames,
    ) -> Result<Vec<usize>, AlignmentError> {
        let sequence = PhonemeSequence::from_syllables(syllables, self.settings.edge_silence);
        let alignment = match self.engine.align(&sequence, smoothed, None) {
            Ok(alignment) => alignment,
            Err(AlignmentError::NoFeasiblePath { .. }) => self.engine.align(
                &sequence,
                smoothed,
                Some(self.settings.probability_floor_epsilon),
            )?,
            Err(err) => return Err(err),
        };
        let mut starts = vec![usize::MAX; syllables.len()];
        for span in &alignment.spans {
            let slot = &mut starts[span.syllable_index];
            *slot = (*slot).min(span.start_frame);
        }
        Ok(starts)
    }
}

/// Validates `outcome` against the line invariants and applies it.
fn commit(
    ctx: &CorrectionContext<'_>,
    windows: &mut [Window],
    logs: &mut [SyllableLog],
    log_index: usize,
    kind: CorrectionKind,
    outcome: CorrectionOutcome,
) {
    match outcome {
        CorrectionOutcome::NotTriggered => {}
        CorrectionOutcome::Unchanged(reason) => {
            tracing::debug!(
                syllable = log_index,
                correction = kind.as_str(),
                ?reason,
                "singing: correction skipped"
            );
            logs[log_index].skipped(kind, reason);
        }
        CorrectionOutcome::Corrected(edits) => {
            let mut candidate = windows.to_vec();
            for (i, window) in edits {
                candidate[i] = window;
            }
            for (window, shape) in candidate.iter_mut().zip(ctx.shapes) {
                shape.settle(window);
            }
            if candidate.as_slice() == &*windows {
                return;
            }
            if let Err(violation) = check_invariants(ctx, &candidate) {
                tracing::warn!(
                    syllable = log_index,
                    correction = kind.as_str(),
                    violation,
                    "singing: rejected correction"
                );
                logs[log_index].skipped(kind, SkipReason::WouldBreakInvariant);
                return;
            }
            for (i, (new, old)) in candidate.iter().zip(windows.iter()).enumerate() {
                if new != old {
                    logs[i].applied(kind);
                }
            }
            tracing::debug!(
                syllable = log_index,
                correction = kind.as_str(),
                "singing: correction applied"
            );
            windows.clone_from_slice(&candidate);
        }
    }
}

fn check_invariants(ctx: &CorrectionContext<'_>, windows: &[Window]) -> Result<(), &'static str> {
    let Some(first) = windows.first() else {
        return Ok(());
    };
    if first.start != ctx.line.start {
        return Err("line start moved");
    }
    let last_end = windows.last().map_or(first.start, |w| w.end);
    if last_end < ctx.line.end || last_end > ctx.frame_count() {
        return Err("line no longer covers its frames");
    }
    for pair in windows.windows(2) {
        if pair[0].end != pair[1].start {
            return Err("syllables not contiguous");
        }
    }
    for (window, shape) in windows.iter().zip(ctx.shapes) {
        if window.end < window.start || window.len() < shape.phoneme_count {
            return Err("phoneme lost its frames");
        }
        if let Some(nucleus) = &window.nucleus {
            if nucleus.start < window.start + shape.onset_len
                || nucleus.end + shape.coda_len > window.end
                || nucleus.len() < shape.nucleus_len
            {
                return Err("nucleus outside its syllable");
            }
        }
    }
    Ok(())
}

/// Syllable windows of a raw phoneme alignment.
fn initial_windows(
    alignment: &LineAlignment,
    syllables: &[Syllable],
) -> Result<Vec<Window>, AlignmentError> {
    let expected: usize = syllables.iter().map(|s| s.phonemes.len()).sum();
    if alignment.spans.len() != expected {
        return Err(AlignmentError::runtime(
            "singing corrections",
            format!(
                "alignment has {} spans for {expected} phonemes",
                alignment.spans.len()
            ),
        ));
    }

    let mut windows = Vec::with_capacity(syllables.len());
    let mut offset = 0usize;
    for syllable in syllables {
        let spans = &alignment.spans[offset..offset + syllable.phonemes.len()];
        offset += syllable.phonemes.len();
        let (Some(first), Some(last)) = (spans.first(), spans.last()) else {
            return Err(AlignmentError::runtime(
                "singing corrections",
                format!("syllable {} has no phonemes", syllable.index),
            ));
        };
        let nucleus = syllable
            .nucleus_range()
            .map(|r| spans[r.start].start_frame..spans[r.end - 1].end_frame);
        windows.push(Window {
            start: first.start_frame,
            end: last.end_frame,
            nucleus,
        });
    }
    Ok(windows)
}

/// Median syllable length, leaving out the syllables in `skip`.
fn median_len(windows: &[Window], skip: Range<usize>) -> Option<f64> {
    let mut lens: Vec<usize> = windows
        .iter()
        .enumerate()
        .filter(|(i, _)| !skip.contains(i))
        .map(|(_, w)| w.len())
        .collect();
    if lens.is_empty() {
        return None;
    }
    lens.sort_unstable();
    let mid = lens.len() / 2;
    Some(if lens.len() % 2 == 0 {
        (lens[mid - 1] + lens[mid]) as f64 / 2.0
    } else {
        lens[mid] as f64
    })
}
