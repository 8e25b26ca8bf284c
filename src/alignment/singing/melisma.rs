use super::{median_len, CorrectionContext, CorrectionOutcome, Window};
use crate::types::SkipReason;

/// End of the sustained region of syllable `i`'s held vowel, if that region
/// is long enough to be a melisma.
///
/// The region starts where the held vowel first sustains inside the
/// nucleus, so the leading vowels of a diphthong do not count against it,
/// and runs while the vowel stays above the sustain level. Short dips
/// without a competing onset do not end it; an onset spike of another
/// symbol does.
///
/// The median reference leaves out the syllable itself and the neighbour
/// it would take frames from. With nothing else on the line the syllable
/// prior stands in.
pub(super) fn sustain_end(
    ctx: &CorrectionContext<'_>,
    windows: &[Window],
    i: usize,
) -> Option<usize> {
    let held = ctx.shapes[i].held_symbol?;
    let nucleus = windows[i].nucleus.as_ref()?;
    let max_dip = ctx
        .evidence
        .ms_to_frames(ctx.settings.vibrato_min_duration_ms)
        .ceil()
        .max(1.0) as usize;

    let scan_start = (nucleus.start..nucleus.end.min(ctx.frame_count()))
        .find(|&t| ctx.sustains(t, held))
        .unwrap_or(nucleus.start);
    let mut region_end = scan_start;
    for t in scan_start..ctx.frame_count() {
        if ctx.sustains(t, held) {
            region_end = t + 1;
        } else if ctx.onset_spike(t, held) || t - region_end >= max_dip {
            break;
        }
    }

    let frames = region_end.saturating_sub(scan_start);
    if frames == 0 {
        return None;
    }
    let seconds = ctx.evidence.frames_to_seconds(frames);
    let by_duration = seconds >= ctx.settings.melisma_threshold_seconds;
    let reference = median_len(windows, i..i + 2).unwrap_or(ctx.syllable_prior_frames);
    let by_median = frames as f64 >= ctx.settings.melisma_median_multiplier * reference;
    (by_duration || by_median).then_some(region_end)
}

/// Extends a melismatic syllable over the frames its vowel is still held,
/// taking them from the following syllable.
pub(super) fn redistribute(
    ctx: &CorrectionContext<'_>,
    windows: &[Window],
    i: usize,
) -> CorrectionOutcome {
    let Some(region_end) = sustain_end(ctx, windows, i) else {
        return CorrectionOutcome::NotTriggered;
    };
    let current = &windows[i];
    if region_end <= current.end {
        return CorrectionOutcome::NotTriggered;
    }
    let shape = &ctx.shapes[i];
    if shape.coda_len > 0 {
        // A coda consonant sits between the vowel and the next syllable.
        return CorrectionOutcome::Unchanged(SkipReason::LexicalBoundary);
    }

    let Some(next) = windows.get(i + 1) else {
        // Last syllable: the held vowel may run into trailing silence.
        let end = region_end.min(ctx.frame_count());
        return CorrectionOutcome::Corrected(vec![(
            i,
            Window {
                end,
                ..current.clone()
            },
        )]);
    };
    let next_shape = &ctx.shapes[i + 1];
    if next_shape.first_symbol.is_some() && next_shape.first_symbol == shape.held_symbol {
        return CorrectionOutcome::Unchanged(SkipReason::LexicalBoundary);
    }
    if region_end + next_shape.phoneme_count > next.end {
        return CorrectionOutcome::Unchanged(SkipReason::WouldCollapseNeighbor);
    }

    CorrectionOutcome::Corrected(vec![
        (
            i,
            Window {
                end: region_end,
                ..current.clone()
            },
        ),
        (
            i + 1,
            Window {
                start: region_end,
                ..next.clone()
            },
        ),
    ])
}
