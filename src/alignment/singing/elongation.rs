use super::{CorrectionContext, CorrectionOutcome, Window};

/// Merges frames where an over-long vowel is still audibly held back into
/// its nucleus.
///
/// Only fires once the nucleus is longer than `elongation_threshold_multiplier`
/// vowel priors. Frames are taken from the syllable's own coda (each coda
/// phoneme keeps one frame) or, for the last syllable of the line, from
/// trailing silence. Never crosses into the next syllable.
pub(super) fn merge_elongated_vowel(
    ctx: &CorrectionContext<'_>,
    windows: &[Window],
    i: usize,
) -> CorrectionOutcome {
    let shape = &ctx.shapes[i];
    let window = &windows[i];
    let (Some(held), Some(nucleus)) = (shape.held_symbol, window.nucleus.as_ref()) else {
        return CorrectionOutcome::NotTriggered;
    };
    let threshold = ctx.settings.elongation_threshold_multiplier * ctx.vowel_prior_frames;
    if (nucleus.len() as f64) <= threshold {
        return CorrectionOutcome::NotTriggered;
    }

    let is_last = i + 1 == windows.len();
    let limit = if shape.coda_len > 0 {
        window.end - shape.coda_len
    } else if is_last {
        ctx.frame_count()
    } else {
        nucleus.end
    };

    let mut held_until = nucleus.end;
    while held_until < limit && ctx.sustains(held_until, held) {
        held_until += 1;
    }
    if held_until == nucleus.end {
        return CorrectionOutcome::NotTriggered;
    }

    tracing::trace!(
        syllable = i,
        from = nucleus.end,
        to = held_until,
        "singing: elongated vowel absorbs held frames"
    );
    CorrectionOutcome::Corrected(vec![(
        i,
        Window {
            start: window.start,
            end: window.end.max(held_until),
            nucleus: Some(nucleus.start..held_until),
        },
    )])
}
