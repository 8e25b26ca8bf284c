use super::{CorrectionContext, CorrectionOutcome, Window};
use crate::alignment::frames::AcousticFrames;
use crate::types::SkipReason;

/// Odd window length in frames covering roughly `window_ms`.
pub(super) fn window_frames(window_ms: f64, frame_stride_ms: f64) -> usize {
    let frames = (window_ms / frame_stride_ms).round().max(1.0) as usize;
    if frames % 2 == 0 {
        frames + 1
    } else {
        frames
    }
}

/// Running median over time, per vocabulary column. Edges repeat the
/// first/last frame.
pub(super) fn median_filter(frames: &AcousticFrames, window: usize) -> AcousticFrames {
    if window <= 1 {
        return frames.clone();
    }
    let half = window / 2;
    let mut buf = Vec::with_capacity(window);
    frames.map_columns(|column| {
        let n = column.len();
        (0..n)
            .map(|t| {
                buf.clear();
                buf.extend((0..window).map(|k| column[(t + k).saturating_sub(half).min(n - 1)]));
                buf.sort_by(f32::total_cmp);
                buf[half]
            })
            .collect()
    })
}

/// Moves every unpinned boundary to where the smoothed posteriors put it,
/// as long as each move is shorter than a real note change.
///
/// All moves are applied together, so a boundary may land inside the old
/// extent of a syllable whose other boundary moves out of the way. Moves
/// that would still leave a syllable without a frame per phoneme are
/// withdrawn on both sides of that syllable. Returns the joint edit and,
/// per boundary, why it was left alone.
pub(super) fn snap_boundaries(
    ctx: &CorrectionContext<'_>,
    windows: &[Window],
    realigned_starts: &[usize],
    pinned: &[bool],
) -> (CorrectionOutcome, Vec<(usize, SkipReason)>) {
    let mut skips = Vec::new();
    let mut moves: Vec<Option<usize>> = vec![None; windows.len().saturating_sub(1)];
    for (boundary, slot) in moves.iter_mut().enumerate() {
        match propose(ctx, windows, boundary, realigned_starts, pinned[boundary]) {
            Ok(target) => *slot = target,
            Err(reason) => skips.push((boundary, reason)),
        }
    }

    let start_of = |moves: &[Option<usize>], i: usize| match i {
        0 => windows[0].start,
        i => moves[i - 1].unwrap_or(windows[i].start),
    };
    let end_of = |moves: &[Option<usize>], i: usize| match moves.get(i) {
        Some(&Some(target)) => target,
        _ => windows[i].end,
    };
    let moved = |moves: &[Option<usize>], i: usize| {
        moves.get(i).is_some_and(Option::is_some)
            || (i > 0 && moves.get(i - 1).is_some_and(Option::is_some))
    };
    while let Some(i) = (0..windows.len()).find(|&i| {
        moved(&moves, i) && end_of(&moves, i) < start_of(&moves, i) + ctx.shapes[i].phoneme_count
    }) {
        for boundary in [i.checked_sub(1), Some(i)].into_iter().flatten() {
            if let Some(slot) = moves.get_mut(boundary) {
                if slot.take().is_some() {
                    skips.push((boundary, SkipReason::WouldCollapseNeighbor));
                }
            }
        }
    }
    skips.sort_by_key(|&(boundary, _)| boundary);

    let edits: Vec<(usize, Window)> = (0..windows.len())
        .filter(|&i| {
            start_of(&moves, i) != windows[i].start || end_of(&moves, i) != windows[i].end
        })
        .map(|i| {
            (
                i,
                Window {
                    start: start_of(&moves, i),
                    end: end_of(&moves, i),
                    ..windows[i].clone()
                },
            )
        })
        .collect();
    let outcome = if edits.is_empty() {
        CorrectionOutcome::NotTriggered
    } else {
        CorrectionOutcome::Corrected(edits)
    };
    (outcome, skips)
}

/// Target for the boundary in front of syllable `boundary + 1`, checked
/// on its own.
fn propose(
    ctx: &CorrectionContext<'_>,
    windows: &[Window],
    boundary: usize,
    realigned_starts: &[usize],
    pinned: bool,
) -> Result<Option<usize>, SkipReason> {
    let Some(&target) = realigned_starts.get(boundary + 1) else {
        return Ok(None);
    };
    let current = windows[boundary + 1].start;
    if target == current {
        return Ok(None);
    }
    if pinned {
        return Err(SkipReason::Pinned);
    }
    let shift_ms = target.abs_diff(current) as f64 * ctx.evidence.frame_stride_ms();
    if shift_ms >= ctx.settings.vibrato_min_duration_ms {
        return Err(SkipReason::ShiftTooLarge);
    }
    Ok(Some(target))
}
