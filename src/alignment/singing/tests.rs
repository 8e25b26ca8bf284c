use super::*;
use crate::types::{AlignmentSpan, PhonemeClass, PhonemeToken};

const BLANK: usize = 0;
const L: usize = 1;
const A: usize = 2;
const O: usize = 3;
const N: usize = 4;
const WIDTH: usize = 5;

fn token(symbol: usize) -> PhonemeToken {
    let (grapheme, class) = match symbol {
        L => ('l', PhonemeClass::Consonant),
        A => ('a', PhonemeClass::Vowel),
        O => ('o', PhonemeClass::Vowel),
        N => ('n', PhonemeClass::Consonant),
        _ => ('*', PhonemeClass::Wildcard),
    };
    PhonemeToken {
        symbol,
        grapheme,
        class,
    }
}

fn syllable(index: usize, symbols: &[usize]) -> Syllable {
    let phonemes: Vec<PhonemeToken> = symbols.iter().map(|&s| token(s)).collect();
    Syllable {
        text: phonemes.iter().map(|p| p.grapheme).collect(),
        phonemes,
        index,
        word_boundary: true,
        line_index: 7,
        low_confidence: false,
        backing_vocal: false,
        char_range: 0..0,
    }
}

/// Frames where `owners[t]` gets `p` and the rest is spread evenly.
fn frames_from(owners: &[usize], p: f32, stride_ms: f64) -> AcousticFrames {
    let rest = (1.0 - p) / (WIDTH - 1) as f32;
    let probs = owners
        .iter()
        .map(|&o| {
            let mut row = vec![rest; WIDTH];
            row[o] = p;
            row
        })
        .collect();
    AcousticFrames::new(probs, BLANK, stride_ms).unwrap()
}

fn owners(runs: &[(usize, usize)]) -> Vec<usize> {
    runs.iter()
        .flat_map(|&(symbol, len)| std::iter::repeat(symbol).take(len))
        .collect()
}

/// Raw alignment from per-phoneme end frames; phonemes start where the
/// previous one ended.
fn raw_alignment(syllables: &[Syllable], ends: &[usize], frame_count: usize) -> LineAlignment {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut k = 0;
    for (s_idx, s) in syllables.iter().enumerate() {
        for p in &s.phonemes {
            spans.push(AlignmentSpan {
                phoneme_index: k,
                syllable_index: s_idx,
                symbol: p.symbol,
                start_frame: start,
                end_frame: ends[k],
                mean_log_prob: -0.1,
            });
            start = ends[k];
            k += 1;
        }
    }
    LineAlignment {
        spans,
        frame_count,
        leading_silence: 0..0,
        trailing_silence: start..frame_count,
        path_cost: 0.0,
        probability_floor: None,
    }
}

fn processor(config: &AlignerConfig) -> SingingPostProcessor {
    SingingPostProcessor::new(LanguageProfile::JAPANESE, config)
}

fn only(enable: &str) -> AlignerConfig {
    AlignerConfig {
        enable_elongation_merge: enable == "elongation",
        enable_melisma: enable == "melisma",
        enable_vibrato_filter: enable == "vibrato",
        ..AlignerConfig::default()
    }
}

fn melisma_case(stride_ms: f64) -> (Vec<Syllable>, AcousticFrames, LineAlignment) {
    // 40 frames of held 'a', then "lo".
    let syllables = vec![syllable(0, &[L, A]), syllable(1, &[L, O])];
    let frames = frames_from(&owners(&[(L, 3), (A, 40), (L, 2), (O, 15)]), 0.9, stride_ms);
    // The raw search cut the held vowel short and stretched the next onset.
    let raw = raw_alignment(&syllables, &[3, 25, 45, 60], 60);
    (syllables, frames, raw)
}

fn assert_melisma_spans(out: &[CorrectedSpan]) {
    let covering: Vec<&CorrectedSpan> = out
        .iter()
        .filter(|s| s.start_frame <= 3 && s.end_frame >= 43)
        .collect();
    assert_eq!(covering.len(), 1);
    assert_eq!(covering[0].syllable_index, 0);
    assert_eq!(covering[0].nucleus, Some(3..43));
    assert!(covering[0]
        .corrections
        .contains(&CorrectionKind::MelismaRedistribution));
    assert_eq!(out[1].start_frame, 43);
    assert_eq!(out[1].end_frame, 60);
    assert!(out.iter().all(|s| s.line_index == 7));
}

#[test]
fn melisma_becomes_one_span() {
    let (syllables, frames, raw) = melisma_case(40.0);
    let out = processor(&AlignerConfig::default())
        .process(&raw, &syllables, &frames)
        .unwrap();
    assert_melisma_spans(&out);
}

#[test]
fn melisma_shorter_than_threshold_found_by_median() {
    // 0.8 s of held vowel: only the length relative to the line gives it away.
    let (syllables, frames, raw) = melisma_case(20.0);
    let out = processor(&AlignerConfig::default())
        .process(&raw, &syllables, &frames)
        .unwrap();
    assert_melisma_spans(&out);
}

#[test]
fn melisma_on_diphthong_counts_from_held_vowel() {
    // "lao" + "la": the 'a' glide must not end the scan of the held 'o'.
    let syllables = vec![syllable(0, &[L, A, O]), syllable(1, &[L, A])];
    let frames = frames_from(&owners(&[(L, 3), (A, 5), (O, 40), (L, 2), (A, 10)]), 0.9, 20.0);
    let raw = raw_alignment(&syllables, &[3, 8, 30, 50, 60], 60);
    let out = processor(&only("melisma"))
        .process(&raw, &syllables, &frames)
        .unwrap();
    assert_eq!(out[0].end_frame, 48);
    assert_eq!(out[1].start_frame, 48);
    assert_eq!(out[0].corrections, vec![CorrectionKind::MelismaRedistribution]);
}

#[test]
fn corrections_are_idempotent() {
    for stride_ms in [20.0, 40.0] {
        let (syllables, frames, raw) = melisma_case(stride_ms);
        let post = processor(&AlignerConfig::default());
        let once = post.process(&raw, &syllables, &frames).unwrap();
        let twice = post.reprocess(&once, &syllables, &frames).unwrap();
        assert_eq!(once, twice, "stride {stride_ms} ms");
    }
}

#[test]
fn melisma_respects_lexical_boundary() {
    // "la" + "a": the held vowel is also the next syllable's first phoneme.
    let syllables = vec![syllable(0, &[L, A]), syllable(1, &[A])];
    let frames = frames_from(&owners(&[(L, 3), (A, 60)]), 0.9, 40.0);
    let raw = raw_alignment(&syllables, &[3, 30, 63], 63);
    let out = processor(&AlignerConfig::default())
        .process(&raw, &syllables, &frames)
        .unwrap();
    assert_eq!(out[0].end_frame, 30);
    assert!(out[0].skipped.contains(&SkippedCorrection {
        kind: CorrectionKind::MelismaRedistribution,
        reason: SkipReason::LexicalBoundary,
    }));
    assert!(out[0].corrections.is_empty());
}

#[test]
fn melisma_never_collapses_neighbor() {
    // The held vowel runs to the very end; "lo" would be left with no frames.
    let syllables = vec![syllable(0, &[L, A]), syllable(1, &[L, O])];
    let frames = frames_from(&owners(&[(L, 3), (A, 57)]), 0.9, 40.0);
    let raw = raw_alignment(&syllables, &[3, 30, 45, 60], 60);
    let out = processor(&only("melisma"))
        .process(&raw, &syllables, &frames)
        .unwrap();
    assert_eq!(out[0].end_frame, 30);
    assert!(out[1].len() >= 2);
    assert!(out[0].skipped.contains(&SkippedCorrection {
        kind: CorrectionKind::MelismaRedistribution,
        reason: SkipReason::WouldCollapseNeighbor,
    }));
}

#[test]
fn elongation_absorbs_held_trailing_frames() {
    let syllables = vec![syllable(0, &[L, A])];
    let strong = frames_from(&owners(&[(L, 3), (A, 37)]), 0.9, 20.0);
    let weak = frames_from(&owners(&[(A, 10)]), 0.6, 20.0);
    let rows: Vec<Vec<f32>> = (0..strong.frame_count())
        .map(|t| strong.frame(t).to_vec())
        .chain((0..weak.frame_count()).map(|t| weak.frame(t).to_vec()))
        .collect();
    let frames = AcousticFrames::new(rows, BLANK, 20.0).unwrap();

    let raw = raw_alignment(&syllables, &[3, 30], 50);
    let out = processor(&only("elongation"))
        .process(&raw, &syllables, &frames)
        .unwrap();
    assert_eq!(out[0].end_frame, 50);
    assert_eq!(out[0].nucleus, Some(3..50));
    assert_eq!(out[0].corrections, vec![CorrectionKind::ElongationMerge]);
}

#[test]
fn elongation_keeps_coda_frame() {
    let syllables = vec![syllable(0, &[L, A, N])];
    let frames = frames_from(&owners(&[(L, 2), (A, 38)]), 0.9, 20.0);
    let raw = raw_alignment(&syllables, &[2, 28, 40], 40);
    let out = processor(&only("elongation"))
        .process(&raw, &syllables, &frames)
        .unwrap();
    assert_eq!((out[0].start_frame, out[0].end_frame), (0, 40));
    assert_eq!(out[0].nucleus, Some(2..39));
}

#[test]
fn short_nucleus_is_left_alone() {
    let syllables = vec![syllable(0, &[L, A]), syllable(1, &[L, A])];
    let frames = frames_from(&owners(&[(L, 3), (A, 7), (L, 3), (A, 7)]), 0.9, 20.0);
    let raw = raw_alignment(&syllables, &[3, 10, 13, 20], 20);
    let out = processor(&AlignerConfig::default())
        .process(&raw, &syllables, &frames)
        .unwrap();
    assert_eq!(out[0].frames(), (0, 10, Some(3..10)));
    assert_eq!(out[1].frames(), (10, 20, Some(13..20)));
    assert!(out.iter().all(|s| s.corrections.is_empty()));
}

fn la_la_frames(dipped: bool) -> AcousticFrames {
    let steady = owners(&[(L, 3), (A, 27), (L, 3), (A, 27)]);
    let probs = steady
        .iter()
        .enumerate()
        .map(|(t, &o)| {
            if dipped && o == A && t % 5 == 0 {
                let mut row = vec![0.0; WIDTH];
                row[BLANK] = 0.6;
                row[A] = 0.3;
                row[L] = 0.1;
                row
            } else {
                let mut row = vec![0.0; WIDTH];
                row[BLANK] = 0.05;
                row[if o == L { A } else { L }] = 0.05;
                row[o] = 0.9;
                row
            }
        })
        .collect();
    AcousticFrames::new(probs, BLANK, 20.0).unwrap()
}

#[test]
fn vibrato_dips_do_not_move_boundaries() {
    let syllables = vec![syllable(0, &[L, A]), syllable(1, &[L, A])];
    let config = AlignerConfig::default();
    let engine = AlignmentEngine::new(LanguageProfile::JAPANESE, &config);
    let sequence = PhonemeSequence::from_syllables(&syllables, true);

    let steady = la_la_frames(false);
    let steady_raw = engine.align(&sequence, &steady, None).unwrap();
    let reference = processor(&AlignerConfig {
        enable_vibrato_filter: false,
        ..config.clone()
    })
    .process(&steady_raw, &syllables, &steady)
    .unwrap();

    let dipped = la_la_frames(true);
    let dipped_raw = engine.align(&sequence, &dipped, None).unwrap();
    let filtered = processor(&config)
        .process(&dipped_raw, &syllables, &dipped)
        .unwrap();

    for (a, b) in reference.iter().zip(&filtered) {
        assert!(a.start_frame.abs_diff(b.start_frame) <= 1, "{a:?} vs {b:?}");
        assert!(a.end_frame.abs_diff(b.end_frame) <= 1, "{a:?} vs {b:?}");
    }
    assert_eq!(reference[1].start_frame, 30);
}

fn context<'a>(
    frames: &'a AcousticFrames,
    shapes: &'a [SyllableShape],
    settings: &'a CorrectionSettings,
    line: Range<usize>,
) -> CorrectionContext<'a> {
    CorrectionContext {
        evidence: frames,
        shapes,
        settings,
        vowel_prior_frames: 8.0,
        syllable_prior_frames: 11.0,
        line,
    }
}

fn two_windows() -> Vec<Window> {
    vec![
        Window {
            start: 0,
            end: 20,
            nucleus: Some(3..20),
        },
        Window {
            start: 20,
            end: 40,
            nucleus: Some(23..40),
        },
    ]
}

fn la_shapes(count: usize) -> Vec<SyllableShape> {
    (0..count)
        .map(|i| SyllableShape::of(&syllable(i, &[L, A])))
        .collect()
}

fn spans(bounds: &[usize]) -> Vec<Window> {
    bounds
        .windows(2)
        .map(|pair| Window {
            start: pair[0],
            end: pair[1],
            nucleus: Some(pair[0] + 1..pair[1]),
        })
        .collect()
}

fn extents(outcome: &CorrectionOutcome) -> Vec<(usize, usize, usize)> {
    match outcome {
        CorrectionOutcome::Corrected(edits) => {
            edits.iter().map(|(i, w)| (*i, w.start, w.end)).collect()
        }
        _ => Vec::new(),
    }
}

#[test]
fn vibrato_snap_outcomes() {
    let frames = frames_from(&[A; 40], 0.9, 20.0);
    let shapes = la_shapes(2);
    let settings = CorrectionSettings::from_config(&AlignerConfig::default());
    let ctx = context(&frames, &shapes, &settings, 0..40);
    let windows = two_windows();

    let (outcome, skips) = vibrato::snap_boundaries(&ctx, &windows, &[0, 22], &[false]);
    assert_eq!(extents(&outcome), [(0, 0, 22), (1, 22, 40)]);
    assert!(skips.is_empty());

    let (outcome, skips) = vibrato::snap_boundaries(&ctx, &windows, &[0, 25], &[false]);
    assert_eq!(outcome, CorrectionOutcome::NotTriggered);
    assert_eq!(skips, [(0, SkipReason::ShiftTooLarge)]);

    let (outcome, skips) = vibrato::snap_boundaries(&ctx, &windows, &[0, 22], &[true]);
    assert_eq!(outcome, CorrectionOutcome::NotTriggered);
    assert_eq!(skips, [(0, SkipReason::Pinned)]);

    let (outcome, skips) = vibrato::snap_boundaries(&ctx, &windows, &[0, 20], &[false]);
    assert_eq!(outcome, CorrectionOutcome::NotTriggered);
    assert!(skips.is_empty());

    let tight = spans(&[0, 3, 40]);
    let (outcome, skips) = vibrato::snap_boundaries(&ctx, &tight, &[0, 1], &[false]);
    assert_eq!(outcome, CorrectionOutcome::NotTriggered);
    assert_eq!(skips, [(0, SkipReason::WouldCollapseNeighbor)]);
}

#[test]
fn vibrato_snaps_move_together() {
    // The first boundary can only reach 6 because the second one leaves for 8.
    let frames = frames_from(&[A; 12], 0.9, 20.0);
    let shapes = la_shapes(3);
    let settings = CorrectionSettings::from_config(&AlignerConfig::default());
    let ctx = context(&frames, &shapes, &settings, 0..12);
    let windows = spans(&[0, 4, 6, 12]);

    let (outcome, skips) = vibrato::snap_boundaries(&ctx, &windows, &[0, 6, 8], &[false, false]);
    assert_eq!(extents(&outcome), [(0, 0, 6), (1, 6, 8), (2, 8, 12)]);
    assert!(skips.is_empty());

    let mut snapped = windows.clone();
    let mut logs = vec![SyllableLog::default(); 3];
    commit(&ctx, &mut snapped, &mut logs, 0, CorrectionKind::VibratoFilter, outcome);
    assert_eq!(snapped, spans(&[0, 6, 8, 12]));
    assert!(logs
        .iter()
        .all(|log| log.corrections == [CorrectionKind::VibratoFilter]));

    let (again, skips) = vibrato::snap_boundaries(&ctx, &snapped, &[0, 6, 8], &[false, false]);
    assert_eq!(again, CorrectionOutcome::NotTriggered);
    assert!(skips.is_empty());
}

#[test]
fn vibrato_snaps_squeezing_a_syllable_are_withdrawn() {
    let frames = frames_from(&[A; 12], 0.9, 20.0);
    let shapes = la_shapes(3);
    let settings = CorrectionSettings::from_config(&AlignerConfig::default());
    let ctx = context(&frames, &shapes, &settings, 0..12);
    let windows = spans(&[0, 4, 6, 12]);

    let (outcome, skips) = vibrato::snap_boundaries(&ctx, &windows, &[0, 6, 7], &[false, false]);
    assert_eq!(outcome, CorrectionOutcome::NotTriggered);
    assert_eq!(
        skips,
        [
            (0, SkipReason::WouldCollapseNeighbor),
            (1, SkipReason::WouldCollapseNeighbor)
        ]
    );
}

#[test]
fn commit_rejects_edits_that_break_contiguity() {
    let frames = frames_from(&[A; 40], 0.9, 20.0);
    let shapes = vec![
        SyllableShape::of(&syllable(0, &[L, A])),
        SyllableShape::of(&syllable(1, &[L, A])),
    ];
    let settings = CorrectionSettings::from_config(&AlignerConfig::default());
    let ctx = context(&frames, &shapes, &settings, 0..40);
    let mut windows = two_windows();
    let mut logs = vec![SyllableLog::default(); 2];

    let gap = CorrectionOutcome::Corrected(vec![(
        0,
        Window {
            start: 0,
            end: 15,
            nucleus: Some(3..15),
        },
    )]);
    commit(&ctx, &mut windows, &mut logs, 0, CorrectionKind::ElongationMerge, gap);
    assert_eq!(windows, two_windows());
    assert_eq!(
        logs[0].skipped,
        vec![SkippedCorrection {
            kind: CorrectionKind::ElongationMerge,
            reason: SkipReason::WouldBreakInvariant,
        }]
    );
    assert!(logs[0].corrections.is_empty());
}

#[test]
fn settle_keeps_nucleus_inside_syllable() {
    let shape = SyllableShape::of(&syllable(0, &[L, A, N]));
    let mut window = Window {
        start: 10,
        end: 14,
        nucleus: Some(2..30),
    };
    shape.settle(&mut window);
    assert_eq!(window.nucleus, Some(11..13));
}

#[test]
fn median_of_window_lengths() {
    let windows = spans(&[0, 4, 6, 12, 22]);
    assert_eq!(median_len(&windows, 0..0), Some(5.0));
    assert_eq!(median_len(&windows, 1..3), Some(7.0));
    assert_eq!(median_len(&two_windows(), 0..2), None);
    assert_eq!(median_len(&[], 0..0), None);
}
