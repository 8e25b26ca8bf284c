use serde::Serialize;

use crate::error::AlignmentError;
use crate::types::{CorrectionKind, LineOutput, SyllableTiming};

pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Summary of one batch run, serializable for downstream tooling.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub schema_version: u32,
    pub lines: Vec<LineReport>,
    pub failures: Vec<LineFailure>,
    pub aggregates: AggregateReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Aligned,
    /// Aligned, but with a probability floor, fallback syllables or
    /// skipped corrections.
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineReport {
    pub line_index: usize,
    pub status: LineStatus,
    pub syllable_count: u32,
    pub duration_ms: u64,
    pub probability_floor_used: bool,
    pub low_confidence_syllable_count: u32,
    pub corrections: CorrectionCounts,
    pub skipped_correction_count: u32,
    pub structural: StructuralMetrics,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorrectionCounts {
    pub elongation_merge: u32,
    pub melisma_redistribution: u32,
    pub vibrato_filter: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructuralMetrics {
    pub negative_duration_syllable_count: u32,
    pub overlap_syllable_count: u32,
    pub non_monotonic_syllable_count: u32,
    pub gap_ratio: f32,
}

/// A line that produced no timings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineFailure {
    pub line_index: usize,
    /// Stable error label, see [`AlignmentError::kind`].
    pub kind: &'static str,
    pub message: String,
}

impl LineFailure {
    pub fn from_error(line_index: usize, err: &AlignmentError) -> Self {
        Self {
            line_index,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateReport {
    pub counts: AggregateCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syllable_duration_ms: Option<MetricDistribution>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateCounts {
    pub total: u32,
    pub aligned: u32,
    pub degraded: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricDistribution {
    pub mean: f32,
    pub median: f32,
    pub p90: f32,
    pub max: f32,
}

impl BatchReport {
    pub fn build(outputs: &[LineOutput], failures: Vec<LineFailure>) -> Self {
        let lines: Vec<LineReport> = outputs.iter().map(line_report).collect();
        let degraded = lines
            .iter()
            .filter(|l| l.status == LineStatus::Degraded)
            .count();
        let counts = AggregateCounts {
            total: to_u32(lines.len() + failures.len()),
            aligned: to_u32(lines.len() - degraded),
            degraded: to_u32(degraded),
            failed: to_u32(failures.len()),
        };
        let durations: Vec<f64> = outputs
            .iter()
            .flat_map(|o| o.timings.iter())
            .map(|t| (t.end_seconds - t.start_seconds) * 1000.0)
            .collect();
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            lines,
            failures,
            aggregates: AggregateReport {
                counts,
                syllable_duration_ms: distribution_or_none(&durations),
            },
        }
    }

    pub fn degraded_line_indices(&self) -> Vec<usize> {
        self.lines
            .iter()
            .filter(|l| l.status == LineStatus::Degraded)
            .map(|l| l.line_index)
            .collect()
    }

    pub fn failed_line_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.line_index).collect()
    }

    pub fn to_json(&self) -> Result<String, AlignmentError> {
        serde_json::to_string_pretty(self).map_err(|e| AlignmentError::json("serialize batch report", e))
    }
}

fn line_report(output: &LineOutput) -> LineReport {
    let mut corrections = CorrectionCounts::default();
    for kind in output.corrected.iter().flat_map(|s| s.corrections.iter()) {
        match kind {
            CorrectionKind::ElongationMerge => corrections.elongation_merge += 1,
            CorrectionKind::MelismaRedistribution => corrections.melisma_redistribution += 1,
            CorrectionKind::VibratoFilter => corrections.vibrato_filter += 1,
        }
    }
    let duration_ms = match (output.timings.first(), output.timings.last()) {
        (Some(first), Some(last)) => last.end_ms().saturating_sub(first.start_ms()),
        _ => 0,
    };
    LineReport {
        line_index: output.line_index,
        status: if output.is_degraded() {
            LineStatus::Degraded
        } else {
            LineStatus::Aligned
        },
        syllable_count: to_u32(output.syllables.len()),
        duration_ms,
        probability_floor_used: output.probability_floor_used,
        low_confidence_syllable_count: to_u32(
            output.timings.iter().filter(|t| t.low_confidence).count(),
        ),
        corrections,
        skipped_correction_count: to_u32(output.corrected.iter().map(|s| s.skipped.len()).sum()),
        structural: compute_structural_metrics(&output.timings, duration_ms),
    }
}

/// Timings are `[start_ms, end_ms)`, so a syllable must end strictly after it starts.
fn compute_structural_metrics(timings: &[SyllableTiming], duration_ms: u64) -> StructuralMetrics {
    let negative_duration = timings
        .iter()
        .filter(|t| t.end_ms() <= t.start_ms())
        .count();

    let mut overlaps = 0usize;
    let mut non_monotonic = 0usize;
    let mut gap_ms = 0u64;
    for pair in timings.windows(2) {
        let (current, next) = (&pair[0], &pair[1]);
        if current.end_ms() > next.start_ms() {
            overlaps += 1;
        } else {
            gap_ms = gap_ms.saturating_add(next.start_ms() - current.end_ms());
        }
        if current.start_ms() > next.start_ms() {
            non_monotonic += 1;
        }
    }

    StructuralMetrics {
        negative_duration_syllable_count: to_u32(negative_duration),
        overlap_syllable_count: to_u32(overlaps),
        non_monotonic_syllable_count: to_u32(non_monotonic),
        gap_ratio: if duration_ms > 0 {
            (gap_ms as f64 / duration_ms as f64) as f32
        } else {
            0.0
        },
    }
}

fn distribution_or_none(values: &[f64]) -> Option<MetricDistribution> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
    Some(MetricDistribution {
        mean: mean as f32,
        median: median_sorted(&sorted) as f32,
        p90: percentile_sorted(&sorted, 0.9) as f32,
        max: sorted[sorted.len() - 1] as f32,
    })
}

fn median_sorted(sorted_values: &[f64]) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }
    let mid = sorted_values.len() / 2;
    if sorted_values.len() % 2 == 0 {
        (sorted_values[mid - 1] + sorted_values[mid]) / 2.0
    } else {
        sorted_values[mid]
    }
}

fn percentile_sorted(sorted_values: &[f64], percentile: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }
    if sorted_values.len() == 1 {
        return sorted_values[0];
    }

    let clamped = percentile.clamp(0.0, 1.0);
    let max_index = (sorted_values.len() - 1) as f64;
    let rank = clamped * max_index;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted_values[lower]
    } else {
        let weight = rank - lower as f64;
        sorted_values[lower] * (1.0 - weight) + sorted_values[upper] * weight
    }
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
