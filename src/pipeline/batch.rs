use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::alignment::report::{BatchReport, LineFailure};
use crate::error::{AlignmentError, BatchError};
use crate::pipeline::runtime::KaraokeAligner;
use crate::types::{LineOutput, LyricLine};

/// Shared flag checked by batch workers before each line.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Successful lines in input order plus the report covering every line.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub outputs: Vec<LineOutput>,
    pub report: BatchReport,
}

impl KaraokeAligner {
    /// Aligns independent lines on a scoped worker pool.
    ///
    /// A failing line never aborts the batch: it is recorded in the report
    /// and the remaining lines keep going. Lines not yet started when `cancel`
    /// fires are reported as cancelled.
    pub fn align_batch(
        &self,
        lines: &[LyricLine],
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome, BatchError> {
        let workers = self.worker_count(lines.len());
        tracing::info!(lines = lines.len(), workers, "starting batch alignment");

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, &LyricLine)>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        for job in lines.iter().enumerate() {
            // The receiver lives until the scope below ends.
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for (position, line) in job_rx.iter() {
                        let result = if cancel.is_cancelled() {
                            Err(AlignmentError::Cancelled)
                        } else {
                            self.align_line(line)
                        };
                        if result_tx.send((position, line.index, result)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);

        let mut results: Vec<_> = result_rx.iter().collect();
        results.sort_by_key(|(position, _, _)| *position);

        let mut outputs = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (_, line_index, result) in results {
            match result {
                Ok(output) => outputs.push(output),
                Err(err) => {
                    tracing::warn!(line_index, kind = err.kind(), error = %err, "line failed");
                    failures.push(LineFailure::from_error(line_index, &err));
                }
            }
        }

        if outputs.is_empty() && !failures.is_empty() {
            tracing::error!(failed = failures.len(), "every lyric line failed");
            return Err(BatchError::AllLinesFailed { failures });
        }

        let report = BatchReport::build(&outputs, failures);
        tracing::info!(
            aligned = report.aggregates.counts.aligned,
            degraded = report.aggregates.counts.degraded,
            failed = report.aggregates.counts.failed,
            "batch alignment finished"
        );
        Ok(BatchOutcome { outputs, report })
    }

    fn worker_count(&self, line_count: usize) -> usize {
        let configured = match self.config().worker_threads {
            0 => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            n => n,
        };
        configured.min(line_count).max(1)
    }
}
