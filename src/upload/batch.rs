//! Concurrent import of several sources

use super::AsyncJobPoller;
use crate::error::Result;
use crate::types::{PermanentHandle, UploadJob};
use futures::stream::{self, StreamExt};

/// Final state of one source in a batch
#[derive(Debug)]
pub struct UploadOutcome {
    /// The job record after it reached its final state
    pub job: UploadJob,
    /// Handle on success, the specific failure otherwise
    pub result: Result<PermanentHandle>,
}

/// Per-source outcomes of [`AsyncJobPoller::run_batch`], in source order
#[must_use]
#[derive(Debug)]
pub struct BatchReport {
    /// One outcome per source, same order as the input
    pub outcomes: Vec<UploadOutcome>,
}

impl BatchReport {
    /// Number of sources that uploaded
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Number of sources that did not upload
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Handles of successful uploads, in source order
    pub fn handles(&self) -> Vec<&PermanentHandle> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .collect()
    }
}

impl AsyncJobPoller {
    /// Import every source with the configured worker count
    pub async fn run_batch(&self, sources: &[String]) -> BatchReport {
        self.run_batch_with(sources, self.config.batch_workers)
            .await
    }

    /// Import every source, running at most `workers` jobs at a time
    ///
    /// Each source gets its own slot, written once by the job that owns it. A failure
    /// in one source never affects the others.
    pub async fn run_batch_with(&self, sources: &[String], workers: usize) -> BatchReport {
        let max_poll_attempts = self.config.max_poll_attempts;
        tracing::info!(sources = sources.len(), workers, "Starting upload batch");

        let finished: Vec<(usize, UploadOutcome)> = stream::iter(sources.iter().enumerate())
            .map(|(index, source)| async move {
                let mut job = UploadJob::new(source.as_str());
                let result = self.drive(&mut job, max_poll_attempts).await;
                if let Err(e) = &result {
                    tracing::warn!(source = %source, error = %e, "Upload failed");
                }
                (index, UploadOutcome { job, result })
            })
            .buffer_unordered(workers.max(1))
            .collect()
            .await;

        let mut slots: Vec<Option<UploadOutcome>> = sources.iter().map(|_| None).collect();
        for (index, outcome) in finished {
            slots[index] = Some(outcome);
        }
        let report = BatchReport {
            outcomes: slots.into_iter().flatten().collect(),
        };

        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Upload batch finished"
        );
        report
    }
}
