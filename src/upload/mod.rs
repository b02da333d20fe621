//! Upload-and-poll driver for asynchronous server-side import jobs
//!
//! [`AsyncJobPoller`] starts a job for one source URL and polls its status at a fixed
//! interval until a terminal state:
//!
//! ```text
//! Created --start--> Pending --poll--> Pending ... --> Uploaded | Failed | TimedOut
//! ```
//!
//! - A failed start aborts immediately; there is no job to poll.
//! - Start failures, poll failures that outlast the retries, and cancellation mark the
//!   job `Failed` with the error recorded in `last_error`.
//! - `Uploaded` returns the permanent handle.
//! - `Failed` is the server's verdict on the job and is not retried
//!   ([`Error::JobFailed`]).
//! - Running out of polls yields [`Error::JobTimedOut`].
//!
//! Individual start/poll calls go through the [`RetryExecutor`], so rate limits and
//! transient failures are absorbed below the poll loop.
//!
//! Several sources can be imported concurrently with [`AsyncJobPoller::run_batch`].

mod batch;

pub use batch::{BatchReport, UploadOutcome};

use crate::config::UploadConfig;
use crate::error::{Error, Result};
use crate::retry::RetryExecutor;
use crate::types::{JobId, JobState, JobStatus, PermanentHandle, UploadJob};
use async_trait::async_trait;
use std::sync::Arc;

/// An asynchronous job endpoint (collaborator)
#[async_trait]
pub trait JobEndpoint: Send + Sync {
    /// Start importing `source_url`, returning the job identifier
    async fn start(&self, source_url: &str) -> Result<JobId>;

    /// Report the current status of `job_id`
    async fn poll(&self, job_id: &JobId) -> Result<JobStatus>;
}

#[async_trait]
impl<E: JobEndpoint + ?Sized> JobEndpoint for Arc<E> {
    async fn start(&self, source_url: &str) -> Result<JobId> {
        (**self).start(source_url).await
    }

    async fn poll(&self, job_id: &JobId) -> Result<JobStatus> {
        (**self).poll(job_id).await
    }
}

/// Drives import jobs to a terminal state
#[derive(Clone)]
pub struct AsyncJobPoller {
    endpoint: Arc<dyn JobEndpoint>,
    executor: RetryExecutor,
    config: UploadConfig,
}

impl AsyncJobPoller {
    /// Create a poller over `endpoint`
    ///
    /// The executor's cancellation token also interrupts poll-interval sleeps.
    pub fn new(endpoint: Arc<dyn JobEndpoint>, executor: RetryExecutor, config: UploadConfig) -> Self {
        Self {
            endpoint,
            executor,
            config,
        }
    }

    /// The polling configuration in use
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// The retry executor wrapped around every endpoint call
    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    /// Import one source with the configured poll bound
    pub async fn run(&self, source_url: &str) -> Result<PermanentHandle> {
        self.run_with(source_url, self.config.max_poll_attempts)
            .await
    }

    /// Import one source, polling at most `max_poll_attempts` times
    pub async fn run_with(&self, source_url: &str, max_poll_attempts: u32) -> Result<PermanentHandle> {
        let mut job = UploadJob::new(source_url);
        self.drive(&mut job, max_poll_attempts).await
    }

    /// Run `job` to completion, recording every transition on it
    ///
    /// The job always ends in a terminal state. Errors that are not the server's own
    /// verdict (start failures, exhausted retries, cancellation) leave it `Failed` with
    /// the error in `last_error`.
    pub(crate) async fn drive(&self, job: &mut UploadJob, max_poll_attempts: u32) -> Result<PermanentHandle> {
        let result = self.advance(job, max_poll_attempts).await;
        if let Err(e) = &result {
            if !job.state.is_terminal() {
                job.state = JobState::Failed;
                job.last_error = Some(e.to_string());
            }
        }
        result
    }

    async fn advance(&self, job: &mut UploadJob, max_poll_attempts: u32) -> Result<PermanentHandle> {
        let max_poll_attempts = max_poll_attempts.max(1);

        let started = self
            .executor
            .execute(|| self.endpoint.start(&job.source_url))
            .await;
        let job_id = match started {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(source = %job.source_url, error = %e, "Failed to start upload job");
                return Err(e);
            }
        };

        tracing::debug!(source = %job.source_url, job_id = %job_id, "Upload job started");
        job.job_id = Some(job_id.clone());
        job.state = JobState::Pending;

        for poll in 1..=max_poll_attempts {
            job.attempts = poll;

            let polled = self.executor.execute(|| self.endpoint.poll(&job_id)).await;
            let status = match polled {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(job_id = %job_id, poll, error = %e, "Failed to poll upload job");
                    return Err(e);
                }
            };

            match status {
                JobStatus::Uploaded { handle } => {
                    job.state = JobState::Uploaded;
                    tracing::info!(job_id = %job_id, polls = poll, "Upload job finished");
                    return Ok(handle);
                }
                JobStatus::Failed { reason } => {
                    job.state = JobState::Failed;
                    job.last_error = Some(reason.clone());
                    tracing::warn!(job_id = %job_id, reason = %reason, "Upload job failed on server");
                    return Err(Error::JobFailed {
                        job_id: job_id.0,
                        reason,
                    });
                }
                JobStatus::Pending => {
                    tracing::debug!(job_id = %job_id, poll, max_poll_attempts, "Upload job pending");
                    if poll < max_poll_attempts {
                        let cancel = self.executor.cancellation();
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return Err(Error::Cancelled),
                            _ = tokio::time::sleep(self.config.poll_interval) => {}
                        }
                    }
                }
            }
        }

        job.state = JobState::TimedOut;
        tracing::warn!(job_id = %job_id, polls = max_poll_attempts, "Upload job timed out");
        Err(Error::JobTimedOut {
            job_id: job_id.0,
            attempts: max_poll_attempts,
        })
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    /// Endpoint that replays a status script per source URL
    ///
    /// The job id equals the source URL. An exhausted script keeps answering `Pending`.
    #[derive(Default)]
    pub(crate) struct ScriptedJobs {
        scripts: Mutex<HashMap<String, VecDeque<Result<JobStatus>>>>,
        start_failures: Mutex<HashMap<String, Error>>,
        pub(crate) polls: Mutex<HashMap<String, u32>>,
        pub(crate) latency: Duration,
        in_flight: AtomicUsize,
        pub(crate) max_in_flight: AtomicUsize,
    }

    impl ScriptedJobs {
        pub(crate) fn with_script(self, source: &str, statuses: Vec<Result<JobStatus>>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(source.to_string(), statuses.into());
            self
        }

        pub(crate) fn failing_start(self, source: &str, error: Error) -> Self {
            self.start_failures
                .lock()
                .unwrap()
                .insert(source.to_string(), error);
            self
        }

        pub(crate) fn polls_for(&self, source: &str) -> u32 {
            self.polls.lock().unwrap().get(source).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl JobEndpoint for ScriptedJobs {
        async fn start(&self, source_url: &str) -> Result<JobId> {
            if let Some(e) = self.start_failures.lock().unwrap().remove(source_url) {
                return Err(e);
            }
            Ok(JobId(source_url.to_string()))
        }

        async fn poll(&self, job_id: &JobId) -> Result<JobStatus> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            *self.polls.lock().unwrap().entry(job_id.0.clone()).or_insert(0) += 1;
            self.scripts
                .lock()
                .unwrap()
                .get_mut(&job_id.0)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Ok(JobStatus::Pending))
        }
    }

    pub(crate) fn uploaded(handle: &str) -> Result<JobStatus> {
        Ok(JobStatus::Uploaded {
            handle: PermanentHandle(handle.to_string()),
        })
    }

    pub(crate) fn poller(endpoint: Arc<ScriptedJobs>, max_poll_attempts: u32) -> AsyncJobPoller {
        AsyncJobPoller::new(
            endpoint,
            RetryExecutor::new(RetryConfig::default()),
            UploadConfig {
                max_poll_attempts,
                ..UploadConfig::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn pending_then_uploaded_succeeds_after_three_polls() {
        let jobs = Arc::new(ScriptedJobs::default().with_script(
            "img1",
            vec![Ok(JobStatus::Pending), Ok(JobStatus::Pending), uploaded("file-1")],
        ));

        let start = Instant::now();
        let handle = poller(jobs.clone(), 30).run("img1").await.unwrap();

        assert_eq!(handle, PermanentHandle("file-1".into()));
        assert_eq!(jobs.polls_for("img1"), 3);
        // Two pending polls, each followed by the 2s interval
        assert!(start.elapsed() >= Duration::from_secs(4));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_is_job_failed_with_reason() {
        let jobs = Arc::new(ScriptedJobs::default().with_script(
            "img1",
            vec![
                Ok(JobStatus::Pending),
                Ok(JobStatus::Failed {
                    reason: "unsupported file type".into(),
                }),
            ],
        ));

        let err = poller(jobs.clone(), 30).run("img1").await.unwrap_err();

        match err {
            Error::JobFailed { job_id, reason } => {
                assert_eq!(job_id, "img1");
                assert_eq!(reason, "unsupported file type");
            }
            other => panic!("expected JobFailed, got {other:?}"),
        }
        assert_eq!(jobs.polls_for("img1"), 2, "failed jobs are not polled again");
    }

    #[tokio::test(start_paused = true)]
    async fn always_pending_times_out_after_exact_poll_count() {
        let jobs = Arc::new(ScriptedJobs::default());

        let err = poller(jobs.clone(), 5).run("img1").await.unwrap_err();

        assert!(matches!(err, Error::JobTimedOut { attempts: 5, .. }));
        assert_eq!(jobs.polls_for("img1"), 5);
    }

    #[tokio::test]
    async fn start_failure_aborts_without_polling() {
        let jobs = Arc::new(ScriptedJobs::default().failing_start(
            "img1",
            Error::PermanentRequest {
                status: Some(400),
                message: "external_url must be https".into(),
            },
        ));

        let err = poller(jobs.clone(), 30).run("img1").await.unwrap_err();

        assert!(matches!(err, Error::PermanentRequest { status: Some(400), .. }));
        assert_eq!(jobs.polls_for("img1"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn every_error_path_ends_in_a_terminal_state() {
        let jobs = Arc::new(
            ScriptedJobs::default()
                .failing_start(
                    "start-fails",
                    Error::PermanentRequest {
                        status: Some(400),
                        message: "bad url".into(),
                    },
                )
                .with_script(
                    "poll-fails",
                    vec![
                        Err(Error::TransientNetwork("reset".into())),
                        Err(Error::TransientNetwork("reset".into())),
                        Err(Error::TransientNetwork("reset".into())),
                    ],
                ),
        );
        let poller = poller(jobs, 30);

        let mut job = UploadJob::new("start-fails");
        assert!(poller.drive(&mut job, 30).await.is_err());
        assert_eq!(job.state, JobState::Failed);
        assert!(job.job_id.is_none());
        assert!(job.last_error.as_deref().unwrap().contains("bad url"));

        let mut job = UploadJob::new("poll-fails");
        let err = poller.drive(&mut job, 30).await.unwrap_err();
        assert!(matches!(err, Error::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 1);
        assert!(job.last_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_poll_error_is_absorbed_by_retry() {
        let jobs = Arc::new(ScriptedJobs::default().with_script(
            "img1",
            vec![
                Err(Error::TransientNetwork("502".into())),
                uploaded("file-9"),
            ],
        ));

        let handle = poller(jobs.clone(), 30).run("img1").await.unwrap();
        assert_eq!(handle.0, "file-9");
        assert_eq!(jobs.polls_for("img1"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_poll_error_surfaces() {
        let jobs = Arc::new(ScriptedJobs::default().with_script(
            "img1",
            vec![Err(Error::PermanentRequest {
                status: Some(404),
                message: "no such upload".into(),
            })],
        ));

        let err = poller(jobs, 30).run("img1").await.unwrap_err();
        assert_eq!(err.error_code(), "permanent_request");
    }

    #[tokio::test(start_paused = true)]
    async fn drive_records_transitions() {
        let jobs = Arc::new(ScriptedJobs::default().with_script(
            "img1",
            vec![Ok(JobStatus::Pending), uploaded("h")],
        ));
        let poller = poller(jobs, 30);

        let mut job = UploadJob::new("img1");
        poller.drive(&mut job, 30).await.unwrap();
        assert_eq!(job.state, JobState::Uploaded);
        assert_eq!(job.attempts, 2);
        assert_eq!(job.job_id, Some(JobId("img1".into())));

        let mut job = UploadJob::new("img2");
        let _ = poller.drive(&mut job, 3).await;
        assert_eq!(job.state, JobState::TimedOut);
        assert_eq!(job.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_poll_interval() {
        let token = tokio_util::sync::CancellationToken::new();
        let poller = AsyncJobPoller::new(
            Arc::new(ScriptedJobs::default()),
            RetryExecutor::new(RetryConfig::default()).with_cancellation(token.clone()),
            UploadConfig {
                poll_interval: Duration::from_secs(60),
                ..UploadConfig::default()
            },
        );

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        });

        let start = Instant::now();
        let err = poller.run("img1").await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, Error::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_job_is_marked_failed() {
        let token = tokio_util::sync::CancellationToken::new();
        let poller = AsyncJobPoller::new(
            Arc::new(ScriptedJobs::default()),
            RetryExecutor::new(RetryConfig::default()).with_cancellation(token.clone()),
            UploadConfig::default(),
        );
        token.cancel();

        let mut job = UploadJob::new("img1");
        let err = poller.drive(&mut job, 30).await.unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(job.state, JobState::Failed);
        assert!(job.state.is_terminal());
    }
}
