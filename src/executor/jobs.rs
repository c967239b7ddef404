//! Bounded-concurrency job runner
//!
//! Runs independent jobs on the tokio runtime, at most `max_workers` at a
//! time, starting them in the order they were submitted. Jobs never cancel
//! each other: every job runs to completion or failure, and every failure
//! is collected and returned to the caller.
//!
//! Hooks are invoked only from the task that called [`run_jobs`], in the
//! order jobs finish, so they may freely mutate caller-owned state.

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use tokio::task::JoinError;
use tracing::{debug, Instrument, Span};

use crate::error::{Error, Result, Severity};

/// A unit of work for [`run_jobs`]
pub struct Job<T> {
    name: String,
    span: Span,
    target: BoxFuture<'static, Result<T>>,
}

impl<T> Job<T> {
    pub fn new<F>(name: impl Into<String>, target: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let name = name.into();

        Self {
            span: tracing::debug_span!("job", name = %name),
            name,
            target: Box::pin(target),
        }
    }

    /// Logging context the job runs in
    pub fn in_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Identifies a job in hooks and failures; `id` is the submission index
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobInfo {
    pub id: usize,
    pub name: String,
}

/// Observer of job lifecycle, every method is a no-op by default
pub trait JobHooks<T> {
    /// Right before the job is submitted
    fn on_start(&mut self, _job: &JobInfo) {}

    fn on_complete(&mut self, _job: &JobInfo, _output: T) {}

    fn on_error(&mut self, _job: &JobInfo, _error: &Error) {}

    /// After `on_complete` or `on_error`, with the number of unfinished jobs
    fn on_done(&mut self, _job: &JobInfo, _remaining: usize) {}
}

/// Hooks that do nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl<T> JobHooks<T> for NoHooks {}

/// A job that returned an error or panicked
#[derive(Debug)]
pub struct JobFailure {
    pub job: JobInfo,
    pub error: Error,
}

/// Run all jobs, returning the failed ones
///
/// `max_workers` defaults to the number of jobs and is capped by it.
pub async fn run_jobs<T, H>(
    jobs: Vec<Job<T>>,
    max_workers: Option<usize>,
    hooks: &mut H,
) -> Vec<JobFailure>
where
    T: Send + 'static,
    H: JobHooks<T> + ?Sized,
{
    let total = jobs.len();
    if total == 0 {
        return Vec::new();
    }

    let workers = max_workers.unwrap_or(total).clamp(1, total);
    debug!("Running {} jobs, {} at a time", total, workers);

    let mut queue = jobs.into_iter().enumerate();
    let mut in_flight = FuturesUnordered::new();
    let mut remaining = total;
    let mut failures = Vec::new();

    loop {
        // Jobs start strictly in submission order, as slots free up
        while in_flight.len() < workers {
            let Some((id, job)) = queue.next() else {
                break;
            };

            let info = JobInfo { id, name: job.name };
            hooks.on_start(&info);

            let handle = tokio::spawn(job.target.instrument(job.span));
            in_flight.push(async move { (info, handle.await) });
        }

        let Some((info, outcome)) = in_flight.next().await else {
            break;
        };
        remaining -= 1;

        let error = match outcome {
            Ok(Ok(output)) => {
                hooks.on_complete(&info, output);
                None
            }
            Ok(Err(error)) => Some(error),
            Err(join_error) => Some(Error::JobPanicked {
                job: info.name.clone(),
                reason: panic_reason(join_error),
            }),
        };

        if let Some(ref error) = error {
            hooks.on_error(&info, error);
        }

        hooks.on_done(&info, remaining);

        if let Some(error) = error {
            failures.push(JobFailure { job: info, error });
        }
    }

    failures
}

fn panic_reason(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }

    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Pick the error to surface from a batch of failures
///
/// User-facing errors win over domain errors; without either, a fatal
/// error carrying `fallback` is synthesized.
pub fn resolve_fatal(failures: Vec<JobFailure>, fallback: &str) -> Error {
    let mut failures = failures;

    for severity in [Severity::User, Severity::Domain] {
        if let Some(index) = failures
            .iter()
            .position(|failure| failure.error.severity() == severity)
        {
            return failures.swap_remove(index).error;
        }
    }

    Error::Fatal(fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::Barrier;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        outputs: Vec<u32>,
    }

    impl JobHooks<u32> for Recorder {
        fn on_start(&mut self, job: &JobInfo) {
            self.events.push(format!("start:{}", job.name));
        }

        fn on_complete(&mut self, job: &JobInfo, output: u32) {
            self.events.push(format!("complete:{}", job.name));
            self.outputs.push(output);
        }

        fn on_error(&mut self, job: &JobInfo, _error: &Error) {
            self.events.push(format!("error:{}", job.name));
        }

        fn on_done(&mut self, job: &JobInfo, remaining: usize) {
            self.events.push(format!("done:{}:{}", job.name, remaining));
        }
    }

    fn failure(id: usize, error: Error) -> JobFailure {
        JobFailure {
            job: JobInfo {
                id,
                name: id.to_string(),
            },
            error,
        }
    }

    #[tokio::test]
    async fn test_all_jobs_in_flight_by_default() {
        let barrier = Arc::new(Barrier::new(5));

        let jobs = (0..5)
            .map(|i| {
                let barrier = barrier.clone();
                Job::new(format!("job-{i}"), async move {
                    barrier.wait().await;
                    Ok(i)
                })
            })
            .collect();

        let failures = tokio::time::timeout(
            Duration::from_secs(5),
            run_jobs(jobs, None, &mut NoHooks),
        )
        .await
        .expect("jobs did not run concurrently");

        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn test_max_workers_bounds_concurrency() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs = (0..6)
            .map(|i| {
                let running = running.clone();
                let peak = peak.clone();
                Job::new(format!("job-{i}"), async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        let failures = run_jobs(jobs, Some(2), &mut NoHooks).await;

        assert!(failures.is_empty());
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_single_worker_keeps_submission_order() {
        for _ in 0..20 {
            let order = Arc::new(Mutex::new(Vec::new()));

            let jobs = (0..16)
                .map(|i| {
                    let order = order.clone();
                    Job::new(format!("job-{i}"), async move {
                        order.lock().unwrap().push(i);
                        tokio::task::yield_now().await;
                        Ok(())
                    })
                })
                .collect();

            let failures = run_jobs(jobs, Some(1), &mut NoHooks).await;

            assert!(failures.is_empty());
            assert_eq!(*order.lock().unwrap(), (0..16).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_hooks_follow_completion_order() {
        let jobs = vec![
            Job::new("slow", async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(1)
            }),
            Job::new("fast", async { Ok(2) }),
        ];

        let mut recorder = Recorder::default();
        let failures = run_jobs(jobs, None, &mut recorder).await;

        assert!(failures.is_empty());
        assert_eq!(
            recorder.events,
            vec![
                "start:slow",
                "start:fast",
                "complete:fast",
                "done:fast:1",
                "complete:slow",
                "done:slow:0",
            ]
        );
        assert_eq!(recorder.outputs, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_other_jobs() {
        let jobs = vec![
            Job::new("broken", async { Err(Error::soft("no tests found")) }),
            Job::new("healthy", async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(7)
            }),
        ];

        let mut recorder = Recorder::default();
        let failures = run_jobs(jobs, Some(1), &mut recorder).await;

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].job.name, "broken");
        assert_eq!(recorder.outputs, vec![7]);
        assert_eq!(
            recorder.events,
            vec![
                "start:broken",
                "error:broken",
                "done:broken:1",
                "start:healthy",
                "complete:healthy",
                "done:healthy:0",
            ]
        );
    }

    #[tokio::test]
    async fn test_panic_is_collected() {
        let jobs: Vec<Job<u32>> = vec![
            Job::new("panicky", async {
                if true {
                    panic!("guest vanished");
                }
                Ok(0)
            }),
            Job::new("fine", async { Ok(1) }),
        ];

        let mut recorder = Recorder::default();
        let failures = run_jobs(jobs, None, &mut recorder).await;

        assert_eq!(failures.len(), 1);
        assert!(matches!(
            &failures[0].error,
            Error::JobPanicked { job, reason } if job == "panicky" && reason == "guest vanished"
        ));
        assert_eq!(recorder.outputs, vec![1]);
    }

    #[tokio::test]
    async fn test_no_jobs() {
        let failures = run_jobs(Vec::<Job<()>>::new(), Some(4), &mut NoHooks).await;
        assert!(failures.is_empty());
    }

    #[test]
    fn test_resolve_fatal_prefers_user_errors() {
        let failures = vec![
            failure(0, Error::Fatal("generic A".to_string())),
            failure(1, Error::soft("B: nothing to test")),
            failure(
                2,
                Error::HarnessCrashed {
                    exit_code: 14,
                    stderr: "C".to_string(),
                },
            ),
        ];

        let error = resolve_fatal(failures, "At least one entry crashed");
        assert!(matches!(error, Error::Soft(ref m) if m == "B: nothing to test"));
    }

    #[test]
    fn test_resolve_fatal_prefers_domain_over_unknown() {
        let failures = vec![
            failure(
                0,
                Error::JobPanicked {
                    job: "0".to_string(),
                    reason: "boom".to_string(),
                },
            ),
            failure(1, Error::Invocation("ssh broke".to_string())),
        ];

        let error = resolve_fatal(failures, "At least one entry crashed");
        assert!(matches!(error, Error::Invocation(_)));
    }

    #[test]
    fn test_resolve_fatal_fallback() {
        let failures = vec![failure(
            0,
            Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk")),
        )];

        let error = resolve_fatal(failures, "At least one entry crashed");
        assert_eq!(error.to_string(), "At least one entry crashed");
    }
}
