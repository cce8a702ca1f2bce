use super::synthesis::{FailureKind, SynthesisClient, SynthesisOutcome, SynthesisTask};
use crate::domain::shared::RetryPolicy;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default number of synthesis calls in flight
pub const DEFAULT_CONCURRENCY: usize = 3;

/// What a failed segment does to its siblings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Every task runs to a terminal state; partial success is reportable
    #[default]
    BestEffort,
    /// The first failure cancels everything still pending
    AbortOnFirstFailure,
}

#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_concurrency: usize,
    pub failure_policy: FailurePolicy,
    pub retry: RetryPolicy,
    /// Whole-operation deadline covering every queued and in-flight task
    pub deadline: Option<Instant>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_CONCURRENCY,
            failure_policy: FailurePolicy::BestEffort,
            retry: RetryPolicy::none(),
            deadline: None,
        }
    }
}

/// Why a run stopped before every task reached a natural terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    Cancelled,
    DeadlineExceeded,
    AbortedOnFailure,
}

impl Interruption {
    fn message(&self) -> &'static str {
        match self {
            Interruption::Cancelled => "cancelled before completion",
            Interruption::DeadlineExceeded => "operation deadline exceeded",
            Interruption::AbortedOnFailure => "aborted after a sibling segment failed",
        }
    }
}

#[derive(Debug)]
pub struct PoolRun {
    /// One outcome per submitted task, in submission order
    pub outcomes: Vec<SynthesisOutcome>,
    /// Tasks that reached success or failure on their own
    pub completed: usize,
    /// Most calls this run had in flight at once
    pub peak_in_flight: usize,
    pub interruption: Option<Interruption>,
}

/// Live counters, readable while a run is in progress.
///
/// The pool's own stats are process-wide and add up every concurrent run;
/// `PoolRun::peak_in_flight` is the per-run figure.
#[derive(Debug, Default)]
pub struct PoolStats {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    completed: AtomicUsize,
}

impl PoolStats {
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }
}

/// Decrements the in-flight count however the task ends, abort included
struct InFlightGuard(Arc<PoolStats>);

impl InFlightGuard {
    fn enter(stats: Arc<PoolStats>) -> Self {
        let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs synthesis tasks with at most `max_concurrency` calls in flight per run.
///
/// Admission is permit-gated: as soon as one call finishes its permit admits
/// the next queued task. Each outcome is stored in a slot reserved for its
/// position, so the returned order never depends on completion order.
pub struct WorkerPool {
    client: Arc<SynthesisClient>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    pub fn new(client: Arc<SynthesisClient>) -> Self {
        Self {
            client,
            stats: Arc::new(PoolStats::default()),
        }
    }

    pub fn client(&self) -> &Arc<SynthesisClient> {
        &self.client
    }

    pub fn stats(&self) -> Arc<PoolStats> {
        self.stats.clone()
    }

    /// Run every task to a terminal state, or until `cancel` fires / the deadline passes.
    ///
    /// `on_progress(completed, total)` is called from this loop after each task finishes.
    pub async fn run<P>(
        &self,
        tasks: Vec<SynthesisTask>,
        options: &PoolOptions,
        cancel: &CancellationToken,
        mut on_progress: P,
    ) -> PoolRun
    where
        P: FnMut(usize, usize),
    {
        let total = tasks.len();
        let mut slots: Vec<Option<SynthesisOutcome>> = (0..total).map(|_| None).collect();
        let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
        let mut queue = tasks.into_iter().enumerate();
        let mut next = queue.next();
        let mut join_set: JoinSet<(usize, SynthesisOutcome)> = JoinSet::new();
        let mut completed = 0;
        let mut interruption = None;
        let run_stats = Arc::new(PoolStats::default());

        let deadline = tokio::time::sleep_until(options.deadline.unwrap_or_else(far_future));
        tokio::pin!(deadline);

        tracing::debug!(
            total,
            max_concurrency = options.max_concurrency,
            failure_policy = ?options.failure_policy,
            "Worker pool started"
        );

        loop {
            if next.is_none() && join_set.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    interruption = Some(Interruption::Cancelled);
                    break;
                }
                _ = &mut deadline, if options.deadline.is_some() => {
                    interruption = Some(Interruption::DeadlineExceeded);
                    break;
                }
                Some(joined) = join_set.join_next(), if !join_set.is_empty() => {
                    completed += 1;
                    self.stats.completed.fetch_add(1, Ordering::Relaxed);
                    run_stats.completed.fetch_add(1, Ordering::Relaxed);

                    let failed = match joined {
                        Ok((slot, outcome)) => {
                            let failed = !outcome.is_success();
                            slots[slot] = Some(outcome);
                            failed
                        }
                        Err(err) => {
                            // slot stays empty and is filled in below
                            tracing::error!(error = %err, "Synthesis task terminated abnormally");
                            true
                        }
                    };
                    on_progress(completed, total);

                    if failed && options.failure_policy == FailurePolicy::AbortOnFirstFailure {
                        interruption = Some(Interruption::AbortedOnFailure);
                        break;
                    }
                }
                permit = semaphore.clone().acquire_owned(), if next.is_some() => {
                    let Ok(permit) = permit else { break };
                    if let Some((slot, task)) = next.take() {
                        let client = self.client.clone();
                        let stats = self.stats.clone();
                        let run_stats = run_stats.clone();
                        let retry = options.retry;
                        join_set.spawn(async move {
                            let _permit = permit;
                            let _guard = InFlightGuard::enter(stats);
                            let _run_guard = InFlightGuard::enter(run_stats);
                            (slot, execute(&client, task, retry).await)
                        });
                    }
                    next = queue.next();
                }
            }
        }

        if let Some(reason) = interruption {
            tracing::warn!(
                reason = ?reason,
                completed,
                total,
                in_flight = join_set.len(),
                "Worker pool interrupted, aborting remaining tasks"
            );
            join_set.abort_all();
            // keep results from tasks that finished before the abort landed
            while let Some(joined) = join_set.join_next().await {
                if let Ok((slot, outcome)) = joined {
                    if slots[slot].is_none() {
                        completed += 1;
                        slots[slot] = Some(outcome);
                    }
                }
            }
        }

        let outcomes = slots
            .into_iter()
            .enumerate()
            .map(|(position, slot)| {
                slot.unwrap_or_else(|| SynthesisOutcome::Failure {
                    index: position,
                    kind: FailureKind::Cancelled,
                    message: interruption
                        .map(|reason| reason.message())
                        .unwrap_or("worker task terminated unexpectedly")
                        .to_string(),
                })
            })
            .collect();

        PoolRun {
            outcomes,
            completed,
            peak_in_flight: run_stats.peak_in_flight(),
            interruption,
        }
    }
}

async fn execute(client: &SynthesisClient, task: SynthesisTask, retry: RetryPolicy) -> SynthesisOutcome {
    let index = task.segment.index;
    let result = retry
        .run("synthesize_segment", |attempt| {
            tracing::debug!(segment_index = index, attempt, "Synthesizing segment");
            client.synthesize(&task.segment, &task.voice)
        })
        .await;

    match result {
        Ok(audio) => SynthesisOutcome::Success {
            index,
            byte_count: audio.len(),
            audio,
        },
        Err(err) => {
            tracing::warn!(
                segment_index = index,
                attempts = err.attempts,
                error = %err.last,
                "Segment synthesis failed"
            );
            SynthesisOutcome::Failure {
                index,
                kind: err.last.kind(),
                message: err.to_string(),
            }
        }
    }
}

fn far_future() -> Instant {
    Instant::now() + std::time::Duration::from_secs(86400 * 365)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tts::markup::PlainTextEnricher;
    use crate::domain::tts::segmenter::Segment;
    use crate::domain::tts::voice::{AudioEncoding, VoiceConfig};
    use crate::infrastructure::repositories::{ProviderError, SynthesisRequest, TtsRepository};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// Echoes the payload back as audio after a per-text delay, tracking concurrency
    struct StubProvider {
        delays: Vec<(String, Duration)>,
        failing: HashSet<String>,
        flaky_failures: AtomicU32,
        active: AtomicUsize,
        peak: AtomicUsize,
        started: Mutex<Vec<String>>,
    }

    impl StubProvider {
        fn new() -> Self {
            Self {
                delays: Vec::new(),
                failing: HashSet::new(),
                flaky_failures: AtomicU32::new(0),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                started: Mutex::new(Vec::new()),
            }
        }

        fn delay_for(&self, text: &str) -> Duration {
            self.delays
                .iter()
                .find(|(t, _)| t == text)
                .map(|(_, d)| *d)
                .unwrap_or(Duration::from_millis(10))
        }
    }

    #[async_trait]
    impl TtsRepository for StubProvider {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn supported_encodings(&self) -> &'static [AudioEncoding] {
            &[AudioEncoding::Mp3]
        }

        async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, ProviderError> {
            self.started.lock().push(request.payload.clone());
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(self.delay_for(&request.payload)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(&request.payload) {
                return Err(ProviderError::Rejected(format!("cannot say {}", request.payload)));
            }
            if self.flaky_failures.load(Ordering::SeqCst) > 0 {
                self.flaky_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(ProviderError::Transient("throttled".to_string()));
            }
            Ok(request.payload.as_bytes().to_vec())
        }
    }

    fn tasks(texts: &[&str]) -> Vec<SynthesisTask> {
        let voice = Arc::new(VoiceConfig::default());
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| SynthesisTask {
                segment: Segment {
                    index,
                    text: text.to_string(),
                    byte_size: text.len(),
                },
                voice: voice.clone(),
            })
            .collect()
    }

    fn pool(provider: Arc<StubProvider>) -> WorkerPool {
        let client = SynthesisClient::new(
            provider,
            Arc::new(PlainTextEnricher),
            Duration::from_secs(30),
            false,
        );
        WorkerPool::new(Arc::new(client))
    }

    fn options(max_concurrency: usize) -> PoolOptions {
        PoolOptions {
            max_concurrency,
            ..PoolOptions::default()
        }
    }

    fn audio_of(outcome: &SynthesisOutcome) -> Option<String> {
        match outcome {
            SynthesisOutcome::Success { audio, .. } => Some(String::from_utf8(audio.clone()).unwrap()),
            SynthesisOutcome::Failure { .. } => None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_max_concurrency() {
        let provider = Arc::new(StubProvider::new());
        let pool = pool(provider.clone());
        let texts: Vec<String> = (0..12).map(|i| format!("segment {}", i)).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

        let run = pool
            .run(tasks(&refs), &options(3), &CancellationToken::new(), |_, _| {})
            .await;

        assert_eq!(run.outcomes.len(), 12);
        assert!(run.outcomes.iter().all(SynthesisOutcome::is_success));
        assert_eq!(provider.peak.load(Ordering::SeqCst), 3);
        assert_eq!(run.peak_in_flight, 3);
        assert_eq!(pool.stats().peak_in_flight(), 3);
        assert_eq!(pool.stats().in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_runs_keep_their_own_peak() {
        let provider = Arc::new(StubProvider::new());
        let pool = pool(provider.clone());
        let cancel = CancellationToken::new();

        let opts = options(2);
        let (first, second) = tokio::join!(
            pool.run(tasks(&["a1", "a2", "a3", "a4"]), &opts, &cancel, |_, _| {}),
            pool.run(tasks(&["b1", "b2", "b3", "b4"]), &opts, &cancel, |_, _| {}),
        );

        assert_eq!(first.peak_in_flight, 2);
        assert_eq!(second.peak_in_flight, 2);
        assert_eq!(pool.stats().peak_in_flight(), 4);
        assert_eq!(pool.stats().completed(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcomes_follow_input_order_not_completion_order() {
        let mut provider = StubProvider::new();
        provider.delays = vec![
            ("slow".to_string(), Duration::from_millis(500)),
            ("medium".to_string(), Duration::from_millis(200)),
            ("fast".to_string(), Duration::from_millis(1)),
        ];
        let pool = pool(Arc::new(provider));

        let run = pool
            .run(tasks(&["slow", "medium", "fast"]), &options(3), &CancellationToken::new(), |_, _| {})
            .await;

        let audio: Vec<Option<String>> = run.outcomes.iter().map(audio_of).collect();
        assert_eq!(
            audio,
            vec![Some("slow".into()), Some("medium".into()), Some("fast".into())]
        );
        let indices: Vec<usize> = run.outcomes.iter().map(SynthesisOutcome::index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_freed_permit_admits_next_task_immediately() {
        let mut provider = StubProvider::new();
        provider.delays = vec![
            ("long".to_string(), Duration::from_secs(10)),
            ("short".to_string(), Duration::from_millis(10)),
            ("next".to_string(), Duration::from_millis(10)),
        ];
        let provider = Arc::new(provider);
        let pool = pool(provider.clone());
        let started = Instant::now();

        pool.run(tasks(&["long", "short", "next"]), &options(2), &CancellationToken::new(), |_, _| {})
            .await;

        // "next" ran while "long" was still going, so the whole run takes ~10s, not ~10.01s+
        assert_eq!(*provider.started.lock(), vec!["long", "short", "next"]);
        assert!(started.elapsed() < Duration::from_millis(10_010));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_cancel_siblings() {
        let mut provider = StubProvider::new();
        provider.failing.insert("bad".to_string());
        let pool = pool(Arc::new(provider));
        let mut progress = Vec::new();

        let run = pool
            .run(
                tasks(&["good", "bad", "also good"]),
                &options(2),
                &CancellationToken::new(),
                |done, total| progress.push((done, total)),
            )
            .await;

        assert!(run.interruption.is_none());
        assert_eq!(run.completed, 3);
        assert!(run.outcomes[0].is_success());
        assert!(matches!(
            run.outcomes[1],
            SynthesisOutcome::Failure { index: 1, kind: FailureKind::Provider, .. }
        ));
        assert!(run.outcomes[2].is_success());
        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_on_first_failure_cancels_the_rest() {
        let mut provider = StubProvider::new();
        provider.failing.insert("bad".to_string());
        provider.delays = vec![("bad".to_string(), Duration::from_millis(1))];
        let pool = pool(Arc::new(provider));
        let options = PoolOptions {
            max_concurrency: 1,
            failure_policy: FailurePolicy::AbortOnFirstFailure,
            ..PoolOptions::default()
        };

        let run = pool
            .run(tasks(&["bad", "b", "c"]), &options, &CancellationToken::new(), |_, _| {})
            .await;

        assert_eq!(run.interruption, Some(Interruption::AbortedOnFailure));
        assert!(matches!(run.outcomes[0], SynthesisOutcome::Failure { kind: FailureKind::Provider, .. }));
        for outcome in &run.outcomes[1..] {
            assert!(matches!(outcome, SynthesisOutcome::Failure { kind: FailureKind::Cancelled, .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_unblocks_queued_and_in_flight_tasks() {
        let mut provider = StubProvider::new();
        provider.delays = vec![
            ("a".to_string(), Duration::from_secs(3600)),
            ("b".to_string(), Duration::from_secs(3600)),
        ];
        let provider = Arc::new(provider);
        let pool = pool(provider.clone());
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let run = pool.run(tasks(&["a", "b", "c", "d"]), &options(2), &cancel, |_, _| {}).await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(run.interruption, Some(Interruption::Cancelled));
        assert_eq!(run.completed, 0);
        assert!(run
            .outcomes
            .iter()
            .all(|o| matches!(o, SynthesisOutcome::Failure { kind: FailureKind::Cancelled, .. })));
        // queued tasks never reached the provider
        assert_eq!(provider.started.lock().len(), 2);
        assert_eq!(pool.stats().in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_returns_partial_results() {
        let mut provider = StubProvider::new();
        provider.delays = vec![("stuck".to_string(), Duration::from_secs(3600))];
        let pool = pool(Arc::new(provider));
        let options = PoolOptions {
            max_concurrency: 2,
            deadline: Some(Instant::now() + Duration::from_secs(1)),
            ..PoolOptions::default()
        };

        let run = pool
            .run(tasks(&["one", "stuck", "two"]), &options, &CancellationToken::new(), |_, _| {})
            .await;

        assert_eq!(run.interruption, Some(Interruption::DeadlineExceeded));
        assert_eq!(run.completed, 2);
        assert!(run.outcomes[0].is_success());
        assert!(matches!(run.outcomes[1], SynthesisOutcome::Failure { kind: FailureKind::Cancelled, .. }));
        assert!(run.outcomes[2].is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_policy_recovers_transient_failures() {
        let provider = StubProvider::new();
        provider.flaky_failures.store(2, Ordering::SeqCst);
        let provider = Arc::new(provider);
        let pool = pool(provider.clone());
        let options = PoolOptions {
            max_concurrency: 1,
            retry: RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1)),
            ..PoolOptions::default()
        };

        let run = pool.run(tasks(&["only"]), &options, &CancellationToken::new(), |_, _| {}).await;

        assert!(run.outcomes[0].is_success());
        assert_eq!(provider.started.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_task_list_returns_immediately() {
        let pool = pool(Arc::new(StubProvider::new()));
        let run = pool.run(Vec::new(), &options(3), &CancellationToken::new(), |_, _| {}).await;
        assert!(run.outcomes.is_empty());
        assert_eq!(run.completed, 0);
        assert!(run.interruption.is_none());
    }
}
