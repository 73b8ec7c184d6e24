//! Step Execution
//!
//! [`StepExecutor`] owns the per-label execution counters, the termination
//! flag and the middleware chain of one instance. [`WorkflowStep`] is the
//! handle a workflow body receives; it is cheap to clone and every clone
//! talks to the same executor, so counters survive body restarts.
//!
//! A step call goes through:
//! 1. Label validation
//! 2. Termination check
//! 3. Counter increment (the previous value is the attempt ordinal)
//! 4. `before_task` hooks, including the pause gate
//! 5. The task itself
//! 6. `after_task` hooks
//! 7. Retry classification on failure

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::{BoxError, RetrySignal, StepError};
use super::events::{EventWaits, StepEvent, WaitOptions};
use super::middleware::StepMiddleware;
use crate::monitoring::{EventType, ExecutionTimeline};
use crate::workflow::config::StepConfig;
use crate::workflow::settings::{EngineSettings, RetryStrategy};

/// Runs step tasks for a single instance.
pub struct StepExecutor {
    execution_counts: Mutex<HashMap<String, u32>>,
    terminated: AtomicBool,
    default_retry_limit: u32,
    strategy: RetryStrategy,
    middleware: Vec<Arc<dyn StepMiddleware>>,
    timeline: Mutex<ExecutionTimeline>,
}

impl StepExecutor {
    /// Creates an executor with the given middleware chain, outermost first.
    pub fn new(settings: &EngineSettings, middleware: Vec<Arc<dyn StepMiddleware>>) -> Self {
        Self {
            execution_counts: Mutex::new(HashMap::new()),
            terminated: AtomicBool::new(false),
            default_retry_limit: settings.default_retry_limit,
            strategy: settings.retry_strategy,
            middleware,
            timeline: Mutex::new(ExecutionTimeline::new()),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Marks the workflow terminated; later step calls fail fast.
    pub fn workflow_terminated(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        for middleware in &self.middleware {
            middleware.workflow_terminated();
        }
    }

    /// Number of attempts recorded for a label so far.
    pub fn execution_count(&self, label: &str) -> u32 {
        lock(&self.execution_counts).get(label).copied().unwrap_or(0)
    }

    /// Returns a snapshot of the step timeline.
    pub fn timeline(&self) -> ExecutionTimeline {
        lock(&self.timeline).clone()
    }

    /// Executes a labeled task under the retry policy.
    pub async fn execute<T, F, Fut>(
        &self,
        label: &str,
        config: &StepConfig,
        mut task: F,
    ) -> Result<T, StepError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, BoxError>> + Send,
        T: Send,
    {
        if label.is_empty() {
            return Err(StepError::Validation("Label is required".to_string()));
        }

        let retry_limit = config.retry_limit().unwrap_or(self.default_retry_limit);

        loop {
            if self.is_terminated() {
                return Err(StepError::Terminated);
            }

            let attempt = self.next_attempt(label);
            let error = match self.attempt(label, attempt, config, &mut task).await {
                Ok(value) => {
                    self.record(label, attempt, EventType::Completed);
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_retryable() || attempt > retry_limit {
                warn!("Step '{}' failed on attempt {}: {}", label, attempt, error);
                self.record(label, attempt, EventType::Failed);
                return Err(error);
            }

            self.record(label, attempt, EventType::Retried);
            match self.strategy {
                RetryStrategy::RestartWorkflow => {
                    info!(
                        "Step '{}' failed (attempt {}/{}): {}",
                        label, attempt, retry_limit, error
                    );
                    return Err(StepError::Retry(RetrySignal {
                        label: label.to_string(),
                        attempt,
                    }));
                }
                RetryStrategy::RetryStep => {
                    info!(
                        "Retrying step '{}' (attempt {}/{}): {}",
                        label, attempt, retry_limit, error
                    );
                }
            }
        }
    }

    async fn attempt<T, F, Fut>(
        &self,
        label: &str,
        attempt: u32,
        config: &StepConfig,
        task: &mut F,
    ) -> Result<T, StepError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, BoxError>> + Send,
        T: Send,
    {
        for middleware in &self.middleware {
            middleware.before_task(label, config).await?;
        }

        // A paused body woken by terminate() must not run its task.
        if self.is_terminated() {
            return Err(StepError::Terminated);
        }

        debug!("Running step '{}' (attempt {})", label, attempt);
        self.record(label, attempt, EventType::Started);
        let value = task().await.map_err(StepError::from_task)?;

        for middleware in self.middleware.iter().rev() {
            middleware.after_task(label, config).await?;
        }

        Ok(value)
    }

    fn next_attempt(&self, label: &str) -> u32 {
        let mut counts = lock(&self.execution_counts);
        let count = counts.entry(label.to_string()).or_insert(0);
        let attempt = *count;
        *count += 1;
        attempt
    }

    fn record(&self, label: &str, attempt: u32, event_type: EventType) {
        lock(&self.timeline).add_event(label, attempt, event_type);
    }
}

/// The step API handed to workflow bodies.
#[derive(Clone)]
pub struct WorkflowStep {
    executor: Arc<StepExecutor>,
    events: Arc<EventWaits>,
}

impl WorkflowStep {
    pub fn new(executor: Arc<StepExecutor>, events: Arc<EventWaits>) -> Self {
        Self { executor, events }
    }

    /// Runs a task with the default retry policy.
    pub async fn run<T, F, Fut>(&self, label: &str, task: F) -> Result<T, StepError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, BoxError>> + Send,
        T: Send,
    {
        self.executor.execute(label, &StepConfig::default(), task).await
    }

    /// Runs a task with an explicit step configuration.
    pub async fn run_with_config<T, F, Fut>(
        &self,
        label: &str,
        config: StepConfig,
        task: F,
    ) -> Result<T, StepError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, BoxError>> + Send,
        T: Send,
    {
        self.executor.execute(label, &config, task).await
    }

    /// Suspends until an event of `options.event_type` arrives or times out.
    pub async fn wait_for_event(
        &self,
        name: &str,
        options: WaitOptions,
    ) -> Result<StepEvent<Value>, StepError> {
        if self.executor.is_terminated() {
            return Err(StepError::Terminated);
        }
        debug!("Step '{}' waits for '{}'", name, options.event_type);
        self.events.wait(&options).await
    }

    /// Like [`wait_for_event`](Self::wait_for_event), decoding the payload.
    pub async fn wait_for_event_as<T: DeserializeOwned>(
        &self,
        name: &str,
        options: WaitOptions,
    ) -> Result<StepEvent<T>, StepError> {
        let event = self.wait_for_event(name, options).await?;
        let payload = serde_json::from_value(event.payload).map_err(|source| StepError::Payload {
            event_type: event.event_type.clone(),
            source,
        })?;

        Ok(StepEvent {
            event_type: event.event_type,
            payload,
            timestamp: event.timestamp,
        })
    }

    pub fn executor(&self) -> &Arc<StepExecutor> {
        &self.executor
    }

    pub(crate) fn events(&self) -> &Arc<EventWaits> {
        &self.events
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
