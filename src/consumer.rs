//! Worker pool draining a [`MessageQueue`].
//!
//! Each worker:
//!
//! - Receives one message at a time, inside the span the queue returns
//! - Hands it to a [`MessageHandler`]
//! - Acknowledges it once it was processed, resubmitted or given up on
//! - Exposes lifecycle hooks for observability and customization
//!
//! A failed message is resubmitted under the handler's destination key with
//! one more failure recorded, until its retries are exhausted. A message that
//! cannot be resubmitted, such as a retired kind the encoder refuses, goes to
//! the exhaustion policy instead. The pool runs until a [`CancellationToken`]
//! is triggered.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument as _;

use crate::{QueueMessage, RetryableMessage, TransportHandle, queue::MessageQueue};

/// Submit attempts for a failed message before it is handed to
/// [`MessageHandler::retries_exhausted`].
const RESUBMIT_ATTEMPTS: u32 = 3;

/// Application logic plugged into the pool.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Process one message. `span` is the delivery span from the queue.
    async fn process(
        &self,
        span: &tracing::Span,
        message: &QueueMessage,
    ) -> Result<(), tower::BoxError>;

    /// Key a failed message is resubmitted under.
    fn destination_key(&self, message: &QueueMessage) -> String;

    /// Called once a message failed `max_retries` times, or when a failed
    /// message could not be resubmitted. The message is acknowledged
    /// afterwards either way.
    async fn retries_exhausted(&self, message: QueueMessage) {
        tracing::error!(
            kind = %message.kind(),
            failures = message.failures(),
            "Giving up on message"
        );
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Concurrent workers. At least one runs.
    pub workers: usize,
    /// Pause after a receive that yielded nothing.
    pub idle_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            idle_backoff: Duration::from_millis(100),
        }
    }
}

impl ConsumerConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_idle_backoff(mut self, idle_backoff: Duration) -> Self {
        self.idle_backoff = idle_backoff;
        self
    }
}

/// Queue consumer.
///
/// Generic parameters:
/// - `Q`: Queue implementation
/// - `H`: Message handler
/// - `HK`: Hook implementation for lifecycle events
pub struct Consumer<Q: ?Sized, H, HK> {
    queue: Arc<Q>,
    handler: Arc<H>,
    hook: Arc<HK>,
    config: ConsumerConfig,
}

impl<Q, H> Consumer<Q, H, DefaultConsumerHook>
where
    Q: MessageQueue + ?Sized + 'static,
    H: MessageHandler,
{
    /// Create a new consumer with the default hook implementation.
    pub fn new(queue: Arc<Q>, handler: H) -> Self {
        Self {
            queue,
            handler: Arc::new(handler),
            hook: Arc::new(DefaultConsumerHook),
            config: ConsumerConfig::default(),
        }
    }
}

impl<Q, H, HK> Consumer<Q, H, HK>
where
    Q: MessageQueue + ?Sized + 'static,
    H: MessageHandler,
    HK: ConsumerHook + 'static,
{
    /// Replace the consumer hook while keeping all other generics unchanged.
    pub fn with_hook<HK2: ConsumerHook>(self, hook: HK2) -> Consumer<Q, H, HK2> {
        Consumer {
            queue: self.queue,
            handler: self.handler,
            hook: Arc::new(hook),
            config: self.config,
        }
    }

    pub fn with_config(mut self, config: ConsumerConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the worker pool until `cancel` fires.
    ///
    /// Workers finish the message they hold before exiting. The queue is not
    /// stopped; callers own its lifecycle.
    #[tracing::instrument(skip_all, fields(workers = self.config.workers.max(1)))]
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ConsumerRunError> {
        let workers = self.config.workers.max(1);
        self.hook.on_startup(workers);

        let mut pool = JoinSet::new();
        for id in 0..workers {
            let worker = Worker {
                id,
                queue: Arc::clone(&self.queue),
                handler: Arc::clone(&self.handler),
                hook: Arc::clone(&self.hook),
                idle_backoff: self.config.idle_backoff,
            };
            let cancel = cancel.clone();
            pool.spawn(async move { worker.run(cancel).await }.in_current_span());
        }

        let mut result = Ok(());
        while let Some(joined) = pool.join_next().await {
            if let Err(err) = joined {
                self.hook.on_worker_failure(&err);
                cancel.cancel();
                result = Err(ConsumerRunError::worker(err));
            }
        }

        self.hook.on_shutdown();
        result
    }
}

struct Worker<Q: ?Sized, H, HK> {
    id: usize,
    queue: Arc<Q>,
    handler: Arc<H>,
    hook: Arc<HK>,
    idle_backoff: Duration,
}

impl<Q, H, HK> Worker<Q, H, HK>
where
    Q: MessageQueue + ?Sized,
    H: MessageHandler,
    HK: ConsumerHook,
{
    async fn run(self, cancel: CancellationToken) {
        tracing::debug!(worker = self.id, "Worker started");
        while !cancel.is_cancelled() {
            let (span, message) = self.queue.receive(&cancel).await;
            match message {
                Some(message) => self.handle(message, &span).instrument(span.clone()).await,
                None => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(self.idle_backoff) => {}
                    }
                }
            }
        }
        tracing::debug!(worker = self.id, "Worker stopped");
    }

    async fn handle(&self, mut message: QueueMessage, span: &tracing::Span) {
        self.hook.on_message_received(&message);
        let handle = message.transport_handle().cloned();

        let error = match self.handler.process(span, &message).await {
            Ok(()) => {
                self.hook.on_message_processed(&message);
                self.acknowledge(handle).await;
                return;
            }
            Err(error) => error,
        };

        message.record_failure();
        self.hook.on_processing_error(&message, error.as_ref());

        if message.retries_exhausted() {
            self.hook.on_retries_exhausted(&message);
            self.handler.retries_exhausted(message).await;
            self.acknowledge(handle).await;
            return;
        }

        let key = self.handler.destination_key(&message);
        message.set_transport_handle(None);
        if !self.resubmit(&key, &message).await {
            self.hook.on_retries_exhausted(&message);
            self.handler.retries_exhausted(message).await;
        }
        self.acknowledge(handle).await;
    }

    /// Resubmit a failed message, retrying transient transport errors.
    ///
    /// Returns `false` when the message could not be put back on the queue.
    /// The caller then hands it to the exhaustion policy, since committing
    /// later offsets on its partition would skip it for good.
    async fn resubmit(&self, key: &str, message: &QueueMessage) -> bool {
        for attempt in 1..=RESUBMIT_ATTEMPTS {
            match self.queue.submit(key, vec![message.clone()]).await {
                Ok(()) => return true,
                Err(error) => {
                    self.hook.on_resubmit_error(key, &error);
                    if !error.is_retryable() || attempt == RESUBMIT_ATTEMPTS {
                        return false;
                    }
                }
            }
            tokio::time::sleep(self.idle_backoff).await;
        }
        false
    }

    async fn acknowledge(&self, handle: Option<TransportHandle>) {
        let Some(handle) = handle else {
            return;
        };
        if let Err(error) = self.queue.acknowledge(&handle).await {
            self.hook.on_acknowledge_error(&error);
        }
    }
}

/// Error returned when the consumer pool fails.
#[derive(Debug)]
pub struct ConsumerRunError {
    context: tracing_error::SpanTrace,
    kind: ConsumerRunErrorKind,
}

impl ConsumerRunError {
    fn worker(error: tokio::task::JoinError) -> Self {
        Self {
            context: tracing_error::SpanTrace::capture(),
            kind: ConsumerRunErrorKind::Worker(error),
        }
    }

    pub fn kind(&self) -> &ConsumerRunErrorKind {
        &self.kind
    }
}

/// Classification of consumer runtime errors.
#[derive(Debug)]
pub enum ConsumerRunErrorKind {
    /// A worker task panicked or was aborted.
    Worker(tokio::task::JoinError),
}

impl std::fmt::Display for ConsumerRunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ConsumerRunErrorKind::Worker(err) => writeln!(f, "Worker error: {}", err),
        }?;
        self.context.fmt(f)
    }
}

impl std::error::Error for ConsumerRunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ConsumerRunErrorKind::Worker(err) => Some(err),
        }
    }
}

/// Hook trait for observing consumer lifecycle events.
///
/// Hooks are invoked synchronously and should avoid heavy or blocking work.
/// Typical use cases include logging, metrics, and tracing integration.
pub trait ConsumerHook: Send + Sync {
    fn on_startup(&self, workers: usize);
    fn on_shutdown(&self);
    fn on_message_received(&self, message: &QueueMessage);
    fn on_message_processed(&self, message: &QueueMessage);
    fn on_processing_error(&self, message: &QueueMessage, error: &(dyn std::error::Error + 'static));
    fn on_retries_exhausted(&self, message: &QueueMessage);
    fn on_resubmit_error(&self, destination_key: &str, error: &(dyn std::error::Error + 'static));
    fn on_acknowledge_error(&self, error: &(dyn std::error::Error + 'static));
    fn on_worker_failure(&self, error: &(dyn std::error::Error + 'static));
}

/// Default consumer hook implementation.
///
/// Logs lifecycle events using `tracing`.
pub struct DefaultConsumerHook;

impl ConsumerHook for DefaultConsumerHook {
    fn on_startup(&self, workers: usize) {
        tracing::info!(workers, "Consumer is starting up");
    }

    fn on_shutdown(&self) {
        tracing::info!("Consumer is shutting down");
    }

    fn on_message_received(&self, message: &QueueMessage) {
        tracing::debug!(kind = %message.kind(), failures = message.failures(), "Message received");
    }

    fn on_message_processed(&self, _message: &QueueMessage) {
        tracing::debug!("Message processed");
    }

    fn on_processing_error(&self, message: &QueueMessage, error: &(dyn std::error::Error + 'static)) {
        tracing::warn!(
            error,
            failures = message.failures(),
            max_retries = message.max_retries(),
            "Error processing message"
        );
    }

    fn on_retries_exhausted(&self, message: &QueueMessage) {
        tracing::error!(failures = message.failures(), "Message retries exhausted");
    }

    fn on_resubmit_error(&self, destination_key: &str, error: &(dyn std::error::Error + 'static)) {
        tracing::error!(error, destination_key, "Failed to resubmit message");
    }

    fn on_acknowledge_error(&self, error: &(dyn std::error::Error + 'static)) {
        tracing::error!(error, "Failed to acknowledge message");
    }

    fn on_worker_failure(&self, error: &(dyn std::error::Error + 'static)) {
        tracing::error!(error, "Consumer worker failed");
    }
}
