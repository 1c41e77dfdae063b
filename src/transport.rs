//! Submission pipeline and sender backends.
//!
//! Submissions flow through a Tower stack before reaching a partitioned log:
//!
//! ```text
//! Submission ──► JsonLayer ──► SenderService ──► Sender backend
//!   (key, messages)   (encode)     (adapter)        (in-memory, Kafka)
//! ```
//!
//! Because every stage is a `tower::Service`, retries, timeouts or
//! concurrency limits can be layered in without touching the backends.
//!
//! ## Key components
//!
//! - [`Transport`]: Public-facing wrapper implementing `tower::Service`
//! - [`SenderService`]: Adapter from a [`Sender`] to a Tower service
//! - [`Sender`]: Trait implemented by concrete sender backends
//! - [`Submission`] and [`Record`]: the request types before and after encoding

mod inmemory;

#[cfg(feature = "kafka")]
pub mod kafka;

pub mod layers;

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tower::{Service, ServiceExt as _};

use crate::{PayloadKind, QueueError, QueueMessage};

pub use inmemory::{InMemory, InMemoryPosition, StoredRecord};

/// Messages submitted together under one destination key.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Selects the partition, and with it the ordering scope.
    pub destination_key: String,
    pub messages: Vec<QueueMessage>,
}

impl Submission {
    pub fn new(destination_key: impl Into<String>, messages: Vec<QueueMessage>) -> Self {
        Self {
            destination_key: destination_key.into(),
            messages,
        }
    }
}

/// An encoded message ready for a partitioned log.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: String,
    pub kind: PayloadKind,
    pub payload: Vec<u8>,
}

/// Generic Tower-compatible transport wrapper.
///
/// `Transport` is the main entry point for publishing. It wraps an
/// underlying Tower `Service` and:
///
/// - Normalizes errors into [`QueueError`]
/// - Supports Tower middleware via layers
/// - Provides a convenience [`send`](Transport::send) API
#[derive(Clone)]
pub struct Transport<S> {
    service: S,
}

impl<D> Transport<SenderService<D>> {
    /// Create a new transport from a concrete sender backend.
    ///
    /// The sender will be wrapped in a [`SenderService`] to make it
    /// Tower-compatible.
    pub fn new(driver: D) -> Self {
        Self {
            service: SenderService::new(driver),
        }
    }
}

impl<S> Transport<S> {
    /// Apply a Tower layer to the transport.
    pub fn layer<L>(self, layer: L) -> Transport<L::Service>
    where
        L: tower::Layer<S>,
    {
        Transport {
            service: layer.layer(self.service),
        }
    }

    /// Send a request through the transport.
    ///
    /// Convenience for callers that do not need the `tower::Service` API.
    /// The inner service is cloned so `&self` can be shared across tasks.
    pub async fn send<R>(&self, request: R) -> Result<(), QueueError>
    where
        S: Service<R> + Clone + Send,
        S::Future: Send,
        S::Error: Into<tower::BoxError>,
        R: Send,
    {
        let service = self.service.clone();
        service
            .oneshot(request)
            .await
            .map_err(|e| QueueError::from_box(e.into()))?;
        Ok(())
    }
}

/// Tower `Service` implementation for `Transport`.
///
/// Delegates readiness and request handling to the inner service while mapping
/// all errors into [`QueueError`].
impl<R, S> Service<R> for Transport<S>
where
    S: Service<R> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<tower::BoxError>,
    R: Send + 'static,
{
    type Response = ();
    type Error = QueueError;
    type Future = Pin<Box<dyn Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service
            .poll_ready(cx)
            .map_err(|e| QueueError::from_box(e.into()))
    }

    fn call(&mut self, req: R) -> Self::Future {
        let mut service = self.service.clone();

        Box::pin(async move {
            service
                .call(req)
                .await
                .map_err(|e| QueueError::from_box(e.into()))?;
            Ok(())
        })
    }
}

/// Tower service adapter for a [`Sender`] backend.
#[derive(Clone)]
pub struct SenderService<D> {
    sender: D,
}

impl<D> SenderService<D> {
    pub fn new(sender: D) -> Self {
        Self { sender }
    }
}

/// `tower::Service` implementation delegating to a [`Sender`].
impl<D> Service<Vec<Record>> for SenderService<D>
where
    D: Sender + Clone + Send + 'static,
{
    type Response = ();
    type Error = tower::BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<(), Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, records: Vec<Record>) -> Self::Future {
        let mut sender = self.sender.clone();
        Box::pin(async move { sender.send(records).await.map_err(Into::into) })
    }
}

/// Trait implemented by concrete sender backends.
///
/// A sender appends a batch of records to a partitioned log. Records sharing
/// a key must land in the same partition, in batch order. The batch either
/// succeeds or the call returns an error.
#[async_trait::async_trait]
pub trait Sender {
    /// Backend-specific error type.
    type Error: Into<tower::BoxError>;

    async fn send(&mut self, records: Vec<Record>) -> Result<(), Self::Error>;
}
