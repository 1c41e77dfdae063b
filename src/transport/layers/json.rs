use std::{future::Future, pin::Pin};

use tower::{Layer, Service, ServiceExt as _};

use crate::{
    RetryableMessage,
    codec,
    transport::{Record, Submission},
};

/// Tower `Service` wrapper that encodes submissions to JSON records.
///
/// Every message of the submission is encoded before anything is handed to
/// the inner service, so an encoding failure sends nothing. Health checks
/// are dropped here and never reach a partition.
#[derive(Clone)]
pub struct JsonService<T> {
    inner: T,
}

impl<T> Service<Submission> for JsonService<T>
where
    T: Service<Vec<Record>> + Clone + Send + 'static,
    T::Error: Into<tower::BoxError>,
    T::Future: Send + 'static,
{
    type Response = ();
    type Error = tower::BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Submission) -> Self::Future {
        let inner = self.inner.clone();

        Box::pin(async move {
            let mut records = Vec::with_capacity(req.messages.len());
            for message in &req.messages {
                let kind = message.kind();
                if kind.is_health_check() {
                    tracing::trace!(key = %req.destination_key, "Dropping health check");
                    continue;
                }
                records.push(Record {
                    key: req.destination_key.clone(),
                    kind,
                    payload: codec::encode(message)?,
                });
            }

            if records.is_empty() {
                return Ok(());
            }

            inner.oneshot(records).await.map(|_| ()).map_err(Into::into)
        })
    }
}

/// Tower `Layer` that applies `JsonService` to a service stack.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonLayer;

impl<S> Layer<S> for JsonLayer {
    type Service = JsonService<S>;

    fn layer(&self, service: S) -> Self::Service {
        JsonService { inner: service }
    }
}

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;
    use crate::{
        Envelope, QueueMessage, codec,
        payload::ErrorGroupDataSyncArgs,
        transport::{InMemory, SenderService},
    };

    #[tokio::test]
    async fn health_checks_never_reach_the_log() {
        let log = InMemory::default();
        let service = JsonLayer.layer(SenderService::new(log.clone()));

        let sync: QueueMessage =
            Envelope::from_payload(ErrorGroupDataSyncArgs { error_group_id: 11 }).into();
        service
            .oneshot(Submission::new(
                "group-11",
                vec![QueueMessage::health_check(), sync.clone()],
            ))
            .await
            .unwrap();

        let record = log.pop().unwrap();
        assert_eq!(codec::decode(&record.payload).unwrap(), sync);
        assert!(log.pop().is_none());
    }

    #[tokio::test]
    async fn health_check_only_submission_is_a_no_op() {
        let log = InMemory::default();
        let service = JsonLayer.layer(SenderService::new(log.clone()));

        service
            .oneshot(Submission::new("k", vec![QueueMessage::health_check()]))
            .await
            .unwrap();
        assert!(log.backlog().iter().all(|depth| *depth == 0));
    }
}
