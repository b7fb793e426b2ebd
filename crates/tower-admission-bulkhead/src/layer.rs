//! Tower layer implementation for the bulkhead.

use crate::{Bulkhead, BulkheadError};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Layer that routes every request through a shared [`Bulkhead`].
///
/// Services produced by the same layer (and their clones) share one set of slots.
///
/// # Example
///
/// ```rust
/// use tower_admission_bulkhead::BulkheadConfig;
/// use tower::{ServiceBuilder, ServiceExt};
///
/// # async fn example() {
/// let layer = BulkheadConfig::builder()
///     .max_concurrent(8)
///     .build_layer()
///     .unwrap();
///
/// let service = ServiceBuilder::new()
///     .layer(layer)
///     .service_fn(|req: String| async move { Ok::<_, std::io::Error>(req) });
///
/// assert_eq!(service.oneshot("hi".to_string()).await.unwrap(), "hi");
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct BulkheadLayer {
    bulkhead: Bulkhead,
}

impl BulkheadLayer {
    /// Creates a layer around an existing bulkhead.
    pub fn new(bulkhead: Bulkhead) -> Self {
        Self { bulkhead }
    }

    /// Returns the shared bulkhead.
    pub fn bulkhead(&self) -> &Bulkhead {
        &self.bulkhead
    }
}

impl<S> Layer<S> for BulkheadLayer {
    type Service = BulkheadService<S>;

    fn layer(&self, service: S) -> Self::Service {
        BulkheadService {
            inner: service,
            bulkhead: self.bulkhead.clone(),
        }
    }
}

/// Service produced by [`BulkheadLayer`].
#[derive(Clone, Debug)]
pub struct BulkheadService<S> {
    inner: S,
    bulkhead: Bulkhead,
}

impl<S> BulkheadService<S> {
    /// Returns the shared bulkhead.
    pub fn bulkhead(&self) -> &Bulkhead {
        &self.bulkhead
    }
}

impl<S, Request> Service<Request> for BulkheadService<S>
where
    S: Service<Request> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    Request: Send + 'static,
{
    type Response = S::Response;
    type Error = BulkheadError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(BulkheadError::Inner)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let bulkhead = self.bulkhead.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move { bulkhead.execute(move || inner.call(request)).await })
    }
}
