use crate::{BackpressureError, BackpressureManager};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};

/// Layer that counts every in-flight request against a shared [`BackpressureManager`].
///
/// # Example
///
/// ```rust
/// use tower_admission_backpressure::BackpressureConfig;
/// use tower::{ServiceBuilder, ServiceExt};
///
/// # async fn example() {
/// let layer = BackpressureConfig::builder()
///     .max_pending(100)
///     .high_water_mark(80)
///     .low_water_mark(20)
///     .build_layer()
///     .unwrap();
///
/// let service = ServiceBuilder::new()
///     .layer(layer)
///     .service_fn(|item: u32| async move { Ok::<_, std::io::Error>(item * 2) });
///
/// assert_eq!(service.oneshot(21).await.unwrap(), 42);
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct BackpressureLayer {
    manager: BackpressureManager,
    timeout: Option<Duration>,
}

impl BackpressureLayer {
    /// Creates a layer around an existing manager using its configured acquire timeout.
    pub fn new(manager: BackpressureManager) -> Self {
        Self {
            manager,
            timeout: None,
        }
    }

    /// Overrides how long requests wait while backpressure is active.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the shared manager.
    pub fn manager(&self) -> &BackpressureManager {
        &self.manager
    }
}

impl<S> Layer<S> for BackpressureLayer {
    type Service = BackpressureService<S>;

    fn layer(&self, service: S) -> Self::Service {
        BackpressureService {
            inner: service,
            manager: self.manager.clone(),
            timeout: self.timeout,
        }
    }
}

/// Service produced by [`BackpressureLayer`].
#[derive(Clone, Debug)]
pub struct BackpressureService<S> {
    inner: S,
    manager: BackpressureManager,
    timeout: Option<Duration>,
}

impl<S, Request> Service<Request> for BackpressureService<S>
where
    S: Service<Request> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    Request: Send + 'static,
{
    type Response = S::Response;
    type Error = BackpressureError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(BackpressureError::Inner)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let manager = self.manager.clone();
        let timeout = self.timeout;
        let mut inner = self.inner.clone();

        Box::pin(async move { manager.execute(timeout, move || inner.call(request)).await })
    }
}
