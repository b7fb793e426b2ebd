use crate::{CircuitBreaker, CircuitBreakerError, FailureClassifier};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// A Tower layer that routes every request through a shared [`CircuitBreaker`].
///
/// # Example
///
/// ```rust
/// use tower_admission_circuitbreaker::CircuitBreakerConfig;
/// use tower::{ServiceBuilder, ServiceExt};
///
/// # async fn example() {
/// let layer = CircuitBreakerConfig::builder()
///     .name("backend")
///     .failure_threshold(3)
///     .build_layer()
///     .unwrap();
/// let breaker = layer.breaker().clone();
///
/// let service = ServiceBuilder::new()
///     .layer(layer)
///     .service_fn(|req: String| async move { Ok::<_, std::io::Error>(req) });
///
/// let response = service.oneshot("ping".to_string()).await.unwrap();
/// assert_eq!(response, "ping");
/// assert_eq!(breaker.metrics().successful_requests, 1);
/// # }
/// ```
pub struct CircuitBreakerLayer<C = crate::DefaultClassifier> {
    breaker: Arc<CircuitBreaker<C>>,
}

impl<C> CircuitBreakerLayer<C> {
    /// Creates a layer around an existing breaker, e.g. one from a registry.
    pub fn new(breaker: Arc<CircuitBreaker<C>>) -> Self {
        Self { breaker }
    }

    /// Returns the shared breaker.
    pub fn breaker(&self) -> &Arc<CircuitBreaker<C>> {
        &self.breaker
    }
}

impl<C> Clone for CircuitBreakerLayer<C> {
    fn clone(&self) -> Self {
        Self {
            breaker: Arc::clone(&self.breaker),
        }
    }
}

impl<S, C> Layer<S> for CircuitBreakerLayer<C> {
    type Service = CircuitBreakerService<S, C>;

    fn layer(&self, service: S) -> Self::Service {
        CircuitBreakerService {
            inner: service,
            breaker: Arc::clone(&self.breaker),
        }
    }
}

/// Service produced by [`CircuitBreakerLayer`].
pub struct CircuitBreakerService<S, C = crate::DefaultClassifier> {
    inner: S,
    breaker: Arc<CircuitBreaker<C>>,
}

impl<S, C> CircuitBreakerService<S, C> {
    /// Returns the shared breaker.
    pub fn breaker(&self) -> &Arc<CircuitBreaker<C>> {
        &self.breaker
    }
}

impl<S: Clone, C> Clone for CircuitBreakerService<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            breaker: Arc::clone(&self.breaker),
        }
    }
}

impl<S, C, Req> Service<Req> for CircuitBreakerService<S, C>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
    Req: Send + 'static,
    C: FailureClassifier<S::Error> + 'static,
{
    type Response = S::Response;
    type Error = CircuitBreakerError<S::Error>;
    type Future = BoxFuture<'static, Result<S::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(CircuitBreakerError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let breaker = Arc::clone(&self.breaker);
        let mut inner = self.inner.clone();

        Box::pin(async move { breaker.call(move || inner.call(req)).await })
    }
}
