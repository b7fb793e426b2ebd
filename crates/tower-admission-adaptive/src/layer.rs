//! Tower integration for the adaptive limiter.

use crate::{AdaptiveConcurrencyLimiter, AdaptiveError, LimiterPermit};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tower::{Layer, Service};
use tower_admission_core::RejectionError;

/// A Tower layer that applies adaptive concurrency limiting.
///
/// Requests beyond the current limit fail fast with
/// [`AdaptiveError::LimitReached`]; completed requests feed the AIMD loop
/// (`Ok` as success, `Err` as failure).
///
/// # Example
///
/// ```rust
/// use tower_admission_adaptive::AdaptiveLimiterConfig;
/// use tower::{ServiceBuilder, ServiceExt};
///
/// # async fn example() {
/// let layer = AdaptiveLimiterConfig::builder()
///     .initial_limit(10)
///     .min_limit(2)
///     .build_layer()
///     .unwrap();
///
/// let service = ServiceBuilder::new()
///     .layer(layer)
///     .service_fn(|req: i32| async move { Ok::<_, std::io::Error>(req * 2) });
///
/// assert_eq!(service.oneshot(21).await.unwrap(), 42);
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct AdaptiveLimiterLayer {
    limiter: AdaptiveConcurrencyLimiter,
}

impl AdaptiveLimiterLayer {
    /// Create a new adaptive limiter layer around an existing limiter.
    pub fn new(limiter: AdaptiveConcurrencyLimiter) -> Self {
        Self { limiter }
    }

    /// Returns the shared limiter.
    pub fn limiter(&self) -> &AdaptiveConcurrencyLimiter {
        &self.limiter
    }
}

impl<S> Layer<S> for AdaptiveLimiterLayer {
    type Service = AdaptiveService<S>;

    fn layer(&self, service: S) -> Self::Service {
        AdaptiveService {
            inner: service,
            limiter: self.limiter.clone(),
        }
    }
}

/// A service that applies adaptive concurrency limiting.
#[derive(Clone, Debug)]
pub struct AdaptiveService<S> {
    inner: S,
    limiter: AdaptiveConcurrencyLimiter,
}

impl<S> AdaptiveService<S> {
    /// Get the current concurrency limit.
    pub fn limit(&self) -> usize {
        self.limiter.limit()
    }

    /// Get the number of in-flight requests.
    pub fn in_flight(&self) -> usize {
        self.limiter.active_count()
    }
}

impl<S, Req> Service<Req> for AdaptiveService<S>
where
    S: Service<Req>,
{
    type Response = S::Response;
    type Error = AdaptiveError<S::Error>;
    type Future = AdaptiveFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(AdaptiveError::Service)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        match self.limiter.try_acquire() {
            Ok(permit) => AdaptiveFuture {
                inner: Some(self.inner.call(req)),
                permit: Some(permit),
                rejected: None,
            },
            Err(rejection) => AdaptiveFuture {
                inner: None,
                permit: None,
                rejected: Some(rejection),
            },
        }
    }
}

pin_project! {
    /// Future returned by [`AdaptiveService`].
    ///
    /// Holds the request's slot; dropping it before completion reports a failure.
    pub struct AdaptiveFuture<F> {
        #[pin]
        inner: Option<F>,
        permit: Option<LimiterPermit>,
        rejected: Option<RejectionError>,
    }
}

impl<F, T, E> Future for AdaptiveFuture<F>
where
    F: Future<Output = Result<T, E>>,
{
    type Output = Result<T, AdaptiveError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        if let Some(rejection) = this.rejected.take() {
            return Poll::Ready(Err(AdaptiveError::LimitReached(rejection)));
        }

        let result = match this.inner.as_mut().as_pin_mut() {
            Some(inner) => ready!(inner.poll(cx)),
            None => panic!("AdaptiveFuture polled after completion"),
        };
        this.inner.set(None);

        if let Some(permit) = this.permit.take() {
            if result.is_ok() {
                permit.success();
            } else {
                permit.failure();
            }
        }
        Poll::Ready(result.map_err(AdaptiveError::Service))
    }
}
