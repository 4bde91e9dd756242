//! Access logging middleware.
//!
//! Emits exactly one `request` record per completed request, after the
//! response has been produced, carrying:
//!
//! - `method` and `path` of the request
//! - `status` as recorded by [`StatusRecorder`]
//! - `duration` since the request entered the middleware (`12.3µs`, `1.2ms`)
//! - `remote`, the peer address, or `unknown` when no connection info exists
//!
//! Requests and responses are not modified. If the inner service fails with
//! an error no record is written; panics are turned into 500 responses further
//! in (see [`super::recover`]) and are therefore logged like any other request.

use std::{
    net::SocketAddr,
    task::{Context, Poll},
    time::Instant,
};

use axum::{
    extract::ConnectInfo,
    http::{Request, Response},
};
use futures_util::future::BoxFuture;
use tower::{Layer, Service};

use super::status_recorder::{RecordedStatus, StatusRecorder};

/// [`Layer`] that wraps a service in [`RequestLog`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogLayer;

impl RequestLogLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestLogLayer {
    type Service = RequestLog<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLog { inner }
    }
}

/// Service produced by [`RequestLogLayer`].
#[derive(Debug, Clone)]
pub struct RequestLog<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestLog<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let start = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let remote = remote_addr(&req);

        // `self.inner` is the instance that was driven to readiness; it serves
        // this request and a fresh clone takes its place.
        let clone = self.inner.clone();
        let ready = std::mem::replace(&mut self.inner, clone);
        let recorded = RecordedStatus::default();
        let fut = StatusRecorder::new(ready, recorded.clone()).call(req);

        Box::pin(async move {
            let response = fut.await?;
            tracing::info!(
                method = %method,
                path = %path,
                status = recorded.get().as_u16(),
                duration = ?start.elapsed(),
                remote = %remote,
                "request"
            );
            Ok(response)
        })
    }
}

fn remote_addr<B>(req: &Request<B>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
