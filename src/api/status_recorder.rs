//! Response status capture for request logging.
//!
//! [`StatusRecorder`] is a transparent [`Service`] decorator: the request is
//! forwarded untouched and the response comes back untouched, but its status
//! code is copied into a shared [`RecordedStatus`] on the way out. Whatever
//! status the inner service settles on (the last one set) is the status
//! recorded and the status written to the wire.

use std::{
    sync::{
        atomic::{AtomicU16, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use axum::http::{Request, Response, StatusCode};
use futures_util::future::BoxFuture;
use tower::Service;

/// Shared slot holding the status observed by a [`StatusRecorder`].
///
/// Starts out as `200 OK`, which is what a response that never sets a
/// status explicitly is sent with.
#[derive(Debug, Clone)]
pub struct RecordedStatus(Arc<AtomicU16>);

impl Default for RecordedStatus {
    fn default() -> Self {
        Self(Arc::new(AtomicU16::new(StatusCode::OK.as_u16())))
    }
}

impl RecordedStatus {
    pub fn get(&self) -> StatusCode {
        StatusCode::from_u16(self.0.load(Ordering::Acquire)).unwrap_or(StatusCode::OK)
    }

    fn set(&self, status: StatusCode) {
        self.0.store(status.as_u16(), Ordering::Release);
    }
}

/// Service decorator that records the status of every response it forwards.
#[derive(Debug, Clone)]
pub struct StatusRecorder<S> {
    inner: S,
    recorded: RecordedStatus,
}

impl<S> StatusRecorder<S> {
    pub fn new(inner: S, recorded: RecordedStatus) -> Self {
        Self { inner, recorded }
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for StatusRecorder<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: 'static,
    ResBody: 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let recorded = self.recorded.clone();
        let fut = self.inner.call(req);
        Box::pin(async move {
            let response = fut.await?;
            recorded.set(response.status());
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use axum::{
        body::{to_bytes, Body},
        http::{header, HeaderValue},
    };
    use tower::{service_fn, ServiceExt};

    use super::*;

    fn request() -> Request<Body> {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    #[test]
    fn unset_status_defaults_to_ok() {
        assert_eq!(RecordedStatus::default().get(), StatusCode::OK);
    }

    #[tokio::test]
    async fn records_status_returned_by_inner_service() {
        let recorded = RecordedStatus::default();
        let inner = service_fn(|_req: Request<Body>| async {
            Ok::<_, Infallible>(
                Response::builder()
                    .status(StatusCode::IM_A_TEAPOT)
                    .body(Body::empty())
                    .unwrap(),
            )
        });

        let resp = StatusRecorder::new(inner, recorded.clone())
            .oneshot(request())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(recorded.get(), StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn last_status_set_is_the_one_recorded_and_sent() {
        let recorded = RecordedStatus::default();
        let inner = service_fn(|_req: Request<Body>| async {
            let mut resp = Response::new(Body::empty());
            *resp.status_mut() = StatusCode::CREATED;
            *resp.status_mut() = StatusCode::OK;
            Ok::<_, Infallible>(resp)
        });

        let resp = StatusRecorder::new(inner, recorded.clone())
            .oneshot(request())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(recorded.get(), resp.status());
    }

    #[tokio::test]
    async fn headers_and_body_pass_through_unchanged() {
        let inner = service_fn(|_req: Request<Body>| async {
            Ok::<_, Infallible>(
                Response::builder()
                    .status(StatusCode::ACCEPTED)
                    .header(header::CONTENT_TYPE, "text/plain")
                    .body(Body::from("payload"))
                    .unwrap(),
            )
        });

        let resp = StatusRecorder::new(inner, RecordedStatus::default())
            .oneshot(request())
            .await
            .unwrap();

        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE),
            Some(&HeaderValue::from_static("text/plain"))
        );
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"payload");
    }

    #[tokio::test]
    async fn inner_error_leaves_default_status() {
        let recorded = RecordedStatus::default();
        let inner = service_fn(|_req: Request<Body>| async {
            Err::<Response<Body>, _>(std::io::Error::new(std::io::ErrorKind::Other, "broken"))
        });

        let result = StatusRecorder::new(inner, recorded.clone())
            .oneshot(request())
            .await;

        assert!(result.is_err());
        assert_eq!(recorded.get(), StatusCode::OK);
    }
}
