use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    Router,
};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::error::{AppError, AppResult};

/// Requests allowed per client IP before the limiter kicks in.
pub const BURST_SIZE: u32 = 100;

/// One request slot is refilled this often, so a drained client gets
/// `BURST_SIZE` requests back per hour.
pub const REFILL_SECS: u64 = 36;

/// Wraps the router in a per-IP limiter that refills one request every
/// `refill_secs`, with [`log_request`] outside it so refusals are logged.
pub fn limit_per_ip(router: Router, refill_secs: u64, burst: u32) -> AppResult<Router> {
    let config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(refill_secs)
            .burst_size(burst)
            .finish()
            .ok_or_else(|| AppError::Internal("Invalid rate limit configuration".to_string()))?,
    );

    Ok(router
        .layer(GovernorLayer::new(config))
        .layer(middleware::from_fn(log_request)))
}

/// Logs requests refused by the per-IP limiter, plus failures, with the
/// client address. Needs the router to be served with connect info.
pub async fn log_request(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        tracing::warn!(
            client_ip = %addr.ip(),
            method = %method,
            uri = %uri,
            "Too many requests from this IP, please try again in an hour!"
        );
    } else if status.is_server_error() {
        tracing::warn!(
            client_ip = %addr.ip(),
            method = %method,
            uri = %uri,
            status = %status,
            "Request failed"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::{body::Body, routing::get};
    use tower::ServiceExt;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    use super::*;

    #[derive(Clone, Default)]
    struct Warnings(Arc<Mutex<usize>>);

    impl<S: Subscriber> Layer<S> for Warnings {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                *self.0.lock().unwrap() += 1;
            }
        }
    }

    fn request_from(addr: SocketAddr) -> Request {
        let mut request = axum::http::Request::builder()
            .uri("/")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    #[tokio::test]
    async fn test_refused_requests_are_logged() {
        let warnings = Warnings::default();
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::registry().with(warnings.clone()),
        );

        let app = limit_per_ip(Router::new().route("/", get(|| async { "ok" })), 3600, 2).unwrap();
        let client: SocketAddr = "203.0.113.7:40000".parse().unwrap();

        for _ in 0..2 {
            let response = app.clone().oneshot(request_from(client)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(*warnings.0.lock().unwrap(), 0);

        let response = app.clone().oneshot(request_from(client)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(*warnings.0.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clients_are_limited_separately() {
        let app = limit_per_ip(Router::new().route("/", get(|| async { "ok" })), 3600, 1).unwrap();

        let first: SocketAddr = "203.0.113.7:40000".parse().unwrap();
        let second: SocketAddr = "198.51.100.2:40000".parse().unwrap();

        assert_eq!(
            app.clone().oneshot(request_from(first)).await.unwrap().status(),
            StatusCode::OK
        );
        assert_eq!(
            app.clone().oneshot(request_from(first)).await.unwrap().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            app.clone().oneshot(request_from(second)).await.unwrap().status(),
            StatusCode::OK
        );
    }
}
