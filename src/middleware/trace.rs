//! Per-request tracing.
//!
//! Every request runs inside an `info_span!("request")` carrying the method
//! and path, so store-level events logged by handlers inherit them. One
//! event is emitted when the response is ready.

use std::future::Future;
use std::time::Instant;

use tracing::{info, warn, Instrument};

use crate::response::Response;

/// Runs `fut` inside a request span and logs its outcome.
pub async fn instrument<F>(method: &str, path: &str, fut: F) -> Response
where
    F: Future<Output = Response>,
{
    let span = tracing::info_span!("request", %method, %path);
    let started = Instant::now();

    let res = fut.instrument(span.clone()).await;

    let status = res.status_code().as_u16();
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    span.in_scope(|| {
        if status >= 500 {
            warn!(status, latency_ms, "request failed");
        } else {
            info!(status, latency_ms, "request completed");
        }
    });
    res
}
