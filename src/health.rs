//! Service-level endpoints: probes, health summary and the root banner.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the durable store answer? Failure → pulled from load-balancer. |

use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::app::AppState;
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;
use crate::store;

/// Always `200 ok`. If the process can respond to HTTP at all, it is alive.
pub async fn liveness(_req: Request, _state: AppState) -> Response {
    Response::text("ok")
}

/// `200 ready` once the user database answers a ping within the store
/// timeout, `503` otherwise.
pub async fn readiness(_req: Request, state: AppState) -> Response {
    match ping(&state).await {
        Ok(()) => Response::text("ready"),
        Err(e) => {
            warn!(error = %e, "readiness check failed");
            Response::builder().status(Status::ServiceUnavailable).text("unavailable")
        }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    database: &'static str,
    version: &'static str,
}

/// JSON summary. Always `200`; the database line reports what the ping saw.
pub async fn health(_req: Request, state: AppState) -> Response {
    let database = match ping(&state).await {
        Ok(()) => "ok",
        Err(_) => "unavailable",
    };
    Response::json(&Health {
        status: "healthy",
        database,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Banner listing the entry points.
pub async fn root(_req: Request, _state: AppState) -> Response {
    Response::json(&json!({
        "message": "Welcome to roster",
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/docs",
        "openapi": "/openapi.json",
        "resources": ["/users", "/products", "/tasks"],
    }))
}

async fn ping(state: &AppState) -> store::StoreResult<()> {
    let users = state.users.clone();
    store::run(state.store_timeout, move || users.ping()).await
}
