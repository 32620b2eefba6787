//! Application assembly: the shared state and the full route table.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{Config, DatabaseUrl};
use crate::docs::{self, Info, Operation, Returns};
use crate::error::Error;
use crate::health;
use crate::method::Method;
use crate::request::Request;
use crate::resource::product::{self, Product};
use crate::resource::task::{self, Task};
use crate::resource::user::User;
use crate::resource;
use crate::response::Response;
use crate::router::Router;
use crate::status::Status;
use crate::store::{MemoryStore, SqliteUserStore, Store};

const INFO: Info = Info {
    title: "roster",
    version: env!("CARGO_PKG_VERSION"),
    description: "CRUD endpoints for users, products and tasks",
};

/// Everything a handler can reach. Cloned once per request.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn Store<User>>,
    pub products: Arc<dyn Store<Product>>,
    pub tasks: Arc<dyn Store<Task>>,
    /// Upper bound on a single store call.
    pub store_timeout: Duration,
}

impl AppState {
    /// Opens the stores `config` describes.
    pub fn open(config: &Config) -> Result<Self, Error> {
        let users = match config.database()? {
            DatabaseUrl::Memory => SqliteUserStore::open_in_memory()?,
            DatabaseUrl::File(path) => SqliteUserStore::open(path)?,
        };

        let products = if config.no_demo_products {
            MemoryStore::new()
        } else {
            let seeded = MemoryStore::seeded(product::demo_catalog())?;
            info!("seeded demo products");
            seeded
        };

        Ok(Self {
            users: Arc::new(users),
            products: Arc::new(products),
            tasks: Arc::new(MemoryStore::new()),
            store_timeout: config.store_timeout()?,
        })
    }

    /// State with every store in memory, users included.
    pub fn ephemeral(store_timeout: Duration) -> Self {
        Self {
            users: Arc::new(MemoryStore::<User>::new()),
            products: Arc::new(MemoryStore::<Product>::new()),
            tasks: Arc::new(MemoryStore::<Task>::new()),
            store_timeout,
        }
    }
}

/// Builds the complete router, documentation endpoints included.
///
/// # Panics
///
/// Panics if a route or field specification is malformed. Both are fixed at
/// compile time, so this fires on the first startup or not at all.
pub fn router() -> Router<AppState> {
    let router = Router::new()
        .route(
            Method::Get,
            "/",
            Operation::new("Service information").tag("service"),
            health::root,
        )
        .route(
            Method::Get,
            "/health",
            Operation::new("Health summary").tag("service"),
            health::health,
        )
        .route(
            Method::Get,
            "/healthz",
            Operation::new("Liveness probe").tag("service").returns(Returns::Text),
            health::liveness,
        )
        .route(
            Method::Get,
            "/readyz",
            Operation::new("Readiness probe")
                .tag("service")
                .returns(Returns::Text)
                .errors([Status::ServiceUnavailable]),
            health::readiness,
        );

    let router = resource::mount::<User>(router);
    let router = resource::mount::<Product>(router);
    let router = resource::mount::<Task>(router);
    let router = task::mount_bulk(router);

    let document = Arc::new(docs::openapi(&router, &INFO));
    router
        .route(
            Method::Get,
            "/openapi.json",
            Operation::new("OpenAPI document").tag("service"),
            move |_req: Request, _state: AppState| {
                let document = Arc::clone(&document);
                async move { Response::json(&*document) }
            },
        )
        .route(
            Method::Get,
            "/docs",
            Operation::new("Interactive API documentation").tag("service").returns(Returns::Html),
            docs_page,
        )
}

async fn docs_page(_req: Request, _state: AppState) -> Response {
    Response::html(docs::SWAGGER_UI)
}
