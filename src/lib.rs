//! # roster
//!
//! A small CRUD HTTP backend for three resources:
//!
//! - **users**, durable, stored in SQLite;
//! - **products**, in memory, seeded with a demo catalog;
//! - **tasks**, in memory, with batch creation and text search.
//!
//! Every resource follows the same contract. An [`Entity`](store::Entity)
//! owns its write semantics and its field [`Schema`](validate::Schema); a
//! [`Store`](store::Store) persists it; [`resource::mount`] turns both into
//! routes. The schema drives request validation and the OpenAPI document
//! served at `/openapi.json`, so the two cannot disagree.
//!
//! ## Request path
//!
//! ```text
//! hyper ─▶ Server ─▶ Router::handle ─▶ trace span ─▶ handler
//!                                                      │ Schema::validate
//!                                                      │ store::run (blocking pool, timeout)
//!                                                      ▼
//!                              Response ◀─ IntoResponse ◀─ Result<_, ApiError>
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use roster::{app, AppState, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), roster::Error> {
//!     let state = AppState::ephemeral(Duration::from_secs(5));
//!     Server::bind("127.0.0.1:8000".parse().unwrap())
//!         .serve(app::router(), state)
//!         .await
//! }
//! ```

pub mod app;
pub mod config;
pub mod docs;
pub mod error;
pub mod health;
pub mod middleware;
pub mod resource;
pub mod store;
pub mod validate;

mod handler;
mod method;
mod request;
mod response;
mod router;
mod server;
mod status;

pub use app::AppState;
pub use config::Config;
pub use error::{ApiError, Error};
pub use handler::Handler;
pub use method::Method;
pub use request::{Query, Request};
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{Route, Router};
pub use server::Server;
pub use status::Status;
