//! roster binary.
//!
//! Run with:
//!   RUST_LOG=info cargo run -- --port 8000
//!
//! Try:
//!   curl -X POST http://localhost:8000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"John Doe","email":"john@example.com","age":30}'
//!   curl http://localhost:8000/users/1
//!   curl 'http://localhost:8000/products?category=home'
//!   curl http://localhost:8000/readyz

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use roster::{AppState, Config, Error, Server, app};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    let addr = config.socket_addr()?;
    let state = AppState::open(&config)?;
    let router = app::router();
    info!(routes = router.routes().len(), "router ready");

    Server::bind(addr).serve(router, state).await?;

    info!("stores released, bye");
    Ok(())
}
