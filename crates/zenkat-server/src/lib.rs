//! Zenkat Server - HTTP access to lazily loaded document trees
//!
//! Routes:
//!
//! | Route | Engine call |
//! |---|---|
//! | `GET /tree` | list registered trees |
//! | `PUT /tree` | register or reconfigure a tree |
//! | `GET /tree/{name}` | tree summary |
//! | `POST /tree/{name}/query` | predicate query |
//! | `GET /tree/{name}/node` | node listing |
//! | `GET /tree/{name}/node/{id}` | node detail with content |
//!
//! Read routes accept `eagerness=none|metadata|full` and `wait=false`.

pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ServerError};
pub use routes::router;
pub use state::AppState;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

/// Serve the router on the configured address until ctrl-c.
pub async fn serve(state: Arc<AppState>) -> Result<(), ServerError> {
    let addr = state.config().bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    info!(
        address = %addr,
        trees = state.engine().list_trees().len(),
        "Listening"
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}
