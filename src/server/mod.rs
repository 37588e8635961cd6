//! The pipeline manager
//!
//! A stateless proxy bound to one forwarding chain. Shutdown is a message on a
//! `watch` channel: it stops the listener and cancels in-flight walks.

pub mod handlers;
pub mod state;

pub use handlers::{create_router, error_response, ErrorBody};
pub use state::ManagerState;

use tokio::net::TcpListener;
use tracing::info;

use crate::runtime::wait_for_shutdown;

/// Serve the manager on `listener` until the shutdown flag is raised
pub async fn serve_manager(listener: TcpListener, state: ManagerState) -> std::io::Result<()> {
    let mut shutdown = state.shutdown.clone();
    let app = create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown(&mut shutdown).await;
            info!("Received termination; no longer accepting requests");
        })
        .await
}
