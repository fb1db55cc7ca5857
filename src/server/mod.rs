//! Local HTTP services
//!
//! Two small axum apps: the approval webhook server (`approval`) and the
//! pytest runner (`runner`). Both are started from `ai-rails serve`.

pub mod approval;
pub mod error;
mod html;
pub mod runner;

pub use error::AppError;
pub use html::escape_html;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Permissive CORS; the approval page and n8n call from anywhere
pub fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

fn with_layers(router: Router) -> Router {
    router.layer(cors()).layer(TraceLayer::new_for_http())
}

/// Bind `host:port` and serve until the process exits
pub async fn serve(router: Router, host: &str, port: u16, name: &str) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(router, listener, name).await
}

/// Serve on a listener that is already bound (port 0 in tests)
pub async fn serve_on(
    router: Router,
    listener: tokio::net::TcpListener,
    name: &str,
) -> anyhow::Result<()> {
    let actual = listener.local_addr()?;
    tracing::info!("{name} listening on http://{actual}");
    axum::serve(listener, with_layers(router)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_serve_on_ephemeral_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = approval::ApprovalState::new("http://localhost", Duration::from_secs(60));
        let handle = tokio::spawn(serve_on(approval::router(state), listener, "approval"));

        let body: serde_json::Value = reqwest::get(format!("http://{addr}/"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "running");
        handle.abort();
    }
}
