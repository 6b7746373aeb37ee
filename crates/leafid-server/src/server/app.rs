use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::server::{routes, static_files};
use crate::state::AppState;

/// Multipart framing and form fields on top of the image itself
const BODY_OVERHEAD: usize = 64 * 1024;

/// Build the Axum application
pub fn build_app(state: AppState) -> Router {
    // Base64 inflates the webcam payload by a third
    let body_limit = state.settings.decode.max_bytes / 3 * 4 + BODY_OVERHEAD;

    // API routes
    let api_routes = Router::new()
        .route("/identify", post(routes::identify_api))
        .route("/identify/base64", post(routes::identify_base64))
        .route("/plants", get(routes::list_plants))
        .route("/plants/:label", get(routes::get_plant))
        .route("/history", get(routes::history_api));

    let mut app = Router::new()
        .route("/", get(routes::index))
        .route("/identify", post(routes::identify_page))
        .route("/history", get(routes::history_page))
        .route("/health", get(routes::health))
        .route("/metrics", get(routes::metrics))
        .route("/static/*path", get(static_files::serve_static))
        .nest("/api", api_routes);

    if let Some(dir) = &state.settings.upload_dir {
        app = app.nest_service("/uploads", ServeDir::new(dir));
    }

    app.layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn run_server(
    state: AppState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("LeafID listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}
