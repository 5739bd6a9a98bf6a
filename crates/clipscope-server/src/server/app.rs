use crate::server::{routes, static_files};
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

/// Largest accepted request body
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Build the Axum application
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let assets = ServeDir::new(state.frontend_dir().join("dist").join("assets"));

    Router::new()
        // Health
        .route("/health", get(routes::health))
        .route("/metrics", get(routes::metrics))
        // Image and predictions
        .route("/upload", post(routes::upload))
        .route("/predict", get(routes::predict))
        .route("/predictsequential", get(routes::predict_sequential))
        // Class names and prompt
        .route("/getclassnames", get(routes::get_class_names))
        .route("/saveclassnames", post(routes::save_class_names))
        .route("/getprompt", get(routes::get_prompt))
        .route("/saveprompt", post(routes::save_prompt))
        // Model selection
        .route("/getmodels", get(routes::get_models))
        .route("/setactivemodels", post(routes::set_active_models))
        .route("/setsequentialmodels", post(routes::set_sequential_models))
        // Front-end
        .route("/", get(static_files::index))
        .nest_service("/assets", assets)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run the server until `shutdown` resolves
pub async fn run_server<F>(state: AppState, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Clipscope listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
