use crate::server::ApiError;
use crate::state::AppState;
use axum::{extract::State, response::Html};
use clipscope_core::Error;

/// Serve the front-end entry point
pub async fn index(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let path = state.frontend_dir().join("dist").join("index.html");

    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Ok(Html(html)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::not_found(format!(
            "Front-end not built: {} is missing",
            path.display()
        ))
        .into()),
        Err(e) => Err(Error::from(e).into()),
    }
}
