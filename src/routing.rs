//! Application router configuration.

use std::any::Any;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;

use crate::{
    AppState, endpoints, expenses::get_expenses, forecast::get_forecast, server_error_response,
    upload::upload_file,
};

/// Return a router with all the app's routes.
///
/// Panics inside a handler are caught and turned into a JSON 500 response.
pub fn build_router(state: AppState) -> Router {
    let upload_routes = Router::new()
        .route(endpoints::UPLOAD, post(upload_file))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes));

    Router::new()
        .route(endpoints::EXPENSES_API, get(get_expenses))
        .route(endpoints::FORECAST_API, get(get_forecast))
        .merge(upload_routes)
        .fallback(get_404_not_found)
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

async fn get_404_not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not Found" }))).into_response()
}

fn handle_panic(error: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(message) = error.downcast_ref::<String>() {
        message.as_str()
    } else if let Some(message) = error.downcast_ref::<&str>() {
        message
    } else {
        "unknown panic"
    };

    tracing::error!("A request handler panicked: {message}");

    server_error_response(message)
}
