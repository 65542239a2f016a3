//! Middleware for logging requests and responses.

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::header::{CONTENT_LENGTH, CONTENT_TYPE},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::Error;

/// Request and response bodies longer than this many bytes are truncated in
/// `info` logs.
pub const LOG_BODY_LENGTH_LIMIT: usize = 64;

/// Log the request and response for each request.
///
/// Both the request and response are logged at the `info` level.
/// If a body is longer than [LOG_BODY_LENGTH_LIMIT] bytes, it is truncated
/// and the full body is logged at the `debug` level. Multipart bodies (file
/// uploads) are streamed through untouched and only their declared length is
/// logged, so route body limits still apply before anything is buffered.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();

    let is_multipart = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|content_type| content_type.to_str().ok())
        .is_some_and(|content_type| content_type.starts_with("multipart/form-data"));

    let request = if is_multipart {
        let content_length = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|content_length| content_length.to_str().ok())
            .unwrap_or("unknown");
        tracing::info!(
            "Received request: {parts:#?}\nbody: <multipart form, content-length {content_length}>"
        );

        Request::from_parts(parts, body)
    } else {
        let body_bytes = match collect_body(body).await {
            Ok(bytes) => bytes,
            Err(error) => return error.into_response(),
        };
        log_body("Received request", &parts, &body_bytes);

        Request::from_parts(parts, Body::from(body_bytes))
    };

    let response = next.run(request).await;

    let (parts, body) = response.into_parts();
    let body_bytes = match collect_body(body).await {
        Ok(bytes) => bytes,
        Err(error) => return error.into_response(),
    };
    log_body("Sending response", &parts, &body_bytes);

    Response::from_parts(parts, Body::from(body_bytes))
}

async fn collect_body(body: Body) -> Result<Bytes, Error> {
    axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|error| Error::Internal(format!("could not read body: {error}")))
}

fn log_body(label: &str, parts: &impl std::fmt::Debug, body: &[u8]) {
    let body = String::from_utf8_lossy(body);

    if body.len() > LOG_BODY_LENGTH_LIMIT {
        tracing::info!(
            "{label}: {parts:#?}\nbody: {}...",
            truncate(&body, LOG_BODY_LENGTH_LIMIT)
        );
        tracing::debug!("Full body: {body:?}");
    } else {
        tracing::info!("{label}: {parts:#?}\nbody: {body:?}");
    }
}

/// The longest prefix of `text` that is at most `limit` bytes and ends on a char boundary.
fn truncate(text: &str, limit: usize) -> &str {
    let end = (0..=limit.min(text.len()))
        .rev()
        .find(|&index| text.is_char_boundary(index))
        .unwrap_or(0);

    &text[..end]
}

#[cfg(test)]
mod logging_tests {
    use axum::{Router, extract::Multipart, middleware, routing::post};
    use axum_test::{
        TestServer,
        multipart::{MultipartForm, Part},
    };

    use super::{logging_middleware, truncate};

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        // 'é' is two bytes, so cutting after one byte backs off to before it.
        assert_eq!(truncate("é", 1), "");
        assert_eq!(truncate("aé", 2), "a");
    }

    #[tokio::test]
    async fn passes_bodies_through_unchanged() {
        let app = Router::new()
            .route("/echo", post(|body: String| async move { body }))
            .layer(middleware::from_fn(logging_middleware));
        let server = TestServer::try_new(app).expect("Could not create test server.");
        let long_body = "Date,Amount\n".repeat(20);

        let response = server.post("/echo").text(long_body.clone()).await;

        response.assert_status_ok();
        response.assert_text(long_body);
    }

    #[tokio::test]
    async fn passes_multipart_bodies_through_unchanged() {
        let app = Router::new()
            .route(
                "/upload",
                post(|mut multipart: Multipart| async move {
                    match multipart.next_field().await {
                        Ok(Some(field)) => field.text().await.unwrap_or_default(),
                        _ => String::new(),
                    }
                }),
            )
            .layer(middleware::from_fn(logging_middleware));
        let server = TestServer::try_new(app).expect("Could not create test server.");
        let contents = "Date,Amount\n2024-01-01,1\n".repeat(10);

        let response = server
            .post("/upload")
            .multipart(MultipartForm::new().add_part(
                "file",
                Part::text(contents.clone()).file_name("data.csv"),
            ))
            .await;

        response.assert_status_ok();
        response.assert_text(contents);
    }
}
