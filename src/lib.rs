//! Finance Tracker is a small web service for uploading transaction CSVs and
//! forecasting where the amounts are heading.
//!
//! This library provides a JSON API with three routes: one to upload CSV
//! files, one to list the rows of an expenses file, and one to fit a
//! regression model to an uploaded dataset and project it 30 days forward.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod app_state;
mod config;
mod dataset;
mod endpoints;
mod expenses;
mod forecast;
mod logging;
mod regression;
mod routing;
mod storage;
mod upload;

#[cfg(test)]
mod test_utils;

pub use app_state::AppState;
pub use config::{
    Config, DEFAULT_EXPENSES_PATH, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_UPLOAD_DIRECTORY,
};
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use routing::build_router;

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The configured upload directory does not exist.
    #[error("Uploads folder not found")]
    MissingUploadDirectory,

    /// The upload directory exists but holds no CSV files.
    #[error("No uploaded data available")]
    NoData,

    /// The CSV header is missing the `Date` column, the `Amount` column, or both.
    #[error("CSV must contain Date and Amount columns")]
    MissingColumns,

    /// Every row of the dataset failed to parse as a date/amount pair.
    #[error("No valid rows after parsing Date/Amount.")]
    EmptyDataset,

    /// All rows fall on the same day, so there is no trend to fit.
    #[error("Not enough distinct dates to train a model.")]
    InsufficientVariance,

    /// The multipart form did not contain a `file` field.
    #[error("No file uploaded")]
    NoFileUploaded,

    /// The `file` field was present but had no file name.
    #[error("No file selected")]
    NoFileSelected,

    /// The file name does not end with one of the allowed extensions.
    #[error("Invalid file type")]
    InvalidFileType,

    /// The CSV had issues that prevented it from being parsed.
    #[error("Could not parse the CSV file: {0}")]
    InvalidCSV(String),

    /// The multipart form could not be parsed.
    #[error("Could not parse multipart form: {0}")]
    MultipartError(String),

    /// The upload request body is larger than the configured limit.
    #[error("File is too large")]
    UploadTooLarge,

    /// The dataset reference is not a plain file name with an allowed extension.
    #[error("Invalid dataset reference")]
    InvalidDatasetReference,

    /// The dataset reference is well formed but no such file exists.
    #[error("Dataset not found")]
    DatasetNotFound,

    /// The fixed expenses file does not exist.
    #[error("Expenses file not found")]
    ExpensesNotFound,

    /// An unexpected I/O error.
    ///
    /// The error string should only be logged for debugging on the server.
    #[error("{0}")]
    IoError(String),

    /// The least squares solve did not produce finite coefficients.
    #[error("could not fit a model to the data")]
    FitFailed,

    /// A forecast date fell outside the range of representable dates.
    #[error("forecast date is out of range")]
    DateOutOfRange,

    /// Any other unexpected failure.
    #[error("{0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::IoError(value.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(value: csv::Error) -> Self {
        match value.kind() {
            csv::ErrorKind::Io(error) => Error::IoError(error.to_string()),
            _ => Error::InvalidCSV(value.to_string()),
        }
    }
}

impl Error {
    /// The status code a client receives for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::MissingUploadDirectory
            | Error::NoData
            | Error::MissingColumns
            | Error::EmptyDataset
            | Error::InsufficientVariance
            | Error::NoFileUploaded
            | Error::NoFileSelected
            | Error::InvalidFileType
            | Error::InvalidCSV(_)
            | Error::MultipartError(_)
            | Error::InvalidDatasetReference => StatusCode::BAD_REQUEST,
            Error::DatasetNotFound | Error::ExpensesNotFound => StatusCode::NOT_FOUND,
            Error::UploadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Error::IoError(_) | Error::FitFailed | Error::DateOutOfRange | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!("An unexpected error occurred: {self:?}");
            return server_error_response(&self.to_string());
        }

        tracing::debug!("Rejecting request with {status}: {self}");
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// The JSON 500 response sent for failures the client cannot fix.
///
/// Only `message` is sent to the client, never a backtrace.
pub(crate) fn server_error_response(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": format!("Server error: {message}") })),
    )
        .into_response()
}

#[cfg(test)]
mod error_tests {
    use axum::{body, http::StatusCode, response::IntoResponse};
    use serde_json::Value;

    use crate::Error;

    async fn error_body(error: Error) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_errors_are_bad_requests_with_message() {
        let (status, body) = error_body(Error::NoData).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No uploaded data available");
    }

    #[tokio::test]
    async fn missing_expenses_file_is_not_found() {
        let (status, body) = error_body(Error::ExpensesNotFound).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Expenses file not found");
    }

    #[tokio::test]
    async fn internal_errors_are_prefixed_with_server_error() {
        let (status, body) = error_body(Error::IoError("disk on fire".to_owned())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Server error: disk on fire");
    }

    #[test]
    fn csv_io_errors_become_io_errors() {
        let io_error = std::io::Error::other("boom");
        let error: Error = csv::Error::from(io_error).into();

        assert!(matches!(error, Error::IoError(_)), "got {error:?}");
    }
}
