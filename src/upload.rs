//! Route handler for uploading transaction CSVs into the upload directory.

use axum::{
    Json,
    extract::{FromRef, Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use serde::Serialize;

use crate::{
    AppState, Error,
    config::Config,
    dataset::validate_header,
    storage::{DatasetStore, sanitize_file_name},
};

/// The multipart form field that holds the uploaded file.
pub const FILE_FIELD: &str = "file";

/// The state needed for saving uploads.
#[derive(Debug, Clone)]
pub struct UploadState {
    /// Where uploads are saved and which extensions are accepted.
    pub config: Config,
}

impl FromRef<AppState> for UploadState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            config: state.config.clone(),
        }
    }
}

/// The response body for a successful upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResponse {
    /// A human readable confirmation.
    pub message: String,
    /// The reference to pass as `dataset` when requesting a forecast.
    pub dataset: String,
}

/// Route handler for uploading a CSV file.
///
/// The file must have an allowed extension and a header with `Date` and
/// `Amount` columns. Nothing is written to the upload directory unless the
/// file passes every check.
pub async fn upload_file(
    State(state): State<UploadState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, Error> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            tracing::debug!("Skipping multipart field {:?}", field.name());
            continue;
        }

        let original_name = match field.file_name() {
            Some(file_name) if !file_name.is_empty() => file_name.to_owned(),
            _ => return Err(Error::NoFileSelected),
        };

        if !state.config.is_allowed_file(&original_name) {
            tracing::debug!("Rejecting upload {original_name:?} with disallowed extension");
            return Err(Error::InvalidFileType);
        }

        let file_name = sanitize_file_name(&original_name);
        if !state.config.is_allowed_file(&file_name) {
            tracing::debug!("Rejecting upload {original_name:?} that sanitizes to {file_name:?}");
            return Err(Error::InvalidFileType);
        }

        let data = field.bytes().await.map_err(multipart_error)?;

        tracing::debug!(
            "Received file '{}' that is {} bytes",
            original_name,
            data.len()
        );

        validate_header(&data)?;

        let stored = DatasetStore::new(&state.config).save(&file_name, &data)?;

        return Ok(Json(UploadResponse {
            message: format!("{} uploaded successfully", stored.name),
            dataset: stored.name,
        }));
    }

    Err(Error::NoFileUploaded)
}

fn multipart_error(error: MultipartError) -> Error {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return Error::UploadTooLarge;
    }

    tracing::error!("Could not read multipart form: {error}");
    Error::MultipartError(error.body_text())
}
