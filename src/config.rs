//! Runtime configuration for where datasets live and which files are accepted.

use std::path::{Path, PathBuf};

/// The default directory that uploaded CSV files are saved to.
pub const DEFAULT_UPLOAD_DIRECTORY: &str = "uploads";
/// The default path of the CSV file served by the expenses endpoint.
pub const DEFAULT_EXPENSES_PATH: &str = "uploads/expenses.csv";
/// The default maximum size of an upload request body, 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Settings shared by the upload, forecast and expenses handlers.
///
/// A [Config] is built once at start up and handed to [crate::AppState::new].
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// The directory uploaded files are stored in and forecasts read from.
    pub upload_directory: PathBuf,

    /// File extensions, without the leading dot, that may be uploaded.
    ///
    /// Compared case-insensitively.
    pub allowed_extensions: Vec<String>,

    /// The CSV file listed by the expenses endpoint.
    pub expenses_path: PathBuf,

    /// The largest request body accepted by the upload endpoint.
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_directory: PathBuf::from(DEFAULT_UPLOAD_DIRECTORY),
            allowed_extensions: vec!["csv".to_owned()],
            expenses_path: PathBuf::from(DEFAULT_EXPENSES_PATH),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Config {
    /// Create a config that stores uploads in `upload_directory` and uses the
    /// defaults for everything else.
    pub fn with_upload_directory(upload_directory: impl AsRef<Path>) -> Self {
        Self {
            upload_directory: upload_directory.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Whether `file_name` ends with one of the allowed extensions.
    ///
    /// The extension is the text after the last dot, so `"report.tar.csv"`
    /// has the extension `"csv"` and `"csv"` has none.
    pub fn is_allowed_file(&self, file_name: &str) -> bool {
        match file_name.rsplit_once('.') {
            Some((_, extension)) => self
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(extension)),
            None => false,
        }
    }
}
