//! Implements a struct that holds the state of the REST server.

use std::fs;

use crate::{Error, config::Config};

/// The state of the REST server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Where datasets are stored and which files are accepted.
    pub config: Config,
}

impl AppState {
    /// Create a new [AppState] from `config`.
    ///
    /// This function will create the upload directory if it does not exist yet.
    ///
    /// # Errors
    /// Returns an error if the upload directory cannot be created.
    pub fn new(config: Config) -> Result<Self, Error> {
        fs::create_dir_all(&config.upload_directory)
            .inspect_err(|error| {
                tracing::error!(
                    "Could not create upload directory {:?}: {error}",
                    config.upload_directory
                )
            })?;

        Ok(Self { config })
    }
}

#[cfg(test)]
mod app_state_tests {
    use crate::{AppState, Config, test_utils::TempDir};

    #[test]
    fn creates_missing_upload_directory() {
        let temp_dir = TempDir::new();
        let upload_directory = temp_dir.path().join("nested").join("uploads");

        AppState::new(Config::with_upload_directory(&upload_directory)).unwrap();

        assert!(upload_directory.is_dir());
    }
}
