//! The upload directory: where validated CSVs are saved and datasets are found.
//!
//! This is the only module that reads or writes the upload directory.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::SystemTime,
};

use tempfile::NamedTempFile;

use crate::{Error, config::Config};

/// A CSV file in the upload directory.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDataset {
    /// The file name, which doubles as the dataset reference.
    pub name: String,
    /// The full path to the file.
    pub path: PathBuf,
}

/// Reads and writes datasets in the configured upload directory.
#[derive(Debug, Clone)]
pub struct DatasetStore<'a> {
    config: &'a Config,
}

impl<'a> DatasetStore<'a> {
    /// Create a store over `config.upload_directory`.
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    fn directory(&self) -> &Path {
        &self.config.upload_directory
    }

    /// Find the dataset with the most recent modification time.
    ///
    /// Files whose modification times are equal are ordered by name and the
    /// greatest name wins. Only files with one of the configured
    /// [Config::allowed_extensions] (any case) are considered.
    ///
    /// # Errors
    /// - [Error::MissingUploadDirectory] if the directory does not exist.
    /// - [Error::NoData] if it contains no allowed files.
    /// - [Error::IoError] if the directory cannot be read.
    pub fn latest(&self) -> Result<StoredDataset, Error> {
        if !self.directory().is_dir() {
            return Err(Error::MissingUploadDirectory);
        }

        let mut latest: Option<(SystemTime, StoredDataset)> = None;

        for entry in fs::read_dir(self.directory())? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();

            if !self.config.is_allowed_file(&name) {
                continue;
            }

            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }

            let modified = metadata.modified()?;
            let candidate = StoredDataset {
                name,
                path: entry.path(),
            };

            let is_newer = match &latest {
                Some((latest_modified, latest_dataset)) => {
                    (modified, &candidate.name) > (*latest_modified, &latest_dataset.name)
                }
                None => true,
            };

            if is_newer {
                latest = Some((modified, candidate));
            }
        }

        let (_, dataset) = latest.ok_or(Error::NoData)?;
        tracing::debug!("Latest dataset is {:?}", dataset.name);

        Ok(dataset)
    }

    /// Find the dataset named `reference`.
    ///
    /// # Errors
    /// - [Error::InvalidDatasetReference] if `reference` is not a plain file
    ///   name with an allowed extension.
    /// - [Error::DatasetNotFound] if there is no such file.
    pub fn get(&self, reference: &str) -> Result<StoredDataset, Error> {
        if sanitize_file_name(reference) != reference || !self.config.is_allowed_file(reference) {
            return Err(Error::InvalidDatasetReference);
        }

        let path = self.directory().join(reference);

        if !path.is_file() {
            return Err(Error::DatasetNotFound);
        }

        Ok(StoredDataset {
            name: reference.to_owned(),
            path,
        })
    }

    /// Resolve `reference` if one is given, otherwise fall back to [DatasetStore::latest].
    pub fn resolve(&self, reference: Option<&str>) -> Result<StoredDataset, Error> {
        match reference {
            Some(reference) => self.get(reference),
            None => self.latest(),
        }
    }

    /// Atomically save `contents` as `file_name` in the upload directory.
    ///
    /// The data is first written to a temporary file in the same directory
    /// which is then persisted over the target path, so readers either see the
    /// previous file or the complete new one. The temporary file is removed if
    /// any step fails. An existing file with the same name is replaced.
    ///
    /// `file_name` must already be sanitized.
    pub fn save(&self, file_name: &str, contents: &[u8]) -> Result<StoredDataset, Error> {
        fs::create_dir_all(self.directory())?;

        let path = self.directory().join(file_name);

        let write_and_persist = || -> Result<(), std::io::Error> {
            let mut temp_file = NamedTempFile::new_in(self.directory())?;
            temp_file.write_all(contents)?;
            temp_file.as_file().sync_all()?;
            temp_file.persist(&path).map_err(|error| error.error)?;
            Ok(())
        };

        write_and_persist().inspect_err(|error| {
            tracing::error!("Could not save {path:?}: {error}");
        })?;

        tracing::info!("Saved {} bytes to {path:?}", contents.len());

        Ok(StoredDataset {
            name: file_name.to_owned(),
            path,
        })
    }
}

/// Reduce a client supplied file name to a safe, flat file name.
///
/// Path separators and whitespace become underscores, anything other than
/// ASCII letters, digits, `.`, `_` and `-` is removed, and leading or trailing
/// dots and underscores are stripped. The result may be empty.
///
/// ```text
/// "../../etc/passwd"      -> "etc_passwd"
/// "My Expenses (2024).csv" -> "My_Expenses_2024.csv"
/// ```
pub fn sanitize_file_name(file_name: &str) -> String {
    let spaced = file_name.replace(['/', '\\'], " ");

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect::<String>()
        .trim_matches(['.', '_'])
        .to_owned()
}
