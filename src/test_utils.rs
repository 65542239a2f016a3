#![allow(missing_docs)]

use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

/// A fresh directory from [tempfile::tempdir] with helpers for writing
/// fixture files. The directory is deleted when dropped.
pub(crate) struct TempDir {
    dir: tempfile::TempDir,
}

impl TempDir {
    #[track_caller]
    pub(crate) fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Could not create temp dir"),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `file_name` inside this directory and return its path.
    #[track_caller]
    pub(crate) fn write(&self, file_name: &str, contents: &str) -> PathBuf {
        let path = self.path().join(file_name);
        fs::write(&path, contents).expect("Could not write test file");
        path
    }

    /// Like [TempDir::write], but backdates the modification time by `age`.
    #[track_caller]
    pub(crate) fn write_with_age(&self, file_name: &str, contents: &str, age: Duration) -> PathBuf {
        let path = self.write(file_name, contents);
        let modified = SystemTime::now() - age;

        fs::File::options()
            .write(true)
            .open(&path)
            .and_then(|file| file.set_modified(modified))
            .expect("Could not set modification time");

        path
    }

    #[track_caller]
    pub(crate) fn file_names(&self) -> Vec<String> {
        let mut names = fs::read_dir(self.path())
            .expect("Could not read temp dir")
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        names.sort();
        names
    }
}

/// Five points on the line `amount = 10 + 2.5 * days`, one every two days.
pub(crate) const LINEAR_CSV: &str = "Date,Amount\n\
    2024-01-01,10.00\n\
    2024-01-03,15.00\n\
    2024-01-05,20.00\n\
    2024-01-07,25.00\n\
    2024-01-09,30.00\n";

/// Six points on the parabola `amount = 100 - 3 * days + 0.5 * days^2`.
pub(crate) const QUADRATIC_CSV: &str = "Date,Amount\n\
    2024-03-01,100\n\
    2024-03-02,97.5\n\
    2024-03-03,96\n\
    2024-03-04,95.5\n\
    2024-03-05,96\n\
    2024-03-06,97.5\n";
