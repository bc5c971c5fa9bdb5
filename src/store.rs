use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::Serialize;

use crate::domain::{DatasetName, ExperimentName};
use crate::error::SodbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheAction {
    Cache,
    Download,
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub path: Utf8PathBuf,
    pub action: CacheAction,
}

/// Local mirror of downloaded experiments:
/// `<root>/<dataset>/<experiment>.h5ad`, one file per experiment.
///
/// A present file is trusted as complete. Files that fail to read are evicted
/// by the catalog.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, SodbError> {
        Ok(Self {
            root: Self::default_root()?,
        })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn default_root() -> Result<Utf8PathBuf, SodbError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("sodb")).ok()
            })
            .ok_or_else(|| SodbError::Filesystem("unable to resolve cache directory".to_string()))
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn dataset_dir(&self, dataset: &DatasetName) -> Utf8PathBuf {
        self.root.join(dataset.as_str())
    }

    pub fn experiment_path(
        &self,
        dataset: &DatasetName,
        experiment: &ExperimentName,
    ) -> Utf8PathBuf {
        self.dataset_dir(dataset).join(experiment.file_name())
    }

    pub fn is_cached(&self, dataset: &DatasetName, experiment: &ExperimentName) -> bool {
        self.experiment_path(dataset, experiment)
            .as_std_path()
            .is_file()
    }

    /// Returns the cached file, running `fetch` against its final path first
    /// when it is absent. `fetch` is expected to publish atomically.
    pub fn ensure_fetched<F>(
        &self,
        dataset: &DatasetName,
        experiment: &ExperimentName,
        fetch: F,
    ) -> Result<Resolved, SodbError>
    where
        F: FnOnce(&Utf8Path) -> Result<(), SodbError>,
    {
        let path = self.experiment_path(dataset, experiment);
        if path.as_std_path().exists() {
            tracing::debug!(%path, "cache hit");
            return Ok(Resolved {
                path,
                action: CacheAction::Cache,
            });
        }

        fs::create_dir_all(self.dataset_dir(dataset).as_std_path())
            .map_err(|err| SodbError::Filesystem(err.to_string()))?;
        fetch(&path)?;
        if !path.as_std_path().exists() {
            return Err(SodbError::Filesystem(format!(
                "download did not produce {path}"
            )));
        }
        Ok(Resolved {
            path,
            action: CacheAction::Download,
        })
    }

    /// Removes a cached file. Missing files are not an error.
    pub fn evict(path: &Utf8Path) -> Result<bool, SodbError> {
        match fs::remove_file(path.as_std_path()) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(SodbError::Filesystem(format!("remove {path}: {err}"))),
        }
    }
}
