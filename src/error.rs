use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::RECOGNIZED_CATEGORIES;

#[derive(Debug, Error, Diagnostic)]
pub enum SodbError {
    #[error("failed to connect to the server: {0}")]
    ManifestUnavailable(String),

    #[error("server returned status {status}: {message}")]
    ManifestStatus { status: u16, message: String },

    #[error("failed to load data from the server: {0}")]
    ManifestMalformed(String),

    #[error("failed to load data from the server: manifest is empty")]
    ManifestEmpty,

    #[error(
        "dataset[{0}] does not exist. You could get available datasets by calling the function list_dataset."
    )]
    UnknownDataset(String),

    #[error(
        "experiment[{experiment}] does not exist in dataset[{dataset}]. You could get available experiments in dataset[{dataset}] by calling the function list_experiment_by_dataset."
    )]
    UnknownExperiment { dataset: String, experiment: String },

    #[error(
        "unknown biotech category: {0}, available categories are {categories}",
        categories = category_list()
    )]
    UnknownCategory(String),

    #[error("invalid name: {0:?}")]
    InvalidName(String),

    #[error("invalid hash value (expected \"{expected}\", got \"{actual}\")")]
    Integrity { expected: String, actual: String },

    #[error("download failed: {0}")]
    Download(String),

    #[error("download returned status {status}: {message}")]
    DownloadStatus { status: u16, message: String },

    #[error("failed to read data file: {0}")]
    Parse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}

impl SodbError {
    /// Errors raised by identifier validation, before any I/O happens.
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            SodbError::UnknownDataset(_)
                | SodbError::UnknownExperiment { .. }
                | SodbError::UnknownCategory(_)
                | SodbError::InvalidName(_)
        )
    }
}

fn category_list() -> String {
    RECOGNIZED_CATEGORIES
        .iter()
        .map(|category| format!("\"{category}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_category_lists_recognized_values() {
        let message = SodbError::UnknownCategory("Spatial Lipidomics".to_string()).to_string();
        for category in RECOGNIZED_CATEGORIES {
            assert!(message.contains(category), "missing {category} in {message}");
        }
        assert!(message.contains("Spatial Lipidomics"));
    }

    #[test]
    fn unknown_experiment_names_both_identifiers() {
        let message = SodbError::UnknownExperiment {
            dataset: "liu2020high".to_string(),
            experiment: "E10".to_string(),
        }
        .to_string();
        assert!(message.contains("experiment[E10]"));
        assert!(message.contains("dataset[liu2020high]"));
        assert!(message.contains("list_experiment_by_dataset"));
    }
}
