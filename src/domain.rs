use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SodbError;

/// Biotech categories the server publishes. Listing by category checks
/// against the values actually present in the manifest, not this list.
pub const RECOGNIZED_CATEGORIES: [&str; 5] = [
    "Spatial Transcriptomics",
    "Spatial Proteomics",
    "Spatial Metabolomics",
    "Spatial Genomics",
    "Spatial MultiOmics",
];

/// Extension of the cached experiment files.
pub const DATA_FILE_EXT: &str = "h5ad";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub biotech_category: String,
    pub dataset_name: String,
    pub experiment_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetName(String);

impl DatasetName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetName {
    type Err = SodbError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        validate_path_segment(value)?;
        Ok(Self(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExperimentName(String);

impl ExperimentName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> String {
        format!("{}.{DATA_FILE_EXT}", self.0)
    }
}

impl fmt::Display for ExperimentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExperimentName {
    type Err = SodbError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        validate_path_segment(value)?;
        Ok(Self(value.to_string()))
    }
}

/// Names end up as a directory or file name under the storage root and as a
/// URL path segment, so they must stay a single segment.
fn validate_path_segment(value: &str) -> Result<(), SodbError> {
    let is_valid = !value.is_empty()
        && value != "."
        && value != ".."
        && !value
            .chars()
            .any(|ch| ch == '/' || ch == '\\' || ch.is_control());
    if !is_valid {
        return Err(SodbError::InvalidName(value.to_string()));
    }
    Ok(())
}
