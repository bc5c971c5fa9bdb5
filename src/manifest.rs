use std::collections::BTreeSet;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::ManifestEntry;
use crate::error::SodbError;

/// Fetches the remote manifest once, at catalog construction.
pub trait ManifestSource {
    fn fetch_manifest(&self) -> Result<Manifest, SodbError>;
}

#[derive(Clone)]
pub struct ManifestHttpSource {
    client: Client,
    server_address: String,
}

impl ManifestHttpSource {
    pub fn new(client: Client, server_address: &str) -> Self {
        Self {
            client,
            server_address: server_address.trim_end_matches('/').to_string(),
        }
    }

    pub fn info_url(&self) -> String {
        format!("{}/info", self.server_address)
    }
}

impl ManifestSource for ManifestHttpSource {
    fn fetch_manifest(&self) -> Result<Manifest, SodbError> {
        let url = self.info_url();
        tracing::debug!(%url, "requesting manifest");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| SodbError::ManifestUnavailable(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "manifest request failed".to_string());
            return Err(SodbError::ManifestStatus { status, message });
        }
        let body = response
            .bytes()
            .map_err(|err| SodbError::ManifestUnavailable(err.to_string()))?;
        let manifest = Manifest::from_info_json(&body)?;
        tracing::debug!(entries = manifest.len(), "manifest loaded");
        Ok(manifest)
    }
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    code: i64,
    #[serde(default)]
    data: Vec<Vec<Value>>,
}

/// Immutable index of every (category, dataset, experiment) row published by
/// the server, in the order the server sent them.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    /// Parses the body of `GET /info`: `{"code": 0, "data": [[category, dataset, experiment], ...]}`.
    pub fn from_info_json(body: &[u8]) -> Result<Self, SodbError> {
        let response: InfoResponse = serde_json::from_slice(body)
            .map_err(|err| SodbError::ManifestMalformed(err.to_string()))?;
        if response.code != 0 {
            return Err(SodbError::ManifestMalformed(format!(
                "server reported code {}",
                response.code
            )));
        }
        if response.data.is_empty() {
            return Err(SodbError::ManifestEmpty);
        }

        let entries = response
            .data
            .into_iter()
            .enumerate()
            .map(|(index, row)| parse_row(index, row))
            .collect::<Result<Vec<_>, SodbError>>()?;
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn list_datasets(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .map(|entry| entry.dataset_name.clone())
            .collect()
    }

    pub fn categories(&self) -> BTreeSet<&str> {
        self.entries
            .iter()
            .map(|entry| entry.biotech_category.as_str())
            .collect()
    }

    pub fn list_datasets_by_category(&self, category: &str) -> Result<BTreeSet<String>, SodbError> {
        if !self.categories().contains(category) {
            return Err(SodbError::UnknownCategory(category.to_string()));
        }
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.biotech_category == category)
            .map(|entry| entry.dataset_name.clone())
            .collect())
    }

    /// Experiment names of a dataset in manifest order, duplicates included.
    pub fn list_experiments(&self, dataset_name: &str) -> Result<Vec<String>, SodbError> {
        let experiments = self
            .entries
            .iter()
            .filter(|entry| entry.dataset_name == dataset_name)
            .map(|entry| entry.experiment_name.clone())
            .collect::<Vec<_>>();
        if experiments.is_empty() {
            return Err(SodbError::UnknownDataset(dataset_name.to_string()));
        }
        Ok(experiments)
    }

    pub fn contains_dataset(&self, dataset_name: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.dataset_name == dataset_name)
    }

    pub fn contains_experiment(&self, dataset_name: &str, experiment_name: &str) -> bool {
        self.entries.iter().any(|entry| {
            entry.dataset_name == dataset_name && entry.experiment_name == experiment_name
        })
    }
}

fn parse_row(index: usize, row: Vec<Value>) -> Result<ManifestEntry, SodbError> {
    let malformed = || {
        SodbError::ManifestMalformed(format!(
            "row {index} is not [category, dataset, experiment]"
        ))
    };
    let mut fields = Vec::with_capacity(3);
    for value in row.into_iter().take(3) {
        match value {
            Value::String(text) => fields.push(text),
            Value::Number(number) => fields.push(number.to_string()),
            _ => return Err(malformed()),
        }
    }
    let [biotech_category, dataset_name, experiment_name]: [String; 3] =
        fields.try_into().map_err(|_| malformed())?;
    Ok(ManifestEntry {
        biotech_category,
        dataset_name,
        experiment_name,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn sample() -> Manifest {
        Manifest::from_info_json(
            br#"{"code": 0, "data": [
                ["Spatial Transcriptomics", "liu2020high", "E10"],
                ["Spatial Transcriptomics", "liu2020high", "E11"],
                ["Spatial Proteomics", "chen2021dissecting", "GSM4202309_0719aL_protein"],
                ["Spatial Transcriptomics", "liu2020high", "E10"]
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn parse_info_rows_in_order() {
        let manifest = sample();
        assert_eq!(manifest.len(), 4);
        assert_eq!(manifest.entries()[2].dataset_name, "chen2021dissecting");
    }

    #[test]
    fn datasets_are_deduplicated() {
        let datasets = sample().list_datasets();
        assert_eq!(datasets.len(), 2);
        assert!(datasets.contains("liu2020high"));
    }

    #[test]
    fn experiments_keep_manifest_order_and_duplicates() {
        let experiments = sample().list_experiments("liu2020high").unwrap();
        assert_eq!(experiments, vec!["E10", "E11", "E10"]);
    }

    #[test]
    fn absent_category_is_an_error_not_an_empty_set() {
        let err = sample()
            .list_datasets_by_category("Spatial Genomics")
            .unwrap_err();
        assert_matches!(err, SodbError::UnknownCategory(ref value) if value == "Spatial Genomics");
    }

    #[test]
    fn nonzero_code_is_malformed() {
        let err = Manifest::from_info_json(br#"{"code": 1, "data": []}"#).unwrap_err();
        assert_matches!(err, SodbError::ManifestMalformed(_));
    }

    #[test]
    fn empty_data_is_reported() {
        let err = Manifest::from_info_json(br#"{"code": 0, "data": []}"#).unwrap_err();
        assert_matches!(err, SodbError::ManifestEmpty);
    }

    #[test]
    fn short_row_is_malformed() {
        let err = Manifest::from_info_json(br#"{"code": 0, "data": [["a", "b"]]}"#).unwrap_err();
        assert_matches!(err, SodbError::ManifestMalformed(_));
    }
}
