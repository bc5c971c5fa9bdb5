use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::SodbError;
use crate::store::Store;

pub const DEFAULT_SERVER_ADDRESS: &str = "https://gene.ai.tencent.com/SpatialOmics/api/pysodb";
pub const CONFIG_FILE_NAME: &str = "sodb.json";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub storage_root: Option<Utf8PathBuf>,
    #[serde(default)]
    pub server_address: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub progress: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub storage_root: Utf8PathBuf,
    pub server_address: String,
    pub timeout: Option<Duration>,
    pub progress: bool,
}

impl ClientConfig {
    pub fn new(storage_root: Utf8PathBuf, server_address: &str) -> Self {
        Self {
            storage_root,
            server_address: server_address.trim_end_matches('/').to_string(),
            timeout: None,
            progress: true,
        }
    }

    pub fn download_url(&self, dataset: &str, experiment: &str) -> Result<String, SodbError> {
        let mut url = reqwest::Url::parse(&format!("{}/download", self.server_address))
            .map_err(|err| SodbError::Download(format!("invalid server address: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| {
                SodbError::Download(format!(
                    "invalid server address: {}",
                    self.server_address
                ))
            })?
            .push(dataset)
            .push(experiment);
        Ok(url.to_string())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `./sodb.json` when no path is given. Only an explicit
    /// path has to exist.
    pub fn resolve(path: Option<&str>) -> Result<ClientConfig, SodbError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE_NAME),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| SodbError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| SodbError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ClientConfig, SodbError> {
        let storage_root = match config.storage_root {
            Some(root) => root,
            None => Store::default_root()?,
        };
        let server_address = config
            .server_address
            .unwrap_or_else(|| DEFAULT_SERVER_ADDRESS.to_string());

        let mut resolved = ClientConfig::new(storage_root, &server_address);
        resolved.timeout = config.timeout_secs.map(Duration::from_secs);
        resolved.progress = config.progress.unwrap_or(true);
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config_defaults() {
        let config = Config {
            storage_root: Some(Utf8PathBuf::from("/tmp/sodb")),
            ..Config::default()
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.server_address, DEFAULT_SERVER_ADDRESS);
        assert_eq!(resolved.storage_root, Utf8PathBuf::from("/tmp/sodb"));
        assert!(resolved.timeout.is_none());
        assert!(resolved.progress);
    }

    #[test]
    fn download_url_encodes_segments() {
        let config =
            ClientConfig::new(Utf8PathBuf::from("/tmp/sodb"), "http://localhost:8080/api/");
        let url = config
            .download_url("parigi2022the", "GSM5213483_V19S23-097_A1_S1 ")
            .unwrap();
        assert_eq!(
            url,
            "http://localhost:8080/api/download/parigi2022the/GSM5213483_V19S23-097_A1_S1%20"
        );
    }
}
