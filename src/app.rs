use std::collections::{BTreeMap, BTreeSet};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::config::ClientConfig;
use crate::domain::{DatasetName, ExperimentName};
use crate::download::{Fetcher, HttpFetcher, http_client};
use crate::error::SodbError;
use crate::manifest::{Manifest, ManifestHttpSource, ManifestSource};
use crate::reader::{DataReader, H5adReader};
use crate::store::{CacheAction, Resolved, Store};

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Phase { message: String },
    DownloadStarted { url: String, total: Option<u64> },
    DownloadAdvanced { bytes: u64 },
    DownloadFinished,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Result of reading one experiment. `Evicted` carries the read error of a
/// cached file that was removed so the next load downloads it again.
#[derive(Debug)]
pub enum LoadOutcome<T> {
    Loaded(T),
    Evicted(SodbError),
}

impl<T> LoadOutcome<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            LoadOutcome::Loaded(value) => Some(value),
            LoadOutcome::Evicted(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchItemResult {
    pub dataset: String,
    pub experiment: String,
    pub action: CacheAction,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub items: Vec<FetchItemResult>,
}

pub struct Catalog<F: Fetcher, D: DataReader> {
    config: ClientConfig,
    manifest: Manifest,
    store: Store,
    fetcher: F,
    reader: D,
}

impl Catalog<HttpFetcher, H5adReader> {
    /// Connects to the configured server and loads its manifest.
    pub fn connect_http(config: ClientConfig) -> Result<Self, SodbError> {
        let client = http_client(config.timeout)?;
        let source = ManifestHttpSource::new(client.clone(), &config.server_address);
        Self::connect(config, &source, HttpFetcher::new(client), H5adReader)
    }
}

impl<F: Fetcher, D: DataReader> Catalog<F, D> {
    /// Fails when the manifest cannot be loaded; a catalog always holds one.
    pub fn connect(
        config: ClientConfig,
        source: &dyn ManifestSource,
        fetcher: F,
        reader: D,
    ) -> Result<Self, SodbError> {
        let manifest = source.fetch_manifest()?;
        if manifest.is_empty() {
            return Err(SodbError::ManifestEmpty);
        }
        Ok(Self::with_manifest(config, manifest, fetcher, reader))
    }

    pub fn with_manifest(
        config: ClientConfig,
        manifest: Manifest,
        fetcher: F,
        reader: D,
    ) -> Self {
        let store = Store::new_with_root(config.storage_root.clone());
        Self {
            config,
            manifest,
            store,
            fetcher,
            reader,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn list_dataset(&self) -> BTreeSet<String> {
        self.manifest.list_datasets()
    }

    pub fn list_dataset_by_category(
        &self,
        category: &str,
    ) -> Result<BTreeSet<String>, SodbError> {
        self.manifest.list_datasets_by_category(category)
    }

    pub fn list_experiment_by_dataset(
        &self,
        dataset_name: &str,
    ) -> Result<Vec<String>, SodbError> {
        self.manifest.list_experiments(dataset_name)
    }

    pub fn experiment_path(
        &self,
        dataset_name: &str,
        experiment_name: &str,
    ) -> Result<Utf8PathBuf, SodbError> {
        let (dataset, experiment) = self.validate(dataset_name, experiment_name)?;
        Ok(self.store.experiment_path(&dataset, &experiment))
    }

    pub fn is_cached(&self, dataset_name: &str, experiment_name: &str) -> Result<bool, SodbError> {
        let (dataset, experiment) = self.validate(dataset_name, experiment_name)?;
        Ok(self.store.is_cached(&dataset, &experiment))
    }

    /// Makes sure the experiment file is in the cache without reading it.
    pub fn fetch_experiment(
        &self,
        dataset_name: &str,
        experiment_name: &str,
        sink: &dyn ProgressSink,
    ) -> Result<Resolved, SodbError> {
        let (dataset, experiment) = self.validate(dataset_name, experiment_name)?;
        sink.event(phase(format!(
            "phase=Resolve; experiment[{experiment}] in dataset[{dataset}]"
        )));
        self.store.ensure_fetched(&dataset, &experiment, |destination| {
            let url = self.config.download_url(dataset.as_str(), experiment.as_str())?;
            tracing::info!("download experiment[{experiment}] in dataset[{dataset}]");
            sink.event(phase("phase=Download; fetching from server".to_string()));
            self.fetcher.fetch(&url, destination, None, sink)
        })
    }

    pub fn load_experiment_outcome(
        &self,
        dataset_name: &str,
        experiment_name: &str,
        sink: &dyn ProgressSink,
    ) -> Result<LoadOutcome<D::Object>, SodbError> {
        let resolved = self.fetch_experiment(dataset_name, experiment_name, sink)?;
        tracing::info!("load experiment[{experiment_name}] in dataset[{dataset_name}]");
        sink.event(phase(format!("phase=Load; reading {}", resolved.path)));
        match self.reader.read(&resolved.path) {
            Ok(object) => Ok(LoadOutcome::Loaded(object)),
            Err(err) => {
                tracing::warn!(
                    path = %resolved.path,
                    error = %err,
                    "failed to load experiment[{experiment_name}] in dataset[{dataset_name}], please try again later"
                );
                Store::evict(&resolved.path)?;
                Ok(LoadOutcome::Evicted(err))
            }
        }
    }

    /// `None` means the cached file could not be read and was removed; calling
    /// again downloads it afresh.
    pub fn load_experiment(
        &self,
        dataset_name: &str,
        experiment_name: &str,
        sink: &dyn ProgressSink,
    ) -> Result<Option<D::Object>, SodbError> {
        self.load_experiment_outcome(dataset_name, experiment_name, sink)
            .map(LoadOutcome::into_option)
    }

    /// Loads every experiment of a dataset one after another.
    pub fn load_dataset(
        &self,
        dataset_name: &str,
        sink: &dyn ProgressSink,
    ) -> Result<BTreeMap<String, Option<D::Object>>, SodbError> {
        let experiments = self.manifest.list_experiments(dataset_name)?;
        let mut loaded = BTreeMap::new();
        for experiment in experiments {
            if loaded.contains_key(&experiment) {
                continue;
            }
            let object = self.load_experiment(dataset_name, &experiment, sink)?;
            loaded.insert(experiment, object);
        }
        Ok(loaded)
    }

    /// Fetches one experiment, or every experiment of the dataset when
    /// `experiment_name` is `None`, without reading the files.
    pub fn fetch(
        &self,
        dataset_name: &str,
        experiment_name: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, SodbError> {
        let experiments = match experiment_name {
            Some(experiment) => vec![experiment.to_string()],
            None => self.manifest.list_experiments(dataset_name)?,
        };
        let mut items = Vec::new();
        for experiment in experiments {
            if items
                .iter()
                .any(|item: &FetchItemResult| item.experiment == experiment)
            {
                continue;
            }
            let resolved = self.fetch_experiment(dataset_name, &experiment, sink)?;
            items.push(FetchItemResult {
                dataset: dataset_name.to_string(),
                experiment,
                action: resolved.action,
                path: resolved.path.to_string(),
            });
        }
        Ok(FetchResult { items })
    }

    /// Checks the pair against the manifest, then against path rules. Nothing
    /// touches disk or network before this passes.
    fn validate(
        &self,
        dataset_name: &str,
        experiment_name: &str,
    ) -> Result<(DatasetName, ExperimentName), SodbError> {
        if !self.manifest.contains_dataset(dataset_name) {
            return Err(SodbError::UnknownDataset(dataset_name.to_string()));
        }
        if !self
            .manifest
            .contains_experiment(dataset_name, experiment_name)
        {
            return Err(SodbError::UnknownExperiment {
                dataset: dataset_name.to_string(),
                experiment: experiment_name.to_string(),
            });
        }
        Ok((dataset_name.parse()?, experiment_name.parse()?))
    }
}

fn phase(message: String) -> ProgressEvent {
    ProgressEvent::Phase { message }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use assert_matches::assert_matches;
    use camino::Utf8Path;

    use super::*;
    use crate::domain::ManifestEntry;
    use crate::output::NoProgress;

    struct StaticSource(Manifest);

    impl ManifestSource for StaticSource {
        fn fetch_manifest(&self) -> Result<Manifest, SodbError> {
            Ok(self.0.clone())
        }
    }

    struct UnreachableSource;

    impl ManifestSource for UnreachableSource {
        fn fetch_manifest(&self) -> Result<Manifest, SodbError> {
            Err(SodbError::ManifestUnavailable("connection refused".to_string()))
        }
    }

    #[derive(Default)]
    struct MockFetcher {
        urls: RefCell<Vec<String>>,
    }

    impl Fetcher for MockFetcher {
        fn fetch(
            &self,
            url: &str,
            destination: &Utf8Path,
            _expected_hash_prefix: Option<&str>,
            _sink: &dyn ProgressSink,
        ) -> Result<(), SodbError> {
            self.urls.borrow_mut().push(url.to_string());
            std::fs::write(destination.as_std_path(), b"ok")
                .map_err(|err| SodbError::Filesystem(err.to_string()))
        }
    }

    struct ByteReader;

    impl DataReader for ByteReader {
        type Object = Vec<u8>;

        fn read(&self, path: &Utf8Path) -> Result<Vec<u8>, SodbError> {
            let bytes = std::fs::read(path.as_std_path())
                .map_err(|err| SodbError::Parse(err.to_string()))?;
            if bytes != b"ok" {
                return Err(SodbError::Parse("unexpected content".to_string()));
            }
            Ok(bytes)
        }
    }

    fn entry(category: &str, dataset: &str, experiment: &str) -> ManifestEntry {
        ManifestEntry {
            biotech_category: category.to_string(),
            dataset_name: dataset.to_string(),
            experiment_name: experiment.to_string(),
        }
    }

    fn catalog(root: &Utf8Path) -> Catalog<MockFetcher, ByteReader> {
        let manifest = Manifest::new(vec![
            entry("Spatial Transcriptomics", "liu2020high", "E10"),
            entry("Spatial Transcriptomics", "liu2020high", "E11"),
            entry("Spatial Proteomics", "bad", "a/b"),
        ]);
        let config = ClientConfig::new(root.to_path_buf(), "http://sodb.test/api");
        Catalog::connect(
            config,
            &StaticSource(manifest),
            MockFetcher::default(),
            ByteReader,
        )
        .unwrap()
    }

    fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).unwrap();
        (temp, root)
    }

    #[test]
    fn connect_propagates_manifest_failure() {
        let config = ClientConfig::new(Utf8PathBuf::from("/tmp/sodb"), "http://sodb.test");
        let result =
            Catalog::connect(config, &UnreachableSource, MockFetcher::default(), ByteReader);
        assert_matches!(result.err(), Some(SodbError::ManifestUnavailable(_)));
    }

    #[test]
    fn connect_rejects_empty_manifest() {
        let config = ClientConfig::new(Utf8PathBuf::from("/tmp/sodb"), "http://sodb.test");
        let result = Catalog::connect(
            config,
            &StaticSource(Manifest::default()),
            MockFetcher::default(),
            ByteReader,
        );
        assert_matches!(result.err(), Some(SodbError::ManifestEmpty));
    }

    #[test]
    fn load_builds_download_url() {
        let (_temp, root) = temp_root();
        let catalog = catalog(&root);

        let loaded = catalog
            .load_experiment("liu2020high", "E10", &NoProgress)
            .unwrap();

        assert_eq!(loaded, Some(b"ok".to_vec()));
        assert_eq!(
            catalog.fetcher.urls.borrow().as_slice(),
            ["http://sodb.test/api/download/liu2020high/E10".to_string()]
        );
        assert!(root.join("liu2020high").join("E10.h5ad").as_std_path().is_file());
    }

    #[test]
    fn unknown_identifiers_never_touch_disk() {
        let (_temp, root) = temp_root();
        let catalog = catalog(&root);

        let err = catalog
            .load_experiment("missing", "E10", &NoProgress)
            .unwrap_err();
        assert_matches!(err, SodbError::UnknownDataset(_));

        let err = catalog
            .load_experiment("liu2020high", "E99", &NoProgress)
            .unwrap_err();
        assert_matches!(err, SodbError::UnknownExperiment { .. });

        assert!(!root.as_std_path().exists());
        assert!(catalog.fetcher.urls.borrow().is_empty());
    }

    #[test]
    fn manifest_names_with_separators_are_refused() {
        let (_temp, root) = temp_root();
        let catalog = catalog(&root);

        let err = catalog.load_experiment("bad", "a/b", &NoProgress).unwrap_err();

        assert_matches!(err, SodbError::InvalidName(_));
        assert!(!root.as_std_path().exists());
    }

    #[test]
    fn corrupt_cache_entry_is_evicted_with_reason() {
        let (_temp, root) = temp_root();
        let catalog = catalog(&root);
        let path = catalog.experiment_path("liu2020high", "E11").unwrap();
        std::fs::create_dir_all(path.parent().unwrap().as_std_path()).unwrap();
        std::fs::write(path.as_std_path(), b"garbage").unwrap();

        let outcome = catalog
            .load_experiment_outcome("liu2020high", "E11", &NoProgress)
            .unwrap();

        assert_matches!(outcome, LoadOutcome::Evicted(SodbError::Parse(_)));
        assert!(!path.as_std_path().exists());
        assert!(catalog.fetcher.urls.borrow().is_empty());
    }
}
