//! Dataset catalog: discovers CSV files under a directory and registers
//! each as a [`Dataset`] with its inferred Arrow schema.
//!
//! Backed by an [`IndexMap`] (not a hash map) specifically so that
//! iteration order matches insertion order, which in turn matches
//! directory-scan order — required so `ListFlights` is deterministic.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use arrow_schema::Schema;
use indexmap::IndexMap;
use tracing::{info, warn};

use crate::config::CsvSourceConfig;
use crate::csv_source::{AdapterEvent, CsvSource};
use crate::schema_inference::{generate_arrow_schema, normalize_schema};

/// Metadata about a registered dataset.
#[derive(Debug, Clone)]
pub struct DatasetMetadata {
    /// Total row count, if known; `-1` until a full scan is performed.
    pub total_records: i64,
    /// Size of the backing source in bytes, if known.
    pub total_bytes: i64,
    /// Creation time of the backing source, if known.
    pub created: Option<SystemTime>,
    /// Source kind, e.g. `"csv"`.
    pub source_type: String,
}

/// A single catalog entry.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Unique id within the catalog (the file's base name, no extension).
    pub id: String,
    /// Absolute path to the backing CSV file.
    pub source_locator: PathBuf,
    /// Arrow schema inferred at registration time.
    pub arrow_schema: Arc<Schema>,
    /// Metadata about the dataset.
    pub metadata: DatasetMetadata,
}

/// Discovers and holds dataset entries for a single directory of CSV
/// files.
pub struct DatasetCatalog {
    data_directory: PathBuf,
    csv_config: CsvSourceConfig,
    datasets: IndexMap<String, Dataset>,
    initialized: bool,
}

impl DatasetCatalog {
    /// Creates an empty, uninitialized catalog over `data_directory`.
    #[must_use]
    pub fn new(data_directory: PathBuf, csv_config: CsvSourceConfig) -> Self {
        Self {
            data_directory,
            csv_config,
            datasets: IndexMap::new(),
            initialized: false,
        }
    }

    /// Scans the data directory and registers one dataset per `.csv`
    /// file found, in directory-scan order. Idempotent: calling this
    /// again after a successful initialize is a no-op. A missing
    /// directory logs a warning and leaves the catalog empty rather than
    /// failing.
    pub async fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.datasets = Self::scan(&self.data_directory, &self.csv_config).await;
        self.initialized = true;
        info!(count = self.datasets.len(), "catalog initialized");
    }

    /// Re-scans the data directory and replaces the catalog contents
    /// with the result, regardless of prior initialization state.
    pub async fn refresh(&mut self) {
        self.datasets = Self::scan(&self.data_directory, &self.csv_config).await;
        self.initialized = true;
        info!(count = self.datasets.len(), "catalog refreshed");
    }

    async fn scan(data_directory: &PathBuf, csv_config: &CsvSourceConfig) -> IndexMap<String, Dataset> {
        let mut entries = IndexMap::new();

        let mut read_dir = match tokio::fs::read_dir(data_directory).await {
            Ok(rd) => rd,
            Err(e) => {
                warn!(dir = %data_directory.display(), error = %e, "data directory unavailable; catalog will be empty");
                return entries;
            }
        };

        let mut paths = Vec::new();
        loop {
            match read_dir.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) == Some("csv") {
                        paths.push(path);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "error while scanning data directory");
                    break;
                }
            }
        }
        paths.sort();

        for path in paths {
            match Self::register_file(&path, csv_config).await {
                Some(dataset) => {
                    entries.insert(dataset.id.clone(), dataset);
                }
                None => {
                    warn!(path = %path.display(), "skipping file that failed schema inference");
                }
            }
        }

        entries
    }

    async fn register_file(path: &PathBuf, csv_config: &CsvSourceConfig) -> Option<Dataset> {
        let id = path.file_stem()?.to_str()?.to_string();

        let mut probe_config = csv_config.clone();
        probe_config.batch_size = 1;
        let mut source = CsvSource::new(path.clone(), probe_config);
        let mut rx = source.start();

        // First-observed-wins: take whichever of Schema/Error arrives
        // first, then stop the adapter regardless of outcome.
        let outcome = rx.recv().await;
        source.stop();
        while rx.recv().await.is_some() {
            // Drain remaining events so the background task exits cleanly.
        }

        let logical_schema = match outcome {
            Some(AdapterEvent::Schema(schema)) => schema,
            Some(AdapterEvent::Error(e)) => {
                warn!(path = %path.display(), error = %e, "schema inference failed");
                return None;
            }
            _ => return None,
        };

        let normalized = normalize_schema(&logical_schema);
        let arrow_schema = generate_arrow_schema(&normalized);

        let file_meta = tokio::fs::metadata(path).await.ok();
        let total_bytes = file_meta.as_ref().map_or(-1, |m| m.len() as i64);
        let created = file_meta.and_then(|m| m.created().ok());

        Some(Dataset {
            id,
            source_locator: path.clone(),
            arrow_schema,
            metadata: DatasetMetadata {
                total_records: -1,
                total_bytes,
                created,
                source_type: "csv".to_string(),
            },
        })
    }

    /// Looks up a dataset by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Dataset> {
        self.datasets.get(id)
    }

    /// Returns whether a dataset with the given id is registered.
    #[must_use]
    pub fn has(&self, id: &str) -> bool {
        self.datasets.contains_key(id)
    }

    /// Returns dataset ids in catalog insertion (directory-scan) order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    /// Returns all datasets in catalog insertion (directory-scan) order.
    pub fn all(&self) -> impl Iterator<Item = &Dataset> {
        self.datasets.values()
    }

    /// Number of registered datasets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    /// Whether the catalog has no registered datasets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn write_csv(dir: &std::path::Path, name: &str, contents: &str) {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn initialize_registers_csv_files_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "b_dataset.csv", "x\n1\n2\n").await;
        write_csv(dir.path(), "a_dataset.csv", "y\n3\n4\n").await;

        let mut catalog = DatasetCatalog::new(dir.path().to_path_buf(), CsvSourceConfig::default());
        catalog.initialize().await;

        let ids: Vec<&str> = catalog.ids().collect();
        assert_eq!(ids, vec!["a_dataset", "b_dataset"]);
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "one.csv", "x\n1\n").await;

        let mut catalog = DatasetCatalog::new(dir.path().to_path_buf(), CsvSourceConfig::default());
        catalog.initialize().await;
        assert_eq!(catalog.len(), 1);

        write_csv(dir.path(), "two.csv", "y\n2\n").await;
        catalog.initialize().await;
        assert_eq!(catalog.len(), 1, "second initialize must be a no-op");
    }

    #[tokio::test]
    async fn refresh_picks_up_new_files() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "one.csv", "x\n1\n").await;

        let mut catalog = DatasetCatalog::new(dir.path().to_path_buf(), CsvSourceConfig::default());
        catalog.initialize().await;
        assert_eq!(catalog.len(), 1);

        write_csv(dir.path(), "two.csv", "y\n2\n").await;
        catalog.refresh().await;
        assert_eq!(catalog.len(), 2);
    }

    #[tokio::test]
    async fn missing_directory_yields_empty_catalog() {
        let mut catalog = DatasetCatalog::new(
            PathBuf::from("/nonexistent/missing-dir"),
            CsvSourceConfig::default(),
        );
        catalog.initialize().await;
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn get_and_has_reflect_registered_ids() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "sample.csv", "name\nJohn\n").await;

        let mut catalog = DatasetCatalog::new(dir.path().to_path_buf(), CsvSourceConfig::default());
        catalog.initialize().await;

        assert!(catalog.has("sample"));
        assert!(catalog.get("sample").is_some());
        assert!(!catalog.has("missing"));
    }
}
