//! CSV source adapter: streams rows out of a CSV file as batched,
//! schema-tagged events.
//!
//! Replaces a named-listener ("on schema", "on batch", ...) interface
//! with a channel carrying a sum type, per the guidance that an adapter
//! is really a lazy, cancellable producer of a small number of distinct
//! event kinds.

use std::path::PathBuf;

use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::CsvSourceConfig;
use crate::schema_inference::{infer_schema, SchemaInferenceOptions};
use crate::types::LogicalType;

/// One row that failed to parse, paired with its zero-based index
/// (excluding the header row) and an error message.
#[derive(Debug, Clone)]
pub struct RowError {
    /// Index of the offending row.
    pub row: usize,
    /// Human-readable description of the failure.
    pub error: String,
}

/// Events emitted by a running [`CsvSource`].
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    /// The inferred per-column schema, derived from the header row and
    /// schema-inference sampling. Emitted exactly once, before any
    /// `Batch` event.
    Schema(IndexMap<String, LogicalType>),
    /// A batch of raw rows, one `Vec<Option<String>>` per row, each cell
    /// in column order matching `Schema`.
    Batch(Vec<Vec<Option<String>>>),
    /// A single row failed to tokenize or coerce; processing continues.
    RowError(RowError),
    /// End of input reached; carries the total row count observed.
    End { total_rows: usize },
    /// An unrecoverable error occurred; no further events follow.
    Error(String),
}

/// A running or stopped CSV source adapter.
pub struct CsvSource {
    path: PathBuf,
    config: CsvSourceConfig,
    stop_tx: Option<tokio::sync::watch::Sender<bool>>,
}

impl CsvSource {
    /// Creates an adapter over the CSV file at `path` with the given
    /// configuration. Does not open the file until [`CsvSource::start`]
    /// is called.
    #[must_use]
    pub fn new(path: PathBuf, config: CsvSourceConfig) -> Self {
        Self {
            path,
            config,
            stop_tx: None,
        }
    }

    /// Starts reading the CSV file, returning a channel of
    /// [`AdapterEvent`]s. The first event (if any) is always `Schema`;
    /// it is followed by zero or more `Batch`/`RowError` events, and
    /// terminated by exactly one of `End` or `Error`.
    pub fn start(&mut self) -> mpsc::Receiver<AdapterEvent> {
        let (tx, rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
        self.stop_tx = Some(stop_tx);

        let path = self.path.clone();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || run_reader(&path, &config, &tx, &stop_rx));

        rx
    }

    /// Signals the background reader to stop at the next row boundary.
    /// Idempotent; has no effect if the adapter was never started or has
    /// already finished.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(true);
        }
    }
}

fn run_reader(
    path: &PathBuf,
    config: &CsvSourceConfig,
    tx: &mpsc::Sender<AdapterEvent>,
    stop_rx: &tokio::sync::watch::Receiver<bool>,
) {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) => {
            let _ = tx.blocking_send(AdapterEvent::Error(format!("failed to open {path:?}: {e}")));
            return;
        }
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter)
        .has_headers(config.headers)
        .flexible(true)
        .from_reader(file);

    let headers: Vec<String> = if config.headers {
        match reader.headers() {
            Ok(h) => h.iter().map(str::to_string).collect(),
            Err(e) => {
                let _ = tx.blocking_send(AdapterEvent::Error(format!("failed to read header row: {e}")));
                return;
            }
        }
    } else {
        Vec::new()
    };

    // Sample up to `sample_size` rows to infer the schema before settling
    // on column names/types; buffer those rows so they are not lost.
    let inference_opts = SchemaInferenceOptions::default();
    let mut buffered_raw: Vec<Vec<Option<String>>> = Vec::new();
    let mut column_names: Vec<String> = headers.clone();

    let mut records = reader.records();
    let sample_target = inference_opts.sample_size.min(1_000);

    for record in records.by_ref().take(sample_target) {
        match record {
            Ok(rec) => {
                if config.skip_empty_lines && rec.iter().all(str::is_empty) {
                    continue;
                }
                if column_names.is_empty() {
                    column_names = (0..rec.len()).map(|i| format!("column_{i}")).collect();
                }
                let raw_row: Vec<Option<String>> = column_names
                    .iter()
                    .enumerate()
                    .map(|(i, _)| rec.get(i).map(str::to_string))
                    .collect();
                buffered_raw.push(raw_row);
            }
            Err(e) => {
                warn!(error = %e, "row failed to tokenize during schema sampling");
            }
        }
    }

    let schema = infer_schema(&column_names, &buffered_raw, &inference_opts);
    if tx.blocking_send(AdapterEvent::Schema(schema)).is_err() {
        return;
    }

    let mut total_rows = 0usize;
    let mut current_batch: Vec<Vec<Option<String>>> = Vec::new();

    for raw_row in buffered_raw.drain(..) {
        if *stop_rx.borrow() {
            return;
        }
        current_batch.push(raw_row);
        total_rows += 1;
        if current_batch.len() >= config.batch_size {
            let batch = std::mem::take(&mut current_batch);
            if tx.blocking_send(AdapterEvent::Batch(batch)).is_err() {
                return;
            }
        }
    }

    for (idx, record) in records.enumerate() {
        if *stop_rx.borrow() {
            return;
        }
        let row_index = idx + total_rows;
        match record {
            Ok(rec) => {
                if config.skip_empty_lines && rec.iter().all(str::is_empty) {
                    continue;
                }
                let raw_row: Vec<Option<String>> = column_names
                    .iter()
                    .enumerate()
                    .map(|(i, _)| rec.get(i).map(str::to_string))
                    .collect();
                current_batch.push(raw_row);
                total_rows += 1;
                if current_batch.len() >= config.batch_size {
                    let batch = std::mem::take(&mut current_batch);
                    if tx.blocking_send(AdapterEvent::Batch(batch)).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                let _ = tx.blocking_send(AdapterEvent::RowError(RowError {
                    row: row_index,
                    error: e.to_string(),
                }));
            }
        }
    }

    if !current_batch.is_empty() {
        let _ = tx.blocking_send(AdapterEvent::Batch(current_batch));
    }

    let _ = tx.blocking_send(AdapterEvent::End { total_rows });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    async fn collect_events(rx: &mut mpsc::Receiver<AdapterEvent>) -> Vec<AdapterEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            let done = matches!(event, AdapterEvent::End { .. } | AdapterEvent::Error(_));
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn reads_sample_csv_and_emits_schema_then_batches() {
        let file = write_csv("name,age,city\nJohn,25,New York\nJane,30,Los Angeles\nBob,35,Chicago\n");
        let mut source = CsvSource::new(file.path().to_path_buf(), CsvSourceConfig::default());
        let mut rx = source.start();
        let events = collect_events(&mut rx).await;

        assert!(matches!(events.first(), Some(AdapterEvent::Schema(_))));
        let total_rows: usize = events
            .iter()
            .filter_map(|e| match e {
                AdapterEvent::Batch(rows) => Some(rows.len()),
                _ => None,
            })
            .sum();
        assert_eq!(total_rows, 3);
        assert!(matches!(events.last(), Some(AdapterEvent::End { total_rows: 3 })));
    }

    #[tokio::test]
    async fn batches_respect_configured_batch_size() {
        let file = write_csv("a,b\n1,x\n2,y\n3,z\n4,w\n5,v\n");
        let config = CsvSourceConfig {
            batch_size: 2,
            ..CsvSourceConfig::default()
        };
        let mut source = CsvSource::new(file.path().to_path_buf(), config);
        let mut rx = source.start();
        let events = collect_events(&mut rx).await;

        let batch_sizes: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                AdapterEvent::Batch(rows) => Some(rows.len()),
                _ => None,
            })
            .collect();
        assert_eq!(batch_sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn missing_file_emits_error() {
        let mut source = CsvSource::new(
            PathBuf::from("/nonexistent/does-not-exist.csv"),
            CsvSourceConfig::default(),
        );
        let mut rx = source.start();
        let events = collect_events(&mut rx).await;
        assert!(matches!(events.last(), Some(AdapterEvent::Error(_))));
    }
}
