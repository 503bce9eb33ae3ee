//! Arrow Flight gRPC service implementation.
//!
//! Composes the dataset catalog, CSV source adapter, and Arrow builder to
//! answer every Flight RPC. Authentication is reduced to a handshake
//! stub (a pluggable hook point, not implemented here); `DoPut` and
//! `DoExchange`/`PollFlightInfo` remain unimplemented, matching the scope
//! of this transport core.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use arrow_flight::flight_service_server::FlightService;
use arrow_flight::{
    Action, ActionType, Criteria, Empty, FlightData, FlightDescriptor, FlightEndpoint, FlightInfo,
    HandshakeRequest, HandshakeResponse, Location, PollInfo, PutResult, SchemaResult, Ticket,
};
use futures::Stream;
use serde_json::json;
use tokio::sync::RwLock;
use tonic::{Request, Response, Status, Streaming};
use tracing::{info, warn};

use crate::arrow_builder::{self};
use crate::catalog::{Dataset, DatasetCatalog};
use crate::config::{CsvSourceConfig, ServerConfig};
use crate::csv_source::{AdapterEvent, CsvSource};
use crate::ticket::{decode_descriptor, decode_ticket, encode_ticket};
use crate::types::TypeOptions;

/// Reports the resident set size of the current process, in bytes.
///
/// Linux-only (reads `/proc/self/status`); returns `0` on any other
/// platform or if the read fails, rather than erroring — `get-server-info`
/// treats this as a best-effort diagnostic, not a guaranteed metric.
fn memory_usage_bytes() -> u64 {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| {
            status.lines().find_map(|line| {
                let rest = line.strip_prefix("VmRSS:")?;
                let kb: u64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
                Some(kb * 1024)
            })
        })
        .unwrap_or(0)
}

type BoxStream<T> = Pin<Box<dyn Stream<Item = std::result::Result<T, Status>> + Send + 'static>>;

/// Implements every Arrow Flight RPC against a [`DatasetCatalog`].
pub struct FlightServiceImpl {
    catalog: Arc<RwLock<DatasetCatalog>>,
    csv_config: CsvSourceConfig,
    server_config: ServerConfig,
    advertised_uri: String,
    started_at: Instant,
}

impl FlightServiceImpl {
    /// Creates a new service bound to `catalog`, advertising `advertised_uri`
    /// (e.g. `"grpc://127.0.0.1:8815"`) in returned endpoints. `server_config`
    /// supplies the host/port/data-directory reported by `get-server-info`.
    #[must_use]
    pub fn new(
        catalog: Arc<RwLock<DatasetCatalog>>,
        csv_config: CsvSourceConfig,
        server_config: ServerConfig,
        advertised_uri: String,
    ) -> Self {
        Self {
            catalog,
            csv_config,
            server_config,
            advertised_uri,
            started_at: Instant::now(),
        }
    }

    async fn flight_info_for(&self, dataset: &Dataset) -> std::result::Result<FlightInfo, Status> {
        let schema_bytes = arrow_builder::serialize_schema(&dataset.arrow_schema)
            .ok_or_else(|| Status::internal("failed to serialize schema"))?;

        let descriptor = FlightDescriptor {
            r#type: 1, // FlightDescriptor.DescriptorType.PATH
            cmd: Vec::new().into(),
            path: vec![dataset.id.clone()],
        };

        let endpoint = FlightEndpoint {
            ticket: Some(Ticket {
                ticket: encode_ticket(&dataset.id).into(),
            }),
            location: vec![Location {
                uri: self.advertised_uri.clone(),
            }],
            expiration_time: None,
            app_metadata: Vec::new().into(),
        };

        Ok(FlightInfo {
            schema: schema_bytes.into(),
            flight_descriptor: Some(descriptor),
            endpoint: vec![endpoint],
            total_records: dataset.metadata.total_records,
            total_bytes: dataset.metadata.total_bytes,
            ordered: false,
            app_metadata: Vec::new().into(),
        })
    }

    async fn lookup(&self, id: &str) -> std::result::Result<Dataset, Status> {
        let catalog = self.catalog.read().await;
        catalog
            .get(id)
            .cloned()
            .ok_or_else(|| Status::not_found(format!("unknown dataset: {id}")))
    }
}

fn transpose(rows: Vec<Vec<Option<String>>>, num_columns: usize) -> Vec<Vec<Option<String>>> {
    let mut columns: Vec<Vec<Option<String>>> = (0..num_columns).map(|_| Vec::with_capacity(rows.len())).collect();
    for row in rows {
        for (i, cell) in row.into_iter().enumerate() {
            if let Some(column) = columns.get_mut(i) {
                column.push(cell);
            }
        }
    }
    columns
}

fn stream_dataset_batches(
    dataset: Dataset,
    csv_config: CsvSourceConfig,
) -> BoxStream<FlightData> {
    let (tx, rx) = tokio::sync::mpsc::channel::<std::result::Result<FlightData, Status>>(4);

    tokio::spawn(async move {
        let mut source = CsvSource::new(dataset.source_locator.clone(), csv_config);
        let mut events = source.start();
        let num_columns = dataset.arrow_schema.fields().len();

        while let Some(event) = events.recv().await {
            match event {
                AdapterEvent::Schema(_) => {}
                AdapterEvent::Batch(rows) => {
                    let columns = transpose(rows, num_columns);
                    let Some(batch) =
                        arrow_builder::build_record_batch(&dataset.arrow_schema, &columns, &TypeOptions::default())
                    else {
                        warn!(dataset = %dataset.id, "skipping batch that failed to build");
                        continue;
                    };
                    let Some(ipc_bytes) = arrow_builder::serialize_record_batch(&batch) else {
                        warn!(dataset = %dataset.id, "skipping batch that failed to serialize");
                        continue;
                    };
                    let flight_data = FlightData {
                        flight_descriptor: None,
                        data_header: Vec::new().into(),
                        app_metadata: Vec::new().into(),
                        data_body: ipc_bytes.into(),
                    };
                    if tx.send(Ok(flight_data)).await.is_err() {
                        source.stop();
                        return;
                    }
                }
                AdapterEvent::RowError(e) => {
                    warn!(dataset = %dataset.id, row = e.row, error = %e.error, "row failed to coerce");
                }
                AdapterEvent::End { total_rows } => {
                    info!(dataset = %dataset.id, total_rows, "do_get stream complete");
                    break;
                }
                AdapterEvent::Error(e) => {
                    let _ = tx.send(Err(Status::internal(e))).await;
                    break;
                }
            }
        }
    });

    Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx))
}

#[tonic::async_trait]
impl FlightService for FlightServiceImpl {
    type HandshakeStream = BoxStream<HandshakeResponse>;
    type ListFlightsStream = BoxStream<FlightInfo>;
    type DoGetStream = BoxStream<FlightData>;
    type DoPutStream = BoxStream<PutResult>;
    type DoActionStream = BoxStream<arrow_flight::Result>;
    type ListActionsStream = BoxStream<ActionType>;
    type DoExchangeStream = BoxStream<FlightData>;

    async fn handshake(
        &self,
        request: Request<Streaming<HandshakeRequest>>,
    ) -> std::result::Result<Response<Self::HandshakeStream>, Status> {
        let mut inbound = request.into_inner();
        let first = inbound.message().await?;
        let protocol_version = first.map_or(1, |r| r.protocol_version);

        let response = HandshakeResponse {
            protocol_version,
            payload: b"handshake-ok".to_vec().into(),
        };
        info!("handshake completed");
        Ok(Response::new(Box::pin(futures::stream::once(async move {
            Ok(response)
        }))))
    }

    async fn list_flights(
        &self,
        _request: Request<Criteria>,
    ) -> std::result::Result<Response<Self::ListFlightsStream>, Status> {
        let catalog = self.catalog.read().await;
        let mut infos = Vec::with_capacity(catalog.len());
        for dataset in catalog.all() {
            infos.push(self.flight_info_for(dataset).await);
        }
        info!(count = infos.len(), "list_flights");
        Ok(Response::new(Box::pin(futures::stream::iter(infos))))
    }

    async fn get_flight_info(
        &self,
        request: Request<FlightDescriptor>,
    ) -> std::result::Result<Response<FlightInfo>, Status> {
        let descriptor = request.into_inner();
        let id = decode_descriptor(&descriptor.path, &descriptor.cmd)?;
        let dataset = self.lookup(&id).await?;
        let info = self.flight_info_for(&dataset).await?;
        Ok(Response::new(info))
    }

    async fn get_schema(
        &self,
        request: Request<FlightDescriptor>,
    ) -> std::result::Result<Response<SchemaResult>, Status> {
        let descriptor = request.into_inner();
        let id = decode_descriptor(&descriptor.path, &descriptor.cmd)?;
        let dataset = self.lookup(&id).await?;
        let schema_bytes = arrow_builder::serialize_schema(&dataset.arrow_schema)
            .ok_or_else(|| Status::internal("failed to serialize schema"))?;
        Ok(Response::new(SchemaResult {
            schema: schema_bytes.into(),
        }))
    }

    async fn do_get(
        &self,
        request: Request<Ticket>,
    ) -> std::result::Result<Response<Self::DoGetStream>, Status> {
        let ticket = request.into_inner();
        let id = decode_ticket(&ticket.ticket)?;
        let dataset = self.lookup(&id).await?;
        info!(dataset = %id, "do_get");
        let stream = stream_dataset_batches(dataset, self.csv_config.clone());
        Ok(Response::new(stream))
    }

    async fn do_put(
        &self,
        request: Request<Streaming<FlightData>>,
    ) -> std::result::Result<Response<Self::DoPutStream>, Status> {
        let mut inbound = request.into_inner();
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        tokio::spawn(async move {
            while let Ok(Some(_)) = inbound.message().await {
                if tx
                    .send(Ok(PutResult {
                        app_metadata: Vec::new().into(),
                    }))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
        Ok(Response::new(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx))))
    }

    async fn do_action(
        &self,
        request: Request<Action>,
    ) -> std::result::Result<Response<Self::DoActionStream>, Status> {
        let action = request.into_inner();
        info!(action = %action.r#type, "do_action");
        let body = match action.r#type.as_str() {
            "refresh-datasets" => {
                let mut catalog = self.catalog.write().await;
                catalog.refresh().await;
                let count = catalog.len();
                json!({
                    "success": true,
                    "message": format!("refreshed catalog: {count} dataset(s)"),
                    "count": count,
                })
            }
            "get-server-info" => {
                let catalog = self.catalog.read().await;
                let datasets: Vec<_> = catalog
                    .all()
                    .map(|d| {
                        json!({
                            "id": d.id,
                            "name": d.id,
                            "totalBytes": d.metadata.total_bytes,
                            "schema": d.arrow_schema.fields().iter().map(|f| f.name().clone()).collect::<Vec<_>>(),
                        })
                    })
                    .collect();
                json!({
                    "host": self.server_config.host,
                    "port": self.server_config.port,
                    "dataDirectory": self.server_config.data_directory,
                    "datasets": datasets,
                    "uptime": self.started_at.elapsed().as_secs(),
                    "memoryUsage": memory_usage_bytes(),
                })
            }
            other => {
                return Err(Status::unimplemented(format!("unknown action: {other}")));
            }
        };

        let result = arrow_flight::Result {
            body: serde_json::to_vec(&body)
                .map_err(|e| Status::internal(e.to_string()))?
                .into(),
        };
        Ok(Response::new(Box::pin(futures::stream::once(async move {
            Ok(result)
        }))))
    }

    async fn list_actions(
        &self,
        _request: Request<Empty>,
    ) -> std::result::Result<Response<Self::ListActionsStream>, Status> {
        let actions = vec![
            Ok(ActionType {
                r#type: "refresh-datasets".to_string(),
                description: "Rescans the data directory and reloads the catalog".to_string(),
            }),
            Ok(ActionType {
                r#type: "get-server-info".to_string(),
                description: "Returns a summary of registered datasets and server uptime".to_string(),
            }),
        ];
        Ok(Response::new(Box::pin(futures::stream::iter(actions))))
    }

    async fn do_exchange(
        &self,
        _request: Request<Streaming<FlightData>>,
    ) -> std::result::Result<Response<Self::DoExchangeStream>, Status> {
        Err(Status::unimplemented("do_exchange is not supported"))
    }

    async fn poll_flight_info(
        &self,
        _request: Request<FlightDescriptor>,
    ) -> std::result::Result<Response<PollInfo>, Status> {
        Err(Status::unimplemented("poll_flight_info is not supported"))
    }
}
