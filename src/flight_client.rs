//! Arrow Flight client: connect, discover, and stream datasets, with
//! every call wrapped by the retry/circuit-breaker reliability layer.
//!
//! Grounded on the teacher's own example Flight client's
//! connect/`do_get`/pump-into-channel shape, but corrected to decode the
//! Arrow IPC payload from `FlightData.data_body` (the field the server
//! actually populates) rather than `app_metadata`.

use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use arrow_flight::flight_service_client::FlightServiceClient;
use arrow_flight::{Action, ActionType, Criteria, Empty, FlightDescriptor, FlightInfo, Ticket};
use arrow_schema::Schema;
use tokio::sync::{watch, Mutex};
use tonic::transport::Channel;
use tracing::{info, warn};

use crate::arrow_builder;
use crate::config::ClientConfig;
use crate::error::{FlightTransportError, Result};
use crate::reliability::{retry, CircuitBreaker};
use crate::ticket::{decode_ticket, encode_ticket};

/// Summary information about a single dataset, as returned by
/// [`FlightClient::list_datasets`] and [`FlightClient::get_dataset_info`].
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    /// Dataset id.
    pub id: String,
    /// Row count, or `-1` if unknown.
    pub total_records: i64,
    /// Byte size, or `-1` if unknown.
    pub total_bytes: i64,
    /// Arrow schema.
    pub schema: Arc<Schema>,
}

fn dataset_info_from(info: FlightInfo) -> Result<DatasetInfo> {
    let id = info
        .flight_descriptor
        .as_ref()
        .and_then(|d| d.path.first())
        .cloned()
        .unwrap_or_default();
    let cursor = std::io::Cursor::new(&info.schema);
    let schema = arrow::ipc::reader::StreamReader::try_new(cursor, None)
        .map_err(FlightTransportError::Arrow)?
        .schema();
    Ok(DatasetInfo {
        id,
        total_records: info.total_records,
        total_bytes: info.total_bytes,
        schema,
    })
}

/// Events emitted across a [`FlightClient`]'s connection lifecycle.
///
/// Mirrors [`crate::csv_source::AdapterEvent`]'s "channel carrying a sum
/// type" shape rather than named listener callbacks.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A `connect()` call has started dialing the server.
    Connecting,
    /// The connection was established successfully.
    Connected,
    /// A `disconnect()` call has started tearing down the channel.
    Disconnecting,
    /// The connection was torn down.
    Disconnected,
    /// A `connect()` call failed; carries the error description.
    ConnectionError(String),
    /// A `disconnect()` call failed; carries the error description.
    ///
    /// Disconnection in this client cannot itself fail (dropping the
    /// channel is infallible), but the variant exists to match the
    /// documented event surface and to leave room for a future
    /// graceful-shutdown handshake that can.
    DisconnectError(String),
}

/// Queryable connection state, updated as [`ClientEvent`]s are emitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionState {
    /// Whether a connection is currently established.
    pub is_connected: bool,
    /// Whether a `connect()` call is currently in flight.
    pub is_connecting: bool,
    /// The error from the most recent failed `connect()`, if any.
    pub connection_error: Option<String>,
}

/// High-level Arrow Flight client.
pub struct FlightClient {
    config: ClientConfig,
    breaker: CircuitBreaker,
    inner: Mutex<Option<FlightServiceClient<Channel>>>,
    state_tx: watch::Sender<ConnectionState>,
    events: tokio::sync::broadcast::Sender<ClientEvent>,
}

impl FlightClient {
    /// Creates a disconnected client from configuration.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let retry_cfg = crate::config::RetryConfig {
            max_attempts: config.retry_attempts,
            base_delay_ms: config.retry_delay_ms,
            ..crate::config::RetryConfig::default()
        };
        let (state_tx, _) = watch::channel(ConnectionState::default());
        let (events, _) = tokio::sync::broadcast::channel(16);
        Self {
            breaker: CircuitBreaker::new(&retry_cfg),
            config,
            inner: Mutex::new(None),
            state_tx,
            events,
        }
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    /// Subscribes to connection-lifecycle events. Each call returns an
    /// independent receiver; events published before subscribing are not
    /// replayed.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Connects to the configured server. Idempotent: if already
    /// connected, returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`FlightTransportError::Unavailable`] if the connection
    /// cannot be established.
    pub async fn connect(&self) -> Result<()> {
        let mut guard = self.inner.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        self.set_state(|s| {
            s.is_connecting = true;
            s.connection_error = None;
        });
        self.emit(ClientEvent::Connecting);
        info!(uri = %self.config.uri(), "connecting to flight server");
        match FlightServiceClient::connect(self.config.uri()).await {
            Ok(client) => {
                *guard = Some(client);
                self.set_state(|s| {
                    s.is_connecting = false;
                    s.is_connected = true;
                    s.connection_error = None;
                });
                self.emit(ClientEvent::Connected);
                info!("connected");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                self.set_state(|s| {
                    s.is_connecting = false;
                    s.is_connected = false;
                    s.connection_error = Some(message.clone());
                });
                self.emit(ClientEvent::ConnectionError(message.clone()));
                Err(FlightTransportError::Unavailable(message))
            }
        }
    }

    /// Disconnects, dropping the underlying channel. Idempotent.
    pub async fn disconnect(&self) {
        let mut guard = self.inner.lock().await;
        if guard.take().is_some() {
            self.emit(ClientEvent::Disconnecting);
            self.set_state(|s| {
                s.is_connected = false;
                s.is_connecting = false;
            });
            self.emit(ClientEvent::Disconnected);
            info!("disconnected");
        }
    }

    fn set_state(&self, mutate: impl FnOnce(&mut ConnectionState)) {
        self.state_tx.send_modify(mutate);
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    async fn client(&self) -> Result<FlightServiceClient<Channel>> {
        let guard = self.inner.lock().await;
        guard
            .clone()
            .ok_or_else(|| FlightTransportError::Unavailable("client is not connected".to_string()))
    }

    async fn call_with_retry<F, Fut, T>(&self, retry_cfg: &crate::config::RetryConfig, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.breaker
            .call(|| retry(retry_cfg, &op))
            .await
    }

    fn retry_config(&self) -> crate::config::RetryConfig {
        crate::config::RetryConfig {
            max_attempts: self.config.retry_attempts,
            base_delay_ms: self.config.retry_delay_ms,
            ..crate::config::RetryConfig::default()
        }
    }

    /// Lists every dataset the server advertises.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying RPC fails after retries.
    pub async fn list_datasets(&self) -> Result<Vec<DatasetInfo>> {
        let retry_cfg = self.retry_config();
        self.call_with_retry(&retry_cfg, || async {
            let mut client = self.client().await?;
            let response = client
                .list_flights(Criteria {
                    expression: Vec::new().into(),
                })
                .await
                .map_err(FlightTransportError::from)?;
            let mut stream = response.into_inner();
            let mut datasets = Vec::new();
            while let Some(info) = stream.message().await.map_err(FlightTransportError::from)? {
                datasets.push(dataset_info_from(info)?);
            }
            Ok(datasets)
        })
        .await
    }

    /// Fetches metadata for a single dataset.
    ///
    /// # Errors
    ///
    /// Returns [`FlightTransportError::NotFound`] if the id is unknown.
    pub async fn get_dataset_info(&self, id: &str) -> Result<DatasetInfo> {
        let retry_cfg = self.retry_config();
        let id = id.to_string();
        self.call_with_retry(&retry_cfg, || {
            let id = id.clone();
            async move {
                let mut client = self.client().await?;
                let descriptor = FlightDescriptor {
                    r#type: 1, // FlightDescriptor.DescriptorType.PATH
                    cmd: Vec::new().into(),
                    path: vec![id.clone()],
                };
                let response = client
                    .get_flight_info(descriptor)
                    .await
                    .map_err(FlightTransportError::from)?;
                dataset_info_from(response.into_inner())
            }
        })
        .await
    }

    /// Fetches just the Arrow schema for a dataset.
    ///
    /// # Errors
    ///
    /// Returns [`FlightTransportError::NotFound`] if the id is unknown.
    pub async fn get_schema(&self, id: &str) -> Result<Arc<Schema>> {
        let info = self.get_dataset_info(id).await?;
        Ok(info.schema)
    }

    /// Fetches every batch of a dataset and concatenates them into one
    /// table (a `Vec<RecordBatch>` sharing a single schema).
    ///
    /// # Errors
    ///
    /// Returns an error if the stream fails or cannot be decoded.
    pub async fn get_dataset(&self, id: &str) -> Result<Vec<RecordBatch>> {
        self.stream_dataset(id).await
    }

    /// Streams every record batch of a dataset in server emission order.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream fails or cannot be decoded.
    pub async fn stream_dataset(&self, id: &str) -> Result<Vec<RecordBatch>> {
        let retry_cfg = self.retry_config();
        let id = id.to_string();
        self.call_with_retry(&retry_cfg, || {
            let id = id.clone();
            async move {
                let mut client = self.client().await?;
                let ticket = Ticket {
                    ticket: encode_ticket(&id).into(),
                };
                let response = client.do_get(ticket).await.map_err(FlightTransportError::from)?;
                let mut stream = response.into_inner();
                let mut batches = Vec::new();
                while let Some(frame) = stream.message().await.map_err(FlightTransportError::from)? {
                    let decoded = arrow_builder::deserialize_stream(&frame.data_body)
                        .map_err(FlightTransportError::Arrow)?;
                    batches.extend(decoded);
                }
                Ok(batches)
            }
        })
        .await
    }

    /// Streams a dataset grouped by the server's original per-frame
    /// batching (each inner `Vec` is the batches carried by one
    /// `FlightData` frame).
    ///
    /// # Errors
    ///
    /// Returns an error if the stream fails or cannot be decoded.
    pub async fn stream_dataset_as_tables(&self, id: &str) -> Result<Vec<Vec<RecordBatch>>> {
        let retry_cfg = self.retry_config();
        let id = id.to_string();
        self.call_with_retry(&retry_cfg, || {
            let id = id.clone();
            async move {
                let mut client = self.client().await?;
                let ticket = Ticket {
                    ticket: encode_ticket(&id).into(),
                };
                let response = client.do_get(ticket).await.map_err(FlightTransportError::from)?;
                let mut stream = response.into_inner();
                let mut tables = Vec::new();
                while let Some(frame) = stream.message().await.map_err(FlightTransportError::from)? {
                    let decoded = arrow_builder::deserialize_stream(&frame.data_body)
                        .map_err(FlightTransportError::Arrow)?;
                    tables.push(decoded);
                }
                Ok(tables)
            }
        })
        .await
    }

    /// Invokes a named Flight action, returning its raw result bodies.
    ///
    /// # Errors
    ///
    /// Returns [`FlightTransportError::InvalidArgument`] for unknown
    /// action types (as signalled by the server).
    pub async fn do_action(&self, action_type: &str, body: Vec<u8>) -> Result<Vec<Vec<u8>>> {
        let retry_cfg = self.retry_config();
        let action_type = action_type.to_string();
        self.call_with_retry(&retry_cfg, || {
            let action_type = action_type.clone();
            let body = body.clone();
            async move {
                let mut client = self.client().await?;
                let response = client
                    .do_action(Action {
                        r#type: action_type,
                        body: body.into(),
                    })
                    .await
                    .map_err(FlightTransportError::from)?;
                let mut stream = response.into_inner();
                let mut results = Vec::new();
                while let Some(result) = stream.message().await.map_err(FlightTransportError::from)? {
                    results.push(result.body.to_vec());
                }
                Ok(results)
            }
        })
        .await
    }

    /// Lists the server's supported actions.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying RPC fails after retries.
    pub async fn list_actions(&self) -> Result<Vec<ActionType>> {
        let retry_cfg = self.retry_config();
        self.call_with_retry(&retry_cfg, || async {
            let mut client = self.client().await?;
            let response = client
                .list_actions(Empty {})
                .await
                .map_err(FlightTransportError::from)?;
            let mut stream = response.into_inner();
            let mut actions = Vec::new();
            while let Some(action) = stream.message().await.map_err(FlightTransportError::from)? {
                actions.push(action);
            }
            Ok(actions)
        })
        .await
    }

    /// Aggregates [`FlightClient::list_datasets`] and
    /// [`FlightClient::list_actions`] into one summary.
    ///
    /// # Errors
    ///
    /// Returns an error if either underlying call fails.
    pub async fn get_server_info(&self) -> Result<(Vec<DatasetInfo>, Vec<ActionType>)> {
        let datasets = self.list_datasets().await?;
        let actions = self.list_actions().await?;
        Ok((datasets, actions))
    }

    /// Probes connectivity with a lightweight `ListFlights` call.
    pub async fn test_connection(&self) -> bool {
        match self.list_datasets().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "connection test failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disconnect_without_connect_is_a_no_op() {
        let client = FlightClient::new(ClientConfig::default());
        client.disconnect().await;
    }

    #[tokio::test]
    async fn calling_without_connect_returns_unavailable() {
        let client = FlightClient::new(ClientConfig::default());
        let err = client.list_datasets().await.unwrap_err();
        assert!(matches!(
            err,
            FlightTransportError::Unavailable(_) | FlightTransportError::CircuitOpen(_)
        ));
    }

    #[test]
    fn fresh_client_state_is_disconnected() {
        let client = FlightClient::new(ClientConfig::default());
        let state = client.state();
        assert!(!state.is_connected);
        assert!(!state.is_connecting);
        assert!(state.connection_error.is_none());
    }

    #[tokio::test]
    async fn failed_connect_emits_connection_error_event_and_state() {
        let config = ClientConfig {
            host: "127.0.0.1".to_string(),
            port: 1, // nothing listens here
            connection_timeout_ms: 50,
            ..ClientConfig::default()
        };
        let client = FlightClient::new(config);
        let mut events = client.subscribe();
        let _ = client.connect().await;

        let state = client.state();
        assert!(!state.is_connected);
        assert!(state.connection_error.is_some());

        assert!(matches!(events.recv().await.unwrap(), ClientEvent::Connecting));
        assert!(matches!(events.recv().await.unwrap(), ClientEvent::ConnectionError(_)));
    }

    #[test]
    fn decode_ticket_used_by_server_matches_encode() {
        let bytes = encode_ticket("orders");
        assert_eq!(decode_ticket(&bytes).unwrap(), "orders");
    }
}
