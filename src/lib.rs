//! Arrow Flight transport for CSV-backed tabular datasets.
//!
//! ```text
//!                         ┌─────────────────────┐
//!                         │   DatasetCatalog     │◀── directory scan
//!                         └──────────┬───────────┘
//!                                    │ schema, locator
//!                         ┌──────────▼───────────┐
//!              ┌──────────│   FlightServiceImpl   │──────────┐
//!              │          └──────────┬───────────┘          │
//!              │                     │ rows                  │
//!     ┌────────▼────────┐  ┌─────────▼─────────┐   ┌─────────▼────────┐
//!     │    CsvSource     │─▶│   arrow_builder    │──▶│  Arrow Flight gRPC │
//!     │  (row adapter)   │  │ (columnar batches) │   │    (tonic/IPC)     │
//!     └──────────────────┘  └────────────────────┘   └─────────┬────────┘
//!                                                                │
//!                                                      ┌─────────▼────────┐
//!                                                      │   FlightClient    │
//!                                                      │ (+ reliability)   │
//!                                                      └───────────────────┘
//! ```
//!
//! The core pipeline: a [`catalog::DatasetCatalog`] discovers CSV files
//! and registers their Arrow schema; [`flight_service::FlightServiceImpl`]
//! answers Flight RPCs by driving a [`csv_source::CsvSource`] through
//! [`arrow_builder`] into the gRPC stream; [`flight_client::FlightClient`]
//! inverts this on the consuming side, with every call guarded by
//! [`reliability`]'s retry handler and circuit breaker.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod arrow_builder;
pub mod catalog;
pub mod config;
pub mod csv_source;
pub mod error;
pub mod flight_client;
pub mod flight_service;
pub mod reliability;
pub mod schema_inference;
pub mod ticket;
pub mod types;

pub use catalog::{Dataset, DatasetCatalog, DatasetMetadata};
pub use config::{ClientConfig, CsvSourceConfig, RetryConfig, ServerConfig};
pub use error::{FlightTransportError, Result};
pub use flight_client::{ClientEvent, ConnectionState, DatasetInfo, FlightClient};
pub use flight_service::FlightServiceImpl;
pub use reliability::{CircuitBreaker, CircuitState};
pub use types::{LogicalType, Scalar};
