//! Buffered export pipeline for finished trace spans.
//!
//! A [`SpanExporter`] takes finished spans from an instrumentation layer and
//! ships them to an HTTP ingestion endpoint in size-bounded JSON batches.
//! Between the two sits a pipeline of small, independently testable stages:
//!
//! * **Sampling**: a deterministic trace-id ratio sampler keeps a configured
//!   fraction of traces, with all spans of one trace treated alike.
//! * **Redaction**: configurable filters mask credential-shaped attribute
//!   values (passwords, JWTs, auth headers, API keys) before anything is
//!   buffered.
//! * **Buffering**: a bounded, deduplicating buffer absorbs bursts without
//!   blocking the caller; overflow drops are counted, never raised.
//! * **Batching and delivery**: a background thread flushes periodically,
//!   splitting the buffer into batches under a byte budget and requeuing
//!   whatever a failed send leaves behind.
//!
//! Configuration comes from an environment-seeded builder; every knob can
//! also be set explicitly. See [`config`] for the `SPANFLOW_*` variables.
//!
//! # Example
//!
//! ```no_run
//! use spanflow::config::ExporterConfig;
//! use spanflow::SpanExporter;
//!
//! # fn main() -> Result<(), spanflow::ExporterError> {
//! let config = ExporterConfig::builder()
//!     .with_server_url("https://ingest.example.com")
//!     .with_api_key("secret")
//!     .with_sampling_rate(0.25)
//!     .build();
//! let exporter = SpanExporter::new(config)?;
//!
//! // Hand finished spans to the pipeline from anywhere in the process.
//! exporter.export(vec![]);
//!
//! // Flush and stop before exit; this is where delivery errors surface.
//! exporter.shutdown()?;
//! # Ok(())
//! # }
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod config;
pub mod model;
pub mod redact;

mod batch;
mod buffer;
mod error;
mod exporter;
mod sampler;
mod transport;

pub use error::{ExportResult, ExporterError, TransportError};
pub use exporter::{SpanExporter, SpanExporterBuilder};
pub use redact::DataFilter;
pub use sampler::{SamplingDecision, TraceIdRatioSampler};
pub use transport::{HttpTransport, Transport};
