//! Error taxonomy for the export pipeline.
//!
//! Nothing on the span-add path returns or raises an error; failures there
//! are logged and counted. Errors surface only from explicit [`flush`] and
//! [`shutdown`] calls.
//!
//! [`flush`]: crate::SpanExporter::flush
//! [`shutdown`]: crate::SpanExporter::shutdown

use std::sync::PoisonError;
use thiserror::Error;

/// A specialized `Result` for flush and shutdown operations.
pub type ExportResult = Result<(), ExporterError>;

/// Errors surfaced by explicit flush and shutdown calls.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ExporterError {
    /// A batch could not be delivered to the ingestion endpoint. The spans of
    /// the failed and unattempted batches were requeued for the next flush.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The exporter was already shut down.
    #[error("exporter already shut down")]
    AlreadyShutdown,

    /// Other failures not covered by the variants above.
    #[error("{0}")]
    Other(String),
}

impl<T> From<PoisonError<T>> for ExporterError {
    fn from(err: PoisonError<T>) -> Self {
        ExporterError::Other(err.to_string())
    }
}

/// Errors produced by a single [`Transport`] send attempt.
///
/// [`Transport`]: crate::Transport
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// The request could not be performed: connection failure or timeout.
    #[error("failed to send spans: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("failed to send spans: {status} - {body}")]
    Rejected {
        /// HTTP status code of the response.
        status: u16,
        /// Response body, surfaced for diagnostics.
        body: String,
    },

    /// The batch could not be encoded as JSON.
    #[error("failed to serialize span batch: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_error_carries_status_and_body() {
        let err = TransportError::Rejected {
            status: 503,
            body: "upstream unavailable".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "failed to send spans: 503 - upstream unavailable"
        );
    }

    #[test]
    fn transport_errors_convert_transparently() {
        let err = ExporterError::from(TransportError::Rejected {
            status: 400,
            body: "bad batch".to_owned(),
        });
        assert!(matches!(err, ExporterError::Transport(_)));
        assert_eq!(err.to_string(), "failed to send spans: 400 - bad batch");
    }
}
