//! Exporter configuration.
//!
//! [`ExporterConfig`] is process-wide and set once at construction. The
//! builder's `Default` seeds every field from `SPANFLOW_*` environment
//! variables where present.

use crate::redact::{parse_filters, DataFilter};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable naming the ingestion endpoint base URL.
pub const SPANFLOW_SERVER_URL: &str = "SPANFLOW_SERVER_URL";
/// Environment variable holding the API key sent with every batch.
pub const SPANFLOW_API_KEY: &str = "SPANFLOW_API_KEY";
/// Environment variable setting the auto-flush interval in seconds.
pub const SPANFLOW_FLUSH_INTERVAL: &str = "SPANFLOW_FLUSH_INTERVAL";
/// Environment variable setting the trace sampling rate in `[0, 1]`.
pub const SPANFLOW_SAMPLING_RATE: &str = "SPANFLOW_SAMPLING_RATE";
/// Environment variable bounding the number of buffered spans.
pub const SPANFLOW_MAX_BUFFER_SPANS: &str = "SPANFLOW_MAX_BUFFER_SPANS";
/// Environment variable bounding the serialized size of one batch in bytes.
pub const SPANFLOW_MAX_BATCH_BYTES: &str = "SPANFLOW_MAX_BATCH_BYTES";
/// Environment variable listing enabled redaction filters, comma-separated.
pub const SPANFLOW_DATA_FILTERS: &str = "SPANFLOW_DATA_FILTERS";
/// Environment variable naming the component tag attached to every span.
pub const SPANFLOW_COMPONENT: &str = "SPANFLOW_COMPONENT";

pub(crate) const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
pub(crate) const DEFAULT_SAMPLING_RATE: f64 = 1.0;
pub(crate) const DEFAULT_MAX_BUFFER_SPANS: usize = 10_000;
pub(crate) const DEFAULT_MAX_BATCH_BYTES: usize = 5 * 1024 * 1024;
pub(crate) const DEFAULT_DATA_FILTERS: &str = "RemovePasswords, RemoveJWT";
pub(crate) const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Process-wide exporter configuration.
#[derive(Clone, Debug)]
pub struct ExporterConfig {
    pub(crate) server_url: String,
    pub(crate) api_key: String,
    pub(crate) flush_interval: Duration,
    pub(crate) sampling_rate: f64,
    pub(crate) max_buffer_spans: usize,
    pub(crate) max_batch_bytes: usize,
    pub(crate) data_filters: Vec<DataFilter>,
    pub(crate) component_tag: Option<String>,
    pub(crate) export_timeout: Duration,
}

impl ExporterConfig {
    /// Start building a configuration seeded from the environment.
    pub fn builder() -> ExporterConfigBuilder {
        ExporterConfigBuilder::default()
    }

    /// The ingestion endpoint base URL; empty means flushes log and drop.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// The effective (clamped) sampling rate.
    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    /// The enabled redaction filters.
    pub fn data_filters(&self) -> &[DataFilter] {
        &self.data_filters
    }

    /// Delay between two consecutive automatic flushes.
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }
}

impl Default for ExporterConfig {
    fn default() -> Self {
        ExporterConfigBuilder::default().build()
    }
}

/// Builder for [`ExporterConfig`].
#[derive(Clone, Debug)]
pub struct ExporterConfigBuilder {
    server_url: String,
    api_key: String,
    flush_interval: Duration,
    sampling_rate: f64,
    max_buffer_spans: usize,
    max_batch_bytes: usize,
    data_filters: Vec<DataFilter>,
    component_tag: Option<String>,
    export_timeout: Duration,
}

impl Default for ExporterConfigBuilder {
    /// Seed each field from its `SPANFLOW_*` environment variable when set,
    /// otherwise from the documented default.
    fn default() -> Self {
        ExporterConfigBuilder {
            server_url: env::var(SPANFLOW_SERVER_URL).unwrap_or_default(),
            api_key: env::var(SPANFLOW_API_KEY).unwrap_or_default(),
            flush_interval: env_parsed::<f64>(SPANFLOW_FLUSH_INTERVAL)
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64)
                .unwrap_or(DEFAULT_FLUSH_INTERVAL),
            sampling_rate: env_parsed(SPANFLOW_SAMPLING_RATE).unwrap_or(DEFAULT_SAMPLING_RATE),
            max_buffer_spans: env_parsed(SPANFLOW_MAX_BUFFER_SPANS)
                .unwrap_or(DEFAULT_MAX_BUFFER_SPANS),
            max_batch_bytes: env_parsed(SPANFLOW_MAX_BATCH_BYTES)
                .unwrap_or(DEFAULT_MAX_BATCH_BYTES),
            data_filters: parse_filters(
                &env::var(SPANFLOW_DATA_FILTERS).unwrap_or_else(|_| DEFAULT_DATA_FILTERS.to_owned()),
            ),
            component_tag: env::var(SPANFLOW_COMPONENT).ok().filter(|tag| !tag.is_empty()),
            export_timeout: DEFAULT_EXPORT_TIMEOUT,
        }
    }
}

impl ExporterConfigBuilder {
    /// Set the ingestion endpoint base URL.
    pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = server_url.into();
        self
    }

    /// Set the API key sent as `Authorization: ApiKey <key>`.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Set the delay between automatic flushes. Default is 5 seconds.
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Set the trace sampling rate; clamped into `[0, 1]` on build.
    pub fn with_sampling_rate(mut self, sampling_rate: f64) -> Self {
        self.sampling_rate = sampling_rate;
        self
    }

    /// Set the maximum number of buffered spans. Default is 10 000; further
    /// spans are dropped and counted.
    pub fn with_max_buffer_spans(mut self, max_buffer_spans: usize) -> Self {
        self.max_buffer_spans = max_buffer_spans;
        self
    }

    /// Set the maximum serialized batch size. Default is 5 MiB.
    pub fn with_max_batch_bytes(mut self, max_batch_bytes: usize) -> Self {
        self.max_batch_bytes = max_batch_bytes;
        self
    }

    /// Set the enabled redaction filters.
    pub fn with_data_filters(mut self, data_filters: Vec<DataFilter>) -> Self {
        self.data_filters = data_filters;
        self
    }

    /// Attach a `component` attribute with this value to every span.
    pub fn with_component_tag(mut self, component_tag: impl Into<String>) -> Self {
        self.component_tag = Some(component_tag.into());
        self
    }

    /// Set the per-request transport timeout. Default is 30 seconds.
    pub fn with_export_timeout(mut self, export_timeout: Duration) -> Self {
        self.export_timeout = export_timeout;
        self
    }

    /// Build the configuration, clamping the sampling rate into `[0, 1]` and
    /// trimming any trailing slash from the server URL.
    pub fn build(self) -> ExporterConfig {
        let sampling_rate = if self.sampling_rate.is_finite() {
            self.sampling_rate.clamp(0.0, 1.0)
        } else {
            DEFAULT_SAMPLING_RATE
        };
        ExporterConfig {
            server_url: self.server_url.trim_end_matches('/').to_owned(),
            api_key: self.api_key,
            flush_interval: self.flush_interval,
            sampling_rate,
            max_buffer_spans: self.max_buffer_spans,
            max_batch_bytes: self.max_batch_bytes,
            data_filters: self.data_filters,
            component_tag: self.component_tag,
            export_timeout: self.export_timeout,
        }
    }
}

fn env_parsed<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|raw| T::from_str(raw.trim()).ok())
}
