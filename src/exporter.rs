//! The span exporter: buffering, flushing, auto-flush, and shutdown.
//!
//! [`SpanExporter`] is the pipeline's entry point. Producers hand it finished
//! spans on the hot path; a dedicated background thread flushes the buffer
//! periodically, and `flush`/`shutdown` do so on demand. A dedicated flush
//! mutex guarantees at most one flush pass runs at a time.

use crate::batch::split_batches;
use crate::buffer::{BufferedSpan, SpanBuffer, SpanKey};
use crate::config::ExporterConfig;
use crate::error::{ExportResult, ExporterError};
use crate::model::wire::serialize_span;
use crate::model::SpanRecord;
use crate::sampler::{SamplingDecision, TraceIdRatioSampler};
use crate::transport::{HttpTransport, Transport};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use tracing::{debug, info, warn};

/// Buffered span exporter.
///
/// Spans enter through [`export`], which samples, redacts, serializes, and
/// buffers them without blocking on network I/O. Buffered spans are shipped
/// in size-bounded batches by the periodic auto-flush, by explicit
/// [`flush`] calls, and by the final flush in [`shutdown`].
///
/// Call [`shutdown`] before process exit; it is the only path that reports a
/// delivery failure for the remaining spans.
///
/// [`export`]: SpanExporter::export
/// [`flush`]: SpanExporter::flush
/// [`shutdown`]: SpanExporter::shutdown
#[derive(Debug)]
pub struct SpanExporter {
    inner: Arc<Inner>,
    stop_sender: Sender<()>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

#[derive(Debug)]
struct Inner {
    config: ExporterConfig,
    sampler: TraceIdRatioSampler,
    buffer: SpanBuffer,
    transport: Box<dyn Transport>,
    flush_lock: Mutex<()>,
    shutdown: AtomicBool,
    dropped_spans: AtomicUsize,
    duplicate_spans: AtomicUsize,
}

impl SpanExporter {
    /// Create an exporter over the default HTTP transport.
    pub fn new(config: ExporterConfig) -> Result<Self, ExporterError> {
        SpanExporter::builder().with_config(config).build()
    }

    /// Start building an exporter, seeded with configuration from the
    /// environment.
    pub fn builder() -> SpanExporterBuilder {
        SpanExporterBuilder {
            config: ExporterConfig::default(),
            transport: None,
        }
    }

    /// Hand finished spans to the pipeline.
    ///
    /// Fast and non-blocking: the only wait is a short buffer mutex hold.
    /// This never returns or raises an error; unsampled spans are discarded,
    /// duplicates and capacity overflows are counted and logged.
    pub fn export(&self, spans: Vec<SpanRecord>) {
        if spans.is_empty() {
            return;
        }
        if self.inner.shutdown.load(Ordering::Relaxed) {
            warn!(spans = spans.len(), "exporter is shut down; dropping spans");
            return;
        }
        self.inner.export(spans);
    }

    /// Flush all buffered spans to the ingestion endpoint now.
    ///
    /// Concurrent calls serialize on the flush lock; each then operates on
    /// the buffer state current at that point, so no batch is ever sent
    /// twice. On a batch failure the failed and unattempted spans are
    /// requeued for the next cycle and the transport error is returned.
    pub fn flush(&self) -> ExportResult {
        if self.inner.shutdown.load(Ordering::Relaxed) {
            return Err(ExporterError::AlreadyShutdown);
        }
        self.inner.flush()
    }

    /// Shut down the exporter: stop the auto-flush timer, run one final
    /// flush, and propagate its outcome.
    ///
    /// Subsequent calls return [`ExporterError::AlreadyShutdown`]; spans
    /// exported after shutdown are dropped.
    pub fn shutdown(&self) -> ExportResult {
        if self.inner.shutdown.swap(true, Ordering::Relaxed) {
            return Err(ExporterError::AlreadyShutdown);
        }
        // Wake the worker so it observes the flag and exits; join waits for
        // any in-flight auto-flush to finish first.
        let _ = self.stop_sender.send(());
        if let Ok(mut worker) = self.worker.lock() {
            if let Some(handle) = worker.take() {
                if handle.join().is_err() {
                    warn!("auto-flush worker panicked before shutdown");
                }
            }
        }
        self.inner.flush()
    }

    /// Number of spans currently awaiting export.
    pub fn buffered_spans(&self) -> usize {
        self.inner.buffer.len()
    }

    /// Total spans dropped because the buffer was at capacity.
    pub fn dropped_spans(&self) -> usize {
        self.inner.dropped_spans.load(Ordering::Relaxed)
    }

    /// Total spans discarded because their id pair was already buffered.
    pub fn duplicate_spans(&self) -> usize {
        self.inner.duplicate_spans.load(Ordering::Relaxed)
    }
}

/// Builder for [`SpanExporter`].
#[derive(Debug)]
pub struct SpanExporterBuilder {
    config: ExporterConfig,
    transport: Option<Box<dyn Transport>>,
}

impl SpanExporterBuilder {
    /// Use this configuration instead of the environment-seeded default.
    pub fn with_config(mut self, config: ExporterConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the HTTP transport, e.g. with a mock in tests.
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Build the exporter and start its auto-flush worker.
    pub fn build(self) -> Result<SpanExporter, ExporterError> {
        let transport: Box<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Box::new(HttpTransport::new(
                &self.config.server_url,
                &self.config.api_key,
                self.config.export_timeout,
            )?),
        };

        let sampler = TraceIdRatioSampler::new(self.config.sampling_rate);
        let buffer = SpanBuffer::new(self.config.max_buffer_spans);
        let inner = Arc::new(Inner {
            sampler,
            buffer,
            transport,
            flush_lock: Mutex::new(()),
            shutdown: AtomicBool::new(false),
            dropped_spans: AtomicUsize::new(0),
            duplicate_spans: AtomicUsize::new(0),
            config: self.config,
        });

        let server_url = if inner.config.server_url.is_empty() {
            "(not set)"
        } else {
            inner.config.server_url.as_str()
        };
        info!(
            server_url,
            flush_interval = ?inner.config.flush_interval,
            sampling_rate = inner.config.sampling_rate,
            "starting span exporter"
        );

        let (stop_sender, stop_receiver) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("spanflow-flush".to_owned())
            .spawn({
                let inner = Arc::clone(&inner);
                move || run_worker(inner, stop_receiver)
            })
            .map_err(|err| ExporterError::Other(format!("failed to spawn flush worker: {err}")))?;

        Ok(SpanExporter {
            inner,
            stop_sender,
            worker: Mutex::new(Some(worker)),
        })
    }
}

/// Auto-flush loop. Failures are logged, never raised to the application,
/// and the worker exits as soon as shutdown is signalled (or the exporter
/// handle is dropped, disconnecting the channel).
fn run_worker(inner: Arc<Inner>, stop_receiver: Receiver<()>) {
    loop {
        match stop_receiver.recv_timeout(inner.config.flush_interval) {
            Err(RecvTimeoutError::Timeout) => {
                if inner.shutdown.load(Ordering::Relaxed) {
                    break;
                }
                if let Err(err) = inner.flush() {
                    warn!(error = %err, "auto-flush failed; spans kept for retry");
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("auto-flush worker stopped");
}

impl Inner {
    fn export(&self, spans: Vec<SpanRecord>) {
        let mut serialized = Vec::with_capacity(spans.len());
        for span in &spans {
            if self.sampler.should_sample(span.trace_id) == SamplingDecision::Drop {
                continue;
            }
            serialized.push(serialize_span(
                span,
                &self.config.data_filters,
                self.config.component_tag.as_deref(),
            ));
        }
        if serialized.is_empty() {
            return;
        }

        let outcome = self.buffer.add(serialized);
        if outcome.dropped > 0 {
            self.dropped_spans.fetch_add(outcome.dropped, Ordering::Relaxed);
            warn!(
                dropped = outcome.dropped,
                capacity = self.config.max_buffer_spans,
                "span buffer full; dropping spans"
            );
        }
        if outcome.duplicates > 0 {
            self.duplicate_spans
                .fetch_add(outcome.duplicates, Ordering::Relaxed);
            debug!(duplicates = outcome.duplicates, "skipped already-buffered spans");
        }
        debug!(added = outcome.added, buffered = self.buffer.len(), "buffered spans");
    }

    fn flush(&self) -> ExportResult {
        let _guard = self.flush_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let snapshot = self.buffer.drain();
        if snapshot.is_empty() {
            debug!("flush: nothing buffered");
            return Ok(());
        }

        if self.config.server_url.is_empty() {
            warn!(
                spans = snapshot.len(),
                "skipping flush: no server URL configured; spans will not be sent"
            );
            self.buffer.release_keys(snapshot.iter().map(|span| &span.key));
            return Ok(());
        }

        let batches = split_batches(snapshot, self.config.max_batch_bytes);
        let total = batches.len();
        let mut sent = 0usize;
        let mut remaining = batches.into_iter();

        while let Some(batch) = remaining.next() {
            let (keys, bodies): (Vec<SpanKey>, Vec<Value>) =
                batch.into_iter().map(|span| (span.key, span.body)).unzip();
            match self.transport.send(&bodies) {
                Ok(()) => {
                    self.buffer.release_keys(keys.iter());
                    sent += 1;
                    debug!(batch = sent, total, spans = keys.len(), "batch delivered");
                }
                Err(err) => {
                    // Requeue the failed batch and everything unattempted;
                    // their dedup keys are still tracked, so nothing is
                    // re-counted when they come back on the next cycle.
                    let mut requeue: Vec<BufferedSpan> = keys
                        .into_iter()
                        .zip(bodies)
                        .map(|(key, body)| BufferedSpan { key, body })
                        .collect();
                    requeue.extend(remaining.flatten());
                    let requeued = requeue.len();
                    self.buffer.requeue(requeue);
                    warn!(
                        error = %err,
                        sent,
                        total,
                        requeued,
                        "batch delivery failed; spans kept for the next flush"
                    );
                    return Err(err.into());
                }
            }
        }

        debug!(batches = total, "flush complete");
        Ok(())
    }
}
