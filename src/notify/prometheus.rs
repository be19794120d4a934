//! Transcoder metrics and the `/metrics` endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use prometheus::{CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry};
use tracing::{error, info};

use crate::error::NotificationError;
use crate::store::JobStatus;

fn prometheus_err(e: impl std::fmt::Display) -> NotificationError {
    NotificationError::PrometheusFailed(e.to_string())
}

/// Prometheus metrics for the transcoder worker.
pub struct Metrics {
    /// Registry the gauges and counters below are registered in.
    registry: Registry,
    /// Finished jobs by terminal status.
    pub jobs_total: CounterVec,
    /// Jobs with a live encoder process.
    pub jobs_in_progress: Gauge,
    /// Wall-clock time from encoder start to terminal event.
    pub duration_seconds: Histogram,
    /// Items waiting or active in the queue at last inspection.
    pub queue_depth: Gauge,
}

impl Metrics {
    /// Builds and registers every transcoder metric.
    pub fn new() -> Result<Self, NotificationError> {
        let registry = Registry::new();

        let jobs_total = CounterVec::new(
            Opts::new("transcode_jobs_total", "Total number of finished transcode jobs"),
            &["status"],
        )
        .map_err(prometheus_err)?;

        let jobs_in_progress = Gauge::new(
            "transcode_jobs_in_progress",
            "Number of jobs currently being transcoded",
        )
        .map_err(prometheus_err)?;

        let duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "transcode_duration_seconds",
                "Time taken to transcode a file in seconds",
            )
            .buckets(vec![1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
        )
        .map_err(prometheus_err)?;

        let queue_depth = Gauge::new(
            "transcode_queue_depth",
            "Number of items waiting or active in the queue",
        )
        .map_err(prometheus_err)?;

        registry
            .register(Box::new(jobs_total.clone()))
            .map_err(prometheus_err)?;
        registry
            .register(Box::new(jobs_in_progress.clone()))
            .map_err(prometheus_err)?;
        registry
            .register(Box::new(duration_seconds.clone()))
            .map_err(prometheus_err)?;
        registry
            .register(Box::new(queue_depth.clone()))
            .map_err(prometheus_err)?;

        Ok(Self {
            registry,
            jobs_total,
            jobs_in_progress,
            duration_seconds,
            queue_depth,
        })
    }

    /// Records a job reaching a terminal status.
    pub fn record_finished(&self, status: JobStatus, elapsed_secs: Option<f64>) {
        self.jobs_total.with_label_values(&[status.as_str()]).inc();
        if let Some(secs) = elapsed_secs {
            self.duration_seconds.observe(secs);
        }
    }

    /// Number of live encoder processes.
    pub fn set_jobs_in_progress(&self, count: usize) {
        self.jobs_in_progress.set(count as f64);
    }

    /// Waiting plus active queue items, as last listed.
    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.set(depth as f64);
    }

    /// Encodes the registry in the text exposition format.
    pub fn gather(&self) -> Result<String, NotificationError> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(prometheus_err)?;
        String::from_utf8(buffer).map_err(prometheus_err)
    }
}

/// Serves `GET /metrics` over HTTP/1.
pub struct MetricsServer {
    metrics: Arc<Metrics>,
    port: u16,
}

impl MetricsServer {
    pub fn new(metrics: Arc<Metrics>, port: u16) -> Self {
        Self { metrics, port }
    }

    /// Accepts connections until the task is dropped.
    pub async fn start(self) -> Result<(), NotificationError> {
        use http_body_util::Full;
        use hyper::body::Bytes;
        use hyper::server::conn::http1;
        use hyper::service::service_fn;
        use hyper::{body::Incoming, Request, Response, StatusCode};
        use hyper_util::rt::TokioIo;

        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(prometheus_err)?;

        info!(port = self.port, "Starting Prometheus metrics server");

        let metrics = self.metrics.clone();

        loop {
            let (stream, _) = listener.accept().await.map_err(prometheus_err)?;

            let io = TokioIo::new(stream);
            let metrics = metrics.clone();

            tokio::spawn(async move {
                let service = service_fn(|req: Request<Incoming>| {
                    let metrics = metrics.clone();
                    async move {
                        let (status, body) = if req.uri().path() != "/metrics" {
                            (StatusCode::NOT_FOUND, "Not Found".to_string())
                        } else {
                            match metrics.gather() {
                                Ok(body) => (StatusCode::OK, body),
                                Err(e) => {
                                    error!(error = %e, "Failed to gather metrics");
                                    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                                }
                            }
                        };

                        let mut response = Response::new(Full::new(Bytes::from(body)));
                        *response.status_mut() = status;
                        Ok::<_, hyper::Error>(response)
                    }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!(error = %e, "Error serving connection");
                }
            });
        }
    }
}
