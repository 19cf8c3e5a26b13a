use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use derive_new::new;
use eyre::{Context, Result};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{debug, info, instrument};

use crate::metrics::MirrorMetrics;

/// Serves the Prometheus report on `/metrics`.
#[derive(new, Debug)]
pub struct Server {
    listen_port: u16,
    metrics: MirrorMetrics,
}

impl Server {
    /// Bind `0.0.0.0:<listen_port>` and serve in a background task.
    pub fn run(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            let addr = format!("0.0.0.0:{}", self.listen_port);
            let listener = TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind metrics server to {addr}"))?;
            self.serve(listener).await
        })
    }

    #[instrument(skip_all, fields(port = self.listen_port))]
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        info!("Starting metrics server");
        let metrics = self.metrics;
        let app = Router::new().route("/metrics", get(move || Self::gather_metrics(metrics)));
        axum::serve(listener, app)
            .await
            .context("Metrics server stopped")
    }

    async fn gather_metrics(metrics: MirrorMetrics) -> impl IntoResponse {
        debug!("Serving /metrics");
        match metrics.gather().map(String::from_utf8) {
            Ok(Ok(report)) => (StatusCode::OK, report),
            Ok(Err(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".into(),
            ),
            Err(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to gather metrics".into(),
            ),
        }
    }
}
