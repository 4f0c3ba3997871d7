//! # Prometheus Metrics
//!
//! Exposes operational metrics for the node. Scraped by Prometheus at the
//! `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] with
//! the `graymatter` prefix so they do not collide with any default global
//! registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

use graymatter_protocol::ledger::Ledger;
use graymatter_protocol::network::PeerDirectory;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are `Arc`s internally) so it can be
/// shared across request handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Articles that verified and entered the pending buffer.
    pub articles_accepted_total: IntCounter,
    /// Articles refused (blank fields, bad key material, bad signature).
    pub articles_rejected_total: IntCounter,
    /// Blocks this node sealed from its own pending buffer.
    pub blocks_minted_total: IntCounter,
    /// Peer blocks appended to the local chain.
    pub blocks_accepted_total: IntCounter,
    /// Peer blocks that failed validation.
    pub blocks_rejected_total: IntCounter,
    /// Size of the peer directory.
    pub known_peers: IntGauge,
    /// Height of the local tip (-1 before genesis).
    pub chain_height: IntGauge,
    /// Articles waiting for the next mint.
    pub pending_articles: IntGauge,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("graymatter".into()), None)?;

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let metric = IntCounter::new(name, help)?;
            registry.register(Box::new(metric.clone()))?;
            Ok(metric)
        };
        let articles_accepted_total =
            counter("articles_accepted_total", "Articles verified and buffered")?;
        let articles_rejected_total =
            counter("articles_rejected_total", "Articles refused at verification")?;
        let blocks_minted_total = counter("blocks_minted_total", "Blocks minted locally")?;
        let blocks_accepted_total =
            counter("blocks_accepted_total", "Peer blocks appended to the chain")?;
        let blocks_rejected_total =
            counter("blocks_rejected_total", "Peer blocks that failed validation")?;

        let gauge = |name: &str, help: &str| -> Result<IntGauge, prometheus::Error> {
            let metric = IntGauge::new(name, help)?;
            registry.register(Box::new(metric.clone()))?;
            Ok(metric)
        };
        let known_peers = gauge("known_peers", "Number of peers in the directory")?;
        let chain_height = gauge("chain_height", "Height of the local chain tip")?;
        let pending_articles = gauge("pending_articles", "Articles waiting to be minted")?;
        chain_height.set(-1);

        Ok(Self {
            registry,
            articles_accepted_total,
            articles_rejected_total,
            blocks_minted_total,
            blocks_accepted_total,
            blocks_rejected_total,
            known_peers,
            chain_height,
            pending_articles,
        })
    }

    /// Refresh the gauges from the live ledger and peer directory.
    pub fn observe(&self, ledger: &Ledger, directory: &PeerDirectory) {
        self.known_peers.set(directory.len() as i64);
        self.pending_articles.set(ledger.pending_count() as i64);
        match ledger.height() {
            Ok(Some(height)) => self.chain_height.set(height as i64),
            Ok(None) => self.chain_height.set(-1),
            Err(e) => tracing::warn!(error = %e, "could not read chain height"),
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
