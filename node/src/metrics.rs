//! # Prometheus Metrics
//!
//! Operational metrics for the hosted ledger, scraped at `/metrics`.
//!
//! All metrics live in a dedicated [`prometheus::Registry`] under the
//! `mycash` prefix. Flow outcomes are recorded by the roster around each
//! flow call; signature counts come from the nodes' progress streams.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use mycash_protocol::flows::{FlowKind, ProgressEvent, SigningState};

/// Metric handles for the node. Clones share the same underlying series.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Flows started, by flow kind.
    pub flows_started_total: IntCounterVec,
    /// Flows that ended in a notarised transaction, by flow kind.
    pub transactions_committed_total: IntCounterVec,
    /// Flows that ended in an error, by flow kind.
    pub flows_failed_total: IntCounterVec,
    /// Counterparties that countersigned an initiator's proposal. A party
    /// signing for several keys counts once.
    pub counterparty_signoffs_total: IntCounter,
    /// Flows that gave up on a double-spend conflict.
    pub conflicts_total: IntCounter,
    /// Unconsumed records per party vault.
    pub unspent_records: IntGaugeVec,
    /// Wall time of a flow call, by flow kind.
    pub flow_latency_seconds: HistogramVec,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("mycash".into()), None)
            .expect("failed to create prometheus registry");

        let flows_started_total = IntCounterVec::new(
            Opts::new("flows_started_total", "Flows started on this node"),
            &["flow"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(flows_started_total.clone()))
            .expect("metric registration");

        let transactions_committed_total = IntCounterVec::new(
            Opts::new(
                "transactions_committed_total",
                "Transactions notarised by flows started on this node",
            ),
            &["flow"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(transactions_committed_total.clone()))
            .expect("metric registration");

        let flows_failed_total = IntCounterVec::new(
            Opts::new("flows_failed_total", "Flows that ended in an error"),
            &["flow"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(flows_failed_total.clone()))
            .expect("metric registration");

        let counterparty_signoffs_total = IntCounter::new(
            "counterparty_signoffs_total",
            "Counterparties that countersigned a proposal",
        )
        .expect("metric creation");
        registry
            .register(Box::new(counterparty_signoffs_total.clone()))
            .expect("metric registration");

        let conflicts_total = IntCounter::new(
            "conflicts_total",
            "Flows abandoned because an input was already consumed",
        )
        .expect("metric creation");
        registry
            .register(Box::new(conflicts_total.clone()))
            .expect("metric registration");

        let unspent_records = IntGaugeVec::new(
            Opts::new("unspent_records", "Unconsumed cash records held per party"),
            &["party"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(unspent_records.clone()))
            .expect("metric registration");

        let flow_latency_seconds = HistogramVec::new(
            HistogramOpts::new("flow_latency_seconds", "Flow wall time in seconds").buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["flow"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(flow_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            flows_started_total,
            transactions_committed_total,
            flows_failed_total,
            counterparty_signoffs_total,
            conflicts_total,
            unspent_records,
            flow_latency_seconds,
        }
    }

    pub fn flow_started(&self, flow: FlowKind) {
        self.flows_started_total
            .with_label_values(&[flow.as_str()])
            .inc();
    }

    /// Record how a flow call ended.
    pub fn flow_finished(
        &self,
        flow: FlowKind,
        elapsed: Duration,
        committed: bool,
        conflict: bool,
    ) {
        let label = [flow.as_str()];
        self.flow_latency_seconds
            .with_label_values(&label)
            .observe(elapsed.as_secs_f64());
        if committed {
            self.transactions_committed_total
                .with_label_values(&label)
                .inc();
        } else {
            self.flows_failed_total.with_label_values(&label).inc();
        }
        if conflict {
            self.conflicts_total.inc();
        }
    }

    pub fn set_unspent(&self, party: &str, records: usize) {
        self.unspent_records
            .with_label_values(&[party])
            .set(records as i64);
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

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Per-stream bookkeeping: the number of counterparties a flow waits on is
/// known when it starts waiting and only counts once it reaches
/// `FullySigned`.
#[derive(Default)]
struct SignoffTally {
    pending: HashMap<Uuid, usize>,
}

impl SignoffTally {
    fn observe(&mut self, metrics: &NodeMetrics, event: &ProgressEvent) {
        match &event.state {
            SigningState::AwaitingSignatures { pending } => {
                self.pending.insert(event.flow_id, *pending);
            }
            SigningState::FullySigned => {
                if let Some(pending) = self.pending.remove(&event.flow_id) {
                    metrics.counterparty_signoffs_total.inc_by(pending as u64);
                }
            }
            SigningState::Failed { .. } => {
                self.pending.remove(&event.flow_id);
            }
            _ => {}
        }
    }
}

/// Follow one node's progress stream until the node goes away.
pub fn spawn_progress_recorder(
    metrics: SharedMetrics,
    mut events: broadcast::Receiver<ProgressEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tally = SignoffTally::default();
        loop {
            match events.recv().await {
                Ok(event) => tally.observe(&metrics, &event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "progress recorder fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Axum handler that renders `/metrics` in Prometheus text format.
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

#[cfg(test)]
mod tests {
    use super::*;

    fn event(flow_id: Uuid, state: SigningState) -> ProgressEvent {
        ProgressEvent {
            flow_id,
            flow: FlowKind::Move,
            state,
            tx_id: None,
        }
    }

    #[test]
    fn encoded_names_carry_the_prefix() {
        let metrics = NodeMetrics::new();
        metrics.flow_started(FlowKind::Issue);
        metrics.set_unspent("Alice", 3);
        let body = metrics.encode().unwrap();
        assert!(body.contains("mycash_flows_started_total{flow=\"issue\"} 1"));
        assert!(body.contains("mycash_unspent_records{party=\"Alice\"} 3"));
    }

    #[test]
    fn finished_flows_split_into_committed_and_failed() {
        let metrics = NodeMetrics::new();
        metrics.flow_finished(FlowKind::Move, Duration::from_millis(5), true, false);
        metrics.flow_finished(FlowKind::Move, Duration::from_millis(5), false, true);
        let committed = metrics
            .transactions_committed_total
            .with_label_values(&["move"])
            .get();
        let failed = metrics.flows_failed_total.with_label_values(&["move"]).get();
        assert_eq!((committed, failed), (1, 1));
        assert_eq!(metrics.conflicts_total.get(), 1);
        assert_eq!(
            metrics
                .flow_latency_seconds
                .with_label_values(&["move"])
                .get_sample_count(),
            2
        );
    }

    #[test]
    fn signoffs_count_only_once_fully_signed() {
        let metrics = NodeMetrics::new();
        let mut tally = SignoffTally::default();
        let done = Uuid::new_v4();
        let abandoned = Uuid::new_v4();

        let waiting = |pending| SigningState::AwaitingSignatures { pending };
        let failed = SigningState::Failed {
            reason: "timeout".into(),
        };
        tally.observe(&metrics, &event(done, waiting(2)));
        tally.observe(&metrics, &event(abandoned, waiting(3)));
        tally.observe(&metrics, &event(abandoned, failed));
        tally.observe(&metrics, &event(done, SigningState::FullySigned));

        // Two counterparties signed off on the flow that completed.
        assert_eq!(metrics.counterparty_signoffs_total.get(), 2);
        assert!(tally.pending.is_empty());
    }
}
