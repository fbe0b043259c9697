//! Prometheus counters for the graph endpoint and media ingestion.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

use crate::graph::OperationOutcome;

/// Content type of the text exposition produced by [`Metrics::render`].
pub const CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OperationLabels {
    operation: String,
    outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct UploadLabels {
    outcome: String,
}

pub struct Metrics {
    registry: Registry,
    graph_operations: Family<OperationLabels, Counter>,
    media_uploads: Family<UploadLabels, Counter>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let graph_operations = Family::<OperationLabels, Counter>::default();
        let media_uploads = Family::<UploadLabels, Counter>::default();

        registry.register(
            "forum_graph_operations",
            "Graph operations by name and outcome",
            graph_operations.clone(),
        );
        registry.register(
            "forum_media_uploads",
            "Media uploads by outcome",
            media_uploads.clone(),
        );

        Self { registry, graph_operations, media_uploads }
    }

    pub fn record_graph(&self, outcomes: &[OperationOutcome]) {
        for o in outcomes {
            self.graph_operations
                .get_or_create(&OperationLabels {
                    operation: o.operation.clone(),
                    outcome: o.outcome.to_ascii_lowercase(),
                })
                .inc();
        }
    }

    pub fn record_upload(&self, outcome: &str) {
        self.media_uploads
            .get_or_create(&UploadLabels { outcome: outcome.to_ascii_lowercase() })
            .inc();
    }

    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        encode(&mut out, &self.registry)?;
        Ok(out)
    }
}
