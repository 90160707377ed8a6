use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tweetamo_pipeline::pipeline_metrics::{Metric, ALL_METRICS};

// Upstream source
pub(crate) const SOURCE_LINES_TOTAL: Metric = Metric {
    name: "tweetamo_source_lines_total",
    description: "Total lines read from the upstream source",
};

pub(crate) const SOURCE_INVALID_TOTAL: Metric = Metric {
    name: "tweetamo_source_invalid_total",
    description: "Total upstream lines that could not be turned into an event",
};

pub(crate) fn init_metrics(prom_addr: Option<std::net::SocketAddr>) -> Result<()> {
    info!("initializing metrics exporter");

    if let Some(addr) = prom_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context(format!("failed to install Prometheus exporter on {}", addr))?;
    }

    for metric in ALL_METRICS
        .iter()
        .chain([SOURCE_LINES_TOTAL, SOURCE_INVALID_TOTAL].iter())
    {
        metrics::describe_counter!(metric.name, metric.description);
    }
    Ok(())
}
