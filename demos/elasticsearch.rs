use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use tracing_bulk_sink::env::{env_or, LOG_SINK_ELASTICSEARCH_API_KEY_ENV, LOG_SINK_ELASTICSEARCH_URL_ENV};
use tracing_bulk_sink::init::{init_tracing_with_config, LayerConfig};
use tracing_bulk_sink::{ElasticsearchConfig, ElasticsearchSink};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Point these at your cluster, e.g.
    //   LOG_SINK_ELASTICSEARCH_URL=https://localhost:9200
    //   LOG_SINK_ELASTICSEARCH_API_KEY=<base64 id:key>
    let config = ElasticsearchConfig::new(
        env_or(LOG_SINK_ELASTICSEARCH_URL_ENV, "http://localhost:9200"),
        env_or(LOG_SINK_ELASTICSEARCH_API_KEY_ENV, "changeme"),
    )
    .with_index_format("demo-logs-{0:yyyy.MM.dd}")
    .with_render_message(true)
    .with_header("X-Service", "demo");

    let sink = Arc::new(ElasticsearchSink::new(config)?);

    let layer_config = LayerConfig {
        batch_size: 50,
        flush_interval: Duration::from_millis(500),
        ..LayerConfig::default()
    };
    init_tracing_with_config(sink, layer_config)?;

    info!(service = "demo", "service {{service}} started");
    warn!(latency_ms = 870, "slow upstream response: {{latency_ms}} ms");

    let err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer went away");
    error!(error = &err as &(dyn std::error::Error + 'static), order_id = 123, "order {{order_id}} failed");

    // Give the background task time to flush the batch.
    sleep(Duration::from_secs(2)).await;
    Ok(())
}
