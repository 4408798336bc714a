//! Environment variable names used by this crate for convenient
//! configuration of sinks from microservices.
//!
//! These are purely helpers; the core sink types remain decoupled from
//! environment access.

use std::time::Duration;

use crate::config::ElasticsearchConfig;
use crate::error::ConfigError;

/// Elasticsearch base URL, e.g. `https://127.0.0.1:9200`.
pub const LOG_SINK_ELASTICSEARCH_URL_ENV: &str = "LOG_SINK_ELASTICSEARCH_URL";

/// API key sent as `Authorization: ApiKey <key>`.
pub const LOG_SINK_ELASTICSEARCH_API_KEY_ENV: &str = "LOG_SINK_ELASTICSEARCH_API_KEY";

/// Optional index template, e.g. `logs-{0:yyyy.MM.dd}`.
pub const LOG_SINK_ELASTICSEARCH_INDEX_FORMAT_ENV: &str = "LOG_SINK_ELASTICSEARCH_INDEX_FORMAT";

/// Optional ingest pipeline name.
pub const LOG_SINK_ELASTICSEARCH_PIPELINE_ENV: &str = "LOG_SINK_ELASTICSEARCH_PIPELINE";

/// Optional request timeout in milliseconds.
pub const LOG_SINK_ELASTICSEARCH_TIMEOUT_MS_ENV: &str = "LOG_SINK_ELASTICSEARCH_TIMEOUT_MS";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl ElasticsearchConfig {
    /// Build a config from the `LOG_SINK_ELASTICSEARCH_*` variables.
    ///
    /// URL and API key default to empty strings when unset, so a missing
    /// variable surfaces as a validation error when the sink is built.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = lookup(LOG_SINK_ELASTICSEARCH_URL_ENV).unwrap_or_default();
        let api_key = lookup(LOG_SINK_ELASTICSEARCH_API_KEY_ENV).unwrap_or_default();
        let mut config = ElasticsearchConfig::new(url, api_key);

        if let Some(format) = lookup(LOG_SINK_ELASTICSEARCH_INDEX_FORMAT_ENV) {
            config = config.with_index_format(format);
        }
        if let Some(pipeline) = lookup(LOG_SINK_ELASTICSEARCH_PIPELINE_ENV).filter(|p| !p.is_empty()) {
            config = config.with_pipeline(pipeline);
        }
        if let Some(raw) = lookup(LOG_SINK_ELASTICSEARCH_TIMEOUT_MS_ENV) {
            let millis: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::InvalidEnv {
                key: LOG_SINK_ELASTICSEARCH_TIMEOUT_MS_ENV,
                reason: e.to_string(),
            })?;
            config = config.with_timeout(Duration::from_millis(millis));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn reads_all_variables() {
        let config = ElasticsearchConfig::from_lookup(lookup(&[
            (LOG_SINK_ELASTICSEARCH_URL_ENV, "http://es:9200"),
            (LOG_SINK_ELASTICSEARCH_API_KEY_ENV, "key"),
            (LOG_SINK_ELASTICSEARCH_INDEX_FORMAT_ENV, "app-{0:yyyy.MM}"),
            (LOG_SINK_ELASTICSEARCH_PIPELINE_ENV, "enrich"),
            (LOG_SINK_ELASTICSEARCH_TIMEOUT_MS_ENV, "2500"),
        ]))
        .unwrap();

        assert_eq!(config.server_url, "http://es:9200");
        assert_eq!(config.api_key, "key");
        assert_eq!(config.index_format, "app-{0:yyyy.MM}");
        assert_eq!(config.pipeline.as_deref(), Some("enrich"));
        assert_eq!(config.timeout, Duration::from_millis(2500));
    }

    #[test]
    fn rejects_non_numeric_timeout() {
        let err = ElasticsearchConfig::from_lookup(lookup(&[(LOG_SINK_ELASTICSEARCH_TIMEOUT_MS_ENV, "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn missing_url_fails_validation() {
        let config = ElasticsearchConfig::from_lookup(lookup(&[])).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidServerUrl { .. })));
    }
}
