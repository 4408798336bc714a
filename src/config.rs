use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;
use crate::formatter::{DocumentFormatter, JsonDocumentFormatter, DEFAULT_TIMESTAMP_FIELD};
use crate::index::{IndexTemplate, DEFAULT_INDEX_FORMAT};
use crate::response::ResponsePolicy;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Supplies an externally managed HTTP client. The sink uses it but never
/// alters its defaults and never tears it down.
pub type ClientFactory = Box<dyn FnOnce() -> Option<Client> + Send>;

/// Configuration for [`ElasticsearchSink`](crate::elasticsearch::ElasticsearchSink).
///
/// Only the server URL and API key are required; everything else has a
/// default and can be overridden with the `with_*` methods. Nothing is
/// checked until the sink is constructed.
pub struct ElasticsearchConfig {
    /// Base URL of the cluster, e.g. "https://localhost:9200".
    pub server_url: String,
    /// Sent as `Authorization: ApiKey <api_key>`.
    pub api_key: String,
    /// Index template, see [`IndexTemplate`].
    pub index_format: String,
    pub timeout: Duration,
    /// Ingest pipeline appended as `?pipeline=<name>`.
    pub pipeline: Option<String>,
    /// Extra headers attached to every bulk request.
    pub headers: Vec<(String, String)>,
    /// Write `RenderedMessage` into documents.
    pub render_message: bool,
    pub timestamp_field: String,
    pub response_policy: ResponsePolicy,
    /// Replaces the built-in document shape when set.
    pub formatter: Option<Arc<dyn DocumentFormatter>>,
    /// Switches the sink to a shared, externally owned client.
    pub client_factory: Option<ClientFactory>,
}

impl ElasticsearchConfig {
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        ElasticsearchConfig {
            server_url: server_url.into(),
            api_key: api_key.into(),
            index_format: DEFAULT_INDEX_FORMAT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            pipeline: None,
            headers: Vec::new(),
            render_message: false,
            timestamp_field: DEFAULT_TIMESTAMP_FIELD.to_string(),
            response_policy: ResponsePolicy::default(),
            formatter: None,
            client_factory: None,
        }
    }

    pub fn with_index_format(mut self, format: impl Into<String>) -> Self {
        self.index_format = format.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.pipeline = Some(pipeline.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_render_message(mut self, render: bool) -> Self {
        self.render_message = render;
        self
    }

    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }

    pub fn with_response_policy(mut self, policy: ResponsePolicy) -> Self {
        self.response_policy = policy;
        self
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn DocumentFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn with_client_factory<F>(mut self, factory: F) -> Self
    where
        F: FnOnce() -> Option<Client> + Send + 'static,
    {
        self.client_factory = Some(Box::new(factory));
        self
    }

    /// Share an existing client, e.g. one pooled with other services.
    pub fn with_shared_client(self, client: Client) -> Self {
        self.with_client_factory(move || Some(client))
    }

    /// Check every setting and freeze the result.
    pub(crate) fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let endpoint = bulk_endpoint(&self.server_url, self.pipeline.as_deref())?;

        if self.api_key.trim().is_empty() {
            return Err(ConfigError::BlankApiKey);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::NonPositiveTimeout);
        }
        if self.timestamp_field.trim().is_empty() {
            return Err(ConfigError::BlankTimestampField);
        }

        let index = IndexTemplate::parse(&self.index_format)?;
        let headers = request_headers(&self.api_key, &self.headers)?;

        let client = match self.client_factory {
            Some(factory) => ClientSource::Shared(factory().ok_or(ConfigError::MissingClient)?),
            None => ClientSource::Owned,
        };

        let formatter = self.formatter.unwrap_or_else(|| {
            Arc::new(JsonDocumentFormatter::new(self.timestamp_field, self.render_message))
        });

        Ok(ValidatedConfig {
            endpoint,
            headers,
            timeout: self.timeout,
            index,
            formatter,
            response_policy: self.response_policy,
            client,
        })
    }
}

impl fmt::Debug for ElasticsearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElasticsearchConfig")
            .field("server_url", &self.server_url)
            .field("api_key", &"<redacted>")
            .field("index_format", &self.index_format)
            .field("timeout", &self.timeout)
            .field("pipeline", &self.pipeline)
            .field("headers", &self.headers.iter().map(|(name, _)| name).collect::<Vec<_>>())
            .field("render_message", &self.render_message)
            .field("timestamp_field", &self.timestamp_field)
            .field("response_policy", &self.response_policy)
            .field("custom_formatter", &self.formatter.is_some())
            .field("shared_client", &self.client_factory.is_some())
            .finish()
    }
}

/// Where the transport gets its client from.
pub(crate) enum ClientSource {
    /// Build and own a client.
    Owned,
    /// Use a client someone else owns.
    Shared(Client),
}

pub(crate) struct ValidatedConfig {
    pub endpoint: Url,
    pub headers: HeaderMap,
    pub timeout: Duration,
    pub index: IndexTemplate,
    pub formatter: Arc<dyn DocumentFormatter>,
    pub response_policy: ResponsePolicy,
    pub client: ClientSource,
}

/// `<server>/_bulk`, plus `?pipeline=<name>` when a pipeline is set.
fn bulk_endpoint(server_url: &str, pipeline: Option<&str>) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidServerUrl {
        url: server_url.to_string(),
        reason,
    };

    let base = Url::parse(server_url.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", base.scheme())));
    }
    if base.query().is_some() || base.fragment().is_some() {
        return Err(invalid("base url must not carry a query or fragment".to_string()));
    }

    let mut endpoint = format!("{}/_bulk", base.as_str().trim_end_matches('/'));
    if let Some(pipeline) = pipeline.filter(|p| !p.is_empty()) {
        endpoint.push_str("?pipeline=");
        endpoint.push_str(&urlencoding::encode(pipeline));
    }

    Url::parse(&endpoint).map_err(|e| invalid(e.to_string()))
}

/// Headers the sink sets itself; custom headers may not replace them.
const RESERVED_HEADERS: [HeaderName; 3] = [AUTHORIZATION, ACCEPT, CONTENT_TYPE];

/// Auth, accept and custom headers sent with every bulk request.
fn request_headers(api_key: &str, custom: &[(String, String)]) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();

    let mut auth = HeaderValue::from_str(&format!("ApiKey {}", api_key.trim())).map_err(|e| {
        ConfigError::InvalidHeader { name: AUTHORIZATION.to_string(), reason: e.to_string() }
    })?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    for (name, value) in custom {
        let invalid = |reason: String| ConfigError::InvalidHeader { name: name.clone(), reason };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        if RESERVED_HEADERS.contains(&header_name) {
            return Err(invalid("header is set by the sink and cannot be overridden".to_string()));
        }
        let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ElasticsearchConfig {
        ElasticsearchConfig::new("http://localhost:9200", "c2VjcmV0")
    }

    #[test]
    fn defaults_validate() {
        let validated = config().validate().unwrap();
        assert_eq!(validated.endpoint.as_str(), "http://localhost:9200/_bulk");
        assert_eq!(validated.headers[AUTHORIZATION], "ApiKey c2VjcmV0");
        assert_eq!(validated.headers[ACCEPT], "application/json");
        assert_eq!(validated.timeout, DEFAULT_TIMEOUT);
        assert!(matches!(validated.client, ClientSource::Owned));
    }

    #[test]
    fn pipeline_is_url_escaped() {
        let validated = config().with_pipeline("geo ip&enrich").validate().unwrap();
        assert_eq!(
            validated.endpoint.as_str(),
            "http://localhost:9200/_bulk?pipeline=geo%20ip%26enrich"
        );
    }

    #[test]
    fn base_path_is_kept() {
        let validated = ElasticsearchConfig::new("https://proxy.local/es/", "k").validate().unwrap();
        assert_eq!(validated.endpoint.as_str(), "https://proxy.local/es/_bulk");
    }

    #[test]
    fn custom_headers_are_collected() {
        let validated = config().with_header("X-Tenant", "acme").validate().unwrap();
        assert_eq!(validated.headers["x-tenant"], "acme");
    }

    #[test]
    fn reserved_headers_cannot_be_overridden() {
        for (name, value) in [("Authorization", "Bearer x"), ("accept", "text/plain"), ("Content-Type", "text/plain")] {
            match rejected(config().with_header(name, value)) {
                ConfigError::InvalidHeader { name: rejected_name, .. } => assert_eq!(rejected_name, name),
                other => panic!("expected invalid header for {}, got {:?}", name, other),
            }
        }
    }

    fn rejected(cfg: ElasticsearchConfig) -> ConfigError {
        let debug = format!("{:?}", cfg);
        match cfg.validate() {
            Err(e) => e,
            Ok(_) => panic!("expected {} to be rejected", debug),
        }
    }

    #[test]
    fn rejects_invalid_settings() {
        assert!(matches!(rejected(ElasticsearchConfig::new("", "k")), ConfigError::InvalidServerUrl { .. }));
        assert!(matches!(rejected(ElasticsearchConfig::new("ftp://host", "k")), ConfigError::InvalidServerUrl { .. }));
        assert!(matches!(rejected(ElasticsearchConfig::new("http://host", "  ")), ConfigError::BlankApiKey));
        assert!(matches!(rejected(config().with_timeout(Duration::ZERO)), ConfigError::NonPositiveTimeout));
        assert!(matches!(rejected(config().with_timestamp_field("")), ConfigError::BlankTimestampField));
        assert!(matches!(
            rejected(config().with_index_format("logs-{0:yyyy")),
            ConfigError::InvalidIndexFormat { .. }
        ));
        assert!(matches!(rejected(config().with_header("bad header", "v")), ConfigError::InvalidHeader { .. }));
        assert!(matches!(rejected(config().with_header("X-Ok", "line\nbreak")), ConfigError::InvalidHeader { .. }));
        assert!(matches!(rejected(config().with_client_factory(|| None)), ConfigError::MissingClient));
    }

    #[test]
    fn debug_redacts_api_key() {
        let debug = format!("{:?}", config());
        assert!(!debug.contains("c2VjcmV0"));
    }

    #[test]
    fn shared_client_is_recorded() {
        let validated = config().with_shared_client(Client::new()).validate().unwrap();
        assert!(matches!(validated.client, ClientSource::Shared(_)));
    }
}
