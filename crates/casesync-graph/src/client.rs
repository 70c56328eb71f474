//! SPARQL protocol client.
//!
//! Reads go either to the remote source or to the local store; writes always
//! go to the local store. Requests to the local store are sent with the
//! `mu-auth-sudo` header so they bypass per-user graph scoping.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

use casesync_core::sparql::{GraphScope, InsertData, SparqlQuery};
use casesync_core::{CaseSyncError, CaseSyncResult, SourceMode, SyncConfig};

use crate::results::SelectResults;

const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";
const SUDO_HEADER: &str = "mu-auth-sudo";

/// Which endpoint a read is sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Local,
    Remote(String),
}

/// Destination of a read plus whether it may be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTarget {
    pub endpoint: Endpoint,
    pub may_retry: bool,
}

impl QueryTarget {
    pub fn local() -> Self {
        Self {
            endpoint: Endpoint::Local,
            may_retry: false,
        }
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            endpoint: Endpoint::Remote(url.into()),
            may_retry: true,
        }
    }
}

/// Where records and their facts are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadSource {
    pub scope: GraphScope,
    pub target: QueryTarget,
}

impl ReadSource {
    pub fn from_config(config: &SyncConfig) -> Self {
        match config.source() {
            SourceMode::Remote { endpoint } => Self {
                scope: GraphScope::Any,
                target: QueryTarget::remote(endpoint),
            },
            SourceMode::Mock { graph } => Self {
                scope: GraphScope::Named(graph),
                target: QueryTarget::local(),
            },
        }
    }
}

/// Query/update access to the triple stores.
#[async_trait]
pub trait SparqlGateway: Send + Sync {
    /// Run a SELECT query.
    async fn select(
        &self,
        query: &SparqlQuery,
        target: &QueryTarget,
    ) -> CaseSyncResult<SelectResults>;

    /// Insert statements into one graph of the local store.
    async fn insert(&self, data: &InsertData) -> CaseSyncResult<()>;
}

/// Gateway over the SPARQL 1.1 HTTP protocol.
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    local_endpoint: String,
}

impl HttpGateway {
    pub fn new(local_endpoint: &str, timeout: Duration) -> CaseSyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                CaseSyncError::config(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            local_endpoint: local_endpoint.to_string(),
        })
    }

    pub fn from_config(config: &SyncConfig) -> CaseSyncResult<Self> {
        Self::new(&config.local_endpoint, config.request_timeout())
    }

    fn resolve<'a>(&'a self, endpoint: &'a Endpoint) -> (&'a str, bool) {
        match endpoint {
            Endpoint::Local => (&self.local_endpoint, true),
            Endpoint::Remote(url) => (url, false),
        }
    }

    async fn post_form(
        &self,
        url: &str,
        sudo: bool,
        form: &[(&str, &str)],
    ) -> CaseSyncResult<reqwest::Response> {
        let mut request = self
            .client
            .post(url)
            .header(ACCEPT, SPARQL_RESULTS_JSON)
            .form(form);
        if sudo {
            request = request.header(SUDO_HEADER, "true");
        }

        let response = request
            .send()
            .await
            .map_err(|e| CaseSyncError::transient(url, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if is_transient_status(status) {
            Err(CaseSyncError::transient(url, format!("{}: {}", status, body)))
        } else {
            Err(CaseSyncError::Rejected {
                endpoint: url.to_string(),
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

#[async_trait]
impl SparqlGateway for HttpGateway {
    async fn select(
        &self,
        query: &SparqlQuery,
        target: &QueryTarget,
    ) -> CaseSyncResult<SelectResults> {
        let (url, sudo) = self.resolve(&target.endpoint);
        debug!(endpoint = url, "Sending SPARQL query");

        let response = self.post_form(url, sudo, &[("query", query.as_str())]).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|e| CaseSyncError::transient(url, format!("failed to read body: {}", e)))?;

        serde_json::from_str(&body).map_err(|e| {
            CaseSyncError::malformed(format!(
                "{} returned undecodable results ({}): {}",
                url, content_type, e
            ))
        })
    }

    async fn insert(&self, data: &InsertData) -> CaseSyncResult<()> {
        let update = data.to_update();
        debug!(graph = %data.graph, statements = data.statements.len(), "Sending SPARQL update");

        self.post_form(&self.local_endpoint, true, &[("update", update.as_str())])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Form, Router};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use casesync_core::sparql::SelectBuilder;

    /// What the stub store saw for one request.
    #[derive(Debug, Clone)]
    struct Received {
        sudo: Option<String>,
        accept: Option<String>,
        form: HashMap<String, String>,
    }

    #[derive(Clone)]
    struct Stub {
        status: StatusCode,
        body: &'static str,
        received: Arc<Mutex<Vec<Received>>>,
    }

    fn header(headers: &HeaderMap, name: &str) -> Option<String> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    async fn respond(
        State(stub): State<Stub>,
        headers: HeaderMap,
        Form(form): Form<HashMap<String, String>>,
    ) -> (StatusCode, [(&'static str, &'static str); 1], &'static str) {
        stub.received.lock().unwrap().push(Received {
            sudo: header(&headers, SUDO_HEADER),
            accept: header(&headers, "accept"),
            form,
        });
        (stub.status, [("content-type", SPARQL_RESULTS_JSON)], stub.body)
    }

    /// Serve `status`/`body` for every POST on an ephemeral port.
    async fn stub_store(
        status: StatusCode,
        body: &'static str,
    ) -> (String, Arc<Mutex<Vec<Received>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new().route("/sparql", post(respond)).with_state(Stub {
            status,
            body,
            received: received.clone(),
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/sparql", addr), received)
    }

    const ONE_ROW: &str = r#"{
      "head": { "vars": ["s"] },
      "results": { "bindings": [ { "s": { "type": "uri", "value": "http://ex.org/a" } } ] }
    }"#;

    fn query() -> SparqlQuery {
        SelectBuilder::new(&["s"]).pattern("?s ?p ?o .").build()
    }

    fn gateway(local: &str) -> HttpGateway {
        HttpGateway::new(local, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_local_select_is_sudo_form_post() {
        let (url, received) = stub_store(StatusCode::OK, ONE_ROW).await;

        let results = gateway(&url)
            .select(&query(), &QueryTarget::local())
            .await
            .unwrap();
        assert_eq!(results.solutions().len(), 1);

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].sudo.as_deref(), Some("true"));
        assert_eq!(received[0].accept.as_deref(), Some(SPARQL_RESULTS_JSON));
        assert_eq!(received[0].form.get("query").map(String::as_str), Some(query().as_str()));
    }

    #[tokio::test]
    async fn test_remote_select_has_no_sudo_header() {
        let (url, received) = stub_store(StatusCode::OK, ONE_ROW).await;

        gateway("http://127.0.0.1:9/unused")
            .select(&query(), &QueryTarget::remote(url))
            .await
            .unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].sudo, None);
        assert!(received[0].form.contains_key("query"));
    }

    #[tokio::test]
    async fn test_insert_posts_update_to_local_store() {
        let (url, received) = stub_store(StatusCode::NO_CONTENT, "").await;
        let data = InsertData::new(
            "http://mu.semte.ch/graphs/organizations/42",
            vec!["<http://ex.org/a> <http://ex.org/p> \"x\"".to_string()],
        );

        gateway(&url).insert(&data).await.unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received[0].sudo.as_deref(), Some("true"));
        assert_eq!(
            received[0].form.get("update").map(String::as_str),
            Some(data.to_update().as_str())
        );
        assert!(!received[0].form.contains_key("query"));
    }

    #[tokio::test]
    async fn test_status_classification() {
        for status in [
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::REQUEST_TIMEOUT,
        ] {
            let (url, _) = stub_store(status, "busy").await;
            let err = gateway(&url)
                .select(&query(), &QueryTarget::local())
                .await
                .unwrap_err();
            assert!(err.is_transient(), "{} should be transient", status);
        }

        let (url, _) = stub_store(StatusCode::BAD_REQUEST, "parse error").await;
        let err = gateway(&url)
            .select(&query(), &QueryTarget::local())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CaseSyncError::Rejected { status: 400, ref body, .. } if body == "parse error"
        ));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_malformed() {
        let (url, _) = stub_store(StatusCode::OK, "<html>not json</html>").await;
        let err = gateway(&url)
            .select(&query(), &QueryTarget::local())
            .await
            .unwrap_err();
        assert!(matches!(err, CaseSyncError::MalformedResults(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transient() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = gateway(&format!("http://{}/sparql", addr))
            .select(&query(), &QueryTarget::local())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_read_source_follows_config() {
        let remote = ReadSource::from_config(&SyncConfig::default());
        assert_eq!(remote.scope, GraphScope::Any);
        assert!(remote.target.may_retry);
        assert!(matches!(remote.target.endpoint, Endpoint::Remote(_)));

        let mock_config = SyncConfig {
            remote_endpoint: None,
            ..SyncConfig::default()
        };
        let mock = ReadSource::from_config(&mock_config);
        assert_eq!(
            mock.scope,
            GraphScope::Named(casesync_core::config::DEFAULT_MOCK_GRAPH.to_string())
        );
        assert_eq!(mock.target, QueryTarget::local());
    }
}
