use crate::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, error};

mod adapter;
pub use adapter::{SearchResult, decode_item, decode_result};

pub const ENDPOINT_VAR: &str = "RETRIEVER_ENDPOINT";
pub const ARG_PREFIX: &str = "RETRIEVER_ARG_";

/// Where the search endpoint lives and which extra query parameters to send with every request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrieverConfig {
    pub endpoint: String,
    pub params: BTreeMap<String, String>,
}

impl RetrieverConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Reads `RETRIEVER_ENDPOINT` and every `RETRIEVER_ARG_*` variable from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(
            std::env::vars_os()
                .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?))),
        )
    }

    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut endpoint = None;
        let mut params = BTreeMap::new();

        for (key, value) in vars {
            let key = key.as_ref();
            if key == ENDPOINT_VAR {
                endpoint = Some(value.into());
            } else if let Some(name) = key.strip_prefix(ARG_PREFIX) {
                params.insert(name.to_lowercase(), value.into());
            }
        }

        match endpoint {
            Some(endpoint) if !endpoint.is_empty() => Ok(Self { endpoint, params }),
            _ => Err(Error::ConfigError(format!(
                "{} environment variable not set",
                ENDPOINT_VAR
            ))),
        }
    }
}

/// Pulls the `results` array out of a response body. A missing field means no results.
fn result_items(body: Value) -> Result<Vec<Value>> {
    let mut body = match body {
        Value::Object(body) => body,
        other => {
            return Err(Error::DecodeError(format!(
                "expected a json object response, found {}",
                other
            )));
        }
    };

    match body.remove("results") {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(Error::DecodeError(format!(
            "expected results to be an array, found {}",
            other
        ))),
    }
}

/// Fetches search results for one query from a custom HTTP endpoint.
pub struct CustomRetriever {
    query: String,
    config: RetrieverConfig,
    client: reqwest::Client,
}

impl CustomRetriever {
    /// Domain hints are accepted for interface parity but never sent; the endpoint has no domain filter.
    pub fn new(
        query: impl Into<String>,
        query_domains: Option<Vec<String>>,
        config: RetrieverConfig,
    ) -> Self {
        let query = query.into();

        if let Some(domains) = query_domains.filter(|d| !d.is_empty()) {
            debug!(query = %query, ?domains, "ignoring domain hints");
        }

        Self {
            query,
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Returns at most `max_results` results in endpoint order.
    ///
    /// Network failures, HTTP errors and bodies that are not json are logged and
    /// yield an empty list. A json body of the wrong shape or a malformed result
    /// item is an error. Items past `max_results` are never decoded.
    pub async fn search(&self, max_results: usize) -> Result<Vec<SearchResult>> {
        let body = match self.fetch().await {
            Ok(body) => body,
            Err(e) => {
                error!(query = %self.query, "Failed to retrieve search results: {}", e);
                return Ok(Vec::new());
            }
        };
        let items = result_items(body)?;

        let mut results = Vec::with_capacity(max_results.min(items.len()));
        for item in &items {
            if results.len() >= max_results {
                break;
            }
            results.push(decode_item(item)?);
        }

        debug!(query = %self.query, received = items.len(), returned = results.len(), "search complete");

        Ok(results)
    }

    async fn fetch(&self) -> reqwest::Result<Value> {
        let mut params = self.config.params.clone();
        params.insert("query".to_string(), self.query.clone());

        self.client
            .get(&self.config.endpoint)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use axum::{Json, Router, extract::Query, http::StatusCode, routing::get};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use std::collections::HashMap;

    pub fn encode(url: &str, text: &str) -> String {
        STANDARD.encode(serde_json::json!({"URL": url, "Clean-Text": text}).to_string())
    }

    /// Serves `respond` on a local port and returns the search URL.
    pub async fn spawn_endpoint<F>(respond: F) -> String
    where
        F: Fn(HashMap<String, String>) -> (StatusCode, serde_json::Value)
            + Clone
            + Send
            + Sync
            + 'static,
    {
        let app = Router::new().route(
            "/search",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let respond = respond.clone();
                async move {
                    let (status, body) = respond(params);
                    (status, Json(body))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test endpoint");
        let addr = listener.local_addr().expect("test endpoint address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test endpoint");
        });

        format!("http://{}/search", addr)
    }

    /// Serves a fixed non-json body with status 200.
    pub async fn spawn_text_endpoint(body: &'static str) -> String {
        let app = Router::new().route("/search", get(move || async move { body }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test endpoint");
        let addr = listener.local_addr().expect("test endpoint address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test endpoint");
        });

        format!("http://{}/search", addr)
    }

    /// A URL on which nothing is listening.
    pub fn refused_endpoint() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind unused port");
        let addr = listener.local_addr().expect("unused port address");
        drop(listener);
        format!("http://{}/search", addr)
    }
}
