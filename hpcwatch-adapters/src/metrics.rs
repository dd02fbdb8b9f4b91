//! Metrics adapter for the Prometheus query API.
//!
//! Works against Prometheus and VictoriaMetrics, which expose the same
//! `/api/v1/query` and `/api/v1/query_range` endpoints.
//!
//! ## Example
//!
//! ```rust,no_run
//! use hpcwatch_adapters::metrics::MetricsAdapter;
//! use hpcwatch_adapters::MetricsSource;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = MetricsAdapter::builder()
//!         .endpoint("http://victoria.local:8428")
//!         .token("secret")
//!         .build()?;
//!
//!     let rows = adapter.instant("qstat_total_r_jobs").await?;
//!     println!("{} series", rows.len());
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use hpcwatch_types::{Point, RangeWindow, RowSet, Series};

use crate::{FetchError, MetricsSource};

const DEFAULT_ENDPOINT: &str = "http://localhost:9090";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
enum Auth {
    None,
    Basic { username: String, password: String },
    Bearer(String),
}

/// HTTP adapter for the metrics backend.
#[derive(Debug, Clone)]
pub struct MetricsAdapter {
    client: Client,
    endpoint: String,
    auth: Auth,
}

impl MetricsAdapter {
    /// Create a new builder for configuring the adapter.
    pub fn builder() -> MetricsAdapterBuilder {
        MetricsAdapterBuilder::default()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::None => request,
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
            Auth::Bearer(token) => request.bearer_auth(token),
        }
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<RowSet, FetchError> {
        let url = format!("{}{}", self.endpoint, path);

        let response = self
            .authorized(self.client.get(&url))
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::rejected(format!(
                "authentication failed ({status})"
            )));
        }

        // Bad queries come back as 400/422 with an error body worth keeping
        let body = response.bytes().await?;
        if !status.is_success() {
            let detail = serde_json::from_slice::<ApiResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| format!("API returned status {status}"));
            return Err(FetchError::rejected(detail));
        }

        parse_response(&body)
    }
}

#[async_trait]
impl MetricsSource for MetricsAdapter {
    async fn instant(&self, query: &str) -> Result<RowSet, FetchError> {
        debug!(query, "Instant query");
        self.get("/api/v1/query", &[("query", query.to_string())])
            .await
    }

    async fn range(&self, query: &str, window: &RangeWindow) -> Result<RowSet, FetchError> {
        debug!(query, step = window.step, "Range query");
        self.get(
            "/api/v1/query_range",
            &[
                ("query", query.to_string()),
                ("start", window.start.timestamp().to_string()),
                ("end", window.end.timestamp().to_string()),
                ("step", window.step.to_string()),
            ],
        )
        .await
    }
}

/// Builder for [`MetricsAdapter`].
#[derive(Debug, Default)]
pub struct MetricsAdapterBuilder {
    endpoint: Option<String>,
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
    timeout: Option<Duration>,
}

impl MetricsAdapterBuilder {
    /// Set the API base URL (e.g., "http://localhost:9090").
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Use HTTP basic authentication.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Use a bearer token. Takes precedence over basic credentials.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the per-request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the adapter.
    pub fn build(self) -> Result<MetricsAdapter, FetchError> {
        let client = Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| FetchError::rejected(format!("failed to build HTTP client: {e}")))?;

        let auth = match (self.token, self.username, self.password) {
            (Some(token), _, _) => Auth::Bearer(token),
            (None, Some(username), Some(password)) => Auth::Basic { username, password },
            _ => Auth::None,
        };

        let endpoint = self
            .endpoint
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(MetricsAdapter {
            client,
            endpoint,
            auth,
        })
    }
}

/// Envelope returned by both query endpoints.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<ApiData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiData {
    #[serde(rename = "resultType")]
    result_type: String,
    result: Value,
}

#[derive(Debug, Deserialize)]
struct ApiSeries {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    #[serde(default)]
    value: Option<(f64, String)>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

impl From<ApiSeries> for Series {
    fn from(raw: ApiSeries) -> Self {
        let points = raw
            .value
            .into_iter()
            .chain(raw.values)
            .map(|(timestamp, value)| Point { timestamp, value })
            .collect();

        Series {
            labels: raw.metric,
            points,
        }
    }
}

/// Decode a query response body into a row set.
fn parse_response(body: &[u8]) -> Result<RowSet, FetchError> {
    let response: ApiResponse = serde_json::from_slice(body)
        .map_err(|e| FetchError::malformed(format!("invalid response body: {e}")))?;

    if response.status != "success" {
        return Err(FetchError::rejected(
            response
                .error
                .unwrap_or_else(|| format!("query status {}", response.status)),
        ));
    }

    let data = response
        .data
        .ok_or_else(|| FetchError::malformed("response has no data"))?;

    match data.result_type.as_str() {
        "vector" | "matrix" => {
            let series: Vec<ApiSeries> = serde_json::from_value(data.result)
                .map_err(|e| FetchError::malformed(format!("invalid series: {e}")))?;
            Ok(series.into_iter().map(Series::from).collect())
        }
        "scalar" | "string" => {
            let (timestamp, value): (f64, String) = serde_json::from_value(data.result)
                .map_err(|e| FetchError::malformed(format!("invalid scalar: {e}")))?;
            Ok(vec![Series::new().point(timestamp, value)])
        }
        other => Err(FetchError::malformed(format!(
            "unsupported result type '{other}'"
        ))),
    }
}
