//! Transport chain: the HTTP link and the error-observation link wrapping it.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use metrics::counter;
use reqwest::header::{ACCEPT, COOKIE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;
use url::{Origin, Url};

use super::operation::Operation;

const SOURCE: &str = "hydrant::graphql";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("invalid GraphQL endpoint `{url}`: {reason}")]
    Endpoint { url: String, reason: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("server responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode GraphQL response: {0}")]
    Decode(String),
}

impl LinkError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<SourceLocation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Value>,
}

impl GraphQlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: Vec::new(),
        }
    }

    fn display_locations(&self) -> DisplayList<'_, SourceLocation> {
        DisplayList(&self.locations)
    }

    fn display_path(&self) -> DisplayList<'_, Value> {
        DisplayList(&self.path)
    }
}

struct DisplayList<'a, T>(&'a [T]);

impl fmt::Display for DisplayList<'_, SourceLocation> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, loc) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}:{}", loc.line, loc.column)?;
        }
        Ok(())
    }
}

impl fmt::Display for DisplayList<'_, Value> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, segment) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(".")?;
            }
            match segment {
                Value::String(text) => f.write_str(text)?,
                other => write!(f, "{other}")?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQlError>,
}

impl GraphQlResponse {
    pub fn from_data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }
}

#[async_trait]
pub trait Link: Send + Sync {
    async fn execute(&self, operation: &Operation) -> Result<GraphQlResponse, LinkError>;
}

/// When the inbound request's cookies may travel to the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Credentials {
    Omit,
    #[default]
    SameOrigin,
    Include,
}

impl std::str::FromStr for Credentials {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "omit" => Ok(Self::Omit),
            "same-origin" => Ok(Self::SameOrigin),
            "include" => Ok(Self::Include),
            other => Err(format!(
                "unknown credentials mode `{other}` (expected omit|same-origin|include)"
            )),
        }
    }
}

pub struct HttpLink {
    http: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
    credentials: Credentials,
    cookie: Option<String>,
    page_origin: Option<Origin>,
}

impl HttpLink {
    pub fn new(http: reqwest::Client, endpoint: &str, timeout: Duration) -> Result<Self, LinkError> {
        let endpoint = parse_endpoint(endpoint)?;
        Ok(Self {
            http,
            endpoint,
            timeout,
            credentials: Credentials::default(),
            cookie: None,
            page_origin: None,
        })
    }

    pub fn with_credentials(
        mut self,
        credentials: Credentials,
        cookie: Option<String>,
        page_origin: Option<Origin>,
    ) -> Self {
        self.credentials = credentials;
        self.cookie = cookie;
        self.page_origin = page_origin;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn forwarded_cookie(&self) -> Option<&str> {
        let cookie = self.cookie.as_deref()?;
        match self.credentials {
            Credentials::Omit => None,
            Credentials::Include => Some(cookie),
            Credentials::SameOrigin => {
                let same = self
                    .page_origin
                    .as_ref()
                    .is_some_and(|origin| *origin == self.endpoint.origin());
                same.then_some(cookie)
            }
        }
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, LinkError> {
    let invalid = |reason: String| LinkError::Endpoint {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|err| invalid(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme `{other}`"))),
    }
}

#[async_trait]
impl Link for HttpLink {
    async fn execute(&self, operation: &Operation) -> Result<GraphQlResponse, LinkError> {
        let mut request = self
            .http
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .header(ACCEPT, "application/json")
            .json(operation);
        if let Some(cookie) = self.forwarded_cookie() {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await.map_err(LinkError::from_reqwest)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(LinkError::from_reqwest)?;
        if !status.is_success() {
            return Err(LinkError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        serde_json::from_slice(&bytes).map_err(|err| LinkError::Decode(err.to_string()))
    }
}

/// Logs GraphQL and transport errors reported by the wrapped link and passes
/// every result through untouched.
pub struct ErrorLink<L> {
    inner: L,
}

impl<L> ErrorLink<L> {
    pub fn new(inner: L) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }
}

#[async_trait]
impl<L: Link> Link for ErrorLink<L> {
    async fn execute(&self, operation: &Operation) -> Result<GraphQlResponse, LinkError> {
        let result = self.inner.execute(operation).await;
        let operation_name = operation.operation_name.as_deref().unwrap_or("");

        match &result {
            Ok(response) => {
                for error in &response.errors {
                    counter!("hydrant_graphql_error_total", "kind" => "graphql").increment(1);
                    warn!(
                        target = SOURCE,
                        operation = operation_name,
                        message = %error.message,
                        locations = %error.display_locations(),
                        path = %error.display_path(),
                        "[GraphQL error]"
                    );
                }
            }
            Err(err) => {
                counter!("hydrant_graphql_error_total", "kind" => "network").increment(1);
                warn!(
                    target = SOURCE,
                    operation = operation_name,
                    error = %err,
                    "[Network error]"
                );
            }
        }

        result
    }
}
