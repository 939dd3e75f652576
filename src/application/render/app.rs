use axum::http::Uri;
use serde_json::Value;

use crate::{
    application::{
        error::RenderError,
        graphql::{GraphQlClient, Operation},
    },
    domain::{
        routing::RenderOutcome,
        style::{StyleRegistry, Theme},
    },
};

/// Path and query of the page being rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub query: Option<String>,
}

impl Location {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: None,
        }
    }

    pub fn from_uri(uri: &Uri) -> Self {
        Self {
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
        }
    }

    /// Parse a `path?query` string; anything unparseable is treated as `/`.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<Uri>() {
            Ok(uri) => Self::from_uri(&uri),
            Err(_) => Self::new("/"),
        }
    }

    /// Path without a trailing slash, `/` kept as is.
    pub fn normalized_path(&self) -> &str {
        let trimmed = self.path.trim_end_matches('/');
        if trimmed.is_empty() { "/" } else { trimmed }
    }

    pub fn href(&self) -> String {
        match self.query.as_deref() {
            Some(query) => format!("{}?{query}", self.path),
            None => self.path.clone(),
        }
    }
}

/// What a component tree can see while it renders.
pub struct RenderScope<'a> {
    location: &'a Location,
    client: &'a GraphQlClient,
    theme: &'a Theme,
    styles: &'a mut StyleRegistry,
}

impl<'a> RenderScope<'a> {
    pub fn new(
        location: &'a Location,
        client: &'a GraphQlClient,
        theme: &'a Theme,
        styles: &'a mut StyleRegistry,
    ) -> Self {
        Self {
            location,
            client,
            theme,
            styles,
        }
    }

    pub fn location(&self) -> &Location {
        self.location
    }

    pub fn client(&self) -> &GraphQlClient {
        self.client
    }

    /// Cached data for `operation`, if the prefetch pass produced it.
    pub fn data(&self, operation: &Operation) -> Option<Value> {
        self.client.read(operation)
    }

    pub fn theme(&self) -> &Theme {
        self.theme
    }

    pub fn styles(&mut self) -> &mut StyleRegistry {
        self.styles
    }
}

/// Root of a renderable component tree.
pub trait App: Send + Sync {
    fn name(&self) -> &'static str;

    /// Operations to prefetch before the synchronous render pass.
    fn data_requirements(&self, _location: &Location) -> Vec<Operation> {
        Vec::new()
    }

    fn render(&self, scope: &mut RenderScope<'_>) -> Result<RenderOutcome, RenderError>;
}
