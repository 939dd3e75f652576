use std::{sync::Arc, time::Instant};

use askama::Template;
use axum::http::StatusCode;
use futures::future::join_all;
use metrics::{counter, histogram};
use tracing::{debug, info, warn};
use url::Origin;

use crate::{
    application::{
        error::RenderError,
        graphql::{
            ClientEnvironment, ClientOptions, Credentials, GraphQlClient, LinkError, Operation,
            create_client,
        },
    },
    config::Settings,
    domain::{assets::AssetManifest, style::StyleRegistry, style::Theme},
    presentation::views::DocumentTemplate,
};

use super::{
    app::{App, Location, RenderScope},
    state::{STATE_GLOBAL, inline_css, serialize_state},
};

const SOURCE: &str = "hydrant::render";

/// Static inputs of every render, resolved once at startup.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub graphql_api_url: String,
    pub credentials: Credentials,
    pub timeout: std::time::Duration,
    pub title: String,
    pub description: String,
    pub favicon: String,
    pub class_prefix: String,
    pub theme: Theme,
    pub prefetch: Vec<Operation>,
    pub script_order: Vec<String>,
    pub style_order: Vec<String>,
}

impl From<&Settings> for RenderConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            graphql_api_url: settings.api_gateway.url.clone(),
            credentials: settings.api_gateway.credentials,
            timeout: settings.api_gateway.timeout,
            title: settings.app.title.clone(),
            description: settings.app.description.clone(),
            favicon: settings.app.favicon.clone(),
            class_prefix: settings.app.class_prefix.clone(),
            theme: settings.app.theme.clone(),
            prefetch: settings
                .app
                .prefetch
                .iter()
                .map(|document| Operation::new(document.clone()))
                .collect(),
            script_order: settings.assets.script_order.clone(),
            style_order: settings.assets.style_order.clone(),
        }
    }
}

/// Inbound page request as seen by the renderer.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub location: Location,
    pub cookie: Option<String>,
    pub origin: Option<Origin>,
}

impl PageRequest {
    pub fn new(location: Location) -> Self {
        Self {
            location,
            cookie: None,
            origin: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub status: StatusCode,
    /// `page`, `redirect` or `not_found`.
    pub outcome: &'static str,
    pub location: Option<String>,
    pub html: String,
}

/// Builds the per-request data client.
pub trait ClientFactory: Send + Sync {
    fn create(&self, request: &PageRequest) -> Result<GraphQlClient, LinkError>;
}

/// Clients talking to the configured GraphQL endpoint over HTTP.
pub struct HttpClientFactory {
    graphql_api_url: String,
    credentials: Credentials,
    timeout: std::time::Duration,
    http: reqwest::Client,
}

impl HttpClientFactory {
    pub fn new(config: &RenderConfig) -> Result<Self, LinkError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("hydrant/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| LinkError::Network(err.to_string()))?;
        Ok(Self {
            graphql_api_url: config.graphql_api_url.clone(),
            credentials: config.credentials,
            timeout: config.timeout,
            http,
        })
    }
}

impl ClientFactory for HttpClientFactory {
    fn create(&self, request: &PageRequest) -> Result<GraphQlClient, LinkError> {
        let options = ClientOptions {
            graphql_api_url: self.graphql_api_url.clone(),
            credentials: self.credentials,
            timeout: self.timeout,
            forwarded_cookie: request.cookie.clone(),
            page_origin: request.origin.clone(),
            http: Some(self.http.clone()),
        };
        create_client(options, ClientEnvironment::Server)
    }
}

pub struct Renderer {
    config: RenderConfig,
    manifest: Arc<AssetManifest>,
    app: Arc<dyn App>,
    clients: Arc<dyn ClientFactory>,
}

impl Renderer {
    pub fn new(
        config: RenderConfig,
        manifest: Arc<AssetManifest>,
        app: Arc<dyn App>,
        clients: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            config,
            manifest,
            app,
            clients,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render one page. Nothing is produced unless every step succeeds.
    pub async fn render(&self, request: &PageRequest) -> Result<RenderedPage, RenderError> {
        let started = Instant::now();
        let result = self.render_page(request).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!("hydrant_render_ms").record(elapsed_ms);

        match &result {
            Ok(page) => {
                counter!("hydrant_render_total", "outcome" => page.outcome)
                    .increment(1);
                info!(
                    target = SOURCE,
                    app = self.app.name(),
                    path = %request.location.path,
                    status = page.status.as_u16(),
                    outcome = page.outcome,
                    elapsed_ms,
                    "page rendered"
                );
            }
            Err(err) => {
                counter!("hydrant_render_failed_total").increment(1);
                warn!(
                    target = SOURCE,
                    app = self.app.name(),
                    path = %request.location.path,
                    error = %err,
                    "render aborted"
                );
            }
        }

        result
    }

    async fn render_page(&self, request: &PageRequest) -> Result<RenderedPage, RenderError> {
        let client = self.clients.create(request).map_err(RenderError::Client)?;
        let mut styles = StyleRegistry::new(self.config.class_prefix.as_str());

        self.prefetch(&client, &request.location).await;

        let outcome = {
            let mut scope = RenderScope::new(
                &request.location,
                &client,
                &self.config.theme,
                &mut styles,
            );
            self.app.render(&mut scope)?
        };

        let status = outcome.status();
        let label = outcome.label();
        let location = outcome.location().map(str::to_string);
        let css = inline_css(&styles.drain_css());
        let state = serialize_state(&client.extract())?;

        let document = DocumentTemplate {
            title: &self.config.title,
            description: &self.config.description,
            favicon: &self.config.favicon,
            styles: self.manifest.styles(&self.config.style_order),
            scripts: self.manifest.scripts(&self.config.script_order),
            css,
            state_global: STATE_GLOBAL,
            state,
            markup: outcome.markup(),
        };
        let html = document.render()?;

        Ok(RenderedPage {
            status,
            outcome: label,
            location,
            html,
        })
    }

    /// Warm the client cache with every operation the page needs. Failures
    /// were already reported by the client's error link.
    async fn prefetch(&self, client: &GraphQlClient, location: &Location) {
        let operations: Vec<Operation> = self
            .app
            .data_requirements(location)
            .into_iter()
            .chain(self.config.prefetch.iter().cloned())
            .collect();
        if operations.is_empty() {
            return;
        }

        let results = join_all(operations.iter().map(|operation| client.query(operation))).await;
        let failed = results.iter().filter(|result| result.is_err()).count();
        debug!(
            target = SOURCE,
            path = %location.path,
            operations = operations.len(),
            failed,
            "prefetch finished"
        );
    }
}
