#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use hydrant::{
    application::{
        error::RenderError,
        graphql::{
            ClientEnvironment, Credentials, GraphQlClient, GraphQlResponse, Link, LinkError,
            Operation,
        },
        render::{App, ClientFactory, Location, PageRequest, RenderConfig, RenderScope, Renderer},
    },
    domain::{
        assets::AssetManifest,
        routing::{RenderOutcome, RouteSignals},
        style::{StyleRule, Theme},
    },
};
use serde_json::{Value, json};

pub const MANIFEST: &str = r#"{
    "client": { "js": "/c.js", "css": "/c.css" },
    "vendor": { "js": "/v.js" }
}"#;

pub const PRODUCT_QUERY: &str = "query Product { product(id: 7) { id name price } }";

/// Transport answering every operation with the same payload.
pub struct StubLink {
    pub calls: AtomicUsize,
    pub response: Result<GraphQlResponse, LinkError>,
}

#[async_trait]
impl Link for StubLink {
    async fn execute(&self, _operation: &Operation) -> Result<GraphQlResponse, LinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }
}

pub struct StubClients {
    pub link: Arc<StubLink>,
    pub seen: Mutex<Vec<PageRequest>>,
}

impl StubClients {
    pub fn answering(data: Value) -> Arc<Self> {
        Self::with_response(Ok(GraphQlResponse::from_data(data)))
    }

    pub fn failing(error: LinkError) -> Arc<Self> {
        Self::with_response(Err(error))
    }

    fn with_response(response: Result<GraphQlResponse, LinkError>) -> Arc<Self> {
        Arc::new(Self {
            link: Arc::new(StubLink {
                calls: AtomicUsize::new(0),
                response,
            }),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.link.calls.load(Ordering::SeqCst)
    }
}

impl ClientFactory for StubClients {
    fn create(&self, request: &PageRequest) -> Result<GraphQlClient, LinkError> {
        self.seen
            .lock()
            .expect("seen lock")
            .push(request.clone());
        Ok(GraphQlClient::with_link(
            self.link.clone(),
            ClientEnvironment::Server,
        ))
    }
}

pub fn product_data() -> Value {
    json!({
        "product": { "__typename": "Product", "id": 7, "name": "Kettle <b>", "price": 42 }
    })
}

/// Product page exercising data, styles and both routing signals.
pub struct ProductApp;

impl App for ProductApp {
    fn name(&self) -> &'static str {
        "ProductApp"
    }

    fn data_requirements(&self, _location: &Location) -> Vec<Operation> {
        vec![Operation::new(PRODUCT_QUERY)]
    }

    fn render(&self, scope: &mut RenderScope<'_>) -> Result<RenderOutcome, RenderError> {
        let path = scope.location().normalized_path().to_string();
        if path == "/boom" {
            return Err(RenderError::component("ProductCard", "price missing"));
        }

        let primary = scope.theme().palette.primary.clone();
        let class = scope.styles().class_name("card");
        scope.styles().register(
            "ProductCard",
            vec![StyleRule::new(format!(".{class}")).declare("color", primary)],
        );

        let name = scope
            .data(&Operation::new(PRODUCT_QUERY))
            .and_then(|data| data["product"]["name"].as_str().map(str::to_string))
            .unwrap_or_else(|| "unavailable".to_string());

        let mut signals = RouteSignals::new();
        match path.as_str() {
            "/moved" => signals.redirect("/products/7"),
            "/gone" => signals.not_found(),
            "/both" => {
                signals.not_found();
                signals.redirect("/elsewhere");
            }
            _ => {}
        }

        Ok(signals.into_outcome(format!(r#"<article class="{class}">{name}</article>"#)))
    }
}

pub fn render_config() -> RenderConfig {
    RenderConfig {
        graphql_api_url: "http://127.0.0.1:4000/graphql".to_string(),
        credentials: Credentials::SameOrigin,
        timeout: Duration::from_secs(1),
        title: "Shop".to_string(),
        description: "A test shop".to_string(),
        favicon: "/favicon.ico".to_string(),
        class_prefix: "hy".to_string(),
        theme: Theme::default(),
        prefetch: Vec::new(),
        script_order: vec!["vendor".to_string(), "client".to_string()],
        style_order: vec!["client".to_string()],
    }
}

pub fn renderer(clients: Arc<StubClients>) -> Renderer {
    let manifest = AssetManifest::from_json(MANIFEST).expect("manifest");
    Renderer::new(
        render_config(),
        Arc::new(manifest),
        Arc::new(ProductApp),
        clients,
    )
}

/// The JSON assigned to the state global inside the document.
pub fn embedded_state(html: &str) -> Value {
    let start_marker = "window.APOLLO_STATE = ";
    let start = html.find(start_marker).expect("state script") + start_marker.len();
    let end = html[start..].find(";</script>").expect("state end") + start;
    serde_json::from_str(&html[start..end]).expect("state json")
}
