use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tracing::{debug, warn};
use url::Origin;

use crate::domain::{cache::NormalizedCache, selection::Selection};
use crate::util::lock::mutex_lock;

use super::{
    document::OperationKind,
    link::{Credentials, ErrorLink, GraphQlResponse, HttpLink, Link, LinkError},
    operation::Operation,
};

const SOURCE: &str = "application::graphql::client";

type InFlight = Shared<BoxFuture<'static, Result<GraphQlResponse, LinkError>>>;

/// Where the client runs, which decides how its cache starts out.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEnvironment {
    /// Server render: always an empty cache.
    Server,
    /// Browser: seeded from the bootstrap state global, when present.
    Browser { bootstrap: Option<Value> },
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub graphql_api_url: String,
    pub credentials: Credentials,
    pub timeout: Duration,
    pub forwarded_cookie: Option<String>,
    pub page_origin: Option<Origin>,
    /// Shared connection pool; a fresh one is built when absent.
    pub http: Option<reqwest::Client>,
}

impl ClientOptions {
    pub fn new(graphql_api_url: impl Into<String>) -> Self {
        Self {
            graphql_api_url: graphql_api_url.into(),
            credentials: Credentials::default(),
            timeout: Duration::from_secs(10),
            forwarded_cookie: None,
            page_origin: None,
            http: None,
        }
    }
}

/// Build a client whose transport logs every error it sees before handing
/// the result back.
pub fn create_client(
    options: ClientOptions,
    environment: ClientEnvironment,
) -> Result<GraphQlClient, LinkError> {
    let http = match options.http {
        Some(http) => http,
        None => reqwest::Client::builder()
            .user_agent(concat!("hydrant/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| LinkError::Network(err.to_string()))?,
    };

    let http_link = HttpLink::new(http, &options.graphql_api_url, options.timeout)?
        .with_credentials(
            options.credentials,
            options.forwarded_cookie,
            options.page_origin,
        );

    Ok(GraphQlClient::with_link(
        Arc::new(ErrorLink::new(http_link)),
        environment,
    ))
}

pub struct GraphQlClient {
    link: Arc<dyn Link>,
    cache: Mutex<NormalizedCache>,
    in_flight: DashMap<String, InFlight>,
    ssr: bool,
}

impl GraphQlClient {
    pub fn with_link(link: Arc<dyn Link>, environment: ClientEnvironment) -> Self {
        let (cache, ssr) = match environment {
            ClientEnvironment::Server => (NormalizedCache::new(), true),
            ClientEnvironment::Browser { bootstrap } => (restore_bootstrap(bootstrap), false),
        };

        Self {
            link,
            cache: Mutex::new(cache),
            in_flight: DashMap::new(),
            ssr,
        }
    }

    pub fn is_ssr(&self) -> bool {
        self.ssr
    }

    /// Cache-first query. Identical operations already in flight share one
    /// transport call.
    pub async fn query(&self, operation: &Operation) -> Result<GraphQlResponse, LinkError> {
        let selection = self.selection(operation);
        if let Some(selection) = selection.as_deref()
            && let Some(data) = self.read_selection(selection)
        {
            debug!(
                target = SOURCE,
                operation = operation.operation_name.as_deref().unwrap_or(""),
                "cache hit"
            );
            return Ok(GraphQlResponse::from_data(data));
        }

        let key = operation.dedup_key();
        let pending = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                let link = Arc::clone(&self.link);
                let owned = operation.clone();
                let future = async move { link.execute(&owned).await }
                    .boxed()
                    .shared();
                slot.insert(future.clone());
                future
            }
        };

        let result = pending.await;
        self.in_flight.remove(&key);

        if let Ok(response) = &result
            && let Some(data) = response.data.as_ref()
            && let Some(selection) = selection.as_deref()
        {
            mutex_lock(&self.cache, SOURCE, "write").write_root(selection, data);
        }

        result
    }

    /// Synchronous cache read used by the render pass. `None` unless every
    /// selected field is cached.
    pub fn read(&self, operation: &Operation) -> Option<Value> {
        let selection = operation.cache_selection()?;
        self.read_selection(&selection)
    }

    /// Store `data` as the result of `operation`. Ignored for operations the
    /// cache does not hold.
    pub fn write(&self, operation: &Operation, data: &Value) {
        if let Some(selection) = operation.cache_selection() {
            mutex_lock(&self.cache, SOURCE, "write").write_root(&selection, data);
        }
    }

    fn selection(&self, operation: &Operation) -> Option<Vec<Selection>> {
        match operation.document() {
            Ok(parsed) if parsed.kind == OperationKind::Query => Some(parsed.selections),
            Ok(_) => None,
            Err(err) => {
                debug!(
                    target = SOURCE,
                    error = %err,
                    "document not understood, bypassing cache"
                );
                None
            }
        }
    }

    fn read_selection(&self, selection: &[Selection]) -> Option<Value> {
        mutex_lock(&self.cache, SOURCE, "read").read_root(selection)
    }

    pub fn extract(&self) -> Value {
        mutex_lock(&self.cache, SOURCE, "extract").extract()
    }
}

fn restore_bootstrap(bootstrap: Option<Value>) -> NormalizedCache {
    let mut cache = NormalizedCache::new();
    let Some(state) = bootstrap else {
        return cache;
    };
    if let Err(err) = cache.restore(state) {
        warn!(
            target = SOURCE,
            error = %err,
            "ignoring malformed bootstrap cache state"
        );
    }
    cache
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    struct CountingLink {
        calls: AtomicUsize,
        response: GraphQlResponse,
    }

    #[async_trait]
    impl Link for CountingLink {
        async fn execute(&self, _operation: &Operation) -> Result<GraphQlResponse, LinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(self.response.clone())
        }
    }

    fn counting(data: Value) -> Arc<CountingLink> {
        Arc::new(CountingLink {
            calls: AtomicUsize::new(0),
            response: GraphQlResponse::from_data(data),
        })
    }

    #[test]
    fn browser_environment_restores_bootstrap_state() {
        let link = counting(json!({}));
        let client = GraphQlClient::with_link(
            link,
            ClientEnvironment::Browser {
                bootstrap: Some(json!({ "Query": { "id": 1 } })),
            },
        );
        assert!(!client.is_ssr());
        assert_eq!(client.extract(), json!({ "Query": { "id": 1 } }));
    }

    #[test]
    fn server_environment_starts_empty() {
        let client = GraphQlClient::with_link(counting(json!({})), ClientEnvironment::Server);
        assert!(client.is_ssr());
        assert_eq!(client.extract(), json!({}));
    }

    #[test]
    fn malformed_bootstrap_falls_back_to_empty_cache() {
        let client = GraphQlClient::with_link(
            counting(json!({})),
            ClientEnvironment::Browser {
                bootstrap: Some(json!("oops")),
            },
        );
        assert_eq!(client.extract(), json!({}));
    }

    #[tokio::test]
    async fn second_query_is_served_from_cache() {
        let link = counting(json!({ "viewer": { "__typename": "User", "id": 1, "name": "Ada" } }));
        let client = GraphQlClient::with_link(link.clone(), ClientEnvironment::Server);
        let op = Operation::new("{ viewer { id name } }");

        let first = client.query(&op).await.expect("first");
        let second = client.query(&op).await.expect("second");

        assert_eq!(first.data, second.data);
        assert_eq!(link.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            client.extract()["ROOT_QUERY"]["viewer"],
            json!({ "__ref": "User:1" })
        );
    }

    #[tokio::test]
    async fn concurrent_identical_queries_share_one_call() {
        let link = counting(json!({ "a": 1 }));
        let client = GraphQlClient::with_link(link.clone(), ClientEnvironment::Server);
        let op = Operation::new("{ a }");

        let (left, right) = tokio::join!(client.query(&op), client.query(&op));

        assert_eq!(left.expect("left").data, Some(json!({ "a": 1 })));
        assert_eq!(right.expect("right").data, Some(json!({ "a": 1 })));
        assert_eq!(link.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mutations_always_hit_the_transport() {
        let link = counting(json!({ "save": true }));
        let client = GraphQlClient::with_link(link.clone(), ClientEnvironment::Server);
        let op = Operation::new("mutation { save }");

        client.query(&op).await.expect("first");
        client.query(&op).await.expect("second");

        assert_eq!(link.calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.extract(), json!({}));
    }

    /// Answers `product(id: N)` with product N and counts calls.
    struct CatalogLink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Link for CatalogLink {
        async fn execute(&self, operation: &Operation) -> Result<GraphQlResponse, LinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let id: i64 = operation
                .query
                .split("id:")
                .nth(1)
                .and_then(|rest| {
                    rest.trim_start()
                        .split(|c: char| !c.is_ascii_digit())
                        .next()
                })
                .and_then(|digits| digits.parse().ok())
                .unwrap_or_default();
            Ok(GraphQlResponse::from_data(json!({
                "product": {
                    "__typename": "Product",
                    "id": id,
                    "name": format!("product {id}"),
                    "price": id * 10
                }
            })))
        }
    }

    #[tokio::test]
    async fn literal_argument_variants_are_cached_separately() {
        let link = Arc::new(CatalogLink {
            calls: AtomicUsize::new(0),
        });
        let client = GraphQlClient::with_link(link.clone(), ClientEnvironment::Server);
        let seven = Operation::new("{ product(id: 7) { id name } }");
        let eight = Operation::new("{ product(id: 8) { id name } }");

        let first = client.query(&seven).await.expect("seven");
        let second = client.query(&eight).await.expect("eight");

        assert_eq!(link.calls.load(Ordering::SeqCst), 2);
        assert_eq!(first.data.expect("data")["product"]["id"], json!(7));
        assert_eq!(second.data.expect("data")["product"]["id"], json!(8));

        let cached = client.read(&seven).expect("seven cached");
        assert_eq!(cached["product"]["name"], json!("product 7"));
        client.query(&eight).await.expect("eight again");
        assert_eq!(link.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn wider_query_after_narrower_query_reaches_the_link() {
        let link = Arc::new(CatalogLink {
            calls: AtomicUsize::new(0),
        });
        let client = GraphQlClient::with_link(link.clone(), ClientEnvironment::Server);
        let narrow = Operation::new("{ product(id: 3) { id } }");
        let wide = Operation::new("{ product(id: 3) { id price } }");

        client.query(&narrow).await.expect("narrow");
        assert_eq!(client.read(&wide), None);
        let response = client.query(&wide).await.expect("wide");

        assert_eq!(link.calls.load(Ordering::SeqCst), 2);
        assert_eq!(response.data.expect("data")["product"]["price"], json!(30));
        assert_eq!(
            client.read(&wide).expect("cached")["product"]["price"],
            json!(30)
        );
    }

    #[test]
    fn write_then_read_round_trips_the_selection() {
        let client = GraphQlClient::with_link(counting(json!({})), ClientEnvironment::Server);
        let op = Operation::new("{ viewer { id name } }");
        client.write(
            &op,
            &json!({ "viewer": { "__typename": "User", "id": 1, "name": "Ada" } }),
        );
        assert_eq!(client.read(&op).expect("cached")["viewer"]["name"], "Ada");
        assert_eq!(client.read(&Operation::new("{ viewer { email } }")), None);
    }

    #[test]
    fn factory_rejects_invalid_endpoint() {
        let result = create_client(ClientOptions::new("::nope"), ClientEnvironment::Server);
        assert!(matches!(result, Err(LinkError::Endpoint { .. })));
    }

    #[test]
    fn factory_builds_server_client() {
        let client = create_client(
            ClientOptions::new("http://127.0.0.1:4000/graphql"),
            ClientEnvironment::Server,
        )
        .expect("client");
        assert!(client.is_ssr());
    }
}
