use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::{
        HeaderMap, HeaderValue, StatusCode, Uri,
        header::{CONTENT_TYPE, COOKIE, HOST, LOCATION},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use url::{Origin, Url};

use crate::{
    application::{
        error::HttpError,
        render::{Location, PageRequest, Renderer},
    },
    infra::assets::PublicAssets,
};

use super::middleware::{log_responses, set_request_context};

const SOURCE: &str = "infra::http::public";

#[derive(Clone)]
pub struct HttpState {
    pub renderer: Arc<Renderer>,
    pub assets: Arc<PublicAssets>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/_health", get(health))
        .route("/static/{*path}", get(serve_static))
        .fallback(get(render_page))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn serve_static(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    state.assets.serve(&path).await
}

async fn render_page(
    State(state): State<HttpState>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let request = PageRequest {
        location: Location::from_uri(&uri),
        cookie: header_str(&headers, COOKIE).map(str::to_string),
        origin: header_str(&headers, HOST).and_then(page_origin),
    };

    let page = state.renderer.render(&request).await?;

    let mut response = (page.status, page.html).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    if let Some(location) = page.location.as_deref() {
        let value = HeaderValue::from_str(location).map_err(|err| {
            HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &err,
            )
        })?;
        response_headers.insert(LOCATION, value);
    }

    Ok(response)
}

fn header_str(headers: &HeaderMap, name: axum::http::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Origin the browser loaded the page from, as seen through the Host header.
fn page_origin(host: &str) -> Option<Origin> {
    Url::parse(&format!("http://{host}"))
        .ok()
        .map(|url| url.origin())
}
