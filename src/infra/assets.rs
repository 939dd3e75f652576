//! Static asset serving from the build's public directory.

use std::{
    io::ErrorKind,
    path::{Component, Path as FsPath, PathBuf},
};

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use mime_guess::Mime;
use tracing::error;

use crate::application::error::ErrorReport;

const SOURCE: &str = "infra::assets::serve_public";

#[derive(Debug, Clone)]
pub struct PublicAssets {
    root: PathBuf,
}

impl PublicAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &FsPath {
        &self.root
    }

    pub async fn serve(&self, path: &str) -> Response {
        let Some(relative) = resolve_relative(path) else {
            return not_found_response();
        };
        let full = self.root.join(&relative);

        match tokio::fs::read(&full).await {
            Ok(contents) => {
                let mime = mime_guess::from_path(&relative).first_or_octet_stream();
                build_response(Bytes::from(contents), mime)
            }
            Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => {
                not_found_response()
            }
            Err(err) => {
                error!(
                    target = SOURCE,
                    path = %full.display(),
                    error = %err,
                    "failed to read static asset"
                );
                let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
                ErrorReport::from_error(SOURCE, StatusCode::INTERNAL_SERVER_ERROR, &err)
                    .attach(&mut response);
                response
            }
        }
    }
}

/// Only plain relative paths below the root are served; no directory listings.
fn resolve_relative(path: &str) -> Option<PathBuf> {
    let candidate = path.trim_start_matches('/');
    if candidate.is_empty() || candidate.ends_with('/') || candidate.contains('\\') {
        return None;
    }

    let mut relative = PathBuf::new();
    for component in FsPath::new(candidate).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            _ => return None,
        }
    }
    Some(relative)
}

fn not_found_response() -> Response {
    let mut response = StatusCode::NOT_FOUND.into_response();
    ErrorReport::from_message(SOURCE, StatusCode::NOT_FOUND, "Static asset not found")
        .attach(&mut response);
    response
}

fn build_response(bytes: Bytes, mime: Mime) -> Response {
    let len = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
        headers.insert(header::CONTENT_LENGTH, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}
