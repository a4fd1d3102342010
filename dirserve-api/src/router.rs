//! Request routing
//!
//! Every request ends here: pre-flight checks, method filtering, path
//! resolution and dispatch to a listing or a download.

use crate::AppState;
use bytes::Bytes;
use dirserve_core::config::CorsConfig;
use dirserve_static::{ResolvedPath, ServeError};
use futures::TryStreamExt;
use http::header::{self, HeaderMap, HeaderValue};
use http::request::Parts;
use http::{Method, Request, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use std::convert::Infallible;
use std::fs::Metadata;
use std::net::SocketAddr;
use std::time::Instant;

/// Body type of every response
pub type ResponseBody = UnsyncBoxBody<Bytes, std::io::Error>;

const ALLOWED_METHODS: &str = "GET, OPTIONS";
const ALLOWED_HEADERS: &str = "Range";
const EXPOSED_HEADERS: &str = "Content-Disposition, Content-Length, Content-Range";

/// Cross-origin headers, prepared once from configuration
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allow_origin: HeaderValue,
    max_age: HeaderValue,
}

impl CorsPolicy {
    /// Build from configuration; an unusable origin falls back to `*`
    pub fn from_config(config: &CorsConfig) -> Self {
        let allow_origin = HeaderValue::from_str(&config.allow_origin).unwrap_or_else(|_| {
            tracing::warn!("⚠️ Invalid allow_origin {:?}, using *", config.allow_origin);
            HeaderValue::from_static("*")
        });

        Self {
            allow_origin,
            max_age: HeaderValue::from(config.max_age),
        }
    }

    fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        );
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, self.max_age.clone());
        headers.insert(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static(EXPOSED_HEADERS),
        );
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self::from_config(&CorsConfig::default())
    }
}

/// Handle one request and log its outcome
pub async fn handle_request<B>(
    req: Request<B>,
    state: &AppState,
    peer: SocketAddr,
) -> Response<ResponseBody> {
    let started = Instant::now();
    // Bodies are never read; only the head is kept across awaits.
    let (parts, body) = req.into_parts();
    drop(body);
    let response = route(&parts, state).await;

    tracing::info!(
        "{} \"{} {}\" {} {:?}",
        peer,
        parts.method,
        parts.uri,
        response.status().as_u16(),
        started.elapsed()
    );

    response
}

async fn route(req: &Parts, state: &AppState) -> Response<ResponseBody> {
    let method = &req.method;

    let mut response = if *method == Method::OPTIONS {
        empty(StatusCode::NO_CONTENT)
    } else if *method == Method::GET {
        match serve_get(req, state).await {
            Ok(response) => response,
            Err(err) => error_response(&err),
        }
    } else {
        error_response(&ServeError::MethodNotAllowed(method.to_string()))
    };

    state.cors.apply(response.headers_mut());
    response
}

async fn serve_get(req: &Parts, state: &AppState) -> Result<Response<ResponseBody>, ServeError> {
    let resolved = state.files.resolve(req.uri.path()).await?;

    let metadata = tokio::fs::metadata(&resolved.fs_path)
        .await
        .map_err(|_| ServeError::NotFound(resolved.fs_path.display().to_string()))?;

    if metadata.is_dir() {
        listing_response(&resolved, state).await
    } else if metadata.is_file() {
        let range = req
            .headers
            .get(header::RANGE)
            .and_then(|v| v.to_str().ok());
        file_response(resolved, &metadata, range, state).await
    } else {
        tracing::debug!("🚫 Refusing special file {}", resolved.public_path);
        Err(ServeError::NotFound(resolved.fs_path.display().to_string()))
    }
}

async fn listing_response(
    dir: &ResolvedPath,
    state: &AppState,
) -> Result<Response<ResponseBody>, ServeError> {
    let listing = state.files.list(dir).await?;
    let body = listing
        .to_json(state.files.config().pretty_listing)
        .map_err(|e| ServeError::Io(std::io::Error::other(e)))?;

    let mut response = Response::new(full(body));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    Ok(response)
}

async fn file_response(
    resolved: ResolvedPath,
    metadata: &Metadata,
    range: Option<&str>,
    state: &AppState,
) -> Result<Response<ResponseBody>, ServeError> {
    let transfer = state.files.open(resolved, metadata, range).await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(transfer.content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(transfer.length));
    headers.insert(header::CONTENT_DISPOSITION, transfer.content_disposition.clone());
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some(value) = transfer
        .last_modified
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok())
    {
        headers.insert(header::LAST_MODIFIED, value);
    }
    if let Some(value) = transfer
        .content_range
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok())
    {
        headers.insert(header::CONTENT_RANGE, value);
    }

    let status = transfer.status;
    let stream = transfer
        .into_stream(state.files.config().chunk_size)
        .map_ok(Frame::data);

    let mut response = Response::new(StreamBody::new(stream).boxed_unsync());
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// JSON error response. The body never carries filesystem details.
fn error_response(err: &ServeError) -> Response<ResponseBody> {
    let status = err.status();
    if status.is_server_error() {
        tracing::error!("❌ {}", err);
    } else {
        tracing::debug!("{}", err);
    }

    let body = serde_json::json!({ "error": err.public_message() }).to_string();
    let mut response = Response::new(full(body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    match err {
        ServeError::MethodNotAllowed(_) => {
            headers.insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
        }
        ServeError::RangeNotSatisfiable { size } => {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", size)) {
                headers.insert(header::CONTENT_RANGE, value);
            }
        }
        _ => {}
    }

    response
}

fn full(body: impl Into<Bytes>) -> ResponseBody {
    Full::new(body.into())
        .map_err(|never: Infallible| match never {})
        .boxed_unsync()
}

fn empty(status: StatusCode) -> Response<ResponseBody> {
    let body = Empty::<Bytes>::new()
        .map_err(|never: Infallible| match never {})
        .boxed_unsync();
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}
