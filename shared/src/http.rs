use http::Version;
use http::header::{
    CONNECTION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING, UPGRADE, VIA,
};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes, Incoming};
use hyper::service::{Service, service_fn};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

const PROXY_NAME: &str = "enricher";

/// Address of the peer that opened the connection a request arrived on.
///
/// Inserted into the request extensions by [`serve`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerAddr(pub SocketAddr);

pub async fn run_http_service<S, B, E>(host: &str, port: u16, service: S) -> Result<(), E>
where
    S: Service<Request<Incoming>, Response = Response<B>, Error = E> + Send + Sync + 'static,
    S::Future: Send + 'static,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: std::error::Error + Send + Sync + 'static,
    E: From<std::io::Error> + std::error::Error + Send + Sync + 'static,
{
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    tracing::info!(host, port, "listening");
    serve(listener, service).await
}

/// Accepts connections on `listener` until accepting fails.
pub async fn serve<S, B, E>(listener: TcpListener, service: S) -> Result<(), E>
where
    S: Service<Request<Incoming>, Response = Response<B>, Error = E> + Send + Sync + 'static,
    S::Future: Send + 'static,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: std::error::Error + Send + Sync + 'static,
    E: From<std::io::Error> + std::error::Error + Send + Sync + 'static,
{
    let service_arc = Arc::new(service);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let _ = stream.set_nodelay(true);
        let io = TokioIo::new(stream);
        let svc = service_arc.clone();

        // Hand the connection to hyper; auto-detect h1/h2 on this socket
        tokio::spawn(async move {
            let svc = service_fn(move |mut req: Request<Incoming>| {
                req.extensions_mut().insert(PeerAddr(peer_addr));
                svc.call(req)
            });
            if let Err(e) = Builder::new(TokioExecutor::new())
                .serve_connection(io, svc)
                .await
            {
                tracing::debug!(peer = %peer_addr, error = %e, "connection closed with error");
            }
        });
    }
}

/// Builds a JSON error response of the form `{"error": "<message>"}`.
pub fn make_error_response(status: StatusCode, message: &str) -> Response<Bytes> {
    let body = serde_json::json!({ "error": message }).to_string();
    let mut response = Response::new(Bytes::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

pub fn make_boxed_error_response(status: StatusCode) -> Response<BoxBody<Bytes, Infallible>> {
    let reason = status.canonical_reason().unwrap_or("error");
    let (parts, body) = make_error_response(status, reason).into_parts();
    Response::from_parts(parts, Full::new(body).boxed())
}

static HOP_BY_HOP_NAMES: &[HeaderName] = &[
    CONNECTION,
    TRANSFER_ENCODING,
    TE,
    TRAILER,
    UPGRADE,
    PROXY_AUTHORIZATION,
    PROXY_AUTHENTICATE,
];

pub fn is_http1(v: Version) -> bool {
    matches!(v, Version::HTTP_09 | Version::HTTP_10 | Version::HTTP_11)
}

/// Adds a Via header to indicate the request/response passed through this proxy.
/// Appends to existing if Via is already present.
pub fn add_via_header(headers: &mut HeaderMap, version: Version) {
    let version_str = match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_11 => "1.1",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => {
            tracing::warn!(?version, "unknown HTTP version, skipping Via header");
            return;
        }
    };

    let via_value = format!("{version_str} {PROXY_NAME}");

    if let Some(existing) = headers.get(VIA) {
        if let Ok(existing_str) = existing.to_str() {
            let combined = format!("{existing_str}, {via_value}");
            if let Ok(new_value) = HeaderValue::from_str(&combined) {
                headers.insert(VIA, new_value);
            }
        }
    } else if let Ok(new_value) = HeaderValue::from_str(&via_value) {
        headers.insert(VIA, new_value);
    }
}

// For HTTP/1.x connections, hop-by-hop headers are removed before forwarding:
// - standard hop-by-hop headers
// - any extra headers listed in the Connection header value
// - keep-alive header for HTTP/0.9 and HTTP/1.0 only
//
// HTTP/2 and HTTP/3 don't use hop-by-hop headers, so no filtering is performed.
pub fn filter_hop_by_hop(headers: &mut HeaderMap, version: Version) -> &mut HeaderMap {
    if !is_http1(version) {
        return headers;
    }

    let mut extra_drops = Vec::new();
    if let Some(connection) = headers.get(CONNECTION)
        && let Ok(s) = connection.to_str()
    {
        for token in s.split(',').map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if let Ok(name) = HeaderName::from_bytes(token.as_bytes()) {
                extra_drops.push(name);
            }
        }
    }

    for name in HOP_BY_HOP_NAMES {
        headers.remove(name);
    }

    for name in extra_drops {
        headers.remove(&name);
    }

    if matches!(version, Version::HTTP_09 | Version::HTTP_10) {
        headers.remove(HeaderName::from_static("keep-alive"));
    }

    headers
}
