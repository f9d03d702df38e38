use crate::errors::UpstreamError;
use http_body_util::BodyExt;
use hyper::body::Bytes;
use hyper::{Request, Response};
use hyper_util::client::legacy::Client;
use shared::http::{add_via_header, filter_hop_by_hop};
use std::time::Duration;
use tokio::time::timeout;

/// Send a request to the upstream service with a configurable timeout
///
/// The request path and query are kept, scheme and authority come from
/// `upstream_url`. Hop-by-hop headers are filtered and a Via header is added
/// in both directions. The response body is collected in full so the
/// enrichment pipeline can rewrite it.
///
/// The timeout covers the whole exchange, including collecting the body.
pub async fn send_to_upstream<C, B>(
    client: &Client<C, B>,
    upstream_url: &url::Url,
    request: Request<B>,
    timeout_secs: u64,
) -> Result<Response<Bytes>, UpstreamError>
where
    C: hyper_util::client::legacy::connect::Connect + Clone + Send + Sync + 'static,
    B: hyper::body::Body + Send + Unpin + 'static,
    B::Data: Send,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    // Use host as identifier for error messages
    let upstream_identifier = upstream_url
        .host_str()
        .unwrap_or(upstream_url.as_str())
        .to_string();

    let path_and_query = request
        .uri()
        .path_and_query()
        .ok_or_else(|| UpstreamError::InvalidRequest("missing path and query".into()))?;

    let mut url = upstream_url.clone();
    url.set_path(path_and_query.path());
    url.set_query(path_and_query.query());
    let upstream_uri = url.to_string();

    let (mut parts, body) = request.into_parts();
    let request_version = parts.version;
    filter_hop_by_hop(&mut parts.headers, request_version);
    add_via_header(&mut parts.headers, request_version);

    let mut req_builder = Request::builder()
        .method(parts.method)
        .uri(upstream_uri)
        .version(parts.version);

    for (name, value) in parts.headers.iter() {
        req_builder = req_builder.header(name, value);
    }

    let upstream_request = req_builder
        .body(body)
        .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;

    let exchange = async {
        let response = client
            .request(upstream_request)
            .await
            .map_err(|e| UpstreamError::RequestFailed(upstream_identifier.clone(), e.to_string()))?;

        let (mut parts, body) = response.into_parts();
        let response_version = parts.version;
        filter_hop_by_hop(&mut parts.headers, response_version);
        add_via_header(&mut parts.headers, response_version);

        let body_bytes = body
            .collect()
            .await
            .map(|collected| collected.to_bytes())
            .map_err(|e| UpstreamError::ResponseBody(e.to_string()))?;

        Ok::<_, UpstreamError>(Response::from_parts(parts, body_bytes))
    };

    timeout(Duration::from_secs(timeout_secs), exchange)
        .await
        .map_err(|_| UpstreamError::Timeout(upstream_identifier.clone()))?
}
