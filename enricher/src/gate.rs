//! Eligibility pre-check run before any other enrichment step.

use crate::classify::EnrichmentTarget;
use crate::params::{ESTABLISHMENT, PROJECT, query_map};
use http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use http::request::Parts;
use http::{Method, StatusCode};
use hyper::Response;

/// Returns true when the response should go through the enrichment pipeline.
///
/// Not-found responses are eligible because providers may supply the missing data.
pub fn is_eligible<B>(request: &Parts, response: &Response<B>) -> bool {
    is_json(response)
        && is_identity_encoded(response)
        && is_enrichable_request(request)
        && is_allowed_status(response.status())
}

/// Compressed bodies are never decoded here, so they cannot be enriched.
fn is_identity_encoded<B>(response: &Response<B>) -> bool {
    response
        .headers()
        .get_all(CONTENT_ENCODING)
        .iter()
        .all(|value| {
            value
                .to_str()
                .is_ok_and(|v| v.split(',').all(|c| c.trim().eq_ignore_ascii_case("identity")))
        })
}

fn is_json<B>(response: &Response<B>) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|media_type| media_type.trim().eq_ignore_ascii_case("application/json"))
}

fn is_enrichable_request(request: &Parts) -> bool {
    if request.method != Method::GET || request.extensions.get::<EnrichmentTarget>().is_none() {
        return false;
    }
    let query = query_map(&request.uri);
    query.contains_key(PROJECT) && query.contains_key(ESTABLISHMENT)
}

fn is_allowed_status(status: StatusCode) -> bool {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => false,
        StatusCode::OK | StatusCode::NOT_FOUND => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::TargetId;
    use hyper::Request;
    use hyper::body::Bytes;

    fn request(method: Method, uri: &str, marked: bool) -> Parts {
        let mut request = Request::builder().method(method).uri(uri).body(()).unwrap();
        if marked {
            request.extensions_mut().insert(EnrichmentTarget {
                resource: Some("members".into()),
                method: Some("get_member".into()),
                id: Some(TargetId::Value("32".into())),
            });
        }
        request.into_parts().0
    }

    fn response(status: u16, content_type: &str) -> Response<Bytes> {
        Response::builder()
            .status(status)
            .header(CONTENT_TYPE, content_type)
            .body(Bytes::from_static(b"{}"))
            .unwrap()
    }

    const URI: &str = "/api/members/32/?project=proj&establishment=myetab";

    #[test]
    fn test_eligible() {
        let req = request(Method::GET, URI, true);
        assert!(is_eligible(&req, &response(200, "application/json")));
        assert!(is_eligible(&req, &response(404, "application/json")));
        assert!(is_eligible(
            &req,
            &response(200, "application/json; charset=utf-8")
        ));
    }

    #[test]
    fn test_wrong_content_type() {
        let req = request(Method::GET, URI, true);
        assert!(!is_eligible(&req, &response(200, "text/html")));

        let no_content_type = Response::builder()
            .status(200)
            .body(Bytes::from_static(b"{}"))
            .unwrap();
        assert!(!is_eligible(&req, &no_content_type));
    }

    #[test]
    fn test_encoded_response() {
        let req = request(Method::GET, URI, true);

        let mut gzipped = response(200, "application/json");
        gzipped
            .headers_mut()
            .insert(CONTENT_ENCODING, "gzip".parse().unwrap());
        assert!(!is_eligible(&req, &gzipped));

        let mut identity = response(200, "application/json");
        identity
            .headers_mut()
            .insert(CONTENT_ENCODING, "identity".parse().unwrap());
        assert!(is_eligible(&req, &identity));
    }

    #[test]
    fn test_wrong_method() {
        let req = request(Method::POST, URI, true);
        assert!(!is_eligible(&req, &response(200, "application/json")));
    }

    #[test]
    fn test_missing_project_or_establishment() {
        let ok = response(200, "application/json");
        let req = request(Method::GET, "/api/members/32/?establishment=myetab", true);
        assert!(!is_eligible(&req, &ok));

        let req = request(Method::GET, "/api/members/32/?project=proj", true);
        assert!(!is_eligible(&req, &ok));

        let req = request(Method::GET, "/api/members/32/?error=error", true);
        assert!(!is_eligible(&req, &ok));
    }

    #[test]
    fn test_unmarked_request() {
        let req = request(Method::GET, URI, false);
        assert!(!is_eligible(&req, &response(200, "application/json")));
    }

    #[test]
    fn test_wrong_status() {
        let req = request(Method::GET, URI, true);
        for status in [401, 403, 500, 201, 302, 400] {
            assert!(
                !is_eligible(&req, &response(status, "application/json")),
                "status {status} should not be eligible"
            );
        }
    }
}
