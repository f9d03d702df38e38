//! Request classification.
//!
//! Derives every fact the rest of the pipeline needs from the inbound request
//! and the upstream response, once, up front. A request that is missing any
//! required fact is rejected as a whole.

use crate::errors::ClassificationError;
use crate::params::{ESTABLISHMENT, NormalizedParameters, PROJECT, query_map};
use crate::payload::Payload;
use crate::signature::{Signature, sign};
use http::header::{AUTHORIZATION, HOST};
use http::request::Parts;
use http::{HeaderMap, Method};
use hyper::Response;
use hyper::body::Bytes;
use shared::http::PeerAddr;

const X_REAL_IP: &str = "x-real-ip";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Marks a request as a candidate for enrichment.
///
/// Attached to the request extensions by whatever routed the request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnrichmentTarget {
    pub resource: Option<String>,
    pub method: Option<String>,
    pub id: Option<TargetId>,
}

/// Where the resource id comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetId {
    Value(String),
    /// Index into the non-empty segments of the request path.
    PathSegment(usize),
}

impl TargetId {
    fn resolve(&self, path: &str) -> Result<String, ClassificationError> {
        match self {
            TargetId::Value(id) => Ok(id.clone()),
            TargetId::PathSegment(index) => {
                let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                segments
                    .get(*index)
                    .map(|segment| segment.to_string())
                    .ok_or(ClassificationError::IdSegmentOutOfRange {
                        index: *index,
                        segments: segments.len(),
                    })
            }
        }
    }
}

/// Read-only facts about one request, derived at construction.
#[derive(Clone, Debug)]
pub struct RequestContext {
    params: NormalizedParameters,
    token: Option<String>,
    remote_ip: String,
    request_method: Method,
    resource: Option<String>,
    method: Option<String>,
    payload: Payload,
    signature: Option<Signature>,
}

impl RequestContext {
    pub fn classify(
        request: &Parts,
        response: &Response<Bytes>,
    ) -> Result<Self, ClassificationError> {
        let target = request
            .extensions
            .get::<EnrichmentTarget>()
            .ok_or(ClassificationError::MissingMarker)?;

        let mut query = query_map(&request.uri);
        let project = query
            .remove(PROJECT)
            .ok_or(ClassificationError::MissingParameter(PROJECT))?;
        let establishment = query
            .remove(ESTABLISHMENT)
            .ok_or(ClassificationError::MissingParameter(ESTABLISHMENT))?;

        let id = target
            .id
            .as_ref()
            .ok_or(ClassificationError::MissingId)?
            .resolve(request.uri.path())?;

        let params =
            NormalizedParameters::new(id, project, establishment, base_url(request)?, query);

        let token = token(&request.headers);
        let signature = sign(token.as_deref(), &params);

        let payload = Payload::from_slice(response.body())
            .map_err(|e| ClassificationError::MalformedBody(e.to_string()))?;

        Ok(Self {
            params,
            token,
            remote_ip: remote_ip(request)?,
            request_method: request.method.clone(),
            resource: target.resource.clone(),
            method: target.method.clone(),
            payload,
            signature,
        })
    }

    pub fn params(&self) -> &NormalizedParameters {
        &self.params
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn remote_ip(&self) -> &str {
        &self.remote_ip
    }

    pub fn request_method(&self) -> &Method {
        &self.request_method
    }

    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn project(&self) -> &str {
        self.params.project()
    }

    pub fn establishment(&self) -> &str {
        self.params.establishment()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }
}

/// Last space-separated word of the Authorization header, e.g. `Token <key>`.
/// A header ending in a space carries no token.
fn token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(' ').next_back())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

fn remote_ip(request: &Parts) -> Result<String, ClassificationError> {
    let forwarded = request
        .headers
        .get(X_REAL_IP)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());

    if let Some(ip) = forwarded {
        return Ok(ip.to_string());
    }

    request
        .extensions
        .get::<PeerAddr>()
        .map(|PeerAddr(addr)| addr.ip().to_string())
        .ok_or(ClassificationError::MissingRemoteIp)
}

fn base_url(request: &Parts) -> Result<String, ClassificationError> {
    let scheme = request
        .uri
        .scheme_str()
        .or_else(|| {
            request
                .headers
                .get(X_FORWARDED_PROTO)
                .and_then(|value| value.to_str().ok())
        })
        .unwrap_or("http");

    let host = request
        .headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri.authority().map(|a| a.as_str()))
        .ok_or(ClassificationError::MissingHost)?;

    Ok(format!("{scheme}://{host}"))
}
