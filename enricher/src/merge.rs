//! Merging provider results into the upstream payload.
//!
//! The upstream service is the reference: on a key collision its value is
//! kept. How provider data lands depends on the payload shape:
//! - Object: fields of object results are added when missing, any other
//!   result is stored under the provider's name
//! - Array: array results are concatenated, any other result is appended
//! - Scalar: left untouched, provider data is discarded

use crate::dispatch::ResultMap;
use crate::errors::EnrichError;
use crate::payload::Payload;
use hyper::body::Bytes;
use hyper::header::CONTENT_LENGTH;
use hyper::{Response, StatusCode};
use serde_json::Value as JsonValue;

/// Field the upstream uses to explain a not-found response.
const NOT_FOUND_MARKER: &str = "error";

pub fn merge(payload: Payload, results: ResultMap) -> Payload {
    match payload {
        Payload::Object(mut map) => {
            for (provider, value) in results {
                match value {
                    JsonValue::Object(fields) => {
                        for (key, field) in fields {
                            map.entry(key).or_insert(field);
                        }
                    }
                    other => {
                        map.insert(provider, other);
                    }
                }
            }
            Payload::Object(map)
        }
        Payload::Array(mut items) => {
            for value in results.into_values() {
                match value {
                    JsonValue::Array(more) => items.extend(more),
                    other => items.push(other),
                }
            }
            Payload::Array(items)
        }
        scalar @ Payload::Scalar(_) => scalar,
    }
}

/// Merges `results` into `payload` and writes the outcome back into `response`.
///
/// A not-found object response that receives provider data becomes a success
/// and loses its not-found marker.
pub fn apply(
    response: &mut Response<Bytes>,
    payload: Payload,
    results: ResultMap,
) -> Result<(), EnrichError> {
    let payload = match payload {
        Payload::Object(mut map)
            if !results.is_empty() && response.status() == StatusCode::NOT_FOUND =>
        {
            *response.status_mut() = StatusCode::OK;
            map.remove(NOT_FOUND_MARKER);
            Payload::Object(map)
        }
        other => other,
    };

    let merged = merge(payload, results);
    *response.body_mut() = Bytes::from(merged.to_vec()?);
    response.headers_mut().remove(CONTENT_LENGTH);

    Ok(())
}
