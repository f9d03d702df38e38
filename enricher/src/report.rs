//! Turning provider failures into a failed response.

use crate::dispatch::{ErrorMap, ProviderFailure};
use crate::errors::EnrichError;
use crate::metrics_defs::PROVIDER_ERRORS;
use hyper::body::Bytes;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use hyper::{Response, StatusCode};
use shared::counter;

/// Logs every provider failure and returns the error the request fails with.
///
/// Failures are visited in provider-name order and the summary describes the
/// last one.
pub fn summarize(errors: &ErrorMap) -> EnrichError {
    for (provider, failure) in errors {
        tracing::warn!(
            provider = %provider,
            error_kind = %failure.error_kind,
            error_message = %failure.error_message,
            source = failure.source.as_deref().unwrap_or_default(),
            resource = failure.resource.as_deref().unwrap_or_default(),
            method = failure.method.as_deref().unwrap_or_default(),
            arguments = %failure.arguments,
            parameter_index = ?failure.parameter_index,
            "provider failed"
        );
        counter!(
            PROVIDER_ERRORS,
            "provider" => provider.clone(),
            "error_kind" => failure.error_kind.clone()
        )
        .increment(1);
    }

    match errors.iter().next_back() {
        Some((provider, failure)) => EnrichError::Providers(describe(provider, failure)),
        None => EnrichError::Providers("providers failed".into()),
    }
}

fn describe(provider: &str, failure: &ProviderFailure) -> String {
    let parameter_index = failure
        .parameter_index
        .map(|index| index.to_string())
        .unwrap_or_else(|| "None".into());

    format!(
        "error: {}:{}, plugin name: {}, source: {}, resource: {}, method: {}, arguments: {}, parameters index: {}",
        failure.error_kind,
        failure.error_message,
        provider,
        failure.source.as_deref().unwrap_or("None"),
        failure.resource.as_deref().unwrap_or("None"),
        failure.method.as_deref().unwrap_or("None"),
        failure.arguments,
        parameter_index,
    )
}

/// Replaces the response with `{"error": "<message>"}` and status 500.
pub fn fail(response: &mut Response<Bytes>, error: &EnrichError) {
    let body = serde_json::json!({ "error": error.to_string() }).to_string();
    *response.body_mut() = Bytes::from(body);
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;

    let headers = response.headers_mut();
    headers.remove(CONTENT_LENGTH);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
}
