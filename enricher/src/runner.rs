use crate::config::RunnerConfig;
use crate::dispatch::{Outcome, Query, RunSettings, Runner};
use crate::errors::DispatchError;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// Body posted to the runner endpoint.
#[derive(Serialize)]
struct RunRequest<'a> {
    query: &'a Query,
    check_signature: bool,
    acl: &'a str,
    sources: &'a str,
    resources: &'a str,
    plugins_module: &'a str,
}

/// Runner reached over HTTP.
///
/// Posts the query together with the current configuration documents and
/// expects `{"results": {...}, "errors": {...}}` back.
pub struct HttpRunner {
    client: reqwest::Client,
    url: Url,
}

impl HttpRunner {
    pub fn new(config: &RunnerConfig) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl Runner for HttpRunner {
    async fn dispatch(
        &self,
        settings: &RunSettings,
        query: &Query,
    ) -> Result<Outcome, DispatchError> {
        let body = RunRequest {
            query,
            check_signature: settings.check_signature,
            acl: &settings.config.acl,
            sources: &settings.config.sources,
            resources: &settings.config.resources,
            plugins_module: &settings.config.plugins_module,
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(url = %self.url, status = %status, "runner rejected query");
            return Err(DispatchError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(from_reqwest)?;
        serde_json::from_slice(&bytes).map_err(|e| DispatchError::InvalidResponse(e.to_string()))
    }
}

fn from_reqwest(e: reqwest::Error) -> DispatchError {
    if e.is_timeout() {
        DispatchError::Timeout
    } else {
        DispatchError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{context, settings, start_test_server};
    use hyper::body::Bytes;
    use hyper::{Request, Response, StatusCode};
    use serde_json::{Value as JsonValue, json};

    fn runner(port: u16, timeout_secs: u64) -> HttpRunner {
        HttpRunner::new(&RunnerConfig {
            url: Url::parse(&format!("http://127.0.0.1:{port}/run")).unwrap(),
            timeout_secs,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        // Echo part of the request back inside the results so it can be checked
        let port = start_test_server(|req: Request<Bytes>| async move {
            let body: JsonValue = serde_json::from_slice(req.body()).unwrap();
            let outcome = json!({
                "results": {
                    "Echo": {
                        "source": body["query"]["source"],
                        "check_signature": body["check_signature"],
                        "plugins_module": body["plugins_module"],
                        "has_acl": body["acl"].as_str().is_some_and(|s| s.contains("proj")),
                    }
                }
            });
            Response::new(outcome.to_string())
        })
        .await;

        let ctx = context("/api/members/32/?project=proj&establishment=myetab", "{}");
        let query = Query::new(&ctx, None);
        let outcome = runner(port, 5).dispatch(&settings(), &query).await.unwrap();

        assert_eq!(
            outcome.results["Echo"],
            json!({
                "source": "myetab",
                "check_signature": true,
                "plugins_module": "plugins",
                "has_acl": true,
            })
        );
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_error_status() {
        let port = start_test_server(|_| async {
            let mut response = Response::new("boom".to_string());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        })
        .await;

        let ctx = context("/api/members/32/?project=proj&establishment=myetab", "{}");
        let result = runner(port, 5)
            .dispatch(&settings(), &Query::new(&ctx, None))
            .await;
        assert!(matches!(result, Err(DispatchError::Status(500))));
    }

    #[tokio::test]
    async fn test_dispatch_invalid_body() {
        let port = start_test_server(|_| async { Response::new("not json".to_string()) }).await;

        let ctx = context("/api/members/32/?project=proj&establishment=myetab", "{}");
        let result = runner(port, 5)
            .dispatch(&settings(), &Query::new(&ctx, None))
            .await;
        assert!(matches!(result, Err(DispatchError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_dispatch_timeout() {
        let port = start_test_server(|_| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Response::new("{}".to_string())
        })
        .await;

        let ctx = context("/api/members/32/?project=proj&establishment=myetab", "{}");
        let result = runner(port, 1)
            .dispatch(&settings(), &Query::new(&ctx, None))
            .await;
        assert!(matches!(result, Err(DispatchError::Timeout)));
    }
}
