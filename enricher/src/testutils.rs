use crate::caller::{Caller, CallerResolver};
use crate::classify::{EnrichmentTarget, RequestContext, TargetId};
use crate::dispatch::{Outcome, Query, RunSettings, Runner};
use crate::documents::ConfigBundle;
use crate::errors::DispatchError;
use async_trait::async_trait;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HOST};
use http::request::Parts;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use shared::http::PeerAddr;
use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub const ACL: &str = r#"
proj:
    myetab:
        members:
            - get_member
"#;

pub const SOURCES: &str = r#"
proj:
    sources:
        myetab:
            plugins:
                Ldap:
                    - spore: http://myurl/description.json
        myetab2:
            plugins:
                Apogee:
                    - spore: http://myurl/description.json
empty:
    sources:
"#;

pub const RESOURCES: &str = r#"
members:
    get_member:
        request method: GET
"#;

pub fn bundle() -> ConfigBundle {
    ConfigBundle::from_documents(
        ACL.into(),
        SOURCES.into(),
        RESOURCES.into(),
        "plugins".into(),
    )
    .unwrap()
}

pub fn settings() -> RunSettings {
    RunSettings {
        config: Arc::new(bundle()),
        check_signature: true,
    }
}

/// Marker attached by the default route in tests: `/api/members/<id>/`.
pub fn marker() -> EnrichmentTarget {
    EnrichmentTarget {
        resource: Some("members".into()),
        method: Some("get_member".into()),
        id: Some(TargetId::PathSegment(2)),
    }
}

/// A marked GET request from a known caller.
pub fn request(uri: &str) -> Parts {
    let mut request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(HOST, "testserver")
        .header(AUTHORIZATION, "Token S3CR3T")
        .body(())
        .unwrap();
    request.extensions_mut().insert(marker());
    let addr: SocketAddr = "10.0.0.7:51234".parse().unwrap();
    request.extensions_mut().insert(PeerAddr(addr));
    request.into_parts().0
}

pub fn json_response(status: u16, body: &str) -> Response<Bytes> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Bytes::from(body.to_string()))
        .unwrap()
}

pub fn context(uri: &str, body: &str) -> RequestContext {
    RequestContext::classify(&request(uri), &json_response(200, body)).unwrap()
}

/// Runner double answering with canned outcomes per source.
#[derive(Default)]
pub struct FakeRunner {
    outcomes: HashMap<String, Outcome>,
    delays: HashMap<String, Duration>,
    failures: HashSet<String>,
    fail_all: bool,
    calls: Mutex<Vec<(String, bool)>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runner that fails every query.
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub fn with_results(mut self, source: &str, results: JsonValue) -> Self {
        self.outcomes.entry(source.into()).or_default().results =
            serde_json::from_value(results).unwrap();
        self
    }

    pub fn with_errors(mut self, source: &str, errors: JsonValue) -> Self {
        self.outcomes.entry(source.into()).or_default().errors =
            serde_json::from_value(errors).unwrap();
        self
    }

    pub fn with_delay(mut self, source: &str, delay: Duration) -> Self {
        self.delays.insert(source.into(), delay);
        self
    }

    pub fn with_failure(mut self, source: &str) -> Self {
        self.failures.insert(source.into());
        self
    }

    /// Sources queried so far, in call order.
    pub fn sources(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(s, _)| s.clone()).collect()
    }

    /// `check_signature` of every call so far, in call order.
    pub fn signature_checks(&self) -> Vec<bool> {
        self.calls.lock().iter().map(|(_, check)| *check).collect()
    }
}

#[async_trait]
impl Runner for FakeRunner {
    async fn dispatch(
        &self,
        settings: &RunSettings,
        query: &Query,
    ) -> Result<Outcome, DispatchError> {
        self.calls
            .lock()
            .push((query.source.clone(), settings.check_signature));

        if let Some(delay) = self.delays.get(&query.source) {
            tokio::time::sleep(*delay).await;
        }

        if self.fail_all || self.failures.contains(&query.source) {
            return Err(DispatchError::Status(503));
        }

        Ok(self
            .outcomes
            .get(&query.source)
            .cloned()
            .unwrap_or_default())
    }
}

/// Caller table double: `S3CR3T` is a regular caller, `R00T` a superuser.
pub struct FakeCallers;

#[async_trait]
impl CallerResolver for FakeCallers {
    async fn resolve(&self, token: &str) -> Option<Caller> {
        match token {
            "S3CR3T" => Some(Caller {
                name: "arthur".into(),
                superuser: false,
            }),
            "R00T" => Some(Caller {
                name: "merlin".into(),
                superuser: true,
            }),
            _ => None,
        }
    }
}

/// Starts an HTTP server on an ephemeral port that answers every request
/// with `handler`. Request bodies are collected before the handler runs.
pub async fn start_test_server<F, Fut>(handler: F) -> u16
where
    F: Fn(Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<String>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to address");

    let port = listener.local_addr().unwrap().port();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let io = TokioIo::new(stream);
            let handler = handler.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let handler = handler.clone();
                    async move {
                        let (parts, body) = req.into_parts();
                        let body = body
                            .collect()
                            .await
                            .map(|collected| collected.to_bytes())
                            .unwrap_or_else(|_| Bytes::new());
                        let response = handler(Request::from_parts(parts, body)).await;
                        Ok::<_, Infallible>(response.map(|b| Full::new(Bytes::from(b))))
                    }
                });

                if let Err(err) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                    .serve_connection(io, service)
                    .await
                {
                    eprintln!("Error serving connection: {:?}", err);
                }
            });
        }
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(100)).await;

    port
}
