use crate::caller::CallerResolver;
use crate::config::{Config, Route, UpstreamConfig};
use crate::dispatch::Runner;
use crate::documents::ConfigStore;
use crate::http::send_to_upstream;
use crate::pipeline::Enricher;
use crate::router::Router;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes, Incoming};
use hyper::header::ACCEPT_ENCODING;
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use shared::admin_service::AdminService;
use shared::http::{make_error_response, run_http_service};
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs the enriching proxy and the admin listener until either fails.
pub async fn run(
    config: Config,
    store: Arc<ConfigStore>,
    runner: Arc<dyn Runner>,
    callers: Arc<dyn CallerResolver>,
) -> Result<(), ServiceError> {
    let enricher = Arc::new(Enricher::new(
        store.clone(),
        runner,
        callers,
        config.all_establishments.clone(),
    ));
    let service = EnricherService::new(config.routes.clone(), config.upstream.clone(), enricher);

    let ready_store = store.clone();
    let admin = AdminService::<_, _, ServiceError>::new(
        move || ready_store.is_loaded(),
        move || {
            let store = store.clone();
            async move { store.reload().await.map_err(|e| e.to_string()) }
        },
    );

    let main_task = run_http_service(&config.listener.host, config.listener.port, service);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin,
    );
    tokio::try_join!(main_task, admin_task)?;
    Ok(())
}

/// Reverse proxy in front of the upstream service.
///
/// Requests matching a route are marked for enrichment before being
/// forwarded. Every upstream response goes through [`Enricher::process`].
#[derive(Clone)]
pub struct EnricherService {
    router: Router,
    client: Client<HttpConnector, Full<Bytes>>,
    upstream: UpstreamConfig,
    enricher: Arc<Enricher>,
}

impl EnricherService {
    pub fn new(routes: Vec<Route>, upstream: UpstreamConfig, enricher: Arc<Enricher>) -> Self {
        Self {
            router: Router::new(routes),
            client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
            upstream,
            enricher,
        }
    }

    pub async fn handle<B>(self, mut req: Request<B>) -> Response<Bytes>
    where
        B: Body,
        B::Error: std::fmt::Display,
    {
        if let Some(target) = self.router.find_target(&req) {
            req.extensions_mut().insert(target);
            // The body gets parsed and rewritten, so it must come back unencoded
            req.headers_mut().remove(ACCEPT_ENCODING);
        }

        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read request body");
                return make_error_response(StatusCode::BAD_REQUEST, "could not read request body");
            }
        };

        let mut forward = Request::new(Full::new(body));
        *forward.method_mut() = parts.method.clone();
        *forward.uri_mut() = parts.uri.clone();
        *forward.version_mut() = parts.version;
        *forward.headers_mut() = parts.headers.clone();

        let response = match send_to_upstream(
            &self.client,
            &self.upstream.url,
            forward,
            self.upstream.timeout_secs,
        )
        .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, path = %parts.uri.path(), "upstream request failed");
                return make_error_response(StatusCode::BAD_GATEWAY, &e.to_string());
            }
        };

        self.enricher.process(&parts, response).await
    }
}

impl Service<Request<Incoming>> for EnricherService {
    type Response = Response<BoxBody<Bytes, Infallible>>;
    type Error = ServiceError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move {
            let response = service.handle(req).await;
            Ok(response.map(|body| Full::new(body).boxed()))
        })
    }
}
