use crate::caller::CallerResolver;
use crate::classify::RequestContext;
use crate::dispatch::{Dispatcher, RunSettings, Runner};
use crate::documents::ConfigStore;
use crate::errors::{ConfigError, EnrichError};
use crate::metrics_defs::ENRICH_REQUESTS;
use crate::{gate, merge, report};
use http::request::Parts;
use hyper::Response;
use hyper::body::Bytes;
use shared::counter;
use std::sync::Arc;

/// What happened to an eligible response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Provider results were merged into the body.
    Enriched,
    /// No caller could be resolved, the response is passed through as is.
    Skipped,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Enriched => "ok",
            Disposition::Skipped => "skipped",
        }
    }
}

/// Composes the enrichment steps around one upstream response.
pub struct Enricher {
    store: Arc<ConfigStore>,
    dispatcher: Dispatcher,
    callers: Arc<dyn CallerResolver>,
    all_establishments: String,
}

impl Enricher {
    pub fn new(
        store: Arc<ConfigStore>,
        runner: Arc<dyn Runner>,
        callers: Arc<dyn CallerResolver>,
        all_establishments: impl Into<String>,
    ) -> Self {
        Self {
            store,
            dispatcher: Dispatcher::new(runner),
            callers,
            all_establishments: all_establishments.into(),
        }
    }

    /// Enriches `response` when it is eligible. Always returns a response:
    /// failures are reported in the body with status 500.
    pub async fn process(&self, request: &Parts, mut response: Response<Bytes>) -> Response<Bytes> {
        if !gate::is_eligible(request, &response) {
            return response;
        }

        match self.try_process(request, &mut response).await {
            Ok(disposition) => {
                counter!(ENRICH_REQUESTS, "outcome" => disposition.as_str()).increment(1);
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    kind = e.kind(),
                    path = %request.uri.path(),
                    "enrichment failed"
                );
                counter!(ENRICH_REQUESTS, "outcome" => e.kind()).increment(1);
                report::fail(&mut response, &e);
            }
        }

        response
    }

    /// Runs the pipeline without the eligibility check, leaving `response`
    /// untouched on error.
    pub async fn try_process(
        &self,
        request: &Parts,
        response: &mut Response<Bytes>,
    ) -> Result<Disposition, EnrichError> {
        let ctx = RequestContext::classify(request, response)?;

        let caller = match ctx.token() {
            Some(token) => self.callers.resolve(token).await,
            None => None,
        };
        let Some(caller) = caller else {
            tracing::debug!(path = %request.uri.path(), "no caller, skipping enrichment");
            return Ok(Disposition::Skipped);
        };

        let settings = RunSettings {
            config: self.store.snapshot().await?,
            check_signature: !caller.superuser,
        };

        let outcome = if ctx.establishment() == self.all_establishments {
            let establishments = settings.config.establishments(ctx.project());
            if establishments.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "no establishments configured for project {}",
                    ctx.project()
                ))
                .into());
            }
            self.dispatcher
                .dispatch_all(&settings, &ctx, establishments)
                .await?
        } else {
            self.dispatcher.dispatch(&settings, &ctx, None).await?
        };

        if !outcome.errors.is_empty() {
            return Err(report::summarize(&outcome.errors));
        }

        tracing::debug!(
            caller = %caller.name,
            providers = outcome.results.len(),
            "merging provider results"
        );
        merge::apply(response, ctx.into_payload(), outcome.results)?;
        Ok(Disposition::Enriched)
    }
}
