use crate::classify::RequestContext;
use crate::documents::ConfigBundle;
use crate::errors::DispatchError;
use crate::metrics_defs::DISPATCH_DURATION;
use crate::params::NormalizedParameters;
use crate::signature::Signature;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use shared::histogram;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

/// Provider name to the value it returned.
pub type ResultMap = BTreeMap<String, JsonValue>;

/// Provider name to the reason it failed.
pub type ErrorMap = BTreeMap<String, ProviderFailure>;

/// Provider-agnostic query handed to the runner.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Query {
    pub source: String,
    pub remote_ip: String,
    pub arguments: NormalizedParameters,
    pub resource: Option<String>,
    pub method: Option<String>,
    pub request_method: String,
    pub project: String,
    pub signature: Option<Signature>,
}

impl Query {
    /// Builds the query for `ctx`, optionally targeting another establishment.
    pub fn new(ctx: &RequestContext, establishment: Option<&str>) -> Self {
        Self {
            source: establishment.unwrap_or(ctx.establishment()).to_string(),
            remote_ip: ctx.remote_ip().to_string(),
            arguments: ctx.params().clone(),
            resource: ctx.resource().map(str::to_string),
            method: ctx.method().map(str::to_string),
            request_method: ctx.request_method().as_str().to_string(),
            project: ctx.project().to_string(),
            signature: ctx.signature().cloned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub error_kind: String,
    pub error_message: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub arguments: JsonValue,
    #[serde(default)]
    pub parameter_index: Option<u64>,
}

/// What one or more runner invocations produced.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    #[serde(default)]
    pub results: ResultMap,
    #[serde(default)]
    pub errors: ErrorMap,
}

impl Outcome {
    /// Folds a later outcome into this one. Entries already present win:
    /// arrays are concatenated, objects only gain missing keys.
    pub fn absorb(&mut self, later: Outcome) {
        for (provider, value) in later.results {
            match self.results.entry(provider) {
                Entry::Vacant(entry) => {
                    entry.insert(value);
                }
                Entry::Occupied(mut entry) => combine(entry.get_mut(), value),
            }
        }

        for (provider, failure) in later.errors {
            self.errors.entry(provider).or_insert(failure);
        }
    }
}

fn combine(existing: &mut JsonValue, later: JsonValue) {
    match (existing, later) {
        (JsonValue::Array(items), JsonValue::Array(more)) => items.extend(more),
        (JsonValue::Object(map), JsonValue::Object(more)) => {
            for (key, value) in more {
                map.entry(key).or_insert(value);
            }
        }
        _ => {}
    }
}

/// Per-request settings the runner executes a query under.
#[derive(Clone, Debug)]
pub struct RunSettings {
    pub config: Arc<ConfigBundle>,
    /// Providers verify the query signature unless the caller is a superuser.
    pub check_signature: bool,
}

/// Fans a query out to the configured providers.
///
/// Implementations own access control, provider timeouts and retries.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn dispatch(&self, settings: &RunSettings, query: &Query)
    -> Result<Outcome, DispatchError>;
}

#[derive(Clone)]
pub struct Dispatcher {
    runner: Arc<dyn Runner>,
}

impl Dispatcher {
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        Self { runner }
    }

    /// Runs one query. Runner failures are returned unchanged and never retried.
    pub async fn dispatch(
        &self,
        settings: &RunSettings,
        ctx: &RequestContext,
        establishment: Option<&str>,
    ) -> Result<Outcome, DispatchError> {
        let query = Query::new(ctx, establishment);
        timed(self.runner.dispatch(settings, &query)).await
    }

    /// Runs one query per establishment in parallel and folds the outcomes in
    /// the order the establishments were given.
    pub async fn dispatch_all(
        &self,
        settings: &RunSettings,
        ctx: &RequestContext,
        establishments: &[String],
    ) -> Result<Outcome, DispatchError> {
        let mut join_set = JoinSet::new();

        for (index, establishment) in establishments.iter().enumerate() {
            let runner = self.runner.clone();
            let settings = settings.clone();
            let query = Query::new(ctx, Some(establishment));
            join_set.spawn(async move {
                let result = timed(runner.dispatch(&settings, &query)).await;
                (index, result)
            });
        }

        let mut outcomes: Vec<Option<Outcome>> = (0..establishments.len()).map(|_| None).collect();

        // Dropping the join set on an early return aborts the remaining queries
        while let Some(joined) = join_set.join_next().await {
            let (index, result) = joined.map_err(|e| DispatchError::Join(e.to_string()))?;
            outcomes[index] = Some(result?);
        }

        let mut merged = Outcome::default();
        for outcome in outcomes.into_iter().flatten() {
            merged.absorb(outcome);
        }
        Ok(merged)
    }
}

async fn timed<F>(dispatch: F) -> Result<Outcome, DispatchError>
where
    F: Future<Output = Result<Outcome, DispatchError>>,
{
    let start = Instant::now();
    let result = dispatch.await;
    let status = if result.is_ok() { "ok" } else { "error" };
    histogram!(DISPATCH_DURATION, "status" => status).record(start.elapsed().as_secs_f64());
    result
}
