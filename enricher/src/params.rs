//! Normalized request parameters.
//!
//! The four parameters every provider query needs (`id`, `project`,
//! `establishment`, `base_url`) are kept as named fields. Anything else the
//! caller put in the query string lives in a separate open map and is
//! forwarded untouched, since providers may require their own arguments.
//! An explicit `id` or `base_url` in the query string replaces the value
//! derived from the request.

use http::Uri;
use serde::Serialize;
use std::collections::BTreeMap;

pub const ID: &str = "id";
pub const PROJECT: &str = "project";
pub const ESTABLISHMENT: &str = "establishment";
pub const BASE_URL: &str = "base_url";


#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NormalizedParameters {
    id: String,
    project: String,
    establishment: String,
    base_url: String,
    #[serde(flatten)]
    extra: BTreeMap<String, String>,
}

impl NormalizedParameters {
    /// Extra `id` and `base_url` pairs override the derived values. Extra
    /// `project` and `establishment` pairs are ignored.
    pub fn new(
        id: String,
        project: String,
        establishment: String,
        base_url: String,
        extra: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let mut extra: BTreeMap<String, String> = extra
            .into_iter()
            .filter(|(key, _)| key != PROJECT && key != ESTABLISHMENT)
            .collect();
        let id = extra.remove(ID).unwrap_or(id);
        let base_url = extra.remove(BASE_URL).unwrap_or(base_url);

        Self {
            id,
            project,
            establishment,
            base_url,
            extra,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn establishment(&self) -> &str {
        &self.establishment
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn extra(&self) -> &BTreeMap<String, String> {
        &self.extra
    }

    /// Every `(key, value)` pair, required and extra, in lexicographic key order.
    pub fn sorted_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        let mut pairs: BTreeMap<&str, &str> = self
            .extra
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        pairs.insert(ID, &self.id);
        pairs.insert(PROJECT, &self.project);
        pairs.insert(ESTABLISHMENT, &self.establishment);
        pairs.insert(BASE_URL, &self.base_url);
        pairs.into_iter()
    }
}

/// Decodes the query string of `uri`. A key repeated in the query keeps its last value.
pub fn query_map(uri: &Uri) -> BTreeMap<String, String> {
    uri.query()
        .map(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}
