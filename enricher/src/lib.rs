pub mod caller;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod documents;
pub mod errors;
pub mod gate;
pub mod http;
pub mod merge;
pub mod metrics_defs;
pub mod params;
pub mod payload;
pub mod pipeline;
pub mod report;
pub mod router;
pub mod runner;
pub mod service;
pub mod signature;

#[cfg(test)]
mod testutils;

pub use config::Config;
pub use errors::{ClassificationError, ConfigError, DispatchError, EnrichError};
pub use pipeline::Enricher;
pub use service::run;
