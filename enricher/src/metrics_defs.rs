use shared::metrics_defs::{MetricDef, MetricType};

pub const ENRICH_REQUESTS: MetricDef = MetricDef {
    name: "enrich.requests",
    metric_type: MetricType::Counter,
    description: "Responses that went through the enrichment pipeline. Tagged with outcome.",
};

pub const DISPATCH_DURATION: MetricDef = MetricDef {
    name: "enrich.dispatch.duration",
    metric_type: MetricType::Histogram,
    description: "Runner call duration in seconds. Tagged with status.",
};

pub const PROVIDER_ERRORS: MetricDef = MetricDef {
    name: "enrich.provider.errors",
    metric_type: MetricType::Counter,
    description: "Provider failures reported by the runner. Tagged with provider, error_kind.",
};

pub const ALL_METRICS: &[MetricDef] = &[ENRICH_REQUESTS, DISPATCH_DURATION, PROVIDER_ERRORS];
