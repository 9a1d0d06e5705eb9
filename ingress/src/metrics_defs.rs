use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUESTS_TOTAL: MetricDef = MetricDef {
    name: "requests.total",
    metric_type: MetricType::Counter,
    description: "Inbound requests handled. Tagged with status class.",
};

pub const ORIGIN_REJECTED: MetricDef = MetricDef {
    name: "origin.rejected",
    metric_type: MetricType::Counter,
    description: "Requests denied by the origin admission policy",
};

pub const PAYLOAD_REJECTED: MetricDef = MetricDef {
    name: "payload.rejected",
    metric_type: MetricType::Counter,
    description: "Payloads rejected by validation or emptiness checks",
};

pub const FORWARD_RETRIES: MetricDef = MetricDef {
    name: "forward.retries",
    metric_type: MetricType::Counter,
    description: "Webhook attempts retried after a 5xx or transport failure",
};

pub const FORWARD_FAILURES: MetricDef = MetricDef {
    name: "forward.failures",
    metric_type: MetricType::Counter,
    description: "Forwards that failed after exhausting the retry",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUESTS_TOTAL,
    ORIGIN_REJECTED,
    PAYLOAD_REJECTED,
    FORWARD_RETRIES,
    FORWARD_FAILURES,
];
