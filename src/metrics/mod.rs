use metrics::{counter, histogram};

use crate::rate_limit::Tier;

/// Outcome label for a limiter decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Admitted,
    Limited,
    Unauthenticated,
    StoreError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Admitted => "admitted",
            Outcome::Limited => "limited",
            Outcome::Unauthenticated => "unauthenticated",
            Outcome::StoreError => "store_error",
        }
    }
}

pub fn record_rate_limit_decision(policy: &'static str, tier: Tier, outcome: Outcome) {
    counter!(
        "gateway_rate_limit_decisions_total",
        "policy" => policy,
        "tier" => tier.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn record_upstream_request(status_code: u16, latency_seconds: f64) {
    counter!("gateway_upstream_requests_total", "status" => status_code.to_string()).increment(1);
    histogram!("gateway_upstream_latency_seconds").record(latency_seconds);

    if status_code >= 500 {
        counter!("gateway_upstream_5xx_total").increment(1);
    }
}
