//! Prometheus counters for the gateway.

use prometheus_client::encoding::text;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Handler {
    Find,
    Render,
    Info,
    LbCheck,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResponseLabels {
    pub handler: Handler,
    pub code: u16,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HandlerLabels {
    pub handler: Handler,
}

pub struct GatewayMetrics {
    registry: Registry,
    pub requests: Counter,
    pub responses: Family<ResponseLabels, Counter>,
    pub find_not_found: Counter,
    pub request_cancels: Family<HandlerLabels, Counter>,
    pub render_data_points: Counter,
    pub render_mismatches: Counter,
    pub render_fixed_mismatches: Counter,
    pub render_mismatched_responses: Counter,
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("carbonq");

        let requests = Counter::default();
        registry.register("requests", "Requests received", requests.clone());

        let responses = Family::<ResponseLabels, Counter>::default();
        registry.register("responses", "Responses by handler and code", responses.clone());

        let find_not_found = Counter::default();
        registry.register(
            "find_not_found",
            "Find requests that matched nothing anywhere",
            find_not_found.clone(),
        );

        let request_cancels = Family::<HandlerLabels, Counter>::default();
        registry.register(
            "request_cancels",
            "Fan-outs cut short by the global deadline",
            request_cancels.clone(),
        );

        let render_data_points = Counter::default();
        registry.register(
            "render_data_points",
            "Data points returned by render",
            render_data_points.clone(),
        );

        let render_mismatches = Counter::default();
        registry.register(
            "render_mismatches",
            "Replica buckets that disagreed beyond tolerance",
            render_mismatches.clone(),
        );

        let render_fixed_mismatches = Counter::default();
        registry.register(
            "render_fixed_mismatches",
            "Disagreeing buckets resolved by the fix rule",
            render_fixed_mismatches.clone(),
        );

        let render_mismatched_responses = Counter::default();
        registry.register(
            "render_mismatched_responses",
            "Render responses left with unfixed mismatches",
            render_mismatched_responses.clone(),
        );

        Self {
            registry,
            requests,
            responses,
            find_not_found,
            request_cancels,
            render_data_points,
            render_mismatches,
            render_fixed_mismatches,
            render_mismatched_responses,
        }
    }

    pub fn record_response(&self, handler: Handler, code: u16) {
        self.responses.get_or_create(&ResponseLabels { handler, code }).inc();
    }

    pub fn record_cancel(&self, handler: Handler) {
        self.request_cancels.get_or_create(&HandlerLabels { handler }).inc();
    }

    /// Text exposition of every registered metric.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        text::encode(&mut out, &self.registry)?;
        Ok(out)
    }
}
