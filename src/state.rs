use crate::{
    config::AppConfig, eval::FunctionRegistry, metrics::GatewayMetrics, routing::TldRouter,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub router: TldRouter,
    pub registry: Arc<FunctionRegistry>,
    pub metrics: Arc<GatewayMetrics>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        router: TldRouter,
        registry: Arc<FunctionRegistry>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            config,
            router,
            registry,
            metrics,
        }
    }
}
