use crate::{
    backend::{Backend, FindRequest, HttpBackend, InfoRequest, RenderRequest},
    config::AppConfig,
    encoding::{self, EncodeError, Format},
    error::ServiceError,
    eval::{self, functions, EvalContext, Prefetched, Values},
    fanout,
    merge::{self, MismatchConfig},
    metrics::{GatewayMetrics, Handler},
    parser, requests,
    routing::TldRouter,
    series::{FindMatch, MetricData, RenderStats},
    state::AppState,
};
use axum::{
    extract::{Form, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Instant,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub struct Server {
    config: Arc<AppConfig>,
    state: AppState,
}

impl Server {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let mut backends: Vec<Arc<dyn Backend>> = Vec::with_capacity(config.backends.len());
        for backend in &config.backends {
            backends.push(Arc::new(HttpBackend::new(
                backend.address.clone(),
                backend.tlds.clone(),
                config.backend_timeout,
            )?));
        }
        Ok(Self::with_backends(config, backends))
    }

    /// Wires the server around an explicit fleet; tests inject stubs here.
    pub fn with_backends(config: AppConfig, backends: Vec<Arc<dyn Backend>>) -> Self {
        let config = Arc::new(config);
        let router = TldRouter::new(backends);
        let registry = Arc::new(functions::default_registry());
        let metrics = Arc::new(GatewayMetrics::new());
        let state = AppState::new(Arc::clone(&config), router, registry, metrics);
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/metrics/find", get(Self::find).post(Self::find))
            .route("/render", get(Self::render).post(Self::render))
            .route("/info", get(Self::info).post(Self::info))
            .route("/lb-check", get(Self::lb_check))
            .route("/metrics", get(Self::prometheus))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, backends = self.state.router.all().len(), "carbonq listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    async fn find(
        State(state): State<AppState>,
        Query(query): Query<HashMap<String, String>>,
        form: Option<Form<HashMap<String, String>>>,
    ) -> Response {
        let started = Instant::now();
        state.metrics.requests.inc();

        let target = param(&query, &form, "query");
        let format_raw = param(&query, &form, "format");
        debug!(target = %target, format = %format_raw, "find request");

        let backends = state.router.route(std::slice::from_ref(&target)).await;
        let outcome = fanout::finds(
            &backends,
            FindRequest {
                query: target.clone(),
            },
            state.config.global_timeout,
        )
        .await;
        if outcome.timed_out {
            state.metrics.record_cancel(Handler::Find);
        }

        let mut matches: Vec<FindMatch> = outcome.replies.into_iter().flatten().collect();
        match fanout::reconcile(&outcome.errors, outcome.attempted) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                // graphite-web 0.9 insists on a 200 with an empty body when
                // nothing matches; only the monitoring side hears about it.
                state.metrics.find_not_found.inc();
                info!(target = %target, error = %err, "find matched nothing");
                matches.clear();
            }
            Err(err) => {
                return fail(&state, Handler::Find, started, ServiceError::Upstream(err))
            }
        }

        let matches = merge::merge_find_matches(matches);

        let Some(format) = Format::for_data(&format_raw) else {
            return fail(&state, Handler::Find, started, unknown_format(&format_raw));
        };
        match encoding::encode_find(
            &target,
            &matches,
            format,
            state.config.graphite_web09_compatibility,
        ) {
            Ok(blob) => respond(&state, Handler::Find, started, format.content_type(), blob),
            Err(err) => fail(&state, Handler::Find, started, ServiceError::Encode(err)),
        }
    }

    async fn render(
        State(state): State<AppState>,
        Query(query): Query<HashMap<String, String>>,
        form: Option<Form<HashMap<String, String>>>,
    ) -> Response {
        let started = Instant::now();
        state.metrics.requests.inc();

        let target = param(&query, &form, "target");
        let format_raw = param(&query, &form, "format");
        debug!(target = %target, format = %format_raw, "render request");

        let Ok(from) = param(&query, &form, "from").parse::<i32>() else {
            return fail(
                &state,
                Handler::Render,
                started,
                ServiceError::InvalidRequest("from is not an integer".to_string()),
            );
        };
        let Ok(until) = param(&query, &form, "until").parse::<i32>() else {
            return fail(
                &state,
                Handler::Render,
                started,
                ServiceError::InvalidRequest("until is not an integer".to_string()),
            );
        };
        if target.is_empty() {
            return fail(
                &state,
                Handler::Render,
                started,
                ServiceError::InvalidRequest("empty target".to_string()),
            );
        }

        let (exp, rest) = match parser::parse(&target) {
            Ok(parsed) => parsed,
            Err(err) => return fail(&state, Handler::Render, started, ServiceError::Parse(err)),
        };
        if !rest.trim().is_empty() {
            return fail(
                &state,
                Handler::Render,
                started,
                ServiceError::InvalidRequest("invalid expression".to_string()),
            );
        }

        let mut wanted = requests::with_window(requests::metrics_of(&exp), from, until);
        let mut seen = HashSet::new();
        wanted.retain(|request| seen.insert(request.clone()));

        let mismatch_config = MismatchConfig {
            tolerance: state.config.mismatch_tolerance,
            fix: state.config.fix_mismatches,
        };

        let mut values = Values::new();
        let mut stats = RenderStats::default();
        let mut misses = 0usize;
        for request in &wanted {
            let backends = state.router.route(std::slice::from_ref(&request.metric)).await;
            let outcome = fanout::renders(
                &backends,
                RenderRequest {
                    targets: vec![request.metric.clone()],
                    from: request.from,
                    until: request.until,
                },
                state.config.global_timeout,
            )
            .await;
            if outcome.timed_out {
                state.metrics.record_cancel(Handler::Render);
            }

            match fanout::reconcile(&outcome.errors, outcome.attempted) {
                Ok(()) => {
                    let fetched: Vec<MetricData> =
                        outcome.replies.into_iter().flatten().collect();
                    let (merged, merge_stats) = merge::merge_series(fetched, mismatch_config);
                    stats.absorb(merge_stats);
                    values.insert(request.clone(), merged);
                }
                Err(err) if err.is_not_found() => {
                    // One missing pattern only empties its own series; the
                    // request as a whole 404s when every pattern is missing.
                    misses += 1;
                    values.insert(request.clone(), Vec::new());
                }
                Err(err) => {
                    return fail(&state, Handler::Render, started, ServiceError::Upstream(err))
                }
            }
        }
        if !wanted.is_empty() && misses == wanted.len() {
            return fail(
                &state,
                Handler::Render,
                started,
                ServiceError::NotFound("not found".to_string()),
            );
        }

        state.metrics.render_data_points.inc_by(stats.data_point_count);
        state.metrics.render_mismatches.inc_by(stats.mismatch_count);
        state
            .metrics
            .render_fixed_mismatches
            .inc_by(stats.fixed_mismatch_count);
        if stats.mismatch_count > stats.fixed_mismatch_count {
            state.metrics.render_mismatched_responses.inc();
        }

        let mut ctx = EvalContext {
            registry: &state.registry,
            values: &mut values,
            fetcher: &Prefetched,
        };
        let series = match eval::eval(&mut ctx, &exp, from, until) {
            Ok(series) => series,
            Err(err) => return fail(&state, Handler::Render, started, ServiceError::Eval(err)),
        };

        let Some(format) = Format::for_data(&format_raw) else {
            return fail(&state, Handler::Render, started, unknown_format(&format_raw));
        };
        match encoding::encode_render(&series, format) {
            Ok(blob) => respond(&state, Handler::Render, started, format.content_type(), blob),
            Err(err) => fail(&state, Handler::Render, started, ServiceError::Encode(err)),
        }
    }

    async fn info(
        State(state): State<AppState>,
        Query(query): Query<HashMap<String, String>>,
        form: Option<Form<HashMap<String, String>>>,
    ) -> Response {
        let started = Instant::now();
        state.metrics.requests.inc();

        let target = param(&query, &form, "target");
        let format_raw = param(&query, &form, "format");
        if target.is_empty() {
            return fail(
                &state,
                Handler::Info,
                started,
                ServiceError::InvalidRequest("info: empty target".to_string()),
            );
        }

        let backends = state.router.route(std::slice::from_ref(&target)).await;
        let outcome = fanout::infos(
            &backends,
            InfoRequest {
                target: target.clone(),
            },
            state.config.global_timeout,
        )
        .await;
        if outcome.timed_out {
            state.metrics.record_cancel(Handler::Info);
        }

        match fanout::reconcile(&outcome.errors, outcome.attempted) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                return fail(
                    &state,
                    Handler::Info,
                    started,
                    ServiceError::NotFound("info: not found".to_string()),
                )
            }
            Err(err) => {
                return fail(&state, Handler::Info, started, ServiceError::Upstream(err))
            }
        }

        let mut infos = outcome.replies;
        infos.sort_by(|a, b| a.server.cmp(&b.server));

        let Some(format) = Format::for_info(&format_raw) else {
            return fail(&state, Handler::Info, started, unknown_format(&format_raw));
        };
        match encoding::encode_info(&infos, format) {
            Ok(blob) => respond(&state, Handler::Info, started, format.content_type(), blob),
            Err(err) => fail(&state, Handler::Info, started, ServiceError::Encode(err)),
        }
    }

    async fn lb_check(State(state): State<AppState>) -> Response {
        state.metrics.requests.inc();
        state.metrics.record_response(Handler::LbCheck, 200);
        "Ok\n".into_response()
    }

    async fn prometheus(State(state): State<AppState>) -> Response {
        match state.metrics.encode() {
            Ok(body) => (
                [(
                    header::CONTENT_TYPE,
                    "application/openmetrics-text; version=1.0.0; charset=utf-8",
                )],
                body,
            )
                .into_response(),
            Err(err) => {
                ServiceError::Internal(anyhow::anyhow!("metrics encoding failed: {err}"))
                    .into_response()
            }
        }
    }
}

fn param(
    query: &HashMap<String, String>,
    form: &Option<Form<HashMap<String, String>>>,
    key: &str,
) -> String {
    if let Some(Form(form)) = form {
        if let Some(value) = form.get(key) {
            return value.clone();
        }
    }
    query.get(key).cloned().unwrap_or_default()
}

fn unknown_format(raw: &str) -> ServiceError {
    ServiceError::Encode(EncodeError::new(format!("unknown format '{raw}'")))
}

fn respond(
    state: &AppState,
    handler: Handler,
    started: Instant,
    content_type: &'static str,
    blob: Vec<u8>,
) -> Response {
    state.metrics.record_response(handler, 200);
    info!(
        ?handler,
        runtime_ms = started.elapsed().as_millis() as u64,
        bytes = blob.len(),
        "request served"
    );
    ([(header::CONTENT_TYPE, content_type)], blob).into_response()
}

fn fail(state: &AppState, handler: Handler, started: Instant, err: ServiceError) -> Response {
    let code = err.status().as_u16();
    state.metrics.record_response(handler, code);
    warn!(
        ?handler,
        http_code = code,
        runtime_ms = started.elapsed().as_millis() as u64,
        error = %err,
        "request failed"
    );
    err.into_response()
}
