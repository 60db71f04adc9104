//! Concurrent backend fan-out and the partial-failure policy.
//!
//! Every selected backend is queried on its own task; the request-scoped
//! deadline aborts stragglers but keeps whatever already arrived. The
//! reconciler then classifies the error vector: any reply at all is a
//! success, an all-not-found fleet is a not-found, and anything else is a
//! mixed failure.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::warn;

use crate::backend::{Backend, FetchError, FindRequest, InfoRequest, RenderRequest};
use crate::series::{FindMatch, MetricData, ServerInfo};

const MAX_MIXED_ERROR_CHARS: usize = 300;

/// Outcome of one fan-out: gathered replies, the per-backend error vector,
/// how many backends were attempted, and whether the deadline fired.
pub struct Fanout<T> {
    pub replies: Vec<T>,
    pub errors: Vec<FetchError>,
    pub attempted: usize,
    pub timed_out: bool,
}

pub async fn finds(
    backends: &[Arc<dyn Backend>],
    request: FindRequest,
    deadline: Duration,
) -> Fanout<Vec<FindMatch>> {
    let targets = vec![request.query.clone()];
    fan_out(backends, &targets, deadline, move |backend| {
        let request = request.clone();
        async move { backend.find(&request).await }
    })
    .await
}

pub async fn renders(
    backends: &[Arc<dyn Backend>],
    request: RenderRequest,
    deadline: Duration,
) -> Fanout<Vec<MetricData>> {
    let targets = request.targets.clone();
    fan_out(backends, &targets, deadline, move |backend| {
        let request = request.clone();
        async move { backend.render(&request).await }
    })
    .await
}

pub async fn infos(
    backends: &[Arc<dyn Backend>],
    request: InfoRequest,
    deadline: Duration,
) -> Fanout<ServerInfo> {
    let targets = vec![request.target.clone()];
    fan_out(backends, &targets, deadline, move |backend| {
        let request = request.clone();
        async move {
            let server = backend.server_address().to_string();
            backend
                .info(&request)
                .await
                .map(|info| ServerInfo { server, info })
        }
    })
    .await
}

async fn fan_out<T, F, Fut>(
    backends: &[Arc<dyn Backend>],
    targets: &[String],
    deadline: Duration,
    call: F,
) -> Fanout<T>
where
    T: Send + 'static,
    F: Fn(Arc<dyn Backend>) -> Fut,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
{
    let selected: Vec<Arc<dyn Backend>> = backends
        .iter()
        .filter(|backend| backend.matches(targets))
        .cloned()
        .collect();
    let attempted = selected.len();

    let mut tasks = JoinSet::new();
    for backend in selected {
        tasks.spawn(call(backend));
    }

    let mut replies = Vec::with_capacity(attempted);
    let mut errors = Vec::new();

    let gather = async {
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(reply)) => replies.push(reply),
                Ok(Err(err)) => errors.push(err),
                Err(join_err) => {
                    errors.push(FetchError::Other(format!("backend task failed: {join_err}")))
                }
            }
        }
    };

    let timed_out = tokio::time::timeout(deadline, gather).await.is_err();
    if timed_out {
        tasks.abort_all();
        warn!(
            attempted,
            gathered = replies.len(),
            "fan-out deadline expired, keeping partial replies"
        );
    }

    Fanout {
        replies,
        errors,
        attempted,
        timed_out,
    }
}

/// Collapses a per-backend error vector into the request's fate. Any reply
/// (fewer errors than backends) is success; an all-failed fleet is NotFound
/// only when the non-NotFound errors fall short of a majority.
pub fn reconcile(errors: &[FetchError], attempted: usize) -> Result<(), FetchError> {
    let failed = errors.len();
    if failed == 0 || failed < attempted {
        return Ok(());
    }
    if failed > attempted {
        return Err(FetchError::Other(
            "got more errors than there are backends".to_string(),
        ));
    }

    let not_found = errors.iter().filter(|e| e.is_not_found()).count();
    let majority = (attempted + 1) / 2;
    if failed - not_found < majority {
        return Err(FetchError::NotFound(format!(
            "majority of backends returned not found: {failed} total errors, {not_found} not found"
        )));
    }

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for err in errors {
        *counts.entry(err.to_string()).or_default() += 1;
    }
    Err(FetchError::Other(truncate(
        format!("all backends failed with mixed errors: {counts:?}"),
        MAX_MIXED_ERROR_CHARS,
    )))
}

fn truncate(mut message: String, limit: usize) -> String {
    if message.len() > limit {
        let mut end = limit;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }
    message
}
