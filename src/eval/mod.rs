//! Recursive interpreter over parsed target expressions.
//!
//! Evaluation is synchronous and single-threaded: all series data lives in
//! the caller-provided values map, populated by the fan-out layer before the
//! interpreter runs. Name nodes that miss the map go through the
//! [`SeriesFetcher`] seam and the result is cached back into the map.

pub mod functions;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::backend::FetchError;
use crate::parser::{Expr, ParseError};
use crate::series::{MetricData, MetricRequest};

pub type Values = HashMap<MetricRequest, Vec<MetricData>>;

#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error(transparent)]
    Arg(#[from] ParseError),

    #[error("expression has no timeseries to operate on")]
    MissingTimeseries,

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Lazily supplies series for targets the fan-out did not prefetch.
pub trait SeriesFetcher {
    fn fetch(&self, request: &MetricRequest) -> Result<Vec<MetricData>, EvalError>;
}

/// Fetcher for fully prefetched maps: a miss is simply an absent series.
pub struct Prefetched;

impl SeriesFetcher for Prefetched {
    fn fetch(&self, _request: &MetricRequest) -> Result<Vec<MetricData>, EvalError> {
        Ok(Vec::new())
    }
}

pub struct EvalContext<'a> {
    pub registry: &'a FunctionRegistry,
    pub values: &'a mut Values,
    pub fetcher: &'a dyn SeriesFetcher,
}

/// Where the registry slots a function when applying several of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionOrder {
    Any,
    Last,
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionDescription {
    pub name: &'static str,
    pub signature: &'static str,
    pub group: &'static str,
    pub summary: &'static str,
}

/// One registered evaluator function.
pub trait SeriesFunction: Send + Sync {
    fn call(
        &self,
        ctx: &mut EvalContext,
        exp: &Expr,
        from: i32,
        until: i32,
    ) -> Result<Vec<MetricData>, EvalError>;

    fn description(&self) -> FunctionDescription;

    fn order(&self) -> FunctionOrder {
        FunctionOrder::Any
    }
}

/// Name → function table, built once at startup and shared read-only.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<&'static str, Arc<dyn SeriesFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, names: &[&'static str], function: Arc<dyn SeriesFunction>) {
        for name in names {
            self.functions.insert(name, Arc::clone(&function));
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SeriesFunction>> {
        self.functions.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Evaluates `exp` over the window `[from, until]`.
pub fn eval(
    ctx: &mut EvalContext,
    exp: &Expr,
    from: i32,
    until: i32,
) -> Result<Vec<MetricData>, EvalError> {
    match exp {
        Expr::Name(name) => {
            let key = MetricRequest::new(name.clone(), from, until);
            if let Some(data) = ctx.values.get(&key) {
                return Ok(data.clone());
            }
            let fetched = ctx.fetcher.fetch(&key)?;
            ctx.values.insert(key, fetched.clone());
            Ok(fetched)
        }
        Expr::Const(_) | Expr::Str(_) => Err(EvalError::MissingTimeseries),
        Expr::Func(call) => {
            let function = ctx
                .registry
                .get(&call.name)
                .ok_or_else(|| EvalError::UnknownFunction(call.name.clone()))?;
            function.call(ctx, exp, from, until)
        }
    }
}

/// Evaluates an argument that must produce series.
pub fn get_series_arg(
    ctx: &mut EvalContext,
    arg: &Expr,
    from: i32,
    until: i32,
) -> Result<Vec<MetricData>, EvalError> {
    if !arg.is_name() && !arg.is_func() {
        return Err(EvalError::MissingTimeseries);
    }
    eval(ctx, arg, from, until)
}

/// Evaluates every argument and concatenates the series.
pub fn get_series_args(
    ctx: &mut EvalContext,
    args: &[Expr],
    from: i32,
    until: i32,
) -> Result<Vec<MetricData>, EvalError> {
    if args.is_empty() {
        return Err(EvalError::MissingTimeseries);
    }
    let mut series = Vec::new();
    for arg in args {
        series.extend(get_series_arg(ctx, arg, from, until)?);
    }
    Ok(series)
}

/// Aligns a set of series for positional bucket math: every series is
/// consolidated to the largest step present and truncated to the shortest
/// length.
pub fn normalize(series: Vec<MetricData>) -> Vec<MetricData> {
    if series.len() < 2 {
        return series;
    }
    let step = series.iter().map(|s| s.step_time).max().unwrap_or(0);
    let mut aligned: Vec<MetricData> = series.iter().map(|s| s.consolidate_to(step)).collect();
    let length = aligned.iter().map(MetricData::len).min().unwrap_or(0);
    for one in &mut aligned {
        one.values.truncate(length);
        one.is_absent.truncate(length);
        one.stop_time = one.start_time + one.step_time * length as i32;
    }
    aligned
}
