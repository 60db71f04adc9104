//! Pointwise transforms: absolute, scale, offset.

use std::sync::Arc;

use crate::eval::{
    get_series_arg, EvalContext, EvalError, FunctionDescription, FunctionRegistry, SeriesFunction,
};
use crate::parser::{Expr, ParseError};
use crate::series::MetricData;

pub fn register(registry: &mut FunctionRegistry) {
    registry.register(&["absolute"], Arc::new(Absolute));
    registry.register(&["scale"], Arc::new(Scale));
    registry.register(&["offset"], Arc::new(Offset));
}

fn map_series<F>(
    ctx: &mut EvalContext,
    exp: &Expr,
    from: i32,
    until: i32,
    rename: impl Fn(&str) -> String,
    apply: F,
) -> Result<Vec<MetricData>, EvalError>
where
    F: Fn(f64) -> f64,
{
    let first = exp.args().first().ok_or(ParseError::MissingArgument)?;
    let mut series = get_series_arg(ctx, first, from, until)?;
    for one in &mut series {
        one.name = rename(&one.name);
        for i in 0..one.len() {
            if !one.is_absent[i] {
                one.values[i] = apply(one.values[i]);
            }
        }
    }
    Ok(series)
}

struct Absolute;

impl SeriesFunction for Absolute {
    fn call(
        &self,
        ctx: &mut EvalContext,
        exp: &Expr,
        from: i32,
        until: i32,
    ) -> Result<Vec<MetricData>, EvalError> {
        map_series(ctx, exp, from, until, |name| format!("absolute({name})"), f64::abs)
    }

    fn description(&self) -> FunctionDescription {
        FunctionDescription {
            name: "absolute",
            signature: "absolute(seriesList)",
            group: "Transform",
            summary: "Takes the absolute value of every present point.",
        }
    }
}

struct Scale;

impl SeriesFunction for Scale {
    fn call(
        &self,
        ctx: &mut EvalContext,
        exp: &Expr,
        from: i32,
        until: i32,
    ) -> Result<Vec<MetricData>, EvalError> {
        let factor = exp.get_float_arg(1)?;
        map_series(
            ctx,
            exp,
            from,
            until,
            |name| format!("scale({name},{factor})"),
            |v| v * factor,
        )
    }

    fn description(&self) -> FunctionDescription {
        FunctionDescription {
            name: "scale",
            signature: "scale(seriesList, factor)",
            group: "Transform",
            summary: "Multiplies every present point by a constant factor.",
        }
    }
}

struct Offset;

impl SeriesFunction for Offset {
    fn call(
        &self,
        ctx: &mut EvalContext,
        exp: &Expr,
        from: i32,
        until: i32,
    ) -> Result<Vec<MetricData>, EvalError> {
        let amount = exp.get_float_arg(1)?;
        map_series(
            ctx,
            exp,
            from,
            until,
            |name| format!("offset({name},{amount})"),
            |v| v + amount,
        )
    }

    fn description(&self) -> FunctionDescription {
        FunctionDescription {
            name: "offset",
            signature: "offset(seriesList, amount)",
            group: "Transform",
            summary: "Adds a constant to every present point.",
        }
    }
}
