use std::sync::Arc;

use crate::eval::{
    get_series_arg, EvalContext, EvalError, FunctionDescription, FunctionRegistry, SeriesFunction,
};
use crate::parser::{Expr, ParseError};
use crate::series::MetricData;

pub fn register(registry: &mut FunctionRegistry) {
    registry.register(&["keepLastValue"], Arc::new(KeepLastValue));
}

struct KeepLastValue;

impl SeriesFunction for KeepLastValue {
    fn call(
        &self,
        ctx: &mut EvalContext,
        exp: &Expr,
        from: i32,
        until: i32,
    ) -> Result<Vec<MetricData>, EvalError> {
        let first = exp.args().first().ok_or(ParseError::MissingArgument)?;
        let limit = exp.get_int_named_or_pos_default("limit", 1, i64::MAX)?;
        let explicit_limit = exp.args().len() > 1 || exp.get_named_arg("limit").is_some();

        let mut series = get_series_arg(ctx, first, from, until)?;
        for one in &mut series {
            one.name = if explicit_limit {
                format!("keepLastValue({},{limit})", one.name)
            } else {
                format!("keepLastValue({})", one.name)
            };

            let mut last: Option<f64> = None;
            let mut gap = 0i64;
            for i in 0..one.len() {
                if !one.is_absent[i] {
                    last = Some(one.values[i]);
                    gap = 0;
                    continue;
                }
                gap += 1;
                if let Some(value) = last {
                    if gap <= limit {
                        one.values[i] = value;
                        one.is_absent[i] = false;
                    }
                }
            }
        }
        Ok(series)
    }

    fn description(&self) -> FunctionDescription {
        FunctionDescription {
            name: "keepLastValue",
            signature: "keepLastValue(seriesList, limit=inf)",
            group: "Transform",
            summary: "Carries the last seen value across gaps of at most `limit` points.",
        }
    }
}
