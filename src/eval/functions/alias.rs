use std::sync::Arc;

use crate::eval::{
    get_series_arg, EvalContext, EvalError, FunctionDescription, FunctionRegistry, SeriesFunction,
};
use crate::parser::{Expr, ParseError};
use crate::series::MetricData;

pub fn register(registry: &mut FunctionRegistry) {
    registry.register(&["alias"], Arc::new(Alias));
}

struct Alias;

impl SeriesFunction for Alias {
    fn call(
        &self,
        ctx: &mut EvalContext,
        exp: &Expr,
        from: i32,
        until: i32,
    ) -> Result<Vec<MetricData>, EvalError> {
        let first = exp.args().first().ok_or(ParseError::MissingArgument)?;
        let name = exp.get_string_arg(1)?;
        let mut series = get_series_arg(ctx, first, from, until)?;
        for one in &mut series {
            one.name = name.clone();
        }
        Ok(series)
    }

    fn description(&self) -> FunctionDescription {
        FunctionDescription {
            name: "alias",
            signature: "alias(seriesList, newName)",
            group: "Alias",
            summary: "Renames every series in the list to the given string.",
        }
    }
}
