use std::sync::Arc;

use crate::eval::{
    get_series_arg, normalize, EvalContext, EvalError, FunctionDescription, FunctionRegistry,
    SeriesFunction,
};
use crate::parser::{Expr, ParseError};
use crate::series::MetricData;

pub fn register(registry: &mut FunctionRegistry) {
    registry.register(&["divideSeries"], Arc::new(DivideSeries));
}

struct DivideSeries;

impl SeriesFunction for DivideSeries {
    fn call(
        &self,
        ctx: &mut EvalContext,
        exp: &Expr,
        from: i32,
        until: i32,
    ) -> Result<Vec<MetricData>, EvalError> {
        let first = exp.args().first().ok_or(ParseError::MissingArgument)?;

        let (dividends, divisor) = match exp.args().get(1) {
            Some(second) => {
                let dividends = get_series_arg(ctx, first, from, until)?;
                let mut divisors = get_series_arg(ctx, second, from, until)?;
                if divisors.len() != 1 {
                    return Err(EvalError::MissingTimeseries);
                }
                (dividends, divisors.remove(0))
            }
            None => {
                // Single-list form: exactly two series, first over second.
                let mut series = get_series_arg(ctx, first, from, until)?;
                if series.len() != 2 {
                    return Err(EvalError::MissingTimeseries);
                }
                let divisor = series.remove(1);
                (series, divisor)
            }
        };
        let single_list = exp.args().len() == 1;

        let mut results = Vec::with_capacity(dividends.len());
        for dividend in dividends {
            let name = if single_list {
                format!("divideSeries({})", exp.raw_args())
            } else {
                format!("divideSeries({},{})", dividend.name, divisor.name)
            };
            let aligned = normalize(vec![dividend, divisor.clone()]);
            let length = aligned[0].len();
            let mut quotient = MetricData {
                name,
                start_time: aligned[0].start_time,
                stop_time: aligned[0].start_time + aligned[0].step_time * length as i32,
                step_time: aligned[0].step_time,
                values: vec![0.0; length],
                is_absent: vec![true; length],
            };
            for i in 0..length {
                let (Some(num), Some(den)) = (aligned[0].value_at(i), aligned[1].value_at(i))
                else {
                    continue;
                };
                if den == 0.0 {
                    continue;
                }
                quotient.values[i] = num / den;
                quotient.is_absent[i] = false;
            }
            results.push(quotient);
        }
        Ok(results)
    }

    fn description(&self) -> FunctionDescription {
        FunctionDescription {
            name: "divideSeries",
            signature: "divideSeries(dividendSeriesList, divisorSeries)",
            group: "Combine",
            summary: "Divides each dividend by the divisor; buckets with an absent operand or a zero divisor are absent.",
        }
    }
}
