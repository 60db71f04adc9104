//! Window-shifting functions. Both evaluate their series argument over a
//! moved window and re-anchor the result so it lines up with the window the
//! user asked to draw.

use std::sync::Arc;

use crate::eval::{
    get_series_arg, EvalContext, EvalError, FunctionDescription, FunctionRegistry, SeriesFunction,
};
use crate::parser::{Expr, ParseError};
use crate::series::MetricData;

pub fn register(registry: &mut FunctionRegistry) {
    registry.register(&["timeShift"], Arc::new(TimeShift));
    registry.register(&["timeStack"], Arc::new(TimeStack));
}

struct TimeShift;

impl SeriesFunction for TimeShift {
    fn call(
        &self,
        ctx: &mut EvalContext,
        exp: &Expr,
        from: i32,
        until: i32,
    ) -> Result<Vec<MetricData>, EvalError> {
        let first = exp.args().first().ok_or(ParseError::MissingArgument)?;
        let offset = exp.get_interval_arg(1, -1)?;
        let label = exp.get_string_arg(1)?;

        let mut series = get_series_arg(ctx, first, from + offset, until + offset)?;
        for one in &mut series {
            one.name = format!("timeShift({},'{label}')", one.name);
            one.start_time -= offset;
            one.stop_time -= offset;
        }
        Ok(series)
    }

    fn description(&self) -> FunctionDescription {
        FunctionDescription {
            name: "timeShift",
            signature: "timeShift(seriesList, timeShift)",
            group: "Transform",
            summary: "Draws the series as it looked one offset ago; bare intervals mean back in time.",
        }
    }
}

struct TimeStack;

impl SeriesFunction for TimeStack {
    fn call(
        &self,
        ctx: &mut EvalContext,
        exp: &Expr,
        from: i32,
        until: i32,
    ) -> Result<Vec<MetricData>, EvalError> {
        let first = exp.args().first().ok_or(ParseError::MissingArgument)?;
        let offset = exp.get_interval_arg(1, -1)?;
        let label = exp.get_string_arg(1)?;
        let start = exp.get_int_arg(2)?;
        let end = exp.get_int_arg(3)?;

        let mut results = Vec::new();
        for i in start..end {
            let shift = i as i32 * offset;
            let mut series = get_series_arg(ctx, first, from + shift, until + shift)?;
            for one in &mut series {
                one.name = format!("timeStack({},'{label}',{i})", one.name);
                one.start_time -= shift;
                one.stop_time -= shift;
            }
            results.extend(series);
        }
        Ok(results)
    }

    fn description(&self) -> FunctionDescription {
        FunctionDescription {
            name: "timeStack",
            signature: "timeStack(seriesList, timeShiftUnit, timeShiftStart, timeShiftEnd)",
            group: "Transform",
            summary: "Overlays successive shifted copies of the series, one per step in the range.",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::eval::testing::{assert_series_eq, eval_target, values_for};
    use crate::series::{MetricData, MetricRequest};

    #[test]
    fn shifts_the_fetch_window_and_reanchors() {
        let mut values = values_for(&[(
            MetricRequest::new("m", 1000 - 3600, 2000 - 3600),
            vec![MetricData::new("m", &[1.0, 2.0], 500, 1000 - 3600)],
        )]);
        let result = eval_target(&mut values, "timeShift(m, '-1h')", 1000, 2000).unwrap();
        assert_series_eq(
            &result,
            &[MetricData::new("timeShift(m,'-1h')", &[1.0, 2.0], 500, 1000)],
        );
    }

    #[test]
    fn unsigned_offsets_shift_backwards() {
        let mut values = values_for(&[(
            MetricRequest::new("m", -3600, -3600 + 60),
            vec![MetricData::new("m", &[9.0], 60, -3600)],
        )]);
        let result = eval_target(&mut values, "timeShift(m, '1h')", 0, 60).unwrap();
        assert_series_eq(
            &result,
            &[MetricData::new("timeShift(m,'1h')", &[9.0], 60, 0)],
        );
    }

    #[test]
    fn stacks_one_copy_per_step() {
        let day = 86400;
        let mut values = values_for(&[
            (
                MetricRequest::new("m", 0, 60),
                vec![MetricData::new("m", &[3.0], 60, 0)],
            ),
            (
                MetricRequest::new("m", -day, -day + 60),
                vec![MetricData::new("m", &[2.0], 60, -day)],
            ),
            (
                MetricRequest::new("m", -2 * day, -2 * day + 60),
                vec![MetricData::new("m", &[1.0], 60, -2 * day)],
            ),
        ]);
        let result = eval_target(&mut values, "timeStack(m, '1d', 0, 3)", 0, 60).unwrap();
        assert_series_eq(
            &result,
            &[
                MetricData::new("timeStack(m,'1d',0)", &[3.0], 60, 0),
                MetricData::new("timeStack(m,'1d',1)", &[2.0], 60, 0),
                MetricData::new("timeStack(m,'1d',2)", &[1.0], 60, 0),
            ],
        );
    }
}
