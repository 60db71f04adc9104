//! Trailing-window statistics: movingAverage and friends.
//!
//! The window is either a point count or an interval string. Interval
//! windows make the series argument evaluate over an extended range
//! (`from - window`) so the first drawn bucket already has history behind
//! it; the request extractor prefetches the same range.

use std::sync::Arc;

use crate::eval::{
    get_series_arg, EvalContext, EvalError, FunctionDescription, FunctionRegistry, SeriesFunction,
};
use crate::parser::{Expr, ParseError};
use crate::series::MetricData;

pub fn register(registry: &mut FunctionRegistry) {
    registry.register(&["movingAverage"], Arc::new(Moving::new(Mode::Average)));
    registry.register(&["movingMedian"], Arc::new(Moving::new(Mode::Median)));
    registry.register(&["movingMin"], Arc::new(Moving::new(Mode::Min)));
    registry.register(&["movingMax"], Arc::new(Moving::new(Mode::Max)));
    registry.register(&["movingSum"], Arc::new(Moving::new(Mode::Sum)));
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Average,
    Median,
    Min,
    Max,
    Sum,
}

impl Mode {
    fn name(self) -> &'static str {
        match self {
            Mode::Average => "movingAverage",
            Mode::Median => "movingMedian",
            Mode::Min => "movingMin",
            Mode::Max => "movingMax",
            Mode::Sum => "movingSum",
        }
    }

    fn apply(self, window: &mut Vec<f64>) -> f64 {
        match self {
            Mode::Average => window.iter().sum::<f64>() / window.len() as f64,
            Mode::Sum => window.iter().sum(),
            Mode::Min => window.iter().copied().fold(f64::INFINITY, f64::min),
            Mode::Max => window.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Mode::Median => {
                window.sort_by(|a, b| a.partial_cmp(b).expect("window holds no NaN"));
                let mid = window.len() / 2;
                if window.len() % 2 == 1 {
                    window[mid]
                } else {
                    (window[mid - 1] + window[mid]) / 2.0
                }
            }
        }
    }
}

struct Moving {
    mode: Mode,
}

impl Moving {
    fn new(mode: Mode) -> Self {
        Self { mode }
    }
}

impl SeriesFunction for Moving {
    fn call(
        &self,
        ctx: &mut EvalContext,
        exp: &Expr,
        from: i32,
        until: i32,
    ) -> Result<Vec<MetricData>, EvalError> {
        let first = exp.args().first().ok_or(ParseError::MissingArgument)?;
        let window_arg = exp.args().get(1).ok_or(ParseError::MissingArgument)?;

        let (series, window_seconds, window_label) = if window_arg.is_str() {
            let offset = exp.get_interval_arg(1, 1)?;
            if offset <= 0 {
                return Err(ParseError::BadType.into());
            }
            let label = format!("'{}'", exp.get_string_arg(1)?);
            (
                get_series_arg(ctx, first, from - offset, until)?,
                Some(offset),
                label,
            )
        } else {
            let points = exp.get_int_arg(1)?;
            if points <= 0 {
                return Err(ParseError::BadType.into());
            }
            (
                get_series_arg(ctx, first, from, until)?,
                None,
                points.to_string(),
            )
        };

        let mut results = Vec::with_capacity(series.len());
        for one in series {
            let points = match window_seconds {
                Some(seconds) if one.step_time > 0 => (seconds / one.step_time).max(1) as usize,
                Some(_) => 1,
                None => exp.get_int_arg(1)? as usize,
            };

            let mut moved = MetricData {
                name: format!("{}({},{})", self.mode.name(), one.name, window_label),
                values: vec![0.0; one.len()],
                is_absent: vec![true; one.len()],
                ..one.clone()
            };
            // The first `points` buckets have no full window behind them.
            for i in points..one.len() {
                let mut window: Vec<f64> =
                    (i - points..i).filter_map(|j| one.value_at(j)).collect();
                if window.is_empty() {
                    continue;
                }
                moved.values[i] = self.mode.apply(&mut window);
                moved.is_absent[i] = false;
            }
            results.push(moved);
        }
        Ok(results)
    }

    fn description(&self) -> FunctionDescription {
        FunctionDescription {
            name: self.mode.name(),
            signature: "movingAverage(seriesList, windowSize)",
            group: "Calculate",
            summary: "Graphs the trailing-window statistic of each series; the window is a point count or an interval string.",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::eval::testing::{assert_series_eq, eval_target, values_for};
    use crate::eval::{EvalError, Values};
    use crate::parser::ParseError;
    use crate::series::{MetricData, MetricRequest};

    fn metric(values: &[f64], from: i32) -> Values {
        values_for(&[(
            MetricRequest::new("m", from, 60 * values.len() as i32 + from),
            vec![MetricData::new("m", values, 60, from)],
        )])
    }

    #[test]
    fn point_count_window_averages_the_trailing_points() {
        let mut values = metric(&[1.0, 2.0, 3.0, 4.0, 5.0], 0);
        let result = eval_target(&mut values, "movingAverage(m, 2)", 0, 300).unwrap();
        assert_series_eq(
            &result,
            &[MetricData::new(
                "movingAverage(m,2)",
                &[f64::NAN, f64::NAN, 1.5, 2.5, 3.5],
                60,
                0,
            )],
        );
    }

    #[test]
    fn interval_window_reads_the_prefetched_history() {
        // Request window starts at 120; the extractor prefetched from 0.
        let mut values = metric(&[1.0, 2.0, 3.0, 4.0], 0);
        let result = eval_target(&mut values, "movingAverage(m, '2min')", 120, 240).unwrap();
        assert_series_eq(
            &result,
            &[MetricData::new(
                "movingAverage(m,'2min')",
                &[f64::NAN, f64::NAN, 1.5, 2.5],
                60,
                0,
            )],
        );
    }

    #[test]
    fn absent_points_drop_out_of_the_window() {
        let mut values = metric(&[1.0, f64::NAN, 3.0, f64::NAN], 0);
        let result = eval_target(&mut values, "movingSum(m, 2)", 0, 240).unwrap();
        assert_series_eq(
            &result,
            &[MetricData::new(
                "movingSum(m,2)",
                &[f64::NAN, f64::NAN, 1.0, 3.0],
                60,
                0,
            )],
        );
    }

    #[test]
    fn median_handles_even_and_odd_windows() {
        let mut values = metric(&[4.0, 1.0, 3.0, 2.0, 8.0], 0);
        let result = eval_target(&mut values, "movingMedian(m, 3)", 0, 300).unwrap();
        assert_series_eq(
            &result,
            &[MetricData::new(
                "movingMedian(m,3)",
                &[f64::NAN, f64::NAN, f64::NAN, 3.0, 2.0],
                60,
                0,
            )],
        );
    }

    #[test]
    fn rejects_non_positive_windows() {
        let mut values = metric(&[1.0], 0);
        assert_eq!(
            eval_target(&mut values, "movingAverage(m, 0)", 0, 60).unwrap_err(),
            EvalError::Arg(ParseError::BadType)
        );
    }
}
