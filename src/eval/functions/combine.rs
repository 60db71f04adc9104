//! N-ary series aggregations: sum, average, min, max, multiply, diff.

use std::sync::Arc;

use crate::eval::{
    get_series_args, normalize, EvalContext, EvalError, FunctionDescription, FunctionRegistry,
    SeriesFunction,
};
use crate::parser::Expr;
use crate::series::MetricData;

pub fn register(registry: &mut FunctionRegistry) {
    registry.register(&["sum", "sumSeries"], Arc::new(Combine::new(Mode::Sum)));
    registry.register(&["avg", "averageSeries"], Arc::new(Combine::new(Mode::Average)));
    registry.register(&["minSeries"], Arc::new(Combine::new(Mode::Min)));
    registry.register(&["maxSeries"], Arc::new(Combine::new(Mode::Max)));
    registry.register(&["multiplySeries"], Arc::new(Combine::new(Mode::Multiply)));
    registry.register(&["diffSeries"], Arc::new(Combine::new(Mode::Diff)));
}

#[derive(Debug, Clone, Copy)]
enum Mode {
    Sum,
    Average,
    Min,
    Max,
    Multiply,
    Diff,
}

impl Mode {
    fn canonical(self) -> &'static str {
        match self {
            Mode::Sum => "sumSeries",
            Mode::Average => "averageSeries",
            Mode::Min => "minSeries",
            Mode::Max => "maxSeries",
            Mode::Multiply => "multiplySeries",
            Mode::Diff => "diffSeries",
        }
    }
}

struct Combine {
    mode: Mode,
}

impl Combine {
    fn new(mode: Mode) -> Self {
        Self { mode }
    }

    /// Folds one bucket across all aligned inputs. Aggregations skip absent
    /// inputs and go absent only when every input is absent; multiplication
    /// goes absent as soon as one factor is; diff treats absent subtrahends
    /// as zero.
    fn bucket(&self, series: &[MetricData], i: usize) -> Option<f64> {
        match self.mode {
            Mode::Multiply => {
                let mut product = 1.0;
                for one in series {
                    product *= one.value_at(i)?;
                }
                Some(product)
            }
            Mode::Diff => {
                if series.iter().all(|one| one.value_at(i).is_none()) {
                    return None;
                }
                let minuend = series[0].value_at(i).unwrap_or(0.0);
                let subtracted: f64 = series[1..]
                    .iter()
                    .filter_map(|one| one.value_at(i))
                    .sum();
                Some(minuend - subtracted)
            }
            Mode::Sum | Mode::Average | Mode::Min | Mode::Max => {
                let present: Vec<f64> =
                    series.iter().filter_map(|one| one.value_at(i)).collect();
                if present.is_empty() {
                    return None;
                }
                Some(match self.mode {
                    Mode::Sum => present.iter().sum(),
                    Mode::Average => present.iter().sum::<f64>() / present.len() as f64,
                    Mode::Min => present.iter().copied().fold(f64::INFINITY, f64::min),
                    Mode::Max => present.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    _ => unreachable!(),
                })
            }
        }
    }
}

impl SeriesFunction for Combine {
    fn call(
        &self,
        ctx: &mut EvalContext,
        exp: &Expr,
        from: i32,
        until: i32,
    ) -> Result<Vec<MetricData>, EvalError> {
        let series = get_series_args(ctx, exp.args(), from, until)?;
        if series.is_empty() {
            return Ok(Vec::new());
        }

        let aligned = normalize(series);
        let length = aligned[0].len();
        let mut result = MetricData {
            name: format!("{}({})", self.mode.canonical(), exp.raw_args()),
            start_time: aligned[0].start_time,
            stop_time: aligned[0].start_time + aligned[0].step_time * length as i32,
            step_time: aligned[0].step_time,
            values: vec![0.0; length],
            is_absent: vec![true; length],
        };

        for i in 0..length {
            if let Some(value) = self.bucket(&aligned, i) {
                result.values[i] = value;
                result.is_absent[i] = false;
            }
        }

        Ok(vec![result])
    }

    fn description(&self) -> FunctionDescription {
        match self.mode {
            Mode::Sum => FunctionDescription {
                name: "sumSeries",
                signature: "sumSeries(*seriesLists)",
                group: "Combine",
                summary: "Adds the series together pointwise, skipping absent points.",
            },
            Mode::Average => FunctionDescription {
                name: "averageSeries",
                signature: "averageSeries(*seriesLists)",
                group: "Combine",
                summary: "Averages the present points of every bucket.",
            },
            Mode::Min => FunctionDescription {
                name: "minSeries",
                signature: "minSeries(*seriesLists)",
                group: "Combine",
                summary: "Takes the smallest present point of every bucket.",
            },
            Mode::Max => FunctionDescription {
                name: "maxSeries",
                signature: "maxSeries(*seriesLists)",
                group: "Combine",
                summary: "Takes the largest present point of every bucket.",
            },
            Mode::Multiply => FunctionDescription {
                name: "multiplySeries",
                signature: "multiplySeries(*seriesLists)",
                group: "Combine",
                summary: "Multiplies the series pointwise; any absent factor voids the bucket.",
            },
            Mode::Diff => FunctionDescription {
                name: "diffSeries",
                signature: "diffSeries(*seriesLists)",
                group: "Combine",
                summary: "Subtracts the remaining series from the first; absent subtrahends count as zero.",
            },
        }
    }
}
