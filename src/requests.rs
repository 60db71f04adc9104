//! Walks a parsed expression and reports which metric patterns the backends
//! must be asked for, including the time-window adjustments some functions
//! require. Offsets are relative to a zero window; `with_window` anchors them
//! to the request's actual bounds.

use crate::parser::Expr;
use crate::series::MetricRequest;

const WEEK_SECONDS: i32 = 7 * 86400;

/// The set of requests needed to evaluate `exp`, with `from`/`until` holding
/// offsets relative to the outer window. Functions not listed in the match
/// below are transparent; argument errors make the offending branch
/// contribute nothing.
pub fn metrics_of(exp: &Expr) -> Vec<MetricRequest> {
    match exp {
        Expr::Name(name) => vec![MetricRequest::new(name.clone(), 0, 0)],
        Expr::Const(_) | Expr::Str(_) => Vec::new(),
        Expr::Func(call) => {
            let mut requests: Vec<MetricRequest> =
                call.args.iter().flat_map(metrics_of).collect();

            match call.name.as_str() {
                "timeShift" => {
                    let Ok(offset) = exp.get_interval_arg(1, -1) else {
                        return Vec::new();
                    };
                    for r in &mut requests {
                        r.from += offset;
                        r.until += offset;
                    }
                }
                "timeStack" => {
                    let Ok(offset) = exp.get_interval_arg(1, -1) else {
                        return Vec::new();
                    };
                    let Ok(start) = exp.get_int_arg(2) else {
                        return Vec::new();
                    };
                    let Ok(end) = exp.get_int_arg(3) else {
                        return Vec::new();
                    };
                    let mut stacked = Vec::new();
                    for r in &requests {
                        for i in start..end {
                            stacked.push(MetricRequest::new(
                                r.metric.clone(),
                                r.from + i as i32 * offset,
                                r.until + i as i32 * offset,
                            ));
                        }
                    }
                    return stacked;
                }
                "holtWintersForecast"
                | "holtWintersConfidenceBands"
                | "holtWintersAberration" => {
                    // The seasonal fit needs a week of history before the
                    // window being drawn.
                    for r in &mut requests {
                        r.from -= WEEK_SECONDS;
                    }
                }
                "movingAverage" | "movingMedian" | "movingMin" | "movingMax" | "movingSum" => {
                    if call.args.get(1).is_some_and(Expr::is_str) {
                        let Ok(offset) = exp.get_interval_arg(1, 1) else {
                            return Vec::new();
                        };
                        for r in &mut requests {
                            r.from -= offset;
                        }
                    }
                }
                _ => {}
            }

            requests
        }
    }
}

/// Anchors extractor output to the actual query window.
pub fn with_window(requests: Vec<MetricRequest>, from: i32, until: i32) -> Vec<MetricRequest> {
    requests
        .into_iter()
        .map(|r| MetricRequest::new(r.metric, r.from + from, r.until + until))
        .collect()
}
