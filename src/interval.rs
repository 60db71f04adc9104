//! Graphite interval strings: `30s`, `1h30min`, `-2d`, `1w`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalError {
    #[error("unknown time units")]
    UnknownUnits,
    #[error("invalid interval number")]
    InvalidNumber,
}

/// Parses a possibly signed, possibly multi-component interval string into
/// seconds. An unsigned string takes `default_sign` (+1 or -1), so callers
/// like `timeShift` can make bare `1h` mean "one hour back".
pub fn parse(s: &str, default_sign: i32) -> Result<i32, IntervalError> {
    let (sign, mut rest) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (default_sign, s),
    };

    if rest.is_empty() {
        return Err(IntervalError::InvalidNumber);
    }

    let mut total: i64 = 0;
    while !rest.is_empty() {
        let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        let (number, tail) = rest.split_at(digits);
        let unit_len = tail.len() - tail.trim_start_matches(|c: char| !c.is_ascii_digit()).len();
        let (unit, tail) = tail.split_at(unit_len);

        let amount: i64 = number.parse().map_err(|_| IntervalError::InvalidNumber)?;
        total += amount * unit_seconds(unit)?;
        rest = tail;
    }

    Ok((sign as i64 * total) as i32)
}

fn unit_seconds(unit: &str) -> Result<i64, IntervalError> {
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Ok(1),
        "min" | "mins" | "minute" | "minutes" => Ok(60),
        "h" | "hour" | "hours" => Ok(3600),
        "d" | "day" | "days" => Ok(86400),
        "w" | "week" | "weeks" => Ok(7 * 86400),
        "mon" | "month" | "months" => Ok(30 * 86400),
        "y" | "year" | "years" => Ok(365 * 86400),
        _ => Err(IntervalError::UnknownUnits),
    }
}
