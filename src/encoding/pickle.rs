//! Pickle encoders for graphite-web. The value model matches what the
//! webapp unpickles: lists of dicts, with None for absent points. The 0.9
//! find variant differs only in its key names.

use serde::Serialize;
use serde_pickle::SerOptions;

use super::EncodeError;
use crate::series::{FindMatch, MetricData};

#[derive(Serialize)]
struct PickleMatch<'a> {
    path: &'a str,
    is_leaf: bool,
}

#[derive(Serialize)]
struct PickleMatchV0_9<'a> {
    metric_path: &'a str,
    #[serde(rename = "isLeaf")]
    is_leaf: bool,
}

#[derive(Serialize)]
struct PickleSeries<'a> {
    name: &'a str,
    start: i32,
    end: i32,
    step: i32,
    values: Vec<Option<f64>>,
}

fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>, EncodeError> {
    serde_pickle::to_vec(value, SerOptions::new())
        .map_err(|err| EncodeError::new(err.to_string()))
}

pub fn find_v1_0(matches: &[FindMatch]) -> Result<Vec<u8>, EncodeError> {
    let wire: Vec<PickleMatch> = matches
        .iter()
        .map(|m| PickleMatch {
            path: &m.path,
            is_leaf: m.is_leaf,
        })
        .collect();
    to_vec(&wire)
}

pub fn find_v0_9(matches: &[FindMatch]) -> Result<Vec<u8>, EncodeError> {
    let wire: Vec<PickleMatchV0_9> = matches
        .iter()
        .map(|m| PickleMatchV0_9 {
            metric_path: &m.path,
            is_leaf: m.is_leaf,
        })
        .collect();
    to_vec(&wire)
}

pub fn render(series: &[MetricData]) -> Result<Vec<u8>, EncodeError> {
    let wire: Vec<PickleSeries> = series
        .iter()
        .map(|s| PickleSeries {
            name: &s.name,
            start: s.start_time,
            end: s.stop_time,
            step: s.step_time,
            values: (0..s.len()).map(|i| s.value_at(i)).collect(),
        })
        .collect();
    to_vec(&wire)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_pickle::{DeOptions, Value};

    fn roundtrip(bytes: &[u8]) -> Value {
        serde_pickle::value_from_slice(bytes, DeOptions::new()).expect("self-produced pickle")
    }

    #[test]
    fn find_pickles_to_a_list_of_dicts() {
        let bytes = find_v1_0(&[FindMatch {
            path: "a.b".to_string(),
            is_leaf: true,
        }])
        .unwrap();
        match roundtrip(&bytes) {
            Value::List(items) => assert_eq!(items.len(), 1),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn legacy_find_uses_the_old_key_names() {
        let bytes = find_v0_9(&[FindMatch {
            path: "a.b".to_string(),
            is_leaf: false,
        }])
        .unwrap();
        let text = format!("{:?}", roundtrip(&bytes));
        assert!(text.contains("metric_path"), "payload: {text}");
        assert!(text.contains("isLeaf"), "payload: {text}");
    }

    #[test]
    fn render_pickles_absent_points_as_none() {
        let series = MetricData::new("m", &[1.0, f64::NAN], 60, 0);
        let bytes = render(&[series]).unwrap();
        let text = format!("{:?}", roundtrip(&bytes));
        assert!(text.contains("None"), "payload: {text}");
    }
}
