//! JSON encoders. Absent points are encoded as nulls; the same shapes are
//! what [`crate::backend::HttpBackend`] expects from storage backends.

use std::collections::BTreeMap;

use serde::Serialize;

use super::EncodeError;
use crate::series::{FindMatch, Info, MetricData, ServerInfo};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonSeries<'a> {
    name: &'a str,
    start_time: i32,
    stop_time: i32,
    step_time: i32,
    values: Vec<Option<f64>>,
}

impl<'a> From<&'a MetricData> for JsonSeries<'a> {
    fn from(series: &'a MetricData) -> Self {
        Self {
            name: &series.name,
            start_time: series.start_time,
            stop_time: series.stop_time,
            step_time: series.step_time,
            values: (0..series.len()).map(|i| series.value_at(i)).collect(),
        }
    }
}

pub fn find(matches: &[FindMatch]) -> Result<Vec<u8>, EncodeError> {
    serde_json::to_vec(matches).map_err(|err| EncodeError::new(err.to_string()))
}

pub fn render(series: &[MetricData]) -> Result<Vec<u8>, EncodeError> {
    let wire: Vec<JsonSeries> = series.iter().map(JsonSeries::from).collect();
    serde_json::to_vec(&wire).map_err(|err| EncodeError::new(err.to_string()))
}

pub fn info(infos: &[ServerInfo]) -> Result<Vec<u8>, EncodeError> {
    let by_server: BTreeMap<&str, &Vec<Info>> = infos
        .iter()
        .map(|server| (server.server.as_str(), &server.info))
        .collect();
    serde_json::to_vec(&by_server).map_err(|err| EncodeError::new(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn render_encodes_absent_points_as_null() {
        let series = MetricData::new("m", &[1.0, f64::NAN], 60, 0);
        let encoded = render(&[series]).unwrap();
        let value: Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(
            value,
            json!([{
                "name": "m",
                "startTime": 0,
                "stopTime": 120,
                "stepTime": 60,
                "values": [1.0, null],
            }])
        );
    }

    #[test]
    fn find_encodes_leaf_flags() {
        let encoded = find(&[FindMatch {
            path: "a.b".to_string(),
            is_leaf: true,
        }])
        .unwrap();
        let value: Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(value, json!([{"path": "a.b", "isLeaf": true}]));
    }

    #[test]
    fn info_groups_by_server() {
        let encoded = info(&[ServerInfo {
            server: "http://store-a".to_string(),
            info: vec![],
        }])
        .unwrap();
        let value: Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(value, json!({"http://store-a": []}));
    }
}
