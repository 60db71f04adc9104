//! Core data model shared by the fan-out, merge and evaluation layers.

use serde::{Deserialize, Serialize};

/// A `(pattern, from, until)` demand for data, used both as the unit of
/// backend fan-out and as the lookup key of the evaluator's values map.
/// Times are integer epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricRequest {
    pub metric: String,
    pub from: i32,
    pub until: i32,
}

impl MetricRequest {
    pub fn new(metric: impl Into<String>, from: i32, until: i32) -> Self {
        Self {
            metric: metric.into(),
            from,
            until,
        }
    }
}

/// One fetched time series. `values` and `is_absent` run in parallel; a
/// bucket with `is_absent` set carries no data regardless of its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricData {
    pub name: String,
    pub start_time: i32,
    pub stop_time: i32,
    pub step_time: i32,
    pub values: Vec<f64>,
    pub is_absent: Vec<bool>,
}

impl MetricData {
    /// Builds a series from raw samples, recognizing NaN as the absent
    /// sentinel. Absent buckets are stored as 0 so equality stays usable.
    pub fn new(name: impl Into<String>, values: &[f64], step_time: i32, start_time: i32) -> Self {
        let is_absent: Vec<bool> = values.iter().map(|v| v.is_nan()).collect();
        let values: Vec<f64> = values
            .iter()
            .map(|v| if v.is_nan() { 0.0 } else { *v })
            .collect();
        let stop_time = start_time + step_time * values.len() as i32;
        Self {
            name: name.into(),
            start_time,
            stop_time,
            step_time,
            values,
            is_absent,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value at `i`, or None when the bucket is absent.
    pub fn value_at(&self, i: usize) -> Option<f64> {
        if *self.is_absent.get(i)? {
            None
        } else {
            self.values.get(i).copied()
        }
    }

    /// Re-buckets the series to a coarser step by averaging the present
    /// samples of each bucket. A bucket is absent only when every sample in
    /// it is absent. Returns a clone when the step already matches.
    pub fn consolidate_to(&self, step_time: i32) -> MetricData {
        if step_time <= self.step_time || self.step_time <= 0 {
            return self.clone();
        }
        let ratio = (step_time as usize).div_ceil(self.step_time.max(1) as usize);
        let mut values = Vec::with_capacity(self.len().div_ceil(ratio));
        let mut is_absent = Vec::with_capacity(values.capacity());
        for chunk in 0..self.len().div_ceil(ratio) {
            let lo = chunk * ratio;
            let hi = (lo + ratio).min(self.len());
            let mut sum = 0.0;
            let mut count = 0usize;
            for i in lo..hi {
                if let Some(v) = self.value_at(i) {
                    sum += v;
                    count += 1;
                }
            }
            if count == 0 {
                values.push(0.0);
                is_absent.push(true);
            } else {
                values.push(sum / count as f64);
                is_absent.push(false);
            }
        }
        let stop_time = self.start_time + step_time * values.len() as i32;
        MetricData {
            name: self.name.clone(),
            start_time: self.start_time,
            stop_time,
            step_time,
            values,
            is_absent,
        }
    }
}

/// One discovery result: a metric path and whether it is a leaf (has data)
/// or an intermediate node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindMatch {
    pub path: String,
    pub is_leaf: bool,
}

/// Storage metadata for one metric on one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Info {
    pub name: String,
    pub aggregation_method: String,
    pub max_retention: i32,
    pub x_files_factor: f32,
    pub retentions: Vec<Retention>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retention {
    pub seconds_per_point: i32,
    pub number_of_points: i32,
}

/// Metadata for one backend's reply to an info request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub server: String,
    pub info: Vec<Info>,
}

/// Accounting produced by the replica merger and surfaced as counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub data_point_count: u64,
    pub mismatch_count: u64,
    pub fixed_mismatch_count: u64,
}

impl RenderStats {
    pub fn absorb(&mut self, other: RenderStats) {
        self.data_point_count += other.data_point_count;
        self.mismatch_count += other.mismatch_count;
        self.fixed_mismatch_count += other.fixed_mismatch_count;
    }
}
