//! Reconciles replicated copies of the same metric into one series.
//!
//! Replicas may disagree on step (different retention tiers) and on
//! individual points (writes that reached only part of the fleet). The merge
//! re-buckets everything to the coarsest step present, takes any present
//! value per bucket, and counts disagreements beyond the configured
//! tolerance. With the fix rule enabled, the replica with the freshest
//! `stop_time` wins disputed buckets and the dispute is counted as fixed.

use std::collections::BTreeMap;

use crate::series::{FindMatch, MetricData, RenderStats};

#[derive(Debug, Clone, Copy, Default)]
pub struct MismatchConfig {
    /// Two present values closer than this are considered equal.
    pub tolerance: f64,
    /// Resolve disputed buckets in favor of the freshest replica.
    pub fix: bool,
}

/// Merges backend replies, grouping replicas by metric name. Output order
/// follows the metric name, so replica arrival order never shows.
pub fn merge_series(series: Vec<MetricData>, config: MismatchConfig) -> (Vec<MetricData>, RenderStats) {
    let mut groups: BTreeMap<String, Vec<MetricData>> = BTreeMap::new();
    for one in series {
        groups.entry(one.name.clone()).or_default().push(one);
    }

    let mut stats = RenderStats::default();
    let mut merged = Vec::with_capacity(groups.len());
    for (_, replicas) in groups {
        let (one, group_stats) = merge_group(replicas, config);
        stats.absorb(group_stats);
        merged.push(one);
    }
    (merged, stats)
}

fn merge_group(replicas: Vec<MetricData>, config: MismatchConfig) -> (MetricData, RenderStats) {
    let mut stats = RenderStats::default();

    if replicas.len() == 1 {
        let one = replicas.into_iter().next().expect("group has one replica");
        stats.data_point_count = one.len() as u64;
        return (one, stats);
    }

    let target_step = replicas
        .iter()
        .map(|r| r.step_time)
        .max()
        .unwrap_or_default();
    let mut normalized: Vec<MetricData> = replicas
        .iter()
        .map(|r| r.consolidate_to(target_step))
        .collect();
    // Freshest replica last, so it wins disputed buckets under the fix rule.
    normalized.sort_by_key(|r| r.stop_time);

    let length = normalized.iter().map(MetricData::len).max().unwrap_or(0);
    let base = normalized.last().expect("group is non-empty");
    let start_time = normalized.iter().map(|r| r.start_time).min().unwrap_or(0);

    let mut merged = MetricData {
        name: base.name.clone(),
        start_time,
        stop_time: start_time + target_step * length as i32,
        step_time: target_step,
        values: vec![0.0; length],
        is_absent: vec![true; length],
    };

    for bucket in 0..length {
        let mut chosen: Option<f64> = None;
        let mut disputed = false;
        for replica in &normalized {
            let Some(value) = replica.value_at(bucket) else {
                continue;
            };
            match chosen {
                None => chosen = Some(value),
                Some(previous) => {
                    if (value - previous).abs() > config.tolerance {
                        disputed = true;
                        if config.fix {
                            chosen = Some(value);
                        }
                    }
                }
            }
        }
        if disputed {
            stats.mismatch_count += 1;
            if config.fix {
                stats.fixed_mismatch_count += 1;
            }
        }
        if let Some(value) = chosen {
            merged.values[bucket] = value;
            merged.is_absent[bucket] = false;
        }
    }

    stats.data_point_count = merged.len() as u64;
    (merged, stats)
}

/// Deduplicates discovery results by path (a path that is a leaf anywhere is
/// a leaf) and returns them in stable ascending path order.
pub fn merge_find_matches(matches: Vec<FindMatch>) -> Vec<FindMatch> {
    let mut merged: BTreeMap<String, bool> = BTreeMap::new();
    for one in matches {
        let entry = merged.entry(one.path).or_insert(false);
        *entry |= one.is_leaf;
    }
    merged
        .into_iter()
        .map(|(path, is_leaf)| FindMatch { path, is_leaf })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(name: &str, values: &[f64], step: i32, start: i32) -> MetricData {
        MetricData::new(name, values, step, start)
    }

    #[test]
    fn identical_replicas_merge_cleanly() {
        let (merged, stats) = merge_series(
            vec![
                series("m", &[1.0, 2.0, 3.0], 60, 0),
                series("m", &[1.0, 2.0, 3.0], 60, 0),
            ],
            MismatchConfig::default(),
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].values, vec![1.0, 2.0, 3.0]);
        assert_eq!(stats.mismatch_count, 0);
        assert_eq!(stats.data_point_count, 3);
    }

    #[test]
    fn absent_buckets_fill_from_any_replica() {
        let (merged, stats) = merge_series(
            vec![
                series("m", &[1.0, f64::NAN, 3.0], 60, 0),
                series("m", &[1.0, 2.0, f64::NAN], 60, 0),
            ],
            MismatchConfig::default(),
        );
        assert_eq!(merged[0].values, vec![1.0, 2.0, 3.0]);
        assert_eq!(merged[0].is_absent, vec![false, false, false]);
        assert_eq!(stats.mismatch_count, 0);
    }

    #[test]
    fn bucket_is_absent_only_when_all_replicas_miss_it() {
        let (merged, _) = merge_series(
            vec![
                series("m", &[f64::NAN, 1.0], 60, 0),
                series("m", &[f64::NAN, 1.0], 60, 0),
            ],
            MismatchConfig::default(),
        );
        assert_eq!(merged[0].is_absent, vec![true, false]);
    }

    #[test]
    fn disagreements_count_as_mismatches() {
        let (_, stats) = merge_series(
            vec![
                series("m", &[1.0, 2.0], 60, 0),
                series("m", &[1.0, 9.0], 60, 0),
            ],
            MismatchConfig::default(),
        );
        assert_eq!(stats.mismatch_count, 1);
        assert_eq!(stats.fixed_mismatch_count, 0);
    }

    #[test]
    fn tolerance_suppresses_small_disagreements() {
        let (_, stats) = merge_series(
            vec![
                series("m", &[1.0, 2.0], 60, 0),
                series("m", &[1.0, 2.05], 60, 0),
            ],
            MismatchConfig {
                tolerance: 0.1,
                fix: false,
            },
        );
        assert_eq!(stats.mismatch_count, 0);
    }

    #[test]
    fn fix_rule_prefers_the_freshest_replica() {
        let stale = series("m", &[1.0, 2.0], 60, 0);
        let fresh = series("m", &[1.0, 7.0, 9.0], 60, 0);
        let (merged, stats) = merge_series(
            vec![fresh.clone(), stale],
            MismatchConfig {
                tolerance: 0.0,
                fix: true,
            },
        );
        assert_eq!(stats.mismatch_count, 1);
        assert_eq!(stats.fixed_mismatch_count, 1);
        assert_eq!(merged[0].values, fresh.values);
    }

    #[test]
    fn coarsest_step_wins() {
        let fine = series("m", &[1.0, 3.0, 5.0, 7.0], 30, 0);
        let coarse = series("m", &[2.0, 6.0], 60, 0);
        let (merged, stats) = merge_series(vec![fine, coarse], MismatchConfig::default());
        assert_eq!(merged[0].step_time, 60);
        assert_eq!(merged[0].values, vec![2.0, 6.0]);
        assert_eq!(stats.mismatch_count, 0);
    }

    #[test]
    fn distinct_metrics_stay_separate() {
        let (merged, _) = merge_series(
            vec![
                series("b", &[1.0], 60, 0),
                series("a", &[2.0], 60, 0),
            ],
            MismatchConfig::default(),
        );
        let names: Vec<&str> = merged.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn find_matches_dedup_and_sort() {
        let merged = merge_find_matches(vec![
            FindMatch {
                path: "b.c".to_string(),
                is_leaf: false,
            },
            FindMatch {
                path: "a.b".to_string(),
                is_leaf: true,
            },
            FindMatch {
                path: "b.c".to_string(),
                is_leaf: true,
            },
        ]);
        assert_eq!(
            merged,
            vec![
                FindMatch {
                    path: "a.b".to_string(),
                    is_leaf: true,
                },
                FindMatch {
                    path: "b.c".to_string(),
                    is_leaf: true,
                },
            ]
        );
    }
}
