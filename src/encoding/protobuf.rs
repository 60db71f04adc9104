//! Protobuf wire types for the carbonapi v2 protocol, hand-derived with
//! prost. Absent points travel as a parallel `is_absent` vector because
//! proto3 doubles cannot carry a null.

use prost::Message;

use crate::series::{FindMatch, MetricData, ServerInfo};

#[derive(Clone, PartialEq, Message)]
pub struct GlobMatch {
    #[prost(string, tag = "1")]
    pub path: String,
    #[prost(bool, tag = "2")]
    pub is_leaf: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct GlobResponse {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub matches: Vec<GlobMatch>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FetchResponse {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int32, tag = "2")]
    pub start_time: i32,
    #[prost(int32, tag = "3")]
    pub stop_time: i32,
    #[prost(int32, tag = "4")]
    pub step_time: i32,
    #[prost(double, repeated, tag = "5")]
    pub values: Vec<f64>,
    #[prost(bool, repeated, tag = "6")]
    pub is_absent: Vec<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MultiFetchResponse {
    #[prost(message, repeated, tag = "1")]
    pub metrics: Vec<FetchResponse>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RetentionMessage {
    #[prost(int32, tag = "1")]
    pub seconds_per_point: i32,
    #[prost(int32, tag = "2")]
    pub number_of_points: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct InfoResponse {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub aggregation_method: String,
    #[prost(int32, tag = "3")]
    pub max_retention: i32,
    #[prost(float, tag = "4")]
    pub x_files_factor: f32,
    #[prost(message, repeated, tag = "5")]
    pub retentions: Vec<RetentionMessage>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ServerInfoResponse {
    #[prost(string, tag = "1")]
    pub server: String,
    #[prost(message, repeated, tag = "2")]
    pub info: Vec<InfoResponse>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ZipperInfoResponse {
    #[prost(message, repeated, tag = "1")]
    pub responses: Vec<ServerInfoResponse>,
}

pub fn find(query: &str, matches: &[FindMatch]) -> Vec<u8> {
    GlobResponse {
        name: query.to_string(),
        matches: matches
            .iter()
            .map(|m| GlobMatch {
                path: m.path.clone(),
                is_leaf: m.is_leaf,
            })
            .collect(),
    }
    .encode_to_vec()
}

pub fn render(series: &[MetricData]) -> Vec<u8> {
    MultiFetchResponse {
        metrics: series
            .iter()
            .map(|s| FetchResponse {
                name: s.name.clone(),
                start_time: s.start_time,
                stop_time: s.stop_time,
                step_time: s.step_time,
                values: s.values.clone(),
                is_absent: s.is_absent.clone(),
            })
            .collect(),
    }
    .encode_to_vec()
}

pub fn info(infos: &[ServerInfo]) -> Vec<u8> {
    ZipperInfoResponse {
        responses: infos
            .iter()
            .map(|server| ServerInfoResponse {
                server: server.server.clone(),
                info: server
                    .info
                    .iter()
                    .map(|i| InfoResponse {
                        name: i.name.clone(),
                        aggregation_method: i.aggregation_method.clone(),
                        max_retention: i.max_retention,
                        x_files_factor: i.x_files_factor,
                        retentions: i
                            .retentions
                            .iter()
                            .map(|r| RetentionMessage {
                                seconds_per_point: r.seconds_per_point,
                                number_of_points: r.number_of_points,
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect(),
    }
    .encode_to_vec()
}
