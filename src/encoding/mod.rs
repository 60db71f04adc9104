//! Wire formats for the three endpoints. The JSON model doubles as the
//! backend protocol; pickle serves graphite-web, protobuf serves carbonapi.

pub mod json;
pub mod pickle;
pub mod protobuf;

use thiserror::Error;

use crate::series::{FindMatch, MetricData, ServerInfo};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_PICKLE: &str = "application/pickle";
pub const CONTENT_TYPE_PROTOBUF: &str = "application/x-protobuf";

#[derive(Debug, Error)]
#[error("error marshaling data: {0}")]
pub struct EncodeError(String);

impl EncodeError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Pickle,
    Protobuf,
}

impl Format {
    /// Format selection for find and render; the legacy default is pickle.
    pub fn for_data(raw: &str) -> Option<Format> {
        match raw {
            "" | "pickle" => Some(Format::Pickle),
            "json" => Some(Format::Json),
            "protobuf" | "protobuf3" => Some(Format::Protobuf),
            _ => None,
        }
    }

    /// Format selection for info, which defaults to JSON and never pickles.
    pub fn for_info(raw: &str) -> Option<Format> {
        match raw {
            "" | "json" => Some(Format::Json),
            "protobuf" | "protobuf3" => Some(Format::Protobuf),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Format::Json => CONTENT_TYPE_JSON,
            Format::Pickle => CONTENT_TYPE_PICKLE,
            Format::Protobuf => CONTENT_TYPE_PROTOBUF,
        }
    }
}

pub fn encode_find(
    query: &str,
    matches: &[FindMatch],
    format: Format,
    web09: bool,
) -> Result<Vec<u8>, EncodeError> {
    match format {
        Format::Json => json::find(matches),
        Format::Pickle if web09 => pickle::find_v0_9(matches),
        Format::Pickle => pickle::find_v1_0(matches),
        Format::Protobuf => Ok(protobuf::find(query, matches)),
    }
}

pub fn encode_render(series: &[MetricData], format: Format) -> Result<Vec<u8>, EncodeError> {
    match format {
        Format::Json => json::render(series),
        Format::Pickle => pickle::render(series),
        Format::Protobuf => Ok(protobuf::render(series)),
    }
}

pub fn encode_info(infos: &[ServerInfo], format: Format) -> Result<Vec<u8>, EncodeError> {
    match format {
        Format::Json => json::info(infos),
        Format::Protobuf => Ok(protobuf::info(infos)),
        Format::Pickle => Err(EncodeError::new("info has no pickle representation")),
    }
}
