use crate::log::LogStream;
use crate::process::ManagedProcess;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_log_lines() -> usize {
    0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    List,
    /// pm3 requires a `configs` table on start. The dashboard only starts
    /// processes the supervisor already knows, so it is always sent empty.
    Start {
        #[serde(default)]
        configs: BTreeMap<String, serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        names: Option<Vec<String>>,
    },
    Stop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        names: Option<Vec<String>>,
    },
    Restart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        names: Option<Vec<String>>,
    },
    Reload {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        names: Option<Vec<String>>,
    },
    Delete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        names: Option<Vec<String>>,
    },
    Log {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default = "default_log_lines")]
        lines: usize,
        #[serde(default)]
        follow: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Error {
        message: String,
    },
    ProcessList {
        processes: Vec<ManagedProcess>,
    },
    LogLine {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream: Option<LogStream>,
        line: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("failed to serialize/deserialize JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed message: {0}")]
    Malformed(String),
}

pub fn encode_request(req: &Request) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = serde_json::to_vec(req)?;
    buf.push(b'\n');
    Ok(buf)
}

pub fn decode_request(line: &str) -> Result<Request, ProtocolError> {
    let trimmed = line.trim_end();
    Ok(serde_json::from_str(trimmed)?)
}

pub fn encode_response(resp: &Response) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = serde_json::to_vec(resp)?;
    buf.push(b'\n');
    Ok(buf)
}

pub fn decode_response(line: &str) -> Result<Response, ProtocolError> {
    let trimmed = line.trim_end();
    if trimmed.is_empty() {
        return Err(ProtocolError::Malformed("empty response".to_string()));
    }
    Ok(serde_json::from_str(trimmed)?)
}
