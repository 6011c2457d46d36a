//! Request envelope: `{ "key": ..., "proc": ..., "params": { ... } }`.

use crate::domain::error::{GatewayError, GatewayResult};
use serde::Serialize;
use serde_json::{Map, Value};
use shared_bus::PoMask;
use std::fmt;

/// Bus operation requested by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Procedure {
    Query,
    Publish,
    Subscribe,
    /// Missing, non-string or unrecognized `proc`
    Unknown,
}

impl Procedure {
    /// Case-insensitive decode. Anything unrecognized is `Unknown`.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some(s) if s.eq_ignore_ascii_case("query") => Self::Query,
            Some(s) if s.eq_ignore_ascii_case("publish") => Self::Publish,
            Some(s) if s.eq_ignore_ascii_case("subscribe") => Self::Subscribe,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Publish => "publish",
            Self::Subscribe => "subscribe",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed request envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall {
    /// API key of the client
    pub key: String,
    /// Requested operation
    pub proc: Procedure,
    /// Operation parameters
    pub params: Map<String, Value>,
}

impl RpcCall {
    pub fn new(key: impl Into<String>, proc: Procedure, params: Map<String, Value>) -> Self {
        Self {
            key: key.into(),
            proc,
            params,
        }
    }

    /// Parse an envelope from raw JSON.
    ///
    /// Fails only when the body is not a JSON object, `key` is missing or
    /// empty, or `params` is present but not an object. `proc` never fails.
    pub fn from_slice(body: &[u8]) -> GatewayResult<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| GatewayError::InvalidRequest(format!("body is not JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Parse an envelope from a JSON value.
    pub fn from_value(value: Value) -> GatewayResult<Self> {
        let Value::Object(mut envelope) = value else {
            return Err(GatewayError::InvalidRequest(
                "request must be a JSON object".into(),
            ));
        };

        let key = match envelope.remove("key") {
            Some(Value::String(key)) if !key.is_empty() => key,
            _ => return Err(GatewayError::InvalidRequest("missing API key".into())),
        };

        let proc = Procedure::from_value(envelope.get("proc"));

        let params = match envelope.remove("params") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(params)) => params,
            Some(_) => {
                return Err(GatewayError::InvalidRequest(
                    "params must be a JSON object".into(),
                ))
            }
        };

        Ok(Self { key, proc, params })
    }

    /// Required string parameter.
    pub fn required_str(&self, name: &str) -> GatewayResult<&str> {
        match self.params.get(name) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(GatewayError::InvalidRequest(format!(
                "parameter '{}' must be a string",
                name
            ))),
            None => Err(GatewayError::InvalidRequest(format!(
                "missing parameter '{}'",
                name
            ))),
        }
    }

    /// Target URI.
    pub fn uri(&self) -> GatewayResult<&str> {
        self.required_str("uri")
    }

    /// Optional `ponum` filter. An empty string means no filter.
    pub fn ponum_filter(&self) -> GatewayResult<Option<PoMask>> {
        match self.params.get("ponum") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(PoMask::parse(s)?)),
            Some(_) => Err(GatewayError::InvalidRequest(
                "parameter 'ponum' must be a string".into(),
            )),
        }
    }

    /// Required `ponum` descriptor for publishing.
    pub fn ponum(&self) -> GatewayResult<PoMask> {
        Ok(PoMask::parse(self.required_str("ponum")?)?)
    }

    /// Required `contents` value.
    pub fn contents(&self) -> GatewayResult<&Value> {
        self.params
            .get("contents")
            .ok_or_else(|| GatewayError::InvalidRequest("missing parameter 'contents'".into()))
    }

    /// `persist` flag: a boolean or the strings "true"/"false". Default false.
    pub fn persist(&self) -> GatewayResult<bool> {
        match self.params.get("persist") {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(true),
            Some(Value::String(s)) if s.eq_ignore_ascii_case("false") || s.is_empty() => Ok(false),
            Some(other) => Err(GatewayError::InvalidRequest(format!(
                "parameter 'persist' must be a boolean, got {}",
                other
            ))),
        }
    }
}
