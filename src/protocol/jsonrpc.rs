//! JSON-RPC 2.0 envelopes.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{codes, WardenError};

pub const JSONRPC_VERSION: &str = "2.0";

/// Request id. Accepts a string or an integer, always encodes as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JsonRpcId(pub String);

impl JsonRpcId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JsonRpcId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JsonRpcId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for JsonRpcId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl Serialize for JsonRpcId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for JsonRpcId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Str(String),
            Int(i64),
            Uint(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Str(id) => Self(id),
            RawId::Int(id) => Self(id.to_string()),
            RawId::Uint(id) => Self(id.to_string()),
        })
    }
}

/// An incoming call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<JsonRpcId>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params: Some(params),
        }
    }

    /// Decode a request body.
    ///
    /// Malformed JSON is a parse error; well-formed JSON that is not a
    /// JSON-RPC 2.0 request is an invalid request. The id is recovered when
    /// it can be, so the error response can still be correlated.
    pub fn parse(body: &[u8]) -> Result<Self, (Option<JsonRpcId>, JsonRpcError)> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|err| (None, JsonRpcError::parse_error(err.to_string())))?;
        let id = value
            .get("id")
            .and_then(|id| JsonRpcId::deserialize(id.clone()).ok());
        let request: Self = serde_json::from_value(value)
            .map_err(|err| (id.clone(), JsonRpcError::invalid_request(err.to_string())))?;
        if request.jsonrpc != JSONRPC_VERSION {
            return Err((
                id,
                JsonRpcError::invalid_request(format!(
                    "unsupported jsonrpc version '{}'",
                    request.jsonrpc
                )),
            ));
        }
        Ok(request)
    }

    /// Deserialize `params` into the method's parameter type.
    pub fn params<T: serde::de::DeserializeOwned>(&self) -> Result<T, JsonRpcError> {
        let params = self.params.clone().unwrap_or(Value::Null);
        serde_json::from_value(params).map_err(|err| JsonRpcError::invalid_params(err.to_string()))
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(codes::PARSE_ERROR, "Parse error").with_data(detail.into())
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, "Invalid request").with_data(detail.into())
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            codes::METHOD_NOT_FOUND,
            format!("Method '{method}' not found"),
        )
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, "Invalid params").with_data(detail.into())
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, "Internal error").with_data(detail.into())
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }
}

impl From<&WardenError> for JsonRpcError {
    fn from(err: &WardenError) -> Self {
        Self::new(err.rpc_code(), err.to_string())
    }
}

impl From<WardenError> for JsonRpcError {
    fn from(err: WardenError) -> Self {
        Self::from(&err)
    }
}

/// `result` or `error`, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonRpcPayload {
    Result(Value),
    Error(JsonRpcError),
}

/// An outgoing reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<JsonRpcId>,
    #[serde(flatten)]
    pub payload: JsonRpcPayload,
}

impl JsonRpcResponse {
    pub fn success(id: Option<JsonRpcId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: JsonRpcPayload::Result(result),
        }
    }

    /// Serialize `result` into a success response.
    pub fn from_result<T: Serialize>(id: Option<JsonRpcId>, result: &T) -> Self {
        match serde_json::to_value(result) {
            Ok(value) => Self::success(id, value),
            Err(err) => Self::error(id, JsonRpcError::internal(err.to_string())),
        }
    }

    pub fn error(id: Option<JsonRpcId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: JsonRpcPayload::Error(error),
        }
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            JsonRpcPayload::Result(value) => Some(value),
            JsonRpcPayload::Error(_) => None,
        }
    }

    pub fn error_object(&self) -> Option<&JsonRpcError> {
        match &self.payload {
            JsonRpcPayload::Error(error) => Some(error),
            JsonRpcPayload::Result(_) => None,
        }
    }
}
