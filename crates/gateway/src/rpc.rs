//! Strict JSON-RPC 2.0 framing: parsing, validation, response and
//! notification formatting.
//!
//! Single requests, notifications (no `id`), and batch arrays are supported.
//! Reserved method names (`rpc.` prefix) are refused. Notifications never
//! produce a response, including on error; a batch of only notifications
//! produces no response at all.

use serde_json::{Value, json};

pub const JSONRPC_VERSION: &str = "2.0";

// ── Error codes ──────────────────────────────────────────────────────────────

pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // Implementation range
    pub const NOT_AUTHENTICATED: i32 = -32000;
    pub const RATE_LIMIT_EXCEEDED: i32 = -32001;
    pub const PERMISSION_DENIED: i32 = -32002;
    pub const SESSION_EXPIRED: i32 = -32003;
    pub const GATEWAY_ERROR: i32 = -32004;
}

/// An error on its way into a JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(code: i32, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_PARAMS, message)
    }

    fn to_value(&self) -> Value {
        let mut error = json!({ "code": self.code, "message": self.message });
        if let Some(data) = &self.data
            && let Some(obj) = error.as_object_mut()
        {
            obj.insert("data".into(), data.clone());
        }
        error
    }
}

// ── Requests ─────────────────────────────────────────────────────────────────

/// A validated request. `id == Value::Null` marks a notification.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub params: Value,
    pub id: Value,
}

impl Request {
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_null()
    }

    /// A required string param, or `-32602`.
    pub fn str_param(&self, name: &str) -> Result<String, RpcError> {
        match self.params.get(name).and_then(Value::as_str) {
            Some(s) if !s.is_empty() => Ok(s.to_owned()),
            _ => Err(RpcError::invalid_params(format!(
                "missing required parameter: {name}"
            ))),
        }
    }

    /// An optional string param; absent, null, or empty collapses to `None`.
    #[must_use]
    pub fn opt_str_param(&self, name: &str) -> Option<String> {
        self.params
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    }

    #[must_use]
    pub fn bool_param(&self, name: &str, default: bool) -> bool {
        self.params
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    #[must_use]
    pub fn u64_param(&self, name: &str) -> Option<u64> {
        self.params.get(name).and_then(Value::as_u64)
    }
}

/// One parsed inbound message: a request, or a ready-to-send error response
/// for an item that failed validation (None when the invalid item was a
/// notification-shaped object, which gets no response).
pub type ParseOutcome = Result<Request, Option<String>>;

/// A full inbound message, which may be a batch.
#[derive(Debug)]
pub enum Incoming {
    Single(ParseOutcome),
    Batch(Vec<ParseOutcome>),
}

/// Parse and validate one wire message. `Err` carries the ready error
/// response text (parse error / invalid request).
pub fn parse_message(text: &str) -> Result<Incoming, String> {
    let parsed: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            return Err(error_response(
                &Value::Null,
                &RpcError::new(error_codes::PARSE_ERROR, format!("Parse error: {e}")),
            ));
        },
    };

    match parsed {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(error_response(
                    &Value::Null,
                    &RpcError::new(error_codes::INVALID_REQUEST, "empty batch"),
                ));
            }
            Ok(Incoming::Batch(items.iter().map(validate_single).collect()))
        },
        other => Ok(Incoming::Single(validate_single(&other))),
    }
}

fn validate_single(value: &Value) -> ParseOutcome {
    let Some(obj) = value.as_object() else {
        return Err(Some(error_response(
            &Value::Null,
            &RpcError::new(error_codes::INVALID_REQUEST, "request must be an object"),
        )));
    };

    // The id is echoed in error responses when it exists and is well-typed.
    let id = match obj.get("id") {
        None | Some(Value::Null) => Value::Null,
        Some(id @ (Value::String(_) | Value::Number(_))) => id.clone(),
        Some(_) => {
            return Err(Some(error_response(
                &Value::Null,
                &RpcError::new(
                    error_codes::INVALID_REQUEST,
                    "id must be a string, number, or null",
                ),
            )));
        },
    };
    let fail = |message: &str| -> ParseOutcome {
        if id.is_null() {
            // Invalid notification: no response.
            Err(None)
        } else {
            Err(Some(error_response(
                &id,
                &RpcError::new(error_codes::INVALID_REQUEST, message),
            )))
        }
    };

    if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return fail("jsonrpc must be \"2.0\"");
    }
    let method = match obj.get("method").and_then(Value::as_str) {
        Some(m) if !m.is_empty() => m.to_owned(),
        _ => return fail("method must be a non-empty string"),
    };
    if method.starts_with("rpc.") {
        return fail("reserved method name");
    }
    let params = match obj.get("params") {
        None => Value::Object(serde_json::Map::new()),
        Some(p @ (Value::Object(_) | Value::Array(_))) => p.clone(),
        Some(_) => return fail("params must be an object or array"),
    };

    Ok(Request { method, params, id })
}

// ── Responses ────────────────────────────────────────────────────────────────

#[must_use]
pub fn result_response(id: &Value, result: &Value) -> String {
    json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "result": result }).to_string()
}

#[must_use]
pub fn error_response(id: &Value, error: &RpcError) -> String {
    json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "error": error.to_value() }).to_string()
}

/// A server-push notification (no `id`).
#[must_use]
pub fn notification(method: &str, params: &Value) -> String {
    json!({ "jsonrpc": JSONRPC_VERSION, "method": method, "params": params }).to_string()
}

/// Join batch member responses; `None` when every member was a notification.
#[must_use]
pub fn batch_response(members: Vec<String>) -> Option<String> {
    if members.is_empty() {
        return None;
    }
    Some(format!("[{}]", members.join(",")))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_request() {
        let incoming =
            parse_message(r#"{"jsonrpc":"2.0","method":"ping","params":{},"id":1}"#).unwrap();
        let Incoming::Single(Ok(request)) = incoming else {
            panic!("expected single request");
        };
        assert_eq!(request.method, "ping");
        assert_eq!(request.id, json!(1));
        assert!(!request.is_notification());
    }

    #[test]
    fn test_parse_notification() {
        let incoming = parse_message(r#"{"jsonrpc":"2.0","method":"heartbeat"}"#).unwrap();
        let Incoming::Single(Ok(request)) = incoming else {
            panic!("expected single request");
        };
        assert!(request.is_notification());
        assert!(request.params.is_object());
    }

    #[test]
    fn test_parse_error_on_bad_json() {
        let err = parse_message("{nope").unwrap_err();
        assert!(err.contains("-32700"));
        assert!(err.contains("\"id\":null"));
    }

    #[test]
    fn test_wrong_version_rejected_with_id() {
        let incoming = parse_message(r#"{"jsonrpc":"1.0","method":"ping","id":7}"#).unwrap();
        let Incoming::Single(Err(Some(response))) = incoming else {
            panic!("expected error outcome");
        };
        assert!(response.contains("-32600"));
        assert!(response.contains("\"id\":7"));
    }

    #[test]
    fn test_reserved_method_refused() {
        let incoming = parse_message(r#"{"jsonrpc":"2.0","method":"rpc.ping","id":1}"#).unwrap();
        assert!(matches!(incoming, Incoming::Single(Err(Some(_)))));
    }

    #[test]
    fn test_invalid_notification_gets_no_response() {
        let incoming = parse_message(r#"{"jsonrpc":"2.0","method":""}"#).unwrap();
        assert!(matches!(incoming, Incoming::Single(Err(None))));
    }

    #[test]
    fn test_batch_mixes_valid_and_invalid() {
        let incoming = parse_message(
            r#"[{"jsonrpc":"2.0","method":"ping","id":1},{"jsonrpc":"2.0","id":2},42]"#,
        )
        .unwrap();
        let Incoming::Batch(items) = incoming else {
            panic!("expected batch");
        };
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok());
        assert!(matches!(&items[1], Err(Some(r)) if r.contains("\"id\":2")));
        assert!(matches!(&items[2], Err(Some(_))));
    }

    #[test]
    fn test_empty_batch_is_invalid() {
        assert!(parse_message("[]").unwrap_err().contains("-32600"));
    }

    #[test]
    fn test_batch_of_notifications_has_no_response() {
        assert_eq!(batch_response(vec![]), None);
        assert_eq!(
            batch_response(vec!["{\"a\":1}".into(), "{\"b\":2}".into()]),
            Some("[{\"a\":1},{\"b\":2}]".into())
        );
    }

    #[test]
    fn test_param_helpers() {
        let request = Request {
            method: "tell".into(),
            params: json!({"target_mud": "Beta", "listen_only": true, "empty": ""}),
            id: json!(1),
        };
        assert_eq!(request.str_param("target_mud").unwrap(), "Beta");
        assert!(request.str_param("missing").is_err());
        assert!(request.str_param("empty").is_err());
        assert_eq!(request.opt_str_param("empty"), None);
        assert!(request.bool_param("listen_only", false));
    }

    #[test]
    fn test_notification_has_no_id() {
        let text = notification("channel_message", &json!({"channel": "chat"}));
        let value: Value = serde_json::from_str(&text).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["method"], "channel_message");
    }
}
