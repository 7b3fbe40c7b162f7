//! JSON-RPC 2.0 message shapes and the handful of method names the proxy
//! actually looks at. Everything else passes through untouched.

use std::fmt;

use serde_json::Value;

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// Name of the extension container nested under `params`/`result`.
pub const EXT_NAMESPACE: &str = "_ultra_lean_mcp_proxy";

/// Name of the locally-served search meta-tool injected by lazy visibility.
pub const SEARCH_TOOL_NAME: &str = "ultra_lean_mcp_proxy.search_tools";

/// A JSON-RPC request id. The wire format allows numbers or strings; the
/// proxy only ever originates numeric-adjacent ids of its own (for the
/// search-tool short-circuit there is no id to mint — the client's id is
/// echoed back), so this just needs to round-trip both shapes for matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

impl RequestId {
    pub fn from_value(value: &Value) -> Option<Self> {
        if let Some(n) = value.as_i64() {
            return Some(RequestId::Number(n));
        }
        if let Some(s) = value.as_str() {
            return Some(RequestId::String(s.to_string()));
        }
        None
    }

    pub fn to_value(&self) -> Value {
        match self {
            RequestId::Number(n) => Value::from(*n),
            RequestId::String(s) => Value::from(s.clone()),
        }
    }
}

/// Returns the JSON-RPC `method` field, if present and a string.
pub fn method_of(message: &Value) -> Option<&str> {
    message.get("method").and_then(Value::as_str)
}

/// Returns the JSON-RPC `id` field decoded as a `RequestId`, if present.
pub fn id_of(message: &Value) -> Option<RequestId> {
    message.get("id").and_then(RequestId::from_value)
}

/// A message with a `method` and no `id` is a notification; everything else
/// with an `id` is a request or response, distinguished by the caller's
/// direction of travel (client→upstream messages with an id are requests,
/// upstream→client messages with an id are responses).
pub fn is_notification(message: &Value) -> bool {
    message.get("id").is_none() && message.get("method").is_some()
}

/// True when `result.error` (a JSON-RPC error response) is present.
pub fn is_error_response(message: &Value) -> bool {
    message.get("error").is_some()
}

/// Builds an empty extension container path, creating `params`/`result`
/// objects as needed. Returns a mutable reference to
/// `<root>._ultra_lean_mcp_proxy`.
pub fn ext_mut<'a>(root: &'a mut Value, field: &str) -> &'a mut Value {
    if !root.get(field).map(Value::is_object).unwrap_or(false) {
        root[field] = Value::Object(serde_json::Map::new());
    }
    ext_in(&mut root[field])
}

/// Like [`ext_mut`], but operates directly on an already-selected container
/// (e.g. a `result` object a caller already holds a `&mut` into) rather
/// than indexing it out of a parent field.
pub fn ext_in(container: &mut Value) -> &mut Value {
    if !container.is_object() {
        *container = Value::Object(serde_json::Map::new());
    }
    if !container
        .get(EXT_NAMESPACE)
        .map(Value::is_object)
        .unwrap_or(false)
    {
        container[EXT_NAMESPACE] = Value::Object(serde_json::Map::new());
    }
    &mut container[EXT_NAMESPACE]
}

/// Reads `<root>.<field>._ultra_lean_mcp_proxy`, if present.
pub fn ext_ref<'a>(root: &'a Value, field: &str) -> Option<&'a Value> {
    root.get(field)?.get(EXT_NAMESPACE)
}
