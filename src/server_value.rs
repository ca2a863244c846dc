use serde_json::Value;

/// Placeholder resolved to the remote service's own clock at write time.
///
/// Fresh writes prefer this sentinel over a locally computed timestamp; the
/// clock offset is only needed for timestamps composed while offline.
pub fn server_timestamp() -> Value {
    serde_json::json!({ ".sv": "timestamp" })
}

/// Returns whether the value is the server-timestamp sentinel.
pub fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|map| map.get(".sv"))
        .and_then(Value::as_str)
        == Some("timestamp")
}
