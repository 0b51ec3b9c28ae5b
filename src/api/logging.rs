use crate::util::env_flag;
use serde_json::Value;

pub(crate) const DEBUG_PAYLOAD_ENV: &str = "CHATSH_DEBUG_PAYLOAD";

pub fn debug_payload_enabled() -> bool {
    env_flag(DEBUG_PAYLOAD_ENV)
}

pub fn emit_debug_payload(request_url: &str, payload: &Value) {
    let formatted_payload = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    tracing::debug!(
        target: "chatsh::api",
        url = request_url,
        "payload_request\n{formatted_payload}"
    );
}

pub fn emit_sse_parse_error(field: &str, raw: &str, parse_error: &serde_json::Error) {
    tracing::warn!(
        target: "chatsh::api",
        error = %parse_error,
        field,
        "sse_parse_failed\n{raw}"
    );
}
