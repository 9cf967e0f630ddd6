use crate::util::{excerpt, parse_bool_str};
use serde::Serialize;
use tracing::{debug, warn};

const DEBUG_PAYLOAD_ENV: &str = "GHOST_DEBUG_PAYLOAD";

pub fn debug_payload_enabled() -> bool {
    std::env::var(DEBUG_PAYLOAD_ENV)
        .ok()
        .and_then(|v| parse_bool_str(&v))
        .unwrap_or(false)
}

pub fn emit_debug_payload<T: Serialize>(request_url: &str, payload: &T) {
    let formatted = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    debug!(target: "ghost::api", url = request_url, "request payload:\n{formatted}");
}

pub fn emit_stream_parse_error(line: &str, parse_error: &serde_json::Error) {
    warn!(
        target: "ghost::api",
        error = %parse_error,
        line = %excerpt(line, 200),
        "skipping undecodable stream line"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_payload_enabled_accepts_true_variants() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var(DEBUG_PAYLOAD_ENV, "1");
        assert!(debug_payload_enabled());
        std::env::set_var(DEBUG_PAYLOAD_ENV, "TRUE");
        assert!(debug_payload_enabled());
        std::env::set_var(DEBUG_PAYLOAD_ENV, "nope");
        assert!(!debug_payload_enabled());
        std::env::remove_var(DEBUG_PAYLOAD_ENV);
        assert!(!debug_payload_enabled());
    }
}
