// Canonical probe request bodies
//
// Each probe kind is shaped to force a specific response feature to the
// surface: `tool` forces a `tool_use` block (tool-id prefix), `thinking`
// forces a `thinking` block (signature shape), `simple` is the cheapest
// possible request, used for availability checks and rate-limit sampling.

use serde_json::{json, Value};

use crate::fingerprint::ProbeType;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Build the JSON body for `probe_type` against `model`.
pub fn build_payload(probe_type: ProbeType, model: &str) -> Value {
    match probe_type {
        ProbeType::Tool => json!({
            "model": model,
            "max_tokens": 50,
            "tools": [{
                "name": "probe",
                "description": "Probe function",
                "input_schema": {
                    "type": "object",
                    "properties": { "q": { "type": "string" } },
                    "required": ["q"]
                }
            }],
            "tool_choice": { "type": "tool", "name": "probe" },
            "messages": [{ "role": "user", "content": "call probe with q=test" }]
        }),
        ProbeType::Thinking => json!({
            "model": model,
            "max_tokens": 2048,
            "thinking": { "type": "enabled", "budget_tokens": 1024 },
            "messages": [{ "role": "user", "content": "What is 2+3?" }]
        }),
        ProbeType::Simple => json!({
            "model": model,
            "max_tokens": 5,
            "messages": [{ "role": "user", "content": "Say OK" }]
        }),
    }
}

/// Headers every probe carries. Both `x-api-key` and a bearer
/// `Authorization` are sent because some relays honor only one of the two.
pub fn probe_headers(api_key: &str) -> Vec<(&'static str, String)> {
    vec![
        ("content-type", "application/json".to_string()),
        ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ("x-api-key", api_key.to_string()),
        ("authorization", format!("Bearer {api_key}")),
    ]
}
