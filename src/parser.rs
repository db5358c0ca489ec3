// Response parsing: HTTP response (headers + body) -> Fingerprint
//
// The body shape varies across three unrelated upstreams wearing the same
// Anthropic-compatible envelope, so extraction is a sequence of graceful,
// independent lookups into a loose `serde_json::Value` tree rather than a
// single strict deserialization.

use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::fingerprint::{
    classify_model_source, classify_msg_id, classify_thinking_signature, classify_tool_id,
    Fingerprint, ProbeType, ThinkingSigClass, UsageStyle,
};

const BODY_SNIPPET_LEN: usize = 200;

/// Outcome of issuing one HTTP probe, already reduced to what the parser
/// needs: either a response we can inspect, or the reason we couldn't.
pub enum ProbeOutcome {
    Response { status: u16, headers: HeaderMap, body: Vec<u8> },
    TimedOut,
    TransportError,
}

/// Build a [`Fingerprint`] from the outcome of one probe.
pub fn parse(
    probe_type: ProbeType,
    model_requested: &str,
    outcome: ProbeOutcome,
    latency_ms: u64,
) -> Fingerprint {
    let (status, headers, body) = match outcome {
        ProbeOutcome::TimedOut => {
            return Fingerprint::with_error(probe_type, model_requested, "detection timed out")
        }
        ProbeOutcome::TransportError => {
            return Fingerprint::with_error(probe_type, model_requested, "request failed")
        }
        ProbeOutcome::Response { status, headers, body } => (status, headers, body),
    };

    if status != 200 {
        let snippet: String = String::from_utf8_lossy(&body)
            .chars()
            .take(BODY_SNIPPET_LEN)
            .collect();
        return Fingerprint::with_error(
            probe_type,
            model_requested,
            format!("HTTP {status}: {snippet}"),
        );
    }

    let mut fp = Fingerprint::new(probe_type, model_requested);
    fp.latency_ms = latency_ms;

    scan_headers(&headers, &mut fp);

    let parsed: Option<Value> = serde_json::from_slice(&body).ok();
    let Some(body_json) = parsed else {
        fp.error = "invalid JSON body".to_string();
        return fp;
    };

    scan_content_blocks(&body_json, &mut fp);
    scan_message_id(&body_json, &mut fp);
    scan_model(&body_json, &mut fp);
    scan_usage(&body_json, &mut fp);

    if let Some(stop_reason) = body_json.get("stop_reason").and_then(Value::as_str) {
        fp.stop_reason = stop_reason.to_string();
    }

    fp
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn scan_headers(headers: &HeaderMap, fp: &mut Fingerprint) {
    for (name, value) in headers.iter() {
        let key = name.as_str().to_lowercase();
        let val = value.to_str().unwrap_or_default();

        if ["x-amzn", "x-amz-", "bedrock"]
            .iter()
            .any(|needle| key.contains(needle))
        {
            fp.has_aws_headers = true;
        }

        if ["anthropic-ratelimit", "x-ratelimit", "retry-after"]
            .iter()
            .any(|needle| key.contains(needle))
        {
            fp.has_anthropic_headers = true;
        }

        if key.contains("aidistri") {
            fp.proxy_platform.get_or_insert_with(|| "Aidistri".to_string());
            fp.platform_clues.push("X-Aidistri-Request-Id".to_string());
        }

        if key.contains("one-api") || key.contains("new-api") {
            fp.proxy_platform
                .get_or_insert_with(|| "OneAPI/NewAPI".to_string());
        }

        if key == "access-control-allow-headers" && val.to_lowercase().contains("accounthub") {
            fp.proxy_platform.get_or_insert_with(|| "AccountHub".to_string());
            let clues: Vec<String> = val
                .split(',')
                .map(str::trim)
                .filter(|part| {
                    let lower = part.to_lowercase();
                    lower.contains("accounthub") || lower.contains("pool")
                })
                .take(5)
                .map(str::to_string)
                .collect();
            fp.platform_clues.extend(clues);
        }

        if key.contains("openrouter") || val.to_lowercase().contains("openrouter") {
            fp.proxy_platform.get_or_insert_with(|| "OpenRouter".to_string());
        }
    }

    if let Some(server) = header_str(headers, "server") {
        if server.eq_ignore_ascii_case("cloudflare") {
            if let Some(ray) = header_str(headers, "cf-ray") {
                fp.platform_clues.push(format!("CF-Ray: {ray}"));
            }
        }
    }

    fp.ratelimit_input_limit = header_str(headers, "anthropic-ratelimit-input-tokens-limit")
        .and_then(|v| v.parse().ok());
    fp.ratelimit_input_remaining =
        header_str(headers, "anthropic-ratelimit-input-tokens-remaining").and_then(|v| v.parse().ok());
    fp.ratelimit_input_reset = header_str(headers, "anthropic-ratelimit-input-tokens-reset")
        .map(str::to_string);
}

fn scan_content_blocks(body: &Value, fp: &mut Fingerprint) {
    let Some(blocks) = body.get("content").and_then(Value::as_array) else {
        return;
    };

    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("tool_use") => {
                if let Some(id) = block.get("id").and_then(Value::as_str) {
                    fp.tool_id = id.to_string();
                    fp.tool_id_source = classify_tool_id(id);
                }
            }
            Some("thinking") => {
                let signature = block.get("signature").and_then(Value::as_str).unwrap_or("");
                fp.thinking_sig_len = signature.len();
                fp.thinking_sig_class = classify_thinking_signature(signature);
            }
            _ => {}
        }
    }

    if fp.thinking_sig_class == ThinkingSigClass::None && fp.probe_type == ProbeType::Thinking {
        // No thinking block at all in a thinking-probe response is itself
        // evidence (used by the classifier's negative-evidence pass);
        // nothing further to record here beyond the default `None` class.
    }
}

fn scan_message_id(body: &Value, fp: &mut Fingerprint) {
    if let Some(id) = body.get("id").and_then(Value::as_str) {
        fp.msg_id = id.to_string();
        let (source, format) = classify_msg_id(id);
        fp.msg_id_source = source;
        fp.msg_id_format = format;
    }
}

fn scan_model(body: &Value, fp: &mut Fingerprint) {
    if let Some(model) = body.get("model").and_then(Value::as_str) {
        fp.model_returned = model.to_string();
        fp.model_source = classify_model_source(model);
    }
}

fn scan_usage(body: &Value, fp: &mut Fingerprint) {
    let Some(usage) = body.get("usage") else {
        return;
    };

    let has_camel = usage.get("inputTokens").is_some();
    let has_snake = usage.get("input_tokens").is_some();
    fp.usage_style = if has_camel {
        UsageStyle::CamelCase
    } else if has_snake {
        UsageStyle::SnakeCase
    } else {
        UsageStyle::Empty
    };

    if let Some(tier) = usage.get("service_tier").and_then(Value::as_str) {
        fp.has_service_tier = true;
        fp.service_tier = tier.to_string();
    } else if let Some(tier) = body.get("service_tier").and_then(Value::as_str) {
        fp.has_service_tier = true;
        fp.service_tier = tier.to_string();
    }

    if let Some(geo) = usage.get("inference_geo").and_then(Value::as_str) {
        fp.has_inference_geo = true;
        fp.inference_geo = geo.to_string();
    }

    if let Some(cache_creation) = usage.get("cache_creation") {
        fp.has_cache_creation_obj = cache_creation.is_object();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

    fn headers_from(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    fn parse_body(probe_type: ProbeType, headers: HeaderMap, body: &Value) -> Fingerprint {
        parse(
            probe_type,
            "claude-sonnet-4-5",
            ProbeOutcome::Response {
                status: 200,
                headers,
                body: serde_json::to_vec(body).unwrap(),
            },
            42,
        )
    }

    #[test]
    fn timed_out_and_transport_errors() {
        let fp = parse(ProbeType::Simple, "m", ProbeOutcome::TimedOut, 0);
        assert_eq!(fp.error, "detection timed out");
        assert!(!fp.is_valid());

        let fp = parse(ProbeType::Simple, "m", ProbeOutcome::TransportError, 0);
        assert_eq!(fp.error, "request failed");
    }

    #[test]
    fn non_200_captures_snippet() {
        let fp = parse(
            ProbeType::Simple,
            "m",
            ProbeOutcome::Response {
                status: 429,
                headers: HeaderMap::new(),
                body: b"rate limited".to_vec(),
            },
            10,
        );
        assert!(fp.error.starts_with("HTTP 429: rate limited"));
    }

    #[test]
    fn extracts_anthropic_tool_use_and_usage() {
        let body = serde_json::json!({
            "id": "msg_01ABC123",
            "model": "claude-sonnet-4-5-20250929",
            "stop_reason": "tool_use",
            "content": [{ "type": "tool_use", "id": "toolu_01XYZ", "name": "probe", "input": {} }],
            "usage": {
                "input_tokens": 10,
                "output_tokens": 5,
                "service_tier": "standard",
                "inference_geo": "US",
                "cache_creation": { "ephemeral_5m_input_tokens": 0 }
            }
        });
        let fp = parse_body(ProbeType::Tool, HeaderMap::new(), &body);
        assert_eq!(fp.tool_id, "toolu_01XYZ");
        assert!(matches!(fp.tool_id_source, crate::fingerprint::ToolIdSource::Anthropic));
        assert!(matches!(fp.msg_id_source, crate::fingerprint::MsgIdSource::Anthropic));
        assert!(fp.has_service_tier);
        assert!(fp.has_inference_geo);
        assert!(fp.has_cache_creation_obj);
        assert!(matches!(fp.usage_style, UsageStyle::SnakeCase));
    }

    #[test]
    fn extracts_bedrock_signals() {
        let body = serde_json::json!({
            "id": "8f14e45f-ceea-4abc-8574-a929b8713bd2",
            "model": "kiro-sonnet-4",
            "content": [{ "type": "tool_use", "id": "tooluse_abc123", "name": "probe", "input": {} }],
            "usage": { "inputTokens": 10, "outputTokens": 5 }
        });
        let headers = headers_from(&[("x-amzn-requestid", "abc-123")]);
        let fp = parse_body(ProbeType::Tool, headers, &body);
        assert!(matches!(fp.tool_id_source, crate::fingerprint::ToolIdSource::Bedrock));
        assert!(matches!(fp.model_source, crate::fingerprint::ModelSource::Kiro));
        assert!(matches!(fp.usage_style, UsageStyle::CamelCase));
        assert!(fp.has_aws_headers);
    }

    #[test]
    fn detects_platform_clues() {
        let headers = headers_from(&[
            ("server", "cloudflare"),
            ("cf-ray", "89abf-SJC"),
            ("access-control-allow-headers", "Content-Type, X-AccountHub-Pool, Authorization"),
        ]);
        let fp = parse_body(ProbeType::Simple, headers, &serde_json::json!({}));
        assert_eq!(fp.proxy_platform.as_deref(), Some("AccountHub"));
        assert!(fp.platform_clues.iter().any(|c| c.contains("CF-Ray")));
        assert!(fp.platform_clues.iter().any(|c| c.to_lowercase().contains("accounthub")));
    }

    #[test]
    fn cloudflare_alone_does_not_set_platform() {
        let headers = headers_from(&[("server", "cloudflare"), ("cf-ray", "89abf-SJC")]);
        let fp = parse_body(ProbeType::Simple, headers, &serde_json::json!({}));
        assert!(fp.proxy_platform.is_none());
        assert!(fp.platform_clues.iter().any(|c| c.contains("CF-Ray")));
    }

    #[test]
    fn thinking_signature_shapes() {
        let body = serde_json::json!({
            "id": "msg_01ABC",
            "model": "claude-opus-4-6-20250918",
            "content": [{ "type": "thinking", "thinking": "...", "signature": "a".repeat(412) }],
        });
        let fp = parse_body(ProbeType::Thinking, HeaderMap::new(), &body);
        assert_eq!(fp.thinking_sig_len, 412);
        assert!(matches!(fp.thinking_sig_class, ThinkingSigClass::Normal));

        let vertex_body = serde_json::json!({
            "id": "req_vrtx_abc",
            "model": "claude-sonnet-4-5",
            "content": [{ "type": "thinking", "thinking": "...", "signature": "claude#abcdef" }],
        });
        let fp = parse_body(ProbeType::Thinking, HeaderMap::new(), &vertex_body);
        assert!(matches!(fp.thinking_sig_class, ThinkingSigClass::Vertex));
    }

    #[test]
    fn ratelimit_headers_parsed() {
        let headers = headers_from(&[
            ("anthropic-ratelimit-input-tokens-limit", "400000"),
            ("anthropic-ratelimit-input-tokens-remaining", "399000"),
            ("anthropic-ratelimit-input-tokens-reset", "2026-07-28T00:00:00Z"),
        ]);
        let fp = parse_body(ProbeType::Simple, headers, &serde_json::json!({}));
        assert_eq!(fp.ratelimit_input_limit, Some(400000));
        assert_eq!(fp.ratelimit_input_remaining, Some(399000));
        assert!(fp.has_anthropic_headers);
    }
}
