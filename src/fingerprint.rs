// Fingerprint data model
//
// A Fingerprint is the observation unit extracted from one probe response.
// It is deliberately "wide and loose": every field is independently optional
// because the three upstreams this detector distinguishes (Anthropic, Bedrock,
// Vertex) each omit or rewrite a different subset of fields.

use serde::{Deserialize, Serialize};

/// Which of the three canned request bodies produced this observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeType {
    Tool,
    Thinking,
    Simple,
}

impl ProbeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeType::Tool => "tool",
            ProbeType::Thinking => "thinking",
            ProbeType::Simple => "simple",
        }
    }
}

/// Provenance tag derived from the returned `model` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    Anthropic,
    Bedrock,
    Kiro,
    Empty,
}

/// Provenance tag derived from a `tool_use` block's `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolIdSource {
    Anthropic,
    Bedrock,
    Vertex,
    Rewritten,
    Empty,
}

/// Provenance tag derived from the top-level message `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgIdSource {
    Anthropic,
    Antigravity,
    Vertex,
    Rewritten,
    Unknown,
}

/// The textual shape of the message id, independent of its provenance tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgIdFormat {
    Base62,
    MsgUuid,
    Uuid,
    Other,
}

/// Casing convention observed in the `usage` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageStyle {
    CamelCase,
    SnakeCase,
    Empty,
}

/// Classification of a `thinking.signature` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingSigClass {
    None,
    Short,
    Normal,
    Vertex,
}

/// One probe's worth of extracted evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fingerprint {
    pub probe_type: ProbeType,

    pub model_requested: String,
    pub model_returned: String,
    pub model_source: ModelSource,

    pub tool_id: String,
    pub tool_id_source: ToolIdSource,

    pub msg_id: String,
    pub msg_id_source: MsgIdSource,
    pub msg_id_format: MsgIdFormat,

    pub usage_style: UsageStyle,

    pub has_service_tier: bool,
    pub service_tier: String,

    pub has_inference_geo: bool,
    pub inference_geo: String,

    pub has_cache_creation_obj: bool,

    pub thinking_sig_class: ThinkingSigClass,
    pub thinking_sig_len: usize,

    pub has_aws_headers: bool,
    pub has_anthropic_headers: bool,

    pub stop_reason: String,
    pub latency_ms: u64,

    pub ratelimit_input_limit: Option<i64>,
    pub ratelimit_input_remaining: Option<i64>,
    pub ratelimit_input_reset: Option<String>,

    pub proxy_platform: Option<String>,
    pub platform_clues: Vec<String>,

    /// Non-empty iff the probe failed to produce a usable response. A
    /// fingerprint with `error` set carries no other meaningful evidence
    /// and is skipped by the classifier.
    pub error: String,
}

impl Fingerprint {
    /// A blank fingerprint for the given probe/model, to be filled in by
    /// the parser or marked failed via [`Fingerprint::with_error`].
    pub fn new(probe_type: ProbeType, model_requested: impl Into<String>) -> Self {
        Self {
            probe_type,
            model_requested: model_requested.into(),
            model_returned: String::new(),
            model_source: ModelSource::Empty,
            tool_id: String::new(),
            tool_id_source: ToolIdSource::Empty,
            msg_id: String::new(),
            msg_id_source: MsgIdSource::Unknown,
            msg_id_format: MsgIdFormat::Other,
            usage_style: UsageStyle::Empty,
            has_service_tier: false,
            service_tier: String::new(),
            has_inference_geo: false,
            inference_geo: String::new(),
            has_cache_creation_obj: false,
            thinking_sig_class: ThinkingSigClass::None,
            thinking_sig_len: 0,
            has_aws_headers: false,
            has_anthropic_headers: false,
            stop_reason: String::new(),
            latency_ms: 0,
            ratelimit_input_limit: None,
            ratelimit_input_remaining: None,
            ratelimit_input_reset: None,
            proxy_platform: None,
            platform_clues: Vec::new(),
            error: String::new(),
        }
    }

    pub fn with_error(probe_type: ProbeType, model_requested: impl Into<String>, error: impl Into<String>) -> Self {
        let mut fp = Self::new(probe_type, model_requested);
        fp.error = error.into();
        fp
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_empty()
    }
}

/// Prefix/shape classification for `model_returned`. Order matters: `kiro-`
/// is checked before the generic `anthropic.` Bedrock prefix.
pub fn classify_model_source(model_returned: &str) -> ModelSource {
    if model_returned.is_empty() {
        ModelSource::Empty
    } else if model_returned.starts_with("kiro-") {
        ModelSource::Kiro
    } else if model_returned.starts_with("anthropic.") {
        ModelSource::Bedrock
    } else {
        ModelSource::Anthropic
    }
}

/// Prefix/shape classification for a `tool_use` block's `id`.
pub fn classify_tool_id(tool_id: &str) -> ToolIdSource {
    use once_cell::sync::Lazy;
    use regex::Regex;
    static VERTEX_TOOL_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^tool_\d+$").unwrap());

    if tool_id.is_empty() {
        ToolIdSource::Empty
    } else if tool_id.starts_with("toolu_") {
        ToolIdSource::Anthropic
    } else if tool_id.starts_with("tooluse_") {
        ToolIdSource::Bedrock
    } else if VERTEX_TOOL_ID.is_match(tool_id) {
        ToolIdSource::Vertex
    } else {
        ToolIdSource::Rewritten
    }
}

/// Prefix/shape classification for the top-level message `id`.
pub fn classify_msg_id(msg_id: &str) -> (MsgIdSource, MsgIdFormat) {
    use once_cell::sync::Lazy;
    use regex::Regex;
    static ANTIGRAVITY_MSG_ID: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^msg_[0-9a-f]{8}-[0-9a-f]{4}-").unwrap());
    static BARE_UUID: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
    });

    if msg_id.is_empty() {
        return (MsgIdSource::Unknown, MsgIdFormat::Other);
    }
    if let Some(stripped) = msg_id.strip_prefix("req_vrtx_") {
        let _ = stripped;
        return (MsgIdSource::Vertex, MsgIdFormat::Other);
    }
    if msg_id.starts_with("msg_") {
        if ANTIGRAVITY_MSG_ID.is_match(msg_id) {
            return (MsgIdSource::Antigravity, MsgIdFormat::MsgUuid);
        }
        return (MsgIdSource::Anthropic, MsgIdFormat::Base62);
    }
    if BARE_UUID.is_match(&msg_id.to_lowercase()) {
        return (MsgIdSource::Rewritten, MsgIdFormat::Uuid);
    }
    (MsgIdSource::Rewritten, MsgIdFormat::Other)
}

/// Classify a `thinking.signature` value by length and shape.
pub fn classify_thinking_signature(signature: &str) -> ThinkingSigClass {
    if signature.is_empty() {
        ThinkingSigClass::None
    } else if signature.starts_with("claude#") {
        ThinkingSigClass::Vertex
    } else if signature.len() < 100 {
        ThinkingSigClass::Short
    } else {
        ThinkingSigClass::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_source_prefers_kiro_over_bedrock_prefix() {
        assert_eq!(classify_model_source("kiro-sonnet-4"), ModelSource::Kiro);
        assert_eq!(
            classify_model_source("anthropic.claude-sonnet-4-v1"),
            ModelSource::Bedrock
        );
        assert_eq!(
            classify_model_source("claude-sonnet-4-5-20250929"),
            ModelSource::Anthropic
        );
        assert_eq!(classify_model_source(""), ModelSource::Empty);
    }

    #[test]
    fn tool_id_classification() {
        assert_eq!(classify_tool_id("toolu_01abc"), ToolIdSource::Anthropic);
        assert_eq!(classify_tool_id("tooluse_01abc"), ToolIdSource::Bedrock);
        assert_eq!(classify_tool_id("tool_0"), ToolIdSource::Vertex);
        assert_eq!(classify_tool_id("tool_12345"), ToolIdSource::Vertex);
        assert_eq!(classify_tool_id("abc-123"), ToolIdSource::Rewritten);
        assert_eq!(classify_tool_id(""), ToolIdSource::Empty);
        // tool_abc (non-numeric suffix) is not the vertex shape
        assert_eq!(classify_tool_id("tool_abc"), ToolIdSource::Rewritten);
    }

    #[test]
    fn msg_id_classification() {
        assert_eq!(
            classify_msg_id("req_vrtx_6f3a9c8e2b1d"),
            (MsgIdSource::Vertex, MsgIdFormat::Other)
        );
        assert_eq!(
            classify_msg_id("msg_01A2B3C4D5E6F7G8H9"),
            (MsgIdSource::Anthropic, MsgIdFormat::Base62)
        );
        assert_eq!(
            classify_msg_id("msg_8f14e45f-ceea-4abc-8574-a929b8713bd2"),
            (MsgIdSource::Antigravity, MsgIdFormat::MsgUuid)
        );
        assert_eq!(
            classify_msg_id("8f14e45f-ceea-4abc-8574-a929b8713bd2"),
            (MsgIdSource::Rewritten, MsgIdFormat::Uuid)
        );
        assert_eq!(classify_msg_id(""), (MsgIdSource::Unknown, MsgIdFormat::Other));
    }

    #[test]
    fn thinking_signature_classification() {
        assert_eq!(classify_thinking_signature(""), ThinkingSigClass::None);
        assert_eq!(
            classify_thinking_signature("claude#xyz"),
            ThinkingSigClass::Vertex
        );
        assert_eq!(
            classify_thinking_signature(&"a".repeat(50)),
            ThinkingSigClass::Short
        );
        assert_eq!(
            classify_thinking_signature(&"a".repeat(412)),
            ThinkingSigClass::Normal
        );
    }
}
