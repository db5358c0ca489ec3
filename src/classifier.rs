// Four-pass evidence classifier
//
// Pass A scores each valid fingerprint's signals into three buckets. Pass B
// corrects a known attribution ambiguity (Antigravity-over-Vertex relays
// also emit `tooluse_` tool ids, which otherwise look like Bedrock). Pass C
// penalizes an all-Anthropic score for the absence of markers a real
// Anthropic response could not fail to produce. Pass D turns the final
// scores into a verdict and confidence.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fingerprint::{Fingerprint, MsgIdSource, ProbeType, ThinkingSigClass, ToolIdSource, UsageStyle};
use crate::fingerprint::ModelSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Anthropic,
    Bedrock,
    Antigravity,
    Suspicious,
    Unknown,
    Unavailable,
}

impl Verdict {
    /// Localizable label table. Not part of the core contract (see
    /// "UI rendering ... internationalization of verdict labels" in the
    /// out-of-scope list) but this default table is what `DetectResult`
    /// carries so a caller need not maintain its own copy.
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Anthropic => "Anthropic 官方 API",
            Verdict::Bedrock => "AWS Bedrock (Kiro)",
            Verdict::Antigravity => "Google Vertex AI (Antigravity)",
            Verdict::Suspicious => "疑似伪装 Anthropic",
            Verdict::Unknown => "无法确定",
            Verdict::Unavailable => "不可用",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Anthropic,
    Bedrock,
    Antigravity,
}

pub type Scores = BTreeMap<Bucket, i64>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyResult {
    pub verdict: Verdict,
    pub verdict_text: String,
    pub confidence: f64,
    pub scores: Scores,
    pub evidence: Vec<String>,
    pub avg_latency_ms: u64,
    pub proxy_platform: Option<String>,
    pub platform_clues: Vec<String>,
}

fn empty_scores() -> Scores {
    let mut scores = BTreeMap::new();
    scores.insert(Bucket::Anthropic, 0);
    scores.insert(Bucket::Bedrock, 0);
    scores.insert(Bucket::Antigravity, 0);
    scores
}

fn add(scores: &mut Scores, bucket: Bucket, amount: i64) {
    *scores.entry(bucket).or_insert(0) += amount;
}

/// Classify a model's probe fingerprints into a verdict. Pure function of
/// its input: calling it twice on the same `fingerprints` slice yields an
/// identical result.
pub fn classify(fingerprints: &[Fingerprint]) -> ClassifyResult {
    let valid: Vec<&Fingerprint> = fingerprints.iter().filter(|fp| fp.is_valid()).collect();

    let mut scores = empty_scores();
    let mut evidence = Vec::new();

    if valid.is_empty() {
        evidence.push("所有探测均失败".to_string());
        return ClassifyResult {
            verdict: Verdict::Unknown,
            verdict_text: Verdict::Unknown.label().to_string(),
            confidence: 0.0,
            scores,
            evidence,
            avg_latency_ms: 0,
            proxy_platform: first_platform(fingerprints),
            platform_clues: first_platform_clues(fingerprints),
        };
    }

    pass_a_additive(&valid, &mut scores, &mut evidence);
    pass_b_correction(&valid, &mut scores, &mut evidence);
    let missing = pass_c_negative_evidence(&valid, &mut scores, &mut evidence);

    for v in scores.values_mut() {
        if *v < 0 {
            *v = 0;
        }
    }

    let (verdict, confidence) = pass_d_verdict(&scores, &missing, &mut evidence);

    let avg_latency_ms = {
        let total: u64 = valid.iter().map(|fp| fp.latency_ms).sum();
        total / valid.len() as u64
    };

    ClassifyResult {
        verdict,
        verdict_text: verdict.label().to_string(),
        confidence,
        scores,
        evidence,
        avg_latency_ms,
        proxy_platform: first_platform(fingerprints),
        platform_clues: first_platform_clues(fingerprints),
    }
}

fn first_platform(fingerprints: &[Fingerprint]) -> Option<String> {
    fingerprints.iter().find_map(|fp| fp.proxy_platform.clone())
}

fn first_platform_clues(fingerprints: &[Fingerprint]) -> Vec<String> {
    fingerprints
        .iter()
        .find(|fp| fp.proxy_platform.is_some())
        .map(|fp| fp.platform_clues.clone())
        .unwrap_or_default()
}

fn pass_a_additive(valid: &[&Fingerprint], scores: &mut Scores, evidence: &mut Vec<String>) {
    for (i, fp) in valid.iter().enumerate() {
        let tag = format!("[R{}]", i + 1);

        match fp.tool_id_source {
            ToolIdSource::Anthropic => {
                add(scores, Bucket::Anthropic, 5);
                evidence.push(format!("{tag} tool_id 前缀 toolu_ → Anthropic (+5)"));
            }
            ToolIdSource::Bedrock => {
                add(scores, Bucket::Bedrock, 5);
                evidence.push(format!("{tag} tool_id 前缀 tooluse_ → Bedrock (+5)"));
            }
            ToolIdSource::Vertex => {
                add(scores, Bucket::Antigravity, 5);
                evidence.push(format!("{tag} tool_id 形如 tool_N → Antigravity (+5)"));
            }
            ToolIdSource::Rewritten => {
                evidence.push(format!("{tag} tool_id 被重写，来源不确定"));
            }
            ToolIdSource::Empty => {}
        }

        if fp.thinking_sig_class == ThinkingSigClass::Vertex {
            add(scores, Bucket::Antigravity, 5);
            evidence.push(format!("{tag} thinking.signature 以 claude# 开头 → Antigravity (+5)"));
        } else if fp.thinking_sig_class == ThinkingSigClass::Short {
            evidence.push(format!("{tag} thinking.signature 长度过短 ({})", fp.thinking_sig_len));
        }

        match fp.msg_id_source {
            MsgIdSource::Anthropic => {
                add(scores, Bucket::Anthropic, 2);
                evidence.push(format!("{tag} msg_id 为 base62 格式 → Anthropic (+2)"));
            }
            MsgIdSource::Vertex => {
                add(scores, Bucket::Antigravity, 6);
                evidence.push(format!("{tag} msg_id 前缀 req_vrtx_ → Antigravity (+6)"));
            }
            MsgIdSource::Antigravity | MsgIdSource::Rewritten | MsgIdSource::Unknown => {}
        }

        match fp.model_source {
            ModelSource::Kiro => {
                add(scores, Bucket::Bedrock, 8);
                evidence.push(format!("{tag} model 前缀 kiro- → Kiro 逆向铁证 (+8)"));
            }
            ModelSource::Bedrock => {
                add(scores, Bucket::Bedrock, 3);
                evidence.push(format!("{tag} model 前缀 anthropic. → Bedrock (+3)"));
            }
            ModelSource::Anthropic | ModelSource::Empty => {}
        }

        if fp.has_service_tier {
            add(scores, Bucket::Anthropic, 3);
            evidence.push(format!("{tag} 响应含 service_tier → Anthropic (+3)"));
        }
        if fp.has_inference_geo {
            add(scores, Bucket::Anthropic, 2);
            evidence.push(format!("{tag} 响应含 inference_geo → Anthropic (+2)"));
        }
        if fp.has_cache_creation_obj {
            add(scores, Bucket::Anthropic, 1);
            evidence.push(format!("{tag} usage.cache_creation 为嵌套对象 → Anthropic (+1)"));
        }
        if fp.usage_style == UsageStyle::CamelCase {
            add(scores, Bucket::Bedrock, 2);
            evidence.push(format!("{tag} usage 使用 camelCase → Bedrock (+2)"));
        }
        if fp.has_aws_headers {
            add(scores, Bucket::Bedrock, 3);
            evidence.push(format!("{tag} 响应头含 AWS 特征 → Bedrock (+3)"));
        }
        if fp.has_anthropic_headers {
            add(scores, Bucket::Anthropic, 2);
            evidence.push(format!("{tag} 响应头含 Anthropic ratelimit 特征 → Anthropic (+2)"));
        }
    }
}

fn pass_b_correction(valid: &[&Fingerprint], scores: &mut Scores, evidence: &mut Vec<String>) {
    let has_kiro_model = valid.iter().any(|fp| fp.model_source == ModelSource::Kiro);
    let antigravity_score = *scores.get(&Bucket::Antigravity).unwrap_or(&0);
    let bedrock_score = *scores.get(&Bucket::Bedrock).unwrap_or(&0);

    if !has_kiro_model && antigravity_score > 0 && bedrock_score > 0 && antigravity_score >= 4 {
        let bedrock_tool_id_count = valid
            .iter()
            .filter(|fp| fp.tool_id_source == ToolIdSource::Bedrock)
            .count() as i64;
        let tooluse_points = 5 * bedrock_tool_id_count;

        if tooluse_points > 0 {
            add(scores, Bucket::Bedrock, -tooluse_points);
            add(scores, Bucket::Antigravity, tooluse_points);
            evidence.push(format!(
                "[修正] tooluse_ 分数 {tooluse_points} 从 Bedrock 转移到 Antigravity（Antigravity-over-Vertex relay 同样重写 tooluse_ 前缀）"
            ));
        }
    }

    if has_kiro_model {
        let antigravity_msg_ids = valid
            .iter()
            .any(|fp| fp.msg_id_source == MsgIdSource::Antigravity);
        if antigravity_msg_ids {
            evidence.push("[修正] msg_id 形似 Antigravity 但已检测到 kiro- 模型前缀，归因为 Kiro relay 重写".to_string());
        }
    }
}

/// Flags for Anthropic markers a real Anthropic response could not omit.
#[derive(Debug, Default)]
struct MissingFlags {
    inference_geo: bool,
    cache_creation_obj: bool,
    thinking_signature: bool,
}

impl MissingFlags {
    fn count(&self) -> usize {
        [self.inference_geo, self.cache_creation_obj, self.thinking_signature]
            .iter()
            .filter(|f| **f)
            .count()
    }
}

fn pass_c_negative_evidence(
    valid: &[&Fingerprint],
    scores: &mut Scores,
    evidence: &mut Vec<String>,
) -> MissingFlags {
    let mut missing = MissingFlags::default();

    let anthropic_score = *scores.get(&Bucket::Anthropic).unwrap_or(&0);
    let bedrock_score = *scores.get(&Bucket::Bedrock).unwrap_or(&0);
    let antigravity_score = *scores.get(&Bucket::Antigravity).unwrap_or(&0);

    if anthropic_score > 0 && bedrock_score == 0 && antigravity_score == 0 {
        if !valid.iter().any(|fp| fp.has_inference_geo) {
            missing.inference_geo = true;
            add(scores, Bucket::Anthropic, -3);
            evidence.push("[!] 缺失 inference_geo 标记 (-3)".to_string());
        }

        if !valid.iter().any(|fp| fp.has_cache_creation_obj) {
            missing.cache_creation_obj = true;
            add(scores, Bucket::Anthropic, -2);
            evidence.push("[!] 缺失嵌套 cache_creation 对象 (-2)".to_string());
        }

        let has_thinking_probe = valid.iter().any(|fp| fp.probe_type == ProbeType::Thinking);
        let has_real_signature = valid
            .iter()
            .any(|fp| fp.probe_type == ProbeType::Thinking && fp.thinking_sig_len > 0);
        if has_thinking_probe && !has_real_signature {
            missing.thinking_signature = true;
            add(scores, Bucket::Anthropic, -3);
            evidence.push("[!] thinking 探测未返回签名 (-3)".to_string());
        }
    }

    missing
}

fn pass_d_verdict(scores: &Scores, missing: &MissingFlags, evidence: &mut Vec<String>) -> (Verdict, f64) {
    let anthropic = *scores.get(&Bucket::Anthropic).unwrap_or(&0);
    let bedrock = *scores.get(&Bucket::Bedrock).unwrap_or(&0);
    let antigravity = *scores.get(&Bucket::Antigravity).unwrap_or(&0);
    let total = anthropic + bedrock + antigravity;

    // Deterministic tie-break: anthropic is the initial candidate, then
    // {bedrock, antigravity} are compared in that order, replacing only on
    // strict greater-than. This means bedrock wins ties against antigravity.
    let mut winner = Bucket::Anthropic;
    let mut max_score = anthropic;
    if bedrock > max_score {
        winner = Bucket::Bedrock;
        max_score = bedrock;
    }
    if antigravity > max_score {
        winner = Bucket::Antigravity;
        max_score = antigravity;
    }

    if total == 0 {
        if missing.count() > 0 {
            evidence.push("[!] 正面分数被缺失扣分抵消，判定为疑似伪装".to_string());
            return (Verdict::Suspicious, 0.0);
        }
        return (Verdict::Unknown, 0.0);
    }

    let confidence = round_two(max_score as f64 / total as f64);

    let verdict = match winner {
        Bucket::Anthropic => {
            if missing.count() >= 2 {
                evidence.push(format!("[!] {} 项 Anthropic 标记缺失，判定为疑似伪装", missing.count()));
                evidence.push(
                    "[!] relay 可以伪造部分特征，但无法伪造 inference_geo 或嵌套 cache_creation"
                        .to_string(),
                );
                Verdict::Suspicious
            } else {
                Verdict::Anthropic
            }
        }
        Bucket::Bedrock => Verdict::Bedrock,
        Bucket::Antigravity => Verdict::Antigravity,
    };

    (verdict, confidence)
}

/// Round half-away-from-zero to 2 decimal places, matching the reference
/// implementation's `round(x*100)/100`.
fn round_two(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{MsgIdFormat, ModelSource, ThinkingSigClass, ToolIdSource, UsageStyle};

    fn base_fp(probe_type: ProbeType) -> Fingerprint {
        Fingerprint::new(probe_type, "claude-sonnet-4-5")
    }

    #[test]
    fn s1_pure_anthropic() {
        let mut tool1 = base_fp(ProbeType::Tool);
        tool1.tool_id = "toolu_abc".to_string();
        tool1.tool_id_source = ToolIdSource::Anthropic;
        tool1.msg_id = "msg_abcdef".to_string();
        tool1.msg_id_source = MsgIdSource::Anthropic;
        tool1.msg_id_format = MsgIdFormat::Base62;
        tool1.has_service_tier = true;
        tool1.service_tier = "standard".to_string();
        tool1.has_inference_geo = true;
        tool1.inference_geo = "US".to_string();
        tool1.has_cache_creation_obj = true;

        let mut tool2 = tool1.clone();
        tool2.latency_ms = 50;

        let mut thinking = base_fp(ProbeType::Thinking);
        thinking.thinking_sig_len = 412;
        thinking.thinking_sig_class = ThinkingSigClass::Normal;

        let result = classify(&[tool1, tool2, thinking]);
        assert_eq!(result.verdict, Verdict::Anthropic);
        assert!(result.confidence >= 0.95, "confidence was {}", result.confidence);
    }

    #[test]
    fn s2_kiro_bedrock_relay() {
        let mut fp = base_fp(ProbeType::Tool);
        fp.tool_id = "tooluse_xyz".to_string();
        fp.tool_id_source = ToolIdSource::Bedrock;
        fp.model_returned = "kiro-sonnet-4".to_string();
        fp.model_source = ModelSource::Kiro;
        fp.usage_style = UsageStyle::CamelCase;

        let result = classify(&[fp]);
        assert_eq!(result.verdict, Verdict::Bedrock);
        assert!(result.evidence.iter().any(|e| e.contains("Kiro 逆向铁证")));
    }

    #[test]
    fn s3_vertex_antigravity() {
        let mut fp = base_fp(ProbeType::Tool);
        fp.tool_id = "tool_0".to_string();
        fp.tool_id_source = ToolIdSource::Vertex;
        fp.msg_id = "req_vrtx_abc".to_string();
        fp.msg_id_source = MsgIdSource::Vertex;

        let mut thinking = base_fp(ProbeType::Thinking);
        thinking.thinking_sig_class = ThinkingSigClass::Vertex;
        thinking.thinking_sig_len = 20;

        let result = classify(&[fp, thinking]);
        assert_eq!(result.verdict, Verdict::Antigravity);
        assert!(result.confidence >= 0.9, "confidence was {}", result.confidence);
    }

    #[test]
    fn s4_disguised_anthropic() {
        let mut fp1 = base_fp(ProbeType::Tool);
        fp1.tool_id = "toolu_abc".to_string();
        fp1.tool_id_source = ToolIdSource::Anthropic;
        fp1.msg_id = "msg_abc".to_string();
        fp1.msg_id_source = MsgIdSource::Anthropic;
        fp1.has_service_tier = true;
        fp1.service_tier = "standard".to_string();
        // inference_geo and cache_creation absent

        let thinking = base_fp(ProbeType::Thinking); // no signature at all

        let result = classify(&[fp1, thinking]);
        assert_eq!(result.verdict, Verdict::Suspicious);
        let joined = result.evidence.join(" | ");
        assert!(joined.contains("inference_geo"));
        assert!(joined.contains("cache_creation"));
        assert!(joined.contains("thinking"));
    }

    #[test]
    fn s5_attribution_correction() {
        let mut fp1 = base_fp(ProbeType::Tool);
        fp1.tool_id = "tooluse_1".to_string();
        fp1.tool_id_source = ToolIdSource::Bedrock;

        let mut fp2 = base_fp(ProbeType::Tool);
        fp2.tool_id = "tooluse_2".to_string();
        fp2.tool_id_source = ToolIdSource::Bedrock;

        let mut fp3 = base_fp(ProbeType::Thinking);
        fp3.msg_id = "req_vrtx_abc".to_string();
        fp3.msg_id_source = MsgIdSource::Vertex;

        let result = classify(&[fp1, fp2, fp3]);
        let antigravity = *result.scores.get(&Bucket::Antigravity).unwrap();
        let bedrock = *result.scores.get(&Bucket::Bedrock).unwrap();
        assert!(antigravity >= bedrock, "antigravity={antigravity} bedrock={bedrock}");
        assert!(result
            .evidence
            .iter()
            .any(|e| e.contains("[修正]") && e.contains("Bedrock 转移到 Antigravity")));
    }

    #[test]
    fn all_probes_failed_is_unknown() {
        let fp = Fingerprint::with_error(ProbeType::Simple, "claude-sonnet-4-5", "request failed");
        let result = classify(&[fp]);
        assert_eq!(result.verdict, Verdict::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert!(result.evidence.iter().any(|e| e == "所有探测均失败"));
    }

    #[test]
    fn scores_never_negative() {
        let mut fp = base_fp(ProbeType::Tool);
        fp.tool_id = "toolu_abc".to_string();
        fp.tool_id_source = ToolIdSource::Anthropic;
        let thinking = base_fp(ProbeType::Thinking);
        let result = classify(&[fp, thinking]);
        assert!(result.scores.values().all(|v| *v >= 0));
    }

    #[test]
    fn tie_break_prefers_bedrock_over_antigravity() {
        let mut scores = empty_scores();
        add(&mut scores, Bucket::Bedrock, 10);
        add(&mut scores, Bucket::Antigravity, 10);
        let missing = MissingFlags::default();
        let mut evidence = Vec::new();
        let (verdict, _) = pass_d_verdict(&scores, &missing, &mut evidence);
        assert_eq!(verdict, Verdict::Bedrock);
    }

    #[test]
    fn confidence_rounding() {
        assert_eq!(round_two(0.3333333), 0.33);
        assert_eq!(round_two(2.0 / 3.0), 0.67);
        assert_eq!(round_two(1.0), 1.0);
    }
}
