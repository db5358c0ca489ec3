// Per-model and multi-model detection results
//
// DetectResult and ScanResult are immutable value records: nothing here
// mutates after construction, and nothing is shared across detections.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::classifier::{Bucket, Verdict};
use crate::fingerprint::Fingerprint;
use crate::ratelimit::RatelimitVerifyResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResult {
    pub model: String,
    pub verdict: Verdict,
    pub verdict_text: String,
    pub confidence: f64,
    pub scores: BTreeMap<Bucket, i64>,
    pub evidence: Vec<String>,
    pub fingerprints: Vec<Fingerprint>,
    pub avg_latency_ms: u64,
    pub proxy_platform: Option<String>,
    pub platform_clues: Vec<String>,
    pub ratelimit_verify: Option<RatelimitVerifyResult>,
}

impl DetectResult {
    /// A result for a model that failed the pre-scan availability check.
    /// Per the unavailability-purity invariant: no fingerprints, all
    /// scores zero, no evidence.
    pub fn unavailable(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            verdict: Verdict::Unavailable,
            verdict_text: Verdict::Unavailable.label().to_string(),
            confidence: 0.0,
            scores: BTreeMap::new(),
            evidence: Vec::new(),
            fingerprints: Vec::new(),
            avg_latency_ms: 0,
            proxy_platform: None,
            platform_clues: Vec::new(),
            ratelimit_verify: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub base_url: String,
    pub proxy_platform: Option<String>,
    pub model_results: Vec<DetectResult>,
    pub summary: BTreeMap<String, Verdict>,
    pub is_mixed: bool,
}

impl ScanResult {
    pub fn from_results(base_url: String, model_results: Vec<DetectResult>) -> Self {
        let proxy_platform = model_results
            .iter()
            .find_map(|r| r.proxy_platform.clone());

        let summary = model_results
            .iter()
            .map(|r| (r.model.clone(), r.verdict))
            .collect();

        let distinct_verdicts: std::collections::HashSet<Verdict> = model_results
            .iter()
            .filter(|r| r.verdict != Verdict::Unavailable)
            .map(|r| r.verdict)
            .collect();
        let is_mixed = distinct_verdicts.len() > 1;

        Self {
            base_url,
            proxy_platform,
            model_results,
            summary,
            is_mixed,
        }
    }
}
