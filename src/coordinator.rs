// Orchestrates probe sequences, timeouts, availability checks, and
// multi-model scans. This is the only module that talks to the wire; every
// other module here is pure over already-extracted data.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, Url};
use tokio::time::timeout;

use crate::classifier::classify;
use crate::dialer::{check_host_safety, SafeResolver, UncheckedResolver};
use crate::fingerprint::{Fingerprint, ProbeType};
use crate::parser::{self, ProbeOutcome};
use crate::payload::{build_payload, probe_headers};
use crate::ratelimit::{self, RatelimitVerifyResult};
use crate::result::{DetectResult, ScanResult};

pub const MIN_ROUNDS: u32 = 1;
pub const MAX_ROUNDS: u32 = 3;
pub const DEFAULT_ROUNDS: u32 = 2;
pub const MAX_MODELS_PER_SCAN: usize = 6;

const TOOL_ROUND_DELAY: Duration = Duration::from_millis(300);
const MODEL_DELAY: Duration = Duration::from_millis(500);
const RATELIMIT_SHOT_DELAY: Duration = Duration::from_millis(300);

const SINGLE_DETECTION_DEADLINE: Duration = Duration::from_secs(120);
const SCAN_DEADLINE: Duration = Duration::from_secs(300);
const PROBE_TIMEOUT: Duration = Duration::from_secs(60);
const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(20);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RATELIMIT_SHOTS: usize = 4;

/// Default models probed by a scan request supplying an empty model list.
/// Opus models are excluded by the availability pre-check (see
/// `default_availability_model`), but a scan's actual detection targets
/// whatever the caller names here.
pub const DEFAULT_SCAN_MODELS: &[&str] = &[
    "claude-opus-4-6-thinking",
    "claude-opus-4-6-20250918",
    "claude-sonnet-4-5-20250929",
    "claude-haiku-4-5-20251001",
    "claude-3-5-sonnet-20241022",
    "claude-3-haiku-20240307",
];

pub fn clamp_rounds(rounds: u32) -> u32 {
    rounds.clamp(MIN_ROUNDS, MAX_ROUNDS)
}

pub fn clamp_models(models: &[String]) -> &[String] {
    let len = models.len().min(MAX_MODELS_PER_SCAN);
    &models[..len]
}

fn build_client(skip_ssrf: bool) -> anyhow::Result<Client> {
    let builder = Client::builder().connect_timeout(CONNECT_TIMEOUT);
    let builder = if skip_ssrf {
        builder.dns_resolver(Arc::new(UncheckedResolver))
    } else {
        builder.dns_resolver(Arc::new(SafeResolver))
    };
    Ok(builder.build()?)
}

/// Send one probe and reduce the outcome to a [`Fingerprint`]. `deadline`
/// bounds the whole call; if it has already passed, no request is sent.
async fn send_probe(
    client: &Client,
    base_url: &str,
    api_key: &str,
    probe_type: ProbeType,
    model: &str,
    deadline: Instant,
    per_probe_timeout: Duration,
) -> Option<Fingerprint> {
    if Instant::now() >= deadline {
        return None;
    }

    let started = Instant::now();
    let url = format!("{}/v1/messages", base_url.trim_end_matches('/'));
    let body = build_payload(probe_type, model);

    let mut request = client.post(&url).json(&body);
    for (name, value) in probe_headers(api_key) {
        request = request.header(name, value);
    }

    let remaining = deadline.saturating_duration_since(Instant::now());
    let effective_timeout = per_probe_timeout.min(remaining);

    let outcome = match timeout(effective_timeout, request.send()).await {
        Err(_elapsed) => ProbeOutcome::TimedOut,
        Ok(Err(_transport_err)) => ProbeOutcome::TransportError,
        Ok(Ok(response)) => {
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
            ProbeOutcome::Response { status, headers, body }
        }
    };

    let latency_ms = started.elapsed().as_millis() as u64;
    Some(parser::parse(probe_type, model, outcome, latency_ms))
}

/// `DetectSingle`: issue `rounds` tool probes then one thinking probe,
/// classify, and optionally verify rate-limit header accuracy.
pub async fn detect_single(
    base_url: &str,
    api_key: &str,
    model: &str,
    rounds: u32,
    skip_ssrf: bool,
    verify_ratelimit: bool,
) -> anyhow::Result<DetectResult> {
    if !skip_ssrf {
        if let Some(host) = Url::parse(base_url).ok().and_then(|u| u.host_str().map(str::to_string)) {
            if let Err(reason) = check_host_safety(&host).await {
                return Ok(unavailable_with_reason(model, &reason));
            }
        }
    }

    let client = build_client(skip_ssrf)?;
    let rounds = clamp_rounds(rounds);
    let deadline = Instant::now() + SINGLE_DETECTION_DEADLINE;

    let mut fingerprints = Vec::new();

    for round in 0..rounds {
        if round > 0 {
            tokio::time::sleep(TOOL_ROUND_DELAY).await;
        }
        if let Some(fp) = send_probe(&client, base_url, api_key, ProbeType::Tool, model, deadline, PROBE_TIMEOUT).await {
            fingerprints.push(fp);
        } else {
            break;
        }
    }

    if Instant::now() < deadline {
        if let Some(fp) = send_probe(&client, base_url, api_key, ProbeType::Thinking, model, deadline, PROBE_TIMEOUT).await {
            fingerprints.push(fp);
        }
    }

    let classified = classify(&fingerprints);

    let ratelimit_verify = if verify_ratelimit {
        verify_ratelimit_headers(&client, base_url, api_key, model, deadline).await
    } else {
        None
    };

    let mut evidence = classified.evidence;
    if let Some(ref rl) = ratelimit_verify {
        evidence.push(ratelimit::evidence_line(rl));
    }

    Ok(DetectResult {
        model: model.to_string(),
        verdict: classified.verdict,
        verdict_text: classified.verdict_text,
        confidence: classified.confidence,
        scores: classified.scores,
        evidence,
        fingerprints,
        avg_latency_ms: classified.avg_latency_ms,
        proxy_platform: classified.proxy_platform,
        platform_clues: classified.platform_clues,
        ratelimit_verify,
    })
}

async fn verify_ratelimit_headers(
    client: &Client,
    base_url: &str,
    api_key: &str,
    model: &str,
    deadline: Instant,
) -> Option<RatelimitVerifyResult> {
    let mut samples = Vec::new();

    for shot in 0..RATELIMIT_SHOTS {
        if shot > 0 {
            tokio::time::sleep(RATELIMIT_SHOT_DELAY).await;
        }
        let Some(fp) = send_probe(client, base_url, api_key, ProbeType::Simple, model, deadline, PROBE_TIMEOUT).await else {
            break;
        };
        if fp.is_valid() {
            if let Some(remaining) = fp.ratelimit_input_remaining {
                samples.push(remaining);
            }
        }
    }

    Some(ratelimit::decide(&samples))
}

/// `ScanMultiple`: sequential per-model availability checks and detections.
pub async fn scan_multiple(
    base_url: &str,
    api_key: &str,
    models: &[String],
    rounds: u32,
    skip_ssrf: bool,
) -> anyhow::Result<ScanResult> {
    let models = clamp_models(models);
    let rounds = clamp_rounds(rounds);
    let scan_deadline = Instant::now() + SCAN_DEADLINE;

    let mut model_results = Vec::with_capacity(models.len());

    for (i, model) in models.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(MODEL_DELAY).await;
        }

        if Instant::now() >= scan_deadline {
            model_results.push(DetectResult::unavailable(model));
            continue;
        }

        let available = check_availability(base_url, api_key, model, skip_ssrf, scan_deadline).await?;
        if !available {
            model_results.push(DetectResult::unavailable(model));
            continue;
        }

        let result = detect_single(base_url, api_key, model, rounds, skip_ssrf, false).await?;
        model_results.push(result);
    }

    Ok(ScanResult::from_results(base_url.to_string(), model_results))
}

/// Pre-scan availability check: a `simple` probe; HTTP 200 counts as
/// available. SSRF-blocked hosts are treated as unavailable rather than
/// surfacing a transport error, since the caller never sees a fingerprint.
async fn check_availability(
    base_url: &str,
    api_key: &str,
    model: &str,
    skip_ssrf: bool,
    scan_deadline: Instant,
) -> anyhow::Result<bool> {
    if !skip_ssrf {
        if let Some(host) = Url::parse(base_url).ok().and_then(|u| u.host_str().map(str::to_string)) {
            if check_host_safety(&host).await.is_err() {
                return Ok(false);
            }
        }
    }

    let client = build_client(skip_ssrf)?;
    let deadline = scan_deadline.min(Instant::now() + AVAILABILITY_TIMEOUT);
    let Some(fp) = send_probe(&client, base_url, api_key, ProbeType::Simple, model, deadline, AVAILABILITY_TIMEOUT).await else {
        return Ok(false);
    };
    Ok(fp.is_valid())
}

fn unavailable_with_reason(model: &str, reason: &str) -> DetectResult {
    let mut result = DetectResult::unavailable(model);
    result.evidence.push(reason.to_string());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_clamp_to_one_three() {
        assert_eq!(clamp_rounds(0), MIN_ROUNDS);
        assert_eq!(clamp_rounds(1), 1);
        assert_eq!(clamp_rounds(3), 3);
        assert_eq!(clamp_rounds(10), MAX_ROUNDS);
    }

    #[test]
    fn models_clamp_to_six() {
        let models: Vec<String> = (0..10).map(|i| format!("m{i}")).collect();
        let clamped = clamp_models(&models);
        assert_eq!(clamped.len(), MAX_MODELS_PER_SCAN);
        assert_eq!(clamped[0], "m0");
        assert_eq!(clamped[5], "m5");
    }

    #[tokio::test]
    async fn ssrf_blocked_target_yields_unavailable_with_reason() {
        let result = detect_single("http://127.0.0.1:1", "sk-test", "claude-sonnet-4-5", 1, false, false)
            .await
            .unwrap();
        assert_eq!(result.verdict, crate::classifier::Verdict::Unavailable);
        assert!(result
            .evidence
            .iter()
            .any(|e| e.contains("private IP") || e.contains("metadata")));
    }
}
