// Rate-limit header forgery detection
//
// A relay that wants to look like the real Anthropic API can trivially copy
// a fixed `anthropic-ratelimit-input-tokens-remaining` value into every
// response. A real upstream's counter decreases (non-strictly monotonically)
// as tokens are consumed. Sampling it across a handful of cheap probes tells
// the two apart.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatelimitVerdict {
    Dynamic,
    Static,
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatelimitVerifyResult {
    pub verdict: RatelimitVerdict,
    pub detail: String,
    pub samples: Vec<i64>,
}

/// Decide dynamic/static/unavailable from a sequence of observed
/// `remaining` samples, in probe order.
pub fn decide(samples: &[i64]) -> RatelimitVerifyResult {
    if samples.len() < 2 {
        return RatelimitVerifyResult {
            verdict: RatelimitVerdict::Unavailable,
            detail: "ratelimit header unavailable (insufficient samples)".to_string(),
            samples: samples.to_vec(),
        };
    }

    let all_equal = samples.windows(2).all(|w| w[0] == w[1]);
    if all_equal {
        return RatelimitVerifyResult {
            verdict: RatelimitVerdict::Static,
            detail: format!("remaining held fixed at {}, likely forged", samples[0]),
            samples: samples.to_vec(),
        };
    }

    let monotone_non_increasing = samples.windows(2).all(|w| w[0] >= w[1]);
    let total_drop = samples.first().copied().unwrap_or(0) - samples.last().copied().unwrap_or(0);

    if monotone_non_increasing && total_drop > 0 {
        return RatelimitVerifyResult {
            verdict: RatelimitVerdict::Dynamic,
            detail: format!("remaining decreased monotonically, {total_drop} consumed, consistent with a real counter"),
            samples: samples.to_vec(),
        };
    }

    RatelimitVerifyResult {
        verdict: RatelimitVerdict::Dynamic,
        detail: "remaining varied non-monotonically; weak signal but no forgery evidence".to_string(),
        samples: samples.to_vec(),
    }
}

/// One summary evidence line, appended to a `DetectResult`'s evidence after
/// the verifier runs.
pub fn evidence_line(result: &RatelimitVerifyResult) -> String {
    format!("[ratelimit verify] {:?}: {}", result.verdict, result.detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_samples() {
        let result = decide(&[1000]);
        assert_eq!(result.verdict, RatelimitVerdict::Unavailable);
    }

    #[test]
    fn s6_all_equal_is_static() {
        let result = decide(&[50000, 50000, 50000, 50000]);
        assert_eq!(result.verdict, RatelimitVerdict::Static);
        assert!(result.detail.contains("forged"));
    }

    #[test]
    fn monotone_decreasing_is_dynamic() {
        let result = decide(&[400000, 399500, 399100, 398700]);
        assert_eq!(result.verdict, RatelimitVerdict::Dynamic);
        assert!(result.detail.contains("real counter"));
    }

    #[test]
    fn non_monotonic_is_still_dynamic_but_weaker() {
        let result = decide(&[399000, 400000, 398000, 399500]);
        assert_eq!(result.verdict, RatelimitVerdict::Dynamic);
        assert!(result.detail.contains("non-monotonically"));
    }

    #[test]
    fn flat_then_no_drop_is_static_not_dynamic() {
        // all equal takes precedence even though non-increasing is also true
        let result = decide(&[1000, 1000]);
        assert_eq!(result.verdict, RatelimitVerdict::Static);
    }
}
