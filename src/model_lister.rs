// Remote model listing
//
// A thin, independent probe: GET <base>/v1/models, filter the returned ids
// to the Claude family. This is not part of the classifier pipeline, it
// exists so a caller can discover which model ids to hand to `detect`/`scan`
// without guessing.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::dialer::{check_host_safety, SafeResolver, UncheckedResolver};

const LIST_MODELS_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// Fetch `<base>/v1/models` and return the ids whose lowercased form
/// contains `claude`. `skip_ssrf` mirrors the detector's admin bypass.
pub async fn list_claude_models(base_url: &str, api_key: &str, skip_ssrf: bool) -> anyhow::Result<Vec<String>> {
    if !skip_ssrf {
        if let Some(host) = reqwest::Url::parse(base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
        {
            check_host_safety(&host)
                .await
                .map_err(|reason| anyhow::anyhow!(reason))?;
        }
    }

    let builder = Client::builder().connect_timeout(LIST_MODELS_TIMEOUT);
    let client = if skip_ssrf {
        builder.dns_resolver(std::sync::Arc::new(UncheckedResolver))
    } else {
        builder.dns_resolver(std::sync::Arc::new(SafeResolver))
    }
    .build()?;

    let url = format!("{}/v1/models", base_url.trim_end_matches('/'));
    let response = tokio::time::timeout(
        LIST_MODELS_TIMEOUT,
        client
            .get(&url)
            .header("authorization", format!("Bearer {api_key}"))
            .send(),
    )
    .await??;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("HTTP {}: model listing failed", status.as_u16());
    }

    let parsed: ModelsResponse = response.json().await?;
    Ok(parsed
        .data
        .into_iter()
        .map(|entry| entry.id)
        .filter(|id| id.to_lowercase().contains("claude"))
        .collect())
}
