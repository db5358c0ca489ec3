// Configuration module
// Loads and validates configuration from CLI args, environment variables, and defaults,
// in that priority order, the same layering the rest of this codebase's lineage uses.

use anyhow::Result;
use clap::Parser;

use crate::coordinator::DEFAULT_SCAN_MODELS;

#[derive(Parser, Debug)]
#[command(author, version, about = "Proxy-origin fingerprinter for Anthropic-compatible endpoints", long_about = None)]
pub struct CliArgs {
    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Default public base URL used for non-admin detections regardless of
    /// what `base_url` the request supplies.
    #[arg(long, env = "DEFAULT_BASE_URL")]
    pub default_base_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub log_level: String,

    /// Non-admin callers always have `base_url` overridden to this address.
    pub default_base_url: String,

    /// The key admin callers must present to bypass the SSRF filter and the
    /// public-base-url override. Stubbed: there is no user/role backend here,
    /// only a single shared credential, matching the minimal binding layer
    /// this detector is specified to ship.
    pub admin_key: Option<String>,

    /// Models probed by a scan request that supplies an empty model list.
    pub default_scan_models: Vec<String>,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();

        let config = Config {
            server_host: args
                .host
                .or_else(|| std::env::var("SERVER_HOST").ok())
                .unwrap_or_else(|| "0.0.0.0".to_string()),

            server_port: args
                .port
                .or_else(|| std::env::var("SERVER_PORT").ok().and_then(|s| s.parse().ok()))
                .unwrap_or(8080),

            log_level: args
                .log_level
                .or_else(|| std::env::var("LOG_LEVEL").ok())
                .unwrap_or_else(|| "info".to_string()),

            default_base_url: args
                .default_base_url
                .or_else(|| std::env::var("DEFAULT_BASE_URL").ok())
                .unwrap_or_else(|| "https://api.anthropic.com".to_string()),

            admin_key: std::env::var("ADMIN_KEY").ok().filter(|k| !k.is_empty()),

            default_scan_models: DEFAULT_SCAN_MODELS.iter().map(|s| s.to_string()).collect(),
        };

        Ok(config)
    }

    /// Validate configuration. `default_base_url` must parse as an
    /// http(s) URL with a non-empty host, the same rule applied to
    /// caller-supplied `base_url`s (see `routes::validate_base_url`).
    pub fn validate(&self) -> Result<()> {
        crate::routes::validate_base_url(&self.default_base_url)
            .map_err(|e| anyhow::anyhow!("DEFAULT_BASE_URL is invalid: {e}"))?;
        Ok(())
    }
}
