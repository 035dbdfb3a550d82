use config::ConfigError;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;

use crate::oracle::FeedRegistry;
use crate::settlement::ScheduleConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub rpc_primary: String,
    pub rpc_fallback: Option<String>,
    pub program_id: Pubkey,
    pub usdc_mint: Pubkey,
    pub hmac_secret: String,
    pub non_custodial: bool,
    pub signer_keypair_path: Option<String>,
    pub web_api_url: String,
    pub oracle_feeds: FeedRegistry,
    pub schedule: ScheduleConfig,
    pub webhook_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let hmac_secret = get("HMAC_SECRET")
            .ok_or_else(|| ConfigError::NotFound("HMAC_SECRET".to_string()))?;

        let oracle_feeds = FeedRegistry::parse(&get_or("ORACLE_FEEDS", ""))
            .map_err(|e| ConfigError::Message(format!("ORACLE_FEEDS: {}", e)))?;

        let non_custodial = match get_or("NON_CUSTODIAL", "true").to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            other => {
                return Err(ConfigError::Message(format!(
                    "NON_CUSTODIAL must be a boolean, got '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            bind_address: get_or("BIND_ADDRESS", "0.0.0.0:8080"),
            rpc_primary: get_or("RPC_PRIMARY", "https://api.devnet.solana.com"),
            rpc_fallback: get("RPC_FALLBACK"),
            program_id: pubkey(
                "PROGRAM_ID",
                &get_or("PROGRAM_ID", "11111111111111111111111111111111"),
            )?,
            usdc_mint: pubkey(
                "USDC_MINT",
                &get_or("USDC_MINT", "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"),
            )?,
            hmac_secret,
            non_custodial,
            signer_keypair_path: get("SIGNER_KEYPAIR_PATH"),
            web_api_url: get_or("WEB_API_URL", "http://localhost:3000"),
            oracle_feeds,
            schedule: ScheduleConfig {
                expiry_scan: seconds("EXPIRY_SCAN_SECS", get("EXPIRY_SCAN_SECS"), 60)?,
                retry_queue: seconds("RETRY_QUEUE_SECS", get("RETRY_QUEUE_SECS"), 30)?,
                funding_watch: seconds("FUNDING_WATCH_SECS", get("FUNDING_WATCH_SECS"), 10)?,
            },
            webhook_timeout: seconds("WEBHOOK_TIMEOUT_SECS", get("WEBHOOK_TIMEOUT_SECS"), 10)?,
        })
    }
}

fn pubkey(key: &str, value: &str) -> Result<Pubkey, ConfigError> {
    Pubkey::from_str(value.trim())
        .map_err(|e| ConfigError::Message(format!("{} is not a valid public key: {}", key, e)))
}

fn seconds(key: &str, value: Option<String>, default: u64) -> Result<Duration, ConfigError> {
    let secs = match value {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::Message(format!("{} must be a whole number", key)))?,
        None => default,
    };
    if secs == 0 {
        return Err(ConfigError::Message(format!("{} must be positive", key)));
    }
    Ok(Duration::from_secs(secs))
}
