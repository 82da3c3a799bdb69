use std::env;
use std::time::Duration;

use serde::Deserialize;
use utxo_core::{Amount, Network, Variant};

pub const DEFAULT_GATEWAY_URL: &str = "http://206.189.83.88:5000";
pub const DEFAULT_LOCAL_URL: &str = "http://0.0.0.0:5000";
pub const DEFAULT_FEE_SOURCE_URL: &str = "https://bitcoinfees.earn.com/api/v1/fees/recommended";

/// Fee quotes older than this are refreshed.
pub const DEFAULT_FEE_TTL: Duration = Duration::from_secs(30 * 60);

/// Returned by the fee oracle when no quote can be obtained.
pub const DEFAULT_FALLBACK_FEE: Amount = Amount::from_sat(10_000);

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Where the gateway and the fee source live, and how to talk to them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Public gateway host, without the `/<chain>/<network>` suffix.
    pub url: String,
    /// Host used for `Localnet` networks.
    pub local_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Upper bound for a single HTTP request.
    pub request_timeout_secs: u64,
    pub fee_source_url: String,
    pub fee_ttl_secs: u64,
    pub fallback_fee: Amount,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            url: DEFAULT_GATEWAY_URL.into(),
            local_url: DEFAULT_LOCAL_URL.into(),
            username: None,
            password: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            fee_source_url: DEFAULT_FEE_SOURCE_URL.into(),
            fee_ttl_secs: DEFAULT_FEE_TTL.as_secs(),
            fallback_fee: DEFAULT_FALLBACK_FEE,
        }
    }
}

impl GatewayConfig {
    /// Defaults, overridden by `GATEWAY_URL`, `GATEWAY_LOCAL_URL`,
    /// `GATEWAY_USER`, `GATEWAY_PASSWORD` and `FEE_SOURCE_URL` when set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = GatewayConfig::default();
        if let Some(url) = lookup("GATEWAY_URL") {
            config.url = url;
        }
        if let Some(url) = lookup("GATEWAY_LOCAL_URL") {
            config.local_url = url;
        }
        if let Some(user) = lookup("GATEWAY_USER") {
            config.username = Some(user);
        }
        if let Some(password) = lookup("GATEWAY_PASSWORD") {
            config.password = Some(password);
        }
        if let Some(url) = lookup("FEE_SOURCE_URL") {
            config.fee_source_url = url;
        }
        config
    }

    /// Gateway URL serving `network`.
    pub fn endpoint(&self, network: Network) -> String {
        let chain = network.chain().code();
        match network.variant() {
            Variant::Mainnet => format!("{}/{chain}/mainnet", self.url.trim_end_matches('/')),
            Variant::Testnet => format!("{}/{chain}/testnet", self.url.trim_end_matches('/')),
            Variant::Localnet => format!("{}/{chain}/testnet", self.local_url.trim_end_matches('/')),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn fee_ttl(&self) -> Duration {
        Duration::from_secs(self.fee_ttl_secs)
    }
}
