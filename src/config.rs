use std::time::Duration;

use bon::Builder;
use chrono::TimeDelta;

pub const DEFAULT_BASE_URL: &str = "https://smartmeter.netz-noe.at/orchestration";

/// Client settings. Every field has a default matching the production portal.
#[must_use]
#[derive(Clone, Debug, Builder)]
pub struct Config {
    /// Orchestration API root, with or without the trailing slash.
    #[builder(into, default = DEFAULT_BASE_URL.to_string())]
    pub base_url: String,

    /// Per-request timeout applied by the HTTP transport.
    #[builder(default = Duration::from_secs(30))]
    pub timeout: Duration,

    #[builder(into, default = concat!("noe-smartmeter/", env!("CARGO_PKG_VERSION")).to_string())]
    pub user_agent: String,

    /// Assumed session validity when the login response does not tell.
    #[builder(default = TimeDelta::minutes(10))]
    pub session_lifetime: TimeDelta,

    /// Sessions this close to their expiry are renewed before use.
    #[builder(default = TimeDelta::seconds(30))]
    pub expiry_margin: TimeDelta,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Config {
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }

    pub(crate) fn build_http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder().user_agent(&self.user_agent).timeout(self.timeout).build()
    }
}
