//! Agent configuration.

use std::time::Duration;

/// Everything the agent needs to run.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// `host:port` of the collector server.
    pub server_addr: String,
    /// Cadence of the stat samplers.
    pub poll_interval: Duration,
    /// Cadence of flushes to the collector.
    pub report_interval: Duration,
    /// Maximum concurrent outbound flushes (worker pool size).
    pub rate_limit: usize,
    /// Payload signing key; `None` disables signing.
    pub signing_key: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8080".to_string(),
            poll_interval: Duration::from_secs(2),
            report_interval: Duration::from_secs(10),
            rate_limit: 5,
            signing_key: None,
        }
    }
}
