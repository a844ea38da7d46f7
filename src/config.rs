//! Resolver configuration.
//!
//! The host application owns where this comes from; the resolver only needs
//! the deserialized value.

use crate::pac::policy::{Capability, EvaluationLimits, SandboxPolicy};
use crate::pac::resolver::DEFAULT_ENTRY_POINT;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Settings for a [`PacResolver`](crate::PacResolver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolverConfig {
    /// Location of the PAC document.
    pub pac_url: Url,

    /// Name of the resolution function.
    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    /// Transport timeout for the document fetch.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Lifetime of cached results, `0` keeps them forever.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Host operations granted to the script.
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<Capability>,

    #[serde(default)]
    pub limits: EvaluationLimits,
}

fn default_entry_point() -> String {
    DEFAULT_ENTRY_POINT.to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_cache_ttl_secs() -> u64 {
    15 * 60
}

fn default_capabilities() -> Vec<Capability> {
    Capability::ALL.to_vec()
}

impl ResolverConfig {
    pub fn new(pac_url: Url) -> Self {
        Self {
            pac_url,
            entry_point: default_entry_point(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            capabilities: default_capabilities(),
            limits: EvaluationLimits::default(),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        match self.cache_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn policy(&self) -> SandboxPolicy {
        SandboxPolicy::with_capabilities(self.capabilities.iter().copied()).limits(self.limits)
    }
}
