//! Capabilities granted to PAC scripts.
//!
//! A PAC script can only reach the host through native functions the
//! evaluator registers. The policy decides which of those are real and which
//! are refusal stubs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A host operation a PAC script may be allowed to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// DNS name resolution (`dnsResolve`, `isResolvable`, `isInNet` on names).
    ResolveHost,
    /// Discovering the local interface address (`myIpAddress`).
    LocalAddress,
    /// Reading the current time and local time zone (`weekdayRange`, `dateRange`, `timeRange`).
    Clock,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::ResolveHost,
        Capability::LocalAddress,
        Capability::Clock,
    ];
}

/// Interpreter limits applied to every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EvaluationLimits {
    pub loop_iteration_limit: u64,
    pub recursion_limit: usize,
    pub stack_size_limit: usize,
}

impl Default for EvaluationLimits {
    fn default() -> Self {
        Self {
            loop_iteration_limit: 1_000_000,
            recursion_limit: 256,
            stack_size_limit: 1024 * 1024,
        }
    }
}

/// Explicit set of operations a PAC script may perform.
///
/// Anything not enumerated is denied: there is no ambient access to files,
/// processes, sockets or module loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxPolicy {
    capabilities: BTreeSet<Capability>,
    limits: EvaluationLimits,
}

impl SandboxPolicy {
    /// A policy that grants nothing.
    pub fn deny_all() -> Self {
        Self {
            capabilities: BTreeSet::new(),
            limits: EvaluationLimits::default(),
        }
    }

    pub fn with_capabilities<I>(capabilities: I) -> Self
    where
        I: IntoIterator<Item = Capability>,
    {
        Self {
            capabilities: capabilities.into_iter().collect(),
            limits: EvaluationLimits::default(),
        }
    }

    pub fn allow(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn revoke(mut self, capability: Capability) -> Self {
        self.capabilities.remove(&capability);
        self
    }

    pub fn limits(mut self, limits: EvaluationLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn permits(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.capabilities.iter().copied()
    }

    pub fn evaluation_limits(&self) -> EvaluationLimits {
        self.limits
    }
}

impl Default for SandboxPolicy {
    /// What standard PAC helpers need: name resolution, the local address and the clock.
    fn default() -> Self {
        Self::with_capabilities(Capability::ALL)
    }
}
