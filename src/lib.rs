// src/lib.rs
//! Proxy auto-config (PAC) resolution.
//!
//! A [`PacResolver`] fetches a PAC document once, runs its
//! `FindProxyForURL(url, host)` function inside a capability-restricted
//! sandbox, and caches the answer per destination.
//!
//! ```no_run
//! use pacresolver::PacResolver;
//! use url::Url;
//!
//! let resolver = PacResolver::builder(Url::parse("http://wpad.example.com/wpad.dat")?).build()?;
//! match resolver.resolve_str("https://httpbin.org/ip")? {
//!     Some(proxies) => println!("{}", proxies), // "PROXY host:port; DIRECT"
//!     None => println!("no proxy"),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
pub mod config;
pub mod error;
pub mod log;
pub mod pac;

pub use config::ResolverConfig;
pub use error::{FetchError, PacError, PacResult};
pub use pac::{
    Capability, ContentLoader, ErrorReporter, ExitHook, HttpContentLoader, MemoryCache,
    PacEvaluator, PacResolver, ReentrancyGuard, ResolutionResult, ResultCache,
    SandboxPolicy, SandboxedEvaluator,
};

use tracing::info;
use url::Url;

/// Evaluates the PAC document at `pac_url` for a single destination.
///
/// Unlike a long-lived [`PacResolver`], a document that cannot be fetched is
/// returned as an error instead of terminating the process.
pub fn find_proxy_for_url(pac_url: &str, url: &str) -> PacResult<ResolutionResult> {
    let resolver = PacResolver::builder(Url::parse(pac_url)?).build()?;
    resolver.preload()?;

    let result = resolver.resolve_str(url)?;
    info!("PAC resolved proxy for {}: {:?}", url, result);
    Ok(result)
}
