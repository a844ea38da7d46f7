// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use pacresolver::log::{init_logging, LogLevel};
use pacresolver::pac::DEFAULT_ENTRY_POINT;
use pacresolver::{Capability, PacResolver, ResolverConfig};
use url::Url;

/// Evaluate a proxy auto-config script for one or more destinations.
#[derive(Parser, Debug)]
#[command(name = "pacresolve")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// URL of the PAC document (http, https or file).
    #[arg(long = "pac", value_name = "URL")]
    pac_url: Url,

    /// Destinations to resolve.
    #[arg(required = true, value_name = "TARGET")]
    targets: Vec<String>,

    /// Name of the resolution function.
    #[arg(long, default_value = DEFAULT_ENTRY_POINT)]
    entry_point: String,

    /// Seconds to wait for the PAC document.
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Refuse DNS lookups from the script.
    #[arg(long)]
    no_dns: bool,

    /// Increase verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LogLevel::from_verbosity(cli.verbose));

    let mut config = ResolverConfig::new(cli.pac_url);
    config.entry_point = cli.entry_point;
    config.fetch_timeout_secs = cli.timeout;
    if cli.no_dns {
        config.capabilities.retain(|c| *c != Capability::ResolveHost);
    }

    let resolver = PacResolver::from_config(&config).context("Failed to create PAC resolver")?;
    resolver
        .preload()
        .with_context(|| format!("Failed to load PAC document {}", config.pac_url))?;

    for target in &cli.targets {
        match resolver.resolve_str(target) {
            Ok(Some(proxy)) => println!("Proxy for {} → {}", target, proxy),
            Ok(None) => println!("Proxy for {} → DIRECT (no proxy)", target),
            Err(e) => eprintln!("Error: {}", e),
        }
    }
    Ok(())
}
