use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use log::info;
use std::sync::Arc;
use std::time::Duration;

use statusline_daemon::adapters::billing::BillingCollector;
use statusline_daemon::adapters::claude_usage::{ClaudeAccountAdapter, ClaudeUsageCollector, SystemClock};
use statusline_daemon::adapters::infra::InfraCollector;
use statusline_daemon::adapters::sysmetrics::{OsSysSource, SysMetricsCollector};
use statusline_daemon::adapters::tailscale::TailscaleAdapter;
use statusline_daemon::cache::CacheStore;
use statusline_daemon::cli::Args;
use statusline_daemon::config::{resolve_credential, DaemonConfig};
use statusline_daemon::daemon::Daemon;
use statusline_daemon::model::{CollectResult, CollectedData};
use statusline_daemon::reader::Reader;
use statusline_daemon::registry::Registry;
use statusline_daemon::scheduler::HealthReport;

const BINARY_NAME: &str = "statusline-daemon";
const TAILSCALE_API_KEY_ENV: &str = "TAILSCALE_API_KEY";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.health {
        return run_health_command(&args);
    }

    if args.daemon {
        return run_daemon_command(&args).await;
    }

    eprintln!("{}", "no action given; pass --daemon or --health (see --help)".bright_yellow());
    std::process::exit(2);
}

async fn run_daemon_command(args: &Args) -> Result<()> {
    let config = DaemonConfig::load(args.config.as_deref())?;
    let cache_dir = config.cache_dir();
    let pid_path = cache_dir.join(format!("{BINARY_NAME}.pid"));
    let tick_interval = config.tick_interval();

    let config = Arc::new(config);
    let registry_factory: statusline_daemon::daemon::RegistryFactory = Box::new(move |cache| build_registry(&config, cache));

    let daemon = Daemon::new(cache_dir, pid_path, registry_factory, tick_interval);
    info!("starting {BINARY_NAME}");
    daemon.run().await?;
    Ok(())
}

/// Wires every configured collector into a fresh `Registry`. Runs once, just
/// after the cache directory is confirmed usable and before the PID file is
/// written, so `SysMetricsCollector` can reload its ring buffers from the
/// previous run's cached blob.
fn build_registry(config: &DaemonConfig, cache: &CacheStore) -> Registry {
    let mut registry = Registry::new();

    registry.register(Arc::new(BillingCollector {
        civo: config.civo.clone(),
        digitalocean: config.digitalocean.clone(),
        aws: config.aws.clone(),
        dreamhost: config.dreamhost.clone(),
        cache_dir: config.cache_dir(),
        interval: config.billing_interval(),
    }));

    let tailscale = config.tailnet.clone().map(|tailnet| {
        let api_key = resolve_credential(TAILSCALE_API_KEY_ENV);
        TailscaleAdapter::new(tailnet, api_key, config.tailscale_cli_fallback)
    });
    registry.register(Arc::new(InfraCollector {
        tailscale,
        kubernetes_contexts: config.kubernetes_contexts.clone(),
        interval: config.infra_interval(),
    }));

    let accounts: Vec<ClaudeAccountAdapter> = config
        .claude_accounts
        .iter()
        .filter_map(|acct| match resolve_credential(&acct.api_key_env) {
            Some(key) => Some(ClaudeAccountAdapter::new(acct.name.clone(), key, Arc::new(SystemClock))),
            None => {
                log::warn!("claude_usage: account {} missing credential {}", acct.name, acct.api_key_env);
                None
            }
        })
        .collect();
    registry.register(Arc::new(ClaudeUsageCollector {
        accounts,
        interval: config.claude_usage_interval(),
    }));

    let seed = match cache.get_with_freshness::<CollectResult>("sysmetrics", Duration::MAX) {
        statusline_daemon::cache::CacheResult::Fresh(r) | statusline_daemon::cache::CacheResult::Stale(r) => match r.data {
            CollectedData::SysMetrics(m) => Some(m),
            _ => None,
        },
        statusline_daemon::cache::CacheResult::Miss => None,
    };
    registry.register(Arc::new(SysMetricsCollector::new(Box::new(OsSysSource), seed, config.sysmetrics_interval())));

    registry
}

fn run_health_command(args: &Args) -> Result<()> {
    let config = DaemonConfig::load(args.config.as_deref())?;
    let reader = Reader::open(config.cache_dir())?;
    let stale_after = config.sysmetrics_interval().max(config.infra_interval()).max(config.billing_interval()) * 2;

    let Some(health) = reader.health() else {
        if args.json {
            println!("{}", serde_json::json!({"status": "missing"}));
        } else {
            println!("{}", "health.json: missing (daemon never ran, or cache directory is empty)".bright_red());
        }
        std::process::exit(1);
    };

    let age = chrono::Utc::now().signed_duration_since(health.last_poll);
    let is_stale = age.to_std().map(|a| a > stale_after).unwrap_or(true);

    if args.json {
        print_health_json(&health, is_stale);
    } else {
        print_health_text(&health, is_stale);
    }

    if is_stale {
        std::process::exit(1);
    }
    Ok(())
}

fn print_health_json(health: &HealthReport, is_stale: bool) {
    let status = if is_stale { "stale" } else { health.status.as_str() };
    println!(
        "{}",
        serde_json::json!({
            "status": status,
            "last_poll": health.last_poll,
            "collectors": health.collectors,
        })
    );
}

fn print_health_text(health: &HealthReport, is_stale: bool) {
    if is_stale {
        println!("{}", format!("stale: last poll {}", health.last_poll.to_rfc3339()).bright_red().bold());
    } else {
        println!("{}", "ok".bright_green().bold());
    }
    println!("last poll: {}", health.last_poll.to_rfc3339());
    let mut names: Vec<&String> = health.collectors.keys().collect();
    names.sort();
    for name in names {
        let status = &health.collectors[name];
        let colored_status = if status == "ok" { status.bright_green() } else { status.bright_red() };
        println!("  {name}: {colored_status}");
    }
}
