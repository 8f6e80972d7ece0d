//! tier-cache: interactive shell over a two-tier cache.
//!
//! Reads commands from stdin, one per line:
//!   get <key> | set <key> <value> [ttl_secs] | setnx ... | setxx ...
//!   del <key> | has <key> | stats | metrics | quit

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use tier_cache::cache::{Cache, Options};
use tier_cache::config::{CacheConfig, Cli};
use tier_cache::registry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "tier_cache=debug"
    } else {
        "tier_cache=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("tier-cache v{}", env!("CARGO_PKG_VERSION"));

    let config = CacheConfig::load(&cli.config)?;
    info!(
        driver = %config.driver_name,
        local_size = config.local.size,
        local_ttl_secs = config.local.ttl_secs,
        remote = config.remote.enabled,
        "Configuration loaded"
    );

    let cache = Cache::from_config(&config, registry::global())?;

    if config.remote.enabled {
        cache
            .ping()
            .await
            .with_context(|| format!("Redis at {} is unreachable", config.remote.url))?;
        info!(url = %config.remote.url, "Redis reachable");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }
        if matches!(words[0], "quit" | "exit") {
            break;
        }

        let reply = match run(&cache, &words).await {
            Ok(reply) => reply,
            Err(err) => format!("error: {err}"),
        };
        stdout.write_all(reply.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    info!("Shutting down");
    Ok(())
}

async fn run(cache: &Cache, words: &[&str]) -> anyhow::Result<String> {
    match words {
        ["get", key] => {
            let mut value = String::new();
            match cache.get(key, &mut value, &Options::new()).await {
                Ok(()) => Ok(value),
                Err(err) if err.is_not_found() => Ok("(miss)".to_string()),
                Err(err) => Err(err.into()),
            }
        }
        [cmd @ ("set" | "setnx" | "setxx"), key, value, rest @ ..] => {
            let mut opts = Options::new();
            if let [ttl] = rest {
                let secs: u64 = ttl.parse().context("ttl must be whole seconds")?;
                opts = opts.with_ttl(Duration::from_secs(secs));
            }
            opts = match *cmd {
                "setnx" => opts.with_set_nx(),
                "setxx" => opts.with_set_xx(),
                _ => opts,
            };
            cache.set(key, &value.to_string(), &opts).await?;
            Ok("OK".to_string())
        }
        ["del", key] => {
            cache.del(key).await?;
            Ok("OK".to_string())
        }
        ["has", key] => Ok(cache.has(key, &Options::new()).await.to_string()),
        ["stats"] => Ok(match cache.stats() {
            Some(stats) => format!(
                "hits={} misses={} hit_rate={:.2}",
                stats.hits,
                stats.misses,
                stats.hit_rate()
            ),
            None => "stats disabled".to_string(),
        }),
        ["metrics"] => match cache.metrics() {
            Some(metrics) => Ok(metrics.encode()?),
            None => Ok("metrics unavailable".to_string()),
        },
        _ => Ok(format!("unknown command: {}", words.join(" "))),
    }
}
