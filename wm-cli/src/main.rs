//! `wmirror`: loads an [`wm_config::EngineConfig`] from a TOML file and
//! runs a mirroring crawl to completion, exiting with spec.md §4.10's
//! severity code.

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wm_config::{EngineConfig, VerifyModeConfig};
use wm_engine::{Engine, FsWriter, Processor, ProcessorConfig};
use wm_frontier::{FilterChain, LevelFilter, SchemeFilter, SpanHostsFilter, Statistics, TriesFilter, UrlTable};
use wm_net::{ConnectionPool, ConnectionPoolConfig, ProxyConfig, VerifyMode};
use wm_robots::RobotsChecker;
use wm_scrape::DefaultScraper;
use wm_types::UrlRecord;
use wm_web::{WebClient, WebClientConfig};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn verify_mode(config: VerifyModeConfig) -> VerifyMode {
    match config {
        VerifyModeConfig::Full => VerifyMode::Full,
        VerifyModeConfig::None => VerifyMode::None,
    }
}

/// Seeds come from the config file if it names any, otherwise one URL
/// per line on stdin (SPEC_FULL §10.3).
fn read_seeds(config: &EngineConfig) -> Result<Vec<String>> {
    if !config.seeds.is_empty() {
        return Ok(config.seeds.clone());
    }

    let stdin = std::io::stdin();
    let mut seeds = Vec::new();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read seed URL from stdin")?;
        let line = line.trim();
        if !line.is_empty() {
            seeds.push(line.to_string());
        }
    }
    Ok(seeds)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config_path = std::env::args().nth(1).context("usage: wmirror <config.toml>")?;
    let config = EngineConfig::load(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;

    let seeds = read_seeds(&config)?;
    if seeds.is_empty() {
        anyhow::bail!("no seed URLs: set `seeds` in the config file or pipe them on stdin");
    }

    let seed_hosts: Vec<String> = seeds
        .iter()
        .filter_map(|s| url::Url::parse(s).ok())
        .filter_map(|u| u.host_str().map(str::to_string))
        .collect();

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("failed to create output directory {}", config.output_dir.display()))?;

    let table = UrlTable::open(&config.output_dir.join("wmirror.db")).context("failed to open URL table")?;
    table
        .add_many(seeds.into_iter().map(UrlRecord::seed))
        .context("failed to seed URL table")?;

    let proxy = config.proxy.as_ref().map(|p| ProxyConfig {
        host: p.host.clone(),
        port: p.port,
        credentials: p.username.clone().zip(p.password.clone()),
    });

    let http_pool = Arc::new(ConnectionPool::new(ConnectionPoolConfig {
        max_count: config.max_count,
        max_host_count: config.max_host_count,
        connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        read_timeout: Duration::from_secs(config.read_timeout_secs),
        write_timeout: Duration::from_secs(config.write_timeout_secs),
        happy_eyeballs_ttl: Duration::from_secs(config.happy_eyeballs_ttl_secs),
        verify_mode: verify_mode(config.verify_mode),
        proxy,
    }));

    let ftp_pool = ConnectionPool::new(ConnectionPoolConfig {
        max_count: config.max_count,
        max_host_count: config.max_host_count,
        connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        read_timeout: Duration::from_secs(config.read_timeout_secs),
        write_timeout: Duration::from_secs(config.write_timeout_secs),
        happy_eyeballs_ttl: Duration::from_secs(config.happy_eyeballs_ttl_secs),
        verify_mode: VerifyMode::Full,
        proxy: None,
    });

    let web = WebClient::new(
        http_pool,
        WebClientConfig {
            max_redirects: config.max_redirects,
            keep_alive: config.keep_alive,
            spill_threshold: config.spill_threshold_bytes,
        },
    );

    let robots = if config.robots {
        Some(RobotsChecker::new(
            &web,
            config.user_agent.clone(),
            Duration::from_secs(config.robots_fetch_timeout_secs),
        ))
    } else {
        None
    };

    // When span_hosts is off and the config doesn't name an explicit
    // allow-list, restrict the crawl to the seeds' own hosts.
    let span_hosts_allowed = if config.span_hosts || !config.allowed_hosts.is_empty() {
        config.allowed_hosts.clone()
    } else {
        seed_hosts
    };

    // Without -r-style recursion, only the seeds themselves are fetched,
    // except page requisites (images/scripts/stylesheets) one level deep.
    let max_level = if !config.recursive {
        if config.page_requisites { Some(1) } else { Some(0) }
    } else {
        config.level
    };

    let filters = FilterChain::new()
        .with(SchemeFilter { allowed: config.allowed_schemes.clone() })
        .with(TriesFilter { max_tries: config.tries })
        .with(SpanHostsFilter { allowed_hosts: span_hosts_allowed })
        .with(LevelFilter { max_level });

    let scraper = DefaultScraper;
    let writer = FsWriter::new(config.output_dir.join("mirror"));
    let stats = Statistics::new();

    let processor_config = ProcessorConfig {
        user_agent: config.user_agent.clone(),
        compression: config.compression,
        robots_enabled: config.robots,
        duration_timeout: config.duration_timeout_secs.map(Duration::from_secs),
        retry_connrefused: config.retry_connrefused,
        retry_dns_error: config.retry_dns_error,
        waiter_base: Duration::from_millis(config.waiter_base_millis),
        waiter_max: Duration::from_millis(config.waiter_max_millis),
        ftp_user: None,
        ftp_pass: None,
        spill_threshold: config.spill_threshold_bytes,
    };

    let processor = Processor::new(
        &table,
        &filters,
        &web,
        &ftp_pool,
        robots.as_ref(),
        &scraper,
        &writer,
        &stats,
        processor_config,
    );

    let engine = Engine::new(&table, &processor, &stats, config.concurrency, max_level, config.tries);
    let exit_code = engine.run().await;

    tracing::info!(
        files = stats.files(),
        bytes = stats.bytes(),
        elapsed = ?stats.elapsed(),
        exit_code,
        "crawl finished"
    );

    std::process::exit(exit_code.into());
}
