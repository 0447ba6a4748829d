mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use nostr::{Event, JsonUtil};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, QueryArgs};
use relay_router::{
    load_router_config_with_preset, select_publish_relays, select_query_relays, Config,
    NostrSdkTransport, RelayQueryRouter, RouterConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Default: debug for the router, only warnings from the relay pool internals
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("relay_router=debug,nostr_relay_pool=warn,nostr_sdk=info")
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    write_default_config_if_missing(&cli.config).await?;
    let router_config =
        Arc::unwrap_or_clone(load_router_config_with_preset(&cli.config, cli.preset.as_deref()).await);

    info!("Configuration loaded:");
    info!("  Relays: {:?}", router_config.relays().iter().map(|u| u.to_string()).collect::<Vec<_>>());
    info!("  Active relay: {}", router_config.active_relay());
    info!("  Max relays: {}", router_config.max_relays());

    match cli.command {
        Command::Relays => {
            show_relays(&router_config);
            Ok(())
        }
        Command::Query(args) => run_query(router_config, &args).await,
        Command::Publish { file } => run_publish(router_config, &file).await,
    }
}

async fn write_default_config_if_missing(path: &Path) -> Result<()> {
    if path.exists() {
        info!("Loading configuration from {}", path.display());
        return Ok(());
    }

    info!("Writing default configuration to {}", path.display());
    let toml_string = toml::to_string_pretty(&Config::default())?;
    tokio::fs::write(path, toml_string).await?;

    Ok(())
}

fn show_relays(config: &RouterConfig) {
    println!("Query relays:");
    for url in select_query_relays(config) {
        println!("  {}", url);
    }

    println!("Publish relays:");
    for url in select_publish_relays(config) {
        println!("  {}", url);
    }
}

async fn run_query(config: RouterConfig, args: &QueryArgs) -> Result<()> {
    let filter = args.to_filter()?;
    let timeout = args.timeout()?;
    let config = config.with_deduplication(!args.no_dedup);

    let transport = NostrSdkTransport::new();
    let router = RelayQueryRouter::new(transport.clone(), config);

    let result = router.query_detailed(&[filter], timeout, None).await;
    transport.disconnect().await;
    let output = result.context("Could not load events")?;

    for event in &output.events {
        println!("{}", event.as_json());
    }

    for report in &output.relays {
        eprintln!(
            "{}: {:?} ({} events received)",
            report.url, report.status, report.events_received
        );
    }
    eprintln!(
        "{} events, {} duplicates removed, {} malformed dropped",
        output.events.len(),
        output.duplicates_removed,
        output.malformed_dropped
    );

    Ok(())
}

async fn run_publish(config: RouterConfig, file: &str) -> Result<()> {
    let json = if file == "-" {
        let mut buffer = String::new();
        tokio::io::stdin().read_to_string(&mut buffer).await?;
        buffer
    } else {
        tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("Failed to read {}", file))?
    };

    let event = Event::from_json(json.trim()).context("Invalid event JSON")?;

    let transport = NostrSdkTransport::new();
    let router = RelayQueryRouter::new(transport.clone(), config);

    let result = router.publish(&event).await;
    transport.disconnect().await;
    let report = result.context("Could not publish event")?;

    println!("Published {}", event.id);
    for url in &report.accepted {
        println!("  accepted: {}", url);
    }
    for (url, error) in &report.failed {
        println!("  failed:   {} ({})", url, error);
    }

    Ok(())
}
