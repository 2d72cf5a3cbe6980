//! fxconv - Convert currencies from the command line
//!
//! Uses live rates from an open exchange-rate API when the network is
//! reachable, and a locally cached rate table when it is not.

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use fxconv::cache::{KeyValueStore, RateCache};
use fxconv::cli::{AppConfig, Cli, Command, ConversionRequest, ModeAction};
use fxconv::connectivity::{ConnectivitySource, HttpProbe, SimulatedConnectivity};
use fxconv::converter::{Converter, StatusReport};
use fxconv::data::{RateProvider, RatesClient};
use fxconv::history::HistoryLog;

/// Sets up logging to stderr, `warn` unless overridden by `RUST_LOG`
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Wires the converter from the configuration and runs one command
async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = AppConfig::from_cli(&cli)?;

    let store = Arc::new(
        config
            .store()
            .ok_or("could not determine a cache directory; pass --cache-dir")?,
    );
    let cache = RateCache::new(Arc::clone(&store)).with_max_age(config.max_age);
    let history = HistoryLog::new(store);
    let provider = RatesClient::with_options(config.api_url.clone(), config.timeout);

    if config.simulate_offline {
        let source = SimulatedConnectivity::new(false);
        execute(Converter::connect(cache, history, provider, source).await, cli.command).await
    } else {
        let source = HttpProbe::new(config.probe_url.clone(), config.timeout);
        execute(Converter::connect(cache, history, provider, source).await, cli.command).await
    }
}

async fn execute<S, P, C>(
    mut converter: Converter<S, P, C>,
    command: Command,
) -> Result<(), Box<dyn Error>>
where
    S: KeyValueStore,
    P: RateProvider,
    C: ConnectivitySource,
{
    match command {
        Command::Convert { amount, from, to } => {
            let request = ConversionRequest::parse(&amount, &from, &to)?;
            let conversion = converter
                .convert(request.amount, &request.from, &request.to)
                .await?;
            println!("{}", conversion);
        }
        Command::Rates { base } => {
            let table = converter.refresh(&base).await?;
            println!(
                "Cached {} rates for base {}",
                table.rates.len(),
                table.base_currency
            );
        }
        Command::Status => {
            let report = converter.status().await;
            print_status(&report);
        }
        Command::Mode { action } => match action.unwrap_or(ModeAction::Show) {
            ModeAction::Show => {
                let report = converter.status().await;
                println!("Mode: {}", report.mode);
            }
            ModeAction::Toggle => {
                let mode = converter.toggle_offline().await?;
                println!("Mode: {}", mode);
            }
            ModeAction::Exit => {
                converter.exit_offline().await?;
                println!("Mode: {}", converter.controller().mode());
            }
        },
        Command::Clear => {
            converter.clear_cache();
            println!("Rate cache cleared");
        }
        Command::History { limit, clear } => {
            if clear {
                converter.clear_history();
                println!("History cleared");
            } else {
                let entries = converter.history(limit);
                if entries.is_empty() {
                    println!("No conversions yet");
                }
                for entry in entries {
                    println!(
                        "{}  {}",
                        entry.converted_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                        entry
                    );
                }
            }
        }
    }

    Ok(())
}

fn print_status(report: &StatusReport) {
    let connection = if report.connected {
        "connected"
    } else {
        "no connection"
    };
    println!("Mode: {} ({})", report.mode, connection);

    let cache = &report.cache;
    if !cache.has_snapshot {
        println!("Cache: no rate snapshot cached");
        return;
    }

    let updated = cache
        .last_update
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!(
        "Cache: {} rates, base {}, updated {}{}",
        cache.rate_count,
        cache.base_currency.as_deref().unwrap_or("?"),
        updated,
        if cache.is_expired { " (expired)" } else { "" }
    );
}
