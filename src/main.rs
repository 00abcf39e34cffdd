// The engine needs AsyncFd raw sockets; elsewhere the binary only reports that
#![cfg_attr(not(unix), allow(dead_code, unused_imports))]

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Args;
use hoptrace::export::{export_csv, export_json, generate_report};
use hoptrace::{Config, Mtr, ResultSnapshot};

/// Snapshots buffered for the streaming printer before new ones are dropped
const SNAPSHOT_QUEUE: usize = 4;

#[cfg(not(unix))]
fn main() {
    eprintln!("hoptrace needs raw ICMP sockets and only runs on unix platforms");
    std::process::exit(1);
}

#[cfg(unix)]
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from(&args);

    // Resolution and socket failures are fatal, before any probe goes out
    let mtr = match Mtr::connect(config).await {
        Ok(mtr) => mtr,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    // Cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Setup Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        cancel_clone.cancel();
    });

    if args.is_batch_mode() {
        run_batch_mode(&args, &mtr, &cancel).await
    } else {
        run_streaming_mode(&mtr, &cancel).await
    }
}

/// Run all cycles quietly, then write one report/JSON/CSV document
async fn run_batch_mode<S, R>(args: &Args, mtr: &Mtr<S, R>, cancel: &CancellationToken) -> Result<()>
where
    S: hoptrace::probe::ProbeSocket,
    R: hoptrace::lookup::NameResolver,
{
    let snapshot = mtr.run(cancel, |_| {}).await;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if args.json {
        export_json(&snapshot, &mut out).context("Failed to write JSON")?;
        writeln!(out)?;
    } else if args.csv {
        export_csv(&snapshot, &mut out).context("Failed to write CSV")?;
    } else {
        generate_report(&snapshot, &mut out).context("Failed to write report")?;
    }
    Ok(())
}

/// Print a report after every cycle; printing runs on its own task so a slow
/// terminal never delays probing
async fn run_streaming_mode<S, R>(mtr: &Mtr<S, R>, cancel: &CancellationToken) -> Result<()>
where
    S: hoptrace::probe::ProbeSocket,
    R: hoptrace::lookup::NameResolver,
{
    let (tx, mut rx) = mpsc::channel::<ResultSnapshot>(SNAPSHOT_QUEUE);

    let printer = tokio::spawn(async move {
        while let Some(snapshot) = rx.recv().await {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            if let Err(e) = generate_report(&snapshot, &mut out).and_then(|_| writeln!(out)) {
                tracing::warn!(error = %e, "failed to print report");
                break;
            }
        }
    });

    let last = mtr.run_with_channel(cancel, tx).await;
    printer.await.context("Report printer panicked")?;

    if cancel.is_cancelled() && last.cycles > 0 {
        eprintln!("Interrupted after {} cycles", last.cycles);
    }
    Ok(())
}
