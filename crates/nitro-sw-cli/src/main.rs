//! nitro-sw - drive the Nitro PWA offline worker from the command line.
//!
//! Runs the worker's lifecycle hooks and fetch handling against a
//! disk-backed cache store and the real network, so a deployment's cache
//! configuration can be checked without a browser.

mod args;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

use nitro_sw_core::{
    CacheStorage, ClientRegistry, DiskCacheStorage, HttpNetwork, Request, ServiceWorker,
    WorkerConfig, WorkerEvent,
};

use args::{Args, BumpTarget, Command};

/// Environment variable naming a directory for daily-rolling log files
const LOG_DIR_ENV: &str = "NITRO_SW_LOG_DIR";

/// Bytes of a text body echoed by `fetch`
const BODY_PREVIEW_BYTES: usize = 300;

/// Initialize the tracing subscriber for logging.
/// The returned guard must live until exit so buffered file logs are flushed.
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "nitro-sw.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args = match Args::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, args::USAGE);
            std::process::exit(2);
        }
    };

    if let Command::Help = args.command {
        println!("{}", args::USAGE);
        return Ok(());
    }

    let config = WorkerConfig::load(args.config.as_deref())?;

    if let Command::Bump(target) = args.command {
        return bump(config, target, args.config);
    }

    let store_dir = match args.store {
        Some(dir) => dir,
        None => WorkerConfig::cache_dir()?,
    };
    let storage = Arc::new(
        DiskCacheStorage::new(store_dir.clone())
            .with_context(|| format!("Failed to open cache store at {}", store_dir.display()))?,
    );
    let network = Arc::new(HttpNetwork::new(
        config.request_timeout_secs.map(Duration::from_secs),
    )?);
    let (clients, mut events) = ClientRegistry::new();
    let clients = Arc::new(clients);

    info!(store = %store_dir.display(), scope = %config.scope, "nitro-sw starting");
    let worker = ServiceWorker::new(config, storage.clone(), network, clients.clone())?;

    match args.command {
        Command::Install => {
            let report = worker.install().await;
            match report.static_result {
                Ok(count) => println!("static: {} assets cached", count),
                Err(ref e) => println!("static: FAILED ({})", e),
            }
            println!("cdn:    {} cached", report.cdn_cached.len());
            for url in &report.cdn_skipped {
                println!("cdn:    skipped {}", url);
            }
        }
        Command::Activate => {
            // Stand-in for the page that registered the worker
            clients.open(worker.manifest().scope().clone()).await;
            let report = worker.activate().await;
            for name in &report.deleted {
                println!("deleted  {}", name);
            }
            for name in &report.orphaned {
                println!("orphaned {}", name);
            }
            if report.deleted.is_empty() && report.orphaned.is_empty() {
                println!("no old caches");
            }
        }
        Command::Route(url) => {
            println!("{}", worker.route(&url));
        }
        Command::Fetch { url, method } => {
            fetch(&worker, url, method).await?;
        }
        Command::Caches => {
            list_caches(storage.as_ref()).await?;
        }
        Command::Help | Command::Bump(_) => {}
    }

    while let Ok(event) = events.try_recv() {
        if let WorkerEvent::ControllerChange { client_id } = event {
            worker.on_controller_change(&client_id);
        }
    }

    info!("nitro-sw done");
    Ok(())
}

async fn fetch(worker: &ServiceWorker, url: Url, method: nitro_sw_core::Method) -> Result<()> {
    let route = worker.route(&url);
    let request = Request::new(method, url);
    let response = worker
        .handle_fetch(&request)
        .await
        .with_context(|| format!("{} request failed", route))?;
    // Let the write-through land before the process exits
    worker.settle().await;

    println!("policy: {}", route);
    println!("status: {} {}", response.status, response.status_text);
    for (name, value) in &response.headers {
        println!("{}: {}", name, value);
    }
    println!("body:   {} bytes", response.body.len());
    if let Ok(text) = std::str::from_utf8(&response.body) {
        let mut end = text.len().min(BODY_PREVIEW_BYTES);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        println!("\n{}", &text[..end]);
    }
    Ok(())
}

async fn list_caches(storage: &dyn CacheStorage) -> Result<()> {
    let names = storage.keys().await?;
    if names.is_empty() {
        println!("no caches");
    }
    for name in names {
        let cache = storage.open(&name).await?;
        let keys = cache.keys().await?;
        println!("{} ({} entries)", name, keys.len());
        for key in keys {
            if let Some(entry) = cache.lookup(&key).await? {
                println!(
                    "  {:>3} {:>8}  {}  {}",
                    entry.data.status,
                    entry.data.body.len(),
                    entry.age_display(),
                    key
                );
            }
        }
    }
    Ok(())
}

/// Advance cache generations and write the config back.
fn bump(config: WorkerConfig, target: BumpTarget, path: Option<PathBuf>) -> Result<()> {
    let mut versions = config.versions.clone();
    if matches!(target, BumpTarget::Static | BumpTarget::All) {
        versions = versions.bump_static()?;
    }
    if matches!(target, BumpTarget::Cdn | BumpTarget::All) {
        versions = versions.bump_cdn()?;
    }

    let updated = WorkerConfig { versions, ..config };
    updated.validate()?;
    updated.save(path.as_deref())?;

    println!("static: {}", updated.versions.static_version);
    println!("cdn:    {}", updated.versions.cdn_version);
    Ok(())
}
