use clap::Parser;
use slimserve::{Config, HttpHandler, MemoryStore, ServerBuilder, logging};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Reactor-driven static HTTP server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to $SLIMSERVE_CONFIG or slimserve.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listening port
    #[arg(short, long)]
    port: Option<u16>,

    /// 0: level-triggered, 1: connections ET, 2: listener ET, 3: both ET
    #[arg(long)]
    trigger_mode: Option<u8>,

    /// Idle timeout in milliseconds, 0 disables eviction
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Worker thread count
    #[arg(short, long)]
    workers: Option<usize>,

    /// Document root
    #[arg(short, long)]
    resources: Option<PathBuf>,

    /// 0 DEBUG, 1 INFO, 2 WARN, 3 ERROR
    #[arg(long)]
    log_level: Option<u8>,

    /// Disable logging
    #[arg(long)]
    no_log: bool,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(mode) = self.trigger_mode {
            config.server.trigger_mode = mode;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.server.timeout_ms = timeout_ms;
        }
        if let Some(workers) = self.workers {
            config.server.workers = workers;
        }
        if let Some(resources) = self.resources {
            config.http.resources = resources;
        }
        if let Some(level) = self.log_level {
            config.log.level = level;
        }
        if self.no_log {
            config.log.enabled = false;
        }
    }
}

fn run(cli: Cli) -> slimserve::Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::load()?,
    };
    cli.apply(&mut config);

    let _guard = logging::init(&config.log)?;

    let store = Arc::new(MemoryStore::default());
    let server = ServerBuilder::from_config(&config.server)?
        .build(HttpHandler::factory(config.http.resources.clone(), store))?;

    server.run()
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("slimserve: {e}");
            ExitCode::FAILURE
        }
    }
}
