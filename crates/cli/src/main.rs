mod config;
mod logging;

use std::net::IpAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use harbor_core::TextBackend;
use harbor_lsp::ServerRunner;
use tracing::info;

use config::Overrides;

/// Harbor language server.
#[derive(Parser)]
#[command(
    name = "harbor",
    version,
    about = "Harbor language server over a loopback TCP socket"
)]
struct Cli {
    /// Port to listen on (0 picks a free port)
    #[arg(long)]
    port: Option<u16>,

    /// Address to listen on
    #[arg(long)]
    host: Option<IpAddr>,

    /// Serve a single client, then exit
    #[arg(long)]
    once: bool,

    /// Number of request worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Configuration file (defaults to ./harbor.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Directory indexed as library sources (repeatable)
    #[arg(long = "library", value_name = "DIR")]
    libraries: Vec<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let file = match config::load(cli.config.as_deref()) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    let log_file = cli.log_file.clone().or_else(|| file.log.file.clone());
    if let Err(e) = logging::init(&file.log.filter, log_file.as_deref()) {
        eprintln!("error: {}", e);
        process::exit(1);
    }

    let server = file.server_config(&Overrides {
        host: cli.host,
        port: cli.port,
        once: cli.once,
        workers: cli.workers,
    });
    let backend = Arc::new(TextBackend::with_library_roots(cli.libraries));
    let runner = match ServerRunner::new(server, backend) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    // Clients started with port 0 read the chosen port from here.
    println!("listening on {}", runner.local_addr());
    info!(version = env!("CARGO_PKG_VERSION"), "harbor started");

    if let Err(e) = runner.run() {
        eprintln!("Server error: {}", e);
        process::exit(1);
    }
}
