mod actuation;
mod config;
mod server;
mod utils;

use async_std::channel::{self, Receiver, Sender};
use async_std::task;
use clap::Parser;
use config::{BackendKind, Config};
use futures::StreamExt;
use server::server::MotorServer;
use signal_hook::consts::signal::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook_async_std::Signals;
use std::path::PathBuf;
use tracing::{error, info};

/// Motor control daemon
#[derive(Parser, Debug)]
#[command(name = "motord", version, about = "Serves motor commands over TCP")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Address to bind both sockets to
    #[arg(short, long)]
    bind: Option<String>,

    /// Command socket port
    #[arg(short, long)]
    port: Option<u16>,

    /// Dedicated telemetry socket port
    #[arg(short, long, conflicts_with = "shared_telemetry")]
    telemetry_port: Option<u16>,

    /// Stream telemetry on the command socket instead of a second socket
    #[arg(long)]
    shared_telemetry: bool,

    /// Actuation backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Args {
    /// Applies command line overrides on top of the loaded configuration
    fn apply(self, config: &mut Config) {
        if let Some(bind) = self.bind {
            config.server.bind_addr = bind;
        }
        if let Some(port) = self.port {
            config.server.command_port = port;
        }
        if self.shared_telemetry {
            config.server.telemetry_port = None;
        } else if let Some(port) = self.telemetry_port {
            config.server.telemetry_port = Some(port);
        }
        if let Some(backend) = self.backend {
            config.actuation.backend = backend;
        }
        if let Some(file) = self.log_file {
            config.logging.file = Some(file);
        }
    }
}

/// Forwards the first termination signal to the server
async fn handle_signals(mut signals: Signals, shutdown_tx: Sender<()>) {
    while let Some(signal) = signals.next().await {
        match signal {
            SIGINT | SIGTERM | SIGQUIT => {
                info!("Received signal {}, shutting down", signal);
                let _ = shutdown_tx.try_send(());
            }
            _ => {}
        }
    }
}

/// Reports where the sockets ended up, then runs the server
async fn serve(server: MotorServer, shutdown_rx: Receiver<()>) -> utils::error::Result<()> {
    info!("Command socket bound on {}", server.command_addr()?);
    match server.telemetry_addr()? {
        Some(addr) => info!("Telemetry socket bound on {}", addr),
        None => info!("Telemetry shares the command socket"),
    }
    server.run(shutdown_rx).await
}

#[async_std::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    args.apply(&mut config);
    config.validate()?;

    utils::tracing::setup_tracing(&config.logging);
    info!("Starting motord {}", env!("CARGO_PKG_VERSION"));

    let backend = actuation::build_backend(&config.actuation);
    info!("Using {} actuation backend", backend.backend_name());

    let (shutdown_tx, shutdown_rx) = channel::bounded(1);
    let signals = Signals::new([SIGINT, SIGTERM, SIGQUIT])?;
    let signals_handle = signals.handle();
    let signals_task = task::spawn(handle_signals(signals, shutdown_tx));

    let result = match MotorServer::bind(config, backend).await {
        Ok(server) => serve(server, shutdown_rx).await,
        Err(e) => Err(e),
    };

    signals_handle.close();
    signals_task.await;

    if let Err(e) = result {
        error!("Motor server failed: {}", e);
        return Err(e.into());
    }
    Ok(())
}
