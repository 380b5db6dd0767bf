use anyhow::{Context, Result};
use capsule_capture::device::DetectRequest;
use capsule_capture::notify::{BroadcastHub, Fanout, NatsClient, NatsSink, NotificationSink};
use capsule_capture::{create_router, AppState, Config, Ports, RealtimeClient};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "capsule-capture")]
#[command(about = "Capture device, recording and upload service")]
struct Cli {
    /// Config file, without extension
    #[arg(short, long, default_value = "config/capsule-capture")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control API (default)
    Serve,
    /// Detect devices once and print the result
    Detect {
        /// Ignore cached device descriptors
        #[arg(long)]
        force: bool,
        /// Probe this camera only
        #[arg(long)]
        device_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Capsule Capture v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let hub = Arc::new(BroadcastHub::default());
    let mut sinks: Vec<Arc<dyn NotificationSink>> = vec![hub.clone()];

    if let Some(nats) = &cfg.nats {
        match NatsClient::connect(&nats.url, nats.client_id.clone(), nats.subject_prefix.clone()).await {
            Ok(client) => sinks.push(Arc::new(NatsSink::spawn(client))),
            Err(e) => warn!("Continuing without NATS: {:#}", e),
        }
    }

    let notifier: Arc<dyn NotificationSink> = Arc::new(Fanout::new(sinks));
    let ports = Arc::new(Ports::from_config(&cfg, Arc::clone(&notifier))?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Detect { force, device_id } => {
            let detected = ports
                .prober
                .detect(DetectRequest::explicit(force, device_id))
                .await?;
            println!("{}", serde_json::to_string_pretty(&detected)?);
        }
        Command::Serve => serve(cfg, ports, hub, notifier).await?,
    }

    Ok(())
}

async fn serve(
    cfg: Config,
    ports: Arc<Ports>,
    hub: Arc<BroadcastHub>,
    notifier: Arc<dyn NotificationSink>,
) -> Result<()> {
    let _watch = ports.spawn_device_watch();

    let mut realtime = cfg
        .server
        .websocket_url
        .clone()
        .map(|url| RealtimeClient::spawn(url, cfg.server.cookie.clone(), notifier));

    let app = create_router(AppState::new(ports, hub, cfg.service.name.clone()));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    if let Some(realtime) = realtime.as_mut() {
        realtime.shutdown().await;
    }

    Ok(())
}
