//! tenyks
//!
//! Connects to every configured protocol endpoint, publishes inbound lines
//! to services over Redis and delivers their replies.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use tenyks::banner::startup_banner;
use tenyks::bus::redis::{RedisPublisher, RedisSubscription};
use tenyks::bus::{InboundSubscriber, OutboundPublisher};
use tenyks::connection::{Connection, ConnectionTable, IrcConnection};
use tenyks::pipeline::Pipeline;
use tenyks::{Robot, RobotConfig};
use tenyks_core::Settings;
use tenyks_core::config::load_settings;
use tenyks_core::tracing_init::{default_filter, init_tracing};

/// How long in-flight publishes get once the robot has stopped.
const BUS_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "tenyks")]
#[command(version, about = "tenyks - bridges IRC-style connections to a Redis pub/sub bus")]
struct Args {
    /// Settings file (TOML), merged over the global settings file
    #[arg(short, long, env = "TENYKS_CONFIG")]
    config: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "TENYKS_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "TENYKS_LOG_JSON")]
    log_json: bool,

    /// Redis host, overriding settings
    #[arg(long)]
    redis_host: Option<String>,

    /// Redis port, overriding settings
    #[arg(long)]
    redis_port: Option<u16>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&default_filter(&args.log_level), args.log_json);

    match run(args).await {
        Ok(()) => {
            info!("Bye.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let chain = format!("{e:#}");
            error!(error = %chain, "Startup failed");
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let settings = resolve_settings(&args)?;

    for line in startup_banner().lines() {
        info!("{line}");
    }
    info!(
        version = env!("CARGO_PKG_VERSION"),
        connections = settings.connections.len(),
        redis = %format!("{}:{}", settings.redis.host, settings.redis.port),
        "Starting tenyks"
    );

    settings.prepare_dirs()?;

    let pipeline = Pipeline::from_names(&settings.pipeline.extra_stages)?;
    info!(stages = ?pipeline.stage_names(), "Pipeline assembled");

    let connections = settings
        .connections
        .values()
        .map(|config| {
            IrcConnection::new(config.clone())
                .map(|conn| Arc::new(conn) as Arc<dyn Connection>)
                .with_context(|| format!("Failed to set up connection {}", config.name))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let table = ConnectionTable::new(connections);

    let publisher = RedisPublisher::connect(&settings.redis)
        .await
        .context("Failed to connect to Redis")?;
    let subscription =
        RedisSubscription::subscribe(&settings.redis, &settings.channels.broadcast_to_robot)
            .await
            .context("Failed to subscribe to Redis")?;

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let drain = tokio::spawn(
        OutboundPublisher::new(
            Arc::new(publisher.clone()),
            &settings.channels.broadcast_to_services,
        )
        .run(outbound_rx),
    );

    let closer = subscription.closer();
    let subscriber = InboundSubscriber::new(table.clone());
    let listener = tokio::spawn(async move { subscriber.run(subscription).await });

    let robot = Arc::new(Robot::new(
        table,
        pipeline,
        outbound_tx,
        RobotConfig::from(&settings.robot),
    ));
    let active = robot.start().await;
    info!(active = ?active, "Supervising connections");

    wait_for_signal().await;

    robot.shutdown().await;
    closer.quit().await;
    listener.abort();
    drop(robot);
    // The queue closes once the last sender (held by the Robot) is gone;
    // the drain then waits for its in-flight publishes.
    if tokio::time::timeout(BUS_GRACE, drain).await.is_err() {
        info!("Outbound publisher still busy; leaving it");
    }
    publisher.quit().await;
    Ok(())
}

/// Settings from files and environment, with CLI overrides on top.
fn resolve_settings(args: &Args) -> anyhow::Result<Settings> {
    let mut settings = load_settings(args.config.as_deref()).context("Failed to load settings")?;
    if let Some(host) = &args.redis_host {
        settings.redis.host.clone_from(host);
    }
    if let Some(port) = args.redis_port {
        settings.redis.port = port;
    }
    Ok(settings)
}

async fn wait_for_signal() {
    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable; only Ctrl+C stops tenyks");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        () = sigterm => {
            info!("Received SIGTERM shutdown signal");
        }
    }
}
