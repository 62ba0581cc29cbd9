//! zipstack - embedded SQS server for span pipeline tests
//!
//! Runs the in-memory SQS server from the command line so collectors and
//! reporters can be pointed at it outside a test harness.

mod config;

use clap::Parser;
use std::net::IpAddr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zipstack_sqs::{EmbeddedSqsServer, SqsLimits};

#[derive(Parser, Debug)]
#[command(name = "zipstack")]
#[command(about = "Embedded SQS server for span pipeline tests", long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "ZIPSTACK_PORT")]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "ZIPSTACK_HOST")]
    host: Option<IpAddr>,

    /// Request limits: strict or relaxed
    #[arg(long, env = "ZIPSTACK_LIMITS")]
    limits: Option<SqsLimits>,

    /// Queue to create at startup (repeatable)
    #[arg(short, long = "queue")]
    queues: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "ZIPSTACK_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "zipstack={level},zipstack_sqs={level},tower_http=debug",
                    level = args.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load()?;
    let port = args.port.unwrap_or(config.server.port);
    let host = args.host.unwrap_or(config.server.host);
    let limits = args.limits.unwrap_or(config.sqs.limits);
    let queues = if args.queues.is_empty() {
        config.sqs.queues
    } else {
        args.queues
    };

    info!("Starting zipstack...");
    info!("  Limits: {}", limits);
    info!("  Queues: {}", queues.join(", "));

    let mut server = queues
        .iter()
        .fold(
            EmbeddedSqsServer::builder().host(host).port(port).limits(limits),
            |builder, queue| builder.queue(queue.as_str()),
        )
        .start()
        .await?;

    info!("Listening on http://{}:{}", host, server.port());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    server.stop_and_wait().await?;

    Ok(())
}
