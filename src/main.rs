use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

use media_balancer::balancer::Balancer;
use media_balancer::config::{parse_backends, BalancerConfig};
use media_balancer::dispatch::{Job, JobKind, LoadModel, SelectionPolicy};
use media_balancer::shutdown::install_shutdown_handler;
use media_balancer::transport::link::MAX_RESPONSE_LEN;
use media_balancer::transport::{JobCodec, TagCodec};

#[derive(Parser, Debug)]
#[command(name = "media-balancer")]
#[command(version)]
#[command(about = "Cost-aware dispatcher for video and music backends")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the balancer
    Serve(ServeArgs),

    /// Send one job through a running balancer and print the reply
    Send(SendArgs),
}

// =============================================================================
// Serve Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Address to accept clients on
    #[arg(long, default_value = "0.0.0.0:80")]
    listen: SocketAddr,

    /// Backends (comma-separated, format: "KIND:host:port", KIND is V or M)
    /// Example: "V:192.168.0.101:80,V:192.168.0.102:80,M:192.168.0.103:80"
    #[arg(long)]
    backends: String,

    /// Candidate-selection policy
    #[arg(long, value_enum, default_value = "full-scan")]
    policy: SelectionPolicy,

    /// How a backend's current load is estimated
    #[arg(long, value_enum, default_value = "drain")]
    load_model: LoadModel,

    /// Seconds to wait for a backend reply before failing the request
    #[arg(long, default_value = "60")]
    forward_timeout_secs: u64,

    /// Seconds to wait for a client to send its request
    #[arg(long, default_value = "10")]
    client_timeout_secs: u64,

    /// Milliseconds of backend work one cost unit represents
    #[arg(long, default_value = "1000")]
    cost_unit_ms: u64,

    /// Port for the status dashboard (optional)
    #[arg(long)]
    dashboard_port: Option<u16>,
}

// =============================================================================
// Send Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct SendArgs {
    /// Balancer address
    #[arg(long, short = 'a', default_value = "127.0.0.1:80")]
    addr: String,

    /// Job kind
    #[arg(long, short = 'k', value_enum)]
    kind: KindArg,

    /// Job size (seconds of work)
    #[arg(long, short = 's')]
    size: u64,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    #[value(alias = "v")]
    Video,
    #[value(alias = "m")]
    Music,
    #[value(alias = "p")]
    Priority,
}

impl From<KindArg> for JobKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Video => JobKind::Video,
            KindArg::Music => JobKind::Music,
            KindArg::Priority => JobKind::Priority,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct SendOutput {
    kind: JobKind,
    size: u64,
    reply: String,
    elapsed_ms: u64,
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let dashboard_addr: Option<SocketAddr> = match args.dashboard_port {
        Some(p) => Some(format!("0.0.0.0:{}", p).parse()?),
        None => None,
    };

    let config = BalancerConfig {
        listen_addr: args.listen,
        backends: parse_backends(&args.backends)?,
        policy: args.policy,
        load_model: args.load_model,
        forward_timeout: Duration::from_secs(args.forward_timeout_secs),
        client_read_timeout: Duration::from_secs(args.client_timeout_secs),
        cost_unit: Duration::from_millis(args.cost_unit_ms),
        dashboard_addr,
    };
    config.validate()?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        dashboard_addr = ?config.dashboard_addr,
        policy = %config.policy,
        load_model = %config.load_model,
        backends = ?config.backends.iter().map(|b| format!("{}:{}", b.kind, b.endpoint)).collect::<Vec<_>>(),
        "Starting media-balancer"
    );

    let shutdown = install_shutdown_handler()?;
    let balancer = Balancer::connect(config).await?;
    balancer.run(shutdown).await?;

    Ok(())
}

// =============================================================================
// Client Command Handler
// =============================================================================

async fn handle_send(args: SendArgs) -> Result<(), Box<dyn std::error::Error>> {
    let job = Job::new(args.kind.into(), args.size)?;
    let request = TagCodec.encode(&job);

    let started = Instant::now();
    let mut stream = TcpStream::connect(&args.addr).await?;
    stream.write_all(&request).await?;

    let mut reply = Vec::new();
    let mut buf = vec![0u8; MAX_RESPONSE_LEN];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        reply.extend_from_slice(&buf[..n]);
    }
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    if reply.is_empty() {
        eprintln!("Error: balancer closed the connection without a reply");
        std::process::exit(1);
    }
    let reply = String::from_utf8_lossy(&reply).trim_end().to_string();

    match args.output {
        OutputFormat::Json => {
            let output = SendOutput {
                kind: job.kind(),
                size: job.size(),
                reply,
                elapsed_ms,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Job:     {} x{}", job.kind(), job.size());
            println!("Reply:   {}", reply);
            println!("Elapsed: {} ms", elapsed_ms);
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Serve(serve_args) => {
            run_server(serve_args).await?;
        }
        Commands::Send(send_args) => {
            handle_send(send_args).await?;
        }
    }

    Ok(())
}
