//! Sample server - serves the reference interface over a named transport.
//!
//! The client picks a transport name, listens on it, and starts this
//! process with the name as its only argument:
//!
//! ```text
//! sample_server <name>           # serve until the client goes away
//! sample_server --describe       # print the interface as JSON
//! ```
//!
//! Exit codes: 1 missing argument, 2 connect failure, 4 client
//! disconnected, 5 any other fault.
//!
//! While connected, an `OnData` event is pushed every `--interval-ms`.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tinyrpc::sample::{self, DemoService, ON_DATA};
use tinyrpc::RpcError;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sample_server")]
#[command(about = "tinyrpc reference server")]
struct Args {
    /// Transport name to connect to
    name: Option<String>,

    /// Print the interface schema as JSON and exit
    #[arg(long)]
    describe: bool,

    /// Milliseconds between OnData events
    #[arg(long, default_value = "100")]
    interval_ms: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // Logs go to stderr; RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let builder = sample::server(Arc::new(DemoService));

    if args.describe {
        return match builder.schema().to_json() {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("schema export failed: {}", e);
                ExitCode::from(5)
            }
        };
    }

    let Some(name) = args.name else {
        eprintln!("usage: sample_server <name>");
        return ExitCode::from(1);
    };

    match run(builder, &name, Duration::from_millis(args.interval_ms)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(
    builder: tinyrpc::ServerBuilder,
    name: &str,
    interval: Duration,
) -> Result<(), RpcError> {
    let server = builder.connect(name).await?;
    info!("serving on {}", name);

    let emitter = server.emitter();
    let ticker = tokio::spawn(async move {
        let mut ticks = tokio::time::interval(interval);
        let mut n: u64 = 0;
        loop {
            ticks.tick().await;
            n += 1;
            let value = (n as f64).sin();
            // The session reports its own end; a failed push just stops the ticker.
            if emitter
                .emit(ON_DATA, &(value, format!("marf - {}", n)))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    let outcome = server.wait().await;
    ticker.abort();
    outcome
}
