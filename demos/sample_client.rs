//! Sample client - starts the sample server and exercises every method.
//!
//! ```text
//! cargo build --examples
//! cargo run --example sample_client
//! ```
//!
//! The server binary defaults to `sample_server` next to this executable;
//! pass `--server <path>` to use another one.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tinyrpc::sample::{self, E, S1, S11, S2, ParsedTuple, TupleRow, ON_DATA};
use tinyrpc::transport::{generate_pipe_name, PipeListener};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sample_client")]
#[command(about = "tinyrpc reference client")]
struct Args {
    /// Path to the server executable
    #[arg(long)]
    server: Option<PathBuf>,

    /// Seconds to keep listening for events after the calls
    #[arg(long, default_value = "1")]
    linger_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let server_path = match args.server {
        Some(path) => path,
        None => std::env::current_exe()?
            .with_file_name(format!("sample_server{}", std::env::consts::EXE_SUFFIX)),
    };

    let name = generate_pipe_name();
    let listener = PipeListener::bind(&name).await?;
    let mut server = Command::new(&server_path).arg(&name).spawn()?;

    let client = sample::client().accept(&listener).await?;

    let events = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let seen = events.clone();
    client.on_event(ON_DATA, move |(d, s): (f64, String)| {
        seen.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        println!("[SERVER] OnData: {} {}", d, s);
    })?;

    client.call_void("Hi", &()).await?;
    client.call_void("FancyHi", &("Moopsies", 25i32)).await?;

    let sum: i32 = client.call("Add", &(5i32, 2i32)).await?;
    println!("[CLIENT] 5 + 2 = {}", sum);

    let echoed: Vec<u8> = client.call("BufferCall", &(b"arf arf".to_vec(), 10i32)).await?;
    println!("[CLIENT] {}", String::from_utf8_lossy(&echoed));

    let next: E = client.call("GetNewE", &(E::D,)).await?;
    println!("[CLIENT] GetNewE(D) = {:?}", next);

    let s = S1 {
        a: 15,
        b: "b".into(),
        s11: S11 { a: 49859485 },
    };
    let s2: S2 = client.call("GetStruct", &(12i32, s, 3.1415f64)).await?;
    println!("[CLIENT] GetStruct: c={} d={} S22.a={}", s2.c, s2.d, s2.s22.a);

    let (a, b, c, utf8): ParsedTuple = client
        .call("GetValueTupleResult", &("120 150 1000 plain ol string",))
        .await?;
    println!(
        "[CLIENT] GetValueTupleResult: a={} b={} c={} utf8={}",
        a,
        b,
        c,
        String::from_utf8_lossy(&utf8)
    );

    let rows: Vec<TupleRow> = client.call("GetValueTupleArrayResult", &()).await?;
    for (a, b, dt, d) in rows {
        println!("[CLIENT] GetValueTupleArrayResult: a={} b={} dt={} d={}", a, b, dt, d);
    }

    tokio::time::sleep(Duration::from_secs(args.linger_secs)).await;
    println!(
        "[CLIENT] {} events, server {}",
        events.load(std::sync::atomic::Ordering::Relaxed),
        if client.is_healthy() { "healthy" } else { "unhealthy" }
    );

    client.close().await?;
    let status = server.wait()?;
    println!("[CLIENT] server exited with {}", status);
    Ok(())
}
