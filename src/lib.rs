//! # tinyrpc
//!
//! Minimal binary RPC over a single duplex pipe.
//!
//! One side runs a [`Server`] that executes declared methods and pushes
//! events; the other side runs a [`Client`] that issues calls and receives
//! those events. Both sides share the same ordered method and event tables.
//!
//! ## Architecture
//!
//! - **Codec** ([`codec`]): self-delimiting binary encoding of primitives,
//!   strings, sequences, tuples, records, enumerations and timestamps
//! - **Framing** ([`protocol`]): requests carry a selector and arguments;
//!   server output is a kind byte (response, event, fault) plus payload
//! - **Dispatch** ([`dispatcher`]): one task decodes and runs requests in
//!   arrival order
//! - **Output** ([`writer`]): responses and events share one write lock,
//!   so frames never interleave
//!
//! ## Example
//!
//! ```no_run
//! use tinyrpc::Server;
//!
//! #[tokio::main]
//! async fn main() -> tinyrpc::Result<()> {
//!     let server = Server::builder()
//!         .handle("Add", |(a, b): (i32, i32)| async move { Ok(a.wrapping_add(b)) })
//!         .handle_void("Hi", |(): ()| async { Ok(()) })
//!         .event::<(f64, String)>("OnData")
//!         .connect("my-pipe")
//!         .await?;
//!
//!     server.wait().await
//! }
//! ```

pub mod cancel;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod sample;
pub mod transport;
pub mod writer;

mod client;
mod server;

pub use cancel::CancellationToken;
pub use client::{Client, ClientBuilder};
pub use config::{SelectorEncoding, SessionConfig};
pub use error::{ProtocolViolation, Result, RpcError};
pub use server::{Server, ServerBuilder, ServerHandle};
pub use writer::EventEmitter;
