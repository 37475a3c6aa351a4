//! Server builder and lifecycle.
//!
//! The [`ServerBuilder`] provides a fluent API for declaring methods and
//! events. The [`ServerHandle`] manages the lifecycle:
//! 1. Open the transport (or take a ready duplex stream)
//! 2. Spawn the dispatch task
//! 3. Hand out [`EventEmitter`]s for pushing events
//! 4. Stop: cancel, join the dispatch task, shut the transport down
//!
//! # Example
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
//!     server.emitter().emit("OnData", &(1.0f64, "ready")).await?;
//!     server.wait().await
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

use crate::cancel::CancellationToken;
use crate::codec::{Wire, WireDecode, WireEncode};
use crate::config::{SelectorEncoding, SessionConfig};
use crate::dispatcher::Dispatcher;
use crate::error::{Result, RpcError};
use crate::handler::{HandlerResult, MethodRegistry, Schema};
use crate::transport;
use crate::writer::{EventEmitter, FrameWriter};

/// Builder for configuring and starting a server.
///
/// Declaration order is significant: it assigns method and event ordinals,
/// and both peers must declare the same tables in the same order.
pub struct ServerBuilder {
    registry: MethodRegistry,
    config: SessionConfig,
}

impl ServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self {
            registry: MethodRegistry::new(),
            config: SessionConfig::default(),
        }
    }

    /// Declare a method that returns a value.
    ///
    /// The handler receives the decoded argument tuple.
    pub fn handle<F, A, R, Fut>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        A: WireDecode + Send + 'static,
        R: WireEncode + Send + 'static,
        Fut: Future<Output = HandlerResult<R>> + Send + 'static,
    {
        self.registry.register(method, handler);
        self
    }

    /// Declare a void method.
    ///
    /// Nothing is written back; the peer does not wait for completion.
    pub fn handle_void<F, A, Fut>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        A: WireDecode + Send + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        self.registry.register_void(method, handler);
        self
    }

    /// Declare an event this server can emit.
    pub fn event<A: Wire + ?Sized>(mut self, name: &str) -> Self {
        self.registry.register_event::<A>(name);
        self
    }

    /// Replace the whole session configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the number of bytes requested per transport read.
    ///
    /// Default: 100
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.read_chunk_size = size;
        self
    }

    /// Bound every transport read.
    ///
    /// Default: none (wait indefinitely)
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the request selector encoding.
    ///
    /// Default: [`SelectorEncoding::Ordinal`]
    pub fn selector_encoding(mut self, encoding: SelectorEncoding) -> Self {
        self.config.selector_encoding = encoding;
        self
    }

    /// Answer failed non-void handlers with a fault frame and keep serving.
    ///
    /// Default: false (a handler failure ends the session)
    pub fn report_handler_faults(mut self, enabled: bool) -> Self {
        self.config.report_handler_faults = enabled;
        self
    }

    /// Declared interface.
    pub fn schema(&self) -> Schema {
        self.registry.schema(self.config.selector_encoding)
    }

    /// Open the transport named `name` and start serving.
    ///
    /// A connect failure is fatal: it is returned as [`RpcError::Connect`]
    /// and never retried.
    pub async fn connect(self, name: &str) -> Result<ServerHandle> {
        self.registry.validate()?;
        let stream = transport::connect(name).await?;
        tracing::info!(transport = name, "connected");
        let (reader, writer) = stream.into_split();
        self.serve(reader, writer)
    }

    /// Start serving over an already connected duplex stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn serve<R, W>(self, reader: R, writer: W) -> Result<ServerHandle>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.registry.validate()?;

        let registry = Arc::new(self.registry);
        let writer = FrameWriter::new(writer);
        let cancel = CancellationToken::new();

        let dispatcher = Dispatcher::new(
            reader,
            writer.clone(),
            registry.clone(),
            self.config,
            cancel.clone(),
        );
        let task = tokio::spawn(dispatcher.run());

        Ok(ServerHandle {
            emitter: EventEmitter::new(writer.clone(), registry),
            writer,
            cancel,
            task: Some(task),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry point for building a server.
pub struct Server;

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }
}

/// A running server session.
///
/// Dropping the handle requests cancellation; the dispatch task winds down
/// at the next frame boundary and releases the transport.
pub struct ServerHandle {
    emitter: EventEmitter,
    writer: FrameWriter,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<()>>>,
}

impl ServerHandle {
    /// Event emitter bound to this session.
    pub fn emitter(&self) -> EventEmitter {
        self.emitter.clone()
    }

    /// Check if the dispatch task is still serving.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Token that stops the dispatch loop when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop serving and release the transport.
    ///
    /// A frame already in progress is completed first. Returns the dispatch
    /// task's outcome: `Ok(())` for a clean stop, or the fault that had
    /// already ended the session.
    pub async fn stop(mut self) -> Result<()> {
        self.cancel.cancel();
        let outcome = self.join().await;
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!("transport shutdown: {}", e);
        }
        outcome
    }

    /// Wait for the session to end on its own (peer disconnect or fault).
    pub async fn wait(mut self) -> Result<()> {
        self.join().await
    }

    async fn join(&mut self) -> Result<()> {
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| RpcError::TaskFailed(e.to_string()))?,
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_request, build_response, Selector};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_builder_default() {
        let builder = ServerBuilder::default();
        assert!(builder.schema().is_empty());
    }

    #[test]
    fn test_builder_method_chaining() {
        let builder = Server::builder()
            .handle("Echo", |(s,): (String,)| async move { Ok(s) })
            .handle_void("Hi", |(): ()| async { Ok(()) })
            .event::<(f64, String)>("OnData");

        let schema = builder.schema();
        assert_eq!(schema.method("Echo").unwrap().ordinal, 0);
        assert_eq!(schema.method("Hi").unwrap().ordinal, 1);
        assert!(schema.event("OnData").is_some());
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Server::builder()
            .read_chunk_size(16)
            .read_timeout(Some(Duration::from_secs(10)))
            .selector_encoding(SelectorEncoding::Name)
            .report_handler_faults(true);

        assert_eq!(builder.config.read_chunk_size, 16);
        assert_eq!(builder.config.read_timeout, Some(Duration::from_secs(10)));
        assert_eq!(builder.config.selector_encoding, SelectorEncoding::Name);
        assert!(builder.config.report_handler_faults);
    }

    #[tokio::test]
    async fn test_invalid_table_is_rejected_before_serving() {
        let (_client, server) = tokio::io::duplex(64);
        let (r, w) = tokio::io::split(server);
        let result = Server::builder()
            .handle_void("Hi", |(): ()| async { Ok(()) })
            .handle_void("Hi", |(): ()| async { Ok(()) })
            .serve(r, w);
        assert!(matches!(result, Err(RpcError::Config(_))));
    }

    #[tokio::test]
    async fn test_serve_then_stop() {
        let (mut client, server) = tokio::io::duplex(256);
        let (r, w) = tokio::io::split(server);
        let handle = Server::builder()
            .handle("Add", |(a, b): (i32, i32)| async move { Ok(a + b) })
            .serve(r, w)
            .unwrap();
        assert!(handle.is_running());

        let request = build_request(&Selector::Ordinal(0), &(2i32, 3i32)).unwrap();
        client.write_all(&request).await.unwrap();

        let expected = build_response(&5i32).unwrap();
        let mut reply = vec![0u8; expected.len()];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply[..], &expected[..]);

        handle.stop().await.unwrap();

        // transport is released: the client sees end of stream
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_wait_reports_disconnect() {
        let (client, server) = tokio::io::duplex(64);
        let (r, w) = tokio::io::split(server);
        let handle = Server::builder()
            .handle_void("Hi", |(): ()| async { Ok(()) })
            .serve(r, w)
            .unwrap();

        drop(client);
        let err = handle.wait().await.unwrap_err();
        assert!(err.is_disconnect());
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let (_client, server) = tokio::io::duplex(64);
        let (r, w) = tokio::io::split(server);
        let handle = Server::builder()
            .handle_void("Hi", |(): ()| async { Ok(()) })
            .serve(r, w)
            .unwrap();

        let token = handle.cancellation_token();
        drop(handle);
        assert!(token.is_cancelled());
    }
}
