//! Request dispatch loop.
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            ▼                                              │
//!   AwaitingSelector ─► DecodingArguments ─► Invoking ─► (EncodingResponse)
//!            │
//!            └─► Stopped   (cancel, disconnect, or any fault)
//! ```
//!
//! Handlers run inline, one at a time, in arrival order. A fault ends the
//! session, except a handler failure in a non-void method when
//! [`SessionConfig::report_handler_faults`] is set: that one is answered
//! with a fault frame and the loop carries on.

use std::sync::Arc;

use tokio::io::AsyncRead;

use crate::cancel::CancellationToken;
use crate::config::SessionConfig;
use crate::error::{Result, RpcError};
use crate::handler::MethodRegistry;
use crate::protocol::{build_fault, IncomingBuffer, Selector};
use crate::writer::FrameWriter;

/// One server session over a connected transport.
pub struct Dispatcher<R> {
    incoming: IncomingBuffer<R>,
    writer: FrameWriter,
    registry: Arc<MethodRegistry>,
    config: SessionConfig,
    cancel: CancellationToken,
}

impl<R: AsyncRead + Unpin> Dispatcher<R> {
    /// Create a dispatcher reading requests from `reader`.
    pub fn new(
        reader: R,
        writer: FrameWriter,
        registry: Arc<MethodRegistry>,
        config: SessionConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            incoming: IncomingBuffer::with_config(reader, &config),
            writer,
            registry,
            config,
            cancel,
        }
    }

    /// Serve requests until cancelled or a fault ends the session.
    ///
    /// Returns `Ok(())` on a requested stop. Disconnection and every other
    /// session-ending fault are returned as errors. The write half is shut
    /// down either way, so the peer sees the end of the session.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!(
            methods = self.registry.len(),
            selector = ?self.config.selector_encoding,
            "session started"
        );

        let outcome = self.serve().await;
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!("transport shutdown: {}", e);
        }
        match &outcome {
            Ok(()) => tracing::info!("session stopped"),
            Err(RpcError::Disconnected) => tracing::info!("peer disconnected"),
            Err(RpcError::Protocol(v)) => tracing::warn!("protocol violation: {}", v),
            Err(e) => tracing::error!("session failed: {}", e),
        }
        outcome
    }

    async fn serve(&mut self) -> Result<()> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            if !self.incoming.wait_for_data(&self.cancel).await? {
                return Ok(());
            }
            self.dispatch_one().await?;
        }
    }

    /// Decode one request, run its handler and write any reply.
    async fn dispatch_one(&mut self) -> Result<()> {
        let encoding = self.config.selector_encoding;
        let selector = self
            .incoming
            .decode_next(|r| Selector::decode(r, encoding))
            .await?;

        let registry = self.registry.clone();
        let entry = registry.resolve(&selector)?;
        let method = entry.descriptor();
        tracing::debug!(method = %method.name, ordinal = method.ordinal, "dispatching");

        let handler = entry.handler();
        let invocation = self.incoming.decode_next(|r| handler.decode(r)).await?;

        match invocation.await {
            Ok(Some(frame)) => self.writer.write_frame(frame).await,
            Ok(None) => Ok(()),
            Err(RpcError::Handler { method: name, source })
                if self.config.report_handler_faults && !method.is_void() =>
            {
                tracing::warn!(method = %name, "handler failed: {}", source);
                let frame = build_fault(&source.to_string())?;
                self.writer.write_frame(frame).await
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_to_bytes;
    use crate::error::ProtocolViolation;
    use crate::protocol::{build_request, build_response};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn registry() -> Arc<MethodRegistry> {
        let mut registry = MethodRegistry::new();
        registry.register("Add", |(a, b): (i32, i32)| async move { Ok(a.wrapping_add(b)) });
        registry.register_void("Hi", |(): ()| async { Ok(()) });
        registry.register("Fail", |(): ()| async { Err::<i32, _>("nope".into()) });
        Arc::new(registry)
    }

    /// Feed `input` to a fresh dispatcher, then collect everything it
    /// wrote back once the request stream runs dry.
    async fn run_session(config: SessionConfig, input: &[u8]) -> (Result<()>, Vec<u8>) {
        let (mut client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let dispatcher = Dispatcher::new(
            server_read,
            FrameWriter::new(server_write),
            registry(),
            config,
            CancellationToken::new(),
        );

        client.write_all(input).await.unwrap();
        client.shutdown().await.unwrap();
        let outcome = dispatcher.run().await;

        // The dispatcher dropped both halves of its end on return.
        let mut output = Vec::new();
        client.read_to_end(&mut output).await.unwrap();
        (outcome, output)
    }

    fn request<A: crate::codec::WireEncode>(ordinal: u8, args: &A) -> Vec<u8> {
        build_request(&Selector::Ordinal(ordinal), args).unwrap().to_vec()
    }

    #[tokio::test]
    async fn test_void_writes_nothing_and_result_is_framed() {
        let mut input = request(1, &());
        input.extend(request(0, &(5i32, 2i32)));

        let (outcome, output) = run_session(SessionConfig::default(), &input).await;
        assert!(outcome.unwrap_err().is_disconnect());
        assert_eq!(output, build_response(&7i32).unwrap().to_vec());
    }

    #[tokio::test]
    async fn test_unknown_ordinal_ends_session() {
        let (outcome, output) = run_session(SessionConfig::default(), &[9]).await;
        assert!(matches!(
            outcome,
            Err(RpcError::Protocol(ProtocolViolation::UnknownOrdinal(9)))
        ));
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_name_selector() {
        let config = SessionConfig {
            selector_encoding: crate::config::SelectorEncoding::Name,
            ..SessionConfig::default()
        };
        let input = build_request(&Selector::Name("Add".into()), &(40i32, 2i32)).unwrap();

        let (_, output) = run_session(config, &input).await;
        assert_eq!(output, build_response(&42i32).unwrap().to_vec());
    }

    #[tokio::test]
    async fn test_handler_fault_ends_session_by_default() {
        let (outcome, output) = run_session(SessionConfig::default(), &request(2, &())).await;
        assert!(matches!(outcome, Err(RpcError::Handler { .. })));
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_handler_fault_reported_when_enabled() {
        let config = SessionConfig {
            report_handler_faults: true,
            ..SessionConfig::default()
        };
        let mut input = request(2, &());
        input.extend(request(0, &(1i32, 1i32)));

        let (outcome, output) = run_session(config, &input).await;
        assert!(outcome.unwrap_err().is_disconnect());

        let mut expected = build_fault("nope").unwrap().to_vec();
        expected.extend_from_slice(&build_response(&2i32).unwrap());
        assert_eq!(output, expected);
    }

    #[tokio::test]
    async fn test_truncated_request_is_disconnect() {
        let mut input = vec![0u8];
        input.extend_from_slice(&encode_to_bytes(&5i32).unwrap());
        let (outcome, output) = run_session(SessionConfig::default(), &input).await;
        assert!(outcome.unwrap_err().is_disconnect());
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_while_idle() {
        let (_client, server) = tokio::io::duplex(64);
        let (server_read, server_write) = tokio::io::split(server);
        let cancel = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            server_read,
            FrameWriter::new(server_write),
            registry(),
            SessionConfig::default(),
            cancel.clone(),
        );

        let task = tokio::spawn(dispatcher.run());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel.cancel();

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .expect("dispatcher should stop")
            .unwrap();
        assert!(outcome.is_ok());
    }
}
