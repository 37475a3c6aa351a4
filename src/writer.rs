//! Serialized frame output.
//!
//! Responses from the dispatch task and events from any number of emitter
//! tasks share one transport. Every frame is encoded in full before the
//! write lock is taken, then written and flushed under the lock, so frames
//! never interleave on the wire.
//!
//! The locked write runs on its own task. A caller that is cancelled while
//! waiting (a timeout, a losing `select!` branch) only stops waiting; a frame
//! that has been handed over is always written to the end.
//!
//! # Architecture
//!
//! ```text
//! Dispatcher ──┐
//! Emitter 1 ───┼─► FrameWriter (Mutex<write half>) ─► Pipe
//! Emitter N ───┘       (one spawned write per frame)
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::codec::{WireEncode, WireType};
use crate::error::{Result, RpcError};
use crate::handler::{EventDescriptor, MethodRegistry};
use crate::protocol::build_event;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Write half of the transport behind an async lock.
///
/// Cheap to clone; all clones share the same lock.
#[derive(Clone)]
pub struct FrameWriter {
    inner: Arc<Mutex<BoxedWriter>>,
}

impl FrameWriter {
    /// Wrap the write half of a transport.
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Write one complete frame atomically with respect to other writers.
    ///
    /// Dropping the returned future does not truncate the frame.
    pub async fn write_frame(&self, frame: Bytes) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        let write = tokio::spawn(async move {
            let mut writer = inner.lock().await;
            writer.write_all(&frame).await.map_err(RpcError::from_io)?;
            writer.flush().await.map_err(RpcError::from_io)?;
            tracing::trace!(bytes = frame.len(), "wrote frame");
            Ok(())
        });
        write
            .await
            .map_err(|e| RpcError::TaskFailed(e.to_string()))?
    }

    /// Shut the write half down. Waits for any frame in progress.
    pub async fn shutdown(&self) -> Result<()> {
        let mut writer = self.inner.lock().await;
        writer.shutdown().await.map_err(RpcError::from_io)
    }
}

impl std::fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter").finish_non_exhaustive()
    }
}

/// Handle for pushing events to the peer.
///
/// Clone it into as many tasks as needed; every emit is one whole frame.
#[derive(Clone, Debug)]
pub struct EventEmitter {
    writer: FrameWriter,
    registry: Arc<MethodRegistry>,
}

impl EventEmitter {
    pub(crate) fn new(writer: FrameWriter, registry: Arc<MethodRegistry>) -> Self {
        Self { writer, registry }
    }

    /// Emit the event declared as `name`.
    ///
    /// `args` must have exactly the declared payload signature.
    pub async fn emit<A>(&self, name: &str, args: &A) -> Result<()>
    where
        A: WireEncode + ?Sized,
    {
        let event = self
            .registry
            .event(name)
            .ok_or_else(|| RpcError::Config(format!("unknown event '{}'", name)))?;
        self.send(event, args).await
    }

    /// Emit the event with the given ordinal.
    pub async fn emit_ordinal<A>(&self, ordinal: u8, args: &A) -> Result<()>
    where
        A: WireEncode + ?Sized,
    {
        let event = self
            .registry
            .event_by_ordinal(ordinal)
            .ok_or_else(|| RpcError::Config(format!("unknown event #{}", ordinal)))?;
        self.send(event, args).await
    }

    async fn send<A>(&self, event: &EventDescriptor, args: &A) -> Result<()>
    where
        A: WireEncode + ?Sized,
    {
        check_signature(event, A::wire_type())?;
        let frame: Bytes = build_event(event.ordinal, args)?;
        tracing::debug!(event = %event.name, ordinal = event.ordinal, "emitting event");
        self.writer.write_frame(frame).await
    }
}

fn check_signature(event: &EventDescriptor, actual: WireType) -> Result<()> {
    let actual = actual.into_components();
    if actual != event.params {
        return Err(RpcError::Config(format!(
            "event '{}' expects {:?}, got {:?}",
            event.name, event.params, actual
        )));
    }
    Ok(())
}
