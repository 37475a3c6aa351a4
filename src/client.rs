//! Calling side of a session.
//!
//! The [`ClientBuilder`] declares the peer's methods and events in the same
//! order the server declares them. The [`Client`] then:
//! 1. Listens on a transport and accepts the server (or takes a ready stream)
//! 2. Spawns a read task routing replies and events
//! 3. Issues calls one at a time
//!
//! # Example
//!
//! ```no_run
//! use tinyrpc::transport::{generate_pipe_name, PipeListener};
//! use tinyrpc::Client;
//!
//! # async fn demo() -> tinyrpc::Result<()> {
//! let name = generate_pipe_name();
//! let listener = PipeListener::bind(&name).await?;
//! // ... start the server process with `name` ...
//! let client = Client::builder()
//!     .method::<(i32, i32), i32>("Add")
//!     .method_void::<()>("Hi")
//!     .event::<(f64, String)>("OnData")
//!     .accept(&listener)
//!     .await?;
//!
//! client.on_event("OnData", |(value, text): (f64, String)| {
//!     println!("{} {}", value, text);
//! })?;
//! assert_eq!(client.call::<_, i32>("Add", &(2i32, 3i32)).await?, 5);
//! client.close().await
//! # }
//! ```

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, OwnedMutexGuard};
use tokio::task::JoinHandle;

use crate::cancel::CancellationToken;
use crate::codec::{decode_from_slice, Wire, WireDecode, WireEncode, WireReader, WireType};
use crate::config::{SelectorEncoding, SessionConfig};
use crate::error::{CodecResult, ProtocolViolation, Result, RpcError};
use crate::handler::{EventDescriptor, MethodDescriptor, Named, Table};
use crate::protocol::{build_request, FrameKind, IncomingBuffer, Selector};
use crate::transport::PipeListener;
use crate::writer::FrameWriter;

/// Walks one encoded value without keeping it.
type Skip = fn(&mut WireReader<'_>) -> CodecResult<()>;

/// Event callback over the raw payload.
type Subscriber = Arc<dyn Fn(&[u8]) + Send + Sync>;

fn skip<T: WireDecode>(r: &mut WireReader<'_>) -> CodecResult<()> {
    T::decode(r).map(drop)
}

/// Consume one value with `skip` and return a copy of its bytes.
fn capture(r: &mut WireReader<'_>, skip: Skip) -> CodecResult<Bytes> {
    let mut start = r.clone();
    skip(r)?;
    let len = r.position() - start.position();
    Ok(Bytes::copy_from_slice(start.read_bytes(len)?))
}

struct EventSlot {
    descriptor: EventDescriptor,
    skip: Skip,
}

impl Named for EventSlot {
    fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// Builder for configuring and connecting a client.
pub struct ClientBuilder {
    methods: Table<MethodDescriptor>,
    events: Table<EventSlot>,
    problems: Vec<String>,
    config: SessionConfig,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            methods: Table::new(),
            events: Table::new(),
            problems: Vec::new(),
            config: SessionConfig::default(),
        }
    }

    /// Declare a method taking `A` and returning `R`.
    pub fn method<A: Wire + ?Sized, R: Wire>(self, name: &str) -> Self {
        self.declare(name, A::wire_type(), Some(R::wire_type()))
    }

    /// Declare a void method taking `A`.
    pub fn method_void<A: Wire + ?Sized>(self, name: &str) -> Self {
        self.declare(name, A::wire_type(), None)
    }

    fn declare(mut self, name: &str, params: WireType, result: Option<WireType>) -> Self {
        match self.methods.next_ordinal("method", name) {
            Ok(ordinal) => self.methods.push(MethodDescriptor {
                name: name.to_string(),
                ordinal,
                params: params.into_components(),
                result,
            }),
            Err(problem) => self.problems.push(problem),
        }
        self
    }

    /// Declare an event the peer emits, with payload `A`.
    pub fn event<A: WireDecode>(mut self, name: &str) -> Self {
        match self.events.next_ordinal("event", name) {
            Ok(ordinal) => self.events.push(EventSlot {
                descriptor: EventDescriptor {
                    name: name.to_string(),
                    ordinal,
                    params: A::wire_type().into_components(),
                },
                skip: skip::<A>,
            }),
            Err(problem) => self.problems.push(problem),
        }
        self
    }

    /// Replace the whole session configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the number of bytes requested per transport read.
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.read_chunk_size = size;
        self
    }

    /// Bound every transport read.
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the request selector encoding. Must match the server's.
    pub fn selector_encoding(mut self, encoding: SelectorEncoding) -> Self {
        self.config.selector_encoding = encoding;
        self
    }

    /// Wait for the server to connect to `listener`.
    pub async fn accept(self, listener: &PipeListener) -> Result<Client> {
        self.validate()?;
        let stream = listener.accept().await?;
        tracing::info!(transport = listener.path(), "server connected");
        let (reader, writer) = stream.into_split();
        self.from_stream(reader, writer)
    }

    /// Start over an already connected duplex stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_stream<R, W>(self, reader: R, writer: W) -> Result<Client>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.validate()?;

        let shared = Arc::new(Shared {
            methods: self.methods,
            events: self.events,
            subscribers: Mutex::new(HashMap::new()),
            pending: Mutex::new(None),
            healthy: AtomicBool::new(true),
        });
        let cancel = CancellationToken::new();
        let incoming = IncomingBuffer::with_config(reader, &self.config);
        let reader_task = tokio::spawn(read_loop(incoming, shared.clone(), cancel.clone()));

        Ok(Client {
            shared,
            writer: FrameWriter::new(writer),
            config: self.config,
            call_lock: Arc::new(tokio::sync::Mutex::new(())),
            cancel,
            reader_task: Some(reader_task),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.problems.is_empty() {
            Ok(())
        } else {
            Err(RpcError::Config(self.problems.join("; ")))
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The call in flight.
///
/// Holds the call lock until its reply has been read, so an abandoned call
/// can never have its reply claimed by the next one.
struct Pending {
    skip: Skip,
    reply: oneshot::Sender<Result<Bytes>>,
    _turn: OwnedMutexGuard<()>,
}

struct Shared {
    methods: Table<MethodDescriptor>,
    events: Table<EventSlot>,
    subscribers: Mutex<HashMap<u8, Vec<Subscriber>>>,
    pending: Mutex<Option<Pending>>,
    healthy: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn take_pending(&self) -> Option<Pending> {
        lock(&self.pending).take()
    }

    fn publish(&self, ordinal: u8, payload: &[u8]) {
        let subscribers = lock(&self.subscribers)
            .get(&ordinal)
            .cloned()
            .unwrap_or_default();
        for subscriber in subscribers {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| subscriber(payload)));
            if delivered.is_err() {
                tracing::error!(ordinal, "event subscriber panicked");
            }
        }
    }
}

/// A connected client.
pub struct Client {
    shared: Arc<Shared>,
    writer: FrameWriter,
    config: SessionConfig,
    call_lock: Arc<tokio::sync::Mutex<()>>,
    cancel: CancellationToken,
    reader_task: Option<JoinHandle<Result<()>>>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Check if the read task is still running.
    pub fn is_healthy(&self) -> bool {
        self.shared.healthy.load(Ordering::SeqCst)
    }

    /// Call a method and wait for its result.
    ///
    /// A fault frame from the server is returned as [`RpcError::RemoteFault`].
    pub async fn call<A, R>(&self, name: &str, args: &A) -> Result<R>
    where
        A: WireEncode + ?Sized,
        R: WireDecode,
    {
        let method = self.method(name, A::wire_type())?;
        if method.result.as_ref() != Some(&R::wire_type()) {
            return Err(RpcError::Config(format!(
                "method '{}' returns {:?}, not {:?}",
                name,
                method.result,
                R::wire_type()
            )));
        }
        let frame = build_request(&self.selector(method), args)?;

        let turn = self.call_lock.clone().lock_owned().await;
        let (tx, rx) = oneshot::channel();
        *lock(&self.shared.pending) = Some(Pending {
            skip: skip::<R>,
            reply: tx,
            _turn: turn,
        });

        // The read task marks itself unhealthy before draining `pending`.
        if !self.is_healthy() && self.shared.take_pending().is_some() {
            return Err(RpcError::Disconnected);
        }

        tracing::debug!(method = name, ordinal = method.ordinal, "calling");
        if let Err(e) = self.writer.write_frame(frame).await {
            self.shared.take_pending();
            return Err(e);
        }

        let payload = rx.await.map_err(|_| RpcError::Disconnected)??;
        Ok(decode_from_slice(&payload)?)
    }

    /// Call a void method. Returns once the request is written.
    pub async fn call_void<A>(&self, name: &str, args: &A) -> Result<()>
    where
        A: WireEncode + ?Sized,
    {
        let method = self.method(name, A::wire_type())?;
        if !method.is_void() {
            return Err(RpcError::Config(format!(
                "method '{}' returns a value; use call",
                name
            )));
        }
        if !self.is_healthy() {
            return Err(RpcError::Disconnected);
        }
        let frame = build_request(&self.selector(method), args)?;

        let _turn = self.call_lock.lock().await;
        tracing::debug!(method = name, ordinal = method.ordinal, "calling void");
        self.writer.write_frame(frame).await
    }

    /// Subscribe to the event declared as `name`.
    ///
    /// Callbacks run on the read task in arrival order and should return
    /// quickly; hand heavy work to another task.
    pub fn on_event<A, F>(&self, name: &str, callback: F) -> Result<()>
    where
        A: WireDecode + 'static,
        F: Fn(A) + Send + Sync + 'static,
    {
        let slot = self
            .shared
            .events
            .get(name)
            .ok_or_else(|| RpcError::Config(format!("unknown event '{}'", name)))?;
        let declared = &slot.descriptor;
        let actual = A::wire_type().into_components();
        if actual != declared.params {
            return Err(RpcError::Config(format!(
                "event '{}' carries {:?}, got {:?}",
                name, declared.params, actual
            )));
        }

        let event = declared.name.clone();
        let subscriber: Subscriber = Arc::new(move |payload: &[u8]| {
            match decode_from_slice::<A>(payload) {
                Ok(args) => callback(args),
                Err(e) => tracing::warn!(event = %event, "undecodable event payload: {}", e),
            }
        });
        lock(&self.shared.subscribers)
            .entry(declared.ordinal)
            .or_default()
            .push(subscriber);
        Ok(())
    }

    /// Stop the read task and shut the transport down.
    ///
    /// Returns the fault that ended the read task, if one did and no call
    /// was waiting to receive it.
    pub async fn close(mut self) -> Result<()> {
        self.cancel.cancel();
        let outcome = match self.reader_task.take() {
            Some(task) => task
                .await
                .map_err(|e| RpcError::TaskFailed(e.to_string()))?,
            None => Ok(()),
        };
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!("transport shutdown: {}", e);
        }
        outcome
    }

    fn method(&self, name: &str, args: WireType) -> Result<&MethodDescriptor> {
        let method = self
            .shared
            .methods
            .get(name)
            .ok_or_else(|| RpcError::Config(format!("unknown method '{}'", name)))?;
        let args = args.into_components();
        if args != method.params {
            return Err(RpcError::Config(format!(
                "method '{}' takes {:?}, got {:?}",
                name, method.params, args
            )));
        }
        Ok(method)
    }

    fn selector(&self, method: &MethodDescriptor) -> Selector {
        match self.config.selector_encoding {
            SelectorEncoding::Ordinal => Selector::Ordinal(method.ordinal),
            SelectorEncoding::Name => Selector::Name(method.name.clone()),
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if self.reader_task.is_some() {
            self.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("healthy", &self.is_healthy())
            .field("methods", &self.shared.methods.len())
            .field("events", &self.shared.events.len())
            .finish_non_exhaustive()
    }
}

/// Route incoming frames until cancelled or the session ends.
///
/// A session-ending fault goes to the call in flight if there is one;
/// otherwise it is the task's result.
async fn read_loop<R>(
    mut incoming: IncomingBuffer<R>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let outcome = route_frames(&mut incoming, &shared, &cancel).await;
    shared.healthy.store(false, Ordering::SeqCst);

    match outcome {
        Ok(()) => {
            tracing::debug!("read loop stopped");
            Ok(())
        }
        Err(e) => {
            match &e {
                RpcError::Disconnected => tracing::info!("server disconnected"),
                other => tracing::warn!("read loop failed: {}", other),
            }
            match shared.take_pending() {
                Some(pending) => {
                    let _ = pending.reply.send(Err(e));
                    Ok(())
                }
                None => Err(e),
            }
        }
    }
}

async fn route_frames<R>(
    incoming: &mut IncomingBuffer<R>,
    shared: &Shared,
    cancel: &CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        if cancel.is_cancelled() || !incoming.wait_for_data(cancel).await? {
            return Ok(());
        }

        let kind = incoming
            .decode_next(|r| Ok(FrameKind::from_byte(r.read_u8()?)?))
            .await?;

        match kind {
            FrameKind::Response => {
                let pending = shared
                    .take_pending()
                    .ok_or(ProtocolViolation::UnsolicitedResponse)?;
                let payload = incoming.decode_next(|r| capture(r, pending.skip)).await?;
                let _ = pending.reply.send(Ok(payload));
            }
            FrameKind::Fault => {
                let pending = shared
                    .take_pending()
                    .ok_or(ProtocolViolation::UnsolicitedResponse)?;
                let message: String = incoming.decode_next(|r| String::decode(r)).await?;
                tracing::debug!(%message, "call faulted");
                let _ = pending.reply.send(Err(RpcError::RemoteFault(message)));
            }
            FrameKind::Event => {
                let ordinal = incoming.decode_next(|r| r.read_u8()).await?;
                let slot = shared
                    .events
                    .get_ordinal(ordinal)
                    .ok_or(ProtocolViolation::UnknownEvent(ordinal))?;
                let payload = incoming.decode_next(|r| capture(r, slot.skip)).await?;
                tracing::trace!(event = %slot.descriptor.name, "event received");
                shared.publish(ordinal, &payload);
            }
        }
    }
}
