//! Platform-specific pipe/socket implementation.
//!
//! - Unix: Unix Domain Socket
//! - Windows: Named Pipe
//!
//! Transport names are short identifiers shared by both peers. On Unix a
//! name without a `/` maps to `<tmp>/<name>.sock` and anything else is used
//! as a path; on Windows a name maps to `\\.\pipe\<name>` unless it already
//! starts with `\\`.
//!
//! # Example
//!
//! ```no_run
//! use tinyrpc::transport::{connect, generate_pipe_name, PipeListener};
//!
//! # async fn demo() -> tinyrpc::Result<()> {
//! let name = generate_pipe_name();
//! let listener = PipeListener::bind(&name).await?;
//! let server_side = connect(&name).await?;
//! let client_side = listener.accept().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, RpcError};
use tokio::io::{AsyncRead, AsyncWrite};

/// Generate a unique transport name for this process.
///
/// Format: `tinyrpc-{pid}-{random}`.
pub fn generate_pipe_name() -> String {
    format!("tinyrpc-{}-{:x}", std::process::id(), rand_u64())
}

/// Simple random u64 using system time, process ID and a call counter.
fn rand_u64() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = u64::from(std::process::id());

    nanos.wrapping_mul(0x517c_c1b7_2722_0a95) ^ pid ^ seq.rotate_left(32)
}

/// Platform path for a transport name.
pub fn pipe_path(name: &str) -> String {
    #[cfg(unix)]
    {
        if name.contains('/') {
            name.to_string()
        } else {
            std::env::temp_dir()
                .join(format!("{}.sock", name))
                .to_string_lossy()
                .into_owned()
        }
    }

    #[cfg(windows)]
    {
        if name.starts_with(r"\\") {
            name.to_string()
        } else {
            format!(r"\\.\pipe\{}", name)
        }
    }
}

/// Open the transport named `name`.
///
/// Failure is reported as [`RpcError::Connect`]; there is no retry.
pub async fn connect(name: &str) -> Result<PipeStream> {
    let path = pipe_path(name);
    tracing::debug!(%path, "connecting");
    PipeStream::connect(&path).await.map_err(|source| RpcError::Connect {
        name: name.to_string(),
        source,
    })
}

// ============================================================================
// Unix Implementation
// ============================================================================

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use std::path::Path;
    use tokio::net::{UnixListener, UnixStream};

    /// Unix Domain Socket listener.
    pub struct PipeListener {
        listener: UnixListener,
        path: String,
    }

    /// Unix Domain Socket stream (connected).
    #[derive(Debug)]
    pub struct PipeStream {
        stream: UnixStream,
    }

    impl PipeListener {
        /// Bind to the socket for `name`.
        ///
        /// Removes any stale socket file at the path before binding.
        pub async fn bind(name: &str) -> Result<Self> {
            let path = pipe_path(name);
            if Path::new(&path).exists() {
                std::fs::remove_file(&path)?;
            }

            let listener = UnixListener::bind(&path)?;
            Ok(Self { listener, path })
        }

        /// Accept a single connection.
        pub async fn accept(&self) -> Result<PipeStream> {
            let (stream, _addr) = self.listener.accept().await?;
            Ok(PipeStream { stream })
        }

        /// Get the socket path.
        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl Drop for PipeListener {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    impl PipeStream {
        pub(super) async fn connect(path: &str) -> std::io::Result<Self> {
            let stream = UnixStream::connect(path).await?;
            Ok(Self { stream })
        }

        /// Split into owned read and write halves.
        pub fn into_split(
            self,
        ) -> (
            impl AsyncRead + Send + Unpin + 'static,
            impl AsyncWrite + Send + Unpin + 'static,
        ) {
            self.stream.into_split()
        }
    }

    impl AsyncRead for PipeStream {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::pin::Pin::new(&mut self.stream).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for PipeStream {
        fn poll_write(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::pin::Pin::new(&mut self.stream).poll_write(cx, buf)
        }

        fn poll_flush(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::pin::Pin::new(&mut self.stream).poll_flush(cx)
        }

        fn poll_shutdown(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::pin::Pin::new(&mut self.stream).poll_shutdown(cx)
        }
    }
}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use std::sync::Mutex;
    use tokio::net::windows::named_pipe::{
        ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions,
    };

    /// Windows Named Pipe listener.
    pub struct PipeListener {
        path: String,
        /// Instance created by `bind`, handed out by the first `accept`.
        pending: Mutex<Option<NamedPipeServer>>,
    }

    #[derive(Debug)]
    enum Inner {
        Server(NamedPipeServer),
        Client(NamedPipeClient),
    }

    /// Windows Named Pipe stream (connected), either end.
    #[derive(Debug)]
    pub struct PipeStream {
        pipe: Inner,
    }

    impl PipeListener {
        /// Create the Named Pipe for `name`.
        pub async fn bind(name: &str) -> Result<Self> {
            let path = pipe_path(name);
            let first = ServerOptions::new()
                .first_pipe_instance(true)
                .create(&path)?;

            Ok(Self {
                path,
                pending: Mutex::new(Some(first)),
            })
        }

        /// Accept a single connection.
        pub async fn accept(&self) -> Result<PipeStream> {
            let pending = self.pending.lock().ok().and_then(|mut slot| slot.take());
            let server = match pending {
                Some(server) => server,
                None => ServerOptions::new().create(&self.path)?,
            };

            server.connect().await?;
            Ok(PipeStream {
                pipe: Inner::Server(server),
            })
        }

        /// Get the pipe path.
        pub fn path(&self) -> &str {
            &self.path
        }
    }

    impl PipeStream {
        pub(super) async fn connect(path: &str) -> std::io::Result<Self> {
            let client = ClientOptions::new().open(path)?;
            Ok(Self {
                pipe: Inner::Client(client),
            })
        }

        /// Split into read and write halves.
        pub fn into_split(
            self,
        ) -> (
            impl AsyncRead + Send + Unpin + 'static,
            impl AsyncWrite + Send + Unpin + 'static,
        ) {
            tokio::io::split(self)
        }
    }

    macro_rules! with_pipe {
        ($self:ident, $p:ident => $e:expr) => {
            match &mut $self.pipe {
                Inner::Server($p) => $e,
                Inner::Client($p) => $e,
            }
        };
    }

    impl AsyncRead for PipeStream {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            with_pipe!(self, p => std::pin::Pin::new(p).poll_read(cx, buf))
        }
    }

    impl AsyncWrite for PipeStream {
        fn poll_write(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            with_pipe!(self, p => std::pin::Pin::new(p).poll_write(cx, buf))
        }

        fn poll_flush(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            with_pipe!(self, p => std::pin::Pin::new(p).poll_flush(cx))
        }

        fn poll_shutdown(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            with_pipe!(self, p => std::pin::Pin::new(p).poll_shutdown(cx))
        }
    }
}

// ============================================================================
// Platform-independent re-exports
// ============================================================================

#[cfg(unix)]
pub use unix_impl::{PipeListener, PipeStream};

#[cfg(windows)]
pub use windows_impl::{PipeListener, PipeStream};
