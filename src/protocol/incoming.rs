//! Incoming byte accumulation.
//!
//! Bytes arrive from the transport in arbitrary fragments. The buffer keeps
//! whatever has been read but not yet consumed and tops it up in chunks of
//! `read_chunk_size` until the codec is satisfied.
//!
//! # Example
//!
//! ```
//! use tinyrpc::protocol::IncomingBuffer;
//!
//! # tokio_test_block_on(async {
//! let data: &[u8] = &[1, 0, 0, 0, 9];
//! let mut incoming = IncomingBuffer::new(data, 2);
//!
//! incoming.ensure_available(4).await.unwrap();
//! assert!(incoming.len() >= 4);
//! let head = incoming.take(4).unwrap();
//! assert_eq!(&head[..], &[1, 0, 0, 0]);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::cancel::CancellationToken;
use crate::codec::WireReader;
use crate::config::SessionConfig;
use crate::error::{CodecError, CodecResult, Result, RpcError};

/// Read-side accumulation buffer over an async byte source.
pub struct IncomingBuffer<R> {
    reader: R,
    buffer: BytesMut,
    chunk_size: usize,
    read_timeout: Option<Duration>,
}

impl<R: AsyncRead + Unpin> IncomingBuffer<R> {
    /// Create a buffer reading `chunk_size` bytes at a time.
    pub fn new(reader: R, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            reader,
            buffer: BytesMut::with_capacity(chunk_size),
            chunk_size,
            read_timeout: None,
        }
    }

    /// Create a buffer from session settings.
    pub fn with_config(reader: R, config: &SessionConfig) -> Self {
        let mut incoming = Self::new(reader, config.read_chunk_size);
        incoming.read_timeout = config.read_timeout;
        incoming
    }

    /// Bound every transport read by `timeout`.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    /// Buffered, unconsumed bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if nothing is buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// View the buffered bytes without consuming them.
    #[inline]
    pub fn peek(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop `n` bytes from the front; at most everything buffered.
    pub fn advance(&mut self, n: usize) {
        let n = n.min(self.buffer.len());
        self.buffer.advance(n);
    }

    /// Read until at least `min` bytes are buffered.
    pub async fn ensure_available(&mut self, min: usize) -> Result<()> {
        while self.buffer.len() < min {
            self.read_chunk().await?;
        }
        Ok(())
    }

    /// Detach the first `n` buffered bytes.
    pub fn take(&mut self, n: usize) -> CodecResult<Bytes> {
        let len = self.buffer.len();
        if len < n {
            return Err(CodecError::Incomplete { needed: n - len });
        }
        Ok(self.buffer.split_to(n).freeze())
    }

    /// Run `decode` over the buffered bytes, reading more until it stops
    /// asking for them, then retire exactly the bytes it consumed.
    ///
    /// Every retry decodes from the start, so after the shortfall is read
    /// the buffer is also topped up with whatever the transport already
    /// holds, up to twice its previous length. Retries stay logarithmic in
    /// the frame size while the transport keeps up.
    pub async fn decode_next<T, F>(&mut self, mut decode: F) -> Result<T>
    where
        F: FnMut(&mut WireReader<'_>) -> CodecResult<T>,
    {
        loop {
            let mut r = WireReader::new(&self.buffer);
            match decode(&mut r) {
                Ok(value) => {
                    let used = r.position();
                    self.buffer.advance(used);
                    return Ok(value);
                }
                Err(CodecError::Incomplete { needed }) => {
                    let buffered = self.buffer.len();
                    self.ensure_available(buffered + needed).await?;
                    self.read_ready(buffered.saturating_mul(2)).await?;
                }
                Err(CodecError::Violation(v)) => return Err(v.into()),
            }
        }
    }

    /// Wait at a frame boundary until at least one byte is buffered.
    ///
    /// Returns `false` if `cancel` fired first. Nothing is lost when the
    /// wait is abandoned.
    pub async fn wait_for_data(&mut self, cancel: &CancellationToken) -> Result<bool> {
        if !self.buffer.is_empty() {
            return Ok(true);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(false),
            read = self.read_chunk() => read.map(|_| true),
        }
    }

    /// Read without waiting until `target` bytes are buffered or the
    /// transport has nothing more on hand.
    async fn read_ready(&mut self, target: usize) -> Result<()> {
        while self.buffer.len() < target {
            let read = tokio::select! {
                biased;
                read = self.read_chunk() => Some(read),
                _ = std::future::ready(()) => None,
            };
            match read {
                Some(Ok(_)) => {}
                // end of stream surfaces on the next blocking read
                Some(Err(RpcError::Disconnected)) | None => break,
                Some(Err(e)) => return Err(e),
            }
        }
        Ok(())
    }

    /// One transport read of at most `chunk_size` bytes.
    async fn read_chunk(&mut self) -> Result<usize> {
        if self.buffer.capacity() - self.buffer.len() < self.chunk_size {
            self.buffer.reserve(self.chunk_size);
        }

        let mut limited = (&mut self.buffer).limit(self.chunk_size);
        let read = self.reader.read_buf(&mut limited);
        let result = match self.read_timeout {
            Some(timeout) => tokio::time::timeout(timeout, read)
                .await
                .map_err(|_| RpcError::Timeout(timeout))?,
            None => read.await,
        };

        match result {
            Ok(0) => Err(RpcError::Disconnected),
            Ok(n) => {
                tracing::trace!(bytes = n, buffered = self.buffer.len(), "read chunk");
                Ok(n)
            }
            Err(e) => Err(RpcError::from_io(e)),
        }
    }
}

impl<R> std::fmt::Debug for IncomingBuffer<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingBuffer")
            .field("buffered", &self.buffer.len())
            .field("chunk_size", &self.chunk_size)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::WireDecode;
    use crate::error::ProtocolViolation;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_reads_in_chunks() {
        let data: &[u8] = &[0u8; 250];
        let mut incoming = IncomingBuffer::new(data, 100);

        incoming.ensure_available(1).await.unwrap();
        assert_eq!(incoming.len(), 100);

        incoming.ensure_available(150).await.unwrap();
        assert_eq!(incoming.len(), 200);

        incoming.ensure_available(250).await.unwrap();
        assert_eq!(incoming.len(), 250);
    }

    #[tokio::test]
    async fn test_take_and_retire() {
        let data: &[u8] = b"abcdef";
        let mut incoming = IncomingBuffer::new(data, 100);
        incoming.ensure_available(6).await.unwrap();

        assert_eq!(&incoming.take(2).unwrap()[..], b"ab");
        assert_eq!(incoming.peek(), b"cdef");
        assert_eq!(incoming.take(9), Err(CodecError::Incomplete { needed: 5 }));

        incoming.advance(3);
        assert_eq!(incoming.peek(), b"f");
    }

    #[tokio::test]
    async fn test_empty_read_is_disconnect() {
        let data: &[u8] = &[1, 2];
        let mut incoming = IncomingBuffer::new(data, 100);
        let err = incoming.ensure_available(3).await.unwrap_err();
        assert!(err.is_disconnect());
        // bytes read before the disconnect are still there
        assert_eq!(incoming.len(), 2);
    }

    #[tokio::test]
    async fn test_decode_next_across_fragments() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut incoming = IncomingBuffer::new(rx, 100);

        let writer = tokio::spawn(async move {
            for b in b"\x05hello\x02ok" {
                tx.write_all(&[*b]).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        let first = incoming.decode_next(String::decode).await.unwrap();
        let second = incoming.decode_next(String::decode).await.unwrap();
        assert_eq!(first, "hello");
        assert_eq!(second, "ok");
        assert!(incoming.is_empty());
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_decode_next_large_sequence() {
        let strings: Vec<String> = (0..2000).map(|i| format!("{:040}", i)).collect();
        let encoded = crate::codec::encode_to_bytes(&strings).unwrap();
        let mut incoming = IncomingBuffer::new(&encoded[..], 100);

        let mut attempts = 0;
        let decoded = incoming
            .decode_next(|r| {
                attempts += 1;
                Vec::<String>::decode(r)
            })
            .await
            .unwrap();

        assert_eq!(decoded, strings);
        assert!(incoming.is_empty());
        // one retry per doubling, not one per chunk
        assert!(attempts < 32, "decoded {} times", attempts);
    }

    #[tokio::test]
    async fn test_decode_next_does_not_wait_past_frame() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut incoming = IncomingBuffer::new(rx, 4);

        // the peer sends one frame and then waits
        tx.write_all(b"\x05hello").await.unwrap();
        let first = incoming.decode_next(String::decode).await.unwrap();
        assert_eq!(first, "hello");
        drop(tx);
    }

    #[tokio::test]
    async fn test_decode_next_violation() {
        let data: &[u8] = &[2, 0xC3, 0x28];
        let mut incoming = IncomingBuffer::new(data, 100);
        let err = incoming.decode_next(String::decode).await.unwrap_err();
        assert!(matches!(
            err,
            RpcError::Protocol(ProtocolViolation::InvalidUtf8)
        ));
    }

    #[tokio::test]
    async fn test_wait_for_data_observes_cancel() {
        let (_tx, rx) = tokio::io::duplex(64);
        let mut incoming = IncomingBuffer::new(rx, 100);
        let cancel = CancellationToken::new();

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stopper.cancel();
        });

        assert!(!incoming.wait_for_data(&cancel).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (_tx, rx) = tokio::io::duplex(64);
        let mut incoming = IncomingBuffer::new(rx, 100);
        incoming.set_read_timeout(Some(Duration::from_millis(20)));

        let err = incoming.ensure_available(1).await.unwrap_err();
        assert!(matches!(err, RpcError::Timeout(d) if d == Duration::from_millis(20)));
    }
}
