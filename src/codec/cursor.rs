//! Byte cursors for the wire codec.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CodecError, CodecResult};

/// Bounds-checked read cursor over a borrowed byte slice.
///
/// Reads never alias the buffer as another type; fixed-width values are
/// copied out as byte arrays and converted explicitly.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Create a cursor at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Check if every byte has been consumed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Fail with `Incomplete` unless `n` bytes are available.
    #[inline]
    pub fn require(&self, n: usize) -> CodecResult<()> {
        let remaining = self.remaining();
        if remaining < n {
            return Err(CodecError::Incomplete {
                needed: n - remaining,
            });
        }
        Ok(())
    }

    /// Consume `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        self.require(n)?;
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Consume exactly `N` bytes into an array.
    pub fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Consume a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }
}

/// Growable write cursor backed by `BytesMut`.
#[derive(Debug, Default, Clone)]
pub struct WireWriter {
    buf: BytesMut,
}

impl WireWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Create a writer with preallocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Append raw bytes.
    #[inline]
    pub fn put_slice(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Append a single byte.
    #[inline]
    pub fn put_u8(&mut self, b: u8) {
        self.buf.put_u8(b);
    }

    /// Bytes written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing has been written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// View the written bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Freeze into immutable `Bytes`.
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}
