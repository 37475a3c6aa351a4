//! Session configuration.

use std::time::Duration;

use serde::Serialize;

/// Default number of bytes requested per transport read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 100;

/// Default per-read timeout (none: block until data or disconnect).
pub const DEFAULT_READ_TIMEOUT: Option<Duration> = None;

/// How a request frame names its target method.
///
/// Both peers must agree; there is no negotiation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorEncoding {
    /// One byte: the 0-based declaration index of the method.
    #[default]
    Ordinal,
    /// A length-prefixed method name.
    Name,
}

/// Knobs shared by the serving and invoking sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Bytes requested per transport read.
    pub read_chunk_size: usize,
    /// Maximum time a single read may block.
    pub read_timeout: Option<Duration>,
    /// Request selector encoding.
    pub selector_encoding: SelectorEncoding,
    /// Answer a failed non-void handler with a fault frame instead of
    /// ending the session.
    pub report_handler_faults: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            selector_encoding: SelectorEncoding::default(),
            report_handler_faults: false,
        }
    }
}
