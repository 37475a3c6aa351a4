//! Duplex transport between the two peers.
//!
//! A transport is addressed by a short name both sides agree on. The
//! invoking side binds a [`PipeListener`] and waits; the serving side opens
//! it with [`connect`]. Unix builds use domain sockets, Windows builds use
//! named pipes.

mod pipe;

pub use pipe::{connect, generate_pipe_name, pipe_path, PipeListener, PipeStream};
