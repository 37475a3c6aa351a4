//! Handler module - method declaration and dispatch targets.
//!
//! Provides:
//! - [`MethodRegistry`] - ordered method and event tables with their handlers
//! - [`MethodDescriptor`] / [`EventDescriptor`] - declared name, ordinal, signature
//! - [`Schema`] - JSON export of both tables
//!
//! Handlers take their arguments as one owned tuple and return
//! `Result<T, HandlerError>`:
//!
//! ```
//! use tinyrpc::handler::MethodRegistry;
//!
//! let mut registry = MethodRegistry::new();
//! registry.register("Echo", |(s,): (String,)| async move { Ok(s) });
//! registry.register_void("Log", |(level, msg): (u8, String)| async move {
//!     println!("[{level}] {msg}");
//!     Ok(())
//! });
//! ```

mod descriptor;
mod registry;
mod schema;

pub(crate) use descriptor::{Named, Table};
pub use descriptor::{EventDescriptor, MethodDescriptor, MAX_ENTRIES};
pub use registry::{
    BoxFuture, Handler, HandlerResult, Invocation, MethodEntry, MethodRegistry, TypedHandler,
    VoidHandler,
};
pub use schema::Schema;
