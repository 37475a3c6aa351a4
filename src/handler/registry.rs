//! Method registry for dispatching requests by selector.
//!
//! Methods receive ordinals in declaration order starting from 0; events
//! have their own ordinal space, also starting from 0. Both tables are
//! fixed once the server starts.
//!
//! # Example
//!
//! ```
//! use tinyrpc::handler::MethodRegistry;
//!
//! let mut registry = MethodRegistry::new();
//! registry.register("Add", |(a, b): (i32, i32)| async move { Ok(a.wrapping_add(b)) });
//! registry.register_void("Hi", |(): ()| async { Ok(()) });
//! registry.register_event::<(f64, String)>("OnData");
//!
//! registry.validate().unwrap();
//! assert_eq!(registry.method("Hi").unwrap().ordinal, 1);
//! assert!(registry.method("Hi").unwrap().is_void());
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;

use super::descriptor::{EventDescriptor, MethodDescriptor, Named, Table};
use super::schema::Schema;
use crate::codec::{Wire, WireDecode, WireEncode, WireReader, WireType};
use crate::config::SelectorEncoding;
use crate::error::{CodecResult, HandlerError, ProtocolViolation, Result, RpcError};
use crate::protocol::{build_response, Selector};

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Pending handler run. Resolves to the encoded response frame, or `None`
/// for void methods.
pub type Invocation = BoxFuture<'static, Result<Option<Bytes>>>;

/// Result type business handlers return.
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

/// Type-erased method handler.
pub trait Handler: Send + Sync + 'static {
    /// Decode the arguments from `args` and prepare the call.
    ///
    /// Must not have side effects before the arguments are complete: on
    /// `Incomplete` the caller reads more and decodes again.
    fn decode(&self, args: &mut WireReader<'_>) -> CodecResult<Invocation>;
}

/// Handler producing a typed result.
pub struct TypedHandler<F, A, R, Fut> {
    method: Arc<str>,
    handler: F,
    _phantom: PhantomData<fn(A) -> (R, Fut)>,
}

impl<F, A, R, Fut> TypedHandler<F, A, R, Fut> {
    /// Wrap `handler` for the method named `method`.
    pub fn new(method: &str, handler: F) -> Self {
        Self {
            method: Arc::from(method),
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, A, R, Fut> Handler for TypedHandler<F, A, R, Fut>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    A: WireDecode + Send + 'static,
    R: WireEncode + Send + 'static,
    Fut: Future<Output = HandlerResult<R>> + Send + 'static,
{
    fn decode(&self, args: &mut WireReader<'_>) -> CodecResult<Invocation> {
        let args = A::decode(args)?;
        let fut = (self.handler)(args);
        let method = self.method.clone();

        Ok(Box::pin(async move {
            match fut.await {
                Ok(value) => Ok(Some(build_response(&value)?)),
                Err(source) => Err(RpcError::Handler {
                    method: method.to_string(),
                    source,
                }),
            }
        }))
    }
}

/// Handler for a method with no result.
pub struct VoidHandler<F, A, Fut> {
    method: Arc<str>,
    handler: F,
    _phantom: PhantomData<fn(A) -> Fut>,
}

impl<F, A, Fut> VoidHandler<F, A, Fut> {
    /// Wrap `handler` for the method named `method`.
    pub fn new(method: &str, handler: F) -> Self {
        Self {
            method: Arc::from(method),
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, A, Fut> Handler for VoidHandler<F, A, Fut>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    A: WireDecode + Send + 'static,
    Fut: Future<Output = HandlerResult<()>> + Send + 'static,
{
    fn decode(&self, args: &mut WireReader<'_>) -> CodecResult<Invocation> {
        let args = A::decode(args)?;
        let fut = (self.handler)(args);
        let method = self.method.clone();

        Ok(Box::pin(async move {
            fut.await.map_err(|source| RpcError::Handler {
                method: method.to_string(),
                source,
            })?;
            Ok(None)
        }))
    }
}

/// Entry for a registered method.
pub struct MethodEntry {
    descriptor: MethodDescriptor,
    handler: Box<dyn Handler>,
}

impl MethodEntry {
    /// Declared name, ordinal and signature.
    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    /// Type-erased handler.
    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }
}

impl Named for MethodEntry {
    fn name(&self) -> &str {
        &self.descriptor.name
    }
}

impl std::fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodEntry")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Registry of methods and events.
///
/// Declaration problems are collected as they happen and reported together
/// by [`validate`](Self::validate), so registration can stay chainable.
#[derive(Debug, Default)]
pub struct MethodRegistry {
    methods: Table<MethodEntry>,
    events: Table<EventDescriptor>,
    problems: Vec<String>,
}

impl MethodRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method that returns a value.
    pub fn register<F, A, R, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        A: WireDecode + Send + 'static,
        R: WireEncode + Send + 'static,
        Fut: Future<Output = HandlerResult<R>> + Send + 'static,
    {
        self.insert_method(
            name,
            A::wire_type().into_components(),
            Some(R::wire_type()),
            Box::new(TypedHandler::<F, A, R, Fut>::new(name, handler)),
        );
    }

    /// Register a void method. Nothing is written back when it completes.
    pub fn register_void<F, A, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        A: WireDecode + Send + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        self.insert_method(
            name,
            A::wire_type().into_components(),
            None,
            Box::new(VoidHandler::<F, A, Fut>::new(name, handler)),
        );
    }

    /// Declare an event with payload signature `A`.
    pub fn register_event<A: Wire + ?Sized>(&mut self, name: &str) {
        match self.events.next_ordinal("event", name) {
            Ok(ordinal) => self.events.push(EventDescriptor {
                name: name.to_string(),
                ordinal,
                params: A::wire_type().into_components(),
            }),
            Err(problem) => self.problems.push(problem),
        }
    }

    fn insert_method(
        &mut self,
        name: &str,
        params: Vec<WireType>,
        result: Option<WireType>,
        handler: Box<dyn Handler>,
    ) {
        match self.methods.next_ordinal("method", name) {
            Ok(ordinal) => self.methods.push(MethodEntry {
                descriptor: MethodDescriptor {
                    name: name.to_string(),
                    ordinal,
                    params,
                    result,
                },
                handler,
            }),
            Err(problem) => self.problems.push(problem),
        }
    }

    /// Fail with every declaration problem seen so far.
    pub fn validate(&self) -> Result<()> {
        if self.problems.is_empty() {
            Ok(())
        } else {
            Err(RpcError::Config(self.problems.join("; ")))
        }
    }

    /// Find the method a request selector addresses.
    pub fn resolve(
        &self,
        selector: &Selector,
    ) -> std::result::Result<&MethodEntry, ProtocolViolation> {
        let entry = match selector {
            Selector::Ordinal(ordinal) => self.methods.get_ordinal(*ordinal),
            Selector::Name(name) => self.methods.get(name),
        };
        entry.ok_or_else(|| selector.unknown())
    }

    /// Method descriptor by name.
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name).map(MethodEntry::descriptor)
    }

    /// Method descriptor by ordinal.
    pub fn method_by_ordinal(&self, ordinal: u8) -> Option<&MethodDescriptor> {
        self.methods.get_ordinal(ordinal).map(MethodEntry::descriptor)
    }

    /// Event descriptor by name.
    pub fn event(&self, name: &str) -> Option<&EventDescriptor> {
        self.events.get(name)
    }

    /// Event descriptor by ordinal.
    pub fn event_by_ordinal(&self, ordinal: u8) -> Option<&EventDescriptor> {
        self.events.get_ordinal(ordinal)
    }

    /// Declared methods in ordinal order.
    pub fn methods(&self) -> impl Iterator<Item = &MethodDescriptor> {
        self.methods.iter().map(MethodEntry::descriptor)
    }

    /// Declared events in ordinal order.
    pub fn events(&self) -> impl Iterator<Item = &EventDescriptor> {
        self.events.iter()
    }

    /// Number of declared methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Check if no method is declared.
    pub fn is_empty(&self) -> bool {
        self.methods.len() == 0
    }

    /// Export the method and event tables.
    pub fn schema(&self, selector: SelectorEncoding) -> Schema {
        Schema {
            selector,
            methods: self.methods().cloned().collect(),
            events: self.events().cloned().collect(),
        }
    }
}
