//! Explicit service registration.
//!
//! Methods are registered through typed adapters instead of runtime
//! reflection: each adapter deserializes the JSON args payload, awaits the
//! user's function, and serializes the reply. The dispatcher only ever sees
//! the type-erased [`Method`] trait.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::middleware::{BoxFuture, Context};

/// Type-erased callable for one registered method.
pub trait Method: Send + Sync {
    /// Run the method against a raw JSON args payload; returns the raw JSON
    /// reply payload.
    fn call(&self, ctx: Context, payload: &[u8]) -> BoxFuture<Result<Vec<u8>>>;
}

/// Adapter that deserializes args and serializes the reply around a typed
/// async function.
struct TypedMethod<F, A, Fut> {
    func: F,
    _phantom: PhantomData<fn(A) -> Fut>,
}

impl<F, A, R, Fut> Method for TypedMethod<F, A, Fut>
where
    F: Fn(A, Context) -> Fut + Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    fn call(&self, ctx: Context, payload: &[u8]) -> BoxFuture<Result<Vec<u8>>> {
        let args: A = match serde_json::from_slice(payload) {
            Ok(args) => args,
            Err(err) => return Box::pin(async move { Err(err.into()) }),
        };
        let fut = (self.func)(args, ctx);
        Box::pin(async move {
            let reply = fut.await?;
            Ok(serde_json::to_vec(&reply)?)
        })
    }
}

/// A named collection of callable methods.
///
/// # Example
///
/// ```ignore
/// let arith = Service::new("Arith")
///     .method("Add", |args: Args, _ctx| async move {
///         Ok(Reply { result: args.a + args.b })
///     });
/// server.register(arith);
/// ```
pub struct Service {
    name: String,
    methods: HashMap<String, Arc<dyn Method>>,
}

impl Service {
    /// Empty service under `name` (the part before the dot in
    /// `"Service.Method"`).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Register a typed method. Re-registering a name replaces the previous
    /// adapter silently.
    pub fn method<F, A, R, Fut>(mut self, name: &str, func: F) -> Self
    where
        F: Fn(A, Context) -> Fut + Send + Sync + 'static,
        A: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        self.methods.insert(
            name.to_string(),
            Arc::new(TypedMethod {
                func,
                _phantom: PhantomData,
            }),
        );
        self
    }

    /// The service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a method adapter.
    pub(crate) fn get(&self, method: &str) -> Option<Arc<dyn Method>> {
        self.methods.get(method).cloned()
    }
}
