//! HandlerDispatcher - in-process contract simulation.
//!
//! Routes each `ContractCall` by function name to a registered handler over
//! shared state `T` (typically an `InMemoryRecordSource` clone). Handlers
//! may be guarded; a failing guard rejects the call before the handler runs.
//!
//! ## Example
//!
//! ```ignore
//! let dispatcher = HandlerDispatcher::new(source.clone())
//!     .handler("vote", |ctx| {
//!         let poll_id = ctx.id(0)?;
//!         let option = ctx.uint(1)? as usize;
//!         ctx.state().update(poll_id, |poll| poll.vote_counts[option] += 1)
//!             .map_err(|e| MutationError::rejected(e.to_string()))
//!     });
//!
//! let receipt = dispatcher.submit(&call).await?;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::{CallArg, ContractCall, MutationDispatcher, MutationError, Receipt};
use crate::record::{Address, RecordId};

type Guard<T> = Box<dyn Fn(&CallContext<T>) -> bool + Send + Sync>;
type Handle<T> = Box<dyn Fn(&CallContext<T>) -> Result<(), MutationError> + Send + Sync>;

/// A registered call handler with optional guard.
struct CallHandler<T> {
    guard: Option<Guard<T>>,
    handle: Handle<T>,
}

/// The context passed to every call handler.
pub struct CallContext<'a, T> {
    call: &'a ContractCall,
    state: &'a T,
}

impl<'a, T> CallContext<'a, T> {
    pub fn call(&self) -> &ContractCall {
        self.call
    }

    pub fn function(&self) -> &str {
        &self.call.function
    }

    pub fn state(&self) -> &T {
        self.state
    }

    /// Value attached to the call, zero if none.
    pub fn value(&self) -> u128 {
        self.call.value.unwrap_or(0)
    }

    /// The sending account. Rejects the call if it has none.
    pub fn sender(&self) -> Result<&Address, MutationError> {
        self.call
            .from
            .as_ref()
            .ok_or_else(|| MutationError::rejected("wallet not connected"))
    }

    fn arg(&self, index: usize) -> Result<&CallArg, MutationError> {
        self.call.args.get(index).ok_or_else(|| {
            MutationError::rejected(format!(
                "{}: missing argument {}",
                self.call.function, index
            ))
        })
    }

    fn mismatch(&self, index: usize, expected: &str) -> MutationError {
        MutationError::rejected(format!(
            "{}: argument {} is not {}",
            self.call.function, index, expected
        ))
    }

    pub fn uint(&self, index: usize) -> Result<u128, MutationError> {
        match self.arg(index)? {
            CallArg::Uint(v) => Ok(*v),
            _ => Err(self.mismatch(index, "a uint")),
        }
    }

    /// A uint argument interpreted as a record ID.
    pub fn id(&self, index: usize) -> Result<RecordId, MutationError> {
        let raw = self.uint(index)?;
        RecordId::try_from(raw).map_err(|_| self.mismatch(index, "a record id"))
    }

    pub fn string(&self, index: usize) -> Result<&str, MutationError> {
        match self.arg(index)? {
            CallArg::Str(s) => Ok(s),
            _ => Err(self.mismatch(index, "a string")),
        }
    }

    pub fn strings(&self, index: usize) -> Result<&[String], MutationError> {
        match self.arg(index)? {
            CallArg::StrList(list) => Ok(list),
            _ => Err(self.mismatch(index, "a string list")),
        }
    }

    pub fn address(&self, index: usize) -> Result<&Address, MutationError> {
        match self.arg(index)? {
            CallArg::Address(a) => Ok(a),
            _ => Err(self.mismatch(index, "an address")),
        }
    }
}

/// A dispatcher that executes calls against in-process state.
///
/// Each accepted call gets a sequential transaction hash.
pub struct HandlerDispatcher<T> {
    state: T,
    handlers: HashMap<String, CallHandler<T>>,
    next_tx: AtomicU64,
}

impl<T: Send + Sync + 'static> HandlerDispatcher<T> {
    pub fn new(state: T) -> Self {
        Self {
            state,
            handlers: HashMap::new(),
            next_tx: AtomicU64::new(1),
        }
    }

    /// Register a call handler.
    ///
    /// Returns `self` for chaining.
    pub fn handler<F>(mut self, function: &str, handler: F) -> Self
    where
        F: Fn(&CallContext<T>) -> Result<(), MutationError> + Send + Sync + 'static,
    {
        self.handlers.insert(
            function.to_string(),
            CallHandler {
                guard: None,
                handle: Box::new(handler),
            },
        );
        self
    }

    /// Register a call handler with a guard.
    ///
    /// If the guard returns `false` the call is rejected with
    /// "precondition failed" and the handler does not run.
    pub fn handler_guarded<G, F>(mut self, function: &str, guard: G, handler: F) -> Self
    where
        G: Fn(&CallContext<T>) -> bool + Send + Sync + 'static,
        F: Fn(&CallContext<T>) -> Result<(), MutationError> + Send + Sync + 'static,
    {
        self.handlers.insert(
            function.to_string(),
            CallHandler {
                guard: Some(Box::new(guard)),
                handle: Box::new(handler),
            },
        );
        self
    }

    /// Execute a call synchronously.
    pub fn execute(&self, call: &ContractCall) -> Result<Receipt, MutationError> {
        let handler = self
            .handlers
            .get(&call.function)
            .ok_or_else(|| MutationError::UnknownFunction(call.function.clone()))?;

        let ctx = CallContext {
            call,
            state: &self.state,
        };

        if let Some(guard) = &handler.guard {
            if !guard(&ctx) {
                return Err(MutationError::rejected(format!(
                    "precondition failed: {}",
                    call.function
                )));
            }
        }

        (handler.handle)(&ctx)?;

        let tx = self.next_tx.fetch_add(1, Ordering::SeqCst);
        Ok(Receipt {
            tx_hash: format!("0x{:064x}", tx),
            function: call.function.clone(),
        })
    }

    pub fn state(&self) -> &T {
        &self.state
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> MutationDispatcher for HandlerDispatcher<T> {
    async fn submit(&self, call: &ContractCall) -> Result<Receipt, MutationError> {
        self.execute(call)
    }

    fn functions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}
