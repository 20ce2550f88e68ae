//! Request Context
//!
//! An immutable, cheaply clonable bag of request-scoped values plus an optional
//! cancellation token and deadline. A context attached to an [`Orm`](crate::Orm)
//! or [`Query`](crate::Query) reaches every driver call and every observer
//! [`Event`](crate::Event).

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{OrmError, OrmResult};

type ContextValue = Arc<dyn Any + Send + Sync>;

#[derive(Clone, Default)]
pub struct Context {
    values: Arc<HashMap<String, ContextValue>>,
    cancellation: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl Context {
    /// The empty root context: no values, never cancelled, no deadline
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context that carries `value` under `key`.
    ///
    /// Values of the parent stay visible unless shadowed by the same key.
    pub fn with_value<T>(&self, key: impl Into<String>, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        let mut values = (*self.values).clone();
        values.insert(key.into(), Arc::new(value));

        Self {
            values: Arc::new(values),
            cancellation: self.cancellation.clone(),
            deadline: self.deadline,
        }
    }

    /// Look up a value by key, returning `None` when absent or of another type
    pub fn value<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key)?.downcast_ref::<T>()
    }

    pub fn has_value(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Derive a cancellable context.
    ///
    /// Cancelling the returned token cancels the new context and all of its
    /// descendants; cancelling the parent cancels it as well.
    pub fn with_cancellation(&self) -> (Self, CancellationToken) {
        let token = match &self.cancellation {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };

        let ctx = Self {
            values: self.values.clone(),
            cancellation: Some(token.clone()),
            deadline: self.deadline,
        };
        (ctx, token)
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a context with a deadline; an earlier inherited deadline wins
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        };

        Self {
            values: self.values.clone(),
            cancellation: self.cancellation.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }

    /// Fail fast when the context is already cancelled or expired
    pub fn check(&self) -> OrmResult<()> {
        if self.is_cancelled() {
            return Err(OrmError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if deadline <= Instant::now() {
                return Err(OrmError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Drive `operation` until it finishes, the context is cancelled or the
    /// deadline passes, whichever comes first. The losing future is dropped.
    pub async fn run<F, T>(&self, operation: F) -> OrmResult<T>
    where
        F: Future<Output = OrmResult<T>>,
    {
        self.check()?;

        let cancelled = async {
            match &self.cancellation {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(OrmError::Cancelled),
            _ = expired => Err(OrmError::DeadlineExceeded),
            result = operation => result,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();

        f.debug_struct("Context")
            .field("keys", &keys)
            .field("cancelled", &self.is_cancelled())
            .field("deadline", &self.deadline)
            .finish()
    }
}
