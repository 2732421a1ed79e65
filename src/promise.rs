//! One-shot value cell with chained continuations.
//!
//! A [`Promise`] is a data channel, not a task handle: whoever holds the
//! matching [`Resolver`] fills it exactly once, from any thread, and every
//! continuation registered before or after that moment observes the value.
//! Continuations run in registration order on the resolving thread (or
//! immediately on the registering thread when the value is already there).
//!
//! Promises also implement [`IntoFuture`], so async code can simply `.await`
//! them instead of chaining [`Promise::then`].

use crate::error::{GutterError, Result};
use futures::channel::oneshot;
use futures::future::BoxFuture;
use std::fmt;
use std::future::IntoFuture;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Callback<T> = Box<dyn FnOnce(T) + Send + 'static>;

enum State<T> {
    Pending(Vec<Callback<T>>),
    Resolved(T),
}

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Promise<T> {
    state: Arc<Mutex<State<T>>>,
}

/// Write half of a [`Promise`].
pub struct Resolver<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resolved = matches!(&*lock(&self.state), State::Resolved(_));
        f.debug_struct("Promise")
            .field("resolved", &resolved)
            .finish()
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Create a promise and hand its resolver to `executor`, which runs
    /// synchronously. The executor may resolve right away or stash the
    /// resolver and fill it later from another thread.
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Resolver<T>),
    {
        let (promise, resolver) = Self::pending();
        executor(resolver);
        promise
    }

    /// Create an unresolved promise together with its resolver.
    pub fn pending() -> (Self, Resolver<T>) {
        let state = Arc::new(Mutex::new(State::Pending(Vec::new())));
        (
            Self {
                state: Arc::clone(&state),
            },
            Resolver { state },
        )
    }

    /// Create a promise that already holds `value`.
    pub fn resolved(value: T) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::Resolved(value))),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(&*lock(&self.state), State::Resolved(_))
    }

    /// The value, if the promise has been resolved.
    pub fn value(&self) -> Option<T> {
        match &*lock(&self.state) {
            State::Resolved(value) => Some(value.clone()),
            State::Pending(_) => None,
        }
    }

    /// Run `callback` with the value once it is available.
    pub fn on_resolve<F>(&self, callback: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        let ready = {
            let mut state = lock(&self.state);
            match &mut *state {
                State::Pending(callbacks) => {
                    callbacks.push(Box::new(callback));
                    return;
                }
                State::Resolved(value) => value.clone(),
            }
        };
        callback(ready);
    }

    /// Map the resolved value through `f`.
    pub fn then<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let (next, resolver) = Promise::pending();
        self.on_resolve(move |value| {
            // `next` is fresh and only resolved here.
            let _ = resolver.resolve(f(value));
        });
        next
    }

    /// Chain a continuation that itself yields a promise; the result is
    /// flattened so callers see a single `Promise<U>`.
    pub fn and_then<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        let (next, resolver) = Promise::pending();
        self.on_resolve(move |value| {
            f(value).on_resolve(move |inner| {
                let _ = resolver.resolve(inner);
            });
        });
        next
    }
}

impl<T: Clone + Send + 'static> Resolver<T> {
    /// Fill the promise and run the buffered continuations in registration order.
    ///
    /// Resolving a second time is a programming error and reports
    /// [`GutterError::PromiseAlreadyResolved`] without touching the stored value.
    pub fn resolve(&self, value: T) -> Result<()> {
        let callbacks = {
            let mut state = lock(&self.state);
            let callbacks = match &mut *state {
                State::Resolved(_) => return Err(GutterError::PromiseAlreadyResolved),
                State::Pending(callbacks) => std::mem::take(callbacks),
            };
            *state = State::Resolved(value.clone());
            callbacks
        };

        for callback in callbacks {
            callback(value.clone());
        }
        Ok(())
    }
}

impl<T: Clone + Send + 'static> IntoFuture for Promise<T> {
    type Output = Result<T>;
    type IntoFuture = BoxFuture<'static, Result<T>>;

    fn into_future(self) -> Self::IntoFuture {
        let (tx, rx) = oneshot::channel();
        self.on_resolve(move |value| {
            let _ = tx.send(value);
        });
        Box::pin(async move { rx.await.map_err(|_| GutterError::PromiseAbandoned) })
    }
}
