// SPDX-License-Identifier: GPL-2.0-or-later

//! A one-shot rendezvous across worker threads: a value that becomes
//! available exactly once, with any number of observers registering
//! callbacks that fire the moment it does (or immediately, if it already
//! has).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("promise already has a value")]
pub struct PromiseAlreadySet;

/// Key returned by [`Future::then`]; `0` is the sentinel meaning "the
/// callback already ran, there is nothing to remove" and is safe to pass to
/// [`Future::remove_callback`] unconditionally.
pub type FutureCallbackKey = u64;

type Callback<T> = Box<dyn FnOnce(&T) + Send>;

struct State<T> {
    value: Option<T>,
    callbacks: HashMap<FutureCallbackKey, Callback<T>>,
    next_key: FutureCallbackKey,
}

impl<T> Default for State<T> {
    fn default() -> Self {
        Self {
            value: None,
            callbacks: HashMap::new(),
            next_key: 1,
        }
    }
}

/// A value that will be accessible some time in the future (or maybe
/// already is). Cloning shares the underlying state.
pub struct Future<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> Future<T> {
    /// Registers `callback` to run once the value is set. If it is already
    /// set, runs `callback` immediately (on the calling thread) and returns
    /// the sentinel key `0`.
    pub fn then(&self, callback: impl FnOnce(&T) + Send + 'static) -> FutureCallbackKey {
        let mut state = self.state.lock().expect("promise mutex poisoned");
        if let Some(value) = &state.value {
            callback(value);
            return 0;
        }
        let key = state.next_key;
        state.next_key += 1;
        state.callbacks.insert(key, Box::new(callback));
        key
    }

    /// Removes a previously registered callback. A no-op for key `0` or a
    /// key whose callback already ran.
    pub fn remove_callback(&self, key: FutureCallbackKey) {
        if key == 0 {
            return;
        }
        self.state
            .lock()
            .expect("promise mutex poisoned")
            .callbacks
            .remove(&key);
    }
}

/// The writable half of a [`Future`]; set its value exactly once.
pub struct Promise<T> {
    future: Future<T>,
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Promise<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            future: Future {
                state: Arc::new(Mutex::new(State::default())),
            },
        }
    }

    /// Builds a promise that already has its value, as if `set` had just
    /// been called.
    #[must_use]
    pub fn with_value(value: T) -> Self {
        let promise = Self::new();
        promise
            .set(value)
            .unwrap_or_else(|_| unreachable!("freshly constructed promise cannot already be set"));
        promise
    }

    /// Sets the value, running every registered callback. Fails if a value
    /// was already set.
    pub fn set(&self, value: T) -> Result<(), PromiseAlreadySet> {
        let callbacks = {
            let mut state = self.future.state.lock().expect("promise mutex poisoned");
            if state.value.is_some() {
                return Err(PromiseAlreadySet);
            }
            state.value = Some(value);
            std::mem::take(&mut state.callbacks)
        };
        let state = self.future.state.lock().expect("promise mutex poisoned");
        let value = state.value.as_ref().expect("value was just set above");
        for (_, callback) in callbacks {
            callback(value);
        }
        Ok(())
    }

    /// Returns a shared handle observers can register callbacks on.
    #[must_use]
    pub fn future(&self) -> Future<T> {
        self.future.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_then_before_set_runs_once_value_arrives() {
        let promise = Promise::new();
        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = seen.clone();
        let key = promise.future().then(move |v: &u32| {
            seen_clone.store(*v, Ordering::SeqCst);
        });
        assert_ne!(key, 0);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        promise.set(42).expect("first set succeeds");
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_then_after_set_runs_immediately_with_sentinel_key() {
        let promise = Promise::with_value(7u32);
        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = seen.clone();
        let key = promise.future().then(move |v| seen_clone.store(*v, Ordering::SeqCst));
        assert_eq!(key, 0);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_set_twice_fails() {
        let promise = Promise::new();
        promise.set(1).expect("first set succeeds");
        assert!(promise.set(2).is_err());
    }

    #[test]
    fn test_remove_callback_prevents_invocation() {
        let promise = Promise::new();
        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = seen.clone();
        let key = promise.future().then(move |v: &u32| seen_clone.store(*v, Ordering::SeqCst));
        promise.future().remove_callback(key);
        promise.set(99).expect("set succeeds");
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_remove_callback_sentinel_is_noop() {
        let promise: Promise<u32> = Promise::new();
        promise.future().remove_callback(0);
    }
}
