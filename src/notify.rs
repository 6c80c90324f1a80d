// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Change notification bus.
//!
//! Stores publish a value after every successful mutation. Consumers register
//! plain callbacks and receive a borrow of that value. There is no replay: a
//! subscriber only sees changes published after it subscribed.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, PoisonError,
    },
};

type Callback<T> = Box<dyn Fn(&T) + Send + Sync + 'static>;

/// Handle returned by [`ChangeBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Observer list for values of type `T`.
pub struct ChangeBus<T> {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriptionId, Callback<T>)>>,
}

impl<T> ChangeBus<T> {
    /// Construct new empty bus.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register callback to be invoked on every publish.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Box::new(callback)));
        id
    }

    /// Remove a previously registered callback.
    ///
    /// Returns `false` if no callback was registered under `id`.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|(entry, _)| *entry != id);
        subscribers.len() != before
    }

    /// Deliver `value` to every subscriber in registration order.
    ///
    /// Callbacks must not subscribe or unsubscribe from inside the callback;
    /// the subscriber list is locked while they run.
    pub fn publish(&self, value: &T) {
        let subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for (_, callback) in subscribers.iter() {
            callback(value);
        }
    }

    /// Number of active subscribers.
    pub fn len(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for ChangeBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for ChangeBus<T> {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("ChangeBus")
            .field("subscribers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn publish_reaches_every_subscriber() {
        let bus = ChangeBus::<String>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = seen.clone();
        bus.subscribe(move |value: &String| first.lock().unwrap().push(format!("a:{value}")));
        let second = seen.clone();
        bus.subscribe(move |value: &String| second.lock().unwrap().push(format!("b:{value}")));

        bus.publish(&"saved".to_string());

        assert_eq!(*seen.lock().unwrap(), vec!["a:saved", "b:saved"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = ChangeBus::<u32>::new();
        let count = Arc::new(AtomicU64::new(0));

        let counter = count.clone();
        let id = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(&1);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(bus.is_empty());
    }
}
