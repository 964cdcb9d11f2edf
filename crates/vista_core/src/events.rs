//! Named-event dispatcher.
//!
//! Listeners are registered against an event name such as
//! `composing: users.index`. A name containing glob metacharacters
//! (`composing: admin.*`) registers a wildcard listener that fires for every
//! matching event.

use std::collections::HashMap;
use std::sync::Arc;

use glob::Pattern;
use parking_lot::RwLock;
use tracing::{debug, warn};

/// Event handler: receives the event name and a mutable payload.
pub type Listener<P> = Arc<dyn Fn(&str, &mut P) + Send + Sync>;

/// Dispatches named events carrying a payload of type `P`.
pub struct Dispatcher<P: ?Sized> {
    listeners: RwLock<HashMap<String, Vec<Listener<P>>>>,
    wildcards: RwLock<Vec<(Pattern, Listener<P>)>>,
}

impl<P: ?Sized> Default for Dispatcher<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ?Sized> Dispatcher<P> {
    /// Create a dispatcher with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            wildcards: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener for `event`.
    pub fn listen<F>(&self, event: impl Into<String>, listener: F)
    where
        F: Fn(&str, &mut P) + Send + Sync + 'static,
    {
        self.listen_arc(event, Arc::new(listener));
    }

    /// Register an already shared listener for `event`.
    pub fn listen_arc(&self, event: impl Into<String>, listener: Listener<P>) {
        let event = event.into();

        if is_wildcard(&event) {
            match Pattern::new(&event) {
                Ok(pattern) => {
                    debug!("Registering wildcard listener: {}", event);
                    self.wildcards.write().push((pattern, listener));
                    return;
                }
                Err(e) => {
                    // Fall back to an exact-name listener.
                    warn!("Invalid event pattern {:?}: {}", event, e);
                }
            }
        }

        debug!("Registering listener: {}", event);
        self.listeners.write().entry(event).or_default().push(listener);
    }

    /// Fire `event`, returning how many listeners ran.
    ///
    /// Exact listeners run first in registration order, then wildcard
    /// listeners. The listener list is snapshotted before any listener runs,
    /// so listeners may register further listeners.
    pub fn dispatch(&self, event: &str, payload: &mut P) -> usize {
        let listeners = self.listeners_for(event);
        for listener in &listeners {
            listener(event, payload);
        }
        if !listeners.is_empty() {
            debug!("Dispatched {} to {} listener(s)", event, listeners.len());
        }
        listeners.len()
    }

    /// Whether any listener would receive `event`.
    pub fn has_listeners(&self, event: &str) -> bool {
        self.listeners
            .read()
            .get(event)
            .is_some_and(|l| !l.is_empty())
            || self
                .wildcards
                .read()
                .iter()
                .any(|(pattern, _)| pattern.matches(event))
    }

    /// Remove every listener registered under exactly `event`.
    pub fn forget(&self, event: &str) {
        debug!("Forgetting listeners for {}", event);
        self.listeners.write().remove(event);
        self.wildcards
            .write()
            .retain(|(pattern, _)| pattern.as_str() != event);
    }

    fn listeners_for(&self, event: &str) -> Vec<Listener<P>> {
        let mut found: Vec<Listener<P>> = self
            .listeners
            .read()
            .get(event)
            .cloned()
            .unwrap_or_default();

        found.extend(
            self.wildcards
                .read()
                .iter()
                .filter(|(pattern, _)| pattern.matches(event))
                .map(|(_, listener)| listener.clone()),
        );
        found
    }
}

impl<P: ?Sized> std::fmt::Debug for Dispatcher<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("events", &self.listeners.read().keys().cloned().collect::<Vec<_>>())
            .field(
                "wildcards",
                &self
                    .wildcards
                    .read()
                    .iter()
                    .map(|(p, _)| p.as_str().to_string())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn is_wildcard(event: &str) -> bool {
    event.contains(['*', '?', '['])
}
