use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::error::BusError;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Identifier -> handler mapping, populated during startup and read on every
/// dispatch.
///
/// Writers are serialized by a mutex and publish a fresh copy of the map;
/// readers load the current snapshot without locking. Registration is
/// expected to finish before the first dispatch, so the copy cost is paid
/// only at startup.
pub struct Registry<H: ?Sized> {
    entries: ArcSwap<HashMap<&'static str, Arc<H>>>,
    write_lock: Mutex<()>,
}

impl<H: ?Sized> Registry<H> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Binds `handler` to `name`.
    ///
    /// # Errors
    ///
    /// Returns `BusError::AlreadyRegistered` if `name` already has a handler.
    /// The existing entry is left in place.
    pub fn register(&self, name: &'static str, handler: Arc<H>) -> Result<(), BusError> {
        let _guard = self.write_lock.lock();
        let current = self.entries.load();
        if current.contains_key(name) {
            return Err(BusError::AlreadyRegistered {
                name: name.to_string(),
            });
        }

        let mut next = HashMap::clone(&current);
        next.insert(name, handler);
        self.entries.store(Arc::new(next));
        Ok(())
    }

    /// Retrieves the handler bound to `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<H>> {
        self.entries.load().get(name).cloned()
    }

    /// Retrieves the handler bound to `name`, or `NotRegistered`.
    ///
    /// # Errors
    ///
    /// Returns `BusError::NotRegistered` when no handler is bound.
    pub fn resolve(&self, name: &str) -> Result<Arc<H>, BusError> {
        self.get(name).ok_or_else(|| BusError::NotRegistered {
            name: name.to_string(),
        })
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.load().contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }

    /// Registered identifiers in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.entries.load().keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl<H: ?Sized> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
