use std::hash::Hash;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rustc_hash::FxHashSet;

/// Unordered, deduplicating set of pending work shared between producers and
/// a draining worker. Taking an item removes it; the order items come out in
/// is unspecified.
pub struct WorkSet<T> {
    items: Mutex<FxHashSet<T>>,
    available: Condvar,
}

impl<T> WorkSet<T>
where
    T: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            items: Mutex::new(FxHashSet::default()),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FxHashSet<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `false` when the item was already queued.
    pub fn add(&self, item: T) -> bool {
        let inserted = self.lock().insert(item);
        if inserted {
            self.available.notify_one();
        }
        inserted
    }

    pub fn add_all<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let mut guard = self.lock();
        let before = guard.len();
        guard.extend(items);
        let added = guard.len() - before;
        drop(guard);
        if added > 0 {
            self.available.notify_all();
        }
        added
    }

    pub fn take_any(&self) -> Option<T> {
        let mut guard = self.lock();
        Self::take_from(&mut guard)
    }

    /// Blocks up to `timeout` for an item to become available.
    pub fn wait_take(&self, timeout: Duration) -> Option<T> {
        let guard = self.lock();
        let (mut guard, _) = self
            .available
            .wait_timeout_while(guard, timeout, |items| items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        Self::take_from(&mut guard)
    }

    fn take_from(items: &mut FxHashSet<T>) -> Option<T> {
        let item = items.iter().next().cloned()?;
        items.remove(&item);
        Some(item)
    }

    pub fn remove(&self, item: &T) -> bool {
        self.lock().remove(item)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the current contents. Later changes to the set are not
    /// reflected in the returned vector.
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().iter().cloned().collect()
    }
}

impl<T> Default for WorkSet<T>
where
    T: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
