use std::collections::hash_map::Entry;
use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::{Condvar, Mutex};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::SiteGridError;

struct QueueState<K, V> {
    /// Keys with pending items, oldest first.
    order: VecDeque<K>,
    pending: FxHashMap<K, Vec<V>>,
    in_progress: FxHashSet<K>,
    closed: bool,
}

impl<K: Eq + Hash + Clone, V> QueueState<K, V> {
    fn take_available_group(&mut self) -> Option<(K, Vec<V>)> {
        let position = self
            .order
            .iter()
            .position(|key| !self.in_progress.contains(key))?;
        let key = self.order.remove(position)?;
        let items = self.pending.remove(&key).unwrap_or_default();
        self.in_progress.insert(key.clone());
        Some((key, items))
    }
}

/// Work queue grouping items by key.
///
/// Items pushed with the same key are handed out together. A key taken by
/// a worker stays *in progress* until [`GroupedWorkQueue::complete`] is
/// called for it: items pushed for it in the meantime wait, so that a
/// group is never processed by two workers at once.
pub struct GroupedWorkQueue<K, V> {
    state: Mutex<QueueState<K, V>>,
    available: Condvar,
}

impl<K: Eq + Hash + Clone, V> Default for GroupedWorkQueue<K, V> {
    fn default() -> Self {
        GroupedWorkQueue {
            state: Mutex::new(QueueState {
                order: VecDeque::new(),
                pending: FxHashMap::default(),
                in_progress: FxHashSet::default(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V> GroupedWorkQueue<K, V> {
    pub fn new() -> GroupedWorkQueue<K, V> {
        GroupedWorkQueue::default()
    }

    /// Appends `item` to the group of `key`.
    ///
    /// Fails once the queue was closed.
    pub fn push(&self, key: K, item: V) -> crate::Result<()> {
        let mut guard = self.state.lock()?;
        let state = &mut *guard;
        if state.closed {
            return Err(SiteGridError::InvalidArgument(
                "the work queue was closed".to_string(),
            ));
        }
        match state.pending.entry(key) {
            Entry::Occupied(mut entry) => entry.get_mut().push(item),
            Entry::Vacant(entry) => {
                state.order.push_back(entry.key().clone());
                entry.insert(vec![item]);
            }
        }
        drop(guard);
        self.available.notify_one();
        Ok(())
    }

    /// Takes the oldest group whose key is not in progress, and marks the
    /// key in progress.
    pub fn take_group(&self) -> crate::Result<Option<(K, Vec<V>)>> {
        Ok(self.state.lock()?.take_available_group())
    }

    /// Like [`GroupedWorkQueue::take_group`], but waits for a group to be
    /// available.
    ///
    /// Returns `None` once the queue is closed and no group is left.
    pub fn wait_for_group(&self) -> crate::Result<Option<(K, Vec<V>)>> {
        let mut state = self.state.lock()?;
        loop {
            if let Some(group) = state.take_available_group() {
                return Ok(Some(group));
            }
            if state.closed && state.pending.is_empty() {
                return Ok(None);
            }
            state = self.available.wait(state)?;
        }
    }

    /// Marks `key` as no longer in progress.
    pub fn complete(&self, key: &K) -> crate::Result<()> {
        let mut state = self.state.lock()?;
        state.in_progress.remove(key);
        drop(state);
        // Items for `key` may have arrived while it was in progress.
        self.available.notify_all();
        Ok(())
    }

    /// Stops accepting items. Workers drain the pending groups, then stop.
    pub fn close(&self) -> crate::Result<()> {
        self.state.lock()?.closed = true;
        self.available.notify_all();
        Ok(())
    }

    /// Number of groups waiting to be taken.
    pub fn num_pending_groups(&self) -> crate::Result<usize> {
        Ok(self.state.lock()?.order.len())
    }

    pub fn num_in_progress(&self) -> crate::Result<usize> {
        Ok(self.state.lock()?.in_progress.len())
    }
}
