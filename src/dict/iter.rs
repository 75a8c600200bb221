use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::error;

use crate::dict::dict::{Dict, DictEntry};
use crate::dict::error::HashError;

/// Holds rehashing off for as long as it lives.
#[derive(Debug)]
pub struct RehashPause {
    counter: Arc<AtomicU64>,
}

impl RehashPause {
    pub fn new<K, V>(dict: &Dict<K, V>) -> Self {
        let counter = dict.pause_rehash.clone();
        counter.fetch_add(1, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for RehashPause {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterState {
    Fresh,
    Scanning,
    Exhausted,
}

/// A position in a dict walk that does not borrow the dict, so the caller
/// may mutate it between two calls to [`next`](DictIterator::next).
///
/// A safe iterator pauses rehashing from its first advance until it is
/// released or dropped. The dict may be changed freely in between: every
/// entry present for the whole walk is returned exactly once, entries
/// added during the walk may or may not be.
/// An unsafe iterator forbids any mutation and verifies that on release.
#[derive(Debug)]
pub struct DictIterator {
    table: usize,
    index: i64,
    safe: bool,
    state: IterState,
    /// entries of the current bucket already returned
    returned: Vec<usize>,
    fingerprint: u64,
    pause: Option<RehashPause>,
}

impl DictIterator {
    fn new(safe: bool) -> Self {
        Self {
            table: 0,
            index: -1,
            safe,
            state: IterState::Fresh,
            returned: Vec::new(),
            fingerprint: 0,
            pause: None,
        }
    }

    pub fn state(&self) -> IterState {
        self.state
    }

    pub fn is_safe(&self) -> bool {
        self.safe
    }

    pub fn next<'a, K, V>(&mut self, dict: &'a Dict<K, V>) -> Option<&'a DictEntry<K, V>> {
        match self.state {
            IterState::Exhausted => return None,
            IterState::Fresh => {
                if self.safe {
                    self.pause = Some(RehashPause::new(dict));
                } else {
                    self.fingerprint = dict.fingerprint();
                }
                self.state = IterState::Scanning;
            }
            IterState::Scanning => {}
        }
        loop {
            if self.index >= 0 {
                if let Some((id, entry)) = self.unreturned(dict) {
                    self.returned.push(id);
                    return Some(entry);
                }
            }
            self.returned.clear();
            self.index += 1;
            if self.index as u64 >= dict.ht[self.table].size() {
                if dict.dict_is_rehashing() && self.table == 0 {
                    self.table = 1;
                    self.index = 0;
                } else {
                    break;
                }
            }
        }
        self.state = IterState::Exhausted;
        None
    }

    /// First entry of the current bucket not handed out yet. The chain is
    /// read again from its head on every call, so entries the caller
    /// deleted or inserted since the last call are seen as they are now.
    fn unreturned<'a, K, V>(&self, dict: &'a Dict<K, V>) -> Option<(usize, &'a DictEntry<K, V>)> {
        let mut next = dict.ht[self.table]
            .table
            .get(self.index as usize)
            .copied()
            .flatten();
        while let Some(id) = next {
            let entry = dict.entries.get(id)?;
            if !self.returned.contains(&id) {
                return Some((id, entry));
            }
            next = entry.next;
        }
        None
    }

    /// Ends the walk. For an unsafe iterator this fails when the dict
    /// changed since the first advance.
    pub fn release<K, V>(mut self, dict: &Dict<K, V>) -> Result<(), HashError> {
        self.pause = None;
        if self.safe || self.state == IterState::Fresh {
            return Ok(());
        }
        let found = dict.fingerprint();
        if found != self.fingerprint {
            error!(
                expected = self.fingerprint,
                found, "dict mutated during unsafe iteration"
            );
            return Err(HashError::FingerprintMismatch {
                expected: self.fingerprint,
                found,
            });
        }
        Ok(())
    }
}

/// Borrowing walk over every entry, in bucket order.
pub struct Iter<'a, K, V> {
    dict: &'a Dict<K, V>,
    cursor: Option<DictIterator>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.cursor.as_mut()?.next(self.dict)?;
        Some((&entry.key, &entry.val))
    }
}

impl<K, V> Drop for Iter<'_, K, V> {
    fn drop(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            let released = cursor.release(self.dict);
            if !thread::panicking() {
                assert!(released.is_ok(), "dict iterator: {:?}", released);
            }
        }
    }
}

impl<K, V> Dict<K, V> {
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            dict: self,
            cursor: Some(DictIterator::new(false)),
        }
    }

    pub fn safe_iter(&self) -> DictIterator {
        DictIterator::new(true)
    }

    pub fn unsafe_iter(&self) -> DictIterator {
        DictIterator::new(false)
    }
}

impl<'a, K, V> IntoIterator for &'a Dict<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
