use std::hash::Hash;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use slab::Slab;
use tracing::debug;

use crate::config::DictConfig;
use crate::dict::error::HashError;
use crate::dict::hash::{int_hash, sys_hash};
use crate::dict::lib::*;

#[derive(Debug, Clone)]
pub struct DictEntry<K, V> {
    pub(crate) key: K,
    pub(crate) val: V,
    /// index of the next entry in the same bucket chain
    pub(crate) next: Option<usize>,
}

impl<K, V> DictEntry<K, V> {
    #[inline]
    pub fn get_key(&self) -> &K {
        &self.key
    }

    #[inline]
    pub fn get_val(&self) -> &V {
        &self.val
    }
}

#[derive(Debug, Clone)]
pub(crate) struct HashTable {
    /// bucket heads, indices into the entry arena
    pub(crate) table: Vec<Option<usize>>,
    /// exponent of size. (size = 1<<exp), -1 when unallocated
    pub(crate) size_exp: i32,
    pub(crate) used: u64,
}

impl Default for HashTable {
    fn default() -> Self {
        Self {
            table: Vec::new(),
            size_exp: -1,
            used: 0,
        }
    }
}

impl HashTable {
    fn with_exp(exp: i32) -> Self {
        Self {
            table: vec![None; dict_size(exp) as usize],
            size_exp: exp,
            used: 0,
        }
    }

    #[inline]
    pub(crate) fn size(&self) -> u64 {
        dict_size(self.size_exp)
    }

    #[inline]
    pub(crate) fn mask(&self) -> u64 {
        dict_size_mask(self.size_exp)
    }

    #[inline]
    fn head(&self, idx: usize) -> Option<usize> {
        self.table.get(idx).copied().flatten()
    }
}

/// Hash table with two generations and incremental rehashing.
///
/// While a resize is in flight `ht[1]` receives entries migrated bucket by
/// bucket from `ht[0]`; `rehash_idx` is the next `ht[0]` bucket to move and
/// every bucket below it is empty. Entries live in a single arena, so a
/// migration only rewrites chain indices.
pub struct Dict<K, V> {
    pub(crate) dict_type: Arc<DictType<K, V>>,
    pub(crate) entries: Slab<DictEntry<K, V>>,
    pub(crate) ht: [HashTable; 2],
    /// rehashing not in progress if rehash_idx == -1
    rehash_idx: i64,
    /// If >0 rehashing is paused (live safe iterators)
    pub(crate) pause_rehash: Arc<AtomicU64>,
    resize_policy: DictResizeFlag,
    force_resize_ratio: u64,
}

impl<K, V> Dict<K, V>
where
    K: Hash + Eq,
{
    pub fn new() -> Self {
        Self::create(Arc::new(DictType::default()))
    }

    pub fn create(dict_type: Arc<DictType<K, V>>) -> Self {
        Self::with_config(dict_type, &DictConfig::default())
    }

    pub fn with_config(dict_type: Arc<DictType<K, V>>, config: &DictConfig) -> Self {
        Self {
            dict_type,
            entries: Slab::new(),
            ht: [HashTable::default(), HashTable::default()],
            rehash_idx: -1,
            pause_rehash: Arc::new(AtomicU64::new(0)),
            resize_policy: config.resize_policy,
            force_resize_ratio: config.force_resize_ratio,
        }
    }

    #[inline]
    fn hash_key(&self, key: &K) -> u64 {
        match &self.dict_type.hash_function {
            Some(hash_function) => hash_function(key),
            None => sys_hash(key),
        }
    }

    #[inline]
    fn compare_keys(&self, key1: &K, key2: &K) -> bool {
        match &self.dict_type.key_compare {
            Some(key_compare) => key_compare(key1, key2),
            None => key1 == key2,
        }
    }

    /// Locates the arena index holding `key` without touching the rehash state.
    fn find_entry(&self, key: &K) -> Option<usize> {
        if self.dict_size() == 0 {
            return None;
        }
        let hash = self.hash_key(key);
        for table in 0..2 {
            let idx = (hash & self.ht[table].mask()) as usize;
            // buckets below rehash_idx in ht[0] were already migrated
            if table == 0 && (idx as i64) < self.rehash_idx {
                continue;
            }
            let mut he = self.ht[table].head(idx);
            while let Some(id) = he {
                let entry = &self.entries[id];
                if self.compare_keys(key, &entry.key) {
                    return Some(id);
                }
                he = entry.next;
            }
            if !self.dict_is_rehashing() {
                break;
            }
        }
        None
    }

    /// Returns the bucket index the key belongs to in the generation that
    /// receives new entries, or `DictEntryDup` if the key is present.
    fn key_index(&mut self, key: &K) -> Result<usize, HashError> {
        self.expand_if_needed();
        let hash = self.hash_key(key);
        let mut idx = 0;
        for table in 0..2 {
            idx = (hash & self.ht[table].mask()) as usize;
            let mut he = self.ht[table].head(idx);
            while let Some(id) = he {
                let entry = &self.entries[id];
                if self.compare_keys(key, &entry.key) {
                    return Err(HashError::DictEntryDup);
                }
                he = entry.next;
            }
            if !self.dict_is_rehashing() {
                break;
            }
        }
        Ok(idx)
    }

    /// Inserts a new entry. Fails with `DictEntryDup` when the key exists.
    pub fn add(&mut self, key: K, val: V) -> Result<(), HashError> {
        if self.dict_is_rehashing() {
            self.rehash_step();
        }
        let idx = self.key_index(&key)?;
        let key = match &self.dict_type.key_dup {
            Some(key_dup) => key_dup(&key),
            None => key,
        };
        let val = match &self.dict_type.val_dup {
            Some(val_dup) => val_dup(&val),
            None => val,
        };
        // new entries always land in the generation being filled
        let table = if self.dict_is_rehashing() { 1 } else { 0 };
        let next = self.ht[table].table[idx];
        let id = self.entries.insert(DictEntry { key, val, next });
        self.ht[table].table[idx] = Some(id);
        self.ht[table].used += 1;
        Ok(())
    }

    /// Adds the entry or overwrites the value of an existing one.
    /// Returns true if the key was newly added.
    pub fn replace(&mut self, key: K, val: V) -> bool {
        if self.dict_is_rehashing() {
            self.rehash_step();
        }
        match self.find_entry(&key) {
            Some(id) => {
                let val = match &self.dict_type.val_dup {
                    Some(val_dup) => val_dup(&val),
                    None => val,
                };
                let old = mem::replace(&mut self.entries[id].val, val);
                if let Some(val_destructor) = &self.dict_type.val_destructor {
                    val_destructor(old);
                }
                false
            }
            None => self.add(key, val).is_ok(),
        }
    }

    pub fn find(&mut self, key: &K) -> Option<&DictEntry<K, V>> {
        if self.dict_size() == 0 {
            return None;
        }
        if self.dict_is_rehashing() {
            self.rehash_step();
        }
        let id = self.find_entry(key)?;
        Some(&self.entries[id])
    }

    pub fn find_mut(&mut self, key: &K) -> Option<&mut V> {
        if self.dict_size() == 0 {
            return None;
        }
        if self.dict_is_rehashing() {
            self.rehash_step();
        }
        let id = self.find_entry(key)?;
        Some(&mut self.entries[id].val)
    }

    pub fn fetch_value(&mut self, key: &K) -> Option<&V> {
        self.find(key).map(|entry| &entry.val)
    }

    /// Lookup that never advances a pending rehash.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.find_entry(key).map(|id| &self.entries[id].val)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find_entry(key).is_some()
    }

    /// Removes the entry and hands key and value back without running the
    /// destructors.
    pub fn unlink(&mut self, key: &K) -> Option<(K, V)> {
        if self.dict_size() == 0 {
            return None;
        }
        if self.dict_is_rehashing() {
            self.rehash_step();
        }
        let hash = self.hash_key(key);
        for table in 0..2 {
            let idx = (hash & self.ht[table].mask()) as usize;
            if table == 0 && (idx as i64) < self.rehash_idx {
                continue;
            }
            let mut prev: Option<usize> = None;
            let mut he = self.ht[table].head(idx);
            while let Some(id) = he {
                let next = self.entries[id].next;
                if self.compare_keys(key, &self.entries[id].key) {
                    match prev {
                        Some(prev) => self.entries[prev].next = next,
                        None => self.ht[table].table[idx] = next,
                    }
                    self.ht[table].used -= 1;
                    let entry = self.entries.remove(id);
                    return Some((entry.key, entry.val));
                }
                prev = he;
                he = next;
            }
            if !self.dict_is_rehashing() {
                break;
            }
        }
        None
    }

    pub fn delete(&mut self, key: &K) -> Result<(), HashError> {
        match self.unlink(key) {
            Some((key, val)) => {
                self.free_entry(key, val);
                Ok(())
            }
            None => Err(HashError::DictNoKey),
        }
    }

    fn expand_if_needed(&mut self) {
        if self.dict_is_rehashing() {
            return;
        }
        let size = self.ht[0].size();
        if size == 0 {
            let _ = self.expand(DICT_HT_INITIAL_SIZE);
            return;
        }
        let used = self.ht[0].used;
        let grow = match self.resize_policy {
            DictResizeFlag::DictResizeEnable => used >= size,
            DictResizeFlag::DictResizeAvoid => used / size > self.force_resize_ratio,
            DictResizeFlag::DictResizeForbid => false,
        };
        if grow {
            if let Err(e) = self.expand((used * 2) as usize) {
                debug!(used, size, error = %e, "dict expand skipped");
            }
        }
    }

    /// Allocates a table of `next_power(size)` buckets. With an empty main
    /// table it is installed directly, otherwise it becomes the rehash
    /// target and incremental migration starts.
    pub fn expand(&mut self, size: usize) -> Result<(), HashError> {
        if self.dict_is_rehashing() {
            return Err(HashError::DictBusy("rehashing in progress".to_string()));
        }
        if self.ht[0].used > size as u64 {
            return Err(HashError::DictBusy(format!(
                "{} entries do not fit in {} buckets",
                self.ht[0].used, size
            )));
        }
        let new_exp = next_exp(size);
        if new_exp == self.ht[0].size_exp {
            return Err(HashError::DictBusy(format!(
                "table already has {} buckets",
                dict_size(new_exp)
            )));
        }
        let new_ht = HashTable::with_exp(new_exp);
        if self.ht[0].size() == 0 || self.ht[0].used == 0 {
            debug!(size = new_ht.size(), "dict table allocated");
            self.ht[0] = new_ht;
            return Ok(());
        }
        debug!(from = self.ht[0].size(), to = new_ht.size(), "dict rehashing started");
        self.ht[1] = new_ht;
        self.rehash_idx = 0;
        let dict_type = self.dict_type.clone();
        if let Some(rehashing_started) = &dict_type.rehashing_started {
            rehashing_started(self);
        }
        Ok(())
    }

    /// Shrinks (or grows) the table to the minimal size holding all entries.
    pub fn resize_to_fit(&mut self) -> Result<(), HashError> {
        if self.resize_policy != DictResizeFlag::DictResizeEnable {
            return Err(HashError::DictBusy("resize disabled by policy".to_string()));
        }
        if self.dict_is_rehashing() {
            return Err(HashError::DictBusy("rehashing in progress".to_string()));
        }
        let minimal = (self.ht[0].used as usize).max(DICT_HT_INITIAL_SIZE);
        self.expand(minimal)
    }

    fn rehash_bucket(&mut self, idx: usize) {
        let shrinking = self.ht[1].size_exp < self.ht[0].size_exp;
        let mut de = self.ht[0].table[idx].take();
        while let Some(id) = de {
            let next = self.entries[id].next;
            let hash = if shrinking {
                // the smaller mask keeps a suffix of the bucket bits
                idx as u64
            } else {
                self.hash_key(&self.entries[id].key)
            };
            let h = (hash & self.ht[1].mask()) as usize;
            self.entries[id].next = self.ht[1].table[h];
            self.ht[1].table[h] = Some(id);
            self.ht[0].used -= 1;
            self.ht[1].used += 1;
            de = next;
        }
    }

    fn check_rehashing_complete(&mut self) -> bool {
        if self.ht[0].used != 0 {
            return false;
        }
        self.ht[0] = mem::take(&mut self.ht[1]);
        self.rehash_idx = -1;
        debug!(size = self.ht[0].size(), used = self.ht[0].used, "dict rehashing completed");
        let dict_type = self.dict_type.clone();
        if let Some(rehashing_completed) = &dict_type.rehashing_completed {
            rehashing_completed(self);
        }
        true
    }

    /// Migrates up to `n` non-empty buckets. Returns true while there is
    /// still work left, false once the migration is done, when no resize is
    /// in flight, or while a safe iterator pauses rehashing.
    pub fn rehash(&mut self, mut n: usize) -> bool {
        if !self.dict_is_rehashing() || self.dict_is_rehash_paused() {
            return false;
        }
        let mut empty_visits = n * REHASH_EMPTY_VISITS;
        while n != 0 && self.ht[0].used != 0 {
            assert!(self.ht[0].size() > self.rehash_idx as u64);
            while self.ht[0].table[self.rehash_idx as usize].is_none() {
                self.rehash_idx += 1;
                empty_visits -= 1;
                if empty_visits == 0 {
                    return true;
                }
            }
            self.rehash_bucket(self.rehash_idx as usize);
            self.rehash_idx += 1;
            n -= 1;
        }
        !self.check_rehashing_complete()
    }

    pub fn rehash_step(&mut self) {
        if !self.dict_is_rehash_paused() {
            self.rehash(1);
        }
    }

    /// Rehashes in batches of 100 buckets until done or `us` elapsed.
    pub fn rehash_microseconds(&mut self, us: u64) -> u64 {
        if self.dict_is_rehash_paused() {
            return 0;
        }
        let start = Instant::now();
        let mut rehashes = 0;
        while self.rehash(100) {
            rehashes += 100;
            if start.elapsed().as_micros() as u64 >= us {
                break;
            }
        }
        rehashes
    }

    pub fn get_random_key(&mut self) -> Option<&DictEntry<K, V>> {
        if self.dict_size() == 0 {
            return None;
        }
        if self.dict_is_rehashing() {
            self.rehash_step();
        }
        let head = if self.dict_is_rehashing() {
            let s0 = self.ht[0].size();
            let skip = self.rehash_idx as u64;
            let span = (self.dict_buckets() - skip) as usize;
            loop {
                // buckets below rehash_idx in ht[0] are empty
                let h = skip + random_index(span) as u64;
                let he = if h >= s0 {
                    self.ht[1].head((h - s0) as usize)
                } else {
                    self.ht[0].head(h as usize)
                };
                if let Some(id) = he {
                    break id;
                }
            }
        } else {
            let size = self.ht[0].size() as usize;
            loop {
                if let Some(id) = self.ht[0].head(random_index(size)) {
                    break id;
                }
            }
        };

        let mut chain_len = 0;
        let mut he = Some(head);
        while let Some(id) = he {
            chain_len += 1;
            he = self.entries[id].next;
        }
        let mut id = head;
        for _ in 0..random_index(chain_len) {
            match self.entries[id].next {
                Some(next) => id = next,
                None => break,
            }
        }
        Some(&self.entries[id])
    }

    fn sample_ids(&mut self, count: usize) -> Vec<usize> {
        let count = count.min(self.dict_size() as usize);
        if count == 0 {
            return Vec::new();
        }
        for _ in 0..count {
            if !self.dict_is_rehashing() {
                break;
            }
            self.rehash_step();
        }
        let tables = if self.dict_is_rehashing() { 2 } else { 1 };
        let max_size = if tables == 2 {
            self.ht[0].size().max(self.ht[1].size())
        } else {
            self.ht[0].size()
        } as usize;

        let mut ids = Vec::with_capacity(count);
        let start = random_index(max_size);
        'walk: for step in 0..max_size {
            let i = (start + step) & (max_size - 1);
            for j in 0..tables {
                if tables == 2 && j == 0 && (i as i64) < self.rehash_idx {
                    continue;
                }
                let mut he = self.ht[j].head(i);
                while let Some(id) = he {
                    ids.push(id);
                    if ids.len() == count {
                        break 'walk;
                    }
                    he = self.entries[id].next;
                }
            }
        }
        ids
    }

    /// Samples up to `count` distinct entries from a run of consecutive
    /// buckets starting at a random position.
    pub fn get_some_keys(&mut self, count: usize) -> Vec<&DictEntry<K, V>> {
        let ids = self.sample_ids(count);
        let entries = &self.entries;
        ids.into_iter().map(|id| &entries[id]).collect()
    }

    /// Picks uniformly among a small sample, which is less biased towards
    /// long chains than [`get_random_key`](Self::get_random_key).
    pub fn get_fair_random_key(&mut self) -> Option<&DictEntry<K, V>> {
        let ids = self.sample_ids(GETFAIR_NUM_ENTRIES);
        if ids.is_empty() {
            return self.get_random_key();
        }
        let id = ids[random_index(ids.len())];
        Some(&self.entries[id])
    }

    /// Visits the buckets addressed by `cursor` and returns the next cursor,
    /// 0 once the whole table has been covered. Cursors are advanced on the
    /// reversed bits so a full scan visits every entry that was present for
    /// its whole duration even if the table grows or shrinks in between.
    pub fn scan<F>(&mut self, cursor: u64, mut f: F) -> u64
    where
        F: FnMut(&K, &mut V),
    {
        if self.dict_size() == 0 {
            return 0;
        }
        let mut v = cursor;
        if !self.dict_is_rehashing() {
            let m0 = self.ht[0].mask();
            self.scan_bucket(0, (v & m0) as usize, &mut f);
            v |= !m0;
            v = rev(rev(v).wrapping_add(1));
        } else {
            let (t0, t1) = if self.ht[0].size() > self.ht[1].size() {
                (1, 0)
            } else {
                (0, 1)
            };
            let m0 = self.ht[t0].mask();
            let m1 = self.ht[t1].mask();
            self.scan_bucket(t0, (v & m0) as usize, &mut f);
            // expansions of the small-table index in the large table
            loop {
                self.scan_bucket(t1, (v & m1) as usize, &mut f);
                v |= !m1;
                v = rev(rev(v).wrapping_add(1));
                if v & (m0 ^ m1) == 0 {
                    break;
                }
            }
        }
        v
    }

    fn scan_bucket<F>(&mut self, table: usize, idx: usize, f: &mut F)
    where
        F: FnMut(&K, &mut V),
    {
        let mut he = self.ht[table].head(idx);
        while let Some(id) = he {
            let entry = &mut self.entries[id];
            f(&entry.key, &mut entry.val);
            he = entry.next;
        }
    }
}

impl<K, V> Dict<K, V> {
    #[inline]
    pub fn dict_is_rehashing(&self) -> bool {
        self.rehash_idx != -1
    }

    #[inline]
    pub fn get_rehash_idx(&self) -> i64 {
        self.rehash_idx
    }

    #[inline]
    pub fn dict_buckets(&self) -> u64 {
        self.ht[0].size() + self.ht[1].size()
    }

    #[inline]
    pub fn table_size(&self, table: usize) -> u64 {
        self.ht[table].size()
    }

    #[inline]
    pub fn table_used(&self, table: usize) -> u64 {
        self.ht[table].used
    }

    #[inline]
    pub fn dict_size(&self) -> u64 {
        self.ht[0].used + self.ht[1].used
    }

    #[inline]
    pub fn dict_is_empty(&self) -> bool {
        self.dict_size() == 0
    }

    #[inline]
    pub fn dict_is_rehash_paused(&self) -> bool {
        self.pause_rehash.load(Ordering::Relaxed) > 0
    }

    pub fn resize_policy(&self) -> DictResizeFlag {
        self.resize_policy
    }

    pub fn set_resize_policy(&mut self, policy: DictResizeFlag) {
        self.resize_policy = policy;
    }

    /// A 64 bit digest of the table layout. Any insert, delete or rehash
    /// step changes it, which lets unsafe iterators detect misuse.
    pub fn fingerprint(&self) -> u64 {
        let integers = [
            self.ht[0].table.as_ptr() as u64,
            self.ht[0].size_exp as u64,
            self.ht[0].used,
            self.ht[1].table.as_ptr() as u64,
            self.ht[1].size_exp as u64,
            self.ht[1].used,
        ];
        integers
            .iter()
            .fold(0u64, |hash, &i| int_hash(hash.wrapping_add(i)))
    }

    fn free_entry(&self, key: K, val: V) {
        if let Some(key_destructor) = &self.dict_type.key_destructor {
            key_destructor(key);
        }
        if let Some(val_destructor) = &self.dict_type.val_destructor {
            val_destructor(val);
        }
    }

    /// Releases every entry, running the destructors, and resets both tables.
    pub fn empty(&mut self) {
        let entries = mem::take(&mut self.entries);
        for (_, entry) in entries {
            self.free_entry(entry.key, entry.val);
        }
        self.ht = [HashTable::default(), HashTable::default()];
        self.rehash_idx = -1;
    }
}

impl<K, V> Drop for Dict<K, V> {
    fn drop(&mut self) {
        if self.dict_type.key_destructor.is_some() || self.dict_type.val_destructor.is_some() {
            self.empty();
        }
    }
}

impl<K, V> Default for Dict<K, V>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}
