use std::mem::size_of;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dict::dict::Dict;

pub(crate) const DICT_HT_INITIAL_EXP: u32 = 2;
pub(crate) const DICT_HT_INITIAL_SIZE: usize = 1 << DICT_HT_INITIAL_EXP;
pub const DICT_FORCE_RESIZE_RATIO: u64 = 5;
pub(crate) const LONG_MAX: u64 = 0x7FFF_FFFF_FFFF_FFFF;
pub(crate) const DICT_STATS_VECTLEN: usize = 50;
pub const GETFAIR_NUM_ENTRIES: usize = 15;
/// Empty buckets a single rehash step may skip, per bucket of budget.
pub(crate) const REHASH_EMPTY_VISITS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DictResizeFlag {
    #[serde(rename = "enable")]
    DictResizeEnable,
    #[serde(rename = "avoid")]
    DictResizeAvoid,
    #[serde(rename = "forbid")]
    DictResizeForbid,
}

impl Default for DictResizeFlag {
    fn default() -> Self {
        DictResizeFlag::DictResizeEnable
    }
}

/// Per-dict behaviour hooks. Every hook is optional: without a hash function
/// keys go through [`sys_hash`](crate::dict::hash::sys_hash), without a
/// comparator `K: Eq` decides equality, and without destructors removed
/// keys and values are simply dropped.
pub struct DictType<K, V> {
    pub hash_function: Option<Box<dyn Fn(&K) -> u64 + Send + Sync>>,
    pub key_compare: Option<Box<dyn Fn(&K, &K) -> bool + Send + Sync>>,
    pub key_dup: Option<Box<dyn Fn(&K) -> K + Send + Sync>>,
    pub val_dup: Option<Box<dyn Fn(&V) -> V + Send + Sync>>,
    pub key_destructor: Option<Box<dyn Fn(K) + Send + Sync>>,
    pub val_destructor: Option<Box<dyn Fn(V) + Send + Sync>>,
    pub rehashing_started: Option<Box<dyn Fn(&Dict<K, V>) + Send + Sync>>,
    pub rehashing_completed: Option<Box<dyn Fn(&Dict<K, V>) + Send + Sync>>,
}

impl<K, V> Default for DictType<K, V> {
    fn default() -> Self {
        Self {
            hash_function: None,
            key_compare: None,
            key_dup: None,
            val_dup: None,
            key_destructor: None,
            val_destructor: None,
            rehashing_started: None,
            rehashing_completed: None,
        }
    }
}

#[inline]
pub fn dict_size(exp: i32) -> u64 {
    if exp == -1 { 0 } else { 1 << exp }
}

#[inline]
pub fn dict_size_mask(exp: i32) -> u64 {
    if exp == -1 { 0 } else { dict_size(exp) - 1 }
}

/// Exponent of the smallest power of two that can hold `size` buckets,
/// never below the initial table size.
pub fn next_exp(size: usize) -> i32 {
    if size <= DICT_HT_INITIAL_SIZE {
        return DICT_HT_INITIAL_EXP as i32;
    }
    let long_bits = size_of::<usize>() * 8;
    if size as u64 >= LONG_MAX {
        return (long_bits - 1) as i32;
    }
    let leading_zeros = (size - 1).leading_zeros() as usize;
    (long_bits - leading_zeros) as i32
}

#[inline]
pub fn rev(v: u64) -> u64 {
    v.reverse_bits()
}

pub fn random_index(bound: usize) -> usize {
    rand::rng().random_range(0..bound)
}
