use std::cmp::Ordering;
use std::hash::Hash;
use std::sync::Arc;

use tracing::{error, warn};

use crate::config::Config;
use crate::dict::dict::Dict;
use crate::dict::lib::DictType;
use crate::skiplist::skiplist::{Node, NodeId, SkipList};
use crate::skiplist::{LexRangeSpec, RangeSpec};
use crate::value::Value;
use crate::zset::error::ZSetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    ScoreUpdated,
    /// the member already had this score
    Unchanged,
    /// a flag prevented the write
    Skipped,
}

/// ZADD style modifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddFlags {
    /// only add new members
    pub nx: bool,
    /// only update existing members
    pub xx: bool,
    /// only update when the new score is greater
    pub gt: bool,
    /// only update when the new score is less
    pub lt: bool,
    /// treat the score as an increment
    pub incr: bool,
}

impl AddFlags {
    fn validate(&self) -> Result<(), ZSetError> {
        if self.nx && self.xx {
            return Err(ZSetError::InvalidFlags("XX and NX options at the same time are not compatible"));
        }
        if (self.gt && self.nx) || (self.lt && self.nx) || (self.gt && self.lt) {
            return Err(ZSetError::InvalidFlags("GT, LT, and/or NX options at the same time are not compatible"));
        }
        Ok(())
    }
}

/// Sorted set: a dict from member to score for O(1) lookups, and a skip
/// list over the same members for ordered and rank queries.
///
/// Every mutation goes through the dict first, which decides existence,
/// and then through the skip list. After each public call both hold the
/// same members with the same scores.
pub struct ZSet<M = Value> {
    pub(crate) dict: Dict<M, f64>,
    pub(crate) zsl: SkipList<M>,
}

impl<M> ZSet<M>
where
    M: Hash + Eq + Ord + Clone,
{
    pub fn new() -> Self {
        Self {
            dict: Dict::new(),
            zsl: SkipList::new(),
        }
    }

    pub fn with_config(config: &Config) -> Self {
        Self {
            dict: Dict::with_config(Arc::new(DictType::default()), &config.dict),
            zsl: SkipList::with_config(&config.skiplist),
        }
    }

    /// Builds a set with caller supplied dict hooks and member order.
    /// `cmp` must report `Equal` exactly for the members the dict treats as
    /// the same key.
    pub fn with_types(dict_type: Arc<DictType<M, f64>>, cmp: fn(&M, &M) -> Ordering) -> Self {
        Self {
            dict: Dict::create(dict_type),
            zsl: SkipList::with_comparator(cmp),
        }
    }

    pub fn len(&self) -> u64 {
        self.zsl.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zsl.is_empty()
    }

    pub fn dict(&self) -> &Dict<M, f64> {
        &self.dict
    }

    pub fn skiplist(&self) -> &SkipList<M> {
        &self.zsl
    }

    pub fn score(&self, member: &M) -> Option<f64> {
        self.dict.get(member).copied()
    }

    pub fn contains(&self, member: &M) -> bool {
        self.dict.contains_key(member)
    }

    pub fn add(&mut self, member: M, score: f64) -> Result<AddOutcome, ZSetError> {
        self.add_with(member, score, AddFlags::default())
            .map(|(outcome, _)| outcome)
    }

    /// Adds or updates `member` under `flags`. Also returns the member's
    /// score after the call, `None` when it is still absent.
    pub fn add_with(
        &mut self,
        member: M,
        score: f64,
        flags: AddFlags,
    ) -> Result<(AddOutcome, Option<f64>), ZSetError> {
        flags.validate()?;
        if score.is_nan() {
            return Err(ZSetError::ScoreIsNaN);
        }

        let current = match self.dict.find(&member) {
            Some(entry) => *entry.get_val(),
            None => {
                if flags.xx {
                    return Ok((AddOutcome::Skipped, None));
                }
                self.dict.add(member.clone(), score)?;
                self.zsl.insert(score, member);
                return Ok((AddOutcome::Added, Some(score)));
            }
        };

        if flags.nx {
            return Ok((AddOutcome::Skipped, Some(current)));
        }
        let mut score = score;
        if flags.incr {
            score += current;
            if score.is_nan() {
                return Err(ZSetError::ScoreIsNaN);
            }
        }
        if (flags.lt && score >= current) || (flags.gt && score <= current) {
            return Ok((AddOutcome::Skipped, Some(current)));
        }
        if score == current {
            return Ok((AddOutcome::Unchanged, Some(current)));
        }

        // the node moves, so it is removed and inserted again
        if !self.zsl.delete(current, &member) {
            return Err(Self::desync("updated member has no skiplist node"));
        }
        self.zsl.insert(score, member.clone());
        if let Some(val) = self.dict.find_mut(&member) {
            *val = score;
        }
        Ok((AddOutcome::ScoreUpdated, Some(score)))
    }

    /// Adds `delta` to the member's score, creating it at `delta` if absent.
    pub fn incr_by(&mut self, member: M, delta: f64) -> Result<f64, ZSetError> {
        let flags = AddFlags {
            incr: true,
            ..Default::default()
        };
        match self.add_with(member, delta, flags)? {
            (_, Some(score)) => Ok(score),
            (_, None) => Err(Self::desync("increment left the member absent")),
        }
    }

    /// Removes `member` and returns its score, `None` if it was absent.
    pub fn remove(&mut self, member: &M) -> Result<Option<f64>, ZSetError> {
        let Some((member, score)) = self.dict.unlink(member) else {
            return Ok(None);
        };
        if !self.zsl.delete(score, &member) {
            return Err(Self::desync("removed member has no skiplist node"));
        }
        Ok(Some(score))
    }

    /// 1-based rank, counted from the highest score when `reverse`.
    pub fn rank(&self, member: &M, reverse: bool) -> Result<Option<u64>, ZSetError> {
        let Some(score) = self.score(member) else {
            return Ok(None);
        };
        let rank = self.zsl.get_rank(score, member);
        if rank == 0 {
            return Err(Self::desync("member is in the dict but not ranked"));
        }
        Ok(Some(if reverse { self.len() - rank + 1 } else { rank }))
    }

    fn entry(node: &Node<M>) -> (M, f64) {
        (node.member().clone(), node.score())
    }

    fn step(&self, node: &Node<M>, reverse: bool) -> Option<NodeId> {
        if reverse {
            node.backward()
        } else {
            node.forward(0)
        }
    }

    /// Members ranked `start..=end` (1-based, clamped to the set).
    pub fn range_by_rank(&self, start: u64, end: u64, reverse: bool) -> Vec<(M, f64)> {
        let len = self.len();
        let start = start.max(1);
        let end = end.min(len);
        if start > end {
            return Vec::new();
        }
        let first = if reverse { len - start + 1 } else { start };
        let mut result = Vec::with_capacity((end - start + 1) as usize);
        let mut x = self.zsl.get_element_by_rank(first);
        while let Some(node) = x.and_then(|id| self.zsl.node(id)) {
            if result.len() as u64 == end - start + 1 {
                break;
            }
            result.push(Self::entry(node));
            x = self.step(node, reverse);
        }
        result
    }

    /// Members with a score inside `range`, after skipping `offset` of them
    /// and stopping at `limit`.
    pub fn range_by_score(
        &self,
        range: &RangeSpec,
        reverse: bool,
        offset: u64,
        limit: Option<u64>,
    ) -> Vec<(M, f64)> {
        let mut x = if reverse {
            self.zsl.last_in_range(range)
        } else {
            self.zsl.first_in_range(range)
        };
        let mut result = Vec::new();
        let mut skip = offset;
        while let Some(node) = x.and_then(|id| self.zsl.node(id)) {
            let inside = if reverse {
                range.value_gte_min(node.score())
            } else {
                range.value_lte_max(node.score())
            };
            if !inside || limit.is_some_and(|l| result.len() as u64 >= l) {
                break;
            }
            if skip > 0 {
                skip -= 1;
            } else {
                result.push(Self::entry(node));
            }
            x = self.step(node, reverse);
        }
        result
    }

    pub fn range_by_lex(
        &self,
        range: &LexRangeSpec<M>,
        reverse: bool,
        offset: u64,
        limit: Option<u64>,
    ) -> Vec<(M, f64)> {
        let cmp = self.zsl.comparator();
        let mut x = if reverse {
            self.zsl.last_in_lex_range(range)
        } else {
            self.zsl.first_in_lex_range(range)
        };
        let mut result = Vec::new();
        let mut skip = offset;
        while let Some(node) = x.and_then(|id| self.zsl.node(id)) {
            let inside = if reverse {
                range.value_gte_min(node.member(), cmp)
            } else {
                range.value_lte_max(node.member(), cmp)
            };
            if !inside || limit.is_some_and(|l| result.len() as u64 >= l) {
                break;
            }
            if skip > 0 {
                skip -= 1;
            } else {
                result.push(Self::entry(node));
            }
            x = self.step(node, reverse);
        }
        result
    }

    fn rank_of(&self, id: NodeId) -> u64 {
        self.zsl
            .node(id)
            .map_or(0, |node| self.zsl.get_rank(node.score(), node.member()))
    }

    /// Number of members with a score inside `range`.
    pub fn count(&self, range: &RangeSpec) -> u64 {
        match (self.zsl.first_in_range(range), self.zsl.last_in_range(range)) {
            (Some(first), Some(last)) => self.rank_of(last) - self.rank_of(first) + 1,
            _ => 0,
        }
    }

    pub fn lex_count(&self, range: &LexRangeSpec<M>) -> u64 {
        match (
            self.zsl.first_in_lex_range(range),
            self.zsl.last_in_lex_range(range),
        ) {
            (Some(first), Some(last)) => self.rank_of(last) - self.rank_of(first) + 1,
            _ => 0,
        }
    }

    pub fn delete_range_by_score(&mut self, range: &RangeSpec) -> Result<u64, ZSetError> {
        self.zsl.delete_range_by_score(range, &mut self.dict)
    }

    pub fn delete_range_by_lex(&mut self, range: &LexRangeSpec<M>) -> Result<u64, ZSetError> {
        self.zsl.delete_range_by_lex(range, &mut self.dict)
    }

    /// Removes the members ranked `start..=end` (1-based, clamped).
    pub fn delete_range_by_rank(&mut self, start: u64, end: u64) -> Result<u64, ZSetError> {
        let start = start.max(1);
        let end = end.min(self.len());
        if start > end {
            return Ok(0);
        }
        self.zsl.delete_range_by_rank(start, end, &mut self.dict)
    }

    fn pop(&mut self, count: u64, reverse: bool) -> Result<Vec<(M, f64)>, ZSetError> {
        let popped = self.range_by_rank(1, count, reverse);
        for (member, _) in &popped {
            if self.remove(member)?.is_none() {
                return Err(Self::desync("ranked member missing from the dict"));
            }
        }
        Ok(popped)
    }

    /// Removes and returns up to `count` members with the lowest scores.
    pub fn pop_min(&mut self, count: u64) -> Result<Vec<(M, f64)>, ZSetError> {
        self.pop(count, false)
    }

    pub fn pop_max(&mut self, count: u64) -> Result<Vec<(M, f64)>, ZSetError> {
        self.pop(count, true)
    }

    /// Members in ascending `(score, member)` order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&M, f64)> + '_ {
        self.zsl.iter().map(|node| (node.member(), node.score()))
    }

    /// Verifies that the dict and the skip list describe the same set.
    pub fn check_consistency(&self) -> Result<(), ZSetError> {
        if self.dict.dict_size() != self.zsl.len() {
            return Err(Self::desync(&format!(
                "dict holds {} members, skiplist {}",
                self.dict.dict_size(),
                self.zsl.len()
            )));
        }
        for node in self.zsl.iter() {
            if self.dict.get(node.member()) != Some(&node.score()) {
                return Err(Self::desync("member score differs between dict and skiplist"));
            }
        }
        self.zsl.validate().map_err(|e| Self::desync(&e))
    }

    fn desync(msg: &str) -> ZSetError {
        error!(msg, "sorted set invariant violated");
        ZSetError::Desync(msg.to_string())
    }
}

impl<M> Default for ZSet<M>
where
    M: Hash + Eq + Ord + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M> FromIterator<(M, f64)> for ZSet<M>
where
    M: Hash + Eq + Ord + Clone,
{
    /// Later pairs win over earlier ones for the same member; pairs with a
    /// NaN score are dropped.
    fn from_iter<I: IntoIterator<Item = (M, f64)>>(iter: I) -> Self {
        let mut zset = ZSet::new();
        for (member, score) in iter {
            if let Err(e) = zset.add(member, score) {
                warn!(error = %e, "skipping member while rebuilding sorted set");
            }
        }
        zset
    }
}
