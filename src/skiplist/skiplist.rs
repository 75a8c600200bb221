use std::cmp::Ordering;
use std::hash::Hash;

use slab::Slab;
use tracing::{error, warn};

use crate::config::SkipListConfig;
use crate::dict::dict::Dict;
use crate::skiplist::lib::random_level;
use crate::skiplist::{LexRangeSpec, RangeSpec, SKIP_LIST_MAX_LEVEL, SKIP_LIST_P};
use crate::zset::error::ZSetError;

/// Stable handle of a node inside its list.
pub type NodeId = usize;

#[derive(Clone, Debug, Default)]
pub struct Level {
    forward: Option<NodeId>,
    /// level-0 hops to `forward`, or to the end of the list when there is none
    span: u64,
}

#[derive(Clone, Debug)]
pub struct Node<M> {
    member: M,
    score: f64,
    backward: Option<NodeId>,
    level: Vec<Level>,
}

impl<M> Node<M> {
    pub fn member(&self) -> &M {
        &self.member
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    /// Previous node, `None` for the first one.
    pub fn backward(&self) -> Option<NodeId> {
        self.backward
    }

    pub fn forward(&self, level: usize) -> Option<NodeId> {
        self.level.get(level).and_then(|l| l.forward)
    }

    pub fn span(&self, level: usize) -> u64 {
        self.level.get(level).map_or(0, |l| l.span)
    }

    pub fn height(&self) -> usize {
        self.level.len()
    }
}

/// Skip list ordered by `(score, member)` with per-level spans for rank
/// queries. Nodes live in an arena; a link of `None` on the left side of a
/// hop stands for the header.
pub struct SkipList<M> {
    nodes: Slab<Node<M>>,
    header: Vec<Level>,
    tail: Option<NodeId>,
    /// number of nodes in skip_list
    length: u64,
    /// level of node with max level
    level: usize,
    max_level: usize,
    p: f64,
    cmp: fn(&M, &M) -> Ordering,
}

impl<M: Ord> SkipList<M> {
    pub fn new() -> Self {
        Self::with_comparator(<M as Ord>::cmp)
    }

    pub fn with_config(config: &SkipListConfig) -> Self {
        let mut zsl = Self::new();
        zsl.max_level = config.max_level.clamp(1, SKIP_LIST_MAX_LEVEL);
        if config.p > 0.0 && config.p < 1.0 {
            zsl.p = config.p;
        } else {
            warn!(p = config.p, "skiplist p must lie in (0, 1), use default");
        }
        zsl.header = vec![Level::default(); zsl.max_level];
        zsl
    }
}

impl<M: Ord> Default for SkipList<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> SkipList<M> {
    pub fn with_comparator(cmp: fn(&M, &M) -> Ordering) -> Self {
        Self {
            nodes: Slab::new(),
            header: vec![Level::default(); SKIP_LIST_MAX_LEVEL],
            tail: None,
            length: 0,
            level: 1,
            max_level: SKIP_LIST_MAX_LEVEL,
            p: SKIP_LIST_P,
            cmp,
        }
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// Promotion probability used by `insert`.
    pub fn probability(&self) -> f64 {
        self.p
    }

    pub fn comparator(&self) -> fn(&M, &M) -> Ordering {
        self.cmp
    }

    pub fn node(&self, id: NodeId) -> Option<&Node<M>> {
        self.nodes.get(id)
    }

    pub fn first(&self) -> Option<NodeId> {
        self.header[0].forward
    }

    pub fn last(&self) -> Option<NodeId> {
        self.tail
    }

    pub fn iter(&self) -> Iter<'_, M> {
        Iter {
            zsl: self,
            front: self.first(),
            back: self.tail,
            remaining: self.length,
        }
    }

    #[inline]
    fn level_at(&self, x: Option<NodeId>, i: usize) -> &Level {
        match x {
            Some(id) => &self.nodes[id].level[i],
            None => &self.header[i],
        }
    }

    #[inline]
    fn level_at_mut(&mut self, x: Option<NodeId>, i: usize) -> &mut Level {
        match x {
            Some(id) => &mut self.nodes[id].level[i],
            None => &mut self.header[i],
        }
    }

    #[inline]
    fn forward_of(&self, x: Option<NodeId>, i: usize) -> Option<NodeId> {
        self.level_at(x, i).forward
    }

    #[inline]
    fn span_of(&self, x: Option<NodeId>, i: usize) -> u64 {
        self.level_at(x, i).span
    }

    /// True when `node` sorts strictly before `(score, member)`.
    #[inline]
    fn precedes(&self, node: NodeId, score: f64, member: &M) -> bool {
        let node = &self.nodes[node];
        node.score < score
            || (node.score == score && (self.cmp)(&node.member, member) == Ordering::Less)
    }

    pub fn insert(&mut self, score: f64, member: M) -> NodeId {
        debug_assert!(!score.is_nan());
        let mut update: Vec<Option<NodeId>> = vec![None; self.max_level];
        let mut rank = vec![0u64; self.max_level];
        let mut x: Option<NodeId> = None;

        for i in (0..self.level).rev() {
            rank[i] = if i == self.level - 1 { 0 } else { rank[i + 1] };
            while let Some(next) = self.forward_of(x, i) {
                if !self.precedes(next, score, &member) {
                    break;
                }
                rank[i] += self.span_of(x, i);
                x = Some(next);
            }
            update[i] = x;
        }

        let level = random_level(self.max_level, self.p);
        if level > self.level {
            for i in self.level..level {
                rank[i] = 0;
                update[i] = None;
                self.header[i].span = self.length;
            }
            self.level = level;
        }

        let id = self.nodes.insert(Node {
            member,
            score,
            backward: update[0],
            level: vec![Level::default(); level],
        });
        for i in 0..level {
            let hops = rank[0] - rank[i];
            let prev = self.level_at(update[i], i).clone();
            self.nodes[id].level[i] = Level {
                forward: prev.forward,
                span: prev.span - hops,
            };
            let prev = self.level_at_mut(update[i], i);
            prev.forward = Some(id);
            prev.span = hops + 1;
        }
        // untouched levels now reach over one more node
        for i in level..self.level {
            self.level_at_mut(update[i], i).span += 1;
        }

        match self.nodes[id].level[0].forward {
            Some(next) => self.nodes[next].backward = Some(id),
            None => self.tail = Some(id),
        }
        self.length += 1;
        id
    }

    /// Unsplices `id` given its predecessor at every level.
    fn delete_node(&mut self, id: NodeId, update: &[Option<NodeId>]) -> Node<M> {
        for i in 0..self.level {
            if self.forward_of(update[i], i) == Some(id) {
                let Level { forward, span } = self.nodes[id].level[i].clone();
                let prev = self.level_at_mut(update[i], i);
                prev.span = prev.span + span - 1;
                prev.forward = forward;
            } else {
                self.level_at_mut(update[i], i).span -= 1;
            }
        }
        let backward = self.nodes[id].backward;
        match self.nodes[id].level[0].forward {
            Some(next) => self.nodes[next].backward = backward,
            None => self.tail = backward,
        }
        while self.level > 1 && self.header[self.level - 1].forward.is_none() {
            self.level -= 1;
        }
        self.length -= 1;
        self.nodes.remove(id)
    }

    /// Removes the node matching both score and member. Returns false when
    /// there is no such node.
    pub fn delete(&mut self, score: f64, member: &M) -> bool {
        let mut update: Vec<Option<NodeId>> = vec![None; self.max_level];
        let mut x: Option<NodeId> = None;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward_of(x, i) {
                if !self.precedes(next, score, member) {
                    break;
                }
                x = Some(next);
            }
            update[i] = x;
        }
        // several nodes may share a score, the member tells them apart
        match self.forward_of(x, 0) {
            Some(id)
                if self.nodes[id].score == score
                    && (self.cmp)(&self.nodes[id].member, member) == Ordering::Equal =>
            {
                self.delete_node(id, &update);
                true
            }
            _ => false,
        }
    }

    /// Returns true if some part of the list falls inside `range`.
    pub fn is_in_range(&self, range: &RangeSpec) -> bool {
        if range.is_empty() {
            return false;
        }
        match (self.tail, self.header[0].forward) {
            (Some(last), Some(first)) => {
                range.value_gte_min(self.nodes[last].score)
                    && range.value_lte_max(self.nodes[first].score)
            }
            _ => false,
        }
    }

    pub fn first_in_range(&self, range: &RangeSpec) -> Option<NodeId> {
        if !self.is_in_range(range) {
            return None;
        }
        let mut x: Option<NodeId> = None;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward_of(x, i) {
                if range.value_gte_min(self.nodes[next].score) {
                    break;
                }
                x = Some(next);
            }
        }
        // is_in_range guarantees a successor
        let id = self.forward_of(x, 0)?;
        range.value_lte_max(self.nodes[id].score).then_some(id)
    }

    pub fn last_in_range(&self, range: &RangeSpec) -> Option<NodeId> {
        if !self.is_in_range(range) {
            return None;
        }
        let mut x: Option<NodeId> = None;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward_of(x, i) {
                if !range.value_lte_max(self.nodes[next].score) {
                    break;
                }
                x = Some(next);
            }
        }
        let id = x?;
        range.value_gte_min(self.nodes[id].score).then_some(id)
    }

    pub fn is_in_lex_range(&self, range: &LexRangeSpec<M>) -> bool {
        if range.is_empty(self.cmp) {
            return false;
        }
        match (self.tail, self.header[0].forward) {
            (Some(last), Some(first)) => {
                range.value_gte_min(&self.nodes[last].member, self.cmp)
                    && range.value_lte_max(&self.nodes[first].member, self.cmp)
            }
            _ => false,
        }
    }

    pub fn first_in_lex_range(&self, range: &LexRangeSpec<M>) -> Option<NodeId> {
        if !self.is_in_lex_range(range) {
            return None;
        }
        let mut x: Option<NodeId> = None;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward_of(x, i) {
                if range.value_gte_min(&self.nodes[next].member, self.cmp) {
                    break;
                }
                x = Some(next);
            }
        }
        let id = self.forward_of(x, 0)?;
        range
            .value_lte_max(&self.nodes[id].member, self.cmp)
            .then_some(id)
    }

    pub fn last_in_lex_range(&self, range: &LexRangeSpec<M>) -> Option<NodeId> {
        if !self.is_in_lex_range(range) {
            return None;
        }
        let mut x: Option<NodeId> = None;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward_of(x, i) {
                if !range.value_lte_max(&self.nodes[next].member, self.cmp) {
                    break;
                }
                x = Some(next);
            }
        }
        let id = x?;
        range
            .value_gte_min(&self.nodes[id].member, self.cmp)
            .then_some(id)
    }

    /// 1-based rank of the node holding `(score, member)`, 0 if absent.
    pub fn get_rank(&self, score: f64, member: &M) -> u64 {
        let mut rank = 0;
        let mut x: Option<NodeId> = None;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward_of(x, i) {
                let node = &self.nodes[next];
                if node.score < score
                    || (node.score == score && (self.cmp)(&node.member, member) != Ordering::Greater)
                {
                    rank += self.span_of(x, i);
                    x = Some(next);
                } else {
                    break;
                }
            }
            // x might be the header, in which case the member is absent here
            if let Some(id) = x {
                let node = &self.nodes[id];
                if node.score == score && (self.cmp)(&node.member, member) == Ordering::Equal {
                    return rank;
                }
            }
        }
        0
    }

    /// Node at the 1-based `rank`.
    pub fn get_element_by_rank(&self, rank: u64) -> Option<NodeId> {
        let mut traversed = 0;
        let mut x: Option<NodeId> = None;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward_of(x, i) {
                let span = self.span_of(x, i);
                if traversed + span > rank {
                    break;
                }
                traversed += span;
                x = Some(next);
            }
            if traversed == rank {
                return x;
            }
        }
        None
    }

    /// Checks ordering, back links, tail, length and every span.
    pub fn validate(&self) -> Result<(), String> {
        let mut count = 0;
        let mut prev: Option<NodeId> = None;
        let mut x = self.header[0].forward;
        while let Some(id) = x {
            let node = &self.nodes[id];
            if node.backward != prev {
                return Err(format!("node {} has a stale backward link", id));
            }
            if let Some(p) = prev {
                if !self.precedes(p, node.score, &node.member) {
                    return Err(format!("node {} is out of order", id));
                }
            }
            count += 1;
            prev = x;
            x = node.level[0].forward;
        }
        if self.tail != prev {
            return Err("tail does not point at the last node".to_string());
        }
        if count != self.length || count != self.nodes.len() as u64 {
            return Err(format!("length {} but {} reachable nodes", self.length, count));
        }
        for i in 0..self.level {
            let mut x: Option<NodeId> = None;
            let mut rank = 0;
            while let Some(next) = self.forward_of(x, i) {
                rank += self.span_of(x, i);
                let expected = self.get_rank(self.nodes[next].score, &self.nodes[next].member);
                if rank != expected {
                    return Err(format!("span mismatch at level {}: rank {} != {}", i, rank, expected));
                }
                x = Some(next);
            }
            if rank + self.span_of(x, i) != self.length {
                return Err(format!("trailing span mismatch at level {}", i));
            }
        }
        for i in self.level..self.max_level {
            if self.header[i].forward.is_some() {
                return Err(format!("header reaches past level {}", self.level));
            }
        }
        Ok(())
    }
}

impl<M: Hash + Eq> SkipList<M> {
    fn remove_from_dict(dict: &mut Dict<M, f64>, node: Node<M>, desync: &mut u64) {
        if dict.delete(&node.member).is_err() {
            *desync += 1;
        }
    }

    fn finish_range_delete(removed: u64, desync: u64) -> Result<u64, ZSetError> {
        if desync > 0 {
            error!(removed, desync, "range delete removed nodes missing from the dict");
            return Err(ZSetError::Desync(format!(
                "{} of {} removed nodes had no dict entry",
                desync, removed
            )));
        }
        Ok(removed)
    }

    /// Removes every node with a score inside `range`, together with its dict
    /// entry, and returns how many were removed.
    pub fn delete_range_by_score(
        &mut self,
        range: &RangeSpec,
        dict: &mut Dict<M, f64>,
    ) -> Result<u64, ZSetError> {
        let mut update: Vec<Option<NodeId>> = vec![None; self.max_level];
        let mut x: Option<NodeId> = None;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward_of(x, i) {
                if range.value_gte_min(self.nodes[next].score) {
                    break;
                }
                x = Some(next);
            }
            update[i] = x;
        }

        let (mut removed, mut desync) = (0, 0);
        let mut x = self.forward_of(x, 0);
        while let Some(id) = x {
            if !range.value_lte_max(self.nodes[id].score) {
                break;
            }
            x = self.nodes[id].level[0].forward;
            let node = self.delete_node(id, &update);
            Self::remove_from_dict(dict, node, &mut desync);
            removed += 1;
        }
        Self::finish_range_delete(removed, desync)
    }

    pub fn delete_range_by_lex(
        &mut self,
        range: &LexRangeSpec<M>,
        dict: &mut Dict<M, f64>,
    ) -> Result<u64, ZSetError> {
        if range.is_empty(self.cmp) {
            return Ok(0);
        }
        let mut update: Vec<Option<NodeId>> = vec![None; self.max_level];
        let mut x: Option<NodeId> = None;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward_of(x, i) {
                if range.value_gte_min(&self.nodes[next].member, self.cmp) {
                    break;
                }
                x = Some(next);
            }
            update[i] = x;
        }

        let (mut removed, mut desync) = (0, 0);
        let mut x = self.forward_of(x, 0);
        while let Some(id) = x {
            if !range.value_lte_max(&self.nodes[id].member, self.cmp) {
                break;
            }
            x = self.nodes[id].level[0].forward;
            let node = self.delete_node(id, &update);
            Self::remove_from_dict(dict, node, &mut desync);
            removed += 1;
        }
        Self::finish_range_delete(removed, desync)
    }

    /// Removes the nodes ranked `start..=end` (1-based).
    pub fn delete_range_by_rank(
        &mut self,
        start: u64,
        end: u64,
        dict: &mut Dict<M, f64>,
    ) -> Result<u64, ZSetError> {
        let mut update: Vec<Option<NodeId>> = vec![None; self.max_level];
        let mut traversed = 0;
        let mut x: Option<NodeId> = None;
        for i in (0..self.level).rev() {
            while let Some(next) = self.forward_of(x, i) {
                let span = self.span_of(x, i);
                if traversed + span >= start {
                    break;
                }
                traversed += span;
                x = Some(next);
            }
            update[i] = x;
        }

        traversed += 1;
        let (mut removed, mut desync) = (0, 0);
        let mut x = self.forward_of(x, 0);
        while let Some(id) = x {
            if traversed > end {
                break;
            }
            x = self.nodes[id].level[0].forward;
            let node = self.delete_node(id, &update);
            Self::remove_from_dict(dict, node, &mut desync);
            removed += 1;
            traversed += 1;
        }
        Self::finish_range_delete(removed, desync)
    }
}

/// Level-0 walk, from either end.
pub struct Iter<'a, M> {
    zsl: &'a SkipList<M>,
    front: Option<NodeId>,
    back: Option<NodeId>,
    remaining: u64,
}

impl<'a, M> Iterator for Iter<'a, M> {
    type Item = &'a Node<M>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = &self.zsl.nodes[self.front?];
        self.front = node.level[0].forward;
        self.remaining -= 1;
        Some(node)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining as usize, Some(self.remaining as usize))
    }
}

impl<M> DoubleEndedIterator for Iter<'_, M> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = &self.zsl.nodes[self.back?];
        self.back = node.backward;
        self.remaining -= 1;
        Some(node)
    }
}

impl<M> ExactSizeIterator for Iter<'_, M> {}
