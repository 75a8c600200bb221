use std::cmp::Ordering;

use bytes::Bytes;

use crate::value::Value;
use crate::zset::error::ZSetError;

pub mod lib;
pub mod skiplist;

pub use skiplist::{Node, NodeId, SkipList};

pub const SKIP_LIST_MAX_LEVEL: usize = 32;
pub const SKIP_LIST_P: f64 = 0.25;

/// Score interval, each end inclusive unless flagged exclusive.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RangeSpec {
    pub min: f64,
    pub max: f64,
    pub min_ex: bool,
    pub max_ex: bool,
}

impl RangeSpec {
    pub fn new(min: f64, max: f64, min_ex: bool, max_ex: bool) -> Self {
        Self {
            min,
            max,
            min_ex,
            max_ex,
        }
    }

    /// Both ends inclusive.
    pub fn closed(min: f64, max: f64) -> Self {
        Self::new(min, max, false, false)
    }

    /// Parses the `ZRANGEBYSCORE` bound syntax: `1.5`, `(1.5`, `-inf`, `+inf`.
    pub fn parse(min: &str, max: &str) -> Result<Self, ZSetError> {
        let (min, min_ex) = parse_score_bound(min)?;
        let (max, max_ex) = parse_score_bound(max)?;
        Ok(Self::new(min, max, min_ex, max_ex))
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max || (self.min == self.max && (self.min_ex || self.max_ex))
    }

    pub fn value_gte_min(&self, value: f64) -> bool {
        if self.min_ex {
            value > self.min
        } else {
            value >= self.min
        }
    }

    pub fn value_lte_max(&self, value: f64) -> bool {
        if self.max_ex {
            value < self.max
        } else {
            value <= self.max
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.value_gte_min(value) && self.value_lte_max(value)
    }
}

fn parse_score_bound(s: &str) -> Result<(f64, bool), ZSetError> {
    let (text, exclusive) = match s.strip_prefix('(') {
        Some(rest) => (rest, true),
        None => (s, false),
    };
    match text.trim().parse::<f64>() {
        Ok(score) if !score.is_nan() => Ok((score, exclusive)),
        _ => Err(ZSetError::InvalidRange(format!("min or max is not a float: {}", s))),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexBound<M> {
    NegInf,
    PosInf,
    Inclusive(M),
    Exclusive(M),
}

impl<M> LexBound<M> {
    fn is_exclusive(&self) -> bool {
        !matches!(self, LexBound::Inclusive(_))
    }

    /// Orders two bounds by their value alone, infinities at the ends.
    fn cmp_bound(&self, other: &Self, cmp: fn(&M, &M) -> Ordering) -> Ordering {
        use LexBound::*;
        match (self, other) {
            (NegInf, NegInf) | (PosInf, PosInf) => Ordering::Equal,
            (NegInf, _) | (_, PosInf) => Ordering::Less,
            (PosInf, _) | (_, NegInf) => Ordering::Greater,
            (Inclusive(a) | Exclusive(a), Inclusive(b) | Exclusive(b)) => cmp(a, b),
        }
    }
}

/// Member interval for the lexicographic queries, meaningful when every
/// member in the list shares one score.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LexRangeSpec<M> {
    pub min: LexBound<M>,
    pub max: LexBound<M>,
}

impl<M> LexRangeSpec<M> {
    pub fn new(min: LexBound<M>, max: LexBound<M>) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self, cmp: fn(&M, &M) -> Ordering) -> bool {
        match self.min.cmp_bound(&self.max, cmp) {
            Ordering::Greater => true,
            Ordering::Equal => self.min.is_exclusive() || self.max.is_exclusive(),
            Ordering::Less => false,
        }
    }

    pub fn value_gte_min(&self, value: &M, cmp: fn(&M, &M) -> Ordering) -> bool {
        match &self.min {
            LexBound::NegInf => true,
            LexBound::PosInf => false,
            LexBound::Inclusive(min) => cmp(value, min) != Ordering::Less,
            LexBound::Exclusive(min) => cmp(value, min) == Ordering::Greater,
        }
    }

    pub fn value_lte_max(&self, value: &M, cmp: fn(&M, &M) -> Ordering) -> bool {
        match &self.max {
            LexBound::NegInf => false,
            LexBound::PosInf => true,
            LexBound::Inclusive(max) => cmp(value, max) != Ordering::Greater,
            LexBound::Exclusive(max) => cmp(value, max) == Ordering::Less,
        }
    }
}

impl LexRangeSpec<Value> {
    /// Parses the `ZRANGEBYLEX` bound syntax: `-`, `+`, `[member`, `(member`.
    pub fn parse(min: impl AsRef<[u8]>, max: impl AsRef<[u8]>) -> Result<Self, ZSetError> {
        Ok(Self::new(
            parse_lex_bound(min.as_ref())?,
            parse_lex_bound(max.as_ref())?,
        ))
    }
}

fn parse_lex_bound(s: &[u8]) -> Result<LexBound<Value>, ZSetError> {
    match s {
        b"+" => Ok(LexBound::PosInf),
        b"-" => Ok(LexBound::NegInf),
        [b'[', rest @ ..] => Ok(LexBound::Inclusive(Value::Bytes(Bytes::copy_from_slice(rest)))),
        [b'(', rest @ ..] => Ok(LexBound::Exclusive(Value::Bytes(Bytes::copy_from_slice(rest)))),
        _ => Err(ZSetError::InvalidRange(format!(
            "min or max not valid string range item: {}",
            String::from_utf8_lossy(s)
        ))),
    }
}
