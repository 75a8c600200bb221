use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use bytes::Bytes;

/// A sorted-set member or dict key.
///
/// An integer compares, hashes and orders exactly like its decimal string,
/// so `Int(10)` and `Bytes("10")` are the same member.
#[derive(Clone, Debug)]
pub enum Value {
    Bytes(Bytes),
    Int(i64),
}

impl Value {
    pub fn as_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Value::Bytes(b) => Cow::Borrowed(b.as_ref()),
            Value::Int(i) => Cow::Owned(i.to_string().into_bytes()),
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int(_))
    }
}

/// Binary comparison, a shorter common prefix sorts first.
pub fn sds_cmp(s1: &[u8], s2: &[u8]) -> Ordering {
    let min_len = s1.len().min(s2.len());
    match s1[..min_len].cmp(&s2[..min_len]) {
        Ordering::Equal => s1.len().cmp(&s2.len()),
        order => order,
    }
}

pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bytes(a), Value::Bytes(b)) => sds_cmp(a, b),
        _ => sds_cmp(&a.as_bytes(), &b.as_bytes()),
    }
}

pub fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Bytes(a), Value::Bytes(b)) => a == b,
        _ => a.as_bytes() == b.as_bytes(),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        equals(self, other)
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Value::Int(i) => write!(f, "{}", i),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Bytes(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Bytes(Bytes::from(s))
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(v))
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

#[cfg(test)]
mod value_test {
    use super::*;
    use crate::dict::hash::sys_hash;

    #[test]
    fn int_matches_its_decimal_string() {
        assert_eq!(Value::Int(10), Value::from("10"));
        assert_eq!(sys_hash(&Value::Int(-3)), sys_hash(&Value::from("-3")));
        assert_ne!(Value::Int(10), Value::from("010"));
    }

    #[test]
    fn binary_order() {
        assert_eq!(compare(&"a".into(), &"b".into()), Ordering::Less);
        assert_eq!(compare(&"ab".into(), &"a".into()), Ordering::Greater);
        assert_eq!(compare(&"".into(), &"a".into()), Ordering::Less);
        // "10" < "9" byte-wise
        assert_eq!(compare(&Value::Int(10), &Value::Int(9)), Ordering::Less);
        assert_eq!(compare(&Value::Int(5), &"5".into()), Ordering::Equal);
        assert!(Value::from(vec![0xff]) > Value::from("z"));
    }
}
