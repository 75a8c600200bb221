use std::hash::{Hash, Hasher};
use cityhasher::CityHasher;

pub const HASH_SEED: u64 = 0x87c37b91114253d5;

#[inline]
pub fn sys_hash(hash: impl Hash) -> u64 {
    let mut hasher = CityHasher::with_seed(HASH_SEED);
    hash.hash(&mut hasher);
    hasher.finish()
}

/// Thomas Wang's 64 bit integer mix, used to fold table metadata into a
/// single fingerprint word.
#[inline]
pub fn int_hash(mut key: u64) -> u64 {
    key = (!key).wrapping_add(key << 21);
    key ^= key >> 24;
    key = key.wrapping_add(key << 3).wrapping_add(key << 8);
    key ^= key >> 14;
    key = key.wrapping_add(key << 2).wrapping_add(key << 4);
    key ^= key >> 28;
    key.wrapping_add(key << 31)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sys_hash_is_stable() {
        assert_eq!(sys_hash("member"), sys_hash("member"));
        assert_ne!(sys_hash("member"), sys_hash("member2"));
    }

    #[test]
    fn int_hash_spreads_small_inputs() {
        assert_ne!(int_hash(1), int_hash(2));
    }
}
