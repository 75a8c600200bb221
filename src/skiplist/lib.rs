use rand::Rng;

use crate::skiplist::SKIP_LIST_MAX_LEVEL;

pub fn gen_random() -> u32 {
    let mut rng = rand::rng();
    rng.random::<u32>()
}

/// Returns a level in `1..=max_level`; level k has probability
/// p^(k-1) * (1-p), with the remainder folded into `max_level`.
pub fn random_level(max_level: usize, p: f64) -> usize {
    let max_level = max_level.clamp(1, SKIP_LIST_MAX_LEVEL);
    let threshold = (p.clamp(0.0, 1.0) * 0xFFFF as f64) as u32;
    let mut level = 1;
    while level < max_level && (gen_random() & 0xFFFF) < threshold {
        level += 1;
    }
    level
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::skiplist::SKIP_LIST_P;

    #[test]
    fn random_level_is_geometric() {
        let rounds = 100_000;
        let mut hist = [0usize; SKIP_LIST_MAX_LEVEL + 1];
        for _ in 0..rounds {
            let level = random_level(SKIP_LIST_MAX_LEVEL, SKIP_LIST_P);
            assert!((1..=SKIP_LIST_MAX_LEVEL).contains(&level));
            hist[level] += 1;
        }
        // expected 75% at level 1, 18.75% at level 2
        let one = hist[1] as f64 / rounds as f64;
        let two = hist[2] as f64 / rounds as f64;
        assert!((0.72..0.78).contains(&one), "level 1 share {}", one);
        assert!((0.16..0.22).contains(&two), "level 2 share {}", two);
    }

    #[test]
    fn random_level_respects_cap() {
        for _ in 0..1000 {
            assert_eq!(random_level(1, 0.9), 1);
            assert!(random_level(3, 0.9) <= 3);
        }
        // a certain promotion stops at the cap instead of spinning
        assert_eq!(random_level(5, 1.5), 5);
        assert_eq!(random_level(SKIP_LIST_MAX_LEVEL, 1.0), SKIP_LIST_MAX_LEVEL);
        assert_eq!(random_level(8, f64::NAN), 1);
        assert_eq!(random_level(8, -0.5), 1);
    }
}
