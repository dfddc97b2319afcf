//! Random generation of corpus keys and values.
//!
//! Keys are built one hex digit at a time from a uniform, non-cryptographic RNG. Nothing checks
//! for duplicates: for `n` keys of length `l` the probability of at least one collision is
//! roughly `n^2 / (2 * 16^l)`. With the production settings (500k keys of 40 digits) that is
//! about `1e-37`; with short keys it is not negligible (100 keys of 5 digits collide with a
//! probability of about 0.5%). [`crate::Corpus`] keeps colliding keys collapsed and reports
//! both counts.

use crate::{Key, Value};
use rand::Rng;

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Generate a key of exactly `len` lowercase hex digits.
pub fn random_key(rng: &mut impl Rng, len: usize) -> Key {
    (0..len)
        .map(|_| HEX[rng.random_range(0..HEX.len())] as char)
        .collect()
}

/// Generate a value uniformly in `[0, max)`.
pub fn random_value(rng: &mut impl Rng, max: Value) -> Value {
    rng.random_range(0..max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashMap;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn key_length_and_alphabet() {
        let mut rng = rand::rng();
        for len in [1, 5, 40, 128] {
            for _ in 0..100 {
                let k = random_key(&mut rng, len);
                assert_eq!(k.len(), len);
                assert!(k.bytes().all(|b| HEX.contains(&b)), "bad key {}", k);
            }
        }
        assert!(random_key(&mut rng, 0).is_empty());
    }

    #[test]
    fn key_digits_uniform() {
        let mut rng = rand::rng();
        let mut dist: HashMap<char, u64> = HashMap::new();
        // 1.6m digits so ~100k occurance ea. Bound to 95k to 105k
        for _ in 0..40000 {
            for c in random_key(&mut rng, 40).chars() {
                *dist.entry(c).or_insert(0) += 1;
            }
        }
        assert_eq!(dist.len(), 16);
        for c in dist.values() {
            assert!(*c > 95000 && *c < 105000);
        }
    }

    #[test]
    fn value_range() {
        let mut rng = rand::rng();
        let mut seen = [false; 24];
        for _ in 0..10000 {
            let v = random_value(&mut rng, 24);
            assert!(v < 24);
            seen[v as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
        for _ in 0..100 {
            assert_eq!(random_value(&mut rng, 1), 0);
        }
    }

    #[test]
    fn seeded_generation_repeats() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(random_key(&mut a, 40), random_key(&mut b, 40));
            assert_eq!(random_value(&mut a, 24), random_value(&mut b, 24));
        }
    }
}
