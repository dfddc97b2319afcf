//! The key corpus: ground truth for a whole run.
//!
//! A corpus is built once by the driver, written to `keys.json`, and then only read: request logs
//! sample their keys from it and every backend is loaded from it.

use crate::keygen::{random_key, random_value};
use crate::{Key, Result, Value};
use hashbrown::HashMap;
use log::{debug, warn};
use rand::Rng;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::path::Path;

/// A key→value mapping that remembers the order in which keys were generated.
///
/// Generated keys are not deduplicated up front. When a key is generated twice, it keeps the
/// position of its first occurrence and takes the value of the latest one, so [`Corpus::len`]
/// can be lower than [`Corpus::attempts`].
#[derive(Debug, Clone)]
pub struct Corpus {
    map: HashMap<Key, Value>,
    keys: Vec<Key>,
    attempts: usize,
}

impl Corpus {
    /// Run `attempts` rounds of key/value generation.
    pub fn generate(rng: &mut impl Rng, attempts: usize, key_len: usize, max_value: Value) -> Self {
        let mut corpus = Self {
            map: HashMap::with_capacity(attempts),
            keys: Vec::with_capacity(attempts),
            attempts: 0,
        };
        for _ in 0..attempts {
            let key = random_key(rng, key_len);
            let value = random_value(rng, max_value);
            corpus.insert(key, value);
        }
        let collisions = corpus.collisions();
        if collisions > 0 {
            warn!(
                "{} of {} generated keys collided, corpus holds {} distinct keys",
                collisions,
                attempts,
                corpus.len()
            );
        }
        debug!("Generated corpus of {} keys", corpus.len());
        corpus
    }

    /// Build a corpus from explicit pairs, in the given order. Each pair counts as one attempt.
    pub fn from_pairs<I: IntoIterator<Item = (Key, Value)>>(pairs: I) -> Self {
        let mut corpus = Self {
            map: HashMap::new(),
            keys: Vec::new(),
            attempts: 0,
        };
        for (key, value) in pairs {
            corpus.insert(key, value);
        }
        corpus
    }

    fn insert(&mut self, key: Key, value: Value) {
        self.attempts += 1;
        if self.map.insert(key.clone(), value).is_none() {
            self.keys.push(key);
        }
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of generation attempts the corpus was built from.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Number of attempts that produced an already existing key.
    pub fn collisions(&self) -> usize {
        self.attempts - self.keys.len()
    }

    /// Distinct keys in generation order.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.map.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// All pairs in generation order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, Value)> + '_ {
        self.keys.iter().map(move |k| (k, self.map[k]))
    }

    /// Pick one key uniformly at random. The corpus must not be empty.
    pub fn sample_key(&self, rng: &mut impl Rng) -> &Key {
        &self.keys[rng.random_range(0..self.keys.len())]
    }

    /// Write the corpus as a pretty-printed JSON object, keys in generation order.
    pub async fn write_json(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

impl Serialize for Corpus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.keys.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, &v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generate_sizes_and_values() {
        let mut rng = rand::rng();
        let corpus = Corpus::generate(&mut rng, 10000, 40, 24);
        assert_eq!(corpus.attempts(), 10000);
        // 40 hex digits, a collision here is practically impossible
        assert_eq!(corpus.len(), 10000);
        assert_eq!(corpus.collisions(), 0);
        for (k, v) in corpus.iter() {
            assert_eq!(k.len(), 40);
            assert!(v < 24);
        }
    }

    #[test]
    fn generate_short_keys_collide() {
        let mut rng = rand::rng();
        // only 16 possible keys
        let corpus = Corpus::generate(&mut rng, 1000, 1, 10);
        assert_eq!(corpus.attempts(), 1000);
        assert!(corpus.len() <= 16);
        assert_eq!(corpus.collisions(), 1000 - corpus.len());
        for k in corpus.keys() {
            assert!(corpus.contains(k));
            assert!(corpus.get(k).unwrap() < 10);
        }
    }

    #[test]
    fn collision_keeps_first_position_and_last_value() {
        let corpus = Corpus::from_pairs(vec![
            ("aa".to_string(), 1),
            ("bb".to_string(), 2),
            ("aa".to_string(), 3),
        ]);
        assert_eq!(corpus.attempts(), 3);
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.keys(), &["aa".to_string(), "bb".to_string()]);
        assert_eq!(corpus.get("aa"), Some(3));
        assert_eq!(corpus.get("cc"), None);
    }

    #[test]
    fn sample_key_in_corpus() {
        let mut rng = StdRng::seed_from_u64(1);
        let corpus = Corpus::generate(&mut rng, 100, 5, 10);
        for _ in 0..1000 {
            assert!(corpus.contains(corpus.sample_key(&mut rng)));
        }
    }

    #[test]
    fn json_preserves_order() {
        let corpus = Corpus::from_pairs(vec![
            ("ff".to_string(), 0),
            ("00".to_string(), 7),
            ("a1".to_string(), 23),
        ]);
        let text = serde_json::to_string_pretty(&corpus).unwrap();
        assert_eq!(text, "{\n  \"ff\": 0,\n  \"00\": 7,\n  \"a1\": 23\n}");
    }

    #[tokio::test]
    async fn write_json_file() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let path = tmp_dir.path().join("keys.json");
        let mut rng = rand::rng();
        let corpus = Corpus::generate(&mut rng, 500, 40, 24);
        corpus.write_json(&path).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.len(), corpus.len());
        for (k, v) in parsed.iter() {
            assert_eq!(v.as_u64().unwrap() as u32, corpus.get(k).unwrap());
        }
    }
}
