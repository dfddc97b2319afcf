//! An in-process backend on top of [`hashbrown::HashMap`], with the same semantics as the cache
//! backend: the bulk load is a concurrent burst of sets and lookups are positional.
//!
//! ## Configuration Format
//!
//! ``` toml
//! [[backend]]
//! name = "hashmap"
//! concurrency = 1024 # optional, in-flight sets during the bulk load
//! ```

use crate::backends::{bulk_load, parse_opt, Registry, DEFAULT_CONCURRENCY};
use crate::*;
use ::hashbrown::HashMap;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize, Default)]
pub struct HashMapBackendOpt {
    pub concurrency: Option<usize>,
}

#[derive(Clone)]
pub struct HashMapBackend {
    concurrency: usize,
    map: Arc<Mutex<HashMap<Key, Value>>>,
}

impl HashMapBackend {
    pub fn new(opt: &HashMapBackendOpt) -> Self {
        Self {
            concurrency: opt.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
            map: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn new_backend(opt: &toml::Table) -> Result<Box<dyn LookupBackend>> {
        let opt: HashMapBackendOpt = parse_opt("hashmap", opt)?;
        if opt.concurrency == Some(0) {
            return Err(Error::Config("concurrency should be positive".to_string()));
        }
        Ok(Box::new(Self::new(&opt)))
    }
}

#[async_trait]
impl LookupBackend for HashMapBackend {
    async fn prepare(&mut self, corpus: &Corpus) -> Result<()> {
        self.map.lock().clear();
        bulk_load(corpus, self.concurrency, |key, value| {
            let map = self.map.clone();
            async move {
                map.lock().insert(key, value);
                Ok(())
            }
        })
        .await
    }

    async fn lookup(&mut self, request: &[Key]) -> Result<Vec<Entry>> {
        let map = self.map.lock();
        Ok(request
            .iter()
            .map(|k| map.get(k).map(|v| (k.clone(), *v)))
            .collect())
    }

    async fn count(&mut self) -> Result<u64> {
        Ok(self.map.lock().len() as u64)
    }
}

inventory::submit! {
    Registry::new("hashmap", HashMapBackend::new_backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prepare_and_lookup() {
        let mut backend = HashMapBackend::new(&HashMapBackendOpt::default());
        let corpus = Corpus::from_pairs(vec![("aa".to_string(), 1), ("bb".to_string(), 2)]);
        backend.prepare(&corpus).await.unwrap();
        assert_eq!(backend.count().await.unwrap(), 2);

        let request: Request = vec!["bb".into(), "zz".into(), "aa".into(), "bb".into()];
        let res = backend.lookup(&request).await.unwrap();
        assert_eq!(
            res,
            vec![
                Some(("bb".to_string(), 2)),
                None,
                Some(("aa".to_string(), 1)),
                Some(("bb".to_string(), 2)),
            ]
        );
    }

    #[tokio::test]
    async fn prepare_wipes_previous_state() {
        let opt = HashMapBackendOpt {
            concurrency: Some(3),
        };
        let mut backend = HashMapBackend::new(&opt);
        let mut rng = rand::rng();
        let first = Corpus::generate(&mut rng, 100, 40, 24);
        backend.prepare(&first).await.unwrap();
        assert_eq!(backend.count().await.unwrap(), 100);

        let second = Corpus::generate(&mut rng, 10, 40, 24);
        backend.prepare(&second).await.unwrap();
        assert_eq!(backend.count().await.unwrap(), 10);
        let res = backend.lookup(first.keys()).await.unwrap();
        assert_eq!(res.len(), 100);
        assert!(res.iter().all(|e| e.is_none()));
    }

    #[test]
    fn zero_concurrency() {
        let mut opt = toml::Table::new();
        opt.insert("concurrency".to_string(), toml::Value::Integer(0));
        assert!(matches!(
            HashMapBackend::new_backend(&opt),
            Err(Error::Config(_))
        ));
    }
}
