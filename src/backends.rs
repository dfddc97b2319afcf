//! Adapters for built-in and external lookup backends.
//!
//! ## Configuration Format
//!
//! Backends are listed in an array of dictionaries named `backend`, and they are benchmarked in
//! the order they appear. A backend's configuration looks like the following:
//!
//! ```toml
//! [[backend]]
//! name = "..."
//! # option1 = ...
//! # option2 = ...
//! ```
//!
//! The field `name` must be given and it should be equal to the name registered by the backend.
//! Other than `name`, all the fields are parsed as a string map and will be handed over to the
//! backend's constructor function. For available options other than `name`, one can refer to
//! the module-level documentation of a specific backend.
//!
//! ## Built-in Backends
//!
//! - [`redis`]: the cache backend (`FLUSHALL`/`SET`/`MGET`).
//! - [`postgres`]: the relational backend (`SELECT ... WHERE key IN (...)`).
//! - [`hashmap`]: an in-process map with cache semantics, mostly for tests.
//! - [`null`]: stores nothing. It can be used to measure the overhead of the harness itself.
//!
//! ## Registering New Backends
//!
//! A new backend implements [`LookupBackend`] and a constructor function with a signature of
//! `fn(&toml::Table) -> Result<Box<dyn LookupBackend>>`. The constructor is then registered with
//! [`inventory`]: `inventory::submit! { Registry::new("name", constructor_fn) };`.

use crate::*;
use hashbrown::HashMap;
use log::debug;
use serde::Deserialize;
use std::future::Future;
use tokio::task::JoinSet;
use toml::Table;

/// Constructor of a boxed backend from its TOML options.
pub type Constructor = fn(&Table) -> Result<Box<dyn LookupBackend>>;

/// The centralized registry that maps the name of a backend to its constructor function.
pub struct Registry<'a> {
    pub(crate) name: &'a str,
    constructor: Constructor,
}

impl<'a> Registry<'a> {
    pub const fn new(name: &'a str, constructor: Constructor) -> Self {
        Self { name, constructor }
    }
}

inventory::collect!(Registry<'static>);

/// The options of one `[[backend]]` entry.
#[derive(Deserialize, Clone, Debug)]
pub struct BackendOpt {
    pub name: String,
    #[serde(flatten)]
    pub opt: Table,
}

/// A created backend together with the name it was registered under.
pub struct NamedBackend {
    pub name: String,
    pub backend: Box<dyn LookupBackend>,
}

impl NamedBackend {
    pub fn new(opt: &BackendOpt) -> Result<Self> {
        // construct the hashmap.. this will be done every time
        let mut registered: HashMap<&'static str, Constructor> = HashMap::new();
        for r in inventory::iter::<Registry> {
            debug!("Adding supported backend: {}", r.name);
            assert!(registered.insert(r.name, r.constructor).is_none()); // no existing name
        }
        let f = registered
            .get(opt.name.as_str())
            .ok_or_else(|| Error::UnknownBackend(opt.name.clone()))?;
        Ok(Self {
            name: opt.name.clone(),
            backend: f(&opt.opt)?,
        })
    }
}

/// Names of all registered backends, sorted.
pub fn registered() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = inventory::iter::<Registry>
        .into_iter()
        .map(|r| r.name)
        .collect();
    names.sort_unstable();
    names
}

/// Parse a backend's option table into its typed options.
pub(crate) fn parse_opt<T: serde::de::DeserializeOwned>(name: &str, opt: &Table) -> Result<T> {
    opt.clone()
        .try_into()
        .map_err(|e| Error::Config(format!("backend {}: {}", name, e)))
}

/// Default number of in-flight set operations during a concurrent bulk load.
pub const DEFAULT_CONCURRENCY: usize = 1024;

/// Issue one `set` per corpus pair as a burst of concurrent tasks, with at most `concurrency`
/// of them in flight, and wait for all of them.
///
/// The first failure is returned and the remaining tasks are aborted.
pub(crate) async fn bulk_load<F, Fut>(
    corpus: &Corpus,
    concurrency: usize,
    mut set: F,
) -> Result<()>
where
    F: FnMut(Key, Value) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    assert!(concurrency > 0);
    let mut tasks = JoinSet::new();
    for (key, value) in corpus.iter() {
        if tasks.len() >= concurrency {
            if let Some(res) = tasks.join_next().await {
                res??;
            }
        }
        tasks.spawn(set(key.clone(), value));
    }
    while let Some(res) = tasks.join_next().await {
        res??;
    }
    Ok(())
}

pub mod hashmap;
pub mod null;
pub mod postgres;
pub mod redis;

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn backend(text: &str) -> Result<NamedBackend> {
        let opt: BackendOpt = toml::from_str(text).unwrap();
        NamedBackend::new(&opt)
    }

    #[test]
    fn builtin_registered() {
        let names = registered();
        for n in ["hashmap", "null", "postgres", "redis"] {
            assert!(names.contains(&n), "{} missing", n);
        }
    }

    #[test]
    fn create_by_name() {
        let b = backend("name = \"hashmap\"").unwrap();
        assert_eq!(b.name, "hashmap");
        let b = backend("name = \"redis\"\nurl = \"redis://localhost:6379\"").unwrap();
        assert_eq!(b.name, "redis");
    }

    #[test]
    fn unknown_backend() {
        assert!(matches!(
            backend("name = \"memcached\""),
            Err(Error::UnknownBackend(n)) if n == "memcached"
        ));
    }

    #[test]
    fn invalid_options() {
        assert!(matches!(
            backend("name = \"redis\"\nconcurrency = \"many\""),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn bulk_load_bounded() {
        let corpus = Corpus::from_pairs((0..1000).map(|i| (format!("{:04x}", i), i % 24)));
        let seen = Arc::new(Mutex::new(HashMap::new()));
        let inflight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        bulk_load(&corpus, 8, |k, v| {
            let seen = seen.clone();
            let inflight = inflight.clone();
            let peak = peak.clone();
            async move {
                let n = inflight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(n, Ordering::SeqCst);
                tokio::task::yield_now().await;
                seen.lock().insert(k, v);
                inflight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();
        let seen = seen.lock();
        assert_eq!(seen.len(), 1000);
        for (k, v) in corpus.iter() {
            assert_eq!(seen.get(k), Some(&v));
        }
        assert!(peak.load(Ordering::SeqCst) <= 8);
    }

    #[tokio::test]
    async fn bulk_load_surfaces_failure() {
        let corpus = Corpus::from_pairs((0..100).map(|i| (format!("{:04x}", i), 0)));
        let res = bulk_load(&corpus, 16, |k, _| async move {
            if k == "0042" {
                Err(Error::Malformed("boom".to_string()))
            } else {
                Ok(())
            }
        })
        .await;
        assert!(matches!(res, Err(Error::Malformed(m)) if m == "boom"));
    }
}
