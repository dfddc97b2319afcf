#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! A benchmark harness that compares an in-memory key-value cache against a relational database
//! on the same key-set lookup workload.
//!
//! With `lookupbench`, a run synthesizes a corpus of random hex keys, each mapped to a small
//! integer, and two request logs (warm-up and measurement) whose lines are random-size subsets of
//! the corpus keys. Every configured backend is then loaded with the corpus and replays exactly
//! the same logs, so the reported durations are directly comparable.
//!
//! A few key design choices include:
//!
//! - Request logs are persisted to disk and streamed back one line at a time. Memory use is
//! bounded no matter how large the workload is.
//! - Replay is strictly sequential: one request is fully answered before the next is read. The
//! measured number is per-request latency summed over the log, never a concurrency effect.
//! - Backends are black boxes behind the [`LookupBackend`] trait. They are created dynamically
//! by name from a TOML file, and dynamically dispatched.
//!
//! More detailed usage could be found in the module-level rustdocs:
//!
//! - [`mod@bench`] for the config format and the phase sequence of a run.
//! - [`mod@backends`] for the config format of a built-in backend.
//! - [`cmdline()`] for the usage of the default command line interface.

use async_trait::async_trait;

/// A generated identifier: a fixed-length string of lowercase hex digits.
pub type Key = String;

/// The integer associated with a [`Key`] in the corpus.
pub type Value = u32;

/// One lookup operation's input: an ordered list of keys, possibly with duplicates.
pub type Request = Vec<Key>;

/// One entry of a lookup result. Positional backends yield `None` for a missing key.
pub type Entry = Option<(Key, Value)>;

/// A store that can be bulk-loaded with a [`Corpus`] and then answer key-set lookups.
///
/// The benchmark driver owns one boxed instance per configured backend and calls its methods
/// strictly one at a time. Any error returned is fatal to the run.
#[async_trait]
pub trait LookupBackend: Send {
    /// Wipe all prior state and load every pair of the corpus. Connections are established here
    /// on the first call.
    async fn prepare(&mut self, corpus: &Corpus) -> Result<()>;

    /// Fetch the given keys in a single round trip.
    ///
    /// - Cache-style backends return exactly one entry per requested key, `None` for a miss.
    /// - Relational backends return only the rows found, so the result may be shorter than the
    ///   request.
    async fn lookup(&mut self, request: &[Key]) -> Result<Vec<Entry>>;

    /// The number of pairs currently stored, as reported by the backend itself.
    async fn count(&mut self) -> Result<u64>;

    /// Tear down open connections. The backend may be prepared again afterwards.
    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

pub mod backends;
pub mod bench;
mod cmdline;
pub mod corpus;
mod error;
pub mod keygen;
pub mod reqlog;
pub mod workload;

pub use cmdline::cmdline;
pub use corpus::Corpus;
pub use error::{Error, Result};

pub extern crate inventory;
pub extern crate toml;
