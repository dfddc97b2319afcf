use crate::{Corpus, Request};
use rand::Rng;

/// A finite stream of synthetic requests drawn from a [`Corpus`].
///
/// Each request has a size chosen uniformly in `[1, max_query_keys]`, and each of its keys is
/// sampled uniformly with replacement from the corpus key list, so a request may repeat a key.
/// The workload is exhausted after `requests` requests.
#[derive(Debug)]
pub struct Workload<'a> {
    corpus: &'a Corpus,
    /// Largest number of keys in a single request
    max_query_keys: usize,
    /// Total number of requests before exhaustion
    requests: usize,
    /// How many requests have been generated so far
    count: usize,
}

impl<'a> Workload<'a> {
    pub fn new(corpus: &'a Corpus, requests: usize, max_query_keys: usize) -> Self {
        assert!(!corpus.is_empty(), "corpus should not be empty");
        assert!(max_query_keys > 0, "max_query_keys should be positive");
        Self {
            corpus,
            max_query_keys,
            requests,
            count: 0,
        }
    }

    pub fn next(&mut self, rng: &mut impl Rng) -> Request {
        self.count += 1;
        let len = rng.random_range(1..=self.max_query_keys);
        (0..len)
            .map(|_| self.corpus.sample_key(rng).clone())
            .collect()
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn is_exhausted(&self) -> bool {
        self.count >= self.requests
    }
}
