//! The cache backend, on top of [`redis`]'s multiplexed async connection.
//!
//! ## Configuration Format
//!
//! ``` toml
//! [[backend]]
//! name = "redis"
//! url = "..."        # optional, default "redis://redis:6379"
//! concurrency = 1024 # optional, in-flight SETs during the bulk load
//! ```
//!
//! `prepare` issues `FLUSHALL` followed by one `SET` per corpus pair, concurrently. `lookup` is a
//! single `MGET` whose reply has one entry per requested key.
//!
//! Neither connecting nor any command has a timeout: a slow server stalls the benchmark.

use crate::backends::{bulk_load, parse_opt, Registry, DEFAULT_CONCURRENCY};
use crate::*;
use ::redis::aio::MultiplexedConnection;
use ::redis::AsyncConnectionConfig;
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

pub const DEFAULT_URL: &str = "redis://redis:6379";

#[derive(Deserialize, Default)]
pub struct RedisBackendOpt {
    pub url: Option<String>,
    pub concurrency: Option<usize>,
}

pub struct RedisBackend {
    url: String,
    concurrency: usize,
    con: Option<MultiplexedConnection>,
}

impl RedisBackend {
    pub fn new(opt: &RedisBackendOpt) -> Self {
        Self {
            url: opt.url.clone().unwrap_or_else(|| DEFAULT_URL.to_string()),
            concurrency: opt.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
            con: None,
        }
    }

    pub fn new_backend(opt: &toml::Table) -> Result<Box<dyn LookupBackend>> {
        let opt: RedisBackendOpt = parse_opt("redis", opt)?;
        if opt.concurrency == Some(0) {
            return Err(Error::Config("concurrency should be positive".to_string()));
        }
        Ok(Box::new(Self::new(&opt)))
    }

    fn con(&mut self) -> Result<&mut MultiplexedConnection> {
        self.con.as_mut().ok_or(Error::NotPrepared("redis"))
    }
}

#[async_trait]
impl LookupBackend for RedisBackend {
    async fn prepare(&mut self, corpus: &Corpus) -> Result<()> {
        if self.con.is_none() {
            let client = ::redis::Client::open(self.url.as_str())?;
            // a slow reply stalls the run instead of failing it
            let config = AsyncConnectionConfig::new()
                .set_connection_timeout(None)
                .set_response_timeout(None);
            self.con = Some(
                client
                    .get_multiplexed_async_connection_with_config(&config)
                    .await?,
            );
            debug!("Connected to redis at {}", self.url);
        }
        let con = self.con()?;
        ::redis::cmd("FLUSHALL").query_async::<()>(con).await?;

        let con = con.clone();
        bulk_load(corpus, self.concurrency, move |key, value| {
            let mut con = con.clone();
            async move {
                ::redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .query_async::<()>(&mut con)
                    .await?;
                Ok(())
            }
        })
        .await
    }

    async fn lookup(&mut self, request: &[Key]) -> Result<Vec<Entry>> {
        // MGET needs at least one key
        if request.is_empty() {
            return Ok(Vec::new());
        }
        let values: Vec<Option<Value>> = ::redis::cmd("MGET")
            .arg(request)
            .query_async(self.con()?)
            .await?;
        if values.len() != request.len() {
            return Err(Error::Malformed(format!(
                "MGET of {} keys returned {} values",
                request.len(),
                values.len()
            )));
        }
        Ok(request
            .iter()
            .zip(values)
            .map(|(k, v)| v.map(|v| (k.clone(), v)))
            .collect())
    }

    async fn count(&mut self) -> Result<u64> {
        Ok(::redis::cmd("DBSIZE").query_async(self.con()?).await?)
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.con.take().is_some() {
            debug!("Disconnected from redis at {}", self.url);
        }
        Ok(())
    }
}

inventory::submit! {
    Registry::new("redis", RedisBackend::new_backend)
}
