//! The core benchmark functionality.
//!
//! A run always executes the same fixed sequence of **phases**, and every backend goes through
//! exactly the same workload:
//!
//! 1. The working directory is removed and recreated.
//! 2. The corpus is generated and written to `keys.json` (`prepare_keys`).
//! 3. The warm-up and measurement request logs are generated (`prep_access_logs`).
//! 4. Both logs are dry-run: parsed without querying anything (`dry_run_reqwarmup`,
//!    `dry_run_reqmeasure`).
//! 5. For each backend, in the order they are configured:
//!    - the corpus is loaded (`<backend>_prepare`),
//!    - the warm-up log is replayed (`<backend>_run_reqwarmup`),
//!    - the measurement log is dry-run again to re-baseline (`<backend>_dry_run_reqmeasure`),
//!    - the measurement log is replayed (`<backend>_run_reqmeasure`). This is the result.
//!
//! Requests are replayed strictly one after the other. A phase that fails aborts the whole run
//! before its timing is reported.
//!
//! ## Configuration Format
//!
//! A benchmark configuration file is formatted in TOML. It has a `[benchmark]` section for the
//! workload shape and an array of `[[backend]]` sections (see [`crate::backends`]):
//!
//! ```toml
//! [benchmark]
//! total_keys = 500000
//! key_len = 40
//! max_value = 24
//! max_query_keys = 5000
//! requests = 10000
//! workdir = "./tmpdata"
//! # seed = 42
//!
//! [[backend]]
//! name = "redis"
//!
//! [[backend]]
//! name = "postgres"
//! ```
//!
//! Every option in `[benchmark]` is optional; see [`BenchmarkOpt`] for their defaults. Options
//! can be overridden via environment variables without changing the content in the TOML file.
//! For example, setting `LOOKUPBENCH_BENCHMARK__REQUESTS=100` overrides `requests`.
//!
//! ## Output Format
//!
//! Each phase prints one line when it finishes:
//!
//! ```txt
//! phase prepare_keys duration 1.234 keys 500000 attempts 500000
//! phase prep_access_logs duration 20.521 requests 20000
//! phase dry_run_reqwarmup duration 3.101 requests 10000 keys 25003112
//! phase redis_prepare duration 4.870 count 500000
//! phase redis_run_reqmeasure duration 31.337 requests 10000 keys 24993050 results 24993050
//! ```
//!
//! The general format is:
//!
//! ```txt
//! phase <name> duration <d> [<field> <value> ...]
//! ```
//!
//! Where `<d>` is the wall-clock duration of the phase in seconds, followed by phase-specific
//! totals:
//!
//! - `keys`/`attempts`: distinct keys in the corpus, and generation attempts.
//! - `requests`: requests written or read.
//! - `keys` (log phases): sum of all request lengths.
//! - `results`: sum of all lookup result lengths.
//! - `count`: pairs stored in the backend after loading, as reported by the backend.

use crate::backends::{BackendOpt, NamedBackend};
use crate::reqlog::{build_request_log, dry_run, RequestLog};
use crate::workload::Workload;
use crate::*;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use log::{debug, info, warn};
use quanta::Instant;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

// {{{ benchmark

/// Number of key generation attempts.
pub const TOTAL_KEYS_COUNT: usize = 500_000;
/// Number of hex digits in a key.
pub const KEY_LENGTH: usize = 40;
/// Exclusive upper bound of values.
pub const MAX_VALUE: Value = 24;
/// Largest number of keys in one request.
pub const MAX_QUERY_KEYS_COUNT: usize = 5_000;
/// Number of requests in each request log.
pub const REQUESTS_COUNT: usize = 10_000;
/// Working directory, fully reset at the start of a run.
pub const WORKDIR: &str = "./tmpdata";

/// Name of the warm-up request log.
pub const WARMUP: &str = "reqwarmup";
/// Name of the measurement request log.
pub const MEASURE: &str = "reqmeasure";

/// The built-in configuration: production sizes, redis then postgres.
pub const DEFAULT_PRESET: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/presets/default.toml"));

/// The shape of the workload deserialized from the `[benchmark]` section.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct BenchmarkOpt {
    /// Number of key generation attempts. Colliding keys collapse, so the corpus may end up
    /// slightly smaller.
    ///
    /// Default: [`TOTAL_KEYS_COUNT`].
    pub total_keys: Option<usize>,

    /// Number of hex digits in each key.
    ///
    /// Default: [`KEY_LENGTH`].
    pub key_len: Option<usize>,

    /// Values are drawn uniformly in `[0, max_value)`. It must fit a postgres `INTEGER`.
    ///
    /// Default: [`MAX_VALUE`].
    pub max_value: Option<Value>,

    /// Each request has a uniformly random length in `[1, max_query_keys]`.
    ///
    /// Default: [`MAX_QUERY_KEYS_COUNT`].
    pub max_query_keys: Option<usize>,

    /// Number of requests in each of the two request logs.
    ///
    /// Default: [`REQUESTS_COUNT`].
    pub requests: Option<usize>,

    /// Directory holding `keys.json` and the request logs. It is removed and recreated at the
    /// start of every run.
    ///
    /// Default: [`WORKDIR`].
    pub workdir: Option<String>,

    /// Seed of the random number generator. Without it, every run generates a fresh workload.
    pub seed: Option<u64>,
}

/// The validated configuration of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Benchmark {
    total_keys: usize,
    key_len: usize,
    max_value: Value,
    max_query_keys: usize,
    requests: usize,
    workdir: PathBuf,
    seed: Option<u64>,
}

fn positive(name: &str, v: usize) -> Result<usize> {
    if v == 0 {
        return Err(Error::Config(format!("{} should be positive", name)));
    }
    Ok(v)
}

impl Benchmark {
    pub fn new(opt: &BenchmarkOpt) -> Result<Self> {
        let total_keys = positive("total_keys", opt.total_keys.unwrap_or(TOTAL_KEYS_COUNT))?;
        let key_len = positive("key_len", opt.key_len.unwrap_or(KEY_LENGTH))?;
        let max_value = opt.max_value.unwrap_or(MAX_VALUE);
        positive("max_value", max_value as usize)?;
        if i32::try_from(max_value).is_err() {
            return Err(Error::Config(
                "max_value should fit a 32-bit signed integer".to_string(),
            ));
        }
        let max_query_keys = positive(
            "max_query_keys",
            opt.max_query_keys.unwrap_or(MAX_QUERY_KEYS_COUNT),
        )?;
        let requests = positive("requests", opt.requests.unwrap_or(REQUESTS_COUNT))?;
        let workdir = PathBuf::from(opt.workdir.clone().unwrap_or(WORKDIR.to_string()));
        Ok(Self {
            total_keys,
            key_len,
            max_value,
            max_query_keys,
            requests,
            workdir,
            seed: opt.seed,
        })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn keys_path(&self) -> PathBuf {
        self.workdir.join("keys.json")
    }

    pub fn log_path(&self, phase: &str) -> PathBuf {
        self.workdir.join(format!("{}.txt", phase))
    }
}

// }}} benchmark

// {{{ benchmarkgroup

/// The whole configuration file: the workload and the backends to run it against.
#[derive(Deserialize, Clone, Debug)]
struct BenchmarkGroupOpt {
    /// Workload parameters (optional)
    benchmark: Option<BenchmarkOpt>,

    /// Backends, benchmarked in this order
    #[serde(default)]
    backend: Vec<BackendOpt>,
}

/// Parse a configuration text and create the run and its backends. Backends are only created
/// here; they connect when they are prepared.
pub fn init(text: &str) -> Result<(Benchmark, Vec<NamedBackend>)> {
    let opt: BenchmarkGroupOpt = Figment::new()
        .merge(Toml::string(text))
        .merge(Env::prefixed("LOOKUPBENCH_").split("__"))
        .extract()?;
    debug!(
        "Creating benchmark with the following configurations: {:?}",
        opt
    );
    let benchmark = Benchmark::new(&opt.benchmark.unwrap_or_default())?;
    if opt.backend.is_empty() {
        return Err(Error::Config("at least one backend should be given".to_string()));
    }
    let backends = opt
        .backend
        .iter()
        .map(NamedBackend::new)
        .collect::<Result<Vec<_>>>()?;
    Ok((benchmark, backends))
}

// }}} benchmarkgroup

// {{{ bencher

/// The timing of one finished phase.
#[derive(Debug, Clone)]
pub struct Phase {
    pub name: String,
    pub duration: Duration,
    /// Phase-specific totals, in output order
    pub detail: Vec<(&'static str, u64)>,
}

impl Phase {
    pub fn detail(&self, field: &str) -> Option<u64> {
        self.detail
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| *v)
    }
}

/// All phases of a run, in the order they finished.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub phases: Vec<Phase>,
}

impl Report {
    fn record(&mut self, name: String, duration: Duration, detail: Vec<(&'static str, u64)>) {
        print!("phase {} duration {:.3}", name, duration.as_secs_f64());
        for (field, value) in detail.iter() {
            print!(" {} {}", field, value);
        }
        println!();
        self.phases.push(Phase {
            name,
            duration,
            detail,
        });
    }

    pub fn get(&self, name: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.name == name)
    }
}

/// Totals of a replay through a backend.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    /// Number of requests sent
    pub requests: usize,
    /// Sum of all request lengths
    pub keys: usize,
    /// Sum of all result lengths
    pub results: usize,
}

/// Remove `path` with everything in it, if it exists, and create it again empty.
pub async fn reset_workdir(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

/// Send every request of the log at `path` to `backend`, one at a time.
pub async fn replay(path: &Path, backend: &mut dyn LookupBackend) -> Result<ReplayStats> {
    let mut log = RequestLog::open(path).await?;
    let mut stats = ReplayStats::default();
    while let Some(request) = log.next_request().await? {
        let entries = backend.lookup(&request).await?;
        stats.requests += 1;
        stats.keys += request.len();
        stats.results += entries.len();
    }
    debug!(
        "Replayed {} requests from {}",
        stats.requests,
        log.path().display()
    );
    Ok(stats)
}

async fn bench_dry_run(report: &mut Report, name: String, path: &Path) -> Result<()> {
    let start = Instant::now();
    let stats = dry_run(path).await?;
    let duration = start.elapsed();
    report.record(
        name,
        duration,
        vec![
            ("requests", stats.requests as u64),
            ("keys", stats.keys as u64),
        ],
    );
    Ok(())
}

async fn bench_replay(
    report: &mut Report,
    name: String,
    path: &Path,
    backend: &mut dyn LookupBackend,
) -> Result<()> {
    let start = Instant::now();
    let stats = replay(path, backend).await?;
    let duration = start.elapsed();
    report.record(
        name,
        duration,
        vec![
            ("requests", stats.requests as u64),
            ("keys", stats.keys as u64),
            ("results", stats.results as u64),
        ],
    );
    Ok(())
}

/// Execute the whole phase sequence. Backends are left connected; see [`shutdown`].
pub async fn run(benchmark: &Benchmark, backends: &mut [NamedBackend]) -> Result<Report> {
    let mut report = Report::default();
    let mut rng = match benchmark.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    info!("Resetting {}", benchmark.workdir.display());
    reset_workdir(&benchmark.workdir).await?;

    info!("Generating {} keys", benchmark.total_keys);
    let start = Instant::now();
    let corpus = Corpus::generate(
        &mut rng,
        benchmark.total_keys,
        benchmark.key_len,
        benchmark.max_value,
    );
    corpus.write_json(&benchmark.keys_path()).await?;
    let duration = start.elapsed();
    report.record(
        "prepare_keys".to_string(),
        duration,
        vec![
            ("keys", corpus.len() as u64),
            ("attempts", corpus.attempts() as u64),
        ],
    );

    info!("Generating request logs");
    let start = Instant::now();
    let mut requests = 0;
    let mut workload = Workload::new(&corpus, benchmark.requests, benchmark.max_query_keys);
    for phase in [WARMUP, MEASURE] {
        workload.reset();
        requests += build_request_log(&benchmark.log_path(phase), &mut workload, &mut rng).await?;
    }
    let duration = start.elapsed();
    report.record(
        "prep_access_logs".to_string(),
        duration,
        vec![("requests", requests as u64)],
    );

    for phase in [WARMUP, MEASURE] {
        bench_dry_run(
            &mut report,
            format!("dry_run_{}", phase),
            &benchmark.log_path(phase),
        )
        .await?;
    }

    for NamedBackend { name, backend } in backends.iter_mut() {
        info!("Benchmarking backend {}", name);
        let start = Instant::now();
        backend.prepare(&corpus).await?;
        let duration = start.elapsed();
        let count = backend.count().await?;
        if count != corpus.len() as u64 {
            warn!(
                "Backend {} holds {} keys after loading {}",
                name,
                count,
                corpus.len()
            );
        }
        report.record(
            format!("{}_prepare", name),
            duration,
            vec![("count", count)],
        );

        bench_replay(
            &mut report,
            format!("{}_run_{}", name, WARMUP),
            &benchmark.log_path(WARMUP),
            backend.as_mut(),
        )
        .await?;
        bench_dry_run(
            &mut report,
            format!("{}_dry_run_{}", name, MEASURE),
            &benchmark.log_path(MEASURE),
        )
        .await?;
        bench_replay(
            &mut report,
            format!("{}_run_{}", name, MEASURE),
            &benchmark.log_path(MEASURE),
            backend.as_mut(),
        )
        .await?;
    }

    Ok(report)
}

/// Tear down every backend's connections. All backends are shut down even if one fails; the
/// first failure is returned.
pub async fn shutdown(backends: &mut [NamedBackend]) -> Result<()> {
    let mut res = Ok(());
    for NamedBackend { name, backend } in backends.iter_mut() {
        if let Err(e) = backend.shutdown().await {
            warn!("Failed to shut down backend {}: {}", name, e);
            if res.is_ok() {
                res = Err(e);
            }
        }
    }
    res
}

// }}} bencher

// {{{ tests


// }}} tests
