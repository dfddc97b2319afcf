//! Persisted request logs.
//!
//! ## File Format
//!
//! A request log is a plain text file with one request per line. Each line is a JSON array of
//! key strings, terminated by `\n`:
//!
//! ```txt
//! ["3fa0c","91b2e","3fa0c"]
//! ["0d1e4"]
//! ```
//!
//! Logs are written with append semantics and read back as a stream, so neither building nor
//! replaying a log ever holds more than one request in memory.

use crate::workload::Workload;
use crate::{Request, Result};
use log::debug;
use rand::Rng;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines};

/// Serialize a request into one log line, including the trailing newline.
pub fn to_line(request: &[String]) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(request)?;
    line.push(b'\n');
    Ok(line)
}

/// Parse one log line (without its newline) back into a request.
pub fn parse_line(line: &str) -> Result<Request> {
    Ok(serde_json::from_str(line)?)
}

/// Append every request of `workload` to the log at `path`, returning the number of lines
/// written.
///
/// A failure in the middle leaves a truncated log behind; the run is expected to abort.
pub async fn build_request_log(
    path: &Path,
    workload: &mut Workload<'_>,
    rng: &mut impl Rng,
) -> Result<usize> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    let mut writer = BufWriter::new(file);
    let mut lines = 0;
    while !workload.is_exhausted() {
        let request = workload.next(rng);
        writer.write_all(&to_line(&request)?).await?;
        lines += 1;
    }
    writer.flush().await?;
    debug!("Wrote {} requests to {}", lines, path.display());
    Ok(lines)
}

/// A single-pass reader over a request log.
///
/// The file handle is owned by the reader and released when the reader is dropped, whether the
/// log was read to the end or not.
pub struct RequestLog {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
}

impl RequestLog {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
        })
    }

    /// Read and parse the next request, or `None` at the end of the log.
    pub async fn next_request(&mut self) -> Result<Option<Request>> {
        match self.lines.next_line().await? {
            Some(line) => Ok(Some(parse_line(&line)?)),
            None => Ok(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream the log at `path`, invoking `f` on every request. Returns the number of requests.
    pub async fn for_each<F: FnMut(Request)>(path: &Path, mut f: F) -> Result<usize> {
        let mut log = Self::open(path).await?;
        let mut count = 0;
        while let Some(request) = log.next_request().await? {
            f(request);
            count += 1;
        }
        Ok(count)
    }
}

/// Totals observed while streaming a log.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LogStats {
    /// Number of requests
    pub requests: usize,
    /// Sum of all request lengths
    pub keys: usize,
}

/// Read and parse the whole log without querying anything. The time this takes is the I/O and
/// decoding baseline that every backend replay also pays.
pub async fn dry_run(path: &Path) -> Result<LogStats> {
    let mut keys = 0;
    let requests = RequestLog::for_each(path, |r| keys += r.len()).await?;
    Ok(LogStats { requests, keys })
}
