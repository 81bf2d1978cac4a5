//! Crate-wide error type.
//!
//! PUT-local outcomes (`CRASH`, `TIMEOUT`) are *not* represented here: they
//! flow through `save_if_interesting` as ordinary [`crate::executor::ExitReason`]
//! values and never become an `Err`. This type only covers failures that the
//! core cannot route around: a fatal executor error, corpus I/O that could
//! not be retried away, dictionary parse failures in strict mode, and
//! misconfiguration.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum FuzzError {
    /// The PUT itself is unusable (fork server died, exec failed, ...).
    /// Per spec §7 this tears down the executor and surfaces to the caller.
    PutError(String),
    /// Corpus file I/O failed twice in a row (one retry already attempted).
    CorpusIo { path: PathBuf, source: String },
    /// Dictionary file failed to parse in strict mode.
    DictParse { line: usize, reason: String },
    /// Invalid configuration (e.g. zero-length map, empty executor list).
    Config(String),
    /// `Testcase`/edge id referenced that does not exist in the corpus.
    UnknownId(u64),
}

impl fmt::Display for FuzzError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuzzError::PutError(msg) => write!(f, "PUT error: {msg}"),
            FuzzError::CorpusIo { path, source } => {
                write!(f, "corpus I/O error on {}: {source}", path.display())
            }
            FuzzError::DictParse { line, reason } => {
                write!(f, "dictionary parse error at line {line}: {reason}")
            }
            FuzzError::Config(msg) => write!(f, "invalid configuration: {msg}"),
            FuzzError::UnknownId(id) => write!(f, "unknown testcase id {id}"),
        }
    }
}

impl std::error::Error for FuzzError {}

pub type Result<T> = std::result::Result<T, FuzzError>;
