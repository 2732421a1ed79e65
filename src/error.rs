use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure kinds surfaced by the engine.
///
/// Most of these never reach the host: VCS failures are logged and turned into
/// empty payloads at the promise boundary. They exist so the log lines and the
/// few fallible entry points speak the same vocabulary.
#[derive(Debug, Error)]
pub enum GutterError {
    #[error("{0:?} is not inside a working tree")]
    NotInWorkingTree(PathBuf),

    #[error("failed to spawn {program}: {source}")]
    VcsSpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`git {command}` timed out after {timeout:?}")]
    VcsTimeout { command: String, timeout: Duration },

    #[error("`git {command}` exited with {code:?}: {stderr}")]
    VcsNonZero {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("unsupported encoding: {0}")]
    EncodingUnsupported(String),

    #[error("malformed hunk header: {0}")]
    MalformedHunkHeader(String),

    #[error("failed to resolve compare target {target}")]
    TargetResolveFailed { target: String },

    #[error("failed to write snapshot {path:?}: {source}")]
    SnapshotWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("promise resolved twice")]
    PromiseAlreadyResolved,

    #[error("promise dropped before it was resolved")]
    PromiseAbandoned,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = GutterError> = std::result::Result<T, E>;
