use super::worker::{Task, TaskQueue};
use crate::error::GutterError;
use crate::promise::Promise;
use log::{debug, warn};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the VCS binary on the shared [`TaskQueue`].
///
/// Every call yields a promise that always resolves: spawn failures,
/// timeouts and non-zero exits are logged and turn into an empty payload.
#[derive(Debug, Clone)]
pub struct VcsRunner {
    git: PathBuf,
    queue: Arc<TaskQueue>,
    timeout: Duration,
}

impl VcsRunner {
    pub fn new(git: impl Into<PathBuf>, queue: Arc<TaskQueue>) -> Self {
        Self {
            git: git.into(),
            queue,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn git_binary(&self) -> &Path {
        &self.git
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    /// Whether the configured binary can be found (absolute path or `PATH` lookup).
    pub fn is_available(&self) -> bool {
        which::which(&self.git).is_ok()
    }

    /// Run with `cwd` as working directory and resolve with raw stdout.
    pub fn run_raw<I, S>(&self, cwd: &Path, args: I) -> Promise<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.submit(cwd, args, &[0])
    }

    /// Like [`run_raw`](Self::run_raw) for `diff --no-index`, which exits
    /// with 1 whenever the inputs differ.
    pub fn run_diff<I, S>(&self, cwd: &Path, args: I) -> Promise<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.submit(cwd, args, &[0, 1])
    }

    fn submit<I, S>(&self, cwd: &Path, args: I, accepted: &'static [i32]) -> Promise<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args
            .into_iter()
            .map(|arg| arg.as_ref().to_os_string())
            .collect();
        let command = describe(&args);
        let git = self.git.clone();
        let cwd = cwd.to_path_buf();
        let timeout = self.timeout;
        let (promise, resolver) = Promise::pending();

        self.queue.submit(Task::new(format!("git {command}"), async move {
            let stdout = match execute(&git, &cwd, &args, timeout, accepted).await {
                Ok(stdout) => stdout,
                // Expected for unknown revisions and paths missing from a commit.
                Err(e @ GutterError::VcsNonZero { .. }) => {
                    debug!("{e}");
                    Vec::new()
                }
                Err(e) => {
                    warn!("{e}");
                    Vec::new()
                }
            };
            resolver.resolve(stdout)?;
            Ok(())
        }));

        promise
    }

    /// Run and resolve with stdout decoded as UTF-8 and trimmed.
    pub fn run<I, S>(&self, cwd: &Path, args: I) -> Promise<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.run_raw(cwd, args)
            .then(|stdout| String::from_utf8_lossy(&stdout).trim().to_string())
    }
}

fn describe(args: &[OsString]) -> String {
    args.iter()
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

async fn execute(
    git: &Path,
    cwd: &Path,
    args: &[OsString],
    timeout: Duration,
    accepted: &[i32],
) -> Result<Vec<u8>, GutterError> {
    let command = describe(args);
    debug!("Running git {command} in {cwd:?}");

    let mut cmd = tokio::process::Command::new(git);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(GutterError::VcsSpawnFailed {
                program: git.display().to_string(),
                source,
            });
        }
        // Dropping the output future kills the child.
        Err(_) => return Err(GutterError::VcsTimeout { command, timeout }),
    };

    let code = output.status.code();
    if !code.is_some_and(|code| accepted.contains(&code)) {
        return Err(GutterError::VcsNonZero {
            command,
            code,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output.stdout)
}
