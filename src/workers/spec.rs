//! # Worker descriptor: what to run, with what arguments and spawn options.
//!
//! [`WorkerSpec`] is the caller-supplied, immutable description of one unit
//! of work. The engine never mutates a spec; per-run state lives on the
//! [`WorkerHandle`](crate::WorkerHandle) created once the process is spawned.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Spawn configuration for a worker process.
///
/// The default stdio wiring is: stdin null, stdout piped (it carries the
/// message channel), stderr inherited from the pool's process.
#[derive(Clone, Debug, Default)]
pub struct WorkerOptions {
    /// Discard the worker's stderr instead of inheriting it.
    pub silent: bool,
    /// Extra environment variables for the worker.
    pub env: Vec<(String, String)>,
    /// Working directory for the worker.
    pub cwd: Option<PathBuf>,
}

/// Caller-supplied description of one worker.
///
/// Built fluently:
/// ```
/// use std::time::Duration;
/// use forq::WorkerSpec;
///
/// let spec = WorkerSpec::new("./scripts/crawl.sh")
///     .arg("--depth")
///     .arg("3")
///     .with_id("crawler")
///     .with_kill_timeout(Duration::from_secs(30))
///     .silent();
/// assert_eq!(spec.id.as_deref(), Some("crawler"));
/// ```
#[derive(Clone, Debug)]
pub struct WorkerSpec {
    /// Executable or script to spawn.
    pub path: PathBuf,
    /// Ordered argument list.
    pub args: Vec<String>,
    /// Spawn configuration.
    pub opts: WorkerOptions,
    /// Caller-chosen stable handle id. Falls back to a generated id when
    /// absent or already taken.
    pub id: Option<String>,
    /// Per-worker kill timeout; pool default when `None`.
    pub kill_timeout: Option<Duration>,
    /// Per-worker poll frequency; pool default when `None`.
    pub poll_frequency: Option<Duration>,
    /// Free-form description, carried for logs only.
    pub description: Option<String>,
}

impl WorkerSpec {
    /// Creates a spec for the given executable/script path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
            opts: WorkerOptions::default(),
            id: None,
            kill_timeout: None,
            poll_frequency: None,
            description: None,
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the caller-chosen handle id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Overrides the pool's kill timeout for this worker.
    pub fn with_kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = Some(timeout);
        self
    }

    /// Overrides the pool's poll frequency for this worker.
    pub fn with_poll_frequency(mut self, freq: Duration) -> Self {
        self.poll_frequency = Some(freq);
        self
    }

    /// Attaches a description for logs.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Discards the worker's stderr.
    pub fn silent(mut self) -> Self {
        self.opts.silent = true;
        self
    }

    /// Adds an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.env.push((key.into(), value.into()));
        self
    }

    /// Sets the worker's working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.opts.cwd = Some(dir.into());
        self
    }

    /// Builds the spawn command with the spec's stdio wiring.
    pub(crate) fn command(&self) -> Command {
        let mut cmd = Command::new(&self.path);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(if self.opts.silent {
                Stdio::null()
            } else {
                Stdio::inherit()
            })
            .kill_on_drop(true);
        for (key, value) in &self.opts.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &self.opts.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }
}
