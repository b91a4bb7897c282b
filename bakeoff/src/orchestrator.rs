//! Runs the collector as a child process and waits for it under a wall-clock budget.
//!
//! Each run gets its own directory `<workdir>/runs/<timestamp>_<id>` holding
//! the serialized config and the artifact, so concurrent runs never share files.
//! Both output streams are drained continuously into buffers owned by the
//! orchestrator, which keeps a chatty child from blocking on a full pipe and
//! keeps whatever it printed available after a kill.
use crate::artifact::ArtifactStore;
use crate::error::{Error, ProcessFailure};
use bakeoff_core::{RunConfig, OUTPUT_TAIL_CHARS, RUN_CONFIG_FILE_NAME};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Time given to the output readers to reach end of stream once the child is gone.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Bytes kept per output stream: the last [`OUTPUT_TAIL_CHARS`] characters of
/// any UTF-8 text, plus room for one character split at the cut.
const DRAIN_LIMIT_BYTES: usize = OUTPUT_TAIL_CHARS * 4 + 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessStatus {
    Completed,
    Failed { exit_code: Option<i32> },
    TimedOut,
}

/// Outcome of one collector process.
#[derive(Debug)]
pub struct Execution {
    /// Full invocation, program first.
    pub args: Vec<String>,
    pub run_dir: PathBuf,
    pub artifact: ArtifactStore,
    pub status: ProcessStatus,
    pub stdout_tail: String,
    pub stderr_tail: String,
    pub elapsed: Duration,
}

impl Execution {
    pub fn failure(&self) -> Option<ProcessFailure> {
        let (timed_out, exit_code) = match self.status {
            ProcessStatus::Completed => return None,
            ProcessStatus::Failed { exit_code } => (false, exit_code),
            ProcessStatus::TimedOut => (true, None),
        };
        Some(ProcessFailure {
            timed_out,
            exit_code,
            stdout_tail: self.stdout_tail.clone(),
            stderr_tail: self.stderr_tail.clone(),
        })
    }
}

#[derive(Clone, Debug)]
pub struct Orchestrator {
    program: PathBuf,
    prefix_args: Vec<OsString>,
    workdir: PathBuf,
    timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(program: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            prefix_args: vec![],
            workdir: workdir.into(),
            timeout: None,
        }
    }

    /// Re-invokes the running binary as the collector.
    pub fn current_exe(workdir: impl Into<PathBuf>) -> Result<Self, Error> {
        Ok(Self::new(std::env::current_exe()?, workdir))
    }

    /// Arguments placed before `collect ...`.
    pub fn prefix_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.prefix_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Overrides the per-kind wall-clock budget.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    #[tracing::instrument(skip_all, fields(kind = %config.kind()))]
    pub async fn execute(&self, config: &RunConfig) -> Result<Execution, Error> {
        let run_dir = self.create_run_dir().await?;
        let config_path = run_dir.join(RUN_CONFIG_FILE_NAME);
        tokio::fs::write(&config_path, serde_json::to_vec_pretty(config)?).await?;

        let artifact = ArtifactStore::in_dir(&run_dir);
        artifact.clear().await?;

        let mut args: Vec<OsString> = self.prefix_args.clone();
        args.extend([
            "collect".into(),
            "--config".into(),
            config_path.clone().into_os_string(),
            "--artifact".into(),
            artifact.path().to_path_buf().into_os_string(),
        ]);

        let limit = self.timeout.unwrap_or_else(|| config.process_timeout());
        info!(
            "Starting collector in {} (timeout {})",
            run_dir.display(),
            humantime::format_duration(limit)
        );

        let start = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&args)
            .current_dir(&run_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        debug!(pid = child.id(), "Collector spawned");

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match tokio::time::timeout(limit, child.wait()).await {
            Ok(Ok(status)) if status.success() => ProcessStatus::Completed,
            Ok(Ok(status)) => ProcessStatus::Failed {
                exit_code: status.code(),
            },
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => {
                warn!("Collector exceeded {}, killing it", humantime::format_duration(limit));
                if let Err(err) = child.kill().await {
                    error!("Failed to kill collector: {err}");
                }
                ProcessStatus::TimedOut
            }
        };
        let elapsed = start.elapsed();
        debug!("Collector finished with {status:?} after {elapsed:?}");

        let stdout_tail = stdout.finish().await;
        let stderr_tail = stderr.finish().await;

        let mut invocation = vec![self.program.to_string_lossy().into_owned()];
        invocation.extend(args.iter().map(|a| a.to_string_lossy().into_owned()));

        Ok(Execution {
            args: invocation,
            run_dir,
            artifact,
            status,
            stdout_tail,
            stderr_tail,
            elapsed,
        })
    }

    async fn create_run_dir(&self) -> Result<PathBuf, Error> {
        let stamp = time::OffsetDateTime::now_utc()
            .format(RUN_DIR_STAMP)
            .map_err(|err| Error::Io(std::io::Error::other(err)))?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let dir = self
            .workdir
            .join("runs")
            .join(format!("{stamp}_{}", &id[..8]));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}

const RUN_DIR_STAMP: &[time::format_description::FormatItem<'static>] =
    time::macros::format_description!("[year][month][day]T[hour][minute][second]Z");

/// One output stream being read into a shared buffer.
struct Drain {
    buffer: Arc<Mutex<Vec<u8>>>,
    handle: Option<JoinHandle<()>>,
}

fn drain<R>(stream: Option<R>) -> Drain
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let handle = stream.map(|mut stream| {
        let buffer = buffer.clone();
        tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match stream.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => {
                        let mut buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
                        append_bounded(&mut buffer, &chunk[..n], DRAIN_LIMIT_BYTES);
                    }
                    Err(err) => {
                        trace!("Collector output closed: {err}");
                        break;
                    }
                }
            }
        })
    });

    Drain { buffer, handle }
}

impl Drain {
    /// Waits briefly for end of stream, then returns the tail of what was read.
    async fn finish(self) -> String {
        if let Some(handle) = self.handle {
            if tokio::time::timeout(DRAIN_TIMEOUT, handle).await.is_err() {
                debug!("Collector output still open, using what was read so far");
            }
        }
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        tail(&String::from_utf8_lossy(&buffer), OUTPUT_TAIL_CHARS)
    }
}

/// Appends `chunk`, dropping the oldest bytes beyond `limit`.
fn append_bounded(buffer: &mut Vec<u8>, chunk: &[u8], limit: usize) {
    buffer.extend_from_slice(chunk);
    if buffer.len() > limit {
        let excess = buffer.len() - limit;
        buffer.drain(..excess);
    }
}

/// Last `max` characters of `text`.
pub(crate) fn tail(text: &str, max: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max)).collect()
}
