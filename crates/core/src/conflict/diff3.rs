//! External `diff3` merge backend.
//!
//! Writes the three inputs into a scratch directory that lives only for the
//! duration of the call, runs `diff3 -a -E -m` with conflict labels, and maps
//! the exit status to an outcome (0 clean, 1 overlapping changes, anything
//! else trouble). Every invocation is bounded by a timeout.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use super::merger::{ConflictLabels, MergeBackend, MergeOutcome};
use crate::config::Diff3Config;
use crate::errors::MergeError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to wait for the output readers once diff3 has exited or been
/// killed.
const READER_GRACE: Duration = Duration::from_secs(1);

type OutputReader = Receiver<std::io::Result<Vec<u8>>>;

/// Three-way merge through an external `diff3` executable.
#[derive(Debug, Clone)]
pub struct Diff3Merger {
    path: PathBuf,
    timeout: Duration,
    labels: ConflictLabels,
    scratch_root: Option<PathBuf>,
}

impl Diff3Merger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: Duration::from_secs(10),
            labels: ConflictLabels::default(),
            scratch_root: None,
        }
    }

    pub fn from_config(config: &Diff3Config, labels: ConflictLabels) -> Self {
        Self::new(config.path.clone())
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_labels(labels)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_labels(mut self, labels: ConflictLabels) -> Self {
        self.labels = labels;
        self
    }

    /// Create scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir, MergeError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("editmerge-");
        match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(MergeError::Scratch)
    }

    /// Run diff3 on the three files, returning exit status and stdout.
    fn run(&self, mine: &Path, old: &Path, yours: &Path) -> Result<(ExitStatus, String), MergeError> {
        let mut cmd = Command::new(&self.path);
        cmd.arg("-a")
            .arg("-E")
            .arg("-m")
            .arg("-L")
            .arg(&self.labels.mine)
            .arg("-L")
            .arg("base")
            .arg("-L")
            .arg(&self.labels.yours)
            .arg(mine)
            .arg(old)
            .arg(yours)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(path = %self.path.display(), "running diff3");
        let mut child = cmd.spawn().map_err(MergeError::Spawn)?;

        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let status = match self.wait_with_deadline(&mut child) {
            Ok(status) => status,
            Err(e) => {
                drain_reader(stdout);
                drain_reader(stderr);
                return Err(e);
            }
        };
        let stdout = self.collect_reader(stdout)?;
        let stderr = self.collect_reader(stderr)?;

        match status.code() {
            Some(0) | Some(1) => Ok((status, String::from_utf8_lossy(&stdout).into_owned())),
            code => {
                let stderr = String::from_utf8_lossy(&stderr).into_owned();
                let exit_code = code.unwrap_or(-1);
                warn!(exit_code, %stderr, "diff3 failed");
                Err(MergeError::CommandFailed { exit_code, stderr })
            }
        }
    }

    fn wait_with_deadline(&self, child: &mut Child) -> Result<ExitStatus, MergeError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait().map_err(MergeError::Spawn)? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                warn!(timeout = ?self.timeout, "diff3 timed out, killing it");
                let _ = child.kill();
                let _ = child.wait();
                return Err(MergeError::Timeout(self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Output of a reader whose process has exited. A pipe still held open
    /// past the grace period (by a leftover descendant) counts as a timeout.
    fn collect_reader(&self, reader: Option<OutputReader>) -> Result<Vec<u8>, MergeError> {
        let Some(reader) = reader else {
            return Ok(Vec::new());
        };
        match reader.recv_timeout(READER_GRACE) {
            Ok(output) => output.map_err(MergeError::Spawn),
            Err(RecvTimeoutError::Timeout) => {
                warn!("diff3 exited but its output stayed open");
                Err(MergeError::Timeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(MergeError::Spawn(std::io::Error::other(
                "diff3 output reader panicked",
            ))),
        }
    }
}

impl MergeBackend for Diff3Merger {
    fn name(&self) -> &'static str {
        "diff3"
    }

    #[instrument(skip_all, fields(diff3 = %self.path.display()))]
    fn three_way(&self, base: &str, mine: &str, yours: &str) -> Result<MergeOutcome, MergeError> {
        if self.path.as_os_str().is_empty() {
            return Err(MergeError::Diff3NotConfigured);
        }
        if !self.path.exists() {
            return Err(MergeError::Diff3NotFound(self.path.display().to_string()));
        }

        // Removed on drop, so every early return below cleans up too.
        let scratch = self.scratch_dir()?;
        let mine_path = scratch.path().join("merge-mine");
        let old_path = scratch.path().join("merge-old");
        let yours_path = scratch.path().join("merge-yours");
        std::fs::write(&mine_path, mine).map_err(MergeError::Scratch)?;
        std::fs::write(&old_path, base).map_err(MergeError::Scratch)?;
        std::fs::write(&yours_path, yours).map_err(MergeError::Scratch)?;

        let (status, merged) = self.run(&mine_path, &old_path, &yours_path)?;
        scratch.close().map_err(MergeError::Scratch)?;

        let conflict = status.code() == Some(1);
        if merged.is_empty() && !base.is_empty() {
            return Err(MergeError::UnexpectedEmptyResult);
        }

        debug!(conflict, bytes = merged.len(), "diff3 finished");
        Ok(if conflict {
            MergeOutcome::Conflicting(merged)
        } else {
            MergeOutcome::Clean(merged)
        })
    }
}

fn read_all(mut reader: impl Read) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(buf)
}

fn spawn_reader(stream: impl Read + Send + 'static) -> OutputReader {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(read_all(stream));
    });
    rx
}

/// Wait up to the grace period for a reader after the process was killed.
///
/// A reader only outlives this when a descendant of diff3 still holds the
/// pipe. It exits on its own once that descendant does, and its result is
/// discarded.
fn drain_reader(reader: Option<OutputReader>) {
    if let Some(reader) = reader {
        if let Err(RecvTimeoutError::Timeout) = reader.recv_timeout(READER_GRACE) {
            warn!("diff3 output still held open after kill, reader left to finish");
        }
    }
}
