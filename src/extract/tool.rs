//! External extraction tool
//!
//! Archives are never decoded in-process. [`SevenZip`] runs a 7-Zip
//! compatible binary once per archive and maps its exit status to an
//! [`ExtractionOutcome`]. Live subprocesses are tracked in a
//! [`ChildRegistry`] so a cancelled run can kill them.

use crate::error::ExtractorError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Poll interval while reaping a child whose stderr already closed
const REAP_INTERVAL: Duration = Duration::from_millis(10);

/// Something that can extract one archive into a directory
///
/// Implementations must be callable from many worker threads at once.
pub trait Extractor: Send + Sync {
    /// Extract `archive` into `dest`, blocking until done
    fn extract(&self, archive: &Path, dest: &Path) -> ExtractionOutcome;

    /// Terminate in-flight extractions and refuse new ones
    fn cancel_all(&self) {}
}

/// Classification of a nonzero 7-Zip exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    /// 1: non-fatal warning, e.g. some files were locked
    Warning,
    /// 2
    Fatal,
    /// 7
    CommandLine,
    /// 8
    OutOfMemory,
    /// 255
    UserCancelled,
    /// No exit code: killed by a signal
    Terminated,
    /// Anything else
    Unclassified,
}

impl ExitClass {
    /// Classify an exit code (`None` when the process was killed)
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(1) => ExitClass::Warning,
            Some(2) => ExitClass::Fatal,
            Some(7) => ExitClass::CommandLine,
            Some(8) => ExitClass::OutOfMemory,
            Some(255) => ExitClass::UserCancelled,
            Some(_) => ExitClass::Unclassified,
            None => ExitClass::Terminated,
        }
    }

    /// Human-readable reason
    pub fn describe(&self) -> &'static str {
        match self {
            ExitClass::Warning => "Warning (non-fatal errors)",
            ExitClass::Fatal => "Fatal error occurred",
            ExitClass::CommandLine => "Command line error",
            ExitClass::OutOfMemory => "Not enough memory for operation",
            ExitClass::UserCancelled => "User stopped the process",
            ExitClass::Terminated => "Terminated by signal",
            ExitClass::Unclassified => "Unknown error",
        }
    }
}

/// Result of one extraction attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    /// Tool exited with status 0
    Success,

    /// Tool ran and reported failure
    ToolFailure {
        code: Option<i32>,
        class: ExitClass,
        /// Last non-empty line the tool wrote to stderr
        detail: Option<String>,
    },

    /// Tool could not be started
    LaunchFailure { error: String },
}

impl ExtractionOutcome {
    /// Build the outcome for a finished process
    pub fn from_status(status: ExitStatus, stderr: &str) -> Self {
        if status.success() {
            return ExtractionOutcome::Success;
        }
        let code = status.code();
        ExtractionOutcome::ToolFailure {
            code,
            class: ExitClass::from_code(code),
            detail: last_line(stderr),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Success)
    }

    /// One-line reason for logs and the summary; `None` on success
    pub fn reason(&self) -> Option<String> {
        match self {
            ExtractionOutcome::Success => None,
            ExtractionOutcome::ToolFailure { code, class, .. } => Some(match code {
                Some(code) => format!("{} (exit code {})", class.describe(), code),
                None => class.describe().to_string(),
            }),
            ExtractionOutcome::LaunchFailure { error } => {
                Some(format!("Failed to launch extraction tool: {}", error))
            }
        }
    }
}

fn last_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map(str::to_string)
}

/// Subprocesses currently running, keyed by a registry-local id
#[derive(Debug, Default)]
pub struct ChildRegistry {
    next_id: AtomicU64,
    live: Mutex<LiveChildren>,
}

#[derive(Debug, Default)]
struct LiveChildren {
    closed: bool,
    children: HashMap<u64, Arc<Mutex<Child>>>,
}

impl ChildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly spawned child. After [`kill_all`](Self::kill_all) the
    /// child is killed immediately instead.
    pub fn register(&self, mut child: Child) -> (u64, Arc<Mutex<Child>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut live = self.live.lock();
        if live.closed {
            let _ = child.kill();
        }
        let child = Arc::new(Mutex::new(child));
        live.children.insert(id, Arc::clone(&child));
        (id, child)
    }

    /// Stop tracking a reaped child
    pub fn release(&self, id: u64) {
        self.live.lock().children.remove(&id);
    }

    /// Kill every live child and close the registry; returns how many were
    /// signalled
    pub fn kill_all(&self) -> usize {
        let mut live = self.live.lock();
        live.closed = true;

        let mut killed = 0;
        for child in live.children.values() {
            match child.lock().kill() {
                Ok(()) => killed += 1,
                Err(e) => debug!(error = %e, "Child already exited"),
            }
        }
        killed
    }

    /// Children currently tracked
    pub fn len(&self) -> usize {
        self.live.lock().children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 7-Zip command line extractor (`7z`, `7za`, `7zz` or compatible)
#[derive(Debug)]
pub struct SevenZip {
    program: PathBuf,
    children: ChildRegistry,
}

impl SevenZip {
    /// Resolve `tool` on PATH
    pub fn locate(tool: &str) -> Result<Self, ExtractorError> {
        let program = which::which(tool).map_err(|e| ExtractorError::ToolNotFound {
            tool: tool.to_string(),
            reason: e.to_string(),
        })?;
        debug!(program = %program.display(), "Extraction tool resolved");
        Ok(Self::with_program(program))
    }

    /// Use `program` as-is, without a PATH lookup
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            children: ChildRegistry::new(),
        }
    }

    /// Resolved tool path
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Live subprocesses
    pub fn children(&self) -> &ChildRegistry {
        &self.children
    }

    /// `7z x <archive> -o<dest> -y -aoa -bso0 -bsp0`
    ///
    /// Full paths, overwrite everything, answer yes to prompts, no per-file
    /// or progress output on stdout. Stderr stays attached for capture.
    pub fn command(&self, archive: &Path, dest: &Path) -> Command {
        let mut output_dir = OsString::from("-o");
        output_dir.push(dest);

        let mut cmd = Command::new(&self.program);
        cmd.arg("x")
            .arg(archive)
            .arg(output_dir)
            .args(["-y", "-aoa", "-bso0", "-bsp0"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }

    fn run(&self, archive: &Path, dest: &Path) -> std::io::Result<(ExitStatus, String)> {
        let mut child = self.command(archive, dest).spawn()?;
        let stderr = child.stderr.take();
        let (id, child) = self.children.register(child);

        // Reading to EOF lets the child finish without holding its lock,
        // so kill_all is never blocked behind a waiting worker.
        let mut captured = Vec::new();
        if let Some(mut pipe) = stderr {
            if let Err(e) = pipe.read_to_end(&mut captured) {
                warn!(archive = %archive.display(), error = %e, "Failed to read tool stderr");
            }
        }

        let status = loop {
            let polled = child.lock().try_wait();
            match polled {
                Ok(Some(status)) => break Ok(status),
                Ok(None) => thread::sleep(REAP_INTERVAL),
                Err(e) => break Err(e),
            }
        };
        self.children.release(id);

        Ok((status?, String::from_utf8_lossy(&captured).into_owned()))
    }
}

impl Extractor for SevenZip {
    fn extract(&self, archive: &Path, dest: &Path) -> ExtractionOutcome {
        match self.run(archive, dest) {
            Ok((status, stderr)) => ExtractionOutcome::from_status(status, &stderr),
            Err(e) => ExtractionOutcome::LaunchFailure {
                error: ExtractorError::Spawn {
                    archive: archive.to_path_buf(),
                    reason: e.to_string(),
                }
                .to_string(),
            },
        }
    }

    fn cancel_all(&self) {
        let killed = self.children.kill_all();
        if killed > 0 {
            warn!(killed, "Killed running extraction processes");
        }
    }
}
