//! Supervised external processes with streamed output.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command as TokioCommand};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::JobError;

/// Number of stderr lines kept for error reports.
pub const STDERR_TAIL_LINES: usize = 20;

/// A command to launch: program, arguments and extra environment.
///
/// The child inherits the parent environment; `env` entries are added on top.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, vars: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// One line of process output, without its line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

impl OutputLine {
    pub fn text(&self) -> &str {
        match self {
            OutputLine::Stdout(line) | OutputLine::Stderr(line) => line,
        }
    }

    pub fn is_stderr(&self) -> bool {
        matches!(self, OutputLine::Stderr(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process had already exited.
    AlreadyExited,
    /// The process exited within the grace period.
    Graceful,
    /// The process had to be killed.
    Killed,
}

/// A running child process.
///
/// Both output streams are read by background tasks into one channel.
/// Dropping the handle kills the child and stops the readers.
pub struct RunningProcess {
    child: Child,
    pid: Option<u32>,
    lines: mpsc::UnboundedReceiver<OutputLine>,
    readers: Vec<JoinHandle<()>>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    exit_code: Option<i32>,
}

/// Launches `spec` with piped output in its own process group.
pub fn start(spec: &CommandSpec) -> Result<RunningProcess, JobError> {
    let mut cmd = TokioCommand::new(&spec.program);
    cmd.args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &spec.current_dir {
        cmd.current_dir(dir);
    }

    #[cfg(unix)]
    {
        // New session so the whole tree can be signalled as one group
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    let mut child = cmd.spawn().map_err(|e| JobError::Spawn {
        program: spec.program.clone(),
        reason: e.to_string(),
    })?;

    let pid = child.id();
    log::debug!("Started '{}' (pid {:?})", spec, pid);

    let (tx, rx) = mpsc::unbounded_channel();
    let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
    let mut readers = Vec::with_capacity(2);

    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(pump(stdout, tx.clone(), None)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(pump(stderr, tx, Some(Arc::clone(&stderr_tail)))));
    }

    Ok(RunningProcess {
        child,
        pid,
        lines: rx,
        readers,
        stderr_tail,
        exit_code: None,
    })
}

/// Forwards lines from one stream. `tail` is set for stderr.
async fn pump<R>(
    stream: R,
    tx: mpsc::UnboundedSender<OutputLine>,
    tail: Option<Arc<Mutex<VecDeque<String>>>>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\n', '\r'])
                    .to_string();

                let output = match &tail {
                    Some(tail) => {
                        push_tail(tail, &line);
                        OutputLine::Stderr(line)
                    }
                    None => OutputLine::Stdout(line),
                };

                if tx.send(output).is_err() {
                    break;
                }
            }
            Err(e) => {
                log::debug!("Stopped reading process output: {}", e);
                break;
            }
        }
    }
}

fn push_tail(tail: &Mutex<VecDeque<String>>, line: &str) {
    let mut tail = match tail.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if tail.len() == STDERR_TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(line.to_string());
}

impl RunningProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Next output line from either stream; `None` once both are closed.
    pub async fn next_line(&mut self) -> Option<OutputLine> {
        self.lines.recv().await
    }

    /// Exit code if the process has exited, `None` while it runs.
    /// A process ended by a signal reports -1.
    pub fn exit_code(&mut self) -> Option<i32> {
        if self.exit_code.is_none() {
            if let Ok(Some(status)) = self.child.try_wait() {
                self.exit_code = Some(status.code().unwrap_or(-1));
            }
        }
        self.exit_code
    }

    /// Waits for the process to exit and returns its code.
    pub async fn wait(&mut self) -> i32 {
        if let Some(code) = self.exit_code {
            return code;
        }
        let code = match self.child.wait().await {
            Ok(status) => status.code().unwrap_or(-1),
            Err(e) => {
                log::warn!("Failed to wait for process {:?}: {}", self.pid, e);
                -1
            }
        };
        self.exit_code = Some(code);
        code
    }

    /// The last stderr lines, joined by newlines.
    pub fn stderr_tail(&self) -> String {
        let tail = match self.stderr_tail.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tail.iter().cloned().collect::<Vec<_>>().join("\n")
    }

    /// Asks the process group to stop, then kills it if it is still alive
    /// after `grace`.
    pub async fn terminate(&mut self, grace: Duration) -> Termination {
        if self.exit_code().is_some() {
            return Termination::AlreadyExited;
        }

        self.signal_group(Signal::Term);

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.exit_code = Some(status.code().unwrap_or(-1));
                // Reap anything the leader left behind
                self.signal_group(Signal::Kill);
                Termination::Graceful
            }
            Ok(Err(e)) => {
                log::warn!("Failed to wait for process {:?}: {}", self.pid, e);
                self.kill().await;
                Termination::Killed
            }
            Err(_) => {
                log::warn!(
                    "Process {:?} did not exit within {:?}, killing",
                    self.pid,
                    grace
                );
                self.kill().await;
                Termination::Killed
            }
        }
    }

    async fn kill(&mut self) {
        self.signal_group(Signal::Kill);
        if let Err(e) = self.child.start_kill() {
            log::debug!("start_kill on {:?}: {}", self.pid, e);
        }
        self.wait().await;
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: Signal) {
        let Some(pid) = self.pid else { return };
        let Ok(pgid) = i32::try_from(pid) else { return };
        let sig = match signal {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        };
        unsafe {
            libc::kill(-pgid, sig);
        }
    }

    #[cfg(not(unix))]
    fn signal_group(&mut self, _signal: Signal) {
        let _ = self.child.start_kill();
    }
}

#[derive(Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

impl Drop for RunningProcess {
    fn drop(&mut self) {
        if self.exit_code.is_none() {
            self.signal_group(Signal::Kill);
        }
        for reader in &self.readers {
            reader.abort();
        }
    }
}
