//! Subprocess execution with a hard deadline.
//!
//! Both external collaborators (the model CLI and pytest) are child
//! processes. A hung child is killed once its deadline passes so the loop
//! never blocks indefinitely on one call.

use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("I/O error talking to child process: {0}")]
    Io(#[from] io::Error),
}

/// Captured result of a finished child process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// stdout followed by stderr, the way a terminal would show them.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }
}

/// Run `command` to completion, feeding it `stdin`, killing it after `timeout`.
pub fn run_with_timeout(
    command: &mut Command,
    stdin: Option<&str>,
    timeout: Duration,
) -> Result<ProcessOutput, ProcessError> {
    let program = command.get_program().to_string_lossy().into_owned();

    let mut child = command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;
    debug!(program = %program, pid = child.id(), "spawned child process");

    // Write stdin on its own thread so a child that fills its stdout pipe
    // before reading all input cannot deadlock us.
    let writer = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => {
            let input = input.to_string();
            Some(thread::spawn(move || -> io::Result<()> {
                match pipe.write_all(input.as_bytes()) {
                    // The child may exit without reading everything.
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                    other => other,
                }
            }))
        }
        _ => None,
    };

    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    let status = match wait_or_kill(&mut child, timeout)? {
        Some(status) => status,
        None => {
            warn!(program = %program, ?timeout, "child process timed out and was killed");
            return Err(ProcessError::TimedOut { program, timeout });
        }
    };

    if let Some(writer) = writer {
        join_io(writer)?;
    }
    let stdout = join_reader(stdout)?;
    let stderr = join_reader(stderr)?;

    debug!(program = %program, status = %status, "child process finished");
    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
    })
}

/// What the deadline wait needs from a child process.
trait Waitable {
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>>;
    fn kill(&mut self) -> io::Result<()>;
    fn wait(&mut self) -> io::Result<ExitStatus>;
}

impl Waitable for Child {
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        Child::try_wait(self)
    }

    fn kill(&mut self) -> io::Result<()> {
        Child::kill(self)
    }

    fn wait(&mut self) -> io::Result<ExitStatus> {
        Child::wait(self)
    }
}

/// Wait until `timeout`. Unless the child exited on its own, it is killed
/// and reaped before returning, including when polling it failed.
fn wait_or_kill<W: Waitable>(child: &mut W, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let waited = wait_with_deadline(child, timeout);
    if !matches!(waited, Ok(Some(_))) {
        let _ = child.kill();
        let _ = child.wait();
    }
    waited
}

fn wait_with_deadline<W: Waitable>(
    child: &mut W,
    timeout: Duration,
) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<io::Result<String>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf)?;
            Ok(String::from_utf8_lossy(&buf).into_owned())
        })
    })
}

fn join_reader(handle: Option<JoinHandle<io::Result<String>>>) -> io::Result<String> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| io::Error::other("reader thread panicked"))?,
        None => Ok(String::new()),
    }
}

fn join_io(handle: JoinHandle<io::Result<()>>) -> io::Result<()> {
    handle
        .join()
        .map_err(|_| io::Error::other("writer thread panicked"))?
}
