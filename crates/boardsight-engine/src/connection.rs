//! Line-oriented engine transport and the child-process implementation.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::error::EngineError;
use crate::params::EngineParams;

/// A live engine connection. Dropping it must release the engine.
pub trait EngineConnection: Send {
    fn send_line(&mut self, line: &str) -> Result<(), EngineError>;

    /// Next output line, or `Ok(None)` when nothing arrived within `timeout`.
    fn recv_line(&mut self, timeout: Duration) -> Result<Option<String>, EngineError>;
}

/// Starts fresh engine connections; called again on every restart.
pub trait EngineLauncher: Send + Sync {
    fn launch(&self) -> Result<Box<dyn EngineConnection>, EngineError>;
}

/// Launches the configured UCI executable as a child process.
#[derive(Clone, Debug)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_params(params: &EngineParams) -> Self {
        Self::new(params.program.clone(), params.args.clone())
    }
}

impl EngineLauncher for ProcessLauncher {
    fn launch(&self) -> Result<Box<dyn EngineConnection>, EngineError> {
        Ok(Box::new(UciProcess::spawn(&self.program, &self.args)?))
    }
}

/// Engine child process. Stdout is pumped by a reader thread so reads can
/// time out; the process is asked to quit and then killed on drop.
pub struct UciProcess {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    lines: Receiver<String>,
    reader: Option<JoinHandle<()>>,
}

const QUIT_GRACE: Duration = Duration::from_millis(200);

impl UciProcess {
    pub fn spawn(program: &std::path::Path, args: &[String]) -> Result<Self, EngineError> {
        let spawn_err = |source| EngineError::Spawn {
            program: program.display().to_string(),
            source,
        };
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(spawn_err)?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(i), Some(o)) => (i, o),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::Disconnected);
            }
        };

        let (tx, lines) = crossbeam_channel::unbounded();
        let spawned = thread::Builder::new()
            .name("uci-reader".to_string())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            });
        let reader = match spawned {
            Ok(h) => h,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.into());
            }
        };

        log::info!("engine `{}` started (pid {})", program.display(), child.id());
        Ok(Self {
            child,
            stdin: BufWriter::new(stdin),
            lines,
            reader: Some(reader),
        })
    }
}

impl EngineConnection for UciProcess {
    fn send_line(&mut self, line: &str) -> Result<(), EngineError> {
        log::trace!("> {line}");
        writeln!(self.stdin, "{line}")?;
        self.stdin.flush()?;
        Ok(())
    }

    fn recv_line(&mut self, timeout: Duration) -> Result<Option<String>, EngineError> {
        match self.lines.recv_timeout(timeout) {
            Ok(line) => {
                log::trace!("< {line}");
                Ok(Some(line))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::Disconnected),
        }
    }
}

impl Drop for UciProcess {
    fn drop(&mut self) {
        let _ = self.send_line("quit");
        let deadline = Instant::now() + QUIT_GRACE;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
                _ => {
                    let _ = self.child.kill();
                    let _ = self.child.wait();
                    break;
                }
            }
        }
        if let Some(h) = self.reader.take() {
            let _ = h.join();
        }
        log::debug!("engine process {} released", self.child.id());
    }
}
