//! Decision port backed by an external command.
//!
//! The command receives the JSON request on stdin and answers on stdout.
//! A non-zero exit status, non-UTF-8 output or no exit before the deadline
//! is a decision source error. A command that misses the deadline is
//! killed.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::domain::error::TraderError;
use crate::ports::decision_port::DecisionPort;

pub const DEFAULT_DECISION_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct CommandAdvisor {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandAdvisor {
    /// Split a command line on whitespace into program and arguments.
    pub fn from_command_line(command: &str) -> Result<Self, TraderError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| TraderError::ConfigMissing {
            section: "external".to_string(),
            key: "command".to_string(),
        })?;
        Ok(CommandAdvisor {
            program,
            args: parts.collect(),
            timeout: DEFAULT_DECISION_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn failure(&self, reason: impl std::fmt::Display) -> TraderError {
        TraderError::DecisionSource {
            reason: format!("{}: {}", self.program, reason),
        }
    }

    /// Kill and reap the child. It may already have exited.
    fn abandon(&self, child: &mut Child) {
        let _ = child.kill();
        let _ = child.wait();
    }
}

type PipeReader = thread::JoinHandle<std::io::Result<Vec<u8>>>;

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> PipeReader {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

impl DecisionPort for CommandAdvisor {
    fn request_decision(&self, request: &serde_json::Value) -> Result<String, TraderError> {
        let payload = serde_json::to_vec(request).map_err(|e| self.failure(e))?;
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.failure(e))?;

        // A command blocked on a full pipe never exits, so feed and drain
        // the pipes while waiting.
        let writer = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || {
                stdin.write_all(&payload)
                // stdin drops here, closing the pipe
            })
        });
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    warn!(
                        program = %self.program,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "decision command timed out, killing it"
                    );
                    self.abandon(&mut child);
                    return Err(self.failure(format!("no reply within {:?}", self.timeout)));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    self.abandon(&mut child);
                    return Err(self.failure(e));
                }
            }
        };

        if let Some(writer) = writer {
            writer
                .join()
                .map_err(|_| self.failure("stdin writer panicked"))?
                .map_err(|e| self.failure(e))?;
        }

        let stdout = stdout
            .join()
            .map_err(|_| self.failure("stdout reader panicked"))?
            .map_err(|e| self.failure(e))?;
        let stderr = stderr
            .join()
            .map_err(|_| self.failure("stderr reader panicked"))?
            .unwrap_or_default();

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(self.failure(format!("exited with {}: {}", status, stderr.trim())));
        }

        let reply = String::from_utf8(stdout).map_err(|e| self.failure(e))?;
        debug!(program = %self.program, bytes = reply.len(), "decision reply received");
        Ok(reply)
    }
}
