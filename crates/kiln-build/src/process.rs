//! External tool invocation
//!
//! Every subprocess kiln starts (the native build tool, the stub compiler and
//! archiver, installed-binary smoke tests) goes through [`ToolInvocation`].
//! Output is captured on helper threads so a chatty child cannot block on a
//! full pipe, and an optional timeout kills the child.

use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A command to run
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
    stdin: Option<String>,
    timeout: Option<Duration>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            stdin: None,
            timeout: None,
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

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Text written to the child's stdin; stdin is closed when unset
    pub fn stdin(mut self, input: Option<String>) -> Self {
        self.stdin = input;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Shell-like rendering for logs and diagnostics
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| {
                if part.is_empty() || part.contains(char::is_whitespace) {
                    format!("'{}'", part)
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion (or timeout), capturing output
    ///
    /// Fails only when the program cannot be started.
    pub fn run(&self) -> io::Result<ProcessOutput> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }

        debug!("Running: {}", self.command_line());
        let start = Instant::now();
        let mut child = command.spawn()?;

        let writer = child.stdin.take().zip(self.stdin.clone()).map(|(mut pipe, input)| {
            thread::spawn(move || {
                // The child may exit without reading; a broken pipe is expected then.
                let _ = pipe.write_all(input.as_bytes());
            })
        });
        let stdout = capture(child.stdout.take());
        let stderr = capture(child.stderr.take());

        let (exit_code, timed_out) = self.wait(&mut child)?;
        let elapsed = start.elapsed();

        // After a kill, grandchildren may still hold the pipes open
        let finished = !timed_out;
        if let Some(handle) = writer.filter(|_| finished) {
            let _ = handle.join();
        }

        Ok(ProcessOutput {
            exit_code,
            stdout: collect(stdout, finished),
            stderr: collect(stderr, finished),
            elapsed,
            timed_out,
        })
    }

    fn wait(&self, child: &mut Child) -> io::Result<(Option<i32>, bool)> {
        let Some(timeout) = self.timeout else {
            let status = child.wait()?;
            return Ok((status.code(), false));
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok((status.code(), false));
            }
            if Instant::now() >= deadline {
                warn!(
                    "'{}' exceeded {}s; killing it",
                    self.command_line(),
                    timeout.as_secs()
                );
                let _ = child.kill();
                let _ = child.wait();
                return Ok((None, true));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

type Capture = (Arc<Mutex<Vec<u8>>>, JoinHandle<()>);

fn capture<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Capture> {
    pipe.map(|mut pipe| {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let handle = thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => match sink.lock() {
                        Ok(mut buf) => buf.extend_from_slice(&chunk[..n]),
                        Err(_) => break,
                    },
                }
            }
        });
        (buffer, handle)
    })
}

/// Text captured so far; waits for EOF when `join` is set
fn collect(capture: Option<Capture>, join: bool) -> String {
    let Some((buffer, handle)) = capture else {
        return String::new();
    };
    if join {
        let _ = handle.join();
    }
    let bytes = buffer.lock().map(|buf| buf.clone()).unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Captured result of a finished (or killed) subprocess
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutput {
    /// Exit code; `None` when killed by a signal or the timeout
    pub exit_code: Option<i32>,
    #[serde(skip)]
    pub stdout: String,
    #[serde(skip)]
    pub stderr: String,
    #[serde(serialize_with = "as_millis")]
    pub elapsed: Duration,
    pub timed_out: bool,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl ProcessOutput {
    /// Check if the process exited with status 0
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Get combined output
    pub fn output(&self) -> String {
        let mut output = String::new();
        if !self.stdout.is_empty() {
            output.push_str("STDOUT:\n");
            output.push_str(&self.stdout);
            if !self.stdout.ends_with('\n') {
                output.push('\n');
            }
        }
        if !self.stderr.is_empty() {
            output.push_str("STDERR:\n");
            output.push_str(&self.stderr);
        }
        output
    }

    /// Last `lines` lines of the combined output
    pub fn tail(&self, lines: usize) -> String {
        let output = self.output();
        let all: Vec<&str> = output.lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }

    /// One-line description of how the process ended
    pub fn status_text(&self) -> String {
        match (self.timed_out, self.exit_code) {
            (true, _) => format!("timed out after {}s", self.elapsed.as_secs()),
            (false, Some(code)) => format!("exit status {}", code),
            (false, None) => "terminated by signal".to_string(),
        }
    }
}
