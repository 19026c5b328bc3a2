//! External executable backend.
//!
//! Invokes a conversion entry point that lives outside this process (a
//! node RPC wrapper, a VM runner, a script) and parses its stdout.

use super::{ConversionEngine, EngineFault};
use crate::error::{HarnessError, HarnessResult};
use std::env;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Engine that shells out once per conversion.
///
/// The call is `<program> <args...> <value>`; the program must print the
/// converted number on stdout and exit with status 0. Under a per-call
/// budget the child is killed and reaped once the budget expires.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: PathBuf,
    args: Vec<String>,
    name: String,
}

impl ProcessEngine {
    /// Create a process engine.
    ///
    /// Fails with [`HarnessError::SetupFailure`] if the executable cannot
    /// be found, so an unreachable engine aborts before the first sample.
    pub fn new(program: PathBuf, args: Vec<String>) -> HarnessResult<Self> {
        let resolved = resolve_program(&program).ok_or_else(|| {
            HarnessError::setup(format!("executable not found: {}", program.display()))
        })?;
        let name = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.display().to_string());

        Ok(Self {
            program: resolved,
            args,
            name,
        })
    }

    /// Resolved executable path.
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn parse_output(stdout: &str, stderr: &str, success: bool) -> Result<f64, EngineFault> {
        if !success {
            let reason = stderr.trim();
            return Err(EngineFault::Reverted(if reason.is_empty() {
                "non-zero exit status".to_string()
            } else {
                reason.to_string()
            }));
        }

        let text = stdout.trim();
        text.parse::<f64>().map_err(|_| {
            EngineFault::Invocation(format!("could not parse a number from stdout {:?}", text))
        })
    }
}

impl ProcessEngine {
    fn call(&self, input: f64, budget: Option<Duration>) -> Result<f64, EngineFault> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(input.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineFault::Invocation(e.to_string()))?;

        // Drained concurrently so a chatty child cannot block on a full pipe.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match budget {
            Some(budget) => wait_with_deadline(&mut child, budget)?,
            None => child.wait().map_err(|e| {
                terminate_and_reap(&mut child);
                EngineFault::Invocation(format!("wait failed: {}", e))
            })?,
        };

        let stdout = collect(stdout);
        let stderr = collect(stderr);
        Self::parse_output(&stdout, &stderr, status.success())
    }
}

impl ConversionEngine for ProcessEngine {
    fn convert(&self, input: f64) -> Result<f64, EngineFault> {
        self.call(input, None)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn enforces_deadline(&self) -> bool {
        true
    }

    fn convert_within(&self, input: f64, budget: Duration) -> Result<f64, EngineFault> {
        self.call(input, Some(budget))
    }
}

fn wait_with_deadline(child: &mut Child, budget: Duration) -> Result<ExitStatus, EngineFault> {
    let started_at = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(e) => {
                terminate_and_reap(child);
                return Err(EngineFault::Invocation(format!("wait failed: {}", e)));
            }
        }

        let elapsed = started_at.elapsed();
        if elapsed >= budget {
            debug!(pid = child.id(), ?budget, "killing engine process past its budget");
            terminate_and_reap(child);
            return Err(EngineFault::TimedOut(budget));
        }
        thread::sleep(POLL_INTERVAL.min(budget - elapsed));
    }
}

fn terminate_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

// Reader threads end when every holder of the pipe has exited. After a kill
// they are not joined: a grandchild may still hold the pipe open.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut bytes = Vec::new();
            let _ = pipe.read_to_end(&mut bytes);
            String::from_utf8_lossy(&bytes).into_owned()
        })
    })
}

fn collect(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Paths with a directory component must exist; bare names are looked up on `PATH`.
fn resolve_program(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
