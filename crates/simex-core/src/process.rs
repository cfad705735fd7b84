//! Subprocess orchestration for the external backengines.
//!
//! Calculators describe the invocation as a [`BackengineCommand`] and hand it
//! to a [`ProcessRunner`]. The runner is the seam tests use to emulate a
//! backengine without the real binary installed.

use crate::domain::{ExecutionSettings, SimexError, SimexResult};
use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackengineCommand {
    pub program: String,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl BackengineCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Prefixes the command with the MPI launcher when more than one process
    /// is requested, and exports `OMP_NUM_THREADS` when cpus per task is set.
    pub fn with_execution(self, settings: &ExecutionSettings, cpus_default: usize) -> Self {
        let cpus = settings.cpus_per_task.unwrap_or(cpus_default).max(1);
        let command = self.env("OMP_NUM_THREADS", cpus.to_string());
        if settings.mpi_processes <= 1 {
            return command;
        }

        let mut args: Vec<OsString> = vec![
            OsString::from("-np"),
            OsString::from(settings.mpi_processes.to_string()),
            OsString::from(command.program),
        ];
        args.extend(command.args);
        Self {
            program: settings.mpi_launcher.clone(),
            args,
            current_dir: command.current_dir,
            env: command.env,
        }
    }

    pub fn arg_strings(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }
}

impl Display for BackengineCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn status_text(&self) -> String {
        self.exit_code.map_or_else(
            || "terminated by signal".to_string(),
            |code| format!("exit code {}", code),
        )
    }

    pub fn stderr_is_empty(&self) -> bool {
        self.stderr.trim().is_empty()
    }
}

pub trait ProcessRunner {
    fn run(&self, command: &BackengineCommand) -> SimexResult<ProcessOutput>;
}

/// Runs commands on the host with `std::process::Command`, capturing both
/// output streams and waiting for termination.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, command: &BackengineCommand) -> SimexResult<ProcessOutput> {
        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &command.current_dir {
            process.current_dir(dir);
        }
        for (key, value) in &command.env {
            process.env(key, value);
        }

        info!(command = %command, "launching backengine");
        let output = process.output().map_err(|source| {
            SimexError::io_system(
                "IO.BACKENGINE_EXEC",
                format!("failed to execute backengine command '{}': {}", command, source),
            )
        })?;

        let result = ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(
            status = %result.status_text(),
            stdout_bytes = result.stdout.len(),
            stderr_bytes = result.stderr.len(),
            "backengine finished"
        );
        if !result.stderr_is_empty() {
            warn!(program = %command.program, "backengine wrote to stderr");
        }
        Ok(result)
    }
}

/// Fails with a computation error when the process exited unsuccessfully.
pub fn require_success(
    output: &ProcessOutput,
    command: &BackengineCommand,
    placeholder: &'static str,
) -> SimexResult<()> {
    if output.success() {
        return Ok(());
    }

    let tail = last_lines(&output.stderr, 5);
    Err(SimexError::computation(
        placeholder,
        format!(
            "backengine '{}' failed with {}{}",
            command.program,
            output.status_text(),
            if tail.is_empty() {
                String::new()
            } else {
                format!(": {}", tail)
            }
        ),
    ))
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join(" | ")
}

pub fn require_output_file(path: &Path, placeholder: &'static str) -> SimexResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(SimexError::io_system(
            placeholder,
            format!(
                "backengine did not produce the expected output '{}'",
                path.display()
            ),
        ))
    }
}
