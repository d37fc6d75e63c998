use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    os::unix::process::CommandExt,
    path::Path,
    process::{Command, Stdio},
};

use crate::{error::InstallerError, ui};

// ── Internal helpers ──────────────────────────────────────────────────────────

fn not_found_or_io(program: &str, err: io::Error) -> InstallerError {
    if err.kind() == io::ErrorKind::NotFound {
        InstallerError::CommandNotFound(program.to_string())
    } else {
        InstallerError::Io(err)
    }
}

fn print_captured_output(stdout: &[u8], stderr: &[u8]) {
    let out = String::from_utf8_lossy(stdout);
    let err = String::from_utf8_lossy(stderr);
    if !out.trim().is_empty() {
        eprintln!("{}", out.trim());
    }
    if !err.trim().is_empty() {
        eprintln!("{}", err.trim());
    }
}

/// Last non-empty stderr line, formatted as an error suffix.
fn failure_detail(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| format!(": {}", l))
        .unwrap_or_default()
}

fn failed(program: &str, code: Option<i32>, stderr: &[u8]) -> InstallerError {
    InstallerError::CommandFailed {
        program: program.to_string(),
        code: code.unwrap_or(-1),
        detail: failure_detail(stderr),
    }
}

/// Every external tool gets its own process group, so a Ctrl-C on the
/// terminal reaches only the installer and never a running `sgdisk`/`mkfs`.
fn command(program: &str, args: &[&str]) -> Command {
    let mut c = Command::new(program);
    c.args(args).process_group(0);
    c
}

pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Read-only queries ─────────────────────────────────────────────────────────

/// Runs a read-only probe (`lsblk`, `lspci`) and returns its stdout.
/// Executed even in dry-run mode since it changes nothing.
pub fn query(program: &str, args: &[&str]) -> Result<String, InstallerError> {
    tracing::debug!(cmd = %command_line(program, args), "query");
    let output = command(program, args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| not_found_or_io(program, e))?;

    if !output.status.success() {
        return Err(failed(program, output.status.code(), &output.stderr));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

// ── Side-effecting commands ───────────────────────────────────────────────────

/// Every side effect a pipeline stage has on the machine goes through here.
pub trait CommandRunner {
    /// Runs silently behind a spinner; captured output is shown only on failure.
    fn run(&mut self, program: &str, args: &[&str]) -> Result<(), InstallerError>;

    /// Runs with the terminal's stdout/stderr inherited (long downloads).
    fn run_streaming(&mut self, program: &str, args: &[&str]) -> Result<(), InstallerError>;

    /// Runs with `input` written to stdin (never echoed or logged).
    fn run_with_stdin(&mut self, program: &str, args: &[&str], input: &str) -> Result<(), InstallerError>;

    /// Runs and returns trimmed stdout.
    fn capture(&mut self, program: &str, args: &[&str]) -> Result<String, InstallerError>;

    /// Runs and **appends** stdout to `file` (equivalent to `>> file`).
    fn append_output(&mut self, program: &str, args: &[&str], file: &Path) -> Result<(), InstallerError>;

    /// Writes (or appends to) a file, creating parent directories.
    fn write_file(&mut self, path: &Path, contents: &str, append: bool) -> Result<(), InstallerError>;

    /// Runs ignoring any failure. Used for cleanup, where partial failure is
    /// acceptable; the failure is logged.
    fn run_best_effort(&mut self, program: &str, args: &[&str]);
}

/// Runs commands for real, or only reports them when `dry_run` is set.
#[derive(Debug, Clone, Copy)]
pub struct SystemRunner {
    pub dry_run: bool,
}

impl SystemRunner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// In dry-run mode prints the command and returns `true`.
    fn simulated(&self, program: &str, args: &[&str]) -> bool {
        let line = command_line(program, args);
        tracing::debug!(cmd = %line, dry_run = self.dry_run, "exec");
        if self.dry_run {
            ui::print_dry_run(&line);
        }
        self.dry_run
    }
}

impl CommandRunner for SystemRunner {
    fn run(&mut self, program: &str, args: &[&str]) -> Result<(), InstallerError> {
        if self.simulated(program, args) {
            return Ok(());
        }
        let pb = ui::spinner(command_line(program, args));
        let result = command(program, args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| not_found_or_io(program, e));
        pb.finish_and_clear();

        let output = result?;
        if !output.status.success() {
            print_captured_output(&output.stdout, &output.stderr);
            return Err(failed(program, output.status.code(), &output.stderr));
        }
        Ok(())
    }

    fn run_streaming(&mut self, program: &str, args: &[&str]) -> Result<(), InstallerError> {
        if self.simulated(program, args) {
            return Ok(());
        }
        let status = command(program, args)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| not_found_or_io(program, e))?;

        if !status.success() {
            return Err(failed(program, status.code(), &[]));
        }
        Ok(())
    }

    fn run_with_stdin(&mut self, program: &str, args: &[&str], input: &str) -> Result<(), InstallerError> {
        if self.simulated(program, args) {
            return Ok(());
        }
        let mut child = command(program, args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| not_found_or_io(program, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes())?;
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(failed(program, output.status.code(), &output.stderr));
        }
        Ok(())
    }

    fn capture(&mut self, program: &str, args: &[&str]) -> Result<String, InstallerError> {
        if self.simulated(program, args) {
            return Ok(format!("dry-run-{}", program));
        }
        let output = command(program, args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| not_found_or_io(program, e))?;

        if !output.status.success() {
            return Err(failed(program, output.status.code(), &output.stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn append_output(&mut self, program: &str, args: &[&str], file: &Path) -> Result<(), InstallerError> {
        if self.simulated(program, args) {
            ui::print_dry_run(&format!("  >> {}", file.display()));
            return Ok(());
        }
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)?;
        }
        let out = OpenOptions::new().append(true).create(true).open(file)?;

        let output = command(program, args)
            .stdin(Stdio::null())
            .stdout(out)
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| not_found_or_io(program, e))?;

        if !output.status.success() {
            return Err(failed(program, output.status.code(), &output.stderr));
        }
        Ok(())
    }

    fn write_file(&mut self, path: &Path, contents: &str, append: bool) -> Result<(), InstallerError> {
        tracing::debug!(path = %path.display(), append, "write file");
        if self.dry_run {
            let verb = if append { "append to" } else { "write" };
            ui::print_dry_run(&format!("{} {}", verb, path.display()));
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)?;
        file.write_all(contents.as_bytes())?;
        Ok(())
    }

    fn run_best_effort(&mut self, program: &str, args: &[&str]) {
        if self.simulated(program, args) {
            return;
        }
        let result = command(program, args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match result {
            Ok(s) if s.success() => {}
            Ok(s) => tracing::warn!(cmd = %command_line(program, args), code = ?s.code(), "cleanup command failed"),
            Err(e) => tracing::warn!(cmd = %command_line(program, args), "cleanup command not run: {e}"),
        }
    }
}
