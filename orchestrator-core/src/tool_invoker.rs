//! ToolInvoker (C1): spawn an external tool, stream stderr/stdout, classify
//! exit. Grounded on `av1an-core::broker::{EncoderCrash, StringOrBytes}`
//! (bounded stderr capture) and `av1an-core::ffmpeg`'s
//! `Command`/`Stdio::piped()` usage.

use std::collections::VecDeque;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;

use crate::error::{OrchestratorError, Result};
use crate::state::enums::ExitClass;

/// Stderr ring buffer cap from spec §4.1.
const STDERR_TAIL_LINES: usize = 200;

/// Per-tool exit-code rules: some tools (mkvmerge/mkvextract) use exit code
/// 1 to mean "completed with warnings", not failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitPolicy {
    pub warn_on_code_1: bool,
}

#[derive(Debug)]
pub struct ExitInfo {
    pub class: ExitClass,
    pub status: std::process::ExitStatus,
    pub stderr_tail: String,
}

/// What to feed a spawned tool's stdin (spec §4.1's `stdin?` parameter):
/// an in-memory buffer, a file to read from, or the stdout handle of a
/// process already spawned by [`run_piped`].
pub enum Stdin {
    Bytes(Vec<u8>),
    File(PathBuf),
    ChildStdout(std::process::ChildStdout),
}

/// Resolves a tool executable: an explicit directory first, then `PATH`.
/// A tool missing from both is a fatal [`OrchestratorError::NotFound`]
/// raised before any work begins (spec §4.1).
pub fn resolve_tool(name: &str, explicit_dir: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit_dir {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Ok(candidate);
        }
        #[cfg(windows)]
        {
            let candidate_exe = dir.join(format!("{name}.exe"));
            if candidate_exe.is_file() {
                return Ok(candidate_exe);
            }
        }
    }
    which::which(name).map_err(|_| OrchestratorError::not_found(format!("tool `{name}` not on PATH or in tool directory")))
}

/// Spawn `argv[0]` with `argv[1..]`, optionally feeding it `stdin`,
/// streaming stdout/stderr line-by-line through the handlers, and
/// classifying the exit code per `policy` (spec §4.1).
pub fn run<'a>(
    argv: &[impl AsRef<OsStr>],
    env: &[(String, String)],
    cwd: Option<&Path>,
    stdin: Option<Stdin>,
    policy: ExitPolicy,
    mut stdout_handlers: Vec<Box<dyn FnMut(&str) + Send + 'a>>,
    mut stderr_handlers: Vec<Box<dyn FnMut(&str) + Send + 'a>>,
) -> Result<ExitInfo> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| OrchestratorError::config("empty argv"))?;

    let mut cmd = Command::new(program);
    cmd.args(args.iter());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    for (k, v) in env {
        cmd.env(k, v);
    }
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }

    let mut pending_bytes = None;
    match stdin {
        Some(Stdin::Bytes(bytes)) => {
            cmd.stdin(Stdio::piped());
            pending_bytes = Some(bytes);
        }
        Some(Stdin::File(path)) => {
            let file = File::open(&path).map_err(|e| OrchestratorError::Io { path: path.clone(), source: e })?;
            cmd.stdin(Stdio::from(file));
        }
        Some(Stdin::ChildStdout(child_stdout)) => {
            cmd.stdin(Stdio::from(child_stdout));
        }
        None => {
            cmd.stdin(Stdio::null());
        }
    }

    log::debug!("spawning tool: {:?}", cmd);

    let mut child = cmd.spawn().map_err(|e| OrchestratorError::Io {
        path: PathBuf::from(program),
        source: e,
    })?;

    if let Some(bytes) = pending_bytes {
        let mut stdin_handle = child.stdin.take().expect("piped stdin");
        thread::spawn(move || {
            let _ = stdin_handle.write_all(&bytes);
        });
    }

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let (tx, rx) = mpsc::channel::<String>();
    let stderr_thread = thread::spawn(move || {
        let reader = BufReader::new(stderr);
        for line in reader.lines().map_while(std::result::Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let stdout_thread = thread::spawn(move || {
        let reader = BufReader::new(stdout);
        let mut lines = Vec::new();
        for line in reader.lines().map_while(std::result::Result::ok) {
            lines.push(line);
        }
        lines
    });

    let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    for line in rx.iter() {
        for handler in &mut stderr_handlers {
            handler(&line);
        }
        if stderr_tail.len() == STDERR_TAIL_LINES {
            stderr_tail.pop_front();
        }
        stderr_tail.push_back(line);
    }
    stderr_thread.join().ok();

    let stdout_lines = stdout_thread.join().unwrap_or_default();
    for line in &stdout_lines {
        for handler in &mut stdout_handlers {
            handler(line);
        }
    }

    let status = child.wait().map_err(|e| OrchestratorError::Io {
        path: PathBuf::from(program),
        source: e,
    })?;

    let tail = stderr_tail.into_iter().collect::<Vec<_>>().join("\n");
    let class = classify(status, policy);
    Ok(ExitInfo {
        class,
        status,
        stderr_tail: tail,
    })
}

/// Spawn `producer_argv` with its stdout piped directly into
/// `consumer_argv`'s stdin, without either process touching disk in
/// between (spec §4.7's frame-server pipe, §4.5's Opus decode|encode
/// pipe). `producer`'s own stderr is discarded; only the consumer is
/// observed through `policy`/the line handlers.
pub fn run_piped<'a>(
    producer_argv: &[impl AsRef<OsStr>],
    consumer_argv: &[impl AsRef<OsStr>],
    consumer_env: &[(String, String)],
    cwd: Option<&Path>,
    policy: ExitPolicy,
    stdout_handlers: Vec<Box<dyn FnMut(&str) + Send + 'a>>,
    stderr_handlers: Vec<Box<dyn FnMut(&str) + Send + 'a>>,
) -> Result<ExitInfo> {
    let (producer_program, producer_args) = producer_argv
        .split_first()
        .ok_or_else(|| OrchestratorError::config("empty producer argv"))?;

    let mut producer_cmd = Command::new(producer_program);
    producer_cmd.args(producer_args.iter());
    producer_cmd.stdin(Stdio::null());
    producer_cmd.stdout(Stdio::piped());
    producer_cmd.stderr(Stdio::null());

    log::debug!("spawning pipe producer: {:?}", producer_cmd);
    let mut producer_child = producer_cmd.spawn().map_err(|e| OrchestratorError::Io {
        path: PathBuf::from(producer_program),
        source: e,
    })?;
    let producer_stdout = producer_child.stdout.take().expect("piped stdout");

    let info = run(
        consumer_argv,
        consumer_env,
        cwd,
        Some(Stdin::ChildStdout(producer_stdout)),
        policy,
        stdout_handlers,
        stderr_handlers,
    )?;

    let producer_status = producer_child.wait().map_err(|e| OrchestratorError::Io {
        path: PathBuf::from(producer_program),
        source: e,
    })?;
    if !producer_status.success() {
        log::warn!("pipe producer exited with status {:?}", producer_status.code());
    }

    Ok(info)
}

fn classify(status: std::process::ExitStatus, policy: ExitPolicy) -> ExitClass {
    match status.code() {
        Some(0) => ExitClass::Ok,
        Some(1) if policy.warn_on_code_1 => ExitClass::Warn,
        _ => ExitClass::Fail,
    }
}

/// Convert an [`ExitInfo`] into a `Result<()>`, surfacing `Fail` as
/// [`OrchestratorError::ToolFail`] with the captured stderr tail.
pub fn require_ok(tool: &str, info: ExitInfo) -> Result<()> {
    match info.class {
        ExitClass::Ok => Ok(()),
        ExitClass::Warn => {
            log::warn!("{tool} exited with warnings: {}", info.stderr_tail);
            Ok(())
        }
        ExitClass::Fail => Err(OrchestratorError::ToolFail {
            tool: tool.to_owned(),
            exit_status: info.status,
            stderr_tail: info.stderr_tail,
        }),
    }
}
