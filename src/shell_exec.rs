//! Child-process execution with logging, timing, and deadlines.
//!
//! All external commands go through [`run`] so every invocation is logged
//! consistently and bounded by a timeout. Expiry kills the child and surfaces
//! as [`std::io::ErrorKind::TimedOut`]; callers translate that into their own
//! timeout error.

use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use wait_timeout::ChildExt;

/// Execute a command with timing and debug logging.
///
/// This is the **only** way to run external commands in arbor. All command
/// execution must go through this function to ensure consistent logging and
/// tracing.
///
/// ```text
/// $ git worktree list --porcelain [feature/x]    # with context
/// $ git fetch origin                             # without context
/// [arb-trace] context=feature/x cmd="..." dur=12.3ms ok=true
/// ```
///
/// The `context` parameter is typically the worktree id for git commands run
/// inside a worktree, or `None` for repository-level commands.
///
/// The child is killed once `timeout` elapses; partial output is discarded
/// and the call returns [`std::io::ErrorKind::TimedOut`].
pub fn run(cmd: &mut Command, context: Option<&str>, timeout: Duration) -> std::io::Result<Output> {
    let program = cmd.get_program().to_string_lossy();
    let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy()).collect();
    let cmd_str = if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    };

    match context {
        Some(ctx) => log::debug!("$ {} [{}]", cmd_str, ctx),
        None => log::debug!("$ {}", cmd_str),
    }

    let t0 = Instant::now();
    let result = run_with_deadline(cmd, timeout);
    let duration_ms = t0.elapsed().as_secs_f64() * 1000.0;

    match (&result, context) {
        (Ok(output), Some(ctx)) => {
            log::debug!(
                "[arb-trace] context={} cmd=\"{}\" dur={:.1}ms ok={}",
                ctx,
                cmd_str,
                duration_ms,
                output.status.success()
            );
        }
        (Ok(output), None) => {
            log::debug!(
                "[arb-trace] cmd=\"{}\" dur={:.1}ms ok={}",
                cmd_str,
                duration_ms,
                output.status.success()
            );
        }
        (Err(e), Some(ctx)) => {
            log::debug!(
                "[arb-trace] context={} cmd=\"{}\" dur={:.1}ms err=\"{}\"",
                ctx,
                cmd_str,
                duration_ms,
                e
            );
        }
        (Err(e), None) => {
            log::debug!(
                "[arb-trace] cmd=\"{}\" dur={:.1}ms err=\"{}\"",
                cmd_str,
                duration_ms,
                e
            );
        }
    }

    result
}

/// Spawn the child with piped output and wait with a deadline.
///
/// Output pipes are drained on background threads so a child that writes more
/// than the pipe buffer cannot deadlock against our wait.
fn run_with_deadline(cmd: &mut Command, timeout: Duration) -> std::io::Result<Output> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn()?;

    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let stdout_reader = thread::spawn(move || drain(stdout_pipe));
    let stderr_reader = thread::spawn(move || drain(stderr_pipe));

    let status = match child.wait_timeout(timeout)? {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            let _ = stdout_reader.join();
            let _ = stderr_reader.join();
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("timed out after {:.1}s", timeout.as_secs_f64()),
            ));
        }
    };

    let stdout = stdout_reader
        .join()
        .map_err(|_| std::io::Error::other("stdout reader thread panicked"))??;
    let stderr = stderr_reader
        .join()
        .map_err(|_| std::io::Error::other("stderr reader thread panicked"))??;

    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

fn drain(pipe: Option<impl Read>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf)?;
    }
    Ok(buf)
}
