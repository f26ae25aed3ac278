//! Process-group plumbing shared by every external radio tool.
//!
//! Every tool is spawned as the leader of a fresh process group so the whole
//! tree (including workers the tool forks itself) can be signalled at once.

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::session::SessionManager;
use crate::config::CommandSpec;

/// Spawn `spec` as the leader of its own process group.
///
/// stdin and stderr are detached; stdout is piped only when `capture_stdout`.
pub fn spawn_in_group(spec: &CommandSpec, capture_stdout: bool) -> io::Result<Child> {
    let stdout = if capture_stdout {
        Stdio::piped()
    } else {
        Stdio::null()
    };
    Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(Stdio::null())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
}

/// Process-group id of a freshly spawned group leader (pgid == pid).
pub fn group_id(child: &Child) -> Option<i32> {
    child.id().and_then(|pid| i32::try_from(pid).ok())
}

/// Send `signal` to every member of process group `pgid`.
///
/// Returns `false` when the group no longer exists.
#[allow(unsafe_code)]
pub fn signal_group(pgid: i32, signal: i32) -> bool {
    // pgid 0 would address our own group.
    if pgid <= 0 {
        return false;
    }
    // SAFETY: killpg takes plain integers and has no memory-safety preconditions.
    unsafe { libc::killpg(pgid, signal) == 0 }
}

/// Send `signal` to a single process.
#[allow(unsafe_code)]
pub fn signal_pid(pid: i32, signal: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // SAFETY: kill takes plain integers and has no memory-safety preconditions.
    unsafe { libc::kill(pid, signal) == 0 }
}

/// Liveness probe: signal 0 checks existence without delivering anything.
#[allow(unsafe_code)]
pub fn is_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // SAFETY: see signal_pid.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Arguments of a running process as recorded in procfs.
///
/// `None` when procfs is unavailable or the process is gone.
pub fn command_line(pid: i32) -> Option<Vec<String>> {
    if pid <= 0 {
        return None;
    }
    let raw = std::fs::read(format!("/proc/{pid}/cmdline")).ok()?;
    Some(
        raw.split(|b| *b == 0)
            .filter(|arg| !arg.is_empty())
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .collect(),
    )
}

/// Whether `pid` is an instance of `program`, compared by executable name.
///
/// Pids survive in pid files across crashes and reboots, so a live pid alone
/// says nothing about what it belongs to. An unreadable command line is a
/// mismatch.
pub fn runs_program(pid: i32, program: &str) -> bool {
    let wanted = Path::new(program).file_name();
    command_line(pid)
        .and_then(|argv| argv.into_iter().next())
        .is_some_and(|argv0| wanted.is_some() && Path::new(&argv0).file_name() == wanted)
}

/// SIGTERM the group, give the leader `grace` to exit, then SIGKILL.
///
/// A final SIGKILL sweep always follows so forked workers that ignored
/// SIGTERM cannot outlive their leader.
pub async fn terminate_group(child: &mut Child, pgid: Option<i32>, grace: Duration) {
    if let Some(pgid) = pgid {
        signal_group(pgid, libc::SIGTERM);
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!(pgid = ?pgid, %status, "Process group leader exited"),
        Ok(Err(e)) => warn!(pgid = ?pgid, error = %e, "Failed to reap process group leader"),
        Err(_) => {
            warn!(pgid = ?pgid, grace_secs = grace.as_secs_f64(), "Leader ignored SIGTERM, killing group");
            if let Some(pgid) = pgid {
                signal_group(pgid, libc::SIGKILL);
            }
            if let Err(e) = child.kill().await {
                warn!(pgid = ?pgid, error = %e, "Failed to kill process group leader");
            }
        }
    }

    if let Some(pgid) = pgid {
        signal_group(pgid, libc::SIGKILL);
    }
}

/// How a bounded run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    /// The process exited on its own.
    Exited(Option<i32>),
    /// The timeout fired first and the group was torn down.
    TimedOut,
    /// The cancellation token fired first and the group was torn down.
    Cancelled,
}

/// Output of [`run_bounded`].
#[derive(Debug)]
pub struct BoundedOutput {
    pub stdout: Vec<u8>,
    pub end: RunEnd,
}

impl BoundedOutput {
    pub const fn succeeded(&self) -> bool {
        matches!(self.end, RunEnd::Exited(Some(0)))
    }
}

/// Run `spec` to completion with a timeout, collecting stdout.
///
/// The group is registered with `manager` for the lifetime of the run so an
/// operator cancel can sweep it.
pub async fn run_bounded(
    spec: &CommandSpec,
    timeout: Duration,
    grace: Duration,
    manager: &SessionManager,
    cancel: &CancellationToken,
) -> io::Result<BoundedOutput> {
    let mut child = spawn_in_group(spec, true)?;
    let pgid = group_id(&child);
    let session = manager.register(pgid.into_iter().collect());

    let reader = child.stdout.take().map(|mut stdout| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Err(e) = stdout.read_to_end(&mut buf).await {
                debug!(error = %e, "stdout read ended with error");
            }
            buf
        })
    });

    let end = tokio::select! {
        status = child.wait() => RunEnd::Exited(status.ok().and_then(|s: ExitStatus| s.code())),
        () = tokio::time::sleep(timeout) => RunEnd::TimedOut,
        () = cancel.cancelled() => RunEnd::Cancelled,
    };

    if end == RunEnd::TimedOut || end == RunEnd::Cancelled {
        terminate_group(&mut child, pgid, grace).await;
    } else if let Some(pgid) = pgid {
        signal_group(pgid, libc::SIGKILL);
    }
    manager.unregister(session);

    let stdout = collect_reader(reader, grace).await;
    Ok(BoundedOutput { stdout, end })
}

/// Join a stdout reader task, giving up after `grace`.
pub async fn collect_reader(
    reader: Option<tokio::task::JoinHandle<Vec<u8>>>,
    grace: Duration,
) -> Vec<u8> {
    let Some(handle) = reader else {
        return Vec::new();
    };
    let abort = handle.abort_handle();
    match tokio::time::timeout(grace, handle).await {
        Ok(Ok(buf)) => buf,
        Ok(Err(e)) => {
            warn!(error = %e, "stdout reader task failed");
            Vec::new()
        }
        Err(_) => {
            warn!("stdout still open after teardown, discarding output");
            abort.abort();
            Vec::new()
        }
    }
}
