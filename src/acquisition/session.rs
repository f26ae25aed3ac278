//! Capture sessions and the active-process registry.
//!
//! A [`CaptureSession`] runs one capture + decode process pair for a single
//! frequency for a hard wall-clock budget, then tears both process groups
//! down before returning. Every group it starts is recorded in a
//! [`SessionManager`] so an operator cancel can sweep all in-flight groups.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::process::{collect_reader, group_id, signal_group, spawn_in_group, terminate_group};
pub use crate::config::CommandSpec;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to start {role} process '{program}': {source}")]
    StartFailure {
        role: &'static str,
        program: String,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Session Manager (active-process registry)
// ============================================================================

pub type SessionId = u64;

/// Registry of process groups belonging to in-flight sessions.
///
/// Sessions add their groups on start and remove them before returning;
/// [`SessionManager::terminate_all`] is the cancellation sweep.
#[derive(Debug, Default)]
pub struct SessionManager {
    next_id: AtomicU64,
    active: Mutex<HashMap<SessionId, Vec<i32>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn groups(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, Vec<i32>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a new session owning `pgids`.
    pub fn register(&self, pgids: Vec<i32>) -> SessionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.groups().insert(id, pgids);
        id
    }

    /// Append a process group to an existing session.
    pub fn add_group(&self, id: SessionId, pgid: i32) {
        self.groups().entry(id).or_default().push(pgid);
    }

    /// Remove a session's entry, returning the groups it owned.
    pub fn unregister(&self, id: SessionId) -> Option<Vec<i32>> {
        self.groups().remove(&id)
    }

    pub fn active_count(&self) -> usize {
        self.groups().len()
    }

    /// SIGKILL every registered group and clear the registry.
    ///
    /// Returns the number of groups signalled.
    pub fn terminate_all(&self) -> usize {
        let drained: Vec<(SessionId, Vec<i32>)> = self.groups().drain().collect();
        let mut signalled = 0;
        for (session, pgids) in drained {
            for pgid in pgids {
                if signal_group(pgid, libc::SIGKILL) {
                    signalled += 1;
                }
                warn!(session, pgid, "Terminated process group on shutdown");
            }
        }
        signalled
    }
}

// ============================================================================
// Capture Session
// ============================================================================

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The full duration elapsed.
    Expired,
    /// The cancellation token fired mid-window.
    Cancelled,
}

/// Decoder stdout collected during one session.
#[derive(Debug)]
pub struct SessionOutput {
    pub output: Vec<u8>,
    pub end: SessionEnd,
    pub elapsed: Duration,
}

impl SessionOutput {
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.output)
    }
}

/// One capture + decode process pair per run.
///
/// The capture tool tunes the radio; the decoder reads the local packet
/// source and prints frames on stdout.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    capture: CommandSpec,
    decoder: CommandSpec,
    teardown_grace: Duration,
    manager: Arc<SessionManager>,
}

impl CaptureSession {
    pub fn new(
        capture: CommandSpec,
        decoder: CommandSpec,
        teardown_grace: Duration,
        manager: Arc<SessionManager>,
    ) -> Self {
        Self {
            capture,
            decoder,
            teardown_grace,
            manager,
        }
    }

    /// Run both processes for exactly `duration` (or until `cancel` fires),
    /// then terminate both process groups and return the decoder's output.
    ///
    /// If either process fails to start nothing is left running and
    /// `SessionError::StartFailure` is returned.
    pub async fn run(
        &self,
        frequency: f64,
        sample_rate: f64,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<SessionOutput, SessionError> {
        let vars = [
            ("frequency", frequency.to_string()),
            ("sample_rate", sample_rate.to_string()),
        ];
        let capture_cmd = self.capture.render(&vars);
        let decoder_cmd = self.decoder.render(&vars);
        let started = Instant::now();

        let mut capture = spawn_in_group(&capture_cmd, false).map_err(|source| {
            SessionError::StartFailure {
                role: "capture",
                program: capture_cmd.program.clone(),
                source,
            }
        })?;
        let capture_pgid = group_id(&capture);
        let session = self.manager.register(capture_pgid.into_iter().collect());

        let mut decoder = match spawn_in_group(&decoder_cmd, true) {
            Ok(child) => child,
            Err(source) => {
                terminate_group(&mut capture, capture_pgid, self.teardown_grace).await;
                self.manager.unregister(session);
                return Err(SessionError::StartFailure {
                    role: "decoder",
                    program: decoder_cmd.program.clone(),
                    source,
                });
            }
        };
        let decoder_pgid = group_id(&decoder);
        if let Some(pgid) = decoder_pgid {
            self.manager.add_group(session, pgid);
        }

        debug!(
            session,
            frequency,
            capture_pgid = ?capture_pgid,
            decoder_pgid = ?decoder_pgid,
            duration_secs = duration.as_secs_f64(),
            "Capture session started"
        );

        let reader = decoder.stdout.take().map(|mut stdout| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                if let Err(e) = stdout.read_to_end(&mut buf).await {
                    debug!(error = %e, "Decoder stdout closed with error");
                }
                buf
            })
        });

        // Hard window: the decoder exiting early does not end the session.
        let end = tokio::select! {
            () = tokio::time::sleep(duration) => SessionEnd::Expired,
            () = cancel.cancelled() => SessionEnd::Cancelled,
        };

        tokio::join!(
            terminate_group(&mut decoder, decoder_pgid, self.teardown_grace),
            terminate_group(&mut capture, capture_pgid, self.teardown_grace),
        );
        self.manager.unregister(session);

        let output = collect_reader(reader, self.teardown_grace).await;
        let elapsed = started.elapsed();
        info!(
            session,
            frequency,
            bytes = output.len(),
            elapsed_secs = elapsed.as_secs_f64(),
            end = ?end,
            "Capture session finished"
        );

        Ok(SessionOutput {
            output,
            end,
            elapsed,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", &["-c", script])
    }

    fn session(capture: CommandSpec, decoder: CommandSpec, manager: &Arc<SessionManager>) -> CaptureSession {
        CaptureSession::new(capture, decoder, Duration::from_secs(1), Arc::clone(manager))
    }

    #[test]
    fn registry_register_and_unregister() {
        let manager = SessionManager::new();
        let a = manager.register(vec![]);
        let b = manager.register(vec![]);
        assert_ne!(a, b);
        assert_eq!(manager.active_count(), 2);
        manager.add_group(a, 999_999);
        assert_eq!(manager.unregister(a), Some(vec![999_999]));
        assert_eq!(manager.unregister(a), None);
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn terminate_all_clears_registry() {
        let manager = SessionManager::new();
        manager.register(vec![]);
        manager.register(vec![]);
        manager.terminate_all();
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn session_collects_decoder_output_and_cleans_up() {
        let manager = SessionManager::shared();
        let s = session(
            sh("sleep 30"),
            sh("echo 'freq {frequency}'; sleep 30"),
            &manager,
        );
        let out = s
            .run(936.6, 1.6e6, Duration::from_millis(300), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.end, SessionEnd::Expired);
        assert!(out.text().contains("freq 936.6"));
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn session_blocks_for_full_window_even_if_decoder_exits() {
        let manager = SessionManager::shared();
        let s = session(sh("sleep 30"), sh("echo done"), &manager);
        let out = s
            .run(1.0, 1.0, Duration::from_millis(400), &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.elapsed >= Duration::from_millis(400));
        assert_eq!(out.text().trim(), "done");
    }

    #[tokio::test]
    async fn cancel_ends_session_early() {
        let manager = SessionManager::shared();
        let s = session(sh("sleep 30"), sh("sleep 30"), &manager);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let out = s.run(1.0, 1.0, Duration::from_secs(30), &cancel).await.unwrap();
        assert_eq!(out.end, SessionEnd::Cancelled);
        assert!(out.elapsed < Duration::from_secs(10));
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn decoder_start_failure_tears_down_capture() {
        let manager = SessionManager::shared();
        let s = session(
            sh("sleep 30"),
            CommandSpec::new("/nonexistent/decoder", &[]),
            &manager,
        );
        let err = s
            .run(1.0, 1.0, Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::StartFailure { role: "decoder", .. }));
        assert_eq!(manager.active_count(), 0);
    }
}
