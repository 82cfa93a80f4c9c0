// Background execution: pipeline thread, rendezvous channel, cancellation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use super::pipeline::{Pipeline, PipelineEvent};

/// Shared cancellation flag plus the PID of whichever subprocess is
/// currently running, so cancel can reach a blocked encode. All state is
/// atomic; `cancel` is callable from a signal handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    /// PID of the active subprocess, 0 when none is running.
    active_pid: Arc<AtomicU32>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Request cancellation and signal the active subprocess, if any.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        let pid = self.active_pid.load(Ordering::SeqCst);
        if pid != 0 {
            terminate(pid);
        }
    }

    /// Track a freshly spawned subprocess. If cancellation already happened
    /// the process is signalled immediately; the pipeline notices on wait.
    pub fn register(&self, pid: u32) {
        self.active_pid.store(pid, Ordering::SeqCst);
        if self.is_cancelled() {
            terminate(pid);
        }
    }

    pub fn unregister(&self) {
        self.active_pid.store(0, Ordering::SeqCst);
    }
}

#[cfg(unix)]
fn terminate(pid: u32) {
    unsafe {
        libc::kill(pid as i32, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn terminate(_pid: u32) {
    // No signal delivery; the pipeline polls the flag between lines and
    // kills the child itself.
}

/// A running pipeline: its event stream, a cancel handle, and the join
/// handle for shutdown.
pub struct PipelineHandle {
    pub events: Receiver<PipelineEvent>,
    pub cancel: CancelToken,
    join: JoinHandle<()>,
}

impl PipelineHandle {
    pub fn join(self) {
        let _ = self.join.join();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Spawn a pipeline on a background thread.
///
/// The channel is a rendezvous channel (capacity zero): the pipeline blocks
/// on every event until the consumer takes it, so progress can never pile up
/// unread and the consumer's pace naturally throttles event production.
pub fn spawn_pipeline(pipeline: Pipeline) -> PipelineHandle {
    let (tx, rx): (SyncSender<PipelineEvent>, Receiver<PipelineEvent>) = mpsc::sync_channel(0);
    let cancel = CancelToken::new();

    let worker_cancel = cancel.clone();
    let join = thread::spawn(move || {
        pipeline.run(&tx, &worker_cancel);
    });

    PipelineHandle { events: rx, cancel, join }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_starts_clear_and_latches() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        token.cancel(); // idempotent
        assert!(token.is_cancelled());
    }

    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn unregister_clears_the_tracked_pid() {
        let token = CancelToken::new();
        token.register(std::process::id());
        token.unregister();
        // Cancelling now must not signal anything; the flag still latches.
        token.cancel();
        assert!(token.is_cancelled());
    }
}
