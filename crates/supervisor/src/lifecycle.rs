//! Process lifecycle supervision: detects when the parent process (the MCP
//! client that spawned this bridge) has gone away, and drives the graceful
//! shutdown sequence for the managed language server.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Best-effort parent-death detection.
///
/// On Linux, `PR_SET_PDEATHSIG` asks the kernel to deliver a signal the
/// moment our parent exits, but that delivery is lost if we're reparented
/// before the signal arrives (e.g. a supervising shell already exited). The
/// poll loop below is the portable fallback: a process reparented to init
/// (PID 1) has, for our purposes, lost its parent either way.
pub fn watch_parent(shutdown: CancellationToken) {
    #[cfg(target_os = "linux")]
    {
        if let Err(e) =
            rustix::process::set_parent_process_death_signal(Some(rustix::process::Signal::TERM))
        {
            warn!(error = %e, "failed to register PR_SET_PDEATHSIG; relying on poll loop only");
        }
    }

    let initial_ppid = parent_pid();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = interval.tick() => {}
            }
            let current = parent_pid();
            if current != initial_ppid || current == 1 {
                info!(
                    initial_ppid,
                    current_ppid = current,
                    "parent process appears to have exited; shutting down"
                );
                shutdown.cancel();
                return;
            }
        }
    });
}

fn parent_pid() -> i32 {
    rustix::process::getppid()
        .map(|p| p.as_raw_nonzero().get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_pid_is_nonzero_in_test_process() {
        assert!(parent_pid() > 0);
    }
}
