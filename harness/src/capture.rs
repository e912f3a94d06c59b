//! Capture (spec.md §4.5): supervises an external packet-capture process
//! recording the tagged stream to a single pcap file, with a readiness
//! poll and a two-stage (graceful, then killed) termination race.

use crate::error::HarnessError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

/// The exact capture filter from spec.md §6: only the tagged TCP stream.
pub const CAPTURE_FILTER: &str = "tcp and tcp dst port 5000 and tcp src port 1234 and not icmp";

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const READY_POLL_TIMEOUT: Duration = Duration::from_secs(10);
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Supervises a `dumpcap` child process capturing every dataplane
/// interface to `pcap_path` under [`CAPTURE_FILTER`].
pub struct Capture {
    child: Child,
    pcap_path: PathBuf,
}

impl Capture {
    /// Spawn the capture process. Returns once spawned; callers must still
    /// call [`wait_ready`](Self::wait_ready) before the Sender may emit.
    pub fn spawn(interfaces: &[String], pcap_path: &Path) -> Result<Self, HarnessError> {
        let mut cmd = Command::new("dumpcap");
        for iface in interfaces {
            cmd.arg("-i").arg(iface);
        }
        cmd.arg("-f")
            .arg(CAPTURE_FILTER)
            .arg("-w")
            .arg(pcap_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| HarnessError::InfrastructureFault(format!("failed to start dumpcap: {e}")))?;

        Ok(Self {
            child,
            pcap_path: pcap_path.to_path_buf(),
        })
    }

    /// Poll for the pcap file's existence, up to 10 s (spec.md §4.5).
    pub async fn wait_ready(&self) -> Result<(), HarnessError> {
        let deadline = tokio::time::Instant::now() + READY_POLL_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            if self.pcap_path.exists() {
                return Ok(());
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
        Err(HarnessError::InfrastructureFault(
            "capture pcap file was never created".to_string(),
        ))
    }

    /// Ask the process to exit gracefully (SIGTERM); if it has not exited
    /// within 5 s, kill it outright.
    pub async fn terminate(mut self) -> Result<(), HarnessError> {
        if let Some(pid) = self.child.id() {
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }

        match tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, self.child.wait()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(HarnessError::InfrastructureFault(format!(
                "dumpcap exit wait failed: {e}"
            ))),
            Err(_) => {
                self.child.start_kill().map_err(|e| {
                    HarnessError::InfrastructureFault(format!("failed to kill dumpcap: {e}"))
                })?;
                self.child.wait().await.map_err(|e| {
                    HarnessError::InfrastructureFault(format!("dumpcap did not die: {e}"))
                })?;
                Ok(())
            }
        }
    }

    pub fn pcap_path(&self) -> &Path {
        &self.pcap_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_filter_matches_the_tagged_stream_ports() {
        assert!(CAPTURE_FILTER.contains("dst port 5000"));
        assert!(CAPTURE_FILTER.contains("src port 1234"));
        assert!(CAPTURE_FILTER.contains("not icmp"));
    }
}
