//! External collaborator seams (spec.md §1 "deliberately out of scope"):
//! the remote shell used to invoke reboot/query device state, and the
//! neighbor-device handlers collecting BGP/LACP telemetry. The core
//! depends only on these traits, never on a concrete SSH/NETCONF stack.

use async_trait::async_trait;
use common::NeighborLacpReport;
use std::net::IpAddr;

/// Invokes reboot and queries post-boot device state over whatever remote
/// channel the deployment uses (SSH in the original; out of scope here).
#[async_trait]
pub trait RemoteControl: Send + Sync {
    /// Dispatch the reboot command; returns once the command has been
    /// accepted, not once the device has rebooted.
    async fn trigger_reboot(&self) -> Result<(), crate::error::HarnessError>;

    /// Poll the post-boot finalizer service's state (e.g. `activating`,
    /// `inactive`). Used by the Sender's stop condition for warm/fast
    /// reboot.
    async fn finalizer_state(&self) -> Result<String, crate::error::HarnessError>;

    /// True once the finalizer has reached its terminal `inactive` state.
    async fn finalizer_is_inactive(&self) -> Result<bool, crate::error::HarnessError> {
        Ok(self.finalizer_state().await? == "inactive")
    }
}

/// Collects per-peer LACP/BGP telemetry from simulated neighbor devices
/// over the measurement window.
#[async_trait]
pub trait NeighborCollector: Send + Sync {
    /// The configured neighbor peer IPs this collector watches.
    fn peers(&self) -> Vec<IpAddr>;

    /// The largest LACPDU gap observed for each peer since collection
    /// started, or `None` if that peer never reported a gap.
    async fn lacp_reports(&self) -> Result<Vec<NeighborLacpReport>, crate::error::HarnessError>;
}

/// Invokes the reboot and polls the finalizer state via a configurable
/// shell command, run with `sh -c`. An empty command string means that
/// side of the trait is driven externally: `trigger_reboot` becomes a
/// no-op and `finalizer_state` reports `inactive` immediately.
pub struct ShellRemoteControl {
    reboot_command: String,
    finalizer_state_command: String,
}

impl ShellRemoteControl {
    pub fn new(reboot_command: String, finalizer_state_command: String) -> Self {
        Self {
            reboot_command,
            finalizer_state_command,
        }
    }

    async fn run_shell(command: &str) -> Result<std::process::Output, crate::error::HarnessError> {
        tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|e| {
                crate::error::HarnessError::InfrastructureFault(format!(
                    "shell command failed to start: {e}"
                ))
            })
    }
}

#[async_trait]
impl RemoteControl for ShellRemoteControl {
    async fn trigger_reboot(&self) -> Result<(), crate::error::HarnessError> {
        if self.reboot_command.is_empty() {
            return Ok(());
        }
        let output = Self::run_shell(&self.reboot_command).await?;
        if !output.status.success() {
            return Err(crate::error::HarnessError::InfrastructureFault(format!(
                "reboot_command exited with {}",
                output.status
            )));
        }
        Ok(())
    }

    async fn finalizer_state(&self) -> Result<String, crate::error::HarnessError> {
        if self.finalizer_state_command.is_empty() {
            return Ok("inactive".to_string());
        }
        let output = Self::run_shell(&self.finalizer_state_command).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Stands in for the neighbor BGP/LACP handlers (deliberately out of
/// scope): reports every configured peer as never having gapped.
pub struct NullNeighborCollector {
    peers: Vec<IpAddr>,
}

impl NullNeighborCollector {
    pub fn new(peers: Vec<IpAddr>) -> Self {
        Self { peers }
    }
}

#[async_trait]
impl NeighborCollector for NullNeighborCollector {
    fn peers(&self) -> Vec<IpAddr> {
        self.peers.clone()
    }

    async fn lacp_reports(&self) -> Result<Vec<NeighborLacpReport>, crate::error::HarnessError> {
        Ok(self
            .peers
            .iter()
            .map(|&peer_ip| NeighborLacpReport {
                peer_ip,
                max_lacpdu_gap_secs: None,
            })
            .collect())
    }
}

#[cfg(test)]
pub mod fakes {
    use super::*;
    use std::sync::Mutex;

    /// A scripted [`RemoteControl`] for coordinator tests: replays a fixed
    /// finalizer-state sequence, one value per call.
    pub struct ScriptedRemoteControl {
        states: Mutex<Vec<String>>,
    }

    impl ScriptedRemoteControl {
        pub fn new(states: Vec<&str>) -> Self {
            Self {
                states: Mutex::new(states.into_iter().map(str::to_string).rev().collect()),
            }
        }
    }

    #[async_trait]
    impl RemoteControl for ScriptedRemoteControl {
        async fn trigger_reboot(&self) -> Result<(), crate::error::HarnessError> {
            Ok(())
        }

        async fn finalizer_state(&self) -> Result<String, crate::error::HarnessError> {
            let mut states = self.states.lock().unwrap();
            Ok(states.pop().unwrap_or_else(|| "inactive".to_string()))
        }
    }

    pub struct EmptyNeighborCollector;

    #[async_trait]
    impl NeighborCollector for EmptyNeighborCollector {
        fn peers(&self) -> Vec<IpAddr> {
            Vec::new()
        }

        async fn lacp_reports(&self) -> Result<Vec<NeighborLacpReport>, crate::error::HarnessError> {
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;

    #[tokio::test]
    async fn scripted_remote_control_replays_states_in_order() {
        let remote = ScriptedRemoteControl::new(vec!["activating", "inactive"]);
        assert_eq!(remote.finalizer_state().await.unwrap(), "activating");
        assert!(!remote.finalizer_is_inactive().await.unwrap());
        assert_eq!(remote.finalizer_state().await.unwrap(), "inactive");
        assert!(remote.finalizer_is_inactive().await.unwrap());
    }

    #[tokio::test]
    async fn shell_remote_control_with_empty_commands_is_inactive_immediately() {
        let remote = ShellRemoteControl::new(String::new(), String::new());
        remote.trigger_reboot().await.unwrap();
        assert!(remote.finalizer_is_inactive().await.unwrap());
    }

    #[tokio::test]
    async fn shell_remote_control_runs_finalizer_state_command() {
        let remote = ShellRemoteControl::new(String::new(), "echo activating".to_string());
        assert_eq!(remote.finalizer_state().await.unwrap(), "activating");
    }

    #[tokio::test]
    async fn null_neighbor_collector_reports_no_gap_for_each_peer() {
        let peer: IpAddr = "10.0.0.1".parse().unwrap();
        let collector = NullNeighborCollector::new(vec![peer]);
        let reports = collector.lacp_reports().await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].peer_ip, peer);
        assert!(reports[0].max_lacpdu_gap_secs.is_none());
    }
}
