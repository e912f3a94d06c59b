//! Reachability Watcher (spec.md §4.3): a loop that drives the four
//! reachability state machines while `enabled`, contending with the Sender
//! only on the dataplane interlock.

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::interlock::DataplaneInterlock;
use crate::packets::ProbeSetup;
use crate::probe_engine::{classify_presence, classify_three_way, ProbeRunner};
use crate::state_machine::LabeledState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// The four state machines the Watcher drives, shared with the Coordinator.
pub struct ObserverStates {
    pub dataplane: LabeledState,
    pub control_plane: LabeledState,
    pub vlan_arp: LabeledState,
    pub vlan_gateway: LabeledState,
}

impl Default for ObserverStates {
    fn default() -> Self {
        Self {
            dataplane: LabeledState::new(),
            control_plane: LabeledState::new(),
            vlan_arp: LabeledState::new(),
            vlan_gateway: LabeledState::new(),
        }
    }
}

/// A loop that runs while `enabled` is set, driving the four observer
/// state machines once per tick.
pub struct Watcher {
    enabled: AtomicBool,
    stopped: Notify,
    running: Notify,
}

impl Default for Watcher {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            stopped: Notify::new(),
            running: Notify::new(),
        }
    }
}

impl Watcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the loop to exit after its current iteration.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Resolves once the loop has observed `disable()` and exited.
    pub async fn wait_stopped(&self) {
        self.stopped.notified().await;
    }

    /// Resolves once the loop has started its first iteration.
    pub async fn wait_running(&self) {
        self.running.notified().await;
    }

    /// Drive the state machines until disabled. `probes` supplies the
    /// byte-exact packets for each probe class; `runner` performs the
    /// send-and-count round trip; `interlock` mediates with the Sender.
    pub async fn run(
        &self,
        cfg: &HarnessConfig,
        probes: &ProbeSetup,
        states: &ObserverStates,
        runner: &ProbeRunner,
        interlock: &DataplaneInterlock,
    ) -> Result<(), HarnessError> {
        self.running.notify_waiters();
        let tick = Duration::from_secs_f64(cfg.watcher_tick_secs);

        while self.is_enabled() {
            if let Some(guard) = interlock.try_acquire() {
                self.run_dataplane_probe(cfg, probes, &states.dataplane, runner)
                    .await?;
                drop(guard);
            }

            self.run_control_plane_probe(cfg, probes, &states.control_plane, runner)
                .await?;
            self.run_vlan_arp_probe(probes, &states.vlan_arp, runner).await?;
            self.run_vlan_gateway_probe(cfg, probes, &states.vlan_gateway, runner)
                .await?;

            tokio::time::sleep(tick).await;
        }

        self.stopped.notify_waiters();
        Ok(())
    }

    async fn run_dataplane_probe(
        &self,
        cfg: &HarnessConfig,
        probes: &ProbeSetup,
        state: &LabeledState,
        runner: &ProbeRunner,
    ) -> Result<(), HarnessError> {
        let t1_to_vlan = runner
            .send_and_count(
                probes.upstream_to_server.clone(),
                probes.upstream_to_server_mask.clone(),
                probes.hosts.iter().map(|h| h.interface.clone()).collect(),
                Duration::from_secs(2),
            )
            .await? as u64;

        let vlan_to_t1 = runner
            .send_and_count(
                probes.server_to_upstream.clone(),
                probes.server_to_upstream_mask.clone(),
                probes.t1_interfaces.clone(),
                Duration::from_secs(2),
            )
            .await? as u64;

        let classification = classify_three_way(
            t1_to_vlan,
            vlan_to_t1,
            probes.hosts.len() as u64,
            cfg.nr_pc_pkts as u64,
        );
        state.set(classification.label());
        state.set_flooding(classification.is_flooding());
        Ok(())
    }

    async fn run_control_plane_probe(
        &self,
        cfg: &HarnessConfig,
        probes: &ProbeSetup,
        state: &LabeledState,
        runner: &ProbeRunner,
    ) -> Result<(), HarnessError> {
        let egress: Vec<String> = probes.hosts.iter().map(|h| h.interface.clone()).collect();
        let replies = runner
            .send_and_count(
                probes.ping_dut.clone(),
                probes.ping_dut_mask.clone(),
                egress,
                Duration::from_secs(2),
            )
            .await? as u64;
        let classification =
            classify_three_way(replies, replies, cfg.ping_dut_pkts as u64, cfg.ping_dut_pkts as u64);
        state.set(classification.label());
        state.set_flooding(classification.is_flooding());
        Ok(())
    }

    async fn run_vlan_arp_probe(
        &self,
        probes: &ProbeSetup,
        state: &LabeledState,
        runner: &ProbeRunner,
    ) -> Result<(), HarnessError> {
        let replies = runner
            .send_and_count(
                vec![probes.vlan_arp.clone()],
                probes.vlan_arp_mask.clone(),
                vec![probes.vlan_arp_src_interface.clone()],
                Duration::from_secs(1),
            )
            .await? as u64;
        state.set(classify_presence(replies).label());
        Ok(())
    }

    async fn run_vlan_gateway_probe(
        &self,
        cfg: &HarnessConfig,
        probes: &ProbeSetup,
        state: &LabeledState,
        runner: &ProbeRunner,
    ) -> Result<(), HarnessError> {
        let egress: Vec<String> = probes.hosts.iter().map(|h| h.interface.clone()).collect();
        let replies = runner
            .send_and_count(
                probes.vlan_gateway.clone(),
                probes.vlan_gateway_mask.clone(),
                egress,
                Duration::from_secs(2),
            )
            .await? as u64;
        let classification = classify_three_way(
            replies,
            replies,
            cfg.arp_vlan_gw_ping_pkts as u64,
            cfg.arp_vlan_gw_ping_pkts as u64,
        );
        state.set(classification.label());
        state.set_flooding(classification.is_flooding());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disable_causes_wait_stopped_to_resolve() {
        let watcher = Arc::new(Watcher::new());
        let w2 = watcher.clone();
        let handle = tokio::spawn(async move {
            w2.running.notify_waiters();
            while w2.is_enabled() {
                tokio::task::yield_now().await;
            }
            w2.stopped.notify_waiters();
        });

        watcher.wait_running().await;
        watcher.disable();
        watcher.wait_stopped().await;
        handle.await.unwrap();
    }
}
