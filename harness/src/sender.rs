//! Sender (spec.md §4.4): emits a mixed T1<->vlan tagged stream at a fixed
//! interval once Capture signals readiness, holding the dataplane interlock
//! for its entire run.

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::interlock::DataplaneInterlock;
use crate::packets::host_address::{pattern_mac, LAG_BASE_MAC_PATTERN};
use crate::packets::tagged::TaggedPacket;
use crate::packets::ProbeSetup;
use crate::remote::RemoteControl;
use common::Direction;
use pnet::util::MacAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Outcome of a completed Sender run: the contiguous sequence range it
/// emitted, consumed by the Analyzer as `sent_packet_count`.
#[derive(Debug, Clone, Copy)]
pub struct SenderSummary {
    pub sent_packet_count: u64,
}

/// Emits the tagged stream. Sequence numbers are contiguous `0..final-1`;
/// direction alternates deterministically by `seq % 5 == 0`.
pub struct Sender {
    stop: AtomicBool,
    seq: AtomicU64,
}

impl Default for Sender {
    fn default() -> Self {
        Self {
            stop: AtomicBool::new(false),
            seq: AtomicU64::new(0),
        }
    }
}

impl Sender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the loop to stop after its current iteration.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Sequence numbers emitted so far; used when a caller needs the count
    /// without waiting for `run` to return (e.g. a capture ceiling firing
    /// before the loop notices `should_stop`).
    pub fn sent_count(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Runs until told to stop explicitly (`request_stop`), or — for
    /// warm/fast reboot, where the reboot is already underway by the time
    /// the Sender starts — once `remote`'s finalizer reaches `inactive`
    /// (spec.md §4.4 stop condition).
    pub async fn run(
        &self,
        cfg: &HarnessConfig,
        probes: &ProbeSetup,
        interlock: &DataplaneInterlock,
        transport: &dyn crate::probe_engine::PortTransport,
        remote: &dyn RemoteControl,
    ) -> Result<SenderSummary, HarnessError> {
        let _guard = interlock.acquire().await;
        let interval = Duration::from_secs_f64(cfg.send_interval_ms / 1000.0);
        let t1_src_mac = pattern_mac(LAG_BASE_MAC_PATTERN, 0).unwrap_or(MacAddr::zero());
        let finalizer_gated = cfg.reboot_type.gates_sender_stop_on_finalizer();
        let finalizer_poll_interval = Duration::from_secs_f64(cfg.watcher_tick_secs);
        let mut last_finalizer_poll = Instant::now();

        for port in &cfg.dataplane_ports {
            let filter = format!(
                "not (arp and ether src {} and ether dst ff:ff:ff:ff:ff:ff) and not tcp",
                cfg.dut_mac
            );
            transport.install_filter(&port.interface, &filter)?;
        }

        loop {
            if self.should_stop() {
                break;
            }
            if finalizer_gated && last_finalizer_poll.elapsed() >= finalizer_poll_interval {
                last_finalizer_poll = Instant::now();
                if remote.finalizer_is_inactive().await? {
                    break;
                }
            }
            let seq = self.seq.fetch_add(1, Ordering::SeqCst);
            let direction = Direction::of_seq(seq);
            let packet = TaggedPacket::new(seq);

            let frame = match direction {
                Direction::UpstreamToServer => packet.build_frame(
                    t1_src_mac,
                    cfg.dut_mac,
                    probes.from_server_dst_addr,
                    probes.hosts[0].ipv4,
                ),
                Direction::ServerToUpstream => packet.build_frame(
                    probes.hosts[0].mac,
                    cfg.vlan_mac.unwrap_or(cfg.dut_mac),
                    probes.hosts[0].ipv4,
                    probes.from_server_dst_addr,
                ),
            };
            let ingress = match direction {
                Direction::UpstreamToServer => probes
                    .t1_interfaces
                    .first()
                    .cloned()
                    .unwrap_or_else(|| probes.hosts[0].interface.clone()),
                Direction::ServerToUpstream => probes.hosts[0].interface.clone(),
            };
            transport.send(&ingress, &frame)?;

            tokio::time::sleep(interval).await;
        }

        // Let in-flight packets be captured before signalling Capture to stop.
        tokio::time::sleep(Duration::from_secs(1)).await;

        Ok(SenderSummary {
            sent_packet_count: self.seq.load(Ordering::SeqCst),
        })
    }
}
