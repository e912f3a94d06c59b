//! The Probe Engine (spec.md §4.2): sends probe bursts on chosen ingress
//! ports and counts matches of a masked expectation on a set of egress
//! ports, within a per-burst timeout. Also hosts the three-way
//! reachability classification shared by every observer.

use crate::error::HarnessError;
use crate::packets::{ExpectedMask, ProbePacket};
use pnet::datalink::{self, Channel, DataLinkReceiver, DataLinkSender, NetworkInterface};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Send a frame on a named interface and observe replies on a set of egress
/// interfaces. Abstracted so the classification logic can be unit tested
/// without opening real interfaces; [`DatalinkTransport`] is the only
/// production implementation.
pub trait PortTransport: Send + Sync {
    fn send(&self, interface: &str, frame: &[u8]) -> Result<(), HarnessError>;

    /// Install a BPF filter expression on `interface`'s receive side. The
    /// Sender uses this to keep Watcher-side queues empty while it holds
    /// the dataplane interlock (spec.md §4.4 step 1). A no-op by default;
    /// transports that can't filter at the kernel level should drop
    /// matching frames in `count_matching` instead.
    fn install_filter(&self, _interface: &str, _filter_expr: &str) -> Result<(), HarnessError> {
        Ok(())
    }

    /// Count frames matching `mask` arriving on any of `egress_ports` within
    /// `budget`. Blocking; callers run this via `spawn_blocking`.
    fn count_matching(
        &self,
        egress_ports: &[String],
        mask: &ExpectedMask,
        budget: Duration,
    ) -> Result<u32, HarnessError>;
}

/// Raw-Ethernet transport backed by `pnet`'s datalink channels, one per
/// interface, opened lazily and cached for reuse across probe bursts.
pub struct DatalinkTransport {
    channels: Mutex<HashMap<String, (Box<dyn DataLinkSender>, Box<dyn DataLinkReceiver>)>>,
}

impl Default for DatalinkTransport {
    fn default() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }
}

impl DatalinkTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_channel<R>(
        &self,
        interface: &str,
        f: impl FnOnce(&mut Box<dyn DataLinkSender>, &mut Box<dyn DataLinkReceiver>) -> R,
    ) -> Result<R, HarnessError> {
        let mut channels = self.channels.lock().expect("datalink channel map poisoned");
        if !channels.contains_key(interface) {
            let iface = find_interface(interface)?;
            let (tx, rx) = open_channel(&iface)?;
            channels.insert(interface.to_string(), (tx, rx));
        }
        let (tx, rx) = channels.get_mut(interface).expect("just inserted");
        Ok(f(tx, rx))
    }
}

fn find_interface(name: &str) -> Result<NetworkInterface, HarnessError> {
    datalink::interfaces()
        .into_iter()
        .find(|i| i.name == name)
        .ok_or_else(|| HarnessError::InfrastructureFault(format!("no such interface: {name}")))
}

fn open_channel(
    iface: &NetworkInterface,
) -> Result<(Box<dyn DataLinkSender>, Box<dyn DataLinkReceiver>), HarnessError> {
    match datalink::channel(iface, Default::default()) {
        Ok(Channel::Ethernet(tx, rx)) => Ok((tx, rx)),
        Ok(_) => Err(HarnessError::InfrastructureFault(format!(
            "unsupported datalink channel type on {}",
            iface.name
        ))),
        Err(e) => Err(HarnessError::InfrastructureFault(format!(
            "failed to open {}: {e}",
            iface.name
        ))),
    }
}

impl PortTransport for DatalinkTransport {
    fn send(&self, interface: &str, frame: &[u8]) -> Result<(), HarnessError> {
        self.with_channel(interface, |tx, _rx| tx.send_to(frame, None))?
            .ok_or_else(|| HarnessError::InfrastructureFault(format!("send queue full on {interface}")))?
            .map_err(|e| HarnessError::InfrastructureFault(format!("send failed on {interface}: {e}")))
    }

    fn count_matching(
        &self,
        egress_ports: &[String],
        mask: &ExpectedMask,
        budget: Duration,
    ) -> Result<u32, HarnessError> {
        let deadline = Instant::now() + budget;
        let mut count = 0u32;
        while Instant::now() < deadline {
            for port in egress_ports {
                let frame = self.with_channel(port, |_tx, rx| rx.next().map(<[u8]>::to_vec));
                if let Ok(Ok(bytes)) = frame {
                    if mask.matches(&bytes) {
                        count += 1;
                    }
                }
            }
        }
        Ok(count)
    }
}

/// Owns an `Arc<dyn PortTransport>` so a probe's send-then-count round trip
/// (spec.md §4.2's `send_and_count()` contract) runs entirely inside one
/// `spawn_blocking` hop: emit every packet with no inter-packet delay, then
/// count matching replies on `egress_ports` within `timeout`.
pub struct ProbeRunner {
    transport: std::sync::Arc<dyn PortTransport>,
}

impl ProbeRunner {
    pub fn new(transport: std::sync::Arc<dyn PortTransport>) -> Self {
        Self { transport }
    }

    pub async fn send_and_count(
        &self,
        sends: Vec<ProbePacket>,
        mask: ExpectedMask,
        egress_ports: Vec<String>,
        timeout: Duration,
    ) -> Result<u32, HarnessError> {
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || {
            for packet in &sends {
                transport.send(&packet.ingress_interface, &packet.bytes)?;
            }
            transport.count_matching(&egress_ports, &mask, timeout)
        })
        .await
        .map_err(|e| HarnessError::InfrastructureFault(format!("probe task failed: {e}")))?
    }
}

/// Result of the three-way `{up, partial, down}` classification (spec.md
/// §4.2). `flooding` is reported separately; it never produces a fourth
/// label, only the `LabeledState` flooding flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    reachable: bool,
    partial: bool,
    flooding: bool,
}

impl Classification {
    pub fn label(&self) -> &'static str {
        if !self.reachable {
            "down"
        } else if self.partial {
            "partial"
        } else {
            "up"
        }
    }

    pub fn is_flooding(&self) -> bool {
        self.flooding
    }
}

/// Classify a two-dimensional probe (dataplane, control plane, vlan
/// gateway): reachable if both directions received > 70% of their
/// expected count; partial if reachable and either direction under 100%;
/// flooding if reachable and either direction over 100%.
pub fn classify_three_way(dim1: u64, dim2: u64, cap1: u64, cap2: u64) -> Classification {
    let reachable = over_threshold(dim1, cap1) && over_threshold(dim2, cap2);
    let partial = reachable && (dim1 < cap1 || dim2 < cap2);
    let flooding = reachable && (dim1 > cap1 || dim2 > cap2);
    Classification {
        reachable,
        partial,
        flooding,
    }
}

fn over_threshold(count: u64, cap: u64) -> bool {
    (count as f64) > (cap as f64) * 0.7
}

/// VLAN ARP classification: reachable iff at least one reply was seen.
/// Never partial or flooding.
pub fn classify_presence(reply_count: u64) -> Classification {
    Classification {
        reachable: reply_count >= 1,
        partial: false,
        flooding: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct FakeTransport {
        sent: Mutex<Vec<(String, Vec<u8>)>>,
        reply_count: AtomicU32,
    }

    impl PortTransport for FakeTransport {
        fn send(&self, interface: &str, frame: &[u8]) -> Result<(), HarnessError> {
            self.sent
                .lock()
                .unwrap()
                .push((interface.to_string(), frame.to_vec()));
            Ok(())
        }

        fn count_matching(
            &self,
            _egress_ports: &[String],
            _mask: &ExpectedMask,
            _budget: Duration,
        ) -> Result<u32, HarnessError> {
            Ok(self.reply_count.load(Ordering::SeqCst))
        }
    }

    #[tokio::test]
    async fn send_and_count_sends_every_packet_then_returns_the_count() {
        let transport = Arc::new(FakeTransport {
            sent: Mutex::new(Vec::new()),
            reply_count: AtomicU32::new(7),
        });
        let runner = ProbeRunner::new(transport.clone());
        let sends = vec![
            ProbePacket {
                ingress_interface: "eth1".to_string(),
                bytes: vec![1, 2, 3],
            },
            ProbePacket {
                ingress_interface: "eth2".to_string(),
                bytes: vec![4, 5, 6],
            },
        ];
        let mask = ExpectedMask::new(vec![0u8; 14], vec![]);

        let count = runner
            .send_and_count(sends, mask, vec!["eth1".to_string()], Duration::from_millis(10))
            .await
            .unwrap();

        assert_eq!(count, 7);
        assert_eq!(transport.sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn fully_reachable_is_up() {
        let c = classify_three_way(10, 10, 10, 10);
        assert_eq!(c.label(), "up");
        assert!(!c.is_flooding());
    }

    #[test]
    fn zero_replies_is_down() {
        let c = classify_three_way(0, 0, 10, 10);
        assert_eq!(c.label(), "down");
    }

    #[test]
    fn under_cap_in_one_direction_is_partial() {
        let c = classify_three_way(8, 10, 10, 10);
        assert_eq!(c.label(), "partial");
    }

    #[test]
    fn over_cap_in_one_direction_is_up_but_flooding() {
        let c = classify_three_way(15, 10, 10, 10);
        assert_eq!(c.label(), "up");
        assert!(c.is_flooding());
    }

    #[test]
    fn exactly_at_seventy_percent_is_not_reachable() {
        let c = classify_three_way(7, 7, 10, 10);
        assert_eq!(c.label(), "down");
    }

    #[test]
    fn arp_presence_needs_only_one_reply() {
        assert_eq!(classify_presence(0).label(), "down");
        assert_eq!(classify_presence(1).label(), "up");
    }
}
