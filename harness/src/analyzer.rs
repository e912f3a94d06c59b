//! Disruption Analyzer (spec.md §4.7): turns a captured pcap into a
//! quantified dataplane outage — longest disruption, total disruption,
//! total lost packets, disruption start/end — by pairing sent and
//! received observations of the tagged sequence stream.

use crate::error::HarnessError;
use crate::packets::tagged::TaggedPacket;
use pnet::packet::ethernet::EthernetPacket;
use pnet::util::MacAddr;
use std::collections::BTreeMap;

/// A maximal run of consecutive sent sequence numbers that were not
/// received (spec.md §3 `Disruption`, §GLOSSARY).
#[derive(Debug, Clone, PartialEq)]
pub struct Gap {
    pub prev_delivered_seq: u64,
    pub lost_count: u64,
    pub duration_secs: f64,
    pub start_time: f64,
    pub end_time: f64,
}

/// The Analyzer's complete findings for one run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisResult {
    pub gaps: Vec<Gap>,
    /// Sequence numbers observed as duplicate sent/received copies beyond
    /// the first: kept for the human log, never double-counted.
    pub flood_debug: Vec<u64>,
    /// Sequence numbers in a candidate gap that were neither sent nor
    /// received at all: a test-infrastructure failure, not lost traffic.
    pub infra_anomalies: Vec<u64>,
    pub max_disrupt_time: f64,
    pub max_lost_id: u64,
    pub total_disrupt_packets: u64,
    pub total_disrupt_time: f64,
    pub disruption_start: Option<f64>,
    pub disruption_stop: Option<f64>,
    pub checked_successfully: bool,
    pub sent_counter: u64,
}

struct Observation {
    seq: u64,
    time: f64,
}

/// Run the full analysis over `pcap_path`. `sent_packet_count` is the
/// Sender's reported contiguous range `[0, sent_packet_count)`.
pub fn analyze(
    pcap_path: &std::path::Path,
    dut_mac: MacAddr,
    vlan_mac: Option<MacAddr>,
    sent_packet_count: u64,
    allowed_flooded_originals: u32,
    must_observe_loss: bool,
) -> Result<AnalysisResult, HarnessError> {
    let mut capture = pcap::Capture::from_file(pcap_path)?;

    let mut sent: BTreeMap<u64, f64> = BTreeMap::new();
    let mut received: Vec<Observation> = Vec::new();
    let mut flood_debug = Vec::new();
    let mut accepted_payloads: std::collections::HashSet<u64> = std::collections::HashSet::new();
    let mut sent_counter = 0u64;

    while let Ok(packet) = capture.next_packet() {
        let time = packet.header.ts.tv_sec as f64 + packet.header.ts.tv_usec as f64 / 1_000_000.0;
        let Some(tagged) = TaggedPacket::parse(packet.data) else {
            continue;
        };
        if tagged.seq >= sent_packet_count {
            continue;
        }

        let Some(eth) = EthernetPacket::new(packet.data) else {
            continue;
        };
        let is_sent_observation = eth.get_destination() == dut_mac
            || vlan_mac.map(|m| eth.get_destination() == m).unwrap_or(false);
        let is_received_observation =
            eth.get_source() == dut_mac || vlan_mac.map(|m| eth.get_source() == m).unwrap_or(false);

        if is_sent_observation {
            sent_counter += 1;
            sent.entry(tagged.seq).or_insert(time);
            continue;
        }

        if !is_received_observation {
            continue;
        }

        if !accepted_payloads.insert(tagged.seq) {
            flood_debug.push(tagged.seq);
            continue;
        }
        received.push(Observation {
            seq: tagged.seq,
            time,
        });
    }

    received.sort_by(|a, b| a.seq.cmp(&b.seq).then(a.time.partial_cmp(&b.time).unwrap()));

    let (gaps, infra_anomalies) = sweep_gaps(&sent, &received);

    let max_disrupt = gaps.iter().max_by(|a, b| {
        a.duration_secs
            .partial_cmp(&b.duration_secs)
            .unwrap()
    });
    let max_disrupt_time = max_disrupt.map(|g| g.duration_secs).unwrap_or(0.0);
    let max_lost_id = max_disrupt.map(|g| g.lost_count).unwrap_or(0);
    let total_disrupt_packets: u64 = gaps.iter().map(|g| g.lost_count).sum();
    let total_disrupt_time: f64 = gaps.iter().map(|g| g.duration_secs).sum();
    let disruption_start = gaps.first().map(|g| g.start_time);
    let disruption_stop = gaps.last().map(|g| g.end_time);

    let final_payload_ok = received.last().map(|o| o.seq) == sent_packet_count.checked_sub(1);
    let sent_counter_ok = sent_counter >= sent_packet_count;
    let flooding_ok =
        (sent_counter as i64 - accepted_payloads.len() as i64) <= allowed_flooded_originals as i64;
    let loss_required_ok = !must_observe_loss || !gaps.is_empty();

    let checked_successfully =
        final_payload_ok && sent_counter_ok && flooding_ok && loss_required_ok;

    Ok(AnalysisResult {
        gaps,
        flood_debug,
        infra_anomalies,
        max_disrupt_time,
        max_lost_id,
        total_disrupt_packets,
        total_disrupt_time,
        disruption_start,
        disruption_stop,
        checked_successfully,
        sent_counter,
    })
}

/// Sweep the sorted received stream against `sent`, building the gap list
/// and the infrastructure-anomaly list (spec.md §4.7 steps 3-4). Shared by
/// `analyze` and its tests so the anchor search can never diverge between
/// the two.
fn sweep_gaps(sent: &BTreeMap<u64, f64>, received: &[Observation]) -> (Vec<Gap>, Vec<u64>) {
    let mut gaps = Vec::new();
    let mut infra_anomalies = Vec::new();
    let mut prev = 0i64;

    for obs in received {
        let payload = obs.seq as i64;
        if payload - prev > 1 {
            if !sent.contains_key(&obs.seq) {
                prev = payload;
                continue;
            }
            let anchor = (prev + 1..payload)
                .find(|candidate| sent.contains_key(&(*candidate as u64)))
                .unwrap_or(prev);

            let anchor_time = if anchor == prev {
                sent.get(&(prev as u64)).copied().unwrap_or(obs.time)
            } else {
                sent[&(anchor as u64)]
            };
            let sent_time = sent[&obs.seq];
            let duration = sent_time - anchor_time;
            let lost_count = (payload - prev - 1) as u64;

            for candidate in (prev + 1)..payload {
                let candidate = candidate as u64;
                if !sent.contains_key(&candidate) && !received.iter().any(|r| r.seq == candidate) {
                    infra_anomalies.push(candidate);
                }
            }

            gaps.push(Gap {
                prev_delivered_seq: prev as u64,
                lost_count,
                duration_secs: duration,
                start_time: obs.time - duration,
                end_time: obs.time,
            });
        }
        prev = payload;
    }

    (gaps, infra_anomalies)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Exercises the sweep logic directly against synthetic sent/received
    /// maps, bypassing pcap I/O (scenarios S2/S3/S4 of spec.md §8).
    fn sweep(
        sent: &BTreeMap<u64, f64>,
        received_seqs: &[u64],
        interval: f64,
    ) -> (Vec<Gap>, Vec<u64>) {
        let received: Vec<Observation> = received_seqs
            .iter()
            .map(|&seq| Observation {
                seq,
                time: seq as f64 * interval,
            })
            .collect();
        sweep_gaps(sent, &received)
    }

    fn dense_sent_map(count: u64, interval: f64) -> BTreeMap<u64, f64> {
        (0..count).map(|s| (s, s as f64 * interval)).collect()
    }

    #[test]
    fn s2_single_contiguous_gap() {
        let sent = dense_sent_map(100, 0.010);
        let received: Vec<u64> = (0..100).filter(|s| !(40..50).contains(s)).collect();
        let (gaps, _) = sweep(&sent, &received, 0.010);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].lost_count, 10);
        assert!((gaps[0].duration_secs - 0.100).abs() < 0.02);
    }

    #[test]
    fn s3_two_disjoint_gaps() {
        let sent = dense_sent_map(100, 0.010);
        let received: Vec<u64> = (0..100)
            .filter(|s| !(20..23).contains(s) && !(60..66).contains(s))
            .collect();
        let (gaps, _) = sweep(&sent, &received, 0.010);
        assert_eq!(gaps.len(), 2);
        let total: u64 = gaps.iter().map(|g| g.lost_count).sum();
        assert_eq!(total, 9);
        assert_eq!(gaps.iter().map(|g| g.lost_count).max().unwrap(), 6);
    }

    #[test]
    fn s5_infra_anomaly_when_neither_sent_nor_received() {
        // seqs 50..60 were sent but the test host failed to either send
        // or capture 55 specifically on both sides.
        let mut sent = dense_sent_map(100, 0.010);
        sent.remove(&55);
        let received: Vec<u64> = (0..100).filter(|s| *s != 55).collect();
        let (_, infra) = sweep(&sent, &received, 0.010);
        assert_eq!(infra, vec![55]);
    }

    #[test]
    fn gap_discarded_when_payload_was_never_sent() {
        let sent = dense_sent_map(50, 0.010);
        // 80 received but never sent: must not be treated as a loss anchor.
        let received: Vec<u64> = vec![10, 20, 80];
        let (gaps, _) = sweep(&sent, &received, 0.010);
        assert!(gaps.is_empty() || gaps.iter().all(|g| g.prev_delivered_seq != 20));
    }
}
