use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level JSON report, serialized exactly as spec.md §6 names its keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub dataplane: DataplaneReport,
    pub controlplane: ControlplaneReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataplaneReport {
    pub checked_successfully: bool,
    /// Seconds, stringified to match the original test framework's report format.
    pub downtime: String,
    pub lost_packets: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlplaneReport {
    pub downtime: String,
    /// Reserved: the original leaves this as an informational placeholder.
    pub arp_ping: String,
    /// Peer IP -> largest observed LACPDU gap in seconds, or null if the
    /// peer never reported one.
    pub lacp_sessions: BTreeMap<String, Option<f64>>,
}

impl DataplaneReport {
    pub fn new(checked_successfully: bool, downtime_secs: f64, lost_packets: u64) -> Self {
        Self {
            checked_successfully,
            downtime: format!("{downtime_secs:.3}"),
            lost_packets: lost_packets.to_string(),
        }
    }
}

impl ControlplaneReport {
    pub fn new(downtime_secs: f64, lacp_sessions: BTreeMap<String, Option<f64>>) -> Self {
        Self {
            downtime: format!("{downtime_secs:.3}"),
            arp_ping: String::new(),
            lacp_sessions,
        }
    }
}
