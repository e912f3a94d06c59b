use std::net::IpAddr;

/// A single neighbor peer's LACP session health over the measurement
/// window, grounded on `original_source`'s per-peer LACPDU gap tracking.
/// Feeds directly into `ControlplaneReport::lacp_sessions`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborLacpReport {
    pub peer_ip: IpAddr,
    /// `None` means the peer never reported a gap (session stable).
    pub max_lacpdu_gap_secs: Option<f64>,
}

impl NeighborLacpReport {
    /// Whether this peer's gap exceeds the configured device-fault
    /// threshold (default 150s, `lacp_session_gap_fault_secs`).
    pub fn is_fault(&self, threshold_secs: f64) -> bool {
        self.max_lacpdu_gap_secs
            .map(|gap| gap >= threshold_secs)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_gap_at_or_above_threshold_is_a_fault() {
        let report = NeighborLacpReport {
            peer_ip: "10.0.0.1".parse().unwrap(),
            max_lacpdu_gap_secs: Some(150.0),
        };
        assert!(report.is_fault(150.0));
    }

    #[test]
    fn no_observed_gap_is_never_a_fault() {
        let report = NeighborLacpReport {
            peer_ip: "10.0.0.1".parse().unwrap(),
            max_lacpdu_gap_secs: None,
        };
        assert!(!report.is_fault(150.0));
    }
}
