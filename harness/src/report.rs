//! Reporter (spec.md §4.8 / SPEC_FULL.md §4.8): renders the Analyzer's and
//! Coordinator's findings into the exact JSON report and a plain-text human
//! log, written to the `/tmp/<reboot_type>[-<suffix>]` paths.

use crate::analyzer::AnalysisResult;
use crate::error::{FaultRecord, HarnessError};
use common::{ControlplaneReport, DataplaneReport, NeighborLacpReport, Report};
use std::collections::BTreeMap;
use std::path::Path;

/// Build the structured [`Report`] from the analysis and control-plane
/// timing, ready to serialize to the report JSON path.
pub fn build_report(
    analysis: &AnalysisResult,
    control_plane_downtime_secs: f64,
    neighbor_reports: &[NeighborLacpReport],
) -> Report {
    let mut lacp_sessions: BTreeMap<String, Option<f64>> = BTreeMap::new();
    for n in neighbor_reports {
        lacp_sessions.insert(n.peer_ip.to_string(), n.max_lacpdu_gap_secs);
    }

    Report {
        dataplane: DataplaneReport::new(
            analysis.checked_successfully,
            analysis.total_disrupt_time,
            analysis.total_disrupt_packets,
        ),
        controlplane: ControlplaneReport::new(control_plane_downtime_secs, lacp_sessions),
    }
}

/// Write the JSON report to `report_path`.
pub fn write_report_json(report: &Report, report_path: &Path) -> Result<(), HarnessError> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(report_path, json)?;
    Ok(())
}

/// Render and write the human-readable log alongside the JSON report —
/// a harness deliverable, not a `tracing` log stream, so it is built as
/// plain text independent of the tracing subscriber's output.
pub fn write_human_log(
    log_path: &Path,
    report: &Report,
    analysis: &AnalysisResult,
    faults: &[FaultRecord],
) -> Result<(), HarnessError> {
    let mut lines = Vec::new();
    lines.push(format!(
        "dataplane: checked_successfully={} downtime={}s lost_packets={}",
        report.dataplane.checked_successfully, report.dataplane.downtime, report.dataplane.lost_packets
    ));
    lines.push(format!(
        "controlplane: downtime={}s lacp_sessions={}",
        report.controlplane.downtime,
        report.controlplane.lacp_sessions.len()
    ));
    lines.push(format!("disruptions observed: {}", analysis.gaps.len()));
    for gap in &analysis.gaps {
        lines.push(format!(
            "  gap after seq {}: lost={} duration={:.3}s [{:.3}, {:.3}]",
            gap.prev_delivered_seq, gap.lost_count, gap.duration_secs, gap.start_time, gap.end_time
        ));
    }
    if !analysis.infra_anomalies.is_empty() {
        lines.push(format!(
            "infrastructure anomalies (neither sent nor received): {:?}",
            analysis.infra_anomalies
        ));
    }
    if !analysis.flood_debug.is_empty() {
        lines.push(format!(
            "flood-suppressed duplicate sequence numbers: {}",
            analysis.flood_debug.len()
        ));
    }
    if !report.dataplane.checked_successfully {
        lines.push("Unable to calculate the dataplane traffic loss time".to_string());
    }
    for fault in faults {
        lines.push(format!("{:?}: {}", fault.category, fault.message));
    }

    std::fs::write(log_path, lines.join("\n") + "\n")?;
    Ok(())
}
