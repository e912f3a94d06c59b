//! Reboot Coordinator (spec.md §4.6): drives the nine-step reboot sequence
//! and the core's top-level state machine, the only component that holds
//! handles to all four observers, the Sender, Capture, and the interlock.

use crate::analyzer::{self, AnalysisResult};
use crate::capture::Capture;
use crate::config::HarnessConfig;
use crate::error::{FaultCategory, FaultRecord, HarnessError};
use crate::interlock::DataplaneInterlock;
use crate::packets::ProbeSetup;
use crate::probe_engine::{PortTransport, ProbeRunner};
use crate::remote::{NeighborCollector, RemoteControl};
use crate::report::{self, build_report};
use crate::sender::{Sender, SenderSummary};
use crate::state_machine::LabeledState;
use crate::timeout_util::run_with_timeout;
use crate::watcher::{ObserverStates, Watcher};
use common::Report;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The core's top-level state machine (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreState {
    Init,
    WarmingUp,
    Armed,
    Rebooting,
    Measuring,
    Analyzing,
    Reported,
    Fail,
}

/// Accumulates device/infrastructure faults without aborting the run;
/// configuration faults never reach here, they abort during setup.
#[derive(Default)]
pub struct FaultSet {
    records: Vec<FaultRecord>,
}

impl FaultSet {
    pub fn push(&mut self, record: FaultRecord) {
        self.records.push(record);
    }

    pub fn has_device_faults(&self) -> bool {
        self.records.iter().any(|f| f.category == FaultCategory::Device)
    }

    pub fn records(&self) -> &[FaultRecord] {
        &self.records
    }
}

/// The outcome of a full coordinator run: the written report plus the
/// exit status policy of spec.md §6 ("nonzero on any deadline breach or
/// infrastructure anomaly").
pub struct RunOutcome {
    pub report: Report,
    pub faults: Vec<FaultRecord>,
    pub success: bool,
}

pub struct RebootCoordinator {
    cfg: Arc<HarnessConfig>,
    probes: Arc<ProbeSetup>,
    states: Arc<ObserverStates>,
    watcher: Arc<Watcher>,
    sender: Arc<Sender>,
    interlock: Arc<DataplaneInterlock>,
    transport: Arc<dyn PortTransport>,
    remote: Arc<dyn RemoteControl>,
    neighbors: Arc<dyn NeighborCollector>,
    faults: FaultSet,
    state: CoreState,
}

impl RebootCoordinator {
    pub fn new(
        cfg: HarnessConfig,
        probes: ProbeSetup,
        transport: Arc<dyn PortTransport>,
        remote: Arc<dyn RemoteControl>,
        neighbors: Arc<dyn NeighborCollector>,
    ) -> Self {
        Self {
            cfg: Arc::new(cfg),
            probes: Arc::new(probes),
            states: Arc::new(ObserverStates::default()),
            watcher: Arc::new(Watcher::new()),
            sender: Arc::new(Sender::new()),
            interlock: Arc::new(DataplaneInterlock::new()),
            transport,
            remote,
            neighbors,
            faults: FaultSet::default(),
            state: CoreState::Init,
        }
    }

    fn transition(&mut self, next: CoreState) {
        tracing::info!(from = ?self.state, to = ?next, "coordinator state transition");
        self.state = next;
    }

    /// Run the full nine-step sequence and produce the final report.
    pub async fn run(mut self) -> Result<RunOutcome, HarnessError> {
        self.transition(CoreState::WarmingUp);

        let watcher_task = {
            let watcher = self.watcher.clone();
            let cfg = self.cfg.clone();
            let probes = self.probes.clone();
            let states = self.states.clone();
            let interlock = self.interlock.clone();
            let transport = self.transport.clone();
            tokio::spawn(async move {
                let runner = ProbeRunner::new(transport);
                watcher.run(&cfg, &probes, &states, &runner, &interlock).await
            })
        };
        self.watcher.wait_running().await;

        if let Err(e) = run_with_timeout(
            self.warm_up_loop(),
            self.cfg.warm_up_timeout_secs,
            "warm_up",
        )
        .await
        {
            self.transition(CoreState::Fail);
            self.watcher.disable();
            let _ = watcher_task.await;
            return Err(e);
        }

        self.transition(CoreState::Armed);
        self.remote.trigger_reboot().await?;

        self.transition(CoreState::Rebooting);
        let reboot_start = Instant::now();
        run_with_timeout(
            wait_for_label(&self.states.control_plane, "down", self.cfg.watcher_tick_secs),
            self.cfg.control_plane_down_timeout,
            "control_plane_down",
        )
        .await??;

        self.transition(CoreState::Measuring);

        let capture = Capture::spawn(
            &self
                .cfg
                .dataplane_ports
                .iter()
                .map(|p| p.interface.clone())
                .collect::<Vec<_>>(),
            &self.cfg.capture_pcap_path(),
        )?;
        capture.wait_ready().await?;
        let capture_deadline = tokio::time::Instant::now()
            + Duration::from_secs(self.cfg.time_to_listen_secs + self.cfg.sniff_time_incr_secs);

        let sender_task = {
            let sender = self.sender.clone();
            let cfg = self.cfg.clone();
            let probes = self.probes.clone();
            let interlock = self.interlock.clone();
            let transport = self.transport.clone();
            let remote = self.remote.clone();
            tokio::spawn(async move {
                sender
                    .run(&cfg, &probes, &interlock, transport.as_ref(), remote.as_ref())
                    .await
            })
        };

        run_with_timeout(
            wait_for_label(&self.states.control_plane, "up", self.cfg.watcher_tick_secs),
            self.cfg.task_timeout,
            "control_plane_up",
        )
        .await??;
        let control_plane_up_at = Instant::now();
        self.sender.request_stop();

        // Capture stops on whichever comes first: the Sender finishing its
        // post-stop-request drain, or the wall-clock ceiling (spec.md §4.5).
        let sender_summary = tokio::select! {
            res = sender_task => {
                res.map_err(|e| HarnessError::InfrastructureFault(format!("sender task failed: {e}")))??
            }
            _ = tokio::time::sleep_until(capture_deadline) => {
                self.faults.push(FaultRecord::infrastructure(format!(
                    "capture ceiling of {}s elapsed before the sender signalled completion",
                    self.cfg.time_to_listen_secs + self.cfg.sniff_time_incr_secs
                )));
                SenderSummary {
                    sent_packet_count: self.sender.sent_count(),
                }
            }
        };

        capture.terminate().await?;

        self.transition(CoreState::Analyzing);
        self.watcher.disable();
        let _ = watcher_task.await;

        let analysis = analyzer::analyze(
            &self.cfg.capture_pcap_path(),
            self.cfg.dut_mac,
            self.cfg.vlan_mac,
            sender_summary.sent_packet_count,
            self.cfg.allowed_flooded_originals,
            self.cfg.reboot_type.must_observe_loss(),
        )?;

        self.evaluate_deadlines(reboot_start, control_plane_up_at, &analysis);

        let control_plane_downtime = control_plane_up_at.duration_since(reboot_start).as_secs_f64();
        let neighbor_reports = self.neighbors.lacp_reports().await?;
        for n in &neighbor_reports {
            if n.is_fault(self.cfg.lacp_session_gap_fault_secs) {
                self.faults.push(FaultRecord::device(format!(
                    "LACP session to {} exceeded gap threshold",
                    n.peer_ip
                )));
            }
        }

        let report = build_report(&analysis, control_plane_downtime, &neighbor_reports);
        report::write_report_json(&report, &self.cfg.report_path())?;
        report::write_human_log(
            &self.cfg.log_path(),
            &report,
            &analysis,
            self.faults.records(),
        )?;

        self.transition(CoreState::Reported);

        let success = analysis.checked_successfully && !self.faults.has_device_faults();
        Ok(RunOutcome {
            report,
            faults: self.faults.records().to_vec(),
            success,
        })
    }

    /// Wait until both the dataplane and control-plane observers have held
    /// the `up` label continuously for `dut_stabilize_secs` (spec.md §4.6
    /// step 1).
    async fn warm_up_loop(&self) -> Result<(), HarnessError> {
        loop {
            let dataplane_up = self.states.dataplane.get() == "up" && !self.states.dataplane.is_flooding();
            let control_plane_up =
                self.states.control_plane.get() == "up" && !self.states.control_plane.is_flooding();

            if dataplane_up && control_plane_up {
                let entered = self
                    .states
                    .dataplane
                    .entered_at("up")
                    .zip(self.states.control_plane.entered_at("up"));
                if let Some((dp_at, cp_at)) = entered {
                    let earliest = dp_at.max(cp_at);
                    if earliest.elapsed() >= Duration::from_secs(self.cfg.dut_stabilize_secs) {
                        return Ok(());
                    }
                }
            }
            tokio::time::sleep(Duration::from_secs_f64(self.cfg.watcher_tick_secs)).await;
        }
    }

    fn evaluate_deadlines(
        &mut self,
        reboot_start: Instant,
        control_plane_up_at: Instant,
        analysis: &AnalysisResult,
    ) {
        let graceful = control_plane_up_at.duration_since(reboot_start);
        if graceful > Duration::from_secs(self.cfg.graceful_limit) {
            self.faults.push(FaultRecord::device(format!(
                "reboot_start to dataplane_up took {:.1}s, exceeding graceful_limit {}s",
                graceful.as_secs_f64(),
                self.cfg.graceful_limit
            )));
        }
        if analysis.max_disrupt_time > self.cfg.reboot_limit_in_seconds as f64 {
            self.faults.push(FaultRecord::device(format!(
                "longest single outage {:.3}s exceeded reboot_limit_in_seconds {}s",
                analysis.max_disrupt_time, self.cfg.reboot_limit_in_seconds
            )));
        }
        if !analysis.checked_successfully {
            self.faults.push(FaultRecord::infrastructure(
                "Unable to calculate the dataplane traffic loss time".to_string(),
            ));
        }
        if !analysis.infra_anomalies.is_empty() {
            self.faults.push(FaultRecord::infrastructure(format!(
                "{} sequence numbers were neither sent nor received",
                analysis.infra_anomalies.len()
            )));
        }
    }
}

async fn wait_for_label(state: &LabeledState, label: &str, tick_secs: f64) -> Result<(), HarnessError> {
    loop {
        if state.get() == label {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs_f64(tick_secs)).await;
    }
}
