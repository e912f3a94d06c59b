//! Entry point: loads configuration, builds the probe templates and the
//! production collaborators, and runs the reboot coordinator to completion.

use harness::config::HarnessConfig;
use harness::coordinator::RebootCoordinator;
use harness::packets::host_address::generate_vlan_hosts;
use harness::packets::ProbeSetup;
use harness::probe_engine::{DatalinkTransport, PortTransport};
use harness::remote::{NeighborCollector, NullNeighborCollector, RemoteControl, ShellRemoteControl};
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();

    match run().await {
        Ok(success) => {
            if success {
                std::process::ExitCode::SUCCESS
            } else {
                tracing::error!("run completed with a deadline breach or infrastructure anomaly");
                std::process::ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!("harness aborted: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run() -> harness::error::Result<bool> {
    let cfg = HarnessConfig::load_or_default()?;
    tracing::info!(reboot_type = %cfg.reboot_type, "configuration loaded");

    let hosts = generate_vlan_hosts(&cfg.vlan_ip_range, &cfg.dataplane_ports, cfg.max_hosts_per_vlan)?;
    tracing::info!(host_count = hosts.len(), "generated simulated VLAN hosts");

    let probes = ProbeSetup::build(&cfg, hosts);

    let transport: Arc<dyn PortTransport> = Arc::new(DatalinkTransport::new());
    let remote: Arc<dyn RemoteControl> = Arc::new(ShellRemoteControl::new(
        cfg.reboot_command.clone(),
        cfg.finalizer_state_command.clone(),
    ));
    let neighbors: Arc<dyn NeighborCollector> = Arc::new(NullNeighborCollector::new(cfg.lacp_peers.clone()));

    let coordinator = RebootCoordinator::new(cfg, probes, transport, remote, neighbors);
    let outcome = coordinator.run().await?;

    tracing::info!(
        success = outcome.success,
        fault_count = outcome.faults.len(),
        "run complete"
    );
    for fault in &outcome.faults {
        tracing::warn!(category = ?fault.category, "{}", fault.message);
    }

    Ok(outcome.success)
}
