//! Harness configuration: a layered TOML-file-then-environment loader.

use crate::error::HarnessError;
use common::RebootType;
use ipnetwork::Ipv4Network;
use pnet::util::MacAddr;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Role a dataplane interface plays in the topology.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum PortRole {
    /// Faces a simulated upstream router, usually aggregated into a LAG.
    T1,
    /// Faces simulated servers on the named VLAN.
    Vlan { vlan_name: String },
}

/// A single dataplane port: its OS interface name and topology role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataplanePort {
    pub interface: String,
    #[serde(flatten)]
    pub role: PortRole,
}

/// Raw, partially-populated configuration as loaded from file + environment.
/// Every field is optional here so that a config source can omit anything
/// it doesn't want to override; `HarnessConfig::from_raw` fills in defaults
/// and rejects genuinely missing required fields as a configuration fault.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfig {
    pub reboot_type: Option<String>,
    pub report_suffix: Option<String>,
    pub dut_mac: Option<String>,
    pub vlan_mac: Option<String>,
    pub vlan_gateway_ip: Option<String>,
    pub lo_prefix: Option<String>,
    pub default_ip_range: Option<String>,
    pub vlan_ip_range: Option<HashMap<String, String>>,
    pub dataplane_ports: Option<Vec<DataplanePort>>,

    pub reboot_limit_in_seconds: Option<u64>,
    pub graceful_limit: Option<u64>,
    pub dut_stabilize_secs: Option<u64>,
    pub warm_up_timeout_secs: Option<u64>,
    pub task_timeout: Option<u64>,
    pub control_plane_down_timeout: Option<u64>,
    pub send_interval_ms: Option<f64>,
    pub time_to_listen_secs: Option<u64>,
    pub sniff_time_incr_secs: Option<u64>,
    pub watcher_tick_secs: Option<f64>,

    pub min_bgp_gr_timeout_secs: Option<u64>,
    pub bgp_v4_v6_time_diff_secs: Option<u64>,
    pub lacp_session_gap_fault_secs: Option<f64>,

    pub nr_pc_pkts: Option<u32>,
    pub max_hosts_per_vlan: Option<usize>,
    pub ping_dut_pkts: Option<u32>,
    pub arp_vlan_gw_ping_pkts: Option<u32>,
    pub allowed_flooded_originals: Option<u32>,

    pub allow_vlan_flooding: Option<bool>,
    pub allow_mac_jumping: Option<bool>,

    /// Shell command that triggers the reboot on the device under test.
    /// Empty/unset means the reboot is assumed to be triggered externally.
    pub reboot_command: Option<String>,
    /// Shell command whose trimmed stdout is the finalizer's current state.
    /// Empty/unset means "inactive" is assumed immediately.
    pub finalizer_state_command: Option<String>,
    /// Neighbor peer addresses to collect LACP telemetry from.
    pub lacp_peers: Option<Vec<String>>,
}

/// Fully resolved harness configuration used by every component.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub reboot_type: RebootType,
    pub report_suffix: Option<String>,
    pub dut_mac: MacAddr,
    pub vlan_mac: Option<MacAddr>,
    pub vlan_gateway_ip: Ipv4Addr,
    pub lo_prefix: Ipv4Network,
    pub default_ip_range: Ipv4Network,
    pub vlan_ip_range: HashMap<String, Ipv4Network>,
    pub dataplane_ports: Vec<DataplanePort>,

    pub reboot_limit_in_seconds: u64,
    pub graceful_limit: u64,
    pub dut_stabilize_secs: u64,
    pub warm_up_timeout_secs: u64,
    pub task_timeout: u64,
    pub control_plane_down_timeout: u64,
    pub send_interval_ms: f64,
    pub time_to_listen_secs: u64,
    pub sniff_time_incr_secs: u64,
    pub watcher_tick_secs: f64,

    pub min_bgp_gr_timeout_secs: u64,
    pub bgp_v4_v6_time_diff_secs: u64,
    pub lacp_session_gap_fault_secs: f64,

    pub nr_pc_pkts: u32,
    pub max_hosts_per_vlan: usize,
    pub ping_dut_pkts: u32,
    pub arp_vlan_gw_ping_pkts: u32,
    pub allowed_flooded_originals: u32,

    pub allow_vlan_flooding: bool,
    pub allow_mac_jumping: bool,

    pub reboot_command: String,
    pub finalizer_state_command: String,
    pub lacp_peers: Vec<std::net::IpAddr>,
}

impl HarnessConfig {
    /// Load from `harness_config.toml` (if present) layered under
    /// `ADV_REBOOT__`-prefixed environment overrides.
    pub fn load() -> Result<Self, HarnessError> {
        let raw: RawConfig = config::Config::builder()
            .add_source(config::File::with_name("harness_config").required(false))
            .add_source(config::Environment::with_prefix("ADV_REBOOT").separator("__"))
            .build()?
            .try_deserialize()?;
        Self::from_raw(raw)
    }

    /// Like [`load`](Self::load), but a missing or unreadable config file is
    /// logged and treated as "use defaults" rather than fatal. A file that
    /// is present but semantically invalid (bad `reboot_type`, missing
    /// topology field) still aborts as a configuration fault.
    pub fn load_or_default() -> Result<Self, HarnessError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("harness_config").required(false))
            .add_source(config::Environment::with_prefix("ADV_REBOOT").separator("__"));

        let raw: RawConfig = match builder.build() {
            Ok(built) => match built.try_deserialize() {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!("harness_config could not be parsed, using defaults: {e}");
                    RawConfig::default()
                }
            },
            Err(e) => {
                tracing::warn!("harness_config could not be loaded, using defaults: {e}");
                RawConfig::default()
            }
        };
        Self::from_raw(raw)
    }

    /// Resolve a [`RawConfig`], applying defaults and rejecting missing
    /// required fields or malformed values as a configuration fault.
    pub fn from_raw(raw: RawConfig) -> Result<Self, HarnessError> {
        let required = |name: &str, value: Option<String>| -> Result<String, HarnessError> {
            value.ok_or_else(|| {
                HarnessError::ConfigurationFault(format!("missing required parameter: {name}"))
            })
        };

        let reboot_type_str = required("reboot_type", raw.reboot_type)?;
        let reboot_type = RebootType::from_str(&reboot_type_str)
            .map_err(HarnessError::ConfigurationFault)?;

        let dut_mac_str = required("dut_mac", raw.dut_mac)?;
        let dut_mac = MacAddr::from_str(&dut_mac_str)
            .map_err(|e| HarnessError::ConfigurationFault(format!("invalid dut_mac: {e}")))?;

        let vlan_mac = raw
            .vlan_mac
            .map(|s| {
                MacAddr::from_str(&s)
                    .map_err(|e| HarnessError::ConfigurationFault(format!("invalid vlan_mac: {e}")))
            })
            .transpose()?;

        let vlan_gateway_ip = raw
            .vlan_gateway_ip
            .unwrap_or_else(|| "192.168.0.1".to_string())
            .parse()
            .map_err(|e| {
                HarnessError::ConfigurationFault(format!("invalid vlan_gateway_ip: {e}"))
            })?;

        let lo_prefix_str = required("lo_prefix", raw.lo_prefix)?;
        let lo_prefix = Ipv4Network::from_str(&lo_prefix_str)
            .map_err(|e| HarnessError::ConfigurationFault(format!("invalid lo_prefix: {e}")))?;

        let default_ip_range_str = required("default_ip_range", raw.default_ip_range)?;
        let default_ip_range = Ipv4Network::from_str(&default_ip_range_str).map_err(|e| {
            HarnessError::ConfigurationFault(format!("invalid default_ip_range: {e}"))
        })?;

        let vlan_ip_range_raw = raw.vlan_ip_range.ok_or_else(|| {
            HarnessError::ConfigurationFault("missing required parameter: vlan_ip_range".into())
        })?;
        let mut vlan_ip_range = HashMap::new();
        for (vlan_name, cidr) in vlan_ip_range_raw {
            let net = Ipv4Network::from_str(&cidr).map_err(|e| {
                HarnessError::ConfigurationFault(format!(
                    "invalid vlan_ip_range entry for {vlan_name}: {e}"
                ))
            })?;
            vlan_ip_range.insert(vlan_name, net);
        }

        let dataplane_ports = raw.dataplane_ports.ok_or_else(|| {
            HarnessError::ConfigurationFault("missing required parameter: dataplane_ports".into())
        })?;
        if dataplane_ports.is_empty() {
            return Err(HarnessError::ConfigurationFault(
                "dataplane_ports must list at least one interface".into(),
            ));
        }

        let lacp_peers = raw
            .lacp_peers
            .unwrap_or_default()
            .into_iter()
            .map(|s| {
                s.parse()
                    .map_err(|e| HarnessError::ConfigurationFault(format!("invalid lacp peer {s}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            reboot_type,
            report_suffix: raw.report_suffix,
            dut_mac,
            vlan_mac,
            vlan_gateway_ip,
            lo_prefix,
            default_ip_range,
            vlan_ip_range,
            dataplane_ports,

            reboot_limit_in_seconds: raw.reboot_limit_in_seconds.unwrap_or(30),
            graceful_limit: raw.graceful_limit.unwrap_or(240),
            dut_stabilize_secs: raw.dut_stabilize_secs.unwrap_or(30),
            warm_up_timeout_secs: raw.warm_up_timeout_secs.unwrap_or(300),
            task_timeout: raw.task_timeout.unwrap_or(300),
            control_plane_down_timeout: raw.control_plane_down_timeout.unwrap_or(600),
            send_interval_ms: raw.send_interval_ms.unwrap_or(3.5),
            time_to_listen_secs: raw.time_to_listen_secs.unwrap_or(240),
            sniff_time_incr_secs: raw.sniff_time_incr_secs.unwrap_or(300),
            watcher_tick_secs: raw.watcher_tick_secs.unwrap_or(0.5),

            min_bgp_gr_timeout_secs: raw.min_bgp_gr_timeout_secs.unwrap_or(15),
            bgp_v4_v6_time_diff_secs: raw.bgp_v4_v6_time_diff_secs.unwrap_or(40),
            lacp_session_gap_fault_secs: raw.lacp_session_gap_fault_secs.unwrap_or(150.0),

            nr_pc_pkts: raw.nr_pc_pkts.unwrap_or(10),
            max_hosts_per_vlan: raw.max_hosts_per_vlan.unwrap_or(500),
            ping_dut_pkts: raw.ping_dut_pkts.unwrap_or(10),
            arp_vlan_gw_ping_pkts: raw.arp_vlan_gw_ping_pkts.unwrap_or(10),
            allowed_flooded_originals: raw.allowed_flooded_originals.unwrap_or(250),

            allow_vlan_flooding: raw.allow_vlan_flooding.unwrap_or(false),
            allow_mac_jumping: raw.allow_mac_jumping.unwrap_or(false),

            reboot_command: raw.reboot_command.unwrap_or_default(),
            finalizer_state_command: raw.finalizer_state_command.unwrap_or_default(),
            lacp_peers,
        })
    }

    /// Report/log path convention: `/tmp/<reboot_type>[-<suffix>]-report.json`
    /// and `/tmp/<reboot_type>[-<suffix>].log`.
    pub fn report_path(&self) -> std::path::PathBuf {
        std::path::PathBuf::from(format!("/tmp/{}-report.json", self.report_stem()))
    }

    pub fn log_path(&self) -> std::path::PathBuf {
        std::path::PathBuf::from(format!("/tmp/{}.log", self.report_stem()))
    }

    pub fn capture_pcap_path(&self) -> std::path::PathBuf {
        std::path::PathBuf::from(format!("/tmp/{}-capture.pcap", self.report_stem()))
    }

    fn report_stem(&self) -> String {
        match &self.report_suffix {
            Some(suffix) => format!("{}-{}", self.reboot_type, suffix),
            None => self.reboot_type.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_raw() -> RawConfig {
        let mut vlan_ip_range = HashMap::new();
        vlan_ip_range.insert("Vlan1000".to_string(), "192.168.1.0/24".to_string());
        RawConfig {
            reboot_type: Some("warm-reboot".to_string()),
            dut_mac: Some("00:11:22:33:44:55".to_string()),
            lo_prefix: Some("10.1.0.32/32".to_string()),
            default_ip_range: Some("10.0.0.0/24".to_string()),
            vlan_ip_range: Some(vlan_ip_range),
            dataplane_ports: Some(vec![DataplanePort {
                interface: "eth0".to_string(),
                role: PortRole::T1,
            }]),
            ..Default::default()
        }
    }

    #[test]
    fn resolves_defaults_for_unset_optional_fields() {
        let cfg = HarnessConfig::from_raw(minimal_raw()).unwrap();
        assert_eq!(cfg.reboot_limit_in_seconds, 30);
        assert_eq!(cfg.graceful_limit, 240);
        assert_eq!(cfg.send_interval_ms, 3.5);
        assert_eq!(cfg.allowed_flooded_originals, 250);
        assert!(!cfg.allow_vlan_flooding);
    }

    #[test]
    fn missing_required_field_is_a_configuration_fault() {
        let mut raw = minimal_raw();
        raw.dut_mac = None;
        let err = HarnessConfig::from_raw(raw).unwrap_err();
        assert!(matches!(err, HarnessError::ConfigurationFault(_)));
    }

    #[test]
    fn unsupported_reboot_type_is_a_configuration_fault() {
        let mut raw = minimal_raw();
        raw.reboot_type = Some("cold-reboot".to_string());
        let err = HarnessConfig::from_raw(raw).unwrap_err();
        assert!(matches!(err, HarnessError::ConfigurationFault(_)));
    }

    #[test]
    fn report_paths_follow_the_tmp_convention() {
        let mut raw = minimal_raw();
        raw.report_suffix = Some("run1".to_string());
        let cfg = HarnessConfig::from_raw(raw).unwrap();
        assert_eq!(
            cfg.report_path(),
            std::path::PathBuf::from("/tmp/warm-reboot-run1-report.json")
        );
        assert_eq!(
            cfg.log_path(),
            std::path::PathBuf::from("/tmp/warm-reboot-run1.log")
        );
    }

    #[test]
    fn report_paths_omit_suffix_when_absent() {
        let cfg = HarnessConfig::from_raw(minimal_raw()).unwrap();
        assert_eq!(
            cfg.report_path(),
            std::path::PathBuf::from("/tmp/warm-reboot-report.json")
        );
    }
}
