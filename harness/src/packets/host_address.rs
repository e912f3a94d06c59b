//! Deterministic generation of simulated server (VLAN host) addresses.
//!
//! Grounded on the original's `generate_vlan_servers`/`host_ip`: host
//! addresses are assigned round-robin across a VLAN's dataplane ports, with
//! MAC addresses derived from a fixed base pattern plus a monotonically
//! increasing host index.

use crate::config::{DataplanePort, PortRole};
use crate::error::HarnessError;
use ipnetwork::Ipv4Network;
use pnet::util::MacAddr;
use std::net::Ipv4Addr;

/// Base MAC address pattern for simulated VLAN (server) hosts:
/// `72060001<idx:04>`.
const VLAN_BASE_MAC_PATTERN: [u8; 4] = [0x72, 0x06, 0x00, 0x01];

/// Base MAC address pattern for simulated T1 (upstream) sources:
/// `5c010203<idx:04>`.
pub const LAG_BASE_MAC_PATTERN: [u8; 4] = [0x5c, 0x01, 0x02, 0x03];

/// A simulated server endpoint on a VLAN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddress {
    pub vlan: String,
    pub interface: String,
    pub ipv4: Ipv4Addr,
    pub mac: MacAddr,
}

/// Build a MAC address from a 4-byte base pattern and an index, by
/// rendering the index as a zero-padded 4-digit decimal string and reading
/// those digits as the low two bytes (exactly mirrors the original's
/// `'72060001{:04}'.format(counter)` followed by hex-pair splitting: every
/// digit involved happens to also be a valid hex digit).
pub fn pattern_mac(base: [u8; 4], index: u16) -> Result<MacAddr, HarnessError> {
    if index > 9999 {
        return Err(HarnessError::ConfigurationFault(format!(
            "host index {index} exceeds the 4-digit MAC pattern budget"
        )));
    }
    let digits = format!("{index:04}");
    let hi = u8::from_str_radix(&digits[0..2], 16).expect("decimal digits are valid hex");
    let lo = u8::from_str_radix(&digits[2..4], 16).expect("decimal digits are valid hex");
    Ok(MacAddr::new(base[0], base[1], base[2], base[3], hi, lo))
}

/// The network address plus `host_number`, validated against the subnet's
/// host capacity. Mirrors the original's `host_ip`.
pub fn host_ip(net: Ipv4Network, host_number: u32) -> Result<Ipv4Addr, HarnessError> {
    let n_hosts = 1u64 << (32 - net.prefix() as u32);
    if (host_number as u64) > n_hosts - 2 {
        return Err(HarnessError::ConfigurationFault(format!(
            "host number {host_number} exceeds the {} available hosts in {net}",
            n_hosts - 2
        )));
    }
    let network_addr: u32 = net.network().into();
    Ok(Ipv4Addr::from(network_addr.wrapping_add(host_number)))
}

/// Generate up to `max_hosts_per_vlan` simulated server addresses per VLAN,
/// round-robining across that VLAN's dataplane ports.
pub fn generate_vlan_hosts(
    vlan_ip_range: &std::collections::HashMap<String, Ipv4Network>,
    dataplane_ports: &[DataplanePort],
    max_hosts_per_vlan: usize,
) -> Result<Vec<HostAddress>, HarnessError> {
    let mut hosts = Vec::new();
    let mut global_counter: u16 = 0;

    for (vlan, net) in vlan_ip_range {
        let vlan_ports: Vec<&DataplanePort> = dataplane_ports
            .iter()
            .filter(|p| matches!(&p.role, PortRole::Vlan { vlan_name } if vlan_name == vlan))
            .collect();
        if vlan_ports.is_empty() {
            continue;
        }

        let n_hosts_cap = (1u64 << (32 - net.prefix() as u32)).saturating_sub(3);
        let n_hosts = n_hosts_cap.min(max_hosts_per_vlan as u64) as u32;

        for i in 0..n_hosts {
            let host_number = i + 2;
            let port = vlan_ports[(i as usize) % vlan_ports.len()];
            let addr = host_ip(*net, host_number)?;
            let mac = pattern_mac(VLAN_BASE_MAC_PATTERN, global_counter)?;
            global_counter = global_counter.wrapping_add(1);
            hosts.push(HostAddress {
                vlan: vlan.clone(),
                interface: port.interface.clone(),
                ipv4: addr,
                mac,
            });
        }
    }

    Ok(hosts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn host_ip_adds_host_number_to_network_address() {
        let net = Ipv4Network::from_str("192.168.1.0/24").unwrap();
        assert_eq!(host_ip(net, 2).unwrap(), Ipv4Addr::new(192, 168, 1, 2));
        assert_eq!(host_ip(net, 254).unwrap(), Ipv4Addr::new(192, 168, 1, 254));
    }

    #[test]
    fn host_ip_rejects_out_of_range_host_number() {
        let net = Ipv4Network::from_str("192.168.1.0/30").unwrap();
        assert!(host_ip(net, 10).is_err());
    }

    #[test]
    fn pattern_mac_embeds_decimal_digits_as_low_two_bytes() {
        let mac = pattern_mac(VLAN_BASE_MAC_PATTERN, 5).unwrap();
        assert_eq!(mac, MacAddr::new(0x72, 0x06, 0x00, 0x01, 0x00, 0x05));
        let mac = pattern_mac(LAG_BASE_MAC_PATTERN, 1234).unwrap();
        assert_eq!(mac, MacAddr::new(0x5c, 0x01, 0x02, 0x03, 0x12, 0x34));
    }

    #[test]
    fn generate_vlan_hosts_round_robins_across_vlan_ports() {
        let mut vlan_ip_range = std::collections::HashMap::new();
        vlan_ip_range.insert("Vlan1000".to_string(), Ipv4Network::from_str("192.168.1.0/29").unwrap());
        let ports = vec![
            DataplanePort {
                interface: "eth1".to_string(),
                role: PortRole::Vlan { vlan_name: "Vlan1000".to_string() },
            },
            DataplanePort {
                interface: "eth2".to_string(),
                role: PortRole::Vlan { vlan_name: "Vlan1000".to_string() },
            },
        ];
        let hosts = generate_vlan_hosts(&vlan_ip_range, &ports, 500).unwrap();
        // /29 => 8 addresses, minus network/broadcast/gateway = 5 hosts.
        assert_eq!(hosts.len(), 5);
        assert_eq!(hosts[0].interface, "eth1");
        assert_eq!(hosts[1].interface, "eth2");
        assert_eq!(hosts[2].interface, "eth1");
    }

    #[test]
    fn generate_vlan_hosts_caps_at_max_hosts_per_vlan() {
        let mut vlan_ip_range = std::collections::HashMap::new();
        vlan_ip_range.insert("Vlan1000".to_string(), Ipv4Network::from_str("10.0.0.0/16").unwrap());
        let ports = vec![DataplanePort {
            interface: "eth1".to_string(),
            role: PortRole::Vlan { vlan_name: "Vlan1000".to_string() },
        }];
        let hosts = generate_vlan_hosts(&vlan_ip_range, &ports, 20).unwrap();
        assert_eq!(hosts.len(), 20);
    }
}
