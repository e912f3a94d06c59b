use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of reboot under test. Serializes to the exact CLI string used
/// to invoke it on the device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RebootType {
    FastReboot,
    WarmReboot,
    ServiceWarmRestart,
}

impl RebootType {
    /// Fast-reboot is the only variant that *must* see at least one
    /// disruption for the measurement to count as successful (spec §4.7).
    pub fn must_observe_loss(self) -> bool {
        matches!(self, RebootType::FastReboot)
    }

    /// Warm/fast reboot gate the Sender's stop on the finalizer reaching
    /// `inactive`; a service-warm-restart has no finalizer phase to wait on.
    pub fn gates_sender_stop_on_finalizer(self) -> bool {
        matches!(self, RebootType::FastReboot | RebootType::WarmReboot)
    }
}

impl fmt::Display for RebootType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RebootType::FastReboot => "fast-reboot",
            RebootType::WarmReboot => "warm-reboot",
            RebootType::ServiceWarmRestart => "service-warm-restart",
        };
        f.write_str(s)
    }
}

impl FromStr for RebootType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast-reboot" => Ok(RebootType::FastReboot),
            "warm-reboot" => Ok(RebootType::WarmReboot),
            "service-warm-restart" => Ok(RebootType::ServiceWarmRestart),
            other => Err(format!("unsupported reboot_type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_from_str() {
        for rt in [
            RebootType::FastReboot,
            RebootType::WarmReboot,
            RebootType::ServiceWarmRestart,
        ] {
            assert_eq!(rt.to_string().parse::<RebootType>().unwrap(), rt);
        }
    }

    #[test]
    fn rejects_unknown_reboot_type() {
        assert!("cold-reboot".parse::<RebootType>().is_err());
    }

    #[test]
    fn only_fast_reboot_requires_observed_loss() {
        assert!(RebootType::FastReboot.must_observe_loss());
        assert!(!RebootType::WarmReboot.must_observe_loss());
        assert!(!RebootType::ServiceWarmRestart.must_observe_loss());
    }

    #[test]
    fn warm_and_fast_reboot_gate_sender_stop_on_finalizer() {
        assert!(RebootType::FastReboot.gates_sender_stop_on_finalizer());
        assert!(RebootType::WarmReboot.gates_sender_stop_on_finalizer());
        assert!(!RebootType::ServiceWarmRestart.gates_sender_stop_on_finalizer());
    }
}
