//! Error types for the advanced-reboot measurement harness.

use thiserror::Error;

/// Errors that can occur while running the harness.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file / environment layering error
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// pcap read/write error
    #[error("pcap error: {0}")]
    Pcap(#[from] pcap::Error),

    /// A device-under-test misbehavior: missed a deadline, never
    /// transitioned, or otherwise failed to do what the reboot sequence
    /// requires of it.
    #[error("device fault: {0}")]
    DeviceFault(String),

    /// A test-infrastructure failure: the capture pipeline dropped
    /// packets, the sniffer produced no traffic, or similar harness-side
    /// breakage unrelated to the device's behavior.
    #[error("infrastructure fault: {0}")]
    InfrastructureFault(String),

    /// Bad or missing configuration, detected during setup.
    #[error("configuration fault: {0}")]
    ConfigurationFault(String),

    /// A `run_with_timeout`-wrapped operation did not complete in time.
    #[error("timeout after {seconds}s: {tag}")]
    Timeout { tag: String, seconds: u64 },
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Category of a fault collected by the Coordinator (spec.md §7). Device and
/// infrastructure faults are accumulated across the whole run rather than
/// aborting on first occurrence; configuration faults abort immediately and
/// never reach a `FaultRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FaultCategory {
    Device,
    Infrastructure,
}

/// A single collected fault, as described by the run's outcome.
#[derive(Debug, Clone)]
pub struct FaultRecord {
    pub category: FaultCategory,
    pub message: String,
}

impl FaultRecord {
    pub fn device(message: impl Into<String>) -> Self {
        Self {
            category: FaultCategory::Device,
            message: message.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self {
            category: FaultCategory::Infrastructure,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_error_formats_tag_and_seconds() {
        let err = HarnessError::Timeout {
            tag: "control_plane_down".to_string(),
            seconds: 600,
        };
        assert_eq!(
            err.to_string(),
            "timeout after 600s: control_plane_down"
        );
    }

    #[test]
    fn fault_record_constructors_set_category() {
        assert_eq!(FaultRecord::device("x").category, FaultCategory::Device);
        assert_eq!(
            FaultRecord::infrastructure("y").category,
            FaultCategory::Infrastructure
        );
    }
}
