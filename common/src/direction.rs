use serde::{Deserialize, Serialize};

/// Direction of a tagged stream packet, as classified by its sequence number.
///
/// Per the sender's convention, `seq % 5 == 0` is the vlan-to-T1 direction;
/// everything else is T1-to-vlan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ServerToUpstream,
    UpstreamToServer,
}

impl Direction {
    /// Classify a sequence number per the sender's fixed 1-in-5 split.
    pub fn of_seq(seq: u64) -> Self {
        if seq % 5 == 0 {
            Direction::ServerToUpstream
        } else {
            Direction::UpstreamToServer
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_every_fifth_seq_as_server_to_upstream() {
        for seq in 0..25u64 {
            let expected = if seq % 5 == 0 {
                Direction::ServerToUpstream
            } else {
                Direction::UpstreamToServer
            };
            assert_eq!(Direction::of_seq(seq), expected);
        }
    }
}
