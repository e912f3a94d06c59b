pub mod direction;
pub mod neighbor;
pub mod reboot_type;
pub mod report;

pub use direction::Direction;
pub use neighbor::NeighborLacpReport;
pub use reboot_type::RebootType;
pub use report::{ControlplaneReport, DataplaneReport, Report};
