#![deny(unused_must_use)]

pub mod analyzer;
pub mod capture;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod interlock;
pub mod packets;
pub mod probe_engine;
pub mod remote;
pub mod report;
pub mod sender;
pub mod state_machine;
pub mod timeout_util;
pub mod watcher;

pub use config::HarnessConfig;
pub use coordinator::RebootCoordinator;
pub use error::{FaultCategory, FaultRecord, HarnessError};
