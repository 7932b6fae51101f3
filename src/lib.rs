pub mod age;
pub mod config;
pub mod dns;
pub mod dnssec;
pub mod error;
pub mod history;
pub mod model;
pub mod monitor;
pub mod resolver;
pub mod store;
pub mod writer;

pub use dns::DNSPacket;
pub use monitor::{Monitor, RunSummary, ZoneOutcome};
