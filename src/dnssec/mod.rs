pub mod algorithm;
pub mod dnskey;
pub mod errors;
pub mod key_tag;

pub use algorithm::{DnsSecAlgorithm, algorithm_label};
pub use dnskey::{DnsKeyRecord, KeyType};
pub use errors::DnsSecError;
pub use key_tag::calculate_key_tag;
