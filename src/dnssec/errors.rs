use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DnsSecError {
    #[error("DNSKEY RDATA too short: {0} bytes")]
    ShortKeyData(usize),
}
