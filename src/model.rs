use crate::dnssec::{DnsKeyRecord, KeyType};

/// Measurement the observations are stored under.
pub const MEASUREMENT: &str = "DnskeyAge";

/// A DNSKEY currently published for a zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveKey {
    pub domain: String,
    pub algorithm: String,
    pub keytag: u16,
    pub keytype: KeyType,
    pub record: DnsKeyRecord,
}

impl LiveKey {
    pub fn new(domain: &str, record: DnsKeyRecord) -> Self {
        Self {
            domain: domain.to_string(),
            algorithm: record.algorithm_label(),
            keytag: record.key_tag(),
            keytype: record.key_type(),
            record,
        }
    }
}

/// Earliest stored observation of a (domain, algorithm, keytag) triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub domain: String,
    pub algorithm: String,
    pub keytag: u16,
    /// Unix seconds
    pub first_seen: i64,
    /// Age stored with that first observation
    pub first_age: i64,
}

impl HistoryRecord {
    pub fn matches(&self, key: &LiveKey) -> bool {
        self.keytag == key.keytag && self.algorithm == key.algorithm && self.domain == key.domain
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgeObservation {
    pub domain: String,
    pub algorithm: String,
    pub keytag: u16,
    pub keytype: KeyType,
    /// Seconds since the key was first observed
    pub age: i64,
    /// Unix seconds
    pub timestamp: i64,
}

/// Normalise a zone name to fully-qualified form.
pub fn fqdn(zone: &str) -> String {
    if zone.ends_with('.') {
        zone.to_string()
    } else {
        format!("{}.", zone)
    }
}
