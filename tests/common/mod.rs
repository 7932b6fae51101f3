//! Shared helpers for the integration tests: packet builders, a scripted
//! DNS transport and an in-memory history store.

#![allow(dead_code)] // Each test file uses a different subset

use async_trait::async_trait;
use dnskeyage::dns::{
    DNSPacket,
    common::{labels_from_name, name_from_labels},
    constants::DNSRcode,
    enums::{DNSResourceClass, DNSResourceType},
    resource::DNSResource,
};
use dnskeyage::error::{DnsError, Result as DnsResult, StoreError};
use dnskeyage::resolver::{DnsTransport, Protocol, ResolverEndpoint};
use dnskeyage::store::{HistoryStore, PointBatch, SeriesRow};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

/// DNSKEY RDATA: flags, protocol, algorithm, key.
pub fn dnskey_rdata(flags: u16, protocol: u8, algorithm: u8, public_key: &[u8]) -> Vec<u8> {
    let mut rdata = flags.to_be_bytes().to_vec();
    rdata.push(protocol);
    rdata.push(algorithm);
    rdata.extend_from_slice(public_key);
    rdata
}

pub fn dnskey_answer(zone: &str, flags: u16, algorithm: u8, public_key: &[u8]) -> DNSResource {
    DNSResource {
        labels: labels_from_name(zone),
        rtype: DNSResourceType::DNSKEY,
        rclass: DNSResourceClass::IN,
        ttl: 3600,
        rdata: dnskey_rdata(flags, 3, algorithm, public_key),
    }
}

/// A response echoing the id and question of `query`.
pub fn response_to(query: &DNSPacket, answers: Vec<DNSResource>) -> DNSPacket {
    let mut response = query.clone();
    response.header.qr = true;
    response.header.ra = true;
    response.answers = answers;
    response
}

pub fn truncated_response_to(query: &DNSPacket) -> DNSPacket {
    let mut response = response_to(query, Vec::new());
    response.header.tc = true;
    response
}

pub fn rcode_response_to(query: &DNSPacket, rcode: u8) -> DNSPacket {
    let mut response = response_to(query, Vec::new());
    response.header.rcode = rcode;
    response
}

/// The two keys of the `example.com.` scenario: one KSK, one ZSK, both
/// RSASHA256.
pub fn example_keys(zone: &str) -> Vec<DNSResource> {
    vec![
        dnskey_answer(zone, 257, 8, &[0x03, 0x01, 0x00, 0x01, 0xAA, 0xBB]),
        dnskey_answer(zone, 256, 8, &[0x03, 0x01, 0x00, 0x01, 0xCC, 0xDD]),
    ]
}

/// How a scripted resolver answers.
#[derive(Debug, Clone)]
pub enum Reply {
    Keys(Vec<DNSResource>),
    Truncated,
    Rcode(u8),
    Fail(DnsError),
}

/// Transport whose answers are fixed per (resolver host, protocol). Every
/// exchange is recorded; queries for a delayed zone wait before answering.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: HashMap<(String, Protocol), Reply>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<(String, Protocol)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, host: &str, protocol: Protocol, reply: Reply) -> Self {
        self.replies.insert((host.to_string(), protocol), reply);
        self
    }

    pub fn delay_zone(mut self, zone: &str, delay: Duration) -> Self {
        self.delays.insert(zone.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<(String, Protocol)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DnsTransport for ScriptedTransport {
    async fn exchange(
        &self,
        query: &DNSPacket,
        endpoint: &ResolverEndpoint,
        protocol: Protocol,
    ) -> DnsResult<DNSPacket> {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint.host.clone(), protocol));

        let zone = query
            .questions
            .first()
            .map(|q| name_from_labels(&q.labels))
            .unwrap_or_default();
        if let Some(delay) = self.delays.get(&zone) {
            tokio::time::sleep(*delay).await;
        }

        match self.replies.get(&(endpoint.host.clone(), protocol)) {
            Some(Reply::Keys(answers)) => Ok(response_to(query, answers.clone())),
            Some(Reply::Truncated) => Ok(truncated_response_to(query)),
            Some(Reply::Rcode(rcode)) => Ok(rcode_response_to(query, *rcode)),
            Some(Reply::Fail(e)) => Err(e.clone()),
            None => Err(DnsError::Timeout(5)),
        }
    }
}

pub fn endpoints(hosts: &[&str]) -> Vec<ResolverEndpoint> {
    hosts.iter().map(|h| ResolverEndpoint::new(*h, 53)).collect()
}

pub fn servfail() -> Reply {
    Reply::Rcode(DNSRcode::SERVFAIL)
}

/// A history row as the store returns it for the first-seen query.
pub fn history_row(time: &str, domain: &str, algorithm: &str, keytag: u16) -> SeriesRow {
    SeriesRow {
        columns: ["time", "domain", "algorithm", "keytag", "first"]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        tags: BTreeMap::new(),
        values: vec![
            json!(time),
            json!(domain),
            json!(algorithm),
            json!(keytag.to_string()),
            json!(0),
        ],
    }
}

/// In-memory store. History rows are served per zone; queries and writes
/// are recorded.
#[derive(Default)]
pub struct MemoryStore {
    history: HashMap<String, Vec<SeriesRow>>,
    failing_queries: HashSet<String>,
    failing_writes: HashSet<String>,
    queries: Mutex<Vec<String>>,
    writes: Mutex<Vec<PointBatch>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(mut self, zone: &str, rows: Vec<SeriesRow>) -> Self {
        self.history.insert(zone.to_string(), rows);
        self
    }

    pub fn failing_query_for(mut self, zone: &str) -> Self {
        self.failing_queries.insert(zone.to_string());
        self
    }

    pub fn failing_write_for(mut self, zone: &str) -> Self {
        self.failing_writes.insert(zone.to_string());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<PointBatch> {
        self.writes.lock().unwrap().clone()
    }

    fn zone_in_query<'a>(zones: impl Iterator<Item = &'a String>, query: &str) -> Option<String> {
        zones
            .into_iter()
            .find(|zone| query.contains(&format!("domain='{}'", zone)))
            .cloned()
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn query(&self, query: &str) -> Result<Vec<SeriesRow>, StoreError> {
        self.queries.lock().unwrap().push(query.to_string());

        if Self::zone_in_query(self.failing_queries.iter(), query).is_some() {
            return Err(StoreError::Status {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        Ok(Self::zone_in_query(self.history.keys(), query)
            .and_then(|zone| self.history.get(&zone).cloned())
            .unwrap_or_default())
    }

    async fn write(&self, batch: &PointBatch) -> Result<(), StoreError> {
        let failing = batch.points.iter().any(|p| {
            p.tags
                .get("domain")
                .is_some_and(|d| self.failing_writes.contains(d))
        });
        if failing {
            return Err(StoreError::Http("connection refused".to_string()));
        }
        self.writes.lock().unwrap().push(batch.clone());
        Ok(())
    }
}
