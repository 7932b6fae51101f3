use crate::dns::DNSPacket;
use crate::dns::common::PacketComponent;
use crate::dns::header::DNSHeader;
use crate::dns::constants::{DNSRcode, UDP_RECV_BUFFER};
use crate::dns::enums::DNSResourceType;
use crate::dnssec::DnsKeyRecord;
use crate::error::{DnsError, Result};
use crate::model::LiveKey;
use async_trait::async_trait;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket, lookup_host};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

/// Read timeout applied to every single exchange.
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Udp,
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Udp => f.write_str("UDP"),
            Protocol::Tcp => f.write_str("TCP"),
        }
    }
}

/// A resolver to ask, by name or address, plus the shared port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverEndpoint {
    pub host: String,
    pub port: u16,
}

impl ResolverEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ResolverEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// One request/response exchange with a resolver.
#[async_trait]
pub trait DnsTransport: Send + Sync {
    async fn exchange(
        &self,
        query: &DNSPacket,
        endpoint: &ResolverEndpoint,
        protocol: Protocol,
    ) -> Result<DNSPacket>;
}

/// Transport over real UDP and TCP sockets.
#[derive(Debug, Clone)]
pub struct NetworkTransport {
    timeout: Duration,
}

impl Default for NetworkTransport {
    fn default() -> Self {
        Self::new(RESOLVE_TIMEOUT)
    }
}

impl NetworkTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn resolve_addr(endpoint: &ResolverEndpoint) -> Result<SocketAddr> {
        let mut addrs = lookup_host((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| DnsError::Lookup(format!("{}: {}", endpoint, e)))?;
        addrs
            .next()
            .ok_or_else(|| DnsError::Lookup(format!("{}: no addresses", endpoint)))
    }

    async fn send_udp_query(query_bytes: &[u8], server: SocketAddr) -> Result<Vec<u8>> {
        let bind_addr = if server.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(server).await?;
        socket.send(query_bytes).await?;

        let mut response_buf = vec![0u8; UDP_RECV_BUFFER];
        let response_len = socket.recv(&mut response_buf).await?;
        response_buf.truncate(response_len);
        Ok(response_buf)
    }

    async fn send_tcp_query(query_bytes: &[u8], server: SocketAddr) -> Result<Vec<u8>> {
        let mut stream = TcpStream::connect(server).await?;

        // Send length-prefixed query
        let query_length = query_bytes.len() as u16;
        stream.write_all(&query_length.to_be_bytes()).await?;
        stream.write_all(query_bytes).await?;
        stream.flush().await?;

        let mut length_buf = [0u8; 2];
        stream.read_exact(&mut length_buf).await?;
        let response_length = u16::from_be_bytes(length_buf) as usize;

        let mut response_buf = vec![0; response_length];
        stream.read_exact(&mut response_buf).await?;
        Ok(response_buf)
    }
}

#[async_trait]
impl DnsTransport for NetworkTransport {
    async fn exchange(
        &self,
        query: &DNSPacket,
        endpoint: &ResolverEndpoint,
        protocol: Protocol,
    ) -> Result<DNSPacket> {
        let query_bytes = query.serialize()?;

        let exchange = async {
            let server = Self::resolve_addr(endpoint).await?;
            trace!(
                "Sending {} bytes to {} over {}",
                query_bytes.len(),
                server,
                protocol
            );
            let bytes = match protocol {
                Protocol::Udp => Self::send_udp_query(&query_bytes, server).await?,
                Protocol::Tcp => Self::send_tcp_query(&query_bytes, server).await?,
            };
            Ok::<Vec<u8>, DnsError>(bytes)
        };

        let response_bytes = timeout(self.timeout, exchange)
            .await
            .map_err(|_| DnsError::Timeout(self.timeout.as_secs()))??;

        if response_bytes.is_empty() {
            return Err(DnsError::NoAnswer(endpoint.to_string()));
        }

        let response = match DNSPacket::parse(&response_bytes) {
            Ok(response) => response,
            Err(e) => match DNSHeader::read(&response_bytes, 0) {
                // Sections of a truncated answer may be incomplete; the header is enough
                Ok((header, _)) if header.tc => {
                    debug!(
                        "Truncated {} response from {} not parseable ({}), keeping header only",
                        protocol, endpoint, e
                    );
                    DNSPacket {
                        header,
                        ..Default::default()
                    }
                }
                _ => {
                    debug!(
                        "Failed to parse {} response from {} ({} bytes): {}",
                        protocol,
                        endpoint,
                        response_bytes.len(),
                        e
                    );
                    return Err(DnsError::Parse(e.to_string()));
                }
            },
        };

        if response.header.id != query.header.id {
            return Err(DnsError::IdMismatch {
                want: query.header.id,
                got: response.header.id,
            });
        }

        Ok(response)
    }
}

/// Position of the ordered resolver probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    /// UDP query to resolver `i`
    Trying(usize),
    /// TCP retry to resolver `i` after a truncated UDP answer
    Escalated(usize),
    Succeeded,
    Exhausted,
}

/// What a single attempt produced, as far as the probe is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Answered,
    Truncated,
    Failed,
}

impl ProbeState {
    pub fn start(resolver_count: usize) -> Self {
        if resolver_count == 0 {
            ProbeState::Exhausted
        } else {
            ProbeState::Trying(0)
        }
    }

    pub fn advance(self, outcome: AttemptOutcome, resolver_count: usize) -> Self {
        let next_resolver = |i: usize| {
            if i + 1 < resolver_count {
                ProbeState::Trying(i + 1)
            } else {
                ProbeState::Exhausted
            }
        };

        match (self, outcome) {
            (ProbeState::Trying(i), AttemptOutcome::Truncated) => ProbeState::Escalated(i),
            (ProbeState::Trying(_) | ProbeState::Escalated(_), AttemptOutcome::Answered) => {
                ProbeState::Succeeded
            }
            // Escalation happens once; a truncated TCP answer is a failure
            (ProbeState::Escalated(i), AttemptOutcome::Truncated)
            | (ProbeState::Trying(i) | ProbeState::Escalated(i), AttemptOutcome::Failed) => {
                next_resolver(i)
            }
            (done @ (ProbeState::Succeeded | ProbeState::Exhausted), _) => done,
        }
    }
}

/// A resolver attempt that did not produce an answer.
#[derive(Debug, Clone)]
pub struct FailedAttempt {
    pub resolver: String,
    pub protocol: Protocol,
    pub error: DnsError,
}

/// Result of looking up a zone's DNSKEY set.
#[derive(Debug)]
pub enum KeyLookup {
    /// A resolver answered; the set may legitimately be empty.
    Keys(Vec<LiveKey>),
    /// Every resolver failed.
    Unreachable { attempts: Vec<FailedAttempt> },
}

pub struct KeyResolver<T: DnsTransport = NetworkTransport> {
    resolvers: Vec<ResolverEndpoint>,
    transport: T,
}

impl KeyResolver<NetworkTransport> {
    pub fn new(resolvers: Vec<ResolverEndpoint>) -> Self {
        Self::with_transport(resolvers, NetworkTransport::default())
    }
}

impl<T: DnsTransport> KeyResolver<T> {
    pub fn with_transport(resolvers: Vec<ResolverEndpoint>, transport: T) -> Self {
        Self {
            resolvers,
            transport,
        }
    }

    pub fn resolvers(&self) -> &[ResolverEndpoint] {
        &self.resolvers
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Ask the resolvers in order for the DNSKEY set of `zone`.
    pub async fn lookup(&self, zone: &str) -> KeyLookup {
        let query = DNSPacket::dnskey_query(zone, rand::random::<u16>());
        let count = self.resolvers.len();

        let mut state = ProbeState::start(count);
        let mut attempts = Vec::new();
        let mut answer = None;

        loop {
            let (index, protocol) = match state {
                ProbeState::Trying(i) => (i, Protocol::Udp),
                ProbeState::Escalated(i) => (i, Protocol::Tcp),
                ProbeState::Succeeded | ProbeState::Exhausted => break,
            };
            let endpoint = &self.resolvers[index];

            let outcome = match self.attempt(&query, endpoint, protocol).await {
                Ok(response) if response.is_truncated() => {
                    if protocol == Protocol::Udp {
                        debug!("UDP response for {} from {} truncated, retrying with TCP", zone, endpoint);
                    } else {
                        attempts.push(FailedAttempt {
                            resolver: endpoint.to_string(),
                            protocol,
                            error: DnsError::Parse("truncated TCP response".to_string()),
                        });
                    }
                    AttemptOutcome::Truncated
                }
                Ok(response) => {
                    answer = Some((index, response));
                    AttemptOutcome::Answered
                }
                Err(e) => {
                    warn!(
                        "resolving: error resolving {} (server {}, {}): {}",
                        zone, endpoint, protocol, e
                    );
                    attempts.push(FailedAttempt {
                        resolver: endpoint.to_string(),
                        protocol,
                        error: e,
                    });
                    AttemptOutcome::Failed
                }
            };

            state = state.advance(outcome, count);
        }

        match answer {
            Some((index, response)) => {
                let keys = extract_keys(zone, &response);
                info!(
                    "{} DNSKEY records for {} from {}",
                    keys.len(),
                    zone,
                    self.resolvers[index]
                );
                KeyLookup::Keys(keys)
            }
            None => {
                warn!("No resolver could answer DNSKEY for {}", zone);
                KeyLookup::Unreachable { attempts }
            }
        }
    }

    async fn attempt(
        &self,
        query: &DNSPacket,
        endpoint: &ResolverEndpoint,
        protocol: Protocol,
    ) -> Result<DNSPacket> {
        let response = self.transport.exchange(query, endpoint, protocol).await?;

        // Truncation is judged by the caller before the rcode
        if response.is_truncated() {
            return Ok(response);
        }
        if response.header.rcode != DNSRcode::NOERROR {
            return Err(DnsError::Rcode(DNSRcode::name(response.header.rcode)));
        }
        Ok(response)
    }
}

/// Decode every DNSKEY in the answer section. Undecodable records are
/// skipped with a warning.
pub fn extract_keys(zone: &str, response: &DNSPacket) -> Vec<LiveKey> {
    response
        .answers_of_type(DNSResourceType::DNSKEY)
        .filter_map(|rr| match DnsKeyRecord::from_rdata(&rr.rdata) {
            Ok(record) => Some(LiveKey::new(zone, record)),
            Err(e) => {
                warn!("Skipping malformed DNSKEY at {}: {}", rr.name(), e);
                None
            }
        })
        .collect()
}
