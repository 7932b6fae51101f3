use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::algorithm::algorithm_label;
use super::errors::DnsSecError;
use super::key_tag::calculate_key_tag;

pub const KSK_FLAGS: u16 = 257;
pub const ZSK_FLAGS: u16 = 256;

/// Decoded DNSKEY RDATA (RFC 4034 section 2.1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsKeyRecord {
    pub flags: u16,
    pub protocol: u8,
    pub algorithm: u8,
    pub public_key: Vec<u8>,
}

impl DnsKeyRecord {
    pub fn from_rdata(rdata: &[u8]) -> Result<Self, DnsSecError> {
        if rdata.len() < 4 {
            return Err(DnsSecError::ShortKeyData(rdata.len()));
        }

        Ok(Self {
            flags: u16::from_be_bytes([rdata[0], rdata[1]]),
            protocol: rdata[2],
            algorithm: rdata[3],
            public_key: rdata[4..].to_vec(),
        })
    }

    pub fn key_tag(&self) -> u16 {
        calculate_key_tag(self.flags, self.protocol, self.algorithm, &self.public_key)
    }

    pub fn key_type(&self) -> KeyType {
        KeyType::from_flags(self.flags)
    }

    pub fn algorithm_label(&self) -> String {
        algorithm_label(self.algorithm)
    }
}

impl fmt::Display for DnsKeyRecord {
    /// Presentation format of the RDATA, key material in base64.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.flags,
            self.protocol,
            self.algorithm,
            STANDARD.encode(&self.public_key)
        )
    }
}

/// Role of a key as seen in its flag field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Ksk,
    Zsk,
    Other(u16),
}

impl KeyType {
    pub fn from_flags(flags: u16) -> Self {
        match flags {
            KSK_FLAGS => KeyType::Ksk,
            ZSK_FLAGS => KeyType::Zsk,
            other => KeyType::Other(other),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Ksk => f.write_str("KSK"),
            KeyType::Zsk => f.write_str("ZSK"),
            KeyType::Other(flags) => write!(f, "{}", flags),
        }
    }
}
