pub mod common;
pub mod constants;
pub mod edns;
pub mod enums;
pub mod header;
pub mod question;
pub mod resource;

use bitstream_io::{BigEndian, BitWrite, BitWriter};
use common::{PacketComponent, labels_from_name};
use constants::EDNS0_BUFFER_SIZE;
use edns::EdnsOpt;
use enums::{DNSResourceClass, DNSResourceType};
use header::{DNSHeader, HEADER_LEN};
use question::DNSQuestion;
use resource::DNSResource;
use tracing::{debug, trace};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSPacket {
    pub header: DNSHeader,
    pub questions: Vec<DNSQuestion>,
    pub answers: Vec<DNSResource>,
    pub authorities: Vec<DNSResource>,
    pub resources: Vec<DNSResource>,
    /// EDNS0 OPT record if present (extracted from additional records)
    pub edns: Option<EdnsOpt>,
}

#[derive(Debug)]
pub enum ParseError {
    InvalidHeader,
    InvalidLabel,
    InvalidEdns,
    Truncated(usize),
    InvalidBitStream(String),
}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        ParseError::InvalidBitStream(e.to_string())
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::InvalidHeader => write!(f, "Invalid DNS header"),
            ParseError::InvalidLabel => write!(f, "Invalid DNS label"),
            ParseError::InvalidEdns => write!(f, "Invalid EDNS option data"),
            ParseError::Truncated(at) => write!(f, "Message ends unexpectedly at offset {}", at),
            ParseError::InvalidBitStream(e) => write!(f, "Invalid bit stream: {}", e),
        }
    }
}

impl std::error::Error for ParseError {}

impl DNSPacket {
    /// Build a recursive DNSKEY query for `zone` with EDNS0 (4096) and DO set.
    pub fn dnskey_query(zone: &str, id: u16) -> Self {
        let mut edns = EdnsOpt::with_payload_size(EDNS0_BUFFER_SIZE);
        edns.set_do_flag(true);

        DNSPacket {
            header: DNSHeader::query(id),
            questions: vec![DNSQuestion {
                labels: labels_from_name(zone),
                qtype: DNSResourceType::DNSKEY,
                qclass: DNSResourceClass::IN,
            }],
            edns: Some(edns),
            ..Default::default()
        }
    }

    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        trace!("Parsing DNS packet, size: {} bytes", buf.len());
        let (header, mut offset) = DNSHeader::read(buf, 0)?;
        debug!(
            "Parsed DNS header: id={}, qr={}, tc={}, rcode={}, answers={}",
            header.id, header.qr, header.tc, header.rcode, header.ancount
        );

        let mut packet = DNSPacket {
            header,
            ..Default::default()
        };

        for _ in 0..packet.header.qdcount {
            let (question, next) = DNSQuestion::read(buf, offset)?;
            packet.questions.push(question);
            offset = next;
        }

        for _ in 0..packet.header.ancount {
            let (answer, next) = DNSResource::read(buf, offset)?;
            packet.answers.push(answer);
            offset = next;
        }

        for _ in 0..packet.header.nscount {
            let (authority, next) = DNSResource::read(buf, offset)?;
            packet.authorities.push(authority);
            offset = next;
        }

        for _ in 0..packet.header.arcount {
            let (resource, next) = DNSResource::read(buf, offset)?;
            offset = next;

            // OPT pseudo-record lives at the root; its class carries the payload size
            if resource.rtype == DNSResourceType::OPT && resource.labels.is_empty() {
                let edns = EdnsOpt::parse_from_resource(
                    resource.rclass.into(),
                    resource.ttl,
                    &resource.rdata,
                )?;
                trace!("Parsed EDNS0 record: payload={}", edns.udp_payload_size);
                packet.edns = Some(edns);
                continue;
            }

            packet.resources.push(resource);
        }

        Ok(packet)
    }

    pub fn serialize(&self) -> Result<Vec<u8>, ParseError> {
        let mut buf = Vec::with_capacity(HEADER_LEN + 64);
        {
            let mut writer: BitWriter<&mut Vec<u8>, BigEndian> = BitWriter::new(&mut buf);

            let mut header = self.header.clone();
            header.qdcount = self.questions.len() as u16;
            header.ancount = self.answers.len() as u16;
            header.nscount = self.authorities.len() as u16;
            header.arcount = self.resources.len() as u16 + self.edns.is_some() as u16;
            header.write(&mut writer)?;

            for question in &self.questions {
                question.write(&mut writer)?;
            }
            for answer in &self.answers {
                answer.write(&mut writer)?;
            }
            for authority in &self.authorities {
                authority.write(&mut writer)?;
            }
            for resource in &self.resources {
                resource.write(&mut writer)?;
            }

            if let Some(edns) = &self.edns {
                let (udp_payload_size, ttl, rdata) = edns.to_resource_format();
                // Root name, TYPE=OPT, CLASS=payload size
                writer.write_var::<u8>(8, 0)?;
                writer.write_var::<u16>(16, DNSResourceType::OPT.into())?;
                writer.write_var::<u16>(16, udp_payload_size)?;
                writer.write_var::<u32>(32, ttl)?;
                writer.write_var::<u16>(16, rdata.len() as u16)?;
                writer.write_bytes(&rdata)?;
            }
        }

        Ok(buf)
    }

    pub fn is_truncated(&self) -> bool {
        self.header.tc
    }

    /// Answer records of the given type, in message order.
    pub fn answers_of_type(&self, rtype: DNSResourceType) -> impl Iterator<Item = &DNSResource> {
        self.answers.iter().filter(move |rr| rr.rtype == rtype)
    }
}
