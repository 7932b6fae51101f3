use bitstream_io::{BitWrite, BitWriter, Endianness};

use super::{
    ParseError,
    common::{PacketComponent, name_from_labels, read_name, read_u16, read_u32},
    enums::{DNSResourceClass, DNSResourceType},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSResource {
    pub labels: Vec<String>,
    pub rtype: DNSResourceType,
    pub rclass: DNSResourceClass,
    pub ttl: u32,
    /// Raw RDATA. DNSKEY RDATA never contains compressed names, so no
    /// decompression happens here.
    pub rdata: Vec<u8>,
}

impl DNSResource {
    /// Owner name in fully-qualified form.
    pub fn name(&self) -> String {
        name_from_labels(&self.labels)
    }
}

impl PacketComponent for DNSResource {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        self.write_labels(writer, &self.labels)?;
        writer.write_var::<u16>(16, self.rtype.into())?;
        writer.write_var::<u16>(16, self.rclass.into())?;
        writer.write_var::<u32>(32, self.ttl)?;
        writer.write_var::<u16>(16, self.rdata.len() as u16)?;
        writer.write_bytes(&self.rdata)?;
        Ok(())
    }

    fn read(buf: &[u8], offset: usize) -> Result<(Self, usize), ParseError> {
        let (labels, offset) = read_name(buf, offset)?;
        let rtype = read_u16(buf, offset)?.into();
        let rclass = read_u16(buf, offset + 2)?.into();
        let ttl = read_u32(buf, offset + 4)?;
        let rdlength = read_u16(buf, offset + 8)? as usize;

        let rdata_start = offset + 10;
        let rdata_end = rdata_start + rdlength;
        let rdata = buf
            .get(rdata_start..rdata_end)
            .ok_or(ParseError::Truncated(rdata_start))?
            .to_vec();

        Ok((
            DNSResource {
                labels,
                rtype,
                rclass,
                ttl,
                rdata,
            },
            rdata_end,
        ))
    }
}
