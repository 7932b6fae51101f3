use bitstream_io::{BitWrite, BitWriter, Endianness};

use super::ParseError;

/// Maximum number of compression pointers followed while reading one name.
const MAX_POINTER_JUMPS: usize = 16;

pub trait PacketComponent: Sized {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError>;

    /// Read the component starting at `offset` inside the full message.
    /// Returns the component and the offset just past it.
    fn read(buf: &[u8], offset: usize) -> Result<(Self, usize), ParseError>;

    fn write_labels<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
        labels: &[String],
    ) -> Result<(), ParseError> {
        for label in labels.iter().filter(|l| !l.is_empty()) {
            if label.len() > 63 {
                return Err(ParseError::InvalidLabel);
            }
            writer.write_var::<u8>(8, label.len() as u8)?;
            writer.write_bytes(label.as_bytes())?;
        }
        writer.write_var::<u8>(8, 0)?;
        Ok(())
    }
}

/// Read a possibly compressed domain name. The returned labels do not
/// include the root label.
pub fn read_name(buf: &[u8], start: usize) -> Result<(Vec<String>, usize), ParseError> {
    let mut labels = Vec::new();
    let mut offset = start;
    let mut resume_at = None;
    let mut jumps = 0;

    loop {
        let len = *buf.get(offset).ok_or(ParseError::InvalidLabel)?;

        if (len & 0xC0) == 0xC0 {
            let low = *buf.get(offset + 1).ok_or(ParseError::InvalidLabel)?;
            let pointer = u16::from_be_bytes([len & 0x3F, low]) as usize;

            jumps += 1;
            if jumps > MAX_POINTER_JUMPS || pointer >= offset {
                return Err(ParseError::InvalidLabel);
            }
            if resume_at.is_none() {
                resume_at = Some(offset + 2);
            }
            offset = pointer;
            continue;
        }

        if len == 0 {
            return Ok((labels, resume_at.unwrap_or(offset + 1)));
        }

        if len > 63 {
            return Err(ParseError::InvalidLabel);
        }

        let label_start = offset + 1;
        let label_end = label_start + len as usize;
        let raw = buf
            .get(label_start..label_end)
            .ok_or(ParseError::InvalidLabel)?;
        let label = String::from_utf8(raw.to_vec()).map_err(|_| ParseError::InvalidLabel)?;
        labels.push(label);

        offset = label_end;
    }
}

pub fn read_u16(buf: &[u8], offset: usize) -> Result<u16, ParseError> {
    buf.get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| ParseError::Truncated(offset))
}

pub fn read_u32(buf: &[u8], offset: usize) -> Result<u32, ParseError> {
    buf.get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| ParseError::Truncated(offset))
}

/// Split a presentation-format name into labels, dropping the root.
pub fn labels_from_name(name: &str) -> Vec<String> {
    name.trim_end_matches('.')
        .split('.')
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Render labels as a fully-qualified name.
pub fn name_from_labels(labels: &[String]) -> String {
    let mut name = labels
        .iter()
        .filter(|l| !l.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(".");
    name.push('.');
    name
}
