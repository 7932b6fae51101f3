/// Calculate the key tag for a DNSKEY record (RFC 4034 Appendix B)
pub fn calculate_key_tag(flags: u16, protocol: u8, algorithm: u8, public_key: &[u8]) -> u16 {
    // RSA/MD5 uses the most significant 16 of the least significant 24 bits
    // of the modulus instead of the checksum.
    if algorithm == 1 {
        let len = public_key.len();
        if len >= 3 {
            return u16::from_be_bytes([public_key[len - 3], public_key[len - 2]]);
        }
        return 0;
    }

    let header = [
        (flags >> 8) as u8,
        (flags & 0xFF) as u8,
        protocol,
        algorithm,
    ];

    let mut accumulator: u32 = 0;
    for (i, &byte) in header.iter().chain(public_key).enumerate() {
        if i % 2 == 0 {
            accumulator += u32::from(byte) << 8;
        } else {
            accumulator += u32::from(byte);
        }
    }

    accumulator += (accumulator >> 16) & 0xFFFF;
    (accumulator & 0xFFFF) as u16
}
