//! Domain names: the one wire type whose encoding depends on where it sits
//! in the message (compression back-pointers reference earlier offsets), so
//! it is implemented by hand rather than through the `DnsStruct` derive.
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Cursor};
use std::str::FromStr;

use crate::error::{DnsError, DnsResult};
use crate::wire::ToFromNetworkOrder;

/// Top two bits of a label length byte set means "this byte and the next
/// one form a 14-bit back-pointer", per RFC 1035 §4.1.4.
const POINTER_MASK: u8 = 0b1100_0000;
const POINTER_OFFSET_MASK: u16 = 0b0011_1111_1111_1111;

/// Labels in the reserved 64..=191 range are neither a plain length nor a
/// pointer prefix; RFC 1035 leaves them undefined, so we reject them.
const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;

/// A dot-separated domain name, stored as its individual labels so the
/// trailing root label never has to be special-cased as an empty `String`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Name(pub Vec<String>);

impl Name {
    pub fn root() -> Self {
        Name(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// True when this name sits under `.local`, the mDNS link-local domain.
    pub fn is_local(&self) -> bool {
        self.0
            .last()
            .map(|l| l.eq_ignore_ascii_case("local"))
            .unwrap_or(false)
    }

    /// Encode without using any compression pointer, recording every label
    /// boundary it writes so a later name can point back into this one.
    ///
    /// `offsets` maps a label suffix (e.g. `["example", "com"]`) to the byte
    /// offset in `buffer` at which that suffix was first written.
    pub fn to_network_bytes_compressed(
        &self,
        buffer: &mut Vec<u8>,
        offsets: &mut HashMap<Vec<String>, u16>,
    ) -> std::io::Result<usize> {
        let start_len = buffer.len();
        let mut labels = self.0.as_slice();

        loop {
            if labels.is_empty() {
                buffer.push(0);
                break;
            }

            let suffix = labels.to_vec();
            if let Some(&pointer) = offsets.get(&suffix) {
                let encoded = POINTER_MASK as u16 * 256 | pointer;
                buffer.push((encoded >> 8) as u8);
                buffer.push((encoded & 0xFF) as u8);
                break;
            }

            // Only record offsets that fit in the 14-bit pointer field.
            if buffer.len() <= POINTER_OFFSET_MASK as usize {
                offsets.insert(suffix, buffer.len() as u16);
            }

            let label = &labels[0];
            if label.len() > MAX_LABEL_LEN {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("label exceeds 63 octets: {:?}", label),
                ));
            }
            buffer.push(label.len() as u8);
            buffer.extend_from_slice(label.as_bytes());
            labels = &labels[1..];
        }

        Ok(buffer.len() - start_len)
    }

    /// Decode a name starting at the cursor's current position, following
    /// compression pointers as needed. Pointers may only point backwards, so
    /// a simple strictly-decreasing-offset check rules out cycles.
    pub fn from_network_bytes_compressed(
        buffer: &mut Cursor<&[u8]>,
        full_message: &[u8],
    ) -> DnsResult<Self> {
        let mut labels = Vec::new();
        let mut total_len = 0usize;
        let mut jumped = false;
        let mut last_pointer_target = full_message.len() as u64 + 1;
        let start_pos = buffer.position();
        let mut pos = start_pos;

        loop {
            let len_byte = *full_message
                .get(pos as usize)
                .ok_or(DnsError::UnexpectedEof)?;

            if len_byte == 0 {
                pos += 1;
                break;
            } else if len_byte & POINTER_MASK == POINTER_MASK {
                let lo = *full_message
                    .get(pos as usize + 1)
                    .ok_or(DnsError::UnexpectedEof)?;
                let pointer =
                    (((len_byte as u16) << 8 | lo as u16) & POINTER_OFFSET_MASK) as u64;

                if !jumped {
                    pos += 2;
                    buffer.set_position(pos);
                }
                if pointer >= last_pointer_target {
                    return Err(DnsError::malformed("name compression pointer cycle"));
                }
                last_pointer_target = pointer;
                jumped = true;
                pos = pointer;
                continue;
            } else if len_byte & POINTER_MASK != 0 {
                return Err(DnsError::malformed(format!(
                    "reserved label length byte 0x{:02x}",
                    len_byte
                )));
            } else {
                let len = len_byte as usize;
                if len > MAX_LABEL_LEN {
                    return Err(DnsError::malformed("label exceeds 63 octets"));
                }
                let label_start = pos as usize + 1;
                let label_end = label_start + len;
                let raw = full_message
                    .get(label_start..label_end)
                    .ok_or(DnsError::UnexpectedEof)?;
                let label = std::str::from_utf8(raw)?.to_owned();

                total_len += len + 1;
                if total_len > MAX_NAME_LEN {
                    return Err(DnsError::malformed("name exceeds 255 octets"));
                }
                labels.push(label);
                pos = label_end as u64;
            }
        }

        if !jumped {
            buffer.set_position(pos);
        }

        Ok(Name(labels))
    }
}

impl ToFromNetworkOrder for Name {
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> std::io::Result<usize> {
        let mut offsets = HashMap::new();
        self.to_network_bytes_compressed(buffer, &mut offsets)
    }

    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DnsResult<()> {
        let full = (*buffer.get_ref()).to_owned();
        *self = Name::from_network_bytes_compressed(buffer, &full)?;
        Ok(())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, ".")
        } else {
            write!(f, "{}", self.0.join("."))
        }
    }
}

impl FromStr for Name {
    type Err = DnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim_end_matches('.');
        if trimmed.is_empty() {
            return Ok(Name::root());
        }
        let labels: Vec<String> = trimmed.split('.').map(|l| l.to_owned()).collect();
        for label in &labels {
            if label.is_empty() || label.len() > MAX_LABEL_LEN {
                return Err(DnsError::malformed(format!("invalid label '{}'", label)));
            }
        }
        Ok(Name(labels))
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| Name::root())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let n: Name = "www.example.com".parse().unwrap();
        assert_eq!(n.0, vec!["www", "example", "com"]);
        assert_eq!(n.to_string(), "www.example.com");
    }

    #[test]
    fn root_is_empty() {
        let n: Name = ".".parse().unwrap();
        assert!(n.is_root());
        assert_eq!(n.to_string(), ".");
    }

    #[test]
    fn is_local_matches_suffix() {
        let n: Name = "myhost.local".parse().unwrap();
        assert!(n.is_local());
        let n2: Name = "example.com".parse().unwrap();
        assert!(!n2.is_local());
    }

    #[test]
    fn roundtrips_without_compression() {
        let n: Name = "a.b.c".parse().unwrap();
        let mut buf = Vec::new();
        n.to_network_bytes(&mut buf).unwrap();
        assert_eq!(buf, vec![1, b'a', 1, b'b', 1, b'c', 0]);

        let mut cursor = Cursor::new(buf.as_slice());
        let decoded = Name::from_network_bytes_compressed(&mut cursor, &buf).unwrap();
        assert_eq!(decoded, n);
    }

    #[test]
    fn follows_compression_pointer() {
        // First name written at offset 0, second name is a bare pointer to it.
        let first: Name = "example.com".parse().unwrap();
        let mut buf = Vec::new();
        let mut offsets = HashMap::new();
        first
            .to_network_bytes_compressed(&mut buf, &mut offsets)
            .unwrap();

        let pointer_offset = buf.len();
        buf.push(0xC0);
        buf.push(0x00);

        let mut cursor = Cursor::new(buf.as_slice());
        cursor.set_position(pointer_offset as u64);
        let decoded = Name::from_network_bytes_compressed(&mut cursor, &buf).unwrap();
        assert_eq!(decoded, first);
    }

    #[test]
    fn label_of_exactly_63_octets_encodes() {
        let label = "a".repeat(MAX_LABEL_LEN);
        let n = Name(vec![label]);
        let mut buf = Vec::new();
        n.to_network_bytes(&mut buf).unwrap();
        assert_eq!(buf[0], MAX_LABEL_LEN as u8);
    }

    #[test]
    fn label_of_64_octets_is_rejected_on_encode() {
        let label = "a".repeat(MAX_LABEL_LEN + 1);
        let n = Name(vec![label]);
        let mut buf = Vec::new();
        let err = n.to_network_bytes(&mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn rejects_reserved_length_byte() {
        let buf = vec![0b1000_0000u8, 0x00];
        let mut cursor = Cursor::new(buf.as_slice());
        let err = Name::from_network_bytes_compressed(&mut cursor, &buf).unwrap_err();
        assert!(matches!(err, DnsError::Malformed(_)));
    }

    #[test]
    fn rejects_pointer_cycle() {
        // A pointer at offset 0 that points to itself.
        let buf = vec![0xC0u8, 0x00];
        let mut cursor = Cursor::new(buf.as_slice());
        let err = Name::from_network_bytes_compressed(&mut cursor, &buf).unwrap_err();
        assert!(matches!(err, DnsError::Malformed(_)));
    }
}
