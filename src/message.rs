//! The DNS message: header, question section, and the three record
//! sections (answer/authority/additional), per RFC 1035 §4.1 and the mDNS
//! extensions in RFC 6762 (the cache-flush bit piggybacked on the class
//! field of a resource record).
use std::fmt;
use std::io::Cursor;
use std::net::{Ipv4Addr, Ipv6Addr};

use dns_derive::DnsStruct;
use rand::Rng;

use crate::error::{DnsError, DnsResult};
use crate::name::Name;
use crate::wire::ToFromNetworkOrder;

pub const MAX_UDP_MESSAGE_SIZE: usize = 512;

/// The high bit of a resource record's class field doubles as mDNS's
/// cache-flush bit (RFC 6762 §10.2). It is not part of the class value
/// itself, so callers compare `ResourceClass::raw() & CLASS_MASK`.
pub const MDNS_CACHE_FLUSH_BIT: u16 = 0x8000;
const CLASS_MASK: u16 = 0x7FFF;

/// A DNS RR type. Kept as an open newtype, not a closed enum, because
/// unrecognized values (a forwarded record this crate doesn't model) must
/// round-trip unchanged rather than fail to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResourceType(pub u16);

impl ResourceType {
    pub const A: ResourceType = ResourceType(1);
    pub const NS: ResourceType = ResourceType(2);
    pub const CNAME: ResourceType = ResourceType(5);
    pub const PTR: ResourceType = ResourceType(12);
    pub const TXT: ResourceType = ResourceType(16);
    pub const AAAA: ResourceType = ResourceType(28);
    pub const SRV: ResourceType = ResourceType(33);
    pub const ANY: ResourceType = ResourceType(255);
}

impl ToFromNetworkOrder for ResourceType {
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> std::io::Result<usize> {
        self.0.to_network_bytes(buffer)
    }

    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DnsResult<()> {
        self.0.from_network_bytes(buffer)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ResourceType::A => write!(f, "A"),
            ResourceType::NS => write!(f, "NS"),
            ResourceType::CNAME => write!(f, "CNAME"),
            ResourceType::PTR => write!(f, "PTR"),
            ResourceType::TXT => write!(f, "TXT"),
            ResourceType::AAAA => write!(f, "AAAA"),
            ResourceType::SRV => write!(f, "SRV"),
            ResourceType::ANY => write!(f, "ANY"),
            ResourceType(n) => write!(f, "TYPE{}", n),
        }
    }
}

/// A DNS RR class, same open-newtype rationale as `ResourceType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceClass(pub u16);

impl ResourceClass {
    pub const IN: ResourceClass = ResourceClass(1);
    pub const ANY: ResourceClass = ResourceClass(255);

    /// The class value with mDNS's cache-flush bit masked off.
    pub fn class(&self) -> u16 {
        self.0 & CLASS_MASK
    }

    pub fn cache_flush(&self) -> bool {
        self.0 & MDNS_CACHE_FLUSH_BIT != 0
    }

    pub fn with_cache_flush(mut self, flush: bool) -> Self {
        if flush {
            self.0 |= MDNS_CACHE_FLUSH_BIT;
        } else {
            self.0 &= CLASS_MASK;
        }
        self
    }
}

impl ToFromNetworkOrder for ResourceClass {
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> std::io::Result<usize> {
        self.0.to_network_bytes(buffer)
    }

    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DnsResult<()> {
        self.0.from_network_bytes(buffer)
    }
}

/// A four bit field specifying the kind of query, RFC 1035 §4.1.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpCode {
    #[default]
    Query,
    IQuery,
    Status,
    Notify,
    Update,
    Other(u8),
}

impl OpCode {
    fn from_bits(bits: u8) -> Self {
        match bits {
            0 => OpCode::Query,
            1 => OpCode::IQuery,
            2 => OpCode::Status,
            4 => OpCode::Notify,
            5 => OpCode::Update,
            n => OpCode::Other(n),
        }
    }

    fn to_bits(self) -> u8 {
        match self {
            OpCode::Query => 0,
            OpCode::IQuery => 1,
            OpCode::Status => 2,
            OpCode::Notify => 4,
            OpCode::Update => 5,
            OpCode::Other(n) => n,
        }
    }
}

/// The response code, RFC 1035 §4.1.1. Open, since it rides in a 4 bit
/// field of which several values are IANA-reserved or future-assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResponseCode(pub u8);

impl ResponseCode {
    pub const NO_ERROR: ResponseCode = ResponseCode(0);
    pub const FORM_ERR: ResponseCode = ResponseCode(1);
    pub const SERV_FAIL: ResponseCode = ResponseCode(2);
    pub const NX_DOMAIN: ResponseCode = ResponseCode(3);
    pub const NOT_IMP: ResponseCode = ResponseCode(4);
    pub const REFUSED: ResponseCode = ResponseCode(5);
}

/// The 16 bit flag word of the header, RFC 1035 §4.1.1, decoded into its
/// named bit fields. Bit numbering below is from the MSB of the word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub is_response: bool,
    pub op_code: OpCode,
    pub authoritative: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub authentic_data: bool,
    pub checking_disabled: bool,
    pub response_code: ResponseCode,
}

impl ToFromNetworkOrder for Flags {
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> std::io::Result<usize> {
        let mut word: u16 = 0;
        word |= (self.is_response as u16) << 15;
        word |= (self.op_code.to_bits() as u16 & 0b1111) << 11;
        word |= (self.authoritative as u16) << 10;
        word |= (self.truncated as u16) << 9;
        word |= (self.recursion_desired as u16) << 8;
        word |= (self.recursion_available as u16) << 7;
        word |= (self.authentic_data as u16) << 5;
        word |= (self.checking_disabled as u16) << 4;
        word |= self.response_code.0 as u16 & 0b1111;
        word.to_network_bytes(buffer)
    }

    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DnsResult<()> {
        let mut word = 0u16;
        word.from_network_bytes(buffer)?;
        self.is_response = word & (1 << 15) != 0;
        self.op_code = OpCode::from_bits(((word >> 11) & 0b1111) as u8);
        self.authoritative = word & (1 << 10) != 0;
        self.truncated = word & (1 << 9) != 0;
        self.recursion_desired = word & (1 << 8) != 0;
        self.recursion_available = word & (1 << 7) != 0;
        self.authentic_data = word & (1 << 5) != 0;
        self.checking_disabled = word & (1 << 4) != 0;
        self.response_code = ResponseCode((word & 0b1111) as u8);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, DnsStruct)]
pub struct Header {
    pub id: u16,
    pub flags: Flags,
    pub qd_count: u16,
    pub an_count: u16,
    pub ns_count: u16,
    pub ar_count: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub qname: Name,
    pub qtype: ResourceType,
    pub qclass: ResourceClass,
}

impl ToFromNetworkOrder for Question {
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> std::io::Result<usize> {
        let start = buffer.len();
        self.qname.to_network_bytes(buffer)?;
        self.qtype.to_network_bytes(buffer)?;
        self.qclass.to_network_bytes(buffer)?;
        Ok(buffer.len() - start)
    }

    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DnsResult<()> {
        self.qname.from_network_bytes(buffer)?;
        self.qtype.from_network_bytes(buffer)?;
        self.qclass.from_network_bytes(buffer)?;
        Ok(())
    }
}

impl Default for Question {
    fn default() -> Self {
        Question {
            qname: Name::root(),
            qtype: ResourceType::A,
            qclass: ResourceClass::IN,
        }
    }
}

/// `SRV`'s priority/weight/port triple, RFC 2782. Purely sequential, so it
/// can ride the struct derive; the trailing target name is kept on
/// `RecordData::Srv` instead, since it needs the whole-message buffer for
/// compression and the derive only ever sees the field's own bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, DnsStruct)]
pub struct SrvData {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
}

/// The typed payload of a resource record. `Raw` is the escape hatch for
/// every RR type this crate doesn't model explicitly (HINFO, SOA, MX, OPT,
/// DNSSEC types...), keeping the parser total over any well-formed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ptr(Name),
    Srv { data: SrvData, target: Name },
    Txt(Vec<Vec<u8>>),
    /// Any RR type this crate doesn't model explicitly. `rtype` carries the
    /// original numeric tag so a decoded-then-reencoded record keeps its
    /// real type rather than collapsing to an arbitrary placeholder.
    Raw { rtype: ResourceType, bytes: Vec<u8> },
}

impl RecordData {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            RecordData::A(_) => ResourceType::A,
            RecordData::Aaaa(_) => ResourceType::AAAA,
            RecordData::Ptr(_) => ResourceType::PTR,
            RecordData::Srv { .. } => ResourceType::SRV,
            RecordData::Txt(_) => ResourceType::TXT,
            RecordData::Raw { rtype, .. } => *rtype,
        }
    }

    fn encode_rdata(&self, buffer: &mut Vec<u8>) -> std::io::Result<()> {
        match self {
            RecordData::A(addr) => buffer.extend_from_slice(&addr.octets()),
            RecordData::Aaaa(addr) => buffer.extend_from_slice(&addr.octets()),
            RecordData::Ptr(name) => {
                name.to_network_bytes(buffer)?;
            }
            RecordData::Srv { data, target } => {
                data.to_network_bytes(buffer)?;
                target.to_network_bytes(buffer)?;
            }
            RecordData::Txt(strings) => {
                for s in strings {
                    buffer.push(s.len() as u8);
                    buffer.extend_from_slice(s);
                }
            }
            RecordData::Raw { bytes, .. } => buffer.extend_from_slice(bytes),
        }
        Ok(())
    }

    /// Names inside RDATA (PTR's target, SRV's target) do not compress
    /// against the rest of the message in this crate: rdlength must be
    /// known before the bytes are written, so we encode each record's
    /// RDATA into a scratch buffer first and never see earlier offsets.
    fn decode(
        rtype: ResourceType,
        rdata: &[u8],
        full_message: &[u8],
        rdata_offset: usize,
    ) -> DnsResult<Self> {
        match rtype {
            ResourceType::A => {
                let bytes: [u8; 4] = rdata
                    .try_into()
                    .map_err(|_| DnsError::malformed("A record rdata is not 4 octets"))?;
                Ok(RecordData::A(Ipv4Addr::from(bytes)))
            }
            ResourceType::AAAA => {
                let bytes: [u8; 16] = rdata
                    .try_into()
                    .map_err(|_| DnsError::malformed("AAAA record rdata is not 16 octets"))?;
                Ok(RecordData::Aaaa(Ipv6Addr::from(bytes)))
            }
            ResourceType::PTR => {
                let mut cursor = Cursor::new(full_message);
                cursor.set_position(rdata_offset as u64);
                let name = Name::from_network_bytes_compressed(&mut cursor, full_message)?;
                Ok(RecordData::Ptr(name))
            }
            ResourceType::SRV => {
                if rdata.len() < 6 {
                    return Err(DnsError::UnexpectedEof);
                }
                let mut data = SrvData::default();
                let mut header_cursor = Cursor::new(&rdata[..6]);
                data.from_network_bytes(&mut header_cursor)?;

                let mut cursor = Cursor::new(full_message);
                cursor.set_position((rdata_offset + 6) as u64);
                let target = Name::from_network_bytes_compressed(&mut cursor, full_message)?;
                Ok(RecordData::Srv { data, target })
            }
            ResourceType::TXT => {
                let mut strings = Vec::new();
                let mut i = 0;
                while i < rdata.len() {
                    let len = rdata[i] as usize;
                    i += 1;
                    let end = i + len;
                    if end > rdata.len() {
                        return Err(DnsError::UnexpectedEof);
                    }
                    strings.push(rdata[i..end].to_vec());
                    i = end;
                }
                Ok(RecordData::Txt(strings))
            }
            rtype => Ok(RecordData::Raw {
                rtype,
                bytes: rdata.to_vec(),
            }),
        }
    }
}

/// A single resource record. Hand-written because RDATA's shape and length
/// depend on the preceding `rtype`/`rdlength` fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: Name,
    pub class: ResourceClass,
    pub ttl: u32,
    pub data: RecordData,
}

impl ToFromNetworkOrder for Record {
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> std::io::Result<usize> {
        let start = buffer.len();
        self.name.to_network_bytes(buffer)?;
        self.data.resource_type().to_network_bytes(buffer)?;
        self.class.to_network_bytes(buffer)?;
        self.ttl.to_network_bytes(buffer)?;

        let mut rdata = Vec::new();
        self.data.encode_rdata(&mut rdata)?;
        (rdata.len() as u16).to_network_bytes(buffer)?;
        buffer.extend_from_slice(&rdata);

        Ok(buffer.len() - start)
    }

    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DnsResult<()> {
        let full = (*buffer.get_ref()).to_owned();
        self.name = Name::from_network_bytes_compressed(buffer, &full)?;

        let mut rtype = ResourceType::default();
        rtype.from_network_bytes(buffer)?;
        self.class.from_network_bytes(buffer)?;
        self.ttl.from_network_bytes(buffer)?;

        let mut rdlength = 0u16;
        rdlength.from_network_bytes(buffer)?;

        let rdata_offset = buffer.position() as usize;
        let rdata_end = rdata_offset + rdlength as usize;
        let rdata = full
            .get(rdata_offset..rdata_end)
            .ok_or(DnsError::UnexpectedEof)?;

        self.data = RecordData::decode(rtype, rdata, &full, rdata_offset)?;
        buffer.set_position(rdata_end as u64);
        Ok(())
    }
}

impl Default for Record {
    fn default() -> Self {
        Record {
            name: Name::root(),
            class: ResourceClass::IN,
            ttl: 0,
            data: RecordData::Raw {
                rtype: ResourceType(0),
                bytes: Vec::new(),
            },
        }
    }
}

/// A complete message: the header plus its four sections. Section sizes
/// are driven by the header's counts rather than a derive macro, since the
/// counts must be kept in lockstep with `Vec::push`/`Vec::len`.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authorities: Vec<Record>,
    pub additionals: Vec<Record>,
}

impl Message {
    /// A fresh outgoing query with a random transaction id, as the default
    /// resolver constructs one for each lookup.
    pub fn new_query() -> Self {
        let mut header = Header::default();
        header.id = rand::thread_rng().gen();
        header.flags.op_code = OpCode::Query;
        header.flags.recursion_desired = true;
        Message {
            header,
            ..Default::default()
        }
    }

    pub fn push_question(&mut self, question: Question) {
        self.header.qd_count += 1;
        self.questions.push(question);
    }

    pub fn to_bytes(&self) -> DnsResult<Vec<u8>> {
        let mut buffer = Vec::new();
        self.to_network_bytes(&mut buffer)
            .map_err(DnsError::from)?;
        if buffer.len() > MAX_UDP_MESSAGE_SIZE {
            return Err(DnsError::TooLarge);
        }
        Ok(buffer)
    }

    pub fn from_bytes(bytes: &[u8]) -> DnsResult<Self> {
        let mut message = Message::default();
        let mut cursor = Cursor::new(bytes);
        message.from_network_bytes(&mut cursor)?;
        Ok(message)
    }
}

impl ToFromNetworkOrder for Message {
    fn to_network_bytes(&self, buffer: &mut Vec<u8>) -> std::io::Result<usize> {
        let start = buffer.len();
        self.header.to_network_bytes(buffer)?;
        for q in &self.questions {
            q.to_network_bytes(buffer)?;
        }
        for r in &self.answers {
            r.to_network_bytes(buffer)?;
        }
        for r in &self.authorities {
            r.to_network_bytes(buffer)?;
        }
        for r in &self.additionals {
            r.to_network_bytes(buffer)?;
        }
        Ok(buffer.len() - start)
    }

    fn from_network_bytes(&mut self, buffer: &mut Cursor<&[u8]>) -> DnsResult<()> {
        self.header.from_network_bytes(buffer)?;

        if self.header.flags.truncated {
            return Err(DnsError::Truncated);
        }

        for _ in 0..self.header.qd_count {
            let mut q = Question::default();
            q.from_network_bytes(buffer)?;
            self.questions.push(q);
        }
        for _ in 0..self.header.an_count {
            let mut r = Record::default();
            r.from_network_bytes(buffer)?;
            self.answers.push(r);
        }
        for _ in 0..self.header.ns_count {
            let mut r = Record::default();
            r.from_network_bytes(buffer)?;
            self.authorities.push(r);
        }
        for _ in 0..self.header.ar_count {
            let mut r = Record::default();
            r.from_network_bytes(buffer)?;
            self.additionals.push(r);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_roundtrip_preserves_every_bit() {
        let flags = Flags {
            is_response: true,
            op_code: OpCode::Status,
            authoritative: true,
            truncated: false,
            recursion_desired: true,
            recursion_available: true,
            authentic_data: true,
            checking_disabled: true,
            response_code: ResponseCode::NX_DOMAIN,
        };
        let mut buf = Vec::new();
        flags.to_network_bytes(&mut buf).unwrap();

        let mut decoded = Flags::default();
        let mut cursor = Cursor::new(buf.as_slice());
        decoded.from_network_bytes(&mut cursor).unwrap();
        assert_eq!(decoded, flags);
    }

    #[test]
    fn a_query_encodes_expected_question_section() {
        let mut msg = Message::new_query();
        msg.push_question(Question {
            qname: "example.com".parse().unwrap(),
            qtype: ResourceType::A,
            qclass: ResourceClass::IN,
        });
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(msg.header.qd_count, 1);
        // header(12) + qname(13: 7+1+3+1+1) + qtype(2) + qclass(2)
        assert_eq!(bytes.len(), 12 + 13 + 2 + 2);
    }

    #[test]
    fn srv_record_roundtrips() {
        let record = Record {
            name: "_http._tcp.example.com".parse().unwrap(),
            class: ResourceClass::IN,
            ttl: 120,
            data: RecordData::Srv {
                data: SrvData {
                    priority: 0,
                    weight: 0,
                    port: 8080,
                },
                target: "host.example.com".parse().unwrap(),
            },
        };
        let mut buf = Vec::new();
        record.to_network_bytes(&mut buf).unwrap();

        let mut decoded = Record::default();
        let mut cursor = Cursor::new(buf.as_slice());
        decoded.from_network_bytes(&mut cursor).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn txt_record_concatenates_character_strings() {
        let record = Record {
            name: "host.local".parse().unwrap(),
            class: ResourceClass::IN,
            ttl: 4500,
            data: RecordData::Txt(vec![b"a=1".to_vec(), b"b=2".to_vec()]),
        };
        let mut buf = Vec::new();
        record.to_network_bytes(&mut buf).unwrap();

        let mut decoded = Record::default();
        let mut cursor = Cursor::new(buf.as_slice());
        decoded.from_network_bytes(&mut cursor).unwrap();
        match decoded.data {
            RecordData::Txt(strings) => {
                assert_eq!(strings, vec![b"a=1".to_vec(), b"b=2".to_vec()]);
            }
            _ => panic!("expected TXT data"),
        }
    }

    #[test]
    fn unmodeled_type_roundtrips_through_raw_with_its_original_tag() {
        // SOA (6) has no dedicated variant; it must survive decode/re-encode
        // as `Raw` carrying its real type number, not an arbitrary one.
        let record = Record {
            name: "example.com".parse().unwrap(),
            class: ResourceClass::IN,
            ttl: 3600,
            data: RecordData::Raw {
                rtype: ResourceType(6),
                bytes: vec![0xde, 0xad, 0xbe, 0xef],
            },
        };
        let mut buf = Vec::new();
        record.to_network_bytes(&mut buf).unwrap();

        let mut decoded = Record::default();
        let mut cursor = Cursor::new(buf.as_slice());
        decoded.from_network_bytes(&mut cursor).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.data.resource_type(), ResourceType(6));
    }

    #[test]
    fn cache_flush_bit_is_separate_from_class_value() {
        let class = ResourceClass::IN.with_cache_flush(true);
        assert!(class.cache_flush());
        assert_eq!(class.class(), 1);
    }

    #[test]
    fn overlong_label_is_rejected_on_encode_as_malformed() {
        let mut msg = Message::new_query();
        msg.push_question(Question {
            qname: Name(vec!["a".repeat(64)]),
            qtype: ResourceType::A,
            qclass: ResourceClass::IN,
        });
        let err = msg.to_bytes().unwrap_err();
        assert!(matches!(err, DnsError::Malformed(_)));
    }

    #[test]
    fn truncated_message_is_rejected() {
        let mut msg = Message::new_query();
        msg.header.flags.truncated = true;
        let mut buf = Vec::new();
        msg.to_network_bytes(&mut buf).unwrap();

        let err = Message::from_bytes(&buf).unwrap_err();
        assert!(matches!(err, DnsError::Truncated));
    }

    #[test]
    fn declared_question_count_past_buffer_end_is_eof() {
        // Header alone, claiming one question that is never written.
        let mut header = Header::default();
        header.qd_count = 1;
        let mut buf = Vec::new();
        header.to_network_bytes(&mut buf).unwrap();

        let err = Message::from_bytes(&buf).unwrap_err();
        assert!(matches!(err, DnsError::UnexpectedEof));
    }

    #[test]
    fn repeated_name_decodes_identically_across_two_records() {
        let mut buf = Vec::new();
        let mut header = Header::default();
        header.an_count = 2;
        header.to_network_bytes(&mut buf).unwrap();

        let first = Record {
            name: "example.com".parse().unwrap(),
            class: ResourceClass::IN,
            ttl: 60,
            data: RecordData::A(Ipv4Addr::new(127, 0, 0, 1)),
        };
        first.to_network_bytes(&mut buf).unwrap();

        let second = Record {
            name: "example.com".parse().unwrap(),
            class: ResourceClass::IN,
            ttl: 60,
            data: RecordData::A(Ipv4Addr::new(127, 0, 0, 2)),
        };
        second.to_network_bytes(&mut buf).unwrap();

        let decoded = Message::from_bytes(&buf).unwrap();
        assert_eq!(decoded.answers.len(), 2);
        assert_eq!(decoded.answers[0].name, decoded.answers[1].name);
    }
}
