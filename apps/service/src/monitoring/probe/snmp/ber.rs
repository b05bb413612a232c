//! Minimal BER codec for SNMP v1/v2c GET requests and responses.
//!
//! Only the subset of ASN.1 used by `GetRequest`/`GetResponse` PDUs is
//! supported: definite lengths, INTEGER, OCTET STRING, NULL, OBJECT
//! IDENTIFIER, SEQUENCE and the SMI application types.

use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod tag {
    pub const INTEGER: u8 = 0x02;
    pub const OCTET_STRING: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const OBJECT_IDENTIFIER: u8 = 0x06;
    pub const SEQUENCE: u8 = 0x30;
    pub const IP_ADDRESS: u8 = 0x40;
    pub const COUNTER32: u8 = 0x41;
    pub const GAUGE32: u8 = 0x42;
    pub const TIME_TICKS: u8 = 0x43;
    pub const OPAQUE: u8 = 0x44;
    pub const COUNTER64: u8 = 0x46;
    pub const NO_SUCH_OBJECT: u8 = 0x80;
    pub const NO_SUCH_INSTANCE: u8 = 0x81;
    pub const END_OF_MIB_VIEW: u8 = 0x82;
    pub const GET_REQUEST: u8 = 0xa0;
    pub const GET_RESPONSE: u8 = 0xa2;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BerError {
    #[error("unexpected end of packet")]
    Truncated,

    #[error("expected tag 0x{expected:02x}, found 0x{found:02x}")]
    UnexpectedTag { expected: u8, found: u8 },

    #[error("unsupported length encoding")]
    Length,

    #[error("integer does not fit its type")]
    IntegerOverflow,

    #[error("invalid object identifier: {0}")]
    InvalidOid(String),

    #[error("malformed {0} value")]
    Malformed(&'static str),
}

/// An OBJECT IDENTIFIER as a list of arcs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid(Vec<u32>);

impl Oid {
    pub fn arcs(&self) -> &[u32] {
        &self.0
    }

    fn to_ber(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() + 1);
        encode_arc(&mut out, self.0[0] * 40 + self.0[1]);
        for &arc in &self.0[2..] {
            encode_arc(&mut out, arc);
        }
        out
    }

    fn from_ber(content: &[u8]) -> Result<Self, BerError> {
        if content.is_empty() {
            return Err(BerError::InvalidOid("empty".into()));
        }
        if content[content.len() - 1] & 0x80 != 0 {
            return Err(BerError::Truncated);
        }

        let mut arcs = Vec::with_capacity(content.len() + 1);
        let mut value: u32 = 0;
        for &byte in content {
            value = value
                .checked_mul(128)
                .ok_or(BerError::IntegerOverflow)?
                | u32::from(byte & 0x7f);
            if byte & 0x80 == 0 {
                if arcs.is_empty() {
                    let first = (value / 40).min(2);
                    arcs.push(first);
                    arcs.push(value - first * 40);
                } else {
                    arcs.push(value);
                }
                value = 0;
            }
        }
        Ok(Oid(arcs))
    }
}

fn encode_arc(out: &mut Vec<u8>, mut value: u32) {
    let mut buf = [0u8; 5];
    let mut start = buf.len();
    loop {
        start -= 1;
        buf[start] = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    let last = buf.len() - 1;
    for byte in &mut buf[start..last] {
        *byte |= 0x80;
    }
    out.extend_from_slice(&buf[start..]);
}

impl FromStr for Oid {
    type Err = BerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('.');
        let arcs = trimmed
            .split('.')
            .map(|arc| arc.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| BerError::InvalidOid(s.to_string()))?;

        let valid = arcs.len() >= 2
            && arcs[0] <= 2
            && (arcs[0] == 2 || arcs[1] < 40)
            && (arcs[0] * 40).checked_add(arcs[1]).is_some();
        if !valid {
            return Err(BerError::InvalidOid(s.to_string()));
        }
        Ok(Oid(arcs))
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for arc in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{arc}")?;
            first = false;
        }
        Ok(())
    }
}

/// A decoded variable binding value
#[derive(Debug, Clone, PartialEq)]
pub enum SnmpValue {
    Integer(i64),
    OctetString(Vec<u8>),
    Null,
    ObjectId(Oid),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Opaque(Vec<u8>),
    Counter64(u64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
    Other(u8, Vec<u8>),
}

impl SnmpValue {
    /// `true` when the agent had no value for the requested OID
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            SnmpValue::Null
                | SnmpValue::NoSuchObject
                | SnmpValue::NoSuchInstance
                | SnmpValue::EndOfMibView
        )
    }

    pub fn to_json(&self) -> Value {
        match self {
            SnmpValue::Integer(v) => Value::from(*v),
            SnmpValue::Counter32(v) | SnmpValue::Gauge32(v) | SnmpValue::TimeTicks(v) => {
                Value::from(*v)
            }
            SnmpValue::Counter64(v) => Value::from(*v),
            SnmpValue::OctetString(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) if !text.chars().any(char::is_control) => Value::from(text),
                _ => Value::from(hex(bytes)),
            },
            SnmpValue::ObjectId(oid) => Value::from(oid.to_string()),
            SnmpValue::IpAddress([a, b, c, d]) => Value::from(format!("{a}.{b}.{c}.{d}")),
            SnmpValue::Opaque(bytes) | SnmpValue::Other(_, bytes) => Value::from(hex(bytes)),
            SnmpValue::Null
            | SnmpValue::NoSuchObject
            | SnmpValue::NoSuchInstance
            | SnmpValue::EndOfMibView => Value::Null,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            SnmpValue::Integer(v) => write_tlv(out, tag::INTEGER, &encode_integer(*v)),
            SnmpValue::OctetString(bytes) => write_tlv(out, tag::OCTET_STRING, bytes),
            SnmpValue::Null => write_tlv(out, tag::NULL, &[]),
            SnmpValue::ObjectId(oid) => write_tlv(out, tag::OBJECT_IDENTIFIER, &oid.to_ber()),
            SnmpValue::IpAddress(octets) => write_tlv(out, tag::IP_ADDRESS, octets),
            SnmpValue::Counter32(v) => {
                write_tlv(out, tag::COUNTER32, &encode_unsigned((*v).into()))
            }
            SnmpValue::Gauge32(v) => write_tlv(out, tag::GAUGE32, &encode_unsigned((*v).into())),
            SnmpValue::TimeTicks(v) => {
                write_tlv(out, tag::TIME_TICKS, &encode_unsigned((*v).into()))
            }
            SnmpValue::Opaque(bytes) => write_tlv(out, tag::OPAQUE, bytes),
            SnmpValue::Counter64(v) => write_tlv(out, tag::COUNTER64, &encode_unsigned(*v)),
            SnmpValue::NoSuchObject => write_tlv(out, tag::NO_SUCH_OBJECT, &[]),
            SnmpValue::NoSuchInstance => write_tlv(out, tag::NO_SUCH_INSTANCE, &[]),
            SnmpValue::EndOfMibView => write_tlv(out, tag::END_OF_MIB_VIEW, &[]),
            SnmpValue::Other(t, bytes) => write_tlv(out, *t, bytes),
        }
    }

    fn decode(value_tag: u8, content: &[u8]) -> Result<Self, BerError> {
        let as_u32 = |content: &[u8]| {
            decode_unsigned(content)
                .and_then(|v| u32::try_from(v).map_err(|_| BerError::IntegerOverflow))
        };
        Ok(match value_tag {
            tag::INTEGER => SnmpValue::Integer(decode_integer(content)?),
            tag::OCTET_STRING => SnmpValue::OctetString(content.to_vec()),
            tag::NULL => SnmpValue::Null,
            tag::OBJECT_IDENTIFIER => SnmpValue::ObjectId(Oid::from_ber(content)?),
            tag::IP_ADDRESS => {
                let octets: [u8; 4] =
                    content
                        .try_into()
                        .map_err(|_| BerError::Malformed("IpAddress"))?;
                SnmpValue::IpAddress(octets)
            }
            tag::COUNTER32 => SnmpValue::Counter32(as_u32(content)?),
            tag::GAUGE32 => SnmpValue::Gauge32(as_u32(content)?),
            tag::TIME_TICKS => SnmpValue::TimeTicks(as_u32(content)?),
            tag::OPAQUE => SnmpValue::Opaque(content.to_vec()),
            tag::COUNTER64 => SnmpValue::Counter64(decode_unsigned(content)?),
            tag::NO_SUCH_OBJECT => SnmpValue::NoSuchObject,
            tag::NO_SUCH_INSTANCE => SnmpValue::NoSuchInstance,
            tag::END_OF_MIB_VIEW => SnmpValue::EndOfMibView,
            other => SnmpValue::Other(other, content.to_vec()),
        })
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Outgoing GET request
#[derive(Debug, Clone)]
pub struct GetRequest<'a> {
    /// Wire version: 0 for v1, 1 for v2c
    pub version: i64,
    pub community: &'a str,
    pub request_id: i32,
    pub oids: &'a [Oid],
}

/// Decoded response PDU
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub version: i64,
    pub community: Vec<u8>,
    pub request_id: i32,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<(Oid, SnmpValue)>,
}

pub fn encode_get_request(request: &GetRequest<'_>) -> Vec<u8> {
    let bindings: Vec<(Oid, SnmpValue)> =
        request
            .oids
            .iter()
            .map(|oid| (oid.clone(), SnmpValue::Null))
            .collect();
    encode_message(
        request.version,
        request.community.as_bytes(),
        tag::GET_REQUEST,
        request.request_id,
        0,
        0,
        &bindings,
    )
}

pub fn encode_response(response: &Response) -> Vec<u8> {
    encode_message(
        response.version,
        &response.community,
        tag::GET_RESPONSE,
        response.request_id,
        response.error_status,
        response.error_index,
        &response.varbinds,
    )
}

fn encode_message(
    version: i64,
    community: &[u8],
    pdu_tag: u8,
    request_id: i32,
    error_status: i64,
    error_index: i64,
    bindings: &[(Oid, SnmpValue)],
) -> Vec<u8> {
    let mut varbinds = Vec::new();
    for (oid, value) in bindings {
        let mut binding = Vec::new();
        write_tlv(&mut binding, tag::OBJECT_IDENTIFIER, &oid.to_ber());
        value.encode(&mut binding);
        write_tlv(&mut varbinds, tag::SEQUENCE, &binding);
    }

    let mut pdu = Vec::new();
    write_tlv(&mut pdu, tag::INTEGER, &encode_integer(request_id.into()));
    write_tlv(&mut pdu, tag::INTEGER, &encode_integer(error_status));
    write_tlv(&mut pdu, tag::INTEGER, &encode_integer(error_index));
    write_tlv(&mut pdu, tag::SEQUENCE, &varbinds);

    let mut message = Vec::new();
    write_tlv(&mut message, tag::INTEGER, &encode_integer(version));
    write_tlv(&mut message, tag::OCTET_STRING, community);
    write_tlv(&mut message, pdu_tag, &pdu);

    let mut out = Vec::with_capacity(message.len() + 4);
    write_tlv(&mut out, tag::SEQUENCE, &message);
    out
}

pub fn decode_response(bytes: &[u8]) -> Result<Response, BerError> {
    let mut outer = Reader::new(bytes);
    let mut message = Reader::new(outer.expect(tag::SEQUENCE)?);

    let version = decode_integer(message.expect(tag::INTEGER)?)?;
    let community = message.expect(tag::OCTET_STRING)?.to_vec();
    let mut pdu = Reader::new(message.expect(tag::GET_RESPONSE)?);

    let request_id = i32::try_from(decode_integer(pdu.expect(tag::INTEGER)?)?)
        .map_err(|_| BerError::IntegerOverflow)?;
    let error_status = decode_integer(pdu.expect(tag::INTEGER)?)?;
    let error_index = decode_integer(pdu.expect(tag::INTEGER)?)?;

    let mut list = Reader::new(pdu.expect(tag::SEQUENCE)?);
    let mut varbinds = Vec::new();
    while !list.is_empty() {
        let mut binding = Reader::new(list.expect(tag::SEQUENCE)?);
        let oid = Oid::from_ber(binding.expect(tag::OBJECT_IDENTIFIER)?)?;
        let (value_tag, content) = binding.read_tlv()?;
        varbinds.push((oid, SnmpValue::decode(value_tag, content)?));
    }

    Ok(Response {
        version,
        community,
        request_id,
        error_status,
        error_index,
        varbinds,
    })
}

fn write_tlv(out: &mut Vec<u8>, value_tag: u8, content: &[u8]) {
    out.push(value_tag);
    write_length(out, content.len());
    out.extend_from_slice(content);
}

fn write_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let first = bytes
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(bytes.len() - 1);
    out.push(0x80 | (bytes.len() - first) as u8);
    out.extend_from_slice(&bytes[first..]);
}

/// Minimal two's complement encoding
fn encode_integer(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

fn encode_unsigned(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(bytes.len() - 1);
    let mut out = Vec::with_capacity(9);
    if bytes[first] & 0x80 != 0 {
        out.push(0);
    }
    out.extend_from_slice(&bytes[first..]);
    out
}

fn decode_integer(content: &[u8]) -> Result<i64, BerError> {
    if content.is_empty() {
        return Err(BerError::Malformed("INTEGER"));
    }
    if content.len() > 8 {
        return Err(BerError::IntegerOverflow);
    }
    let mut value: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    for &byte in content {
        value = (value << 8) | i64::from(byte);
    }
    Ok(value)
}

fn decode_unsigned(content: &[u8]) -> Result<u64, BerError> {
    let content = match content {
        [] => return Err(BerError::Malformed("unsigned")),
        [0, rest @ ..] if !rest.is_empty() => rest,
        _ => content,
    };
    if content.len() > 8 {
        return Err(BerError::IntegerOverflow);
    }
    Ok(content.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn read_byte(&mut self) -> Result<u8, BerError> {
        let byte = *self.buf.get(self.pos).ok_or(BerError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_length(&mut self) -> Result<usize, BerError> {
        let first = self.read_byte()?;
        if first & 0x80 == 0 {
            return Ok(usize::from(first));
        }
        let count = usize::from(first & 0x7f);
        if count == 0 || count > 4 {
            return Err(BerError::Length);
        }
        let mut len = 0usize;
        for _ in 0..count {
            len = (len << 8) | usize::from(self.read_byte()?);
        }
        Ok(len)
    }

    fn read_tlv(&mut self) -> Result<(u8, &'a [u8]), BerError> {
        let value_tag = self.read_byte()?;
        let len = self.read_length()?;
        let end = self.pos.checked_add(len).ok_or(BerError::Truncated)?;
        let buf = self.buf;
        let content = buf.get(self.pos..end).ok_or(BerError::Truncated)?;
        self.pos = end;
        Ok((value_tag, content))
    }

    fn expect(&mut self, expected: u8) -> Result<&'a [u8], BerError> {
        let (found, content) = self.read_tlv()?;
        if found != expected {
            return Err(BerError::UnexpectedTag { expected, found });
        }
        Ok(content)
    }
}
