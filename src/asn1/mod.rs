//! Low-level ASN.1 tag-length-value engine.
//!
//! Identifier and length octets per ITU-T X.690, restricted to the
//! definite-length forms the TCAP codec emits. Indefinite lengths are
//! rejected here; callers that must accept them go through
//! [`der::make_der`] first.

pub mod der;

use crate::errors::Asn1Error;
use bytes::{BufMut, BytesMut};
use std::fmt;

/// Identifier-octet class bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TagClass {
    Universal = 0,
    Application = 1,
    ContextSpecific = 2,
    Private = 3,
}

impl TagClass {
    fn from_bits(byte: u8) -> Self {
        match (byte >> 6) & 0x03 {
            0 => Self::Universal,
            1 => Self::Application,
            2 => Self::ContextSpecific,
            _ => Self::Private,
        }
    }

    fn to_bits(self) -> u8 {
        (self as u8) << 6
    }
}

/// A decoded identifier: class, constructed flag and tag number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag {
    pub class: TagClass,
    pub constructed: bool,
    pub number: u32,
}

/// Continuation octets accepted for long-form tag numbers.
pub(crate) const MAX_TAG_OCTETS: usize = 6;

/// Nesting depth accepted by the recursive parsers.
pub(crate) const MAX_DEPTH: usize = 64;

/// Optional-integer omission sentinel. An optional integer field decoded to
/// this value was absent on the wire, and a field holding it is skipped when
/// encoding. Confined to this engine and the field readers above it; the
/// public model carries `Option` instead.
pub(crate) const FIELD_OMISSION: i64 = 255;

impl Tag {
    pub const fn universal(constructed: bool, number: u32) -> Self {
        Self {
            class: TagClass::Universal,
            constructed,
            number,
        }
    }

    pub const fn application(constructed: bool, number: u32) -> Self {
        Self {
            class: TagClass::Application,
            constructed,
            number,
        }
    }

    pub const fn context(constructed: bool, number: u32) -> Self {
        Self {
            class: TagClass::ContextSpecific,
            constructed,
            number,
        }
    }

    pub const BOOLEAN: Tag = Tag::universal(false, 1);
    pub const INTEGER: Tag = Tag::universal(false, 2);
    pub const BIT_STRING: Tag = Tag::universal(false, 3);
    pub const OCTET_STRING: Tag = Tag::universal(false, 4);
    pub const NULL: Tag = Tag::universal(false, 5);
    pub const OID: Tag = Tag::universal(false, 6);
    pub const EXTERNAL: Tag = Tag::universal(true, 8);
    pub const SEQUENCE: Tag = Tag::universal(true, 16);
    pub const SET: Tag = Tag::universal(true, 17);

    /// Decode an identifier starting at `buf[pos]`, returning the tag and the
    /// number of octets consumed.
    pub fn decode(buf: &[u8], pos: usize) -> Result<(Self, usize), Asn1Error> {
        let first = *buf.get(pos).ok_or(Asn1Error::Truncated(pos))?;
        let class = TagClass::from_bits(first);
        let constructed = first & 0x20 != 0;
        let bits = first & 0x1f;
        if bits < 0x1f {
            return Ok((
                Self {
                    class,
                    constructed,
                    number: u32::from(bits),
                },
                1,
            ));
        }

        // Long form: base-128 continuation octets, high bit set on all but
        // the last.
        let mut number = 0u32;
        let mut used = 1;
        loop {
            let octet = *buf.get(pos + used).ok_or(Asn1Error::Truncated(pos + used))?;
            used += 1;
            if used - 1 > MAX_TAG_OCTETS || number > u32::MAX >> 7 {
                return Err(Asn1Error::TagTooLarge(pos));
            }
            number = (number << 7) | u32::from(octet & 0x7f);
            if octet & 0x80 == 0 {
                break;
            }
        }
        Ok((
            Self {
                class,
                constructed,
                number,
            },
            used,
        ))
    }

    /// Append the identifier octets to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        let lead = self.class.to_bits() | if self.constructed { 0x20 } else { 0 };
        if self.number < 31 {
            buf.put_u8(lead | self.number as u8);
            return;
        }
        buf.put_u8(lead | 0x1f);
        put_base128(buf, self.number);
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = match self.class {
            TagClass::Universal => "UNIVERSAL",
            TagClass::Application => "APPLICATION",
            TagClass::ContextSpecific => "CONTEXT",
            TagClass::Private => "PRIVATE",
        };
        let form = if self.constructed {
            "constructed"
        } else {
            "primitive"
        };
        write!(f, "[{} {}] ({})", class, self.number, form)
    }
}

/// Decoded length octets: a definite content length or the BER indefinite
/// marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    Definite(usize),
    Indefinite,
}

impl Length {
    /// Decode length octets starting at `buf[pos]`, returning the length and
    /// the number of octets consumed.
    pub fn decode(buf: &[u8], pos: usize) -> Result<(Self, usize), Asn1Error> {
        let first = *buf.get(pos).ok_or(Asn1Error::Truncated(pos))?;
        if first & 0x80 == 0 {
            return Ok((Self::Definite(usize::from(first)), 1));
        }
        let count = usize::from(first & 0x7f);
        if count == 0 {
            return Ok((Self::Indefinite, 1));
        }
        if count > 8 {
            return Err(Asn1Error::InvalidLength(pos));
        }
        let mut value = 0usize;
        for i in 0..count {
            let octet = *buf
                .get(pos + 1 + i)
                .ok_or(Asn1Error::Truncated(pos + 1 + i))?;
            value = (value << 8) | usize::from(octet);
        }
        Ok((Self::Definite(value), 1 + count))
    }

    /// Append length octets for `len`: short form below 128, minimal long
    /// form otherwise.
    pub fn encode(len: usize, buf: &mut BytesMut) {
        if len < 128 {
            buf.put_u8(len as u8);
            return;
        }
        let mut octets = [0u8; 8];
        let mut n = len;
        let mut count = 0;
        while n > 0 {
            octets[count] = (n & 0xff) as u8;
            n >>= 8;
            count += 1;
        }
        buf.put_u8(0x80 | count as u8);
        for i in (0..count).rev() {
            buf.put_u8(octets[i]);
        }
    }
}

/// Borrowing cursor over concatenated TLV elements.
#[derive(Debug)]
pub struct TlvReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> TlvReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Decode the next identifier without consuming anything.
    pub fn peek_tag(&self) -> Result<Tag, Asn1Error> {
        Tag::decode(self.buf, self.pos).map(|(tag, _)| tag)
    }

    fn read_parts(&mut self) -> Result<(Tag, &'a [u8], &'a [u8]), Asn1Error> {
        let start = self.pos;
        let (tag, tag_len) = Tag::decode(self.buf, self.pos)?;
        let (length, len_len) = Length::decode(self.buf, self.pos + tag_len)?;
        let content_at = self.pos + tag_len + len_len;
        let content_len = match length {
            Length::Definite(n) => n,
            Length::Indefinite => return Err(Asn1Error::IndefiniteLength(start)),
        };
        let available = self.buf.len() - content_at;
        if content_len > available {
            return Err(Asn1Error::LengthOverrun {
                offset: start,
                length: content_len,
                remaining: available,
            });
        }
        let content = &self.buf[content_at..content_at + content_len];
        let full = &self.buf[start..content_at + content_len];
        self.pos = content_at + content_len;
        Ok((tag, content, full))
    }

    /// Read the next element, returning its tag and content octets.
    pub fn read(&mut self) -> Result<(Tag, &'a [u8]), Asn1Error> {
        self.read_parts().map(|(tag, content, _)| (tag, content))
    }

    /// Read the next element, returning the complete TLV octets, header
    /// included. Used for fields carried opaquely (operation parameters,
    /// user information).
    pub fn read_full(&mut self) -> Result<(Tag, &'a [u8]), Asn1Error> {
        self.read_parts().map(|(tag, _, full)| (tag, full))
    }

    /// Read an element that must carry `expected`.
    pub fn expect(&mut self, expected: Tag) -> Result<&'a [u8], Asn1Error> {
        let at = self.pos;
        let (tag, content) = self.read()?;
        if tag != expected {
            return Err(Asn1Error::UnexpectedTag {
                offset: at,
                expected,
                found: tag,
            });
        }
        Ok(content)
    }

    /// Read an optional element: consumed and returned only when the next
    /// identifier matches `expected`.
    pub fn read_optional(&mut self, expected: Tag) -> Result<Option<&'a [u8]>, Asn1Error> {
        if self.is_empty() || self.peek_tag()? != expected {
            return Ok(None);
        }
        self.read().map(|(_, content)| Some(content))
    }
}

/// Append a complete TLV holding `content` under `tag`.
pub fn put_tlv(buf: &mut BytesMut, tag: Tag, content: &[u8]) {
    tag.encode(buf);
    Length::encode(content.len(), buf);
    buf.put_slice(content);
}

/// Append an integer-valued TLV in minimal two's-complement form.
pub fn put_integer(buf: &mut BytesMut, tag: Tag, value: i64) {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    tag.encode(buf);
    Length::encode(8 - start, buf);
    buf.put_slice(&bytes[start..]);
}

/// Decode big-endian two's-complement integer content.
pub fn parse_integer(content: &[u8]) -> Result<i64, Asn1Error> {
    if content.is_empty() {
        return Err(Asn1Error::EmptyInteger);
    }
    if content.len() > 8 {
        return Err(Asn1Error::IntegerTooLarge(content.len()));
    }
    let mut value: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    for &octet in content {
        value = (value << 8) | i64::from(octet);
    }
    Ok(value)
}

/// Append an OBJECT IDENTIFIER TLV for the dotted arcs.
pub fn put_oid(buf: &mut BytesMut, arcs: &[u32]) -> Result<(), Asn1Error> {
    if arcs.len() < 2 || arcs[0] > 2 || (arcs[0] < 2 && arcs[1] > 39) {
        return Err(Asn1Error::InvalidOid);
    }
    let mut content = BytesMut::new();
    content.put_u8((arcs[0] * 40 + arcs[1]) as u8);
    for &arc in &arcs[2..] {
        put_base128(&mut content, arc);
    }
    put_tlv(buf, Tag::OID, &content);
    Ok(())
}

/// Decode OBJECT IDENTIFIER content into dotted arcs.
pub fn parse_oid(content: &[u8]) -> Result<Vec<u32>, Asn1Error> {
    if content.is_empty() {
        return Err(Asn1Error::InvalidOid);
    }
    let mut arcs = vec![u32::from(content[0] / 40), u32::from(content[0] % 40)];
    let mut arc = 0u32;
    let mut continued = false;
    for &octet in &content[1..] {
        if arc > u32::MAX >> 7 {
            return Err(Asn1Error::InvalidOid);
        }
        arc = (arc << 7) | u32::from(octet & 0x7f);
        if octet & 0x80 == 0 {
            arcs.push(arc);
            arc = 0;
            continued = false;
        } else {
            continued = true;
        }
    }
    if continued {
        return Err(Asn1Error::InvalidOid);
    }
    Ok(arcs)
}

fn put_base128(buf: &mut BytesMut, value: u32) {
    let mut octets = [0u8; 5];
    let mut n = value;
    let mut count = 0;
    loop {
        octets[count] = (n & 0x7f) as u8;
        n >>= 7;
        count += 1;
        if n == 0 {
            break;
        }
    }
    for i in (0..count).rev() {
        buf.put_u8(if i == 0 { octets[i] } else { octets[i] | 0x80 });
    }
}

/// Read an optional integer-valued field, yielding the omission sentinel
/// when the field is absent on the wire.
pub(crate) fn read_int_or_omitted(rd: &mut TlvReader<'_>, tag: Tag) -> Result<i64, Asn1Error> {
    match rd.read_optional(tag)? {
        Some(content) => parse_integer(content),
        None => Ok(FIELD_OMISSION),
    }
}

/// Write an optional integer-valued field, skipping the omission sentinel.
pub(crate) fn put_int_unless_omitted(buf: &mut BytesMut, tag: Tag, value: i64) {
    if value != FIELD_OMISSION {
        put_integer(buf, tag, value);
    }
}

/// Sentinel-to-nullable translation at the model boundary.
pub(crate) fn opt_from_sentinel(value: i64) -> Option<i64> {
    (value != FIELD_OMISSION).then_some(value)
}

/// Nullable-to-sentinel translation at the model boundary.
pub(crate) fn sentinel_from_opt(value: Option<i64>) -> i64 {
    value.unwrap_or(FIELD_OMISSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_encoding() {
        let mut buf = BytesMut::new();
        Length::encode(10, &mut buf);
        assert_eq!(&buf[..], &[10]);

        buf.clear();
        Length::encode(200, &mut buf);
        assert_eq!(&buf[..], &[0x81, 200]);

        buf.clear();
        Length::encode(1000, &mut buf);
        assert_eq!(&buf[..], &[0x82, 0x03, 0xE8]);
    }

    #[test]
    fn length_decoding() {
        assert_eq!(
            Length::decode(&[0x82, 0x03, 0xE8], 0).unwrap(),
            (Length::Definite(1000), 3)
        );
        assert_eq!(Length::decode(&[0x80], 0).unwrap(), (Length::Indefinite, 1));
        assert_eq!(Length::decode(&[0x05], 0).unwrap(), (Length::Definite(5), 1));
    }

    #[test]
    fn tag_round_trip_short_and_long_form() {
        for tag in [
            Tag::INTEGER,
            Tag::SEQUENCE,
            Tag::application(true, 12),
            Tag::context(true, 30),
            Tag::context(false, 201),
        ] {
            let mut buf = BytesMut::new();
            tag.encode(&mut buf);
            let (decoded, used) = Tag::decode(&buf, 0).unwrap();
            assert_eq!(decoded, tag);
            assert_eq!(used, buf.len());
        }
    }

    #[test]
    fn context_30_stays_short_form() {
        let mut buf = BytesMut::new();
        Tag::context(true, 30).encode(&mut buf);
        assert_eq!(&buf[..], &[0xBE]);
    }

    #[test]
    fn integer_encoding_is_minimal() {
        let cases: &[(i64, &[u8])] = &[
            (0, &[0x02, 0x01, 0x00]),
            (45, &[0x02, 0x01, 0x2D]),
            (128, &[0x02, 0x02, 0x00, 0x80]),
            (-59, &[0x02, 0x01, 0xC5]),
            (-128, &[0x02, 0x01, 0x80]),
        ];
        for (value, expected) in cases {
            let mut buf = BytesMut::new();
            put_integer(&mut buf, Tag::INTEGER, *value);
            assert_eq!(&buf[..], *expected, "value {value}");
            let parsed = parse_integer(&buf[2..]).unwrap();
            assert_eq!(parsed, *value);
        }
    }

    #[test]
    fn oid_round_trip() {
        let arcs = [0u32, 0, 17, 773, 1, 1, 1];
        let mut buf = BytesMut::new();
        put_oid(&mut buf, &arcs).unwrap();
        assert_eq!(
            &buf[..],
            &[0x06, 0x07, 0x00, 0x11, 0x86, 0x05, 0x01, 0x01, 0x01]
        );
        assert_eq!(parse_oid(&buf[2..]).unwrap(), arcs);
    }

    #[test]
    fn reader_walks_concatenated_elements() {
        let data = [0x02, 0x01, 0x2A, 0x05, 0x00];
        let mut rd = TlvReader::new(&data);
        assert_eq!(rd.expect(Tag::INTEGER).unwrap(), &[0x2A]);
        assert_eq!(rd.read_optional(Tag::NULL).unwrap(), Some(&[][..]));
        assert!(rd.is_empty());
    }

    #[test]
    fn reader_rejects_indefinite_length() {
        let data = [0x30, 0x80, 0x02, 0x01, 0x00, 0x00, 0x00];
        let mut rd = TlvReader::new(&data);
        assert_eq!(rd.read().unwrap_err(), Asn1Error::IndefiniteLength(0));
    }

    #[test]
    fn reader_rejects_overrun() {
        let data = [0x04, 0x05, 0x01];
        let mut rd = TlvReader::new(&data);
        assert!(matches!(
            rd.read().unwrap_err(),
            Asn1Error::LengthOverrun { length: 5, .. }
        ));
    }

    #[test]
    fn omission_sentinel_round_trip() {
        let data = [0x80, 0x01, 0x03];
        let mut rd = TlvReader::new(&data);
        let value = read_int_or_omitted(&mut rd, Tag::context(false, 0)).unwrap();
        assert_eq!(opt_from_sentinel(value), Some(3));

        let mut rd = TlvReader::new(&[]);
        let value = read_int_or_omitted(&mut rd, Tag::context(false, 0)).unwrap();
        assert_eq!(opt_from_sentinel(value), None);

        let mut buf = BytesMut::new();
        put_int_unless_omitted(&mut buf, Tag::context(false, 0), sentinel_from_opt(None));
        assert!(buf.is_empty());
    }
}
