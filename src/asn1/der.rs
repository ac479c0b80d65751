//! BER to DER canonicaliser.
//!
//! Many SS7 peers emit constructed indefinite-length forms despite the
//! nominal DER requirement, so the canonicaliser accepts arbitrary BER —
//! indefinite lengths, constructed encodings of primitive string types,
//! sloppy booleans — and re-emits the canonical DER equivalent. Everything
//! above this layer assumes DER.

use crate::asn1::{put_tlv, Length, Tag, TagClass, MAX_DEPTH};
use crate::errors::Asn1Error;
use bytes::{BufMut, BytesMut};
use tracing::trace;

/// A parsed BER element: primitive content or constructed children.
#[derive(Debug)]
struct Element {
    tag: Tag,
    value: Vec<u8>,
    children: Vec<Element>,
}

/// Convert BER bytes that may use indefinite lengths (or other non-DER
/// forms) into DER.
///
/// Input already in DER comes back byte-identical, apart from the
/// canonicalisations themselves (boolean normalisation, SET child
/// ordering).
pub fn make_der(data: &[u8]) -> Result<Vec<u8>, Asn1Error> {
    if data.is_empty() {
        return Err(Asn1Error::EmptyInput);
    }
    let (element, pos) = parse_element(data, 0, 0)?;
    if pos != data.len() {
        return Err(Asn1Error::TrailingData(pos));
    }
    let mut out = BytesMut::with_capacity(data.len());
    encode_element(element, &mut out)?;
    if &out[..] != data {
        trace!(
            input = data.len(),
            output = out.len(),
            "rewrote non-canonical encoding"
        );
    }
    Ok(out.to_vec())
}

/// Parse one element starting at `data[pos]`, handling definite and
/// indefinite lengths. Returns the element and the position just past it.
fn parse_element(data: &[u8], pos: usize, depth: usize) -> Result<(Element, usize), Asn1Error> {
    if depth > MAX_DEPTH {
        return Err(Asn1Error::DepthExceeded(MAX_DEPTH));
    }
    let start = pos;
    let (tag, tag_len) = Tag::decode(data, pos)?;
    let (length, len_len) = Length::decode(data, pos + tag_len)?;
    let mut pos = pos + tag_len + len_len;

    let mut element = Element {
        tag,
        value: Vec::new(),
        children: Vec::new(),
    };

    match length {
        Length::Indefinite => {
            if !tag.constructed {
                return Err(Asn1Error::IndefiniteLengthOnPrimitive(start));
            }
            // Children until the End-of-Contents marker.
            loop {
                if pos + 2 <= data.len() && data[pos] == 0x00 && data[pos + 1] == 0x00 {
                    pos += 2;
                    break;
                }
                if pos >= data.len() {
                    return Err(Asn1Error::Truncated(pos));
                }
                let (child, next) = parse_element(data, pos, depth + 1)?;
                element.children.push(child);
                pos = next;
            }
        }
        Length::Definite(len) => {
            let remaining = data.len() - pos;
            if len > remaining {
                return Err(Asn1Error::LengthOverrun {
                    offset: start,
                    length: len,
                    remaining,
                });
            }
            let end = pos + len;
            if tag.constructed {
                while pos < end {
                    let (child, next) = parse_element(data, pos, depth + 1)?;
                    element.children.push(child);
                    pos = next;
                }
                if pos != end {
                    return Err(Asn1Error::InvalidLength(start));
                }
            } else {
                element.value = data[pos..end].to_vec();
                pos = end;
            }
        }
    }

    Ok((element, pos))
}

/// Re-emit one element in DER.
fn encode_element(mut element: Element, out: &mut BytesMut) -> Result<(), Asn1Error> {
    if element.tag.constructed && element.tag.class == TagClass::Universal {
        flatten_constructed_string(&mut element)?;
    }

    let mut content = BytesMut::new();
    if element.tag.constructed {
        if element.tag == Tag::SET {
            // DER orders SET children lexicographically by their encoding.
            let mut encoded = Vec::with_capacity(element.children.len());
            for child in element.children {
                let mut buf = BytesMut::new();
                encode_element(child, &mut buf)?;
                encoded.push(buf);
            }
            encoded.sort();
            for item in encoded {
                content.put_slice(&item);
            }
        } else {
            for child in element.children {
                encode_element(child, &mut content)?;
            }
        }
    } else {
        normalise_boolean(&mut element);
        content.put_slice(&element.value);
    }

    put_tlv(out, element.tag, &content);
    Ok(())
}

/// DER fixes TRUE to 0xFF. Context tag 1 is covered alongside UNIVERSAL
/// BOOLEAN for the boolean-shaped markers 3GPP payloads carry at that tag.
fn normalise_boolean(element: &mut Element) {
    if element.value.len() != 1 {
        return;
    }
    let boolean_shaped = element.tag == Tag::BOOLEAN || element.tag == Tag::context(false, 1);
    if boolean_shaped && element.value[0] != 0x00 {
        element.value[0] = 0xFF;
    }
}

/// Collapse a constructed encoding of a primitive string type into the
/// single primitive encoding DER requires. Fragments must carry the parent
/// tag in primitive form.
fn flatten_constructed_string(element: &mut Element) -> Result<(), Asn1Error> {
    match element.tag.number {
        3 => {
            // BIT STRING: every fragment leads with an unused-bits octet,
            // and only the final fragment may leave bits unused.
            let mut bits = vec![0u8];
            let last = element.children.len().saturating_sub(1);
            for (i, child) in element.children.iter().enumerate() {
                if child.tag != Tag::BIT_STRING {
                    return Err(Asn1Error::MalformedFragment {
                        tag: 3,
                        reason: "fragment tag mismatch",
                    });
                }
                let Some((&unused, data)) = child.value.split_first() else {
                    return Err(Asn1Error::MalformedFragment {
                        tag: 3,
                        reason: "fragment has no content",
                    });
                };
                if i < last && unused != 0 {
                    return Err(Asn1Error::MalformedFragment {
                        tag: 3,
                        reason: "non-zero unused bits on a non-final fragment",
                    });
                }
                if i == last {
                    bits[0] = unused;
                }
                bits.extend_from_slice(data);
            }
            element.tag = Tag::BIT_STRING;
            element.value = bits;
            element.children.clear();
        }
        4 => {
            let mut octets = Vec::new();
            for child in &element.children {
                if child.tag != Tag::OCTET_STRING {
                    return Err(Asn1Error::MalformedFragment {
                        tag: 4,
                        reason: "fragment tag mismatch",
                    });
                }
                octets.extend_from_slice(&child.value);
            }
            element.tag = Tag::OCTET_STRING;
            element.value = octets;
            element.children.clear();
        }
        12 | 18..=22 | 25..=28 | 30 => {
            // Restricted character strings flatten the same way.
            let number = element.tag.number;
            let mut text = Vec::new();
            for child in &element.children {
                if child.tag != Tag::universal(false, number) {
                    return Err(Asn1Error::MalformedFragment {
                        tag: number,
                        reason: "fragment tag mismatch",
                    });
                }
                text.extend_from_slice(&child.value);
            }
            element.tag = Tag::universal(false, number);
            element.value = text;
            element.children.clear();
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indefinite_length_becomes_definite() {
        let input = [0x30, 0x80, 0x02, 0x01, 0x05, 0x00, 0x00];
        let der = make_der(&input).unwrap();
        assert_eq!(der, vec![0x30, 0x03, 0x02, 0x01, 0x05]);
    }

    #[test]
    fn indefinite_length_on_primitive_is_rejected() {
        let input = [0x04, 0x80, 0xAA, 0x00, 0x00];
        assert_eq!(
            make_der(&input).unwrap_err(),
            Asn1Error::IndefiniteLengthOnPrimitive(0)
        );
    }

    #[test]
    fn der_input_is_unchanged() {
        let input = [0x30, 0x06, 0x02, 0x01, 0x2A, 0x05, 0x00];
        assert_eq!(make_der(&input).unwrap(), input.to_vec());
    }

    #[test]
    fn constructed_octet_string_is_flattened() {
        let input = [
            0x24, 0x08, 0x04, 0x02, 0xAA, 0xBB, 0x04, 0x02, 0xCC, 0xDD,
        ];
        let der = make_der(&input).unwrap();
        assert_eq!(der, vec![0x04, 0x04, 0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn constructed_bit_string_keeps_final_unused_bits() {
        let input = [
            0x23, 0x09, 0x03, 0x03, 0x00, 0xAA, 0xBB, 0x03, 0x02, 0x04, 0xF0,
        ];
        let der = make_der(&input).unwrap();
        assert_eq!(der, vec![0x03, 0x04, 0x04, 0xAA, 0xBB, 0xF0]);
    }

    #[test]
    fn non_final_fragment_with_unused_bits_is_rejected() {
        let input = [
            0x23, 0x09, 0x03, 0x03, 0x02, 0xAA, 0xBB, 0x03, 0x02, 0x00, 0xF0,
        ];
        assert!(matches!(
            make_der(&input).unwrap_err(),
            Asn1Error::MalformedFragment { tag: 3, .. }
        ));
    }

    #[test]
    fn fragment_tag_mismatch_is_rejected() {
        let input = [0x24, 0x06, 0x04, 0x01, 0xAA, 0x03, 0x01, 0xBB];
        assert!(matches!(
            make_der(&input).unwrap_err(),
            Asn1Error::MalformedFragment { tag: 4, .. }
        ));
    }

    #[test]
    fn boolean_true_is_normalised() {
        assert_eq!(
            make_der(&[0x01, 0x01, 0x05]).unwrap(),
            vec![0x01, 0x01, 0xFF]
        );
        assert_eq!(
            make_der(&[0x01, 0x01, 0x00]).unwrap(),
            vec![0x01, 0x01, 0x00]
        );
        // Context tag 1 gets the same treatment.
        assert_eq!(
            make_der(&[0x81, 0x01, 0x01]).unwrap(),
            vec![0x81, 0x01, 0xFF]
        );
    }

    #[test]
    fn set_children_are_sorted() {
        let input = [0x31, 0x06, 0x02, 0x01, 0x02, 0x02, 0x01, 0x01];
        let der = make_der(&input).unwrap();
        assert_eq!(der, vec![0x31, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02]);
    }

    #[test]
    fn sequence_order_is_preserved() {
        let input = [0x30, 0x06, 0x02, 0x01, 0x02, 0x02, 0x01, 0x01];
        assert_eq!(make_der(&input).unwrap(), input.to_vec());
    }

    #[test]
    fn canonicalisation_is_idempotent() {
        let input = [
            0x30, 0x80, 0x24, 0x80, 0x04, 0x02, 0xAA, 0xBB, 0x04, 0x01, 0xCC, 0x00, 0x00, 0x01,
            0x01, 0x07, 0x00, 0x00,
        ];
        let once = make_der(&input).unwrap();
        let twice = make_der(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let input = [0x02, 0x01, 0x00, 0xFF];
        assert_eq!(make_der(&input).unwrap_err(), Asn1Error::TrailingData(3));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(make_der(&[]).unwrap_err(), Asn1Error::EmptyInput);
    }

    #[test]
    fn nesting_deeper_than_the_cap_is_rejected() {
        let mut inner = vec![0x05, 0x00];
        for _ in 0..70 {
            let mut wrapped = vec![0xA0];
            if inner.len() < 128 {
                wrapped.push(inner.len() as u8);
            } else {
                wrapped.push(0x81);
                wrapped.push(inner.len() as u8);
            }
            wrapped.extend_from_slice(&inner);
            inner = wrapped;
        }
        assert_eq!(
            make_der(&inner).unwrap_err(),
            Asn1Error::DepthExceeded(MAX_DEPTH)
        );
    }
}
