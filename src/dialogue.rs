//! Dialogue portion: the AARQ/AARE/ABRT APDUs inside the EXTERNAL wrapper.
//!
//! On the wire the structured dialogue is an ASN.1 EXTERNAL with no inner
//! identification fields; the abstract-syntax OID discriminates the type.
//! EXTERNAL (`0x28`) and SEQUENCE (`0x30`) are byte-compatible in their
//! length and content octets, so the codec substitutes the identifier octet
//! on an owned copy and walks the payload as a SEQUENCE.

use crate::asn1::{self, Tag, TlvReader};
use crate::errors::{Asn1Error, Result, TcapError};
use crate::{ACN_PREFIX, DIALOGUE_AS_ID, PROTOCOL_VERSION, UNIDIALOGUE_AS_ID};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};

/// EXTERNAL identifier octet (universal 8, constructed).
pub(crate) const EXTERNAL_TAG: u8 = 0x28;
/// SEQUENCE identifier octet (universal 16, constructed).
pub(crate) const SEQUENCE_TAG: u8 = 0x30;

const TAG_AARQ: Tag = Tag::application(true, 0);
const TAG_AARE: Tag = Tag::application(true, 1);
const TAG_ABRT: Tag = Tag::application(true, 4);
const TAG_PDU: Tag = Tag::context(true, 0);
const TAG_PROTOCOL_VERSION: Tag = Tag::context(false, 0);
const TAG_ACN: Tag = Tag::context(true, 1);
const TAG_RESULT: Tag = Tag::context(true, 2);
const TAG_DIAGNOSTIC: Tag = Tag::context(true, 3);
const TAG_DIAGNOSTIC_USER: Tag = Tag::context(true, 1);
const TAG_DIAGNOSTIC_PROVIDER: Tag = Tag::context(true, 2);
const TAG_ABORT_SOURCE: Tag = Tag::context(false, 0);
const TAG_USER_INFORMATION: Tag = Tag::context(true, 30);

/// Structured dialogue carried in a DialoguePortion or as a U-Abort cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialogue {
    /// Abstract-syntax OID, canonically [`DIALOGUE_AS_ID`] for structured
    /// dialogues and [`UNIDIALOGUE_AS_ID`] for unidialogue payloads.
    pub dialogue_as_id: Option<Vec<u32>>,
    pub pdu: DialoguePdu,
}

/// Dialogue APDU CHOICE, discriminated by application tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialoguePdu {
    /// AARQ, association request. Unidialogue AUDT payloads share the
    /// shape and the tag and land here too, with [`UNIDIALOGUE_AS_ID`] as
    /// the discriminator.
    Request(Aarq),
    /// AARE, association response.
    Response(Aare),
    /// ABRT, association abort.
    Abort(Abrt),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aarq {
    /// Padded protocol-version octet, normally [`PROTOCOL_VERSION`].
    pub protocol_version: Option<u8>,
    /// Full ACN arcs, prefix included; see [`acn_name`] and [`acn`].
    pub application_context_name: Vec<u32>,
    /// Opaque EXTERNAL-wrapped payload, complete TLV.
    pub user_information: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aare {
    pub protocol_version: Option<u8>,
    pub application_context_name: Vec<u32>,
    /// See [`associate_result`].
    pub result: u8,
    pub result_source_diagnostic: Option<SourceDiagnostic>,
    pub user_information: Option<Vec<u8>>,
}

/// AARE result-source-diagnostic CHOICE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceDiagnostic {
    /// See [`diagnostic_user`].
    DialogueServiceUser(u8),
    /// See [`diagnostic_provider`].
    DialogueServiceProvider(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abrt {
    /// See [`abort_source`].
    pub abort_source: u8,
    pub user_information: Option<Vec<u8>>,
}

impl Dialogue {
    /// AARQ dialogue with the structured AS id, the default protocol
    /// version and the standard ACN prefix.
    pub fn request(acn: u32, acn_version: u32) -> Self {
        Self {
            dialogue_as_id: Some(DIALOGUE_AS_ID.to_vec()),
            pdu: DialoguePdu::Request(Aarq {
                protocol_version: Some(PROTOCOL_VERSION),
                application_context_name: acn_name(acn, acn_version),
                user_information: None,
            }),
        }
    }

    /// AARE dialogue with the structured AS id.
    pub fn response(acn: u32, acn_version: u32, result: u8, diagnostic: SourceDiagnostic) -> Self {
        Self {
            dialogue_as_id: Some(DIALOGUE_AS_ID.to_vec()),
            pdu: DialoguePdu::Response(Aare {
                protocol_version: Some(PROTOCOL_VERSION),
                application_context_name: acn_name(acn, acn_version),
                result,
                result_source_diagnostic: Some(diagnostic),
                user_information: None,
            }),
        }
    }

    /// AUDT-shaped dialogue with the unidialogue AS id.
    pub fn unidialogue(acn: u32, acn_version: u32) -> Self {
        Self {
            dialogue_as_id: Some(UNIDIALOGUE_AS_ID.to_vec()),
            pdu: DialoguePdu::Request(Aarq {
                protocol_version: Some(PROTOCOL_VERSION),
                application_context_name: acn_name(acn, acn_version),
                user_information: None,
            }),
        }
    }

    /// Decode the payload of a DialoguePortion (or U-Abort cause): the
    /// EXTERNAL wrapper whose first octet must be `0x28`.
    pub(crate) fn decode(payload: &[u8]) -> Result<Self> {
        const OP: &str = "dialogue";
        if payload.first() != Some(&EXTERNAL_TAG) {
            let found = Tag::decode(payload, 0)
                .map(|(tag, _)| tag)
                .map_err(|e| TcapError::decode(OP, "external", e))?;
            return Err(TcapError::decode(
                OP,
                "external",
                Asn1Error::UnexpectedTag {
                    offset: 0,
                    expected: Tag::EXTERNAL,
                    found,
                },
            ));
        }

        let mut owned = payload.to_vec();
        owned[0] = SEQUENCE_TAG;

        let mut rd = TlvReader::new(&owned);
        let content = rd
            .expect(Tag::SEQUENCE)
            .map_err(|e| TcapError::decode(OP, "dialogue-all", e))?;
        if !rd.is_empty() {
            return Err(TcapError::decode(
                OP,
                "dialogue-all",
                Asn1Error::TrailingData(rd.position()),
            ));
        }

        let mut rd = TlvReader::new(content);
        let dialogue_as_id = match rd
            .read_optional(Tag::OID)
            .map_err(|e| TcapError::decode(OP, "as-id", e))?
        {
            Some(oid) => {
                Some(asn1::parse_oid(oid).map_err(|e| TcapError::decode(OP, "as-id", e))?)
            }
            None => None,
        };

        let wrapper = rd
            .expect(TAG_PDU)
            .map_err(|e| TcapError::decode(OP, "pdu", e))?;
        if !rd.is_empty() {
            return Err(TcapError::decode(
                OP,
                "pdu",
                Asn1Error::TrailingData(rd.position()),
            ));
        }

        let mut rd = TlvReader::new(wrapper);
        let (tag, body) = rd.read().map_err(|e| TcapError::decode(OP, "pdu", e))?;
        let pdu = match tag {
            TAG_AARQ => DialoguePdu::Request(Aarq::decode(body)?),
            TAG_AARE => DialoguePdu::Response(Aare::decode(body)?),
            TAG_ABRT => DialoguePdu::Abort(Abrt::decode(body)?),
            found => {
                return Err(TcapError::decode(
                    OP,
                    "pdu",
                    Asn1Error::UnexpectedTag {
                        offset: 0,
                        expected: TAG_AARQ,
                        found,
                    },
                ))
            }
        };
        if !rd.is_empty() {
            return Err(TcapError::decode(
                OP,
                "pdu",
                Asn1Error::TrailingData(rd.position()),
            ));
        }

        Ok(Self {
            dialogue_as_id,
            pdu,
        })
    }

    /// Encode as the EXTERNAL TLV that goes inside the DialoguePortion.
    pub(crate) fn encode(&self) -> Result<BytesMut> {
        const OP: &str = "dialogue";
        let mut all = BytesMut::new();
        if let Some(arcs) = &self.dialogue_as_id {
            asn1::put_oid(&mut all, arcs).map_err(|e| TcapError::encode(OP, "as-id", e))?;
        }

        let mut pdu = BytesMut::new();
        match &self.pdu {
            DialoguePdu::Request(aarq) => {
                let body = aarq.encode()?;
                asn1::put_tlv(&mut pdu, TAG_AARQ, &body);
            }
            DialoguePdu::Response(aare) => {
                let body = aare.encode()?;
                asn1::put_tlv(&mut pdu, TAG_AARE, &body);
            }
            DialoguePdu::Abort(abrt) => {
                let body = abrt.encode();
                asn1::put_tlv(&mut pdu, TAG_ABRT, &body);
            }
        }
        asn1::put_tlv(&mut all, TAG_PDU, &pdu);

        let mut out = BytesMut::new();
        asn1::put_tlv(&mut out, Tag::SEQUENCE, &all);
        debug_assert_eq!(out[0], SEQUENCE_TAG);
        out[0] = EXTERNAL_TAG;
        Ok(out)
    }
}

impl Aarq {
    fn decode(content: &[u8]) -> Result<Self> {
        const OP: &str = "aarq";
        let mut rd = TlvReader::new(content);
        let protocol_version = read_protocol_version(&mut rd)
            .map_err(|e| TcapError::decode(OP, "protocol-version", e))?;
        let application_context_name = read_acn(&mut rd)
            .map_err(|e| TcapError::decode(OP, "application-context-name", e))?;
        let user_information = read_user_information(&mut rd)
            .map_err(|e| TcapError::decode(OP, "user-information", e))?;
        finish(&rd, OP)?;
        Ok(Self {
            protocol_version,
            application_context_name,
            user_information,
        })
    }

    fn encode(&self) -> Result<BytesMut> {
        const OP: &str = "aarq";
        let mut buf = BytesMut::new();
        put_protocol_version(&mut buf, self.protocol_version);
        put_acn(&mut buf, &self.application_context_name)
            .map_err(|e| TcapError::encode(OP, "application-context-name", e))?;
        put_user_information(&mut buf, self.user_information.as_deref());
        Ok(buf)
    }
}

impl Aare {
    fn decode(content: &[u8]) -> Result<Self> {
        const OP: &str = "aare";
        let mut rd = TlvReader::new(content);
        let protocol_version = read_protocol_version(&mut rd)
            .map_err(|e| TcapError::decode(OP, "protocol-version", e))?;
        let application_context_name = read_acn(&mut rd)
            .map_err(|e| TcapError::decode(OP, "application-context-name", e))?;

        let result = {
            let wrapper = rd
                .expect(TAG_RESULT)
                .map_err(|e| TcapError::decode(OP, "result", e))?;
            let mut inner = TlvReader::new(wrapper);
            let value = inner
                .expect(Tag::INTEGER)
                .and_then(asn1::parse_integer)
                .map_err(|e| TcapError::decode(OP, "result", e))?;
            value as u8
        };

        let result_source_diagnostic = {
            let wrapper = rd
                .expect(TAG_DIAGNOSTIC)
                .map_err(|e| TcapError::decode(OP, "result-source-diagnostic", e))?;
            decode_source_diagnostic(wrapper)
                .map_err(|e| TcapError::decode(OP, "result-source-diagnostic", e))?
        };

        let user_information = read_user_information(&mut rd)
            .map_err(|e| TcapError::decode(OP, "user-information", e))?;
        finish(&rd, OP)?;
        Ok(Self {
            protocol_version,
            application_context_name,
            result,
            result_source_diagnostic,
            user_information,
        })
    }

    fn encode(&self) -> Result<BytesMut> {
        const OP: &str = "aare";
        let mut buf = BytesMut::new();
        put_protocol_version(&mut buf, self.protocol_version);
        put_acn(&mut buf, &self.application_context_name)
            .map_err(|e| TcapError::encode(OP, "application-context-name", e))?;

        let mut result = BytesMut::new();
        asn1::put_integer(&mut result, Tag::INTEGER, i64::from(self.result));
        asn1::put_tlv(&mut buf, TAG_RESULT, &result);

        let mut diagnostic = BytesMut::new();
        if let Some(choice) = self.result_source_diagnostic {
            let (tag, value) = match choice {
                SourceDiagnostic::DialogueServiceUser(v) => (TAG_DIAGNOSTIC_USER, v),
                SourceDiagnostic::DialogueServiceProvider(v) => (TAG_DIAGNOSTIC_PROVIDER, v),
            };
            let mut inner = BytesMut::new();
            asn1::put_integer(&mut inner, Tag::INTEGER, i64::from(value));
            asn1::put_tlv(&mut diagnostic, tag, &inner);
        }
        asn1::put_tlv(&mut buf, TAG_DIAGNOSTIC, &diagnostic);

        put_user_information(&mut buf, self.user_information.as_deref());
        Ok(buf)
    }
}

impl Abrt {
    fn decode(content: &[u8]) -> Result<Self> {
        const OP: &str = "abrt";
        let mut rd = TlvReader::new(content);
        let abort_source = rd
            .expect(TAG_ABORT_SOURCE)
            .and_then(asn1::parse_integer)
            .map_err(|e| TcapError::decode(OP, "abort-source", e))?;
        let user_information = read_user_information(&mut rd)
            .map_err(|e| TcapError::decode(OP, "user-information", e))?;
        finish(&rd, OP)?;
        Ok(Self {
            abort_source: abort_source as u8,
            user_information,
        })
    }

    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        asn1::put_integer(&mut buf, TAG_ABORT_SOURCE, i64::from(self.abort_source));
        put_user_information(&mut buf, self.user_information.as_deref());
        buf
    }
}

/// Full ACN: the standard prefix then `{context, version}`.
pub fn acn_name(acn: u32, acn_version: u32) -> Vec<u32> {
    let mut arcs = ACN_PREFIX.to_vec();
    arcs.push(acn);
    arcs.push(acn_version);
    arcs
}

fn read_protocol_version(rd: &mut TlvReader<'_>) -> std::result::Result<Option<u8>, Asn1Error> {
    match rd.read_optional(TAG_PROTOCOL_VERSION)? {
        Some(content) => match content.split_first() {
            // Unused-bits octet first, then the padded bits; the version
            // octet is the last one.
            Some((_, bits)) if !bits.is_empty() => Ok(Some(bits[bits.len() - 1])),
            _ => Err(Asn1Error::MalformedFragment {
                tag: 3,
                reason: "empty protocol-version bit string",
            }),
        },
        None => Ok(None),
    }
}

fn put_protocol_version(buf: &mut BytesMut, version: Option<u8>) {
    if let Some(version) = version {
        // Single-bit BIT STRING: seven unused bits.
        asn1::put_tlv(buf, TAG_PROTOCOL_VERSION, &[0x07, version]);
    }
}

fn read_acn(rd: &mut TlvReader<'_>) -> std::result::Result<Vec<u32>, Asn1Error> {
    // Explicitly tagged: the context wrapper holds the OID.
    let wrapper = rd.expect(TAG_ACN)?;
    let mut inner = TlvReader::new(wrapper);
    let arcs = inner.expect(Tag::OID).and_then(asn1::parse_oid)?;
    if !inner.is_empty() {
        return Err(Asn1Error::TrailingData(inner.position()));
    }
    Ok(arcs)
}

fn put_acn(buf: &mut BytesMut, arcs: &[u32]) -> std::result::Result<(), Asn1Error> {
    let mut inner = BytesMut::new();
    asn1::put_oid(&mut inner, arcs)?;
    asn1::put_tlv(buf, TAG_ACN, &inner);
    Ok(())
}

fn read_user_information(
    rd: &mut TlvReader<'_>,
) -> std::result::Result<Option<Vec<u8>>, Asn1Error> {
    match rd.read_optional(TAG_USER_INFORMATION)? {
        Some(content) => {
            let mut inner = TlvReader::new(content);
            let (_, full) = inner.read_full()?;
            if !inner.is_empty() {
                return Err(Asn1Error::TrailingData(inner.position()));
            }
            Ok(Some(full.to_vec()))
        }
        None => Ok(None),
    }
}

fn put_user_information(buf: &mut BytesMut, payload: Option<&[u8]>) {
    if let Some(payload) = payload {
        let mut owned = payload.to_vec();
        // Caller-built payloads may arrive SEQUENCE-shaped; the wire wants
        // the EXTERNAL identifier.
        if owned.first() == Some(&SEQUENCE_TAG) {
            owned[0] = EXTERNAL_TAG;
        }
        asn1::put_tlv(buf, TAG_USER_INFORMATION, &owned);
    }
}

fn decode_source_diagnostic(
    content: &[u8],
) -> std::result::Result<Option<SourceDiagnostic>, Asn1Error> {
    let mut rd = TlvReader::new(content);
    let user = match rd.read_optional(TAG_DIAGNOSTIC_USER)? {
        Some(wrapper) => explicit_integer(wrapper)?,
        None => asn1::FIELD_OMISSION,
    };
    if let Some(value) = asn1::opt_from_sentinel(user) {
        return Ok(Some(SourceDiagnostic::DialogueServiceUser(value as u8)));
    }
    let provider = match rd.read_optional(TAG_DIAGNOSTIC_PROVIDER)? {
        Some(wrapper) => explicit_integer(wrapper)?,
        None => asn1::FIELD_OMISSION,
    };
    if let Some(value) = asn1::opt_from_sentinel(provider) {
        return Ok(Some(SourceDiagnostic::DialogueServiceProvider(value as u8)));
    }
    Ok(None)
}

fn explicit_integer(wrapper: &[u8]) -> std::result::Result<i64, Asn1Error> {
    let mut inner = TlvReader::new(wrapper);
    inner.expect(Tag::INTEGER).and_then(asn1::parse_integer)
}

fn finish(rd: &TlvReader<'_>, op: &'static str) -> Result<()> {
    if !rd.is_empty() {
        return Err(TcapError::decode(
            op,
            "apdu",
            Asn1Error::TrailingData(rd.position()),
        ));
    }
    Ok(())
}

/// AARE associate-result values.
pub mod associate_result {
    pub const ACCEPTED: u8 = 0;
    pub const REJECT_PERMANENT: u8 = 1;
}

/// Dialogue-service-user diagnostic codes.
pub mod diagnostic_user {
    pub const NULL: u8 = 0;
    pub const NO_REASON_GIVEN: u8 = 1;
    pub const APPLICATION_CONTEXT_NOT_SUPPORTED: u8 = 2;
}

/// Dialogue-service-provider diagnostic codes.
pub mod diagnostic_provider {
    pub const NULL: u8 = 0;
    pub const NO_REASON_GIVEN: u8 = 1;
    pub const NO_COMMON_DIALOGUE_PORTION: u8 = 2;
}

/// ABRT abort-source values.
pub mod abort_source {
    pub const DIALOGUE_SERVICE_USER: u8 = 0;
    pub const DIALOGUE_SERVICE_PROVIDER: u8 = 1;
}

/// MAP application-context codes carried in the last-but-one ACN arc.
pub mod acn {
    pub const NETWORK_LOC_UP: u32 = 1;
    pub const LOCATION_CANCEL: u32 = 2;
    pub const ROAMING_NB_ENQUIRY: u32 = 3;
    pub const IST_ALERTING: u32 = 4;
    pub const LOC_INFO_RETRIEVAL: u32 = 5;
    pub const CALL_CONTROL_TRANSFER: u32 = 6;
    pub const REPORTING: u32 = 7;
    pub const CALL_COMPLETION: u32 = 8;
    pub const IMMEDIATE_TERMINATION: u32 = 9;
    pub const RESET: u32 = 10;
    pub const HANDOVER_CONTROL: u32 = 11;
    pub const EQUIPMENT_MNGT: u32 = 13;
    pub const INFO_RETRIEVAL: u32 = 14;
    pub const INTER_VLR_INFO_RETRIEVAL: u32 = 15;
    pub const SUBSCRIBER_DATA_MNGT: u32 = 16;
    pub const TRACING: u32 = 17;
    pub const NETWORK_FUNCTIONAL_SS: u32 = 18;
    pub const NETWORK_UNSTRUCTURED_SS: u32 = 19;
    pub const SHORT_MSG_GATEWAY: u32 = 20;
    pub const SHORT_MSG_MO_RELAY: u32 = 21;
    pub const SUBSCRIBER_DATA_MODIFICATION_NOTIFICATION: u32 = 22;
    pub const SHORT_MSG_ALERT: u32 = 23;
    pub const MWD_MNGT: u32 = 24;
    pub const SHORT_MSG_MT_RELAY: u32 = 25;
    pub const IMSI_RETRIEVAL: u32 = 26;
    pub const MS_PURGING: u32 = 27;
    pub const SUBSCRIBER_INFO_ENQUIRY: u32 = 28;
    pub const ANY_TIME_INFO_ENQUIRY: u32 = 29;
    pub const GROUP_CALL_CONTROL: u32 = 31;
    pub const GPRS_LOCATION_UPDATE: u32 = 32;
    pub const GPRS_LOCATION_INFO_RETRIEVAL: u32 = 33;
    pub const FAILURE_REPORT: u32 = 34;
    pub const GPRS_NOTIFY: u32 = 35;
    pub const SS_INVOCATION_NOTIFICATION: u32 = 36;
    pub const LOCATION_SVC_GATEWAY: u32 = 37;
    pub const LOCATION_SVC_ENQUIRY: u32 = 38;
    pub const AUTHENTICATION_FAILURE_REPORT: u32 = 39;
    pub const MM_EVENT_REPORTING: u32 = 42;
    pub const ANY_TIME_INFO_HANDLING: u32 = 43;
    pub const RESOURCE_MANAGEMENT: u32 = 44;

    /// ACN versions in practical use.
    pub const VERSION1: u32 = 1;
    pub const VERSION2: u32 = 2;
    pub const VERSION3: u32 = 3;
}
