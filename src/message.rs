//! TCAP message model and the wire codec entry points.

use crate::asn1::{self, der::make_der, Tag, TagClass, TlvReader};
use crate::component::ComponentPortion;
use crate::dialogue::Dialogue;
use crate::errors::{Asn1Error, Result, TcapError};
use crate::{MAX_TRANSACTION_ID_LEN, MIN_TRANSACTION_ID_LEN};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tracing::debug;

const TAG_UNIDIRECTIONAL: Tag = Tag::application(true, 1);
const TAG_BEGIN: Tag = Tag::application(true, 2);
const TAG_END: Tag = Tag::application(true, 4);
const TAG_CONTINUE: Tag = Tag::application(true, 5);
const TAG_ABORT: Tag = Tag::application(true, 7);
const TAG_OTID: Tag = Tag::application(false, 8);
const TAG_DTID: Tag = Tag::application(false, 9);
const TAG_P_ABORT_CAUSE: Tag = Tag::application(false, 10);
const TAG_DIALOGUE_PORTION: Tag = Tag::application(true, 11);
const TAG_COMPONENT_PORTION: Tag = Tag::application(true, 12);

/// Originating or destination transaction identifier: an opaque 1-4 byte
/// string, big-endian by convention. Length is validated at construction,
/// so every value in existence satisfies the bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Vec<u8>);

impl TransactionId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        Self::named(bytes.into(), "transaction id")
    }

    pub(crate) fn named(bytes: Vec<u8>, field: &'static str) -> Result<Self> {
        if bytes.len() < MIN_TRANSACTION_ID_LEN || bytes.len() > MAX_TRANSACTION_ID_LEN {
            return Err(TcapError::InvalidTransactionId {
                field,
                len: bytes.len(),
            });
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<u32> for TransactionId {
    /// Minimal big-endian encoding; zero keeps a single octet.
    fn from(value: u32) -> Self {
        let bytes = value.to_be_bytes();
        let skip = bytes.iter().take(3).take_while(|&&b| b == 0).count();
        Self(bytes[skip..].to_vec())
    }
}

impl TryFrom<&[u8]> for TransactionId {
    type Error = TcapError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::new(bytes)
    }
}

/// TCAP message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Unidirectional,
    Begin,
    End,
    Continue,
    Abort,
}

/// A TCAP message: exactly one of the five transaction types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tcap {
    Unidirectional {
        dialogue: Option<Dialogue>,
        components: ComponentPortion,
    },
    Begin {
        otid: TransactionId,
        dialogue: Option<Dialogue>,
        components: Option<ComponentPortion>,
    },
    End {
        dtid: TransactionId,
        dialogue: Option<Dialogue>,
        components: Option<ComponentPortion>,
    },
    Continue {
        otid: TransactionId,
        dtid: TransactionId,
        dialogue: Option<Dialogue>,
        components: Option<ComponentPortion>,
    },
    Abort {
        dtid: TransactionId,
        /// See [`p_abort`].
        p_abort_cause: Option<u8>,
        /// Dialogue-shaped user abort information.
        u_abort_cause: Option<Dialogue>,
    },
}

impl Tcap {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Unidirectional { .. } => MessageType::Unidirectional,
            Self::Begin { .. } => MessageType::Begin,
            Self::End { .. } => MessageType::End,
            Self::Continue { .. } => MessageType::Continue,
            Self::Abort { .. } => MessageType::Abort,
        }
    }

    fn tag(&self) -> Tag {
        match self {
            Self::Unidirectional { .. } => TAG_UNIDIRECTIONAL,
            Self::Begin { .. } => TAG_BEGIN,
            Self::End { .. } => TAG_END,
            Self::Continue { .. } => TAG_CONTINUE,
            Self::Abort { .. } => TAG_ABORT,
        }
    }

    /// Parse DER bytes into a message; any non-DER encoding fails.
    pub fn parse_der(data: &[u8]) -> Result<Self> {
        const OP: &str = "parse_der";
        if data.is_empty() {
            return Err(TcapError::EmptyData);
        }
        let mut rd = TlvReader::new(data);
        let (tag, content) = rd.read().map_err(|e| TcapError::decode(OP, "message", e))?;
        if !rd.is_empty() {
            return Err(TcapError::decode(
                OP,
                "message",
                Asn1Error::TrailingData(rd.position()),
            ));
        }
        if tag.class != TagClass::Application || !tag.constructed {
            return Err(TcapError::UnknownMessageType(tag));
        }
        match tag.number {
            1 => Self::decode_unidirectional(content),
            2 => Self::decode_begin(content),
            4 => Self::decode_end(content),
            5 => Self::decode_continue(content),
            7 => Self::decode_abort(content),
            _ => Err(TcapError::UnknownMessageType(tag)),
        }
    }

    /// Parse network-sourced bytes: strict DER first, then one
    /// canonicalise-and-retry when the failure was an indefinite length.
    pub fn parse_any(data: &[u8]) -> Result<Self> {
        match Self::parse_der(data) {
            Err(err) if err.is_indefinite_length() => {
                debug!("canonicalising indefinite-length input before reparse");
                let der =
                    make_der(data).map_err(|e| TcapError::decode("parse_any", "make_der", e))?;
                Self::parse_der(&der)
            }
            result => result,
        }
    }

    /// Encode the message to DER.
    pub fn marshal(&self) -> Result<Vec<u8>> {
        let mut content = BytesMut::new();
        match self {
            Self::Unidirectional {
                dialogue,
                components,
            } => {
                put_dialogue(&mut content, dialogue)?;
                let chain = components.encode()?;
                asn1::put_tlv(&mut content, Tag::SEQUENCE, &chain);
            }
            Self::Begin {
                otid,
                dialogue,
                components,
            } => {
                asn1::put_tlv(&mut content, TAG_OTID, otid.as_bytes());
                put_dialogue(&mut content, dialogue)?;
                put_components(&mut content, components)?;
            }
            Self::End {
                dtid,
                dialogue,
                components,
            } => {
                asn1::put_tlv(&mut content, TAG_DTID, dtid.as_bytes());
                put_dialogue(&mut content, dialogue)?;
                put_components(&mut content, components)?;
            }
            Self::Continue {
                otid,
                dtid,
                dialogue,
                components,
            } => {
                asn1::put_tlv(&mut content, TAG_OTID, otid.as_bytes());
                asn1::put_tlv(&mut content, TAG_DTID, dtid.as_bytes());
                put_dialogue(&mut content, dialogue)?;
                put_components(&mut content, components)?;
            }
            Self::Abort {
                dtid,
                p_abort_cause,
                u_abort_cause,
            } => {
                asn1::put_tlv(&mut content, TAG_DTID, dtid.as_bytes());
                asn1::put_int_unless_omitted(
                    &mut content,
                    TAG_P_ABORT_CAUSE,
                    asn1::sentinel_from_opt(p_abort_cause.map(i64::from)),
                );
                put_dialogue(&mut content, u_abort_cause)?;
            }
        }

        let mut out = BytesMut::new();
        asn1::put_tlv(&mut out, self.tag(), &content);
        Ok(out.to_vec())
    }

    fn decode_unidirectional(content: &[u8]) -> Result<Self> {
        const OP: &str = "unidirectional";
        let mut rd = TlvReader::new(content);
        let dialogue = read_dialogue(&mut rd, OP)?;
        let portion = rd
            .expect(Tag::SEQUENCE)
            .map_err(|e| TcapError::decode(OP, "component-portion", e))?;
        let components = ComponentPortion::decode(portion)?;
        finish(&rd, OP)?;
        Ok(Self::Unidirectional {
            dialogue,
            components,
        })
    }

    fn decode_begin(content: &[u8]) -> Result<Self> {
        const OP: &str = "begin";
        let mut rd = TlvReader::new(content);
        let otid = read_tid(&mut rd, TAG_OTID, OP, "otid")?;
        let dialogue = read_dialogue(&mut rd, OP)?;
        let components = read_components(&mut rd, OP)?;
        finish(&rd, OP)?;
        Ok(Self::Begin {
            otid,
            dialogue,
            components,
        })
    }

    fn decode_end(content: &[u8]) -> Result<Self> {
        const OP: &str = "end";
        let mut rd = TlvReader::new(content);
        let dtid = read_tid(&mut rd, TAG_DTID, OP, "dtid")?;
        let dialogue = read_dialogue(&mut rd, OP)?;
        let components = read_components(&mut rd, OP)?;
        finish(&rd, OP)?;
        Ok(Self::End {
            dtid,
            dialogue,
            components,
        })
    }

    fn decode_continue(content: &[u8]) -> Result<Self> {
        const OP: &str = "continue";
        let mut rd = TlvReader::new(content);
        let otid = read_tid(&mut rd, TAG_OTID, OP, "otid")?;
        let dtid = read_tid(&mut rd, TAG_DTID, OP, "dtid")?;
        let dialogue = read_dialogue(&mut rd, OP)?;
        let components = read_components(&mut rd, OP)?;
        finish(&rd, OP)?;
        Ok(Self::Continue {
            otid,
            dtid,
            dialogue,
            components,
        })
    }

    fn decode_abort(content: &[u8]) -> Result<Self> {
        const OP: &str = "abort";
        let mut rd = TlvReader::new(content);
        let dtid = read_tid(&mut rd, TAG_DTID, OP, "dtid")?;
        let cause_raw = asn1::read_int_or_omitted(&mut rd, TAG_P_ABORT_CAUSE)
            .map_err(|e| TcapError::decode(OP, "p-abort-cause", e))?;
        let p_abort_cause = asn1::opt_from_sentinel(cause_raw).map(|v| v as u8);
        let u_abort_cause = read_dialogue(&mut rd, OP)?;
        finish(&rd, OP)?;
        Ok(Self::Abort {
            dtid,
            p_abort_cause,
            u_abort_cause,
        })
    }
}

fn read_tid(
    rd: &mut TlvReader<'_>,
    tag: Tag,
    op: &'static str,
    field: &'static str,
) -> Result<TransactionId> {
    let content = rd
        .expect(tag)
        .map_err(|e| TcapError::decode(op, field, e))?;
    TransactionId::named(content.to_vec(), field)
}

fn read_dialogue(rd: &mut TlvReader<'_>, op: &'static str) -> Result<Option<Dialogue>> {
    match rd
        .read_optional(TAG_DIALOGUE_PORTION)
        .map_err(|e| TcapError::decode(op, "dialogue-portion", e))?
    {
        Some(payload) => Dialogue::decode(payload).map(Some),
        None => Ok(None),
    }
}

fn read_components(rd: &mut TlvReader<'_>, op: &'static str) -> Result<Option<ComponentPortion>> {
    match rd
        .read_optional(TAG_COMPONENT_PORTION)
        .map_err(|e| TcapError::decode(op, "component-portion", e))?
    {
        Some(content) if !content.is_empty() => ComponentPortion::decode(content).map(Some),
        _ => Ok(None),
    }
}

fn put_dialogue(buf: &mut BytesMut, dialogue: &Option<Dialogue>) -> Result<()> {
    if let Some(dialogue) = dialogue {
        let external = dialogue.encode()?;
        asn1::put_tlv(buf, TAG_DIALOGUE_PORTION, &external);
    }
    Ok(())
}

fn put_components(buf: &mut BytesMut, components: &Option<ComponentPortion>) -> Result<()> {
    if let Some(portion) = components {
        let chain = portion.encode()?;
        asn1::put_tlv(buf, TAG_COMPONENT_PORTION, &chain);
    }
    Ok(())
}

fn finish(rd: &TlvReader<'_>, op: &'static str) -> Result<()> {
    if !rd.is_empty() {
        return Err(TcapError::decode(
            op,
            "message",
            Asn1Error::TrailingData(rd.position()),
        ));
    }
    Ok(())
}

/// P-Abort causes.
pub mod p_abort {
    pub const UNRECOGNIZED_MESSAGE_TYPE: u8 = 0;
    pub const UNRECOGNIZED_TRANSACTION_ID: u8 = 1;
    pub const BADLY_FORMATTED_TRANSACTION_PORTION: u8 = 2;
    pub const INCORRECT_TRANSACTION_PORTION: u8 = 3;
    pub const RESOURCE_LIMITATION: u8 = 4;
}
