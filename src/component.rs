//! Component portion: the remote-operation components.

use crate::asn1::{self, Tag, TlvReader};
use crate::errors::{Asn1Error, Result, TcapError};
use crate::{MAX_INVOKE_ID, MIN_INVOKE_ID};
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

const TAG_INVOKE: Tag = Tag::context(true, 1);
const TAG_RETURN_RESULT_LAST: Tag = Tag::context(true, 2);
const TAG_RETURN_ERROR: Tag = Tag::context(true, 3);
const TAG_REJECT: Tag = Tag::context(true, 4);
const TAG_RETURN_RESULT_NOT_LAST: Tag = Tag::context(true, 7);
const TAG_LINKED_ID: Tag = Tag::context(false, 0);

/// One or more components: the chosen component plus the chain of any
/// siblings that followed it in the same portion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentPortion {
    pub component: Component,
    pub next: Option<Box<ComponentPortion>>,
}

/// Component CHOICE, discriminated by context tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Component {
    Invoke(Invoke),
    ReturnResultLast(ReturnResult),
    ReturnError(ReturnError),
    Reject(Reject),
    ReturnResultNotLast(ReturnResult),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoke {
    pub invoke_id: i32,
    pub linked_id: Option<i32>,
    pub op_code: i32,
    /// Complete TLV of the operation parameter, carried opaquely.
    pub parameter: Option<Vec<u8>>,
}

/// Shared by ReturnResult-Last and ReturnResult-NotLast; the inner
/// `{op_code, parameter}` sequence is present only when `op_code` is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnResult {
    pub invoke_id: i32,
    pub op_code: Option<i32>,
    pub parameter: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnError {
    pub invoke_id: i32,
    pub error_code: i32,
    pub parameter: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reject {
    /// `Some` when the offending invoke id was derivable, `None` for the
    /// NULL (not-derivable) alternative.
    pub invoke_id: Option<i8>,
    pub problem: RejectProblem,
}

/// Reject problem CHOICE; codes per [`problem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectProblem {
    General(u8),
    Invoke(u8),
    ReturnResult(u8),
    ReturnError(u8),
}

impl ComponentPortion {
    /// Single-component portion.
    pub fn new(component: Component) -> Self {
        Self {
            component,
            next: None,
        }
    }

    /// Append a component at the end of the chain.
    pub fn push(&mut self, component: Component) {
        match &mut self.next {
            Some(next) => next.push(component),
            None => self.next = Some(Box::new(Self::new(component))),
        }
    }

    /// Iterate over the chain from the first component.
    pub fn iter(&self) -> ComponentIter<'_> {
        ComponentIter {
            portion: Some(self),
        }
    }

    /// Decode the content of a component container into the chain.
    pub(crate) fn decode(content: &[u8]) -> Result<Self> {
        const OP: &str = "component";
        let mut rd = TlvReader::new(content);
        let mut components = Vec::new();
        while !rd.is_empty() {
            let (tag, body) = rd
                .read()
                .map_err(|e| TcapError::decode(OP, "choice", e))?;
            components.push(Component::decode(tag, body)?);
        }

        // Fold from the tail so a long portion cannot exhaust the stack.
        let mut chain: Option<ComponentPortion> = None;
        while let Some(component) = components.pop() {
            chain = Some(ComponentPortion {
                component,
                next: chain.map(Box::new),
            });
        }
        chain.ok_or_else(|| TcapError::decode(OP, "choice", Asn1Error::EmptyInput))
    }

    /// Encode the chain: the chosen component, then its siblings, raw TLVs
    /// concatenated. The caller wraps the result in the container header.
    pub(crate) fn encode(&self) -> Result<BytesMut> {
        let mut buf = BytesMut::new();
        let mut portion = self;
        loop {
            portion.component.encode(&mut buf)?;
            match &portion.next {
                Some(next) => portion = next,
                None => break,
            }
        }
        Ok(buf)
    }
}

impl<'a> IntoIterator for &'a ComponentPortion {
    type Item = &'a Component;
    type IntoIter = ComponentIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Borrowing iterator over a component chain.
#[derive(Debug)]
pub struct ComponentIter<'a> {
    portion: Option<&'a ComponentPortion>,
}

impl<'a> Iterator for ComponentIter<'a> {
    type Item = &'a Component;

    fn next(&mut self) -> Option<Self::Item> {
        let portion = self.portion?;
        self.portion = portion.next.as_deref();
        Some(&portion.component)
    }
}

impl Component {
    fn decode(tag: Tag, content: &[u8]) -> Result<Self> {
        match tag {
            TAG_INVOKE => Invoke::decode(content).map(Self::Invoke),
            TAG_RETURN_RESULT_LAST => ReturnResult::decode(content).map(Self::ReturnResultLast),
            TAG_RETURN_ERROR => ReturnError::decode(content).map(Self::ReturnError),
            TAG_REJECT => Reject::decode(content).map(Self::Reject),
            TAG_RETURN_RESULT_NOT_LAST => {
                ReturnResult::decode(content).map(Self::ReturnResultNotLast)
            }
            found => Err(TcapError::decode(
                "component",
                "choice",
                Asn1Error::UnexpectedTag {
                    offset: 0,
                    expected: TAG_INVOKE,
                    found,
                },
            )),
        }
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Self::Invoke(invoke) => {
                let body = invoke.encode()?;
                asn1::put_tlv(buf, TAG_INVOKE, &body);
            }
            Self::ReturnResultLast(result) => {
                let body = result.encode()?;
                asn1::put_tlv(buf, TAG_RETURN_RESULT_LAST, &body);
            }
            Self::ReturnError(error) => {
                let body = error.encode()?;
                asn1::put_tlv(buf, TAG_RETURN_ERROR, &body);
            }
            Self::Reject(reject) => {
                let body = reject.encode()?;
                asn1::put_tlv(buf, TAG_REJECT, &body);
            }
            Self::ReturnResultNotLast(result) => {
                let body = result.encode()?;
                asn1::put_tlv(buf, TAG_RETURN_RESULT_NOT_LAST, &body);
            }
        }
        Ok(())
    }

    /// Invoke id of the component, when it carries one.
    pub fn invoke_id(&self) -> Option<i32> {
        match self {
            Self::Invoke(c) => Some(c.invoke_id),
            Self::ReturnResultLast(c) | Self::ReturnResultNotLast(c) => Some(c.invoke_id),
            Self::ReturnError(c) => Some(c.invoke_id),
            Self::Reject(c) => c.invoke_id.map(i32::from),
        }
    }
}

impl Invoke {
    fn decode(content: &[u8]) -> Result<Self> {
        const OP: &str = "invoke";
        let mut rd = TlvReader::new(content);
        let invoke_id = read_invoke_id(&mut rd, OP)?;

        let linked_raw = asn1::read_int_or_omitted(&mut rd, TAG_LINKED_ID)
            .map_err(|e| TcapError::decode(OP, "linked-id", e))?;
        let linked_id = asn1::opt_from_sentinel(linked_raw).map(|v| v as i32);

        let op_code = rd
            .expect(Tag::INTEGER)
            .and_then(parse_i32)
            .map_err(|e| TcapError::decode(OP, "op-code", e))?;
        let parameter = read_parameter(&mut rd, OP)?;
        Ok(Self {
            invoke_id,
            linked_id,
            op_code,
            parameter,
        })
    }

    fn encode(&self) -> Result<BytesMut> {
        validate_invoke_id(i64::from(self.invoke_id), "invoke-id")?;
        if let Some(linked) = self.linked_id {
            validate_invoke_id(i64::from(linked), "linked-id")?;
        }
        let mut buf = BytesMut::new();
        asn1::put_integer(&mut buf, Tag::INTEGER, i64::from(self.invoke_id));
        asn1::put_int_unless_omitted(
            &mut buf,
            TAG_LINKED_ID,
            asn1::sentinel_from_opt(self.linked_id.map(i64::from)),
        );
        asn1::put_integer(&mut buf, Tag::INTEGER, i64::from(self.op_code));
        if let Some(parameter) = &self.parameter {
            buf.put_slice(parameter);
        }
        Ok(buf)
    }
}

impl ReturnResult {
    fn decode(content: &[u8]) -> Result<Self> {
        const OP: &str = "return-result";
        let mut rd = TlvReader::new(content);
        let invoke_id = read_invoke_id(&mut rd, OP)?;

        let (op_code, parameter) = match rd
            .read_optional(Tag::SEQUENCE)
            .map_err(|e| TcapError::decode(OP, "result", e))?
        {
            Some(result) => {
                let mut inner = TlvReader::new(result);
                let op_code = inner
                    .expect(Tag::INTEGER)
                    .and_then(parse_i32)
                    .map_err(|e| TcapError::decode(OP, "op-code", e))?;
                let parameter = if inner.is_empty() {
                    None
                } else {
                    let (_, full) = inner
                        .read_full()
                        .map_err(|e| TcapError::decode(OP, "parameter", e))?;
                    Some(full.to_vec())
                };
                if !inner.is_empty() {
                    return Err(TcapError::decode(
                        OP,
                        "result",
                        Asn1Error::TrailingData(inner.position()),
                    ));
                }
                (Some(op_code), parameter)
            }
            None => (None, None),
        };

        if !rd.is_empty() {
            return Err(TcapError::decode(
                OP,
                "result",
                Asn1Error::TrailingData(rd.position()),
            ));
        }
        Ok(Self {
            invoke_id,
            op_code,
            parameter,
        })
    }

    fn encode(&self) -> Result<BytesMut> {
        validate_invoke_id(i64::from(self.invoke_id), "invoke-id")?;
        let mut buf = BytesMut::new();
        asn1::put_integer(&mut buf, Tag::INTEGER, i64::from(self.invoke_id));
        if let Some(op_code) = self.op_code {
            let mut inner = BytesMut::new();
            asn1::put_integer(&mut inner, Tag::INTEGER, i64::from(op_code));
            if let Some(parameter) = &self.parameter {
                inner.put_slice(parameter);
            }
            asn1::put_tlv(&mut buf, Tag::SEQUENCE, &inner);
        }
        Ok(buf)
    }
}

impl ReturnError {
    fn decode(content: &[u8]) -> Result<Self> {
        const OP: &str = "return-error";
        let mut rd = TlvReader::new(content);
        let invoke_id = read_invoke_id(&mut rd, OP)?;
        let error_code = rd
            .expect(Tag::INTEGER)
            .and_then(parse_i32)
            .map_err(|e| TcapError::decode(OP, "error-code", e))?;
        let parameter = read_parameter(&mut rd, OP)?;
        Ok(Self {
            invoke_id,
            error_code,
            parameter,
        })
    }

    fn encode(&self) -> Result<BytesMut> {
        validate_invoke_id(i64::from(self.invoke_id), "invoke-id")?;
        let mut buf = BytesMut::new();
        asn1::put_integer(&mut buf, Tag::INTEGER, i64::from(self.invoke_id));
        asn1::put_integer(&mut buf, Tag::INTEGER, i64::from(self.error_code));
        if let Some(parameter) = &self.parameter {
            buf.put_slice(parameter);
        }
        Ok(buf)
    }
}

impl Reject {
    fn decode(content: &[u8]) -> Result<Self> {
        const OP: &str = "reject";
        let mut rd = TlvReader::new(content);
        let at = rd.position();
        let (tag, body) = rd
            .read()
            .map_err(|e| TcapError::decode(OP, "invoke-id", e))?;
        let invoke_id = match tag {
            Tag::INTEGER => {
                let value =
                    asn1::parse_integer(body).map_err(|e| TcapError::decode(OP, "invoke-id", e))?;
                validate_invoke_id(value, "invoke-id")?;
                Some(value as i8)
            }
            Tag::NULL => None,
            found => {
                return Err(TcapError::decode(
                    OP,
                    "invoke-id",
                    Asn1Error::UnexpectedTag {
                        offset: at,
                        expected: Tag::INTEGER,
                        found,
                    },
                ))
            }
        };

        // The problem CHOICE decodes through the same omission sentinel the
        // other optional integer fields use; exactly one alternative is
        // present on well-formed input.
        let general = asn1::read_int_or_omitted(&mut rd, Tag::context(false, 0))
            .map_err(|e| TcapError::decode(OP, "general-problem", e))?;
        let invoke = asn1::read_int_or_omitted(&mut rd, Tag::context(false, 1))
            .map_err(|e| TcapError::decode(OP, "invoke-problem", e))?;
        let return_result = asn1::read_int_or_omitted(&mut rd, Tag::context(false, 2))
            .map_err(|e| TcapError::decode(OP, "return-result-problem", e))?;
        let return_error = asn1::read_int_or_omitted(&mut rd, Tag::context(false, 3))
            .map_err(|e| TcapError::decode(OP, "return-error-problem", e))?;
        if !rd.is_empty() {
            return Err(TcapError::decode(
                OP,
                "problem",
                Asn1Error::TrailingData(rd.position()),
            ));
        }

        let problem = if let Some(v) = asn1::opt_from_sentinel(general) {
            RejectProblem::General(v as u8)
        } else if let Some(v) = asn1::opt_from_sentinel(invoke) {
            RejectProblem::Invoke(v as u8)
        } else if let Some(v) = asn1::opt_from_sentinel(return_result) {
            RejectProblem::ReturnResult(v as u8)
        } else if let Some(v) = asn1::opt_from_sentinel(return_error) {
            RejectProblem::ReturnError(v as u8)
        } else {
            return Err(TcapError::decode(OP, "problem", Asn1Error::EmptyInput));
        };

        Ok(Self { invoke_id, problem })
    }

    fn encode(&self) -> Result<BytesMut> {
        let mut buf = BytesMut::new();
        match self.invoke_id {
            Some(id) => asn1::put_integer(&mut buf, Tag::INTEGER, i64::from(id)),
            None => asn1::put_tlv(&mut buf, Tag::NULL, &[]),
        }
        let (number, code) = match self.problem {
            RejectProblem::General(code) => (0, code),
            RejectProblem::Invoke(code) => (1, code),
            RejectProblem::ReturnResult(code) => (2, code),
            RejectProblem::ReturnError(code) => (3, code),
        };
        asn1::put_integer(&mut buf, Tag::context(false, number), i64::from(code));
        Ok(buf)
    }
}

fn read_invoke_id(rd: &mut TlvReader<'_>, op: &'static str) -> Result<i32> {
    let value = rd
        .expect(Tag::INTEGER)
        .and_then(asn1::parse_integer)
        .map_err(|e| TcapError::decode(op, "invoke-id", e))?;
    validate_invoke_id(value, "invoke-id")?;
    Ok(value as i32)
}

fn read_parameter(rd: &mut TlvReader<'_>, op: &'static str) -> Result<Option<Vec<u8>>> {
    if rd.is_empty() {
        return Ok(None);
    }
    let (_, full) = rd
        .read_full()
        .map_err(|e| TcapError::decode(op, "parameter", e))?;
    if !rd.is_empty() {
        return Err(TcapError::decode(
            op,
            "parameter",
            Asn1Error::TrailingData(rd.position()),
        ));
    }
    Ok(Some(full.to_vec()))
}

fn parse_i32(content: &[u8]) -> std::result::Result<i32, Asn1Error> {
    if content.len() > 4 {
        return Err(Asn1Error::IntegerTooLarge(content.len()));
    }
    asn1::parse_integer(content).map(|v| v as i32)
}

pub(crate) fn validate_invoke_id(value: i64, field: &'static str) -> Result<()> {
    if value < i64::from(MIN_INVOKE_ID) || value > i64::from(MAX_INVOKE_ID) {
        return Err(TcapError::InvalidInvokeId { field, value });
    }
    Ok(())
}

/// Reject problem codes, by problem family.
pub mod problem {
    pub mod general {
        pub const UNRECOGNIZED_COMPONENT: u8 = 0;
        pub const MISTYPED_COMPONENT: u8 = 1;
        pub const BADLY_STRUCTURED_COMPONENT: u8 = 2;
    }

    pub mod invoke {
        pub const DUPLICATE_INVOKE_ID: u8 = 0;
        pub const UNRECOGNIZED_OPERATION: u8 = 1;
        pub const MISTYPED_PARAMETER: u8 = 2;
        pub const RESOURCE_LIMITATION: u8 = 3;
        pub const INITIATING_RELEASE: u8 = 4;
        pub const UNRECOGNIZED_LINKED_ID: u8 = 5;
        pub const LINKED_RESPONSE_UNEXPECTED: u8 = 6;
        pub const UNEXPECTED_LINKED_OPERATION: u8 = 7;
    }

    pub mod return_result {
        pub const UNRECOGNIZED_INVOKE_ID: u8 = 0;
        pub const RETURN_RESULT_UNEXPECTED: u8 = 1;
        pub const MISTYPED_PARAMETER: u8 = 2;
    }

    pub mod return_error {
        pub const UNRECOGNIZED_INVOKE_ID: u8 = 0;
        pub const RETURN_ERROR_UNEXPECTED: u8 = 1;
        pub const UNRECOGNIZED_ERROR: u8 = 2;
        pub const UNEXPECTED_ERROR: u8 = 3;
        pub const MISTYPED_PARAMETER: u8 = 4;
    }
}
