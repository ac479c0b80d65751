//! Builders for outgoing messages, in the functional-options style.
//!
//! Every entry point takes the mandatory transaction ids plus a set of
//! options; each option is a pure transformation on the partially
//! constructed message. Invalid ids fail the entry point immediately, and
//! no partial message escapes. Component options append, so applying two
//! of them produces a multi-component portion.

use crate::component::{
    validate_invoke_id, Component, ComponentPortion, Invoke, ReturnError, ReturnResult,
};
use crate::dialogue::{Dialogue, SourceDiagnostic};
use crate::errors::{Result, TcapError};
use crate::message::{Tcap, TransactionId};

/// Fields of a Begin message under construction.
#[derive(Default)]
pub struct BeginParts {
    dialogue: Option<Dialogue>,
    components: Option<ComponentPortion>,
}

/// Configuration option for [`new_begin`].
pub struct BeginOption(Box<dyn FnOnce(&mut BeginParts) -> Result<()>>);

/// Fields of an End message under construction.
#[derive(Default)]
pub struct EndParts {
    dialogue: Option<Dialogue>,
    components: Option<ComponentPortion>,
}

/// Configuration option for [`new_end`].
pub struct EndOption(Box<dyn FnOnce(&mut EndParts) -> Result<()>>);

/// Fields of a Continue message under construction.
#[derive(Default)]
pub struct ContinueParts {
    dialogue: Option<Dialogue>,
    components: Option<ComponentPortion>,
}

/// Configuration option for [`new_continue`].
pub struct ContinueOption(Box<dyn FnOnce(&mut ContinueParts) -> Result<()>>);

/// Fields of an Abort message under construction.
#[derive(Default)]
pub struct AbortParts {
    p_abort_cause: Option<u8>,
    u_abort_cause: Option<Dialogue>,
}

/// Configuration option for [`new_abort`].
pub struct AbortOption(Box<dyn FnOnce(&mut AbortParts) -> Result<()>>);

/// Fields of a Unidirectional message under construction.
#[derive(Default)]
pub struct UnidirectionalParts {
    dialogue: Option<Dialogue>,
    components: Option<ComponentPortion>,
}

/// Configuration option for [`new_unidirectional`].
pub struct UnidirectionalOption(Box<dyn FnOnce(&mut UnidirectionalParts) -> Result<()>>);

/// Create a Begin message. `otid` is 1 to 4 bytes, big-endian.
pub fn new_begin(
    otid: impl Into<Vec<u8>>,
    options: impl IntoIterator<Item = BeginOption>,
) -> Result<Tcap> {
    let otid = TransactionId::named(otid.into(), "otid")?;
    let mut parts = BeginParts::default();
    for option in options {
        (option.0)(&mut parts)?;
    }
    Ok(Tcap::Begin {
        otid,
        dialogue: parts.dialogue,
        components: parts.components,
    })
}

/// Create an End message. `dtid` is 1 to 4 bytes, big-endian.
pub fn new_end(
    dtid: impl Into<Vec<u8>>,
    options: impl IntoIterator<Item = EndOption>,
) -> Result<Tcap> {
    let dtid = TransactionId::named(dtid.into(), "dtid")?;
    let mut parts = EndParts::default();
    for option in options {
        (option.0)(&mut parts)?;
    }
    Ok(Tcap::End {
        dtid,
        dialogue: parts.dialogue,
        components: parts.components,
    })
}

/// Create a Continue message. Both ids are 1 to 4 bytes, big-endian.
pub fn new_continue(
    otid: impl Into<Vec<u8>>,
    dtid: impl Into<Vec<u8>>,
    options: impl IntoIterator<Item = ContinueOption>,
) -> Result<Tcap> {
    let otid = TransactionId::named(otid.into(), "otid")?;
    let dtid = TransactionId::named(dtid.into(), "dtid")?;
    let mut parts = ContinueParts::default();
    for option in options {
        (option.0)(&mut parts)?;
    }
    Ok(Tcap::Continue {
        otid,
        dtid,
        dialogue: parts.dialogue,
        components: parts.components,
    })
}

/// Create an Abort message. `dtid` is 1 to 4 bytes, big-endian.
pub fn new_abort(
    dtid: impl Into<Vec<u8>>,
    options: impl IntoIterator<Item = AbortOption>,
) -> Result<Tcap> {
    let dtid = TransactionId::named(dtid.into(), "dtid")?;
    let mut parts = AbortParts::default();
    for option in options {
        (option.0)(&mut parts)?;
    }
    Ok(Tcap::Abort {
        dtid,
        p_abort_cause: parts.p_abort_cause,
        u_abort_cause: parts.u_abort_cause,
    })
}

/// Create a Unidirectional message. The component portion is mandatory, so
/// at least one component option must be supplied.
pub fn new_unidirectional(
    options: impl IntoIterator<Item = UnidirectionalOption>,
) -> Result<Tcap> {
    let mut parts = UnidirectionalParts::default();
    for option in options {
        (option.0)(&mut parts)?;
    }
    let components = parts.components.ok_or(TcapError::EmptyMessage)?;
    Ok(Tcap::Unidirectional {
        dialogue: parts.dialogue,
        components,
    })
}

/// Attach an AARQ dialogue built from `{acn, version}`.
pub fn with_begin_dialogue_request(acn: u32, acn_version: u32) -> BeginOption {
    BeginOption(Box::new(move |parts| {
        parts.dialogue = Some(Dialogue::request(acn, acn_version));
        Ok(())
    }))
}

/// Attach a caller-built dialogue.
pub fn with_begin_dialogue_object(dialogue: Dialogue) -> BeginOption {
    BeginOption(Box::new(move |parts| {
        parts.dialogue = Some(dialogue);
        Ok(())
    }))
}

/// Append an Invoke component.
pub fn with_begin_invoke(invoke_id: i32, op_code: i32, parameter: Option<Vec<u8>>) -> BeginOption {
    BeginOption(Box::new(move |parts| {
        validate_invoke_id(i64::from(invoke_id), "invoke-id")?;
        push_component(
            &mut parts.components,
            Component::Invoke(Invoke {
                invoke_id,
                linked_id: None,
                op_code,
                parameter,
            }),
        );
        Ok(())
    }))
}

/// Attach an AARQ dialogue built from `{acn, version}`.
pub fn with_end_dialogue_request(acn: u32, acn_version: u32) -> EndOption {
    EndOption(Box::new(move |parts| {
        parts.dialogue = Some(Dialogue::request(acn, acn_version));
        Ok(())
    }))
}

/// Attach an AARE dialogue carrying `result` and its source diagnostic.
pub fn with_end_dialogue_response(
    acn: u32,
    acn_version: u32,
    result: u8,
    diagnostic: SourceDiagnostic,
) -> EndOption {
    EndOption(Box::new(move |parts| {
        parts.dialogue = Some(Dialogue::response(acn, acn_version, result, diagnostic));
        Ok(())
    }))
}

/// Attach a caller-built dialogue.
pub fn with_end_dialogue_object(dialogue: Dialogue) -> EndOption {
    EndOption(Box::new(move |parts| {
        parts.dialogue = Some(dialogue);
        Ok(())
    }))
}

/// Append a ReturnResult-Last component.
pub fn with_end_return_result_last(
    invoke_id: i32,
    op_code: Option<i32>,
    parameter: Option<Vec<u8>>,
) -> EndOption {
    EndOption(Box::new(move |parts| {
        validate_invoke_id(i64::from(invoke_id), "invoke-id")?;
        push_component(
            &mut parts.components,
            Component::ReturnResultLast(ReturnResult {
                invoke_id,
                op_code,
                parameter,
            }),
        );
        Ok(())
    }))
}

/// Append a ReturnError component.
pub fn with_end_return_error(
    invoke_id: i32,
    error_code: i32,
    parameter: Option<Vec<u8>>,
) -> EndOption {
    EndOption(Box::new(move |parts| {
        validate_invoke_id(i64::from(invoke_id), "invoke-id")?;
        push_component(
            &mut parts.components,
            Component::ReturnError(ReturnError {
                invoke_id,
                error_code,
                parameter,
            }),
        );
        Ok(())
    }))
}

/// Attach an AARQ dialogue built from `{acn, version}`.
pub fn with_continue_dialogue_request(acn: u32, acn_version: u32) -> ContinueOption {
    ContinueOption(Box::new(move |parts| {
        parts.dialogue = Some(Dialogue::request(acn, acn_version));
        Ok(())
    }))
}

/// Attach an AARE dialogue carrying `result` and its source diagnostic.
pub fn with_continue_dialogue_response(
    acn: u32,
    acn_version: u32,
    result: u8,
    diagnostic: SourceDiagnostic,
) -> ContinueOption {
    ContinueOption(Box::new(move |parts| {
        parts.dialogue = Some(Dialogue::response(acn, acn_version, result, diagnostic));
        Ok(())
    }))
}

/// Attach a caller-built dialogue.
pub fn with_continue_dialogue_object(dialogue: Dialogue) -> ContinueOption {
    ContinueOption(Box::new(move |parts| {
        parts.dialogue = Some(dialogue);
        Ok(())
    }))
}

/// Append an Invoke component.
pub fn with_continue_invoke(
    invoke_id: i32,
    op_code: i32,
    parameter: Option<Vec<u8>>,
) -> ContinueOption {
    ContinueOption(Box::new(move |parts| {
        validate_invoke_id(i64::from(invoke_id), "invoke-id")?;
        push_component(
            &mut parts.components,
            Component::Invoke(Invoke {
                invoke_id,
                linked_id: None,
                op_code,
                parameter,
            }),
        );
        Ok(())
    }))
}

/// Append a ReturnResult-Last component.
pub fn with_continue_return_result_last(
    invoke_id: i32,
    op_code: Option<i32>,
    parameter: Option<Vec<u8>>,
) -> ContinueOption {
    ContinueOption(Box::new(move |parts| {
        validate_invoke_id(i64::from(invoke_id), "invoke-id")?;
        push_component(
            &mut parts.components,
            Component::ReturnResultLast(ReturnResult {
                invoke_id,
                op_code,
                parameter,
            }),
        );
        Ok(())
    }))
}

/// Set the provider abort cause; see [`crate::p_abort`].
pub fn with_abort_p_abort_cause(cause: u8) -> AbortOption {
    AbortOption(Box::new(move |parts| {
        parts.p_abort_cause = Some(cause);
        Ok(())
    }))
}

/// Set a dialogue-shaped user abort cause.
pub fn with_abort_u_abort_cause(dialogue: Dialogue) -> AbortOption {
    AbortOption(Box::new(move |parts| {
        parts.u_abort_cause = Some(dialogue);
        Ok(())
    }))
}

/// Attach an AUDT dialogue with the unidialogue AS id.
pub fn with_unidirectional_dialogue(acn: u32, acn_version: u32) -> UnidirectionalOption {
    UnidirectionalOption(Box::new(move |parts| {
        parts.dialogue = Some(Dialogue::unidialogue(acn, acn_version));
        Ok(())
    }))
}

/// Append an Invoke component.
pub fn with_unidirectional_invoke(
    invoke_id: i32,
    op_code: i32,
    parameter: Option<Vec<u8>>,
) -> UnidirectionalOption {
    UnidirectionalOption(Box::new(move |parts| {
        validate_invoke_id(i64::from(invoke_id), "invoke-id")?;
        push_component(
            &mut parts.components,
            Component::Invoke(Invoke {
                invoke_id,
                linked_id: None,
                op_code,
                parameter,
            }),
        );
        Ok(())
    }))
}

fn push_component(slot: &mut Option<ComponentPortion>, component: Component) {
    match slot {
        Some(portion) => portion.push(component),
        None => *slot = Some(ComponentPortion::new(component)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::{acn, DialoguePdu};

    #[test]
    fn begin_without_options() {
        let msg = new_begin([0x01, 0x02], []).unwrap();
        let Tcap::Begin {
            otid,
            dialogue,
            components,
        } = msg
        else {
            panic!("expected Begin");
        };
        assert_eq!(otid.as_bytes(), &[0x01, 0x02]);
        assert!(dialogue.is_none());
        assert!(components.is_none());
    }

    #[test]
    fn begin_with_dialogue_and_invoke() {
        let msg = new_begin(
            [0x01, 0x02],
            [
                with_begin_dialogue_request(acn::SHORT_MSG_GATEWAY, acn::VERSION3),
                with_begin_invoke(0, 45, Some(vec![0x04, 0x01, 0xAA])),
            ],
        )
        .unwrap();
        let Tcap::Begin {
            dialogue,
            components,
            ..
        } = msg
        else {
            panic!("expected Begin");
        };
        assert!(matches!(
            dialogue.unwrap().pdu,
            DialoguePdu::Request(_)
        ));
        let portion = components.unwrap();
        assert!(matches!(portion.component, Component::Invoke(_)));
        assert!(portion.next.is_none());
    }

    #[test]
    fn oversized_otid_is_rejected() {
        let err = new_begin([0x01, 0x02, 0x03, 0x04, 0x05], []).unwrap_err();
        assert!(matches!(
            err,
            TcapError::InvalidTransactionId {
                field: "otid",
                len: 5
            }
        ));
    }

    #[test]
    fn out_of_range_invoke_id_is_rejected() {
        let err = new_begin([0x01], [with_begin_invoke(128, 45, None)]).unwrap_err();
        assert!(matches!(
            err,
            TcapError::InvalidInvokeId { value: 128, .. }
        ));

        let err = new_continue([0x01], [0x02], [with_continue_invoke(-129, 45, None)]).unwrap_err();
        assert!(matches!(
            err,
            TcapError::InvalidInvokeId { value: -129, .. }
        ));
    }

    #[test]
    fn two_component_options_build_a_chain() {
        let msg = new_end(
            [0x0A],
            [
                with_end_return_result_last(0, Some(45), None),
                with_end_return_error(1, 6, None),
            ],
        )
        .unwrap();
        let Tcap::End { components, .. } = msg else {
            panic!("expected End");
        };
        let portion = components.unwrap();
        assert_eq!(portion.iter().count(), 2);
        assert!(matches!(portion.component, Component::ReturnResultLast(_)));
        assert!(matches!(
            portion.next.as_deref().unwrap().component,
            Component::ReturnError(_)
        ));
    }

    #[test]
    fn unidirectional_requires_a_component() {
        let err = new_unidirectional([with_unidirectional_dialogue(
            acn::SHORT_MSG_ALERT,
            acn::VERSION1,
        )])
        .unwrap_err();
        assert!(matches!(err, TcapError::EmptyMessage));

        let msg = new_unidirectional([with_unidirectional_invoke(0, 64, None)]).unwrap();
        assert!(matches!(msg, Tcap::Unidirectional { .. }));
    }

    #[test]
    fn abort_options_populate_the_causes() {
        let msg = new_abort(
            [0x2A],
            [with_abort_p_abort_cause(
                crate::p_abort::RESOURCE_LIMITATION,
            )],
        )
        .unwrap();
        let Tcap::Abort {
            p_abort_cause,
            u_abort_cause,
            ..
        } = msg
        else {
            panic!("expected Abort");
        };
        assert_eq!(p_abort_cause, Some(4));
        assert!(u_abort_cause.is_none());
    }
}
